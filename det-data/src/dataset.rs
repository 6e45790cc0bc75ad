//! Parsing of a configured dataset into record splits.

use crate::{
    common::*,
    config::{CacheConfig, Config, DatasetKind},
    split_records, CacheOptions, ClassMap, CocoParser, CsvParser, IdMap,
    ParseOptions, Parsed, Parser, Record, RecordParser, VocMaskParser, VocXmlParser,
};
use cache::CacheKey;

/// The record splits of a dataset.
#[derive(Debug, Clone)]
pub struct ParsedDataset {
    /// The class names. The class of label id `n` is at index `n - 1`.
    pub classes: Option<IndexSet<String>>,
    /// The native keys of the images indexed by image id.
    pub keys: Vec<String>,
    pub splits: Vec<Vec<Record>>,
}

impl ParsedDataset {
    pub fn num_records(&self) -> usize {
        self.splits.iter().map(Vec::len).sum()
    }

    pub fn num_objects(&self) -> usize {
        self.splits.iter().flatten().map(Record::num_objects).sum()
    }

    /// The native key of an image id.
    pub fn key(&self, image_id: usize) -> Option<&str> {
        self.keys.get(image_id).map(String::as_str)
    }
}

/// Parse the dataset described by the configuration.
pub fn parse_dataset(config: &Config) -> Result<ParsedDataset> {
    let class_map = config.dataset.class_map()?;
    let classes = class_map.as_ref().map(|map| map.classes().clone());

    let (keys, splits) = match &config.dataset.kind {
        DatasetKind::Voc {
            annotations_dir,
            images_dir,
            masks_dir,
            ..
        } => {
            let boxes = RecordParser::new(VocXmlParser::new(
                annotations_dir,
                images_dir,
                require_classes(class_map)?,
            ))?;
            match masks_dir {
                Some(masks_dir) => {
                    let masks = RecordParser::new(VocMaskParser::new(masks_dir))?;
                    parse_voc_with_masks(&boxes, &masks, config)?
                }
                None => run(&boxes, config, |key| Ok(key.to_owned()))?,
            }
        }
        DatasetKind::VocMask { masks_dir } => {
            let masks = RecordParser::new(VocMaskParser::new(masks_dir))?;
            run(&masks, config, |key| Ok(key.to_owned()))?
        }
        DatasetKind::Coco {
            annotation_file,
            images_dir,
            with_masks,
            ..
        } => {
            let coco = CocoParser::load(annotation_file, images_dir, require_classes(class_map)?)?
                .with_masks(*with_masks);
            let parser = RecordParser::new(coco)?;
            run(&parser, config, |key| Ok(key.parse::<u64>()?))?
        }
        DatasetKind::Csv {
            label_file,
            image_dir,
            ..
        } => {
            let parser = RecordParser::new(CsvParser::load(
                label_file,
                image_dir,
                require_classes(class_map)?,
            )?)?;
            run(&parser, config, |key| Ok(key.to_owned()))?
        }
    };

    Ok(ParsedDataset {
        classes,
        keys,
        splits,
    })
}

/// The cache options of the dataset, if caching is configured.
pub fn cache_options(config: &Config) -> Result<Option<CacheOptions>> {
    let cache = match &config.cache {
        Some(cache) => cache,
        None => return Ok(None),
    };

    let options = match &config.dataset.kind {
        DatasetKind::Voc {
            masks_dir: Some(_), ..
        } => cache.to_options(voc_with_masks_cache_key)?,
        DatasetKind::Voc { .. } => cache.to_options(CacheKey::from_type_name::<VocXmlParser>)?,
        DatasetKind::VocMask { .. } => {
            cache.to_options(CacheKey::from_type_name::<VocMaskParser>)?
        }
        DatasetKind::Coco { .. } => cache.to_options(CacheKey::from_type_name::<CocoParser>)?,
        DatasetKind::Csv { .. } => cache.to_options(CacheKey::from_type_name::<CsvParser>)?,
    };
    Ok(Some(options))
}

fn require_classes(class_map: Option<ClassMap>) -> Result<ClassMap> {
    class_map.ok_or_else(|| format_err!("the dataset requires a classes file"))
}

fn voc_with_masks_cache_key(version: u32) -> Result<CacheKey> {
    let boxes = CacheKey::from_type_name::<VocXmlParser>(version)?;
    let masks = CacheKey::from_type_name::<VocMaskParser>(version)?;
    CacheKey::new(format!("{}-{}", boxes.name(), masks.name()), version)
}

fn run<P, F>(
    parser: &RecordParser<P>,
    config: &Config,
    parse_key: F,
) -> Result<(Vec<String>, Vec<Vec<Record>>)>
where
    P: Parser,
    P::Key: 'static + Display,
    F: Fn(&str) -> Result<P::Key>,
{
    let splitter = config.split.build(parse_key)?;
    let options = ParseOptions {
        autofix: config.autofix.clone(),
        cache: config
            .cache
            .as_ref()
            .map(|cache: &CacheConfig| cache.to_options(|version| parser.default_cache_key(version)))
            .transpose()?,
    };

    let mut id_map = IdMap::new();
    let splits = parser.parse(&*splitter, &mut id_map, &options)?;
    Ok((format_keys(&id_map), splits))
}

/// Parse the boxes and the instance masks of a VOC dataset with a shared id
/// map and merge them by image id. Images missing either side, or whose boxes
/// and masks fail to merge, are dropped.
fn parse_voc_with_masks(
    boxes: &RecordParser<VocXmlParser>,
    masks: &RecordParser<VocMaskParser>,
    config: &Config,
) -> Result<(Vec<String>, Vec<Vec<Record>>)> {
    let schema = boxes.schema().union(masks.schema());
    let splitter = config.split.build(|key| Ok(key.to_owned()))?;
    let cache = config
        .cache
        .as_ref()
        .map(|cache| cache.to_options(voc_with_masks_cache_key))
        .transpose()?;
    let mut id_map = IdMap::new();

    if let Some(cache) = &cache {
        if let Some(splits) = cache.load_records(&schema, &mut id_map)? {
            return Ok((format_keys(&id_map), splits));
        }
    }

    let Parsed {
        records: box_records,
        ..
    } = boxes.parse_dicted(&mut id_map)?;
    let Parsed {
        records: mut mask_records,
        ..
    } = masks.parse_dicted(&mut id_map)?;

    let mut records = BTreeMap::new();
    let mut num_unpaired = 0;
    let mut num_conflicts = 0;

    for (id, mut record) in box_records {
        let mask_record = match mask_records.remove(&id) {
            Some(mask_record) => mask_record,
            None => {
                num_unpaired += 1;
                continue;
            }
        };

        match record.merge(mask_record) {
            Ok(()) => {
                records.insert(id, record);
            }
            Err(err) => {
                warn!(
                    "the boxes and masks of image '{}' do not match: {}",
                    id_map.key(id).map(String::as_str).unwrap_or("?"),
                    err
                );
                num_conflicts += 1;
            }
        }
    }
    num_unpaired += mask_records.len();

    if num_unpaired > 0 {
        warn!(
            "{} records without both boxes and masks were dropped",
            num_unpaired
        );
    }
    if num_conflicts > 0 {
        warn!(
            "{} images with mismatched boxes and masks were dropped",
            num_conflicts
        );
    }

    let splits = split_records(
        records,
        splitter.split(&id_map)?,
        config.autofix.as_ref(),
    )?;
    let splits = match &cache {
        Some(cache) => cache.store_records(&id_map, splits),
        None => splits,
    };

    Ok((format_keys(&id_map), splits))
}

fn format_keys<K>(id_map: &IdMap<K>) -> Vec<String>
where
    K: Display,
{
    id_map.keys().map(|key| key.to_string()).collect()
}
