use crate::{
    common::*, Abort, Autofix, DataSplitter, Extract, FieldSet, IdMap, Mixin, Record,
};
use cache::{Cache, CacheKey, CacheStatus};

/// A data source that produces records through field mixins.
pub trait Parser {
    /// The native identifier of an image, e.g. the file name stem.
    type Key: Clone + Eq + Hash + Debug + Serialize + DeserializeOwned;
    /// A raw sample of the data source.
    type Sample: Debug;
    /// A sample prepared for field extraction.
    type Prepared;

    /// List the raw samples of the data source.
    fn samples(&self) -> Result<Box<dyn Iterator<Item = Self::Sample> + '_>>;

    /// Prepare a raw sample for field extraction, e.g. read and decode a file.
    fn prepare(&self, sample: &Self::Sample) -> Extract<Self::Prepared>;

    /// The native identifier of the image a prepared sample belongs to.
    fn image_id(&self, prepared: &Self::Prepared) -> Self::Key;

    /// The field mixins. Each one populates a distinct field.
    fn mixins(&self) -> Vec<Box<dyn Mixin<Self::Prepared> + '_>>;

    /// Describe a raw sample in log messages.
    fn describe(&self, sample: &Self::Sample) -> String {
        format!("{:?}", sample)
    }
}

/// A sample dropped during parsing.
#[derive(Debug, Clone)]
pub struct Skipped<K> {
    /// The native key, unknown if the sample failed to prepare.
    pub key: Option<K>,
    pub sample: String,
    pub reason: Abort,
}

/// The records of one parsing pass, indexed by image id.
#[derive(Debug, Clone)]
pub struct Parsed<K> {
    pub records: BTreeMap<usize, Record>,
    pub skipped: Vec<Skipped<K>>,
}

/// Options of [`RecordParser::parse`].
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Fix each split if set.
    pub autofix: Option<Autofix>,
    /// Load and store the splits if set.
    pub cache: Option<CacheOptions>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            autofix: Some(Autofix::default()),
            cache: None,
        }
    }
}

/// Caching options of [`RecordParser::parse`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub cache: Cache,
    pub key: CacheKey,
    /// Return the cached splits if a valid entry exists. The entry is not
    /// checked against the data source.
    pub use_cached: bool,
    /// Fail on unreadable entries instead of parsing again.
    pub strict: bool,
}

/// The cached result of [`RecordParser::parse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedRecords<K> {
    /// The keys of the id map in id order.
    pub keys: Vec<K>,
    pub splits: Vec<Vec<Record>>,
}

/// Turns the samples of a [`Parser`] into merged, split and fixed records.
#[derive(Debug)]
pub struct RecordParser<P>
where
    P: Parser,
{
    parser: P,
    schema: FieldSet,
}

impl<P> RecordParser<P>
where
    P: Parser,
{
    /// Wrap a parser. Fails if two of its mixins populate the same field.
    pub fn new(parser: P) -> Result<Self> {
        let schema = FieldSet::from_declared(parser.mixins().iter().map(|mixin| mixin.field()))
            .with_context(|| {
                format!(
                    "invalid field mixins of parser {}",
                    std::any::type_name::<P>()
                )
            })?;
        Ok(Self { parser, schema })
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// The fields of the produced records.
    pub fn schema(&self) -> &FieldSet {
        &self.schema
    }

    /// A cache key named after the parser type.
    pub fn default_cache_key(&self, version: u32) -> Result<CacheKey> {
        CacheKey::from_type_name::<P>(version)
    }

    /// Parse all samples into records indexed by image id.
    ///
    /// A sample that fails to prepare or to extract any field is logged and
    /// skipped without allocating an id. Samples of the same image are
    /// merged into one record.
    pub fn parse_dicted(&self, id_map: &mut IdMap<P::Key>) -> Result<Parsed<P::Key>> {
        let mixins = self.parser.mixins();
        let mut records = BTreeMap::new();
        let mut skipped = vec![];
        let mut num_samples = 0;

        for sample in self.parser.samples()? {
            num_samples += 1;

            let prepared = match self.parser.prepare(&sample) {
                Ok(prepared) => prepared,
                Err(reason) => {
                    let sample = self.parser.describe(&sample);
                    warn!("sample {} was skipped because: {}", sample, reason);
                    skipped.push(Skipped {
                        key: None,
                        sample,
                        reason,
                    });
                    continue;
                }
            };

            let key = self.parser.image_id(&prepared);
            let result = self.merge_sample(&mixins, &prepared, &key, id_map, &mut records);

            if let Err(reason) = result {
                warn!(
                    "record with image id {:?} was skipped because: {}",
                    key, reason
                );
                skipped.push(Skipped {
                    key: Some(key),
                    sample: self.parser.describe(&sample),
                    reason,
                });
            }
        }

        info!(
            "parsed {} records from {} samples, {} samples skipped",
            records.len(),
            num_samples,
            skipped.len()
        );

        Ok(Parsed { records, skipped })
    }

    /// Parse, split and fix the records.
    ///
    /// A valid cache entry short-circuits the whole process. In that case
    /// the id map is filled with the cached keys, provided its current keys
    /// are a prefix of them. Otherwise the entry is treated as invalid.
    pub fn parse(
        &self,
        splitter: &dyn DataSplitter<P::Key>,
        id_map: &mut IdMap<P::Key>,
        options: &ParseOptions,
    ) -> Result<Vec<Vec<Record>>> {
        if let Some(cache_opts) = &options.cache {
            if let Some(splits) = cache_opts.load_records(&self.schema, id_map)? {
                return Ok(splits);
            }
        }

        let Parsed { records, .. } = self.parse_dicted(id_map)?;
        let splits = split_records(records, splitter.split(id_map)?, options.autofix.as_ref())?;

        match &options.cache {
            Some(cache_opts) => Ok(cache_opts.store_records(id_map, splits)),
            None => Ok(splits),
        }
    }

    fn merge_sample(
        &self,
        mixins: &[Box<dyn Mixin<P::Prepared> + '_>],
        prepared: &P::Prepared,
        key: &P::Key,
        id_map: &mut IdMap<P::Key>,
        records: &mut BTreeMap<usize, Record>,
    ) -> Extract<()> {
        // the id the key gets once the sample is merged
        let image_id = id_map.get(key).unwrap_or_else(|| id_map.len());

        let mut staged = Record::new(image_id, self.schema.clone());
        for mixin in mixins {
            mixin.parse_field(prepared, &mut staged)?;
        }

        match records.get_mut(&image_id) {
            Some(record) => record.merge(staged)?,
            None => {
                staged.check_alignment()?;
                records.insert(image_id, staged);
            }
        }

        let resolved = id_map.resolve(key.clone());
        debug_assert_eq!(resolved, image_id);
        Ok(())
    }
}

/// Distribute records into splits by image id and fix each split.
///
/// Ids without a record are ignored. Fails if an id is assigned to more
/// than one split.
pub fn split_records(
    mut records: BTreeMap<usize, Record>,
    split_ids: Vec<Vec<usize>>,
    autofix: Option<&Autofix>,
) -> Result<Vec<Vec<Record>>> {
    {
        let mut seen = HashSet::new();
        for &id in split_ids.iter().flatten() {
            ensure!(
                seen.insert(id),
                "image id {} is assigned to more than one split",
                id
            );
        }
    }

    let splits: Vec<Vec<Record>> = split_ids
        .into_iter()
        .map(|ids| {
            let split: Vec<_> = ids.into_iter().filter_map(|id| records.remove(&id)).collect();
            match autofix {
                Some(autofix) => autofix.fix_records(split),
                None => split,
            }
        })
        .collect();

    info!(
        "split sizes: {}",
        splits.iter().map(|split| split.len()).join(", ")
    );

    Ok(splits)
}

impl CacheOptions {
    pub fn new(dir: impl AsRef<Path>, key: CacheKey) -> Self {
        Self {
            cache: Cache::new(dir),
            key,
            use_cached: true,
            strict: false,
        }
    }

    /// Load cached splits if enabled and the entry is usable.
    ///
    /// The entry must hold records of the given schema and its keys must
    /// extend the keys of `id_map`. On success the missing keys are added to
    /// `id_map`.
    pub fn load_records<K>(
        &self,
        schema: &FieldSet,
        id_map: &mut IdMap<K>,
    ) -> Result<Option<Vec<Vec<Record>>>>
    where
        K: Eq + Hash + DeserializeOwned,
    {
        if !self.use_cached {
            return Ok(None);
        }

        let status = self.cache.load::<CachedRecords<K>>(&self.key);
        let cached = match status.into_value(self.strict)? {
            Some(cached) => cached,
            None => return Ok(None),
        };

        if let Err(err) = check_cached(&cached, schema, id_map) {
            let err = err.context(format!("the cache entry {} is not usable", self.key));
            return CacheStatus::<()>::Invalid(err)
                .into_value(self.strict)
                .map(|_| None);
        }

        let CachedRecords { keys, splits } = cached;
        let num_known = id_map.len();
        keys.into_iter().skip(num_known).for_each(|key| {
            id_map.resolve(key);
        });

        info!(
            "loaded cached records from '{}', disable the cache to parse again",
            self.cache.path(&self.key).display()
        );
        Ok(Some(splits))
    }

    /// Save the splits along with the keys of the id map.
    ///
    /// A failed write is logged and does not fail the caller.
    pub fn store_records<K>(&self, id_map: &IdMap<K>, splits: Vec<Vec<Record>>) -> Vec<Vec<Record>>
    where
        K: Clone + Serialize,
    {
        let cached = CachedRecords {
            keys: id_map.keys().cloned().collect(),
            splits,
        };

        match self.cache.store(&self.key, &cached) {
            Ok(path) => info!("saved records to cache '{}'", path.display()),
            Err(err) => warn!("unable to save the cache {}: {:#}", self.key, err),
        }

        cached.splits
    }
}

fn check_cached<K>(cached: &CachedRecords<K>, schema: &FieldSet, id_map: &IdMap<K>) -> Result<()>
where
    K: Eq + Hash,
{
    let CachedRecords { keys, splits } = cached;

    let unique_keys: HashSet<_> = keys.iter().collect();
    ensure!(unique_keys.len() == keys.len(), "the cached keys are not unique");
    ensure!(
        id_map.is_prefix_of(keys),
        "the cached id map is not compatible with the given id map"
    );

    for record in splits.iter().flatten() {
        ensure!(
            record.fields() == schema,
            "the cached record {} has fields {}, but {} is expected",
            record.image_id(),
            record.fields(),
            schema
        );
        ensure!(
            record.image_id() < keys.len(),
            "the cached record {} has no key",
            record.image_id()
        );
    }

    Ok(())
}
