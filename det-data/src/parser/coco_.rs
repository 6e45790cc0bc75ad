use crate::{abort, common::*, mixin, ClassMap, Extract, ImageSize, Mask, Mixin, Parser};
use std::io::BufReader;

/// The content of a COCO instances annotation file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CocoInstances {
    pub images: Vec<CocoImage>,
    pub annotations: Vec<CocoAnnotation>,
    pub categories: Vec<CocoCategory>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CocoImage {
    pub id: u64,
    pub file_name: String,
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CocoAnnotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    /// The box in `[x, y, width, height]` order.
    pub bbox: [f64; 4],
    #[serde(default)]
    pub segmentation: Option<Segmentation>,
    #[serde(default)]
    pub iscrowd: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CocoCategory {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Segmentation {
    Polygons(Vec<Vec<f64>>),
    /// Run-length encoding with the size in `[height, width]` order.
    Rle {
        counts: Vec<u64>,
        size: [usize; 2],
    },
    CompressedRle {
        counts: String,
        size: [usize; 2],
    },
}

impl Segmentation {
    /// Fails on non-finite polygon coordinates.
    pub fn to_mask(&self) -> Result<Mask> {
        let mask = match *self {
            Self::Polygons(ref polygons) => {
                let polygons = polygons
                    .iter()
                    .map(|polygon| {
                        polygon
                            .iter()
                            .map(|&value| {
                                ensure!(
                                    value.is_finite(),
                                    "polygon coordinate {} is not finite",
                                    value
                                );
                                Ok(r64(value))
                            })
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()?;
                Mask::Polygons(polygons)
            }
            Self::Rle {
                ref counts,
                size: [height, width],
            } => Mask::Rle {
                counts: counts.clone(),
                height,
                width,
            },
            Self::CompressedRle {
                ref counts,
                size: [height, width],
            } => Mask::CompressedRle {
                counts: counts.clone(),
                height,
                width,
            },
        };
        Ok(mask)
    }
}

/// One annotation resolved against its image and category.
#[derive(Debug, Clone)]
pub struct CocoObject {
    pub image_id: u64,
    pub file_name: String,
    pub size: ImageSize,
    /// The label id, or `None` if the class is ignored.
    pub label: Option<usize>,
    pub bbox: BBox,
    pub mask: Option<Mask>,
}

/// Parses a COCO instances annotation file.
///
/// Every annotation is a sample. Annotations of the same image are merged
/// into one record keyed by the COCO image id. Crowd annotations are skipped.
#[derive(Debug, Clone)]
pub struct CocoParser {
    images_dir: PathBuf,
    classes: ClassMap,
    instances: CocoInstances,
    image_indices: HashMap<u64, usize>,
    category_names: HashMap<u64, String>,
    with_masks: bool,
}

impl CocoParser {
    pub fn load(
        annotation_file: impl AsRef<Path>,
        images_dir: impl AsRef<Path>,
        classes: ClassMap,
    ) -> Result<Self> {
        let annotation_file = annotation_file.as_ref();
        let reader = fs::File::open(annotation_file)
            .map(BufReader::new)
            .with_context(|| {
                format!(
                    "failed to open annotation file '{}'",
                    annotation_file.display()
                )
            })?;
        let instances: CocoInstances = serde_json::from_reader(reader).with_context(|| {
            format!(
                "failed to parse annotation file '{}'",
                annotation_file.display()
            )
        })?;

        Self::new(instances, images_dir, classes)
    }

    pub fn new(
        instances: CocoInstances,
        images_dir: impl AsRef<Path>,
        classes: ClassMap,
    ) -> Result<Self> {
        let mut image_indices = HashMap::new();
        for (index, image) in instances.images.iter().enumerate() {
            ensure!(
                image_indices.insert(image.id, index).is_none(),
                "duplicated image id {}",
                image.id
            );
        }

        let mut category_names = HashMap::new();
        for category in &instances.categories {
            ensure!(
                category_names
                    .insert(category.id, category.name.clone())
                    .is_none(),
                "duplicated category id {}",
                category.id
            );
        }

        // sanity check
        {
            let categories: HashSet<_> = category_names.values().collect();
            let nonexist_classes: Vec<_> = classes
                .classes()
                .iter()
                .filter(|name| !categories.contains(name))
                .collect();
            let uncovered_classes: Vec<_> = categories
                .iter()
                .filter(|name| !classes.classes().contains(name.as_str()))
                .sorted()
                .collect();

            if !nonexist_classes.is_empty() {
                warn!(
                    "these classes are not defined in dataset: {:?}",
                    nonexist_classes
                );
            }
            if !uncovered_classes.is_empty() {
                warn!(
                    "these classes are not covered by classes file: {:?}",
                    uncovered_classes
                );
            }
        }

        Ok(Self {
            images_dir: images_dir.as_ref().to_owned(),
            classes,
            instances,
            image_indices,
            category_names,
            with_masks: false,
        })
    }

    /// Also extract the segmentation of every annotation.
    pub fn with_masks(self, with_masks: bool) -> Self {
        Self { with_masks, ..self }
    }

    pub fn instances(&self) -> &CocoInstances {
        &self.instances
    }

    pub fn classes(&self) -> &ClassMap {
        &self.classes
    }
}

impl Parser for CocoParser {
    type Key = u64;
    /// The index of the annotation.
    type Sample = usize;
    type Prepared = CocoObject;

    fn samples(&self) -> Result<Box<dyn Iterator<Item = Self::Sample> + '_>> {
        Ok(Box::new(0..self.instances.annotations.len()))
    }

    fn prepare(&self, &index: &Self::Sample) -> Extract<Self::Prepared> {
        let annotation = match self.instances.annotations.get(index) {
            Some(annotation) => annotation,
            None => abort!("annotation #{} does not exist", index),
        };
        if annotation.iscrowd != 0 {
            abort!("crowd annotation {} is not supported", annotation.id);
        }

        let image = match self.image_indices.get(&annotation.image_id) {
            Some(&image_index) => &self.instances.images[image_index],
            None => abort!(
                "annotation {} refers to unknown image {}",
                annotation.id,
                annotation.image_id
            ),
        };
        let category_name = match self.category_names.get(&annotation.category_id) {
            Some(name) => name,
            None => abort!(
                "annotation {} refers to unknown category {}",
                annotation.id,
                annotation.category_id
            ),
        };

        let label = if self.classes.is_whitelisted(category_name) {
            self.classes.label_id(category_name)
        } else {
            None
        };

        let [x, y, w, h] = annotation.bbox;

        Ok(CocoObject {
            image_id: image.id,
            file_name: image.file_name.clone(),
            size: ImageSize::try_from_wh([image.width, image.height])?,
            label,
            bbox: BBox::try_new_xywh(x, y, w, h)?,
            mask: annotation
                .segmentation
                .as_ref()
                .map(Segmentation::to_mask)
                .transpose()?,
        })
    }

    fn image_id(&self, object: &Self::Prepared) -> Self::Key {
        object.image_id
    }

    fn mixins(&self) -> Vec<Box<dyn Mixin<Self::Prepared> + '_>> {
        let mut mixins = vec![
            mixin::filepath(move |object: &CocoObject| Ok(self.images_dir.join(&object.file_name))),
            mixin::size(|object: &CocoObject| Ok(object.size)),
            mixin::labels(|object: &CocoObject| Ok(object.label.into_iter().collect())),
            mixin::bboxes(|object: &CocoObject| {
                Ok(object.label.map(|_| object.bbox).into_iter().collect())
            }),
        ];

        if self.with_masks {
            mixins.push(mixin::masks(|object: &CocoObject| {
                if object.label.is_none() {
                    return Ok(vec![]);
                }
                match &object.mask {
                    Some(mask) => Ok(vec![mask.clone()]),
                    None => abort!("the segmentation is missing"),
                }
            }));
        }

        mixins
    }

    fn describe(&self, &index: &Self::Sample) -> String {
        match self.instances.annotations.get(index) {
            Some(annotation) => format!(
                "annotation {} of image {}",
                annotation.id, annotation.image_id
            ),
            None => format!("annotation #{}", index),
        }
    }
}
