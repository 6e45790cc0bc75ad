//! Dataset parsing configuration format.

use crate::{
    common::*, utils::load_classes_file, Autofix, CacheOptions, ClassMap, DataSplitter,
    FixedSplitter, RandomSplitter, SingleSplitSplitter, DEFAULT_SEED,
};
use cache::CacheKey;

/// The main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    #[serde(default)]
    pub split: SplitConfig,
    /// Autofix options. Set to `null` to keep the records as parsed.
    #[serde(default = "default_autofix")]
    pub autofix: Option<Autofix>,
    pub cache: Option<CacheConfig>,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config = json5::from_str(&text)
            .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
        Ok(config)
    }
}

/// Dataset options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// Optional list of whitelisted classes.
    pub class_whitelist: Option<HashSet<String>>,
    /// The dataset configuration.
    pub kind: DatasetKind,
}

impl DatasetConfig {
    /// Load the classes file of the dataset, if it has one.
    pub fn class_map(&self) -> Result<Option<ClassMap>> {
        let classes_file = match self.kind.classes_file() {
            Some(file) => file,
            None => return Ok(None),
        };
        let classes = load_classes_file(classes_file)?;
        let class_map = ClassMap::new(classes, self.class_whitelist.clone())?;
        Ok(Some(class_map))
    }
}

/// Variants of dataset and options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DatasetKind {
    /// PASCAL VOC dataset options.
    Voc {
        classes_file: PathBuf,
        annotations_dir: PathBuf,
        images_dir: PathBuf,
        /// If set, merge the instance masks of the images into the
        /// records. Images without a mask are left out.
        #[serde(default)]
        masks_dir: Option<PathBuf>,
    },
    /// PASCAL VOC instance masks only.
    VocMask { masks_dir: PathBuf },
    /// Microsoft COCO dataset options.
    Coco {
        classes_file: PathBuf,
        annotation_file: PathBuf,
        images_dir: PathBuf,
        #[serde(default)]
        with_masks: bool,
    },
    /// CSV dataset options.
    Csv {
        classes_file: PathBuf,
        label_file: PathBuf,
        image_dir: PathBuf,
    },
}

impl DatasetKind {
    pub fn classes_file(&self) -> Option<&Path> {
        match self {
            Self::Voc { classes_file, .. }
            | Self::Coco { classes_file, .. }
            | Self::Csv { classes_file, .. } => Some(classes_file.as_path()),
            Self::VocMask { .. } => None,
        }
    }
}

/// Data splitting options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SplitConfig {
    /// Seeded random split by proportions.
    Random {
        probs: Vec<R64>,
        #[serde(default = "default_seed")]
        seed: u64,
    },
    /// All images in one split.
    Single,
    /// Splits listed in files with one native key per line, e.g. the
    /// `ImageSets/Main/*.txt` files of VOC.
    Fixed { split_files: Vec<PathBuf> },
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self::Random {
            probs: vec![r64(0.8), r64(0.2)],
            seed: DEFAULT_SEED,
        }
    }
}

impl SplitConfig {
    /// Build the splitter. Keys in split files are converted by `parse_key`.
    pub fn build<K, F>(&self, parse_key: F) -> Result<Box<dyn DataSplitter<K>>>
    where
        K: 'static + Hash + Eq + Debug,
        F: Fn(&str) -> Result<K>,
    {
        let splitter: Box<dyn DataSplitter<K>> = match self {
            Self::Random { probs, seed } => Box::new(RandomSplitter::new(
                probs.iter().map(|prob| prob.raw()),
                *seed,
            )?),
            Self::Single => Box::new(SingleSplitSplitter),
            Self::Fixed { split_files } => {
                let splits: Vec<Vec<K>> = split_files
                    .iter()
                    .map(|file| -> Result<_> {
                        let text = fs::read_to_string(file).with_context(|| {
                            format!("failed to read split file '{}'", file.display())
                        })?;
                        text.lines()
                            .map(str::trim)
                            .filter(|line| !line.is_empty())
                            .map(|line| {
                                parse_key(line).with_context(|| {
                                    format!("invalid key '{}' in '{}'", line, file.display())
                                })
                            })
                            .collect()
                    })
                    .collect::<Result<_>>()?;
                Box::new(FixedSplitter::new(splits)?)
            }
        };
        Ok(splitter)
    }
}

/// Record cache options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// The directory to save the cache entries.
    pub dir: PathBuf,
    /// The entry name. Derived from the parser type if not set.
    pub key: Option<String>,
    /// Bump it to invalidate existing entries.
    #[serde(default = "default_cache_version")]
    pub version: u32,
    /// Return cached records without parsing the dataset.
    #[serde(default = "default_true")]
    pub use_cached: bool,
    /// Fail on unreadable entries instead of parsing again.
    #[serde(default)]
    pub strict: bool,
}

impl CacheConfig {
    /// Build the cache options, using `default_key` if no key is set.
    pub fn to_options<F>(&self, default_key: F) -> Result<CacheOptions>
    where
        F: FnOnce(u32) -> Result<CacheKey>,
    {
        let key = match &self.key {
            Some(name) => CacheKey::new(name.clone(), self.version)?,
            None => default_key(self.version)?,
        };
        Ok(CacheOptions {
            use_cached: self.use_cached,
            strict: self.strict,
            ..CacheOptions::new(&self.dir, key)
        })
    }
}

fn default_autofix() -> Option<Autofix> {
    Some(Autofix::default())
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_cache_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}
