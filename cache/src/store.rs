use crate::{common::*, CacheKey};
use bincode::Options as _;
use std::io::Read as _;

pub const MAGIC: [u8; 8] = *b"detcache";

/// The layout version of cache files written by this crate.
pub const FORMAT_VERSION: u32 = 1;

/// The header following the file magic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub format_version: u32,
    pub version: u32,
    pub key: String,
}

/// The outcome of a cache lookup.
#[derive(Debug)]
pub enum CacheStatus<T> {
    Hit(T),
    Miss,
    /// The entry exists but cannot be used.
    Invalid(Error),
}

impl<T> CacheStatus<T> {
    /// Convert the status into an optional value.
    ///
    /// An invalid entry is logged and treated as a miss, or returned as an
    /// error if `strict` is set.
    pub fn into_value(self, strict: bool) -> Result<Option<T>> {
        match self {
            Self::Hit(value) => Ok(Some(value)),
            Self::Miss => Ok(None),
            Self::Invalid(err) if strict => Err(err.context("the cache entry is unreadable")),
            Self::Invalid(err) => {
                warn!("ignore unreadable cache entry: {:#}", err);
                Ok(None)
            }
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, Self::Hit(_))
    }
}

/// A directory of cache entries.
#[derive(Debug, Clone)]
pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_owned(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    pub fn load<T>(&self, key: &CacheKey) -> CacheStatus<T>
    where
        T: DeserializeOwned,
    {
        let path = self.path(key);
        if !path.is_file() {
            return CacheStatus::Miss;
        }

        match read_entry(&path, key) {
            Ok(value) => CacheStatus::Hit(value),
            Err(err) => CacheStatus::Invalid(
                err.context(format!("failed to load cache file '{}'", path.display())),
            ),
        }
    }

    /// Write the value under the key, replacing the previous entry.
    ///
    /// The entry is written to a temporary file first and renamed into place.
    pub fn store<T>(&self, key: &CacheKey, value: &T) -> Result<PathBuf>
    where
        T: Serialize,
    {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("failed to create cache directory '{}'", self.dir.display())
        })?;

        let path = self.path(key);
        let tmp_path = path.with_extension("bin.tmp");
        let header = Header {
            format_version: FORMAT_VERSION,
            version: key.version(),
            key: key.name().to_owned(),
        };

        {
            let file = File::create(&tmp_path)
                .with_context(|| format!("failed to create file '{}'", tmp_path.display()))?;
            let mut writer = BufWriter::new(file);
            writer.write_all(&MAGIC)?;
            bincode::serialize_into(&mut writer, &header)?;
            bincode::serialize_into(&mut writer, value)?;
            writer.flush()?;
        }

        fs::rename(&tmp_path, &path).with_context(|| {
            format!(
                "failed to move '{}' to '{}'",
                tmp_path.display(),
                path.display()
            )
        })?;
        info!("saved cache entry {} to '{}'", key, path.display());

        Ok(path)
    }

    /// Delete the entry. Returns whether an entry existed.
    pub fn remove(&self, key: &CacheKey) -> Result<bool> {
        let path = self.path(key);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("failed to remove cache file '{}'", path.display()))?;
        Ok(true)
    }
}

fn read_entry<T>(path: &Path, key: &CacheKey) -> Result<T>
where
    T: DeserializeOwned,
{
    let file = File::open(path)?;
    // no length prefix in the file may claim more bytes than the file has
    let options = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(file.metadata()?.len());
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .context("the file is too short")?;
    ensure!(magic == MAGIC, "file magic does not match");

    let Header {
        format_version,
        version,
        key: name,
    } = options
        .deserialize_from(&mut reader)
        .context("failed to decode header")?;

    // sanity check
    ensure!(
        format_version == FORMAT_VERSION,
        "format version {} is not supported, expect {}",
        format_version,
        FORMAT_VERSION
    );
    ensure!(
        name == key.name(),
        "the entry belongs to key '{}' instead of '{}'",
        name,
        key.name()
    );
    ensure!(
        version == key.version(),
        "the entry has version {}, but version {} is expected",
        version,
        key.version()
    );

    let value = options
        .deserialize_from(&mut reader)
        .context("failed to decode payload")?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splits() -> Vec<Vec<u32>> {
        vec![vec![3, 1, 4], vec![1, 5]]
    }

    #[test]
    fn cache_store_and_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = Cache::new(dir.path().join("records"));
        let key = CacheKey::new("voc_xml_parser", 1)?;

        assert!(matches!(cache.load::<Vec<Vec<u32>>>(&key), CacheStatus::Miss));

        let path = cache.store(&key, &splits())?;
        assert_eq!(path, dir.path().join("records").join("voc_xml_parser.bin"));

        let loaded = cache.load::<Vec<Vec<u32>>>(&key).into_value(true)?;
        assert_eq!(loaded, Some(splits()));
        Ok(())
    }

    #[test]
    fn cache_version_mismatch_is_invalid() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = Cache::new(dir.path());
        cache.store(&CacheKey::new("voc", 1)?, &splits())?;

        let status = cache.load::<Vec<Vec<u32>>>(&CacheKey::new("voc", 2)?);
        assert!(matches!(status, CacheStatus::Invalid(_)));
        assert_eq!(status.into_value(false)?, None);

        let status = cache.load::<Vec<Vec<u32>>>(&CacheKey::new("voc", 2)?);
        assert!(status.into_value(true).is_err());
        Ok(())
    }

    #[test]
    fn cache_corrupted_file_is_invalid() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = Cache::new(dir.path());
        let key = CacheKey::new("voc", 1)?;

        fs::write(cache.path(&key), b"not a cache file")?;
        assert!(matches!(
            cache.load::<Vec<Vec<u32>>>(&key),
            CacheStatus::Invalid(_)
        ));

        // truncated payload
        cache.store(&key, &splits())?;
        let bytes = fs::read(cache.path(&key))?;
        fs::write(cache.path(&key), &bytes[..bytes.len() - 3])?;
        assert!(matches!(
            cache.load::<Vec<Vec<u32>>>(&key),
            CacheStatus::Invalid(_)
        ));
        Ok(())
    }

    #[test]
    fn cache_oversized_length_prefix_is_invalid() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = Cache::new(dir.path());
        let key = CacheKey::new("voc", 1)?;

        // a header whose key claims 1 TiB
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&(1u64 << 40).to_le_bytes());
        bytes.extend_from_slice(b"voc");
        fs::write(cache.path(&key), &bytes)?;

        let status = cache.load::<Vec<Vec<u32>>>(&key);
        assert!(matches!(status, CacheStatus::Invalid(_)));
        assert!(status.into_value(true).is_err());

        // a valid header followed by a payload claiming 2^60 splits
        let mut bytes = MAGIC.to_vec();
        bincode::serialize_into(
            &mut bytes,
            &Header {
                format_version: FORMAT_VERSION,
                version: 1,
                key: "voc".to_owned(),
            },
        )?;
        bytes.extend_from_slice(&(1u64 << 60).to_le_bytes());
        fs::write(cache.path(&key), &bytes)?;
        assert!(matches!(
            cache.load::<Vec<Vec<u32>>>(&key),
            CacheStatus::Invalid(_)
        ));
        Ok(())
    }

    #[test]
    fn cache_remove() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let cache = Cache::new(dir.path());
        let key = CacheKey::new("voc", 1)?;

        assert!(!cache.remove(&key)?);
        cache.store(&key, &splits())?;
        assert!(cache.remove(&key)?);
        assert!(!cache.load::<Vec<Vec<u32>>>(&key).is_hit());
        Ok(())
    }
}
