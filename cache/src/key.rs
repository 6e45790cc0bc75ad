use crate::common::*;

/// The explicit identity of a cache entry.
///
/// The name selects the file and the version tag is stored inside it. Bump the
/// version whenever the producer of the cached value changes its semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    name: String,
    version: u32,
}

impl CacheKey {
    pub fn new(name: impl Into<String>, version: u32) -> Result<Self> {
        let name = name.into();
        ensure!(!name.is_empty(), "cache key name must not be empty");
        ensure!(
            name.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
            "cache key name '{}' may only contain ASCII letters, digits, '_' and '-'",
            name
        );
        Ok(Self { name, version })
    }

    /// Derive the key name from a type, e.g. `VocXmlParser` becomes
    /// `voc_xml_parser`. Module paths and generic arguments are ignored.
    pub fn from_type_name<T: ?Sized>(version: u32) -> Result<Self> {
        let full_name = std::any::type_name::<T>();
        let base = full_name.split('<').next().unwrap_or(full_name);
        let base = base.rsplit("::").next().unwrap_or(base);
        Self::new(camel_to_snake(base), version)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub(crate) fn file_name(&self) -> String {
        format!("{}.bin", self.name)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@v{}", self.name, self.version)
    }
}

fn camel_to_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut snake = String::with_capacity(name.len() + 4);

    for (index, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && index > 0 {
            let prev = chars[index - 1];
            let next_is_lower = chars
                .get(index + 1)
                .map(|next| next.is_ascii_lowercase())
                .unwrap_or(false);
            if prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower)
            {
                snake.push('_');
            }
        }
        snake.push(c.to_ascii_lowercase());
    }

    snake
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_validation() {
        assert!(CacheKey::new("voc_xml_parser", 1).is_ok());
        assert!(CacheKey::new("coco-train2017", 3).is_ok());
        assert!(CacheKey::new("", 1).is_err());
        assert!(CacheKey::new("../escape", 1).is_err());
        assert!(CacheKey::new("with space", 1).is_err());
    }

    #[test]
    fn cache_key_from_type_name() {
        struct VocXmlParser;
        struct COCOParser<T>(T);

        let key = CacheKey::from_type_name::<VocXmlParser>(1).unwrap();
        assert_eq!(key.name(), "voc_xml_parser");
        let key = CacheKey::from_type_name::<COCOParser<String>>(1).unwrap();
        assert_eq!(key.name(), "coco_parser");
        assert_eq!(camel_to_snake("Mnist2Parser"), "mnist2_parser");
    }

    #[test]
    fn cache_key_file_name() {
        let key = CacheKey::new("voc_xml_parser", 2).unwrap();
        assert_eq!(key.file_name(), "voc_xml_parser.bin");
        assert_eq!(key.to_string(), "voc_xml_parser@v2");
    }
}
