use crate::common::*;

/// Maps the native identifiers of a dataset to dense integer ids.
///
/// Ids are assigned on first sight, counting from zero. A key keeps its id
/// for the lifetime of the map and entries are never removed, so sharing one
/// map among several parsers gives the same image the same id everywhere.
#[derive(Debug, Clone)]
pub struct IdMap<K> {
    keys: IndexSet<K>,
}

impl<K> IdMap<K>
where
    K: Hash + Eq,
{
    pub fn new() -> Self {
        Self {
            keys: IndexSet::new(),
        }
    }

    /// Get the id of a key, allocating the next id for an unseen key.
    pub fn resolve(&mut self, key: K) -> usize {
        let (id, _) = self.keys.insert_full(key);
        id
    }

    pub fn get(&self, key: &K) -> Option<usize> {
        self.keys.get_index_of(key)
    }

    /// Check whether the keys of this map, in id order, are a prefix of `keys`.
    ///
    /// Resolving the remaining keys then reproduces the id assignment of
    /// `keys` exactly.
    pub fn is_prefix_of(&self, keys: &[K]) -> bool {
        self.keys.len() <= keys.len() && self.keys.iter().zip(keys).all(|(lhs, rhs)| lhs == rhs)
    }
}

impl<K> IdMap<K> {
    pub fn key(&self, id: usize) -> Option<&K> {
        self.keys.get_index(id)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn ids(&self) -> Range<usize> {
        0..self.keys.len()
    }

    /// Iterate over the keys in id order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.keys.iter()
    }
}

impl<K> Default for IdMap<K>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> FromIterator<K> for IdMap<K>
where
    K: Hash + Eq,
{
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut map = Self::new();
        iter.into_iter().for_each(|key| {
            map.resolve(key);
        });
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_map_resolve_is_stable() {
        let mut id_map = IdMap::new();
        assert_eq!(id_map.resolve("b"), 0);
        assert_eq!(id_map.resolve("a"), 1);
        assert_eq!(id_map.resolve("b"), 0);
        assert_eq!(id_map.resolve("c"), 2);
        assert_eq!(id_map.resolve("a"), 1);

        assert_eq!(id_map.get(&"c"), Some(2));
        assert_eq!(id_map.get(&"d"), None);
        assert_eq!(id_map.key(1), Some(&"a"));
        assert_eq!(id_map.key(3), None);
    }

    #[test]
    fn id_map_dense_ids() {
        let keys: Vec<String> = (0..50).map(|index| format!("img_{:03}", index % 17)).collect();
        let mut id_map = IdMap::new();
        let ids: HashSet<_> = keys.iter().map(|key| id_map.resolve(key.clone())).collect();

        assert_eq!(id_map.len(), 17);
        assert_eq!(ids, id_map.ids().collect::<HashSet<_>>());
        for key in &keys {
            assert_eq!(id_map.key(id_map.get(key).unwrap()), Some(key));
        }
    }

    #[test]
    fn id_map_prefix() {
        let id_map: IdMap<_> = ["x", "y"].into_iter().collect();
        assert!(id_map.is_prefix_of(&["x", "y", "z"]));
        assert!(id_map.is_prefix_of(&["x", "y"]));
        assert!(!id_map.is_prefix_of(&["y", "x", "z"]));
        assert!(!id_map.is_prefix_of(&["x"]));
        assert!(IdMap::<&str>::new().is_prefix_of(&[]));
    }
}
