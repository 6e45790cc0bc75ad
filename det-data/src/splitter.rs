//! Deterministic partitioning of the id space.

use crate::{common::*, IdMap};

/// The default seed of [`RandomSplitter`].
pub const DEFAULT_SEED: u64 = 42;

/// Partitions the ids of an [`IdMap`] into disjoint splits.
pub trait DataSplitter<K> {
    fn split(&self, id_map: &IdMap<K>) -> Result<Vec<Vec<usize>>>;
}

/// Shuffles the ids with a seeded generator and cuts them by proportions.
///
/// The result depends on the set of ids and the seed only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomSplitter {
    probs: Vec<R64>,
    seed: u64,
}

impl RandomSplitter {
    /// Create a splitter. Proportions must be positive and sum up to at most
    /// one. Ids left over by proportions summing below one are not assigned.
    pub fn new<I>(probs: I, seed: u64) -> Result<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let probs = probs
            .into_iter()
            .map(|prob| {
                ensure!(
                    prob.is_finite() && prob > 0.0,
                    "split proportion {} must be positive",
                    prob
                );
                Ok(r64(prob))
            })
            .collect::<Result<Vec<_>>>()?;
        ensure!(!probs.is_empty(), "at least one split proportion is required");

        let total: f64 = probs.iter().map(|prob| prob.raw()).sum();
        ensure!(
            total <= 1.0 + 1e-6,
            "split proportions sum up to {}, which exceeds 1",
            total
        );

        Ok(Self { probs, seed })
    }

    pub fn probs(&self) -> &[R64] {
        &self.probs
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn split_ids<I>(&self, ids: I) -> Vec<Vec<usize>>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut ids: Vec<_> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut rng = StdRng::seed_from_u64(self.seed);
        ids.shuffle(&mut rng);

        let num_ids = ids.len();
        let mut cumulative = 0.0;
        let mut begin = 0;

        self.probs
            .iter()
            .map(|prob| {
                cumulative += prob.raw();
                let end = ((cumulative * num_ids as f64).round() as usize).clamp(begin, num_ids);
                let split = ids[begin..end].to_vec();
                begin = end;
                split
            })
            .collect()
    }
}

impl Default for RandomSplitter {
    fn default() -> Self {
        Self {
            probs: vec![r64(0.8), r64(0.2)],
            seed: DEFAULT_SEED,
        }
    }
}

impl<K> DataSplitter<K> for RandomSplitter {
    fn split(&self, id_map: &IdMap<K>) -> Result<Vec<Vec<usize>>> {
        Ok(self.split_ids(id_map.ids()))
    }
}

/// Puts every id into one split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SingleSplitSplitter;

impl<K> DataSplitter<K> for SingleSplitSplitter {
    fn split(&self, id_map: &IdMap<K>) -> Result<Vec<Vec<usize>>> {
        Ok(vec![id_map.ids().collect()])
    }
}

/// Splits by explicit lists of native keys.
///
/// Keys unknown to the id map, e.g. images whose samples were all skipped,
/// are logged and left out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedSplitter<K> {
    splits: Vec<Vec<K>>,
}

impl<K> FixedSplitter<K>
where
    K: Hash + Eq + Debug,
{
    pub fn new(splits: Vec<Vec<K>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for key in splits.iter().flatten() {
            ensure!(
                seen.insert(key),
                "the key {:?} is assigned to more than one split",
                key
            );
        }
        Ok(Self { splits })
    }
}

impl<K> DataSplitter<K> for FixedSplitter<K>
where
    K: Hash + Eq + Debug,
{
    fn split(&self, id_map: &IdMap<K>) -> Result<Vec<Vec<usize>>> {
        let splits = self
            .splits
            .iter()
            .map(|keys| {
                keys.iter()
                    .filter_map(|key| {
                        let id = id_map.get(key);
                        if id.is_none() {
                            warn!("the key {:?} of the fixed split is not found", key);
                        }
                        id
                    })
                    .collect()
            })
            .collect();
        Ok(splits)
    }
}
