use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};

use crate::types::{Result, VertexId};

use super::mapper::{Contribution, ContributionSink};
use super::RankUpdate;

/// Sums contribution shares independently of arrival order.
///
/// Shares are put in a total order first, so any permutation of the same
/// multiset yields the bit-identical sum.
pub fn sum_shares(shares: &mut [f64]) -> f64 {
    shares.sort_unstable_by(|a, b| a.total_cmp(b));
    shares.iter().sum()
}

/// Contributions grouped by destination and spread across reducer buckets.
///
/// Bucket assignment hashes the destination id with a fixed hasher, so every
/// share for a vertex lands in the same bucket no matter which mapper
/// produced it.
#[derive(Debug)]
pub struct Shuffle {
    buckets: Vec<FxHashMap<VertexId, Vec<f64>>>,
}

impl Shuffle {
    /// Creates a shuffle with `reducers` buckets (at least one).
    pub fn new(reducers: usize) -> Self {
        Self {
            buckets: (0..reducers.max(1)).map(|_| FxHashMap::default()).collect(),
        }
    }

    /// Number of reducer buckets.
    pub fn reducers(&self) -> usize {
        self.buckets.len()
    }

    /// Bucket index for `vertex`.
    pub fn bucket_of(&self, vertex: &VertexId) -> usize {
        let mut hasher = FxHasher::default();
        vertex.hash(&mut hasher);
        (hasher.finish() % self.buckets.len() as u64) as usize
    }

    /// Adds one share for `dest`.
    pub fn push(&mut self, dest: VertexId, share: f64) {
        let bucket = self.bucket_of(&dest);
        self.buckets[bucket].entry(dest).or_default().push(share);
    }

    /// Moves every share from `other` into this shuffle.
    ///
    /// Both shuffles must have the same number of buckets.
    pub fn merge(&mut self, other: Shuffle) {
        debug_assert_eq!(self.buckets.len(), other.buckets.len());
        for (mine, theirs) in self.buckets.iter_mut().zip(other.buckets) {
            for (dest, mut shares) in theirs {
                mine.entry(dest).or_default().append(&mut shares);
            }
        }
    }

    /// Total number of shares held.
    pub fn len(&self) -> usize {
        self.buckets.iter().flat_map(|b| b.values()).map(Vec::len).sum()
    }

    /// True when no share has been pushed.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.is_empty())
    }

    /// Splits the shuffle into its reducer buckets.
    pub fn into_buckets(self) -> Vec<FxHashMap<VertexId, Vec<f64>>> {
        self.buckets
    }
}

impl ContributionSink for Shuffle {
    fn emit(&mut self, dest: VertexId, share: f64) -> Result<()> {
        self.push(dest, share);
        Ok(())
    }
}

/// Reduces one bucket to a new rank per destination, ordered by vertex id.
pub fn reduce_bucket(bucket: FxHashMap<VertexId, Vec<f64>>) -> Vec<RankUpdate> {
    let mut updates: Vec<RankUpdate> = bucket
        .into_iter()
        .map(|(vertex, mut shares)| RankUpdate {
            rank: sum_shares(&mut shares),
            vertex,
        })
        .collect();
    updates.sort_unstable_by(|a, b| a.vertex.cmp(&b.vertex));
    updates
}

/// Groups `contributions` by destination and sums each group.
///
/// Only vertices that received at least one share appear in the output.
pub fn aggregate(contributions: impl IntoIterator<Item = Contribution>) -> Vec<RankUpdate> {
    let mut shuffle = Shuffle::new(1);
    for c in contributions {
        shuffle.push(c.dest, c.share);
    }
    shuffle.into_buckets().into_iter().flat_map(reduce_bucket).collect()
}
