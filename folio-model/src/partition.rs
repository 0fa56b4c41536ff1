use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, Result};

/// A named group of cached query results that is invalidated as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum CachePartition {
    Library,
    LibraryStats,
    Series,
    JobHistory,
}

impl CachePartition {
    pub const ALL: [Self; 4] = [
        Self::Library,
        Self::LibraryStats,
        Self::Series,
        Self::JobHistory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Library => "library",
            Self::LibraryStats => "libraryStats",
            Self::Series => "series",
            Self::JobHistory => "jobHistory",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for CachePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CachePartition {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|partition| partition.as_str() == s)
            .ok_or_else(|| ModelError::UnknownPartition(s.to_owned()))
    }
}

/// Small copyable set of [`CachePartition`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PartitionSet(u8);

impl PartitionSet {
    pub const EMPTY: Self = Self(0);

    /// Everything a finished job may have touched.
    pub const JOB_COMPLETE: Self = Self::EMPTY
        .with(CachePartition::Library)
        .with(CachePartition::LibraryStats)
        .with(CachePartition::Series)
        .with(CachePartition::JobHistory);

    pub const JOB_FAILED: Self = Self::EMPTY.with(CachePartition::JobHistory);

    /// Listings that change when the server creates media or series.
    pub const CATALOG: Self = Self::EMPTY
        .with(CachePartition::Library)
        .with(CachePartition::LibraryStats)
        .with(CachePartition::Series);

    pub const fn with(self, partition: CachePartition) -> Self {
        Self(self.0 | partition.bit())
    }

    pub fn insert(&mut self, partition: CachePartition) {
        self.0 |= partition.bit();
    }

    pub fn remove(&mut self, partition: CachePartition) {
        self.0 &= !partition.bit();
    }

    pub const fn contains(&self, partition: CachePartition) -> bool {
        self.0 & partition.bit() != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = CachePartition> + use<> {
        let set = *self;
        CachePartition::ALL
            .into_iter()
            .filter(move |partition| set.contains(*partition))
    }
}

impl fmt::Debug for PartitionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<CachePartition> for PartitionSet {
    fn from_iter<I: IntoIterator<Item = CachePartition>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

impl From<CachePartition> for PartitionSet {
    fn from(partition: CachePartition) -> Self {
        Self::EMPTY.with(partition)
    }
}
