//! Initiative rank values.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A comparable initiative rank. Higher acts first.
///
/// The two extreme magnitudes are reserved for the sentinels; rolled ranks
/// are clamped into the band between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RankValue(i32);

impl RankValue {
    /// Rank of the `[ Setup ]` sentinel.
    pub const SETUP: Self = Self(9999);
    /// Rank of the `[ Cleanup ]` sentinel.
    pub const CLEANUP: Self = Self(-9999);
    /// Highest rank a normal participant can hold.
    pub const MAX_NORMAL: Self = Self(9998);
    /// Lowest rank a normal participant can hold.
    pub const MIN_NORMAL: Self = Self(-9998);
    /// Sort position of a participant that has not rolled yet.
    pub const UNROLLED: Self = Self::MIN_NORMAL;

    /// Builds a normal-participant rank, clamping away the sentinel values.
    #[must_use]
    pub fn normal(raw: i32) -> Self {
        Self(raw.clamp(Self::MIN_NORMAL.0, Self::MAX_NORMAL.0))
    }

    /// The numeric value.
    #[must_use]
    pub fn value(self) -> i32 {
        self.0
    }
}

impl fmt::Display for RankValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
