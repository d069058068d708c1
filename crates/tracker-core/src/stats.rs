//! Confidence statistics
//!
//! Counts per confidence level, computed the same way for the local map and
//! for data fetched from the server so statistics are always available
//! offline.

use serde::{Deserialize, Serialize};

use crate::models::{ConfidenceLevel, ConfidenceMap};

/// Counts grouped by confidence level
///
/// `total` counts every entry, including entries whose level is not one of
/// the known values; such entries land in no named bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub total: u64,
    pub none: u64,
    pub low: u64,
    pub medium: u64,
    pub high: u64,
    pub expert: u64,
}

impl ConfidenceStats {
    /// Count one entry with the given raw level
    pub fn record(&mut self, level: &str) {
        self.total += 1;
        match ConfidenceLevel::parse(level) {
            Some(ConfidenceLevel::None) => self.none += 1,
            Some(ConfidenceLevel::Low) => self.low += 1,
            Some(ConfidenceLevel::Medium) => self.medium += 1,
            Some(ConfidenceLevel::High) => self.high += 1,
            Some(ConfidenceLevel::Expert) => self.expert += 1,
            None => {}
        }
    }

    /// Count for a single level
    pub fn count(&self, level: ConfidenceLevel) -> u64 {
        match level {
            ConfidenceLevel::None => self.none,
            ConfidenceLevel::Low => self.low,
            ConfidenceLevel::Medium => self.medium,
            ConfidenceLevel::High => self.high,
            ConfidenceLevel::Expert => self.expert,
        }
    }

    /// Entries at medium confidence or above
    pub fn confident(&self) -> u64 {
        self.expert
            .saturating_add(self.high)
            .saturating_add(self.medium)
    }

    /// Share of confident entries, rounded to a whole percent
    ///
    /// Never above 100, even for server counts that do not add up.
    pub fn progress_percent(&self) -> u64 {
        if self.total == 0 {
            return 0;
        }
        let confident = self.confident().min(self.total);
        ((confident as f64 / self.total as f64) * 100.0).round() as u64
    }

    /// Entries whose level is outside the known set
    ///
    /// Zero when the named buckets already exceed `total`.
    pub fn uncounted(&self) -> u64 {
        let named = [self.none, self.low, self.medium, self.high, self.expert]
            .into_iter()
            .fold(0u64, u64::saturating_add);
        self.total.saturating_sub(named)
    }
}

/// Aggregate a confidence map into per-level counts
pub fn aggregate(map: &ConfidenceMap) -> ConfidenceStats {
    aggregate_levels(map.values().map(String::as_str))
}

/// Aggregate any sequence of raw levels
pub fn aggregate_levels<'a>(levels: impl IntoIterator<Item = &'a str>) -> ConfidenceStats {
    let mut stats = ConfidenceStats::default();
    for level in levels {
        stats.record(level);
    }
    stats
}
