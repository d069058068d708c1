//! Local-precedence merge of confidence maps

use crate::models::ConfidenceMap;

/// Merge `remote` and `local`, local winning on overlapping keys
///
/// Every key of either input is present in the result. Keys are never
/// deleted; there are no tombstones.
pub fn merge(remote: &ConfidenceMap, local: &ConfidenceMap) -> ConfidenceMap {
    let mut merged = remote.clone();
    merged.extend(local.iter().map(|(k, v)| (k.clone(), v.clone())));
    merged
}

/// How two maps relate before a merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Keys only the server had
    pub pulled: usize,
    /// Keys only this device had
    pub pushed: usize,
    /// Keys on both sides with different levels, resolved to the local one
    pub overridden: usize,
    /// Keys on both sides with the same level
    pub unchanged: usize,
}

impl MergeSummary {
    pub fn between(remote: &ConfidenceMap, local: &ConfidenceMap) -> Self {
        let mut summary = Self::default();

        for (key, level) in local {
            match remote.get(key) {
                None => summary.pushed += 1,
                Some(theirs) if theirs == level => summary.unchanged += 1,
                Some(_) => summary.overridden += 1,
            }
        }
        summary.pulled = remote.keys().filter(|k| !local.contains_key(*k)).count();

        summary
    }

    /// Size of the merged map
    pub fn total(&self) -> usize {
        self.pulled + self.pushed + self.overridden + self.unchanged
    }
}
