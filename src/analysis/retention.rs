use serde::{Deserialize, Serialize};

use crate::storage::FileRecord;

/// Which member of a duplicate group survives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetentionStrategy {
    #[default]
    KeepOldest,
    KeepNewest,
    KeepSmallest,
    KeepLargest,
    #[serde(alias = "KEEP_FIRST_FOUND")]
    KeepFirstSeen,
}

impl RetentionStrategy {
    /// Index of the member to keep. Ties go to the earliest member, so the
    /// answer only depends on the group's order. `None` for an empty group.
    pub fn select_keeper(&self, group: &[FileRecord]) -> Option<usize> {
        if group.is_empty() {
            return None;
        }
        let keeper = match self {
            RetentionStrategy::KeepOldest => first_by(group, |a, b| a.last_modified < b.last_modified),
            RetentionStrategy::KeepNewest => first_by(group, |a, b| a.last_modified > b.last_modified),
            RetentionStrategy::KeepSmallest => first_by(group, |a, b| a.size < b.size),
            RetentionStrategy::KeepLargest => first_by(group, |a, b| a.size > b.size),
            RetentionStrategy::KeepFirstSeen => 0,
        };
        Some(keeper)
    }
}

/// Position of the first member that no later member beats.
fn first_by<F>(group: &[FileRecord], beats: F) -> usize
where
    F: Fn(&FileRecord, &FileRecord) -> bool,
{
    let mut best = 0;
    for (i, candidate) in group.iter().enumerate().skip(1) {
        if beats(candidate, &group[best]) {
            best = i;
        }
    }
    best
}
