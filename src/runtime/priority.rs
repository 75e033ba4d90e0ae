//! Scheduling priority shared by contexts and apartments.

use serde::{Deserialize, Serialize};

/// Priority levels.
///
/// Priority is advisory: apartments run higher levels first when they have a
/// choice, but never preempt work that already started.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work.
    Low = 0,
    /// Normal priority (default).
    #[default]
    Normal = 1,
    /// Elevated work, e.g. completion bookkeeping.
    High = 2,
    /// Critical priority.
    Critical = 3,
}

impl Priority {
    /// Number of distinct levels.
    pub const LEVELS: usize = 4;

    /// Index into per-level queues, `0` being the most urgent.
    #[inline]
    pub fn queue_index(self) -> usize {
        Self::LEVELS - 1 - self as usize
    }

    /// One level above `self`, saturating at `Critical`.
    #[inline]
    pub fn elevated(self) -> Self {
        match self {
            Priority::Low => Priority::Normal,
            Priority::Normal => Priority::High,
            Priority::High | Priority::Critical => Priority::Critical,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(name)
    }
}
