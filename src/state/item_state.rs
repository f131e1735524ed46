/// Work item state definitions for tracking crawl progress
///
/// Every seed URL is a work item that moves through
/// `pending -> in_progress -> {completed | error}`. The only way back out of
/// a terminal state is an explicit reset, which returns the item to `pending`.
use std::fmt;

/// Represents the current status of a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    /// Seeded or reset, waiting for a worker
    Pending,

    /// Claimed by a worker of some run
    InProgress,

    /// The whole subtree was committed
    Completed,

    /// The last attempt failed; see `last_error`
    Error,
}

impl ItemStatus {
    /// Returns true if the item may move from `self` to `next`
    ///
    /// `in_progress -> in_progress` is a re-claim after a crashed run.
    /// Any status may be reset to `pending`.
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        match (self, next) {
            (_, Self::Pending) => true,
            (Self::Pending, Self::InProgress) => true,
            (Self::InProgress, Self::InProgress) => true,
            (Self::InProgress, Self::Completed) => true,
            (Self::InProgress, Self::Error) => true,
            _ => false,
        }
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// What a seed URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Movie,
    Series,
}

impl MediaKind {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Series => "series",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(Self::Movie),
            "series" => Some(Self::Series),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
