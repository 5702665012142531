//! Queue naming convention for failure queues
//!
//! A logical queue `orders` has companions `orders_error` (exhausted retries)
//! and `orders_skipped` (unroutable or undeserializable). The source queue is
//! derived by stripping the suffix; it is never checked for existence.

use std::fmt;

pub const ERROR_SUFFIX: &str = "_error";
pub const SKIPPED_SUFFIX: &str = "_skipped";

/// Which failure convention a queue name follows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    Error,
    Skipped,
    Regular,
}

impl QueueKind {
    pub fn of(name: &str) -> Self {
        if is_error_queue(name) {
            QueueKind::Error
        } else if is_skipped_queue(name) {
            QueueKind::Skipped
        } else {
            QueueKind::Regular
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(self, QueueKind::Regular)
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKind::Error => write!(f, "error"),
            QueueKind::Skipped => write!(f, "skipped"),
            QueueKind::Regular => write!(f, "regular"),
        }
    }
}

pub fn is_error_queue(name: &str) -> bool {
    name.ends_with(ERROR_SUFFIX)
}

pub fn is_skipped_queue(name: &str) -> bool {
    name.ends_with(SKIPPED_SUFFIX)
}

/// Strip the failure suffix; names without one come back unchanged.
pub fn source_queue_of(name: &str) -> &str {
    name.strip_suffix(ERROR_SUFFIX)
        .or_else(|| name.strip_suffix(SKIPPED_SUFFIX))
        .unwrap_or(name)
}
