//! Resource limits for triple expression matching.
//!
//! The repetition and conjunction searches enumerate set partitions and have no
//! intrinsic step budget. These limits bound a single [`MatchContext`](crate::MatchContext):
//! exceeding one aborts the evaluation with a [`ShexValidationError`].

use crate::error::ShexValidationError;
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Default maximum number of nested dispatcher and value shape calls.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 512;

/// Default maximum number of partitions and assignments tried by one context.
pub const DEFAULT_MAX_PARTITIONS: usize = 1_000_000;

/// Configurable resource limits for matching.
///
/// ```
/// use oxshex::MatchLimits;
/// use std::time::Duration;
///
/// let limits = MatchLimits::default()
///     .with_max_partitions(10_000)
///     .with_timeout(Duration::from_secs(2));
/// assert_eq!(limits.max_partitions, 10_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchLimits {
    /// Maximum number of nested dispatcher and value shape calls.
    pub max_recursion_depth: usize,

    /// Maximum number of partitions and assignments tried.
    pub max_partitions: usize,

    /// Optional wall-clock budget.
    pub timeout: Option<Duration>,
}

impl Default for MatchLimits {
    fn default() -> Self {
        Self {
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            max_partitions: DEFAULT_MAX_PARTITIONS,
            timeout: None,
        }
    }
}

impl MatchLimits {
    /// Creates limits with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limits suitable for trusted schemas and data.
    pub fn permissive() -> Self {
        Self {
            max_recursion_depth: 4096,
            max_partitions: usize::MAX,
            timeout: None,
        }
    }

    /// Limits suitable for services validating untrusted input.
    pub fn strict() -> Self {
        Self {
            max_recursion_depth: 64,
            max_partitions: 10_000,
            timeout: Some(Duration::from_secs(5)),
        }
    }

    /// Sets the maximum recursion depth.
    #[must_use]
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }

    /// Sets the maximum number of partitions tried.
    #[must_use]
    pub fn with_max_partitions(mut self, count: usize) -> Self {
        self.max_partitions = count;
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Disables the timeout.
    #[must_use]
    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }
}

/// Tracks resource consumption of one context against its limits.
#[derive(Debug)]
pub(crate) struct LimitTracker {
    limits: MatchLimits,
    depth: Cell<usize>,
    partitions: Cell<usize>,
    start_time: Instant,
}

impl LimitTracker {
    pub(crate) fn new(limits: MatchLimits) -> Self {
        Self {
            limits,
            depth: Cell::new(0),
            partitions: Cell::new(0),
            start_time: Instant::now(),
        }
    }

    /// Enters a deeper recursion level.
    pub(crate) fn enter(&self) -> Result<(), ShexValidationError> {
        let depth = self.depth.get() + 1;
        if depth > self.limits.max_recursion_depth {
            return Err(ShexValidationError::MaxRecursionDepth {
                depth,
                limit: self.limits.max_recursion_depth,
            });
        }
        self.depth.set(depth);
        Ok(())
    }

    pub(crate) fn exit(&self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }

    /// Records that one more partition or assignment is about to be tried.
    pub(crate) fn record_partition(&self) -> Result<(), ShexValidationError> {
        let count = self.partitions.get().saturating_add(1);
        self.partitions.set(count);
        if count > self.limits.max_partitions {
            return Err(ShexValidationError::MaxPartitions {
                count,
                limit: self.limits.max_partitions,
            });
        }
        self.check_timeout()
    }

    pub(crate) fn check_timeout(&self) -> Result<(), ShexValidationError> {
        if let Some(limit) = self.limits.timeout {
            let elapsed = self.start_time.elapsed();
            if elapsed > limit {
                return Err(ShexValidationError::Timeout { elapsed, limit });
            }
        }
        Ok(())
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth.get()
    }

    pub(crate) fn partitions(&self) -> usize {
        self.partitions.get()
    }
}
