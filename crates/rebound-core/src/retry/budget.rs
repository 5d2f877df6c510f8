//! Normalized attempt-count policy.

/// Requests at or above this many retries are treated as unbounded.
pub const INFINITE_RETRY_THRESHOLD: i32 = i32::MAX - 1;

/// How many retries a policy may make after the first attempt.
///
/// A budget always permits at least one retry: requests of zero or less
/// clamp to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    bound: u32,
    start_count: u32,
    infinite: bool,
}

impl RetryBudget {
    pub fn new(requested: i32) -> Self {
        Self::with_start_count(requested, 0)
    }

    pub fn infinite() -> Self {
        Self {
            bound: u32::MAX,
            start_count: 0,
            infinite: true,
        }
    }

    /// `start_count` is the attempt index the first call gets; retries are
    /// allowed while `attempt < start_count + bound`.
    pub fn with_start_count(requested: i32, start_count: u32) -> Self {
        if requested >= INFINITE_RETRY_THRESHOLD {
            return Self {
                start_count,
                ..Self::infinite()
            };
        }
        Self {
            bound: requested.max(1) as u32,
            start_count,
            infinite: false,
        }
    }

    /// Same bound, counting attempts from `start_count`.
    pub fn starting_at(self, start_count: u32) -> Self {
        Self {
            start_count,
            ..self
        }
    }

    /// Number of retries allowed, `None` when unbounded.
    pub fn bound(&self) -> Option<u32> {
        if self.infinite {
            None
        } else {
            Some(self.bound)
        }
    }

    pub fn start_count(&self) -> u32 {
        self.start_count
    }

    pub fn is_infinite(&self) -> bool {
        self.infinite
    }

    /// May another attempt follow the failure at `attempt`?
    pub fn can_retry(&self, attempt: u32) -> bool {
        self.infinite || attempt < self.start_count.saturating_add(self.bound)
    }
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self::new(1)
    }
}
