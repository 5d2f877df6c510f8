//! Backoff delay strategies: attempt index in, wait duration out.

use std::fmt;
use std::time::Duration;

/// Pure mapping from the failed attempt's index to a wait before the next attempt.
pub trait DelayStrategy: Send + Sync {
    fn delay(&self, attempt: u32) -> Duration;
}

impl<F> DelayStrategy for F
where
    F: Fn(u32) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: u32) -> Duration {
        self(attempt)
    }
}

/// Same wait every time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantDelay {
    pub delay: Duration,
}

impl ConstantDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl DelayStrategy for ConstantDelay {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// `base * (attempt + 1) * slope`, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearDelay {
    pub base: Duration,
    pub slope: f64,
    pub max_delay: Option<Duration>,
}

impl LinearDelay {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            slope: 1.0,
            max_delay: None,
        }
    }

    pub fn with_slope(mut self, slope: f64) -> Self {
        self.slope = slope.max(0.0);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }
}

impl DelayStrategy for LinearDelay {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = (f64::from(attempt) + 1.0) * self.slope;
        cap(scale(self.base, factor), self.max_delay)
    }
}

/// `base * factor^attempt`, optionally capped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialDelay {
    pub base: Duration,
    pub factor: f64,
    pub max_delay: Option<Duration>,
}

impl ExponentialDelay {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            factor: 2.0,
            max_delay: None,
        }
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor.max(1.0);
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }
}

impl DelayStrategy for ExponentialDelay {
    fn delay(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        cap(scale(self.base, self.factor.powi(exp)), self.max_delay)
    }
}

/// Saturates instead of panicking on overflow or NaN.
fn scale(base: Duration, factor: f64) -> Duration {
    let secs = base.as_secs_f64() * factor;
    if secs.is_nan() || secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

fn cap(delay: Duration, max_delay: Option<Duration>) -> Duration {
    match max_delay {
        Some(max) => delay.min(max),
        None => delay,
    }
}

/// Wrapper so a boxed strategy can sit in `Debug` structs.
pub(crate) struct DebugStrategy<'a>(pub &'a dyn DelayStrategy);

impl fmt::Debug for DebugStrategy<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<delay: first={:?}>", self.0.delay(0))
    }
}
