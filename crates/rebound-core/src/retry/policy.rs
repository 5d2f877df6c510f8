use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::backoff::DelayHandler;
use super::budget::RetryBudget;
use super::delay::{DebugStrategy, DelayStrategy};
use crate::config::RetryConfig;
use crate::policy::{ConfigurePolicy, PolicyCore};

/// Re-runs the operation while the error filter accepts its failures and the
/// budget allows.
///
/// A retry bound of N allows N retries after the first attempt, so an
/// operation that always fails is tried N + 1 times.
#[derive(Clone)]
pub struct RetryPolicy {
    pub(super) core: PolicyCore,
    pub(super) budget: RetryBudget,
    delay: Option<Arc<dyn DelayStrategy>>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_budget(RetryBudget::default())
    }
}

impl ConfigurePolicy for RetryPolicy {
    fn core_mut(&mut self) -> &mut PolicyCore {
        &mut self.core
    }
}

impl RetryPolicy {
    /// `retries` of zero or less clamp to 1; very large values mean unbounded.
    pub fn new(retries: i32) -> Self {
        Self::with_budget(RetryBudget::new(retries))
    }

    pub fn infinite() -> Self {
        Self::with_budget(RetryBudget::infinite())
    }

    pub fn with_budget(budget: RetryBudget) -> Self {
        Self {
            core: PolicyCore::default(),
            budget,
            delay: None,
        }
    }

    /// First attempt index; retries are counted from here.
    pub fn with_start_count(mut self, start_count: u32) -> Self {
        self.budget = self.budget.starting_at(start_count);
        self
    }

    /// Wait between attempts. The wait is registered as a handler at this
    /// point of the builder chain, so handlers added earlier run before it.
    pub fn with_delay(mut self, strategy: Arc<dyn DelayStrategy>) -> Self {
        self.delay = Some(Arc::clone(&strategy));
        self.with_error_handler(Arc::new(DelayHandler::new(strategy)))
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let policy = Self::with_budget(RetryBudget::with_start_count(
            config.retries,
            config.start_count,
        ));
        match config.delay.strategy() {
            Some(strategy) => policy.with_delay(strategy),
            None => policy,
        }
    }

    pub fn budget(&self) -> RetryBudget {
        self.budget
    }

    pub fn core(&self) -> &PolicyCore {
        &self.core
    }

    /// Wait that follows the failure at `attempt`, if a delay is configured.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        self.delay.as_ref().map(|d| d.delay(attempt))
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("core", &self.core)
            .field("budget", &self.budget)
            .field("delay", &self.delay.as_ref().map(|d| DebugStrategy(d.as_ref())))
            .finish()
    }
}
