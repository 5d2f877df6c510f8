//! Handlers run once over the finished result.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::failure::Failure;
use crate::result::{CatchBlockSource, ResultRecord};

/// What a result handler wants done with the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultVerdict {
    Keep,
    /// Mark the result failed, even if the operation itself succeeded.
    MarkFailed,
}

type ResultHandlerFn =
    Arc<dyn Fn(&ResultRecord, &CancellationToken) -> Result<ResultVerdict, Failure> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ResultHandlers {
    handlers: Vec<ResultHandlerFn>,
}

impl ResultHandlers {
    pub fn push<F>(&mut self, f: F)
    where
        F: Fn(&ResultRecord, &CancellationToken) -> Result<ResultVerdict, Failure>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.push(Arc::new(f));
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run in order. Skipped for canceled results. A raising handler is
    /// recorded and does not stop the others.
    pub(crate) fn run(&self, record: &mut ResultRecord, cancel: &CancellationToken) {
        if record.is_canceled() {
            return;
        }
        for (index, handler) in self.handlers.iter().enumerate() {
            match handler(record, cancel) {
                Ok(ResultVerdict::Keep) => {}
                Ok(ResultVerdict::MarkFailed) => record.mark_failed(),
                Err(error) => {
                    tracing::warn!(handler = index, error = %error, "result handler failed");
                    record.add_catch_block_error(
                        error,
                        CatchBlockSource::ResultHandler(index),
                        false,
                    );
                }
            }
        }
    }
}

impl fmt::Debug for ResultHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandlers")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
