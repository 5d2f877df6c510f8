//! Error handlers: diagnostic or side-effecting code run over each caught failure.
//!
//! Every handler exposes a sync and an async form. Closures are wrapped once,
//! at registration time, in [`HandlerFn`]; the pipeline never re-inspects the
//! shape per call.

mod pipeline;

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::context::AttemptContext;
use crate::failure::Failure;

pub use pipeline::{ErrorPipeline, HandlerRecord, HandlerStatus, PipelineOutcome};

/// Capability the pipeline drives. Returning `Err` reports the handler's own
/// failure; it never replaces the failure being handled.
pub trait ErrorHandler: Send + Sync {
    fn handle(
        &self,
        failure: &Failure,
        ctx: &AttemptContext,
        cancel: &CancellationToken,
    ) -> Result<(), Failure>;

    /// Async form. Defaults to running [`ErrorHandler::handle`] inline.
    fn handle_async<'a>(
        &'a self,
        failure: &'a Failure,
        ctx: &'a AttemptContext,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), Failure>> {
        Box::pin(async move { self.handle(failure, ctx, cancel) })
    }
}

type SyncHandlerFn =
    Arc<dyn Fn(&Failure, &AttemptContext, &CancellationToken) -> Result<(), Failure> + Send + Sync>;
type AsyncHandlerFn = Arc<
    dyn Fn(Failure, AttemptContext, CancellationToken) -> BoxFuture<'static, Result<(), Failure>>
        + Send
        + Sync,
>;

/// Closure adapter, tagged by the shape it was registered with.
///
/// A sync closure runs inline in both modes. An async closure is awaited in
/// async mode and driven to completion on the calling thread in sync mode.
/// Either way the closure runs exactly once per handling.
///
/// In sync mode without an ambient tokio runtime the future runs on a
/// throwaway current-thread runtime, so tokio timers work. Inside a runtime
/// it is polled on the calling thread; call sync entry points from
/// `spawn_blocking` or a multi-thread runtime when async handlers wait on
/// tokio timers.
#[derive(Clone)]
pub enum HandlerFn {
    Sync(SyncHandlerFn),
    Async(AsyncHandlerFn),
}

impl HandlerFn {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Failure, &AttemptContext, &CancellationToken) -> Result<(), Failure>
            + Send
            + Sync
            + 'static,
    {
        HandlerFn::Sync(Arc::new(f))
    }

    pub fn from_async_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Failure, AttemptContext, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), Failure>> + Send + 'static,
    {
        let adapted: AsyncHandlerFn = Arc::new(
            move |failure: Failure,
                  ctx: AttemptContext,
                  cancel: CancellationToken|
                  -> BoxFuture<'static, Result<(), Failure>> {
                Box::pin(f(failure, ctx, cancel))
            },
        );
        HandlerFn::Async(adapted)
    }

    pub fn is_async(&self) -> bool {
        matches!(self, HandlerFn::Async(_))
    }
}

impl ErrorHandler for HandlerFn {
    fn handle(
        &self,
        failure: &Failure,
        ctx: &AttemptContext,
        cancel: &CancellationToken,
    ) -> Result<(), Failure> {
        match self {
            HandlerFn::Sync(f) => f(failure, ctx, cancel),
            HandlerFn::Async(f) => {
                drive_blocking(f(failure.clone(), ctx.clone(), cancel.clone()))
            }
        }
    }

    fn handle_async<'a>(
        &'a self,
        failure: &'a Failure,
        ctx: &'a AttemptContext,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<(), Failure>> {
        match self {
            HandlerFn::Sync(f) => Box::pin(futures::future::ready(f(failure, ctx, cancel))),
            HandlerFn::Async(f) => f(failure.clone(), ctx.clone(), cancel.clone()),
        }
    }
}

/// Run an async handler to completion from sync code.
fn drive_blocking(fut: BoxFuture<'static, Result<(), Failure>>) -> Result<(), Failure> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return futures::executor::block_on(fut);
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(Failure::new)?;
    runtime.block_on(fut)
}
