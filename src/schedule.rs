//! Cooperative scheduling, cancellation and progress plumbing.
//!
//! Everything runs on one thread. Long loops call [`ImportContext::checkpoint`]
//! every so often, which hands control back to the host (browser event loop
//! or tokio) and then checks whether the import was abandoned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use crate::config::ImportConfig;
use crate::error::{ImportError, Result};
use crate::types::ParseProgress;

/// Hands control back to the host between batches of work.
#[allow(async_fn_in_trait)]
pub trait Scheduler {
    async fn yield_to_host(&self);
}

/// Never yields. Lets tests drive the async pipeline without a real event loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScheduler;

impl Scheduler for NoopScheduler {
    async fn yield_to_host(&self) {}
}

#[cfg(not(target_arch = "wasm32"))]
/// Yields to the tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[cfg(not(target_arch = "wasm32"))]
impl Scheduler for TokioScheduler {
    async fn yield_to_host(&self) {
        tokio::task::yield_now().await;
    }
}

#[cfg(target_arch = "wasm32")]
/// Yields to the browser with a zero-delay `setTimeout`, so input and paint run in between.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventLoopScheduler;

#[cfg(target_arch = "wasm32")]
impl Scheduler for EventLoopScheduler {
    async fn yield_to_host(&self) {
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            let scheduled = web_sys::window().is_some_and(|window| {
                window
                    .set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, 0)
                    .is_ok()
            });
            if !scheduled {
                let _ = resolve.call0(&wasm_bindgen::JsValue::NULL);
            }
        });
        let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
    }
}

/// Shared flag checked at every yield point.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Progress callback type.
pub type ProgressSink<'a> = &'a mut dyn FnMut(&ParseProgress);

/// Per-import state threaded through the async pipeline.
pub struct ImportContext<'a, Y: Scheduler> {
    pub config: ImportConfig,
    scheduler: Y,
    cancel: CancellationToken,
    progress: Option<ProgressSink<'a>>,
}

impl<'a, Y: Scheduler> ImportContext<'a, Y> {
    pub fn new(config: ImportConfig, scheduler: Y) -> Self {
        Self {
            config: config.sanitized(),
            scheduler,
            cancel: CancellationToken::default(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, sink: ProgressSink<'a>) -> Self {
        self.progress = Some(sink);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn report(&mut self, progress: ParseProgress) {
        debug!("progress: {} ({:?}%)", progress.message, progress.percent);
        if let Some(sink) = self.progress.as_mut() {
            sink(&progress);
        }
    }

    /// # Errors
    /// `ImportError::Cancelled` once the token has been cancelled.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(ImportError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Yield to the host, then bail out if the import was cancelled meanwhile.
    ///
    /// # Errors
    /// `ImportError::Cancelled`.
    pub async fn checkpoint(&self) -> Result<()> {
        self.check_cancelled()?;
        self.scheduler.yield_to_host().await;
        self.check_cancelled()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_sink_receives_reports() {
        let mut seen = Vec::new();
        let mut sink = |p: &ParseProgress| seen.push(p.clone());
        {
            let mut ctx = ImportContext::new(ImportConfig::default(), NoopScheduler)
                .with_progress(&mut sink);
            ctx.report(ParseProgress::new("Reading ZIP structure...", Some(5)));
            ctx.checkpoint().await.unwrap();
        }
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].percent, Some(5));
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_checkpoint() {
        let token = CancellationToken::new();
        let ctx = ImportContext::new(ImportConfig::default(), TokioScheduler)
            .with_cancellation(token.clone());
        ctx.checkpoint().await.unwrap();
        token.cancel();
        assert!(matches!(ctx.checkpoint().await, Err(ImportError::Cancelled)));
    }
}
