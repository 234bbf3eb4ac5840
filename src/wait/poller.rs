//! Generic convergence wait.
//!
//! A [`Poller`] repeatedly calls a read-only `fetch` function until it
//! succeeds, fails fatally, or the caller's context finishes. Attempts run on
//! a background task owned by the poll call; the caller only waits for the
//! first terminal outcome. The task is aborted when the poll returns or is
//! dropped, so no fetch is ever issued after the outcome is observed.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::error::{Result, WaitError};

use super::backoff::{BackoffPolicy, PollOptions};
use super::classify::{ErrorClass, classify};
use super::context::CallContext;

/// Convergence wait engine for one named operation.
#[derive(Debug, Clone)]
pub struct Poller {
    /// Label used in logs and timeout errors.
    operation: String,
    /// Values substituted for zero fields in per-call options.
    defaults: PollOptions,
}

/// Attempt bookkeeping shared between the caller and the worker.
#[derive(Debug, Default)]
struct Progress {
    attempts: AtomicU32,
    last_error: Mutex<Option<String>>,
}

impl Progress {
    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn record_not_ready(&self, message: String) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(message);
        }
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|last| last.clone())
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl Poller {
    /// Creates a poller using the fast defaults (100ms, 10s, 1.1x).
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            defaults: PollOptions::FAST,
        }
    }

    /// Sets the call site's defaults for zero-valued options.
    #[must_use]
    pub const fn with_defaults(mut self, defaults: PollOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// The operation label.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// The defaults applied to zero-valued options.
    #[must_use]
    pub const fn defaults(&self) -> PollOptions {
        self.defaults
    }

    /// Calls `fetch(ctx, request)` until it converges.
    ///
    /// The first attempt fires immediately. Retryable errors are followed by a
    /// backoff delay and another attempt; fatal and cancellation errors end the
    /// poll with that error unchanged. If `ctx` finishes first, the poll ends
    /// with a cancellation-class [`WaitError`].
    ///
    /// Without a deadline and with a fetch that never stops reporting "not
    /// ready", this never returns; the caller owns the overall timeout.
    ///
    /// # Errors
    ///
    /// Returns the fatal fetch error, or a [`WaitError`] when the context
    /// finishes before convergence.
    pub async fn poll<R, T, F, Fut>(
        &self,
        ctx: &CallContext,
        options: PollOptions,
        fetch: F,
        request: R,
    ) -> Result<T>
    where
        R: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(CallContext, R) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let options = options.normalized(self.defaults);
        debug!(
            "Polling {} (initial {:?}, max {:?}, factor {})",
            self.operation, options.initial_delay, options.max_delay, options.backoff_factor
        );

        if let Some(reason) = ctx.done_reason() {
            return Err(reason.into_error(&self.operation, 0, None).into());
        }

        let progress = Arc::new(Progress::default());
        let (tx, rx) = oneshot::channel();

        let worker = AbortOnDrop(tokio::spawn(attempt_loop(
            ctx.clone(),
            self.operation.clone(),
            options,
            fetch,
            request,
            Arc::clone(&progress),
            tx,
        )));

        let outcome = tokio::select! {
            biased;
            received = rx => received.unwrap_or_else(|_| {
                Err(WaitError::WorkerStopped {
                    operation: self.operation.clone(),
                }
                .into())
            }),
            reason = ctx.done() => Err(reason
                .into_error(&self.operation, progress.attempts(), progress.last_error())
                .into()),
        };
        drop(worker);

        match &outcome {
            Ok(_) => debug!(
                "{} converged after {} attempt(s)",
                self.operation,
                progress.attempts()
            ),
            Err(err) => debug!("{} stopped: {} ({})", self.operation, err, classify(err)),
        }

        outcome
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new("poll")
    }
}

/// Issues attempts until a terminal outcome and reports it on `tx`.
async fn attempt_loop<R, T, F, Fut>(
    ctx: CallContext,
    operation: String,
    options: PollOptions,
    fetch: F,
    request: R,
    progress: Arc<Progress>,
    tx: oneshot::Sender<Result<T>>,
) where
    R: Clone,
    F: Fn(CallContext, R) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = BackoffPolicy::new(&options);

    let outcome: Result<T> = loop {
        if let Some(reason) = ctx.done_reason() {
            break Err(reason
                .into_error(&operation, progress.attempts(), progress.last_error())
                .into());
        }

        let attempt = progress.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let err = match fetch(ctx.clone(), request.clone()).await {
            Ok(value) => break Ok(value),
            Err(err) => err,
        };

        if classify(&err) != ErrorClass::Retryable {
            break Err(err);
        }

        let delay = backoff.next_delay();
        trace!("{operation} attempt {attempt} not ready ({err}), retrying in {delay:?}");
        progress.record_not_ready(err.to_string());

        tokio::select! {
            biased;
            reason = ctx.done() => {
                break Err(reason
                    .into_error(&operation, progress.attempts(), progress.last_error())
                    .into());
            }
            () = tokio::time::sleep(delay) => {}
        }
    };

    let _ = tx.send(outcome);
}

/// Polls with the fast defaults under a generic operation label.
///
/// # Errors
///
/// See [`Poller::poll`].
pub async fn poll<R, T, F, Fut>(
    ctx: &CallContext,
    options: PollOptions,
    fetch: F,
    request: R,
) -> Result<T>
where
    R: Clone + Send + 'static,
    T: Send + 'static,
    F: Fn(CallContext, R) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Poller::default().poll(ctx, options, fetch, request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ApiError, ProviderError};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Fetch that reports "not ready" for the first `not_ready` calls.
    fn counting_fetch(
        calls: Arc<AtomicU32>,
    ) -> impl Fn(CallContext, u32) -> std::pin::Pin<Box<dyn Future<Output = Result<u32>> + Send>>
    + Send
    + 'static {
        move |_ctx, not_ready| {
            let calls = Arc::clone(&calls);
            Box::pin(async move {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                let outcome: Result<u32> = if call <= not_ready {
                    Err(ApiError::not_ready("widget", format!("call {call}")).into())
                } else {
                    Ok(call)
                };
                outcome
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_then_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = CallContext::background();

        let value = Poller::new("widget")
            .poll(&ctx, PollOptions::default(), counting_fetch(Arc::clone(&calls)), 4)
            .await
            .expect("poll should converge");

        assert_eq!(value, 5);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_options_use_fast_defaults() {
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = CallContext::background();
        let start = Instant::now();

        poll(&ctx, PollOptions::default(), counting_fetch(Arc::clone(&calls)), 2)
            .await
            .expect("poll should converge");

        // 100ms then 110ms, rounded up to the timer's millisecond resolution.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(210), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(213), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let ctx = CallContext::background();
        let start = Instant::now();

        let result: Result<u32> = poll(
            &ctx,
            PollOptions::default(),
            move |_ctx, (): ()| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<u32, ProviderError>(ApiError::api_error(500, "broken").into())
                }
            },
            (),
        )
        .await;

        let err = result.expect_err("fatal error should surface");
        assert!(matches!(
            err,
            ProviderError::Api(ApiError::ApiRequestFailed { status: 500, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_interrupts_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = CallContext::background().with_timeout(Duration::from_millis(50));
        let start = Instant::now();

        let result = Poller::new("widget")
            .poll(
                &ctx,
                PollOptions::default(),
                counting_fetch(Arc::clone(&calls)),
                u32::MAX,
            )
            .await;

        let err = result.expect_err("poll should time out");
        assert!(err.is_cancelled());
        match err {
            ProviderError::Wait(WaitError::DeadlineExceeded {
                operation,
                attempts,
                last_error,
            }) => {
                assert_eq!(operation, "widget");
                assert_eq!(attempts, 1);
                assert_eq!(
                    last_error.as_deref(),
                    Some("Control plane API error: widget is not ready: call 1")
                );
            }
            other => panic!("unexpected error: {other}"),
        }

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(50 + 110), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fetch_after_outcome() {
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = CallContext::background().with_timeout(Duration::from_secs(2));

        let result = poll(
            &ctx,
            PollOptions::new(Duration::from_millis(100), Duration::from_millis(100), 1.0),
            counting_fetch(Arc::clone(&calls)),
            u32::MAX,
        )
        .await;
        assert!(result.is_err());

        let after_return = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_return);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_poll_stops_worker() {
        let calls = Arc::new(AtomicU32::new(0));
        let ctx = CallContext::background();

        let wait = poll(
            &ctx,
            PollOptions::default(),
            counting_fetch(Arc::clone(&calls)),
            u32::MAX,
        );
        let timed_out = tokio::time::timeout(Duration::from_secs(1), wait).await;
        assert!(timed_out.is_err());

        let after_drop = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_handle_stops_poll() {
        let calls = Arc::new(AtomicU32::new(0));
        let (ctx, handle) = CallContext::cancellable();

        let wait = tokio::spawn({
            let calls = Arc::clone(&calls);
            async move {
                poll(&ctx, PollOptions::default(), counting_fetch(calls), u32::MAX).await
            }
        });
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.cancel();

        let err = wait
            .await
            .expect("poll task panicked")
            .expect_err("poll should be cancelled");
        assert!(matches!(err, ProviderError::Wait(WaitError::Cancelled { .. })));
    }

    #[tokio::test]
    async fn test_finished_context_skips_fetch() {
        let calls = Arc::new(AtomicU32::new(0));
        let (ctx, handle) = CallContext::cancellable();
        handle.cancel();

        let result = poll(
            &ctx,
            PollOptions::default(),
            counting_fetch(Arc::clone(&calls)),
            0,
        )
        .await;

        assert!(result.expect_err("context already done").is_cancelled());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
