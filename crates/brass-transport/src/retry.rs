//! Retrying wrapper around a [`RoundTrip`].
//!
//! Each response is classified by status:
//!
//! | Status | Outcome |
//! |--------|---------|
//! | 2xx, 400 | returned to the caller as is |
//! | 403 | [`CallError::Forbidden`], no retry |
//! | 503 | [`CallError::Unavailable`], no retry |
//! | anything else, or a transport error | retried after a fixed delay |
//!
//! A 400 is a well-formed rejection from the upstream (bad input, not a
//! transient fault), so the caller gets to read its body.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::call::{CallRequest, CallResponse, RoundTrip};
use crate::error::{CallError, CallResult, LastFailure};

/// Retry budget and pacing for a [`RetryTransport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, at least 1.
    pub attempts: u32,
    /// Pause between two attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. An `attempts` of 0 is treated as 1.
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

enum Verdict {
    Return,
    Fail(CallError),
    Retry,
}

fn classify(status: u16) -> Verdict {
    match status {
        200..=299 | 400 => Verdict::Return,
        403 => Verdict::Fail(CallError::Forbidden),
        503 => Verdict::Fail(CallError::Unavailable),
        _ => Verdict::Retry,
    }
}

/// A [`RoundTrip`] with retries and status classification.
///
/// ```rust,ignore
/// let transport = RetryTransport::new(ReqwestRoundTrip::new(Duration::from_secs(10))?, policy);
///
/// match transport.call(&CallRequest::get(url), &cancel).await {
///     Ok(resp) => render(resp.json::<Grades>()?),
///     Err(CallError::Forbidden) => ask_for_password_again(),
///     Err(e) => report(e),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RetryTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: RoundTrip> RetryTransport<T> {
    /// Wraps `inner` with `policy`.
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Returns the retry policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Returns the wrapped round-tripper.
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Sends `request`, retrying transient failures.
    ///
    /// Cancelling `cancel` aborts the call before the next attempt, including
    /// while waiting out the delay; an attempt already in flight is not
    /// interrupted.
    pub async fn call(
        &self,
        request: &CallRequest,
        cancel: &CancellationToken,
    ) -> CallResult<CallResponse> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(CallError::Cancelled);
            }
            attempt += 1;

            let failure = match self.inner.round_trip(request).await {
                Ok(response) => match classify(response.status) {
                    Verdict::Return => {
                        debug!(url = %request.url, status = response.status, attempt, "Call finished");
                        return Ok(response);
                    }
                    Verdict::Fail(e) => {
                        warn!(url = %request.url, status = response.status, error = %e, "Call failed");
                        return Err(e);
                    }
                    Verdict::Retry => LastFailure::Status(response.status),
                },
                Err(e) => LastFailure::Transport(e),
            };

            if attempt >= attempts {
                warn!(url = %request.url, attempts, last = %failure, "Call retries exhausted");
                return Err(CallError::Exhausted {
                    attempts,
                    last: failure,
                });
            }

            warn!(
                url = %request.url,
                attempt,
                attempts,
                failure = %failure,
                delay_ms = self.policy.delay.as_millis() as u64,
                "Call attempt failed, retrying"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CallError::Cancelled),
                _ = tokio::time::sleep(self.policy.delay) => {}
            }
        }
    }

    /// Sends `request` without a way to cancel it between attempts.
    pub async fn call_uncancellable(&self, request: &CallRequest) -> CallResult<CallResponse> {
        self.call(request, &CancellationToken::new()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::time::Instant;
    use tokio_test::assert_ok;

    use crate::error::{TransportError, TransportResult};

    /// Replays scripted outcomes, one per call.
    #[derive(Default)]
    struct Script {
        outcomes: Mutex<VecDeque<TransportResult<u16>>>,
        calls: AtomicU32,
        cancel_on_call: Option<CancellationToken>,
    }

    impl Script {
        fn new(outcomes: impl IntoIterator<Item = TransportResult<u16>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into_iter().collect()),
                ..Default::default()
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RoundTrip for Script {
        async fn round_trip(&self, _request: &CallRequest) -> TransportResult<CallResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = &self.cancel_on_call {
                token.cancel();
            }
            let status = self
                .outcomes
                .lock()
                .pop_front()
                .unwrap_or(Err(TransportError::Io("script exhausted".into())))?;
            Ok(CallResponse::new(status, format!("status {status}")))
        }
    }

    fn transport(script: &Arc<Script>) -> RetryTransport<Arc<Script>> {
        RetryTransport::new(script.clone(), RetryPolicy::new(3, Duration::from_secs(2)))
    }

    fn request() -> CallRequest {
        CallRequest::get("http://parser/grades")
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_and_bad_request_return_immediately() {
        for status in [200, 204, 400] {
            let script = Script::new([Ok(status)]);
            let resp = transport(&script).call_uncancellable(&request()).await.unwrap();
            assert_eq!(resp.status, status);
            assert_eq!(script.calls(), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_statuses_are_not_retried() {
        let script = Script::new([Ok(403), Ok(200)]);
        let err = transport(&script).call_uncancellable(&request()).await.unwrap_err();
        assert_eq!(err, CallError::Forbidden);
        assert_eq!(script.calls(), 1);

        let script = Script::new([Ok(503), Ok(200)]);
        let err = transport(&script).call_uncancellable(&request()).await.unwrap_err();
        assert_eq!(err, CallError::Unavailable);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success_with_fixed_delay() {
        let script = Script::new([Ok(500), Err(TransportError::Timeout), Ok(200)]);
        let started = Instant::now();

        let resp = assert_ok!(transport(&script).call_uncancellable(&request()).await);

        assert_eq!(resp.status, 200);
        assert_eq!(script.calls(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_reports_last_failure() {
        let script = Script::new([Ok(500), Ok(502), Ok(429)]);
        let err = transport(&script).call_uncancellable(&request()).await.unwrap_err();
        assert_eq!(
            err,
            CallError::Exhausted {
                attempts: 3,
                last: LastFailure::Status(429)
            }
        );
        assert!(err.is_transient());

        let script = Script::new([Ok(500), Ok(500), Err(TransportError::Timeout)]);
        let err = transport(&script).call_uncancellable(&request()).await.unwrap_err();
        assert_eq!(
            err,
            CallError::Exhausted {
                attempts: 3,
                last: LastFailure::Transport(TransportError::Timeout)
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_attempts() {
        let token = CancellationToken::new();
        let script = Arc::new(Script {
            outcomes: Mutex::new([Ok(500), Ok(200)].into_iter().collect()),
            calls: AtomicU32::new(0),
            cancel_on_call: Some(token.clone()),
        });

        let err = transport(&script).call(&request(), &token).await.unwrap_err();
        assert_eq!(err, CallError::Cancelled);
        assert_eq!(script.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let token = CancellationToken::new();
        token.cancel();
        let script = Script::new([Ok(200)]);

        let err = transport(&script).call(&request(), &token).await.unwrap_err();
        assert_eq!(err, CallError::Cancelled);
        assert_eq!(script.calls(), 0);
    }

    #[test]
    fn test_policy_has_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
        assert_eq!(RetryPolicy::no_retry().attempts, 1);
    }
}
