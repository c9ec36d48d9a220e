use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};

use crate::{
    outcome::{classify, AttemptOutcome, RetryCause, DEFAULT_SUCCESS_RANGE},
    CallRequest, CallResult, RelayError, RemoteCall, Result, RetryPolicy,
};

/// Per-invocation progress of [`Executor::execute`].
#[derive(Debug)]
enum State {
    Idle,
    Attempting { attempt: u32 },
    Waiting { attempt: u32, delay: Duration },
    Done(CallResult),
}

/// Runs one remote call with a per-attempt timeout and jittered exponential
/// retry.
///
/// At most `max_attempts` calls are made, one at a time. The executor is
/// stateless across invocations and can be shared between concurrent callers.
pub struct Executor<T> {
    transport: T,
    policy: RetryPolicy,
    success: RangeInclusive<u16>,
}

impl<T> fmt::Debug for Executor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("policy", &self.policy)
            .field("success", &self.success)
            .finish_non_exhaustive()
    }
}

impl<T: RemoteCall> Executor<T> {
    /// Creates an executor after validating `policy`.
    pub fn new(transport: T, policy: RetryPolicy) -> Result<Self> {
        policy.validate()?;
        Ok(Self {
            transport,
            policy,
            success: DEFAULT_SUCCESS_RANGE,
        })
    }

    /// Overrides which statuses count as success (2xx by default).
    pub fn with_success_range(mut self, success: RangeInclusive<u16>) -> Self {
        self.success = success;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Executes `request`, drawing jitter from the thread-local RNG.
    pub async fn execute(&self, request: &CallRequest) -> CallResult {
        self.run(request, |attempt| {
            self.policy.backoff_delay(attempt, &mut rand::rng())
        })
        .await
    }

    /// Executes `request`, drawing jitter from `rng`.
    pub async fn execute_with_rng<R: Rng + ?Sized>(
        &self,
        request: &CallRequest,
        rng: &mut R,
    ) -> CallResult {
        self.run(request, |attempt| self.policy.backoff_delay(attempt, &mut *rng))
            .await
    }

    async fn run<F>(&self, request: &CallRequest, mut backoff: F) -> CallResult
    where
        F: FnMut(u32) -> Duration,
    {
        let max_attempts = self.policy.max_attempts;
        // Idle, N attempts, N-1 waits, then Done.
        let max_steps = 2 * u64::from(max_attempts);
        let mut state = State::Idle;

        for _ in 0..=max_steps {
            state = match state {
                State::Idle => match request.validate() {
                    Ok(()) => State::Attempting { attempt: 0 },
                    Err(err) => State::Done(Err(err)),
                },
                State::Attempting { attempt } => match self.attempt(request, attempt).await {
                    AttemptOutcome::Success(response) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(attempt, status = response.status, "upstream call succeeded");
                        State::Done(Ok(response))
                    }
                    AttemptOutcome::Terminal(err) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            attempt,
                            status = ?err.upstream_status(),
                            "upstream call failed with non-retryable status"
                        );
                        State::Done(Err(err))
                    }
                    AttemptOutcome::Retryable(cause) if attempt + 1 >= max_attempts => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            attempts = max_attempts,
                            status = ?cause.status(),
                            cause = ?cause,
                            "upstream retries exhausted"
                        );
                        State::Done(Err(exhausted(max_attempts, cause)))
                    }
                    AttemptOutcome::Retryable(_cause) => {
                        let delay = backoff(attempt);
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            attempt,
                            status = ?_cause.status(),
                            cause = ?_cause,
                            delay_ms = delay.as_millis() as u64,
                            "retrying upstream call"
                        );
                        State::Waiting { attempt, delay }
                    }
                },
                State::Waiting { attempt, delay } => {
                    sleep(delay).await;
                    State::Attempting {
                        attempt: attempt + 1,
                    }
                }
                State::Done(result) => return result,
            };
        }

        match state {
            State::Done(result) => result,
            // Unreachable while the step bound above matches the transitions.
            _ => Err(RelayError::RetriesExhausted {
                attempts: max_attempts,
                last_transport_error: None,
            }),
        }
    }

    /// Issues one call bounded by the per-attempt timeout.
    ///
    /// The `Timeout` future owns both the in-flight call and its timer; it is
    /// dropped before this returns on every path, so neither outlives the attempt.
    async fn attempt(&self, request: &CallRequest, _attempt: u32) -> AttemptOutcome {
        #[cfg(feature = "tracing")]
        tracing::debug!(attempt = _attempt, url = request.target(), "calling upstream");

        match timeout(self.policy.attempt_timeout(), self.transport.call(request)).await {
            Ok(Ok(raw)) => classify(raw.status, raw.body, &self.success),
            Ok(Err(err)) => AttemptOutcome::Retryable(RetryCause::Transport { message: err.0 }),
            Err(_) => AttemptOutcome::Retryable(RetryCause::Transport {
                message: format!(
                    "upstream request timed out after {} ms",
                    self.policy.attempt_timeout_ms
                ),
            }),
        }
    }
}

/// Builds the exhaustion error. Transport failures keep their message;
/// status-based exhaustion carries no upstream detail.
fn exhausted(attempts: u32, cause: RetryCause) -> RelayError {
    let last_transport_error = match cause {
        RetryCause::Transport { message } => Some(message),
        RetryCause::RateLimited { .. } | RetryCause::ServerError { .. } => None,
    };
    RelayError::RetriesExhausted {
        attempts,
        last_transport_error,
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
        time::Duration,
    };

    use rand::{rngs::StdRng, SeedableRng};
    use tokio::time::Instant;

    use super::Executor;
    use crate::{
        CallRequest, ErrorKind, RawResponse, RelayError, RemoteCall, RetryPolicy, TransportError,
    };

    #[derive(Clone, Debug)]
    enum Step {
        Respond(u16, &'static str),
        Fail(&'static str),
        Hang,
    }

    /// Plays back a fixed script of upstream behaviors and records call times.
    struct Scripted {
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                steps: Mutex::new(steps.into_iter().collect()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().expect("calls mutex").clone()
        }

        fn gaps(&self) -> Vec<Duration> {
            self.calls()
                .windows(2)
                .map(|pair| pair[1] - pair[0])
                .collect()
        }
    }

    impl RemoteCall for Scripted {
        async fn call(&self, _request: &CallRequest) -> Result<RawResponse, TransportError> {
            let step = {
                self.calls.lock().expect("calls mutex").push(Instant::now());
                self.steps
                    .lock()
                    .expect("steps mutex")
                    .pop_front()
                    .unwrap_or(Step::Respond(500, "script exhausted"))
            };
            match step {
                Step::Respond(status, body) => Ok(RawResponse {
                    status,
                    body: body.to_owned(),
                }),
                Step::Fail(message) => Err(TransportError(message.to_owned())),
                Step::Hang => std::future::pending().await,
            }
        }
    }

    /// Bumps `released` when the in-flight call future is dropped.
    struct ReleaseGuard<'a>(&'a AtomicUsize);

    impl Drop for ReleaseGuard<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// [`Scripted`] wrapper that tracks how many call futures were released
    /// by the time each new call starts.
    struct Guarded {
        inner: Scripted,
        released: AtomicUsize,
        released_at_call: Mutex<Vec<usize>>,
    }

    impl Guarded {
        fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                inner: Scripted::new(steps),
                released: AtomicUsize::new(0),
                released_at_call: Mutex::new(Vec::new()),
            }
        }

        fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }

        fn released_at_call(&self) -> Vec<usize> {
            self.released_at_call.lock().expect("released mutex").clone()
        }
    }

    impl RemoteCall for Guarded {
        async fn call(&self, request: &CallRequest) -> Result<RawResponse, TransportError> {
            self.released_at_call
                .lock()
                .expect("released mutex")
                .push(self.released());
            let _guard = ReleaseGuard(&self.released);
            self.inner.call(request).await
        }
    }

    fn request() -> CallRequest {
        CallRequest::new("https://upstream.test/v1beta/models/m:generateContent", "{}")
    }

    fn policy(max_attempts: u32, base_delay_ms: u64, jitter_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms,
            attempt_timeout_ms: 1_000,
            jitter_ms,
        }
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn invalid_policy_is_rejected_at_construction() {
        let transport = Scripted::new([]);
        let err = Executor::new(&transport, policy(0, 10, 0)).expect_err("policy must be invalid");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_server_errors_exhaust_without_upstream_body() {
        for n in 1..=5u32 {
            let transport = Scripted::new((0..n).map(|_| Step::Respond(500, "boom")));
            let executor = Executor::new(&transport, policy(n, 10, 5)).expect("valid policy");

            let err = executor
                .execute(&request())
                .await
                .expect_err("must exhaust retries");

            assert!(matches!(
                err,
                RelayError::RetriesExhausted {
                    last_transport_error: None,
                    ..
                }
            ));
            assert_eq!(err.upstream_body(), None);
            assert_eq!(transport.calls().len(), n as usize);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn success_on_attempt_k_stops_immediately() {
        for k in 0..4usize {
            let mut steps: Vec<Step> = (0..k).map(|_| Step::Respond(503, "busy")).collect();
            steps.push(Step::Respond(200, "{\"ok\":true}"));
            steps.push(Step::Respond(200, "never read"));
            let transport = Scripted::new(steps);
            let executor = Executor::new(&transport, policy(5, 10, 0)).expect("valid policy");

            let response = executor
                .execute(&request())
                .await
                .expect("must succeed");

            assert_eq!(response.status, 200);
            assert_eq!(response.body, "{\"ok\":true}");
            assert_eq!(transport.calls().len(), k + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn client_error_is_terminal_after_one_call() {
        let transport = Scripted::new([
            Step::Respond(404, "{\"error\":\"model not found\"}"),
            Step::Respond(200, "never read"),
        ]);
        let executor = Executor::new(&transport, policy(3, 10, 0)).expect("valid policy");

        let err = executor
            .execute(&request())
            .await
            .expect_err("404 must be terminal");

        assert_eq!(err.kind(), ErrorKind::UpstreamClient);
        assert_eq!(err.upstream_status(), Some(404));
        assert_eq!(err.upstream_body(), Some("{\"error\":\"model not found\"}"));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_exhaust_with_transport_message_and_bounded_delays() {
        let transport = Scripted::new([Step::Hang, Step::Hang, Step::Hang, Step::Hang]);
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 100,
            attempt_timeout_ms: 50,
            jitter_ms: 30,
        };
        let executor = Executor::new(&transport, policy).expect("valid policy");

        let err = executor
            .execute(&request())
            .await
            .expect_err("every attempt must time out");

        assert_eq!(err.kind(), ErrorKind::TransportFailure);
        assert_eq!(err.status_code(), 504);
        assert!(err.to_string().contains("timed out after 50 ms"), "{err}");
        assert_eq!(transport.calls().len(), 4);

        // Each gap is the 50 ms attempt timeout followed by the backoff delay.
        for (i, gap) in transport.gaps().into_iter().enumerate() {
            let floor = 100 * (1u64 << i);
            let delay = gap - ms(50);
            assert!(delay >= ms(floor), "delay {i}: {delay:?}");
            assert!(delay < ms(floor + 30), "delay {i}: {delay:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_call_is_dropped_before_the_next_attempt() {
        let transport = Guarded::new([Step::Hang, Step::Hang, Step::Respond(200, "{}")]);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 10,
            attempt_timeout_ms: 50,
            jitter_ms: 0,
        };
        let executor = Executor::new(&transport, policy).expect("valid policy");

        let response = executor.execute(&request()).await.expect("third call must succeed");

        assert_eq!(response.status, 200);
        assert_eq!(executor.transport().released_at_call(), vec![0, 1, 2]);
        assert_eq!(executor.transport().released(), 3);
        assert_eq!(executor.policy().attempt_timeout_ms, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn every_call_is_released_when_execute_returns() {
        for steps in [
            vec![Step::Respond(200, "{}")],
            vec![Step::Respond(404, "missing")],
            vec![Step::Fail("reset"), Step::Hang],
        ] {
            let calls = steps.len();
            let transport = Guarded::new(steps);
            let executor = Executor::new(
                &transport,
                RetryPolicy {
                    max_attempts: calls as u32,
                    base_delay_ms: 1,
                    attempt_timeout_ms: 20,
                    jitter_ms: 0,
                },
            )
            .expect("valid policy");

            let _ = executor.execute(&request()).await;

            assert_eq!(transport.released_at_call().len(), calls);
            assert_eq!(transport.released(), calls);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn network_error_then_success() {
        let transport = Scripted::new([
            Step::Fail("connection failed: connection refused"),
            Step::Respond(200, "{}"),
        ]);
        let executor = Executor::new(&transport, policy(2, 10, 0)).expect("valid policy");

        let response = executor.execute(&request()).await.expect("must recover");
        assert_eq!(response.status, 200);
        assert_eq!(transport.gaps(), vec![ms(10)]);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_twice_then_success() {
        let transport = Scripted::new([
            Step::Respond(429, "slow down"),
            Step::Respond(429, "slow down"),
            Step::Respond(200, "{\"candidates\":[]}"),
        ]);
        let executor = Executor::new(&transport, policy(3, 200, 120)).expect("valid policy");

        let response = executor
            .execute(&request())
            .await
            .expect("third attempt must succeed");

        assert_eq!(response.body, "{\"candidates\":[]}");
        assert_eq!(transport.calls().len(), 3);
        let gaps = transport.gaps();
        assert!(gaps[0] >= ms(200) && gaps[0] < ms(320), "{gaps:?}");
        assert!(gaps[1] >= ms(400) && gaps[1] < ms(520), "{gaps:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn zero_jitter_delays_are_non_decreasing() {
        let transport = Scripted::new((0..6).map(|_| Step::Respond(502, "bad gateway")));
        let executor = Executor::new(&transport, policy(6, 25, 0)).expect("valid policy");

        let _ = executor.execute(&request()).await;

        let gaps = transport.gaps();
        assert_eq!(gaps, vec![ms(25), ms(50), ms(100), ms(200), ms(400)]);
        assert!(gaps.windows(2).all(|pair| pair[1] >= pair[0]));
    }

    #[tokio::test(start_paused = true)]
    async fn seeded_rng_gives_reproducible_delays() {
        let mut gaps = Vec::new();
        for _ in 0..2 {
            let transport = Scripted::new((0..3).map(|_| Step::Respond(500, "boom")));
            let executor = Executor::new(&transport, policy(3, 100, 50)).expect("valid policy");
            let mut rng = StdRng::seed_from_u64(42);
            let _ = executor.execute_with_rng(&request(), &mut rng).await;
            gaps.push(transport.gaps());
        }
        assert_eq!(gaps[0], gaps[1]);
    }

    /// Documented quirk: exhaustion keeps the transport message but drops the
    /// last upstream status and body when the final failure was a 429/5xx.
    #[tokio::test(start_paused = true)]
    async fn quirk_exhaustion_detail_depends_on_last_failure_kind() {
        let transport = Scripted::new([
            Step::Respond(500, "{\"error\":\"internal\"}"),
            Step::Fail("connection reset"),
        ]);
        let executor = Executor::new(&transport, policy(2, 1, 0)).expect("valid policy");
        let err = executor.execute(&request()).await.expect_err("must exhaust");
        assert_eq!(err.to_string(), "connection reset");

        let transport = Scripted::new([
            Step::Fail("connection reset"),
            Step::Respond(500, "{\"error\":\"internal\"}"),
        ]);
        let executor = Executor::new(&transport, policy(2, 1, 0)).expect("valid policy");
        let err = executor.execute(&request()).await.expect_err("must exhaust");
        assert_eq!(err.to_string(), "maximum retries exceeded");
        assert!(!err.to_string().contains("internal"));
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_request_makes_no_calls() {
        let transport = Scripted::new([Step::Respond(200, "{}")]);
        let executor = Executor::new(&transport, policy(3, 10, 0)).expect("valid policy");

        let err = executor
            .execute(&CallRequest::new("", "{}"))
            .await
            .expect_err("empty target must be rejected");

        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn single_attempt_policy_never_waits() {
        let transport = Scripted::new([Step::Respond(429, "slow down")]);
        let executor = Executor::new(&transport, policy(1, 10_000, 0)).expect("valid policy");
        let started = Instant::now();

        let err = executor.execute(&request()).await.expect_err("must exhaust");

        assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
        assert_eq!(Instant::now() - started, Duration::ZERO);
    }
}
