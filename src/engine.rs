use crate::{
    AttemptExecutor, AttemptOutcome, BackoffPolicy, FluentError, LastFailure, RequestSpec,
    Response, Result, RetryBudget, Transport,
};

/// Non-terminal states of a run. Terminal states (succeeded, exhausted,
/// failed) return from [`RetryEngine::run`] directly.
enum State {
    Attempting,
    BackingOff(LastFailure),
}

/// Drives attempts for a request until it succeeds, the retry budget runs
/// out, or the backoff policy's elapsed-time bound is reached.
///
/// The engine holds only shared references; all per-run state lives inside
/// [`RetryEngine::run`] and the caller's [`RetryBudget`], so one engine can
/// serve concurrent runs.
#[derive(Debug)]
pub struct RetryEngine<'a, T: ?Sized> {
    executor: AttemptExecutor<'a, T>,
    policy: &'a BackoffPolicy,
}

impl<'a, T: Transport + ?Sized> RetryEngine<'a, T> {
    pub fn new(transport: &'a T, policy: &'a BackoffPolicy) -> Self {
        Self {
            executor: AttemptExecutor::new(transport),
            policy,
        }
    }

    /// Runs `spec` to completion.
    ///
    /// - a non-5xx response ends the run successfully;
    /// - transport errors and 5xx responses consume one retry each;
    /// - with no retry left a transport error is returned as
    ///   [`FluentError::Transport`] while a 5xx response is returned as `Ok`;
    /// - if the next delay would overrun `max_elapsed_time` the run stops
    ///   with [`FluentError::BackoffExhausted`].
    pub fn run(&self, spec: &RequestSpec, budget: &mut RetryBudget) -> Result<Response> {
        self.policy.validate()?;

        let mut schedule = self.policy.start();
        let mut attempts = 0usize;
        let mut state = State::Attempting;

        loop {
            state = match state {
                State::Attempting => {
                    attempts += 1;
                    match self.executor.execute(spec)? {
                        AttemptOutcome::Success(response) => return Ok(response),
                        AttemptOutcome::TransportError(err) => {
                            if !budget.try_consume() {
                                #[cfg(feature = "tracing")]
                                tracing::debug!(
                                    attempts,
                                    "transport error with no retries left: {}",
                                    err
                                );
                                return Err(FluentError::Transport(err));
                            }
                            #[cfg(feature = "tracing")]
                            tracing::debug!(
                                attempts,
                                remaining = budget.remaining(),
                                "retrying after transport error: {}",
                                err
                            );
                            State::BackingOff(LastFailure::Transport(err))
                        }
                        AttemptOutcome::ServerError(response) => {
                            if !budget.try_consume() {
                                #[cfg(feature = "tracing")]
                                tracing::debug!(
                                    attempts,
                                    status = response.status().as_u16(),
                                    "retries exhausted, returning last server response"
                                );
                                return Ok(response);
                            }
                            #[cfg(feature = "tracing")]
                            tracing::debug!(
                                attempts,
                                remaining = budget.remaining(),
                                status = response.status().as_u16(),
                                "retrying after server error"
                            );
                            State::BackingOff(LastFailure::Status(response))
                        }
                    }
                }
                State::BackingOff(last) => match schedule.next_delay() {
                    Some(delay) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("backing off for {} ms", delay.as_millis());

                        schedule.wait(delay);
                        State::Attempting
                    }
                    None => {
                        let elapsed = schedule.elapsed();

                        #[cfg(feature = "tracing")]
                        tracing::warn!(attempts, ?elapsed, "max elapsed time reached, giving up");

                        return Err(FluentError::BackoffExhausted {
                            attempts,
                            elapsed,
                            last,
                        });
                    }
                },
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        io,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    };

    use reqwest::{header::HeaderMap, StatusCode};

    use super::*;
    use crate::{ManualClock, OutgoingRequest, RequestBuilder, TransportError};

    /// Replays scripted results, then answers 500 forever.
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Step>>,
        hits: AtomicUsize,
    }

    enum Step {
        Status(u16),
        Refused,
    }

    impl ScriptedTransport {
        fn new(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                script: Mutex::new(steps.into_iter().collect()),
                hits: AtomicUsize::new(0),
            }
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    impl Transport for ScriptedTransport {
        fn exchange(
            &self,
            request: OutgoingRequest,
        ) -> std::result::Result<Response, TransportError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            let step = self
                .script
                .lock()
                .expect("script mutex must not be poisoned")
                .pop_front()
                .unwrap_or(Step::Status(500));
            match step {
                Step::Status(status) => Ok(Response::new(
                    request.method,
                    request.url,
                    StatusCode::from_u16(status).expect("test status must be valid"),
                    HeaderMap::new(),
                    request.body.unwrap_or_default(),
                )),
                Step::Refused => Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )
                .into()),
            }
        }
    }

    fn policy(clock: &ManualClock) -> BackoffPolicy {
        BackoffPolicy {
            initial_interval: Duration::from_millis(10),
            multiplier: 2.0,
            randomization_factor: 0.0,
            max_interval: Duration::from_secs(1),
            max_elapsed_time: None,
            clock: Arc::new(clock.clone()),
        }
    }

    fn spec() -> RequestSpec {
        RequestBuilder::new()
            .post("http://localhost/jobs")
            .json(&[1, 2, 3])
            .build()
            .expect("spec must build")
    }

    #[test]
    fn success_on_first_attempt_leaves_budget_untouched() {
        let clock = ManualClock::new();
        let policy = policy(&clock);
        let transport = ScriptedTransport::new([Step::Status(201)]);
        let mut budget = RetryBudget::new(3);

        let response = RetryEngine::new(&transport, &policy)
            .run(&spec(), &mut budget)
            .expect("run must succeed");

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.bytes(), b"[1,2,3]");
        assert_eq!(transport.hits(), 1);
        assert_eq!(budget.remaining(), 3);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn exhausted_server_errors_return_last_response() {
        let clock = ManualClock::new();
        let policy = policy(&clock);
        let transport = ScriptedTransport::new([]);
        let mut budget = RetryBudget::new(3);

        let response = RetryEngine::new(&transport, &policy)
            .run(&spec(), &mut budget)
            .expect("exhausted 5xx is not an error");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(transport.hits(), 4);
        assert_eq!(budget.remaining(), 0);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40)
            ]
        );
    }

    #[test]
    fn zero_budget_transport_error_fails_immediately() {
        let clock = ManualClock::new();
        let policy = policy(&clock);
        let transport = ScriptedTransport::new([Step::Refused]);
        let mut budget = RetryBudget::new(0);

        let err = RetryEngine::new(&transport, &policy)
            .run(&spec(), &mut budget)
            .expect_err("transport error must surface");

        match err {
            FluentError::Transport(inner) => assert!(inner.is_connect()),
            other => panic!("expected transport error, got {other:?}"),
        }
        assert_eq!(transport.hits(), 1);
        assert!(clock.sleeps().is_empty());
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn zero_budget_server_error_is_returned_without_delay() {
        let clock = ManualClock::new();
        let policy = policy(&clock);
        let transport = ScriptedTransport::new([Step::Status(503)]);
        let mut budget = RetryBudget::new(0);

        let response = RetryEngine::new(&transport, &policy)
            .run(&spec(), &mut budget)
            .expect("5xx with no budget is returned as response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(transport.hits(), 1);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn transport_errors_are_retried_until_success() {
        let clock = ManualClock::new();
        let policy = policy(&clock);
        let transport =
            ScriptedTransport::new([Step::Refused, Step::Status(502), Step::Status(200)]);
        let mut budget = RetryBudget::new(5);

        let response = RetryEngine::new(&transport, &policy)
            .run(&spec(), &mut budget)
            .expect("run must recover");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(transport.hits(), 3);
        assert_eq!(budget.remaining(), 3);
    }

    #[test]
    fn transport_error_surfaces_once_budget_is_spent() {
        let clock = ManualClock::new();
        let policy = policy(&clock);
        let transport = ScriptedTransport::new([Step::Refused, Step::Refused, Step::Refused]);
        let mut budget = RetryBudget::new(2);

        let err = RetryEngine::new(&transport, &policy)
            .run(&spec(), &mut budget)
            .expect_err("run must fail");

        assert!(matches!(err, FluentError::Transport(_)));
        assert_eq!(transport.hits(), 3);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn client_errors_are_not_retried() {
        let clock = ManualClock::new();
        let policy = policy(&clock);
        let transport = ScriptedTransport::new([Step::Status(404)]);
        let mut budget = RetryBudget::new(3);

        let response = RetryEngine::new(&transport, &policy)
            .run(&spec(), &mut budget)
            .expect("4xx is a response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(transport.hits(), 1);
        assert_eq!(budget.remaining(), 3);
    }

    #[test]
    fn elapsed_time_bound_stops_before_budget_runs_out() {
        let clock = ManualClock::new();
        let mut policy = policy(&clock);
        policy.max_elapsed_time = Some(Duration::from_millis(25));
        let transport = ScriptedTransport::new([]);
        let mut budget = RetryBudget::new(100);

        let err = RetryEngine::new(&transport, &policy)
            .run(&spec(), &mut budget)
            .expect_err("run must give up");

        match err {
            FluentError::BackoffExhausted {
                attempts,
                elapsed,
                last: LastFailure::Status(response),
            } => {
                // 10ms fits, then 10ms elapsed + 20ms would exceed 25ms.
                assert_eq!(attempts, 2);
                assert_eq!(elapsed, Duration::from_millis(10));
                assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("expected backoff exhaustion, got {other:?}"),
        }
        assert_eq!(transport.hits(), 2);
        assert!(budget.remaining() > 0);
    }

    #[test]
    fn elapsed_time_bound_includes_time_spent_in_attempts() {
        let clock = ManualClock::new();
        let mut policy = policy(&clock);
        policy.max_elapsed_time = Some(Duration::from_secs(1));
        let slow_clock = clock.clone();
        let transport =
            move |request: OutgoingRequest| -> std::result::Result<Response, TransportError> {
                slow_clock.advance(Duration::from_secs(2));
                let message = format!("{} timed out", request.url);
                Err(io::Error::new(io::ErrorKind::TimedOut, message).into())
            };
        let mut budget = RetryBudget::new(5);

        let err = RetryEngine::new(&transport, &policy)
            .run(&spec(), &mut budget)
            .expect_err("run must give up");

        match err {
            FluentError::BackoffExhausted {
                attempts: 1,
                last: LastFailure::Transport(inner),
                ..
            } => assert!(inner.is_timeout()),
            other => panic!("expected backoff exhaustion, got {other:?}"),
        }
        assert_eq!(budget.remaining(), 4);
    }

    #[test]
    fn invalid_policy_fails_before_any_attempt() {
        let clock = ManualClock::new();
        let mut policy = policy(&clock);
        policy.multiplier = 0.0;
        let transport = ScriptedTransport::new([Step::Status(200)]);

        let err = RetryEngine::new(&transport, &policy)
            .run(&spec(), &mut RetryBudget::new(1))
            .expect_err("policy must be rejected");

        assert!(matches!(err, FluentError::Config(_)));
        assert_eq!(transport.hits(), 0);
    }

    #[test]
    fn concurrent_runs_keep_independent_budgets() {
        let clock = ManualClock::new();
        let policy = policy(&clock);
        let transport = ScriptedTransport::new([]);
        let engine = RetryEngine::new(&transport, &policy);
        let spec = spec();

        let budgets: Vec<RetryBudget> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mut budget = RetryBudget::new(2);
                        engine.run(&spec, &mut budget).expect("5xx run returns response");
                        budget
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("run thread must not panic"))
                .collect()
        });

        assert!(budgets.iter().all(RetryBudget::is_exhausted));
        assert_eq!(transport.hits(), 12);
    }
}
