use crate::config::durations::secs;
use crate::telemetry::{names, MetricsSink};
use crate::types::ApiType;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::HalfOpen => 1.0,
            Self::Open => 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub api_type: ApiType,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_ms: u64,
    /// Time since the last recorded failure, if any.
    pub last_failure_ago_ms: Option<u64>,
    /// Remaining open time in ms, if currently open and still cooling down.
    pub open_remaining_ms: Option<u64>,
    pub half_open_in_flight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures that open a closed breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the breaker.
    pub success_threshold: u32,
    /// Cooldown after the last failure before a trial call is admitted.
    #[serde(rename = "timeout_secs", with = "secs")]
    pub timeout: Duration,
    /// A failure arriving later than this after the previous one restarts the count.
    #[serde(rename = "failure_window_secs", with = "secs")]
    pub failure_window: Duration,
    /// Concurrent trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
            failure_window: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_failure_window(mut self, window: Duration) -> Self {
        self.failure_window = window;
        self
    }

    pub fn with_half_open_max_calls(mut self, calls: u32) -> Self {
        self.half_open_max_calls = calls;
        self
    }
}

/// Admission handed out by [`CircuitBreaker::can_execute`].
///
/// Outcomes are recorded against the permit. A permit issued before the
/// breaker last changed state never counts toward a HALF_OPEN trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct CallPermit {
    epoch: u64,
    trial: bool,
}

impl CallPermit {
    /// `true` when this permit holds a HALF_OPEN trial slot.
    pub fn is_trial(&self) -> bool {
        self.trial
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_failure: Option<Instant>,
    half_open_in_flight: u32,
    last_trial_started: Option<Instant>,
    /// Bumped on every transition and on reclaiming abandoned trials.
    epoch: u64,
}

impl State {
    fn holds_trial(&self, permit: CallPermit) -> bool {
        self.state == CircuitState::HalfOpen && permit.trial && permit.epoch == self.epoch
    }

    fn permit(&self) -> CallPermit {
        CallPermit {
            epoch: self.epoch,
            trial: self.state == CircuitState::HalfOpen,
        }
    }
}

/// Per-api-type circuit breaker.
///
/// - CLOSED: calls pass, failures are counted
/// - OPEN: every call is rejected until `timeout` has elapsed since the last failure
/// - HALF_OPEN: a bounded number of trial calls decide between CLOSED and OPEN
///
/// The OPEN → HALF_OPEN transition happens lazily inside [`can_execute`](Self::can_execute);
/// there is no background timer.
pub struct CircuitBreaker {
    api_type: ApiType,
    cfg: CircuitBreakerConfig,
    state: Mutex<State>,
    metrics: Arc<dyn MetricsSink>,
}

impl CircuitBreaker {
    pub fn new(api_type: ApiType, cfg: CircuitBreakerConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            api_type,
            cfg,
            state: Mutex::new(State {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                last_failure: None,
                half_open_in_flight: 0,
                last_trial_started: None,
                epoch: 0,
            }),
            metrics,
        }
    }

    pub fn api_type(&self) -> ApiType {
        self.api_type
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check-and-transition in one critical section.
    ///
    /// Returns a permit when the caller may invoke the backend. In HALF_OPEN
    /// the permit holds a trial slot until its outcome is recorded or it is
    /// released.
    pub fn can_execute(&self) -> Option<CallPermit> {
        let mut st = self.lock();
        let now = Instant::now();
        match st.state {
            CircuitState::Closed => Some(st.permit()),
            CircuitState::Open => {
                let cooled = st
                    .last_failure
                    .map(|t| now.duration_since(t) >= self.cfg.timeout)
                    .unwrap_or(true);
                if !cooled {
                    return None;
                }
                self.transition(&mut st, CircuitState::HalfOpen);
                st.success_count = 0;
                st.half_open_in_flight = 1;
                st.last_trial_started = Some(now);
                Some(st.permit())
            }
            CircuitState::HalfOpen => {
                // A trial whose outcome never came back must not wedge the breaker.
                if st.half_open_in_flight >= self.cfg.half_open_max_calls.max(1) {
                    let stale = st
                        .last_trial_started
                        .map(|t| now.duration_since(t) >= self.cfg.timeout)
                        .unwrap_or(true);
                    if !stale {
                        return None;
                    }
                    st.epoch = st.epoch.wrapping_add(1);
                    st.half_open_in_flight = 0;
                }
                st.half_open_in_flight += 1;
                st.last_trial_started = Some(now);
                Some(st.permit())
            }
        }
    }

    /// Records a successful call. Only a current HALF_OPEN trial moves the
    /// breaker; successes in CLOSED leave the failure count alone.
    pub fn record_success(&self, permit: CallPermit) {
        let mut st = self.lock();
        if !st.holds_trial(permit) {
            return;
        }
        st.half_open_in_flight = st.half_open_in_flight.saturating_sub(1);
        st.success_count = st.success_count.saturating_add(1);
        if st.success_count >= self.cfg.success_threshold {
            self.transition(&mut st, CircuitState::Closed);
            st.failure_count = 0;
            st.success_count = 0;
            st.half_open_in_flight = 0;
        }
    }

    /// Records a failed attempt and returns the resulting state.
    ///
    /// While HALF_OPEN only the current trial reopens the breaker; late
    /// failures from calls admitted earlier are ignored.
    pub fn record_failure(&self, permit: CallPermit) -> CircuitState {
        let mut st = self.lock();
        let now = Instant::now();
        match st.state {
            CircuitState::Closed => {
                let stale = st
                    .last_failure
                    .map(|t| now.duration_since(t) > self.cfg.failure_window)
                    .unwrap_or(false);
                if stale {
                    st.failure_count = 0;
                }
                st.failure_count = st.failure_count.saturating_add(1);
                st.last_failure = Some(now);
                if st.failure_count >= self.cfg.failure_threshold {
                    self.transition(&mut st, CircuitState::Open);
                }
            }
            CircuitState::HalfOpen if st.holds_trial(permit) => {
                st.failure_count = st.failure_count.saturating_add(1);
                st.success_count = 0;
                st.last_failure = Some(now);
                self.transition(&mut st, CircuitState::Open);
                st.half_open_in_flight = 0;
            }
            CircuitState::HalfOpen => {}
            CircuitState::Open => {
                st.failure_count = st.failure_count.saturating_add(1);
                st.last_failure = Some(now);
            }
        }
        st.state
    }

    /// Gives back a HALF_OPEN trial slot whose call never reached the backend
    /// (rate limited or cancelled). No effect for other permits.
    pub fn release(&self, permit: CallPermit) {
        let mut st = self.lock();
        if st.holds_trial(permit) {
            st.half_open_in_flight = st.half_open_in_flight.saturating_sub(1);
        }
    }

    /// Remaining cooldown, when open.
    pub fn retry_after(&self) -> Option<Duration> {
        let st = self.lock();
        self.open_remaining(&st, Instant::now())
    }

    /// Pure read: never performs a state transition.
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let st = self.lock();
        let now = Instant::now();
        CircuitBreakerSnapshot {
            api_type: self.api_type,
            state: st.state,
            failure_count: st.failure_count,
            success_count: st.success_count,
            failure_threshold: self.cfg.failure_threshold,
            success_threshold: self.cfg.success_threshold,
            timeout_ms: self.cfg.timeout.as_millis() as u64,
            last_failure_ago_ms: st
                .last_failure
                .map(|t| now.duration_since(t).as_millis() as u64),
            open_remaining_ms: self
                .open_remaining(&st, now)
                .map(|d| d.as_millis() as u64),
            half_open_in_flight: st.half_open_in_flight,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Force CLOSED with zeroed counters.
    pub fn reset(&self) {
        let mut st = self.lock();
        if st.state != CircuitState::Closed {
            self.transition(&mut st, CircuitState::Closed);
        }
        st.failure_count = 0;
        st.success_count = 0;
        st.last_failure = None;
        st.half_open_in_flight = 0;
        st.last_trial_started = None;
        info!(api_type = self.api_type.as_str(), "circuit breaker reset");
    }

    fn open_remaining(&self, st: &State, now: Instant) -> Option<Duration> {
        if st.state != CircuitState::Open {
            return None;
        }
        let elapsed = now.duration_since(st.last_failure?);
        let remaining = self.cfg.timeout.saturating_sub(elapsed);
        (!remaining.is_zero()).then_some(remaining)
    }

    fn transition(&self, st: &mut State, to: CircuitState) {
        let from = st.state;
        st.state = to;
        st.epoch = st.epoch.wrapping_add(1);
        let api = self.api_type.as_str();
        warn!(
            api_type = api,
            from = from.as_str(),
            to = to.as_str(),
            failure_count = st.failure_count,
            "circuit breaker transition"
        );
        self.metrics.increment_counter(
            names::CIRCUIT_TRANSITIONS_TOTAL,
            1,
            &[("api_type", api), ("from", from.as_str()), ("to", to.as_str())],
        );
        self.metrics
            .set_gauge(names::CIRCUIT_STATE, to.gauge_value(), &[("api_type", api)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{noop_sink, InMemoryMetricsSink};

    fn breaker(cfg: CircuitBreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new(ApiType::Routes, cfg, noop_sink())
    }

    /// Admit one call and fail it.
    fn fail(cb: &CircuitBreaker) -> CircuitState {
        let permit = cb.can_execute().expect("breaker should admit the call");
        cb.record_failure(permit)
    }

    fn succeed(cb: &CircuitBreaker) {
        let permit = cb.can_execute().expect("breaker should admit the call");
        cb.record_success(permit);
    }

    #[test]
    fn test_circuit_breaker_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.half_open_max_calls, 1);
    }

    #[test]
    fn test_circuit_breaker_config_builder() {
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(3)
            .with_success_threshold(1)
            .with_timeout(Duration::from_secs(10));
        assert_eq!(config.failure_threshold, 3);
        assert_eq!(config.success_threshold, 1);
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_initial_state() {
        let cb = breaker(CircuitBreakerConfig::default());
        let permit = cb.can_execute().unwrap();
        assert!(!permit.is_trial());
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.failure_count, 0);
        assert!(snapshot.open_remaining_ms.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_opens_at_threshold() {
        let cb = breaker(CircuitBreakerConfig::new().with_failure_threshold(3));
        assert_eq!(fail(&cb), CircuitState::Closed);
        assert_eq!(fail(&cb), CircuitState::Closed);
        assert!(cb.can_execute().is_some());
        assert_eq!(fail(&cb), CircuitState::Open);
        assert!(cb.can_execute().is_none());
        assert!(cb.snapshot().open_remaining_ms.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_in_closed_keeps_failure_count() {
        let cb = breaker(CircuitBreakerConfig::default());
        fail(&cb);
        fail(&cb);
        succeed(&cb);
        assert_eq!(cb.snapshot().failure_count, 2);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_outside_window_restart_count() {
        let cb = breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(3)
                .with_failure_window(Duration::from_secs(10)),
        );
        fail(&cb);
        fail(&cb);
        tokio::time::advance(Duration::from_secs(11)).await;
        fail(&cb);
        assert_eq!(cb.snapshot().failure_count, 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_to_half_open_admits_one_trial() {
        let cb = breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(2)
                .with_timeout(Duration::from_secs(30)),
        );
        fail(&cb);
        fail(&cb);
        assert!(cb.can_execute().is_none());

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cb.can_execute().is_none());
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(2)).await;
        // Status reads never transition.
        assert_eq!(cb.snapshot().state, CircuitState::Open);
        let trial = cb.can_execute().unwrap();
        assert!(trial.is_trial());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.can_execute().is_none());
        assert!(cb.can_execute().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_and_resets_successes() {
        let cb = breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(1)
                .with_success_threshold(3)
                .with_timeout(Duration::from_secs(5)),
        );
        fail(&cb);
        tokio::time::advance(Duration::from_secs(6)).await;
        succeed(&cb);
        succeed(&cb);
        assert_eq!(cb.snapshot().success_count, 2);

        assert_eq!(fail(&cb), CircuitState::Open);
        let snap = cb.snapshot();
        assert_eq!(snap.success_count, 0);
        assert_eq!(snap.state, CircuitState::Open);
        assert!(cb.can_execute().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_successes_close_and_reset_failures() {
        let cb = breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(2)
                .with_success_threshold(2)
                .with_timeout(Duration::from_secs(5)),
        );
        fail(&cb);
        fail(&cb);
        tokio::time::advance(Duration::from_secs(5)).await;
        succeed(&cb);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb);

        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::Closed);
        assert_eq!(snap.failure_count, 0);
        assert_eq!(snap.success_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_outcomes_from_closed_calls_do_not_touch_trials() {
        let cb = breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(1)
                .with_success_threshold(2)
                .with_timeout(Duration::from_secs(5)),
        );
        // admitted while closed, finishes much later
        let slow = cb.can_execute().unwrap();
        let slow_failing = cb.can_execute().unwrap();
        assert_eq!(fail(&cb), CircuitState::Open);

        tokio::time::advance(Duration::from_secs(5)).await;
        let trial = cb.can_execute().unwrap();
        assert!(trial.is_trial());

        cb.record_success(slow);
        assert_eq!(cb.record_failure(slow_failing), CircuitState::HalfOpen);
        cb.release(slow);
        let snap = cb.snapshot();
        assert_eq!(snap.state, CircuitState::HalfOpen);
        assert_eq!(snap.success_count, 0);
        assert_eq!(snap.half_open_in_flight, 1);
        assert!(cb.can_execute().is_none(), "only one trial may be in flight");

        cb.record_success(trial);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        succeed(&cb);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_trial_is_reclaimed_after_timeout() {
        let cb = breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(1)
                .with_success_threshold(1)
                .with_timeout(Duration::from_secs(5)),
        );
        fail(&cb);
        tokio::time::advance(Duration::from_secs(5)).await;
        let abandoned = cb.can_execute().unwrap();
        assert!(cb.can_execute().is_none());
        tokio::time::advance(Duration::from_secs(5)).await;
        let fresh = cb.can_execute().unwrap();

        // the reclaimed trial no longer decides anything
        cb.record_success(abandoned);
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success(fresh);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_closes_breaker() {
        let cb = breaker(CircuitBreakerConfig::new().with_failure_threshold(1));
        fail(&cb);
        assert_eq!(cb.state(), CircuitState::Open);
        cb.reset();
        assert!(cb.can_execute().is_some());
        assert_eq!(cb.snapshot().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitions_emit_metrics() {
        let sink = Arc::new(InMemoryMetricsSink::new());
        let cb = CircuitBreaker::new(
            ApiType::Geocoding,
            CircuitBreakerConfig::new().with_failure_threshold(1),
            sink.clone(),
        );
        fail(&cb);
        assert_eq!(
            sink.counter(
                names::CIRCUIT_TRANSITIONS_TOTAL,
                &[("api_type", "geocoding"), ("from", "CLOSED"), ("to", "OPEN")]
            ),
            1
        );
        assert_eq!(
            sink.gauge(names::CIRCUIT_STATE, &[("api_type", "geocoding")]),
            Some(2.0)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_returns_trial_slot() {
        let cb = breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(1)
                .with_timeout(Duration::from_secs(5)),
        );
        fail(&cb);
        tokio::time::advance(Duration::from_secs(5)).await;
        let trial = cb.can_execute().unwrap();
        assert!(cb.can_execute().is_none());
        cb.release(trial);
        assert!(cb.can_execute().is_some());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_keeps_breaker_open() {
        let cb = breaker(
            CircuitBreakerConfig::new()
                .with_failure_threshold(1)
                .with_timeout(Duration::MAX),
        );
        fail(&cb);
        tokio::time::advance(Duration::from_secs(3_600)).await;
        assert!(cb.can_execute().is_none());
        assert!(cb.retry_after().is_some());
        assert!(cb.snapshot().open_remaining_ms.is_some());
    }

    #[test]
    fn test_circuit_breaker_thread_safe() {
        let cb = Arc::new(breaker(CircuitBreakerConfig::new().with_failure_threshold(100)));
        let mut handles = vec![];
        for _ in 0..10 {
            let cb = Arc::clone(&cb);
            handles.push(std::thread::spawn(move || {
                for _ in 0..5 {
                    fail(&cb);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cb.snapshot().failure_count, 50);
    }
}
