//! Per-endpoint rate limiting with exponential backoff.
//!
//! Each upstream endpoint gets its own fixed-window request budget. Rate-limit
//! failures put the endpoint into backoff, during which only critical
//! requests pass. Quota headers reported by the upstream override the local
//! window estimate while they are plausible.

use crate::error::RateLimitError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How urgently a caller needs its request to go out.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RequestPriority {
    /// User-facing. Passes backoff and may wait out a full window.
    Critical,
    /// Important refreshes. May wait for an upstream quota reset.
    High,
    #[default]
    Normal,
    /// Background work.
    Low,
}

/// Request budget and backoff parameters for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointLimit {
    pub requests_per_window: u32,
    pub window_secs: u64,
    pub max_retries: u32,
    pub base_backoff_secs: f64,
    pub max_backoff_secs: f64,
}

impl EndpointLimit {
    pub const fn new(
        requests_per_window: u32,
        window_secs: u64,
        max_retries: u32,
        base_backoff_secs: f64,
        max_backoff_secs: f64,
    ) -> Self {
        Self {
            requests_per_window,
            window_secs,
            max_retries,
            base_backoff_secs,
            max_backoff_secs,
        }
    }

    /// Built-in limits for the upstreams the radar talks to, or the generic
    /// fallback for anything else.
    pub fn builtin(endpoint: &str) -> Self {
        match endpoint {
            "semantic_scholar" => Self::new(100, 300, 3, 60.0, 300.0),
            "semantic_scholar_partner" => Self::new(1000, 300, 3, 30.0, 300.0),
            "github" => Self::new(5000, 3600, 2, 30.0, 300.0),
            "github_unauthenticated" => Self::new(60, 3600, 2, 60.0, 300.0),
            "arxiv" => Self::new(120, 60, 3, 5.0, 300.0),
            "groq" => Self::new(30, 60, 2, 30.0, 120.0),
            "huggingface" => Self::new(100, 60, 2, 10.0, 300.0),
            _ => Self::default(),
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for EndpointLimit {
    fn default() -> Self {
        Self::new(60, 60, 3, 1.0, 300.0)
    }
}

/// Endpoints that ship with built-in limits.
pub const BUILTIN_ENDPOINTS: [&str; 7] = [
    "semantic_scholar",
    "semantic_scholar_partner",
    "github",
    "github_unauthenticated",
    "arxiv",
    "groq",
    "huggingface",
];

/// Rate limiting settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    /// Randomize backoff uniformly between zero and the computed delay.
    pub jitter: bool,
    /// Longest a single caller may be blocked inside the limiter.
    pub max_wait_secs: u64,
    /// Remote reset times further out than this are ignored.
    pub reset_horizon_secs: u64,
    /// Per-endpoint overrides, merged over the built-in table.
    pub endpoints: HashMap<String, EndpointLimit>,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            jitter: true,
            max_wait_secs: 60,
            reset_horizon_secs: 3600,
            endpoints: BUILTIN_ENDPOINTS
                .iter()
                .map(|name| (name.to_string(), EndpointLimit::builtin(name)))
                .collect(),
        }
    }
}

impl RateLimitsConfig {
    /// The limit configured for `endpoint`, falling back to the built-ins.
    pub fn limit_for(&self, endpoint: &str) -> EndpointLimit {
        self.endpoints
            .get(endpoint)
            .cloned()
            .unwrap_or_else(|| EndpointLimit::builtin(endpoint))
    }

    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.max_wait_secs == 0 {
            problems.push("rate_limits.max_wait_secs must be positive".to_string());
        }
        let mut names: Vec<&String> = self.endpoints.keys().collect();
        names.sort();
        for name in names {
            let limit = &self.endpoints[name];
            if limit.requests_per_window == 0 {
                problems.push(format!(
                    "rate_limits.endpoints.{name}.requests_per_window must be positive"
                ));
            }
            if limit.window_secs == 0 {
                problems.push(format!(
                    "rate_limits.endpoints.{name}.window_secs must be positive"
                ));
            }
            let backoff_ok = limit.base_backoff_secs.is_finite()
                && limit.base_backoff_secs >= 0.0
                && limit.max_backoff_secs.is_finite()
                && limit.max_backoff_secs >= limit.base_backoff_secs;
            if !backoff_ok {
                problems.push(format!(
                    "rate_limits.endpoints.{name}: need 0 <= base_backoff_secs <= max_backoff_secs"
                ));
            }
        }
        problems
    }
}

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

/// Exponential backoff with optional full jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialBackoff {
    pub base_secs: f64,
    pub max_secs: f64,
    pub jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(base_secs: f64, max_secs: f64, jitter: bool) -> Self {
        Self {
            base_secs,
            max_secs,
            jitter,
        }
    }

    /// Upper bound of the delay after `failures` consecutive failures:
    /// `min(base * 2^failures, max)`, zero when nothing has failed.
    pub fn capped(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let exponent = failures.min(63) as i32;
        let raw = self.base_secs * 2f64.powi(exponent);
        secs(raw.min(self.max_secs))
    }

    /// Delay to apply after `failures` consecutive failures. With jitter
    /// the delay is uniform in `[0, capped]`.
    pub fn calculate(&self, failures: u32) -> Duration {
        let cap = self.capped(failures);
        if !self.jitter || cap.is_zero() {
            return cap;
        }
        let jittered = rand::thread_rng().gen_range(0.0..=cap.as_secs_f64());
        secs(jittered)
    }
}

/// Mutable bookkeeping of one endpoint.
#[derive(Debug, Clone)]
pub struct RateLimiterState {
    pub requests_this_window: u32,
    pub window_start: Instant,
    pub consecutive_failures: u32,
    pub last_failure_time: Option<Instant>,
    /// Non-critical requests are rejected until this instant.
    pub backoff_until: Option<Instant>,
    pub remote_remaining: Option<i64>,
    pub remote_reset: Option<Instant>,
}

impl RateLimiterState {
    fn new(now: Instant) -> Self {
        Self {
            requests_this_window: 0,
            window_start: now,
            consecutive_failures: 0,
            last_failure_time: None,
            backoff_until: None,
            remote_remaining: None,
            remote_reset: None,
        }
    }
}

/// When an upstream quota resets, as reported in a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteReset {
    /// Unix timestamp in seconds.
    At(i64),
    /// Relative to when the header was read.
    After(Duration),
}

impl RemoteReset {
    /// Time left until the reset, given the current unix time.
    pub fn remaining(&self, now_epoch_secs: i64) -> Duration {
        match *self {
            Self::At(ts) => Duration::from_secs(ts.saturating_sub(now_epoch_secs).max(0) as u64),
            Self::After(d) => d,
        }
    }
}

/// Quota information extracted from upstream response headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteQuota {
    pub remaining: Option<i64>,
    pub reset: Option<RemoteReset>,
    pub retry_after: Option<Duration>,
}

impl RemoteQuota {
    pub fn is_empty(&self) -> bool {
        self.remaining.is_none() && self.reset.is_none() && self.retry_after.is_none()
    }
}

/// Parse `x-ratelimit-remaining`, `x-ratelimit-reset` and `Retry-After`.
///
/// A reset value above 1e9 is a unix timestamp; smaller values are seconds
/// from now. Unparseable values are skipped.
pub fn parse_remote_headers(headers: &reqwest::header::HeaderMap) -> RemoteQuota {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim);

    let remaining = header("x-ratelimit-remaining").and_then(|v| v.parse::<i64>().ok());

    let reset = header("x-ratelimit-reset")
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| {
            if v > 1e9 {
                RemoteReset::At(v as i64)
            } else {
                RemoteReset::After(secs(v))
            }
        });

    let retry_after = header("retry-after").and_then(|v| {
        if let Ok(n) = v.parse::<u64>() {
            return Some(Duration::from_secs(n));
        }
        // Fractional seconds, optionally suffixed ("1.5", "0.5s").
        v.strip_suffix('s')
            .unwrap_or(v)
            .parse::<f64>()
            .ok()
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(secs)
    });

    RemoteQuota {
        remaining,
        reset,
        retry_after,
    }
}

enum Decision {
    Proceed,
    Reject,
    Wait(Duration),
}

/// Rate limiter for a single endpoint.
///
/// State lives behind a synchronous mutex that is never held across an
/// await; waits happen after the lock is released and re-check on wake.
pub struct AdaptiveRateLimiter {
    endpoint: String,
    limit: EndpointLimit,
    backoff: ExponentialBackoff,
    max_wait: Duration,
    reset_horizon: Duration,
    state: Mutex<RateLimiterState>,
}

impl AdaptiveRateLimiter {
    pub fn new(endpoint: impl Into<String>, limit: EndpointLimit, config: &RateLimitsConfig) -> Self {
        let backoff = ExponentialBackoff::new(
            limit.base_backoff_secs,
            limit.max_backoff_secs,
            config.jitter,
        );
        Self {
            endpoint: endpoint.into(),
            limit,
            backoff,
            max_wait: Duration::from_secs(config.max_wait_secs),
            reset_horizon: Duration::from_secs(config.reset_horizon_secs),
            state: Mutex::new(RateLimiterState::new(Instant::now())),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn limit(&self) -> &EndpointLimit {
        &self.limit
    }

    pub fn backoff(&self) -> &ExponentialBackoff {
        &self.backoff
    }

    /// Copy of the current state.
    pub fn state(&self) -> RateLimiterState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, RateLimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remaining backoff, if the endpoint is backing off right now.
    pub fn backoff_remaining(&self) -> Option<Duration> {
        let now = Instant::now();
        self.lock()
            .backoff_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Ask to send one request.
    ///
    /// `Ok(false)` means "not now" and is routine backpressure. Critical
    /// requests wait out a full local window, critical and high requests
    /// wait out an exhausted upstream quota, and any wait past the ceiling
    /// fails with [`RateLimitError::WaitExceeded`].
    pub async fn acquire(&self, priority: RequestPriority) -> Result<bool, RateLimitError> {
        let mut waited = Duration::ZERO;
        loop {
            match self.decide(priority, Instant::now()) {
                Decision::Proceed => return Ok(true),
                Decision::Reject => return Ok(false),
                Decision::Wait(wait) => {
                    if waited + wait > self.max_wait {
                        return Err(RateLimitError::WaitExceeded {
                            endpoint: self.endpoint.clone(),
                            wait_secs: (waited + wait).as_secs_f64().ceil() as u64,
                        });
                    }
                    info!(
                        endpoint = %self.endpoint,
                        ?priority,
                        wait_ms = wait.as_millis() as u64,
                        "Waiting for rate limit window"
                    );
                    tokio::time::sleep(wait).await;
                    waited += wait;
                }
            }
        }
    }

    fn decide(&self, priority: RequestPriority, now: Instant) -> Decision {
        let mut state = self.lock();

        if let Some(until) = state.backoff_until
            && now < until
            && priority != RequestPriority::Critical
        {
            debug!(
                endpoint = %self.endpoint,
                ?priority,
                remaining_ms = (until - now).as_millis() as u64,
                "Rejected during backoff"
            );
            return Decision::Reject;
        }

        let window = self.limit.window();
        if now.duration_since(state.window_start) >= window {
            state.requests_this_window = 0;
            state.window_start = now;
        }

        if let Some(remaining) = state.remote_remaining
            && remaining <= 0
        {
            let reset = state.remote_reset;
            match reset {
                Some(reset) if now < reset => {
                    return match priority {
                        RequestPriority::Critical | RequestPriority::High => {
                            Decision::Wait(reset - now)
                        }
                        _ => {
                            debug!(endpoint = %self.endpoint, ?priority, "Upstream quota exhausted");
                            Decision::Reject
                        }
                    };
                }
                Some(_) => {
                    // Quota has reset; go back to local estimation.
                    state.remote_remaining = None;
                    state.remote_reset = None;
                }
                None => {}
            }
        }

        if state.requests_this_window >= self.limit.requests_per_window {
            let elapsed = now.duration_since(state.window_start);
            let wait = window.saturating_sub(elapsed);
            if priority == RequestPriority::Critical {
                return Decision::Wait(wait);
            }
            debug!(
                endpoint = %self.endpoint,
                ?priority,
                until_reset_ms = wait.as_millis() as u64,
                "Local window exhausted"
            );
            return Decision::Reject;
        }

        state.requests_this_window += 1;
        if let Some(remaining) = state.remote_remaining.as_mut() {
            *remaining -= 1;
        }
        Decision::Proceed
    }

    /// A request succeeded; clears the failure streak and any backoff.
    pub fn record_success(&self) {
        let mut state = self.lock();
        if state.consecutive_failures > 0 {
            debug!(endpoint = %self.endpoint, "Recovered from failures");
        }
        state.consecutive_failures = 0;
        state.last_failure_time = None;
        state.backoff_until = None;
    }

    /// A request failed. Every failure extends the backoff; `is_rate_limit`
    /// only raises the log level.
    pub fn record_failure(&self, is_rate_limit: bool) {
        self.fail(is_rate_limit, None);
    }

    /// A request was rate limited and the upstream asked for `retry_after`.
    /// The backoff lasts at least that long.
    pub fn record_rate_limited(&self, retry_after: Option<Duration>) {
        self.fail(true, retry_after);
    }

    fn fail(&self, is_rate_limit: bool, retry_after: Option<Duration>) {
        let now = Instant::now();
        let mut state = self.lock();
        state.consecutive_failures += 1;
        state.last_failure_time = Some(now);

        let mut delay = self.backoff.calculate(state.consecutive_failures);
        if let Some(hint) = retry_after.filter(|d| *d <= self.reset_horizon) {
            delay = delay.max(hint);
        }
        let until = now + delay;
        state.backoff_until = Some(state.backoff_until.map_or(until, |u| u.max(until)));

        let failures = state.consecutive_failures;
        let backoff_ms = delay.as_millis() as u64;
        if is_rate_limit {
            warn!(endpoint = %self.endpoint, failures, backoff_ms, "Rate limit failure, backing off");
        } else {
            debug!(endpoint = %self.endpoint, failures, backoff_ms, "Request failed, backing off");
        }
    }

    /// Apply upstream quota headers.
    pub fn update_from_remote_headers(&self, headers: &reqwest::header::HeaderMap) {
        let quota = parse_remote_headers(headers);
        if !quota.is_empty() {
            self.update_from_remote(&quota, chrono::Utc::now().timestamp());
        }
    }

    /// Apply upstream quota information. A reset beyond the horizon is
    /// dropped and the local window keeps governing.
    pub fn update_from_remote(&self, quota: &RemoteQuota, now_epoch_secs: i64) {
        let now = Instant::now();
        let mut state = self.lock();

        if let Some(remaining) = quota.remaining {
            state.remote_remaining = Some(remaining);
        }
        if let Some(reset) = quota.reset {
            let wait = reset.remaining(now_epoch_secs);
            if wait > self.reset_horizon {
                warn!(
                    endpoint = %self.endpoint,
                    reset_secs = wait.as_secs(),
                    "Ignoring implausible upstream reset time"
                );
                state.remote_reset = None;
            } else {
                state.remote_reset = Some(now + wait);
            }
        }
        if let Some(retry_after) = quota.retry_after
            && retry_after <= self.reset_horizon
        {
            let until = now + retry_after;
            state.backoff_until = Some(state.backoff_until.map_or(until, |u| u.max(until)));
        }
    }
}

/// Failure reported by an operation run through [`RateLimiterRegistry::execute`].
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError<E> {
    /// The upstream said "slow down". Retried after backoff.
    #[error("rate limited by upstream")]
    RateLimited { retry_after: Option<Duration> },
    /// Anything else. Recorded and returned without retrying.
    #[error("{0}")]
    Other(E),
}

/// Outcome of a failed [`RateLimiterRegistry::execute`].
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError<E> {
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),
    #[error("{0}")]
    Operation(E),
}

/// Lazily created limiters, one per endpoint name.
pub struct RateLimiterRegistry {
    config: RateLimitsConfig,
    limiters: Mutex<HashMap<String, Arc<AdaptiveRateLimiter>>>,
}

impl RateLimiterRegistry {
    pub fn new(config: RateLimitsConfig) -> Self {
        Self {
            config,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &RateLimitsConfig {
        &self.config
    }

    fn limiters(&self) -> MutexGuard<'_, HashMap<String, Arc<AdaptiveRateLimiter>>> {
        self.limiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The limiter for `endpoint`, created on first use.
    pub fn limiter(&self, endpoint: &str) -> Arc<AdaptiveRateLimiter> {
        self.limiters()
            .entry(endpoint.to_string())
            .or_insert_with(|| {
                Arc::new(AdaptiveRateLimiter::new(
                    endpoint,
                    self.config.limit_for(endpoint),
                    &self.config,
                ))
            })
            .clone()
    }

    /// Replace the limiter for `endpoint`, discarding its state.
    pub fn register(&self, endpoint: &str, limit: EndpointLimit) -> Arc<AdaptiveRateLimiter> {
        let limiter = Arc::new(AdaptiveRateLimiter::new(endpoint, limit, &self.config));
        self.limiters()
            .insert(endpoint.to_string(), limiter.clone());
        limiter
    }

    /// Endpoints that have been used so far, sorted.
    pub fn endpoints(&self) -> Vec<String> {
        let mut names: Vec<String> = self.limiters().keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn acquire(
        &self,
        endpoint: &str,
        priority: RequestPriority,
    ) -> Result<bool, RateLimitError> {
        self.limiter(endpoint).acquire(priority).await
    }

    pub fn record_success(&self, endpoint: &str) {
        self.limiter(endpoint).record_success();
    }

    pub fn record_failure(&self, endpoint: &str, is_rate_limit: bool) {
        self.limiter(endpoint).record_failure(is_rate_limit);
    }

    pub fn update_from_remote_headers(&self, endpoint: &str, headers: &reqwest::header::HeaderMap) {
        self.limiter(endpoint).update_from_remote_headers(headers);
    }

    /// Run `operation` under the endpoint's limiter.
    ///
    /// Rejected acquires and upstream rate limits are retried after backoff
    /// up to the endpoint's `max_retries`. Other failures are recorded and
    /// returned at once. A critical caller never sleeps past the wait
    /// ceiling; it gets [`RateLimitError::WaitExceeded`] instead.
    pub async fn execute<F, Fut, T, E>(
        &self,
        endpoint: &str,
        priority: RequestPriority,
        operation: F,
    ) -> Result<T, ExecuteError<E>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError<E>>>,
    {
        let limiter = self.limiter(endpoint);
        let max_retries = limiter.limit().max_retries;
        let max_wait = Duration::from_secs(self.config.max_wait_secs);

        for attempt in 0..=max_retries {
            let last = attempt == max_retries;

            if !limiter.acquire(priority).await? {
                if last {
                    return Err(RateLimitError::RetriesExhausted {
                        endpoint: endpoint.to_string(),
                        attempts: attempt + 1,
                    }
                    .into());
                }
                let wait = retry_delay(&limiter, attempt, None);
                check_ceiling(endpoint, priority, wait, max_wait)?;
                debug!(
                    endpoint,
                    attempt = attempt + 1,
                    wait_ms = wait.as_millis() as u64,
                    "Acquire rejected, retrying"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            match operation().await {
                Ok(value) => {
                    limiter.record_success();
                    return Ok(value);
                }
                Err(UpstreamError::RateLimited { retry_after }) => {
                    limiter.record_rate_limited(retry_after);
                    let wait = retry_delay(&limiter, attempt, retry_after);
                    if last {
                        return Err(RateLimitError::Upstream {
                            endpoint: endpoint.to_string(),
                            retry_after_secs: wait.as_secs_f64().ceil() as u64,
                        }
                        .into());
                    }
                    check_ceiling(endpoint, priority, wait, max_wait)?;
                    warn!(
                        endpoint,
                        attempt = attempt + 1,
                        max = max_retries,
                        backoff_ms = wait.as_millis() as u64,
                        "Retrying after upstream rate limit"
                    );
                    tokio::time::sleep(wait).await;
                }
                Err(UpstreamError::Other(e)) => {
                    limiter.record_failure(false);
                    return Err(ExecuteError::Operation(e));
                }
            }
        }

        Err(RateLimitError::RetriesExhausted {
            endpoint: endpoint.to_string(),
            attempts: max_retries + 1,
        }
        .into())
    }
}

/// How long `execute` sleeps before retry number `attempt + 1`.
fn retry_delay(limiter: &AdaptiveRateLimiter, attempt: u32, hint: Option<Duration>) -> Duration {
    let mut wait = limiter.backoff().calculate(attempt + 1);
    if let Some(remaining) = limiter.backoff_remaining() {
        wait = wait.max(remaining);
    }
    if let Some(hint) = hint {
        wait = wait.max(hint);
    }
    wait
}

fn check_ceiling(
    endpoint: &str,
    priority: RequestPriority,
    wait: Duration,
    max_wait: Duration,
) -> Result<(), RateLimitError> {
    if priority == RequestPriority::Critical && wait > max_wait {
        return Err(RateLimitError::WaitExceeded {
            endpoint: endpoint.to_string(),
            wait_secs: wait.as_secs_f64().ceil() as u64,
        });
    }
    Ok(())
}
