//! Retry and circuit breaking around a generation client.
//!
//! `ResilientClient` retries rate-limited calls with exponential backoff,
//! preferring the delay the provider suggests ("retry in 12s"), and stops
//! calling a failing provider for a recovery period once failures pile up.
//! Per-call time budgets stay with the caller.

use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmStream};
use planes_core::config::ResilienceConfig;
use planes_core::{AppError, AppResult};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Backoff schedule for rate-limited calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_base: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &ResilienceConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_base: config.backoff_base.max(1.0),
        }
    }

    /// Delay before retrying after the failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32, error: &AppError) -> Duration {
        let delay = match suggested_delay(&error.to_string()) {
            Some(suggested) => suggested,
            None => self
                .initial_delay
                .mul_f64(self.backoff_base.powi(attempt as i32)),
        };
        delay.min(self.max_delay)
    }
}

/// Only quota exhaustion is worth retrying.
fn is_retryable(error: &AppError) -> bool {
    matches!(error, AppError::RateLimited(_))
}

/// Parse a provider hint such as "Please retry in 12.5s".
pub fn suggested_delay(message: &str) -> Option<Duration> {
    let lower = message.to_lowercase();
    let start = lower.find("retry in ")? + "retry in ".len();
    let rest = &lower[start..];
    let digits: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if !rest[digits.len()..].starts_with('s') {
        return None;
    }
    let seconds: f64 = digits.parse().ok()?;
    (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds))
}

/// Observable state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failures: u32,
    opened_at: Option<Instant>,
}

/// Opens after `failure_threshold` consecutive failures and allows a trial
/// call once `recovery` has elapsed. A failed trial reopens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failures: 0,
                opened_at: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Admit a call, or fail fast while the circuit is open.
    pub fn acquire(&self) -> AppResult<()> {
        let mut inner = self.lock();
        if inner.state != CircuitState::Open {
            return Ok(());
        }

        let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or(self.recovery);
        if elapsed >= self.recovery {
            tracing::info!("Circuit breaker half-open, allowing a trial call");
            inner.state = CircuitState::HalfOpen;
            return Ok(());
        }

        let remaining = self.recovery - elapsed;
        Err(AppError::Unavailable(format!(
            "Generation provider temporarily unavailable. Try again in {:.1}s",
            remaining.as_secs_f32()
        )))
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            tracing::info!("Circuit breaker closed, provider recovered");
        }
        inner.state = CircuitState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failures += 1;

        let reopen = inner.state == CircuitState::HalfOpen;
        if reopen || inner.failures >= self.failure_threshold {
            if inner.state != CircuitState::Open {
                tracing::error!(
                    failures = inner.failures,
                    threshold = self.failure_threshold,
                    "Circuit breaker opened"
                );
            }
            inner.state = CircuitState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }
}

/// `LlmClient` decorator adding retries and an optional circuit breaker.
pub struct ResilientClient {
    inner: Arc<dyn LlmClient>,
    policy: RetryPolicy,
    breaker: Option<CircuitBreaker>,
}

impl ResilientClient {
    pub fn new(inner: Arc<dyn LlmClient>, policy: RetryPolicy, breaker: Option<CircuitBreaker>) -> Self {
        Self {
            inner,
            policy,
            breaker,
        }
    }

    pub fn from_config(inner: Arc<dyn LlmClient>, config: &ResilienceConfig) -> Self {
        let breaker = config.breaker_enabled.then(|| {
            CircuitBreaker::new(
                config.failure_threshold,
                Duration::from_secs(config.recovery_secs),
            )
        });
        Self::new(inner, RetryPolicy::from_config(config), breaker)
    }

    pub fn breaker_state(&self) -> Option<CircuitState> {
        self.breaker.as_ref().map(CircuitBreaker::state)
    }

    async fn call<T, F, Fut>(&self, operation: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        if let Some(breaker) = &self.breaker {
            breaker.acquire()?;
        }

        let result = self.retry(operation).await;

        if let Some(breaker) = &self.breaker {
            match &result {
                Ok(_) => breaker.record_success(),
                Err(_) => breaker.record_failure(),
            }
        }
        result
    }

    async fn retry<T, F, Fut>(&self, operation: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let mut attempt = 0;
        loop {
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !is_retryable(&error) {
                return Err(error);
            }
            if attempt + 1 >= self.policy.max_attempts {
                tracing::warn!(
                    attempts = self.policy.max_attempts,
                    "Rate limit retries exhausted"
                );
                return Err(error);
            }

            let delay = self.policy.delay_for(attempt, &error);
            tracing::info!(
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Rate limited, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for ResilientClient {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.call(|| self.inner.complete(request)).await
    }

    /// Retries cover opening the stream; a stream that fails midway is not replayed.
    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        self.call(|| self.inner.stream(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LlmUsage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with the scripted errors in order, then succeeds.
    struct FlakyClient {
        failures: Mutex<Vec<AppError>>,
        calls: AtomicUsize,
    }

    impl FlakyClient {
        fn new(failures: Vec<AppError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for FlakyClient {
        fn provider_name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut failures = self.failures.lock().unwrap();
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
            Ok(LlmResponse {
                content: "respuesta".to_string(),
                model: request.model.clone(),
                usage: LlmUsage::new(1, 1),
            })
        }

        async fn stream(&self, _request: &LlmRequest) -> AppResult<LlmStream> {
            Err(AppError::Llm("not scripted".to_string()))
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(20),
            backoff_base: 2.0,
        }
    }

    fn rate_limited() -> AppError {
        AppError::RateLimited("429 RESOURCE_EXHAUSTED".to_string())
    }

    #[test]
    fn test_suggested_delay() {
        assert_eq!(
            suggested_delay("Quota exceeded. Please retry in 12.5s."),
            Some(Duration::from_millis(12_500))
        );
        assert_eq!(
            suggested_delay("OpenAI API error 429 (retry in 3s)"),
            Some(Duration::from_secs(3))
        );
        assert_eq!(suggested_delay("retry in a moment"), None);
        assert_eq!(suggested_delay("retry in 5 minutes"), None);
        assert_eq!(suggested_delay("rate limited"), None);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            backoff_base: 2.0,
        };
        let error = rate_limited();
        assert_eq!(policy.delay_for(0, &error), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1, &error), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, &error), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3, &error), Duration::from_secs(5));

        let hinted = AppError::RateLimited("retry in 52s".to_string());
        assert_eq!(policy.delay_for(0, &hinted), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_retries_rate_limits_until_success() {
        let flaky = Arc::new(FlakyClient::new(vec![rate_limited(), rate_limited()]));
        let client = ResilientClient::new(flaky.clone(), policy(3), None);

        let response = client.complete(&LlmRequest::new("hola", "m")).await.unwrap();
        assert_eq!(response.content, "respuesta");
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_rate_limited() {
        let flaky = Arc::new(FlakyClient::new((0..3).map(|_| rate_limited()).collect()));
        let client = ResilientClient::new(flaky.clone(), policy(2), None);

        let err = client.complete(&LlmRequest::new("hola", "m")).await.unwrap_err();
        assert_eq!(err.kind(), "rate_limited");
        assert_eq!(flaky.calls(), 2);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let flaky = Arc::new(FlakyClient::new(vec![AppError::Llm("boom".to_string())]));
        let client = ResilientClient::new(flaky.clone(), policy(3), None);

        let err = client.complete(&LlmRequest::new("hola", "m")).await.unwrap_err();
        assert_eq!(err.kind(), "llm");
        assert_eq!(flaky.calls(), 1);
    }

    #[tokio::test]
    async fn test_breaker_opens_and_fails_fast() {
        let failures = (0..5).map(|_| AppError::Llm("down".to_string())).collect();
        let flaky = Arc::new(FlakyClient::new(failures));
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        let client = ResilientClient::new(flaky.clone(), policy(1), Some(breaker));
        let request = LlmRequest::new("hola", "m");

        assert!(client.complete(&request).await.is_err());
        assert_eq!(client.breaker_state(), Some(CircuitState::Closed));
        assert!(client.complete(&request).await.is_err());
        assert_eq!(client.breaker_state(), Some(CircuitState::Open));

        let err = client.complete(&request).await.unwrap_err();
        assert_eq!(err.kind(), "unavailable");
        assert_eq!(flaky.calls(), 2);
    }

    #[tokio::test]
    async fn test_breaker_recovers_after_trial_call() {
        let flaky = Arc::new(FlakyClient::new(vec![AppError::Llm("down".to_string())]));
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        let client = ResilientClient::new(flaky.clone(), policy(1), Some(breaker));
        let request = LlmRequest::new("hola", "m");

        assert!(client.complete(&request).await.is_err());
        assert_eq!(client.breaker_state(), Some(CircuitState::Open));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(client.complete(&request).await.is_ok());
        assert_eq!(client.breaker_state(), Some(CircuitState::Closed));
    }

    #[test]
    fn test_failed_trial_reopens() {
        let breaker = CircuitBreaker::new(3, Duration::ZERO);
        for _ in 0..3 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(breaker.acquire().is_ok());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
