// Provider Resilience
// Shared rate limiters and circuit breakers for external providers

use crate::services::config_store::{AppConfig, CircuitBreakerConfig, RateLimitConfig};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as DirectRateLimiter};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, info, warn};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ============ Rate Limiter ============

type IntervalGate = DirectRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Bounds in-flight calls and spaces call starts by a fixed interval.
pub struct RateLimiter {
    name: String,
    semaphore: Semaphore,
    // None when the interval is zero
    interval: Option<IntervalGate>,
    calls: AtomicU64,
}

/// Held for the duration of one call; releases the concurrency slot on drop.
pub struct RatePermit<'a> {
    _permit: Option<SemaphorePermit<'a>>,
}

impl RateLimiter {
    pub fn new(name: &str, max_concurrency: usize, min_interval: Duration) -> Self {
        Self {
            name: name.to_string(),
            semaphore: Semaphore::new(max_concurrency.max(1)),
            interval: Quota::with_period(min_interval).map(DirectRateLimiter::direct),
            calls: AtomicU64::new(0),
        }
    }

    pub fn from_config(name: &str, cfg: &RateLimitConfig) -> Self {
        Self::new(name, cfg.max_concurrency, cfg.min_interval())
    }

    /// Wait for a concurrency slot, then for the next free start time.
    ///
    /// Dropping the returned future while it waits gives up nothing: the
    /// interval cell is only taken once the wait is over.
    pub async fn acquire(&self) -> RatePermit<'_> {
        // the semaphore is never closed, so an error only drops the bound
        let permit = self.semaphore.acquire().await.ok();

        if let Some(gate) = &self.interval {
            if gate.check().is_err() {
                debug!("[rate_limiter] {} waiting for next interval", self.name);
                gate.until_ready().await;
            }
        }

        self.calls.fetch_add(1, Ordering::Relaxed);
        RatePermit { _permit: permit }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }
}

// ============ Circuit Breaker ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default)]
struct BreakerInner {
    failures: VecDeque<Instant>,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Opens after `threshold` consecutive failures inside `window`; after
/// `cooldown` lets one trial call through and closes again on its success.
pub struct CircuitBreaker {
    name: String,
    threshold: u32,
    window: Duration,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
    skipped: AtomicU64,
}

/// Permission for one call. Settle it with [`BreakerPermit::record_success`]
/// or [`BreakerPermit::record_failure`]; dropping it unsettled (the call was
/// cancelled) leaves the breaker as it was and frees the half-open slot.
#[must_use = "settle the permit with the call's outcome"]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    /// True when this call is the single half-open trial.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success();
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.trial);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.trial && !self.settled {
            lock(&self.breaker.inner).trial_in_flight = false;
            debug!("[circuit_breaker] {} trial call abandoned", self.breaker.name);
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: &str, threshold: u32, window: Duration, cooldown: Duration) -> Self {
        Self {
            name: name.to_string(),
            threshold: threshold.max(1),
            window,
            cooldown,
            inner: Mutex::new(BreakerInner::default()),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn from_config(name: &str, cfg: &CircuitBreakerConfig) -> Self {
        Self::new(
            name,
            cfg.failure_threshold,
            Duration::from_secs(cfg.window_secs),
            Duration::from_secs(cfg.cooldown_secs),
        )
    }

    /// A permit when a call may go out now, `None` (counted as a skip) otherwise.
    pub fn try_acquire(&self) -> Option<BreakerPermit<'_>> {
        let mut inner = lock(&self.inner);
        let trial = match inner.opened_at {
            None => false,
            Some(opened_at) if opened_at.elapsed() >= self.cooldown && !inner.trial_in_flight => {
                inner.trial_in_flight = true;
                info!("[circuit_breaker] {} half-open, sending trial call", self.name);
                true
            }
            Some(_) => {
                drop(inner);
                self.skipped.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };
        Some(BreakerPermit {
            breaker: self,
            trial,
            settled: false,
        })
    }

    fn on_success(&self) {
        let mut inner = lock(&self.inner);
        if inner.opened_at.is_some() {
            info!("[circuit_breaker] {} closed after successful trial call", self.name);
        }
        inner.failures.clear();
        inner.opened_at = None;
        inner.trial_in_flight = false;
    }

    fn on_failure(&self, trial: bool) {
        let mut inner = lock(&self.inner);
        let now = Instant::now();

        if trial {
            inner.trial_in_flight = false;
            inner.opened_at = Some(now);
            inner.failures.clear();
            warn!("[circuit_breaker] {} trial call failed, re-opened", self.name);
            return;
        }

        inner.failures.push_back(now);
        while let Some(&oldest) = inner.failures.front() {
            if now.duration_since(oldest) > self.window {
                inner.failures.pop_front();
            } else {
                break;
            }
        }

        if inner.failures.len() as u32 >= self.threshold {
            inner.opened_at = Some(now);
            inner.failures.clear();
            warn!(
                "[circuit_breaker] {} opened after {} consecutive failures, cooldown {}s",
                self.name,
                self.threshold,
                self.cooldown.as_secs()
            );
        }
    }

    pub fn state(&self) -> BreakerState {
        let inner = lock(&self.inner);
        match inner.opened_at {
            None => BreakerState::Closed,
            Some(_) if inner.trial_in_flight => BreakerState::HalfOpen,
            Some(t) if t.elapsed() >= self.cooldown => BreakerState::HalfOpen,
            Some(_) => BreakerState::Open,
        }
    }

    /// Calls refused while open.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

// ============ Gates ============

/// Limiter plus breaker for one external provider.
pub struct ProviderGate {
    pub limiter: RateLimiter,
    pub breaker: CircuitBreaker,
}

impl ProviderGate {
    pub fn new(limiter: RateLimiter, breaker: CircuitBreaker) -> Self {
        Self { limiter, breaker }
    }
}

/// Process-wide provider state, injected into the orchestrator and batcher.
pub struct ProviderGates {
    pub primary: Arc<ProviderGate>,
    pub secondary: Arc<ProviderGate>,
    pub translation: Arc<RateLimiter>,
}

impl ProviderGates {
    pub fn from_config(config: &AppConfig) -> Self {
        let simp = &config.simplification;
        Self {
            primary: Arc::new(ProviderGate::new(
                RateLimiter::from_config("primary", &simp.rate_limit),
                CircuitBreaker::from_config("primary", &simp.circuit_breaker),
            )),
            secondary: Arc::new(ProviderGate::new(
                RateLimiter::from_config("secondary", &simp.rate_limit),
                CircuitBreaker::from_config("secondary", &simp.circuit_breaker),
            )),
            translation: Arc::new(RateLimiter::from_config(
                "translation",
                &config.translation.rate_limit,
            )),
        }
    }
}
