//! Plan catalog with fallback to the built-in plan table.
//!
//! [`FallbackCatalog`] wraps a [`Store`] and never fails: when storage errors
//! (or the circuit breaker is open) the answer comes from
//! [`socialgrow_core::fallback_plans`] and is marked [`CatalogSource::MockData`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use socialgrow_core::{fallback_plan, fallback_plan_by_slug, fallback_plans, Plan, PlanId};

use crate::Store;

/// Consecutive storage failures that open the breaker.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// How long an open breaker short-circuits storage.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Where a catalog answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSource {
    /// Read from storage.
    Database,
    /// Built-in plan table.
    MockData,
}

/// Active plans plus their provenance.
#[derive(Debug, Clone)]
pub struct CatalogListing {
    /// Plans ordered by ascending monthly price.
    pub plans: Vec<Plan>,
    /// Where the plans came from.
    pub source: CatalogSource,
}

impl CatalogListing {
    /// Whether storage was bypassed.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.source == CatalogSource::MockData
    }
}

// ============================================================================
// Circuit breaker
// ============================================================================

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
    probing: bool,
}

/// Consecutive-failure circuit breaker.
///
/// Closed: calls pass. After `failure_threshold` consecutive failures it
/// opens for `cooldown`; once that elapses a single probe call is let
/// through. A successful probe closes the breaker, a failed one reopens it.
/// A probe whose [`BreakerPermit`] is dropped without an outcome frees the
/// slot for the next caller.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(DEFAULT_FAILURE_THRESHOLD, DEFAULT_COOLDOWN)
    }
}

impl CircuitBreaker {
    /// Create a breaker.
    #[must_use]
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A permit to call storage now, or `None` while the breaker is open or
    /// another probe is in flight.
    #[must_use]
    pub fn allow(&self) -> Option<BreakerPermit<'_>> {
        let mut state = self.lock();
        let probe = match state.open_until {
            None => false,
            Some(until) if Instant::now() < until => return None,
            Some(_) if state.probing => return None,
            Some(_) => {
                state.probing = true;
                true
            }
        };
        Some(BreakerPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    /// Record a successful storage call.
    pub fn record_success(&self) {
        let mut state = self.lock();
        if state.open_until.is_some() {
            tracing::info!("Catalog storage recovered, closing circuit breaker");
        }
        *state = BreakerState::default();
    }

    /// Record a failed storage call.
    pub fn record_failure(&self) {
        let mut state = self.lock();
        state.consecutive_failures += 1;
        if state.probing || state.consecutive_failures >= self.failure_threshold {
            state.open_until = Some(Instant::now() + self.cooldown);
            state.probing = false;
            tracing::warn!(
                failures = state.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "Catalog circuit breaker opened"
            );
        }
    }

    /// Whether the breaker is currently short-circuiting calls.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock()
            .open_until
            .is_some_and(|until| Instant::now() < until)
    }
}

/// Permission for one storage call, handed out by [`CircuitBreaker::allow`].
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl BreakerPermit<'_> {
    /// The call succeeded.
    pub fn succeed(mut self) {
        self.settled = true;
        self.breaker.record_success();
    }

    /// The call failed.
    pub fn fail(mut self) {
        self.settled = true;
        self.breaker.record_failure();
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            tracing::debug!("Catalog probe abandoned, releasing probe slot");
            self.breaker.lock().probing = false;
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Read-only plan catalog that degrades to the built-in table.
pub struct FallbackCatalog {
    store: Arc<dyn Store>,
    breaker: CircuitBreaker,
}

impl FallbackCatalog {
    /// Wrap a store with the default breaker settings.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_breaker(store, CircuitBreaker::default())
    }

    /// Wrap a store with a custom breaker.
    #[must_use]
    pub fn with_breaker(store: Arc<dyn Store>, breaker: CircuitBreaker) -> Self {
        Self { store, breaker }
    }

    /// The breaker guarding storage.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Active plans, from storage when healthy.
    pub async fn list_active_plans(&self) -> CatalogListing {
        if let Some(permit) = self.breaker.allow() {
            match self.store.list_active_plans().await {
                Ok(plans) => {
                    permit.succeed();
                    return CatalogListing {
                        plans,
                        source: CatalogSource::Database,
                    };
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Plan storage failed, serving fallback plans");
                    permit.fail();
                }
            }
        } else {
            tracing::debug!("Catalog breaker open, serving fallback plans");
        }

        CatalogListing {
            plans: fallback_plans(),
            source: CatalogSource::MockData,
        }
    }

    /// Resolve a plan by id, falling back to the built-in table when storage
    /// fails or has no such row.
    pub async fn resolve_plan(&self, plan_id: &PlanId) -> Option<Plan> {
        if let Some(permit) = self.breaker.allow() {
            match self.store.get_plan(plan_id).await {
                Ok(Some(plan)) => {
                    permit.succeed();
                    return Some(plan);
                }
                Ok(None) => permit.succeed(),
                Err(e) => {
                    tracing::warn!(
                        plan_id = %plan_id,
                        error = %e,
                        "Plan lookup failed, trying fallback table"
                    );
                    permit.fail();
                }
            }
        }
        fallback_plan(plan_id)
    }

    /// Resolve an active plan by slug, with the same fallback as
    /// [`resolve_plan`](Self::resolve_plan).
    pub async fn resolve_plan_by_slug(&self, slug: &str) -> Option<Plan> {
        if let Some(permit) = self.breaker.allow() {
            match self.store.get_plan_by_slug(slug).await {
                Ok(Some(plan)) => {
                    permit.succeed();
                    return Some(plan);
                }
                Ok(None) => permit.succeed(),
                Err(e) => {
                    tracing::warn!(
                        slug = %slug,
                        error = %e,
                        "Plan lookup failed, trying fallback table"
                    );
                    permit.fail();
                }
            }
        }
        fallback_plan_by_slug(slug)
    }
}
