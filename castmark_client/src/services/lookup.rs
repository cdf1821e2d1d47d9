use crate::infrastructure::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use castmark::cast::Cast;
use castmark::lookup::{CastLookup, LookupStrategy};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

/// Cast lookup with concurrency control and a circuit breaker
///
/// Wraps any [`CastLookup`] so that batch imports never run more than the
/// semaphore allows against the content service, and stop calling it once
/// the breaker opens. A rejected call surfaces as
/// [`castmark::Error::ServiceUnavailable`], which ends the lookup plan
/// without trying the remaining strategies.
#[derive(Debug, Clone)]
pub struct GuardedLookup<L> {
    inner: L,
    breaker: Arc<CircuitBreaker>,
    semaphore: Arc<Semaphore>,
}

impl<L> GuardedLookup<L> {
    pub fn new(inner: L, breaker: Arc<CircuitBreaker>, semaphore: Arc<Semaphore>) -> Self {
        Self {
            inner,
            breaker,
            semaphore,
        }
    }

    fn unavailable(&self) -> castmark::Error {
        castmark::Error::ServiceUnavailable {
            service: self.breaker.name().to_string(),
        }
    }
}

impl<L> CastLookup for GuardedLookup<L>
where
    L: CastLookup + Sync,
{
    #[instrument(skip(self), fields(service = %self.breaker.name()))]
    async fn lookup(&self, strategy: &LookupStrategy) -> Result<Cast, castmark::Error> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| self.unavailable())?;
        debug!(%strategy, "Looking up cast");

        match self.breaker.call(self.inner.lookup(strategy)).await {
            Ok(cast) => Ok(cast),
            Err(CircuitBreakerError::Open) => {
                warn!(%strategy, "Lookup rejected, circuit breaker is open");
                Err(self.unavailable())
            }
            Err(CircuitBreakerError::Failed(err)) => Err(err),
        }
    }
}
