use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use tracing::{info, instrument, warn};

use crate::cast::{Cast, CastResponse};
use crate::domains::KnownDomains;
use crate::reference::CastReference;
use crate::{check_status, http_client, Error};

/// Upper bound on lookups performed for a single reference
pub const MAX_LOOKUP_ATTEMPTS: usize = 3;

/// Default base URL of the Neynar API
pub const NEYNAR_API_URL: &str = "https://api.neynar.com";

/// One way of asking the content service for a cast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupStrategy {
    /// Look up by content hash
    ByHash(String),
    /// Look up by a client URL pointing at the cast
    ByUrl(String),
}

impl LookupStrategy {
    /// The identifier sent to the content service
    pub fn identifier(&self) -> &str {
        match self {
            LookupStrategy::ByHash(hash) => hash,
            LookupStrategy::ByUrl(url) => url,
        }
    }

    /// The identifier type understood by the content service
    pub fn identifier_type(&self) -> &'static str {
        match self {
            LookupStrategy::ByHash(_) => "hash",
            LookupStrategy::ByUrl(_) => "url",
        }
    }
}

impl Display for LookupStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.identifier_type(), self.identifier())
    }
}

/// Ordered lookup strategies for one cast reference
#[derive(Debug, Clone)]
pub struct LookupPlan {
    identifier: String,
    strategies: Vec<LookupStrategy>,
    min_delay: Duration,
}

impl LookupPlan {
    /// Builds the plan for a resolved reference
    ///
    /// Hash lookup comes first, then the URL the reference was resolved
    /// from, then the cast URL on the primary client domain. Duplicate
    /// strategies are dropped and the plan never exceeds
    /// [`MAX_LOOKUP_ATTEMPTS`].
    pub fn for_reference(
        reference: &CastReference,
        domains: &KnownDomains,
    ) -> Self {
        let mut strategies =
            vec![LookupStrategy::ByHash(reference.canonical_id.clone())];

        let fallback_urls = reference
            .canonical_url
            .iter()
            .cloned()
            .chain(std::iter::once(domains.cast_url(&reference.canonical_id)));

        for url in fallback_urls {
            let strategy = LookupStrategy::ByUrl(url);
            if !strategies.contains(&strategy) {
                strategies.push(strategy);
            }
        }

        strategies.truncate(MAX_LOOKUP_ATTEMPTS);

        LookupPlan {
            identifier: reference.canonical_id.clone(),
            strategies,
            min_delay: Duration::from_millis(250),
        }
    }

    /// Limits the plan to fewer attempts, clamped to `1..=MAX_LOOKUP_ATTEMPTS`
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.strategies
            .truncate(attempts.clamp(1, MAX_LOOKUP_ATTEMPTS));
        self
    }

    /// Sets the delay before the second attempt; later delays grow exponentially
    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// The strategies in the order they will be tried
    pub fn strategies(&self) -> &[LookupStrategy] {
        &self.strategies
    }
}

/// A content service able to fetch casts
pub trait CastLookup {
    /// Performs a single lookup, without retrying
    fn lookup(
        &self,
        strategy: &LookupStrategy,
    ) -> impl Future<Output = Result<Cast, Error>> + Send;
}

/// Runs a lookup plan until a strategy succeeds
///
/// Rejected credentials or an unavailable service stop the plan early since
/// every later strategy would fail the same way.
#[instrument(skip(lookup, plan), fields(identifier = %plan.identifier, strategies = plan.strategies.len()))]
pub async fn lookup_cast<L: CastLookup>(
    lookup: &L,
    plan: &LookupPlan,
) -> Result<Cast, Error> {
    let mut delays = ExponentialBuilder::default()
        .with_min_delay(plan.min_delay)
        .with_max_times(plan.strategies.len())
        .build();
    let mut last_error = None;
    let mut attempts = 0;

    for strategy in &plan.strategies {
        if attempts > 0 {
            if let Some(delay) = delays.next() {
                tokio::time::sleep(delay).await;
            }
        }
        attempts += 1;

        match lookup.lookup(strategy).await {
            Ok(cast) => {
                info!(%strategy, attempt = attempts, "Cast found");
                return Ok(cast);
            }
            Err(err @ (Error::Unauthorized { .. } | Error::ServiceUnavailable { .. })) => {
                warn!(%strategy, error = %err, "Cast lookup stopped");
                return Err(err);
            }
            Err(err) => {
                warn!(%strategy, attempt = attempts, error = %err, "Cast lookup failed");
                last_error = Some(err);
            }
        }
    }

    Err(Error::LookupExhausted {
        identifier: plan.identifier.clone(),
        attempts,
        last: Box::new(last_error.unwrap_or_else(|| Error::NotFound {
            identifier: plan.identifier.clone(),
        })),
    })
}

/// Cast lookup backed by the Neynar API
#[derive(Debug, Clone)]
pub struct NeynarClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NeynarClient {
    /// Creates a client for the public Neynar API
    pub fn new(api_key: impl Into<String>) -> Result<Self, Error> {
        Ok(NeynarClient {
            client: http_client()?,
            base_url: NEYNAR_API_URL.to_string(),
            api_key: api_key.into(),
        })
    }

    /// Points the client at another deployment of the API
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl CastLookup for NeynarClient {
    async fn lookup(&self, strategy: &LookupStrategy) -> Result<Cast, Error> {
        let item = strategy.to_string();

        let response = self
            .client
            .get(format!("{}/v2/farcaster/cast", self.base_url))
            .query(&[
                ("identifier", strategy.identifier()),
                ("type", strategy.identifier_type()),
            ])
            .header("x-api-key", &self.api_key)
            .send()
            .await
            .map_err(|err| Error::FetchError {
                inner: err,
                item: item.clone(),
            })?;

        let body = check_status(response, &item)?
            .text()
            .await
            .map_err(|err| Error::FetchError {
                inner: err,
                item: item.clone(),
            })?;

        Ok(serde_json::from_str::<CastResponse>(&body)?.into_cast())
    }
}
