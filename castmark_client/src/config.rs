use castmark::lookup::{NeynarClient, MAX_LOOKUP_ATTEMPTS};
use castmark::collection::SupabaseCollectionStore;
use castmark::store::SupabaseBookmarkStore;
use castmark::KnownDomains;
use tracing::warn;

use crate::infrastructure::error::{invalid_input, Error, ErrorKind};

/// Lookups running at once when importing a file
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Settings read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct Config {
    pub neynar_api_key: Option<String>,
    pub neynar_api_url: Option<String>,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub known_domains: KnownDomains,
    pub max_lookup_attempts: usize,
    pub concurrency: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, Error> {
        Self::from_vars(|var| dotenvy::var(var).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let var = |name: &str| var(name).filter(|value| !value.trim().is_empty());

        let known_domains = match var("CASTMARK_KNOWN_DOMAINS") {
            Some(domains) => domains.parse::<KnownDomains>()?,
            None => KnownDomains::default(),
        };

        let max_lookup_attempts = match var("CASTMARK_MAX_LOOKUP_ATTEMPTS") {
            Some(attempts) => attempts.trim().parse::<usize>().map_err(|_| {
                invalid_input(format!(
                    "CASTMARK_MAX_LOOKUP_ATTEMPTS must be a number, got `{}`",
                    attempts
                ))
            })?,
            None => MAX_LOOKUP_ATTEMPTS,
        }
        .clamp(1, MAX_LOOKUP_ATTEMPTS);

        let concurrency = match var("CASTMARK_CONCURRENCY") {
            Some(concurrency) => concurrency.trim().parse::<usize>().map_err(|_| {
                invalid_input(format!(
                    "CASTMARK_CONCURRENCY must be a number, got `{}`",
                    concurrency
                ))
            })?,
            None => DEFAULT_CONCURRENCY,
        }
        .max(1);

        Ok(Config {
            neynar_api_key: var("NEYNAR_API_KEY"),
            neynar_api_url: var("NEYNAR_API_URL"),
            supabase_url: var("SUPABASE_URL"),
            supabase_key: var("SUPABASE_KEY"),
            known_domains,
            max_lookup_attempts,
            concurrency,
        })
    }

    pub fn neynar(&self) -> Result<NeynarClient, Error> {
        let api_key = self
            .neynar_api_key
            .clone()
            .ok_or_else(|| ErrorKind::EnvVarMissing("NEYNAR_API_KEY".to_string()))?;

        let client = NeynarClient::new(api_key)?;
        Ok(match &self.neynar_api_url {
            Some(url) => client.with_base_url(url.as_str()),
            None => client,
        })
    }

    pub fn supabase(&self) -> Result<SupabaseBookmarkStore, Error> {
        let (url, key) = self.supabase_project()?;
        Ok(SupabaseBookmarkStore::new(url, key)?)
    }

    pub fn supabase_collections(&self) -> Result<SupabaseCollectionStore, Error> {
        let (url, key) = self.supabase_project()?;
        Ok(SupabaseCollectionStore::new(url, key)?)
    }

    fn supabase_project(&self) -> Result<(&str, &str), Error> {
        match (&self.supabase_url, &self.supabase_key) {
            (Some(url), Some(key)) => Ok((url.as_str(), key.as_str())),
            (None, _) => Err(ErrorKind::EnvVarMissing("SUPABASE_URL".to_string())),
            (_, None) => Err(ErrorKind::EnvVarMissing("SUPABASE_KEY".to_string())),
        }
    }
}

/// Warns about every variable in `vars` that is unset
///
/// All missing variables are reported before failing.
pub fn check_env_vars(vars: &[&str]) -> Result<(), Error> {
    let missing: Vec<&str> = vars
        .iter()
        .copied()
        .filter(|var| {
            dotenvy::var(var)
                .ok()
                .filter(|value| !value.trim().is_empty())
                .is_none()
        })
        .collect();

    for var in &missing {
        warn!("Variable `{}` missing in dotenvy", var);
    }

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ErrorKind::EnvVarMissing(missing.join(", ")))
    }
}
