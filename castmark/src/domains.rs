//! Allow-list of social-client domains whose URLs may reference a cast
//!
//! The list is configuration: callers supply it (or take the default) and the
//! resolver never compares hosts against literals of its own.

use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Domains recognized when no configuration is supplied.
///
/// The first entry is the primary client, followed by the protocol's own
/// domain and two third-party clients.
pub const DEFAULT_DOMAINS: &[&str] =
    &["warpcast.com", "farcaster.xyz", "far.quest", "fcast.me"];

/// Ordered list of client domains recognized in cast URLs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct KnownDomains {
    domains: Vec<String>,
}

impl KnownDomains {
    /// Builds an allow-list from any sequence of domain names
    ///
    /// Entries are lowercased and stripped of a scheme, a leading dot and any
    /// trailing slash. Empty entries and duplicates are dropped, order is kept.
    pub fn new<I, S>(domains: I) -> Result<Self, crate::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut normalized: Vec<String> = Vec::new();

        for domain in domains {
            let domain = normalize_domain(domain.as_ref());
            if domain.is_empty() || normalized.contains(&domain) {
                continue;
            }
            if domain.contains(['/', ' ', ':']) {
                return Err(crate::Error::ParseError(format!(
                    "Invalid client domain {}",
                    domain
                )));
            }
            normalized.push(domain);
        }

        if normalized.is_empty() {
            return Err(crate::Error::ParseError(
                "At least one client domain is required".to_string(),
            ));
        }

        Ok(KnownDomains {
            domains: normalized,
        })
    }

    /// The primary client domain, used to build fallback cast URLs
    pub fn primary(&self) -> &str {
        &self.domains[0]
    }

    /// Iterates over the configured domains in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.domains.iter().map(String::as_str)
    }

    /// Returns whether a URL host belongs to one of the configured domains
    ///
    /// A host matches a domain exactly or as a subdomain of it, so
    /// `www.warpcast.com` matches `warpcast.com` but `notwarpcast.com` does not.
    pub fn matches_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();

        self.domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Returns whether the text mentions any configured domain
    pub(crate) fn mentioned_in(&self, text: &str) -> bool {
        let text = text.to_ascii_lowercase();
        self.domains.iter().any(|domain| text.contains(domain.as_str()))
    }

    /// Builds the canonical cast URL on the primary domain
    pub fn cast_url(&self, hash: &str) -> String {
        format!("https://{}/~/cast/{}", self.primary(), hash)
    }
}

fn normalize_domain(domain: &str) -> String {
    let domain = domain.trim();
    let domain = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or(domain);

    domain
        .trim_start_matches('.')
        .trim_end_matches('/')
        .to_ascii_lowercase()
}

impl Default for KnownDomains {
    fn default() -> Self {
        KnownDomains {
            domains: DEFAULT_DOMAINS.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl FromStr for KnownDomains {
    type Err = crate::Error;

    /// Parses a comma-separated list, e.g. `warpcast.com,farcaster.xyz`
    fn from_str(list: &str) -> Result<Self, Self::Err> {
        KnownDomains::new(list.split(','))
    }
}

impl TryFrom<Vec<String>> for KnownDomains {
    type Error = crate::Error;

    fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
        KnownDomains::new(value)
    }
}

impl From<KnownDomains> for Vec<String> {
    fn from(value: KnownDomains) -> Self {
        value.domains
    }
}

impl Display for KnownDomains {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.domains.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_primary_domain() {
        let domains = KnownDomains::default();
        assert_eq!(domains.primary(), "warpcast.com");
        assert_eq!(domains.iter().count(), 4);
    }

    #[test]
    fn test_host_matching() {
        let domains = KnownDomains::default();
        assert!(domains.matches_host("warpcast.com"));
        assert!(domains.matches_host("www.warpcast.com"));
        assert!(domains.matches_host("FCAST.ME"));
        assert!(!domains.matches_host("notwarpcast.com"));
        assert!(!domains.matches_host("warpcast.com.evil.io"));
        assert!(!domains.matches_host("example.com"));
    }

    #[test]
    fn test_parse_comma_separated() {
        let domains: KnownDomains =
            " https://Supercast.xyz/ , warpcast.com,,warpcast.com".parse().unwrap();
        assert_eq!(domains.iter().collect::<Vec<_>>(), vec!["supercast.xyz", "warpcast.com"]);
        assert_eq!(domains.primary(), "supercast.xyz");
        assert_eq!(domains.to_string(), "supercast.xyz,warpcast.com");
    }

    #[test]
    fn test_rejects_empty_and_invalid() {
        assert!("".parse::<KnownDomains>().is_err());
        assert!(" , ".parse::<KnownDomains>().is_err());
        assert!("warpcast.com/path".parse::<KnownDomains>().is_err());
    }

    #[test]
    fn test_serde_round_trip_through_list() {
        let domains: KnownDomains =
            serde_json::from_str(r#"["far.quest", "fcast.me"]"#).unwrap();
        assert_eq!(domains.primary(), "far.quest");
        assert_eq!(
            serde_json::to_string(&domains).unwrap(),
            r#"["far.quest","fcast.me"]"#
        );
    }

    #[test]
    fn test_cast_url_uses_primary() {
        let domains = KnownDomains::default();
        assert_eq!(
            domains.cast_url("0x5cd3f740"),
            "https://warpcast.com/~/cast/0x5cd3f740"
        );
    }
}
