//! Cast reference resolution
//!
//! Turns free-form user input into a canonical cast identifier. Accepted
//! shapes:
//! - Full hashes (`0x` + 64 hex digits)
//! - Mid-length hashes (`0x` + 40 hex digits)
//! - Shortened hashes as displayed by client UIs (`0x` + 8 to 16 hex digits)
//! - URLs on an allow-listed client domain, such as
//!   `https://warpcast.com/~/cast/0x5cd3f740` or
//!   `https://warpcast.com/username/0x5cd3f740`
//!
//! Resolution is pure: no I/O and no shared state, so a single [`Resolver`]
//! can be used from any number of request handlers at once.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::domains::KnownDomains;

/// Length of a full `0x`-prefixed content hash
pub const FULL_HASH_LEN: usize = 66;

/// A cast reference resolved from user input
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CastReference {
    /// `0x`-prefixed hex hash, case preserved from the input
    pub canonical_id: String,
    /// Origin and path of the input URL, or `None` when the input was a bare hash
    pub canonical_url: Option<String>,
    /// Whether the identifier is shorter than a full hash and may be ambiguous
    pub is_shortened: bool,
}

impl CastReference {
    /// Returns whether this reference identifies the given hash, ignoring case
    pub fn matches_hash(&self, hash: &str) -> bool {
        hashes_match(&self.canonical_id, hash)
    }
}

/// Compares two cast hashes ignoring hex digit case
pub fn hashes_match(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Reasons an input could not be resolved to a cast
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionError {
    /// Not a recognized hash shape, nor a URL on a known client domain
    #[error("Input is not a recognized cast URL or hash")]
    UnsupportedFormat,
    /// The input looked like a URL but could not be parsed as one
    #[error("Input looks like a URL but could not be parsed")]
    MalformedUrl,
}

impl ResolutionError {
    /// A message suitable for showing to the person who typed the input
    pub fn user_message(&self) -> &'static str {
        match self {
            ResolutionError::UnsupportedFormat => {
                "We don't recognize this as a cast. Paste a cast URL from a supported client or a cast hash starting with 0x."
            }
            ResolutionError::MalformedUrl => {
                "That URL could not be read. Check the URL and try again."
            }
        }
    }
}

/// Resolves cast references against a configured domain allow-list
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    domains: KnownDomains,
}

impl Resolver {
    /// Creates a resolver recognizing URLs on the given domains
    pub fn new(domains: KnownDomains) -> Self {
        Resolver { domains }
    }

    /// The domain allow-list used by this resolver
    pub fn domains(&self) -> &KnownDomains {
        &self.domains
    }

    /// Cheap pre-filter for live input validation
    ///
    /// Never fails. A `true` result does not guarantee that
    /// [`Resolver::resolve_reference`] succeeds, but a `false` result
    /// guarantees that it fails.
    pub fn is_plausible_reference(&self, input: &str) -> bool {
        let input = normalize(input);

        if is_prefixed_hex(input, 64)
            || is_bare_hex(input, 64)
            || is_prefixed_hex(input, 40)
            || is_shortened_hash(input)
        {
            return true;
        }

        match Url::parse(input) {
            Ok(url) => self.is_known_url(&url) && url.path().len() > 1,
            Err(_) => false,
        }
    }

    /// Resolves input to a canonical cast identifier
    ///
    /// Rules are tried in order and the first match wins: full hash,
    /// mid-length hash, shortened hash, then a URL on a known domain.
    pub fn resolve_reference(
        &self,
        input: &str,
    ) -> Result<CastReference, ResolutionError> {
        let input = normalize(input);

        if is_prefixed_hex(input, 64) || is_prefixed_hex(input, 40) {
            return Ok(CastReference {
                canonical_id: input.to_string(),
                canonical_url: None,
                is_shortened: false,
            });
        }

        if is_shortened_hash(input) {
            return Ok(CastReference {
                canonical_id: input.to_string(),
                canonical_url: None,
                is_shortened: true,
            });
        }

        let url = match Url::parse(input) {
            Ok(url) => url,
            Err(err) => {
                return if self.looks_like_url(input) {
                    debug!(input = %input, error = %err, "Cast URL failed to parse");
                    Err(ResolutionError::MalformedUrl)
                } else {
                    Err(ResolutionError::UnsupportedFormat)
                };
            }
        };

        if !self.is_known_url(&url) {
            return Err(ResolutionError::UnsupportedFormat);
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|parts| parts.filter(|part| !part.is_empty()).collect())
            .unwrap_or_default();

        let canonical_id = PATH_RULES
            .iter()
            .filter_map(|rule| rule(segments.as_slice()))
            .find(|candidate| is_hex_hash(candidate))
            .ok_or(ResolutionError::UnsupportedFormat)?;

        let canonical_url =
            format!("{}{}", url.origin().ascii_serialization(), url.path());

        debug!(
            canonical_id = %canonical_id,
            canonical_url = %canonical_url,
            "Resolved cast reference from URL"
        );

        Ok(CastReference {
            is_shortened: canonical_id.len() < FULL_HASH_LEN,
            canonical_id,
            canonical_url: Some(canonical_url),
        })
    }

    fn is_known_url(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
            && url.host_str().is_some_and(|host| self.domains.matches_host(host))
    }

    fn looks_like_url(&self, input: &str) -> bool {
        input.contains("://") || self.domains.mentioned_in(input)
    }
}

/// Extracts a candidate hash from URL path segments
type PathRule = fn(&[&str]) -> Option<String>;

/// Candidate extraction rules, tried in order until one yields a valid hash
const PATH_RULES: &[PathRule] = &[
    tilde_cast_segment,
    tilde_segment,
    second_segment,
    first_hash_segment,
    unprefixed_trailing_segment,
];

/// `/~/cast/HASH`
fn tilde_cast_segment(parts: &[&str]) -> Option<String> {
    match parts {
        ["~", "cast", hash, ..] => Some(hash.to_string()),
        _ => None,
    }
}

/// `/~/HASH`
fn tilde_segment(parts: &[&str]) -> Option<String> {
    match parts {
        ["~", hash, ..] => Some(hash.to_string()),
        _ => None,
    }
}

/// `/username/HASH`
fn second_segment(parts: &[&str]) -> Option<String> {
    match parts {
        [_, hash, ..] => Some(hash.to_string()),
        _ => None,
    }
}

fn first_hash_segment(parts: &[&str]) -> Option<String> {
    parts
        .iter()
        .find(|part| is_hex_hash(part))
        .map(|part| part.to_string())
}

/// A trailing 40 or 64 digit hash pasted without its prefix
fn unprefixed_trailing_segment(parts: &[&str]) -> Option<String> {
    match parts.last() {
        Some(last) if is_bare_hex(last, 40) || is_bare_hex(last, 64) => {
            Some(format!("0x{}", last))
        }
        _ => None,
    }
}

/// Trims whitespace and surrounding quote characters
fn normalize(input: &str) -> &str {
    input
        .trim()
        .trim_matches(['"', '\''])
        .trim()
}

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// `0x` followed by 8 to 64 hex digits
fn is_hex_hash(s: &str) -> bool {
    s.strip_prefix("0x")
        .is_some_and(|digits| (8..=64).contains(&digits.len()) && is_hex(digits))
}

fn is_prefixed_hex(s: &str, digits: usize) -> bool {
    s.strip_prefix("0x")
        .is_some_and(|rest| rest.len() == digits && is_hex(rest))
}

fn is_bare_hex(s: &str, digits: usize) -> bool {
    s.len() == digits && is_hex(s)
}

fn is_shortened_hash(s: &str) -> bool {
    s.strip_prefix("0x")
        .is_some_and(|rest| (8..=16).contains(&rest.len()) && is_hex(rest))
}

/// Checks input against the default domain allow-list
pub fn is_plausible_reference(input: &str) -> bool {
    Resolver::default().is_plausible_reference(input)
}

/// Resolves input against the default domain allow-list
pub fn resolve_reference(input: &str) -> Result<CastReference, ResolutionError> {
    Resolver::default().resolve_reference(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  \"0xabc\"  "), "0xabc");
        assert_eq!(normalize("'0xabc'"), "0xabc");
        assert_eq!(normalize("\" 0xabc \""), "0xabc");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn test_hex_predicates() {
        assert!(is_hex_hash("0x12345678"));
        assert!(is_hex_hash(&format!("0x{}", "f".repeat(64))));
        assert!(!is_hex_hash("0x1"));
        assert!(!is_hex_hash("0x1234567"));
        assert!(!is_hex_hash(&format!("0x{}", "f".repeat(65))));
        assert!(!is_hex_hash("0x"));
        assert!(!is_hex_hash("0xzzzzzzzz"));
        assert!(!is_hex_hash("12345678"));

        assert!(is_shortened_hash("0x12345678"));
        assert!(is_shortened_hash("0x1234567890abcdef"));
        assert!(!is_shortened_hash("0x1234567"));
        assert!(!is_shortened_hash("0x1234567890abcdef0"));

        assert!(is_prefixed_hex(&format!("0x{}", "b".repeat(40)), 40));
        assert!(!is_prefixed_hex(&format!("0x{}", "b".repeat(41)), 40));
        assert!(is_bare_hex(&"c".repeat(64), 64));
    }

    #[test]
    fn test_path_rule_order() {
        let hash = |parts: &[&str]| {
            PATH_RULES
                .iter()
                .filter_map(|rule| rule(parts))
                .find(|candidate| is_hex_hash(candidate))
        };

        assert_eq!(
            hash(&["~", "cast", "0xabcabcab"]),
            Some("0xabcabcab".to_string())
        );
        assert_eq!(hash(&["~", "0xdefdefde"]), Some("0xdefdefde".to_string()));
        assert_eq!(
            hash(&["dwr", "0x12312312", "0x45645645"]),
            Some("0x12312312".to_string())
        );
        // second segment isn't a hash, so the scan finds the later one
        assert_eq!(
            hash(&["dwr", "casts", "0x78978978"]),
            Some("0x78978978".to_string())
        );
        // a too-short second segment falls through to the scan
        assert_eq!(
            hash(&["dwr", "0x1", "0xabcdef01"]),
            Some("0xabcdef01".to_string())
        );
        assert_eq!(hash(&["0xabcabcab"]), Some("0xabcabcab".to_string()));
        assert_eq!(
            hash(&["dwr", "a".repeat(40).as_str()]),
            Some(format!("0x{}", "a".repeat(40)))
        );
        assert_eq!(hash(&["dwr", "a".repeat(41).as_str()]), None);
        assert_eq!(hash(&["dwr", "0x1"]), None);
        assert_eq!(hash(&[]), None);
    }

    #[test]
    fn test_user_messages_are_distinct() {
        assert_ne!(
            ResolutionError::UnsupportedFormat.user_message(),
            ResolutionError::MalformedUrl.user_message()
        );
    }

    #[test]
    fn test_matches_hash_ignores_case() {
        let reference = resolve_reference("0xABCDEF12").unwrap();
        assert!(reference.matches_hash("0xabcdef12"));
        assert!(!reference.matches_hash("0xabcdef13"));
    }
}
