use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a cast, as returned by the content lookup service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastAuthor {
    /// Farcaster id of the author
    pub fid: u64,
    /// Username, without the leading `@`
    #[serde(default)]
    pub username: Option<String>,
    /// Display name
    #[serde(default, alias = "displayName")]
    pub display_name: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub pfp_url: Option<String>,
    /// Older payloads nest the avatar under `pfp.url`
    #[serde(default, skip_serializing)]
    pfp: Option<Pfp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Pfp {
    url: Option<String>,
}

impl CastAuthor {
    /// Creates an author with only a fid set
    pub fn new(fid: u64) -> Self {
        CastAuthor {
            fid,
            username: None,
            display_name: None,
            pfp_url: None,
            pfp: None,
        }
    }

    /// Avatar URL from whichever field the payload used
    pub fn avatar_url(&self) -> Option<&str> {
        self.pfp_url
            .as_deref()
            .or_else(|| self.pfp.as_ref().and_then(|pfp| pfp.url.as_deref()))
    }
}

/// Denormalized cast content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cast {
    /// Full content hash of the cast
    pub hash: String,
    /// Author of the cast
    pub author: CastAuthor,
    /// Text body
    #[serde(default)]
    pub text: String,
    /// Display URL, when the service provides one
    #[serde(default)]
    pub url: Option<String>,
    /// Publication time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Response body of a cast lookup
///
/// The service has answered with both `{ "cast": ... }` and
/// `{ "result": { "cast": ... } }` over time.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CastResponse {
    /// Current shape
    Direct {
        /// The cast
        cast: Cast,
    },
    /// Shape used by older SDK versions
    Wrapped {
        /// Wrapper around the cast
        result: CastResult,
    },
}

/// Inner object of [`CastResponse::Wrapped`]
#[derive(Debug, Deserialize)]
pub struct CastResult {
    /// The cast
    pub cast: Cast,
}

impl CastResponse {
    /// Unwraps the cast regardless of response shape
    pub fn into_cast(self) -> Cast {
        match self {
            CastResponse::Direct { cast } => cast,
            CastResponse::Wrapped { result } => result.cast,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_response() {
        let body = r#"{
            "cast": {
                "hash": "0x5cd3f7401234567890abcdef1234567890abcdef",
                "author": {
                    "fid": 3,
                    "username": "dwr",
                    "display_name": "Dan",
                    "pfp_url": "https://example.com/dwr.png"
                },
                "text": "hello",
                "timestamp": "2024-03-01T12:00:00Z"
            }
        }"#;

        let cast = serde_json::from_str::<CastResponse>(body).unwrap().into_cast();
        assert_eq!(cast.hash, "0x5cd3f7401234567890abcdef1234567890abcdef");
        assert_eq!(cast.author.fid, 3);
        assert_eq!(cast.author.display_name.as_deref(), Some("Dan"));
        assert_eq!(cast.author.avatar_url(), Some("https://example.com/dwr.png"));
        assert!(cast.timestamp.is_some());
        assert!(cast.url.is_none());
    }

    #[test]
    fn test_wrapped_response_with_legacy_author_fields() {
        let body = r#"{
            "result": {
                "cast": {
                    "hash": "0xabc",
                    "author": {
                        "fid": 42,
                        "displayName": "Legacy",
                        "pfp": { "url": "https://example.com/legacy.png" }
                    }
                }
            }
        }"#;

        let cast = serde_json::from_str::<CastResponse>(body).unwrap().into_cast();
        assert_eq!(cast.author.display_name.as_deref(), Some("Legacy"));
        assert_eq!(cast.author.avatar_url(), Some("https://example.com/legacy.png"));
        assert_eq!(cast.text, "");
    }

    #[test]
    fn test_missing_cast_is_an_error() {
        assert!(serde_json::from_str::<CastResponse>(r#"{"result": {}}"#).is_err());
    }
}
