use serde::Deserialize;

/// Identifies a cast inside an action payload
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CastId {
    /// Farcaster id of the cast author
    #[serde(default)]
    pub fid: Option<u64>,
    /// Hash of the cast
    #[serde(default)]
    pub hash: Option<String>,
}

/// Untrusted frame data sent by older clients
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UntrustedData {
    /// Farcaster id of the user who triggered the action
    #[serde(default)]
    pub fid: Option<u64>,
    /// The cast the action was triggered on
    #[serde(default, rename = "castId")]
    pub cast_id: Option<CastId>,
}

/// Body of a cast-action or frame POST from the host client
///
/// The cast hash has been delivered in several places over the protocol's
/// history. [`ActionPayload::cast_hash`] checks them in order of preference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionPayload {
    /// Cast actions
    #[serde(default)]
    pub cast_id: Option<CastId>,
    /// Frames v1
    #[serde(default, rename = "untrustedData")]
    pub untrusted_data: Option<UntrustedData>,
    /// Direct posts from the app itself
    #[serde(default, rename = "castHash")]
    pub cast_hash: Option<String>,
    /// Bare hash field
    #[serde(default)]
    pub hash: Option<String>,
    /// Id of the signed-in Castmark user, when the caller knows it
    #[serde(default, rename = "userId")]
    pub user_id: Option<String>,
}

impl ActionPayload {
    /// The first non-empty cast hash in the payload
    pub fn cast_hash(&self) -> Option<&str> {
        let action = self.cast_id.as_ref().and_then(|id| id.hash.as_deref());
        let frame = self
            .untrusted_data
            .as_ref()
            .and_then(|data| data.cast_id.as_ref())
            .and_then(|id| id.hash.as_deref());

        [action, frame, self.cast_hash.as_deref(), self.hash.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|hash| !hash.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: &str) -> ActionPayload {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_cast_action_hash_wins() {
        let body = payload(
            r#"{
                "cast_id": { "fid": 3, "hash": "0xaaaaaaaa" },
                "untrustedData": { "fid": 9, "castId": { "fid": 3, "hash": "0xbbbbbbbb" } },
                "castHash": "0xcccccccc"
            }"#,
        );
        assert_eq!(body.cast_hash(), Some("0xaaaaaaaa"));
    }

    #[test]
    fn test_frame_hash_fallback() {
        let body = payload(
            r#"{ "untrustedData": { "fid": 9, "castId": { "fid": 3, "hash": "0xbbbbbbbb" } } }"#,
        );
        assert_eq!(body.cast_hash(), Some("0xbbbbbbbb"));
    }

    #[test]
    fn test_empty_values_are_skipped() {
        let body = payload(r#"{ "castHash": "", "hash": "0xdddddddd", "userId": "u1" }"#);
        assert_eq!(body.cast_hash(), Some("0xdddddddd"));
        assert_eq!(body.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_missing_hash() {
        assert_eq!(payload("{}").cast_hash(), None);
    }
}
