use thiserror::Error;

/// Structured error types for castmark_client
///
/// Span context is captured by using #[instrument] on functions.
#[derive(Error, Debug)]
pub enum ErrorKind {
    /// Error from the castmark library
    #[error(transparent)]
    Castmark(#[from] castmark::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    SerdeJSON(#[from] serde_json::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Environment variable missing
    #[error("Missing environment variable: {0}")]
    EnvVarMissing(String),
}

/// Main error type
pub type Error = ErrorKind;

/// Error classification helpers
impl ErrorKind {
    /// Determines if this error is permanent (won't be fixed by retrying)
    ///
    /// Malformed input, missing configuration and casts that don't exist
    /// stay that way. Network failures and 5xx answers might not.
    pub fn is_permanent(&self) -> bool {
        match self {
            ErrorKind::Castmark(castmark::Error::ServiceUnavailable { .. }) => false,
            ErrorKind::Castmark(err) => !err.is_transient(),
            ErrorKind::SerdeJSON(_)
            | ErrorKind::InvalidInput(_)
            | ErrorKind::EnvVarMissing(_) => true,
            ErrorKind::Io(_) => false,
        }
    }

    /// Message for the person running the command
    pub fn user_message(&self) -> String {
        match self {
            ErrorKind::Castmark(err) => err.user_message(),
            err => err.to_string(),
        }
    }
}

/// Helper function to create an invalid input error
pub fn invalid_input(message: impl Into<String>) -> Error {
    ErrorKind::InvalidInput(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use castmark::ResolutionError;

    #[test]
    fn test_error_classification() {
        // Permanent errors
        assert!(invalid_input("test").is_permanent());
        assert!(ErrorKind::from(castmark::Error::from(ResolutionError::MalformedUrl)).is_permanent());

        let not_found = ErrorKind::from(castmark::Error::NotFound {
            identifier: "0xabc".to_string(),
        });
        assert!(not_found.is_permanent());

        // Transient errors
        let unavailable = ErrorKind::from(castmark::Error::StatusError {
            status: 503,
            item: "hash 0xabc".to_string(),
        });
        assert!(!unavailable.is_permanent());

        let exhausted = ErrorKind::from(castmark::Error::LookupExhausted {
            identifier: "0xabc".to_string(),
            attempts: 3,
            last: Box::new(castmark::Error::StatusError {
                status: 502,
                item: "url https://warpcast.com/~/cast/0xabc".to_string(),
            }),
        });
        assert!(!exhausted.is_permanent());

        let breaker_open = ErrorKind::from(castmark::Error::ServiceUnavailable {
            service: "neynar".to_string(),
        });
        assert!(!breaker_open.is_permanent());
        assert!(!ErrorKind::from(std::io::Error::other("disk busy")).is_permanent());
    }

    #[test]
    fn test_user_message_uses_resolution_wording() {
        let err = ErrorKind::from(castmark::Error::from(ResolutionError::UnsupportedFormat));
        assert_eq!(
            err.user_message(),
            ResolutionError::UnsupportedFormat.user_message()
        );

        let display = invalid_input("empty file").user_message();
        assert!(display.contains("empty file"));
    }
}
