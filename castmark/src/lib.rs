//! # Castmark
//!
//! Castmark is a library for saving Farcaster casts as bookmarks. It resolves
//! pasted cast URLs and hashes to canonical identifiers, fetches cast content
//! and persists bookmarks keyed by the resolved hash.

#![warn(missing_docs, unused_import_braces, missing_debug_implementations)]

use std::time::Duration;

use once_cell::sync::OnceCell;

/// Cast-action payloads sent by the host client
pub mod action;
/// Cast content models
pub mod cast;
/// Collections of bookmarks
pub mod collection;
pub mod domains;
/// Resolve, fetch and persist pipeline
pub mod import;
/// Cast content lookup with ordered fallback strategies
pub mod lookup;
pub mod reference;
/// Bookmark persistence
pub mod store;

pub use domains::KnownDomains;
pub use reference::{
    is_plausible_reference, resolve_reference, CastReference,
    ResolutionError, Resolver,
};

/// Your branding, used for the user agent
#[derive(Debug)]
pub struct Branding {
    /// The user agent header value
    pub header_value: String,
}

/// The branding of your application
pub static BRANDING: OnceCell<Branding> = OnceCell::new();

impl Branding {
    /// Creates a new branding instance
    pub fn new(name: String, email: String) -> Branding {
        let header_value = format!(
            "{}/castmark/{} <{}>",
            name,
            env!("CARGO_PKG_VERSION"),
            email
        );

        Branding { header_value }
    }

    /// Sets the process-wide branding
    pub fn set_branding(branding: Branding) -> Result<(), Error> {
        BRANDING
            .set(branding)
            .map_err(|_| Error::BrandingAlreadySet)
    }
}

impl Default for Branding {
    fn default() -> Self {
        Branding::new("unbranded".to_string(), "unbranded".to_string())
    }
}

#[derive(thiserror::Error, Debug)]
/// An error type representing possible errors when importing casts
pub enum Error {
    /// The input could not be resolved to a cast reference
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// There was an error while deserializing a response
    #[error("Error while deserializing JSON")]
    SerdeError(#[from] serde_json::Error),
    /// There was a network error when fetching an object
    #[error("Unable to fetch {item}")]
    FetchError {
        /// The internal reqwest error
        #[source]
        inner: reqwest::Error,
        /// The item that was failed to be fetched
        item: String,
    },
    /// A service answered with an unexpected status
    #[error("Request for {item} failed with status {status}")]
    StatusError {
        /// HTTP status code
        status: u16,
        /// The item that was requested
        item: String,
    },
    /// The credentials were rejected by a service
    #[error("Not authorized to fetch {item}")]
    Unauthorized {
        /// The item that was requested
        item: String,
    },
    /// A service is refusing requests for now
    #[error("Service {service} is unavailable")]
    ServiceUnavailable {
        /// Name of the service
        service: String,
    },
    /// No cast exists for the identifier
    #[error("No cast found for {identifier}")]
    NotFound {
        /// The identifier that was looked up
        identifier: String,
    },
    /// Every lookup strategy failed
    #[error("Unable to find cast {identifier} after {attempts} attempts")]
    LookupExhausted {
        /// The canonical id of the reference
        identifier: String,
        /// Number of lookups performed
        attempts: usize,
        /// The error of the final attempt
        #[source]
        last: Box<Error>,
    },
    /// A shortened hash could not be expanded to a full hash
    #[error("Shortened hash {hash} could not be expanded to a full cast hash")]
    ProvisionalHash {
        /// The shortened hash
        hash: String,
    },
    /// The looked-up cast is not the cast the reference names
    #[error("Cast {found} does not match reference {expected}")]
    HashMismatch {
        /// The canonical id from the input
        expected: String,
        /// The hash returned by the lookup
        found: String,
    },
    /// An action payload carried no cast hash
    #[error("No cast hash provided")]
    MissingCastHash,
    /// No user to save the bookmark for
    #[error("User not authenticated")]
    MissingUserId,
    /// The bookmark store rejected an operation
    #[error("Bookmark store error: {0}")]
    StoreError(String),
    /// Error while parsing input
    #[error("{0}")]
    ParseError(String),
    /// The branding has already been set
    #[error("Branding already set")]
    BrandingAlreadySet,
}

impl Error {
    /// Whether retrying the same request could succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::FetchError { inner, .. } => {
                inner.is_timeout()
                    || inner.is_connect()
                    || inner
                        .status()
                        .map(|s| s.is_server_error())
                        .unwrap_or(false)
            }
            Error::StatusError { status, .. } => {
                *status == 429 || (500..600).contains(status)
            }
            Error::LookupExhausted { last, .. } => last.is_transient(),
            _ => false,
        }
    }

    /// Whether the error means the cast does not exist
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::LookupExhausted { last, .. } => last.is_not_found(),
            _ => false,
        }
    }

    /// A message suitable for showing to the person who asked for the import
    pub fn user_message(&self) -> String {
        match self {
            Error::Resolution(err) => err.user_message().to_string(),
            Error::MissingCastHash => "No cast found".to_string(),
            Error::ProvisionalHash { .. } => {
                "That short hash could not be matched to a single cast. Paste the full cast URL instead.".to_string()
            }
            Error::HashMismatch { .. } => {
                "The cast we found doesn't match the one you pasted. Check the URL and try again.".to_string()
            }
            Error::MissingUserId => "User not authenticated".to_string(),
            err if err.is_not_found() => {
                "We couldn't find that cast. It may have been deleted.".to_string()
            }
            Error::LookupExhausted { .. }
            | Error::FetchError { .. }
            | Error::StatusError { .. }
            | Error::Unauthorized { .. }
            | Error::ServiceUnavailable { .. }
            | Error::NotFound { .. }
            | Error::SerdeError(_) => {
                "Cannot fetch cast details right now. Please try again.".to_string()
            }
            Error::StoreError(_) => "Failed to save bookmark".to_string(),
            Error::ParseError(_) | Error::BrandingAlreadySet => {
                "Something went wrong".to_string()
            }
        }
    }
}

/// Maps a non-success response status to an error
pub(crate) fn check_status(
    response: reqwest::Response,
    item: &str,
) -> Result<reqwest::Response, Error> {
    let status = response.status();

    if status.is_success() {
        Ok(response)
    } else if status == reqwest::StatusCode::NOT_FOUND {
        Err(Error::NotFound {
            identifier: item.to_string(),
        })
    } else if status == reqwest::StatusCode::UNAUTHORIZED
        || status == reqwest::StatusCode::FORBIDDEN
    {
        Err(Error::Unauthorized {
            item: item.to_string(),
        })
    } else {
        Err(Error::StatusError {
            status: status.as_u16(),
            item: item.to_string(),
        })
    }
}

/// Builds an HTTP client carrying the configured branding
pub(crate) fn http_client() -> Result<reqwest::Client, Error> {
    let mut headers = reqwest::header::HeaderMap::new();
    if let Ok(header) = reqwest::header::HeaderValue::from_str(
        &BRANDING.get_or_init(Branding::default).header_value,
    ) {
        headers.insert(reqwest::header::USER_AGENT, header);
    }

    reqwest::Client::builder()
        .tcp_keepalive(Some(Duration::from_secs(10)))
        .timeout(Duration::from_secs(15))
        .default_headers(headers)
        .build()
        .map_err(|err| Error::FetchError {
            inner: err,
            item: "http client".to_string(),
        })
}
