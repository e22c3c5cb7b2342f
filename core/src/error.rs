//! Error types for the executor and the response parser.
//!
//! # Design
//! `TransportError` covers everything that stops the executor from handing
//! back a response: transport failures, a 307 without a `Location`, a failed
//! token renewal, or too many in-place retries. `ApiError` is what the
//! parser returns; its `ServerError` and `Decode` variants keep the drained
//! response so callers can still inspect the status and raw body.

use std::fmt;

use thiserror::Error;

use crate::http::{HttpResponse, Response};

/// Error returned by a [`crate::TokenRenewer`].
pub type RenewError = Box<dyn std::error::Error + Send + Sync>;

/// Which in-place retry ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    Redirect,
    Renewal,
}

impl fmt::Display for RetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryKind::Redirect => f.write_str("redirect"),
            RetryKind::Renewal => f.write_str("token renewal"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid URL {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build request to {url}: {source}")]
    Build {
        url: String,
        #[source]
        source: ureq::http::Error,
    },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("request to {url} timed out")]
    Timeout {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("request cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A 307 arrived without a usable `Location`. The response is kept.
    #[error("no Location header found in 307 response from {url}")]
    MissingLocation {
        url: String,
        response: Box<Response>,
    },

    #[error("token renewal failed: {source}")]
    Renewal {
        #[source]
        source: RenewError,
    },

    #[error("{kind} limit of {limit} exceeded for {url}")]
    RetryLimitExceeded {
        kind: RetryKind,
        limit: u32,
        url: String,
    },
}

impl TransportError {
    pub(crate) fn from_ureq(url: &str, error: ureq::Error) -> Self {
        match error {
            ureq::Error::Timeout(_) => TransportError::Timeout {
                url: url.to_string(),
                source: Box::new(error),
            },
            other => TransportError::Transport {
                url: url.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// The hundreds band of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusBand {
    Informational,
    Success,
    Redirection,
    ClientError,
    ServerError,
}

impl StatusBand {
    pub fn of(status: u16) -> Self {
        match status {
            0..=199 => StatusBand::Informational,
            200..=299 => StatusBand::Success,
            300..=399 => StatusBand::Redirection,
            400..=499 => StatusBand::ClientError,
            _ => StatusBand::ServerError,
        }
    }
}

impl fmt::Display for StatusBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatusBand::Informational => "1xx",
            StatusBand::Success => "2xx",
            StatusBand::Redirection => "3xx",
            StatusBand::ClientError => "4xx",
            StatusBand::ServerError => "5xx",
        };
        f.write_str(label)
    }
}

/// Errors returned by [`crate::parse_into`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Request(#[from] TransportError),

    #[error("failed to read response body from {url}: {source}")]
    ReadBody {
        url: String,
        #[source]
        source: std::io::Error,
    },

    /// Status 500 or above. The body is not decoded.
    #[error(
        "(unexpected 5xx) got {} response from {} is {}",
        .response.status,
        .response.url,
        .response.body_text()
    )]
    ServerError { response: HttpResponse },

    /// The body did not decode into the requested type.
    #[error(
        "(unexpected {band}) got {} response from {} is {}",
        .response.status,
        .response.url,
        .response.body_text()
    )]
    Decode {
        band: StatusBand,
        response: HttpResponse,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    /// The drained response, for errors that have one.
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            ApiError::ServerError { response } | ApiError::Decode { response, .. } => {
                Some(response)
            }
            ApiError::Request(_) | ApiError::ReadBody { .. } => None,
        }
    }

    pub fn raw_body(&self) -> Option<&[u8]> {
        self.response().map(|response| response.body.as_slice())
    }

    pub fn status(&self) -> Option<u16> {
        self.response().map(|response| response.status)
    }
}
