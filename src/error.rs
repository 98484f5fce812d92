//! Error taxonomy
//!
//! Two layers:
//! - `ProviderError`: what went wrong on the wire (classified for retry)
//! - `ResolveError`: what the pipeline reports to its caller
//!
//! Both are `Clone` because a coalesced result is handed to every waiter.

use std::time::Duration;
use thiserror::Error;

use crate::models::EpisodeNumber;

/// Transport-level failure from a provider client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// HTTP status, if the provider answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status(code) => Some(*code),
            _ => None,
        }
    }

    /// Connection failures, timeouts and 5xx
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network(_) | ProviderError::Timeout => true,
            ProviderError::Status(code) => (500..600).contains(code),
            ProviderError::Malformed(_) => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_decode() {
            ProviderError::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::Status(status.as_u16())
        } else {
            ProviderError::Network(e.to_string())
        }
    }
}

/// Error returned by `Pipeline::resolve_episode`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error("Connection problem: {0}")]
    TransientNetwork(String),

    #[error("Upstream server error (HTTP {status})")]
    UpstreamServer { status: u16 },

    #[error("Upstream rejected the request (HTTP {status})")]
    UpstreamClient { status: u16 },

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Could not load the streaming episode index for {title_id}: {source}")]
    IdentityResolutionExhausted {
        title_id: String,
        #[source]
        source: Box<ResolveError>,
    },

    #[error("No playable source for {title_id} episode {episode}")]
    NoPlayableSource {
        title_id: String,
        episode: EpisodeNumber,
    },

    #[error("Subtitle fetch failed: {0}")]
    SubtitleFetchFailure(String),

    #[error("Request exceeded {0:?}")]
    RequestTimeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ProviderError> for ResolveError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::Network(msg) => ResolveError::TransientNetwork(msg),
            ProviderError::Timeout => ResolveError::TransientNetwork("request timed out".into()),
            ProviderError::Status(status) if status >= 500 => {
                ResolveError::UpstreamServer { status }
            }
            ProviderError::Status(status) => ResolveError::UpstreamClient { status },
            ProviderError::Malformed(msg) => ResolveError::MalformedResponse(msg),
        }
    }
}

/// Category the presentation layer renders a message for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    ContentUnavailable,
    AccessDenied,
    ServerTemporary,
    NoSource,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Connection => "Connection problem. Check your network and try again.",
            ErrorKind::ContentUnavailable => "This content is unavailable.",
            ErrorKind::AccessDenied => "Access to this content was denied.",
            ErrorKind::ServerTemporary => "The server is having a temporary issue. Try again later.",
            ErrorKind::NoSource => "No streaming sources are available for this episode.",
            ErrorKind::Cancelled => "Request cancelled.",
            ErrorKind::Internal => "Something went wrong.",
        }
    }
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::TransientNetwork(_) | ResolveError::RequestTimeout(_) => {
                ErrorKind::Connection
            }
            ResolveError::UpstreamServer { .. } | ResolveError::MalformedResponse(_) => {
                ErrorKind::ServerTemporary
            }
            ResolveError::UpstreamClient { status: 401 | 403 } => ErrorKind::AccessDenied,
            ResolveError::UpstreamClient { .. } | ResolveError::SubtitleFetchFailure(_) => {
                ErrorKind::ContentUnavailable
            }
            ResolveError::IdentityResolutionExhausted { source, .. } => source.kind(),
            ResolveError::NoPlayableSource { .. } => ErrorKind::NoSource,
            ResolveError::Cancelled => ErrorKind::Cancelled,
            ResolveError::Internal(_) => ErrorKind::Internal,
        }
    }
}
