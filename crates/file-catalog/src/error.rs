//! Error handling for catalog API operations.

use std::fmt::Display;

use reqwest::Method;
use serde_json::Value;
use thiserror::Error;

use crate::cache::CacheError;

/// Classification of an unsuccessful response from the catalog server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Conflict,
    TooManyRequests,
    UnspecificServer,
    ServiceUnavailable,
    /// Any status code without a dedicated kind.
    Server { code: u16 },
}

/// Status codes with a dedicated [ErrorKind].
/// Anything not listed here is classified as [ErrorKind::Server].
static KNOWN_STATUS_CODES: [(u16, ErrorKind); 6] = [
    (400, ErrorKind::BadRequest),
    (404, ErrorKind::NotFound),
    (409, ErrorKind::Conflict),
    (429, ErrorKind::TooManyRequests),
    (500, ErrorKind::UnspecificServer),
    (503, ErrorKind::ServiceUnavailable),
];

impl ErrorKind {
    /// Look up the kind for a status code.
    pub fn from_code(code: u16) -> Self {
        KNOWN_STATUS_CODES
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, kind)| *kind)
            .unwrap_or(ErrorKind::Server { code })
    }
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::BadRequest => write!(f, "bad request"),
            ErrorKind::NotFound => write!(f, "not found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::TooManyRequests => write!(f, "too many requests"),
            ErrorKind::UnspecificServer => write!(f, "unspecific server error"),
            ErrorKind::ServiceUnavailable => write!(f, "service unavailable"),
            ErrorKind::Server { .. } => write!(f, "server error"),
        }
    }
}

/// An error response returned by the catalog server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} [{code}]: {message}")]
pub struct ServerError {
    pub kind: ErrorKind,
    pub code: u16,
    pub message: String,
}

/// Turn a status code and the raw response body into a [ServerError].
///
/// If the body is a JSON object with a string `message` field,
/// that field becomes the error message, otherwise the body is kept as is.
pub fn classify(code: u16, body: &str) -> ServerError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .as_ref()
        .and_then(Value::as_object)
        .and_then(|object| object.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    ServerError {
        kind: ErrorKind::from_code(code),
        code,
        message,
    }
}

/// Common error type for catalog client operations.
#[derive(Debug, Error)]
pub enum CatalogClientError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("the uid '{0}' is not present in the file catalog")]
    UidNotFound(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("server violated the catalog protocol: {0}")]
    ProtocolViolation(String),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("invalid catalog url '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build HTTP client: {0}")]
    BuildClient(String),

    #[error("failed to send {method} {url} request")]
    Request {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read response of {method} {url}")]
    Decode {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to encode request payload")]
    Encode(#[source] serde_json::Error),
}

impl CatalogClientError {
    pub(crate) fn request(method: Method, url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Request {
            method,
            url: url.into(),
            source,
        }
    }

    pub(crate) fn decode(method: Method, url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Decode {
            method,
            url: url.into(),
            source,
        }
    }

    /// The [ErrorKind] if this error was returned by the server.
    pub fn server_kind(&self) -> Option<ErrorKind> {
        match self {
            CatalogClientError::Server(err) => Some(err.kind),
            _ => None,
        }
    }

    /// Whether the addressed record does not exist,
    /// either according to the server or because its uid could not be resolved.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogClientError::UidNotFound(_))
            || self.server_kind() == Some(ErrorKind::NotFound)
    }
}
