//! Error types for feishu-export
//!
//! Every fallible operation in the library returns [`Result`]. Errors carry
//! enough context (operation label, remote code, request id) to be shown on a
//! single UI row or printed as a cause chain by the binary.

use thiserror::Error;

/// Result type alias for feishu-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feishu-export
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input: bad URL, unsupported scheme, mixed hosts
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Missing or unsupported argument (document type, config field)
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The Open API answered with a non-zero `code`
    #[error("{operation} failed: code={code}, msg={msg}{}", fmt_request_id(.request_id))]
    Remote {
        /// Operation label, e.g. "create export task"
        operation: String,
        /// Remote error code
        code: i64,
        /// Remote error message
        msg: String,
        /// Log id returned in the `X-Tt-Logid` header
        request_id: Option<String>,
    },

    /// A deadline or poll budget was exhausted
    #[error("timeout: {0}")]
    Timeout(String),

    /// HTTP transport failure (connection, TLS, body decoding)
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "save_dir")
        key: Option<String>,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

fn fmt_request_id(request_id: &Option<String>) -> String {
    match request_id {
        Some(id) if !id.is_empty() => format!(", request_id={id}"),
        _ => String::new(),
    }
}

/// Coarse classification used by the UI and the binary's exit reporting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::BadRequest`]
    BadRequest,
    /// See [`Error::InvalidArgument`] and [`Error::Config`]
    InvalidArgument,
    /// Remote answered with a rate-limit code even after retrying
    RateLimited,
    /// See [`Error::Remote`]
    Remote,
    /// See [`Error::Timeout`]
    Timeout,
    /// See [`Error::Transport`]
    Transport,
    /// See [`Error::Io`]
    Io,
    /// Anything else
    Other,
}

impl Error {
    /// Build a [`Error::Remote`] from an operation label and response envelope fields
    pub fn remote(
        operation: impl Into<String>,
        code: i64,
        msg: impl Into<String>,
        request_id: Option<String>,
    ) -> Self {
        Error::Remote {
            operation: operation.into(),
            code,
            msg: msg.into(),
            request_id,
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadRequest(_) => ErrorKind::BadRequest,
            Error::InvalidArgument(_) | Error::Config { .. } => ErrorKind::InvalidArgument,
            Error::Remote { .. } if self.is_rate_limited() => ErrorKind::RateLimited,
            Error::Remote { .. } => ErrorKind::Remote,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Io(_) => ErrorKind::Io,
            Error::Serialization(_) | Error::Other(_) => ErrorKind::Other,
        }
    }

    /// True when the remote code belongs to the default rate-limit family
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Error::Remote { code, .. } if crate::config::DEFAULT_RETRYABLE_CODES.contains(code)
        )
    }

    /// Request id of a failing remote call, if any
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Error::Remote {
                request_id: Some(id),
                ..
            } if !id.is_empty() => Some(id),
            _ => None,
        }
    }

    /// Render the message on one line for a progress row
    pub fn single_line(&self) -> String {
        crate::utils::single_line(&self.to_string())
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_error_display_includes_request_id() {
        let err = Error::remote(
            "create export task",
            1069902,
            "no permission",
            Some("202403011234".to_string()),
        );

        assert_eq!(
            err.to_string(),
            "create export task failed: code=1069902, msg=no permission, request_id=202403011234"
        );
        assert_eq!(err.request_id(), Some("202403011234"));
        assert_eq!(err.kind(), ErrorKind::Remote);
    }

    #[test]
    fn remote_error_without_request_id_omits_suffix() {
        let err = Error::remote("query export task", 5, "boom", None);
        assert_eq!(err.to_string(), "query export task failed: code=5, msg=boom");
        assert_eq!(err.request_id(), None);
    }

    #[test]
    fn rate_limit_codes_are_classified() {
        let err = Error::remote("list wiki nodes", 99991400, "too many requests", None);
        assert!(err.is_rate_limited());
        assert_eq!(err.kind(), ErrorKind::RateLimited);

        let err = Error::remote("list wiki nodes", 11232, "frequency limit", None);
        assert_eq!(err.kind(), ErrorKind::RateLimited);
    }

    #[test]
    fn single_line_strips_newlines() {
        let err = Error::Other("first line\nsecond line\r\nthird".to_string());
        assert_eq!(err.single_line(), "first line second line third");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("denied"));
    }
}
