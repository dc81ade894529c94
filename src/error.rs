use std::io;
use thiserror::Error;

/// Why a `Proxy-Authorization` header was not accepted.
///
/// Every variant leads to the same 407 challenge on the wire; the
/// distinction only shows up in the logs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("missing Proxy-Authorization header")]
    MissingHeader,

    #[error("unsupported authentication scheme")]
    UnsupportedScheme,

    #[error("invalid base64 in credentials")]
    InvalidEncoding,

    #[error("credentials are not in user:pass form")]
    MalformedCredentials,

    #[error("invalid credentials")]
    Mismatch,
}

/// Connection-scoped failures. None of these outlive the connection that
/// produced them.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Bad request line, truncated header block or unreadable input.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("request head exceeds {0} bytes")]
    HeadersTooLarge(usize),

    #[error("authentication failed: {0}")]
    Unauthorized(#[from] AuthFailure),

    #[error("invalid target {target:?}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("failed to connect to {target}: {source}")]
    Dial {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("timed out connecting to {target}")]
    DialTimeout { target: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
