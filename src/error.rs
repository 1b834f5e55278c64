//! Error types for the passage client.

use thiserror::Error;

/// Result type alias for passage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during passage operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Signing key material could not be decoded (bad base64, bad DER,
    /// or a public key that is not RSA)
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// Key pair generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The package bytes are not a well-formed package (zlib error, JSON
    /// parse error, missing or unexpected field)
    #[error("package corrupt: {0}")]
    PackageCorrupt(String),

    /// The package was signed by a different key than the one supplied
    #[error("unexpected signing public key digest")]
    KeyMismatch,

    /// The package signature did not verify against the payload
    #[error("package signature verification failed")]
    SignatureInvalid,

    /// RSA signing failed while producing a package
    #[error("package signing failed: {0}")]
    SignFailed(String),

    /// JSON encoding failed while producing a package
    #[error("package encoding failed: {0}")]
    Encode(String),

    /// Underlying file or stream I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local proxy error
    #[error("proxy error: {0}")]
    Proxy(String),
}

impl Error {
    /// Create a new invalid-key error
    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Error::InvalidKey(msg.into())
    }

    /// Create a new package-corrupt error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::PackageCorrupt(msg.into())
    }

    /// Create a new proxy error
    pub fn proxy(msg: impl Into<String>) -> Self {
        Error::Proxy(msg.into())
    }

    /// Check if this error indicates the package failed authentication
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Error::KeyMismatch | Error::SignatureInvalid)
    }
}
