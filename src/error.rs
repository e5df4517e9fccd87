//! Error handler for jeton.

use thiserror::Error;

/// Message handed to end users for every authentication failure.
pub const PUBLIC_MESSAGE: &str = "invalid or expired session";

pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing every failure the crate can report.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("failed to sign token")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("token expiration is out of the supported date range")]
    ExpirationOutOfRange,
}

/// Startup failures. Any of these must abort the process.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("token secret is empty")]
    EmptySecret,
    #[error("token secret is not valid base64")]
    InvalidEncoding,
    #[error("token secret is {value} bytes, at least {expected} expected")]
    WeakKey { value: usize, expected: usize },
    #[error("`{field}` must be between {minimum} and {maximum} milliseconds")]
    InvalidLifetime {
        field: &'static str,
        minimum: u64,
        maximum: u64,
    },
    #[error("missing `{0}` entry on configuration file")]
    MissingSection(&'static str),

    #[error("cannot read configuration file")]
    Io(#[from] std::io::Error),
    #[error("configuration file is not valid yaml")]
    Yaml(#[from] serde_yaml::Error),
}

/// Why a presented token was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("token structure cannot be parsed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token is expired")]
    Expired,
    #[error("token is signed with an untrusted algorithm")]
    UnsupportedAlgorithm,
}

impl DecodeError {
    /// Short label used for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            DecodeError::Malformed => "malformed",
            DecodeError::BadSignature => "bad_signature",
            DecodeError::Expired => "expired",
            DecodeError::UnsupportedAlgorithm => "unsupported_algorithm",
        }
    }
}

/// Failures of the external identity store.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("user not found")]
    NotFound,
    #[error("user is deleted since {date}")]
    Deleted { date: chrono::NaiveDate },
    #[error("identity lookup timed out")]
    Timeout,
    #[error("identity backend failed")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IdentityError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }
}

impl Error {
    /// Whether the caller should answer with an "unauthenticated" response.
    ///
    /// Backend outages and signing failures are server faults, not the
    /// client's.
    pub fn is_unauthenticated(&self) -> bool {
        match self {
            Error::Decode(_) => true,
            Error::Identity(IdentityError::NotFound)
            | Error::Identity(IdentityError::Deleted { .. }) => true,
            _ => false,
        }
    }

    /// Text safe to echo to the client.
    ///
    /// The precise reason stays in internal logs so token structure cannot
    /// be probed through responses.
    pub fn public_message(&self) -> &'static str {
        if self.is_unauthenticated() {
            PUBLIC_MESSAGE
        } else {
            "internal server error"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_message_hides_reason() {
        for err in [
            DecodeError::Malformed,
            DecodeError::BadSignature,
            DecodeError::Expired,
            DecodeError::UnsupportedAlgorithm,
        ] {
            let err = Error::from(err);
            assert!(err.is_unauthenticated());
            assert_eq!(err.public_message(), PUBLIC_MESSAGE);
        }

        let err = Error::from(IdentityError::NotFound);
        assert_eq!(err.public_message(), PUBLIC_MESSAGE);
    }

    #[test]
    fn test_server_faults_are_not_unauthenticated() {
        let err = Error::from(IdentityError::Timeout);
        assert!(!err.is_unauthenticated());
        assert_eq!(err.public_message(), "internal server error");

        let err = Error::from(ConfigurationError::EmptySecret);
        assert!(!err.is_unauthenticated());

        assert!(!Error::ExpirationOutOfRange.is_unauthenticated());
    }

    #[test]
    fn test_reason_labels() {
        assert_eq!(DecodeError::BadSignature.reason(), "bad_signature");
        assert_eq!(DecodeError::Expired.to_string(), "token is expired");
    }
}
