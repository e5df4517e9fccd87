//! Token claims and their compact HS512 encoding.
//!
//! A token is `base64url(header).base64url(payload).base64url(mac)`. The
//! structure and the `alg` header are inspected before any MAC is computed,
//! then `jsonwebtoken` checks the signature. Expiry is compared against a
//! caller-provided instant rather than the system clock.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::key::SigningKey;

/// The only algorithm this crate signs with or accepts.
pub const ALGORITHM: Algorithm = Algorithm::HS512;
const ALGORITHM_NAME: &str = "HS512";

/// Pieces of information asserted on a token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID. Absent on refresh tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Identifies the time at which the token was issued.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub iat: Option<DateTime<Utc>>,
    /// Identifies the expiration time on or after which the token must not
    /// be accepted for processing.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub exp: DateTime<Utc>,
}

impl Claims {
    /// Claims of an access token.
    pub fn access(
        subject: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            sub: Some(subject.into()),
            iat: Some(issued_at),
            exp: expires_at,
        }
    }

    /// Claims of a refresh token: expiration only.
    pub fn refresh(expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: None,
            iat: None,
            exp: expires_at,
        }
    }

    /// `exp - now`. Negative once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> TimeDelta {
        self.exp - now
    }

    /// Whether `now` is at or past expiration, tolerating `leeway`.
    pub fn is_expired(&self, now: DateTime<Utc>, leeway: TimeDelta) -> bool {
        self.exp
            .checked_add_signed(leeway)
            .is_some_and(|deadline| now >= deadline)
    }
}

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Encode and verify [`Claims`] with a shared [`SigningKey`].
#[derive(Clone, Debug)]
pub struct ClaimsCodec {
    key: Arc<SigningKey>,
    validation: Validation,
    leeway: TimeDelta,
}

impl ClaimsCodec {
    /// Create a new [`ClaimsCodec`].
    pub fn new(key: Arc<SigningKey>) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        // Expiry is checked against the caller's clock in `decode`.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Self {
            key,
            validation,
            leeway: TimeDelta::zero(),
        }
    }

    /// Tolerate clock skew between issuer and validator.
    pub fn with_leeway(mut self, leeway: TimeDelta) -> Self {
        self.leeway = leeway;
        self
    }

    /// Sign `claims` into a compact token.
    pub fn encode(
        &self,
        claims: &Claims,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(ALGORITHM), claims, self.key.encoding())
    }

    /// Check structure, algorithm and signature. Expiry is not enforced.
    pub fn verify(&self, token: &str) -> Result<Claims, DecodeError> {
        inspect(token)?;

        let claims =
            decode::<Claims>(token, self.key.decoding(), &self.validation)
                .map_err(|err| match err.kind() {
                    ErrorKind::InvalidSignature => DecodeError::BadSignature,
                    ErrorKind::InvalidAlgorithm => {
                        DecodeError::UnsupportedAlgorithm
                    },
                    _ => DecodeError::Malformed,
                })?
                .claims;

        if claims.iat.is_some_and(|iat| claims.exp <= iat) {
            return Err(DecodeError::Malformed);
        }

        Ok(claims)
    }

    /// Decode and check a token as of `now`.
    pub fn decode(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Claims, DecodeError> {
        let claims = self.verify(token)?;

        if claims.is_expired(now, self.leeway) {
            return Err(DecodeError::Expired);
        }

        Ok(claims)
    }
}

/// Structural checks done before trusting the header.
fn inspect(token: &str) -> Result<(), DecodeError> {
    let mut segments = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(DecodeError::Malformed);
    };

    let header = Base64UrlUnpadded::decode_vec(header)
        .map_err(|_| DecodeError::Malformed)?;
    let payload = Base64UrlUnpadded::decode_vec(payload)
        .map_err(|_| DecodeError::Malformed)?;
    Base64UrlUnpadded::decode_vec(signature)
        .map_err(|_| DecodeError::Malformed)?;

    let header: RawHeader =
        serde_json::from_slice(&header).map_err(|_| DecodeError::Malformed)?;
    let payload: serde_json::Value =
        serde_json::from_slice(&payload).map_err(|_| DecodeError::Malformed)?;
    if !payload.is_object() {
        return Err(DecodeError::Malformed);
    }

    if header.alg != ALGORITHM_NAME {
        return Err(DecodeError::UnsupportedAlgorithm);
    }

    Ok(())
}
