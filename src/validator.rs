//! Check presented tokens.
//!
//! Every call re-verifies structure, signature and expiry from scratch; no
//! outcome is cached.

use chrono::{DateTime, TimeDelta, Utc};

use crate::claims::{Claims, ClaimsCodec};
use crate::error::DecodeError;
use crate::identity::UserId;

/// Result of a single validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid(Claims),
    Expired,
    /// MAC does not match the token contents.
    MalformedSignature,
    /// Header names an algorithm other than HS512.
    UnsupportedFormat,
    Malformed,
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }

    fn label(&self) -> &'static str {
        match self {
            ValidationOutcome::Valid(_) => "valid",
            ValidationOutcome::Expired => "expired",
            ValidationOutcome::MalformedSignature => "bad_signature",
            ValidationOutcome::UnsupportedFormat => "unsupported_algorithm",
            ValidationOutcome::Malformed => "malformed",
        }
    }
}

impl From<Result<Claims, DecodeError>> for ValidationOutcome {
    fn from(result: Result<Claims, DecodeError>) -> Self {
        match result {
            Ok(claims) => ValidationOutcome::Valid(claims),
            Err(DecodeError::Expired) => ValidationOutcome::Expired,
            Err(DecodeError::BadSignature) => {
                ValidationOutcome::MalformedSignature
            },
            Err(DecodeError::UnsupportedAlgorithm) => {
                ValidationOutcome::UnsupportedFormat
            },
            Err(DecodeError::Malformed) => ValidationOutcome::Malformed,
        }
    }
}

/// Validate tokens signed by the shared key.
#[derive(Clone, Debug)]
pub struct TokenValidator {
    codec: ClaimsCodec,
}

impl TokenValidator {
    /// Create a new [`TokenValidator`].
    pub fn new(codec: ClaimsCodec) -> Self {
        Self { codec }
    }

    /// Classify `token` as of `now`.
    pub fn validate(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> ValidationOutcome {
        let outcome = ValidationOutcome::from(self.decode(token, now));
        metrics::counter!(
            "token_validations_total",
            "outcome" => outcome.label()
        )
        .increment(1);
        outcome
    }

    /// Boolean form of [`Self::validate`].
    pub fn is_valid(&self, token: &str, now: DateTime<Utc>) -> bool {
        self.validate(token, now).is_valid()
    }

    /// User ID carried by an access token.
    ///
    /// Refresh tokens have no subject and always fail with
    /// [`DecodeError::Malformed`].
    pub fn subject_of(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<UserId, DecodeError> {
        let claims = self.decode(token, now)?;

        claims
            .sub
            .as_deref()
            .and_then(|sub| sub.parse::<UserId>().ok())
            .ok_or(DecodeError::Malformed)
            .inspect_err(|_| {
                tracing::info!(reason = "subject", "token rejected")
            })
    }

    /// Time left before `token` expires: `exp - now`.
    ///
    /// Signed and never clamped: an expired token yields a negative
    /// duration, not an error. The signature is still verified.
    pub fn remaining_lifetime(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<TimeDelta, DecodeError> {
        self.codec
            .verify(token)
            .map(|claims| claims.remaining(now))
            .inspect_err(|err| {
                tracing::info!(reason = err.reason(), "token rejected")
            })
    }

    /// Claims of an unexpired refresh token.
    ///
    /// Access tokens carry a subject and are refused here as
    /// [`DecodeError::Malformed`].
    pub fn validate_refresh(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Claims, DecodeError> {
        let claims = self.decode(token, now)?;
        if claims.sub.is_some() {
            tracing::info!(reason = "subject", "refresh token rejected");
            return Err(DecodeError::Malformed);
        }

        Ok(claims)
    }

    fn decode(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Claims, DecodeError> {
        self.codec
            .decode(token, now)
            .inspect_err(|err| {
                tracing::info!(reason = err.reason(), "token rejected")
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::claims::tests::{at, codec, flip_signature_bit};
    use crate::token::tests::{issuer, user};

    pub(crate) fn validator() -> TokenValidator {
        TokenValidator::new(codec())
    }

    #[test]
    fn test_round_trip() {
        let pair = issuer().create_token_pair(&user(), at(0)).unwrap();

        match validator().validate(pair.access_token(), at(0)) {
            ValidationOutcome::Valid(claims) => {
                assert_eq!(claims.sub.as_deref(), Some("42"));
            },
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(
            validator().subject_of(pair.access_token(), at(0)).unwrap(),
            user().id
        );
    }

    #[test]
    fn test_expiry_scenario() {
        let validator = validator();
        let pair = issuer().create_token_pair(&user(), at(0)).unwrap();
        let token = pair.access_token();

        assert!(validator.is_valid(token, at(14 * 60)));
        assert_eq!(
            validator.validate(token, at(16 * 60)),
            ValidationOutcome::Expired
        );
        assert_eq!(
            validator.subject_of(token, at(16 * 60)),
            Err(DecodeError::Expired)
        );
    }

    #[test]
    fn test_remaining_lifetime() {
        let validator = validator();
        let token = issuer().access_token(&user(), at(0)).unwrap();

        assert_eq!(
            validator.remaining_lifetime(&token, at(0)).unwrap(),
            TimeDelta::minutes(15)
        );
        assert_eq!(
            validator.remaining_lifetime(&token, at(16 * 60)).unwrap(),
            TimeDelta::minutes(-1)
        );
        assert_eq!(
            validator.remaining_lifetime(&flip_signature_bit(&token, 3), at(0)),
            Err(DecodeError::BadSignature)
        );
    }

    #[test]
    fn test_outcome_mapping() {
        let validator = validator();
        let token = issuer().access_token(&user(), at(0)).unwrap();

        assert_eq!(
            validator.validate(&flip_signature_bit(&token, 100), at(0)),
            ValidationOutcome::MalformedSignature
        );
        assert_eq!(validator.validate("", at(0)), ValidationOutcome::Malformed);
        assert_eq!(
            validator.validate("a.b", at(0)),
            ValidationOutcome::Malformed
        );

        let (_, rest) = token.split_once('.').unwrap();
        let hs256_header = "eyJ0eXAiOiJKV1QiLCJhbGciOiJIUzI1NiJ9";
        assert_eq!(
            validator.validate(&format!("{hs256_header}.{rest}"), at(0)),
            ValidationOutcome::UnsupportedFormat
        );
    }

    #[test]
    fn test_refresh_token_has_no_subject() {
        let validator = validator();
        let pair = issuer().create_token_pair(&user(), at(0)).unwrap();

        // The token itself is sound...
        assert!(validator.is_valid(pair.refresh_token(), at(0)));
        assert!(
            validator.validate_refresh(pair.refresh_token(), at(0)).is_ok()
        );
        // ...but never identifies anyone.
        assert_eq!(
            validator.subject_of(pair.refresh_token(), at(0)),
            Err(DecodeError::Malformed)
        );
        assert_eq!(
            validator.validate_refresh(pair.access_token(), at(0)),
            Err(DecodeError::Malformed)
        );
    }

    #[test]
    fn test_non_numeric_subject() {
        let codec = codec();
        let token = codec
            .encode(&Claims::access("admin", at(0), at(60)))
            .unwrap();

        assert!(validator().is_valid(&token, at(0)));
        assert_eq!(
            validator().subject_of(&token, at(0)),
            Err(DecodeError::Malformed)
        );
    }
}
