//! Issue access and refresh tokens.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::claims::{Claims, ClaimsCodec};
use crate::error::{ConfigurationError, Error, Result};
use crate::identity::UserDetails;

pub const TOKEN_TYPE: &str = "Bearer";
pub(crate) const MIN_LIFETIME_MSEC: u64 = 1000;
// 100 years.
pub(crate) const MAX_LIFETIME_MSEC: u64 = 1000 * 60 * 60 * 24 * 365 * 100;

/// How long issued tokens stay valid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Lifetimes {
    access: TimeDelta,
    refresh: TimeDelta,
}

impl Lifetimes {
    /// Both lifetimes must be between one second and one hundred years.
    pub fn new(
        access: TimeDelta,
        refresh: TimeDelta,
    ) -> std::result::Result<Self, ConfigurationError> {
        Ok(Self {
            access: check_lifetime("access", access)?,
            refresh: check_lifetime("refresh", refresh)?,
        })
    }

    pub fn access(&self) -> TimeDelta {
        self.access
    }

    pub fn refresh(&self) -> TimeDelta {
        self.refresh
    }
}

impl Default for Lifetimes {
    fn default() -> Self {
        Self {
            access: TimeDelta::minutes(15),
            refresh: TimeDelta::days(14),
        }
    }
}

pub(crate) fn check_lifetime(
    field: &'static str,
    lifetime: TimeDelta,
) -> std::result::Result<TimeDelta, ConfigurationError> {
    let msec = u64::try_from(lifetime.num_milliseconds()).unwrap_or(0);
    if !(MIN_LIFETIME_MSEC..=MAX_LIFETIME_MSEC).contains(&msec) {
        return Err(ConfigurationError::InvalidLifetime {
            field,
            minimum: MIN_LIFETIME_MSEC,
            maximum: MAX_LIFETIME_MSEC,
        });
    }

    Ok(lifetime)
}

/// `now + lifetime`, refusing instants past the supported date range.
fn expiration(
    now: DateTime<Utc>,
    lifetime: TimeDelta,
) -> Result<DateTime<Utc>> {
    now.checked_add_signed(lifetime)
        .ok_or(Error::ExpirationOutOfRange)
}

/// Tokens handed to a freshly authenticated user.
///
/// Nothing here is persisted; the caller owns the pair.
#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    token_type: &'static str,
    user_handle: String,
    access_token: String,
    refresh_token: String,
    /// Access token lifetime, in seconds.
    expires_in: i64,
}

impl TokenPair {
    pub fn token_type(&self) -> &str {
        self.token_type
    }

    pub fn user_handle(&self) -> &str {
        &self.user_handle
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn expires_in(&self) -> i64 {
        self.expires_in
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("token_type", &self.token_type)
            .field("user_handle", &self.user_handle)
            .field("access_token", &"[redacted]")
            .field("refresh_token", &"[redacted]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Build signed tokens for authenticated users.
#[derive(Clone, Debug)]
pub struct TokenIssuer {
    codec: ClaimsCodec,
    lifetimes: Lifetimes,
}

impl TokenIssuer {
    /// Create a new [`TokenIssuer`].
    pub fn new(codec: ClaimsCodec, lifetimes: Lifetimes) -> Self {
        Self { codec, lifetimes }
    }

    pub fn lifetimes(&self) -> Lifetimes {
        self.lifetimes
    }

    /// Sign an access token for `user`, valid from `now`.
    pub fn access_token(
        &self,
        user: &UserDetails,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let expires_at = expiration(now, self.lifetimes.access)?;
        let claims = Claims::access(user.id.to_string(), now, expires_at);
        let token = self.codec.encode(&claims)?;

        metrics::counter!("tokens_issued_total", "kind" => "access")
            .increment(1);
        tracing::debug!(user_id = %user.id, "access token issued");

        Ok(token)
    }

    /// Sign a refresh token. It carries only an expiration.
    fn refresh_token(&self, now: DateTime<Utc>) -> Result<String> {
        let expires_at = expiration(now, self.lifetimes.refresh)?;
        let token = self.codec.encode(&Claims::refresh(expires_at))?;

        metrics::counter!("tokens_issued_total", "kind" => "refresh")
            .increment(1);

        Ok(token)
    }

    /// Create both tokens on login.
    pub fn create_token_pair(
        &self,
        user: &UserDetails,
        now: DateTime<Utc>,
    ) -> Result<TokenPair> {
        let access_token = self.access_token(user, now)?;
        let refresh_token = self.refresh_token(now)?;

        Ok(self.pair(user, access_token, refresh_token))
    }

    /// Mint a new access token and hand back `refresh_token` untouched.
    ///
    /// The refresh token is not inspected here; checking it is up to the
    /// caller.
    pub fn reissue_access_token(
        &self,
        user: &UserDetails,
        refresh_token: String,
        now: DateTime<Utc>,
    ) -> Result<TokenPair> {
        let access_token = self.access_token(user, now)?;

        Ok(self.pair(user, access_token, refresh_token))
    }

    fn pair(
        &self,
        user: &UserDetails,
        access_token: String,
        refresh_token: String,
    ) -> TokenPair {
        TokenPair {
            token_type: TOKEN_TYPE,
            user_handle: user.handle.clone(),
            access_token,
            refresh_token,
            expires_in: self.lifetimes.access.num_seconds(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::claims::tests::{T0, at, codec};
    use crate::identity::UserId;

    pub(crate) fn user() -> UserDetails {
        UserDetails::new(UserId::new(42), "user@example.com")
            .with_roles(["ROLE_USER"])
    }

    pub(crate) fn issuer() -> TokenIssuer {
        TokenIssuer::new(codec(), Lifetimes::default())
    }

    #[test]
    fn test_create_token_pair() {
        let issuer = issuer();
        let pair = issuer.create_token_pair(&user(), at(0)).unwrap();

        assert_eq!(pair.token_type(), TOKEN_TYPE);
        assert_eq!(pair.user_handle(), "user@example.com");
        assert_eq!(pair.expires_in(), 900);

        let access = codec().verify(pair.access_token()).unwrap();
        assert_eq!(access.sub.as_deref(), Some("42"));
        assert_eq!(access.iat, Some(at(0)));
        assert_eq!(access.exp, at(900));

        let refresh = codec().verify(pair.refresh_token()).unwrap();
        assert_eq!(refresh, Claims::refresh(at(14 * 24 * 3600)));
    }

    #[test]
    fn test_deterministic() {
        let issuer = issuer();
        let first = issuer.create_token_pair(&user(), at(0)).unwrap();
        let second = issuer.create_token_pair(&user(), at(0)).unwrap();
        assert_eq!(first, second);

        let later = issuer.create_token_pair(&user(), at(1)).unwrap();
        assert_ne!(first.access_token(), later.access_token());
    }

    #[test]
    fn test_reissue_keeps_refresh_token() {
        let issuer = issuer();
        let pair = issuer.create_token_pair(&user(), at(0)).unwrap();

        let reissued = issuer
            .reissue_access_token(
                &user(),
                pair.refresh_token().to_owned(),
                at(600),
            )
            .unwrap();
        assert_eq!(reissued.refresh_token(), pair.refresh_token());
        assert_ne!(reissued.access_token(), pair.access_token());

        let claims = codec().verify(reissued.access_token()).unwrap();
        assert_eq!(claims.iat, Some(at(600)));
        assert_eq!(claims.exp, at(1500));

        // Opaque pass-through, even for garbage.
        let reissued = issuer
            .reissue_access_token(&user(), "opaque".into(), at(600))
            .unwrap();
        assert_eq!(reissued.refresh_token(), "opaque");
    }

    #[test]
    fn test_lifetimes_bounds() {
        let day = TimeDelta::days(1);
        assert!(Lifetimes::new(TimeDelta::seconds(1), day).is_ok());

        for lifetime in [
            TimeDelta::zero(),
            TimeDelta::milliseconds(999),
            TimeDelta::minutes(-15),
            TimeDelta::days(365 * 101),
            TimeDelta::MAX,
        ] {
            assert!(matches!(
                Lifetimes::new(lifetime, day),
                Err(ConfigurationError::InvalidLifetime { field: "access", .. })
            ));
            assert!(matches!(
                Lifetimes::new(day, lifetime),
                Err(ConfigurationError::InvalidLifetime {
                    field: "refresh",
                    ..
                })
            ));
        }
    }

    #[test]
    fn test_shortest_lifetime_still_validates() {
        let lifetimes =
            Lifetimes::new(TimeDelta::seconds(1), TimeDelta::seconds(1))
                .unwrap();
        let issuer = TokenIssuer::new(codec(), lifetimes);
        let now = DateTime::from_timestamp(T0, 999_000_000).unwrap();

        let pair = issuer.create_token_pair(&user(), now).unwrap();
        assert!(codec().decode(pair.access_token(), at(0)).is_ok());
        assert!(codec().decode(pair.refresh_token(), at(0)).is_ok());
        assert_eq!(
            codec().decode(pair.access_token(), at(1)),
            Err(crate::error::DecodeError::Expired)
        );
    }

    #[test]
    fn test_expiration_out_of_range() {
        let issuer = issuer();
        let now = DateTime::<Utc>::MAX_UTC;

        assert!(matches!(
            issuer.access_token(&user(), now),
            Err(Error::ExpirationOutOfRange)
        ));
        assert!(matches!(
            issuer.create_token_pair(&user(), now),
            Err(Error::ExpirationOutOfRange)
        ));
    }

    #[test]
    fn test_sub_second_instants_are_truncated() {
        let now = DateTime::from_timestamp(T0, 999_000_000).unwrap();
        let token = issuer().access_token(&user(), now).unwrap();
        let claims = codec().verify(&token).unwrap();
        assert_eq!(claims.iat, Some(at(0)));
        assert_eq!(claims.exp, at(900));
    }

    #[test]
    fn test_serialize_and_debug() {
        let pair = issuer().create_token_pair(&user(), at(0)).unwrap();

        let json = serde_json::to_value(&pair).unwrap();
        assert_eq!(json["tokenType"], "Bearer");
        assert_eq!(json["userHandle"], "user@example.com");
        assert_eq!(json["accessToken"], pair.access_token());
        assert_eq!(json["refreshToken"], pair.refresh_token());
        assert_eq!(json["expiresIn"], 900);

        let debug = format!("{pair:?}");
        assert!(!debug.contains(pair.access_token()));
        assert!(!debug.contains(pair.refresh_token()));
    }
}
