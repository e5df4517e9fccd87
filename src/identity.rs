//! Boundary with the user store.
//!
//! The store itself lives outside this crate. It is reached through
//! [`IdentityResolver`], and every call is bounded by a timeout because it
//! may block on I/O.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::{IdentityError, Result};
use crate::token::{TokenIssuer, TokenPair};
use crate::validator::TokenValidator;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Numeric user identifier, carried as text in the `sub` claim.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// User as returned by the identity store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub id: UserId,
    /// Human-readable handle, usually the email address.
    pub handle: String,
    /// Granted authorities.
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub deleted_at: Option<NaiveDate>,
}

impl UserDetails {
    /// Create a new [`UserDetails`] without roles.
    pub fn new(id: UserId, handle: impl Into<String>) -> Self {
        Self {
            id,
            handle: handle.into(),
            roles: Vec::new(),
            deleted_at: None,
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn deleted(mut self, date: NaiveDate) -> Self {
        self.deleted_at = Some(date);
        self
    }
}

/// Authenticated user. A principal never carries credentials: the token
/// already proved who the user is.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Principal {
    user: UserDetails,
}

impl Principal {
    pub fn user(&self) -> &UserDetails {
        &self.user
    }

    pub fn id(&self) -> UserId {
        self.user.id
    }

    pub fn authorities(&self) -> &[String] {
        &self.user.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.user.roles.iter().any(|r| r == role)
    }
}

impl TryFrom<UserDetails> for Principal {
    type Error = IdentityError;

    fn try_from(user: UserDetails) -> std::result::Result<Self, Self::Error> {
        if let Some(date) = user.deleted_at {
            return Err(IdentityError::Deleted { date });
        }

        Ok(Self { user })
    }
}

/// Port for user lookup.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Find a user by its identifier.
    async fn resolve_by_id(
        &self,
        id: UserId,
    ) -> std::result::Result<UserDetails, IdentityError>;

    /// Find a user by its handle.
    async fn resolve_by_handle(
        &self,
        handle: &str,
    ) -> std::result::Result<UserDetails, IdentityError>;
}

/// In-memory identity store.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    users: RwLock<HashMap<UserId, UserDetails>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a user.
    pub fn insert(&self, user: UserDetails) {
        self.users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(user.id, user);
    }

    pub fn remove(&self, id: UserId) -> Option<UserDetails> {
        self.users
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
    }
}

#[async_trait]
impl IdentityResolver for MemoryIdentityStore {
    async fn resolve_by_id(
        &self,
        id: UserId,
    ) -> std::result::Result<UserDetails, IdentityError> {
        self.users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or(IdentityError::NotFound)
    }

    async fn resolve_by_handle(
        &self,
        handle: &str,
    ) -> std::result::Result<UserDetails, IdentityError> {
        self.users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .find(|user| user.handle.eq_ignore_ascii_case(handle))
            .cloned()
            .ok_or(IdentityError::NotFound)
    }
}

/// Glue between tokens and the identity store.
#[derive(Clone)]
pub struct Authenticator {
    validator: TokenValidator,
    issuer: TokenIssuer,
    resolver: Arc<dyn IdentityResolver>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl Authenticator {
    /// Create a new [`Authenticator`].
    pub fn new(
        validator: TokenValidator,
        issuer: TokenIssuer,
        resolver: Arc<dyn IdentityResolver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            validator,
            issuer,
            resolver,
            clock,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Bound every identity lookup to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve the principal behind an access token.
    pub async fn authenticate(&self, token: &str) -> Result<Principal> {
        let id = self.validator.subject_of(token, self.clock.now())?;
        let user = self.bounded(self.resolver.resolve_by_id(id)).await?;

        Ok(self.principal(user)?)
    }

    /// Resolve the principal behind a handle, e.g. right after a password
    /// check done by the caller.
    pub async fn authenticate_handle(&self, handle: &str) -> Result<Principal> {
        let user = self
            .bounded(self.resolver.resolve_by_handle(handle))
            .await?;

        Ok(self.principal(user)?)
    }

    /// Issue a fresh token pair for an authenticated principal.
    pub fn sign_in(&self, principal: &Principal) -> Result<TokenPair> {
        self.issuer
            .create_token_pair(principal.user(), self.clock.now())
    }

    /// Mint a new access token once `refresh_token` is checked.
    pub fn refresh(
        &self,
        principal: &Principal,
        refresh_token: String,
    ) -> Result<TokenPair> {
        let now = self.clock.now();
        self.validator.validate_refresh(&refresh_token, now)?;

        self.issuer
            .reissue_access_token(principal.user(), refresh_token, now)
    }

    fn principal(
        &self,
        user: UserDetails,
    ) -> std::result::Result<Principal, IdentityError> {
        Principal::try_from(user).inspect_err(|err| {
            tracing::info!(reason = %err, "authentication refused");
        })
    }

    async fn bounded<F>(
        &self,
        lookup: F,
    ) -> std::result::Result<UserDetails, IdentityError>
    where
        F: Future<Output = std::result::Result<UserDetails, IdentityError>>,
    {
        let result = match tokio::time::timeout(self.timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(IdentityError::Timeout),
        };

        let outcome = match &result {
            Ok(_) => "found",
            Err(IdentityError::NotFound) => "not_found",
            Err(IdentityError::Timeout) => "timeout",
            Err(_) => "error",
        };
        metrics::counter!("identity_resolutions_total", "outcome" => outcome)
            .increment(1);

        if let Err(err) = &result {
            tracing::info!(reason = %err, "identity lookup failed");
        }

        result
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("validator", &self.validator)
            .field("issuer", &self.issuer)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
