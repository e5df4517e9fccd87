//! jeton issues, refreshes and validates HS512 signed bearer tokens.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use jeton::clock::SystemClock;
//! use jeton::config::Configuration;
//! use jeton::identity::{Authenticator, MemoryIdentityStore};
//!
//! # async fn run() -> jeton::error::Result<()> {
//! let config = Configuration::default().read()?;
//! let tokens = config.token_components()?;
//!
//! let authenticator = Authenticator::new(
//!     tokens.validator,
//!     tokens.issuer,
//!     Arc::new(MemoryIdentityStore::new()),
//!     Arc::new(SystemClock),
//! )
//! .with_timeout(config.identity.timeout());
//!
//! let principal =
//!     authenticator.authenticate_handle("user@example.com").await?;
//! let pair = authenticator.sign_in(&principal)?;
//! let same = authenticator.authenticate(pair.access_token()).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod identity;
pub mod key;
pub mod telemetry;
pub mod token;
pub mod validator;

pub use claims::{Claims, ClaimsCodec};
pub use error::{ConfigurationError, DecodeError, Error, IdentityError, Result};
pub use identity::{
    Authenticator, IdentityResolver, MemoryIdentityStore, Principal,
    UserDetails, UserId,
};
pub use key::SigningKey;
pub use token::{Lifetimes, TokenIssuer, TokenPair};
pub use validator::{TokenValidator, ValidationOutcome};
