//! Configuration manager for jeton.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::claims::ClaimsCodec;
use crate::error::ConfigurationError;
use crate::key::SigningKey;
use crate::token::{
    Lifetimes, MAX_LIFETIME_MSEC, MIN_LIFETIME_MSEC, TokenIssuer,
    check_lifetime,
};
use crate::validator::TokenValidator;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
/// Environment variable overriding `token.secret`.
pub const SECRET_ENV: &str = "TOKEN_SECRET";

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Service name, only used in logs.
    #[serde(default)]
    pub name: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to token signing configuration.
    #[serde(skip_serializing)]
    pub token: Option<Token>,
    /// Related to the identity store.
    #[serde(default)]
    pub identity: Identity,
}

/// Token configuration.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Standard base64 secret, at least 64 bytes once decoded.
    #[serde(default)]
    pub secret: String,
    /// Access token lifetime.
    pub access_token_expiration_msec: u64,
    /// Refresh token lifetime.
    pub refresh_token_expiration_msec: u64,
    /// Tolerated clock skew when checking expiry.
    #[serde(default)]
    pub leeway_sec: u32,
}

/// Identity store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Upper bound of a single lookup.
    pub timeout_msec: u64,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            timeout_msec: crate::identity::DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl Identity {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_msec)
    }
}

impl Token {
    /// Decode the secret.
    pub fn signing_key(&self) -> Result<SigningKey, ConfigurationError> {
        SigningKey::load(&self.secret)
    }

    /// Checked token lifetimes.
    pub fn lifetimes(&self) -> Result<Lifetimes, ConfigurationError> {
        Lifetimes::new(
            lifetime(
                "access_token_expiration_msec",
                self.access_token_expiration_msec,
            )?,
            lifetime(
                "refresh_token_expiration_msec",
                self.refresh_token_expiration_msec,
            )?,
        )
    }

    pub fn leeway(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.leeway_sec))
    }
}

fn lifetime(
    field: &'static str,
    msec: u64,
) -> Result<TimeDelta, ConfigurationError> {
    let lifetime = i64::try_from(msec)
        .ok()
        .and_then(TimeDelta::try_milliseconds)
        .ok_or(ConfigurationError::InvalidLifetime {
            field,
            minimum: MIN_LIFETIME_MSEC,
            maximum: MAX_LIFETIME_MSEC,
        })?;

    check_lifetime(field, lifetime)
}

/// Everything built from the `token` section, sharing one key.
#[derive(Clone, Debug)]
pub struct TokenComponents {
    pub issuer: TokenIssuer,
    pub validator: TokenValidator,
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location, then applies environment overrides.
    pub fn read(self) -> Result<Self, ConfigurationError> {
        let file_path = if self.path.is_file() {
            self.path.clone()
        } else {
            Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        let file = File::open(&file_path).inspect_err(|err| {
            tracing::error!(
                error = %err,
                path = %file_path.display(),
                "configuration file not found"
            );
        })?;
        let mut config: Configuration = serde_yaml::from_reader(file)?;
        config.path = file_path;

        if let Ok(secret) = std::env::var(SECRET_ENV) {
            config.override_secret(secret);
        }

        Ok(config)
    }

    /// Parse a YAML document. No environment override is applied.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigurationError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    fn override_secret(&mut self, secret: String) {
        if let Some(token) = self.token.as_mut() {
            token.secret = secret;
        }
    }

    /// Build issuer and validator. Any error here must abort startup.
    pub fn token_components(
        &self,
    ) -> Result<TokenComponents, ConfigurationError> {
        let token = self
            .token
            .as_ref()
            .ok_or(ConfigurationError::MissingSection("token"))?;

        let key = Arc::new(token.signing_key().inspect_err(|err| {
            tracing::error!(error = %err, "invalid token secret");
        })?);
        let codec = ClaimsCodec::new(key).with_leeway(token.leeway());

        Ok(TokenComponents {
            issuer: TokenIssuer::new(codec.clone(), token.lifetimes()?),
            validator: TokenValidator::new(codec),
        })
    }
}
