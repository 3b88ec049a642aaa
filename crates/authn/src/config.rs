//! Authentication configuration.
//!
//! [`AuthConfig`] carries the key-file mapping, the claim policy (audience,
//! issuer, durations), and the federated identity settings. It is loaded
//! from the environment with [`AuthConfig::from_env`] or constructed directly
//! and must pass [`AuthConfig::validate`] before a token manager is built.

use std::{collections::HashMap, env, path::PathBuf};

use chrono::Duration;

use crate::error::{AuthError, Result};

/// Environment variable prefix for all settings in this crate.
pub const ENV_PREFIX: &str = "SHORTLINK_AUTH_";

/// Configuration for credential issuance and verification.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client id of the federated identity provider; also the expected
    /// audience of incoming identity credentials.
    pub client_id: String,

    /// Email domain allowed to authenticate (hosted-domain claim).
    pub allowed_domain: String,

    /// Mapping of key id strings to PEM private key files. May be empty, in
    /// which case a key pair is generated at startup. Designed so keys can be
    /// mounted as secret files on disk.
    pub keys: HashMap<String, PathBuf>,

    /// Audience added to issued claims.
    pub audience: String,

    /// Issuer added to issued claims.
    pub issuer: String,

    /// How long access tokens are valid.
    pub access_duration: Duration,

    /// How long refresh tokens are valid, measured from the access token's
    /// issue time. Must exceed `access_duration`.
    pub refresh_duration: Duration,

    /// Offset from the access token's expiry at which the refresh token
    /// becomes usable. Conventionally negative so both tokens overlap and
    /// clients can rotate seamlessly.
    pub refresh_overlap: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            allowed_domain: "shortlink.app".into(),
            keys: HashMap::new(),
            audience: "https://shortlink.app".into(),
            issuer: "https://shortlink.app".into(),
            access_duration: Duration::hours(1),
            refresh_duration: Duration::hours(2),
            refresh_overlap: Duration::minutes(-15),
        }
    }
}

impl AuthConfig {
    /// Loads configuration from `SHORTLINK_AUTH_*` environment variables,
    /// falling back to defaults for anything unset.
    ///
    /// Durations are given in seconds (`REFRESH_OVERLAP_SECS` is signed);
    /// `KEYS` takes the form `kid=path,kid=path`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] if a variable fails to parse or
    /// the resulting configuration fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let conf = Self {
            client_id: env_string("CLIENT_ID").unwrap_or(defaults.client_id),
            allowed_domain: env_string("ALLOWED_DOMAIN").unwrap_or(defaults.allowed_domain),
            keys: match env_string("KEYS") {
                Some(spec) => parse_keys(&spec)?,
                None => HashMap::new(),
            },
            audience: env_string("AUDIENCE").unwrap_or(defaults.audience),
            issuer: env_string("ISSUER").unwrap_or(defaults.issuer),
            access_duration: env_seconds("ACCESS_DURATION_SECS")?
                .unwrap_or(defaults.access_duration),
            refresh_duration: env_seconds("REFRESH_DURATION_SECS")?
                .unwrap_or(defaults.refresh_duration),
            refresh_overlap: env_seconds("REFRESH_OVERLAP_SECS")?
                .unwrap_or(defaults.refresh_overlap),
        };

        conf.validate()?;
        Ok(conf)
    }

    /// Checks cross-field policy before the configuration is used.
    ///
    /// The refresh duration must exceed the access duration or the overlap
    /// window between the two tokens is meaningless.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidConfig`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.audience.is_empty() {
            return Err(AuthError::InvalidConfig("audience must not be empty".into()));
        }
        if self.issuer.is_empty() {
            return Err(AuthError::InvalidConfig("issuer must not be empty".into()));
        }
        if self.access_duration <= Duration::zero() {
            return Err(AuthError::InvalidConfig("access duration must be positive".into()));
        }
        if self.refresh_duration <= self.access_duration {
            return Err(AuthError::InvalidConfig(
                "refresh duration must exceed access duration".into(),
            ));
        }
        Ok(())
    }
}

/// Parses a `kid=path,kid=path` key specification.
///
/// Key ids are validated later against the ULID format when the ring loads;
/// here only the shape of the mapping is checked.
fn parse_keys(spec: &str) -> Result<HashMap<String, PathBuf>> {
    let mut keys = HashMap::new();
    for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (kid, path) = entry.split_once('=').ok_or_else(|| {
            AuthError::InvalidConfig(format!("key entry {entry:?} is not of the form kid=path"))
        })?;
        keys.insert(kid.trim().to_string(), PathBuf::from(path.trim()));
    }
    Ok(keys)
}

fn env_string(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}{name}")).ok().filter(|v| !v.is_empty())
}

fn env_seconds(name: &str) -> Result<Option<Duration>> {
    match env_string(name) {
        None => Ok(None),
        Some(raw) => {
            let secs: i64 = raw.parse().map_err(|_| {
                AuthError::InvalidConfig(format!("{ENV_PREFIX}{name} is not a number of seconds"))
            })?;
            Ok(Some(Duration::seconds(secs)))
        },
    }
}
