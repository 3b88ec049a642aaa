//! Shared test utilities for token testing.
//!
//! This module provides helpers for building token managers around small
//! pre-generated RSA keys (so tests never pay for RSA-4096 generation),
//! writing key files to disk for ring-loading tests, crafting raw JWT
//! strings (for attack testing), and mocking the identity validator. It is
//! feature-gated behind `testutil` to prevent leaking into production
//! builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! shortlink-authn = { path = ".", features = ["testutil"] }
//! ```

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Duration;
use parking_lot::Mutex;
use rsa::{
    RsaPrivateKey,
    pkcs8::{EncodePrivateKey, LineEnding},
};

use crate::{
    clock::Clock,
    config::AuthConfig,
    error::{AuthError, Result},
    identity::{IdentityPayload, IdentityValidator},
    keys::KeyId,
    tokens::TokenManager,
};

/// Modulus size for test keys. Big enough for RS256, small enough that
/// generating the two cached keys below takes well under a second.
pub const TEST_KEY_BITS: usize = 2048;

static TEST_PEMS: LazyLock<[String; 2]> = LazyLock::new(|| {
    let generate = || {
        let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, TEST_KEY_BITS)
            .expect("generate test RSA key");
        key.to_pkcs8_pem(LineEnding::LF).expect("encode test RSA key").to_string()
    };
    [generate(), generate()]
});

/// A PKCS#8 PEM RSA private key for tests. Generated once per process.
pub fn test_private_pem() -> &'static str {
    &TEST_PEMS[0]
}

/// A second, distinct test key, for rotation and wrong-key scenarios.
pub fn test_private_pem_alt() -> &'static str {
    &TEST_PEMS[1]
}

/// A deterministic key id. Larger `seq` means a newer id, so rings built
/// from several of these have a predictable current key.
pub fn deterministic_kid(seq: u64) -> KeyId {
    KeyId::from_parts(seq * 1_000, u128::from(seq))
}

/// Configuration used across the test suites: local policy values and the
/// standard one-hour/two-hour/15-minute-overlap windows.
pub fn test_config() -> AuthConfig {
    AuthConfig {
        client_id: "test-client-id.apps.example".into(),
        allowed_domain: "shortlink.app".into(),
        keys: HashMap::new(),
        audience: "http://localhost:3000".into(),
        issuer: "http://localhost:3001".into(),
        access_duration: Duration::hours(1),
        refresh_duration: Duration::hours(2),
        refresh_overlap: Duration::minutes(-15),
    }
}

/// Builds a token manager around [`test_private_pem`] and the given clock.
///
/// # Panics
///
/// Panics if the manager cannot be built (should not happen with the cached
/// key and [`test_config`]).
pub fn test_manager(clock: Arc<dyn Clock>) -> TokenManager {
    TokenManager::with_key(test_config(), test_private_pem(), clock)
        .expect("build test token manager")
}

/// Writes the cached test keys to `dir` and returns a key-file mapping for
/// [`AuthConfig::keys`], using [`deterministic_kid`] ids: key `n` in the
/// returned map is newer than key `n - 1`.
///
/// # Panics
///
/// Panics if a key file cannot be written.
pub fn write_key_files(dir: &Path, count: usize) -> HashMap<String, PathBuf> {
    assert!(count <= TEST_PEMS.len(), "only {} cached test keys exist", TEST_PEMS.len());

    let mut files = HashMap::new();
    for (seq, pem) in TEST_PEMS.iter().take(count).enumerate() {
        let kid = deterministic_kid(seq as u64 + 1);
        let path = dir.join(format!("{kid}.pem"));
        fs::write(&path, pem).expect("write test key file");
        files.insert(kid.to_string(), path);
    }
    files
}

/// Creates a raw JWT string from arbitrary header and payload JSON.
///
/// The resulting JWT has the structure `{header_b64}.{payload_b64}.`
/// with an empty signature. This is useful for testing rejection of
/// malformed or attack JWTs (e.g., `alg: "none"`, algorithm confusion).
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(header_json: &serde_json::Value, payload_json: &serde_json::Value) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.")
}

/// A sample identity payload for an account in the test config's allowed
/// domain.
pub fn test_identity_payload() -> IdentityPayload {
    IdentityPayload {
        subject: "118320769289384773600".into(),
        hosted_domain: Some("shortlink.app".into()),
        name: Some("Ada Lovelace".into()),
        email: Some("ada@shortlink.app".into()),
        picture: Some("https://lh3.example/photo.jpg".into()),
        locale: Some("en-GB".into()),
    }
}

/// Scripted [`IdentityValidator`] that returns a fixed payload or rejection
/// and records how it was called.
pub struct MockValidator {
    response: std::result::Result<IdentityPayload, String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockValidator {
    /// A validator that accepts any credential with the given payload.
    pub fn accepting(payload: IdentityPayload) -> Self {
        Self { response: Ok(payload), calls: Mutex::new(Vec::new()) }
    }

    /// A validator that rejects every credential with the given reason.
    pub fn rejecting(reason: &str) -> Self {
        Self { response: Err(reason.to_string()), calls: Mutex::new(Vec::new()) }
    }

    /// `(credential, client_id)` pairs seen so far.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl IdentityValidator for MockValidator {
    async fn validate(&self, credential: &str, client_id: &str) -> Result<IdentityPayload> {
        self.calls.lock().push((credential.to_string(), client_id.to_string()));
        match &self.response {
            Ok(payload) => Ok(payload.clone()),
            Err(reason) => Err(AuthError::InvalidCredential(reason.clone())),
        }
    }
}

/// Asserts that a [`Result<T, AuthError>`] is an `Err` matching the given
/// [`AuthError`] variant.
///
/// Works with any `AuthError` variant. On failure, prints the expected
/// variant and the actual result for debugging.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use shortlink_authn::assert_auth_error;
/// use shortlink_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::Expired);
/// assert_auth_error!(result, Expired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}
