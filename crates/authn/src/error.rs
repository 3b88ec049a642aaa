//! Authentication error types.
//!
//! Errors split into two families: startup errors (key loading, key
//! generation, configuration) which are fatal — there is no degraded-but-
//! running mode — and per-request errors (verification failures) which the
//! caller maps to an authentication failure response.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while issuing or verifying credentials.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// A signing key file could not be read from disk.
    #[error("could not read signing key {kid} from {path}")]
    KeyRead {
        /// Key id the file was registered under.
        kid: String,
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// A key file did not contain a valid RSA private key.
    #[error("could not parse RSA private key {kid} from {path}: {reason}")]
    KeyParse {
        /// Key id the file was registered under.
        kid: String,
        /// Path whose contents failed to parse.
        path: PathBuf,
        /// Parser diagnostic.
        reason: String,
    },

    /// A configured key id is not a valid ULID.
    #[error("invalid key id {0:?}")]
    InvalidKeyId(String),

    /// The monotonic key id generator failed; tokens cannot be minted.
    #[error("could not generate key id: {0}")]
    KeyIdGeneration(String),

    /// Bootstrap key-pair generation failed.
    #[error("could not generate signing key pair: {0}")]
    KeyGeneration(String),

    /// Configuration failed cross-field validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The token manager has no signing key to sign with.
    #[error("token manager not initialized with signing keys")]
    Uninitialized,

    /// The token's kid header references a key not in the ring.
    #[error("unknown signing key: {kid}")]
    UnknownSigningKey {
        /// Key id from the token header.
        kid: String,
    },

    /// The token header carries an algorithm other than the configured one.
    #[error("unexpected signing method: {alg}")]
    UnexpectedSigningMethod {
        /// Algorithm from the token header.
        alg: String,
    },

    /// Signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,

    /// Malformed token — cannot be decoded.
    #[error("invalid token format: {0}")]
    InvalidTokenFormat(String),

    /// Token has expired.
    #[error("token is expired")]
    Expired,

    /// Token not yet valid (nbf claim in the future).
    #[error("token is not valid yet")]
    NotYetValid,

    /// Audience doesn't contain the configured value.
    #[error("invalid audience {0:?}")]
    InvalidAudience(String),

    /// Issuer doesn't match the configured value.
    #[error("invalid issuer {0:?}")]
    InvalidIssuer(String),

    /// The federated identity credential was rejected.
    #[error("invalid identity credential: {0}")]
    InvalidCredential(String),

    /// The identity's hosted domain is not on the allow list.
    #[error("{domain} is not an authorized domain")]
    UnauthorizedDomain {
        /// Domain claim from the identity payload.
        domain: String,
    },
}

impl AuthError {
    /// Whether this error is fatal to initialization.
    ///
    /// Fatal errors occur at startup (key loading, key generation, config);
    /// everything else is a per-request authentication failure the caller
    /// recovers from.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AuthError::KeyRead { .. }
                | AuthError::KeyParse { .. }
                | AuthError::InvalidKeyId(_)
                | AuthError::KeyIdGeneration(_)
                | AuthError::KeyGeneration(_)
                | AuthError::InvalidConfig(_)
                | AuthError::Uninitialized
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken => AuthError::InvalidTokenFormat("invalid JWT structure".into()),
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::ImmatureSignature => AuthError::NotYetValid,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                AuthError::UnexpectedSigningMethod { alg: "unknown".into() }
            },
            ErrorKind::Base64(e) => AuthError::InvalidTokenFormat(format!("base64 decode: {e}")),
            ErrorKind::Json(e) => AuthError::InvalidTokenFormat(format!("claims JSON: {e}")),
            _ => AuthError::InvalidTokenFormat(format!("JWT error: {err}")),
        }
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::UnknownSigningKey { kid: "01JF3V".into() };
        assert_eq!(err.to_string(), "unknown signing key: 01JF3V");

        let err = AuthError::Expired;
        assert_eq!(err.to_string(), "token is expired");

        let err = AuthError::UnauthorizedDomain { domain: "evil.example".into() };
        assert_eq!(err.to_string(), "evil.example is not an authorized domain");

        let err = AuthError::Uninitialized;
        assert_eq!(err.to_string(), "token manager not initialized with signing keys");
    }

    #[test]
    fn test_error_from_jsonwebtoken() {
        let jwt_err =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidSignature);
        let auth_err: AuthError = jwt_err.into();
        assert!(matches!(auth_err, AuthError::InvalidSignature));

        let jwt_err =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::ExpiredSignature);
        let auth_err: AuthError = jwt_err.into();
        assert!(matches!(auth_err, AuthError::Expired));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(AuthError::InvalidConfig("bad".into()).is_fatal());
        assert!(AuthError::KeyGeneration("rng".into()).is_fatal());
        assert!(AuthError::InvalidKeyId("nope".into()).is_fatal());
        assert!(AuthError::Uninitialized.is_fatal());

        assert!(!AuthError::Expired.is_fatal());
        assert!(!AuthError::InvalidSignature.is_fatal());
        assert!(!AuthError::UnknownSigningKey { kid: "x".into() }.is_fatal());
        assert!(!AuthError::UnauthorizedDomain { domain: "x".into() }.is_fatal());
    }

    #[test]
    fn test_key_read_preserves_source_chain() {
        use std::error::Error;

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = AuthError::KeyRead {
            kid: "01JF3V".into(),
            path: PathBuf::from("/keys/01JF3V.pem"),
            source: io_err,
        };

        let source = err.source().expect("source chain must be preserved");
        assert_eq!(source.to_string(), "no such file");
    }
}
