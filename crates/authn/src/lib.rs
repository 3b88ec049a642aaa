//! # Shortlink Authentication
//!
//! Credential issuance and verification for shortlink services.
//!
//! This crate provides:
//! - **Token issuance**: Correlated access/refresh JWT pairs signed with RSA
//! - **Token verification**: Signature, expiry, audience and issuer checks
//! - **Key management**: A ULID-addressed key ring with rotation support
//! - **Federated login**: A validation boundary for external identity
//!   providers with hosted-domain policy
//!
//! ## Features
//!
//! - Only RS256 is accepted; tokens naming any other algorithm are rejected
//!   before signature verification
//! - Refresh tokens share the access token's id but carry no profile fields
//! - All time checks read an injected [`Clock`], so expiry behavior is
//!   deterministic under test
//!
//! ## Example
//!
//! ```no_run
//! use shortlink_authn::{AuthConfig, Claims, TokenManager};
//!
//! # fn example() -> shortlink_authn::Result<()> {
//! let manager = TokenManager::new(AuthConfig::from_env()?)?;
//!
//! let seed = Claims { sub: "118320769289384773600".into(), ..Claims::default() };
//! let pair = manager.create_token_pair(&seed)?;
//!
//! let claims = manager.verify(&pair.access_token)?;
//! println!("authenticated subject: {}", claims.sub);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Token claims and issuance arithmetic.
pub mod claims;
/// Injected time source.
pub mod clock;
/// Configuration loading and validation.
pub mod config;
/// Authentication error types.
pub mod error;
/// Federated identity validation boundary.
pub mod identity;
/// Key ids, the id generator, and the key ring.
pub mod keys;
/// Token issuance and verification.
pub mod tokens;

/// Test helpers, feature-gated to keep them out of production builds.
#[cfg(feature = "testutil")]
pub mod testutil;

// Re-export key types for convenience
pub use claims::Claims;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, ENV_PREFIX};
pub use error::{AuthError, Result};
pub use identity::{IdentityPayload, IdentityValidator, VALIDATION_TIMEOUT};
pub use keys::{GENERATED_KEY_BITS, KeyId, KeyIdGenerator, KeyRing};
pub use tokens::{TokenManager, TokenPair, expires_at};
