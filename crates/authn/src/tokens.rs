//! Token issuance and verification.
//!
//! [`TokenManager`] signs claims into JWTs with the key ring's current key,
//! stamping the key id into the `kid` header so verification can address the
//! right public key after a rotation. Verification is split in two layers:
//! [`parse`](TokenManager::parse) proves authenticity only (structure,
//! algorithm, key, signature), while [`verify`](TokenManager::verify) adds
//! the claim checks (expiry, not-before, audience, issuer). The split exists
//! because a refresh flow must read the claims of an access token that is
//! already expired.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, Header, Validation};

use crate::{
    claims::{self, Claims},
    clock::{Clock, SystemClock},
    config::AuthConfig,
    error::{AuthError, Result},
    keys::{KeyId, KeyIdGenerator, KeyRing},
};

/// The only accepted signing algorithm. Pinned: tokens naming any other
/// algorithm are rejected before signature verification.
const SIGNING_ALGORITHM: Algorithm = Algorithm::RS256;

/// An access token and its paired refresh token, sharing one token id.
#[derive(Clone, Debug)]
pub struct TokenPair {
    /// Short-lived token carrying the full claims.
    pub access_token: String,
    /// Longer-lived token used to mint the next pair once the access token
    /// nears expiry.
    pub refresh_token: String,
}

/// Issues and verifies signed tokens.
///
/// Cheap to share behind an `Arc`; all operations take `&self`.
pub struct TokenManager {
    pub(crate) conf: AuthConfig,
    pub(crate) keyring: KeyRing,
    pub(crate) idgen: KeyIdGenerator,
    pub(crate) clock: Arc<dyn Clock>,
}

impl TokenManager {
    /// Builds a manager from configuration, loading (or generating) signing
    /// keys and using the wall clock.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the configuration is invalid or the key ring
    /// cannot be built. See [`AuthError::is_fatal`].
    pub fn new(conf: AuthConfig) -> Result<Self> {
        Self::with_clock(conf, Arc::new(SystemClock))
    }

    /// Like [`new`](Self::new) but reading time from the given clock.
    pub fn with_clock(conf: AuthConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        conf.validate()?;
        let idgen = KeyIdGenerator::new();
        let keyring = KeyRing::load(&conf.keys, &idgen, clock.as_ref())?;
        Ok(Self { conf, keyring, idgen, clock })
    }

    /// Builds a manager around a single externally supplied PEM private key,
    /// ignoring any key files named in the configuration.
    ///
    /// # Errors
    ///
    /// Returns a fatal error if the configuration is invalid or the PEM is
    /// not an RSA private key.
    pub fn with_key(conf: AuthConfig, private_pem: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        conf.validate()?;
        let idgen = KeyIdGenerator::new();
        let keyring = KeyRing::with_key(private_pem, &idgen, clock.as_ref())?;
        Ok(Self { conf, keyring, idgen, clock })
    }

    /// Id of the key that signs new tokens.
    #[must_use]
    pub fn current_key_id(&self) -> KeyId {
        self.keyring.current_key_id()
    }

    /// The configuration this manager was built with.
    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.conf
    }

    /// Signs claims into a compact JWT with the current key, recording the
    /// key id in the `kid` header.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Uninitialized`] if no signing key is available,
    /// or a serialization error mapped through
    /// [`AuthError::InvalidTokenFormat`].
    pub fn sign(&self, claims: &Claims) -> Result<String> {
        let (kid, key) = self.keyring.current()?;

        let mut header = Header::new(SIGNING_ALGORITHM);
        header.kid = Some(kid.to_string());

        Ok(jsonwebtoken::encode(&header, claims, key)?)
    }

    /// Checks authenticity only: well-formed token, pinned algorithm, known
    /// key, valid signature. Claim validity (expiry, audience, ...) is NOT
    /// checked; use [`verify`](Self::verify) for that.
    ///
    /// The refresh flow relies on this to recover the claims of an expired
    /// access token.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidTokenFormat`] for structural problems
    /// - [`AuthError::UnexpectedSigningMethod`] for any algorithm but RS256
    /// - [`AuthError::UnknownSigningKey`] for an unrecognized `kid`
    /// - [`AuthError::InvalidSignature`] when the signature does not check out
    pub fn parse(&self, token: &str) -> Result<Claims> {
        let header = jsonwebtoken::decode_header(token)?;

        if header.alg != SIGNING_ALGORITHM {
            return Err(AuthError::UnexpectedSigningMethod { alg: format!("{:?}", header.alg) });
        }

        let kid_str = header
            .kid
            .ok_or_else(|| AuthError::InvalidTokenFormat("missing kid header".into()))?;
        // A kid that is not even a ULID cannot be in the ring.
        let kid: KeyId = kid_str
            .parse()
            .map_err(|_| AuthError::UnknownSigningKey { kid: kid_str.clone() })?;
        let key = self.keyring.public_key(&kid)?;

        // Signature check only. Claim validation happens against the
        // injected clock, not jsonwebtoken's internal wall-clock reads.
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        let data = jsonwebtoken::decode::<Claims>(token, key, &validation)?;
        Ok(data.claims)
    }

    /// Fully verifies a token: everything [`parse`](Self::parse) checks,
    /// then expiry, not-before, audience and issuer, in that order, with
    /// zero leeway.
    ///
    /// # Errors
    ///
    /// [`parse`](Self::parse)'s errors, plus [`AuthError::Expired`],
    /// [`AuthError::NotYetValid`], [`AuthError::InvalidAudience`] and
    /// [`AuthError::InvalidIssuer`].
    #[tracing::instrument(skip_all, err(level = "debug"))]
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let claims = self.parse(token)?;
        let now = self.clock.now().timestamp();

        if now >= claims.exp {
            return Err(AuthError::Expired);
        }
        if now < claims.nbf {
            return Err(AuthError::NotYetValid);
        }
        if !claims.aud.iter().any(|aud| aud == &self.conf.audience) {
            return Err(AuthError::InvalidAudience(format!("{:?}", claims.aud)));
        }
        if claims.iss != self.conf.issuer {
            return Err(AuthError::InvalidIssuer(claims.iss.clone()));
        }

        Ok(claims)
    }

    /// Builds the claims of a new access token from a seed, minting a fresh
    /// token id.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyIdGeneration`] if no id could be minted.
    pub fn access_claims(&self, seed: &Claims) -> Result<Claims> {
        let now = self.clock.now();
        let jti = self.idgen.next(now)?.correlation_id();
        Ok(claims::access_claims(seed, jti, &self.conf, now))
    }

    /// Builds the refresh token claims paired with the given access claims.
    #[must_use]
    pub fn refresh_claims(&self, access: &Claims) -> Claims {
        claims::refresh_claims(access, &self.conf)
    }

    /// Issues a correlated access/refresh token pair from a seed: a
    /// validated identity payload at login, or the parsed claims of the
    /// previous access token on refresh.
    ///
    /// # Errors
    ///
    /// Fails if id generation or signing fails.
    #[tracing::instrument(skip_all)]
    pub fn create_token_pair(&self, seed: &Claims) -> Result<TokenPair> {
        let access = self.access_claims(seed)?;
        let refresh = self.refresh_claims(&access);

        let access_token = self.sign(&access)?;
        let refresh_token = self.sign(&refresh)?;

        tracing::debug!(
            jti = %access.jti,
            kid = %self.current_key_id(),
            sub = %access.sub,
            "issued token pair"
        );

        Ok(TokenPair { access_token, refresh_token })
    }
}

/// Expiry instant of a token, checking authenticity but not validity.
///
/// Used to tell a client how long its refresh token remains usable, which
/// must work even while the paired access token is the one being presented.
///
/// # Errors
///
/// Same as [`TokenManager::parse`].
pub fn expires_at(manager: &TokenManager, token: &str) -> Result<DateTime<Utc>> {
    let claims = manager.parse(token)?;
    Ok(claims.expires_at())
}
