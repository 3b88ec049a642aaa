//! Signing key management: key ids, the monotonic id generator, and the key
//! ring.
//!
//! Key ids are ULIDs, so comparing two ids by value is the same as comparing
//! their creation times. The ring exploits this to answer "which key signs
//! new tokens" (the greatest id) while older keys stay addressable for
//! verifying tokens signed before a rotation.
//!
//! The ring is immutable after construction. Rotation is modeled as building
//! a new ring (in practice: redeploy with an updated key map), never as
//! mutating keys in place, so concurrent sign/verify calls need no locking.

use std::{collections::HashMap, fmt, fs, path::PathBuf, str::FromStr, time::SystemTime};

use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey};
use parking_lot::Mutex;
use rsa::{
    RsaPrivateKey,
    pkcs1::DecodeRsaPrivateKey,
    pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey, LineEnding},
};
use ulid::Ulid;
use zeroize::Zeroizing;

use crate::{
    clock::Clock,
    error::{AuthError, Result},
};

/// Modulus size for bootstrap-generated signing keys.
pub const GENERATED_KEY_BITS: usize = 4096;

/// Identifier of a signing key, embedded in token headers as `kid`.
///
/// A 128-bit ULID: millisecond timestamp plus random entropy,
/// lexicographically sortable. The same generator also produces the
/// correlation id shared between an access token and its refresh token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KeyId(Ulid);

impl KeyId {
    /// Milliseconds since the Unix epoch at which this id was created.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }

    /// The lowercase string form used as the `jti` claim linking an access
    /// token to its refresh token.
    #[must_use]
    pub fn correlation_id(&self) -> String {
        self.0.to_string().to_lowercase()
    }

    /// Builds a key id from raw parts. Test support for deterministic ids.
    pub(crate) fn from_parts(timestamp_ms: u64, random: u128) -> Self {
        Self(Ulid::from_parts(timestamp_ms, random))
    }
}

impl FromStr for KeyId {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s).map(Self).map_err(|_| AuthError::InvalidKeyId(s.to_string()))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Produces key ids safe for concurrent use.
///
/// ULID generators are monotonic but not thread-safe, so the generator sits
/// behind a mutex: two ids minted in the same millisecond by concurrent
/// callers are still strictly ordered and collision-free.
pub struct KeyIdGenerator {
    entropy: Mutex<ulid::Generator>,
}

impl KeyIdGenerator {
    /// Creates a generator with a fresh monotonic state.
    #[must_use]
    pub fn new() -> Self {
        Self { entropy: Mutex::new(ulid::Generator::new()) }
    }

    /// Generates the next key id for the given instant.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyIdGeneration`] if the monotonic random
    /// component overflows. This is fatal: tokens cannot be minted without
    /// fresh ids.
    pub fn next(&self, now: DateTime<Utc>) -> Result<KeyId> {
        let mut entropy = self.entropy.lock();
        entropy
            .generate_from_datetime_with_source(SystemTime::from(now), &mut rand::thread_rng())
            .map(KeyId)
            .map_err(|err| AuthError::KeyIdGeneration(err.to_string()))
    }
}

impl Default for KeyIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// One signing key pair held by the ring. The private half never leaves this
/// module except as an opaque [`EncodingKey`] handed to the signer.
struct RingKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

/// The set of signing keys, indexed by key id.
///
/// Exactly one key is "current" — the one with the greatest id — and signs
/// all new tokens. Every key in the ring remains usable for verification, so
/// tokens signed with a retired key stay valid as long as that key is kept in
/// the map. A ring built without the old key can no longer verify them.
pub struct KeyRing {
    keys: HashMap<KeyId, RingKey>,
    current: KeyId,
}

impl KeyRing {
    /// Builds a ring from a mapping of key id strings to PEM private key
    /// files. If the mapping is empty a fresh RSA-4096 pair is generated so
    /// the service can boot with zero configuration.
    ///
    /// # Errors
    ///
    /// All errors here are fatal to initialization:
    /// - [`AuthError::InvalidKeyId`] if a map key is not a ULID
    /// - [`AuthError::KeyRead`] if a key file is missing or unreadable
    /// - [`AuthError::KeyParse`] if a file is not an RSA private key
    /// - [`AuthError::KeyGeneration`] if the bootstrap pair cannot be made
    pub fn load(
        files: &HashMap<String, PathBuf>,
        idgen: &KeyIdGenerator,
        clock: &dyn Clock,
    ) -> Result<Self> {
        let mut keys = HashMap::new();
        let mut current: Option<KeyId> = None;

        for (kid_str, path) in files {
            let kid: KeyId = kid_str.parse()?;

            let pem = Zeroizing::new(fs::read_to_string(path).map_err(|source| {
                AuthError::KeyRead { kid: kid_str.clone(), path: path.clone(), source }
            })?);

            let key = parse_private_pem(&pem).map_err(|reason| AuthError::KeyParse {
                kid: kid_str.clone(),
                path: path.clone(),
                reason,
            })?;

            tracing::debug!(kid = %kid, path = %path.display(), "loaded signing key");
            keys.insert(kid, key);

            if current.is_none_or(|cur| kid > cur) {
                current = Some(kid);
            }
        }

        match current {
            Some(current) => Ok(Self { keys, current }),
            None => Self::generate_with_bits(GENERATED_KEY_BITS, idgen, clock),
        }
    }

    /// Builds a single-key ring around an externally supplied PEM private
    /// key, assigning it a freshly generated id. Intended for embedders and
    /// tests that manage key material themselves.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::KeyParse`] if the PEM is not an RSA private key,
    /// or [`AuthError::KeyIdGeneration`] if no id could be minted.
    pub fn with_key(private_pem: &str, idgen: &KeyIdGenerator, clock: &dyn Clock) -> Result<Self> {
        let key = parse_private_pem(private_pem).map_err(|reason| AuthError::KeyParse {
            kid: "<provided>".into(),
            path: PathBuf::new(),
            reason,
        })?;
        let kid = idgen.next(clock.now())?;

        let mut keys = HashMap::new();
        keys.insert(kid, key);
        Ok(Self { keys, current: kid })
    }

    /// Generates a ring holding one fresh key pair with the given modulus
    /// size. [`load`](Self::load) calls this with [`GENERATED_KEY_BITS`];
    /// tests use smaller moduli to keep generation fast.
    pub(crate) fn generate_with_bits(
        bits: usize,
        idgen: &KeyIdGenerator,
        clock: &dyn Clock,
    ) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut rand::rngs::OsRng, bits)
            .map_err(|err| AuthError::KeyGeneration(err.to_string()))?;
        let pem = private
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|err| AuthError::KeyGeneration(err.to_string()))?;
        let key = build_ring_key(&private, &pem).map_err(AuthError::KeyGeneration)?;
        let kid = idgen.next(clock.now())?;

        tracing::info!(kid = %kid, bits, "no signing keys configured, generated key pair");

        let mut keys = HashMap::new();
        keys.insert(kid, key);
        Ok(Self { keys, current: kid })
    }

    /// The key that signs new tokens, fixed at construction time.
    pub(crate) fn current(&self) -> Result<(KeyId, &EncodingKey)> {
        self.keys
            .get(&self.current)
            .map(|key| (self.current, &key.encoding))
            .ok_or(AuthError::Uninitialized)
    }

    /// Id of the key currently used for signing.
    #[must_use]
    pub fn current_key_id(&self) -> KeyId {
        self.current
    }

    /// Public key for verifying a signature made with `kid`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::UnknownSigningKey`] if the id is not in the ring.
    pub fn public_key(&self, kid: &KeyId) -> Result<&DecodingKey> {
        self.keys
            .get(kid)
            .map(|key| &key.decoding)
            .ok_or_else(|| AuthError::UnknownSigningKey { kid: kid.to_string() })
    }

    /// Whether the ring holds a key with the given id.
    #[must_use]
    pub fn contains(&self, kid: &KeyId) -> bool {
        self.keys.contains_key(kid)
    }

    /// Number of keys in the ring.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the ring is empty. Always false for rings built through the
    /// public constructors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Parses a PEM private key (PKCS#8 or PKCS#1) into a ring entry, deriving
/// the public half for verification.
fn parse_private_pem(pem: &str) -> std::result::Result<RingKey, String> {
    let private = RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|err| err.to_string())?;
    build_ring_key(&private, pem)
}

fn build_ring_key(
    private: &RsaPrivateKey,
    private_pem: &str,
) -> std::result::Result<RingKey, String> {
    let encoding = EncodingKey::from_rsa_pem(private_pem.as_bytes()).map_err(|err| err.to_string())?;

    let public_pem = private
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|err| err.to_string())?;
    let decoding = DecodingKey::from_rsa_pem(public_pem.as_bytes()).map_err(|err| err.to_string())?;

    Ok(RingKey { encoding, decoding })
}
