//! Token claims and the issuance arithmetic for access/refresh pairs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

/// Claims carried by issued tokens.
///
/// Registered claims follow RFC 7519; the profile fields mirror what the
/// federated identity provider attests. Refresh tokens never carry the
/// profile fields, only enough registered claims to mint a replacement pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Token id. An access token and its refresh token share the same value,
    /// which lets the two be correlated in logs and revocation checks.
    #[serde(default)]
    pub jti: String,

    /// Subject: the stable user identifier from the identity provider.
    #[serde(default)]
    pub sub: String,

    /// Intended audiences.
    #[serde(default)]
    pub aud: Vec<String>,

    /// Issuer.
    #[serde(default)]
    pub iss: String,

    /// Issued-at, seconds since the Unix epoch.
    #[serde(default)]
    pub iat: i64,

    /// Not-before, seconds since the Unix epoch.
    #[serde(default)]
    pub nbf: i64,

    /// Expiry, seconds since the Unix epoch.
    #[serde(default)]
    pub exp: i64,

    /// Display name from the identity provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Email address from the identity provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Avatar URL from the identity provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    /// BCP 47 locale from the identity provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

impl Claims {
    /// Expiry as a UTC instant.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_default()
    }

    /// Not-before as a UTC instant.
    #[must_use]
    pub fn not_before(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.nbf, 0).unwrap_or_default()
    }
}

/// Builds the claims of a new access token from a seed.
///
/// The seed is either a validated identity payload (login) or the claims of a
/// previous access token (refresh); its subject and profile fields carry
/// over. Audience and issuer are taken from the seed when present so claims
/// survive a refresh unchanged, and filled from configuration otherwise.
pub(crate) fn access_claims(
    seed: &Claims,
    jti: String,
    conf: &AuthConfig,
    now: DateTime<Utc>,
) -> Claims {
    let aud = if seed.aud.is_empty() { vec![conf.audience.clone()] } else { seed.aud.clone() };
    let iss = if seed.iss.is_empty() { conf.issuer.clone() } else { seed.iss.clone() };

    Claims {
        jti,
        sub: seed.sub.clone(),
        aud,
        iss,
        iat: now.timestamp(),
        nbf: now.timestamp(),
        exp: (now + conf.access_duration).timestamp(),
        name: seed.name.clone(),
        email: seed.email.clone(),
        picture: seed.picture.clone(),
        locale: seed.locale.clone(),
    }
}

/// Builds the refresh token claims paired with `access`.
///
/// The refresh token shares the access token's id, subject, audience, issuer
/// and issue time, but becomes usable only near the access token's expiry
/// (`access.exp + overlap`, where the overlap is conventionally negative) and
/// lives for the refresh duration measured from the access token's issue
/// time. It deliberately carries no profile fields.
pub(crate) fn refresh_claims(access: &Claims, conf: &AuthConfig) -> Claims {
    Claims {
        jti: access.jti.clone(),
        sub: access.sub.clone(),
        aud: access.aud.clone(),
        iss: access.iss.clone(),
        iat: access.iat,
        nbf: access.exp + conf.refresh_overlap.num_seconds(),
        exp: access.iat + conf.refresh_duration.num_seconds(),
        name: None,
        email: None,
        picture: None,
        locale: None,
    }
}
