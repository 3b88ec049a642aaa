//! Federated identity validation boundary.
//!
//! Login starts from a credential issued by an external identity provider.
//! The provider-specific verification (fetching certificates, checking the
//! provider's signature) lives behind [`IdentityValidator`]; this crate only
//! enforces the local policy on the validated payload — the credential must
//! be issued for our client id and the account must belong to the allowed
//! hosted domain — and converts the payload into seed claims for
//! [`TokenManager::create_token_pair`](crate::tokens::TokenManager::create_token_pair).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    claims::Claims,
    error::{AuthError, Result},
    tokens::TokenManager,
};

/// Upper bound on a single identity validation round trip. Validators reach
/// over the network for provider certificates; a hung provider must not pin
/// a login request forever.
pub const VALIDATION_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// What an identity provider attests about an account, extracted from a
/// validated credential.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPayload {
    /// Stable account identifier, becomes the token subject.
    pub subject: String,
    /// Hosted domain of the account, when the provider reports one.
    pub hosted_domain: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Avatar URL.
    pub picture: Option<String>,
    /// BCP 47 locale.
    pub locale: Option<String>,
}

/// Validates a raw identity credential against a provider.
///
/// Implementations verify the credential's signature and that it was issued
/// for `client_id`, returning the attested payload. They do not apply local
/// policy; that stays in [`TokenManager::check_identity`].
#[async_trait]
pub trait IdentityValidator: Send + Sync {
    /// Verifies `credential` and extracts its payload.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredential`] if the credential is forged,
    /// expired, or issued for a different client.
    async fn validate(&self, credential: &str, client_id: &str) -> Result<IdentityPayload>;
}

impl TokenManager {
    /// Validates a federated identity credential and applies local policy.
    ///
    /// On success the returned claims carry the subject and profile fields
    /// and act as the seed for a new token pair. Validation is bounded by
    /// [`VALIDATION_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredential`] if the validator rejects the
    ///   credential or times out
    /// - [`AuthError::UnauthorizedDomain`] if the account's hosted domain is
    ///   not the configured one
    #[tracing::instrument(skip_all, err(level = "debug"))]
    pub async fn check_identity(
        &self,
        validator: &dyn IdentityValidator,
        credential: &str,
    ) -> Result<Claims> {
        let payload =
            tokio::time::timeout(VALIDATION_TIMEOUT, validator.validate(credential, &self.conf.client_id))
                .await
                .map_err(|_| {
                    AuthError::InvalidCredential("identity validation timed out".into())
                })??;

        if !self.conf.allowed_domain.is_empty() {
            let domain = payload.hosted_domain.as_deref().unwrap_or_default();
            if domain != self.conf.allowed_domain {
                tracing::warn!(sub = %payload.subject, domain, "rejected identity outside allowed domain");
                return Err(AuthError::UnauthorizedDomain { domain: domain.to_string() });
            }
        }

        tracing::debug!(sub = %payload.subject, "validated federated identity");

        Ok(Claims {
            sub: payload.subject,
            name: payload.name,
            email: payload.email,
            picture: payload.picture,
            locale: payload.locale,
            ..Claims::default()
        })
    }
}
