//! Provider verification collaborator.
//!
//! The OAuth1, OAuth2 and OpenID handshakes live outside this crate. The
//! engine only needs each provider to produce an outbound redirect and,
//! on callback, a verified provider-scoped subject.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::RequestContext;
use crate::error::LinkError;
use crate::profile::{Credentials, Provider, ProviderProfile, TargetRef};

/// An identity assertion the provider has verified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedIdentity {
    /// Provider family.
    pub provider: Provider,

    /// Provider-scoped subject identifier. Empty when the handshake has not
    /// yielded a subject yet.
    pub remote_id: String,

    /// Credentials to store on the profile.
    #[serde(default)]
    pub credentials: Credentials,

    /// Profile attributes reported by the provider.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl VerifiedIdentity {
    /// Creates an identity with no credentials or attributes.
    #[must_use]
    pub fn new(provider: Provider, remote_id: impl Into<String>) -> Self {
        Self {
            provider,
            remote_id: remote_id.into(),
            credentials: Credentials::None,
            attributes: HashMap::new(),
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Adds a profile attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Returns a string attribute, if present and non-empty.
    #[must_use]
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Display handle reported by the provider, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        ["screen_name", "nickname", "name"]
            .iter()
            .find_map(|key| self.attribute_str(key))
    }

    /// Builds an unsaved profile binding this identity to `target`.
    #[must_use]
    pub fn to_profile(&self, site_id: &str, target: TargetRef) -> ProviderProfile {
        let profile = ProviderProfile::new(site_id, self.provider, &self.remote_id, target)
            .with_credentials(self.credentials.clone());
        match self.display_name() {
            Some(name) => profile.with_display_name(name),
            None => profile,
        }
    }
}

/// Why a provider could not produce a verified identity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// The user declined to authorize the application.
    #[error("User declined authorization")]
    Declined,

    /// The provider rejected the assertion.
    #[error("Assertion rejected: {0}")]
    Rejected(String),

    /// OpenID discovery failed to locate the provider.
    #[error("Discovery failed: {0}")]
    DiscoveryFailure(String),
}

impl VerificationError {
    /// Converts into the crate error for the given provider.
    #[must_use]
    pub fn into_link_error(self, provider: Provider) -> LinkError {
        match self {
            Self::DiscoveryFailure(message) => LinkError::discovery_failure(message),
            other => LinkError::verification_failed(provider.as_str(), other.to_string()),
        }
    }
}

/// One external provider, both legs of its redirect round trip.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// The provider family this verifier speaks for.
    fn provider(&self) -> Provider;

    /// Outbound leg: the URL to send the browser to.
    ///
    /// # Errors
    ///
    /// Returns `DiscoveryFailure` if an OpenID endpoint cannot be located.
    async fn authorization_url(&self, ctx: &RequestContext) -> Result<String, VerificationError>;

    /// Inbound leg: verify the callback request.
    ///
    /// # Errors
    ///
    /// Returns `Declined` or `Rejected` when no identity can be produced.
    async fn verify(&self, ctx: &RequestContext) -> Result<VerifiedIdentity, VerificationError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name_priority() {
        let identity = VerifiedIdentity::new(Provider::OAuth1, "1")
            .with_attribute("name", serde_json::json!("Alice A."))
            .with_attribute("screen_name", serde_json::json!("alice"));
        assert_eq!(identity.display_name(), Some("alice"));

        let identity = VerifiedIdentity::new(Provider::OAuth1, "1")
            .with_attribute("screen_name", serde_json::json!(""))
            .with_attribute("name", serde_json::json!("Alice A."));
        assert_eq!(identity.display_name(), Some("Alice A."));

        assert_eq!(VerifiedIdentity::new(Provider::OpenId, "x").display_name(), None);
    }

    #[test]
    fn test_into_link_error() {
        let err = VerificationError::Declined.into_link_error(Provider::OAuth1);
        assert!(matches!(err, LinkError::VerificationFailed { .. }));
        assert!(err.to_string().contains("oauth1"));

        let err = VerificationError::DiscoveryFailure("no xrds".to_string())
            .into_link_error(Provider::OpenId);
        assert!(matches!(err, LinkError::DiscoveryFailure { .. }));
    }
}
