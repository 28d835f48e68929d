//! Identity resolution: from a verified provider subject to a local account.

use std::sync::Arc;

use crate::LinkResult;
use crate::profile::{IdentityKey, ProfileStore, Provider, ProviderProfile, TargetRef};

/// Result of looking up a provider subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A user-bound profile exists on this site.
    Matched {
        /// The bound account.
        target: TargetRef,
        /// The matching profile.
        profile: ProviderProfile,
    },
    /// The subject is known to the provider but not linked here.
    Unmatched,
    /// The provider did not offer a subject.
    NoCredentials,
}

/// Maps `(provider, remote_id)` to the account bound to it. Read-only.
#[derive(Clone)]
pub struct IdentityResolver {
    site_id: String,
    profiles: Arc<dyn ProfileStore>,
}

impl IdentityResolver {
    /// Creates a new resolver for `site_id`.
    pub fn new(site_id: impl Into<String>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            site_id: site_id.into(),
            profiles,
        }
    }

    /// Resolves a provider subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile lookup fails.
    pub async fn resolve(&self, provider: Provider, remote_id: &str) -> LinkResult<Resolution> {
        if remote_id.trim().is_empty() {
            return Ok(Resolution::NoCredentials);
        }

        let key = IdentityKey::for_user(&self.site_id, provider, remote_id);
        match self.profiles.find_by_identity(&key).await? {
            Some(profile) => {
                tracing::debug!(provider = %provider, target = %profile.target, "Identity matched");
                Ok(Resolution::Matched {
                    target: profile.target.clone(),
                    profile,
                })
            }
            None => {
                tracing::debug!(provider = %provider, "Identity unmatched");
                Ok(Resolution::Unmatched)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockProfileStore;

    fn resolver_with(profile: Option<ProviderProfile>) -> (IdentityResolver, Arc<MockProfileStore>) {
        let store = Arc::new(MockProfileStore::default());
        if let Some(profile) = profile {
            store.insert(profile);
        }
        (IdentityResolver::new("default", store.clone()), store)
    }

    #[tokio::test]
    async fn test_matched() {
        let profile = ProviderProfile::new("default", Provider::OAuth1, "12345", TargetRef::user("7"));
        let (resolver, _) = resolver_with(Some(profile.clone()));

        let resolution = resolver.resolve(Provider::OAuth1, "12345").await.unwrap();
        assert_eq!(
            resolution,
            Resolution::Matched {
                target: TargetRef::user("7"),
                profile
            }
        );
    }

    #[tokio::test]
    async fn test_unmatched_other_provider_or_site() {
        let profile = ProviderProfile::new("other-site", Provider::OAuth1, "12345", TargetRef::user("7"));
        let (resolver, _) = resolver_with(Some(profile));
        assert_eq!(
            resolver.resolve(Provider::OAuth1, "12345").await.unwrap(),
            Resolution::Unmatched
        );
        assert_eq!(
            resolver.resolve(Provider::OAuth2, "12345").await.unwrap(),
            Resolution::Unmatched
        );
    }

    #[tokio::test]
    async fn test_domain_object_profiles_do_not_match() {
        let profile = ProviderProfile::new(
            "default",
            Provider::OAuth1,
            "12345",
            TargetRef::new("Article", "42"),
        );
        let (resolver, _) = resolver_with(Some(profile));
        assert_eq!(
            resolver.resolve(Provider::OAuth1, "12345").await.unwrap(),
            Resolution::Unmatched
        );
    }

    #[tokio::test]
    async fn test_empty_subject_skips_lookup() {
        let (resolver, store) = resolver_with(None);
        assert_eq!(
            resolver.resolve(Provider::OpenId, "").await.unwrap(),
            Resolution::NoCredentials
        );
        assert_eq!(store.identity_lookups(), 0);
    }
}
