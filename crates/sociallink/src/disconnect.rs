//! Two-phase removal of a provider profile.
//!
//! A safe request only renders a confirmation. The profile is deleted by a
//! form submission carrying `confirm`, and deleting an already-removed
//! profile succeeds quietly.

use std::sync::Arc;

use uuid::Uuid;

use crate::LinkResult;
use crate::config::LinkConfig;
use crate::context::RequestContext;
use crate::outcome::{FlowOutcome, RenderState};
use crate::profile::ProfileStore;
use crate::target::{DomainObject, ObjectDirectory};

/// Form field that confirms a disconnect.
pub const CONFIRM_FIELD: &str = "confirm";

/// Destination when nothing more specific is configured.
const FALLBACK_REDIRECT: &str = "/";

/// Picks where to go after a disconnect: the bound object's canonical URL,
/// then the per-session override, then the configured URL, then `/`.
#[must_use]
pub fn post_disconnect_redirect(
    object: Option<&DomainObject>,
    session_override: Option<&str>,
    configured: Option<&str>,
) -> String {
    let usable = |url: &&str| !url.is_empty();
    object
        .and_then(|o| o.canonical_url.as_deref())
        .filter(usable)
        .or(session_override.filter(usable))
        .or(configured.filter(usable))
        .unwrap_or(FALLBACK_REDIRECT)
        .to_string()
}

/// Handles the disconnect confirmation and deletion.
#[derive(Clone)]
pub struct Disconnector {
    config: Arc<LinkConfig>,
    profiles: Arc<dyn ProfileStore>,
    directory: Arc<dyn ObjectDirectory>,
}

impl Disconnector {
    /// Creates a new disconnector.
    pub fn new(
        config: Arc<LinkConfig>,
        profiles: Arc<dyn ProfileStore>,
        directory: Arc<dyn ObjectDirectory>,
    ) -> Self {
        Self {
            config,
            profiles,
            directory,
        }
    }

    /// Renders the confirmation, or deletes the profile on a confirmed
    /// submission.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage or directory lookup fails.
    pub async fn disconnect(&self, ctx: &RequestContext, profile_id: Uuid) -> LinkResult<FlowOutcome> {
        let profile = self.profiles.find_by_id(profile_id).await?;
        let confirmed = ctx.is_post() && ctx.form.contains_key(CONFIRM_FIELD);

        let Some(profile) = profile else {
            tracing::debug!(profile_id = %profile_id, "Profile already disconnected");
            return Ok(FlowOutcome::redirect(self.redirect_for(ctx, None)));
        };

        if !confirmed {
            return Ok(RenderState::ConfirmDisconnect((&profile).into()).into());
        }

        let object = self.directory.resolve(&profile.target).await?;
        if self.profiles.delete(profile.id).await? {
            tracing::info!(
                profile_id = %profile.id,
                provider = %profile.provider,
                target = %profile.target,
                "Disconnected provider profile"
            );
        }
        Ok(FlowOutcome::redirect(self.redirect_for(ctx, object.as_ref())))
    }

    fn redirect_for(&self, ctx: &RequestContext, object: Option<&DomainObject>) -> String {
        post_disconnect_redirect(
            object,
            ctx.session.disconnect_url().as_deref(),
            self.config.disconnect_redirect_url.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{Provider, ProviderProfile, TargetRef};
    use crate::test_support::{MockDirectory, MockProfileStore};

    fn article(url: Option<&str>) -> DomainObject {
        let object = DomainObject::new(TargetRef::new("Article", "42"));
        match url {
            Some(url) => object.with_canonical_url(url),
            None => object,
        }
    }

    #[test]
    fn test_redirect_decision_table() {
        let with_url = article(Some("/articles/42/"));
        let without_url = article(None);
        let blank_url = article(Some(""));

        let cases: [(Option<&DomainObject>, Option<&str>, Option<&str>, &str); 9] = [
            (Some(&with_url), Some("/session/"), Some("/config/"), "/articles/42/"),
            (Some(&without_url), Some("/session/"), Some("/config/"), "/session/"),
            (None, Some("/session/"), Some("/config/"), "/session/"),
            (None, None, Some("/config/"), "/config/"),
            (Some(&without_url), None, None, "/"),
            (None, None, None, "/"),
            (Some(&blank_url), Some("/session/"), Some("/config/"), "/session/"),
            (Some(&blank_url), None, Some("/config/"), "/config/"),
            (None, Some(""), Some("/config/"), "/config/"),
        ];

        for (object, session, configured, expected) in cases {
            assert_eq!(
                post_disconnect_redirect(object, session, configured),
                expected,
                "object={object:?} session={session:?} configured={configured:?}"
            );
        }
    }

    struct Harness {
        disconnector: Disconnector,
        profiles: Arc<MockProfileStore>,
        directory: Arc<MockDirectory>,
    }

    fn harness(config: LinkConfig) -> Harness {
        let profiles = Arc::new(MockProfileStore::default());
        let directory = Arc::new(MockDirectory::default());
        let disconnector = Disconnector::new(Arc::new(config), profiles.clone(), directory.clone());
        Harness {
            disconnector,
            profiles,
            directory,
        }
    }

    fn stored_profile(h: &Harness, target: TargetRef) -> ProviderProfile {
        let profile = ProviderProfile::new("default", Provider::OAuth2, "uid-1", target);
        h.profiles.insert(profile.clone());
        profile
    }

    #[tokio::test]
    async fn test_get_renders_confirmation() {
        let h = harness(LinkConfig::default());
        let profile = stored_profile(&h, TargetRef::user("1"));

        let outcome = h
            .disconnector
            .disconnect(&RequestContext::get(), profile.id)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            FlowOutcome::Render(RenderState::ConfirmDisconnect((&profile).into()))
        );
        assert_eq!(h.profiles.len(), 1);
    }

    #[tokio::test]
    async fn test_unconfirmed_post_does_not_delete() {
        let h = harness(LinkConfig::default());
        let profile = stored_profile(&h, TargetRef::user("1"));

        let outcome = h
            .disconnector
            .disconnect(&RequestContext::post(), profile.id)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            FlowOutcome::Render(RenderState::ConfirmDisconnect(_))
        ));
        assert_eq!(h.profiles.len(), 1);
    }

    #[tokio::test]
    async fn test_confirmed_post_deletes_and_redirects_to_object() {
        let h = harness(LinkConfig::default().with_disconnect_redirect_url("/config/"));
        h.directory.insert(article(Some("/articles/42/")));
        let profile = stored_profile(&h, TargetRef::new("Article", "42"));

        let ctx = RequestContext::post().with_form(CONFIRM_FIELD, "1");
        let outcome = h.disconnector.disconnect(&ctx, profile.id).await.unwrap();
        assert_eq!(outcome.location(), Some("/articles/42/"));
        assert_eq!(h.profiles.len(), 0);
    }

    #[tokio::test]
    async fn test_repeat_confirmed_post_is_idempotent() {
        let h = harness(LinkConfig::default().with_disconnect_redirect_url("/config/"));
        let profile = stored_profile(&h, TargetRef::user("1"));

        let mut ctx = RequestContext::post().with_form(CONFIRM_FIELD, "1");
        ctx.session.set_disconnect_url("/settings/").unwrap();

        let first = h.disconnector.disconnect(&ctx, profile.id).await.unwrap();
        let second = h.disconnector.disconnect(&ctx, profile.id).await.unwrap();
        assert_eq!(first.location(), Some("/settings/"));
        assert_eq!(second, first);
        assert_eq!(h.profiles.len(), 0);
    }
}
