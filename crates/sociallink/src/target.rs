//! Link targets and the target resolver.
//!
//! An identity is normally bound to a local account, but the outbound request
//! may name any other host object by `object_type`/`object_id`. That choice is
//! carried in session across the provider round trip and resolved again on
//! the callback, where a named object always wins over the logged-in user.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::account::Account;
use crate::error::LinkError;
use crate::profile::{IdentityKey, ProfileStore, ProviderProfile, TargetRef};
use crate::provider::VerifiedIdentity;
use crate::LinkResult;

/// Query/form parameter naming the target's object type.
pub const OBJECT_TYPE_PARAM: &str = "object_type";
/// Query/form parameter naming the target's object id.
pub const OBJECT_ID_PARAM: &str = "object_id";

/// Attempts made by [`LinkTargetResolver::connect`] before giving up on a
/// key that keeps changing underneath it.
const CONNECT_ATTEMPTS: usize = 3;

// =============================================================================
// Link Target
// =============================================================================

/// What a provider identity should be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkTarget {
    /// The currently logged-in account, if any.
    #[default]
    AuthenticatedUser,
    /// A specific host object.
    DomainObject {
        /// Host entity type.
        #[serde(rename = "type")]
        object_type: String,
        /// Host entity id.
        id: String,
    },
}

impl LinkTarget {
    /// Creates a domain-object target.
    #[must_use]
    pub fn domain_object(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DomainObject {
            object_type: object_type.into(),
            id: id.into(),
        }
    }

    /// Reads a domain-object target from request parameters.
    ///
    /// Returns `Ok(None)` when neither parameter is present.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if only one of the two parameters is given.
    pub fn from_query(params: &HashMap<String, String>) -> LinkResult<Option<Self>> {
        let get = |key: &str| params.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        match (get(OBJECT_TYPE_PARAM), get(OBJECT_ID_PARAM)) {
            (Some(object_type), Some(id)) => Ok(Some(Self::domain_object(object_type, id))),
            (None, None) => Ok(None),
            _ => Err(LinkError::invalid_request(format!(
                "{OBJECT_TYPE_PARAM} and {OBJECT_ID_PARAM} must be given together"
            ))),
        }
    }

    /// Request parameters that name this target on an outbound link.
    #[must_use]
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::AuthenticatedUser => Vec::new(),
            Self::DomainObject { object_type, id } => vec![
                (OBJECT_TYPE_PARAM, object_type.clone()),
                (OBJECT_ID_PARAM, id.clone()),
            ],
        }
    }

    /// Returns the stored reference for a domain object.
    #[must_use]
    pub fn as_target_ref(&self) -> Option<TargetRef> {
        match self {
            Self::AuthenticatedUser => None,
            Self::DomainObject { object_type, id } => Some(TargetRef::new(object_type, id)),
        }
    }
}

// =============================================================================
// Object Directory
// =============================================================================

/// A host object that exists and can be linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainObject {
    /// Reference to the object.
    pub target: TargetRef,
    /// The object's canonical URL, used as the post-disconnect destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
}

impl DomainObject {
    /// Creates a domain object without a canonical URL.
    #[must_use]
    pub fn new(target: TargetRef) -> Self {
        Self {
            target,
            canonical_url: None,
        }
    }

    /// Sets the canonical URL.
    #[must_use]
    pub fn with_canonical_url(mut self, url: impl Into<String>) -> Self {
        self.canonical_url = Some(url.into());
        self
    }
}

/// Host lookup of arbitrary objects by type and id, accounts included.
#[async_trait]
pub trait ObjectDirectory: Send + Sync {
    /// Resolve a reference to a live object.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup fails. A missing object is `Ok(None)`.
    async fn resolve(&self, target: &TargetRef) -> LinkResult<Option<DomainObject>>;
}

// =============================================================================
// Resolver
// =============================================================================

/// What a callback should bind the identity to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedTarget {
    /// A named host object.
    Object(DomainObject),
    /// The logged-in account.
    User(Account),
    /// Nothing: fall through to identity resolution.
    Unbound,
}

/// Result of an idempotent connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new profile was created.
    Created(ProviderProfile),
    /// The target's existing profile was refreshed in place.
    Updated(ProviderProfile),
    /// The identity is already bound to a different target of the same type.
    /// Nothing was changed.
    LinkedElsewhere(ProviderProfile),
}

impl ConnectOutcome {
    /// The profile the outcome refers to.
    #[must_use]
    pub fn profile(&self) -> &ProviderProfile {
        match self {
            Self::Created(p) | Self::Updated(p) | Self::LinkedElsewhere(p) => p,
        }
    }

    /// Returns `true` if the identity is now bound to the requested target.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        !matches!(self, Self::LinkedElsewhere(_))
    }
}

/// Resolves link targets and binds identities to them.
#[derive(Clone)]
pub struct LinkTargetResolver {
    site_id: String,
    profiles: Arc<dyn ProfileStore>,
    directory: Arc<dyn ObjectDirectory>,
}

impl LinkTargetResolver {
    /// Creates a new resolver for `site_id`.
    pub fn new(
        site_id: impl Into<String>,
        profiles: Arc<dyn ProfileStore>,
        directory: Arc<dyn ObjectDirectory>,
    ) -> Self {
        Self {
            site_id: site_id.into(),
            profiles,
            directory,
        }
    }

    /// Looks up the object a domain-object target names.
    ///
    /// # Errors
    ///
    /// Returns `TargetNotFound` if the object does not exist.
    pub async fn lookup(&self, target: &TargetRef) -> LinkResult<DomainObject> {
        self.directory
            .resolve(target)
            .await?
            .ok_or_else(|| LinkError::target_not_found(&target.object_type, &target.object_id))
    }

    /// Decides what the callback binds to. A carried domain object wins over
    /// the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns `TargetNotFound` if the carried object no longer exists.
    pub async fn resolve_target(
        &self,
        carried: &LinkTarget,
        current_user: Option<Account>,
    ) -> LinkResult<ResolvedTarget> {
        if let Some(target) = carried.as_target_ref() {
            return Ok(ResolvedTarget::Object(self.lookup(&target).await?));
        }
        Ok(match current_user {
            Some(account) => ResolvedTarget::User(account),
            None => ResolvedTarget::Unbound,
        })
    }

    /// Binds `identity` to `target`, idempotently.
    ///
    /// - The identity already bound to `target`: credentials are refreshed.
    /// - The identity bound to another target of the same type: nothing is
    ///   changed and `LinkedElsewhere` is returned.
    /// - `target` already holding a profile for this provider: that profile
    ///   is updated in place to the new subject.
    /// - Otherwise a new profile is created. Losing a create race to a
    ///   concurrent request re-reads and applies the rules above.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the credentials do not belong to the
    /// identity's provider, a storage error, or `ConstraintViolation` if the
    /// key keeps changing across every attempt.
    pub async fn connect(
        &self,
        identity: &VerifiedIdentity,
        target: &TargetRef,
    ) -> LinkResult<ConnectOutcome> {
        if !identity.credentials.fits(identity.provider) {
            return Err(LinkError::invalid_request(format!(
                "credentials do not match provider {}",
                identity.provider
            )));
        }

        let key = IdentityKey {
            site_id: self.site_id.clone(),
            provider: identity.provider,
            remote_id: identity.remote_id.clone(),
            target_type: target.object_type.clone(),
        };

        for attempt in 0..CONNECT_ATTEMPTS {
            if let Some(mut existing) = self.profiles.find_by_identity(&key).await? {
                if existing.target != *target {
                    tracing::info!(
                        provider = %identity.provider,
                        requested = %target,
                        bound = %existing.target,
                        "Identity already linked to another target"
                    );
                    return Ok(ConnectOutcome::LinkedElsewhere(existing));
                }
                existing.refresh_credentials(identity.credentials.clone());
                self.profiles.update(&existing).await?;
                tracing::debug!(profile_id = %existing.id, "Refreshed profile credentials");
                return Ok(ConnectOutcome::Updated(existing));
            }

            if let Some(mut held) = self
                .profiles
                .find_for_target(&self.site_id, identity.provider, target)
                .await?
            {
                held.remote_id = identity.remote_id.clone();
                held.refresh_credentials(identity.credentials.clone());
                match self.profiles.update(&held).await {
                    Ok(()) => {
                        tracing::info!(
                            profile_id = %held.id,
                            provider = %identity.provider,
                            target = %target,
                            "Replaced provider identity on target"
                        );
                        return Ok(ConnectOutcome::Updated(held));
                    }
                    Err(e) if e.is_constraint_violation() => {
                        tracing::debug!(attempt, "Profile update raced, retrying");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            let profile = identity.to_profile(&self.site_id, target.clone());
            match self.profiles.create(&profile).await {
                Ok(()) => {
                    tracing::info!(
                        profile_id = %profile.id,
                        provider = %identity.provider,
                        target = %target,
                        "Created provider profile"
                    );
                    return Ok(ConnectOutcome::Created(profile));
                }
                Err(e) if e.is_constraint_violation() => {
                    tracing::debug!(attempt, "Profile create raced, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(LinkError::constraint_violation(format!(
            "could not bind {} identity to {target}",
            identity.provider
        )))
    }
}
