//! Provider profiles: persisted bindings between an external identity and a
//! local target.
//!
//! A [`ProviderProfile`] records that the subject `remote_id` at `provider`
//! belongs to `target`, which is either a local account or any other domain
//! object in the host, stored as an `(object_type, object_id)` pair.
//!
//! # Uniqueness
//!
//! At most one profile exists per [`IdentityKey`], that is per
//! `(site, provider, remote_id, target object type)`. Stores must enforce
//! this with a real constraint and report a duplicate create as
//! `ConstraintViolation`; a pre-check alone does not close the race between
//! two submits of the same setup form.
//!
//! # Example
//!
//! ```
//! use sociallink::profile::{Credentials, Provider, ProviderProfile, TargetRef};
//!
//! let profile = ProviderProfile::new("default", Provider::OAuth1, "12345", TargetRef::user("7"))
//!     .with_credentials(Credentials::oauth1("token", "secret"));
//! assert!(profile.target.is_user());
//! assert_eq!(profile.identity_key().remote_id, "12345");
//! ```

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::LinkResult;

/// Object type used for targets that are local user accounts.
pub const USER_TARGET_TYPE: &str = "user";

// =============================================================================
// Provider
// =============================================================================

/// External identity source families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// OAuth 1.0a providers (Twitter-style).
    #[serde(rename = "oauth1")]
    OAuth1,
    /// OAuth 2-style token exchange providers (Facebook-style).
    #[serde(rename = "oauth2")]
    OAuth2,
    /// OpenID providers; the remote id is the identity URL.
    #[serde(rename = "openid")]
    OpenId,
}

impl Provider {
    /// Returns the stable string form used in storage and session.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OAuth1 => "oauth1",
            Self::OAuth2 => "oauth2",
            Self::OpenId => "openid",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "oauth1" => Ok(Self::OAuth1),
            "oauth2" => Ok(Self::OAuth2),
            "openid" => Ok(Self::OpenId),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Provider-specific credential payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credentials {
    /// OAuth 1.0a access token pair.
    #[serde(rename = "oauth1")]
    OAuth1 {
        /// The access token.
        token: String,
        /// The access token secret.
        token_secret: String,
    },
    /// OAuth 2-style access token.
    #[serde(rename = "oauth2")]
    OAuth2 {
        /// The access token.
        access_token: String,
        /// Optional session secret issued alongside the token.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
    },
    /// No stored credentials (OpenID).
    #[default]
    None,
}

impl Credentials {
    /// Creates OAuth 1.0a credentials.
    #[must_use]
    pub fn oauth1(token: impl Into<String>, token_secret: impl Into<String>) -> Self {
        Self::OAuth1 {
            token: token.into(),
            token_secret: token_secret.into(),
        }
    }

    /// Creates OAuth 2 credentials.
    #[must_use]
    pub fn oauth2(access_token: impl Into<String>, secret: Option<String>) -> Self {
        Self::OAuth2 {
            access_token: access_token.into(),
            secret,
        }
    }

    /// Returns `true` if this credential shape belongs to `provider`.
    #[must_use]
    pub fn fits(&self, provider: Provider) -> bool {
        matches!(
            (self, provider),
            (Self::OAuth1 { .. }, Provider::OAuth1)
                | (Self::OAuth2 { .. }, Provider::OAuth2)
                | (Self::None, _)
        )
    }
}

// Secrets stay out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OAuth1 { .. } => f.write_str("Credentials::OAuth1(..)"),
            Self::OAuth2 { .. } => f.write_str("Credentials::OAuth2(..)"),
            Self::None => f.write_str("Credentials::None"),
        }
    }
}

// =============================================================================
// Target Reference
// =============================================================================

/// A stored polymorphic reference to whatever a profile is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    /// Entity type in the host, [`USER_TARGET_TYPE`] for accounts.
    pub object_type: String,
    /// Entity id in the host.
    pub object_id: String,
}

impl TargetRef {
    /// Creates a reference to an arbitrary host object.
    #[must_use]
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }

    /// Creates a reference to a local account.
    #[must_use]
    pub fn user(account_id: impl Into<String>) -> Self {
        Self::new(USER_TARGET_TYPE, account_id)
    }

    /// Returns `true` if the reference points at a local account.
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.object_type == USER_TARGET_TYPE
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.object_type, self.object_id)
    }
}

// =============================================================================
// Provider Profile
// =============================================================================

/// The uniqueness key of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    /// Deployment the profile belongs to.
    pub site_id: String,
    /// Provider family.
    pub provider: Provider,
    /// Provider-scoped subject identifier.
    pub remote_id: String,
    /// Object type of the bound target.
    pub target_type: String,
}

impl IdentityKey {
    /// Creates a key for a user-bound profile.
    #[must_use]
    pub fn for_user(site_id: impl Into<String>, provider: Provider, remote_id: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            provider,
            remote_id: remote_id.into(),
            target_type: USER_TARGET_TYPE.to_string(),
        }
    }
}

/// A persisted binding of an external identity to a local target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Unique identifier of the profile row.
    pub id: Uuid,

    /// Deployment the profile belongs to.
    pub site_id: String,

    /// Provider family.
    pub provider: Provider,

    /// Provider-scoped subject identifier (OAuth UID, OpenID identity URL).
    pub remote_id: String,

    /// Stored credentials, refreshed on re-authentication.
    #[serde(default)]
    pub credentials: Credentials,

    /// What the identity is bound to.
    pub target: TargetRef,

    /// Display handle reported by the provider (e.g. screen name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// When the profile was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the profile was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ProviderProfile {
    /// Creates a new unsaved profile.
    #[must_use]
    pub fn new(
        site_id: impl Into<String>,
        provider: Provider,
        remote_id: impl Into<String>,
        target: TargetRef,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            site_id: site_id.into(),
            provider,
            remote_id: remote_id.into(),
            credentials: Credentials::None,
            target,
            display_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Sets the display handle.
    #[must_use]
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Returns the uniqueness key of this profile.
    #[must_use]
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            site_id: self.site_id.clone(),
            provider: self.provider,
            remote_id: self.remote_id.clone(),
            target_type: self.target.object_type.clone(),
        }
    }

    /// Replaces credentials after a re-authentication.
    pub fn refresh_credentials(&mut self, credentials: Credentials) {
        self.credentials = credentials;
        self.updated_at = OffsetDateTime::now_utc();
    }
}

// =============================================================================
// Profile Storage Trait
// =============================================================================

/// Storage operations for provider profiles.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Find a profile by its row id.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, id: Uuid) -> LinkResult<Option<ProviderProfile>>;

    /// Find the profile holding a uniqueness key.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_identity(&self, key: &IdentityKey) -> LinkResult<Option<ProviderProfile>>;

    /// Find every profile for a provider identity, across all sites and
    /// target types.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_remote_id(
        &self,
        provider: Provider,
        remote_id: &str,
    ) -> LinkResult<Vec<ProviderProfile>>;

    /// Find the profile a target holds for a provider on a site.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_for_target(
        &self,
        site_id: &str,
        provider: Provider,
        target: &TargetRef,
    ) -> LinkResult<Option<ProviderProfile>>;

    /// List all profiles bound to a target.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_for_target(&self, target: &TargetRef) -> LinkResult<Vec<ProviderProfile>>;

    /// Create a profile.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if a profile with the same
    /// [`IdentityKey`] exists, or a storage error.
    async fn create(&self, profile: &ProviderProfile) -> LinkResult<()>;

    /// Update a profile in place.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the update would collide with another
    /// profile's key, or a storage error if the profile doesn't exist.
    async fn update(&self, profile: &ProviderProfile) -> LinkResult<()>;

    /// Delete a profile. Returns `false` if it was already gone.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, id: Uuid) -> LinkResult<bool>;
}
