//! Session-carried flow state.
//!
//! The browser session is the only thing that survives the redirect round
//! trip to a provider, so everything the callback and the setup form need
//! lives here: the unmatched identity waiting for account setup, the carried
//! link target, the post-login destination and a few OpenID hints.
//!
//! A [`PendingRegistration`] is consumed exactly once. It is removed when
//! setup completes or when an existing profile logs the user in, and an
//! operation that finds none renders a session-expired state instead of
//! failing.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::LinkResult;
use crate::account::Account;
use crate::claimer::suggest_username;
use crate::profile::{ProviderProfile, TargetRef};
use crate::provider::VerifiedIdentity;
use crate::target::LinkTarget;

const PENDING_KEY: &str = "sociallink.pending";
const LINK_TARGET_KEY: &str = "sociallink.link_target";
const NEXT_KEY: &str = "sociallink.next";
const DISCONNECT_URL_KEY: &str = "sociallink.disconnect_url";
const OPENID_PROVIDER_KEY: &str = "sociallink.openid_provider";
const OPENID_ERROR_KEY: &str = "sociallink.openid_error";

// =============================================================================
// Session Data
// =============================================================================

/// Serializable key/value bag the host persists between requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionData {
    values: HashMap<String, serde_json::Value>,
}

impl SessionData {
    /// Creates an empty session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and deserializes a value.
    ///
    /// A value that no longer deserializes is treated as absent.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.values.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(key = key, error = %e, "Discarding unreadable session value");
                None
            }
        }
    }

    /// Serializes and stores a value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn insert<T: Serialize>(&mut self, key: &str, value: &T) -> LinkResult<()> {
        self.values.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Removes a value, returning it if it was readable.
    pub fn take<T: DeserializeOwned>(&mut self, key: &str) -> Option<T> {
        let value = self.values.remove(key)?;
        serde_json::from_value(value).ok()
    }

    /// Removes a value.
    pub fn remove(&mut self, key: &str) {
        self.values.remove(key);
    }

    /// Returns `true` if the key is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns `true` if the session holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drops every value.
    pub fn clear(&mut self) {
        self.values.clear();
    }

    // -------------------------------------------------------------------------
    // Typed accessors
    // -------------------------------------------------------------------------

    /// The unmatched identity awaiting setup, if any.
    #[must_use]
    pub fn pending_registration(&self) -> Option<PendingRegistration> {
        self.get(PENDING_KEY)
    }

    /// Stores the unmatched identity awaiting setup.
    ///
    /// # Errors
    ///
    /// Returns an error if the registration cannot be serialized.
    pub fn set_pending_registration(&mut self, pending: &PendingRegistration) -> LinkResult<()> {
        self.insert(PENDING_KEY, pending)
    }

    /// Drops the pending registration.
    pub fn clear_pending_registration(&mut self) {
        self.remove(PENDING_KEY);
    }

    /// Carries the link target across the provider round trip. `None`
    /// clears any target left from an earlier attempt.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be serialized.
    pub fn set_link_target(&mut self, target: Option<&LinkTarget>) -> LinkResult<()> {
        match target {
            Some(target) => self.insert(LINK_TARGET_KEY, target),
            None => {
                self.remove(LINK_TARGET_KEY);
                Ok(())
            }
        }
    }

    /// Removes the carried link target, defaulting to the authenticated user
    /// when nothing was carried.
    pub fn take_link_target(&mut self) -> LinkTarget {
        self.take(LINK_TARGET_KEY).unwrap_or_default()
    }

    /// Remembers where to go after login.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn set_next(&mut self, next: &str) -> LinkResult<()> {
        self.insert(NEXT_KEY, &next)
    }

    /// Removes and returns the remembered post-login destination.
    pub fn take_next(&mut self) -> Option<String> {
        self.take::<String>(NEXT_KEY).filter(|s| !s.is_empty())
    }

    /// Overrides the destination after a disconnect.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn set_disconnect_url(&mut self, url: &str) -> LinkResult<()> {
        self.insert(DISCONNECT_URL_KEY, &url)
    }

    /// The disconnect destination override, if set.
    #[must_use]
    pub fn disconnect_url(&self) -> Option<String> {
        self.get::<String>(DISCONNECT_URL_KEY).filter(|s| !s.is_empty())
    }

    /// Remembers which OpenID provider the user picked.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be serialized.
    pub fn set_openid_provider(&mut self, provider: &str) -> LinkResult<()> {
        self.insert(OPENID_PROVIDER_KEY, &provider)
    }

    /// The OpenID provider the user picked, if any.
    #[must_use]
    pub fn openid_provider(&self) -> Option<String> {
        self.get(OPENID_PROVIDER_KEY)
    }

    /// Flags that OpenID discovery failed, for the login page to show.
    ///
    /// # Errors
    ///
    /// Returns an error if the flag cannot be serialized.
    pub fn set_openid_error(&mut self) -> LinkResult<()> {
        self.insert(OPENID_ERROR_KEY, &true)
    }

    /// Returns and clears the OpenID discovery failure flag.
    pub fn take_openid_error(&mut self) -> bool {
        self.take(OPENID_ERROR_KEY).unwrap_or(false)
    }
}

// =============================================================================
// Pending Registration
// =============================================================================

/// Where an unmatched identity stands in account setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SetupState {
    /// Waiting for the user to pick a username.
    AwaitingUsernameChoice,
    /// The chosen username is taken by a claimable account; waiting for its
    /// password.
    AwaitingPasswordClaim {
        /// Username of the account being claimed.
        username: String,
    },
}

/// An unmatched identity waiting for account setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRegistration {
    /// Unsaved account shell. `username` holds the suggestion, possibly empty.
    pub account: Account,

    /// The verified identity the candidate profile is built from.
    pub identity: VerifiedIdentity,

    /// Current setup step.
    pub state: SetupState,

    /// When the callback stored this registration.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl PendingRegistration {
    /// Builds the pending registration for a freshly verified identity.
    #[must_use]
    pub fn new(identity: VerifiedIdentity) -> Self {
        let mut account = Account::new(suggest_username(&identity).unwrap_or_default());
        account.email = identity.attribute_str("email").map(str::to_string);
        account.name = identity.attribute_str("name").map(str::to_string);
        Self {
            account,
            identity,
            state: SetupState::AwaitingUsernameChoice,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// The username to pre-fill in the setup form.
    #[must_use]
    pub fn suggested_username(&self) -> Option<&str> {
        Some(self.account.username.as_str()).filter(|s| !s.is_empty())
    }

    /// Builds the unsaved profile binding this identity to `target`.
    #[must_use]
    pub fn candidate_profile(&self, site_id: &str, target: TargetRef) -> ProviderProfile {
        self.identity.to_profile(site_id, target)
    }

    /// Moves to the password-claim step for `username`.
    pub fn await_password_claim(&mut self, username: impl Into<String>) {
        self.state = SetupState::AwaitingPasswordClaim {
            username: username.into(),
        };
    }

    /// Returns to the username-choice step.
    pub fn await_username_choice(&mut self) {
        self.state = SetupState::AwaitingUsernameChoice;
    }
}
