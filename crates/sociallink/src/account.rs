//! Local user accounts and the account store trait.
//!
//! The account datastore belongs to the host application. The engine only
//! needs to look accounts up, create provider-only accounts, and check a
//! password when an existing account is being claimed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::LinkResult;
use crate::password::{is_usable_password, make_unusable_password, verify_password};
use crate::profile::TargetRef;

/// Maximum username length accepted by the setup form.
pub const MAX_USERNAME_LENGTH: usize = 30;

// =============================================================================
// Account Type
// =============================================================================

/// A local user account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    /// Unique identifier for the account.
    pub id: String,

    /// Login name, unique across the store.
    pub username: String,

    /// Email address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Argon2 hash, or an unusable-password sentinel. Never empty.
    pub password_hash: String,

    /// Inactive accounts cannot log in.
    pub active: bool,

    /// When the account was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the account was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Account {
    /// Creates an active account with an unusable password.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.into(),
            email: None,
            name: None,
            password_hash: make_unusable_password(),
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a new account builder.
    #[must_use]
    pub fn builder(username: impl Into<String>) -> AccountBuilder {
        AccountBuilder {
            account: Self::new(username),
        }
    }

    /// Returns `true` if the account is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns `true` if the account can authenticate with a password.
    #[must_use]
    pub fn has_usable_password(&self) -> bool {
        is_usable_password(&self.password_hash)
    }

    /// Replaces the password with a fresh unusable sentinel.
    pub fn set_unusable_password(&mut self) {
        self.password_hash = make_unusable_password();
        self.updated_at = OffsetDateTime::now_utc();
    }

    /// Checks a plaintext password against the stored hash.
    ///
    /// A malformed stored hash is logged and treated as a mismatch.
    #[must_use]
    pub fn check_password(&self, password: &str) -> bool {
        match verify_password(password, &self.password_hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(account_id = %self.id, error = %e, "Stored password hash is malformed");
                false
            }
        }
    }

    /// Returns the polymorphic reference used to bind profiles to this account.
    #[must_use]
    pub fn target_ref(&self) -> TargetRef {
        TargetRef::user(&self.id)
    }
}

// =============================================================================
// Account Builder
// =============================================================================

/// Builder for creating `Account` instances.
pub struct AccountBuilder {
    account: Account,
}

impl AccountBuilder {
    /// Sets the account ID.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.account.id = id.into();
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.account.email = Some(email.into());
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.account.name = Some(name.into());
        self
    }

    /// Sets an already-computed password hash.
    #[must_use]
    pub fn password_hash(mut self, hash: impl Into<String>) -> Self {
        self.account.password_hash = hash.into();
        self
    }

    /// Sets whether the account is active.
    #[must_use]
    pub fn active(mut self, active: bool) -> Self {
        self.account.active = active;
        self
    }

    /// Builds the account.
    #[must_use]
    pub fn build(self) -> Account {
        self.account
    }
}

// =============================================================================
// Username Validation
// =============================================================================

/// Reasons a requested username is rejected before any lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UsernameError {
    /// No username was submitted.
    #[error("Username is required")]
    Empty,

    /// The username is longer than [`MAX_USERNAME_LENGTH`].
    #[error("Username must be at most {max} characters")]
    TooLong {
        /// The maximum length.
        max: usize,
    },

    /// The username contains a character outside `[A-Za-z0-9@.+_-]`.
    #[error("Username contains invalid character '{character}'")]
    InvalidCharacter {
        /// The first offending character.
        character: char,
    },

    /// The username belongs to an account that cannot be claimed.
    #[error("Username is not available")]
    Unavailable,
}

/// Validates a requested username.
///
/// # Errors
///
/// Returns the first rule the username breaks.
pub fn validate_username(username: &str) -> Result<(), UsernameError> {
    if username.is_empty() {
        return Err(UsernameError::Empty);
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(UsernameError::TooLong {
            max: MAX_USERNAME_LENGTH,
        });
    }
    if let Some(character) = username
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')))
    {
        return Err(UsernameError::InvalidCharacter { character });
    }
    Ok(())
}

// =============================================================================
// Account Storage Trait
// =============================================================================

/// Storage operations for local accounts.
///
/// Implementations must enforce username uniqueness at the storage layer and
/// report a duplicate as [`LinkError::ConstraintViolation`](crate::LinkError).
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Find an account by its unique ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_id(&self, account_id: &str) -> LinkResult<Option<Account>>;

    /// Find an account by username.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn find_by_username(&self, username: &str) -> LinkResult<Option<Account>>;

    /// Create a new account.
    ///
    /// # Errors
    ///
    /// Returns `ConstraintViolation` if the username is taken, or a storage
    /// error if the operation fails.
    async fn create(&self, account: &Account) -> LinkResult<()>;

    /// Update an existing account.
    ///
    /// # Errors
    ///
    /// Returns an error if the account doesn't exist or the operation fails.
    async fn update(&self, account: &Account) -> LinkResult<()>;

    /// Delete an account. Deleting a missing account is not an error.
    ///
    /// Used to undo an account whose profile could not be persisted.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, account_id: &str) -> LinkResult<()>;
}
