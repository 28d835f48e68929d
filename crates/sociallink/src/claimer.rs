//! Account setup for unmatched identities.
//!
//! An identity with no bound account ends up here after the callback. The
//! claimer either provisions a fresh provider-only account, lets the user
//! claim an existing account by proving its password, or (when enabled)
//! reuses the account a sibling deployment already bound to the same
//! provider subject.
//!
//! Provisioning writes two rows. If the profile cannot be written the new
//! account is deleted again, so a failed setup never leaves an orphaned
//! provider-only account behind.

use std::sync::Arc;

use crate::LinkResult;
use crate::account::{Account, AccountStore, MAX_USERNAME_LENGTH, UsernameError, validate_username};
use crate::config::LinkConfig;
use crate::error::LinkError;
use crate::profile::{ProfileStore, ProviderProfile};
use crate::provider::VerifiedIdentity;
use crate::session::{PendingRegistration, SetupState};
use crate::target::{ConnectOutcome, LinkTargetResolver};

/// Generated usernames tried before auto-provisioning gives up.
pub const MAX_GENERATION_ATTEMPTS: usize = 5;

/// Attribute keys consulted, in order, for a username suggestion.
const USERNAME_ATTRIBUTES: [&str; 3] = ["username", "screen_name", "nickname"];

/// The outcome of one setup step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimStep {
    /// A new account was created and bound.
    Provisioned(Account),
    /// An existing account was claimed (password or sibling) and bound.
    Claimed(Account),
    /// The identity got bound to this account by a concurrent request.
    Existing(Account),
    /// The username belongs to a claimable account; ask for its password.
    NeedsPassword {
        /// Username being claimed.
        username: String,
    },
    /// The claim password did not match. Nothing changed.
    WrongPassword {
        /// Username being claimed.
        username: String,
    },
    /// The username cannot be used.
    Rejected(UsernameError),
    /// The account exists but is inactive.
    Inactive,
}

impl ClaimStep {
    /// The account to log in, if this step completed setup.
    #[must_use]
    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Provisioned(a) | Self::Claimed(a) | Self::Existing(a) => Some(a),
            _ => None,
        }
    }
}

/// Creates or claims the local account for a pending registration.
#[derive(Clone)]
pub struct AccountClaimer {
    config: Arc<LinkConfig>,
    accounts: Arc<dyn AccountStore>,
    profiles: Arc<dyn ProfileStore>,
    linker: LinkTargetResolver,
}

impl AccountClaimer {
    /// Creates a new claimer.
    pub fn new(
        config: Arc<LinkConfig>,
        accounts: Arc<dyn AccountStore>,
        profiles: Arc<dyn ProfileStore>,
        linker: LinkTargetResolver,
    ) -> Self {
        Self {
            config,
            accounts,
            profiles,
            linker,
        }
    }

    // =========================================================================
    // Sibling shortcut
    // =========================================================================

    /// Reuses the account a sibling deployment bound to the same provider
    /// subject. Returns `None` when disabled or when there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub async fn try_sibling(&self, pending: &PendingRegistration) -> LinkResult<Option<ClaimStep>> {
        if !self.config.reuse_sibling_profiles {
            return Ok(None);
        }

        let identity = &pending.identity;
        let siblings = self
            .profiles
            .find_by_remote_id(identity.provider, &identity.remote_id)
            .await?;

        for profile in siblings.iter().filter(|p| p.target.is_user()) {
            let Some(account) = self.accounts.find_by_id(&profile.target.object_id).await? else {
                continue;
            };
            tracing::info!(
                provider = %identity.provider,
                sibling_site = %profile.site_id,
                account_id = %account.id,
                "Reusing account bound on sibling site"
            );
            if !account.is_active() {
                return Ok(Some(ClaimStep::Inactive));
            }
            return self.bind(pending, account).await.map(Some);
        }
        Ok(None)
    }

    // =========================================================================
    // Auto-generated usernames
    // =========================================================================

    /// Provisions an account under a random username.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails or every generated
    /// username was taken.
    pub async fn auto_provision(&self, pending: &PendingRegistration) -> LinkResult<ClaimStep> {
        for attempt in 0..MAX_GENERATION_ATTEMPTS {
            let username = generate_username(self.config.generated_username_length);
            if self.accounts.find_by_username(&username).await?.is_some() {
                continue;
            }
            match self.provision(pending, &username).await {
                Err(e) if e.is_constraint_violation() => {
                    tracing::debug!(attempt, "Generated username collided, retrying");
                }
                other => return other,
            }
        }
        Err(LinkError::internal(format!(
            "no free username after {MAX_GENERATION_ATTEMPTS} attempts"
        )))
    }

    // =========================================================================
    // Username choice and password claim
    // =========================================================================

    /// Handles a submitted username, optionally with the password of the
    /// account it names.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub async fn submit_username(
        &self,
        pending: &mut PendingRegistration,
        username: &str,
        password: Option<&str>,
    ) -> LinkResult<ClaimStep> {
        if let Err(reason) = validate_username(username) {
            pending.await_username_choice();
            return Ok(ClaimStep::Rejected(reason));
        }

        let existing = match self.accounts.find_by_username(username).await? {
            Some(account) => account,
            None => match self.provision(pending, username).await {
                Err(e) if e.is_constraint_violation() => {
                    // Taken between the lookup and the create.
                    self.accounts.find_by_username(username).await?.ok_or(e)?
                }
                other => return other,
            },
        };

        if !existing.has_usable_password() {
            tracing::warn!(
                error = %LinkError::unclaimable_username(username),
                "Rejecting username choice"
            );
            pending.await_username_choice();
            return Ok(ClaimStep::Rejected(UsernameError::Unavailable));
        }

        pending.await_password_claim(&existing.username);
        match password {
            Some(password) => self.claim_account(existing, pending, password).await,
            None => Ok(ClaimStep::NeedsPassword {
                username: existing.username,
            }),
        }
    }

    /// Handles a password submitted for the account named in the pending
    /// password-claim step.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage operation fails.
    pub async fn claim_password(
        &self,
        pending: &mut PendingRegistration,
        password: &str,
    ) -> LinkResult<ClaimStep> {
        let SetupState::AwaitingPasswordClaim { username } = pending.state.clone() else {
            return Ok(ClaimStep::Rejected(UsernameError::Empty));
        };
        match self.accounts.find_by_username(&username).await? {
            Some(account) => self.claim_account(account, pending, password).await,
            None => {
                pending.await_username_choice();
                Ok(ClaimStep::Rejected(UsernameError::Unavailable))
            }
        }
    }

    async fn claim_account(
        &self,
        account: Account,
        pending: &PendingRegistration,
        password: &str,
    ) -> LinkResult<ClaimStep> {
        if !account.check_password(password) {
            tracing::info!(account_id = %account.id, "Claim password mismatch");
            return Ok(ClaimStep::WrongPassword {
                username: account.username,
            });
        }
        if !account.is_active() {
            return Ok(ClaimStep::Inactive);
        }
        self.bind(pending, account).await
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Binds the pending identity to an existing account.
    async fn bind(&self, pending: &PendingRegistration, account: Account) -> LinkResult<ClaimStep> {
        match self.linker.connect(&pending.identity, &account.target_ref()).await? {
            ConnectOutcome::LinkedElsewhere(profile) => {
                Ok(ClaimStep::Existing(self.owner_of(&profile).await?))
            }
            _ => Ok(ClaimStep::Claimed(account)),
        }
    }

    /// Creates a provider-only account and binds the pending identity to it.
    async fn provision(&self, pending: &PendingRegistration, username: &str) -> LinkResult<ClaimStep> {
        let mut account = pending.account.clone();
        account.id = uuid::Uuid::new_v4().to_string();
        account.username = username.to_string();
        account.set_unusable_password();
        account.created_at = account.updated_at;
        self.accounts.create(&account).await?;

        match self.linker.connect(&pending.identity, &account.target_ref()).await {
            Ok(ConnectOutcome::LinkedElsewhere(profile)) => {
                self.discard(&account).await;
                Ok(ClaimStep::Existing(self.owner_of(&profile).await?))
            }
            Ok(_) => {
                tracing::info!(
                    account_id = %account.id,
                    provider = %pending.identity.provider,
                    "Provisioned account from provider identity"
                );
                Ok(ClaimStep::Provisioned(account))
            }
            Err(e) => {
                self.discard(&account).await;
                Err(e)
            }
        }
    }

    /// Deletes an account whose profile could not be written.
    async fn discard(&self, account: &Account) {
        if let Err(e) = self.accounts.delete(&account.id).await {
            tracing::error!(account_id = %account.id, error = %e, "Failed to remove orphaned account");
        }
    }

    async fn owner_of(&self, profile: &ProviderProfile) -> LinkResult<Account> {
        self.accounts
            .find_by_id(&profile.target.object_id)
            .await?
            .ok_or_else(|| {
                LinkError::internal(format!("profile {} bound to missing account", profile.id))
            })
    }
}

/// Suggests a username from provider attributes: an explicit username,
/// screen name or nickname, else the local part of the email.
#[must_use]
pub fn suggest_username(identity: &VerifiedIdentity) -> Option<String> {
    let candidate = USERNAME_ATTRIBUTES
        .iter()
        .find_map(|key| identity.attribute_str(key))
        .or_else(|| identity.attribute_str("email").and_then(|e| e.split('@').next()))?;

    let cleaned: String = candidate
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
        .take(MAX_USERNAME_LENGTH)
        .collect();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Generates a random username of `length` characters.
#[must_use]
pub fn generate_username(length: usize) -> String {
    uuid::Uuid::new_v4().to_string().chars().take(length).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::hash_password;
    use crate::profile::{Credentials, Provider, TargetRef};
    use crate::test_support::{MockAccountStore, MockDirectory, MockProfileStore};

    struct Harness {
        claimer: AccountClaimer,
        accounts: Arc<MockAccountStore>,
        profiles: Arc<MockProfileStore>,
    }

    fn harness(config: LinkConfig) -> Harness {
        let accounts = Arc::new(MockAccountStore::default());
        let profiles = Arc::new(MockProfileStore::default());
        let linker = LinkTargetResolver::new(
            config.site_id.clone(),
            profiles.clone(),
            Arc::new(MockDirectory::default()),
        );
        let claimer = AccountClaimer::new(Arc::new(config), accounts.clone(), profiles.clone(), linker);
        Harness {
            claimer,
            accounts,
            profiles,
        }
    }

    fn pending() -> PendingRegistration {
        PendingRegistration::new(
            VerifiedIdentity::new(Provider::OAuth1, "12345")
                .with_credentials(Credentials::oauth1("tok", "sec"))
                .with_attribute("screen_name", serde_json::json!("alice")),
        )
    }

    fn claimable(username: &str, password: &str) -> Account {
        Account::builder(username)
            .password_hash(hash_password(password).unwrap())
            .build()
    }

    #[test]
    fn test_suggest_username() {
        let identity = VerifiedIdentity::new(Provider::OAuth2, "1")
            .with_attribute("nickname", serde_json::json!("Ali Ce!"))
            .with_attribute("email", serde_json::json!("other@example.com"));
        assert_eq!(suggest_username(&identity).as_deref(), Some("AliCe"));

        let identity = VerifiedIdentity::new(Provider::OAuth2, "1")
            .with_attribute("email", serde_json::json!("bob@example.com"));
        assert_eq!(suggest_username(&identity).as_deref(), Some("bob"));

        let identity = VerifiedIdentity::new(Provider::OpenId, "https://example.com/alice");
        assert_eq!(suggest_username(&identity), None);
    }

    #[test]
    fn test_generate_username() {
        let a = generate_username(30);
        let b = generate_username(30);
        assert_eq!(a.len(), 30);
        assert_ne!(a, b);
        assert!(validate_username(&a).is_ok());
    }

    #[tokio::test]
    async fn test_free_username_provisions() {
        let h = harness(LinkConfig::default());
        let mut pending = pending();

        let step = h.claimer.submit_username(&mut pending, "alice", None).await.unwrap();
        let ClaimStep::Provisioned(account) = step else {
            panic!("expected Provisioned, got {step:?}");
        };
        assert_eq!(account.username, "alice");
        assert!(!account.has_usable_password());
        assert_eq!(h.accounts.len(), 1);
        assert_eq!(h.profiles.for_target(&account.target_ref()).len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_username_rejected() {
        let h = harness(LinkConfig::default());
        let mut pending = pending();
        let step = h.claimer.submit_username(&mut pending, "al ice", None).await.unwrap();
        assert!(matches!(step, ClaimStep::Rejected(UsernameError::InvalidCharacter { .. })));
        assert_eq!(h.accounts.len(), 0);
    }

    #[tokio::test]
    async fn test_taken_username_needs_password() {
        let h = harness(LinkConfig::default());
        h.accounts.insert(claimable("alice", "pw"));
        let mut pending = pending();

        let step = h.claimer.submit_username(&mut pending, "alice", None).await.unwrap();
        assert_eq!(
            step,
            ClaimStep::NeedsPassword {
                username: "alice".to_string()
            }
        );
        assert_eq!(
            pending.state,
            SetupState::AwaitingPasswordClaim {
                username: "alice".to_string()
            }
        );

        let step = h.claimer.claim_password(&mut pending, "wrong").await.unwrap();
        assert!(matches!(step, ClaimStep::WrongPassword { .. }));
        assert_eq!(h.profiles.len(), 0);

        let step = h.claimer.claim_password(&mut pending, "pw").await.unwrap();
        assert!(matches!(step, ClaimStep::Claimed(ref a) if a.username == "alice"));
        assert_eq!(h.profiles.len(), 1);
        assert_eq!(h.accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_unusable_password_account_is_unavailable() {
        let h = harness(LinkConfig::default());
        h.accounts.insert(Account::new("alice"));
        let mut pending = pending();

        let step = h.claimer.submit_username(&mut pending, "alice", Some("")).await.unwrap();
        assert_eq!(step, ClaimStep::Rejected(UsernameError::Unavailable));
        assert_eq!(pending.state, SetupState::AwaitingUsernameChoice);
        assert_eq!(h.profiles.len(), 0);
    }

    #[tokio::test]
    async fn test_inactive_account_cannot_be_claimed() {
        let h = harness(LinkConfig::default());
        let mut account = claimable("alice", "pw");
        account.active = false;
        h.accounts.insert(account);
        let mut pending = pending();

        let step = h.claimer.submit_username(&mut pending, "alice", Some("pw")).await.unwrap();
        assert_eq!(step, ClaimStep::Inactive);
        assert_eq!(h.profiles.len(), 0);
    }

    #[tokio::test]
    async fn test_failed_profile_write_removes_account() {
        let h = harness(LinkConfig::default());
        h.profiles.fail_writes();
        let mut pending = pending();

        let err = h.claimer.submit_username(&mut pending, "alice", None).await.unwrap_err();
        assert!(matches!(err, LinkError::Storage { .. }));
        assert_eq!(h.accounts.len(), 0);
    }

    #[tokio::test]
    async fn test_identity_bound_concurrently_logs_into_owner() {
        let h = harness(LinkConfig::default());
        let owner = Account::new("first");
        h.accounts.insert(owner.clone());
        h.profiles.insert(ProviderProfile::new(
            "default",
            Provider::OAuth1,
            "12345",
            owner.target_ref(),
        ));
        let mut pending = pending();

        let step = h.claimer.submit_username(&mut pending, "second", None).await.unwrap();
        assert_eq!(step, ClaimStep::Existing(owner));
        assert_eq!(h.accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_auto_provision() {
        let h = harness(LinkConfig::default().with_generate_username(true));
        let step = h.claimer.auto_provision(&pending()).await.unwrap();
        let account = step.account().unwrap();
        assert_eq!(account.username.len(), 30);
        assert_eq!(h.profiles.len(), 1);
    }

    #[tokio::test]
    async fn test_sibling_disabled_by_default() {
        let h = harness(LinkConfig::default());
        let owner = Account::new("alice");
        h.accounts.insert(owner.clone());
        h.profiles.insert(ProviderProfile::new(
            "sister-site",
            Provider::OAuth1,
            "12345",
            owner.target_ref(),
        ));
        assert_eq!(h.claimer.try_sibling(&pending()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sibling_reuse() {
        let h = harness(LinkConfig::default().with_reuse_sibling_profiles(true));
        let owner = Account::new("alice");
        h.accounts.insert(owner.clone());
        h.profiles.insert(ProviderProfile::new(
            "sister-site",
            Provider::OAuth1,
            "12345",
            owner.target_ref(),
        ));
        h.profiles.insert(ProviderProfile::new(
            "sister-site",
            Provider::OAuth2,
            "12345",
            TargetRef::user("someone-else"),
        ));

        let step = h.claimer.try_sibling(&pending()).await.unwrap();
        assert_eq!(step, Some(ClaimStep::Claimed(owner.clone())));
        assert_eq!(h.profiles.for_target(&owner.target_ref()).len(), 2);
    }
}
