//! In-crate mock collaborators for unit tests.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use crate::LinkResult;
use crate::account::{Account, AccountStore};
use crate::auth::{SessionAuthenticator, SessionPrincipal};
use crate::context::RequestContext;
use crate::error::LinkError;
use crate::profile::{IdentityKey, ProfileStore, Provider, ProviderProfile, TargetRef};
use crate::target::{DomainObject, ObjectDirectory};

// =============================================================================
// Accounts
// =============================================================================

#[derive(Default)]
pub struct MockAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl MockAccountStore {
    pub fn insert(&self, account: Account) {
        self.accounts
            .write()
            .unwrap()
            .insert(account.id.clone(), account);
    }

    pub fn len(&self) -> usize {
        self.accounts.read().unwrap().len()
    }
}

#[async_trait]
impl AccountStore for MockAccountStore {
    async fn find_by_id(&self, account_id: &str) -> LinkResult<Option<Account>> {
        Ok(self.accounts.read().unwrap().get(account_id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> LinkResult<Option<Account>> {
        Ok(self
            .accounts
            .read()
            .unwrap()
            .values()
            .find(|a| a.username == username)
            .cloned())
    }

    async fn create(&self, account: &Account) -> LinkResult<()> {
        let mut accounts = self.accounts.write().unwrap();
        if accounts.values().any(|a| a.username == account.username) {
            return Err(LinkError::constraint_violation("duplicate username"));
        }
        accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn update(&self, account: &Account) -> LinkResult<()> {
        let mut accounts = self.accounts.write().unwrap();
        if !accounts.contains_key(&account.id) {
            return Err(LinkError::storage("account not found"));
        }
        accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn delete(&self, account_id: &str) -> LinkResult<()> {
        self.accounts.write().unwrap().remove(account_id);
        Ok(())
    }
}

// =============================================================================
// Profiles
// =============================================================================

#[derive(Default)]
pub struct MockProfileStore {
    profiles: RwLock<HashMap<Uuid, ProviderProfile>>,
    failing: AtomicBool,
    identity_lookups: AtomicUsize,
    // Written right before the next create, as a concurrent request would.
    racing: RwLock<Vec<ProviderProfile>>,
}

impl MockProfileStore {
    pub fn insert(&self, profile: ProviderProfile) {
        self.profiles.write().unwrap().insert(profile.id, profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.read().unwrap().len()
    }

    pub fn for_target(&self, target: &TargetRef) -> Vec<ProviderProfile> {
        self.all().into_iter().filter(|p| p.target == *target).collect()
    }

    /// Makes every subsequent create and update fail with a storage error.
    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Stores `profile` just before the next create runs.
    pub fn race_next_create(&self, profile: ProviderProfile) {
        self.racing.write().unwrap().push(profile);
    }

    /// Number of `find_by_identity` calls so far.
    pub fn identity_lookups(&self) -> usize {
        self.identity_lookups.load(Ordering::SeqCst)
    }

    pub fn all(&self) -> Vec<ProviderProfile> {
        self.profiles.read().unwrap().values().cloned().collect()
    }

    fn write(&self, profile: &ProviderProfile) -> LinkResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LinkError::storage("profile store unavailable"));
        }
        let mut profiles = self.profiles.write().unwrap();
        if profiles
            .values()
            .any(|p| p.id != profile.id && p.identity_key() == profile.identity_key())
        {
            return Err(LinkError::constraint_violation("duplicate identity"));
        }
        profiles.insert(profile.id, profile.clone());
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MockProfileStore {
    async fn find_by_id(&self, id: Uuid) -> LinkResult<Option<ProviderProfile>> {
        Ok(self.profiles.read().unwrap().get(&id).cloned())
    }

    async fn find_by_identity(&self, key: &IdentityKey) -> LinkResult<Option<ProviderProfile>> {
        self.identity_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.all().into_iter().find(|p| p.identity_key() == *key))
    }

    async fn find_by_remote_id(
        &self,
        provider: Provider,
        remote_id: &str,
    ) -> LinkResult<Vec<ProviderProfile>> {
        Ok(self
            .all()
            .into_iter()
            .filter(|p| p.provider == provider && p.remote_id == remote_id)
            .collect())
    }

    async fn find_for_target(
        &self,
        site_id: &str,
        provider: Provider,
        target: &TargetRef,
    ) -> LinkResult<Option<ProviderProfile>> {
        Ok(self
            .all()
            .into_iter()
            .find(|p| p.site_id == site_id && p.provider == provider && p.target == *target))
    }

    async fn list_for_target(&self, target: &TargetRef) -> LinkResult<Vec<ProviderProfile>> {
        Ok(self.for_target(target))
    }

    async fn create(&self, profile: &ProviderProfile) -> LinkResult<()> {
        let racers: Vec<_> = self.racing.write().unwrap().drain(..).collect();
        for racer in racers {
            self.insert(racer);
        }
        self.write(profile)
    }

    async fn update(&self, profile: &ProviderProfile) -> LinkResult<()> {
        self.write(profile)
    }

    async fn delete(&self, id: Uuid) -> LinkResult<bool> {
        Ok(self.profiles.write().unwrap().remove(&id).is_some())
    }
}

// =============================================================================
// Directory
// =============================================================================

#[derive(Default)]
pub struct MockDirectory {
    objects: RwLock<HashMap<TargetRef, DomainObject>>,
}

impl MockDirectory {
    pub fn insert(&self, object: DomainObject) {
        self.objects
            .write()
            .unwrap()
            .insert(object.target.clone(), object);
    }
}

#[async_trait]
impl ObjectDirectory for MockDirectory {
    async fn resolve(&self, target: &TargetRef) -> LinkResult<Option<DomainObject>> {
        Ok(self.objects.read().unwrap().get(target).cloned())
    }
}

// =============================================================================
// Authenticator
// =============================================================================

const SESSION_USER_KEY: &str = "test.user";

/// Keeps the logged-in account in the session.
#[derive(Default)]
pub struct MockAuthenticator;

#[async_trait]
impl SessionAuthenticator for MockAuthenticator {
    async fn current_user(&self, ctx: &RequestContext) -> LinkResult<Option<Account>> {
        Ok(ctx.session.get(SESSION_USER_KEY))
    }

    async fn authenticate(
        &self,
        ctx: &mut RequestContext,
        account: &Account,
    ) -> LinkResult<SessionPrincipal> {
        ctx.session.insert(SESSION_USER_KEY, account)?;
        Ok(SessionPrincipal::for_account(account))
    }

    async fn end_session(&self, ctx: &mut RequestContext) -> LinkResult<()> {
        ctx.session.clear();
        Ok(())
    }
}
