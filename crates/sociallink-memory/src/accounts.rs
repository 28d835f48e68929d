use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sociallink::{Account, AccountStore, LinkError, LinkResult};

/// In-memory account store.
///
/// Usernames are unique through a secondary index claimed with the entry
/// API, so two concurrent creates of the same username cannot both succeed.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: DashMap<String, Account>,
    /// username -> account id
    usernames: DashMap<String, String>,
}

impl MemoryAccountStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns `true` if no accounts are stored.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Snapshot of every stored account.
    pub fn all(&self) -> Vec<Account> {
        self.accounts.iter().map(|a| a.value().clone()).collect()
    }

    fn claim_username(&self, username: &str, account_id: &str) -> LinkResult<()> {
        match self.usernames.entry(username.to_string()) {
            Entry::Occupied(owner) if owner.get() != account_id => Err(LinkError::constraint_violation(
                format!("username '{username}' is taken"),
            )),
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(account_id.to_string());
                Ok(())
            }
        }
    }

    fn release_username(&self, username: &str, account_id: &str) {
        self.usernames.remove_if(username, |_, owner| owner == account_id);
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_id(&self, account_id: &str) -> LinkResult<Option<Account>> {
        Ok(self.accounts.get(account_id).map(|a| a.value().clone()))
    }

    async fn find_by_username(&self, username: &str) -> LinkResult<Option<Account>> {
        let Some(account_id) = self.usernames.get(username).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        self.find_by_id(&account_id).await
    }

    async fn create(&self, account: &Account) -> LinkResult<()> {
        if self.accounts.contains_key(&account.id) {
            return Err(LinkError::constraint_violation(format!(
                "account '{}' already exists",
                account.id
            )));
        }
        self.claim_username(&account.username, &account.id)?;
        self.accounts.insert(account.id.clone(), account.clone());
        tracing::debug!(account_id = %account.id, "Account created");
        Ok(())
    }

    async fn update(&self, account: &Account) -> LinkResult<()> {
        let previous = self
            .accounts
            .get(&account.id)
            .map(|a| a.username.clone())
            .ok_or_else(|| LinkError::storage(format!("account '{}' not found", account.id)))?;

        if previous != account.username {
            self.claim_username(&account.username, &account.id)?;
            self.release_username(&previous, &account.id);
        }
        self.accounts.insert(account.id.clone(), account.clone());
        Ok(())
    }

    async fn delete(&self, account_id: &str) -> LinkResult<()> {
        if let Some((_, account)) = self.accounts.remove(account_id) {
            self.release_username(&account.username, account_id);
            tracing::debug!(account_id = %account_id, "Account deleted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_test::block_on;

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryAccountStore::new();
        let account = Account::new("alice");
        store.create(&account).await.unwrap();

        assert_eq!(store.find_by_id(&account.id).await.unwrap(), Some(account.clone()));
        assert_eq!(store.find_by_username("alice").await.unwrap(), Some(account));
        assert_eq!(store.find_by_username("bob").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let store = MemoryAccountStore::new();
        store.create(&Account::new("alice")).await.unwrap();

        let err = store.create(&Account::new("alice")).await.unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_creates_single_winner() {
        let store = Arc::new(MemoryAccountStore::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.create(&Account::new("alice")).await.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_rename_moves_index() {
        let store = MemoryAccountStore::new();
        let mut account = Account::new("alice");
        store.create(&account).await.unwrap();
        store.create(&Account::new("bob")).await.unwrap();

        account.username = "bob".to_string();
        assert!(store.update(&account).await.unwrap_err().is_constraint_violation());

        account.username = "carol".to_string();
        store.update(&account).await.unwrap();
        assert!(store.find_by_username("alice").await.unwrap().is_none());
        assert_eq!(store.find_by_username("carol").await.unwrap().unwrap().id, account.id);
    }

    #[test]
    fn test_delete_frees_username() {
        let store = MemoryAccountStore::new();
        block_on(async {
            let account = Account::new("alice");
            store.create(&account).await.unwrap();
            store.delete(&account.id).await.unwrap();
            store.delete(&account.id).await.unwrap();

            assert!(store.is_empty());
            store.create(&Account::new("alice")).await.unwrap();
        });
    }

    #[tokio::test]
    async fn test_update_missing() {
        let store = MemoryAccountStore::new();
        let err = store.update(&Account::new("ghost")).await.unwrap_err();
        assert!(matches!(err, LinkError::Storage { .. }));
    }
}
