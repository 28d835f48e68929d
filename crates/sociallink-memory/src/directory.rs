use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use sociallink::{AccountStore, DomainObject, LinkResult, ObjectDirectory, TargetRef};

/// In-memory object directory.
///
/// Registered objects resolve as-is. User targets resolve through the
/// account store when one is attached.
#[derive(Default)]
pub struct MemoryObjectDirectory {
    objects: DashMap<TargetRef, DomainObject>,
    accounts: Option<Arc<dyn AccountStore>>,
}

impl MemoryObjectDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves user targets through `accounts`.
    #[must_use]
    pub fn with_accounts(mut self, accounts: Arc<dyn AccountStore>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    /// Registers a linkable object.
    pub fn register(&self, object: DomainObject) {
        self.objects.insert(object.target.clone(), object);
    }

    /// Removes an object.
    pub fn unregister(&self, target: &TargetRef) {
        self.objects.remove(target);
    }
}

#[async_trait]
impl ObjectDirectory for MemoryObjectDirectory {
    async fn resolve(&self, target: &TargetRef) -> LinkResult<Option<DomainObject>> {
        if let Some(object) = self.objects.get(target) {
            return Ok(Some(object.value().clone()));
        }
        match &self.accounts {
            Some(accounts) if target.is_user() => Ok(accounts
                .find_by_id(&target.object_id)
                .await?
                .map(|account| DomainObject::new(account.target_ref()))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryAccountStore;
    use sociallink::Account;

    #[tokio::test]
    async fn test_registered_objects() {
        let directory = MemoryObjectDirectory::new();
        let article = TargetRef::new("Article", "42");
        directory.register(DomainObject::new(article.clone()).with_canonical_url("/articles/42/"));

        let object = directory.resolve(&article).await.unwrap().unwrap();
        assert_eq!(object.canonical_url.as_deref(), Some("/articles/42/"));

        directory.unregister(&article);
        assert!(directory.resolve(&article).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_user_targets_resolve_through_accounts() {
        let accounts = Arc::new(MemoryAccountStore::new());
        let account = Account::new("alice");
        accounts.create(&account).await.unwrap();

        let directory = MemoryObjectDirectory::new().with_accounts(accounts);
        assert!(directory.resolve(&account.target_ref()).await.unwrap().is_some());
        assert!(directory.resolve(&TargetRef::user("missing")).await.unwrap().is_none());
        assert!(MemoryObjectDirectory::new()
            .resolve(&account.target_ref())
            .await
            .unwrap()
            .is_none());
    }
}
