//! In-memory backends for sociallink.
//!
//! Provides [`AccountStore`], [`ProfileStore`], [`ObjectDirectory`] and
//! [`SessionAuthenticator`] implementations backed by `DashMap`, suitable
//! for tests, demos and single-process deployments. Uniqueness of usernames
//! and profile identity keys is enforced with the map entry API, so these
//! stores report `ConstraintViolation` under concurrent writes the way a
//! database unique index would.
//!
//! # Example
//!
//! ```
//! use sociallink::LinkConfig;
//! use sociallink_memory::MemoryBackend;
//!
//! let backend = MemoryBackend::new();
//! let flow = backend.flow(LinkConfig::default()).unwrap();
//! assert_eq!(flow.config().site_id, "default");
//! ```

mod accounts;
mod auth;
mod directory;
mod profiles;

use std::sync::Arc;

use sociallink::{
    AccountStore, LinkConfig, LinkFlow, LinkResult, ObjectDirectory, ProfileStore,
    SessionAuthenticator,
};

pub use accounts::MemoryAccountStore;
pub use auth::{MemorySessionAuthenticator, PRINCIPAL_KEY};
pub use directory::MemoryObjectDirectory;
pub use profiles::MemoryProfileStore;

/// All in-memory collaborators, sharing one account store.
#[derive(Clone)]
pub struct MemoryBackend {
    pub accounts: Arc<MemoryAccountStore>,
    pub profiles: Arc<MemoryProfileStore>,
    pub directory: Arc<MemoryObjectDirectory>,
    pub authenticator: Arc<MemorySessionAuthenticator>,
}

impl MemoryBackend {
    /// Creates empty stores.
    pub fn new() -> Self {
        Self::with_profiles(Arc::new(MemoryProfileStore::new()))
    }

    /// Creates a backend over an existing profile store, e.g. one shared
    /// with a sibling site.
    pub fn with_profiles(profiles: Arc<MemoryProfileStore>) -> Self {
        Self::with_stores(Arc::new(MemoryAccountStore::new()), profiles)
    }

    /// Creates a backend over existing account and profile stores.
    pub fn with_stores(accounts: Arc<MemoryAccountStore>, profiles: Arc<MemoryProfileStore>) -> Self {
        let account_store: Arc<dyn AccountStore> = accounts.clone();
        Self {
            directory: Arc::new(MemoryObjectDirectory::new().with_accounts(account_store.clone())),
            authenticator: Arc::new(MemorySessionAuthenticator::new(account_store)),
            accounts,
            profiles,
        }
    }

    /// Builds a flow over these stores.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if `config` is invalid.
    pub fn flow(&self, config: LinkConfig) -> LinkResult<LinkFlow> {
        let accounts: Arc<dyn AccountStore> = self.accounts.clone();
        let profiles: Arc<dyn ProfileStore> = self.profiles.clone();
        let directory: Arc<dyn ObjectDirectory> = self.directory.clone();
        let authenticator: Arc<dyn SessionAuthenticator> = self.authenticator.clone();
        LinkFlow::new(config, accounts, profiles, directory, authenticator)
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}
