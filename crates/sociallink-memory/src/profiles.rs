use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sociallink::{IdentityKey, LinkError, LinkResult, ProfileStore, Provider, ProviderProfile, TargetRef};
use uuid::Uuid;

/// In-memory provider profile store.
///
/// The identity index maps each [`IdentityKey`] to the one profile holding
/// it. Claims go through the entry API, which makes a duplicate create fail
/// with `ConstraintViolation` even when two requests race.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: DashMap<Uuid, ProviderProfile>,
    identities: DashMap<IdentityKey, Uuid>,
}

impl MemoryProfileStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored profiles.
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Returns `true` if no profiles are stored.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Snapshot of every stored profile.
    pub fn all(&self) -> Vec<ProviderProfile> {
        self.profiles.iter().map(|p| p.value().clone()).collect()
    }

    fn claim_key(&self, key: IdentityKey, profile_id: Uuid) -> LinkResult<()> {
        match self.identities.entry(key) {
            Entry::Occupied(holder) if *holder.get() != profile_id => {
                Err(LinkError::constraint_violation(format!(
                    "{} identity already linked for target type '{}'",
                    holder.key().provider,
                    holder.key().target_type
                )))
            }
            Entry::Occupied(_) => Ok(()),
            Entry::Vacant(slot) => {
                slot.insert(profile_id);
                Ok(())
            }
        }
    }

    fn release_key(&self, key: &IdentityKey, profile_id: Uuid) {
        self.identities.remove_if(key, |_, holder| *holder == profile_id);
    }

    fn matching(&self, predicate: impl Fn(&ProviderProfile) -> bool) -> Vec<ProviderProfile> {
        self.profiles
            .iter()
            .filter(|p| predicate(p.value()))
            .map(|p| p.value().clone())
            .collect()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find_by_id(&self, id: Uuid) -> LinkResult<Option<ProviderProfile>> {
        Ok(self.profiles.get(&id).map(|p| p.value().clone()))
    }

    async fn find_by_identity(&self, key: &IdentityKey) -> LinkResult<Option<ProviderProfile>> {
        let Some(id) = self.identities.get(key).map(|id| *id.value()) else {
            return Ok(None);
        };
        self.find_by_id(id).await
    }

    async fn find_by_remote_id(
        &self,
        provider: Provider,
        remote_id: &str,
    ) -> LinkResult<Vec<ProviderProfile>> {
        Ok(self.matching(|p| p.provider == provider && p.remote_id == remote_id))
    }

    async fn find_for_target(
        &self,
        site_id: &str,
        provider: Provider,
        target: &TargetRef,
    ) -> LinkResult<Option<ProviderProfile>> {
        Ok(self
            .matching(|p| p.site_id == site_id && p.provider == provider && p.target == *target)
            .into_iter()
            .min_by_key(|p| p.created_at))
    }

    async fn list_for_target(&self, target: &TargetRef) -> LinkResult<Vec<ProviderProfile>> {
        let mut profiles = self.matching(|p| p.target == *target);
        profiles.sort_by_key(|p| p.created_at);
        Ok(profiles)
    }

    async fn create(&self, profile: &ProviderProfile) -> LinkResult<()> {
        if self.profiles.contains_key(&profile.id) {
            return Err(LinkError::constraint_violation(format!(
                "profile {} already exists",
                profile.id
            )));
        }
        self.claim_key(profile.identity_key(), profile.id)?;
        self.profiles.insert(profile.id, profile.clone());
        tracing::debug!(profile_id = %profile.id, provider = %profile.provider, "Profile created");
        Ok(())
    }

    async fn update(&self, profile: &ProviderProfile) -> LinkResult<()> {
        let previous = self
            .profiles
            .get(&profile.id)
            .map(|p| p.identity_key())
            .ok_or_else(|| LinkError::storage(format!("profile {} not found", profile.id)))?;

        let key = profile.identity_key();
        if key != previous {
            self.claim_key(key, profile.id)?;
            self.release_key(&previous, profile.id);
        }
        self.profiles.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> LinkResult<bool> {
        match self.profiles.remove(&id) {
            Some((_, profile)) => {
                self.release_key(&profile.identity_key(), id);
                tracing::debug!(profile_id = %id, "Profile deleted");
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
