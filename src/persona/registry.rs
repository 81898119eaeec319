//! Persona registry: the authoritative set of personas and their status.
//!
//! Reads never cache; a status change is visible to the next lookup. Each
//! persona has its own lock, so mutating one never blocks another. When the
//! registry is store-backed every mutation is persisted before it returns.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::store::{self, collections, DocumentStore};

use super::bundled::default_personas;
use super::types::{Persona, PersonaRole, PersonaStatus};

struct PersonaEntry {
    data: RwLock<Persona>,
    /// Serializes mutate-and-persist for this record
    write_lock: tokio::sync::Mutex<()>,
}

impl PersonaEntry {
    fn new(persona: Persona) -> Arc<Self> {
        Arc::new(Self {
            data: RwLock::new(persona),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }
}

/// Registry totals for status displays
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegistryStats {
    pub total: usize,
    pub active: usize,
    pub by_role: BTreeMap<PersonaRole, usize>,
    pub by_status: BTreeMap<String, usize>,
}

/// Thread-safe persona registry
pub struct PersonaRegistry {
    personas: RwLock<HashMap<String, Arc<PersonaEntry>>>,
    store: Option<Arc<dyn DocumentStore>>,
    /// Held across the duplicate check, persist and publish of a new persona
    registration: tokio::sync::Mutex<()>,
}

impl PersonaRegistry {
    /// Create an empty, memory-only registry
    pub fn new() -> Self {
        Self {
            personas: RwLock::new(HashMap::new()),
            store: None,
            registration: tokio::sync::Mutex::new(()),
        }
    }

    /// Create an empty registry that persists every mutation
    pub fn with_store(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            personas: RwLock::new(HashMap::new()),
            store: Some(store),
            registration: tokio::sync::Mutex::new(()),
        }
    }

    /// Load personas from the store, seeding the bundled defaults when the
    /// store holds none.
    pub async fn bootstrap(store: Arc<dyn DocumentStore>) -> Result<Self> {
        let stored: Vec<Persona> = store::list_docs(store.as_ref(), collections::PERSONAS).await?;
        let registry = Self::with_store(store);

        if stored.is_empty() {
            let defaults = default_personas()?;
            let count = defaults.len();
            for persona in defaults {
                registry.register(persona).await?;
            }
            info!(count, "Seeded default personas");
            return Ok(registry);
        }

        let mut personas = registry.personas.write();
        for persona in stored {
            if let Err(e) = persona.validate() {
                warn!(error = %e.format_for_log(), "Skipping invalid stored persona");
                continue;
            }
            personas.insert(persona.id.clone(), PersonaEntry::new(persona));
        }
        info!(count = personas.len(), "Loaded personas from store");
        drop(personas);

        Ok(registry)
    }

    async fn persist(&self, persona: &Persona) -> Result<()> {
        match self.store {
            Some(ref store) => {
                store::upsert_doc(store.as_ref(), collections::PERSONAS, &persona.id, persona).await
            }
            None => Ok(()),
        }
    }

    fn entry(&self, id: &str) -> Result<Arc<PersonaEntry>> {
        self.personas
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::unknown_persona(id))
    }

    /// Register a new persona. Fails with `DuplicateIdentity` if the id exists.
    ///
    /// The persona becomes visible to lookups only once it is persisted.
    pub async fn register(&self, persona: Persona) -> Result<()> {
        persona.validate()?;
        let id = persona.id.clone();

        let _registering = self.registration.lock().await;
        if self.personas.read().contains_key(&id) {
            return Err(Error::DuplicateIdentity { id });
        }
        self.persist(&persona).await?;
        self.personas
            .write()
            .insert(id.clone(), PersonaEntry::new(persona.clone()));

        info!(
            persona_id = %id,
            role = %persona.role,
            authority = persona.authority_level,
            "Persona registered"
        );
        Ok(())
    }

    /// Set a persona's status. Fails with `UnknownPersona` if absent.
    pub async fn update_status(&self, id: &str, status: PersonaStatus) -> Result<Persona> {
        self.transition(id, None, status)
            .await?
            .ok_or_else(|| Error::Internal(format!("unconditional status update on {} skipped", id)))
    }

    /// Set a persona's status only if it currently is `expected`.
    ///
    /// Returns the updated persona, or `None` when the current status differs.
    pub async fn update_status_if(
        &self,
        id: &str,
        expected: PersonaStatus,
        status: PersonaStatus,
    ) -> Result<Option<Persona>> {
        self.transition(id, Some(expected), status).await
    }

    async fn transition(
        &self,
        id: &str,
        expected: Option<PersonaStatus>,
        status: PersonaStatus,
    ) -> Result<Option<Persona>> {
        let entry = self.entry(id)?;
        let _guard = entry.write_lock.lock().await;

        let (previous, updated) = {
            let mut persona = entry.data.write();
            if expected.is_some_and(|e| e != persona.status) {
                return Ok(None);
            }
            let previous = persona.clone();
            persona.status = status;
            persona.updated_at = Utc::now();
            (previous, persona.clone())
        };

        if let Err(e) = self.persist(&updated).await {
            *entry.data.write() = previous;
            return Err(e);
        }

        debug!(
            persona_id = %id,
            from = %previous.status,
            to = %status,
            "Persona status updated"
        );
        Ok(Some(updated))
    }

    /// Get a snapshot of a persona
    pub fn get(&self, id: &str) -> Option<Persona> {
        self.personas.read().get(id).map(|e| e.data.read().clone())
    }

    /// All personas ordered by id
    pub fn list_all(&self) -> Vec<Persona> {
        let mut all: Vec<Persona> = self
            .personas
            .read()
            .values()
            .map(|e| e.data.read().clone())
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Active personas, optionally filtered by role, ordered by descending
    /// authority then id
    pub fn list_active(&self, role: Option<PersonaRole>) -> Vec<Persona> {
        let mut active: Vec<Persona> = self
            .personas
            .read()
            .values()
            .map(|e| e.data.read().clone())
            .filter(|p| p.is_active() && role.map_or(true, |r| p.role == r))
            .collect();
        active.sort_by(|a, b| {
            b.authority_level
                .cmp(&a.authority_level)
                .then_with(|| a.id.cmp(&b.id))
        });
        active
    }

    pub fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats::default();
        for persona in self.list_all() {
            stats.total += 1;
            if persona.is_active() {
                stats.active += 1;
            }
            *stats.by_role.entry(persona.role).or_default() += 1;
            *stats.by_status.entry(persona.status.to_string()).or_default() += 1;
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.personas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PersonaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::Notify;

    /// Holds every upsert until released; optionally fails it
    struct GatedStore {
        inner: MemoryStore,
        entered: Notify,
        release: Notify,
        fail: bool,
    }

    impl GatedStore {
        fn new(fail: bool) -> Self {
            Self {
                inner: MemoryStore::new(),
                entered: Notify::new(),
                release: Notify::new(),
                fail,
            }
        }
    }

    #[async_trait]
    impl DocumentStore for GatedStore {
        fn location(&self) -> String {
            "gated".to_string()
        }

        async fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
            self.inner.insert(collection, id, doc).await
        }

        async fn upsert(&self, collection: &str, id: &str, doc: Value) -> Result<()> {
            self.entered.notify_one();
            self.release.notified().await;
            if self.fail {
                return Err(Error::Internal("disk full".to_string()));
            }
            self.inner.upsert(collection, id, doc).await
        }

        async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
            self.inner.get(collection, id).await
        }

        async fn list(&self, collection: &str) -> Result<Vec<Value>> {
            self.inner.list(collection).await
        }
    }

    fn persona(id: &str, role: PersonaRole, authority: u8) -> Persona {
        Persona::new(id, id, role, authority).unwrap()
    }

    #[tokio::test]
    async fn test_register_duplicate() {
        let registry = PersonaRegistry::new();
        registry.register(persona("a", PersonaRole::Technical, 5)).await.unwrap();
        let err = registry
            .register(persona("a", PersonaRole::Community, 3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentity { .. }));
        assert_eq!(registry.get("a").unwrap().role, PersonaRole::Technical);
    }

    #[tokio::test]
    async fn test_register_publishes_only_after_persist() {
        for fail in [false, true] {
            let store = Arc::new(GatedStore::new(fail));
            let registry = Arc::new(PersonaRegistry::with_store(store.clone()));

            let pending = tokio::spawn({
                let registry = registry.clone();
                async move { registry.register(persona("nina", PersonaRole::Technical, 6)).await }
            });

            store.entered.notified().await;
            assert!(registry.get("nina").is_none());
            assert!(registry.list_active(None).is_empty());

            store.release.notify_one();
            let result = pending.await.unwrap();
            assert_eq!(result.is_err(), fail);
            assert_eq!(registry.get("nina").is_some(), !fail);
        }
    }

    #[tokio::test]
    async fn test_update_status_unknown() {
        let registry = PersonaRegistry::new();
        let err = registry
            .update_status("ghost", PersonaStatus::Suspended)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnknownPersona { .. }));
    }

    #[tokio::test]
    async fn test_status_change_visible_immediately() {
        let registry = PersonaRegistry::new();
        registry.register(persona("a", PersonaRole::Technical, 5)).await.unwrap();
        assert_eq!(registry.list_active(None).len(), 1);

        registry.update_status("a", PersonaStatus::Maintenance).await.unwrap();
        assert!(registry.list_active(None).is_empty());
        assert_eq!(registry.get("a").unwrap().status, PersonaStatus::Maintenance);
    }

    #[tokio::test]
    async fn test_update_status_if() {
        let registry = PersonaRegistry::new();
        registry
            .register(persona("a", PersonaRole::Technical, 5).with_status(PersonaStatus::Inactive))
            .await
            .unwrap();

        let skipped = registry
            .update_status_if("a", PersonaStatus::Active, PersonaStatus::Suspended)
            .await
            .unwrap();
        assert!(skipped.is_none());
        assert_eq!(registry.get("a").unwrap().status, PersonaStatus::Inactive);
    }

    #[tokio::test]
    async fn test_list_active_ordering_and_filter() {
        let registry = PersonaRegistry::new();
        registry.register(persona("b", PersonaRole::Technical, 8)).await.unwrap();
        registry.register(persona("a", PersonaRole::Technical, 8)).await.unwrap();
        registry.register(persona("c", PersonaRole::Executive, 9)).await.unwrap();

        let ids: Vec<_> = registry.list_active(None).into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);

        let tech = registry.list_active(Some(PersonaRole::Technical));
        assert_eq!(tech.len(), 2);
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_then_reloads() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());

        let first = PersonaRegistry::bootstrap(store.clone()).await.unwrap();
        assert_eq!(first.len(), 4);
        first
            .update_status("marcus_technical", PersonaStatus::Suspended)
            .await
            .unwrap();

        let second = PersonaRegistry::bootstrap(store).await.unwrap();
        assert_eq!(second.len(), 4);
        let marcus = second.get("marcus_technical").unwrap();
        assert_eq!(marcus.status, PersonaStatus::Suspended);
        assert_eq!(marcus.role, PersonaRole::Technical);
        assert_eq!(marcus.authority_level, 8);
        assert!(marcus.expertise.contains("mining"));
    }

    #[tokio::test]
    async fn test_stats() {
        let registry = PersonaRegistry::new();
        registry.register(persona("a", PersonaRole::Technical, 5)).await.unwrap();
        registry
            .register(persona("b", PersonaRole::Compliance, 8).with_status(PersonaStatus::Inactive))
            .await
            .unwrap();

        let stats = registry.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.by_role.get(&PersonaRole::Compliance), Some(&1));
        assert_eq!(stats.by_status.get("inactive"), Some(&1));
    }
}
