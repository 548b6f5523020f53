//! Collaborator seams supplied by the host, and an in-memory host used by tests and tooling.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use parking_lot::Mutex;
use writ_types::{
    AnimalAge, AnimalProfile, DocumentId, DocumentRecord, EntityId, EntityRef, ItemKind,
    ItemRecord,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    Backend(String),
    UnknownDocument(DocumentId),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(message) => write!(f, "document store error: {message}"),
            Self::UnknownDocument(id) => write!(f, "no item carries document {id}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Durable inscription text, one field per host item.
pub trait DocumentStore {
    fn get_text(&self, document: DocumentId) -> Result<Option<String>, StoreError>;
    fn set_text(&self, document: DocumentId, text: &str) -> Result<(), StoreError>;
}

/// Startup-only enumeration of every persisted inscription.
pub trait DocumentCatalog {
    fn documents(&self) -> Result<Vec<DocumentRecord>, StoreError>;
}

/// Resolves ids to live entities. `None` means the entity no longer exists.
pub trait EntityLookup {
    fn resolve(&self, id: EntityId) -> Option<EntityRef>;
}

pub trait AnimalDirectory {
    fn profile(&self, id: EntityId) -> Option<AnimalProfile>;
}

pub trait ItemRegistry {
    fn item(&self, id: DocumentId) -> Option<ItemRecord>;
}

/// Whether `performer` may lead or otherwise take control of `target`.
pub trait ControlPolicy {
    fn may_control(&self, performer: EntityId, target: EntityId) -> bool;
}

/// Skill-like score deciding how many hidden traits a viewer can see.
/// `None` means the viewer has no record for the skill at all.
pub trait TrustSource {
    fn trust_score_for(&self, viewer: EntityId) -> Option<f64>;
}

/// Everything the action and management layers need from the host.
pub trait WritHost:
    DocumentStore + DocumentCatalog + EntityLookup + AnimalDirectory + ItemRegistry + ControlPolicy + TrustSource
{
}

impl<T> WritHost for T where
    T: DocumentStore
        + DocumentCatalog
        + EntityLookup
        + AnimalDirectory
        + ItemRegistry
        + ControlPolicy
        + TrustSource
{
}

#[derive(Debug, Default)]
struct MemoryState {
    items: BTreeMap<DocumentId, ItemRecord>,
    inscriptions: BTreeMap<DocumentId, String>,
    animals: BTreeMap<EntityId, AnimalProfile>,
    ages: BTreeMap<EntityId, AnimalAge>,
    owners: BTreeMap<EntityId, EntityId>,
    trust: BTreeMap<EntityId, f64>,
    writes: u64,
}

/// Host backed by plain maps. Ids are handed out from one counter shared by
/// items and entities.
#[derive(Debug, Default)]
pub struct InMemoryHost {
    state: Mutex<MemoryState>,
    next_id: Mutex<u64>,
    failing_writes: Mutex<BTreeSet<DocumentId>>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> u64 {
        let mut next = self.next_id.lock();
        *next += 1;
        *next
    }

    /// Creates an item with no inscription field at all.
    pub fn create_item(&self, kind: ItemKind, owner_id: Option<EntityId>) -> DocumentId {
        let item_id = DocumentId(self.allocate_id());
        self.state.lock().items.insert(
            item_id,
            ItemRecord {
                item_id,
                kind,
                owner_id,
                value: 0,
            },
        );
        item_id
    }

    pub fn create_contract(&self, owner_id: Option<EntityId>) -> DocumentId {
        self.create_item(ItemKind::AnimalContract, owner_id)
    }

    pub fn spawn(&self, kind: writ_types::EntityKind, name: &str, species: &str) -> EntityRef {
        let entity = EntityRef::new(EntityId(self.allocate_id()), kind);
        self.insert_profile(AnimalProfile {
            entity,
            name: name.to_string(),
            species: species.to_string(),
            colour: "brown".to_string(),
            traits: 0,
        });
        entity
    }

    pub fn spawn_animal(&self, name: &str) -> EntityRef {
        self.spawn(writ_types::EntityKind::Animal, name, "horse")
    }

    pub fn insert_profile(&self, profile: AnimalProfile) {
        let mut state = self.state.lock();
        let id = profile.entity.id;
        state.ages.entry(id).or_insert(AnimalAge {
            entity_id: id,
            age: 0,
            lifespan: 0,
        });
        state.animals.insert(id, profile);
    }

    pub fn set_traits(&self, id: EntityId, traits: u64) {
        if let Some(profile) = self.state.lock().animals.get_mut(&id) {
            profile.traits = traits;
        }
    }

    pub fn set_age(&self, age: AnimalAge) {
        self.state.lock().ages.insert(age.entity_id, age);
    }

    pub fn ages(&self) -> Vec<AnimalAge> {
        self.state.lock().ages.values().copied().collect()
    }

    /// Removes the entity as if it died; persisted references to it go stale.
    pub fn despawn(&self, id: EntityId) {
        let mut state = self.state.lock();
        state.animals.remove(&id);
        state.ages.remove(&id);
    }

    pub fn set_owner(&self, animal: EntityId, owner: EntityId) {
        self.state.lock().owners.insert(animal, owner);
    }

    pub fn set_trust(&self, viewer: EntityId, score: f64) {
        self.state.lock().trust.insert(viewer, score);
    }

    /// Writes inscription text directly, bypassing any contract logic.
    pub fn write_raw(&self, document: DocumentId, text: &str) {
        self.state
            .lock()
            .inscriptions
            .insert(document, text.to_string());
    }

    pub fn raw_text(&self, document: DocumentId) -> Option<String> {
        self.state.lock().inscriptions.get(&document).cloned()
    }

    pub fn write_count(&self) -> u64 {
        self.state.lock().writes
    }

    pub fn fail_writes_to(&self, document: DocumentId) {
        self.failing_writes.lock().insert(document);
    }
}

impl DocumentStore for InMemoryHost {
    fn get_text(&self, document: DocumentId) -> Result<Option<String>, StoreError> {
        let state = self.state.lock();
        if !state.items.contains_key(&document) {
            return Err(StoreError::UnknownDocument(document));
        }
        Ok(state.inscriptions.get(&document).cloned())
    }

    fn set_text(&self, document: DocumentId, text: &str) -> Result<(), StoreError> {
        if self.failing_writes.lock().contains(&document) {
            return Err(StoreError::Backend(format!("write to {document} rejected")));
        }
        let mut state = self.state.lock();
        if !state.items.contains_key(&document) {
            return Err(StoreError::UnknownDocument(document));
        }
        state.inscriptions.insert(document, text.to_string());
        state.writes += 1;
        Ok(())
    }
}

impl DocumentCatalog for InMemoryHost {
    fn documents(&self) -> Result<Vec<DocumentRecord>, StoreError> {
        let state = self.state.lock();
        Ok(state
            .inscriptions
            .iter()
            .filter_map(|(document_id, text)| {
                state.items.get(document_id).map(|item| DocumentRecord {
                    document_id: *document_id,
                    kind: item.kind.clone(),
                    text: Some(text.clone()),
                })
            })
            .collect())
    }
}

impl EntityLookup for InMemoryHost {
    fn resolve(&self, id: EntityId) -> Option<EntityRef> {
        self.state
            .lock()
            .animals
            .get(&id)
            .map(|profile| profile.entity)
    }
}

impl AnimalDirectory for InMemoryHost {
    fn profile(&self, id: EntityId) -> Option<AnimalProfile> {
        self.state.lock().animals.get(&id).cloned()
    }
}

impl ItemRegistry for InMemoryHost {
    fn item(&self, id: DocumentId) -> Option<ItemRecord> {
        self.state.lock().items.get(&id).cloned()
    }
}

impl ControlPolicy for InMemoryHost {
    fn may_control(&self, performer: EntityId, target: EntityId) -> bool {
        self.state
            .lock()
            .owners
            .get(&target)
            .map_or(true, |owner| *owner == performer)
    }
}

impl TrustSource for InMemoryHost {
    fn trust_score_for(&self, viewer: EntityId) -> Option<f64> {
        self.state.lock().trust.get(&viewer).copied()
    }
}
