//! In-process facade over the animal contract core, backed by a SQLite host store.

mod persistence;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use writ_core::{
    action_label, toggle_assignment, ActionLabel, AgeOutcome, AgingPass, AssignOutcome, ContractError,
    ManagementAnswer, ManagementView, ProtectionRegistry, RebuildReport, StoreError, TraitCatalog,
};
use writ_types::{DocumentId, EntityId, EntityRef, ItemKind, WritConfig};

pub use persistence::{AgingCommit, NewEntity, PersistenceError, SqliteWritStore};

#[derive(Debug)]
pub enum ApiError {
    Persistence(PersistenceError),
    Contract(ContractError),
    Store(StoreError),
    NotStarted,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Persistence(err) => write!(f, "{err}"),
            Self::Contract(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::NotStarted => write!(f, "protection registry has not been rebuilt yet"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<PersistenceError> for ApiError {
    fn from(value: PersistenceError) -> Self {
        Self::Persistence(value)
    }
}

impl From<ContractError> for ApiError {
    fn from(value: ContractError) -> Self {
        Self::Contract(value)
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Result of one aging tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub polled: usize,
    pub vetoed: usize,
    pub commit: AgingCommit,
}

#[derive(Debug)]
pub struct WritApi {
    config: WritConfig,
    registry: Arc<ProtectionRegistry>,
    aging: AgingPass,
    catalog: TraitCatalog,
    store: Option<SqliteWritStore>,
    started: bool,
    current_tick: u64,
}

impl WritApi {
    pub fn from_config(config: WritConfig) -> Self {
        let (registry, aging) = fresh_protection(&config);
        Self {
            config,
            registry,
            aging,
            catalog: TraitCatalog::husbandry(),
            store: None,
            started: false,
            current_tick: 0,
        }
    }

    pub fn attach_sqlite_store(&mut self, path: impl AsRef<Path>) -> Result<(), PersistenceError> {
        self.attach(SqliteWritStore::open(path)?);
        Ok(())
    }

    pub fn attach_in_memory_store(&mut self) -> Result<(), PersistenceError> {
        self.attach(SqliteWritStore::open_in_memory()?);
        Ok(())
    }

    /// Protection belongs to the store it was rebuilt from, so a new store
    /// starts from an empty registry and needs `start` again.
    fn attach(&mut self, store: SqliteWritStore) {
        let (registry, aging) = fresh_protection(&self.config);
        self.registry = registry;
        self.aging = aging;
        self.store = Some(store);
        self.started = false;
        self.current_tick = 0;
    }

    fn store(&self) -> Result<&SqliteWritStore, PersistenceError> {
        self.store.as_ref().ok_or(PersistenceError::NotAttached)
    }

    /// Rebuilds the protection registry from every persisted inscription.
    /// Must run once after the store is attached and before aging ticks.
    pub fn start(&mut self) -> Result<RebuildReport, ApiError> {
        let store = self.store()?;
        let report = self.registry.rebuild_from_documents(store, store)?;
        self.started = true;
        Ok(report)
    }

    pub fn config(&self) -> &WritConfig {
        &self.config
    }

    pub fn current_tick(&self) -> u64 {
        self.current_tick
    }

    /// Creates a blank writ owned by `owner`, valued at the configured price.
    pub fn issue_contract(&mut self, owner: EntityId) -> Result<DocumentId, ApiError> {
        let writ = self.store()?.insert_item(
            &ItemKind::AnimalContract,
            Some(owner),
            self.config.contract_price_in_irons,
        )?;
        tracing::info!(%owner, %writ, value = self.config.contract_price_in_irons, "contract issued");
        Ok(writ)
    }

    pub fn spawn_entity(&mut self, entity: &NewEntity) -> Result<EntityRef, ApiError> {
        Ok(self.store()?.insert_entity(entity)?)
    }

    pub fn set_breeding_skill(&mut self, viewer: EntityId, score: f64) -> Result<(), ApiError> {
        Ok(self.store()?.set_breeding_skill(viewer, score)?)
    }

    pub fn action_label(
        &self,
        performer: EntityId,
        writ: DocumentId,
        target: EntityId,
    ) -> Result<Option<ActionLabel>, ApiError> {
        Ok(action_label(
            self.store()?,
            &self.registry,
            performer,
            writ,
            target,
        )?)
    }

    pub fn assign(
        &mut self,
        performer: EntityId,
        writ: DocumentId,
        target: EntityId,
    ) -> Result<AssignOutcome, ApiError> {
        Ok(toggle_assignment(
            self.store()?,
            &self.registry,
            performer,
            writ,
            target,
        )?)
    }

    pub fn management_view(
        &self,
        viewer: EntityId,
        writ: DocumentId,
    ) -> Result<ManagementView, ApiError> {
        Ok(ManagementView::build(
            self.store()?,
            &self.registry,
            viewer,
            writ,
            &self.config,
            &self.catalog,
        )?)
    }

    /// Rebuilds the view `viewer` would have seen and removes the flagged rows.
    pub fn apply_management_answer(
        &mut self,
        viewer: EntityId,
        writ: DocumentId,
        answer: &ManagementAnswer,
    ) -> Result<Vec<String>, ApiError> {
        let view = self.management_view(viewer, writ)?;
        Ok(view.apply_removals(self.store()?, &self.registry, answer)?)
    }

    /// Runs one aging pass over every stored animal and commits the results.
    pub fn age_tick(&mut self) -> Result<TickReport, ApiError> {
        if !self.started {
            return Err(ApiError::NotStarted);
        }
        let Some(store) = self.store.as_mut() else {
            return Err(PersistenceError::NotAttached.into());
        };

        let ages = store.list_ages()?;
        let results = self.aging.run(&ages);
        let vetoed = results
            .iter()
            .filter(|result| result.outcome == Ok(AgeOutcome::Unchanged))
            .count();
        let commit = store.commit_aging(&results)?;

        self.current_tick += 1;
        tracing::debug!(
            tick = self.current_tick,
            polled = ages.len(),
            vetoed,
            expired = commit.expired.len(),
            "aging tick committed"
        );
        Ok(TickReport {
            tick: self.current_tick,
            polled: ages.len(),
            vetoed,
            commit,
        })
    }

    pub fn is_protected(&self, id: EntityId) -> bool {
        self.registry.is_protected(id)
    }

    pub fn protected_entities(&self) -> Vec<EntityId> {
        self.registry.snapshot()
    }
}

fn fresh_protection(config: &WritConfig) -> (Arc<ProtectionRegistry>, AgingPass) {
    let registry = Arc::new(ProtectionRegistry::new());
    let aging = AgingPass::new(
        Arc::clone(&registry),
        usize::from(config.aging_worker_threads),
    );
    (registry, aging)
}

#[cfg(test)]
mod tests {
    use super::*;
    use writ_core::DocumentStore;

    fn api() -> WritApi {
        let mut api = WritApi::from_config(WritConfig::default());
        api.attach_in_memory_store()
            .expect("should attach in-memory store");
        api.start().expect("should rebuild empty registry");
        api
    }

    #[test]
    fn issued_contract_carries_configured_price() {
        let mut api = WritApi::from_config(WritConfig {
            contract_price_in_irons: 250,
            ..WritConfig::default()
        });
        api.attach_in_memory_store().expect("attach");
        let owner = api.spawn_entity(&NewEntity::player("Rolf")).expect("owner");

        let writ = api.issue_contract(owner.id).expect("issue");
        let item = writ_core::ItemRegistry::item(api.store().expect("store"), writ)
            .expect("item should exist");
        assert!(item.kind.is_animal_contract());
        assert_eq!(item.value, 250);
        assert_eq!(item.owner_id, Some(owner.id));
    }

    #[test]
    fn assign_and_view_through_store() {
        let mut api = api();
        let owner = api.spawn_entity(&NewEntity::player("Rolf")).expect("owner");
        let horse = api
            .spawn_entity(&NewEntity::animal("Dobbin", "horse", "bay"))
            .expect("horse");
        let writ = api.issue_contract(owner.id).expect("issue");

        assert_eq!(
            api.action_label(owner.id, writ, horse.id).expect("label"),
            Some(ActionLabel::Assign)
        );
        let outcome = api.assign(owner.id, writ, horse.id).expect("assign");
        assert_eq!(outcome, AssignOutcome::Added { name: "Dobbin".to_string() });
        assert!(api.is_protected(horse.id));

        let view = api.management_view(owner.id, writ).expect("view");
        assert_eq!(view.rows.len(), 1);
        assert_eq!(view.rows[0].colour, "bay");

        let messages = api
            .apply_management_answer(owner.id, writ, &ManagementAnswer::removing([0]))
            .expect("apply");
        assert_eq!(messages, vec!["You remove Dobbin from the contract.".to_string()]);
        assert!(api.protected_entities().is_empty());
    }

    #[test]
    fn reattaching_drops_protection_from_the_previous_store() {
        let mut api = api();
        let owner = api.spawn_entity(&NewEntity::player("Rolf")).expect("owner");
        let horse = api
            .spawn_entity(&NewEntity::animal("Dobbin", "horse", "bay"))
            .expect("horse");
        let writ = api.issue_contract(owner.id).expect("issue");
        api.assign(owner.id, writ, horse.id).expect("assign");
        assert!(api.is_protected(horse.id));

        api.attach_in_memory_store().expect("reattach");
        assert!(!api.is_protected(horse.id));
        assert!(matches!(api.age_tick(), Err(ApiError::NotStarted)));

        api.start().expect("rebuild from new store");
        // The new store reuses the same row ids for unrelated entities.
        let stranger = api
            .spawn_entity(&NewEntity::animal("Stray", "dog", "grey"))
            .expect("stranger");
        let rex = api
            .spawn_entity(&NewEntity::animal("Rex", "dog", "brown"))
            .expect("rex");
        assert_eq!(rex.id, horse.id);
        assert!(api.protected_entities().is_empty());
        let report = api.age_tick().expect("tick");
        assert_eq!(report.vetoed, 0);
        assert_eq!(report.commit.aged, 2);
        assert!(!api.is_protected(stranger.id));
    }

    #[test]
    fn aging_requires_start() {
        let mut api = WritApi::from_config(WritConfig::default());
        api.attach_in_memory_store().expect("attach");
        assert!(matches!(api.age_tick(), Err(ApiError::NotStarted)));
    }

    #[test]
    fn protected_animals_skip_aging_and_expiry() {
        let mut api = api();
        let owner = api.spawn_entity(&NewEntity::player("Rolf")).expect("owner");
        let mut frail = NewEntity::animal("Old Tom", "cat", "grey");
        frail.lifespan = 1;
        let kept = api.spawn_entity(&frail).expect("kept");
        let lost = api.spawn_entity(&frail).expect("lost");
        let writ = api.issue_contract(owner.id).expect("issue");
        api.assign(owner.id, writ, kept.id).expect("assign");

        let report = api.age_tick().expect("tick");
        assert_eq!(report.tick, 1);
        assert_eq!(report.polled, 2);
        assert_eq!(report.vetoed, 1);
        assert_eq!(report.commit.expired, vec![lost.id]);

        let store = api.store().expect("store");
        assert_eq!(writ_core::EntityLookup::resolve(store, lost.id), None);
        assert!(writ_core::EntityLookup::resolve(store, kept.id).is_some());
        assert_eq!(store.get_text(writ), Ok(Some(kept.id.to_string())));
    }

    #[test]
    fn restart_rebuilds_registry_from_inscriptions() {
        let mut api = api();
        let owner = api.spawn_entity(&NewEntity::player("Rolf")).expect("owner");
        let horse = api
            .spawn_entity(&NewEntity::animal("Dobbin", "horse", "bay"))
            .expect("horse");
        let writ = api.issue_contract(owner.id).expect("issue");
        api.store()
            .expect("store")
            .set_text(writ, &format!("{}\n", horse.id))
            .expect("raw write");

        let report = api.start().expect("rebuild");
        assert_eq!(report.contracts_decoded, 1);
        assert_eq!(report.entries_loaded, 1);
        assert!(api.is_protected(horse.id));
    }
}
