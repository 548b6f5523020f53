//! Process-wide set of animals exempt from aging.
//!
//! The set is a cache of the union of every contract's entries. It is never
//! persisted: `rebuild_from_documents` fills it at startup, and contracts keep
//! it current by registering on add and unregistering on remove. Removal does
//! not consult other contracts, so an animal listed on two contracts loses its
//! protection as soon as either contract drops it.

use std::collections::HashSet;

use parking_lot::RwLock;
use writ_types::{EntityId, EntityRef};

use crate::codec;
use crate::host::{DocumentCatalog, EntityLookup, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub documents_scanned: usize,
    pub contracts_decoded: usize,
    pub entries_loaded: usize,
}

#[derive(Debug, Default)]
pub struct ProtectionRegistry {
    protected: RwLock<HashSet<EntityId>>,
}

impl ProtectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns whether the entity was newly inserted. Ineligible entities are
    /// refused here as well as at the contract.
    pub fn register(&self, entity: EntityRef) -> bool {
        if !entity.is_eligible() {
            return false;
        }
        self.protected.write().insert(entity.id)
    }

    pub fn unregister(&self, id: EntityId) -> bool {
        self.protected.write().remove(&id)
    }

    pub fn is_protected(&self, id: EntityId) -> bool {
        self.protected.read().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.protected.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.protected.read().is_empty()
    }

    /// Sorted copy of the protected ids.
    pub fn snapshot(&self) -> Vec<EntityId> {
        let mut ids = self.protected.read().iter().copied().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    /// Unions the entries of every persisted animal contract into the set.
    /// Entries are taken as decoded, without re-checking eligibility.
    pub fn rebuild_from_documents(
        &self,
        catalog: &dyn DocumentCatalog,
        lookup: &dyn EntityLookup,
    ) -> Result<RebuildReport, StoreError> {
        let mut report = RebuildReport::default();
        let mut loaded = Vec::new();

        for record in catalog.documents()? {
            report.documents_scanned += 1;
            if !record.kind.is_animal_contract() {
                continue;
            }
            report.contracts_decoded += 1;
            let entries = codec::decode(record.text.as_deref().unwrap_or_default(), lookup);
            report.entries_loaded += entries.len();
            loaded.extend(entries.into_iter().map(|entry| entry.id));
        }

        self.protected.write().extend(loaded);
        tracing::info!(
            documents = report.documents_scanned,
            contracts = report.contracts_decoded,
            entries = report.entries_loaded,
            protected = self.len(),
            "rebuilt protection registry"
        );
        Ok(report)
    }
}
