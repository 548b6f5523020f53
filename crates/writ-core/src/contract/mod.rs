//! Bounded list of animals written on a contract's inscription.
//!
//! An `AnimalContract` is a short-lived view: it is rebuilt from the persisted
//! text on every request and dropped when the request ends. The inscription
//! is the only durable copy of the list.

use std::fmt;

use writ_types::{DocumentId, EntityRef, MAX_INSCRIPTION_LEN};

use crate::codec;
use crate::host::{DocumentStore, EntityLookup, StoreError};
use crate::protection::ProtectionRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    /// The list would no longer fit the inscription. Nothing was written.
    CapacityExceeded { encoded_len: usize },
    Storage(StoreError),
}

impl fmt::Display for ContractError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityExceeded { encoded_len } => write!(
                f,
                "contract already has too many values ({encoded_len} > {MAX_INSCRIPTION_LEN} characters)"
            ),
            Self::Storage(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ContractError {}

impl From<StoreError> for ContractError {
    fn from(value: StoreError) -> Self {
        Self::Storage(value)
    }
}

/// The collaborators a contract reads and writes through.
#[derive(Clone, Copy)]
pub struct ContractContext<'a> {
    pub documents: &'a dyn DocumentStore,
    pub entities: &'a dyn EntityLookup,
    pub registry: &'a ProtectionRegistry,
}

impl<'a> ContractContext<'a> {
    pub fn new<H>(host: &'a H, registry: &'a ProtectionRegistry) -> Self
    where
        H: DocumentStore + EntityLookup,
    {
        Self {
            documents: host,
            entities: host,
            registry,
        }
    }
}

impl fmt::Debug for ContractContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractContext")
            .field("protected", &self.registry.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct AnimalContract<'a> {
    ctx: ContractContext<'a>,
    document: DocumentId,
    entries: Vec<EntityRef>,
}

impl<'a> AnimalContract<'a> {
    /// Loads the list from the document. A document with no text yet is
    /// initialised to empty text.
    pub fn open(ctx: ContractContext<'a>, document: DocumentId) -> Result<Self, ContractError> {
        let entries = match ctx.documents.get_text(document)? {
            Some(text) => codec::decode(&text, ctx.entities),
            None => {
                ctx.documents.set_text(document, "")?;
                Vec::new()
            }
        };
        Ok(Self {
            ctx,
            document,
            entries,
        })
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    /// Appends the entity and persists. Players and scripted NPCs are ignored
    /// without error; callers that need to report that must check eligibility
    /// or `contains` themselves. On any failure the list is left as it was.
    pub fn add(&mut self, entity: EntityRef) -> Result<(), ContractError> {
        if !entity.is_eligible() {
            return Ok(());
        }
        self.entries.push(entity);
        if let Err(err) = self.save() {
            self.entries.pop();
            return Err(err);
        }
        self.ctx.registry.register(entity);
        Ok(())
    }

    /// Removes the first matching entry and persists. The registry forgets the
    /// entity even when this contract never listed it.
    pub fn remove(&mut self, entity: &EntityRef) -> Result<(), ContractError> {
        let position = self.entries.iter().position(|entry| entry == entity);
        if let Some(index) = position {
            self.entries.remove(index);
        }
        match self.save() {
            // Shrinking a list that already fit cannot overflow.
            Ok(()) | Err(ContractError::CapacityExceeded { .. }) => {}
            Err(err) => {
                if let Some(index) = position {
                    self.entries.insert(index, *entity);
                }
                return Err(err);
            }
        }
        self.ctx.registry.unregister(entity.id);
        Ok(())
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        self.entries.contains(entity)
    }

    pub fn snapshot(&self) -> Vec<EntityRef> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn save(&self) -> Result<(), ContractError> {
        let encoded_len = codec::encoded_len(&self.entries);
        if encoded_len > MAX_INSCRIPTION_LEN {
            tracing::debug!(
                document = %self.document,
                encoded_len,
                "contract inscription would overflow"
            );
            return Err(ContractError::CapacityExceeded { encoded_len });
        }
        self.ctx
            .documents
            .set_text(self.document, &codec::encode(&self.entries))?;
        Ok(())
    }
}
