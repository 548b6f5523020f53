//! Animal contract writs: a bounded list of animals persisted in an item's
//! inscription, a process-wide protection registry derived from every such
//! list, aging interception for protected animals, and trust-gated trait
//! summaries for the management view.

pub mod actions;
pub mod codec;
pub mod contract;
pub mod disclosure;
pub mod host;
pub mod lifecycle;
pub mod management;
pub mod protection;

pub use actions::{action_label, toggle_assignment, ActionLabel, AssignOutcome};
pub use contract::{AnimalContract, ContractContext, ContractError};
pub use disclosure::{summarize, summarize_for_viewer, TraitCatalog};
pub use host::{
    AnimalDirectory, ControlPolicy, DocumentCatalog, DocumentStore, EntityLookup, InMemoryHost,
    ItemRegistry, StoreError, TrustSource, WritHost,
};
pub use lifecycle::{advance_age, AgeOutcome, AgingError, AgingPass, AgingResult, LifecycleInterceptor};
pub use management::{ManagementAnswer, ManagementRow, ManagementView};
pub use protection::{ProtectionRegistry, RebuildReport};
