//! Aging interception: protected animals skip the periodic age poll.

use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use writ_types::{AnimalAge, EntityId};

use crate::protection::ProtectionRegistry;

/// Guards a per-entity lifecycle advance. Read-only with respect to the registry.
#[derive(Debug, Clone)]
pub struct LifecycleInterceptor {
    registry: Arc<ProtectionRegistry>,
}

impl LifecycleInterceptor {
    pub fn new(registry: Arc<ProtectionRegistry>) -> Self {
        Self { registry }
    }

    /// Returns `vetoed` without calling `advance` when the entity is protected;
    /// otherwise returns whatever `advance` returns, errors included.
    pub fn poll<T, E, F>(&self, entity: EntityId, vetoed: T, advance: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        if self.registry.is_protected(entity) {
            return Ok(vetoed);
        }
        advance()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeOutcome {
    /// The poll was vetoed; the animal did not age.
    Unchanged,
    Aged { age: u32 },
    /// The animal reached its lifespan and should be removed by the host.
    Expired { age: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgingError {
    AgeOverflow { entity_id: EntityId },
}

impl fmt::Display for AgingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AgeOverflow { entity_id } => write!(f, "age counter overflow for {entity_id}"),
        }
    }
}

impl std::error::Error for AgingError {}

/// One age step. A lifespan of zero never expires.
pub fn advance_age(animal: &AnimalAge) -> Result<AgeOutcome, AgingError> {
    let age = animal.age.checked_add(1).ok_or(AgingError::AgeOverflow {
        entity_id: animal.entity_id,
    })?;
    if animal.lifespan > 0 && age >= animal.lifespan {
        Ok(AgeOutcome::Expired { age })
    } else {
        Ok(AgeOutcome::Aged { age })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgingResult {
    pub entity_id: EntityId,
    pub outcome: Result<AgeOutcome, AgingError>,
}

/// Polls every animal once per tick. Evaluation is pure, so it fans out on a
/// rayon pool when more than one worker is configured; the host commits the
/// returned outcomes itself.
#[derive(Debug)]
pub struct AgingPass {
    interceptor: LifecycleInterceptor,
    pool: Option<rayon::ThreadPool>,
}

impl AgingPass {
    pub fn new(registry: Arc<ProtectionRegistry>, worker_threads: usize) -> Self {
        let pool = if worker_threads > 1 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(worker_threads)
                .build()
                .map_err(|err| {
                    tracing::warn!(%err, "aging pool unavailable, polling sequentially");
                })
                .ok()
        } else {
            None
        };
        Self {
            interceptor: LifecycleInterceptor::new(registry),
            pool,
        }
    }

    pub fn interceptor(&self) -> &LifecycleInterceptor {
        &self.interceptor
    }

    /// Results are sorted by entity id regardless of evaluation order.
    pub fn run(&self, animals: &[AnimalAge]) -> Vec<AgingResult> {
        let poll_one = |animal: &AnimalAge| AgingResult {
            entity_id: animal.entity_id,
            outcome: self
                .interceptor
                .poll(animal.entity_id, AgeOutcome::Unchanged, || advance_age(animal)),
        };

        let mut results = match &self.pool {
            Some(pool) if animals.len() > 1 => {
                pool.install(|| animals.par_iter().map(poll_one).collect::<Vec<_>>())
            }
            _ => animals.iter().map(poll_one).collect::<Vec<_>>(),
        };
        results.sort_by_key(|result| result.entity_id);
        results
    }
}
