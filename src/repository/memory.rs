use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use super::{listing_order, LampRepository, Window};
use crate::error::{RepositoryError, RepositoryResult};
use crate::lamp::LampEntity;

/// In-memory lamp store.
///
/// Slots hold `Arc<LampEntity>` snapshots that are never mutated in place.
/// A writer replaces the whole `Arc`, which gives `update` a pointer identity
/// to compare-and-swap against.
pub struct InMemoryLampRepository {
    /// Lock-striped concurrent map; unrelated ids never share a lock
    lamps: DashMap<Uuid, Arc<LampEntity>>,
}

impl InMemoryLampRepository {
    pub fn new() -> Self {
        Self {
            lamps: DashMap::new(),
        }
    }

    /// Number of live lamps
    pub fn len(&self) -> usize {
        self.lamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lamps.is_empty()
    }

    /// Replace the slot for `lamp.id` only if it still holds `observed`.
    ///
    /// `Err(NotFound)` when the slot vanished, `Ok(false)` when another
    /// writer swapped it first.
    fn compare_and_swap(
        &self,
        observed: &Arc<LampEntity>,
        replacement: &LampEntity,
    ) -> RepositoryResult<bool> {
        let Some(mut slot) = self.lamps.get_mut(&replacement.id) else {
            return Err(RepositoryError::NotFound(replacement.id));
        };

        if !Arc::ptr_eq(slot.value(), observed) {
            return Ok(false);
        }

        *slot = Arc::new(replacement.clone());
        Ok(true)
    }
}

impl Default for InMemoryLampRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LampRepository for InMemoryLampRepository {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, lamp: LampEntity) -> RepositoryResult<()> {
        self.lamps.insert(lamp.id, Arc::new(lamp));
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<LampEntity> {
        self.lamps
            .get(&id)
            .map(|slot| LampEntity::clone(slot.value()))
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn update(&self, lamp: LampEntity) -> RepositoryResult<()> {
        let mut attempts: u32 = 0;
        loop {
            // Snapshot the current value; the shard guard is released at the
            // end of this statement so the swap below can take it again.
            let observed = self.lamps.get(&lamp.id).map(|slot| Arc::clone(slot.value()));
            let Some(observed) = observed else {
                return Err(RepositoryError::NotFound(lamp.id));
            };

            attempts += 1;
            if self.compare_and_swap(&observed, &lamp)? {
                if attempts > 1 {
                    debug!(lamp_id = %lamp.id, attempts, "Lamp update won after contention");
                }
                return Ok(());
            }
        }
    }

    async fn delete(&self, id: Uuid) -> RepositoryResult<()> {
        self.lamps
            .remove(&id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn list(&self, offset: i64, limit: i64) -> RepositoryResult<Vec<LampEntity>> {
        let Some(window) = Window::new(offset, limit) else {
            return Ok(Vec::new());
        };

        // Each key is visited once; shards are read-locked one at a time.
        let mut snapshot: Vec<Arc<LampEntity>> = self
            .lamps
            .iter()
            .map(|slot| Arc::clone(slot.value()))
            .collect();
        snapshot.sort_by(|a, b| listing_order(a, b));

        Ok(snapshot[window.range(snapshot.len())]
            .iter()
            .map(|lamp| LampEntity::clone(lamp))
            .collect())
    }

    async fn exists(&self, id: Uuid) -> RepositoryResult<bool> {
        Ok(self.lamps.contains_key(&id))
    }
}
