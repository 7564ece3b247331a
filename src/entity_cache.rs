use generated_abi::{
    Cell,
    EntityId,
    GameState,
    ModelName,
    ModelPayload,
};
use std::collections::HashMap;

/// Last-known authoritative value of one model on one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySnapshot {
    pub entity_id: EntityId,
    pub model: ModelName,
    pub payload: ModelPayload,
    pub last_seen_version: u64,
}

/// Local mirror of the world's entities, fed by the subscription.
///
/// Snapshots are never removed for the lifetime of a session. Every upsert stamps a
/// fresh, strictly increasing version, even when the payload did not change.
#[derive(Debug, Clone, Default)]
pub struct EntityCache {
    snapshots: HashMap<(EntityId, ModelName), EntitySnapshot>,
    entity_versions: HashMap<EntityId, u64>,
    version: u64,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the snapshot for `(entity_id, payload.model_name())` and returns the
    /// version it was stamped with.
    pub fn upsert(&mut self, entity_id: EntityId, payload: ModelPayload) -> u64 {
        self.version += 1;
        let model = payload.model_name();
        self.snapshots.insert(
            (entity_id, model),
            EntitySnapshot {
                entity_id,
                model,
                payload,
                last_seen_version: self.version,
            },
        );
        self.entity_versions.insert(entity_id, self.version);
        self.version
    }

    pub fn get(&self, entity_id: EntityId, model: ModelName) -> Option<&ModelPayload> {
        self.snapshot(entity_id, model).map(|snapshot| &snapshot.payload)
    }

    pub fn snapshot(
        &self,
        entity_id: EntityId,
        model: ModelName,
    ) -> Option<&EntitySnapshot> {
        self.snapshots.get(&(entity_id, model))
    }

    /// Version of the latest upsert touching `entity_id`, `0` if it was never seen.
    pub fn entity_version(&self, entity_id: EntityId) -> u64 {
        self.entity_versions.get(&entity_id).copied().unwrap_or(0)
    }

    pub fn cell(&self, entity_id: EntityId) -> Option<Cell> {
        self.get(entity_id, ModelName::Cell)
            .and_then(ModelPayload::as_cell)
            .copied()
    }

    pub fn game_state(&self, entity_id: EntityId) -> Option<GameState> {
        self.get(entity_id, ModelName::GameState)
            .and_then(ModelPayload::as_game_state)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
