//! Bindings for the `dojo_starter` world: model and event types, entity ids and the
//! calldata builders for the `actions` contract.

use sha2::{
    Digest,
    Sha256,
};
use std::fmt;

pub mod contracts;
pub mod models;

pub use contracts::{
    ACTIONS_CONTRACT,
    ContractCall,
    MoveError,
    build_initialize_calldata,
    build_play_calldata,
    encode_move,
};
pub use models::{
    BOARD_SIZE,
    Cell,
    GameState,
    GameWon,
    ModelName,
    ModelPayload,
    PayloadError,
    Played,
    Player,
    Position,
    PositionError,
};

pub const NAMESPACE: &str = "dojo_starter";

/// Identifier of an addressable unit of world state.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId([u8; 32]);

impl EntityId {
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Hash of the big-endian key sequence. Same keys, same id.
    pub fn from_keys(keys: &[u64]) -> Self {
        let mut hasher = Sha256::new();
        for key in keys {
            hasher.update(key.to_be_bytes());
        }
        Self(hasher.finalize().into())
    }

    /// Id of entities keyed by an account address (player-scoped events).
    pub fn from_address(address: &str) -> Self {
        let normalized = address.trim().trim_start_matches("0x").to_ascii_lowercase();
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(hasher.finalize().into())
    }

    pub fn for_cell(position: Position) -> Self {
        Self::from_keys(&[u64::from(position.x), u64::from(position.y)])
    }

    pub fn for_game(game_id: u32) -> Self {
        Self::from_keys(&[u64::from(game_id)])
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the first 8 bytes are enough to tell entities apart in logs
        write!(f, "EntityId(0x{}..)", hex::encode(&self.0[..8]))
    }
}
