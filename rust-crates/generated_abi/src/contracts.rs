use crate::models::{
    Player,
    Position,
    PositionError,
};
use serde::{
    Deserialize,
    Serialize,
};
use thiserror::Error;

pub const ACTIONS_CONTRACT: &str = "actions";

/// Canonical request accepted by the world's executor.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
pub struct ContractCall {
    pub contract_name: String,
    pub entrypoint: String,
    pub calldata: Vec<u64>,
}

impl ContractCall {
    fn actions(entrypoint: &str, calldata: Vec<u64>) -> Self {
        Self {
            contract_name: ACTIONS_CONTRACT.to_string(),
            entrypoint: entrypoint.to_string(),
            calldata,
        }
    }
}

pub fn build_initialize_calldata() -> ContractCall {
    ContractCall::actions("initialize", Vec::new())
}

pub fn build_play_calldata(player: Player, position: Position) -> ContractCall {
    ContractCall::actions(
        "play",
        vec![
            player.variant_index(),
            u64::from(position.x),
            u64::from(position.y),
        ],
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error(transparent)]
    OutOfBoard(#[from] PositionError),
    #[error("a move needs a player mark, got `None`")]
    EmptyMark,
}

/// Turns a user's move intent (mark, row, column) into the `play` call.
pub fn encode_move(player: Player, x: u8, y: u8) -> Result<ContractCall, MoveError> {
    if player.is_none() {
        return Err(MoveError::EmptyMark);
    }
    let position = Position::new(x, y)?;
    Ok(build_play_calldata(player, position))
}
