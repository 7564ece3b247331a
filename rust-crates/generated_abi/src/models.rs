use crate::NAMESPACE;
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    fmt,
    str::FromStr,
};
use thiserror::Error;

pub const BOARD_SIZE: u8 = 3;

/// Occupant of a cell. `None` doubles as the empty cell.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash, Default, Serialize, Deserialize)]
pub enum Player {
    #[default]
    None,
    X,
    O,
}

impl Player {
    pub fn variant_index(self) -> u64 {
        match self {
            Player::None => 0,
            Player::X => 1,
            Player::O => 2,
        }
    }

    pub fn is_none(self) -> bool {
        matches!(self, Player::None)
    }

    pub fn opponent(self) -> Player {
        match self {
            Player::X => Player::O,
            Player::O => Player::X,
            Player::None => Player::None,
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Player::None => '.',
            Player::X => 'X',
            Player::O => 'O',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("position ({x}, {y}) is outside the 3x3 board")]
pub struct PositionError {
    pub x: u8,
    pub y: u8,
}

/// Board coordinates, always within `0..BOARD_SIZE`. Serialized as `[x, y]`.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "[u8; 2]", into = "[u8; 2]")]
pub struct Position {
    pub x: u8,
    pub y: u8,
}

impl Position {
    pub fn new(x: u8, y: u8) -> Result<Self, PositionError> {
        if x >= BOARD_SIZE || y >= BOARD_SIZE {
            return Err(PositionError { x, y });
        }
        Ok(Self { x, y })
    }

    /// All board positions, row by row.
    pub fn all() -> impl Iterator<Item = Position> {
        (0..BOARD_SIZE).flat_map(|x| (0..BOARD_SIZE).map(move |y| Position { x, y }))
    }
}

impl TryFrom<[u8; 2]> for Position {
    type Error = PositionError;

    fn try_from(value: [u8; 2]) -> Result<Self, Self::Error> {
        Position::new(value[0], value[1])
    }
}

impl From<Position> for [u8; 2] {
    fn from(position: Position) -> Self {
        [position.x, position.y]
    }
}

#[derive(PartialEq, Eq, Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub position: Position,
    pub player: Player,
}

impl Cell {
    pub fn empty(position: Position) -> Self {
        Self {
            position,
            player: Player::None,
        }
    }
}

#[derive(PartialEq, Eq, Debug, Copy, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub game_id: u32,
    pub is_active: bool,
    pub player_turn: Player,
    pub has_x_won: bool,
    pub has_o_won: bool,
}

impl GameState {
    pub fn winner(&self) -> Option<Player> {
        match (self.has_x_won, self.has_o_won) {
            (true, false) => Some(Player::X),
            (false, true) => Some(Player::O),
            _ => None,
        }
    }

    fn check(&self) -> Result<(), PayloadError> {
        let any_won = self.has_x_won || self.has_o_won;
        if (self.has_x_won && self.has_o_won) || (any_won && self.is_active) {
            return Err(PayloadError::InconsistentGameState(*self));
        }
        Ok(())
    }
}

/// Emitted for every accepted move, keyed by the moving account.
#[derive(PartialEq, Eq, Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Played {
    pub player: Player,
    pub cell: Cell,
}

#[derive(PartialEq, Eq, Debug, Copy, Clone, Serialize, Deserialize)]
pub struct GameWon {
    pub player: Player,
    pub last_cell: Cell,
}

#[derive(PartialEq, Eq, Debug, Copy, Clone, Hash)]
pub enum ModelName {
    Cell,
    GameState,
    Played,
    GameWon,
}

impl ModelName {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelName::Cell => "dojo_starter-Cell",
            ModelName::GameState => "dojo_starter-GameState",
            ModelName::Played => "dojo_starter-Played",
            ModelName::GameWon => "dojo_starter-GameWon",
        }
    }

    pub fn is_event(self) -> bool {
        matches!(self, ModelName::Played | ModelName::GameWon)
    }
}

impl fmt::Display for ModelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelName {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || PayloadError::UnknownModel(s.to_string());
        let (namespace, name) = s.split_once('-').ok_or_else(unknown)?;
        if namespace != NAMESPACE {
            return Err(unknown());
        }
        match name {
            "Cell" => Ok(ModelName::Cell),
            "GameState" => Ok(ModelName::GameState),
            "Played" => Ok(ModelName::Played),
            "GameWon" => Ok(ModelName::GameWon),
            _ => Err(unknown()),
        }
    }
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("unknown model `{0}`")]
    UnknownModel(String),
    #[error("malformed {model} payload: {source}")]
    Malformed {
        model: ModelName,
        #[source]
        source: serde_json::Error,
    },
    #[error("game state reports inconsistent win flags: {0:?}")]
    InconsistentGameState(GameState),
}

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum ModelPayload {
    Cell(Cell),
    GameState(GameState),
    Played(Played),
    GameWon(GameWon),
}

impl ModelPayload {
    pub fn decode(
        model: ModelName,
        value: serde_json::Value,
    ) -> Result<Self, PayloadError> {
        let malformed = |source| PayloadError::Malformed { model, source };
        let payload = match model {
            ModelName::Cell => {
                ModelPayload::Cell(serde_json::from_value(value).map_err(malformed)?)
            }
            ModelName::GameState => {
                let state: GameState =
                    serde_json::from_value(value).map_err(malformed)?;
                state.check()?;
                ModelPayload::GameState(state)
            }
            ModelName::Played => {
                ModelPayload::Played(serde_json::from_value(value).map_err(malformed)?)
            }
            ModelName::GameWon => {
                ModelPayload::GameWon(serde_json::from_value(value).map_err(malformed)?)
            }
        };
        Ok(payload)
    }

    pub fn model_name(&self) -> ModelName {
        match self {
            ModelPayload::Cell(_) => ModelName::Cell,
            ModelPayload::GameState(_) => ModelName::GameState,
            ModelPayload::Played(_) => ModelName::Played,
            ModelPayload::GameWon(_) => ModelName::GameWon,
        }
    }

    pub fn as_cell(&self) -> Option<&Cell> {
        match self {
            ModelPayload::Cell(cell) => Some(cell),
            _ => None,
        }
    }

    pub fn as_game_state(&self) -> Option<&GameState> {
        match self {
            ModelPayload::GameState(state) => Some(state),
            _ => None,
        }
    }
}
