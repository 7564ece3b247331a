use crate::session::Account;
use generated_abi::{
    EntityId,
    ModelName,
    Position,
};

/// Entities a game session listens to.
///
/// The set is fixed when the session starts: one entity per cell, the game entity
/// (carrying `GameState` and `GameWon`) and, when signed in, the account's entity
/// (carrying `Played`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionQuery {
    game_id: u32,
    cells: Vec<(Position, EntityId)>,
    game_entity: EntityId,
    account_entity: Option<EntityId>,
}

impl SubscriptionQuery {
    pub fn for_game(game_id: u32, account: Option<&Account>) -> Self {
        Self {
            game_id,
            cells: Position::all()
                .map(|position| (position, EntityId::for_cell(position)))
                .collect(),
            game_entity: EntityId::for_game(game_id),
            account_entity: account.map(Account::entity_id),
        }
    }

    pub fn game_id(&self) -> u32 {
        self.game_id
    }

    pub fn cells(&self) -> impl Iterator<Item = (Position, EntityId)> + '_ {
        self.cells.iter().copied()
    }

    pub fn position_of(&self, entity_id: EntityId) -> Option<Position> {
        self.cells
            .iter()
            .find(|(_, id)| *id == entity_id)
            .map(|(position, _)| *position)
    }

    pub fn game_entity(&self) -> EntityId {
        self.game_entity
    }

    pub fn account_entity(&self) -> Option<EntityId> {
        self.account_entity
    }

    /// Whether `model` on `entity_id` belongs to this session.
    pub fn accepts(&self, entity_id: EntityId, model: ModelName) -> bool {
        match model {
            ModelName::Cell => self.position_of(entity_id).is_some(),
            ModelName::GameState | ModelName::GameWon => entity_id == self.game_entity,
            ModelName::Played => Some(entity_id) == self.account_entity,
        }
    }
}
