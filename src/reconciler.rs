use crate::{
    entity_cache::EntityCache,
    ledger::{
        OptimisticEntry,
        TransactionId,
    },
    query::SubscriptionQuery,
};
use generated_abi::{
    BOARD_SIZE,
    Cell,
    EntityId,
    GameState,
    GameWon,
    ModelName,
    ModelPayload,
    Played,
    Player,
    Position,
};
use itertools::Itertools;
use std::fmt;

const SIDE: usize = BOARD_SIZE as usize;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CellView {
    Authoritative(Player),
    Optimistic {
        player: Player,
        transaction_id: TransactionId,
    },
}

impl CellView {
    pub fn player(&self) -> Player {
        match self {
            CellView::Authoritative(player) => *player,
            CellView::Optimistic { player, .. } => *player,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        matches!(self, CellView::Optimistic { .. })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum GamePhase {
    Uninitialized,
    Active { turn: Player },
    Won(Player),
    Drawn,
}

/// What the UI renders: authoritative state with optimistic predictions on top.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MergedView {
    cells: [[CellView; SIDE]; SIDE],
    pub game: Option<GameState>,
    pub phase: GamePhase,
    pub has_x_won: bool,
    pub has_o_won: bool,
    pub last_played: Option<Played>,
}

impl Default for MergedView {
    fn default() -> Self {
        Self {
            cells: [[CellView::Authoritative(Player::None); SIDE]; SIDE],
            game: None,
            phase: GamePhase::Uninitialized,
            has_x_won: false,
            has_o_won: false,
            last_played: None,
        }
    }
}

impl MergedView {
    pub fn cell(&self, position: Position) -> CellView {
        self.cells[usize::from(position.x)][usize::from(position.y)]
    }

    pub fn cells(&self) -> impl Iterator<Item = (Position, CellView)> + '_ {
        Position::all().map(|position| (position, self.cell(position)))
    }

    pub fn winner(&self) -> Option<Player> {
        match self.phase {
            GamePhase::Won(player) => Some(player),
            _ => None,
        }
    }

    pub fn is_won(&self) -> bool {
        self.winner().is_some()
    }

    pub fn optimistic_count(&self) -> usize {
        self.cells().filter(|(_, view)| view.is_optimistic()).count()
    }

    fn set(&mut self, position: Position, view: CellView) {
        self.cells[usize::from(position.x)][usize::from(position.y)] = view;
    }
}

/// Lowercase marks are predictions that the world has not confirmed yet.
impl fmt::Display for MergedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.cells.iter().map(|row| {
            row.iter()
                .map(|view| match view {
                    CellView::Authoritative(player) => player.symbol(),
                    CellView::Optimistic { player, .. } => {
                        player.symbol().to_ascii_lowercase()
                    }
                })
                .join(" ")
        });
        writeln!(f, "{}", rows.format("\n"))?;
        match self.phase {
            GamePhase::Uninitialized => write!(f, "not started"),
            GamePhase::Active { turn } => write!(f, "{} to move", turn.symbol()),
            GamePhase::Won(player) => write!(f, "{} won", player.symbol()),
            GamePhase::Drawn => write!(f, "draw"),
        }
    }
}

/// Folds the authoritative snapshots and the optimistic overlays into one view.
///
/// Overlays are applied in insertion order, so the latest entry on a cell wins.
/// Win flags come only from the authoritative `GameState`, or from a `GameWon`
/// event once the game is inactive without a recorded winner. Optimistic entries
/// never produce them.
pub fn merge<'a>(
    query: &SubscriptionQuery,
    cache: &EntityCache,
    overlays: impl IntoIterator<Item = &'a OptimisticEntry>,
) -> MergedView {
    let mut view = MergedView::default();

    for (position, entity_id) in query.cells() {
        let cell = cache.cell(entity_id).unwrap_or(Cell::empty(position));
        view.set(position, CellView::Authoritative(cell.player));
    }

    let authoritative_full = view.cells().all(|(_, cell)| !cell.player().is_none());

    for entry in overlays {
        let Some(position) = query.position_of(entry.target) else {
            continue;
        };
        let current = Cell {
            position,
            player: view.cell(position).player(),
        };
        let predicted = entry.apply(current);
        view.set(
            position,
            CellView::Optimistic {
                player: predicted.player,
                transaction_id: entry.transaction_id,
            },
        );
    }

    let game_entity = query.game_entity();
    let game = cache.game_state(game_entity);
    let won_event = cache
        .snapshot(game_entity, ModelName::GameWon)
        .and_then(|event| match event.payload {
            ModelPayload::GameWon(GameWon { player, last_cell }) if !player.is_none() => {
                // an event from a previous game is stale once its cell holds another mark
                let rewritten = cache
                    .cell(EntityId::for_cell(last_cell.position))
                    .is_some_and(|cell| cell.player != last_cell.player);
                (!rewritten).then_some(player)
            }
            _ => None,
        });
    let winner = match game {
        Some(state) if state.is_active => None,
        Some(state) => state.winner().or(won_event),
        None => won_event,
    };

    view.game = game;
    view.has_x_won = winner == Some(Player::X);
    view.has_o_won = winner == Some(Player::O);
    view.phase = match (winner, game) {
        (Some(player), _) => GamePhase::Won(player),
        (None, Some(state)) if state.is_active => GamePhase::Active {
            turn: state.player_turn,
        },
        (None, Some(_)) if authoritative_full => GamePhase::Drawn,
        _ => GamePhase::Uninitialized,
    };
    view.last_played = query
        .account_entity()
        .and_then(|id| cache.get(id, ModelName::Played))
        .and_then(|payload| match payload {
            ModelPayload::Played(played) => Some(*played),
            _ => None,
        });

    view
}
