use crate::{
    executor::{
        RemoteError,
        RemoteExecutor,
        TxReceipt,
    },
    feed::{
        ChannelFeed,
        FeedMessage,
    },
    session::Account,
};
use generated_abi::{
    ACTIONS_CONTRACT,
    BOARD_SIZE,
    Cell,
    ContractCall,
    EntityId,
    GameState,
    GameWon,
    ModelName,
    Played,
    Player,
    Position,
};
use serde_json::json;
use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{
            AtomicBool,
            AtomicU64,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::sync::{
    mpsc,
    watch,
};
use tracing::{
    debug,
    warn,
};

const SIDE: usize = BOARD_SIZE as usize;

const LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

#[derive(Debug, Default)]
struct WorldState {
    board: [[Player; SIDE]; SIDE],
    game: Option<GameState>,
}

impl WorldState {
    fn apply(
        &mut self,
        game_id: u32,
        account: &Account,
        call: &ContractCall,
    ) -> Result<Vec<FeedMessage>, RemoteError> {
        if call.contract_name != ACTIONS_CONTRACT {
            return Err(rejected(format!("unknown contract `{}`", call.contract_name)));
        }
        match call.entrypoint.as_str() {
            "initialize" => Ok(self.initialize(game_id)),
            "play" => self.play(game_id, account, &call.calldata),
            other => Err(rejected(format!("unknown entrypoint `{other}`"))),
        }
    }

    fn initialize(&mut self, game_id: u32) -> Vec<FeedMessage> {
        self.board = Default::default();
        let state = GameState {
            game_id,
            is_active: true,
            player_turn: Player::X,
            has_x_won: false,
            has_o_won: false,
        };
        self.game = Some(state);
        Position::all()
            .map(|position| cell_update(Cell::empty(position)))
            .chain([game_update(state)])
            .collect()
    }

    fn play(
        &mut self,
        game_id: u32,
        account: &Account,
        calldata: &[u64],
    ) -> Result<Vec<FeedMessage>, RemoteError> {
        let [player, x, y] = calldata else {
            return Err(rejected("play expects [player, x, y]"));
        };
        let player = match player {
            1 => Player::X,
            2 => Player::O,
            _ => return Err(rejected("invalid player")),
        };
        let position = u8::try_from(*x)
            .ok()
            .zip(u8::try_from(*y).ok())
            .and_then(|(x, y)| Position::new(x, y).ok())
            .ok_or_else(|| rejected("position outside the board"))?;
        let Some(mut state) = self.game.filter(|state| state.is_active) else {
            return Err(rejected("game not active"));
        };
        if state.player_turn != player {
            return Err(rejected("not your turn"));
        }
        let (row, col) = (usize::from(position.x), usize::from(position.y));
        if !self.board[row][col].is_none() {
            return Err(rejected("cell already taken"));
        }

        self.board[row][col] = player;
        let cell = Cell { position, player };
        let mut messages = vec![cell_update(cell)];
        if self.has_line(player) {
            state.is_active = false;
            state.has_x_won = player == Player::X;
            state.has_o_won = player == Player::O;
            messages.push(event(
                EntityId::for_game(game_id),
                ModelName::GameWon,
                json!(GameWon {
                    player,
                    last_cell: cell,
                }),
            ));
        } else if self.is_full() {
            state.is_active = false;
        } else {
            state.player_turn = player.opponent();
        }
        self.game = Some(state);
        messages.push(game_update(state));
        messages.push(event(
            account.entity_id(),
            ModelName::Played,
            json!(Played { player, cell }),
        ));
        Ok(messages)
    }

    fn has_line(&self, player: Player) -> bool {
        LINES
            .iter()
            .any(|line| line.iter().all(|&(x, y)| self.board[x][y] == player))
    }

    fn is_full(&self) -> bool {
        self.board.iter().flatten().all(|player| !player.is_none())
    }
}

fn rejected(reason: impl Into<String>) -> RemoteError {
    RemoteError::Rejected(reason.into())
}

fn cell_update(cell: Cell) -> FeedMessage {
    FeedMessage::EntityUpdated {
        entity_id: EntityId::for_cell(cell.position),
        model: ModelName::Cell.to_string(),
        payload: json!(cell),
    }
}

fn game_update(state: GameState) -> FeedMessage {
    FeedMessage::EntityUpdated {
        entity_id: EntityId::for_game(state.game_id),
        model: ModelName::GameState.to_string(),
        payload: json!(state),
    }
}

fn event(entity_id: EntityId, model: ModelName, payload: serde_json::Value) -> FeedMessage {
    FeedMessage::Event {
        entity_id,
        name: model.to_string(),
        payload,
    }
}

/// Self-contained tic-tac-toe world.
///
/// Executes calls with the same rules as the deployed contract and pushes the
/// resulting updates through a channel feed, like the subscription service would.
pub struct InMemoryWorld {
    game_id: u32,
    latency: Duration,
    state: Mutex<WorldState>,
    feed: mpsc::Sender<FeedMessage>,
    failures: Mutex<VecDeque<RemoteError>>,
    hold_feed: AtomicBool,
    held: Mutex<Vec<FeedMessage>>,
    stalled: watch::Sender<Option<String>>,
    submitted: AtomicU64,
}

impl InMemoryWorld {
    pub fn new(game_id: u32, latency: Duration, feed_buffer: usize) -> (Self, ChannelFeed) {
        let (feed, sender) = ChannelFeed::new_with_sender(feed_buffer);
        let world = Self {
            game_id,
            latency,
            state: Mutex::default(),
            feed: sender,
            failures: Mutex::default(),
            hold_feed: AtomicBool::new(false),
            held: Mutex::default(),
            stalled: watch::Sender::new(None),
            submitted: AtomicU64::new(0),
        };
        (world, feed)
    }

    /// The next call fails with `error` before reaching the rules.
    pub fn fail_next(&self, error: RemoteError) {
        lock(&self.failures).push_back(error);
    }

    /// While held, updates queue up instead of reaching the feed.
    pub fn hold_feed(&self, hold: bool) {
        self.hold_feed.store(hold, Ordering::SeqCst);
    }

    pub async fn release_feed(&self) {
        self.hold_feed(false);
        let held = std::mem::take(&mut *lock(&self.held));
        self.deliver(held).await;
    }

    /// Calls to `entrypoint` wait, after their latency, until `resume` is called.
    pub fn stall(&self, entrypoint: &str) {
        self.stalled.send_replace(Some(entrypoint.to_string()));
    }

    pub fn resume(&self) {
        self.stalled.send_replace(None);
    }

    pub fn player_at(&self, position: Position) -> Player {
        lock(&self.state).board[usize::from(position.x)][usize::from(position.y)]
    }

    pub fn game(&self) -> Option<GameState> {
        lock(&self.state).game
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst)
    }

    async fn deliver(&self, messages: Vec<FeedMessage>) {
        for message in messages {
            if self.feed.send(message).await.is_err() {
                warn!("subscription feed dropped, update lost");
                return;
            }
        }
    }
}

impl RemoteExecutor for InMemoryWorld {
    async fn execute(
        &self,
        account: &Account,
        call: ContractCall,
    ) -> Result<TxReceipt, RemoteError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let mut stalled = self.stalled.subscribe();
        stalled
            .wait_for(|stalled| stalled.as_deref() != Some(call.entrypoint.as_str()))
            .await
            .map(|_| ())
            .map_err(|_| RemoteError::Network("world shut down".to_string()))?;
        let failure = lock(&self.failures).pop_front();
        if let Some(error) = failure {
            return Err(error);
        }

        let messages = lock(&self.state).apply(self.game_id, account, &call)?;
        let number = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(entrypoint = %call.entrypoint, updates = messages.len(), "call accepted");
        if self.hold_feed.load(Ordering::SeqCst) {
            lock(&self.held).extend(messages);
        } else {
            self.deliver(messages).await;
        }
        Ok(TxReceipt {
            transaction_hash: format!("0x{number:064x}"),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
