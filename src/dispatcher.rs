use crate::{
    config::EngineConfig,
    executor::{
        RemoteError,
        RemoteExecutor,
        TxReceipt,
    },
    ledger::{
        LedgerError,
        Mutation,
        TransactionId,
    },
    reconciler::MergedView,
    session::{
        Account,
        SessionContext,
        Selection,
    },
    store::GameStore,
};
use generated_abi::{
    Cell,
    ContractCall,
    EntityId,
    MoveError,
    Position,
    build_initialize_calldata,
    encode_move,
};
use std::sync::Arc;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::timeout,
};
use tracing::{
    debug,
    info,
    warn,
};

/// Callbacks fired around the lifecycle of a dispatched action.
pub trait ActionHooks: Send + Sync + 'static {
    fn on_apply(&self, _transaction_id: TransactionId) {}

    fn on_confirm(&self, _transaction_id: TransactionId, _receipt: &TxReceipt) {}

    fn on_revert(&self, _transaction_id: TransactionId, _error: &RemoteError) {}
}

pub struct NoHooks;

impl ActionHooks for NoHooks {}

/// Resets the session for a fresh game once `initialize` is accepted.
struct ResetOnConfirm {
    store: GameStore,
    selection: Selection,
}

impl ActionHooks for ResetOnConfirm {
    fn on_confirm(&self, transaction_id: TransactionId, _receipt: &TxReceipt) {
        let cleared = self.store.clear_optimistic();
        self.selection.clear();
        info!(%transaction_id, cleared = cleared.len(), "game initialized");
    }
}

/// Optimistic prediction attached to an action.
pub struct Overlay {
    pub target: EntityId,
    pub mutation: Mutation,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Confirmed(TxReceipt),
    Reverted(RemoteError),
}

pub struct DispatchHandle {
    transaction_id: TransactionId,
    task: JoinHandle<Outcome>,
}

impl DispatchHandle {
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub async fn outcome(self) -> Outcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(err) => Outcome::Reverted(RemoteError::Network(format!(
                "dispatch task ended abnormally: {err}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NoActiveSession,
    NoPlayerSelected,
    InvalidMove(MoveError),
    CellOccupied,
    GameWon,
    Ledger(LedgerError),
}

pub enum Submission {
    Dispatched(DispatchHandle),
    Ignored(IgnoreReason),
}

impl Submission {
    pub fn ignored(&self) -> Option<&IgnoreReason> {
        match self {
            Submission::Ignored(reason) => Some(reason),
            Submission::Dispatched(_) => None,
        }
    }

    pub fn into_handle(self) -> Option<DispatchHandle> {
        match self {
            Submission::Dispatched(handle) => Some(handle),
            Submission::Ignored(_) => None,
        }
    }
}

/// Runs actions against the world with optimistic overlays on the local store.
pub struct ActionDispatcher<E> {
    store: GameStore,
    executor: Arc<E>,
    config: EngineConfig,
}

impl<E: RemoteExecutor> ActionDispatcher<E> {
    pub fn new(store: GameStore, executor: Arc<E>, config: EngineConfig) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    pub fn store(&self) -> &GameStore {
        &self.store
    }

    pub fn view(&self) -> MergedView {
        self.store.view()
    }

    pub fn subscribe(&self) -> watch::Receiver<MergedView> {
        self.store.subscribe()
    }

    /// Records the overlay, fires `on_apply` and submits `call` in the background.
    ///
    /// Returns right after the overlay is visible. Remote failures never surface as
    /// errors here: they revert the overlay and resolve the handle as `Reverted`.
    pub fn dispatch<H: ActionHooks>(
        &self,
        account: &Account,
        call: ContractCall,
        overlay: Option<Overlay>,
        hooks: H,
    ) -> Result<DispatchHandle, LedgerError> {
        let transaction_id = TransactionId::random();
        let tracked = overlay.is_some();
        if let Some(Overlay { target, mutation }) = overlay {
            self.store.begin(transaction_id, target, mutation)?;
        }
        hooks.on_apply(transaction_id);
        debug!(%transaction_id, entrypoint = %call.entrypoint, "action dispatched");

        let store = self.store.clone();
        let executor = Arc::clone(&self.executor);
        let account = account.clone();
        let limit = self.config.action_timeout;
        let task = tokio::spawn(async move {
            let result = match timeout(limit, executor.execute(&account, call)).await {
                Ok(result) => result,
                Err(_) => Err(RemoteError::Timeout(limit)),
            };
            match result {
                Ok(receipt) => {
                    if tracked && let Err(err) = store.confirm(transaction_id) {
                        debug!(%transaction_id, ?err, "confirmed entry already gone");
                    }
                    hooks.on_confirm(transaction_id, &receipt);
                    Outcome::Confirmed(receipt)
                }
                Err(error) => {
                    warn!(%transaction_id, %error, "action failed, reverting");
                    if tracked && let Err(err) = store.revert(transaction_id) {
                        debug!(%transaction_id, ?err, "reverted entry already gone");
                    }
                    hooks.on_revert(transaction_id, &error);
                    Outcome::Reverted(error)
                }
            }
        });

        Ok(DispatchHandle {
            transaction_id,
            task,
        })
    }

    /// Marks `(x, y)` with the selected player, predicting the mark locally.
    pub fn play(&self, session: &SessionContext, x: u8, y: u8) -> Submission {
        self.play_with(session, x, y, NoHooks)
    }

    pub fn play_with<H: ActionHooks>(
        &self,
        session: &SessionContext,
        x: u8,
        y: u8,
        hooks: H,
    ) -> Submission {
        let Some(account) = &session.account else {
            return Submission::Ignored(IgnoreReason::NoActiveSession);
        };
        let Some(player) = session.selection.current() else {
            return Submission::Ignored(IgnoreReason::NoPlayerSelected);
        };
        let call = match encode_move(player, x, y) {
            Ok(call) => call,
            Err(err) => return Submission::Ignored(IgnoreReason::InvalidMove(err)),
        };
        let position = match Position::new(x, y) {
            Ok(position) => position,
            Err(err) => return Submission::Ignored(IgnoreReason::InvalidMove(err.into())),
        };

        let view = self.store.view();
        if view.is_won() {
            return Submission::Ignored(IgnoreReason::GameWon);
        }
        if !view.cell(position).player().is_none() {
            return Submission::Ignored(IgnoreReason::CellOccupied);
        }

        let overlay = Overlay {
            target: EntityId::for_cell(position),
            mutation: Arc::new(move |cell: Cell| Cell { player, ..cell }),
        };
        self.submit(account, call, Some(overlay), hooks)
    }

    /// Starts a fresh game. On confirmation every optimistic entry is dropped and
    /// the player selection resets.
    pub fn initialize(&self, session: &SessionContext) -> Submission {
        let Some(account) = &session.account else {
            return Submission::Ignored(IgnoreReason::NoActiveSession);
        };
        let hooks = ResetOnConfirm {
            store: self.store.clone(),
            selection: session.selection.clone(),
        };
        self.submit(account, build_initialize_calldata(), None, hooks)
    }

    fn submit<H: ActionHooks>(
        &self,
        account: &Account,
        call: ContractCall,
        overlay: Option<Overlay>,
        hooks: H,
    ) -> Submission {
        match self.dispatch(account, call, overlay, hooks) {
            Ok(handle) => Submission::Dispatched(handle),
            Err(err) => {
                warn!(?err, "could not record optimistic entry");
                Submission::Ignored(IgnoreReason::Ledger(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        query::SubscriptionQuery,
        reconciler::CellView,
    };
    use generated_abi::{
        ModelPayload,
        Player,
    };
    use std::{
        sync::Mutex,
        time::Duration,
    };
    use tokio::sync::oneshot;

    /// Executor whose single call resolves when the test says so.
    struct GatedExecutor {
        gate: Mutex<Option<oneshot::Receiver<Result<TxReceipt, RemoteError>>>>,
        calls: Mutex<Vec<ContractCall>>,
    }

    impl GatedExecutor {
        fn new() -> (Arc<Self>, oneshot::Sender<Result<TxReceipt, RemoteError>>) {
            let (sender, receiver) = oneshot::channel();
            let executor = Self {
                gate: Mutex::new(Some(receiver)),
                calls: Mutex::new(Vec::new()),
            };
            (Arc::new(executor), sender)
        }
    }

    impl RemoteExecutor for GatedExecutor {
        async fn execute(
            &self,
            _account: &Account,
            call: ContractCall,
        ) -> Result<TxReceipt, RemoteError> {
            self.calls.lock().unwrap().push(call);
            let gate = self.gate.lock().unwrap().take();
            match gate {
                Some(gate) => gate
                    .await
                    .unwrap_or(Err(RemoteError::Network("gate dropped".to_string()))),
                None => Err(RemoteError::Network("single use".to_string())),
            }
        }
    }

    #[derive(Clone, Default)]
    struct RecordingHooks {
        events: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ActionHooks for RecordingHooks {
        fn on_apply(&self, _transaction_id: TransactionId) {
            self.events.lock().unwrap().push("apply");
        }

        fn on_confirm(&self, _transaction_id: TransactionId, _receipt: &TxReceipt) {
            self.events.lock().unwrap().push("confirm");
        }

        fn on_revert(&self, _transaction_id: TransactionId, _error: &RemoteError) {
            self.events.lock().unwrap().push("revert");
        }
    }

    fn receipt() -> TxReceipt {
        TxReceipt {
            transaction_hash: "0xfeed".to_string(),
        }
    }

    fn dispatcher(
        executor: Arc<GatedExecutor>,
        config: EngineConfig,
    ) -> ActionDispatcher<GatedExecutor> {
        let store = GameStore::new(SubscriptionQuery::for_game(0, None));
        ActionDispatcher::new(store, executor, config)
    }

    fn session(player: Player) -> SessionContext {
        SessionContext::new(Account::new("0x1")).with_player(player)
    }

    fn origin() -> Position {
        Position::new(0, 0).unwrap()
    }

    #[tokio::test]
    async fn play__overlay_visible_before_remote_resolves() {
        // given
        let (executor, gate) = GatedExecutor::new();
        let dispatcher = dispatcher(executor.clone(), EngineConfig::default());
        let hooks = RecordingHooks::default();

        // when
        let handle = dispatcher
            .play_with(&session(Player::X), 0, 0, hooks.clone())
            .into_handle()
            .unwrap();

        // then
        assert_eq!(dispatcher.view().cell(origin()).player(), Player::X);
        assert_eq!(*hooks.events.lock().unwrap(), vec!["apply"]);

        // and when
        gate.send(Ok(receipt())).unwrap();
        let outcome = handle.outcome().await;

        // then
        assert_eq!(outcome, Outcome::Confirmed(receipt()));
        assert_eq!(*hooks.events.lock().unwrap(), vec!["apply", "confirm"]);
        assert_eq!(executor.calls.lock().unwrap()[0].calldata, vec![1, 0, 0]);
    }

    #[tokio::test]
    async fn play__rejected_remotely__reverts_overlay() {
        // given
        let (executor, gate) = GatedExecutor::new();
        let dispatcher = dispatcher(executor, EngineConfig::default());
        let hooks = RecordingHooks::default();
        let handle = dispatcher
            .play_with(&session(Player::O), 0, 0, hooks.clone())
            .into_handle()
            .unwrap();

        // when
        gate.send(Err(RemoteError::Rejected("not your turn".to_string())))
            .unwrap();
        let outcome = handle.outcome().await;

        // then
        assert!(matches!(outcome, Outcome::Reverted(RemoteError::Rejected(_))));
        assert_eq!(
            dispatcher.view().cell(origin()),
            CellView::Authoritative(Player::None)
        );
        assert_eq!(*hooks.events.lock().unwrap(), vec!["apply", "revert"]);
        assert_eq!(dispatcher.store().optimistic_len(), 0);
    }

    #[tokio::test]
    async fn play__remote_never_answers__reverts_on_timeout() {
        // given
        let (executor, _gate) = GatedExecutor::new();
        let config = EngineConfig {
            action_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        };
        let dispatcher = dispatcher(executor, config);

        // when
        let handle = dispatcher
            .play(&session(Player::X), 2, 2)
            .into_handle()
            .unwrap();
        let outcome = handle.outcome().await;

        // then
        assert_eq!(
            outcome,
            Outcome::Reverted(RemoteError::Timeout(Duration::from_millis(20)))
        );
        assert_eq!(dispatcher.view().optimistic_count(), 0);
    }

    #[tokio::test]
    async fn play__without_account__is_ignored() {
        // given
        let (executor, _gate) = GatedExecutor::new();
        let dispatcher = dispatcher(executor.clone(), EngineConfig::default());
        let session = SessionContext::anonymous().with_player(Player::X);

        // when
        let submission = dispatcher.play(&session, 0, 0);

        // then
        assert_eq!(submission.ignored(), Some(&IgnoreReason::NoActiveSession));
        assert!(executor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn play__without_selected_player__is_ignored() {
        // given
        let (executor, _gate) = GatedExecutor::new();
        let dispatcher = dispatcher(executor, EngineConfig::default());
        let session = SessionContext::new(Account::new("0x1"));

        // when
        let submission = dispatcher.play(&session, 0, 0);

        // then
        assert_eq!(submission.ignored(), Some(&IgnoreReason::NoPlayerSelected));
        assert_eq!(dispatcher.store().optimistic_len(), 0);
    }

    #[tokio::test]
    async fn play__outside_board__is_ignored() {
        // given
        let (executor, _gate) = GatedExecutor::new();
        let dispatcher = dispatcher(executor, EngineConfig::default());

        // when
        let submission = dispatcher.play(&session(Player::X), 3, 1);

        // then
        assert!(matches!(
            submission.ignored(),
            Some(IgnoreReason::InvalidMove(MoveError::OutOfBoard(_)))
        ));
    }

    #[tokio::test]
    async fn play__occupied_cell__is_ignored() {
        // given
        let (executor, _gate) = GatedExecutor::new();
        let dispatcher = dispatcher(executor, EngineConfig::default());
        dispatcher.store().upsert(
            EntityId::for_cell(origin()),
            ModelPayload::Cell(Cell {
                position: origin(),
                player: Player::O,
            }),
        );

        // when
        let submission = dispatcher.play(&session(Player::X), 0, 0);

        // then
        assert_eq!(submission.ignored(), Some(&IgnoreReason::CellOccupied));
    }

    #[tokio::test]
    async fn play__cell_with_pending_prediction__is_ignored() {
        // given
        let (executor, _gate) = GatedExecutor::new();
        let dispatcher = dispatcher(executor, EngineConfig::default());
        let first = dispatcher.play(&session(Player::X), 1, 1);

        // when
        let second = dispatcher.play(&session(Player::O), 1, 1);

        // then
        assert!(first.ignored().is_none());
        assert_eq!(second.ignored(), Some(&IgnoreReason::CellOccupied));
        assert_eq!(dispatcher.store().pending().len(), 1);
    }

    #[tokio::test]
    async fn initialize__confirmed__clears_predictions_and_selection() {
        // given
        let (executor, gate) = GatedExecutor::new();
        let dispatcher = dispatcher(executor, EngineConfig::default());
        let session = session(Player::X);
        dispatcher
            .store()
            .begin(
                TransactionId::from_raw(1),
                EntityId::for_cell(origin()),
                Arc::new(|cell: Cell| Cell {
                    player: Player::O,
                    ..cell
                }),
            )
            .unwrap();

        // when
        let handle = dispatcher.initialize(&session).into_handle().unwrap();
        gate.send(Ok(receipt())).unwrap();
        let outcome = handle.outcome().await;

        // then
        assert_eq!(outcome, Outcome::Confirmed(receipt()));
        assert_eq!(dispatcher.store().optimistic_len(), 0);
        assert_eq!(session.selection.current(), None);
    }

    #[tokio::test]
    async fn initialize__without_account__is_ignored() {
        // given
        let (executor, _gate) = GatedExecutor::new();
        let dispatcher = dispatcher(executor, EngineConfig::default());

        // when
        let submission = dispatcher.initialize(&SessionContext::anonymous());

        // then
        assert_eq!(submission.ignored(), Some(&IgnoreReason::NoActiveSession));
    }
}
