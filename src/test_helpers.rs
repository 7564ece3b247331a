use crate::{
    config::EngineConfig,
    dispatcher::{
        ActionDispatcher,
        Outcome,
    },
    feed::{
        FeedError,
        run_feed,
    },
    in_memory_world::InMemoryWorld,
    query::SubscriptionQuery,
    reconciler::{
        GamePhase,
        MergedView,
    },
    session::{
        Account,
        SessionContext,
    },
    store::GameStore,
};
use generated_abi::Player;
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::timeout,
};

pub const GAME_ID: u32 = 0;
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Full client session wired to an in-memory world.
pub struct TestContext {
    world: Arc<InMemoryWorld>,
    dispatcher: ActionDispatcher<InMemoryWorld>,
    session: SessionContext,
    feed_task: JoinHandle<Result<(), FeedError>>,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_latency(Duration::ZERO).await
    }

    pub async fn with_latency(latency: Duration) -> Self {
        Self::with_config(EngineConfig::default(), latency).await
    }

    pub async fn with_config(config: EngineConfig, latency: Duration) -> Self {
        let account = Account::new("0xa11ce");
        let (world, feed) = InMemoryWorld::new(GAME_ID, latency, config.feed_buffer);
        let world = Arc::new(world);
        let store = GameStore::new(SubscriptionQuery::for_game(GAME_ID, Some(&account)));
        let feed_task = tokio::spawn(run_feed(feed, store.clone()));
        let dispatcher = ActionDispatcher::new(store, Arc::clone(&world), config);
        Self {
            world,
            dispatcher,
            session: SessionContext::new(account),
            feed_task,
        }
    }

    /// Context whose game is initialized and visible locally.
    pub async fn started() -> Self {
        let ctx = Self::new().await;
        ctx.start_game().await;
        ctx
    }

    pub fn world(&self) -> &InMemoryWorld {
        &self.world
    }

    pub fn dispatcher(&self) -> &ActionDispatcher<InMemoryWorld> {
        &self.dispatcher
    }

    pub fn store(&self) -> &GameStore {
        self.dispatcher.store()
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn view(&self) -> MergedView {
        self.dispatcher.view()
    }

    pub async fn start_game(&self) -> MergedView {
        let handle = self
            .dispatcher
            .initialize(&self.session)
            .into_handle()
            .expect("initialize should be dispatched");
        let outcome = handle.outcome().await;
        assert!(matches!(outcome, Outcome::Confirmed(_)), "{outcome:?}");
        self.wait_for_view(|view| {
            view.phase == GamePhase::Active { turn: Player::X }
                && view.cells().all(|(_, cell)| cell.player().is_none())
        })
        .await
    }

    /// Selects `player`, plays `(x, y)` and waits for the remote outcome.
    pub async fn play_as(&self, player: Player, x: u8, y: u8) -> Outcome {
        self.session.selection.select(player);
        let submission = self.dispatcher.play(&self.session, x, y);
        if let Some(reason) = submission.ignored() {
            panic!("play ({x}, {y}) as {player:?} was ignored: {reason:?}");
        }
        let handle = submission
            .into_handle()
            .expect("dispatched play has a handle");
        handle.outcome().await
    }

    /// Waits until the published view satisfies `predicate`.
    pub async fn wait_for_view(
        &self,
        predicate: impl FnMut(&MergedView) -> bool,
    ) -> MergedView {
        let mut views = self.dispatcher.subscribe();
        let matched = match timeout(WAIT_LIMIT, views.wait_for(predicate)).await {
            Ok(Ok(view)) => Some(view.clone()),
            _ => None,
        };
        match matched {
            Some(view) => view,
            None => panic!("view never matched, last view:\n{}", self.view()),
        }
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        self.feed_task.abort();
    }
}
