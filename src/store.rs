use crate::{
    entity_cache::EntityCache,
    ledger::{
        LedgerError,
        Mutation,
        OptimisticLedger,
        Settlement,
        TransactionId,
    },
    query::SubscriptionQuery,
    reconciler::{
        self,
        MergedView,
    },
};
use generated_abi::{
    EntityId,
    ModelName,
    ModelPayload,
};
use std::sync::{
    Arc,
    PoisonError,
    RwLock,
    RwLockWriteGuard,
};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Default)]
struct StoreState {
    cache: EntityCache,
    ledger: OptimisticLedger,
}

/// Shared home of the entity cache and the optimistic ledger.
///
/// Every mutation recomputes the merged view under the write lock and publishes it,
/// so subscribers observe views in mutation order.
#[derive(Clone)]
pub struct GameStore {
    state: Arc<RwLock<StoreState>>,
    view: Arc<watch::Sender<MergedView>>,
    query: Arc<SubscriptionQuery>,
}

impl GameStore {
    pub fn new(query: SubscriptionQuery) -> Self {
        let (view, _) = watch::channel(MergedView::default());
        Self {
            state: Arc::new(RwLock::new(StoreState::default())),
            view: Arc::new(view),
            query: Arc::new(query),
        }
    }

    /// The fixed set of entities this store mirrors.
    pub fn query(&self) -> &SubscriptionQuery {
        &self.query
    }

    /// Folds an authoritative value into the cache and settles the confirmed
    /// predictions it carries.
    pub fn upsert(&self, entity_id: EntityId, payload: ModelPayload) {
        let mut state = self.write();
        let model = payload.model_name();
        let cell = payload.as_cell().copied();
        let version = state.cache.upsert(entity_id, payload);
        let settled = cell.map_or(0, |cell| state.ledger.settle_upsert(entity_id, cell));
        debug!(?entity_id, %model, version, settled, "entity upserted");
        self.publish(&state);
    }

    /// Records a prediction on `target` and publishes it.
    pub fn begin(
        &self,
        transaction_id: TransactionId,
        target: EntityId,
        mutation: Mutation,
    ) -> Result<(), LedgerError> {
        let mut state = self.write();
        let observed = state.cache.entity_version(target);
        state
            .ledger
            .begin(transaction_id, target, mutation, observed)?;
        self.publish(&state);
        Ok(())
    }

    /// Acknowledges a prediction. It keeps overlaying until the cache holds its value.
    pub fn confirm(&self, transaction_id: TransactionId) -> Result<Settlement, LedgerError> {
        let mut state = self.write();
        let target = state
            .ledger
            .get(transaction_id)
            .map(|entry| entry.target)
            .ok_or(LedgerError::UnknownTransaction(transaction_id))?;
        let version = state.cache.entity_version(target);
        let current = state.cache.cell(target);
        let settlement = state.ledger.confirm(transaction_id, version, current)?;
        self.publish(&state);
        Ok(settlement)
    }

    /// Withdraws a prediction whose remote call failed.
    pub fn revert(&self, transaction_id: TransactionId) -> Result<(), LedgerError> {
        let mut state = self.write();
        state.ledger.revert(transaction_id)?;
        self.publish(&state);
        Ok(())
    }

    /// Drops every optimistic entry, pending or awaiting its upsert.
    pub fn clear_optimistic(&self) -> Vec<TransactionId> {
        let mut state = self.write();
        let cleared = state.ledger.clear();
        self.publish(&state);
        cleared
    }

    /// Ids still waiting for a remote answer, oldest first.
    pub fn pending(&self) -> Vec<TransactionId> {
        self.read(|_, ledger| {
            ledger
                .list_pending()
                .map(|entry| entry.transaction_id)
                .collect()
        })
    }

    pub fn optimistic_len(&self) -> usize {
        self.read(|_, ledger| ledger.len())
    }

    /// Authoritative payload of `model` on `entity_id`, ignoring predictions.
    pub fn get(&self, entity_id: EntityId, model: ModelName) -> Option<ModelPayload> {
        self.read(|cache, _| cache.get(entity_id, model).copied())
    }

    pub fn view(&self) -> MergedView {
        self.view.borrow().clone()
    }

    /// Receiver notified after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<MergedView> {
        self.view.subscribe()
    }

    fn read<R>(&self, f: impl FnOnce(&EntityCache, &OptimisticLedger) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state.cache, &state.ledger)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &StoreState) {
        let view = reconciler::merge(&self.query, &state.cache, state.ledger.overlays());
        self.view.send_replace(view);
    }
}
