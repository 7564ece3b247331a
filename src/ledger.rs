use generated_abi::{
    Cell,
    EntityId,
};
use std::{
    fmt,
    sync::Arc,
};
use thiserror::Error;

/// Client-generated id of an in-flight action. Unique per session.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TransactionId(u128);

impl TransactionId {
    /// Fresh random id for a new action.
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Pure function from the current cell value to the predicted one.
pub type Mutation = Arc<dyn Fn(Cell) -> Cell + Send + Sync>;

/// Lifecycle of an optimistic entry.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum EntryStatus {
    Pending,
    /// Acknowledged remotely, still overlaying until the authoritative upsert lands.
    Confirmed,
    Reverted,
}

/// A prediction for one entity, held until the world settles it.
#[derive(Clone)]
pub struct OptimisticEntry {
    pub transaction_id: TransactionId,
    pub target: EntityId,
    pub mutation: Mutation,
    pub status: EntryStatus,
    /// Cache version of `target` when the entry was created.
    pub observed_version: u64,
}

impl OptimisticEntry {
    pub fn apply(&self, cell: Cell) -> Cell {
        (self.mutation)(cell)
    }

    /// Whether `cell` already carries this entry's prediction.
    pub fn is_folded_into(&self, cell: Cell) -> bool {
        self.apply(cell) == cell
    }
}

impl fmt::Debug for OptimisticEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OptimisticEntry")
            .field("transaction_id", &self.transaction_id)
            .field("target", &self.target)
            .field("status", &self.status)
            .field("observed_version", &self.observed_version)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("transaction {0} is already tracked")]
    DuplicateTransaction(TransactionId),
    #[error("transaction {0} is not pending")]
    UnknownTransaction(TransactionId),
}

/// What became of an entry on confirmation.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Settlement {
    /// The authoritative value already arrived; the entry is gone.
    Removed,
    /// Kept as `Confirmed` until the next upsert of its target.
    AwaitingUpsert,
}

/// Optimistic entries in insertion order.
#[derive(Debug, Clone, Default)]
pub struct OptimisticLedger {
    entries: Vec<OptimisticEntry>,
}

impl OptimisticLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pending entry. `observed_version` is the target's cache version now.
    pub fn begin(
        &mut self,
        transaction_id: TransactionId,
        target: EntityId,
        mutation: Mutation,
        observed_version: u64,
    ) -> Result<(), LedgerError> {
        if self.position(transaction_id).is_some() {
            return Err(LedgerError::DuplicateTransaction(transaction_id));
        }
        self.entries.push(OptimisticEntry {
            transaction_id,
            target,
            mutation,
            status: EntryStatus::Pending,
            observed_version,
        });
        Ok(())
    }

    /// Marks a pending entry as acknowledged by the world.
    ///
    /// `target_version` and `current` describe the entry's target in the cache right now.
    /// The entry goes away at once only if the target was upserted since `begin` and
    /// already holds the predicted value.
    pub fn confirm(
        &mut self,
        transaction_id: TransactionId,
        target_version: u64,
        current: Option<Cell>,
    ) -> Result<Settlement, LedgerError> {
        let index = self.pending_position(transaction_id)?;
        let entry = &self.entries[index];
        if target_version > entry.observed_version
            && current.is_some_and(|cell| entry.is_folded_into(cell))
        {
            self.entries.remove(index);
            return Ok(Settlement::Removed);
        }
        self.entries[index].status = EntryStatus::Confirmed;
        Ok(Settlement::AwaitingUpsert)
    }

    /// Drops a pending entry after a failed remote call.
    pub fn revert(
        &mut self,
        transaction_id: TransactionId,
    ) -> Result<OptimisticEntry, LedgerError> {
        let index = self.pending_position(transaction_id)?;
        let mut entry = self.entries.remove(index);
        entry.status = EntryStatus::Reverted;
        Ok(entry)
    }

    /// Drops confirmed entries on `target` whose prediction `cell` now carries.
    ///
    /// A redelivered pre-move value leaves them in place.
    pub fn settle_upsert(&mut self, target: EntityId, cell: Cell) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            !(entry.target == target
                && entry.status == EntryStatus::Confirmed
                && entry.is_folded_into(cell))
        });
        before - self.entries.len()
    }

    /// Entries still waiting for a remote answer.
    pub fn list_pending(&self) -> impl Iterator<Item = &OptimisticEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.status == EntryStatus::Pending)
    }

    /// Everything that still shapes the merged view, in insertion order.
    pub fn overlays(&self) -> impl Iterator<Item = &OptimisticEntry> {
        self.entries.iter()
    }

    pub(crate) fn get(&self, transaction_id: TransactionId) -> Option<&OptimisticEntry> {
        self.position(transaction_id).map(|index| &self.entries[index])
    }

    /// Removes every entry and returns their ids.
    pub fn clear(&mut self) -> Vec<TransactionId> {
        self.entries
            .drain(..)
            .map(|entry| entry.transaction_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, transaction_id: TransactionId) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.transaction_id == transaction_id)
    }

    fn pending_position(&self, transaction_id: TransactionId) -> Result<usize, LedgerError> {
        self.position(transaction_id)
            .filter(|index| self.entries[*index].status == EntryStatus::Pending)
            .ok_or(LedgerError::UnknownTransaction(transaction_id))
    }
}
