use generated_abi::{
    EntityId,
    Player,
};
use std::sync::{
    Arc,
    Mutex,
    PoisonError,
};

/// Signing identity of the local user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    address: String,
}

impl Account {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Entity under which events emitted for this account are keyed.
    pub fn entity_id(&self) -> EntityId {
        EntityId::from_address(&self.address)
    }
}

/// Mark the user currently plays with. Shared between the UI and action hooks.
#[derive(Clone, Debug, Default)]
pub struct Selection(Arc<Mutex<Option<Player>>>);

impl Selection {
    pub fn select(&self, player: Player) {
        let player = (!player.is_none()).then_some(player);
        *self.lock() = player;
    }

    pub fn current(&self) -> Option<Player> {
        *self.lock()
    }

    pub fn clear(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Player>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything a game action needs from the signed-in user.
#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    pub account: Option<Account>,
    pub selection: Selection,
}

impl SessionContext {
    pub fn new(account: Account) -> Self {
        Self {
            account: Some(account),
            selection: Selection::default(),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn with_player(self, player: Player) -> Self {
        self.selection.select(player);
        self
    }
}
