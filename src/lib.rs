//! Client-side engine for a two-player tic-tac-toe world: mirrors the world's
//! entities, predicts the outcome of in-flight actions and reconciles both into a
//! single view.

use std::path::Path;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

pub use generated_abi;

pub mod config;
pub mod dispatcher;
pub mod entity_cache;
pub mod executor;
pub mod feed;
pub mod in_memory_world;
pub mod ledger;
pub mod query;
pub mod reconciler;
pub mod session;
pub mod store;

pub mod test_helpers;

pub use config::EngineConfig;
pub use dispatcher::{
    ActionDispatcher,
    ActionHooks,
    DispatchHandle,
    IgnoreReason,
    NoHooks,
    Outcome,
    Overlay,
    Submission,
};
pub use executor::{
    RemoteError,
    RemoteExecutor,
    TxReceipt,
};
pub use ledger::{
    LedgerError,
    TransactionId,
};
pub use reconciler::{
    CellView,
    GamePhase,
    MergedView,
};
pub use session::{
    Account,
    SessionContext,
};
pub use store::GameStore;

const LOG_FILE_PREFIX: &str = "tictactoe-client.log";

/// Installs the global subscriber. Filtered by `RUST_LOG`, `info` by default.
///
/// Logs go to a daily rolling file under `log_dir`, or to stdout when `stdout` is
/// set. Keep the returned guard alive for the file writer to flush.
pub fn init_tracing(log_dir: impl AsRef<Path>, stdout: bool) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if stdout {
        let _ = fmt().with_env_filter(filter).try_init();
        return None;
    }
    let appender = rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    Some(guard)
}
