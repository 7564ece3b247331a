use crate::session::Account;
use generated_abi::ContractCall;
use std::{
    future::Future,
    time::Duration,
};
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub transaction_hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("network failure: {0}")]
    Network(String),
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("no confirmation within {0:?}")]
    Timeout(Duration),
}

/// Submits signed calls to the world and resolves once they are accepted.
pub trait RemoteExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        account: &Account,
        call: ContractCall,
    ) -> impl Future<Output = Result<TxReceipt, RemoteError>> + Send;
}
