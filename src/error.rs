use alloy::primitives::{Address, B256};
use bigdecimal::BigDecimal;

use crate::bridge::types::TreasuryStatus;

/// Failure talking to a chain node.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl ChainError {
    /// Whether the next tick may reasonably succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Errors produced by one scan tick.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("checkpoint store: {0}")]
    Checkpoint(#[from] RepositoryError),

    #[error("cold start impossible, no valid scan origin: {0}")]
    ColdStart(ChainError),

    #[error("dispatcher channel closed")]
    DispatcherClosed,
}

impl ScanError {
    /// Fatal errors stop the scan loop and abort the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ScanError::ColdStart(_) | ScanError::DispatcherClosed)
    }
}

/// Rejections and failures of the reconciliation state machine.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("claim references unknown request {0}")]
    UnknownRequest(B256),

    #[error("claim amount mismatch for {id}: deposited {expected}, claimed {actual}")]
    AmountMismatch {
        id: B256,
        expected: BigDecimal,
        actual: BigDecimal,
    },

    #[error("claim recipient mismatch for {id}: deposited to {expected}, claimed by {actual}")]
    RecipientMismatch {
        id: B256,
        expected: Address,
        actual: Address,
    },

    #[error("deposit for {0} is not confirmed yet")]
    DepositNotConfirmed(B256),

    #[error("claim window for {0} has expired")]
    ClaimExpired(B256),

    #[error("double claim on {id}: already claimed in {first}, claimed again in {second}")]
    DoubleClaim { id: B256, first: B256, second: B256 },

    #[error("record {0} changed concurrently")]
    ConcurrentUpdate(B256),

    #[error("treasury transfer {0} not found")]
    TreasuryTransferNotFound(B256),

    #[error("treasury transfer {tx} cannot be promoted from status {status:?}")]
    TreasuryTransferNotPromotable { tx: B256, status: TreasuryStatus },

    #[error("fee {fee} is not payable out of treasury transfer {tx} of {amount}")]
    InvalidFee {
        tx: B256,
        amount: BigDecimal,
        fee: BigDecimal,
    },

    #[error("treasury operations are only available on the cash-in direction")]
    NoTreasury,
}

/// Error returned by a consumer for one event.
#[derive(Debug, thiserror::Error)]
pub enum ConsumeError {
    #[error("malformed payload: {0}")]
    Decode(String),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}
