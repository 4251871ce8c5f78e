//! In-process repositories with the same semantics as the PostgreSQL ones.
//! Used by tests and local dry runs.

use alloy::primitives::B256;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::bridge::types::{BridgeTransaction, TransferState, TreasuryStatus, TreasuryTransfer};
use crate::db::checkpoint::CheckpointStore;
use crate::db::repository::{
    BridgeTransactionRepository, TransactionFilter, TreasuryFilter, TreasuryTransferRepository,
};
use crate::error::RepositoryError;

#[derive(Default)]
pub struct MemoryBridgeTransactionRepository {
    rows: Mutex<HashMap<B256, BridgeTransaction>>,
}

impl MemoryBridgeTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Corrupt("memory store lock poisoned".to_string())
}

#[async_trait::async_trait]
impl BridgeTransactionRepository for MemoryBridgeTransactionRepository {
    async fn create(&self, tx: &BridgeTransaction) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        if rows.contains_key(&tx.id) {
            return Ok(false);
        }
        rows.insert(tx.id, tx.clone());
        Ok(true)
    }

    async fn update(
        &self,
        tx: &BridgeTransaction,
        expected: TransferState,
    ) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        match rows.get_mut(&tx.id) {
            Some(row) if row.state() == expected => {
                row.claim_tx_hash = tx.claim_tx_hash;
                row.recipient = tx.recipient;
                row.amount = tx.amount.clone();
                row.fee = tx.fee.clone();
                row.deposit_status = tx.deposit_status;
                row.claim_status = tx.claim_status;
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn select_by_deposit_hash(
        &self,
        hash: B256,
    ) -> Result<Vec<BridgeTransaction>, RepositoryError> {
        let rows = self.rows.lock().map_err(poisoned)?;
        let mut found: Vec<_> = rows
            .values()
            .filter(|t| t.deposit_tx_hash == hash)
            .cloned()
            .collect();
        found.sort_by_key(|t| (t.created_at, t.id));
        Ok(found)
    }

    async fn select_by_id(&self, id: B256) -> Result<Option<BridgeTransaction>, RepositoryError> {
        let rows = self.rows.lock().map_err(poisoned)?;
        Ok(rows.get(&id).cloned())
    }

    async fn select_by_filter(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<BridgeTransaction>, RepositoryError> {
        let rows = self.rows.lock().map_err(poisoned)?;
        let mut found: Vec<_> = rows.values().filter(|t| filter.matches(t)).cloned().collect();
        found.sort_by_key(|t| t.created_at);
        Ok(found)
    }
}

#[derive(Default)]
pub struct MemoryTreasuryTransferRepository {
    rows: Mutex<HashMap<B256, TreasuryTransfer>>,
}

impl MemoryTreasuryTransferRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TreasuryTransferRepository for MemoryTreasuryTransferRepository {
    async fn create(&self, transfer: &TreasuryTransfer) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        if rows.contains_key(&transfer.tx_id) {
            return Ok(false);
        }
        rows.insert(transfer.tx_id, transfer.clone());
        Ok(true)
    }

    async fn select_by_tx_id(
        &self,
        tx_id: B256,
    ) -> Result<Option<TreasuryTransfer>, RepositoryError> {
        let rows = self.rows.lock().map_err(poisoned)?;
        Ok(rows.get(&tx_id).cloned())
    }

    async fn update_status(
        &self,
        tx_id: B256,
        from: TreasuryStatus,
        to: TreasuryStatus,
    ) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        match rows.get_mut(&tx_id) {
            Some(row) if row.status == from => {
                row.status = to;
                row.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn select_by_filter(
        &self,
        filter: &TreasuryFilter,
    ) -> Result<Vec<TreasuryTransfer>, RepositoryError> {
        let rows = self.rows.lock().map_err(poisoned)?;
        let mut found: Vec<_> = rows.values().filter(|t| filter.matches(t)).cloned().collect();
        found.sort_by_key(|t| t.block_number);
        Ok(found)
    }
}

/// Checkpoint store keeping every written height, so tests can assert on the write sequence.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    state: Mutex<CheckpointState>,
}

#[derive(Default)]
struct CheckpointState {
    height: Option<u64>,
    writes: Vec<u64>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(height: u64) -> Self {
        let store = Self::default();
        if let Ok(mut state) = store.state.lock() {
            state.height = Some(height);
        }
        store
    }

    /// Heights written by `create`/`update`, in order.
    pub fn writes(&self) -> Vec<u64> {
        self.state
            .lock()
            .map(|s| s.writes.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self) -> Result<Option<u64>, RepositoryError> {
        Ok(self.state.lock().map_err(poisoned)?.height)
    }

    async fn create(&self, initial: u64) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        if state.height.is_none() {
            state.height = Some(initial);
            state.writes.push(initial);
        }
        Ok(())
    }

    async fn update(&self, height: u64) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        state.height = Some(height);
        state.writes.push(height);
        Ok(())
    }
}
