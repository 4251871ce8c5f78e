use alloy::primitives::{Address, B256};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::bridge::types::{
    BridgeDirection, BridgeTransaction, ClaimStatus, TransferState, TreasuryStatus,
    TreasuryTransfer,
};
use crate::error::RepositoryError;

/// Optional predicates for listing bridge transactions.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub sender: Option<Address>,
    pub recipient: Option<Address>,
    pub claim_status: Option<ClaimStatus>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &BridgeTransaction) -> bool {
        self.sender.is_none_or(|s| s == tx.sender)
            && self.recipient.is_none_or(|r| r == tx.recipient)
            && self.claim_status.is_none_or(|c| c == tx.claim_status)
    }
}

/// Optional predicates for listing treasury transfers.
#[derive(Debug, Clone, Default)]
pub struct TreasuryFilter {
    pub from_address: Option<Address>,
    pub status: Option<TreasuryStatus>,
}

impl TreasuryFilter {
    pub fn matches(&self, transfer: &TreasuryTransfer) -> bool {
        self.from_address.is_none_or(|f| f == transfer.from_address)
            && self.status.is_none_or(|s| s == transfer.status)
    }
}

/// Storage for one direction's bridge transactions.
#[async_trait::async_trait]
pub trait BridgeTransactionRepository: Send + Sync {
    /// Insert a new record. Returns `false` when a record with the same id already exists.
    async fn create(&self, tx: &BridgeTransaction) -> Result<bool, RepositoryError>;

    /// Overwrite the mutable fields of a record, only if its statuses still equal `expected`.
    /// Returns whether the update was applied.
    async fn update(
        &self,
        tx: &BridgeTransaction,
        expected: TransferState,
    ) -> Result<bool, RepositoryError>;

    /// Every record sharing a deposit tx hash, oldest first. One tx may carry several deposits.
    async fn select_by_deposit_hash(
        &self,
        hash: B256,
    ) -> Result<Vec<BridgeTransaction>, RepositoryError>;

    async fn select_by_id(&self, id: B256) -> Result<Option<BridgeTransaction>, RepositoryError>;

    async fn select_by_filter(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<BridgeTransaction>, RepositoryError>;
}

/// Storage for transfers observed into the treasury wallet.
#[async_trait::async_trait]
pub trait TreasuryTransferRepository: Send + Sync {
    /// Insert a transfer. Returns `false` when the tx id is already recorded.
    async fn create(&self, transfer: &TreasuryTransfer) -> Result<bool, RepositoryError>;

    async fn select_by_tx_id(&self, tx_id: B256)
        -> Result<Option<TreasuryTransfer>, RepositoryError>;

    /// Move a transfer from `from` to `to`. Returns `false` if it was not in `from`.
    async fn update_status(
        &self,
        tx_id: B256,
        from: TreasuryStatus,
        to: TreasuryStatus,
    ) -> Result<bool, RepositoryError>;

    async fn select_by_filter(
        &self,
        filter: &TreasuryFilter,
    ) -> Result<Vec<TreasuryTransfer>, RepositoryError>;
}

// ============================================================
// PostgreSQL
// ============================================================

const TRANSACTION_COLUMNS: &str = "id, deposit_tx_hash, claim_tx_hash, src_token, dst_token, \
     sender, recipient, network_id, amount, fee, deposit_status, claim_status, created_at, \
     updated_at";

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: Vec<u8>,
    deposit_tx_hash: Vec<u8>,
    claim_tx_hash: Option<Vec<u8>>,
    src_token: Vec<u8>,
    dst_token: Vec<u8>,
    sender: Vec<u8>,
    recipient: Vec<u8>,
    network_id: i64,
    amount: BigDecimal,
    fee: BigDecimal,
    deposit_status: String,
    claim_status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(
        self,
        direction: BridgeDirection,
    ) -> Result<BridgeTransaction, RepositoryError> {
        Ok(BridgeTransaction {
            id: hash_column("id", &self.id)?,
            direction,
            deposit_tx_hash: hash_column("deposit_tx_hash", &self.deposit_tx_hash)?,
            claim_tx_hash: self
                .claim_tx_hash
                .as_deref()
                .map(|h| hash_column("claim_tx_hash", h))
                .transpose()?,
            src_token: address_column("src_token", &self.src_token)?,
            dst_token: address_column("dst_token", &self.dst_token)?,
            sender: address_column("sender", &self.sender)?,
            recipient: address_column("recipient", &self.recipient)?,
            network_id: self.network_id as u64,
            amount: self.amount,
            fee: self.fee,
            deposit_status: self
                .deposit_status
                .parse()
                .map_err(RepositoryError::Corrupt)?,
            claim_status: self.claim_status.parse().map_err(RepositoryError::Corrupt)?,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn hash_column(column: &str, bytes: &[u8]) -> Result<B256, RepositoryError> {
    if bytes.len() != 32 {
        return Err(RepositoryError::Corrupt(format!(
            "{} has {} bytes, expected 32",
            column,
            bytes.len()
        )));
    }
    Ok(B256::from_slice(bytes))
}

fn address_column(column: &str, bytes: &[u8]) -> Result<Address, RepositoryError> {
    if bytes.len() != 20 {
        return Err(RepositoryError::Corrupt(format!(
            "{} has {} bytes, expected 20",
            column,
            bytes.len()
        )));
    }
    Ok(Address::from_slice(bytes))
}

/// Bridge transactions of one direction, stored in that direction's table.
#[derive(Clone)]
pub struct PgBridgeTransactionRepository {
    pool: PgPool,
    direction: BridgeDirection,
}

impl PgBridgeTransactionRepository {
    pub fn new(pool: PgPool, direction: BridgeDirection) -> Self {
        Self { pool, direction }
    }

    async fn select_one(
        &self,
        column: &str,
        value: &[u8],
    ) -> Result<Option<BridgeTransaction>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            TRANSACTION_COLUMNS,
            self.direction.table(),
            column
        );
        let row: Option<TransactionRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| r.into_transaction(self.direction)).transpose()
    }
}

#[async_trait::async_trait]
impl BridgeTransactionRepository for PgBridgeTransactionRepository {
    async fn create(&self, tx: &BridgeTransaction) -> Result<bool, RepositoryError> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             ON CONFLICT (id) DO NOTHING",
            self.direction.table(),
            TRANSACTION_COLUMNS
        );
        let result = sqlx::query(&sql)
            .bind(tx.id.as_slice())
            .bind(tx.deposit_tx_hash.as_slice())
            .bind(tx.claim_tx_hash.as_ref().map(|h| h.as_slice()))
            .bind(tx.src_token.as_slice())
            .bind(tx.dst_token.as_slice())
            .bind(tx.sender.as_slice())
            .bind(tx.recipient.as_slice())
            .bind(tx.network_id as i64)
            .bind(&tx.amount)
            .bind(&tx.fee)
            .bind(tx.deposit_status.as_str())
            .bind(tx.claim_status.as_str())
            .bind(tx.created_at)
            .bind(tx.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update(
        &self,
        tx: &BridgeTransaction,
        expected: TransferState,
    ) -> Result<bool, RepositoryError> {
        let sql = format!(
            "UPDATE {}
             SET claim_tx_hash = $2, recipient = $3, amount = $4, fee = $5,
                 deposit_status = $6, claim_status = $7, updated_at = NOW()
             WHERE id = $1 AND deposit_status = $8 AND claim_status = $9",
            self.direction.table()
        );
        let result = sqlx::query(&sql)
            .bind(tx.id.as_slice())
            .bind(tx.claim_tx_hash.as_ref().map(|h| h.as_slice()))
            .bind(tx.recipient.as_slice())
            .bind(&tx.amount)
            .bind(&tx.fee)
            .bind(tx.deposit_status.as_str())
            .bind(tx.claim_status.as_str())
            .bind(expected.deposit.as_str())
            .bind(expected.claim.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn select_by_deposit_hash(
        &self,
        hash: B256,
    ) -> Result<Vec<BridgeTransaction>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE deposit_tx_hash = $1 ORDER BY created_at, id",
            TRANSACTION_COLUMNS,
            self.direction.table()
        );
        let rows: Vec<TransactionRow> = sqlx::query_as(&sql)
            .bind(hash.as_slice())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|r| r.into_transaction(self.direction))
            .collect()
    }

    async fn select_by_id(&self, id: B256) -> Result<Option<BridgeTransaction>, RepositoryError> {
        self.select_one("id", id.as_slice()).await
    }

    async fn select_by_filter(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<BridgeTransaction>, RepositoryError> {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            format!(
                "SELECT {} FROM {} WHERE TRUE",
                TRANSACTION_COLUMNS,
                self.direction.table()
            ),
        );
        if let Some(sender) = &filter.sender {
            query_builder.push(" AND sender = ").push_bind(sender.as_slice().to_vec());
        }
        if let Some(recipient) = &filter.recipient {
            query_builder
                .push(" AND recipient = ")
                .push_bind(recipient.as_slice().to_vec());
        }
        if let Some(status) = filter.claim_status {
            query_builder.push(" AND claim_status = ").push_bind(status.as_str());
        }
        query_builder.push(" ORDER BY created_at");

        let rows: Vec<TransactionRow> = query_builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|r| r.into_transaction(self.direction))
            .collect()
    }
}

const TREASURY_COLUMNS: &str = "tx_id, from_address, treasury_address, token_address, amount, \
     fee, status, block_number, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TreasuryRow {
    tx_id: Vec<u8>,
    from_address: Vec<u8>,
    treasury_address: Vec<u8>,
    token_address: Vec<u8>,
    amount: BigDecimal,
    fee: BigDecimal,
    status: String,
    block_number: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TreasuryRow> for TreasuryTransfer {
    type Error = RepositoryError;

    fn try_from(row: TreasuryRow) -> Result<Self, Self::Error> {
        Ok(TreasuryTransfer {
            tx_id: hash_column("tx_id", &row.tx_id)?,
            from_address: address_column("from_address", &row.from_address)?,
            treasury_address: address_column("treasury_address", &row.treasury_address)?,
            token_address: address_column("token_address", &row.token_address)?,
            amount: row.amount,
            fee: row.fee,
            status: row.status.parse().map_err(RepositoryError::Corrupt)?,
            block_number: row.block_number as u64,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgTreasuryTransferRepository {
    pool: PgPool,
}

impl PgTreasuryTransferRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl TreasuryTransferRepository for PgTreasuryTransferRepository {
    async fn create(&self, transfer: &TreasuryTransfer) -> Result<bool, RepositoryError> {
        let sql = format!(
            "INSERT INTO treasury_transfers ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (tx_id) DO NOTHING",
            TREASURY_COLUMNS
        );
        let result = sqlx::query(&sql)
            .bind(transfer.tx_id.as_slice())
            .bind(transfer.from_address.as_slice())
            .bind(transfer.treasury_address.as_slice())
            .bind(transfer.token_address.as_slice())
            .bind(&transfer.amount)
            .bind(&transfer.fee)
            .bind(transfer.status.as_str())
            .bind(transfer.block_number as i64)
            .bind(transfer.created_at)
            .bind(transfer.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn select_by_tx_id(
        &self,
        tx_id: B256,
    ) -> Result<Option<TreasuryTransfer>, RepositoryError> {
        let sql = format!(
            "SELECT {} FROM treasury_transfers WHERE tx_id = $1",
            TREASURY_COLUMNS
        );
        let row: Option<TreasuryRow> = sqlx::query_as(&sql)
            .bind(tx_id.as_slice())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TreasuryTransfer::try_from).transpose()
    }

    async fn update_status(
        &self,
        tx_id: B256,
        from: TreasuryStatus,
        to: TreasuryStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE treasury_transfers SET status = $3, updated_at = NOW()
             WHERE tx_id = $1 AND status = $2",
        )
        .bind(tx_id.as_slice())
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn select_by_filter(
        &self,
        filter: &TreasuryFilter,
    ) -> Result<Vec<TreasuryTransfer>, RepositoryError> {
        let mut query_builder: sqlx::QueryBuilder<sqlx::Postgres> = sqlx::QueryBuilder::new(
            format!("SELECT {} FROM treasury_transfers WHERE TRUE", TREASURY_COLUMNS),
        );
        if let Some(from) = &filter.from_address {
            query_builder
                .push(" AND from_address = ")
                .push_bind(from.as_slice().to_vec());
        }
        if let Some(status) = filter.status {
            query_builder.push(" AND status = ").push_bind(status.as_str());
        }
        query_builder.push(" ORDER BY block_number");

        let rows: Vec<TreasuryRow> = query_builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TreasuryTransfer::try_from).collect()
    }
}
