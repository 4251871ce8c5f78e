use sqlx::PgPool;

use crate::error::RepositoryError;

/// Last scanned block height of one chain.
#[async_trait::async_trait]
pub trait CheckpointStore: Send + Sync {
    /// `None` if the chain was never scanned.
    async fn get(&self) -> Result<Option<u64>, RepositoryError>;

    /// Create the row with an initial height. No-op if it already exists.
    async fn create(&self, initial: u64) -> Result<(), RepositoryError>;

    async fn update(&self, height: u64) -> Result<(), RepositoryError>;
}

/// Checkpoint row in `scan_checkpoints`, keyed by chain name.
#[derive(Clone)]
pub struct PgCheckpointStore {
    pool: PgPool,
    chain: String,
}

impl PgCheckpointStore {
    pub fn new(pool: PgPool, chain: &str) -> Self {
        Self {
            pool,
            chain: chain.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn get(&self) -> Result<Option<u64>, RepositoryError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_block FROM scan_checkpoints WHERE chain = $1")
                .bind(&self.chain)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(b,)| b as u64))
    }

    async fn create(&self, initial: u64) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO scan_checkpoints (chain, last_block, updated_at)
             VALUES ($1, $2, NOW())
             ON CONFLICT (chain) DO NOTHING",
        )
        .bind(&self.chain)
        .bind(initial as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, height: u64) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE scan_checkpoints SET last_block = $2, updated_at = NOW() WHERE chain = $1",
        )
        .bind(&self.chain)
        .bind(height as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
