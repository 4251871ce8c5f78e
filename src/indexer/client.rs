use std::time::Duration;

use crate::error::ChainError;
use crate::indexer::types::{ChainEvent, ChainKind, EventFilter};

/// Read-only view of one chain, as needed by the scanner.
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    fn kind(&self) -> ChainKind;

    /// Current head block number.
    async fn current_head(&self) -> Result<u64, ChainError>;

    /// Contract logs matching the filter's addresses and topics, in chain order.
    async fn fetch_events(&self, filter: &EventFilter) -> Result<Vec<ChainEvent>, ChainError>;

    /// Every successful contract call in `[from_block, to_block]`, in chain order.
    async fn fetch_transactions(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<ChainEvent>, ChainError>;
}

/// Retry an async operation with exponential backoff.
/// Only transient errors (rate limits, network issues) are retried; a malformed response
/// is returned at once.
pub async fn retry_rpc<F, Fut, T>(max_retries: u32, mut f: F) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ChainError>>,
{
    let mut delay = Duration::from_millis(500);

    for attempt in 0..max_retries {
        match f().await {
            Ok(val) => return Ok(val),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    attempt = attempt + 1,
                    max_retries,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "RPC call failed, retrying..."
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, Duration::from_secs(30));
            }
        }
    }

    // Final attempt, propagate the error
    f().await.map_err(|e| match e {
        ChainError::Transport(msg) => ChainError::Transport(format!(
            "RPC call failed after {} retries: {}",
            max_retries, msg
        )),
        other => other,
    })
}
