use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log};
use alloy::transports::TransportError;

use crate::error::ChainError;
use crate::indexer::client::{retry_rpc, ChainClient};
use crate::indexer::types::{ChainEvent, ChainKind, EventFilter};

const MAX_RETRIES: u32 = 3;

/// Log-style chain client over an alloy JSON-RPC provider.
pub struct EvmChainClient<P> {
    provider: P,
}

impl<P: Provider> EvmChainClient<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl<P> ChainClient for EvmChainClient<P>
where
    P: Provider + Send + Sync + 'static,
{
    fn kind(&self) -> ChainKind {
        ChainKind::Evm
    }

    async fn current_head(&self) -> Result<u64, ChainError> {
        retry_rpc(MAX_RETRIES, || async {
            self.provider.get_block_number().await.map_err(rpc_error)
        })
        .await
    }

    async fn fetch_events(&self, filter: &EventFilter) -> Result<Vec<ChainEvent>, ChainError> {
        let mut rpc_filter = Filter::new()
            .from_block(filter.from_block)
            .to_block(filter.to_block);
        if !filter.descriptor.addresses.is_empty() {
            rpc_filter = rpc_filter.address(filter.descriptor.addresses.clone());
        }
        if !filter.descriptor.topics.is_empty() {
            rpc_filter = rpc_filter.event_signature(filter.descriptor.topics.clone());
        }

        let logs = retry_rpc(MAX_RETRIES, || async {
            self.provider.get_logs(&rpc_filter).await.map_err(rpc_error)
        })
        .await?;

        let mut events = Vec::with_capacity(logs.len());
        for log in &logs {
            match event_from_log(log) {
                Some(event) => events.push(event),
                None => {
                    tracing::debug!(
                        address = %log.inner.address,
                        "Skipping pending log without block/tx metadata"
                    );
                }
            }
        }
        Ok(events)
    }

    async fn fetch_transactions(
        &self,
        _from_block: u64,
        _to_block: u64,
    ) -> Result<Vec<ChainEvent>, ChainError> {
        Err(ChainError::Unsupported(
            "transaction-style scanning on the EVM chain",
        ))
    }
}

/// A body the node sent but we could not parse will not parse on retry either.
fn rpc_error(e: TransportError) -> ChainError {
    if e.is_deser_error() || e.is_null_resp() {
        ChainError::InvalidResponse(e.to_string())
    } else {
        ChainError::Transport(e.to_string())
    }
}

/// Convert an RPC log into a chain event. Logs still pending (no block number or tx hash)
/// cannot be checkpointed and are dropped.
fn event_from_log(log: &Log) -> Option<ChainEvent> {
    Some(ChainEvent {
        address: log.inner.address,
        topics: log.inner.data.topics().to_vec(),
        data: log.inner.data.data.clone(),
        tx_hash: log.transaction_hash?,
        block_number: log.block_number?,
        log_index: log.log_index.unwrap_or(0),
    })
}
