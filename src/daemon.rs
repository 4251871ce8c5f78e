use alloy::primitives::Address;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::bridge::consumers::{ClaimConsumer, DepositConsumer, TreasuryConsumer};
use crate::bridge::reconciler::Reconciler;
use crate::config::{parse_chain_address, Config, DispatcherConfig};
use crate::db::checkpoint::CheckpointStore;
use crate::dispatch::dispatcher::{Delivery, Dispatcher};
use crate::dispatch::registry::ConsumerRegistry;
use crate::error::ScanError;
use crate::indexer::client::ChainClient;
use crate::indexer::scanner::{ChainScanner, ScannerConfig};
use crate::indexer::types::ChainKind;

/// Contract and wallet addresses the consumers bind to.
#[derive(Debug, Clone)]
pub struct BridgeAddresses {
    pub evm_bridge: Address,
    pub tron_bridge: Address,
    pub treasury_wallet: Address,
    pub treasury_tokens: Vec<Address>,
}

impl BridgeAddresses {
    pub fn from_config(config: &Config) -> eyre::Result<Self> {
        let treasury_tokens = config
            .bridge
            .treasury_tokens
            .iter()
            .map(|t| parse_chain_address(ChainKind::Tron, t))
            .collect::<eyre::Result<Vec<_>>>()?;

        Ok(Self {
            evm_bridge: parse_chain_address(ChainKind::Evm, &config.evm.bridge_contract)?,
            tron_bridge: parse_chain_address(ChainKind::Tron, &config.tron.bridge_contract)?,
            treasury_wallet: parse_chain_address(ChainKind::Tron, &config.bridge.treasury_wallet)?,
            treasury_tokens,
        })
    }

    /// EVM side: cash-out deposits and cash-in claims.
    pub fn evm_registry(
        &self,
        cashin: &Arc<Reconciler>,
        cashout: &Arc<Reconciler>,
    ) -> ConsumerRegistry {
        let mut registry = ConsumerRegistry::new();
        registry.register(Arc::new(DepositConsumer::new(self.evm_bridge, cashout.clone())));
        registry.register(Arc::new(ClaimConsumer::new(self.evm_bridge, cashin.clone())));
        registry
    }

    /// Tron side: cash-in deposits, treasury transfers and cash-out claims.
    pub fn tron_registry(
        &self,
        cashin: &Arc<Reconciler>,
        cashout: &Arc<Reconciler>,
    ) -> ConsumerRegistry {
        let mut registry = ConsumerRegistry::new();
        registry.register(Arc::new(DepositConsumer::new(self.tron_bridge, cashin.clone())));
        registry.register(Arc::new(TreasuryConsumer::new(
            self.treasury_wallet,
            self.treasury_tokens.clone(),
            cashin.clone(),
        )));
        registry.register(Arc::new(ClaimConsumer::new(self.tron_bridge, cashout.clone())));
        registry
    }
}

/// Scanner and dispatcher of one chain, joined by a bounded delivery channel.
pub struct ChainPipeline {
    chain: String,
    scanner: ChainScanner,
    dispatcher: Dispatcher,
    deliveries: mpsc::Receiver<Delivery>,
}

impl ChainPipeline {
    pub fn new(
        config: ScannerConfig,
        client: Arc<dyn ChainClient>,
        checkpoint: Arc<dyn CheckpointStore>,
        registry: ConsumerRegistry,
        dispatcher: &DispatcherConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(dispatcher.channel_capacity.max(1));
        let chain = config.chain.clone();
        let filters = registry.filters().to_vec();
        let registry = Arc::new(registry);

        Self {
            scanner: ChainScanner::new(config, client, checkpoint, filters, tx),
            dispatcher: Dispatcher::new(&chain, registry, dispatcher.max_in_flight),
            deliveries: rx,
            chain,
        }
    }
}

/// Owns every chain task. A fatal error on any chain cancels all of them.
pub struct Supervisor {
    shutdown: CancellationToken,
    tasks: JoinSet<(String, Result<(), ScanError>)>,
}

impl Supervisor {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            shutdown,
            tasks: JoinSet::new(),
        }
    }

    pub fn spawn(&mut self, pipeline: ChainPipeline) {
        let ChainPipeline {
            chain,
            scanner,
            dispatcher,
            deliveries,
        } = pipeline;
        let cancel = self.shutdown.child_token();

        let dispatch_cancel = cancel.clone();
        let dispatch_chain = chain.clone();
        self.tasks.spawn(async move {
            dispatcher.run(deliveries, dispatch_cancel).await;
            (dispatch_chain, Ok(()))
        });

        self.tasks.spawn(async move {
            let result = scanner.run(cancel).await;
            (chain, result)
        });
    }

    /// Wait for every task. Returns the first fatal error, after cancelling the rest.
    pub async fn wait(mut self) -> eyre::Result<()> {
        let mut failure = None;

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((chain, Err(e))) => {
                    tracing::error!(chain = %chain, error = %e, "Chain task failed, shutting down");
                    self.shutdown.cancel();
                    failure.get_or_insert_with(|| eyre::eyre!("chain '{}' failed: {}", chain, e));
                }
                Err(e) => {
                    tracing::error!(error = %e, "Chain task panicked, shutting down");
                    self.shutdown.cancel();
                    failure.get_or_insert_with(|| eyre::eyre!("chain task panicked: {}", e));
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryCheckpointStore;
    use crate::error::ChainError;
    use crate::indexer::types::{ChainEvent, EventFilter};
    use std::time::Duration;

    struct FixedHead(Result<u64, ChainError>);

    #[async_trait::async_trait]
    impl ChainClient for FixedHead {
        fn kind(&self) -> ChainKind {
            ChainKind::Tron
        }

        async fn current_head(&self) -> Result<u64, ChainError> {
            self.0.clone()
        }

        async fn fetch_events(&self, _filter: &EventFilter) -> Result<Vec<ChainEvent>, ChainError> {
            Ok(Vec::new())
        }

        async fn fetch_transactions(
            &self,
            _from_block: u64,
            _to_block: u64,
        ) -> Result<Vec<ChainEvent>, ChainError> {
            Ok(Vec::new())
        }
    }

    fn pipeline(name: &str, head: Result<u64, ChainError>) -> ChainPipeline {
        ChainPipeline::new(
            ScannerConfig {
                chain: name.to_string(),
                block_time: Duration::from_millis(5),
                confirmation_offset: 3,
                max_backlog: 100,
                chunk_size: 10,
                start_block: None,
            },
            Arc::new(FixedHead(head)),
            Arc::new(MemoryCheckpointStore::new()),
            ConsumerRegistry::new(),
            &DispatcherConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_fatal_chain_error_stops_every_chain() {
        let shutdown = CancellationToken::new();
        let mut supervisor = Supervisor::new(shutdown.clone());
        supervisor.spawn(pipeline("healthy", Ok(50)));
        supervisor.spawn(pipeline(
            "broken",
            Err(ChainError::InvalidResponse("block number missing".to_string())),
        ));

        let result = tokio::time::timeout(Duration::from_secs(5), supervisor.wait())
            .await
            .expect("supervisor did not stop");

        assert!(result.unwrap_err().to_string().contains("broken"));
        assert!(shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_is_clean() {
        let shutdown = CancellationToken::new();
        let mut supervisor = Supervisor::new(shutdown.clone());
        supervisor.spawn(pipeline("evm", Ok(50)));
        supervisor.spawn(pipeline("tron", Ok(80)));

        let waiter = tokio::spawn(supervisor.wait());
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.cancel();

        assert!(waiter.await.unwrap().is_ok());
    }

    #[test]
    fn test_registries_cover_both_directions() {
        use crate::bridge::types::BridgeDirection;
        use crate::db::memory::{
            MemoryBridgeTransactionRepository, MemoryTreasuryTransferRepository,
        };

        let cashin = Arc::new(
            Reconciler::new(
                BridgeDirection::Cashin,
                Arc::new(MemoryBridgeTransactionRepository::new()),
            )
            .with_treasury(Arc::new(MemoryTreasuryTransferRepository::new())),
        );
        let cashout = Arc::new(Reconciler::new(
            BridgeDirection::Cashout,
            Arc::new(MemoryBridgeTransactionRepository::new()),
        ));
        let addresses = BridgeAddresses {
            evm_bridge: Address::repeat_byte(0x01),
            tron_bridge: Address::repeat_byte(0x02),
            treasury_wallet: Address::repeat_byte(0x03),
            treasury_tokens: vec![],
        };

        let evm = addresses.evm_registry(&cashin, &cashout);
        assert_eq!(evm.len(), 2);
        assert_eq!(evm.filters().len(), 2);

        let tron = addresses.tron_registry(&cashin, &cashout);
        assert_eq!(tron.len(), 3);
        assert_eq!(tron.filters().len(), 3);
    }
}
