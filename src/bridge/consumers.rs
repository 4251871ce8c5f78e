use alloy::primitives::Address;
use std::sync::Arc;

use crate::bridge::decoder::{
    claimed_topic, decode_claim, decode_deposit, decode_token_transfer, deposited_topic,
    transfer_call_topic,
};
use crate::bridge::reconciler::Reconciler;
use crate::bridge::types::BridgeDirection;
use crate::dispatch::registry::{Consumer, ConsumerKey};
use crate::error::ConsumeError;
use crate::indexer::types::{ChainEvent, FilterDescriptor};

/// `Deposited` logs of a bridge contract on the deposit side of a direction.
pub struct DepositConsumer {
    bridge: Address,
    reconciler: Arc<Reconciler>,
}

impl DepositConsumer {
    pub fn new(bridge: Address, reconciler: Arc<Reconciler>) -> Self {
        Self { bridge, reconciler }
    }
}

#[async_trait::async_trait]
impl Consumer for DepositConsumer {
    fn name(&self) -> &'static str {
        match self.reconciler.direction() {
            BridgeDirection::Cashin => "cashin_deposit",
            BridgeDirection::Cashout => "cashout_deposit",
        }
    }

    fn bindings(&self) -> Vec<ConsumerKey> {
        vec![ConsumerKey::new(self.bridge, deposited_topic())]
    }

    fn filter(&self) -> FilterDescriptor {
        FilterDescriptor::logs(vec![self.bridge], vec![deposited_topic()])
    }

    async fn parse(&self, event: &ChainEvent) -> Result<(), ConsumeError> {
        let deposit = decode_deposit(event)?;
        let outcome = self.reconciler.on_deposit(&deposit).await?;
        tracing::debug!(tx = %deposit.tx_hash, ?outcome, "Deposit handled");
        Ok(())
    }
}

/// `Claimed` logs of a bridge contract on the claim side of a direction.
pub struct ClaimConsumer {
    bridge: Address,
    reconciler: Arc<Reconciler>,
}

impl ClaimConsumer {
    pub fn new(bridge: Address, reconciler: Arc<Reconciler>) -> Self {
        Self { bridge, reconciler }
    }
}

#[async_trait::async_trait]
impl Consumer for ClaimConsumer {
    fn name(&self) -> &'static str {
        match self.reconciler.direction() {
            BridgeDirection::Cashin => "cashin_claim",
            BridgeDirection::Cashout => "cashout_claim",
        }
    }

    fn bindings(&self) -> Vec<ConsumerKey> {
        vec![ConsumerKey::new(self.bridge, claimed_topic())]
    }

    fn filter(&self) -> FilterDescriptor {
        FilterDescriptor::logs(vec![self.bridge], vec![claimed_topic()])
    }

    async fn parse(&self, event: &ChainEvent) -> Result<(), ConsumeError> {
        let claim = decode_claim(event)?;
        let outcome = self.reconciler.on_claim(&claim).await?;
        tracing::debug!(tx = %claim.tx_hash, ?outcome, "Claim handled");
        Ok(())
    }
}

/// TRC-20 `transfer` calls into the treasury wallet.
///
/// With no configured tokens it binds the wildcard address and accepts any token.
pub struct TreasuryConsumer {
    treasury_wallet: Address,
    tokens: Vec<Address>,
    reconciler: Arc<Reconciler>,
}

impl TreasuryConsumer {
    pub fn new(treasury_wallet: Address, tokens: Vec<Address>, reconciler: Arc<Reconciler>) -> Self {
        Self {
            treasury_wallet,
            tokens,
            reconciler,
        }
    }
}

#[async_trait::async_trait]
impl Consumer for TreasuryConsumer {
    fn name(&self) -> &'static str {
        "treasury_transfer"
    }

    fn bindings(&self) -> Vec<ConsumerKey> {
        if self.tokens.is_empty() {
            return vec![ConsumerKey::wildcard(transfer_call_topic())];
        }
        self.tokens
            .iter()
            .map(|token| ConsumerKey::new(*token, transfer_call_topic()))
            .collect()
    }

    fn filter(&self) -> FilterDescriptor {
        FilterDescriptor::transactions(self.tokens.clone(), vec![transfer_call_topic()])
    }

    async fn parse(&self, event: &ChainEvent) -> Result<(), ConsumeError> {
        let transfer = decode_token_transfer(event)?;
        if transfer.to != self.treasury_wallet {
            return Ok(());
        }
        self.reconciler.record_treasury_transfer(&transfer).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::types::{ClaimStatus, DepositStatus};
    use crate::db::memory::{MemoryBridgeTransactionRepository, MemoryTreasuryTransferRepository};
    use crate::db::repository::{
        BridgeTransactionRepository, TreasuryFilter, TreasuryTransferRepository,
    };
    use crate::dispatch::registry::ConsumerRegistry;
    use alloy::primitives::{Bytes, B256, U256};

    const BRIDGE: Address = Address::repeat_byte(0xb0);
    const TREASURY: Address = Address::repeat_byte(0x7e);
    const TOKEN: Address = Address::repeat_byte(0x02);

    fn transfer_call(token: Address, to: Address, tx: u8) -> ChainEvent {
        let mut data = Vec::new();
        data.extend_from_slice(to.into_word().as_slice());
        data.extend_from_slice(&U256::from(250u64).to_be_bytes::<32>());
        ChainEvent {
            address: token,
            topics: vec![transfer_call_topic(), Address::repeat_byte(0x01).into_word()],
            data: Bytes::from(data),
            tx_hash: B256::repeat_byte(tx),
            block_number: 3,
            log_index: 0,
        }
    }

    #[tokio::test]
    async fn test_treasury_consumer_records_only_treasury_transfers() {
        let treasury = Arc::new(MemoryTreasuryTransferRepository::new());
        let reconciler = Arc::new(
            Reconciler::new(
                BridgeDirection::Cashin,
                Arc::new(MemoryBridgeTransactionRepository::new()),
            )
            .with_treasury(treasury.clone()),
        );
        let consumer = TreasuryConsumer::new(TREASURY, vec![], reconciler);

        assert_eq!(
            consumer.bindings(),
            vec![ConsumerKey::wildcard(transfer_call_topic())]
        );

        consumer
            .parse(&transfer_call(TOKEN, TREASURY, 0x01))
            .await
            .unwrap();
        consumer
            .parse(&transfer_call(TOKEN, Address::repeat_byte(0x55), 0x02))
            .await
            .unwrap();

        let recorded = treasury
            .select_by_filter(&TreasuryFilter::default())
            .await
            .unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].tx_id, B256::repeat_byte(0x01));
        assert_eq!(recorded[0].token_address, TOKEN);
    }

    #[test]
    fn test_treasury_consumer_binds_configured_tokens() {
        let reconciler = Arc::new(Reconciler::new(
            BridgeDirection::Cashin,
            Arc::new(MemoryBridgeTransactionRepository::new()),
        ));
        let consumer = TreasuryConsumer::new(TREASURY, vec![TOKEN], reconciler);

        assert_eq!(
            consumer.bindings(),
            vec![ConsumerKey::new(TOKEN, transfer_call_topic())]
        );
        assert_eq!(consumer.filter().addresses, vec![TOKEN]);
    }

    #[tokio::test]
    async fn test_malformed_deposit_is_a_decode_error() {
        let reconciler = Arc::new(Reconciler::new(
            BridgeDirection::Cashout,
            Arc::new(MemoryBridgeTransactionRepository::new()),
        ));
        let consumer = DepositConsumer::new(BRIDGE, reconciler);
        let event = ChainEvent {
            address: BRIDGE,
            topics: vec![deposited_topic()],
            data: Bytes::new(),
            tx_hash: B256::repeat_byte(0x09),
            block_number: 1,
            log_index: 0,
        };

        assert!(matches!(
            consumer.parse(&event).await,
            Err(ConsumeError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_deposit_and_claim_routed_through_registry() {
        let repo = Arc::new(MemoryBridgeTransactionRepository::new());
        let reconciler = Arc::new(Reconciler::new(BridgeDirection::Cashout, repo.clone()));
        let mut registry = ConsumerRegistry::new();
        registry.register(Arc::new(DepositConsumer::new(BRIDGE, reconciler.clone())));
        registry.register(Arc::new(ClaimConsumer::new(BRIDGE, reconciler)));
        assert_eq!(registry.filters().len(), 2);

        let recipient = Address::repeat_byte(0x04);
        let mut data = Vec::new();
        data.extend_from_slice(TOKEN.into_word().as_slice());
        data.extend_from_slice(recipient.into_word().as_slice());
        for value in [500u64, 5, 1] {
            data.extend_from_slice(&U256::from(value).to_be_bytes::<32>());
        }
        let deposit = ChainEvent {
            address: BRIDGE,
            topics: vec![
                deposited_topic(),
                Address::repeat_byte(0x01).into_word(),
                TOKEN.into_word(),
            ],
            data: Bytes::from(data),
            tx_hash: B256::repeat_byte(0xd1),
            block_number: 1,
            log_index: 0,
        };

        let consumer = registry.lookup(&deposit).unwrap();
        assert_eq!(consumer.name(), "cashout_deposit");
        consumer.parse(&deposit).await.unwrap();

        let stored = repo
            .select_by_deposit_hash(B256::repeat_byte(0xd1))
            .await
            .unwrap()
            .remove(0);
        assert_eq!(stored.deposit_status, DepositStatus::Confirmed);

        let mut claim_data = Vec::new();
        claim_data.extend_from_slice(TOKEN.into_word().as_slice());
        claim_data.extend_from_slice(&U256::from(500u64).to_be_bytes::<32>());
        let claim = ChainEvent {
            address: BRIDGE,
            topics: vec![claimed_topic(), stored.id, recipient.into_word()],
            data: Bytes::from(claim_data),
            tx_hash: B256::repeat_byte(0xc1),
            block_number: 2,
            log_index: 0,
        };

        let consumer = registry.lookup(&claim).unwrap();
        assert_eq!(consumer.name(), "cashout_claim");
        consumer.parse(&claim).await.unwrap();

        let settled = repo.select_by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(settled.claim_status, ClaimStatus::Success);
    }
}
