use alloy::primitives::{Address, Bytes, B256};
use std::fmt;

/// The two ledgers the bridge spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Evm,
    Tron,
}

impl ChainKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Evm => "evm",
            Self::Tron => "tron",
        }
    }
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw log or contract call observed on chain.
///
/// For log-style events `topics[0]` is the event signature hash. For transaction-style events
/// it is the 4-byte call selector right-padded to 32 bytes, `topics[1]` is the caller and
/// `data` holds the ABI-encoded call arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEvent {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
}

impl ChainEvent {
    pub fn signature(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}

/// How the scanner has to ask the chain client for a filter's events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    /// Contract logs, fetched with address/topic filtering on the node.
    Logs,
    /// Whole transactions in a block range, narrowed locally.
    Transactions,
}

/// What a consumer wants the scanner to fetch, without a block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDescriptor {
    pub kind: FilterKind,
    /// Empty means any address.
    pub addresses: Vec<Address>,
    /// Empty means any signature.
    pub topics: Vec<B256>,
}

impl FilterDescriptor {
    pub fn logs(addresses: Vec<Address>, topics: Vec<B256>) -> Self {
        Self {
            kind: FilterKind::Logs,
            addresses,
            topics,
        }
    }

    pub fn transactions(addresses: Vec<Address>, topics: Vec<B256>) -> Self {
        Self {
            kind: FilterKind::Transactions,
            addresses,
            topics,
        }
    }

    /// Bind the descriptor to a block range for one fetch.
    pub fn range(&self, from_block: u64, to_block: u64) -> EventFilter {
        debug_assert!(from_block <= to_block);
        EventFilter {
            descriptor: self.clone(),
            from_block,
            to_block,
        }
    }

    pub fn matches(&self, event: &ChainEvent) -> bool {
        let address_ok = self.addresses.is_empty() || self.addresses.contains(&event.address);
        let topic_ok = self.topics.is_empty()
            || event
                .signature()
                .is_some_and(|sig| self.topics.contains(&sig));
        address_ok && topic_ok
    }
}

/// A filter descriptor bound to an inclusive block range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub descriptor: FilterDescriptor,
    pub from_block: u64,
    pub to_block: u64,
}

/// Encode a 4-byte call selector the way transaction-style events carry it in `topics[0]`.
pub fn selector_topic(selector: [u8; 4]) -> B256 {
    B256::right_padding_from(&selector)
}
