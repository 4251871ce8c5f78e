use alloy::primitives::{Address, B256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ConsumeError;
use crate::indexer::types::{ChainEvent, FilterDescriptor};

/// Routing key of a consumer binding.
///
/// The zero address is the wildcard: it matches the topic on any contract, but only when no
/// binding exists for the exact address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerKey {
    pub address: Address,
    pub topic: B256,
}

impl ConsumerKey {
    pub fn new(address: Address, topic: B256) -> Self {
        Self { address, topic }
    }

    pub fn wildcard(topic: B256) -> Self {
        Self::new(Address::ZERO, topic)
    }

    pub fn is_wildcard(&self) -> bool {
        self.address == Address::ZERO
    }
}

impl fmt::Display for ConsumerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_wildcard() {
            write!(f, "*:{}", self.topic)
        } else {
            write!(f, "{}:{}", self.address, self.topic)
        }
    }
}

/// Business logic attached to one or more `(address, topic)` bindings.
#[async_trait::async_trait]
pub trait Consumer: Send + Sync {
    fn name(&self) -> &'static str;

    fn bindings(&self) -> Vec<ConsumerKey>;

    /// What the scanner has to fetch for this consumer.
    fn filter(&self) -> FilterDescriptor;

    async fn parse(&self, event: &ChainEvent) -> Result<(), ConsumeError>;
}

/// Immutable routing table for one chain, built at startup.
#[derive(Default)]
pub struct ConsumerRegistry {
    bindings: HashMap<ConsumerKey, Arc<dyn Consumer>>,
    filters: Vec<FilterDescriptor>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every key the consumer exposes. A key already bound is taken over by the newer
    /// consumer.
    pub fn register(&mut self, consumer: Arc<dyn Consumer>) {
        for key in consumer.bindings() {
            if let Some(previous) = self.bindings.insert(key, consumer.clone()) {
                tracing::warn!(
                    key = %key,
                    previous = previous.name(),
                    consumer = consumer.name(),
                    "Consumer binding overwritten"
                );
            }
        }

        let filter = consumer.filter();
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
    }

    /// Exact `(address, topic)` first, then the wildcard binding for the topic.
    pub fn lookup(&self, event: &ChainEvent) -> Option<Arc<dyn Consumer>> {
        let topic = event.signature()?;
        self.bindings
            .get(&ConsumerKey::new(event.address, topic))
            .or_else(|| self.bindings.get(&ConsumerKey::wildcard(topic)))
            .cloned()
    }

    pub fn filters(&self) -> &[FilterDescriptor] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;

    struct Named {
        name: &'static str,
        keys: Vec<ConsumerKey>,
    }

    #[async_trait::async_trait]
    impl Consumer for Named {
        fn name(&self) -> &'static str {
            self.name
        }

        fn bindings(&self) -> Vec<ConsumerKey> {
            self.keys.clone()
        }

        fn filter(&self) -> FilterDescriptor {
            FilterDescriptor::logs(
                self.keys.iter().map(|k| k.address).collect(),
                self.keys.iter().map(|k| k.topic).collect(),
            )
        }

        async fn parse(&self, _event: &ChainEvent) -> Result<(), ConsumeError> {
            Ok(())
        }
    }

    fn named(name: &'static str, keys: Vec<ConsumerKey>) -> Arc<dyn Consumer> {
        Arc::new(Named { name, keys })
    }

    fn event(address: Address, topic: B256) -> ChainEvent {
        ChainEvent {
            address,
            topics: vec![topic],
            data: Bytes::new(),
            tx_hash: B256::ZERO,
            block_number: 0,
            log_index: 0,
        }
    }

    const CONTRACT: Address = Address::repeat_byte(0x11);
    const OTHER: Address = Address::repeat_byte(0x22);
    const TOPIC: B256 = B256::repeat_byte(0xaa);

    #[test]
    fn test_exact_match_beats_wildcard() {
        let mut registry = ConsumerRegistry::new();
        registry.register(named("wildcard", vec![ConsumerKey::wildcard(TOPIC)]));
        registry.register(named("exact", vec![ConsumerKey::new(CONTRACT, TOPIC)]));

        assert_eq!(registry.lookup(&event(CONTRACT, TOPIC)).unwrap().name(), "exact");
        assert_eq!(registry.lookup(&event(OTHER, TOPIC)).unwrap().name(), "wildcard");
    }

    #[test]
    fn test_no_binding_for_topic() {
        let mut registry = ConsumerRegistry::new();
        registry.register(named("exact", vec![ConsumerKey::new(CONTRACT, TOPIC)]));

        assert!(registry.lookup(&event(CONTRACT, B256::repeat_byte(0xbb))).is_none());
        assert!(registry.lookup(&event(OTHER, TOPIC)).is_none());

        let mut anonymous = event(CONTRACT, TOPIC);
        anonymous.topics.clear();
        assert!(registry.lookup(&anonymous).is_none());
    }

    #[test]
    fn test_last_registration_wins() {
        let mut registry = ConsumerRegistry::new();
        registry.register(named("first", vec![ConsumerKey::new(CONTRACT, TOPIC)]));
        registry.register(named("second", vec![ConsumerKey::new(CONTRACT, TOPIC)]));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(&event(CONTRACT, TOPIC)).unwrap().name(), "second");
        // Identical descriptors are installed once.
        assert_eq!(registry.filters().len(), 1);
    }

    #[test]
    fn test_key_display() {
        let key = ConsumerKey::wildcard(TOPIC);
        assert!(key.to_string().starts_with("*:0xaaaa"));
    }
}
