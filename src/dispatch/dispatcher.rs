use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::dispatch::registry::{ConsumerKey, ConsumerRegistry};
use crate::indexer::types::ChainEvent;
use crate::indexer::window::ScanWindow;

/// One scanned range, handed from the scanner to the dispatcher.
#[derive(Debug)]
pub struct Delivery {
    pub window: ScanWindow,
    pub events: Vec<ChainEvent>,
    /// Answered once every dispatched event has been handled.
    pub ack: oneshot::Sender<DeliveryReport>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub dispatched: usize,
    pub unmatched: usize,
    pub failed: usize,
}

/// Routes delivered events to their consumers on a bounded set of tasks.
pub struct Dispatcher {
    chain: String,
    registry: Arc<ConsumerRegistry>,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(chain: &str, registry: Arc<ConsumerRegistry>, max_in_flight: usize) -> Self {
        Self {
            chain: chain.to_string(),
            registry,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    /// Consume deliveries until the channel closes or `cancel` fires.
    pub async fn run(self, mut deliveries: mpsc::Receiver<Delivery>, cancel: CancellationToken) {
        tracing::info!(chain = %self.chain, consumers = self.registry.len(), "Dispatcher started");

        loop {
            let delivery = tokio::select! {
                _ = cancel.cancelled() => break,
                next = deliveries.recv() => match next {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let Delivery { window, events, ack } = delivery;
            let Some(report) = self.dispatch(events, &cancel).await else {
                break;
            };

            tracing::debug!(
                chain = %self.chain,
                from = window.start,
                to = window.end,
                dispatched = report.dispatched,
                unmatched = report.unmatched,
                failed = report.failed,
                "Delivery handled"
            );
            if ack.send(report).is_err() {
                tracing::warn!(chain = %self.chain, "Scanner dropped delivery ack");
            }
        }

        tracing::info!(chain = %self.chain, "Dispatcher stopped");
    }

    /// Run every matched event on its consumer and wait for all of them.
    /// Returns `None` if cancelled first; in-flight tasks are left to finish on their own.
    pub async fn dispatch(
        &self,
        events: Vec<ChainEvent>,
        cancel: &CancellationToken,
    ) -> Option<DeliveryReport> {
        let mut report = DeliveryReport::default();
        let mut tasks = JoinSet::new();

        for event in events {
            let Some(consumer) = self.registry.lookup(&event) else {
                report.unmatched += 1;
                tracing::debug!(
                    chain = %self.chain,
                    address = %event.address,
                    tx = %event.tx_hash,
                    "No consumer bound for event"
                );
                continue;
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.detach_all();
                    return None;
                }
                permit = self.permits.clone().acquire_owned() => permit.ok()?,
            };

            report.dispatched += 1;
            let chain = self.chain.clone();
            tasks.spawn(async move {
                let _permit = permit;
                match consumer.parse(&event).await {
                    Ok(()) => true,
                    Err(e) => {
                        let key =
                            ConsumerKey::new(event.address, event.signature().unwrap_or_default());
                        tracing::error!(
                            chain = %chain,
                            consumer = consumer.name(),
                            key = %key,
                            tx = %event.tx_hash,
                            block = event.block_number,
                            error = %e,
                            "Consumer failed"
                        );
                        false
                    }
                }
            });
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.detach_all();
                    return None;
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok(true)) => {}
                    Some(Ok(false)) => report.failed += 1,
                    Some(Err(e)) => {
                        report.failed += 1;
                        tracing::error!(chain = %self.chain, error = %e, "Consumer task aborted");
                    }
                },
            }
        }

        Some(report)
    }
}
