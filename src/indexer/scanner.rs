use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::ChainConfig;
use crate::db::checkpoint::CheckpointStore;
use crate::dispatch::dispatcher::{Delivery, DeliveryReport};
use crate::error::{ChainError, ScanError};
use crate::indexer::client::ChainClient;
use crate::indexer::types::{ChainEvent, FilterDescriptor, FilterKind};
use crate::indexer::window::{compute_window, plan_ranges, skipped_blocks, ScanWindow, WindowParams};

/// Everything that differs between the EVM and the Tron scanner.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub chain: String,
    pub block_time: Duration,
    pub confirmation_offset: u64,
    pub max_backlog: u64,
    pub chunk_size: u64,
    pub start_block: Option<u64>,
}

impl From<&ChainConfig> for ScannerConfig {
    fn from(config: &ChainConfig) -> Self {
        Self {
            chain: config.name.clone(),
            block_time: config.block_time(),
            confirmation_offset: config.confirmation_offset,
            max_backlog: config.max_backlog,
            chunk_size: config.chunk_size,
            start_block: config.start_block,
        }
    }
}

impl ScannerConfig {
    fn window_params(&self) -> WindowParams {
        WindowParams {
            confirmation_offset: self.confirmation_offset,
            max_backlog: self.max_backlog,
        }
    }
}

/// Polls one chain and hands every matching event to the dispatcher, one sub-range at a time.
pub struct ChainScanner {
    config: ScannerConfig,
    client: Arc<dyn ChainClient>,
    checkpoint: Arc<dyn CheckpointStore>,
    filters: Vec<FilterDescriptor>,
    deliveries: mpsc::Sender<Delivery>,
}

impl ChainScanner {
    pub fn new(
        config: ScannerConfig,
        client: Arc<dyn ChainClient>,
        checkpoint: Arc<dyn CheckpointStore>,
        filters: Vec<FilterDescriptor>,
        deliveries: mpsc::Sender<Delivery>,
    ) -> Self {
        Self {
            config,
            client,
            checkpoint,
            filters,
            deliveries,
        }
    }

    /// Tick until cancelled. Returns an error only for fatal failures.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ScanError> {
        let chain = self.config.chain.clone();
        tracing::info!(
            chain = %chain,
            client = %self.client.kind(),
            filters = self.filters.len(),
            block_time_ms = self.config.block_time.as_millis() as u64,
            "Scanner started"
        );

        while !cancel.is_cancelled() {
            match self.tick(&cancel).await {
                Ok(Some(height)) => {
                    tracing::debug!(chain = %chain, checkpoint = height, "Tick complete");
                }
                Ok(None) => break,
                Err(e) if e.is_fatal() => {
                    tracing::error!(chain = %chain, error = %e, "Scanner stopped on fatal error");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(chain = %chain, error = %e, "Tick abandoned, retrying next block");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.block_time) => {}
                _ = cancel.cancelled() => break,
            }
        }

        tracing::info!(chain = %chain, "Scanner stopped");
        Ok(())
    }

    /// Scan one window. Returns the persisted checkpoint, or `None` if cancelled mid-tick.
    pub async fn tick(&self, cancel: &CancellationToken) -> Result<Option<u64>, ScanError> {
        let chain = &self.config.chain;
        let stored = self.checkpoint.get().await?.filter(|&h| h > 0);

        let head = match self.client.current_head().await {
            Ok(head) => head,
            Err(e) if stored.is_none() && !e.is_transient() => return Err(ScanError::ColdStart(e)),
            Err(e) => return Err(e.into()),
        };

        let last = match stored {
            Some(last) => last,
            None => {
                let origin = self.config.start_block.unwrap_or(head);
                self.checkpoint.create(origin).await?;
                tracing::info!(chain = %chain, origin, head, "Cold start, seeding scan origin");
                origin
            }
        };

        let params = self.config.window_params();
        let window = compute_window(last, head, params);
        let skipped = skipped_blocks(last, &window, params);
        if skipped > 0 {
            tracing::warn!(
                chain = %chain,
                skipped,
                last,
                head,
                resume_from = window.start,
                "Backlog exceeds limit, skipping older blocks"
            );
        }

        let mut persisted = last;
        for range in plan_ranges(window, self.config.chunk_size) {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            let events = self.fetch(range).await?;
            let count = events.len();
            let Some(report) = self.deliver(range, events, cancel).await? else {
                return Ok(None);
            };

            persisted = persisted.max(range.end);
            self.checkpoint.update(persisted).await?;

            tracing::info!(
                chain = %chain,
                from = range.start,
                to = range.end,
                events = count,
                failed = report.failed,
                "Scanned block range"
            );
        }

        Ok(Some(persisted))
    }

    /// One concurrent fetch per filter. Any failure abandons the whole range.
    async fn fetch(&self, range: ScanWindow) -> Result<Vec<ChainEvent>, ChainError> {
        let fetches = self.filters.iter().map(|descriptor| async move {
            match descriptor.kind {
                FilterKind::Logs => {
                    self.client
                        .fetch_events(&descriptor.range(range.start, range.end))
                        .await
                }
                FilterKind::Transactions => {
                    let calls = self.client.fetch_transactions(range.start, range.end).await?;
                    Ok(calls.into_iter().filter(|e| descriptor.matches(e)).collect())
                }
            }
        });

        let mut events = Vec::new();
        for result in join_all(fetches).await {
            events.extend(result?);
        }
        Ok(events)
    }

    /// Hand a range to the dispatcher and wait until it has been handled.
    async fn deliver(
        &self,
        window: ScanWindow,
        events: Vec<ChainEvent>,
        cancel: &CancellationToken,
    ) -> Result<Option<DeliveryReport>, ScanError> {
        if events.is_empty() {
            return Ok(Some(DeliveryReport::default()));
        }

        let (ack, done) = oneshot::channel();
        let delivery = Delivery {
            window,
            events,
            ack,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            sent = self.deliveries.send(delivery) => {
                sent.map_err(|_| ScanError::DispatcherClosed)?;
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            report = done => match report {
                Ok(report) => Ok(Some(report)),
                Err(_) if cancel.is_cancelled() => Ok(None),
                Err(_) => Err(ScanError::DispatcherClosed),
            },
        }
    }
}
