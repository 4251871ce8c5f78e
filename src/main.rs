use std::sync::Arc;

use alloy::providers::ProviderBuilder;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use bridge_listener::bridge::reconciler::Reconciler;
use bridge_listener::bridge::types::{BridgeDirection, ClaimStatus};
use bridge_listener::config::Config;
use bridge_listener::daemon::{BridgeAddresses, ChainPipeline, Supervisor};
use bridge_listener::db::checkpoint::PgCheckpointStore;
use bridge_listener::db::repository::{
    BridgeTransactionRepository, PgBridgeTransactionRepository, PgTreasuryTransferRepository,
    TransactionFilter,
};
use bridge_listener::indexer::evm::EvmChainClient;
use bridge_listener::indexer::scanner::ScannerConfig;
use bridge_listener::indexer::tron::TronChainClient;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    // RUST_LOG controls verbosity, LOG_FORMAT=json switches to JSON lines
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    tracing::info!("Bridge listener starting");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path)?;
    tracing::info!(
        evm = %config.evm.name,
        tron = %config.tron.name,
        "Configuration loaded from {}",
        config_path
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .map_err(|e| eyre::eyre!("Failed to connect to database: {}", e))?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| eyre::eyre!("Failed to run migrations: {}", e))?;

    tracing::info!("Database migrations complete");

    let cashin_repo = Arc::new(PgBridgeTransactionRepository::new(
        pool.clone(),
        BridgeDirection::Cashin,
    ));
    let cashout_repo = Arc::new(PgBridgeTransactionRepository::new(
        pool.clone(),
        BridgeDirection::Cashout,
    ));
    let treasury_repo = Arc::new(PgTreasuryTransferRepository::new(pool.clone()));

    // Transfers still waiting for their claim
    let unclaimed = TransactionFilter {
        claim_status: Some(ClaimStatus::Pending),
        ..Default::default()
    };
    for (direction, repo) in [
        (BridgeDirection::Cashin, &cashin_repo),
        (BridgeDirection::Cashout, &cashout_repo),
    ] {
        let pending = repo.select_by_filter(&unclaimed).await?;
        tracing::info!(
            direction = direction.as_str(),
            pending = pending.len(),
            "Unclaimed transfers on record"
        );
    }

    let cashin = Arc::new(
        Reconciler::new(BridgeDirection::Cashin, cashin_repo).with_treasury(treasury_repo),
    );
    let cashout = Arc::new(Reconciler::new(BridgeDirection::Cashout, cashout_repo));

    let addresses = BridgeAddresses::from_config(&config)?;
    let evm_registry = addresses.evm_registry(&cashin, &cashout);
    let tron_registry = addresses.tron_registry(&cashin, &cashout);
    tracing::info!(
        evm_bindings = evm_registry.len(),
        tron_bindings = tron_registry.len(),
        treasury = %addresses.treasury_wallet,
        "Consumers registered"
    );

    let provider = ProviderBuilder::new().connect_http(
        config
            .evm
            .rpc_url
            .parse()
            .map_err(|e| eyre::eyre!("Invalid EVM RPC URL: {}", e))?,
    );
    let evm_client = Arc::new(EvmChainClient::new(provider));
    let tron_client = Arc::new(TronChainClient::new(&config.tron.rpc_url));

    let shutdown = CancellationToken::new();
    let mut supervisor = Supervisor::new(shutdown.clone());

    supervisor.spawn(ChainPipeline::new(
        ScannerConfig::from(&config.evm),
        evm_client,
        Arc::new(PgCheckpointStore::new(pool.clone(), &config.evm.name)),
        evm_registry,
        &config.dispatcher,
    ));
    supervisor.spawn(ChainPipeline::new(
        ScannerConfig::from(&config.tron),
        tron_client,
        Arc::new(PgCheckpointStore::new(pool.clone(), &config.tron.name)),
        tron_registry,
        &config.dispatcher,
    ));

    let tasks = tokio::spawn(supervisor.wait());

    tracing::info!("Scanners started. Press Ctrl+C to stop.");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutdown signal received, stopping scanners...");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {
            tracing::error!("A chain task failed, stopping");
        }
    }

    tasks.await??;

    tracing::info!("Bridge listener stopped gracefully");
    Ok(())
}
