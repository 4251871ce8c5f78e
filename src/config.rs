use alloy::primitives::Address;
use serde::Deserialize;
use std::time::Duration;

use crate::indexer::tron::parse_tron_address;
use crate::indexer::types::ChainKind;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub evm: ChainConfig,
    pub tron: ChainConfig,
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// Per-chain scanning parameters. Read once at startup and handed to the scanner as-is.
#[derive(Debug, Deserialize, Clone)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_url: String,
    /// Bridge contract emitting `Deposited` and `Claimed`.
    pub bridge_contract: String,
    /// Operator-chosen origin for the very first scan. Defaults to the chain head.
    pub start_block: Option<u64>,
    #[serde(default = "default_block_time_ms")]
    pub block_time_ms: u64,
    #[serde(default = "default_confirmation_offset")]
    pub confirmation_offset: u64,
    #[serde(default = "default_max_backlog")]
    pub max_backlog: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

fn default_block_time_ms() -> u64 {
    3000
}

fn default_confirmation_offset() -> u64 {
    20
}

fn default_max_backlog() -> u64 {
    5000
}

fn default_chunk_size() -> u64 {
    100
}

impl ChainConfig {
    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    /// Apply `<CHAIN>_*` environment overrides, e.g. `TRON_RPC_URL`.
    fn apply_env<F>(&mut self, get: &F) -> eyre::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = self.name.to_uppercase();
        if let Some(url) = get(&format!("{}_RPC_URL", prefix)) {
            self.rpc_url = url;
        }
        override_u64(get, &format!("{}_BLOCK_TIME_MS", prefix), &mut self.block_time_ms)?;
        override_u64(
            get,
            &format!("{}_CONFIRMATION_OFFSET", prefix),
            &mut self.confirmation_offset,
        )?;
        override_u64(get, &format!("{}_MAX_BACKLOG", prefix), &mut self.max_backlog)?;
        Ok(())
    }

    fn validate(&self, kind: ChainKind) -> eyre::Result<()> {
        if self.confirmation_offset == 0 {
            return Err(eyre::eyre!(
                "Chain '{}': confirmation_offset must be at least 1",
                self.name
            ));
        }
        if self.max_backlog == 0 || self.chunk_size == 0 {
            return Err(eyre::eyre!(
                "Chain '{}': max_backlog and chunk_size must be positive",
                self.name
            ));
        }
        parse_chain_address(kind, &self.bridge_contract).map_err(|e| {
            eyre::eyre!("Chain '{}': invalid bridge_contract: {}", self.name, e)
        })?;
        Ok(())
    }
}

fn override_u64<F>(get: &F, key: &str, target: &mut u64) -> eyre::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| eyre::eyre!("Invalid value '{}' for {}: {}", raw, key, e))?;
    }
    Ok(())
}

// ============================================================
// Bridge Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct BridgeConfig {
    /// Tron wallet receiving plain TRC-20 cash-in deposits.
    pub treasury_wallet: String,
    /// TRC-20 tokens accepted into the treasury. Empty means any token.
    #[serde(default)]
    pub treasury_tokens: Vec<String>,
}

// ============================================================
// Dispatcher Config
// ============================================================

#[derive(Debug, Deserialize, Clone)]
pub struct DispatcherConfig {
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_max_in_flight() -> usize {
    32
}

fn default_channel_capacity() -> usize {
    4
}

/// Parse an address in the notation used on the given chain.
/// EVM accepts `0x`-prefixed hex; Tron additionally accepts `41`-prefixed hex.
pub fn parse_chain_address(kind: ChainKind, raw: &str) -> eyre::Result<Address> {
    match kind {
        ChainKind::Evm => raw
            .parse::<Address>()
            .map_err(|e| eyre::eyre!("'{}': {}", raw, e)),
        ChainKind::Tron => {
            parse_tron_address(raw).ok_or_else(|| eyre::eyre!("'{}' is not a Tron hex address", raw))
        }
    }
}

impl Config {
    pub fn load(path: &str) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("Failed to read config file '{}': {}", path, e))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("Failed to parse config file '{}': {}", path, e))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay environment-sourced settings on top of the file contents.
    pub fn apply_env<F>(&mut self, get: F) -> eyre::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = get("DATABASE_URL") {
            self.database.url = url;
        }
        self.evm.apply_env(&get)?;
        self.tron.apply_env(&get)?;
        Ok(())
    }

    pub fn validate(&self) -> eyre::Result<()> {
        if self.evm.name.eq_ignore_ascii_case(&self.tron.name) {
            return Err(eyre::eyre!(
                "EVM and Tron chains must have distinct names, both are '{}'",
                self.evm.name
            ));
        }
        self.evm.validate(ChainKind::Evm)?;
        self.tron.validate(ChainKind::Tron)?;

        parse_chain_address(ChainKind::Tron, &self.bridge.treasury_wallet)
            .map_err(|e| eyre::eyre!("Invalid treasury_wallet: {}", e))?;
        for token in &self.bridge.treasury_tokens {
            parse_chain_address(ChainKind::Tron, token)
                .map_err(|e| eyre::eyre!("Invalid treasury token: {}", e))?;
        }

        if self.dispatcher.max_in_flight == 0 || self.dispatcher.channel_capacity == 0 {
            return Err(eyre::eyre!(
                "dispatcher.max_in_flight and dispatcher.channel_capacity must be positive"
            ));
        }
        Ok(())
    }
}
