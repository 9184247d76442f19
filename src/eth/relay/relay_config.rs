use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;
use anyhow::Context;
use anyhow::anyhow;
use clap::Parser;
use display_json::DebugAsJson;

use crate::eth::primitives::ChainId;
use crate::eth::primitives::ChainKey;
use crate::ext::parse_duration;

// -----------------------------------------------------------------------------
// Config: Relay
// -----------------------------------------------------------------------------

#[derive(DebugAsJson, Clone, Parser, serde::Serialize)]
pub struct RelayConfig {
    /// Number of blocks behind the chain head considered safe to process.
    #[arg(long = "confirmations", env = "CONFIRMATIONS", default_value = "1")]
    pub confirmations: u64,

    /// Poll interval used when the cursor is close to the chain head.
    #[arg(long = "poll-slow", env = "POLL_SLOW_MS", value_parser = parse_duration, default_value = "2500")]
    pub poll_slow: Duration,

    /// Poll interval used while catching up.
    #[arg(long = "poll-fast", env = "POLL_FAST_MS", value_parser = parse_duration, default_value = "800")]
    pub poll_fast: Duration,

    /// Interval between checkpoint flushes.
    #[arg(long = "flush-interval", env = "FLUSH_INTERVAL_MS", value_parser = parse_duration, default_value = "300000")]
    pub flush_interval: Duration,

    /// Maximum number of processed transfer ids kept in the checkpoint.
    #[arg(long = "max-processed-ids", env = "MAX_PROCESSED_IDS", value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..), default_value = "1000")]
    pub max_processed_ids: usize,

    /// Path of the checkpoint file.
    #[arg(long = "state-file", env = "STATE_FILE", default_value = "hybrid-state.json")]
    pub state_file: PathBuf,

    /// Timeout of a single JSON-RPC request and of websocket connections.
    #[arg(long = "rpc-timeout", env = "RPC_TIMEOUT", value_parser = parse_duration, default_value = "10s")]
    pub rpc_timeout: Duration,

    /// Maximum time waiting for a submitted transaction receipt.
    #[arg(long = "receipt-timeout", env = "RECEIPT_TIMEOUT", value_parser = parse_duration, default_value = "60s")]
    pub receipt_timeout: Duration,

    /// Number of submission attempts before giving up on a transfer.
    #[arg(long = "retry-attempts", env = "RETRY_ATTEMPTS", default_value = "5")]
    pub retry_attempts: u32,

    /// Base delay of the linear backoff between submission attempts.
    #[arg(long = "retry-base-delay", env = "RETRY_BASE_DELAY", value_parser = parse_duration, default_value = "1s")]
    pub retry_base_delay: Duration,

    /// Interval between attempts to attach a dropped log subscription.
    #[arg(long = "listener-retry-interval", env = "LISTENER_RETRY_INTERVAL", value_parser = parse_duration, default_value = "10s")]
    pub listener_retry_interval: Duration,

    /// Capacity of the backlog of transfers waiting for a destination. Zero disables it.
    #[arg(long = "replay-backlog-capacity", env = "REPLAY_BACKLOG_CAPACITY", default_value = "256")]
    pub replay_backlog_capacity: usize,

    /// Interval between replays of the backlog.
    #[arg(long = "replay-interval", env = "REPLAY_INTERVAL", value_parser = parse_duration, default_value = "60s")]
    pub replay_interval: Duration,

    /// Maximum time waiting for relay tasks to finish after shutdown is requested.
    #[arg(long = "shutdown-timeout", env = "SHUTDOWN_TIMEOUT", value_parser = parse_duration, default_value = "10s")]
    pub shutdown_timeout: Duration,

    /// Path of the encrypted JSON keystore of the relayer wallet.
    #[arg(long = "keystore-path", env = "KEYSTORE_PATH")]
    pub keystore_path: PathBuf,

    /// Password of the relayer wallet keystore.
    #[arg(long = "keystore-password", env = "KEYSTORE_PASSWORD", hide_env_values = true)]
    #[serde(skip_serializing)]
    pub keystore_password: String,

    #[clap(flatten)]
    pub source: SourceChainConfig,

    /// Keys of the destination chains. Settings of each chain are read from `<KEY>_*` variables.
    #[arg(
        long = "destination-chains",
        env = "DESTINATION_CHAINS",
        value_delimiter = ',',
        default_value = "hoodi,base,optimism,arbitrum"
    )]
    pub destination_chains: Vec<ChainKey>,
}

impl RelayConfig {
    /// Resolves the settings of every configured destination chain from the environment.
    pub fn destinations(&self) -> anyhow::Result<Vec<DestinationChainConfig>> {
        self.destination_chains.iter().map(DestinationChainConfig::from_env).collect()
    }
}

// -----------------------------------------------------------------------------
// Config: Source chain
// -----------------------------------------------------------------------------

#[derive(DebugAsJson, Clone, Parser, serde::Serialize)]
pub struct SourceChainConfig {
    #[arg(long = "source-chain-key", env = "SOURCE_CHAIN_KEY", default_value = "sepolia")]
    pub source_key: ChainKey,

    #[arg(long = "source-chain-name", env = "SOURCE_CHAIN_NAME", default_value = "Sepolia")]
    pub source_name: String,

    #[arg(long = "source-chain-id", env = "SOURCE_CHAIN_ID", default_value = "11155111")]
    pub source_chain_id: ChainId,

    /// Public RPC used for polling.
    #[arg(long = "source-read-rpc", env = "SOURCE_READ_RPC")]
    pub source_read_rpc: String,

    /// Websocket RPC used for log subscriptions.
    #[arg(long = "source-wss-rpc", env = "SOURCE_WSS_RPC")]
    pub source_wss_rpc: Option<String>,

    /// Private RPC used to submit releases. Falls back to the read RPC.
    #[arg(long = "source-write-rpc", env = "SOURCE_WRITE_RPC")]
    pub source_write_rpc: Option<String>,

    #[arg(long = "source-vault-address", env = "SOURCE_VAULT_ADDRESS")]
    pub source_vault_address: String,

    #[arg(long = "source-nft-vault-address", env = "SOURCE_NFT_VAULT_ADDRESS")]
    pub source_nft_vault_address: Option<String>,
}

impl SourceChainConfig {
    pub fn vault_address(&self) -> anyhow::Result<Address> {
        parse_address("SOURCE_VAULT_ADDRESS", Some(&self.source_vault_address))?.ok_or_else(|| anyhow!("SOURCE_VAULT_ADDRESS must be set"))
    }

    pub fn nft_vault_address(&self) -> anyhow::Result<Option<Address>> {
        parse_address("SOURCE_NFT_VAULT_ADDRESS", self.source_nft_vault_address.as_deref())
    }

    pub fn wss_rpc(&self) -> Option<&str> {
        non_blank(self.source_wss_rpc.as_deref())
    }

    pub fn write_rpc(&self) -> &str {
        non_blank(self.source_write_rpc.as_deref()).unwrap_or(&self.source_read_rpc)
    }
}

// -----------------------------------------------------------------------------
// Config: Destination chains
// -----------------------------------------------------------------------------

/// Chain id and display name used when a known destination chain does not override them.
const KNOWN_DESTINATIONS: &[(&str, u64, &str)] = &[
    ("hoodi", 560048, "Hoodi"),
    ("base", 84532, "Base"),
    ("optimism", 11155420, "OptimismSepolia"),
    ("arbitrum", 421614, "ArbitrumSepolia"),
];

#[derive(DebugAsJson, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DestinationChainConfig {
    pub key: ChainKey,
    pub name: String,
    pub chain_id: ChainId,
    pub read_rpc: Option<String>,
    pub wss_rpc: Option<String>,
    pub write_rpc: Option<String>,
    pub wmrt_address: Option<Address>,
    pub wnft_address: Option<Address>,
}

impl DestinationChainConfig {
    /// Reads `<KEY>_*` variables from the process environment.
    pub fn from_env(key: &ChainKey) -> anyhow::Result<Self> {
        Self::from_lookup(key, |name| env::var(name).ok())
    }

    /// Reads `<KEY>_*` variables using the provided lookup function.
    pub fn from_lookup(key: &ChainKey, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let prefix = key.env_prefix();
        let var = |suffix: &str| {
            let name = format!("{prefix}_{suffix}");
            let value = lookup(&name);
            (name, non_blank(value.as_deref()).map(str::to_owned))
        };
        let known = KNOWN_DESTINATIONS.iter().find(|(known_key, _, _)| *known_key == key.as_str());

        let chain_id = match (var("CHAIN_ID"), known) {
            ((name, Some(value)), _) => ChainId::from_str(&value).with_context(|| format!("invalid {name}"))?,
            ((_, None), Some((_, chain_id, _))) => ChainId::from(*chain_id),
            ((name, None), None) => return Err(anyhow!("{name} must be set for destination chain \"{key}\"")),
        };
        let name = match (var("NAME"), known) {
            ((_, Some(value)), _) => value,
            ((_, None), Some((_, _, name))) => (*name).to_owned(),
            ((_, None), None) => key.to_string(),
        };

        let (wmrt_name, wmrt) = var("WMRT_ADDRESS");
        let (wnft_name, wnft) = var("WNFT_ADDRESS");

        Ok(Self {
            key: key.clone(),
            name,
            chain_id,
            read_rpc: var("READ_RPC").1,
            wss_rpc: var("WSS_RPC").1,
            write_rpc: var("WRITE_RPC").1,
            wmrt_address: parse_address(&wmrt_name, wmrt.as_deref())?,
            wnft_address: parse_address(&wnft_name, wnft.as_deref())?,
        })
    }
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

/// Empty and whitespace-only values are treated as absent.
fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_address(name: &str, value: Option<&str>) -> anyhow::Result<Option<Address>> {
    match non_blank(value) {
        Some(value) => Address::from_str(value).map(Some).with_context(|| format!("invalid {name}: \"{value}\"")),
        None => Ok(None),
    }
}
