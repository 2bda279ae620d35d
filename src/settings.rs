use config::{Config, ConfigError, Environment, File};
use ethers::types::{H256, U256};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::edges::{UpdateContext, SWAP_V3_TOPIC, SYNC_TOPIC};
use crate::graph::DEFAULT_ORIGIN_CHAIN;
use crate::types::conversions::{parse_h256, u256_dec, ConversionError};
use crate::types::ChainId;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid {key} value: {value}")]
    InvalidAmount { key: &'static str, value: String },
    #[error("invalid fee tier: {0}")]
    InvalidFeeTier(String),
    #[error("invalid {key}: {source}")]
    InvalidTopic {
        key: &'static str,
        #[source]
        source: ConversionError,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct RouterSettings {
    /// Input used to compute the price observation after each log
    #[serde(default = "default_amount_in", with = "u256_dec")]
    pub amount_in: U256,
    #[serde(default = "default_builder_fee", with = "u256_dec")]
    pub default_builder_fee: U256,
    #[serde(default = "default_fee_tiers")]
    pub fee_tiers: Vec<u32>,
    #[serde(default = "default_origin_chain")]
    pub origin_chain: String,
    #[serde(default)]
    pub sync_topic: Option<String>,
    #[serde(default)]
    pub swap_v3_topic: Option<String>,
    /// Prometheus listener, only used with the `observability` feature
    #[serde(default)]
    pub metrics_addr: Option<String>,
}

fn default_amount_in() -> U256 {
    U256::exp10(18)
}
fn default_builder_fee() -> U256 {
    U256::zero()
}
fn default_fee_tiers() -> Vec<u32> {
    vec![500, 3000, 10000]
}
fn default_origin_chain() -> String {
    DEFAULT_ORIGIN_CHAIN.to_string()
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            amount_in: default_amount_in(),
            default_builder_fee: default_builder_fee(),
            fee_tiers: default_fee_tiers(),
            origin_chain: default_origin_chain(),
            sync_topic: None,
            swap_v3_topic: None,
            metrics_addr: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DexSettings {
    #[serde(default)]
    pub factories: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TokenSettings {
    pub address: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub token_home: String,
    #[serde(default)]
    pub token_remote: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChainSettings {
    #[serde(default)]
    pub chain_id: u64,
    #[serde(default)]
    pub rpc_url: Option<String>,
    #[serde(default)]
    pub uniswap_v2: DexSettings,
    #[serde(default)]
    pub uniswap_v3: DexSettings,
    #[serde(default)]
    pub tokens: Vec<TokenSettings>,
}

/// Bridge link between the same asset on two chains.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BridgeSettings {
    pub from_chain: String,
    pub from_token: String,
    pub to_chain: String,
    pub to_token: String,
    /// Pool label of the from -> to edge, keyed on `to_chain`
    #[serde(default = "default_forward_pool")]
    pub forward_pool: String,
    /// Pool label of the to -> from edge, keyed on `from_chain`
    #[serde(default = "default_backward_pool")]
    pub backward_pool: String,
}

fn default_forward_pool() -> String {
    "pool".to_string()
}
fn default_backward_pool() -> String {
    "pool1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,
    /// First block to index when no checkpoint exists; the chain head when unset
    #[serde(default)]
    pub start_block: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}
fn default_retry_delay_ms() -> u64 {
    5000
}
fn default_max_block_range() -> u64 {
    100
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            max_block_range: default_max_block_range(),
            start_block: None,
        }
    }
}

impl IngestionSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoverySettings {
    /// Minimum spacing between tickBitmap/ticks calls
    #[serde(default = "default_tick_pacing_ms")]
    pub tick_pacing_ms: u64,
    #[serde(default = "default_tick_retry_delay_ms")]
    pub tick_retry_delay_ms: u64,
    #[serde(default = "default_tick_fetch_retries")]
    pub tick_fetch_retries: usize,
}

fn default_tick_pacing_ms() -> u64 {
    50
}
fn default_tick_retry_delay_ms() -> u64 {
    500
}
fn default_tick_fetch_retries() -> usize {
    3
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            tick_pacing_ms: default_tick_pacing_ms(),
            tick_retry_delay_ms: default_tick_retry_delay_ms(),
            tick_fetch_retries: default_tick_fetch_retries(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_batch_size() -> usize {
    100
}
fn default_flush_interval_ms() -> u64 {
    50
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackupSettings {
    #[serde(default = "default_backup_path")]
    pub path: PathBuf,
}

fn default_backup_path() -> PathBuf {
    PathBuf::from("data/backup")
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            path: default_backup_path(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub router: RouterSettings,
    /// Keyed by chain name; lookups are case-insensitive
    #[serde(default)]
    pub chains: HashMap<String, ChainSettings>,
    #[serde(default)]
    pub bridges: Vec<BridgeSettings>,
    #[serde(default)]
    pub ingestion: IngestionSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub backup: BackupSettings,
}

impl Settings {
    /// Loads `Config.toml`, then `ROUTER__*` variables, then the plain environment overrides.
    pub fn new() -> Result<Self, SettingsError> {
        Self::from_file("Config.toml")
    }

    pub fn from_file(path: &str) -> Result<Self, SettingsError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("ROUTER").separator("__"))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_overrides(|key| env::var(key).ok())?;
        Ok(settings)
    }

    /// Applies the flat environment overrides (`AMOUNT_IN`, `FEE_TIERS`, `<CHAIN>_RPC_URL`, ...)
    /// read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(topic) = non_empty("SYNC_TOPIC") {
            self.router.sync_topic = Some(topic);
        }
        if let Some(topic) = non_empty("SWAP_V3_TOPIC") {
            self.router.swap_v3_topic = Some(topic);
        }
        if let Some(raw) = non_empty("AMOUNT_IN") {
            self.router.amount_in = parse_amount("AMOUNT_IN", &raw)?;
        }
        if let Some(raw) = non_empty("DEFAULT_BUILDER_FEE") {
            self.router.default_builder_fee = parse_amount("DEFAULT_BUILDER_FEE", &raw)?;
        }
        if let Some(raw) = non_empty("FEE_TIERS") {
            self.router.fee_tiers = parse_fee_tiers(&raw)?;
        }
        if let Some(url) = non_empty("DATABASE_URL") {
            self.database.url = Some(url);
        }
        for (name, chain) in self.chains.iter_mut() {
            if let Some(url) = non_empty(&format!("{}_RPC_URL", name.to_uppercase())) {
                chain.rpc_url = Some(url);
            }
        }
        Ok(())
    }

    /// Chain section by name, ignoring case.
    pub fn chain(&self, name: &str) -> Option<&ChainSettings> {
        self.chains
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, chain)| chain)
    }

    pub fn sync_topic(&self) -> Result<H256, SettingsError> {
        topic_or_default("SYNC_TOPIC", self.router.sync_topic.as_deref(), *SYNC_TOPIC)
    }

    pub fn swap_v3_topic(&self) -> Result<H256, SettingsError> {
        topic_or_default(
            "SWAP_V3_TOPIC",
            self.router.swap_v3_topic.as_deref(),
            *SWAP_V3_TOPIC,
        )
    }

    /// Log-application parameters for one chain.
    pub fn update_context(&self, chain: &str) -> Result<UpdateContext, SettingsError> {
        Ok(
            UpdateContext::new(ChainId::normalized(chain), self.router.amount_in)
                .with_topics(self.sync_topic()?, self.swap_v3_topic()?),
        )
    }

    pub fn origin_chain(&self) -> ChainId {
        ChainId::normalized(&self.router.origin_chain)
    }

    /// Configured bridge links, or the default link between the first AVALANCHE and
    /// COQNET tokens when none are configured.
    pub fn bridge_links(&self) -> Vec<BridgeSettings> {
        if !self.bridges.is_empty() {
            return self.bridges.clone();
        }
        let first_token = |chain: &str| {
            self.chain(chain)
                .and_then(|c| c.tokens.first())
                .map(|t| t.address.clone())
        };
        match (first_token("AVALANCHE"), first_token("COQNET")) {
            (Some(from_token), Some(to_token)) => vec![BridgeSettings {
                from_chain: "avalanche".to_string(),
                from_token,
                to_chain: "coqnet".to_string(),
                to_token,
                forward_pool: default_forward_pool(),
                backward_pool: default_backward_pool(),
            }],
            _ => Vec::new(),
        }
    }
}

fn parse_amount(key: &'static str, raw: &str) -> Result<U256, SettingsError> {
    U256::from_dec_str(raw.trim()).map_err(|_| SettingsError::InvalidAmount {
        key,
        value: raw.to_string(),
    })
}

fn parse_fee_tiers(raw: &str) -> Result<Vec<u32>, SettingsError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|_| SettingsError::InvalidFeeTier(s.to_string())))
        .collect()
}

fn topic_or_default(
    key: &'static str,
    raw: Option<&str>,
    default: H256,
) -> Result<H256, SettingsError> {
    match raw {
        Some(raw) => parse_h256(raw).map_err(|source| SettingsError::InvalidTopic { key, source }),
        None => Ok(default),
    }
}
