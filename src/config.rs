use bitcoin::Network;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::explorer::cache::DEFAULT_CACHE_CAPACITY;

/// Rabin modulus published by the SatoTx spend-proof oracle
pub const DEFAULT_ORACLE_RABIN_PUBKEY: &str = "3d7b971acdd7bff96ca34857e36685038d9c91e3af693cf9e71d170a8aac885b62dd4746fe7ebd7f3d7d16a51d63aa86a4256bdc853d999193ec3e614d4917e3dde9f6954d1784d5a2580f6fb130442e6a8ad0850aeaa100920fcab9176a05eb1aa3b5ee3e3dc75ae7cde3c25d350bba92956c8bacb0c735d39240c6442bab9d";

/// Application configuration loaded from covenant-token.toml or environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub oracle: OracleConfig,
    pub explorer: ExplorerConfig,
    pub transition: TransitionConfig,
}

/// Spend-proof oracle endpoint and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub url: String,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_seconds: u64,
    /// Hex modulus used to check returned Rabin signatures; unchecked when absent
    pub rabin_pubkey: Option<String>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            url: "https://api.satotx.com".to_string(),
            timeout_seconds: 30,
            max_retries: 5,
            initial_backoff_ms: 200,
            backoff_multiplier: 2.0,
            max_backoff_seconds: 10,
            rabin_pubkey: Some(DEFAULT_ORACLE_RABIN_PUBKEY.to_string()),
        }
    }
}

/// Block explorer used to fetch raw transactions, list unspents and broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorerConfig {
    pub url: String,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub initial_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub max_backoff_seconds: u64,
    pub concurrent_requests: usize,
    /// Raw transactions kept in memory before the oldest is evicted
    pub cache_capacity: usize,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            url: "https://api.whatsonchain.com/v1/bsv/test".to_string(),
            timeout_seconds: 30,
            max_retries: 5,
            initial_backoff_ms: 100,
            backoff_multiplier: 2.0,
            max_backoff_seconds: 10,
            concurrent_requests: 4,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Satoshi amounts and network used when building transitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionConfig {
    /// Flat fee paid by every transition transaction
    pub fee: u64,
    /// Value carried by the issue (continuation) output
    pub issue_satoshis: u64,
    /// Value carried by a freshly issued or transferred token output
    pub transfer_satoshis: u64,
    pub network: Network,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            fee: 10_000,
            issue_satoshis: 5_000,
            transfer_satoshis: 5_000,
            network: Network::Testnet,
        }
    }
}

impl AppConfig {
    /// Load configuration from covenant-token.toml and environment variables
    /// Environment variables (TOKEN_<SECTION>__<KEY>) take precedence over the file
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("covenant-token")
    }

    /// Load configuration using `file_stem` as the optional config file
    pub fn load_from(file_stem: &str) -> Result<Self, ConfigError> {
        let oracle = OracleConfig::default();
        let explorer = ExplorerConfig::default();
        let transition = TransitionConfig::default();

        let mut builder = Config::builder()
            // Oracle defaults
            .set_default("oracle.url", oracle.url)?
            .set_default("oracle.timeout_seconds", oracle.timeout_seconds)?
            .set_default("oracle.max_retries", oracle.max_retries as i64)?
            .set_default("oracle.initial_backoff_ms", oracle.initial_backoff_ms)?
            .set_default("oracle.backoff_multiplier", oracle.backoff_multiplier)?
            .set_default("oracle.max_backoff_seconds", oracle.max_backoff_seconds)?
            // Explorer defaults
            .set_default("explorer.url", explorer.url)?
            .set_default("explorer.timeout_seconds", explorer.timeout_seconds)?
            .set_default("explorer.max_retries", explorer.max_retries as i64)?
            .set_default("explorer.initial_backoff_ms", explorer.initial_backoff_ms)?
            .set_default("explorer.backoff_multiplier", explorer.backoff_multiplier)?
            .set_default("explorer.max_backoff_seconds", explorer.max_backoff_seconds)?
            .set_default(
                "explorer.concurrent_requests",
                explorer.concurrent_requests as i64,
            )?
            .set_default("explorer.cache_capacity", explorer.cache_capacity as i64)?
            // Transition defaults
            .set_default("transition.fee", transition.fee)?
            .set_default("transition.issue_satoshis", transition.issue_satoshis)?
            .set_default("transition.transfer_satoshis", transition.transfer_satoshis)?
            .set_default("transition.network", transition.network.to_string())?;

        if let Some(rabin_pubkey) = oracle.rabin_pubkey {
            builder = builder.set_default("oracle.rabin_pubkey", rabin_pubkey)?;
        }

        let config = builder
            // Load from the config file if it exists
            .add_source(File::with_name(file_stem).required(false))
            // TOKEN_ORACLE__URL, TOKEN_TRANSITION__FEE, ...
            .add_source(
                Environment::with_prefix("TOKEN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Get default config values for CLI argument defaults
    pub fn get_defaults() -> Result<Self, ConfigError> {
        match Self::load() {
            Ok(config) => Ok(config),
            Err(_) => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.oracle.max_retries == 0 || self.explorer.max_retries == 0 {
            return Err(ConfigError::Message(
                "max_retries must be at least 1 for oracle and explorer".to_string(),
            ));
        }
        if self.explorer.concurrent_requests == 0 {
            return Err(ConfigError::Message(
                "explorer.concurrent_requests must be at least 1".to_string(),
            ));
        }
        if let Some(pubkey) = &self.oracle.rabin_pubkey {
            if hex::decode(pubkey).is_err() {
                return Err(ConfigError::Message(format!(
                    "oracle.rabin_pubkey is not valid hex: {}",
                    pubkey
                )));
            }
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            explorer: ExplorerConfig::default(),
            transition: TransitionConfig::default(),
        }
    }
}
