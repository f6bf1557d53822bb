//! Server configuration.

use serde::Deserialize;
use thiserror::Error;

/// Default gas ceiling for `CheckTx` validation.
pub const DEFAULT_VALIDATE_TX_GAS_LIMIT: u64 = 10_000_000;

/// Default gas ceiling for `app/simulate` queries.
pub const DEFAULT_SIMULATION_GAS_LIMIT: u64 = 10_000_000;

/// Errors loading or validating a [`ServerConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Operator-facing settings for the consensus driver.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Gas ceiling applied when validating transactions for the mempool.
    pub validate_tx_gas_limit: u64,

    /// Gas ceiling applied to simulation queries.
    pub simulation_gas_limit: u64,

    /// Number of recent blocks the consensus engine must keep. 0 keeps all.
    pub min_retain_blocks: u64,

    /// Refuse to finalize blocks at or above this height. 0 disables.
    pub halt_height: u64,

    /// Refuse to finalize blocks timestamped at or after this unix time
    /// (seconds). 0 disables.
    pub halt_time: u64,

    /// Prune local store versions below the retain height on commit.
    pub pruning: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            validate_tx_gas_limit: DEFAULT_VALIDATE_TX_GAS_LIMIT,
            simulation_gas_limit: DEFAULT_SIMULATION_GAS_LIMIT,
            min_retain_blocks: 0,
            halt_height: 0,
            halt_time: 0,
            pruning: false,
        }
    }
}

impl ServerConfig {
    /// Parse and validate a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validate_tx_gas_limit == 0 {
            return Err(ConfigError::Invalid(
                "validate_tx_gas_limit must be non-zero".to_string(),
            ));
        }
        if self.simulation_gas_limit == 0 {
            return Err(ConfigError::Invalid(
                "simulation_gas_limit must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_validate_tx_gas_limit(mut self, gas: u64) -> Self {
        self.validate_tx_gas_limit = gas;
        self
    }

    pub fn with_simulation_gas_limit(mut self, gas: u64) -> Self {
        self.simulation_gas_limit = gas;
        self
    }

    pub fn with_min_retain_blocks(mut self, blocks: u64) -> Self {
        self.min_retain_blocks = blocks;
        self
    }

    pub fn with_halt_height(mut self, height: u64) -> Self {
        self.halt_height = height;
        self
    }

    pub fn with_halt_time(mut self, unix_secs: u64) -> Self {
        self.halt_time = unix_secs;
        self
    }

    pub fn with_pruning(mut self, enabled: bool) -> Self {
        self.pruning = enabled;
        self
    }

    /// Oldest height the consensus engine must retain after committing
    /// `committed_height`. 0 means retain everything.
    pub fn retain_height(&self, committed_height: u64) -> u64 {
        if self.min_retain_blocks == 0 {
            return 0;
        }
        committed_height.saturating_sub(self.min_retain_blocks)
    }

    /// Reason to halt before finalizing a block, if any.
    pub fn halt_reason(&self, height: u64, time_ms: u64) -> Option<String> {
        if self.halt_height > 0 && height >= self.halt_height {
            return Some(format!("halt height {} reached", self.halt_height));
        }
        if self.halt_time > 0 && time_ms / 1_000 >= self.halt_time {
            return Some(format!("halt time {} reached", self.halt_time));
        }
        None
    }
}
