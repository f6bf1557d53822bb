//! Consensus parameters negotiated with the consensus engine.

use serde::{Deserialize, Serialize};

/// Default maximum block size in bytes (21 MiB).
pub const DEFAULT_MAX_BLOCK_BYTES: u64 = 22_020_096;

/// Parameters that bound block production and gate optional features.
///
/// Params are fixed for the duration of a height. They change only through
/// `InitChain` or through an update returned by block execution, which takes
/// effect at `Commit`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    /// Block size and gas limits.
    pub block: BlockParams,

    /// Height-activated features.
    pub feature: FeatureParams,

    /// Application protocol version.
    pub version: VersionParams,
}

/// Block-level resource limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockParams {
    /// Maximum total size of a block's transactions, in bytes.
    pub max_bytes: u64,

    /// Maximum total gas of a block's transactions (sum of gas limits).
    ///
    /// `None` means the block gas is unbounded.
    pub max_gas: Option<u64>,
}

impl Default for BlockParams {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BLOCK_BYTES,
            max_gas: None,
        }
    }
}

/// Feature activation heights.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// First height at which vote extensions are produced and verified.
    ///
    /// `None` (or `Some(0)`) keeps vote extensions disabled.
    pub vote_extensions_enable_height: Option<u64>,
}

/// Application version reported to the consensus engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionParams {
    /// Application protocol version.
    pub app: u64,
}

impl ConsensusParams {
    /// Set the block gas limit.
    pub fn with_max_gas(mut self, max_gas: u64) -> Self {
        self.block.max_gas = Some(max_gas);
        self
    }

    /// Set the block byte limit.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.block.max_bytes = max_bytes;
        self
    }

    /// Set the vote extension activation height.
    pub fn with_vote_extensions_enable_height(mut self, height: u64) -> Self {
        self.feature.vote_extensions_enable_height = Some(height);
        self
    }

    /// Block gas limit, if any.
    pub fn max_block_gas(&self) -> Option<u64> {
        self.block.max_gas
    }

    /// Whether vote extensions are active at `height`.
    pub fn vote_extensions_enabled(&self, height: u64) -> bool {
        match self.feature.vote_extensions_enable_height {
            Some(enable_height) if enable_height > 0 => height >= enable_height,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_extension_gating() {
        let params = ConsensusParams::default();
        assert!(!params.vote_extensions_enabled(100));

        let params = params.with_vote_extensions_enable_height(2);
        assert!(!params.vote_extensions_enabled(1));
        assert!(params.vote_extensions_enabled(2));
        assert!(params.vote_extensions_enabled(3));

        let disabled = ConsensusParams::default().with_vote_extensions_enable_height(0);
        assert!(!disabled.vote_extensions_enabled(5));
    }

    #[test]
    fn test_partial_params_deserialize_with_defaults() {
        let params: ConsensusParams =
            serde_json::from_str(r#"{ "block": { "max_gas": 300000 } }"#).unwrap();
        assert_eq!(params.max_block_gas(), Some(300_000));
        assert_eq!(params.block.max_bytes, DEFAULT_MAX_BLOCK_BYTES);
        assert_eq!(params.feature.vote_extensions_enable_height, None);
    }
}
