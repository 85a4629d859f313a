//! Statechain client configuration.
//!
//! This crate provides per-network configuration for the wallet client:
//!
//! - [`ClientConfig`] -- endpoints and validation policy for a given network
//! - [`constants`] -- protocol-level defaults (confirmation target,
//!   fee tolerance, polling intervals)
//!
//! `config` depends only on [`sdk_core::Network`]. It does **not** depend
//! on transport, crypto, or any runtime crate, so it can be used freely
//! as a leaf dependency.

pub mod constants;

use sdk_core::Network;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CONFIRMATION_TARGET, DEFAULT_FEE_RATE_TOLERANCE_PERCENT, DEFAULT_MAX_FEE_RATE,
};

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Configuration for one wallet client session.
///
/// Endpoints identify the two external services the client talks to: the
/// statechain entity (protocol server) and an esplora-compatible chain
/// data source. The policy knobs govern local validation only; the
/// entity never sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The network this configuration is for.
    pub network: Network,

    /// Base URL of the statechain entity, e.g. `http://127.0.0.1:8000`.
    pub entity_endpoint: String,

    /// Base URL of the esplora API, e.g. `https://mempool.space/signet/api`.
    pub esplora_endpoint: String,

    /// Confirmations required before a deposit (canonical or duplicate)
    /// counts as CONFIRMED.
    pub confirmation_target: u32,

    /// Maximum deviation, in percent, tolerated between a backup
    /// transaction's implied fee rate and the current network fee rate.
    pub fee_rate_tolerance: u32,

    /// Upper bound on the fee rate (sats/vB) used when building
    /// transactions, regardless of what the network reports.
    pub max_fee_rate: u64,
}

impl ClientConfig {
    /// Builds a configuration with default policy values for `network`.
    pub fn new(
        network: Network,
        entity_endpoint: impl Into<String>,
        esplora_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            network,
            entity_endpoint: entity_endpoint.into(),
            esplora_endpoint: esplora_endpoint.into(),
            confirmation_target: DEFAULT_CONFIRMATION_TARGET,
            fee_rate_tolerance: DEFAULT_FEE_RATE_TOLERANCE_PERCENT,
            max_fee_rate: DEFAULT_MAX_FEE_RATE,
        }
    }

    /// Default signet configuration against the public mempool.space API.
    pub fn signet(entity_endpoint: impl Into<String>) -> Self {
        Self::new(
            Network::Signet,
            entity_endpoint,
            "https://mempool.space/signet/api",
        )
    }

    /// Local regtest configuration (entity and esplora on localhost).
    pub fn regtest() -> Self {
        Self::new(
            Network::Regtest,
            "http://127.0.0.1:8000",
            "http://127.0.0.1:3000",
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_policy_defaults() {
        let config = ClientConfig::new(Network::Regtest, "http://e", "http://c");
        assert_eq!(config.confirmation_target, DEFAULT_CONFIRMATION_TARGET);
        assert_eq!(
            config.fee_rate_tolerance,
            DEFAULT_FEE_RATE_TOLERANCE_PERCENT
        );
        assert_eq!(config.max_fee_rate, DEFAULT_MAX_FEE_RATE);
    }

    #[test]
    fn signet_points_at_mempool_space() {
        let config = ClientConfig::signet("http://entity");
        assert_eq!(config.network, Network::Signet);
        assert!(config.esplora_endpoint.contains("mempool.space/signet"));
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = ClientConfig::regtest();
        let json = serde_json::to_string(&config).unwrap();
        let back: ClientConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, back);
    }
}
