//! Core types and utilities for the statechain client.
//!
//! This crate provides foundational types used across the wallet:
//!
//! - [`Network`] -- Bitcoin network identifier
//! - [`TransferAddress`] -- Bech32m-encoded transfer destination
//!   (user public key + authentication public key)

pub mod transfer_address;

pub use transfer_address::{TransferAddress, TransferAddressError};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

/// Bitcoin network identifier.
///
/// Determines the human-readable prefix (HRP) used in transfer addresses
/// and the encoding of on-chain aggregated addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Bitcoin mainnet.
    Mainnet,

    /// Bitcoin testnet3.
    Testnet,

    /// Bitcoin signet.
    Signet,

    /// Local regtest.
    Regtest,
}

impl Network {
    /// Converts to the `bitcoin` crate's network type.
    pub fn to_bitcoin(self) -> bitcoin::Network {
        match self {
            Network::Mainnet => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Signet => bitcoin::Network::Signet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Signet => "signet",
            Network::Regtest => "regtest",
        };
        f.write_str(s)
    }
}
