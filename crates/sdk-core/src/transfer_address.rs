//! Transfer address encoding and decoding.
//!
//! A transfer address is the off-chain destination of a statecoin. It
//! encodes two compressed secp256k1 public keys with Bech32m:
//!
//! - the recipient's **user public key** (their future share of the
//!   aggregated key), and
//! - the recipient's **authentication public key** (used to fetch and
//!   decrypt transfer messages from the statechain entity).
//!
//! # Format
//!
//! - A human-readable part (HRP) that identifies the network
//! - A separator (`1`)
//! - The Bech32m-encoded 66-byte payload (user pubkey || auth pubkey)
//! - A 6-character checksum
//!
//! | Network  | HRP    |
//! |----------|--------|
//! | Mainnet  | `sc`   |
//! | Testnet  | `sct`  |
//! | Signet   | `scs`  |
//! | Regtest  | `scrt` |

use std::fmt;
use std::str::FromStr;

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32m, Hrp};

use crate::Network;

/// Length of a compressed secp256k1 public key.
const PUBKEY_LEN: usize = 33;

/// Payload size: user pubkey followed by auth pubkey.
const PAYLOAD_LEN: usize = 2 * PUBKEY_LEN;

/// Human-readable part for mainnet transfer addresses.
pub const HRP_MAINNET: &str = "sc";

/// Human-readable part for testnet transfer addresses.
pub const HRP_TESTNET: &str = "sct";

/// Human-readable part for signet transfer addresses.
pub const HRP_SIGNET: &str = "scs";

/// Human-readable part for regtest transfer addresses.
pub const HRP_REGTEST: &str = "scrt";

fn hrp_for(network: Network) -> Hrp {
    let hrp = match network {
        Network::Mainnet => HRP_MAINNET,
        Network::Testnet => HRP_TESTNET,
        Network::Signet => HRP_SIGNET,
        Network::Regtest => HRP_REGTEST,
    };
    Hrp::parse_unchecked(hrp)
}

fn network_for(hrp: &str) -> Option<Network> {
    match hrp {
        HRP_MAINNET => Some(Network::Mainnet),
        HRP_TESTNET => Some(Network::Testnet),
        HRP_SIGNET => Some(Network::Signet),
        HRP_REGTEST => Some(Network::Regtest),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// TransferAddress
// ---------------------------------------------------------------------------

/// A transfer address containing a network and the recipient's key pair
/// of public keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransferAddress {
    network: Network,
    user_pubkey: [u8; PUBKEY_LEN],
    auth_pubkey: [u8; PUBKEY_LEN],
}

impl TransferAddress {
    /// Creates a transfer address from raw key bytes.
    pub fn new(
        network: Network,
        user_pubkey: [u8; PUBKEY_LEN],
        auth_pubkey: [u8; PUBKEY_LEN],
    ) -> Self {
        Self {
            network,
            user_pubkey,
            auth_pubkey,
        }
    }

    /// Returns the network this address belongs to.
    pub fn network(&self) -> Network {
        self.network
    }

    /// Returns the recipient's user public key.
    pub fn user_pubkey(&self) -> &[u8; PUBKEY_LEN] {
        &self.user_pubkey
    }

    /// Returns the recipient's authentication public key.
    pub fn auth_pubkey(&self) -> &[u8; PUBKEY_LEN] {
        &self.auth_pubkey
    }

    /// Returns the user public key as a lowercase hex string.
    pub fn user_pubkey_hex(&self) -> String {
        hex::encode(self.user_pubkey)
    }

    /// Returns the authentication public key as a lowercase hex string.
    pub fn auth_pubkey_hex(&self) -> String {
        hex::encode(self.auth_pubkey)
    }

    /// Encodes the address as a Bech32m string.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parses a Bech32m transfer address string.
    pub fn parse(s: &str) -> Result<Self, TransferAddressError> {
        let checked = CheckedHrpstring::new::<Bech32m>(s)
            .map_err(|_| TransferAddressError::InvalidBech32)?;

        let network = network_for(checked.hrp().as_str())
            .ok_or(TransferAddressError::UnknownHrp)?;

        let payload: Vec<u8> = checked.byte_iter().collect();
        if payload.len() != PAYLOAD_LEN {
            return Err(TransferAddressError::InvalidPayloadLength(payload.len()));
        }

        let mut user_pubkey = [0u8; PUBKEY_LEN];
        let mut auth_pubkey = [0u8; PUBKEY_LEN];
        user_pubkey.copy_from_slice(&payload[..PUBKEY_LEN]);
        auth_pubkey.copy_from_slice(&payload[PUBKEY_LEN..]);

        Ok(Self {
            network,
            user_pubkey,
            auth_pubkey,
        })
    }
}

impl fmt::Display for TransferAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[..PUBKEY_LEN].copy_from_slice(&self.user_pubkey);
        payload[PUBKEY_LEN..].copy_from_slice(&self.auth_pubkey);

        let encoded = bech32::encode::<Bech32m>(hrp_for(self.network), &payload)
            .map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl FromStr for TransferAddress {
    type Err = TransferAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors from transfer address parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferAddressError {
    /// The string is not valid Bech32m.
    InvalidBech32,

    /// The HRP does not match any known network.
    UnknownHrp,

    /// The payload is not exactly two compressed public keys.
    InvalidPayloadLength(usize),
}

impl fmt::Display for TransferAddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBech32 => write!(f, "invalid bech32m string"),
            Self::UnknownHrp => write!(f, "unknown address prefix"),
            Self::InvalidPayloadLength(len) => {
                write!(f, "invalid payload length {len}, expected {PAYLOAD_LEN}")
            }
        }
    }
}

impl std::error::Error for TransferAddressError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(tag: u8) -> [u8; 33] {
        let mut key = [0u8; 33];
        key[0] = 0x02;
        key[32] = tag;
        key
    }

    #[test]
    fn encode_parse_round_trip() {
        for network in [
            Network::Mainnet,
            Network::Testnet,
            Network::Signet,
            Network::Regtest,
        ] {
            let addr = TransferAddress::new(network, test_key(1), test_key(2));
            let encoded = addr.encode();
            let parsed = TransferAddress::parse(&encoded).unwrap();
            assert_eq!(parsed, addr);
        }
    }

    #[test]
    fn mainnet_address_uses_sc_prefix() {
        let addr = TransferAddress::new(Network::Mainnet, test_key(1), test_key(2));
        assert!(addr.encode().starts_with("sc1"));
    }

    #[test]
    fn parse_rejects_unknown_hrp() {
        let payload = [0u8; 66];
        let s = bech32::encode::<Bech32m>(Hrp::parse_unchecked("xyz"), &payload).unwrap();
        assert_eq!(
            TransferAddress::parse(&s),
            Err(TransferAddressError::UnknownHrp)
        );
    }

    #[test]
    fn parse_rejects_short_payload() {
        let payload = [0u8; 33];
        let s = bech32::encode::<Bech32m>(Hrp::parse_unchecked(HRP_MAINNET), &payload).unwrap();
        assert_eq!(
            TransferAddress::parse(&s),
            Err(TransferAddressError::InvalidPayloadLength(33))
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(TransferAddress::parse("not-an-address").is_err());
    }

    #[test]
    fn pubkey_hex_is_lowercase() {
        let addr = TransferAddress::new(Network::Regtest, test_key(0xAB), test_key(0xCD));
        assert!(addr.user_pubkey_hex().ends_with("ab"));
        assert!(addr.auth_pubkey_hex().ends_with("cd"));
    }
}
