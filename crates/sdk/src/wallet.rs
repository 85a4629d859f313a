//! Wallet aggregate: coins, tokens, activities, and the coin lifecycle.
//!
//! The wallet is a whole-unit aggregate: operations load it from the
//! store, mutate the in-memory copy, and write it back once. Coins are
//! never deleted; they only move forward through the lifecycle, with the
//! history captured by append-only [`Activity`] records.
//!
//! # Coin lifecycle
//!
//! ```text
//! INITIALISED -> IN_MEMPOOL -> CONFIRMED -> { IN_TRANSFER, DUPLICATED, WITHDRAWING }
//! IN_TRANSFER -> { TRANSFERRED, DUPLICATED }
//! DUPLICATED  -> { IN_TRANSFER, INVALIDATED, WITHDRAWING }
//! WITHDRAWING -> WITHDRAWN
//! ```
//!
//! INITIALISED may also jump straight to CONFIRMED or IN_TRANSFER when an
//! update first observes a coin already past the intermediate state.
//! TRANSFERRED, WITHDRAWN and INVALIDATED are terminal. Every status
//! change goes through [`Coin::transition`].

use std::fmt;

use chrono::{DateTime, Utc};
use sdk_core::Network;
use serde::{Deserialize, Serialize};

use crate::error::ClientError;

// ---------------------------------------------------------------------------
// Coin status
// ---------------------------------------------------------------------------

/// Lifecycle status of a coin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoinStatus {
    /// Key material exists; no funding observed yet.
    Initialised,
    /// Funding transaction seen, not yet at the confirmation target.
    InMempool,
    /// Funding confirmed; the coin can be sent or withdrawn.
    Confirmed,
    /// A transfer involving this coin is in flight.
    InTransfer,
    /// An extra physical deposit sharing a statechain identity.
    Duplicated,
    /// A withdrawal transaction has been broadcast.
    Withdrawing,
    /// Ownership handed to another party. Terminal.
    Transferred,
    /// Withdrawal confirmed on-chain. Terminal.
    Withdrawn,
    /// Superseded by a sibling that transferred without it. Terminal.
    Invalidated,
}

impl CoinStatus {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Transferred | Self::Withdrawn | Self::Invalidated)
    }

    /// Whether the update pass leaves this status alone.
    pub fn is_stable(self) -> bool {
        self.is_terminal()
    }

    fn allows(self, to: CoinStatus) -> bool {
        use CoinStatus::*;
        matches!(
            (self, to),
            (Initialised, InMempool)
                | (Initialised, Confirmed)
                | (Initialised, InTransfer)
                | (InMempool, Confirmed)
                | (Confirmed, InTransfer)
                | (Confirmed, Duplicated)
                | (Confirmed, Withdrawing)
                | (InTransfer, Transferred)
                | (InTransfer, Duplicated)
                | (Duplicated, InTransfer)
                | (Duplicated, Invalidated)
                | (Duplicated, Withdrawing)
                | (Withdrawing, Withdrawn)
        )
    }
}

impl fmt::Display for CoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initialised => "INITIALISED",
            Self::InMempool => "IN_MEMPOOL",
            Self::Confirmed => "CONFIRMED",
            Self::InTransfer => "IN_TRANSFER",
            Self::Duplicated => "DUPLICATED",
            Self::Withdrawing => "WITHDRAWING",
            Self::Transferred => "TRANSFERRED",
            Self::Withdrawn => "WITHDRAWN",
            Self::Invalidated => "INVALIDATED",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Coin
// ---------------------------------------------------------------------------

/// One statecoin tracked by the wallet.
///
/// Key material is hex, opaque to this crate. Fields that only exist
/// from a certain lifecycle point on are `Option` and documented with
/// the status that populates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Coin {
    /// Key derivation index within the wallet.
    pub index: u32,
    /// User share of the aggregated key (secret), hex.
    pub user_privkey: String,
    /// User share of the aggregated key (public), hex.
    pub user_pubkey: String,
    /// Entity authentication key (secret), hex.
    pub auth_privkey: String,
    /// Entity authentication key (public), hex.
    pub auth_pubkey: String,
    /// The coin's own bech32m transfer address.
    pub address: String,
    /// Server-assigned identity. Set by deposit init or receive.
    pub statechain_id: Option<String>,
    /// Statechain id signed with the auth key, hex.
    pub signed_statechain_id: Option<String>,
    /// Server share of the aggregated key, hex.
    pub server_pubkey: Option<String>,
    /// Aggregated output key, hex.
    pub aggregated_pubkey: Option<String>,
    /// Taproot address of the aggregated key (the deposit address).
    pub aggregated_address: Option<String>,
    /// Value in satoshis. Registered at deposit, observed at receive.
    pub amount: Option<u64>,
    /// Funding transaction id. Set once the funding output is observed.
    pub utxo_txid: Option<String>,
    /// Funding output index.
    pub utxo_vout: Option<u32>,
    /// Height at which the latest backup transaction becomes spendable.
    pub locktime: Option<u32>,
    /// Lifecycle status.
    pub status: CoinStatus,
    /// 0 for the canonical coin of a statechain id, >0 for extra deposits.
    pub duplicate_index: u32,
    /// Withdrawal transaction id. Set while WITHDRAWING.
    pub withdrawal_txid: Option<String>,
}

impl Coin {
    /// Creates a fresh INITIALISED coin from generated key material.
    pub fn new(index: u32, keys: &signer::CoinKeys) -> Self {
        Self {
            index,
            user_privkey: keys.user_privkey.clone(),
            user_pubkey: keys.user_pubkey.clone(),
            auth_privkey: keys.auth_privkey.clone(),
            auth_pubkey: keys.auth_pubkey.clone(),
            address: keys.address.clone(),
            statechain_id: None,
            signed_statechain_id: None,
            server_pubkey: None,
            aggregated_pubkey: None,
            aggregated_address: None,
            amount: None,
            utxo_txid: None,
            utxo_vout: None,
            locktime: None,
            status: CoinStatus::Initialised,
            duplicate_index: 0,
            withdrawal_txid: None,
        }
    }

    /// Moves the coin to `to`, rejecting transitions the lifecycle does
    /// not permit. A no-op when the coin is already in `to`.
    pub fn transition(&mut self, to: CoinStatus) -> Result<(), ClientError> {
        if self.status == to {
            return Ok(());
        }
        if !self.status.allows(to) {
            return Err(ClientError::InvalidStatusTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// The funding outpoint as `txid:vout`, when known.
    pub fn outpoint(&self) -> Option<(String, u32)> {
        match (&self.utxo_txid, self.utxo_vout) {
            (Some(txid), Some(vout)) => Some((txid.clone(), vout)),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Token and activity
// ---------------------------------------------------------------------------

pub use transport::entity::Token;

/// What an activity record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityKind {
    /// A coin arrived via transfer receive or deposit confirmation.
    Receive,
    /// A coin was handed to another party.
    Transfer,
    /// A coin was withdrawn on-chain.
    Withdraw,
}

/// Append-only audit record. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    /// Funding outpoint the action concerned, as `txid:vout`.
    pub utxo: String,
    /// Value in satoshis.
    pub amount: u64,
    /// What happened.
    pub action: ActivityKind,
    /// When it happened.
    pub date: DateTime<Utc>,
}

impl Activity {
    /// Creates a record stamped with the current time.
    pub fn now(utxo: impl Into<String>, amount: u64, action: ActivityKind) -> Self {
        Self {
            utxo: utxo.into(),
            amount,
            action,
            date: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// The persisted wallet aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique store key.
    pub name: String,
    /// Network all coins of this wallet live on.
    pub network: Network,
    /// Tracked coins, in the deterministic order of [`sort_coins_by_statechain`].
    pub coins: Vec<Coin>,
    /// Audit log, append-only.
    pub activities: Vec<Activity>,
    /// Deposit tokens, each consumed at most once.
    pub tokens: Vec<Token>,
}

impl Wallet {
    /// Creates an empty wallet.
    pub fn new(name: impl Into<String>, network: Network) -> Self {
        Self {
            name: name.into(),
            network,
            coins: Vec::new(),
            activities: Vec::new(),
            tokens: Vec::new(),
        }
    }

    /// All coins carrying the given statechain id.
    pub fn coins_for_statechain(&self, statechain_id: &str) -> Vec<&Coin> {
        self.coins
            .iter()
            .filter(|c| c.statechain_id.as_deref() == Some(statechain_id))
            .collect()
    }

}

/// Reorders coins deterministically: coins sharing a statechain id stay
/// grouped at that id's first appearance, sorted by duplicate index
/// inside the group; coins without a statechain id sort after all
/// others, also by duplicate index.
pub fn sort_coins_by_statechain(coins: &mut [Coin]) {
    let mut order: Vec<String> = Vec::new();
    for coin in coins.iter() {
        if let Some(id) = &coin.statechain_id {
            if !order.iter().any(|o| o == id) {
                order.push(id.clone());
            }
        }
    }
    coins.sort_by_key(|coin| {
        let group = match &coin.statechain_id {
            Some(id) => order.iter().position(|o| o == id).unwrap_or(order.len()),
            None => order.len(),
        };
        (group, coin.duplicate_index)
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(statechain_id: Option<&str>, duplicate_index: u32) -> Coin {
        let keys = signer::CoinKeys {
            user_privkey: "01".into(),
            user_pubkey: "02".into(),
            auth_privkey: "03".into(),
            auth_pubkey: "04".into(),
            address: "sc1".into(),
        };
        let mut c = Coin::new(0, &keys);
        c.statechain_id = statechain_id.map(str::to_owned);
        c.duplicate_index = duplicate_index;
        c
    }

    #[test]
    fn lifecycle_accepts_forward_path() {
        let mut c = coin(Some("a"), 0);
        c.transition(CoinStatus::InMempool).unwrap();
        c.transition(CoinStatus::Confirmed).unwrap();
        c.transition(CoinStatus::InTransfer).unwrap();
        c.transition(CoinStatus::Transferred).unwrap();
    }

    #[test]
    fn terminal_states_never_revert() {
        let mut c = coin(Some("a"), 0);
        c.status = CoinStatus::Transferred;
        let err = c.transition(CoinStatus::Confirmed).unwrap_err();
        assert!(matches!(
            err,
            ClientError::InvalidStatusTransition {
                from: CoinStatus::Transferred,
                to: CoinStatus::Confirmed,
            }
        ));
    }

    #[test]
    fn duplicated_can_rejoin_transfer_flow() {
        let mut c = coin(Some("a"), 1);
        c.status = CoinStatus::Duplicated;
        c.transition(CoinStatus::InTransfer).unwrap();
    }

    #[test]
    fn confirmed_cannot_jump_to_withdrawn() {
        let mut c = coin(Some("a"), 0);
        c.status = CoinStatus::Confirmed;
        assert!(c.transition(CoinStatus::Withdrawn).is_err());
    }

    #[test]
    fn transition_to_same_status_is_noop() {
        let mut c = coin(Some("a"), 0);
        c.status = CoinStatus::Confirmed;
        c.transition(CoinStatus::Confirmed).unwrap();
        assert_eq!(c.status, CoinStatus::Confirmed);
    }

    #[test]
    fn sort_groups_by_first_appearance_then_duplicate_index() {
        let mut coins = vec![
            coin(Some("b"), 1),
            coin(Some("a"), 2),
            coin(None, 0),
            coin(Some("b"), 0),
            coin(Some("a"), 0),
        ];
        sort_coins_by_statechain(&mut coins);
        let key: Vec<(Option<&str>, u32)> = coins
            .iter()
            .map(|c| (c.statechain_id.as_deref(), c.duplicate_index))
            .collect();
        assert_eq!(
            key,
            vec![
                (Some("b"), 0),
                (Some("b"), 1),
                (Some("a"), 0),
                (Some("a"), 2),
                (None, 0),
            ]
        );
    }

    #[test]
    fn coins_without_statechain_sort_last() {
        let mut coins = vec![coin(None, 1), coin(Some("x"), 0), coin(None, 0)];
        sort_coins_by_statechain(&mut coins);
        assert_eq!(coins[0].statechain_id.as_deref(), Some("x"));
        assert_eq!(coins[1].duplicate_index, 0);
        assert_eq!(coins[2].duplicate_index, 1);
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&CoinStatus::InMempool).unwrap();
        assert_eq!(json, "\"IN_MEMPOOL\"");
        let back: CoinStatus = serde_json::from_str("\"IN_TRANSFER\"").unwrap();
        assert_eq!(back, CoinStatus::InTransfer);
    }
}
