//! Duplicate coin resolution.
//!
//! A statechain id maps to more than one physical deposit when extra
//! funds land on an already-used aggregated address. Each extra exit
//! chain (group index > 0) becomes a duplicate candidate; folding a
//! candidate into the wallet creates a DUPLICATED coin sharing the
//! canonical coin's key material with the next free duplicate index.

use crate::chain;
use crate::error::ClientError;
use crate::wallet::{Coin, CoinStatus, Wallet};
use transport::entity::BackupTx;

/// An extra deposit discovered in a transfer message or on-chain scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateCandidate {
    /// Funding transaction id of the extra deposit.
    pub utxo_txid: String,
    /// Funding output index.
    pub utxo_vout: u32,
    /// Value of the extra deposit in satoshis.
    pub amount: u64,
}

/// Extracts a duplicate candidate from the exit chain at `group_index`.
///
/// Index 0 is the canonical chain and must already be tracked; treating
/// it as a duplicate is a protocol violation and fatal.
pub fn candidate_from_chain(
    group_index: usize,
    exit_chain: &[BackupTx],
    funding_value: u64,
) -> Result<DuplicateCandidate, ClientError> {
    if group_index == 0 {
        return Err(ClientError::DuplicateIndexZero);
    }
    let (utxo_txid, utxo_vout) = chain::funding_outpoint(exit_chain)?;
    Ok(DuplicateCandidate {
        utxo_txid,
        utxo_vout,
        amount: funding_value,
    })
}

/// The next duplicate index within `base`'s generation.
///
/// A generation is the set of coins holding the statechain under one
/// owner key. A statechain that round-trips through the same wallet
/// (self-send, or receive on a reused address) leaves earlier
/// generations behind as IN_TRANSFER or terminal coins; their indexes
/// must not shift the numbering of the generation being built.
pub fn next_generation_index(wallet: &Wallet, base: &Coin) -> u32 {
    wallet
        .coins
        .iter()
        .filter(|c| {
            c.statechain_id == base.statechain_id
                && c.user_pubkey == base.user_pubkey
                && !c.status.is_terminal()
        })
        .map(|c| c.duplicate_index)
        .max()
        .map(|m| m + 1)
        .unwrap_or(0)
}

/// Folds a candidate into the wallet as a DUPLICATED coin cloned from
/// `base`, at exactly the next free index of `base`'s generation.
/// `expected_index` is the caller's slot for the candidate; a gap
/// between it and the generation's next index is rejected rather than
/// silently renumbered.
pub fn fold_candidate(
    wallet: &mut Wallet,
    base: &Coin,
    candidate: DuplicateCandidate,
    expected_index: u32,
) -> Result<(), ClientError> {
    if base.statechain_id.is_none() {
        return Err(ClientError::InvalidTransaction(
            "duplicate base coin has no statechain id".into(),
        ));
    }
    let next = next_generation_index(wallet, base);
    if expected_index != next {
        return Err(ClientError::NonContiguousDuplicateIndex {
            expected: next,
            found: expected_index,
        });
    }
    let mut coin = base.clone();
    coin.duplicate_index = next;
    coin.status = CoinStatus::Duplicated;
    coin.amount = Some(candidate.amount);
    coin.utxo_txid = Some(candidate.utxo_txid);
    coin.utxo_vout = Some(candidate.utxo_vout);
    coin.locktime = None;
    coin.withdrawal_txid = None;
    wallet.coins.push(coin);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::tests::make_tx;
    use bitcoin::ScriptBuf;
    use sdk_core::Network;

    fn record(prev_byte: u8) -> BackupTx {
        BackupTx {
            tx_n: 1,
            tx: make_tx(prev_byte, 0, 2_000, 1_000, ScriptBuf::new()),
            client_public_nonce: "aa".into(),
            server_public_nonce: "bb".into(),
            client_public_key: "cc".into(),
            server_public_key: "dd".into(),
            blinding_factor: "ee".into(),
        }
    }

    fn base_coin() -> Coin {
        let keys = signer::CoinKeys {
            user_privkey: "01".into(),
            user_pubkey: "02".into(),
            auth_privkey: "03".into(),
            auth_pubkey: "04".into(),
            address: "sc1".into(),
        };
        let mut c = Coin::new(0, &keys);
        c.statechain_id = Some("sc-id".into());
        c.status = CoinStatus::Confirmed;
        c
    }

    #[test]
    fn group_index_zero_is_fatal() {
        let err = candidate_from_chain(0, &[record(0x01)], 2_000).unwrap_err();
        assert!(matches!(err, ClientError::DuplicateIndexZero));
    }

    #[test]
    fn candidate_carries_funding_outpoint() {
        let c = candidate_from_chain(1, &[record(0x07)], 2_000).unwrap();
        assert_eq!(c.utxo_vout, 0);
        assert_eq!(c.amount, 2_000);
    }

    #[test]
    fn fold_assigns_contiguous_index() {
        let mut wallet = Wallet::new("w", Network::Regtest);
        let base = base_coin();
        wallet.coins.push(base.clone());
        let candidate = candidate_from_chain(1, &[record(0x07)], 2_000).unwrap();
        fold_candidate(&mut wallet, &base, candidate, 1).unwrap();
        let dup = &wallet.coins[1];
        assert_eq!(dup.duplicate_index, 1);
        assert_eq!(dup.status, CoinStatus::Duplicated);
        assert_eq!(dup.user_pubkey, base.user_pubkey);
    }

    #[test]
    fn generation_index_ignores_other_owners_of_the_statechain() {
        let mut wallet = Wallet::new("w", Network::Regtest);
        // Previous generation: same statechain, different owner key,
        // still in flight.
        let mut old = base_coin();
        old.user_pubkey = "0f".into();
        old.status = CoinStatus::InTransfer;
        let mut old_dup = old.clone();
        old_dup.duplicate_index = 1;
        old_dup.status = CoinStatus::InTransfer;
        wallet.coins.push(old);
        wallet.coins.push(old_dup);

        let base = base_coin();
        wallet.coins.push(base.clone());
        assert_eq!(next_generation_index(&wallet, &base), 1);
        let candidate = candidate_from_chain(1, &[record(0x07)], 2_000).unwrap();
        fold_candidate(&mut wallet, &base, candidate, 1).unwrap();
    }

    #[test]
    fn generation_index_ignores_terminal_siblings() {
        let mut wallet = Wallet::new("w", Network::Regtest);
        let mut spent = base_coin();
        spent.duplicate_index = 1;
        spent.status = CoinStatus::Transferred;
        wallet.coins.push(spent);

        let base = base_coin();
        wallet.coins.push(base.clone());
        assert_eq!(next_generation_index(&wallet, &base), 1);
    }

    #[test]
    fn fold_rejects_gapped_index() {
        let mut wallet = Wallet::new("w", Network::Regtest);
        let base = base_coin();
        wallet.coins.push(base.clone());
        let candidate = candidate_from_chain(2, &[record(0x07)], 2_000).unwrap();
        let err = fold_candidate(&mut wallet, &base, candidate, 2).unwrap_err();
        assert!(matches!(
            err,
            ClientError::NonContiguousDuplicateIndex {
                expected: 1,
                found: 2,
            }
        ));
    }
}
