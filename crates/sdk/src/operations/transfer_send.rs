//! Transfer send engine.
//!
//! Hands a statechain to a recipient's transfer address by extending
//! every contributing coin's exit chain with one hop paying the
//! recipient, then submitting the signed update to the entity. No local
//! state changes until the entity has accepted the update.

use std::str::FromStr;

use sdk_core::TransferAddress;
use signer::CoinSigner;
use storage::StorageError;
use tracing::info;
use transport::entity::{BackupTx, TransferSenderPayload, TransferUpdateMsgPayload};
use transport::{ChainClient, EntityClient};

use crate::error::ClientError;
use crate::operations::{build_backup_record, meets_confirmation_target, pick_fee_rate};
use crate::wallet::{Activity, ActivityKind, Coin, CoinStatus};
use crate::wallet_store::{save_backup_txs, WalletStore};
use crate::{chain, tx, SdkInner};

/// Parameters of one send.
#[derive(Debug, Clone)]
pub struct TransferSendRequest {
    /// The statechain to hand over.
    pub statechain_id: String,
    /// The recipient's bech32m transfer address.
    pub to_address: String,
    /// Duplicate indexes (> 0) to include alongside the canonical coin.
    /// Gaps in the selection are allowed; unselected duplicates are left
    /// behind and invalidated once the transfer completes.
    pub duplicated_indexes: Vec<u32>,
    /// Required whenever the statechain has DUPLICATED coins, selected
    /// or not. Guards against silently abandoning duplicate funds.
    pub force_send: bool,
    /// Batch id for atomic grouping, from the recipient.
    pub batch_id: Option<String>,
}

impl TransferSendRequest {
    /// A plain send of the canonical coin only.
    pub fn new(statechain_id: impl Into<String>, to_address: impl Into<String>) -> Self {
        Self {
            statechain_id: statechain_id.into(),
            to_address: to_address.into(),
            duplicated_indexes: Vec::new(),
            force_send: false,
            batch_id: None,
        }
    }
}

/// Picks the coin entitled to initiate the transfer: duplicate index 0,
/// status CONFIRMED or IN_TRANSFER. A self-send leaves two candidates;
/// the one further along its chain (lower locktime) wins.
fn select_canonical(coins: &[Coin], statechain_id: &str) -> Result<usize, ClientError> {
    let mut best: Option<usize> = None;
    for (i, coin) in coins.iter().enumerate() {
        if coin.statechain_id.as_deref() != Some(statechain_id)
            || coin.duplicate_index != 0
            || !matches!(coin.status, CoinStatus::Confirmed | CoinStatus::InTransfer)
        {
            continue;
        }
        best = match best {
            None => Some(i),
            Some(j) => {
                let lt_i = coins[i].locktime.unwrap_or(u32::MAX);
                let lt_j = coins[j].locktime.unwrap_or(u32::MAX);
                Some(if lt_i < lt_j { i } else { j })
            }
        };
    }
    best.ok_or_else(|| ClientError::NoCanonicalCoin {
        statechain_id: statechain_id.to_owned(),
    })
}

/// The duplicate-fund guards that run before anything leaves the wallet.
fn check_duplicate_guards(
    coins: &[Coin],
    statechain_id: &str,
    force_send: bool,
) -> Result<(), ClientError> {
    for coin in coins {
        if coin.statechain_id.as_deref() != Some(statechain_id) {
            continue;
        }
        if coin.status == CoinStatus::Duplicated && !force_send {
            return Err(ClientError::DuplicatedNeedsForce {
                statechain_id: statechain_id.to_owned(),
            });
        }
        if coin.duplicate_index > 0
            && matches!(coin.status, CoinStatus::Withdrawing | CoinStatus::Withdrawn)
        {
            return Err(ClientError::DuplicateWithdrawn {
                index: coin.duplicate_index,
            });
        }
    }
    Ok(())
}

pub(crate) async fn transfer_send<E, C, W, S>(
    inner: &SdkInner<E, C, W, S>,
    wallet_name: &str,
    request: &TransferSendRequest,
) -> Result<Coin, ClientError>
where
    E: EntityClient,
    C: ChainClient,
    W: WalletStore,
    S: CoinSigner,
{
    let mut wallet = inner.store.load_wallet(wallet_name)?;
    let statechain_id = request.statechain_id.as_str();
    if wallet.coins_for_statechain(statechain_id).is_empty() {
        return Err(ClientError::CoinNotFound {
            statechain_id: statechain_id.to_owned(),
        });
    }

    check_duplicate_guards(&wallet.coins, statechain_id, request.force_send)?;
    let canonical_idx = select_canonical(&wallet.coins, statechain_id)?;

    // Resolve the explicitly selected duplicates.
    let mut duplicate_idxs: Vec<usize> = Vec::new();
    for &index in &request.duplicated_indexes {
        if index == 0 {
            return Err(ClientError::DuplicateIndexZero);
        }
        let pos = wallet
            .coins
            .iter()
            .position(|c| {
                c.statechain_id.as_deref() == Some(statechain_id)
                    && c.duplicate_index == index
                    && c.status == CoinStatus::Duplicated
            })
            .ok_or(ClientError::UnknownDuplicateIndex { index })?;
        duplicate_idxs.push(pos);
    }

    let recipient = TransferAddress::from_str(&request.to_address)?;
    let recipient_auth_key = recipient.auth_pubkey_hex();
    let recipient_user_key = recipient.user_pubkey_hex();

    let tip_height = inner.chain.tip_height().await?;
    let server = inner.entity.server_config().await?;
    let fee_rate = pick_fee_rate(inner, None).await?;
    let target = inner.config.confirmation_target;

    // A coin whose latest backup transaction is already spendable must
    // not be handed over.
    for &i in std::iter::once(&canonical_idx).chain(&duplicate_idxs) {
        if let Some(locktime) = wallet.coins[i].locktime {
            if locktime <= tip_height {
                return Err(ClientError::CoinExpired {
                    locktime,
                    tip_height,
                });
            }
        }
    }

    // Selected duplicates must be independently confirmed.
    for &i in &duplicate_idxs {
        let coin = &wallet.coins[i];
        let Some((txid, _)) = coin.outpoint() else {
            return Err(ClientError::DuplicateUnconfirmed {
                index: coin.duplicate_index,
            });
        };
        let status = inner.chain.tx_status(&txid).await?;
        if !meets_confirmation_target(&status, tip_height, target) {
            return Err(ClientError::DuplicateUnconfirmed {
                index: coin.duplicate_index,
            });
        }
    }

    let canonical = wallet.coins[canonical_idx].clone();
    let auth_sig = canonical.signed_statechain_id.clone().ok_or_else(|| {
        ClientError::InvalidTransaction("coin has no signed statechain id".into())
    })?;
    let (canonical_txid, canonical_vout) = canonical
        .outpoint()
        .ok_or_else(|| ClientError::InvalidTransaction("coin has no funding outpoint".into()))?;

    let x1 = inner
        .entity
        .transfer_sender(&TransferSenderPayload {
            statechain_id: statechain_id.to_owned(),
            auth_sig: auth_sig.clone(),
            new_user_auth_key: recipient_auth_key,
            batch_id: request.batch_id.clone(),
        })
        .await?;

    let transfer_signature = inner.signer.create_transfer_signature(
        &request.to_address,
        &canonical_txid,
        canonical_vout,
        &canonical.user_privkey,
    )?;

    // Extend every contributing coin's chain with one hop paying the
    // recipient's backup key. Canonical first, duplicates after.
    let recipient_backup_address = inner
        .signer
        .key_address(&recipient_user_key, wallet.network)?;
    let stored = match inner.store.load_backup_txs(&wallet.name, statechain_id) {
        Ok(txs) => txs,
        Err(StorageError::NotFound(_)) => Vec::new(),
        Err(e) => return Err(e.into()),
    };
    let groups = chain::group(&stored)?;

    let mut extended: Vec<BackupTx> = Vec::new();
    let mut new_locktimes: Vec<(usize, u32)> = Vec::new();
    for &i in std::iter::once(&canonical_idx).chain(&duplicate_idxs) {
        let coin = wallet.coins[i].clone();
        let outpoint = coin.outpoint().ok_or_else(|| {
            ClientError::InvalidTransaction("coin has no funding outpoint".into())
        })?;
        let mut coin_chain: Vec<BackupTx> = groups
            .iter()
            .find(|g| chain::funding_outpoint(g).ok() == Some(outpoint.clone()))
            .cloned()
            .unwrap_or_default();
        if coin_chain.is_empty() {
            // A duplicate contributing for the first time gets its
            // initial backup transaction before the transfer hop.
            let own_backup = inner.signer.key_address(&coin.user_pubkey, wallet.network)?;
            let locktime = tip_height + server.initlock;
            let tx1 = build_backup_record(
                inner,
                &coin,
                wallet.network,
                &own_backup,
                locktime,
                fee_rate,
                false,
            )?;
            coin_chain.push(tx1);
        }
        let last = coin_chain
            .last()
            .ok_or_else(|| ClientError::InvalidTransaction("empty chain".into()))?;
        let last_locktime = tx::locktime(&last.tx)?;
        let hop_locktime = last_locktime.saturating_sub(server.interval);
        let hop = build_backup_record(
            inner,
            &coin,
            wallet.network,
            &recipient_backup_address,
            hop_locktime,
            fee_rate,
            false,
        )?;
        chain::extend(&mut coin_chain, hop);
        new_locktimes.push((i, hop_locktime));
        extended.extend(coin_chain);
    }

    let updated = inner
        .entity
        .transfer_update_msg(&TransferUpdateMsgPayload {
            statechain_id: statechain_id.to_owned(),
            auth_sig,
            new_x1: x1,
            recipient_address: request.to_address.clone(),
            transfer_signature,
            backup_transactions: extended.clone(),
        })
        .await?;
    if !updated {
        return Err(ClientError::UpdateMsgRejected);
    }

    // Entity accepted; now, and only now, touch local state.
    save_backup_txs(&inner.store, &wallet.name, statechain_id, &extended)?;
    for (i, locktime) in new_locktimes {
        wallet.coins[i].locktime = Some(locktime);
        wallet.coins[i].transition(CoinStatus::InTransfer)?;
    }
    let amount = canonical.amount.unwrap_or(0);
    wallet.activities.push(Activity::now(
        format!("{canonical_txid}:{canonical_vout}"),
        amount,
        ActivityKind::Transfer,
    ));
    inner.store.update_wallet(&wallet)?;

    info!(
        statechain_id,
        contributors = 1 + duplicate_idxs.len(),
        records = extended.len(),
        "transfer sent"
    );
    Ok(wallet.coins[canonical_idx].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(duplicate_index: u32, status: CoinStatus, locktime: Option<u32>) -> Coin {
        let keys = signer::CoinKeys {
            user_privkey: "01".into(),
            user_pubkey: "02".into(),
            auth_privkey: "03".into(),
            auth_pubkey: "04".into(),
            address: "sc1".into(),
        };
        let mut c = Coin::new(0, &keys);
        c.statechain_id = Some("sc-id".into());
        c.duplicate_index = duplicate_index;
        c.status = status;
        c.locktime = locktime;
        c
    }

    #[test]
    fn canonical_requires_index_zero_in_sendable_status() {
        let coins = vec![
            coin(1, CoinStatus::Confirmed, None),
            coin(0, CoinStatus::Initialised, None),
        ];
        assert!(matches!(
            select_canonical(&coins, "sc-id"),
            Err(ClientError::NoCanonicalCoin { .. })
        ));
    }

    #[test]
    fn self_send_picks_lower_locktime() {
        let coins = vec![
            coin(0, CoinStatus::Confirmed, Some(1_000)),
            coin(0, CoinStatus::InTransfer, Some(900)),
        ];
        assert_eq!(select_canonical(&coins, "sc-id").unwrap(), 1);
    }

    #[test]
    fn duplicated_coin_blocks_send_without_force() {
        let coins = vec![
            coin(0, CoinStatus::Confirmed, Some(1_000)),
            coin(1, CoinStatus::Duplicated, None),
        ];
        assert!(matches!(
            check_duplicate_guards(&coins, "sc-id", false),
            Err(ClientError::DuplicatedNeedsForce { .. })
        ));
        check_duplicate_guards(&coins, "sc-id", true).unwrap();
    }

    #[test]
    fn withdrawn_duplicate_blocks_send_even_with_force() {
        let coins = vec![
            coin(0, CoinStatus::Confirmed, Some(1_000)),
            coin(2, CoinStatus::Withdrawn, None),
        ];
        let err = check_duplicate_guards(&coins, "sc-id", true).unwrap_err();
        assert!(matches!(err, ClientError::DuplicateWithdrawn { index: 2 }));
    }
}
