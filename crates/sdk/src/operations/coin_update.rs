//! The coin update pass.
//!
//! Refreshes every non-stable coin against the chain source and the
//! entity:
//! - INITIALISED deposit coins: detect the funding output on the
//!   aggregated address, build the first backup transaction, and
//!   materialize DUPLICATED coins for any extra deposits on the same
//!   address.
//! - IN_MEMPOOL: promote to CONFIRMED at the confirmation target.
//! - IN_TRANSFER: ask the entity whether the transfer completed; if so,
//!   the contributing coins become TRANSFERRED and left-behind
//!   DUPLICATED siblings become INVALIDATED.
//! - WITHDRAWING: detect withdrawal confirmation and close the
//!   statechain with the entity.
//!
//! All remote reads happen against an in-memory wallet copy; the store
//! sees a single write at the end.

use std::time::Duration;

use signer::CoinSigner;
use storage::StorageError;
use tracing::{debug, info, warn};
use transport::entity::WithdrawCompletePayload;
use transport::{ChainClient, EntityClient, Utxo};

use crate::duplicates::{self, DuplicateCandidate};
use crate::error::ClientError;
use crate::operations::{build_backup_record, meets_confirmation_target, pick_fee_rate};
use crate::wallet::{sort_coins_by_statechain, Coin, CoinStatus, Wallet};
use crate::wallet_store::{save_backup_txs, WalletStore};
use crate::SdkInner;

pub(crate) async fn update_coins<E, C, W, S>(
    inner: &SdkInner<E, C, W, S>,
    wallet_name: &str,
) -> Result<(), ClientError>
where
    E: EntityClient,
    C: ChainClient,
    W: WalletStore,
    S: CoinSigner,
{
    let mut wallet = inner.store.load_wallet(wallet_name)?;
    let tip_height = inner.chain.tip_height().await?;
    let target = inner.config.confirmation_target;

    let mut completed_transfers: Vec<String> = Vec::new();
    let mut pending_duplicates: Vec<(usize, DuplicateCandidate)> = Vec::new();

    for i in 0..wallet.coins.len() {
        let coin = wallet.coins[i].clone();
        match coin.status {
            CoinStatus::Initialised if coin.aggregated_address.is_some() => {
                scan_deposit(inner, &mut wallet, i, tip_height, &mut pending_duplicates).await?;
            }
            CoinStatus::InMempool => {
                let Some((txid, _)) = coin.outpoint() else {
                    continue;
                };
                let status = inner.chain.tx_status(&txid).await?;
                if meets_confirmation_target(&status, tip_height, target) {
                    wallet.coins[i].transition(CoinStatus::Confirmed)?;
                    info!(statechain_id = ?coin.statechain_id, "deposit confirmed");
                }
            }
            CoinStatus::InTransfer => {
                let Some(statechain_id) = coin.statechain_id.clone() else {
                    continue;
                };
                if completed_transfers.contains(&statechain_id) {
                    continue;
                }
                if inner.entity.transfer_complete(&statechain_id).await? {
                    completed_transfers.push(statechain_id);
                }
            }
            CoinStatus::Withdrawing => {
                settle_withdrawal(inner, &mut wallet.coins[i], tip_height, target).await?;
            }
            _ => {}
        }
    }

    // Contributing coins of a completed transfer are gone; duplicates
    // of the sent generation that stayed behind can never be sent
    // again. A self-send leaves the received generation (fresh owner
    // key) in the same wallet; its coins are untouched.
    for statechain_id in &completed_transfers {
        let sent_keys: Vec<String> = wallet
            .coins
            .iter()
            .filter(|c| {
                c.statechain_id.as_deref() == Some(statechain_id)
                    && c.status == CoinStatus::InTransfer
            })
            .map(|c| c.user_pubkey.clone())
            .collect();
        for coin in &mut wallet.coins {
            if coin.statechain_id.as_deref() != Some(statechain_id) {
                continue;
            }
            match coin.status {
                CoinStatus::InTransfer => coin.transition(CoinStatus::Transferred)?,
                CoinStatus::Duplicated if sent_keys.contains(&coin.user_pubkey) => {
                    coin.transition(CoinStatus::Invalidated)?
                }
                _ => {}
            }
        }
        info!(statechain_id, "transfer completed");
    }

    for (base_index, candidate) in pending_duplicates {
        let base = wallet.coins[base_index].clone();
        let Some(statechain_id) = base.statechain_id.clone() else {
            continue;
        };
        let expected = duplicates::next_generation_index(&wallet, &base);
        duplicates::fold_candidate(&mut wallet, &base, candidate, expected)?;
        debug!(statechain_id, index = expected, "duplicate deposit recorded");
    }

    sort_coins_by_statechain(&mut wallet.coins);
    inner.store.update_wallet(&wallet)?;
    Ok(())
}

/// Detects funding of an INITIALISED deposit coin and queues any extra
/// deposits on the same address as duplicate candidates.
async fn scan_deposit<E, C, W, S>(
    inner: &SdkInner<E, C, W, S>,
    wallet: &mut Wallet,
    coin_index: usize,
    tip_height: u32,
    pending_duplicates: &mut Vec<(usize, DuplicateCandidate)>,
) -> Result<(), ClientError>
where
    E: EntityClient,
    C: ChainClient,
    W: WalletStore,
    S: CoinSigner,
{
    let coin = wallet.coins[coin_index].clone();
    let Some(address) = coin.aggregated_address.clone() else {
        return Ok(());
    };
    let utxos = inner.chain.address_utxos(&address).await?;
    if utxos.is_empty() {
        return Ok(());
    }

    let known: Vec<(String, u32)> = wallet.coins.iter().filter_map(Coin::outpoint).collect();
    let queued_before = pending_duplicates.len();
    let mut canonical_match: Option<&Utxo> = None;
    for utxo in &utxos {
        let outpoint = (utxo.txid.clone(), utxo.vout);
        if known.contains(&outpoint) {
            continue;
        }
        if canonical_match.is_none() && Some(utxo.value) == coin.amount {
            canonical_match = Some(utxo);
            continue;
        }
        pending_duplicates.push((
            coin_index,
            DuplicateCandidate {
                utxo_txid: utxo.txid.clone(),
                utxo_vout: utxo.vout,
                amount: utxo.value,
            },
        ));
    }

    let Some(utxo) = canonical_match else {
        if pending_duplicates.len() > queued_before {
            warn!(address, "deposit address funded without a matching amount");
        }
        return Ok(());
    };

    let target = inner.config.confirmation_target;
    let confirmed = meets_confirmation_target(&utxo.status, tip_height, target);
    {
        let coin = &mut wallet.coins[coin_index];
        coin.utxo_txid = Some(utxo.txid.clone());
        coin.utxo_vout = Some(utxo.vout);
        coin.transition(if confirmed {
            CoinStatus::Confirmed
        } else {
            CoinStatus::InMempool
        })?;
    }
    info!(
        statechain_id = ?wallet.coins[coin_index].statechain_id,
        txid = %utxo.txid,
        confirmed,
        "deposit funding observed"
    );

    // First backup transaction: pays the owner's own key, locked until
    // tip + initlock.
    let statechain_id = wallet.coins[coin_index]
        .statechain_id
        .clone()
        .unwrap_or_default();
    let needs_chain = match inner.store.load_backup_txs(&wallet.name, &statechain_id) {
        Ok(_) => false,
        Err(StorageError::NotFound(_)) => true,
        Err(e) => return Err(e.into()),
    };
    if needs_chain {
        let server = inner.entity.server_config().await?;
        let fee_rate = pick_fee_rate(inner, None).await?;
        let locktime = tip_height + server.initlock;
        let backup_address = inner
            .signer
            .key_address(&wallet.coins[coin_index].user_pubkey, wallet.network)?;
        let record = build_backup_record(
            inner,
            &wallet.coins[coin_index],
            wallet.network,
            &backup_address,
            locktime,
            fee_rate,
            false,
        )?;
        save_backup_txs(&inner.store, &wallet.name, &statechain_id, &[record])?;
        wallet.coins[coin_index].locktime = Some(locktime);
    }
    Ok(())
}

/// Promotes a WITHDRAWING coin once its withdrawal transaction reaches
/// the confirmation target, and closes the statechain with the entity.
async fn settle_withdrawal<E, C, W, S>(
    inner: &SdkInner<E, C, W, S>,
    coin: &mut Coin,
    tip_height: u32,
    target: u32,
) -> Result<(), ClientError>
where
    E: EntityClient,
    C: ChainClient,
{
    let Some(txid) = coin.withdrawal_txid.clone() else {
        return Ok(());
    };
    let status = inner.chain.tx_status(&txid).await?;
    if !meets_confirmation_target(&status, tip_height, target) {
        return Ok(());
    }
    if let (Some(statechain_id), Some(signed_statechain_id)) =
        (coin.statechain_id.clone(), coin.signed_statechain_id.clone())
    {
        inner
            .entity
            .withdraw_complete(&WithdrawCompletePayload {
                statechain_id: statechain_id.clone(),
                signed_statechain_id,
            })
            .await?;
        info!(statechain_id, txid, "withdrawal confirmed");
    }
    coin.transition(CoinStatus::Withdrawn)
}

/// Polls the update pass until the statechain's canonical coin reaches
/// CONFIRMED, bounded by `timeout`.
pub(crate) async fn wait_for_confirmation<E, C, W, S>(
    inner: &SdkInner<E, C, W, S>,
    wallet_name: &str,
    statechain_id: &str,
    timeout: Duration,
) -> Result<(), ClientError>
where
    E: EntityClient,
    C: ChainClient,
    W: WalletStore,
    S: CoinSigner,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        inner.check_cancelled()?;
        update_coins(inner, wallet_name).await?;
        let wallet = inner.store.load_wallet(wallet_name)?;
        let confirmed = wallet.coins_for_statechain(statechain_id).iter().any(|c| {
            c.duplicate_index == 0 && c.status == CoinStatus::Confirmed
        });
        if confirmed {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(ClientError::Timeout);
        }
        tokio::time::sleep(Duration::from_secs(config::constants::POLL_INTERVAL_SECS)).await;
    }
}
