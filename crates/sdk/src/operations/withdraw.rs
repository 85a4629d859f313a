//! Withdrawal flows.
//!
//! Two exits are possible: a cooperative withdrawal, where the signer
//! co-signs a transaction paying an arbitrary address with no locktime,
//! and the unilateral exit, which broadcasts the latest stored backup
//! transaction and waits out its locktime. Both leave the coin
//! WITHDRAWING; the update pass promotes it to WITHDRAWN and closes the
//! statechain with the entity once the transaction is buried.

use signer::CoinSigner;
use tracing::info;
use transport::{ChainClient, EntityClient};

use crate::error::ClientError;
use crate::operations::{build_backup_record, pick_fee_rate};
use crate::wallet::{Activity, ActivityKind, CoinStatus};
use crate::wallet_store::WalletStore;
use crate::{chain, SdkInner};

pub(crate) async fn withdraw<E, C, W, S>(
    inner: &SdkInner<E, C, W, S>,
    wallet_name: &str,
    statechain_id: &str,
    to_address: &str,
    fee_rate: Option<u64>,
    duplicated_index: Option<u32>,
) -> Result<String, ClientError>
where
    E: EntityClient,
    C: ChainClient,
    W: WalletStore,
    S: CoinSigner,
{
    let mut wallet = inner.store.load_wallet(wallet_name)?;
    let index = duplicated_index.unwrap_or(0);
    let coin_idx = wallet
        .coins
        .iter()
        .position(|c| {
            c.statechain_id.as_deref() == Some(statechain_id)
                && c.duplicate_index == index
                && matches!(
                    c.status,
                    CoinStatus::Confirmed | CoinStatus::Duplicated
                )
        })
        .ok_or_else(|| {
            if index == 0 {
                ClientError::NoCanonicalCoin {
                    statechain_id: statechain_id.to_owned(),
                }
            } else {
                ClientError::UnknownDuplicateIndex { index }
            }
        })?;
    let coin = wallet.coins[coin_idx].clone();

    let fee_rate = pick_fee_rate(inner, fee_rate).await?;
    let record = build_backup_record(
        inner,
        &coin,
        wallet.network,
        to_address,
        0,
        fee_rate,
        true,
    )?;
    let txid = inner.chain.broadcast_tx(&record.tx).await?;

    let (utxo_txid, utxo_vout) = coin
        .outpoint()
        .ok_or_else(|| ClientError::InvalidTransaction("coin has no funding outpoint".into()))?;
    wallet.coins[coin_idx].transition(CoinStatus::Withdrawing)?;
    wallet.coins[coin_idx].withdrawal_txid = Some(txid.clone());
    wallet.activities.push(Activity::now(
        format!("{utxo_txid}:{utxo_vout}"),
        coin.amount.unwrap_or(0),
        ActivityKind::Withdraw,
    ));
    inner.store.update_wallet(&wallet)?;

    info!(statechain_id, index, txid, "withdrawal broadcast");
    Ok(txid)
}

/// Broadcasts the latest stored backup transaction for the canonical
/// coin: the unilateral exit when the entity is gone or hostile.
pub(crate) async fn broadcast_backup_tx<E, C, W, S>(
    inner: &SdkInner<E, C, W, S>,
    wallet_name: &str,
    statechain_id: &str,
) -> Result<String, ClientError>
where
    E: EntityClient,
    C: ChainClient,
    W: WalletStore,
    S: CoinSigner,
{
    let mut wallet = inner.store.load_wallet(wallet_name)?;
    let coin_idx = wallet
        .coins
        .iter()
        .position(|c| {
            c.statechain_id.as_deref() == Some(statechain_id)
                && c.duplicate_index == 0
                && c.status == CoinStatus::Confirmed
        })
        .ok_or_else(|| ClientError::NoCanonicalCoin {
            statechain_id: statechain_id.to_owned(),
        })?;
    let coin = wallet.coins[coin_idx].clone();
    let outpoint = coin
        .outpoint()
        .ok_or_else(|| ClientError::InvalidTransaction("coin has no funding outpoint".into()))?;

    let stored = inner.store.load_backup_txs(&wallet.name, statechain_id)?;
    let groups = chain::group(&stored)?;
    let own_chain = groups
        .iter()
        .find(|g| chain::funding_outpoint(g).ok() == Some(outpoint.clone()))
        .ok_or_else(|| ClientError::InvalidTransaction("no stored backup chain".into()))?;
    let latest = own_chain
        .last()
        .ok_or_else(|| ClientError::InvalidTransaction("empty backup chain".into()))?;

    let txid = inner.chain.broadcast_tx(&latest.tx).await?;
    wallet.coins[coin_idx].transition(CoinStatus::Withdrawing)?;
    wallet.coins[coin_idx].withdrawal_txid = Some(txid.clone());
    wallet.activities.push(Activity::now(
        format!("{}:{}", outpoint.0, outpoint.1),
        coin.amount.unwrap_or(0),
        ActivityKind::Withdraw,
    ));
    inner.store.update_wallet(&wallet)?;

    info!(statechain_id, txid, "backup transaction broadcast");
    Ok(txid)
}
