//! Wallet operations.
//!
//! Each submodule owns one protocol flow; small helpers shared across
//! flows live here. Every operation follows the same shape: load the
//! wallet, complete all remote steps, write the wallet back once.

pub mod coin_update;
pub mod deposit;
pub mod transfer_receive;
pub mod transfer_send;
pub mod withdraw;

use signer::CoinSigner;
use transport::{ChainClient, TxStatus};
use uuid::Uuid;

use crate::error::ClientError;
use crate::wallet::Coin;
use crate::wallet_store::WalletStore;
use crate::SdkInner;

/// A freshly generated receiving address.
#[derive(Debug, Clone)]
pub struct NewTransferAddress {
    /// Bech32m transfer address of the new coin.
    pub transfer_address: String,
    /// Batch id for atomic grouping, when requested.
    pub batch_id: Option<String>,
}

/// Appends a fresh INITIALISED coin and returns its transfer address.
pub(crate) fn new_transfer_address<E, C, W: WalletStore, S: CoinSigner>(
    inner: &SdkInner<E, C, W, S>,
    wallet_name: &str,
    with_batch_id: bool,
) -> Result<NewTransferAddress, ClientError> {
    let mut wallet = inner.store.load_wallet(wallet_name)?;
    let index = wallet.coins.len() as u32;
    let keys = inner.signer.new_coin_keys(wallet.network, index)?;
    let coin = Coin::new(index, &keys);
    let transfer_address = coin.address.clone();
    wallet.coins.push(coin);
    inner.store.update_wallet(&wallet)?;
    Ok(NewTransferAddress {
        transfer_address,
        batch_id: with_batch_id.then(|| Uuid::new_v4().to_string()),
    })
}

/// The fee rate to use for a new transaction: the caller's choice or the
/// chain estimate, capped at the configured maximum.
pub(crate) async fn pick_fee_rate<E, C: ChainClient, W, S>(
    inner: &SdkInner<E, C, W, S>,
    requested: Option<u64>,
) -> Result<u64, ClientError> {
    let rate = match requested {
        Some(rate) => rate,
        None => inner.chain.fee_rate().await?,
    };
    Ok(rate.min(inner.config.max_fee_rate))
}

/// Builds one co-signed backup (or withdrawal) transaction for `coin`
/// and wraps it in a stored record with `tx_n = 1`. Callers renumber via
/// [`crate::chain::extend`] when appending to an existing chain.
pub(crate) fn build_backup_record<E, C, W, S: CoinSigner>(
    inner: &SdkInner<E, C, W, S>,
    coin: &Coin,
    network: sdk_core::Network,
    to_address: &str,
    locktime: u32,
    fee_rate: u64,
    is_withdrawal: bool,
) -> Result<transport::entity::BackupTx, ClientError> {
    let (utxo_txid, utxo_vout) = coin
        .outpoint()
        .ok_or_else(|| ClientError::InvalidTransaction("coin has no funding outpoint".into()))?;
    let statechain_id = coin.statechain_id.clone().unwrap_or_default();
    let server_pubkey = coin.server_pubkey.clone().unwrap_or_default();
    let amount = coin
        .amount
        .ok_or_else(|| ClientError::InvalidTransaction("coin has no amount".into()))?;
    let request = signer::BackupTxRequest {
        statechain_id,
        utxo_txid,
        utxo_vout,
        amount,
        user_privkey: coin.user_privkey.clone(),
        user_pubkey: coin.user_pubkey.clone(),
        server_pubkey: server_pubkey.clone(),
        to_address: to_address.to_owned(),
        locktime,
        fee_rate,
        network,
        is_withdrawal,
    };
    let signed = inner.signer.build_backup_tx(&request)?;
    Ok(transport::entity::BackupTx {
        tx_n: 1,
        tx: signed.tx,
        client_public_nonce: signed.client_public_nonce,
        server_public_nonce: signed.server_public_nonce,
        client_public_key: coin.user_pubkey.clone(),
        server_public_key: server_pubkey,
        blinding_factor: signed.blinding_factor,
    })
}

/// Number of confirmations at `tip` for a transaction mined at `height`.
pub(crate) fn confirmations(tip_height: u32, block_height: u32) -> u32 {
    tip_height.saturating_sub(block_height) + 1
}

/// Whether a status has reached the wallet's confirmation target.
pub(crate) fn meets_confirmation_target(
    status: &TxStatus,
    tip_height: u32,
    target: u32,
) -> bool {
    match (status.confirmed, status.block_height) {
        (true, Some(height)) => confirmations(tip_height, height) >= target,
        _ => false,
    }
}
