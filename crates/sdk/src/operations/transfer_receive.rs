//! Transfer receive engine.
//!
//! Polls the entity for encrypted transfer messages addressed to any of
//! the wallet's receiving keys, validates each end to end, and
//! finalizes the ones whose funding is confirmed. Nothing the server
//! says is taken on faith: the chain schedule, the funding output, the
//! enclave key commitment, the payee, and the signature count are all
//! re-checked locally before the receiver call.
//!
//! A validation failure aborts only the message that failed; the poll
//! cycle continues. Local invariant violations (a duplicate candidate
//! at group index 0, a non-contiguous duplicate index) and transport or
//! store failures abort the whole pass. The wallet is written once, at
//! the end.

use signer::CoinSigner;
use tracing::{info, warn};
use transport::entity::{
    ReceiverOutcome, TransferMsg, TransferReceiverPayload, TransferUnlockPayload,
};
use transport::{ChainClient, EntityClient};

use crate::duplicates;
use crate::error::ClientError;
use crate::operations::meets_confirmation_target;
use crate::wallet::{
    sort_coins_by_statechain, Activity, ActivityKind, Coin, CoinStatus, Wallet,
};
use crate::wallet_store::{save_backup_txs, WalletStore};
use crate::{chain, tx, SdkInner};

/// Outcome of one receive pass.
#[derive(Debug, Clone, Default)]
pub struct TransferReceiveResult {
    /// Statechains whose receipt was finalized in this pass.
    pub received_statechain_ids: Vec<String>,
    /// At least one transfer is held by an in-progress batch; poll again
    /// later.
    pub is_batch_locked: bool,
}

enum MessageOutcome {
    Received(String),
    BatchLocked,
    Pending,
}

pub(crate) async fn transfer_receive<E, C, W, S>(
    inner: &SdkInner<E, C, W, S>,
    wallet_name: &str,
) -> Result<TransferReceiveResult, ClientError>
where
    E: EntityClient,
    C: ChainClient,
    W: WalletStore,
    S: CoinSigner,
{
    let mut wallet = inner.store.load_wallet(wallet_name)?;
    let tip_height = inner.chain.tip_height().await?;
    let server = inner.entity.server_config().await?;
    let current_fee_rate = inner.chain.fee_rate().await?;
    let mut result = TransferReceiveResult::default();

    let mut auth_keys: Vec<String> = Vec::new();
    for coin in &wallet.coins {
        if !coin.status.is_terminal() && !auth_keys.contains(&coin.auth_pubkey) {
            auth_keys.push(coin.auth_pubkey.clone());
        }
    }

    for auth_pubkey in auth_keys {
        inner.check_cancelled()?;
        let messages = inner.entity.transfer_messages(&auth_pubkey).await?;
        for encrypted in messages {
            let outcome = process_message(
                inner,
                &mut wallet,
                &auth_pubkey,
                &encrypted,
                tip_height,
                server.interval,
                current_fee_rate,
            )
            .await;
            match outcome {
                Ok(MessageOutcome::Received(id)) => result.received_statechain_ids.push(id),
                Ok(MessageOutcome::BatchLocked) => result.is_batch_locked = true,
                Ok(MessageOutcome::Pending) => {}
                Err(
                    e @ (ClientError::Transport(_)
                    | ClientError::Store(_)
                    | ClientError::Cancelled
                    | ClientError::DuplicateIndexZero
                    | ClientError::NonContiguousDuplicateIndex { .. }),
                ) => return Err(e),
                Err(e) => {
                    warn!(auth_pubkey, error = %e, "transfer message rejected");
                }
            }
        }
    }

    sort_coins_by_statechain(&mut wallet.coins);
    inner.store.update_wallet(&wallet)?;
    Ok(result)
}

/// Picks the wallet coin that will receive on `auth_pubkey`. A coin
/// whose address was already consumed by an earlier message yields a
/// fresh sibling with the same key material, returned unpushed: a
/// message that fails validation must not leave a stray coin behind.
fn receiving_coin(wallet: &Wallet, auth_pubkey: &str) -> Result<(Option<usize>, Coin), ClientError> {
    let reusable = wallet.coins.iter().position(|c| {
        c.auth_pubkey == auth_pubkey
            && matches!(c.status, CoinStatus::Initialised | CoinStatus::InMempool)
    });
    if let Some(i) = reusable {
        return Ok((Some(i), wallet.coins[i].clone()));
    }
    let base = wallet
        .coins
        .iter()
        .find(|c| c.auth_pubkey == auth_pubkey)
        .cloned()
        .ok_or_else(|| {
            ClientError::InvalidTransaction("no coin for receiving auth key".into())
        })?;
    let keys = signer::CoinKeys {
        user_privkey: base.user_privkey,
        user_pubkey: base.user_pubkey,
        auth_privkey: base.auth_privkey,
        auth_pubkey: base.auth_pubkey,
        address: base.address,
    };
    Ok((None, Coin::new(base.index, &keys)))
}

/// Materializes the receiving slot once a message is past validation.
fn place_coin(wallet: &mut Wallet, slot: Option<usize>, coin: &Coin) -> usize {
    match slot {
        Some(i) => i,
        None => {
            wallet.coins.push(coin.clone());
            wallet.coins.len() - 1
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn process_message<E, C, W, S>(
    inner: &SdkInner<E, C, W, S>,
    wallet: &mut Wallet,
    auth_pubkey: &str,
    encrypted: &str,
    tip_height: u32,
    interval: u32,
    current_fee_rate: u64,
) -> Result<MessageOutcome, ClientError>
where
    E: EntityClient,
    C: ChainClient,
    W: WalletStore,
    S: CoinSigner,
{
    let network = wallet.network;
    let (slot, coin) = receiving_coin(wallet, auth_pubkey)?;

    let ciphertext = hex::decode(encrypted)
        .map_err(|_| ClientError::InvalidTransaction("transfer message is not hex".into()))?;
    let plain = inner.signer.decrypt(&ciphertext, &coin.auth_privkey)?;
    let msg: TransferMsg = serde_json::from_slice(&plain)
        .map_err(|e| ClientError::InvalidTransaction(format!("bad transfer message: {e}")))?;

    let groups = chain::group(&msg.backup_transactions)?;
    let first_chain = groups
        .first()
        .ok_or_else(|| ClientError::InvalidTransaction("no backup transactions".into()))?;
    let last = first_chain
        .last()
        .ok_or_else(|| ClientError::InvalidTransaction("empty chain".into()))?;
    let sender_pubkey = last.client_public_key.clone();

    let (tx0_txid, tx0_vout) = chain::funding_outpoint(first_chain)?;
    let tx0_hex = inner.chain.tx_hex(&tx0_txid).await?;

    // The sender committed to this recipient and this outpoint.
    if !inner.signer.verify_transfer_signature(
        &coin.user_pubkey,
        &sender_pubkey,
        &tx0_txid,
        tx0_vout,
        &msg.transfer_signature,
    )? {
        return Err(ClientError::InvalidTransferSignature);
    }

    let info = inner
        .entity
        .statechain_info(&msg.statechain_id)
        .await?
        .ok_or_else(|| ClientError::StatechainInfoNotFound {
            statechain_id: msg.statechain_id.clone(),
        })?;

    if !inner.signer.validate_funding_output_key(
        &info.enclave_public_key,
        &sender_pubkey,
        &tx0_hex,
        tx0_vout,
        network,
    )? {
        return Err(ClientError::EnclaveKeyMismatch);
    }

    let own_backup_address = inner.signer.key_address(&coin.user_pubkey, network)?;
    if !tx::pays_to_address(&last.tx, &own_backup_address, network)? {
        return Err(ClientError::BackupPayeeMismatch);
    }

    let actual = msg.backup_transactions.len() as u32;
    if info.num_sigs != actual {
        return Err(ClientError::SignatureCountMismatch {
            reported: info.num_sigs,
            actual,
        });
    }

    let chain0_hexes: Vec<String> = first_chain.iter().map(|t| t.tx.clone()).collect();
    if !inner.signer.verify_backup_signatures(&chain0_hexes, &tx0_hex)? {
        return Err(ClientError::InvalidBackupSignatures);
    }

    // Every chain must honor the locktime schedule and the fee-rate
    // tolerance against the current network rate. Duplicate candidates
    // are resolved here too: everything local validation can catch must
    // fail before the entity is asked to finalize anything.
    let funding_value = tx::output_value(&tx0_hex, tx0_vout)?;
    let fee_limit =
        current_fee_rate * (100 + u64::from(inner.config.fee_rate_tolerance)) / 100;
    let mut dup_candidates = Vec::new();
    for (group_index, exit_chain) in groups.iter().enumerate() {
        chain::validate(exit_chain, interval)?;
        let chain_funding = if group_index == 0 {
            funding_value
        } else {
            let (txid, vout) = chain::funding_outpoint(exit_chain)?;
            let value = tx::output_value(&inner.chain.tx_hex(&txid).await?, vout)?;
            dup_candidates.push(duplicates::candidate_from_chain(
                group_index,
                exit_chain,
                value,
            )?);
            value
        };
        for record in exit_chain {
            let rate = tx::fee_rate(&record.tx, chain_funding)?;
            if rate > fee_limit {
                return Err(ClientError::FeeRateTooHigh {
                    rate,
                    limit: fee_limit,
                });
            }
        }
    }

    // The funding output must still be unspent, and confirmed deep
    // enough to finalize.
    let funding_address = tx::output_address(&tx0_hex, tx0_vout, network)?;
    let utxos = inner.chain.address_utxos(&funding_address).await?;
    let utxo = utxos
        .iter()
        .find(|u| u.txid == tx0_txid && u.vout == tx0_vout)
        .ok_or_else(|| ClientError::FundingOutputSpent {
            txid: tx0_txid.clone(),
            vout: tx0_vout,
        })?;
    if !meets_confirmation_target(&utxo.status, tip_height, inner.config.confirmation_target) {
        // Record what we observed; finalization waits for depth.
        let coin_idx = place_coin(wallet, slot, &coin);
        let pending = &mut wallet.coins[coin_idx];
        pending.statechain_id = Some(msg.statechain_id.clone());
        pending.amount = Some(funding_value);
        pending.utxo_txid = Some(tx0_txid);
        pending.utxo_vout = Some(tx0_vout);
        pending.transition(CoinStatus::InMempool)?;
        save_backup_txs(
            &inner.store,
            &wallet.name,
            &msg.statechain_id,
            &msg.backup_transactions,
        )?;
        return Ok(MessageOutcome::Pending);
    }

    // Finalize: unlock the sender's hold, then claim with the receiver
    // proof.
    let auth_sig = inner
        .signer
        .sign_message(&msg.statechain_id, &coin.auth_privkey)?;
    inner
        .entity
        .transfer_unlock(&TransferUnlockPayload {
            statechain_id: msg.statechain_id.clone(),
            auth_sig: auth_sig.clone(),
            auth_pub_key: coin.auth_pubkey.clone(),
        })
        .await?;
    let proof = inner.signer.create_receiver_proof(
        &msg.statechain_id,
        &msg.t1,
        &coin.user_privkey,
        &coin.auth_privkey,
    )?;
    let outcome = inner
        .entity
        .transfer_receiver(&TransferReceiverPayload {
            statechain_id: msg.statechain_id.clone(),
            batch_data: None,
            t2: proof.t2,
            auth_sig: proof.auth_sig,
        })
        .await?;
    let server_pubkey = match outcome {
        ReceiverOutcome::Accepted { server_pubkey } => server_pubkey,
        ReceiverOutcome::BatchLocked => {
            // A locked batch must not coexist with unresolved duplicates.
            if groups.len() > 1 {
                return Err(ClientError::DuplicateConflictsWithBatchLock);
            }
            return Ok(MessageOutcome::BatchLocked);
        }
        ReceiverOutcome::Expired => return Err(ClientError::BatchExpired),
    };

    let aggregated = inner
        .signer
        .aggregate_key(&coin.user_pubkey, &server_pubkey, network)?;
    let locktime = tx::locktime(&last.tx)?;
    let coin_idx = place_coin(wallet, slot, &coin);
    {
        let received = &mut wallet.coins[coin_idx];
        received.statechain_id = Some(msg.statechain_id.clone());
        received.signed_statechain_id = Some(auth_sig);
        received.server_pubkey = Some(server_pubkey);
        received.aggregated_pubkey = Some(aggregated.pubkey);
        received.aggregated_address = Some(aggregated.address);
        received.amount = Some(funding_value);
        received.utxo_txid = Some(tx0_txid.clone());
        received.utxo_vout = Some(tx0_vout);
        received.locktime = Some(locktime);
        received.duplicate_index = 0;
        received.transition(CoinStatus::Confirmed)?;
    }
    save_backup_txs(
        &inner.store,
        &wallet.name,
        &msg.statechain_id,
        &msg.backup_transactions,
    )?;
    wallet.activities.push(Activity::now(
        format!("{tx0_txid}:{tx0_vout}"),
        funding_value,
        ActivityKind::Receive,
    ));

    // Chains past the first are extra physical deposits riding along.
    // Candidates were resolved during validation; folding numbers them
    // within the received generation, so earlier generations of the
    // same statechain (a self-send leaves them IN_TRANSFER) cannot
    // shift the indexes.
    let base = wallet.coins[coin_idx].clone();
    for (i, candidate) in dup_candidates.into_iter().enumerate() {
        duplicates::fold_candidate(wallet, &base, candidate, (i + 1) as u32)?;
    }

    info!(
        statechain_id = msg.statechain_id,
        duplicates = groups.len() - 1,
        "transfer received"
    );
    Ok(MessageOutcome::Received(msg.statechain_id))
}
