//! Deposit flow: token issuance and aggregated deposit addresses.
//!
//! A deposit consumes exactly one confirmed, unspent token. Registering
//! it with the entity yields the statechain identity and the server's
//! key share; the user's share aggregates with it into the taproot
//! address funds are sent to. The funding transaction itself is watched
//! by the update pass, which also builds the coin's first backup
//! transaction once the funding output appears.

use signer::CoinSigner;
use transport::entity::DepositInitPayload;
use transport::EntityClient;

use crate::error::ClientError;
use crate::wallet::{Coin, Token};
use crate::wallet_store::WalletStore;
use crate::SdkInner;

/// Result of registering a deposit.
#[derive(Debug, Clone)]
pub struct DepositAddress {
    /// The aggregated taproot address to fund.
    pub address: String,
    /// Identity of the statechain the deposit will create.
    pub statechain_id: String,
}

pub(crate) async fn new_token<E: EntityClient, C, W: WalletStore, S>(
    inner: &SdkInner<E, C, W, S>,
    wallet_name: &str,
) -> Result<Token, ClientError> {
    let mut wallet = inner.store.load_wallet(wallet_name)?;
    let token = inner.entity.get_token().await?;
    wallet.tokens.push(token.clone());
    inner.store.update_wallet(&wallet)?;
    Ok(token)
}

pub(crate) async fn new_deposit_address<E, C, W, S>(
    inner: &SdkInner<E, C, W, S>,
    wallet_name: &str,
    amount: u64,
) -> Result<DepositAddress, ClientError>
where
    E: EntityClient,
    W: WalletStore,
    S: CoinSigner,
{
    let mut wallet = inner.store.load_wallet(wallet_name)?;
    let token_pos = wallet
        .tokens
        .iter()
        .position(|t| t.confirmed && !t.spent)
        .ok_or(ClientError::NoUsableToken)?;
    let token_id = wallet.tokens[token_pos].token_id.clone();

    let index = wallet.coins.len() as u32;
    let keys = inner.signer.new_coin_keys(wallet.network, index)?;
    let signed_token_id = inner.signer.sign_message(&token_id, &keys.auth_privkey)?;

    let result = inner
        .entity
        .deposit_init(&DepositInitPayload {
            amount,
            auth_key: keys.auth_pubkey.clone(),
            token_id,
            signed_token_id,
        })
        .await?;
    let aggregated =
        inner
            .signer
            .aggregate_key(&keys.user_pubkey, &result.server_pubkey, wallet.network)?;

    let mut coin = Coin::new(index, &keys);
    coin.statechain_id = Some(result.statechain_id.clone());
    coin.signed_statechain_id = Some(result.signed_statechain_id);
    coin.server_pubkey = Some(result.server_pubkey);
    coin.aggregated_pubkey = Some(aggregated.pubkey);
    coin.aggregated_address = Some(aggregated.address.clone());
    coin.amount = Some(amount);

    wallet.tokens[token_pos].spent = true;
    wallet.coins.push(coin);
    inner.store.update_wallet(&wallet)?;

    Ok(DepositAddress {
        address: aggregated.address,
        statechain_id: result.statechain_id,
    })
}
