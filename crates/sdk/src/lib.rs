//! Statechain client core: wallet operations and transfer protocol engines.
//!
//! The SDK orchestrates statechain protocol operations by combining:
//! - **Entity client** (`transport::EntityClient`) for protocol server calls
//! - **Chain client** (`transport::ChainClient`) for blockchain data
//! - **Signer** (`signer::CoinSigner`) for cryptographic operations
//! - **Wallet store** (`WalletStore`) for wallet and backup chain state
//!
//! # Architecture
//!
//! The entity is semi-trusted; the blockchain is the final arbiter.
//! Every coin carries a chain of pre-signed, decrementing-locktime
//! backup transactions that let the current holder exit unilaterally.
//! The engines here never trust a server claim they can check locally:
//! received chains are re-validated link by link, funding outputs are
//! checked against the chain source, and signature counts against the
//! entity's own public record.
//!
//! Operations per wallet are single-writer: each loads the wallet,
//! completes every remote protocol step, and writes the wallet back
//! once. Concurrent operations on one wallet name must be serialized by
//! the caller.
//!
//! The SDK is generic over its four collaborators, wraps shared state in
//! an `Arc`, and is `Clone`. A `CancellationToken` checked on operation
//! entry supports graceful shutdown.

pub mod chain;
pub mod duplicates;
pub mod error;
pub mod operations;
pub mod tx;
pub mod wallet;
pub mod wallet_store;

pub use error::ClientError;
pub use operations::deposit::DepositAddress;
pub use operations::transfer_receive::TransferReceiveResult;
pub use operations::transfer_send::TransferSendRequest;
pub use operations::NewTransferAddress;

use std::sync::Arc;
use std::time::Duration;

use config::ClientConfig;
use signer::CoinSigner;
use tokio_util::sync::CancellationToken;
use transport::{ChainClient, EntityClient};

use crate::wallet::Wallet;
use crate::wallet_store::WalletStore;

// ---------------------------------------------------------------------------
// Sdk
// ---------------------------------------------------------------------------

/// Shared state across all SDK operations.
pub(crate) struct SdkInner<E, C, W, S> {
    pub config: ClientConfig,
    pub entity: E,
    pub chain: C,
    pub store: W,
    pub signer: S,
    pub cancel: CancellationToken,
}

impl<E, C, W, S> SdkInner<E, C, W, S> {
    pub(crate) fn check_cancelled(&self) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        Ok(())
    }
}

/// The statechain client entry point.
///
/// Generic over the entity client `E`, chain client `C`, wallet store
/// `W`, and signer `S`, so tests can drive the full protocol against
/// in-process fakes.
pub struct Sdk<E, C, W, S> {
    inner: Arc<SdkInner<E, C, W, S>>,
}

impl<E, C, W, S> Clone for Sdk<E, C, W, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E, C, W, S> Sdk<E, C, W, S>
where
    E: EntityClient,
    C: ChainClient,
    W: WalletStore,
    S: CoinSigner,
{
    /// Creates an SDK over the given collaborators.
    pub fn new(
        config: ClientConfig,
        entity: E,
        chain: C,
        store: W,
        signer: S,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(SdkInner {
                config,
                entity,
                chain,
                store,
                signer,
                cancel,
            }),
        }
    }

    /// Creates and persists an empty wallet.
    pub fn create_wallet(&self, name: &str) -> Result<Wallet, ClientError> {
        self.inner.check_cancelled()?;
        let wallet = Wallet::new(name, self.inner.config.network);
        self.inner.store.create_wallet(&wallet)?;
        Ok(wallet)
    }

    /// Loads a wallet by name.
    pub fn load_wallet(&self, name: &str) -> Result<Wallet, ClientError> {
        Ok(self.inner.store.load_wallet(name)?)
    }

    /// Obtains a fresh deposit token from the entity and stores it in
    /// the wallet.
    pub async fn new_token(&self, wallet_name: &str) -> Result<wallet::Token, ClientError> {
        self.inner.check_cancelled()?;
        operations::deposit::new_token(&self.inner, wallet_name).await
    }

    /// Consumes a confirmed, unspent token and registers a deposit of
    /// `amount` satoshis. Returns the aggregated deposit address.
    pub async fn new_deposit_address(
        &self,
        wallet_name: &str,
        amount: u64,
    ) -> Result<DepositAddress, ClientError> {
        self.inner.check_cancelled()?;
        operations::deposit::new_deposit_address(&self.inner, wallet_name, amount).await
    }

    /// Appends a fresh coin to the wallet and returns its transfer
    /// address, optionally with a batch id for atomic grouping.
    pub fn new_transfer_address(
        &self,
        wallet_name: &str,
        with_batch_id: bool,
    ) -> Result<NewTransferAddress, ClientError> {
        self.inner.check_cancelled()?;
        operations::new_transfer_address(&self.inner, wallet_name, with_batch_id)
    }

    /// Refreshes every non-stable coin from the chain source and entity:
    /// funding detection, confirmation promotion, duplicate
    /// materialization, transfer completion, withdrawal completion.
    pub async fn update_coins(&self, wallet_name: &str) -> Result<(), ClientError> {
        self.inner.check_cancelled()?;
        operations::coin_update::update_coins(&self.inner, wallet_name).await
    }

    /// Polls [`Self::update_coins`] until the statechain's canonical coin
    /// is CONFIRMED, failing with [`ClientError::Timeout`] after
    /// `timeout`.
    pub async fn wait_for_confirmation(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        self.inner.check_cancelled()?;
        operations::coin_update::wait_for_confirmation(
            &self.inner,
            wallet_name,
            statechain_id,
            timeout,
        )
        .await
    }

    /// Sends a statechain to a recipient's transfer address. See
    /// [`TransferSendRequest`] for duplicate selection and forcing.
    pub async fn transfer_send(
        &self,
        wallet_name: &str,
        request: &TransferSendRequest,
    ) -> Result<wallet::Coin, ClientError> {
        self.inner.check_cancelled()?;
        operations::transfer_send::transfer_send(&self.inner, wallet_name, request).await
    }

    /// Polls for pending transfer messages on all of the wallet's
    /// receiving keys, validates them, and finalizes what can be
    /// finalized.
    pub async fn transfer_receive(
        &self,
        wallet_name: &str,
    ) -> Result<TransferReceiveResult, ClientError> {
        self.inner.check_cancelled()?;
        operations::transfer_receive::transfer_receive(&self.inner, wallet_name).await
    }

    /// Withdraws a coin cooperatively to an on-chain address. Returns the
    /// broadcast txid.
    pub async fn withdraw(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        to_address: &str,
        fee_rate: Option<u64>,
        duplicated_index: Option<u32>,
    ) -> Result<String, ClientError> {
        self.inner.check_cancelled()?;
        operations::withdraw::withdraw(
            &self.inner,
            wallet_name,
            statechain_id,
            to_address,
            fee_rate,
            duplicated_index,
        )
        .await
    }

    /// Broadcasts the latest stored backup transaction for a coin (the
    /// unilateral exit path). Returns the broadcast txid.
    pub async fn broadcast_backup_tx(
        &self,
        wallet_name: &str,
        statechain_id: &str,
    ) -> Result<String, ClientError> {
        self.inner.check_cancelled()?;
        operations::withdraw::broadcast_backup_tx(&self.inner, wallet_name, statechain_id).await
    }
}
