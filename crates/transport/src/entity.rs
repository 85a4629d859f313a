//! Statechain entity client: trait, wire types, and the HTTP implementation.
//!
//! The entity is the semi-trusted protocol server. Every endpoint the
//! client core consumes is listed here; nothing in the SDK talks to the
//! entity except through [`EntityClient`].
//!
//! # Endpoints
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET  | `tokens/token_init` | issue a deposit token |
//! | POST | `deposit/init/pod` | register a deposit, obtain statechain id |
//! | GET  | `info/config` | server protocol parameters |
//! | GET  | `info/statechain/{id}` | enclave key and signature count |
//! | POST | `transfer/sender` | obtain a fresh blinding factor (x1) |
//! | POST | `transfer/update_msg` | submit the encrypted transfer payload |
//! | GET  | `transfer/get_msg_addr/{auth_pubkey}` | pending transfer messages |
//! | POST | `transfer/unlock` | release the transfer lock |
//! | POST | `transfer/receiver` | finalize receipt (may be batch-locked) |
//! | GET  | `transfer/receiver/{id}` | whether a transfer completed |
//! | POST | `withdraw/complete` | close a withdrawn statechain |
//!
//! Business-rule failures of `transfer/receiver` are *not* transport
//! errors: `StatecoinBatchLockedError` and `ExpiredBatchTimeError` come
//! back as [`ReceiverOutcome`] variants so callers can branch without
//! string-matching error text.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TransportError;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// A deposit token issued by the entity. Consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Server-assigned token identifier.
    pub token_id: String,
    /// Whether the token's payment has been confirmed.
    pub confirmed: bool,
    /// Whether the token has already funded a deposit.
    pub spent: bool,
}

/// One backup transaction record, as stored and as sent on the wire.
///
/// The `tx` field is the consensus-encoded transaction in hex; all other
/// fields are opaque hex payloads owned by the crypto engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupTx {
    /// Monotonic sequence number within the statechain's record set.
    pub tx_n: u32,
    /// Consensus-encoded transaction, hex.
    pub tx: String,
    /// Client half of the nonce pair.
    pub client_public_nonce: String,
    /// Server half of the nonce pair.
    pub server_public_nonce: String,
    /// Client public key share.
    pub client_public_key: String,
    /// Server public key share.
    pub server_public_key: String,
    /// Blinding factor used in the blind co-signing session.
    pub blinding_factor: String,
}

/// A decrypted transfer message. Ephemeral: validated contents are
/// folded into the wallet, the message itself is never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferMsg {
    /// The statechain being handed over.
    pub statechain_id: String,
    /// Sender's signature over the recipient address and funding outpoint.
    pub transfer_signature: String,
    /// The full backup transaction set, possibly spanning several
    /// physical deposits (duplicates).
    pub backup_transactions: Vec<BackupTx>,
    /// Sender key-update material.
    pub t1: [u8; 32],
}

/// Request body for `deposit/init/pod`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositInitPayload {
    /// Deposit amount in satoshis.
    pub amount: u64,
    /// The coin's authentication public key, hex.
    pub auth_key: String,
    /// The token paying for this deposit.
    pub token_id: String,
    /// Signature over the token id with the coin's auth key, hex.
    pub signed_token_id: String,
}

/// Response body for `deposit/init/pod`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositInitResult {
    /// Server-assigned statechain identity.
    pub statechain_id: String,
    /// The statechain id signed by the coin's auth key, hex.
    pub signed_statechain_id: String,
    /// The server's public key share for this coin.
    pub server_pubkey: String,
}

/// Request body for `transfer/sender`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSenderPayload {
    /// The statechain being transferred.
    pub statechain_id: String,
    /// Signed statechain id, hex.
    pub auth_sig: String,
    /// The recipient's authentication public key, hex.
    pub new_user_auth_key: String,
    /// Optional batch (atomic swap) grouping id.
    pub batch_id: Option<String>,
}

/// Request body for `transfer/update_msg`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferUpdateMsgPayload {
    /// The statechain being transferred.
    pub statechain_id: String,
    /// Signed statechain id, hex.
    pub auth_sig: String,
    /// The blinding factor obtained from `transfer/sender`.
    pub new_x1: String,
    /// The recipient's transfer address.
    pub recipient_address: String,
    /// Sender's transfer signature, hex.
    pub transfer_signature: String,
    /// The full extended backup transaction set.
    pub backup_transactions: Vec<BackupTx>,
}

/// Request body for `transfer/unlock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferUnlockPayload {
    /// The statechain whose lock is being released.
    pub statechain_id: String,
    /// Signed statechain id, hex.
    pub auth_sig: String,
    /// The receiver's authentication public key, hex.
    pub auth_pub_key: String,
}

/// Request body for `transfer/receiver`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceiverPayload {
    /// The statechain being received.
    pub statechain_id: String,
    /// Batch id, when the transfer is part of an atomic group.
    pub batch_data: Option<String>,
    /// Re-blinded key update value, hex.
    pub t2: String,
    /// Signature over the statechain id with the receiver's auth key, hex.
    pub auth_sig: String,
}

/// Request body for `withdraw/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawCompletePayload {
    /// The statechain being closed.
    pub statechain_id: String,
    /// Signed statechain id, hex.
    pub signed_statechain_id: String,
}

/// Public statechain record as reported by the entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatechainInfo {
    /// The enclave's public key committed to in the funding output.
    pub enclave_public_key: String,
    /// Number of co-signatures the enclave has produced for this
    /// statechain. Must equal the backup transaction count.
    pub num_sigs: u32,
}

/// Server protocol parameters from `info/config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Blocks of locktime granted to the first backup transaction.
    pub initlock: u32,
    /// Locktime decrement per transfer hop, in blocks.
    pub interval: u32,
}

/// Outcome of a `transfer/receiver` call.
///
/// Soft and hard server-signaled conditions are separate variants, so
/// callers branch on the type instead of parsing error text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverOutcome {
    /// The transfer was accepted; the rotated server key share follows.
    Accepted {
        /// The server's new public key share, hex.
        server_pubkey: String,
    },
    /// The statechain belongs to an in-progress batch; retry later.
    BatchLocked,
    /// The batch window expired; this transfer can never complete.
    Expired,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Client for the statechain entity.
///
/// Implementations speak HTTP+JSON; tests substitute an in-memory fake.
pub trait EntityClient: Send + Sync {
    /// Issues a fresh deposit token.
    fn get_token(&self) -> impl Future<Output = Result<Token, TransportError>> + Send;

    /// Registers a deposit and obtains its statechain identity.
    fn deposit_init(
        &self,
        payload: &DepositInitPayload,
    ) -> impl Future<Output = Result<DepositInitResult, TransportError>> + Send;

    /// Fetches the server's protocol parameters.
    fn server_config(&self) -> impl Future<Output = Result<ServerConfig, TransportError>> + Send;

    /// Fetches the public record of a statechain. `None` on 404.
    fn statechain_info(
        &self,
        statechain_id: &str,
    ) -> impl Future<Output = Result<Option<StatechainInfo>, TransportError>> + Send;

    /// Requests a fresh blinding factor (x1) for a send.
    fn transfer_sender(
        &self,
        payload: &TransferSenderPayload,
    ) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Submits the extended chain and transfer signature. Returns whether
    /// the server recorded the update.
    fn transfer_update_msg(
        &self,
        payload: &TransferUpdateMsgPayload,
    ) -> impl Future<Output = Result<bool, TransportError>> + Send;

    /// Lists pending encrypted transfer messages for an auth key.
    fn transfer_messages(
        &self,
        auth_pubkey: &str,
    ) -> impl Future<Output = Result<Vec<String>, TransportError>> + Send;

    /// Releases the transfer lock held on a statechain.
    fn transfer_unlock(
        &self,
        payload: &TransferUnlockPayload,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Finalizes receipt of a statechain.
    fn transfer_receiver(
        &self,
        payload: &TransferReceiverPayload,
    ) -> impl Future<Output = Result<ReceiverOutcome, TransportError>> + Send;

    /// Whether the given statechain's pending transfer has completed.
    fn transfer_complete(
        &self,
        statechain_id: &str,
    ) -> impl Future<Output = Result<bool, TransportError>> + Send;

    /// Reports a completed withdrawal so the entity can close the record.
    fn withdraw_complete(
        &self,
        payload: &WithdrawCompletePayload,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// Error code the entity uses for a statechain locked by a batch.
const CODE_BATCH_LOCKED: &str = "StatecoinBatchLockedError";

/// Error code the entity uses for an expired batch window.
const CODE_BATCH_EXPIRED: &str = "ExpiredBatchTimeError";

/// `reqwest`-backed [`EntityClient`].
#[derive(Debug, Clone)]
pub struct HttpEntityClient {
    base_url: String,
    http: reqwest::Client,
}

impl HttpEntityClient {
    /// Creates a client for the entity at `base_url` (no trailing slash).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<T, TransportError> {
        let url = self.url(path);
        debug!(%url, "entity GET");
        let response = self.http.get(&url).send().await?;
        Self::decode(response).await
    }

    async fn post_json<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, TransportError> {
        let url = self.url(path);
        debug!(%url, "entity POST");
        let response = self.http.post(&url).json(body).send().await?;
        Self::decode(response).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransportError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[derive(Deserialize)]
struct MsgAddrResponse {
    list_enc_transfer_msg: Vec<String>,
}

#[derive(Deserialize)]
struct X1Response {
    x1: String,
}

#[derive(Deserialize)]
struct UpdatedResponse {
    updated: bool,
}

#[derive(Deserialize)]
struct TransferCompleteResponse {
    transfer_complete: bool,
}

#[derive(Deserialize)]
struct ServerPubkeyResponse {
    server_pubkey: String,
}

#[derive(Deserialize)]
struct ErrorCodeBody {
    code: String,
    #[serde(default)]
    message: String,
}

impl EntityClient for HttpEntityClient {
    async fn get_token(&self) -> Result<Token, TransportError> {
        self.get_json("tokens/token_init").await
    }

    async fn deposit_init(
        &self,
        payload: &DepositInitPayload,
    ) -> Result<DepositInitResult, TransportError> {
        self.post_json("deposit/init/pod", payload).await
    }

    async fn server_config(&self) -> Result<ServerConfig, TransportError> {
        self.get_json("info/config").await
    }

    async fn statechain_info(
        &self,
        statechain_id: &str,
    ) -> Result<Option<StatechainInfo>, TransportError> {
        let url = self.url(&format!("info/statechain/{statechain_id}"));
        let response = self.http.get(&url).send().await?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        Ok(Some(Self::decode(response).await?))
    }

    async fn transfer_sender(
        &self,
        payload: &TransferSenderPayload,
    ) -> Result<String, TransportError> {
        let response: X1Response = self.post_json("transfer/sender", payload).await?;
        Ok(response.x1)
    }

    async fn transfer_update_msg(
        &self,
        payload: &TransferUpdateMsgPayload,
    ) -> Result<bool, TransportError> {
        let response: UpdatedResponse = self.post_json("transfer/update_msg", payload).await?;
        Ok(response.updated)
    }

    async fn transfer_messages(&self, auth_pubkey: &str) -> Result<Vec<String>, TransportError> {
        let response: MsgAddrResponse = self
            .get_json(&format!("transfer/get_msg_addr/{auth_pubkey}"))
            .await?;
        Ok(response.list_enc_transfer_msg)
    }

    async fn transfer_unlock(
        &self,
        payload: &TransferUnlockPayload,
    ) -> Result<(), TransportError> {
        let url = self.url("transfer/unlock");
        let response = self.http.post(&url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn transfer_receiver(
        &self,
        payload: &TransferReceiverPayload,
    ) -> Result<ReceiverOutcome, TransportError> {
        let url = self.url("transfer/receiver");
        let response = self.http.post(&url).json(payload).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let parsed: ServerPubkeyResponse =
                serde_json::from_str(&body).map_err(|e| TransportError::Decode(e.to_string()))?;
            return Ok(ReceiverOutcome::Accepted {
                server_pubkey: parsed.server_pubkey,
            });
        }

        // A 400 with a recognized code is a business outcome, not a
        // transport failure.
        if status.as_u16() == 400 {
            if let Ok(err) = serde_json::from_str::<ErrorCodeBody>(&body) {
                match err.code.as_str() {
                    CODE_BATCH_LOCKED => return Ok(ReceiverOutcome::BatchLocked),
                    CODE_BATCH_EXPIRED => {
                        debug!(message = %err.message, "batch window expired");
                        return Ok(ReceiverOutcome::Expired);
                    }
                    _ => {}
                }
            }
        }

        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn transfer_complete(&self, statechain_id: &str) -> Result<bool, TransportError> {
        let response: TransferCompleteResponse = self
            .get_json(&format!("transfer/receiver/{statechain_id}"))
            .await?;
        Ok(response.transfer_complete)
    }

    async fn withdraw_complete(
        &self,
        payload: &WithdrawCompletePayload,
    ) -> Result<(), TransportError> {
        let url = self.url("withdraw/complete");
        let response = self.http.post(&url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await?;
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
