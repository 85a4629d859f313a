//! The crypto engine boundary for the statechain client.
//!
//! This crate defines [`CoinSigner`], the trait through which the SDK
//! reaches every cryptographic capability it needs: key generation,
//! message signing, key aggregation, transfer message decryption,
//! transfer signatures, funding-output key checks, blind-signature
//! scheme validation, and backup transaction construction.
//!
//! The SDK never performs curve math itself; key material crosses this
//! boundary as opaque hex strings, and transactions as consensus-encoded
//! hex. Implementations typically wrap an enclave-aware MuSig engine;
//! tests substitute a deterministic fake.
//!
//! # Design
//!
//! Methods are synchronous: the engine is expected to hold (or derive)
//! everything it needs locally. Network round-trips belong to the
//! transport layer, not here.

use std::fmt;

use sdk_core::Network;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Errors from crypto engine operations.
///
/// No string payloads -- every variant is a zero-size discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerError {
    /// A provided public or secret key is not valid hex or not on the curve.
    InvalidKey,

    /// Decryption of a transfer message failed (wrong key or tampered
    /// ciphertext).
    DecryptionFailed,

    /// A signing operation failed.
    SigningFailed,

    /// Key aggregation failed.
    AggregationFailed,

    /// A transaction value could not be parsed or constructed.
    InvalidTransaction,

    /// An address could not be parsed or derived.
    InvalidAddress,
}

impl fmt::Display for SignerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey => write!(f, "invalid key material"),
            Self::DecryptionFailed => write!(f, "decryption failed"),
            Self::SigningFailed => write!(f, "signing failed"),
            Self::AggregationFailed => write!(f, "key aggregation failed"),
            Self::InvalidTransaction => write!(f, "invalid transaction"),
            Self::InvalidAddress => write!(f, "invalid address"),
        }
    }
}

impl std::error::Error for SignerError {}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// Fresh key material for one coin.
///
/// All fields are lowercase hex. The `address` is the coin's own bech32m
/// transfer address (user pubkey + auth pubkey).
#[derive(Debug, Clone)]
pub struct CoinKeys {
    /// The user's share of the aggregated key (secret).
    pub user_privkey: String,
    /// The user's share of the aggregated key (public).
    pub user_pubkey: String,
    /// Key used to authenticate with the entity and decrypt messages (secret).
    pub auth_privkey: String,
    /// Key used to authenticate with the entity and decrypt messages (public).
    pub auth_pubkey: String,
    /// The coin's transfer address.
    pub address: String,
}

/// Aggregated key material derived from a user share and a server share.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedKey {
    /// The aggregated public key, hex.
    pub pubkey: String,
    /// The taproot address paying to the aggregated key.
    pub address: String,
}

/// Receiver-side proof material for the `transfer/receiver` call.
#[derive(Debug, Clone)]
pub struct ReceiverAuthProof {
    /// The re-blinded key update value, hex.
    pub t2: String,
    /// Signature over the statechain id with the receiver's auth key, hex.
    pub auth_sig: String,
}

/// A co-signed backup transaction together with the session material the
/// wallet must retain so later holders can validate the blind signature.
#[derive(Debug, Clone)]
pub struct SignedBackupTx {
    /// Consensus-encoded transaction, hex.
    pub tx: String,
    /// Client half of the session nonce pair, hex.
    pub client_public_nonce: String,
    /// Server half of the session nonce pair, hex.
    pub server_public_nonce: String,
    /// Blinding factor of the co-signing session, hex.
    pub blinding_factor: String,
}

/// Everything the engine needs to build one signed backup transaction.
#[derive(Debug, Clone)]
pub struct BackupTxRequest {
    /// Statechain identity of the coin being spent.
    pub statechain_id: String,
    /// Funding outpoint txid, hex.
    pub utxo_txid: String,
    /// Funding outpoint vout.
    pub utxo_vout: u32,
    /// Funding output value in satoshis.
    pub amount: u64,
    /// The user's secret key share, hex.
    pub user_privkey: String,
    /// The user's public key share, hex.
    pub user_pubkey: String,
    /// The server's public key share, hex.
    pub server_pubkey: String,
    /// Destination of this backup transaction.
    pub to_address: String,
    /// Absolute locktime (block height) for this hop.
    pub locktime: u32,
    /// Fee rate in sats/vB.
    pub fee_rate: u64,
    /// Network the transaction is for.
    pub network: Network,
    /// True when the transaction pays a withdrawal destination instead of
    /// a backup address (withdrawals are not time-locked).
    pub is_withdrawal: bool,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Cryptographic capability required by the statechain SDK.
///
/// Implementations must be `Send + Sync` so the SDK can be shared across
/// tasks.
pub trait CoinSigner: Send + Sync {
    /// Generates key material for a new coin at derivation `index`.
    fn new_coin_keys(&self, network: Network, index: u32) -> Result<CoinKeys, SignerError>;

    /// Signs an arbitrary message (typically a statechain id) with the
    /// given auth secret key. Returns the signature as hex.
    fn sign_message(&self, message: &str, auth_privkey: &str) -> Result<String, SignerError>;

    /// Aggregates the user and server public key shares into the shared
    /// taproot output key and its address.
    fn aggregate_key(
        &self,
        user_pubkey: &str,
        server_pubkey: &str,
        network: Network,
    ) -> Result<AggregatedKey, SignerError>;

    /// Decrypts an encrypted transfer message with the auth secret key.
    /// Returns the plaintext bytes (a JSON document owned by the SDK).
    fn decrypt(&self, ciphertext: &[u8], auth_privkey: &str) -> Result<Vec<u8>, SignerError>;

    /// Produces the sender's transfer signature over the recipient
    /// address and the coin's funding outpoint.
    fn create_transfer_signature(
        &self,
        recipient_address: &str,
        utxo_txid: &str,
        utxo_vout: u32,
        user_privkey: &str,
    ) -> Result<String, SignerError>;

    /// Verifies a sender's transfer signature against the funding outpoint
    /// and the new owner's public key.
    fn verify_transfer_signature(
        &self,
        new_user_pubkey: &str,
        sender_pubkey: &str,
        utxo_txid: &str,
        utxo_vout: u32,
        signature: &str,
    ) -> Result<bool, SignerError>;

    /// Checks that the funding output's committed key equals the
    /// aggregate of the entity's enclave key and the sender's share.
    fn validate_funding_output_key(
        &self,
        enclave_pubkey: &str,
        sender_pubkey: &str,
        tx0_hex: &str,
        tx0_vout: u32,
        network: Network,
    ) -> Result<bool, SignerError>;

    /// Verifies the blind-signature scheme of every transaction in one
    /// exit chain against the funding transaction.
    fn verify_backup_signatures(
        &self,
        chain_tx_hexes: &[String],
        tx0_hex: &str,
    ) -> Result<bool, SignerError>;

    /// Derives the receiver-side proof material for `transfer/receiver`.
    fn create_receiver_proof(
        &self,
        statechain_id: &str,
        t1: &[u8; 32],
        user_privkey: &str,
        auth_privkey: &str,
    ) -> Result<ReceiverAuthProof, SignerError>;

    /// Derives the taproot address paying directly to a single public key.
    /// Backup transactions pay the owner's key through this address.
    fn key_address(&self, pubkey: &str, network: Network) -> Result<String, SignerError>;

    /// Builds and co-signs one backup transaction.
    fn build_backup_tx(&self, request: &BackupTxRequest) -> Result<SignedBackupTx, SignerError>;
}
