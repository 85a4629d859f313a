//! Client error type.

use thiserror::Error;

use crate::wallet::CoinStatus;

/// Errors from statechain client operations.
///
/// Local invariant violations each get their own variant carrying the
/// identifying data, so callers (and logs) can name the violated rule
/// without parsing message text. Protocol validation variants abort a
/// single transfer message; everything else is fatal to the operation
/// that raised it.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The SDK's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// A bounded polling loop ran out of time.
    #[error("timed out waiting for confirmation")]
    Timeout,

    /// Wallet store failure.
    #[error("store error: {0}")]
    Store(#[from] storage::StorageError),

    /// Entity or chain-source transport failure.
    #[error("transport error: {0}")]
    Transport(#[from] transport::TransportError),

    /// Crypto engine failure.
    #[error("signer error: {0}")]
    Signer(#[from] signer::SignerError),

    /// A transfer address could not be parsed.
    #[error("transfer address error: {0}")]
    Address(#[from] sdk_core::TransferAddressError),

    /// A coin status change not permitted by the lifecycle.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidStatusTransition {
        /// Status the coin is in.
        from: CoinStatus,
        /// Status that was requested.
        to: CoinStatus,
    },

    /// No coin with the given statechain id exists in the wallet.
    #[error("no coin for statechain {statechain_id}")]
    CoinNotFound {
        /// The statechain id that was looked up.
        statechain_id: String,
    },

    /// No coin with duplicate index 0 in a transferable status exists for
    /// the statechain id.
    #[error("no canonical coin for statechain {statechain_id}")]
    NoCanonicalCoin {
        /// The statechain id that was looked up.
        statechain_id: String,
    },

    /// The statechain has DUPLICATED coins and the send was not forced.
    #[error("statechain {statechain_id} has duplicated coins; pass force to send anyway")]
    DuplicatedNeedsForce {
        /// The statechain id being sent.
        statechain_id: String,
    },

    /// A duplicate coin of this statechain was already withdrawn, so a
    /// receiver would see a signature-count mismatch.
    #[error("duplicate coin at index {index} was withdrawn; statechain can no longer be sent")]
    DuplicateWithdrawn {
        /// Duplicate index of the withdrawn coin.
        index: u32,
    },

    /// A duplicate coin selected for a send is not yet confirmed.
    #[error("duplicate coin at index {index} is not confirmed")]
    DuplicateUnconfirmed {
        /// Duplicate index of the unconfirmed coin.
        index: u32,
    },

    /// An explicitly selected duplicate index does not exist.
    #[error("no duplicate coin at index {index}")]
    UnknownDuplicateIndex {
        /// The requested duplicate index.
        index: u32,
    },

    /// A chain at group index 0 was classified as a duplicate candidate.
    #[error("chain at group index 0 cannot be a duplicate")]
    DuplicateIndexZero,

    /// A duplicate candidate's index skips over an unresolved slot.
    #[error("non-contiguous duplicate index: expected {expected}, found {found}")]
    NonContiguousDuplicateIndex {
        /// The next index the wallet would accept.
        expected: u32,
        /// The index the candidate carried.
        found: u32,
    },

    /// The coin's current backup transaction is already spendable, so
    /// transferring it would hand over an expired chain.
    #[error("coin locktime {locktime} already expired at height {tip_height}")]
    CoinExpired {
        /// The coin's current locktime.
        locktime: u32,
        /// The chain tip height at the time of the check.
        tip_height: u32,
    },

    /// A transaction could not be decoded or has an impossible shape.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Two consecutive backup transactions spend different outpoints.
    #[error("backup chain spends more than one funding outpoint")]
    ChainSpendSourceMismatch,

    /// Backup transaction sequence numbers are not strictly increasing.
    #[error("backup chain tx_n not strictly increasing")]
    ChainSequenceNotIncreasing,

    /// A locktime step does not match the protocol interval.
    #[error("backup chain locktime step broken: expected {expected}, found {found}")]
    ChainLocktimeStep {
        /// Locktime the next transaction should carry.
        expected: u32,
        /// Locktime it actually carries.
        found: u32,
    },

    /// The sender's transfer signature does not verify.
    #[error("transfer signature verification failed")]
    InvalidTransferSignature,

    /// The entity has no record of the statechain.
    #[error("statechain {statechain_id} not found on the entity")]
    StatechainInfoNotFound {
        /// The statechain id that was queried.
        statechain_id: String,
    },

    /// The funding output's committed key does not match the enclave key.
    #[error("funding output key does not commit to the enclave key")]
    EnclaveKeyMismatch,

    /// The latest backup transaction does not pay the new owner's key.
    #[error("latest backup transaction does not pay the new owner")]
    BackupPayeeMismatch,

    /// The entity's signature count disagrees with the chain length.
    #[error("signature count mismatch: entity reports {reported}, chain has {actual}")]
    SignatureCountMismatch {
        /// Count reported by the entity.
        reported: u32,
        /// Number of backup transactions in the message.
        actual: u32,
    },

    /// The blind-signature scheme of a backup chain does not verify.
    #[error("backup chain signature validation failed")]
    InvalidBackupSignatures,

    /// The funding output is no longer unspent.
    #[error("funding output {txid}:{vout} is spent")]
    FundingOutputSpent {
        /// Funding transaction id.
        txid: String,
        /// Funding output index.
        vout: u32,
    },

    /// A backup transaction pays more than the tolerated fee rate.
    #[error("backup transaction fee rate {rate} sat/vB exceeds limit {limit}")]
    FeeRateTooHigh {
        /// Observed fee rate.
        rate: u64,
        /// Maximum the client tolerates.
        limit: u64,
    },

    /// The server reported the transfer's batch window as expired.
    #[error("batch window expired")]
    BatchExpired,

    /// A batch-locked transfer arrived together with duplicate chains.
    #[error("batch-locked transfer carries unresolved duplicates")]
    DuplicateConflictsWithBatchLock,

    /// The entity refused to record the transfer update.
    #[error("entity rejected the transfer update")]
    UpdateMsgRejected,

    /// No confirmed, unspent deposit token is available.
    #[error("no usable deposit token in wallet")]
    NoUsableToken,
}
