//! Wallet persistence boundary.
//!
//! The store holds two kinds of blobs: the wallet aggregate keyed by
//! name, and backup transaction record sets keyed by (wallet name,
//! statechain id). Create fails if the key exists, update fails if it
//! does not; operations use this to catch lost or double writes.

use std::collections::HashMap;
use std::sync::RwLock;

use storage::StorageError;
use transport::entity::BackupTx;

use crate::wallet::Wallet;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Durable keyed storage of wallets and backup chains.
///
/// Implementations must be `Send + Sync`. Writers are not serialized
/// here; concurrent operations against the same wallet name must be
/// serialized by the caller.
pub trait WalletStore: Send + Sync {
    /// Stores a new wallet. Fails with [`StorageError::AlreadyExists`] if
    /// the name is taken.
    fn create_wallet(&self, wallet: &Wallet) -> Result<(), StorageError>;

    /// Replaces an existing wallet. Fails with [`StorageError::NotFound`]
    /// if it was never created.
    fn update_wallet(&self, wallet: &Wallet) -> Result<(), StorageError>;

    /// Loads a wallet by name.
    fn load_wallet(&self, name: &str) -> Result<Wallet, StorageError>;

    /// Stores a new backup record set for (wallet, statechain).
    fn create_backup_txs(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        txs: &[BackupTx],
    ) -> Result<(), StorageError>;

    /// Replaces an existing backup record set.
    fn update_backup_txs(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        txs: &[BackupTx],
    ) -> Result<(), StorageError>;

    /// Loads the backup record set for (wallet, statechain).
    fn load_backup_txs(
        &self,
        wallet_name: &str,
        statechain_id: &str,
    ) -> Result<Vec<BackupTx>, StorageError>;
}

impl<T: WalletStore> WalletStore for std::sync::Arc<T> {
    fn create_wallet(&self, wallet: &Wallet) -> Result<(), StorageError> {
        (**self).create_wallet(wallet)
    }

    fn update_wallet(&self, wallet: &Wallet) -> Result<(), StorageError> {
        (**self).update_wallet(wallet)
    }

    fn load_wallet(&self, name: &str) -> Result<Wallet, StorageError> {
        (**self).load_wallet(name)
    }

    fn create_backup_txs(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        txs: &[BackupTx],
    ) -> Result<(), StorageError> {
        (**self).create_backup_txs(wallet_name, statechain_id, txs)
    }

    fn update_backup_txs(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        txs: &[BackupTx],
    ) -> Result<(), StorageError> {
        (**self).update_backup_txs(wallet_name, statechain_id, txs)
    }

    fn load_backup_txs(
        &self,
        wallet_name: &str,
        statechain_id: &str,
    ) -> Result<Vec<BackupTx>, StorageError> {
        (**self).load_backup_txs(wallet_name, statechain_id)
    }
}

/// Creates the record set if absent, replaces it otherwise.
pub fn save_backup_txs<W: WalletStore + ?Sized>(
    store: &W,
    wallet_name: &str,
    statechain_id: &str,
    txs: &[BackupTx],
) -> Result<(), StorageError> {
    match store.load_backup_txs(wallet_name, statechain_id) {
        Ok(_) => store.update_backup_txs(wallet_name, statechain_id, txs),
        Err(StorageError::NotFound(_)) => store.create_backup_txs(wallet_name, statechain_id, txs),
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// InMemoryWalletStore
// ---------------------------------------------------------------------------

/// In-memory store backed by `RwLock<HashMap>`.
///
/// Suitable for development and testing. For production, implement
/// [`WalletStore`] with a persistent backend.
pub struct InMemoryWalletStore {
    wallets: RwLock<HashMap<String, Wallet>>,
    chains: RwLock<HashMap<(String, String), Vec<BackupTx>>>,
}

impl InMemoryWalletStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            wallets: RwLock::new(HashMap::new()),
            chains: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryWalletStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WalletStore for InMemoryWalletStore {
    fn create_wallet(&self, wallet: &Wallet) -> Result<(), StorageError> {
        let mut map = self.wallets.write().unwrap();
        if map.contains_key(&wallet.name) {
            return Err(StorageError::AlreadyExists(wallet.name.clone()));
        }
        map.insert(wallet.name.clone(), wallet.clone());
        Ok(())
    }

    fn update_wallet(&self, wallet: &Wallet) -> Result<(), StorageError> {
        let mut map = self.wallets.write().unwrap();
        if !map.contains_key(&wallet.name) {
            return Err(StorageError::NotFound(wallet.name.clone()));
        }
        map.insert(wallet.name.clone(), wallet.clone());
        Ok(())
    }

    fn load_wallet(&self, name: &str) -> Result<Wallet, StorageError> {
        self.wallets
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_owned()))
    }

    fn create_backup_txs(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        txs: &[BackupTx],
    ) -> Result<(), StorageError> {
        let key = (wallet_name.to_owned(), statechain_id.to_owned());
        let mut map = self.chains.write().unwrap();
        if map.contains_key(&key) {
            return Err(StorageError::AlreadyExists(format!(
                "{wallet_name}/{statechain_id}"
            )));
        }
        map.insert(key, txs.to_vec());
        Ok(())
    }

    fn update_backup_txs(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        txs: &[BackupTx],
    ) -> Result<(), StorageError> {
        let key = (wallet_name.to_owned(), statechain_id.to_owned());
        let mut map = self.chains.write().unwrap();
        if !map.contains_key(&key) {
            return Err(StorageError::NotFound(format!(
                "{wallet_name}/{statechain_id}"
            )));
        }
        map.insert(key, txs.to_vec());
        Ok(())
    }

    fn load_backup_txs(
        &self,
        wallet_name: &str,
        statechain_id: &str,
    ) -> Result<Vec<BackupTx>, StorageError> {
        self.chains
            .read()
            .unwrap()
            .get(&(wallet_name.to_owned(), statechain_id.to_owned()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{wallet_name}/{statechain_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk_core::Network;

    #[test]
    fn create_fails_when_wallet_exists() {
        let store = InMemoryWalletStore::new();
        let wallet = Wallet::new("w1", Network::Regtest);
        store.create_wallet(&wallet).unwrap();
        assert!(matches!(
            store.create_wallet(&wallet),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn update_fails_when_wallet_absent() {
        let store = InMemoryWalletStore::new();
        let wallet = Wallet::new("w1", Network::Regtest);
        assert!(matches!(
            store.update_wallet(&wallet),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn backup_txs_keyed_by_wallet_and_statechain() {
        let store = InMemoryWalletStore::new();
        store.create_backup_txs("w1", "sc1", &[]).unwrap();
        assert!(store.load_backup_txs("w1", "sc1").is_ok());
        assert!(matches!(
            store.load_backup_txs("w2", "sc1"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn save_creates_then_updates() {
        let store = InMemoryWalletStore::new();
        save_backup_txs(&store, "w1", "sc1", &[]).unwrap();
        save_backup_txs(&store, "w1", "sc1", &[]).unwrap();
    }
}
