//! Wallet persistence
//!
//! - `WalletStore` trait consumed by the handshakes
//! - In-memory store
//! - File system store with a commit journal

mod file_system;
mod memory;

pub use file_system::FileStore;
pub use memory::MemoryStore;

use crate::backup::BackupTx;
use crate::error::StorageError;
use crate::wallet::Wallet;

/// In-place change to a stored wallet, run while the store is locked
pub type WalletUpdate<'a> = dyn FnMut(&mut Wallet) -> Result<(), StorageError> + 'a;

/// Persistence for wallets and backup chains.
///
/// Backup chains are keyed by statechain id only: a self-transfer reuses
/// the chain the sender extended.
pub trait WalletStore: Send + Sync {
    fn create_wallet(&self, wallet: &Wallet) -> Result<(), StorageError>;

    fn get_wallet(&self, name: &str) -> Result<Option<Wallet>, StorageError>;

    fn list_wallets(&self) -> Result<Vec<String>, StorageError>;

    /// Empty when nothing is stored for `statechain_id`
    fn get_backup_chain(&self, statechain_id: &str) -> Result<Vec<BackupTx>, StorageError>;

    fn update_backup_chain(&self, statechain_id: &str, chain: &[BackupTx]) -> Result<(), StorageError>;

    fn update_wallet(&self, wallet: &Wallet) -> Result<(), StorageError>;

    /// Write a backup chain and a wallet as one unit: either both are
    /// visible afterwards or neither is.
    fn commit(&self, wallet: &Wallet, statechain_id: &str, chain: &[BackupTx]) -> Result<(), StorageError>;

    /// Load the stored wallet, apply `update` and write it back without
    /// letting another writer in between. Returns the wallet as written.
    fn modify_wallet(&self, name: &str, update: &mut WalletUpdate<'_>) -> Result<Wallet, StorageError>;

    /// [`WalletStore::commit`] against the wallet as currently stored, with
    /// `update` applied to it under the same lock.
    fn commit_with(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        chain: &[BackupTx],
        update: &mut WalletUpdate<'_>,
    ) -> Result<Wallet, StorageError>;
}
