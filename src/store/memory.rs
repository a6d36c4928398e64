use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{WalletStore, WalletUpdate};
use crate::backup::BackupTx;
use crate::error::StorageError;
use crate::wallet::Wallet;

#[derive(Default)]
struct State {
    wallets: HashMap<String, Wallet>,
    backup_chains: HashMap<String, Vec<BackupTx>>,
}

/// Store kept entirely in memory; one mutex makes every commit atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StorageError> {
        self.state.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl WalletStore for MemoryStore {
    fn create_wallet(&self, wallet: &Wallet) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        if state.wallets.contains_key(&wallet.name) {
            return Err(StorageError::WalletExists(wallet.name.clone()));
        }
        state.wallets.insert(wallet.name.clone(), wallet.clone());
        Ok(())
    }

    fn get_wallet(&self, name: &str) -> Result<Option<Wallet>, StorageError> {
        Ok(self.lock()?.wallets.get(name).cloned())
    }

    fn list_wallets(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.lock()?.wallets.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn get_backup_chain(&self, statechain_id: &str) -> Result<Vec<BackupTx>, StorageError> {
        Ok(self
            .lock()?
            .backup_chains
            .get(statechain_id)
            .cloned()
            .unwrap_or_default())
    }

    fn update_backup_chain(&self, statechain_id: &str, chain: &[BackupTx]) -> Result<(), StorageError> {
        self.lock()?
            .backup_chains
            .insert(statechain_id.to_string(), chain.to_vec());
        Ok(())
    }

    fn update_wallet(&self, wallet: &Wallet) -> Result<(), StorageError> {
        self.lock()?
            .wallets
            .insert(wallet.name.clone(), wallet.clone());
        Ok(())
    }

    fn commit(&self, wallet: &Wallet, statechain_id: &str, chain: &[BackupTx]) -> Result<(), StorageError> {
        let mut state = self.lock()?;
        state
            .backup_chains
            .insert(statechain_id.to_string(), chain.to_vec());
        state.wallets.insert(wallet.name.clone(), wallet.clone());
        Ok(())
    }

    fn modify_wallet(&self, name: &str, update: &mut WalletUpdate<'_>) -> Result<Wallet, StorageError> {
        let mut state = self.lock()?;
        let mut wallet = state
            .wallets
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::MissingWallet(name.to_string()))?;
        update(&mut wallet)?;
        state.wallets.insert(name.to_string(), wallet.clone());
        Ok(wallet)
    }

    fn commit_with(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        chain: &[BackupTx],
        update: &mut WalletUpdate<'_>,
    ) -> Result<Wallet, StorageError> {
        let mut state = self.lock()?;
        let mut wallet = state
            .wallets
            .get(wallet_name)
            .cloned()
            .ok_or_else(|| StorageError::MissingWallet(wallet_name.to_string()))?;
        update(&mut wallet)?;
        state
            .backup_chains
            .insert(statechain_id.to_string(), chain.to_vec());
        state.wallets.insert(wallet_name.to_string(), wallet.clone());
        Ok(wallet)
    }
}
