use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{WalletStore, WalletUpdate};
use crate::backup::BackupTx;
use crate::error::StorageError;
use crate::wallet::Wallet;

const JOURNAL_FILE: &str = "commit.journal.json";
const LOCK_FILE: &str = "store.lock";

/// Held for the duration of a write: the in-process mutex first, then an
/// exclusive `flock` on the lock file so other processes sharing the
/// directory wait too.
struct WriteLock<'a> {
    _local: MutexGuard<'a, ()>,
    file: File,
}

impl Drop for WriteLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::warn!("Failed to release store lock: {}", e);
        }
    }
}

/// Pending commit, written before any of its files are touched
#[derive(Serialize, Deserialize)]
struct Journal {
    wallet: Wallet,
    statechain_id: String,
    backup_chain: Vec<BackupTx>,
}

/// JSON-on-disk store.
///
/// Layout under the base directory:
/// - `wallets/<name>.json`
/// - `backup_txs/<statechain_id>.json`
/// - `commit.journal.json` while a commit is being applied
/// - `store.lock`, locked by whichever process is writing
pub struct FileStore {
    base_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open (or create) a store rooted at `base_path`, finishing any commit
    /// that was interrupted.
    pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let store = Self {
            base_path: base_path.into(),
            write_lock: Mutex::new(()),
        };
        fs::create_dir_all(store.wallets_dir())?;
        fs::create_dir_all(store.backup_dir())?;
        {
            let _lock = store.lock()?;
            store.replay_journal()?;
        }
        Ok(store)
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_path
    }

    fn wallets_dir(&self) -> PathBuf {
        self.base_path.join("wallets")
    }

    fn backup_dir(&self) -> PathBuf {
        self.base_path.join("backup_txs")
    }

    fn journal_path(&self) -> PathBuf {
        self.base_path.join(JOURNAL_FILE)
    }

    fn wallet_path(&self, name: &str) -> Result<PathBuf, StorageError> {
        Ok(self.wallets_dir().join(format!("{}.json", checked_key(name)?)))
    }

    fn backup_path(&self, statechain_id: &str) -> Result<PathBuf, StorageError> {
        Ok(self.backup_dir().join(format!("{}.json", checked_key(statechain_id)?)))
    }

    fn lock(&self) -> Result<WriteLock<'_>, StorageError> {
        let local = self.write_lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.base_path.join(LOCK_FILE))?;
        FileExt::lock_exclusive(&file)?;
        Ok(WriteLock {
            _local: local,
            file,
        })
    }

    fn read_wallet(&self, name: &str) -> Result<Option<Wallet>, StorageError> {
        let path = self.wallet_path(name)?;
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Journal, apply, clear. Caller holds the write lock.
    fn commit_locked(&self, wallet: &Wallet, statechain_id: &str, chain: &[BackupTx]) -> Result<(), StorageError> {
        let journal = Journal {
            wallet: wallet.clone(),
            statechain_id: checked_key(statechain_id)?.to_string(),
            backup_chain: chain.to_vec(),
        };
        write_json_atomic(&self.journal_path(), &journal)?;

        self.apply(wallet, statechain_id, chain)?;
        fs::remove_file(self.journal_path())?;

        log::debug!(
            "Committed wallet '{}' with {} backup txs for {}",
            wallet.name,
            chain.len(),
            statechain_id
        );
        Ok(())
    }

    fn apply(&self, wallet: &Wallet, statechain_id: &str, chain: &[BackupTx]) -> Result<(), StorageError> {
        write_json_atomic(&self.backup_path(statechain_id)?, &chain)?;
        write_json_atomic(&self.wallet_path(&wallet.name)?, wallet)?;
        Ok(())
    }

    fn replay_journal(&self) -> Result<(), StorageError> {
        let path = self.journal_path();
        if !path.exists() {
            return Ok(());
        }

        log::warn!("Found interrupted commit journal at {:?}, replaying", path);
        let journal: Journal = serde_json::from_str(&fs::read_to_string(&path)?)?;
        self.apply(&journal.wallet, &journal.statechain_id, &journal.backup_chain)?;
        fs::remove_file(&path)?;
        log::info!(
            "Replayed commit for wallet '{}' (statechain {})",
            journal.wallet.name,
            journal.statechain_id
        );
        Ok(())
    }
}

impl WalletStore for FileStore {
    fn create_wallet(&self, wallet: &Wallet) -> Result<(), StorageError> {
        let _lock = self.lock()?;
        let path = self.wallet_path(&wallet.name)?;
        if path.exists() {
            return Err(StorageError::WalletExists(wallet.name.clone()));
        }
        write_json_atomic(&path, wallet)
    }

    fn get_wallet(&self, name: &str) -> Result<Option<Wallet>, StorageError> {
        self.read_wallet(name)
    }

    fn list_wallets(&self) -> Result<Vec<String>, StorageError> {
        let mut wallets = Vec::new();
        for entry in fs::read_dir(self.wallets_dir())? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(name) = path.file_stem().and_then(|s| s.to_str()) {
                    wallets.push(name.to_string());
                }
            }
        }
        wallets.sort();
        Ok(wallets)
    }

    fn get_backup_chain(&self, statechain_id: &str) -> Result<Vec<BackupTx>, StorageError> {
        let path = self.backup_path(statechain_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn update_backup_chain(&self, statechain_id: &str, chain: &[BackupTx]) -> Result<(), StorageError> {
        let _lock = self.lock()?;
        write_json_atomic(&self.backup_path(statechain_id)?, &chain)
    }

    fn update_wallet(&self, wallet: &Wallet) -> Result<(), StorageError> {
        let _lock = self.lock()?;
        write_json_atomic(&self.wallet_path(&wallet.name)?, wallet)
    }

    fn commit(&self, wallet: &Wallet, statechain_id: &str, chain: &[BackupTx]) -> Result<(), StorageError> {
        let _lock = self.lock()?;
        self.commit_locked(wallet, statechain_id, chain)
    }

    fn modify_wallet(&self, name: &str, update: &mut WalletUpdate<'_>) -> Result<Wallet, StorageError> {
        let _lock = self.lock()?;
        let mut wallet = self
            .read_wallet(name)?
            .ok_or_else(|| StorageError::MissingWallet(name.to_string()))?;
        update(&mut wallet)?;
        write_json_atomic(&self.wallet_path(name)?, &wallet)?;
        Ok(wallet)
    }

    fn commit_with(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        chain: &[BackupTx],
        update: &mut WalletUpdate<'_>,
    ) -> Result<Wallet, StorageError> {
        let _lock = self.lock()?;
        let mut wallet = self
            .read_wallet(wallet_name)?
            .ok_or_else(|| StorageError::MissingWallet(wallet_name.to_string()))?;
        update(&mut wallet)?;
        self.commit_locked(&wallet, statechain_id, chain)?;
        Ok(wallet)
    }
}

/// Keys become file names, so only a conservative character set is allowed.
fn checked_key(key: &str) -> Result<&str, StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !key.starts_with('.');
    if valid {
        Ok(key)
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

/// Write to a sibling temp file and rename over the target.
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
