//! Error types for statechain transfer operations
//!
//! Every failure carries enough context for the caller to decide between
//! fixing a precondition, retrying the whole handshake, or handing the
//! coin over to reconciliation.

use thiserror::Error;

use crate::backup::BackupTx;
use crate::coin::CoinStatus;
use crate::wallet::Wallet;

#[derive(Error, Debug)]
pub enum StatechainError {
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("There is no backup transaction for the statechain id {0}")]
    NoBackupTransactions(String),

    #[error("There is no coin for the statechain id {0}")]
    NoCoinForStatechainId(String),

    #[error("Coin status must be {expected} for statechain id {statechain_id}. The current status is {actual}")]
    InvalidCoinState {
        statechain_id: String,
        expected: CoinStatus,
        actual: CoinStatus,
    },

    #[error("Invalid coin status transition: {from} -> {to}")]
    InvalidStatusTransition { from: CoinStatus, to: CoinStatus },

    #[error("Coins for statechain id {statechain_id} share locktime {locktime}")]
    AmbiguousCoinSelection { statechain_id: String, locktime: u32 },

    #[error("Coin is missing {0}")]
    IncompleteCoin(String),

    #[error("A transfer for statechain id {0} is already in progress")]
    TransferInProgress(String),

    #[error("Invalid backup chain: {0}")]
    InvalidBackupChain(String),

    #[error("Invalid transfer address: {0}")]
    InvalidTransferAddress(String),

    #[error("Statechain entity unreachable: {0}")]
    EntityUnreachable(String),

    #[error("Statechain entity rejected request: {0}")]
    EntityRejected(String),

    #[error("Transfer update failed for statechain id {0}")]
    TransferUpdateRejected(String),

    /// The entity acknowledged the transfer but the local store did not
    /// record it. The accepted chain and wallet snapshot are kept so that
    /// reconciliation can rebuild local state.
    #[error("Entity accepted the transfer of {statechain_id} but local persistence failed: {source}")]
    LocalPersistenceDesync {
        statechain_id: String,
        backup_chain: Vec<BackupTx>,
        wallet: Box<Wallet>,
        #[source]
        source: StorageError,
    },

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Wallet already exists: {0}")]
    WalletExists(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Wallet not stored: {0}")]
    MissingWallet(String),

    /// The stored wallet no longer admits the requested change
    #[error("Conflicting wallet update: {0}")]
    Conflict(String),
}

impl From<StorageError> for StatechainError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::MissingWallet(name) => StatechainError::WalletNotFound(name),
            other => StatechainError::Storage(other),
        }
    }
}

/// Coarse classification used by drivers to pick a recovery strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller must fix the input or wallet state; nothing was mutated.
    Precondition,
    /// Network or protocol failure talking to the entity.
    Entity,
    /// Remote side effect happened, local state did not follow.
    Desync,
    /// Local failure (crypto, transaction building, storage, config).
    Local,
}

impl StatechainError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::WalletNotFound(_)
            | Self::NoBackupTransactions(_)
            | Self::NoCoinForStatechainId(_)
            | Self::InvalidCoinState { .. }
            | Self::InvalidStatusTransition { .. }
            | Self::AmbiguousCoinSelection { .. }
            | Self::IncompleteCoin(_)
            | Self::TransferInProgress(_)
            | Self::InvalidBackupChain(_)
            | Self::InvalidTransferAddress(_) => ErrorCategory::Precondition,
            Self::EntityUnreachable(_)
            | Self::EntityRejected(_)
            | Self::TransferUpdateRejected(_) => ErrorCategory::Entity,
            Self::LocalPersistenceDesync { .. } => ErrorCategory::Desync,
            Self::Crypto(_) | Self::Transaction(_) | Self::Storage(_) | Self::Config(_) => {
                ErrorCategory::Local
            }
        }
    }

    pub fn is_precondition(&self) -> bool {
        self.category() == ErrorCategory::Precondition
    }

    /// Whether re-invoking the handshake from scratch is safe.
    pub fn is_retryable(&self) -> bool {
        self.category() != ErrorCategory::Desync
    }
}
