//! Statechain client: off-chain UTXO transfers through a statechain entity
//!
//! A coin is a Bitcoin UTXO co-held by its owner and the statechain
//! entity. Ownership moves off-chain: the sender extends the coin's chain
//! of timelocked backup transactions with one paying the recipient, the
//! entity rotates its key share, and the recipient claims the coin.
//!
//! # Architecture
//!
//! - **Transfer**: sender and receiver handshakes plus a background poller
//! - **Backup chain**: `tx_n` sequencing and strictly decreasing locktimes
//! - **Entity**: typed HTTP transport (optionally over Tor)
//! - **Crypto**: facade over keys, signatures and transaction building
//! - **Store**: wallets and backup chains, committed atomically
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use statechain_client::{ClientConfig, FileStore, HttpEntityClient, LocalCrypto, TransferSender};
//!
//! let config = ClientConfig::from_env();
//! let sender = TransferSender::new(
//!     Arc::new(FileStore::open(&config.wallet_dir)?),
//!     Arc::new(HttpEntityClient::from_config(&config)?),
//!     Arc::new(LocalCrypto::from_config(&config)),
//! );
//!
//! let outcome = sender.send("alice", &statechain_id, &recipient_address).await?;
//! ```

// Public modules
pub mod backup;
pub mod coin;
pub mod config;
pub mod crypto;
pub mod entity;
pub mod error;
pub mod store;
pub mod transfer;
pub mod wallet;

// Re-exports for convenience
pub use backup::BackupTx;
pub use coin::{Coin, CoinStatus};
pub use config::ClientConfig;
pub use crypto::{CryptoFacade, LocalCrypto, TransferAddress, TransferMsg};
pub use entity::{EntityTransport, HttpEntityClient};
pub use error::{ErrorCategory, StatechainError, StorageError};
pub use store::{FileStore, MemoryStore, WalletStore};
pub use transfer::{
    PollerConfig, ReceivePoller, ReceiveReport, RejectedTransfer, TransferOutcome,
    TransferReceiver, TransferSender,
};
pub use wallet::{Activity, ActivityAction, Wallet};

// Common result type
pub type Result<T> = std::result::Result<T, StatechainError>;
