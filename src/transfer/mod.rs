//! Statechain transfer handshakes
//!
//! - Sender: hand a coin over to a recipient transfer address
//! - Receiver: claim inbound transfers into placeholder coins
//! - Poller: background loop driving the receiver

pub mod poller;
pub mod receiver;
pub mod sender;

pub use poller::{PollerConfig, ReceivePoller};
pub use receiver::{ReceiveReport, RejectedTransfer, TransferReceiver};
pub use sender::{TransferOutcome, TransferSender};

use crate::error::StatechainError;
use crate::store::WalletStore;
use crate::wallet::Wallet;
use crate::Result;

fn load_wallet(store: &dyn WalletStore, wallet_name: &str) -> Result<Wallet> {
    store
        .get_wallet(wallet_name)?
        .ok_or_else(|| StatechainError::WalletNotFound(wallet_name.to_string()))
}
