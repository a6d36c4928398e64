//! Cryptographic operations facade
//!
//! The handshakes never touch curve math directly. Everything that needs
//! keys, signatures or transaction construction goes through
//! [`CryptoFacade`], so the protocol sequencing can be tested against a
//! deterministic implementation and run against [`LocalCrypto`].

pub mod address;
mod local;

pub use local::LocalCrypto;

use bitcoin::Network;
use serde::{Deserialize, Serialize};

use crate::backup::BackupTx;
use crate::coin::Coin;
use crate::entity::TransferUpdateMsg;
use crate::Result;

/// Keys decoded from a recipient's transfer address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferAddress {
    pub user_pubkey: String,
    pub auth_pubkey: String,
}

/// Fresh key material for a coin that has not been funded yet
#[derive(Debug, Clone)]
pub struct CoinKeys {
    pub user_privkey: String,
    pub user_pubkey: String,
    pub auth_privkey: String,
    pub auth_pubkey: String,
}

/// Plaintext of the message a sender leaves for the recipient.
///
/// Travels sealed to the recipient's auth key inside
/// [`TransferUpdateMsg::enc_transfer_msg`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferMsg {
    pub statechain_id: String,
    pub transfer_signature: String,
    pub backup_transactions: Vec<BackupTx>,
    pub t1: String,
    /// Sender's owner public key
    pub user_public_key: String,
    pub recipient_address: String,
    pub utxo_txid: String,
    pub utxo_vout: u32,
    pub amount: u64,
}

pub trait CryptoFacade: Send + Sync {
    /// Locktime (block height) a backup transaction commits to
    fn block_height_of(&self, backup_tx: &BackupTx) -> Result<u32>;

    /// Outpoint (txid, vout) a backup transaction spends
    fn backup_outpoint(&self, backup_tx: &BackupTx) -> Result<(String, u32)>;

    fn decode_transfer_address(&self, address: &str) -> Result<TransferAddress>;

    fn encode_transfer_address(&self, keys: &CoinKeys, network: Network) -> Result<String>;

    fn generate_coin_keys(&self) -> Result<CoinKeys>;

    fn sign_statechain_id(&self, statechain_id: &str, auth_privkey: &str) -> Result<String>;

    /// Signature authorizing `recipient_address` to take over the coin at `utxo_txid:utxo_vout`
    fn sign_transfer(
        &self,
        recipient_address: &str,
        utxo_txid: &str,
        utxo_vout: u32,
        secret_key: &str,
    ) -> Result<String>;

    fn verify_transfer_signature(&self, msg: &TransferMsg) -> Result<bool>;

    /// Build and sign the backup transaction paying the coin to the recipient.
    ///
    /// `chain_length` is the number of backup transactions already in the
    /// chain and `block_height` the locktime of the first one.
    fn build_next_backup_transaction(
        &self,
        coin: &Coin,
        recipient_address: &str,
        chain_length: u32,
        block_height: u32,
        network: Network,
    ) -> Result<BackupTx>;

    /// Check the signature of a backup transaction spending `amount` sats
    /// and that it pays `recipient_user_pubkey`.
    fn verify_backup_transaction(
        &self,
        backup_tx: &BackupTx,
        amount: u64,
        recipient_user_pubkey: &str,
    ) -> Result<bool>;

    fn build_transfer_update_message(
        &self,
        x1: &str,
        recipient_address: &str,
        coin: &Coin,
        transfer_signature: &str,
        backup_transactions: &[BackupTx],
    ) -> Result<TransferUpdateMsg>;

    fn open_transfer_message(&self, enc_transfer_msg: &str, auth_privkey: &str)
        -> Result<TransferMsg>;

    /// Recipient's key-rotation share handed to the entity
    fn compute_t2(&self, msg: &TransferMsg, user_privkey: &str) -> Result<String>;
}
