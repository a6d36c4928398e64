use serde::Serialize;
use std::sync::Arc;

use super::load_wallet;
use crate::backup::{sort_chain, validate_chain, BackupTx};
use crate::coin::{Coin, CoinStatus};
use crate::crypto::{CryptoFacade, TransferMsg};
use crate::entity::{EntityTransport, TransferReceiverRequest};
use crate::error::{StatechainError, StorageError};
use crate::store::WalletStore;
use crate::wallet::{ActivityAction, Wallet};
use crate::Result;

/// Outcome of one receive pass over a wallet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReceiveReport {
    /// Statechain ids claimed in this pass
    pub received: Vec<String>,
    /// Statechain ids already held at the same `tx_n`
    pub duplicates: Vec<String>,
    pub rejected: Vec<RejectedTransfer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedTransfer {
    /// Unknown when the message could not be opened
    pub statechain_id: Option<String>,
    pub reason: String,
}

enum MessageOutcome {
    Received(String),
    Duplicate(String),
    Rejected(RejectedTransfer),
}

impl MessageOutcome {
    fn rejected(statechain_id: Option<&str>, reason: impl ToString) -> Self {
        MessageOutcome::Rejected(RejectedTransfer {
            statechain_id: statechain_id.map(str::to_string),
            reason: reason.to_string(),
        })
    }
}

/// Receiver side of the transfer handshake.
pub struct TransferReceiver {
    store: Arc<dyn WalletStore>,
    entity: Arc<dyn EntityTransport>,
    crypto: Arc<dyn CryptoFacade>,
}

impl TransferReceiver {
    pub fn new(
        store: Arc<dyn WalletStore>,
        entity: Arc<dyn EntityTransport>,
        crypto: Arc<dyn CryptoFacade>,
    ) -> Self {
        Self {
            store,
            entity,
            crypto,
        }
    }

    /// Generate fresh keys, persist an `INITIALISED` placeholder coin for
    /// them and return its transfer address.
    pub fn new_transfer_address(&self, wallet_name: &str) -> Result<String> {
        let network = load_wallet(self.store.as_ref(), wallet_name)?.network;

        let keys = self.crypto.generate_coin_keys()?;
        let address = self.crypto.encode_transfer_address(&keys, network)?;

        let mut placeholder = Some(Coin::placeholder(keys, address.clone()));
        self.store.modify_wallet(wallet_name, &mut |wallet: &mut Wallet| {
            wallet.coins.extend(placeholder.take());
            Ok(())
        })?;

        log::info!("New transfer address for wallet '{}': {}", wallet_name, address);
        Ok(address)
    }

    /// Claim every pending transfer addressed to this wallet's placeholders.
    ///
    /// Messages that fail validation are reported and leave no trace in the
    /// store. An unreachable entity aborts the pass.
    pub async fn receive(&self, wallet_name: &str) -> Result<ReceiveReport> {
        let wallet = load_wallet(self.store.as_ref(), wallet_name)?;
        let auth_pubkeys: Vec<String> = wallet
            .coins
            .iter()
            .filter(|c| c.status == CoinStatus::Initialised)
            .map(|c| c.auth_pubkey.clone())
            .collect();

        let mut report = ReceiveReport::default();

        for auth_pubkey in auth_pubkeys {
            let response = self.entity.get_msg_addr(&auth_pubkey).await?;
            if response.list_enc_transfer_msg.is_empty() {
                continue;
            }
            log::debug!(
                "{} pending transfer message(s) for {}",
                response.list_enc_transfer_msg.len(),
                auth_pubkey
            );

            for enc_msg in &response.list_enc_transfer_msg {
                match self.process_message(wallet_name, &auth_pubkey, enc_msg).await? {
                    MessageOutcome::Received(id) => report.received.push(id),
                    MessageOutcome::Duplicate(id) => report.duplicates.push(id),
                    MessageOutcome::Rejected(rejected) => {
                        log::warn!(
                            "Rejected transfer {}: {}",
                            rejected.statechain_id.as_deref().unwrap_or("<unreadable>"),
                            rejected.reason
                        );
                        report.rejected.push(rejected);
                    }
                }
            }
        }

        if !report.received.is_empty() {
            log::info!(
                "Wallet '{}' received {} coin(s)",
                wallet_name,
                report.received.len()
            );
        }
        Ok(report)
    }

    async fn process_message(
        &self,
        wallet_name: &str,
        auth_pubkey: &str,
        enc_msg: &str,
    ) -> Result<MessageOutcome> {
        // Earlier messages in the same pass may have changed the wallet
        let mut wallet = load_wallet(self.store.as_ref(), wallet_name)?;
        let Some(coin_index) = wallet.coins.iter().position(|c| c.auth_pubkey == auth_pubkey) else {
            return Ok(MessageOutcome::rejected(None, "no coin holds this auth key"));
        };
        let coin = &wallet.coins[coin_index];

        let msg = match self.crypto.open_transfer_message(enc_msg, &coin.auth_privkey) {
            Ok(msg) => msg,
            Err(e) => return Ok(MessageOutcome::rejected(None, e)),
        };
        let statechain_id = msg.statechain_id.clone();
        let tx_n = msg.backup_transactions.len() as u32;

        let duplicate = wallet
            .coins
            .iter()
            .any(|c| c.statechain_id.as_deref() == Some(statechain_id.as_str()) && c.tx_n == tx_n);
        if duplicate {
            log::debug!("Transfer {} at tx_n {} already received", statechain_id, tx_n);
            return Ok(MessageOutcome::Duplicate(statechain_id));
        }

        if coin.status != CoinStatus::Initialised {
            return Ok(MessageOutcome::rejected(
                Some(&statechain_id),
                format!("transfer address already used by a {} coin", coin.status),
            ));
        }

        let prepared = self.validate_message(&msg, coin).and_then(|(chain, locktime)| {
            let t2 = self.crypto.compute_t2(&msg, &coin.user_privkey)?;
            let auth_sig = self.crypto.sign_statechain_id(&statechain_id, &coin.auth_privkey)?;
            Ok((chain, locktime, t2, auth_sig))
        });
        let (backup_transactions, locktime, t2, auth_sig) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return Ok(MessageOutcome::rejected(Some(&statechain_id), e)),
        };

        let request = TransferReceiverRequest {
            statechain_id: statechain_id.clone(),
            batch_data: None,
            t2,
            auth_sig: auth_sig.clone(),
        };
        let response = match self.entity.transfer_receiver(&request).await {
            Ok(response) => response,
            Err(StatechainError::EntityRejected(reason)) => {
                return Ok(MessageOutcome::rejected(Some(&statechain_id), reason));
            }
            Err(e) => return Err(e),
        };

        let mut claim = |wallet: &mut Wallet| -> std::result::Result<(), StorageError> {
            let coin = wallet
                .coins
                .iter_mut()
                .find(|c| c.auth_pubkey == auth_pubkey && c.status == CoinStatus::Initialised)
                .ok_or_else(|| {
                    StorageError::Conflict(format!("placeholder for {} was claimed meanwhile", statechain_id))
                })?;
            coin.statechain_id = Some(statechain_id.clone());
            coin.utxo_txid = Some(msg.utxo_txid.clone());
            coin.utxo_vout = Some(msg.utxo_vout);
            coin.amount = Some(msg.amount);
            coin.server_pubkey = Some(response.server_pubkey.clone());
            coin.signed_statechain_id = Some(auth_sig.clone());
            coin.locktime = Some(locktime);
            coin.tx_n = tx_n;
            coin.transition(CoinStatus::Confirmed)
                .map_err(|e| StorageError::Conflict(e.to_string()))?;

            let utxo = coin.utxo().map_err(|e| StorageError::Conflict(e.to_string()))?;
            wallet.record_activity(utxo, msg.amount, ActivityAction::Receive);
            Ok(())
        };

        let stored = self
            .store
            .commit_with(wallet_name, &statechain_id, &backup_transactions, &mut claim);
        if let Err(source) = stored {
            log::error!(
                "Transfer {} finalised with the entity but not persisted: {}",
                statechain_id,
                source
            );
            if let Err(e) = claim(&mut wallet) {
                log::warn!("Snapshot of {} could not be brought forward: {}", wallet_name, e);
            }
            return Err(StatechainError::LocalPersistenceDesync {
                statechain_id,
                backup_chain: backup_transactions,
                wallet: Box::new(wallet),
                source,
            });
        }

        log::info!("Received {} ({} sats, backup tx {})", statechain_id, msg.amount, tx_n);
        Ok(MessageOutcome::Received(statechain_id))
    }

    /// Check a transfer message against the placeholder it claims.
    ///
    /// Every backup transaction must spend the message's outpoint for its
    /// amount and pay the key that signs the next one; the newest pays this
    /// placeholder. Returns the ordered chain and the locktime of its
    /// newest entry.
    fn validate_message(&self, msg: &TransferMsg, coin: &Coin) -> Result<(Vec<BackupTx>, u32)> {
        if msg.recipient_address != coin.address {
            return Err(StatechainError::InvalidTransferAddress(format!(
                "message is for {}, not {}",
                msg.recipient_address, coin.address
            )));
        }

        let mut chain = msg.backup_transactions.clone();
        sort_chain(&mut chain);
        let locktimes = validate_chain(&chain, |tx| self.crypto.block_height_of(tx))?;

        let (Some(last), Some(&locktime)) = (chain.last(), locktimes.last()) else {
            return Err(StatechainError::InvalidBackupChain("chain is empty".into()));
        };

        if last.client_public_key != msg.user_public_key {
            return Err(StatechainError::InvalidBackupChain(format!(
                "backup tx {} is not signed by the sender",
                last.tx_n
            )));
        }

        for (index, backup_tx) in chain.iter().enumerate() {
            let (txid, vout) = self.crypto.backup_outpoint(backup_tx)?;
            if txid != msg.utxo_txid || vout != msg.utxo_vout {
                return Err(StatechainError::InvalidBackupChain(format!(
                    "backup tx {} spends {}:{}, not the transferred coin {}:{}",
                    backup_tx.tx_n, txid, vout, msg.utxo_txid, msg.utxo_vout
                )));
            }

            let next_owner = chain
                .get(index + 1)
                .map(|next| next.client_public_key.as_str())
                .unwrap_or(coin.user_pubkey.as_str());
            if !self
                .crypto
                .verify_backup_transaction(backup_tx, msg.amount, next_owner)?
            {
                return Err(StatechainError::InvalidBackupChain(format!(
                    "backup tx {} is not a valid spend of {} sats to its next owner",
                    backup_tx.tx_n, msg.amount
                )));
            }
        }

        if !self.crypto.verify_transfer_signature(msg)? {
            return Err(StatechainError::Crypto("invalid transfer signature".into()));
        }

        Ok((chain, locktime))
    }
}
