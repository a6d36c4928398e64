use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::load_wallet;
use crate::backup::{next_tx_n, sort_chain, validate_chain};
use crate::coin::{select_coin_index, Coin, CoinStatus};
use crate::crypto::CryptoFacade;
use crate::entity::{request_new_blinding_contribution, EntityTransport};
use crate::error::{StatechainError, StorageError};
use crate::store::WalletStore;
use crate::wallet::{ActivityAction, Wallet};
use crate::Result;

/// Result of a successful send: the coin now `IN_TRANSFER` and the wallet
/// snapshot that was persisted.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub coin: Coin,
    pub wallet: Wallet,
}

/// Sender side of the transfer handshake.
pub struct TransferSender {
    store: Arc<dyn WalletStore>,
    entity: Arc<dyn EntityTransport>,
    crypto: Arc<dyn CryptoFacade>,
    in_flight: Mutex<HashSet<String>>,
}

/// Marks a statechain id as being sent until dropped
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    statechain_id: String,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<String>>, statechain_id: &str) -> Result<Self> {
        let mut set = in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(statechain_id.to_string()) {
            return Err(StatechainError::TransferInProgress(statechain_id.to_string()));
        }
        Ok(Self {
            in_flight,
            statechain_id: statechain_id.to_string(),
        })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        set.remove(&self.statechain_id);
    }
}

impl TransferSender {
    pub fn new(
        store: Arc<dyn WalletStore>,
        entity: Arc<dyn EntityTransport>,
        crypto: Arc<dyn CryptoFacade>,
    ) -> Self {
        Self {
            store,
            entity,
            crypto,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Transfer the coin behind `statechain_id` to `recipient_address`.
    ///
    /// Nothing is written locally until the entity has acknowledged the
    /// update message. If that write then fails the error is
    /// [`StatechainError::LocalPersistenceDesync`] and carries what should
    /// have been stored.
    pub async fn send(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        recipient_address: &str,
    ) -> Result<TransferOutcome> {
        let _guard = InFlightGuard::acquire(&self.in_flight, statechain_id)?;

        let mut wallet = load_wallet(self.store.as_ref(), wallet_name)?;

        let mut backup_transactions = self.store.get_backup_chain(statechain_id)?;
        if backup_transactions.is_empty() {
            return Err(StatechainError::NoBackupTransactions(statechain_id.to_string()));
        }

        let coin_index = select_coin_index(&wallet.coins, statechain_id)?;
        let coin = &wallet.coins[coin_index];
        if coin.status != CoinStatus::Confirmed {
            return Err(StatechainError::InvalidCoinState {
                statechain_id: statechain_id.to_string(),
                expected: CoinStatus::Confirmed,
                actual: coin.status,
            });
        }

        sort_chain(&mut backup_transactions);
        validate_chain(&backup_transactions, |tx| self.crypto.block_height_of(tx))?;

        let new_tx_n = next_tx_n(&backup_transactions);
        let block_height = self.crypto.block_height_of(&backup_transactions[0])?;
        log::info!(
            "Transferring {} from wallet '{}' (backup tx {}, initial height {})",
            statechain_id,
            wallet_name,
            new_tx_n,
            block_height
        );

        let new_backup = self.crypto.build_next_backup_transaction(
            coin,
            recipient_address,
            backup_transactions.len() as u32,
            block_height,
            wallet.network,
        )?;
        if new_backup.tx_n != new_tx_n {
            return Err(StatechainError::InvalidBackupChain(format!(
                "built backup tx_n {} but expected {}",
                new_backup.tx_n, new_tx_n
            )));
        }
        backup_transactions.push(new_backup);
        validate_chain(&backup_transactions, |tx| self.crypto.block_height_of(tx))?;

        let recipient = self.crypto.decode_transfer_address(recipient_address)?;
        let auth_sig = coin
            .signed_statechain_id
            .as_deref()
            .ok_or_else(|| StatechainError::IncompleteCoin("signed statechain id".into()))?;

        let x1 = request_new_blinding_contribution(
            self.entity.as_ref(),
            statechain_id,
            auth_sig,
            &recipient.auth_pubkey,
        )
        .await?;

        let (utxo_txid, utxo_vout) = coin.outpoint()?;
        let transfer_signature =
            self.crypto
                .sign_transfer(recipient_address, utxo_txid, utxo_vout, &coin.user_privkey)?;

        let update_msg = self.crypto.build_transfer_update_message(
            &x1,
            recipient_address,
            coin,
            &transfer_signature,
            &backup_transactions,
        )?;

        let utxo = coin.utxo()?;
        let amount = coin.amount_sats()?;
        let user_pubkey = coin.user_pubkey.clone();

        let response = match self.entity.transfer_update_msg(&update_msg).await {
            Ok(response) => response,
            Err(StatechainError::EntityRejected(reason)) => {
                log::warn!("Transfer update for {} refused: {}", statechain_id, reason);
                return Err(StatechainError::TransferUpdateRejected(statechain_id.to_string()));
            }
            Err(e) => return Err(e),
        };
        if !response.updated {
            log::warn!("Entity did not accept transfer update for {}", statechain_id);
            return Err(StatechainError::TransferUpdateRejected(statechain_id.to_string()));
        }
        log::info!("Entity accepted transfer update for {}", statechain_id);

        let mut mark_in_transfer = |wallet: &mut Wallet| -> std::result::Result<(), StorageError> {
            let coin = wallet
                .coins
                .iter_mut()
                .find(|c| {
                    c.user_pubkey == user_pubkey && c.statechain_id.as_deref() == Some(statechain_id)
                })
                .ok_or_else(|| StorageError::Conflict(format!("coin for {} is gone", statechain_id)))?;
            coin.transition(CoinStatus::InTransfer)
                .map_err(|e| StorageError::Conflict(e.to_string()))?;
            wallet.record_activity(utxo.clone(), amount, ActivityAction::Transfer);
            Ok(())
        };

        let stored = self.store.commit_with(
            wallet_name,
            statechain_id,
            &backup_transactions,
            &mut mark_in_transfer,
        );
        let wallet = match stored {
            Ok(wallet) => wallet,
            Err(source) => {
                log::error!(
                    "Transfer of {} accepted by the entity but not persisted: {}",
                    statechain_id,
                    source
                );
                if let Err(e) = mark_in_transfer(&mut wallet) {
                    log::warn!("Snapshot of {} could not be brought forward: {}", wallet_name, e);
                }
                return Err(StatechainError::LocalPersistenceDesync {
                    statechain_id: statechain_id.to_string(),
                    backup_chain: backup_transactions,
                    wallet: Box::new(wallet),
                    source,
                });
            }
        };

        let coin = wallet
            .coins
            .iter()
            .find(|c| c.user_pubkey == user_pubkey)
            .cloned()
            .ok_or_else(|| StatechainError::NoCoinForStatechainId(statechain_id.to_string()))?;
        Ok(TransferOutcome { coin, wallet })
    }

    /// Mark a coin sent earlier as taken over by its recipient.
    pub fn complete(&self, wallet_name: &str, statechain_id: &str) -> Result<Coin> {
        let wallet = load_wallet(self.store.as_ref(), wallet_name)?;
        let in_transfer = wallet
            .coins_with_statechain_id(statechain_id)
            .find(|c| c.status == CoinStatus::InTransfer)
            .map(|c| c.user_pubkey.clone());
        let Some(user_pubkey) = in_transfer else {
            let selected = select_coin_index(&wallet.coins, statechain_id)?;
            return Err(StatechainError::InvalidCoinState {
                statechain_id: statechain_id.to_string(),
                expected: CoinStatus::InTransfer,
                actual: wallet.coins[selected].status,
            });
        };

        let wallet = self
            .store
            .modify_wallet(wallet_name, &mut |wallet: &mut Wallet| {
                let coin = wallet
                    .coins
                    .iter_mut()
                    .find(|c| c.user_pubkey == user_pubkey)
                    .ok_or_else(|| StorageError::Conflict(format!("coin for {} is gone", statechain_id)))?;
                coin.transition(CoinStatus::Transferred)
                    .map_err(|e| StorageError::Conflict(e.to_string()))
            })?;
        log::info!("Transfer of {} completed", statechain_id);

        wallet
            .coins
            .into_iter()
            .find(|c| c.user_pubkey == user_pubkey)
            .ok_or_else(|| StatechainError::NoCoinForStatechainId(statechain_id.to_string()))
    }
}
