//! Common test utilities for statechain transfer integration tests
//!
//! This module provides shared test infrastructure including:
//! - An entity transport that drives the entity mock's state in-process
//! - A store wrapper that can fail commits on demand
//! - An entity wrapper that runs a callback mid-handshake
//! - Wallet and funded-coin fixtures built with real keys and transactions

#![allow(dead_code)]

use async_trait::async_trait;
use bitcoin::Network;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use entity_mock::EntityState;
use statechain_client::entity::{
    GetMsgAddrResponse, TransferReceiverRequest, TransferReceiverResponse, TransferSenderRequest,
    TransferSenderResponse, TransferUpdateMsg, TransferUpdateMsgResponse,
};
use statechain_client::{
    BackupTx, Coin, CoinStatus, CryptoFacade, EntityTransport, LocalCrypto, MemoryStore,
    StatechainError, StorageError, TransferReceiver, TransferSender, Wallet, WalletStore,
};
use statechain_client::store::WalletUpdate;

pub const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";
pub const INITIAL_HEIGHT: u32 = 1000;
pub const LOCKTIME_INTERVAL: u32 = 300;
pub const AMOUNT: u64 = 100_000;
pub const NETWORK: Network = Network::Regtest;

pub fn init_logging() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init()
        .ok();
}

/// Entity transport calling straight into the mock's state
pub struct LoopbackEntity {
    pub state: EntityState,
    calls: Mutex<Vec<&'static str>>,
    unreachable: AtomicBool,
}

impl LoopbackEntity {
    pub fn new() -> Self {
        Self {
            state: EntityState::new(),
            calls: Mutex::new(Vec::new()),
            unreachable: AtomicBool::new(false),
        }
    }

    /// Endpoints hit so far, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn record(&self, endpoint: &'static str) -> statechain_client::Result<()> {
        self.calls.lock().unwrap().push(endpoint);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StatechainError::EntityUnreachable(format!(
                "{}: connection refused",
                endpoint
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityTransport for LoopbackEntity {
    async fn transfer_sender(
        &self,
        request: &TransferSenderRequest,
    ) -> statechain_client::Result<TransferSenderResponse> {
        self.record("transfer/sender")?;
        let x1 = self
            .state
            .start_transfer(&request.statechain_id, &request.new_user_auth_key);
        Ok(TransferSenderResponse { x1 })
    }

    async fn transfer_update_msg(
        &self,
        msg: &TransferUpdateMsg,
    ) -> statechain_client::Result<TransferUpdateMsgResponse> {
        self.record("transfer/update_msg")?;
        let updated = self.state.update_msg(
            &msg.statechain_id,
            &msg.new_user_auth_key,
            &msg.enc_transfer_msg,
        );
        Ok(TransferUpdateMsgResponse { updated })
    }

    async fn get_msg_addr(&self, auth_pubkey: &str) -> statechain_client::Result<GetMsgAddrResponse> {
        self.record("transfer/get_msg_addr")?;
        Ok(GetMsgAddrResponse {
            list_enc_transfer_msg: self.state.messages_for(auth_pubkey),
        })
    }

    async fn transfer_receiver(
        &self,
        request: &TransferReceiverRequest,
    ) -> statechain_client::Result<TransferReceiverResponse> {
        self.record("transfer/receiver")?;
        if !self.state.finalize(&request.statechain_id) {
            return Err(StatechainError::EntityRejected(format!(
                "no pending transfer for {}",
                request.statechain_id
            )));
        }
        Ok(TransferReceiverResponse {
            server_pubkey: self.state.server_pubkey().to_string(),
        })
    }
}

/// Memory store whose commits can be made to fail
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryStore,
    fail_commit: AtomicBool,
}

impl FailingStore {
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }
}

impl WalletStore for FailingStore {
    fn create_wallet(&self, wallet: &Wallet) -> Result<(), StorageError> {
        self.inner.create_wallet(wallet)
    }

    fn get_wallet(&self, name: &str) -> Result<Option<Wallet>, StorageError> {
        self.inner.get_wallet(name)
    }

    fn list_wallets(&self) -> Result<Vec<String>, StorageError> {
        self.inner.list_wallets()
    }

    fn get_backup_chain(&self, statechain_id: &str) -> Result<Vec<BackupTx>, StorageError> {
        self.inner.get_backup_chain(statechain_id)
    }

    fn update_backup_chain(&self, statechain_id: &str, chain: &[BackupTx]) -> Result<(), StorageError> {
        self.inner.update_backup_chain(statechain_id, chain)
    }

    fn update_wallet(&self, wallet: &Wallet) -> Result<(), StorageError> {
        self.inner.update_wallet(wallet)
    }

    fn commit(&self, wallet: &Wallet, statechain_id: &str, chain: &[BackupTx]) -> Result<(), StorageError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.commit(wallet, statechain_id, chain)
    }

    fn modify_wallet(&self, name: &str, update: &mut WalletUpdate<'_>) -> Result<Wallet, StorageError> {
        self.inner.modify_wallet(name, update)
    }

    fn commit_with(
        &self,
        wallet_name: &str,
        statechain_id: &str,
        chain: &[BackupTx],
        update: &mut WalletUpdate<'_>,
    ) -> Result<Wallet, StorageError> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.inner.commit_with(wallet_name, statechain_id, chain, update)
    }
}

/// Loopback entity that runs `before_ack` just before acknowledging an
/// update or finalising a transfer, standing in for another writer
/// touching the wallet while a handshake waits on the network.
pub struct InterleavingEntity {
    pub inner: Arc<LoopbackEntity>,
    before_ack: Box<dyn Fn() + Send + Sync>,
}

impl InterleavingEntity {
    pub fn new(inner: Arc<LoopbackEntity>, before_ack: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner,
            before_ack: Box::new(before_ack),
        }
    }
}

#[async_trait]
impl EntityTransport for InterleavingEntity {
    async fn transfer_sender(
        &self,
        request: &TransferSenderRequest,
    ) -> statechain_client::Result<TransferSenderResponse> {
        self.inner.transfer_sender(request).await
    }

    async fn transfer_update_msg(
        &self,
        msg: &TransferUpdateMsg,
    ) -> statechain_client::Result<TransferUpdateMsgResponse> {
        (self.before_ack)();
        self.inner.transfer_update_msg(msg).await
    }

    async fn get_msg_addr(&self, auth_pubkey: &str) -> statechain_client::Result<GetMsgAddrResponse> {
        self.inner.get_msg_addr(auth_pubkey).await
    }

    async fn transfer_receiver(
        &self,
        request: &TransferReceiverRequest,
    ) -> statechain_client::Result<TransferReceiverResponse> {
        (self.before_ack)();
        self.inner.transfer_receiver(request).await
    }
}

/// Sender and receiver wired to one store, one entity and real crypto
pub struct Harness {
    pub store: Arc<FailingStore>,
    pub entity: Arc<LoopbackEntity>,
    pub crypto: Arc<LocalCrypto>,
    pub sender: TransferSender,
    pub receiver: Arc<TransferReceiver>,
}

impl Harness {
    pub fn new() -> Self {
        init_logging();

        let store = Arc::new(FailingStore::default());
        let entity = Arc::new(LoopbackEntity::new());
        let crypto = Arc::new(LocalCrypto::new(LOCKTIME_INTERVAL, 1));

        Self {
            sender: TransferSender::new(store.clone(), entity.clone(), crypto.clone()),
            receiver: Arc::new(TransferReceiver::new(
                store.clone(),
                entity.clone(),
                crypto.clone(),
            )),
            store,
            entity,
            crypto,
        }
    }

    pub fn create_wallet(&self, name: &str) {
        self.store.create_wallet(&Wallet::new(name, NETWORK)).unwrap();
    }

    pub fn wallet(&self, name: &str) -> Wallet {
        self.store.get_wallet(name).unwrap().unwrap()
    }

    pub fn chain(&self, statechain_id: &str) -> Vec<BackupTx> {
        self.store.get_backup_chain(statechain_id).unwrap()
    }

    pub fn locktimes(&self, statechain_id: &str) -> Vec<u32> {
        self.chain(statechain_id)
            .iter()
            .map(|tx| self.crypto.block_height_of(tx).unwrap())
            .collect()
    }

    /// A confirmed coin on `statechain_id` with fresh keys, not yet stored
    pub fn funded_coin(&self, statechain_id: &str) -> Coin {
        let keys = self.crypto.generate_coin_keys().unwrap();
        let address = self.crypto.encode_transfer_address(&keys, NETWORK).unwrap();

        let mut coin = Coin::placeholder(keys, address);
        coin.statechain_id = Some(statechain_id.to_string());
        coin.utxo_txid = Some(TXID.to_string());
        coin.utxo_vout = Some(0);
        coin.amount = Some(AMOUNT);
        coin.server_pubkey = Some(self.entity.state.server_pubkey().to_string());
        coin.signed_statechain_id = Some(
            self.crypto
                .sign_statechain_id(statechain_id, &coin.auth_privkey)
                .unwrap(),
        );
        coin.status = CoinStatus::Confirmed;
        coin
    }

    /// Store a deposited coin: confirmed, with a one-entry backup chain
    /// locked at [`INITIAL_HEIGHT`] paying the coin's own key.
    pub fn deposit(&self, wallet_name: &str, statechain_id: &str) -> Coin {
        let mut coin = self.funded_coin(statechain_id);
        let backup = self
            .crypto
            .build_next_backup_transaction(&coin, &coin.address, 0, INITIAL_HEIGHT, NETWORK)
            .unwrap();
        coin.tx_n = 1;
        coin.locktime = Some(INITIAL_HEIGHT);

        let mut wallet = self.wallet(wallet_name);
        wallet.coins.push(coin.clone());
        self.store.commit(&wallet, statechain_id, &[backup]).unwrap();
        coin
    }

    /// Start a transfer of `signer`'s coin to `address` with the entity and
    /// build the update message carrying `chain`, without queueing it.
    pub fn build_update(&self, signer: &Coin, address: &str, chain: &[BackupTx]) -> TransferUpdateMsg {
        let statechain_id = signer.statechain_id.clone().unwrap();
        let recipient = self.crypto.decode_transfer_address(address).unwrap();
        let x1 = self
            .entity
            .state
            .start_transfer(&statechain_id, &recipient.auth_pubkey);
        let (utxo_txid, utxo_vout) = signer.outpoint().unwrap();
        let signature = self
            .crypto
            .sign_transfer(address, utxo_txid, utxo_vout, &signer.user_privkey)
            .unwrap();
        self.crypto
            .build_transfer_update_message(&x1, address, signer, &signature, chain)
            .unwrap()
    }

    /// Queue an update message in the recipient's mailbox
    pub fn queue_update(&self, update: &TransferUpdateMsg) {
        assert!(self.entity.state.update_msg(
            &update.statechain_id,
            &update.new_user_auth_key,
            &update.enc_transfer_msg
        ));
    }

    /// Auth pubkey of the wallet's placeholder holding `address`
    pub fn auth_pubkey_for(&self, wallet_name: &str, address: &str) -> String {
        self.wallet(wallet_name)
            .coins
            .iter()
            .find(|c| c.address == address)
            .map(|c| c.auth_pubkey.clone())
            .unwrap()
    }
}
