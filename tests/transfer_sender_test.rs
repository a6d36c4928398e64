mod common;

use std::sync::Arc;

use common::*;
use statechain_client::{
    ActivityAction, CoinStatus, CryptoFacade, ErrorCategory, LocalCrypto, StatechainError,
    TransferSender, Wallet, WalletStore,
};

const SC1: &str = "sc1";

fn setup_sender() -> (Harness, String) {
    let harness = Harness::new();
    harness.create_wallet("alice");
    harness.create_wallet("bob");
    harness.deposit("alice", SC1);
    let address = harness.receiver.new_transfer_address("bob").unwrap();
    (harness, address)
}

#[tokio::test]
async fn test_send_extends_chain_and_locks_coin() {
    let (harness, address) = setup_sender();
    let activities_before = harness.wallet("alice").activities.len();

    let outcome = harness.sender.send("alice", SC1, &address).await.unwrap();

    let chain = harness.chain(SC1);
    assert_eq!(chain.len(), 2);
    assert_eq!(chain[1].tx_n, 2);
    let locktimes = harness.locktimes(SC1);
    assert_eq!(locktimes[0], INITIAL_HEIGHT);
    assert!(locktimes[1] < 900);

    assert_eq!(
        harness.entity.calls(),
        vec!["transfer/sender", "transfer/update_msg"]
    );

    assert_eq!(outcome.coin.status, CoinStatus::InTransfer);
    let wallet = harness.wallet("alice");
    assert_eq!(wallet.coins[0].status, CoinStatus::InTransfer);
    assert_eq!(wallet.activities.len(), activities_before + 1);
    let activity = wallet.activities.last().unwrap();
    assert_eq!(activity.action, ActivityAction::Transfer);
    assert_eq!(activity.amount, AMOUNT);
    assert_eq!(activity.utxo, format!("{}:0", TXID));
    assert_eq!(outcome.wallet, wallet);
}

#[tokio::test]
async fn test_rejected_update_leaves_state_untouched() {
    let (harness, address) = setup_sender();
    harness.entity.state.set_reject_updates(true);
    let wallet_before = harness.wallet("alice");

    let err = harness.sender.send("alice", SC1, &address).await.unwrap_err();

    assert!(matches!(err, StatechainError::TransferUpdateRejected(ref id) if id == SC1));
    assert_eq!(err.category(), ErrorCategory::Entity);
    assert_eq!(harness.chain(SC1).len(), 1);
    assert_eq!(harness.wallet("alice"), wallet_before);
    assert_eq!(harness.wallet("alice").coins[0].status, CoinStatus::Confirmed);
}

#[tokio::test]
async fn test_selects_min_locktime_coin() {
    let harness = Harness::new();
    harness.create_wallet("alice");
    harness.create_wallet("bob");
    let older = harness.deposit("alice", SC1);

    // Self-transfer already happened: a second coin on sc1 with backup tx 2 at 500
    let mut newer = harness.funded_coin(SC1);
    let wide_interval = LocalCrypto::new(500, 1);
    let tx2 = wide_interval
        .build_next_backup_transaction(&older, &newer.address, 1, INITIAL_HEIGHT, NETWORK)
        .unwrap();
    newer.tx_n = 2;
    newer.locktime = Some(500);

    let mut wallet = harness.wallet("alice");
    wallet.coins.push(newer.clone());
    let mut chain = harness.chain(SC1);
    chain.push(tx2);
    harness.store.commit(&wallet, SC1, &chain).unwrap();
    assert_eq!(harness.locktimes(SC1), vec![1000, 500]);

    let address = harness.receiver.new_transfer_address("bob").unwrap();
    let outcome = harness.sender.send("alice", SC1, &address).await.unwrap();

    assert_eq!(outcome.coin.user_pubkey, newer.user_pubkey);
    let chain = harness.chain(SC1);
    assert_eq!(chain.len(), 3);
    assert_eq!(chain[2].client_public_key, newer.user_pubkey);
    assert!(harness.locktimes(SC1)[2] < 500);

    let wallet = harness.wallet("alice");
    let status_of = |pubkey: &str| {
        wallet
            .coins
            .iter()
            .find(|c| c.user_pubkey == pubkey)
            .map(|c| c.status)
            .unwrap()
    };
    assert_eq!(status_of(&newer.user_pubkey), CoinStatus::InTransfer);
    assert_eq!(status_of(&older.user_pubkey), CoinStatus::Confirmed);
}

#[tokio::test]
async fn test_empty_chain_fails_before_network() {
    let harness = Harness::new();
    harness.create_wallet("alice");
    harness.create_wallet("bob");
    let mut wallet = harness.wallet("alice");
    wallet.coins.push(harness.funded_coin(SC1));
    harness.store.update_wallet(&wallet).unwrap();
    let address = harness.receiver.new_transfer_address("bob").unwrap();

    let err = harness.sender.send("alice", SC1, &address).await.unwrap_err();

    assert!(matches!(err, StatechainError::NoBackupTransactions(_)));
    assert!(err.is_precondition());
    assert!(harness.entity.calls().is_empty());
}

#[tokio::test]
async fn test_second_send_is_refused() {
    let (harness, address) = setup_sender();

    harness.sender.send("alice", SC1, &address).await.unwrap();
    let err = harness.sender.send("alice", SC1, &address).await.unwrap_err();

    assert!(matches!(
        err,
        StatechainError::InvalidCoinState {
            expected: CoinStatus::Confirmed,
            actual: CoinStatus::InTransfer,
            ..
        }
    ));
    assert!(err.is_precondition());
    assert_eq!(harness.chain(SC1).len(), 2);
    assert_eq!(harness.entity.calls().len(), 2);
}

#[tokio::test]
async fn test_commit_failure_reports_desync() {
    let (harness, address) = setup_sender();
    harness.store.fail_commits(true);
    let wallet_before = harness.wallet("alice");

    let err = harness.sender.send("alice", SC1, &address).await.unwrap_err();

    assert!(!err.is_retryable());
    match err {
        StatechainError::LocalPersistenceDesync {
            statechain_id,
            backup_chain,
            wallet,
            ..
        } => {
            assert_eq!(statechain_id, SC1);
            assert_eq!(backup_chain.len(), 2);
            assert_eq!(wallet.coins[0].status, CoinStatus::InTransfer);
            assert_eq!(wallet.activities.len(), wallet_before.activities.len() + 1);
        }
        other => panic!("expected desync, got {}", other),
    }

    // Nothing half-written
    assert_eq!(harness.chain(SC1).len(), 1);
    assert_eq!(harness.wallet("alice"), wallet_before);
}

#[tokio::test]
async fn test_unreachable_entity_mutates_nothing() {
    let (harness, address) = setup_sender();
    harness.entity.set_unreachable(true);
    let wallet_before = harness.wallet("alice");

    let err = harness.sender.send("alice", SC1, &address).await.unwrap_err();

    assert!(matches!(err, StatechainError::EntityUnreachable(_)));
    assert!(err.is_retryable());
    assert_eq!(harness.chain(SC1).len(), 1);
    assert_eq!(harness.wallet("alice"), wallet_before);

    // Nothing held on to the coin: a retry goes through
    harness.entity.set_unreachable(false);
    harness.sender.send("alice", SC1, &address).await.unwrap();
}

#[tokio::test]
async fn test_invalid_recipient_address() {
    let (harness, _) = setup_sender();

    let err = harness
        .sender
        .send("alice", SC1, "tsc1notanaddress")
        .await
        .unwrap_err();

    assert!(matches!(err, StatechainError::InvalidTransferAddress(_)));
    assert!(harness.entity.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_wallet_and_coin() {
    let (harness, address) = setup_sender();

    let err = harness.sender.send("carol", SC1, &address).await.unwrap_err();
    assert!(matches!(err, StatechainError::WalletNotFound(_)));

    // sc2 has a chain but bob holds no coin for it
    harness
        .store
        .update_backup_chain("sc2", &harness.chain(SC1))
        .unwrap();
    let err = harness.sender.send("bob", "sc2", &address).await.unwrap_err();
    assert!(matches!(err, StatechainError::NoCoinForStatechainId(_)));
}

#[tokio::test]
async fn test_complete_after_send() {
    let (harness, address) = setup_sender();

    let err = harness.sender.complete("alice", SC1).unwrap_err();
    assert!(matches!(
        err,
        StatechainError::InvalidCoinState {
            actual: CoinStatus::Confirmed,
            ..
        }
    ));

    harness.sender.send("alice", SC1, &address).await.unwrap();
    let coin = harness.sender.complete("alice", SC1).unwrap();
    assert_eq!(coin.status, CoinStatus::Transferred);
    assert_eq!(harness.wallet("alice").coins[0].status, CoinStatus::Transferred);
}

#[tokio::test]
async fn test_wallet_writes_during_send_are_kept() {
    let (harness, address) = setup_sender();

    // Another writer logs an activity while the update is in flight
    let store = harness.store.clone();
    let entity = InterleavingEntity::new(harness.entity.clone(), move || {
        store
            .modify_wallet("alice", &mut |wallet: &mut Wallet| {
                wallet.record_activity("cc:7".into(), 7, ActivityAction::Receive);
                Ok(())
            })
            .unwrap();
    });
    let sender = TransferSender::new(harness.store.clone(), Arc::new(entity), harness.crypto.clone());

    let outcome = sender.send("alice", SC1, &address).await.unwrap();

    let wallet = harness.wallet("alice");
    let utxos: Vec<&str> = wallet.activities.iter().map(|a| a.utxo.as_str()).collect();
    assert!(utxos.contains(&"cc:7"));
    assert_eq!(utxos.last().copied(), Some(format!("{}:0", TXID).as_str()));
    assert_eq!(wallet.coins[0].status, CoinStatus::InTransfer);
    assert_eq!(outcome.wallet, wallet);
}

#[tokio::test]
async fn test_coin_moved_during_send_is_desync() {
    let (harness, address) = setup_sender();

    // The coin is completed elsewhere before the acknowledgement lands
    let store = harness.store.clone();
    let entity = InterleavingEntity::new(harness.entity.clone(), move || {
        store
            .modify_wallet("alice", &mut |wallet: &mut Wallet| {
                wallet.coins[0].status = CoinStatus::Transferred;
                Ok(())
            })
            .unwrap();
    });
    let sender = TransferSender::new(harness.store.clone(), Arc::new(entity), harness.crypto.clone());

    let err = sender.send("alice", SC1, &address).await.unwrap_err();

    assert!(matches!(err, StatechainError::LocalPersistenceDesync { .. }));
    assert_eq!(harness.chain(SC1).len(), 1);
    assert_eq!(harness.wallet("alice").coins[0].status, CoinStatus::Transferred);
}
