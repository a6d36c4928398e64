use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;

use statechain_client::{
    ClientConfig, FileStore, HttpEntityClient, LocalCrypto, PollerConfig, ReceivePoller,
    StatechainError, TransferReceiver, TransferSender, Wallet, WalletStore,
};

#[derive(Parser)]
#[command(name = "statechain", about = "Send and receive statechain coins", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create an empty wallet
    Init { wallet: String },
    /// List stored wallets
    List,
    /// Generate a transfer address to receive a coin on
    NewAddress { wallet: String },
    /// Transfer a coin to a recipient's transfer address
    Send {
        wallet: String,
        statechain_id: String,
        recipient_address: String,
    },
    /// Claim pending inbound transfers once
    Receive { wallet: String },
    /// Keep claiming inbound transfers until Ctrl-C
    Watch { wallet: String },
    /// Mark a sent coin as taken over by its recipient
    Complete { wallet: String, statechain_id: String },
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env();

    let store = Arc::new(
        FileStore::open(&config.wallet_dir).context("Failed to open wallet directory")?,
    );
    let entity = Arc::new(HttpEntityClient::from_config(&config)?);
    let crypto = Arc::new(LocalCrypto::from_config(&config));

    match cli.cmd {
        Cmd::Init { wallet } => {
            store.create_wallet(&Wallet::new(wallet.clone(), config.network))?;
            println!("✅ Created wallet '{}' on {}", wallet, config.network);
        }
        Cmd::List => {
            print_json(&store.list_wallets()?)?;
        }
        Cmd::NewAddress { wallet } => {
            let receiver = TransferReceiver::new(store, entity, crypto);
            println!("{}", receiver.new_transfer_address(&wallet)?);
        }
        Cmd::Send {
            wallet,
            statechain_id,
            recipient_address,
        } => {
            let sender = TransferSender::new(store, entity, crypto);
            match sender.send(&wallet, &statechain_id, &recipient_address).await {
                Ok(outcome) => print_json(&outcome.coin)?,
                Err(err) => {
                    if let StatechainError::LocalPersistenceDesync {
                        backup_chain,
                        wallet,
                        ..
                    } = &err
                    {
                        // Needed to reconcile the store by hand
                        eprintln!("{}", serde_json::to_string_pretty(&(backup_chain, wallet))?);
                    }
                    return Err(err.into());
                }
            }
        }
        Cmd::Receive { wallet } => {
            let receiver = TransferReceiver::new(store, entity, crypto);
            print_json(&receiver.receive(&wallet).await?)?;
        }
        Cmd::Watch { wallet } => {
            let receiver = Arc::new(TransferReceiver::new(store, entity, crypto));
            let poller = ReceivePoller::spawn(receiver, wallet, PollerConfig::from_config(&config));

            let mut reports = poller.reports();
            loop {
                tokio::select! {
                    changed = reports.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let report = reports.borrow_and_update().clone();
                        if let Some(report) = report.filter(|r| !r.received.is_empty() || !r.rejected.is_empty()) {
                            print_json(&report)?;
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        log::info!("Ctrl-C received");
                        break;
                    }
                }
            }
            poller.stop().await;
        }
        Cmd::Complete {
            wallet,
            statechain_id,
        } => {
            let sender = TransferSender::new(store, entity, crypto);
            print_json(&sender.complete(&wallet, &statechain_id)?)?;
        }
    }

    Ok(())
}
