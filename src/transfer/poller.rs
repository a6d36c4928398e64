//! Background receive loop
//!
//! Runs [`TransferReceiver::receive`] on an interval until stopped. While
//! the entity is unreachable the delay doubles up to a ceiling and snaps
//! back to the base interval after the next successful pass.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::receiver::{ReceiveReport, TransferReceiver};
use crate::config::ClientConfig;
use crate::error::StatechainError;

#[derive(Clone, Debug)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_backoff: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_backoff: Duration::from_secs(10 * 60),
        }
    }
}

impl PollerConfig {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            interval: config.poll_interval,
            max_backoff: config.max_backoff,
        }
    }

    /// Delay after another failed pass, given the delay used before it
    pub fn backoff(&self, current: Duration) -> Duration {
        current
            .max(self.interval)
            .saturating_mul(2)
            .min(self.max_backoff.max(self.interval))
    }
}

/// Handle to a running receive loop
pub struct ReceivePoller {
    shutdown_tx: watch::Sender<bool>,
    reports_rx: watch::Receiver<Option<ReceiveReport>>,
    handle: JoinHandle<()>,
}

impl ReceivePoller {
    /// Start polling for `wallet_name`. The first pass runs immediately.
    pub fn spawn(receiver: Arc<TransferReceiver>, wallet_name: String, config: PollerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (reports_tx, reports_rx) = watch::channel(None);

        log::info!(
            "Receive poller started for '{}' (interval={}s, max_backoff={}s)",
            wallet_name,
            config.interval.as_secs(),
            config.max_backoff.as_secs()
        );

        let handle = tokio::spawn(poll_loop(receiver, wallet_name, config, shutdown_rx, reports_tx));

        Self {
            shutdown_tx,
            reports_rx,
            handle,
        }
    }

    /// Latest report; `None` until the first successful pass
    pub fn reports(&self) -> watch::Receiver<Option<ReceiveReport>> {
        self.reports_rx.clone()
    }

    /// Signal the loop and wait for it to finish its current pass.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.handle.await {
            log::error!("Receive poller task failed: {}", e);
        }
        log::info!("Receive poller stopped");
    }
}

async fn poll_loop(
    receiver: Arc<TransferReceiver>,
    wallet_name: String,
    config: PollerConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    reports_tx: watch::Sender<Option<ReceiveReport>>,
) {
    let mut delay = Duration::ZERO;

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => {
                log::info!("Receive poller shutting down");
                break;
            }
        }

        match receiver.receive(&wallet_name).await {
            Ok(report) => {
                reports_tx.send_replace(Some(report));
                delay = config.interval;
            }
            Err(StatechainError::EntityUnreachable(e)) => {
                delay = config.backoff(delay);
                log::warn!("Entity unreachable ({}), retrying in {}s", e, delay.as_secs());
            }
            Err(e) => {
                log::error!("Receive pass for '{}' failed: {}", wallet_name, e);
                delay = config.interval;
            }
        }
    }
}
