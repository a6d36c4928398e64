//! Client configuration from environment variables
//!
//! Controls the statechain entity endpoint, the optional Tor proxy, the
//! Bitcoin network and where wallets are kept on disk.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_ENTITY_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_WALLET_DIR: &str = "./wallets";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Statechain entity base URL
    pub statechain_entity_url: String,
    /// SOCKS proxy for entity requests (e.g. `socks5h://127.0.0.1:9050`)
    pub tor_proxy: Option<String>,
    pub network: bitcoin::Network,
    /// Root directory of the file store
    pub wallet_dir: PathBuf,
    /// Base interval of the receive poller
    pub poll_interval: Duration,
    /// Ceiling for the poller's backoff after the entity is unreachable
    pub max_backoff: Duration,
    /// Blocks each transfer takes off the backup locktime
    pub locktime_interval: u32,
    pub fee_rate_sat_vb: u64,
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `STATECHAIN_ENTITY_URL`: entity endpoint (default `http://127.0.0.1:8000`)
    /// - `TOR_PROXY`: SOCKS proxy URL (optional)
    /// - `BITCOIN_NETWORK`: "bitcoin", "testnet", "signet" (default) or "regtest"
    /// - `WALLET_DIR`: file store directory (default `./wallets`)
    /// - `TRANSFER_POLL_INTERVAL_SECS`: receive poll interval (default 30)
    /// - `LOCKTIME_INTERVAL`: blocks per transfer (default 6)
    /// - `FEE_RATE_SAT_VB`: backup transaction fee rate (default 1)
    /// - `REQUEST_TIMEOUT_SECS`: HTTP timeout (default 30)
    ///
    /// # Examples
    ///
    /// ```bash
    /// BITCOIN_NETWORK=regtest STATECHAIN_ENTITY_URL=http://localhost:8000 statechain receive alice
    /// ```
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let network_str = lookup("BITCOIN_NETWORK")
            .unwrap_or_else(|| "signet".to_string())
            .to_lowercase();
        let network = match network_str.as_str() {
            "bitcoin" | "mainnet" => {
                log::info!("🌐 Using MAINNET network");
                bitcoin::Network::Bitcoin
            }
            "testnet" => {
                log::info!("🌐 Using TESTNET network");
                bitcoin::Network::Testnet
            }
            "regtest" => {
                log::info!("🔧 Using REGTEST network");
                bitcoin::Network::Regtest
            }
            "signet" | "" => {
                log::info!("🌐 Using SIGNET network");
                bitcoin::Network::Signet
            }
            other => {
                log::warn!("⚠️  Unknown network '{}', defaulting to Signet", other);
                bitcoin::Network::Signet
            }
        };

        let statechain_entity_url =
            lookup("STATECHAIN_ENTITY_URL").unwrap_or_else(|| DEFAULT_ENTITY_URL.to_string());
        log::info!("📡 Statechain entity URL: {}", statechain_entity_url);

        let tor_proxy = lookup("TOR_PROXY").filter(|p| !p.trim().is_empty());
        if let Some(ref proxy) = tor_proxy {
            log::info!("🧅 Tor proxy: {}", proxy);
        }

        let wallet_dir = lookup("WALLET_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.wallet_dir);
        log::info!("💾 Wallet directory: {}", wallet_dir.display());

        let poll_interval = Duration::from_secs(nonzero_or(
            &lookup,
            "TRANSFER_POLL_INTERVAL_SECS",
            defaults.poll_interval.as_secs(),
        ));
        let locktime_interval = nonzero_or(&lookup, "LOCKTIME_INTERVAL", defaults.locktime_interval);
        let fee_rate_sat_vb = parsed_or(&lookup, "FEE_RATE_SAT_VB", defaults.fee_rate_sat_vb);
        let request_timeout = Duration::from_secs(nonzero_or(
            &lookup,
            "REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        ));
        log::info!(
            "⏱️  Poll interval {:?}, request timeout {:?}, locktime interval {} blocks, fee rate {} sat/vB",
            poll_interval,
            request_timeout,
            locktime_interval,
            fee_rate_sat_vb
        );

        Self {
            statechain_entity_url,
            tor_proxy,
            network,
            wallet_dir,
            poll_interval,
            max_backoff: poll_interval.max(defaults.max_backoff),
            locktime_interval,
            fee_rate_sat_vb,
            request_timeout,
        }
    }
}

fn parsed_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("⚠️  Invalid {}='{}', using {}", key, raw, default);
            default
        }),
        None => default,
    }
}

/// Like [`parsed_or`], but zero also falls back to the default
fn nonzero_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Copy + std::fmt::Display + Default + PartialEq,
{
    let value = parsed_or(lookup, key, default);
    if value == T::default() {
        log::warn!("⚠️  {} must be greater than zero, using {}", key, default);
        return default;
    }
    value
}

impl Default for ClientConfig {
    /// Local entity on Signet
    fn default() -> Self {
        Self {
            statechain_entity_url: DEFAULT_ENTITY_URL.to_string(),
            tor_proxy: None,
            network: bitcoin::Network::Signet,
            wallet_dir: PathBuf::from(DEFAULT_WALLET_DIR),
            poll_interval: Duration::from_secs(30),
            max_backoff: Duration::from_secs(600),
            locktime_interval: 6,
            fee_rate_sat_vb: 1,
            request_timeout: Duration::from_secs(30),
        }
    }
}
