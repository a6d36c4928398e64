//! Backup transaction chain
//!
//! Each transfer appends one pre-signed, timelocked transaction. The chain
//! is keyed by `tx_n` starting at 1 and every later entry must unlock
//! strictly earlier than the one before it, so the newest owner can always
//! broadcast first.

use serde::{Deserialize, Serialize};

use crate::error::StatechainError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupTx {
    pub tx_n: u32,
    /// Consensus-serialized signed transaction, hex
    pub tx: String,
    pub client_public_nonce: String,
    pub server_public_nonce: String,
    pub client_public_key: String,
    pub server_public_key: String,
    pub blinding_factor: String,
}

/// Index the next appended backup transaction will carry.
pub fn next_tx_n(chain: &[BackupTx]) -> u32 {
    chain.len() as u32 + 1
}

pub fn sort_chain(chain: &mut [BackupTx]) {
    chain.sort_by_key(|tx| tx.tx_n);
}

/// Check that the chain is non-empty and `chain[i].tx_n == i + 1`.
pub fn validate_sequence(chain: &[BackupTx]) -> Result<(), StatechainError> {
    if chain.is_empty() {
        return Err(StatechainError::InvalidBackupChain(
            "chain is empty".to_string(),
        ));
    }

    for (i, tx) in chain.iter().enumerate() {
        let expected = i as u32 + 1;
        if tx.tx_n != expected {
            return Err(StatechainError::InvalidBackupChain(format!(
                "expected tx_n {} at position {}, found {}",
                expected, i, tx.tx_n
            )));
        }
    }

    Ok(())
}

/// Check that locktimes strictly decrease as `tx_n` grows.
///
/// Returns the locktimes in chain order.
pub fn validate_locktimes<F>(chain: &[BackupTx], locktime_of: F) -> Result<Vec<u32>, StatechainError>
where
    F: Fn(&BackupTx) -> Result<u32, StatechainError>,
{
    let locktimes = chain
        .iter()
        .map(&locktime_of)
        .collect::<Result<Vec<_>, _>>()?;

    for (pair, txs) in locktimes.windows(2).zip(chain.windows(2)) {
        if pair[1] >= pair[0] {
            return Err(StatechainError::InvalidBackupChain(format!(
                "locktime of tx_n {} ({}) is not below tx_n {} ({})",
                txs[1].tx_n, pair[1], txs[0].tx_n, pair[0]
            )));
        }
    }

    Ok(locktimes)
}

/// Full chain check: contiguous sequence and strictly decreasing locktimes.
pub fn validate_chain<F>(chain: &[BackupTx], locktime_of: F) -> Result<Vec<u32>, StatechainError>
where
    F: Fn(&BackupTx) -> Result<u32, StatechainError>,
{
    validate_sequence(chain)?;
    validate_locktimes(chain, locktime_of)
}
