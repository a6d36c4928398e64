//! Custodial coin model and its status state machine

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::CoinKeys;
use crate::error::StatechainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoinStatus {
    /// Keys and transfer address exist, no statechain assigned yet
    Initialised,
    Confirmed,
    InTransfer,
    Transferred,
}

impl CoinStatus {
    /// Edges of the coin lifecycle. `InTransfer -> Confirmed` is the rollback edge.
    pub fn can_transition_to(self, next: CoinStatus) -> bool {
        matches!(
            (self, next),
            (CoinStatus::Initialised, CoinStatus::Confirmed)
                | (CoinStatus::Confirmed, CoinStatus::InTransfer)
                | (CoinStatus::InTransfer, CoinStatus::Transferred)
                | (CoinStatus::InTransfer, CoinStatus::Confirmed)
        )
    }
}

impl fmt::Display for CoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoinStatus::Initialised => "INITIALISED",
            CoinStatus::Confirmed => "CONFIRMED",
            CoinStatus::InTransfer => "IN_TRANSFER",
            CoinStatus::Transferred => "TRANSFERRED",
        };
        f.write_str(s)
    }
}

/// A UTXO held under statechain custody.
///
/// Key material is kept as hex strings; only the crypto facade interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub statechain_id: Option<String>,
    pub utxo_txid: Option<String>,
    pub utxo_vout: Option<u32>,
    pub amount: Option<u64>,
    pub user_privkey: String,
    pub user_pubkey: String,
    pub auth_privkey: String,
    pub auth_pubkey: String,
    /// Transfer address this coin was received on
    pub address: String,
    pub server_pubkey: Option<String>,
    pub public_nonce: Option<String>,
    pub server_public_nonce: Option<String>,
    pub blinding_factor: Option<String>,
    /// Authorization signature over the statechain id
    pub signed_statechain_id: Option<String>,
    /// Locktime of the backup transaction that pays this coin's owner
    pub locktime: Option<u32>,
    /// Backup chain length at which this coin was materialized
    pub tx_n: u32,
    pub status: CoinStatus,
}

impl Coin {
    /// Create an unfunded coin waiting for an inbound transfer.
    pub fn placeholder(keys: CoinKeys, address: String) -> Self {
        Self {
            statechain_id: None,
            utxo_txid: None,
            utxo_vout: None,
            amount: None,
            user_privkey: keys.user_privkey,
            user_pubkey: keys.user_pubkey,
            auth_privkey: keys.auth_privkey,
            auth_pubkey: keys.auth_pubkey,
            address,
            server_pubkey: None,
            public_nonce: None,
            server_public_nonce: None,
            blinding_factor: None,
            signed_statechain_id: None,
            locktime: None,
            tx_n: 0,
            status: CoinStatus::Initialised,
        }
    }

    pub fn outpoint(&self) -> Result<(&str, u32), StatechainError> {
        let txid = self
            .utxo_txid
            .as_deref()
            .ok_or_else(|| StatechainError::IncompleteCoin("utxo txid".into()))?;
        let vout = self
            .utxo_vout
            .ok_or_else(|| StatechainError::IncompleteCoin("utxo vout".into()))?;
        Ok((txid, vout))
    }

    /// `txid:vout`, as recorded in the activity log
    pub fn utxo(&self) -> Result<String, StatechainError> {
        let (txid, vout) = self.outpoint()?;
        Ok(format!("{}:{}", txid, vout))
    }

    pub fn amount_sats(&self) -> Result<u64, StatechainError> {
        self.amount
            .ok_or_else(|| StatechainError::IncompleteCoin("amount".into()))
    }

    pub fn transition(&mut self, next: CoinStatus) -> Result<(), StatechainError> {
        if !self.status.can_transition_to(next) {
            return Err(StatechainError::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }
        log::debug!(
            "Coin {} status {} -> {}",
            self.statechain_id.as_deref().unwrap_or("<unassigned>"),
            self.status,
            next
        );
        self.status = next;
        Ok(())
    }
}

/// Pick the canonical coin for a statechain id.
///
/// A self-transfer leaves two coins with the same statechain id; the one
/// holding the most recent backup (strictly lowest locktime) wins. Equal
/// locktimes cannot be ordered and are reported instead of guessed.
pub fn select_coin_index(coins: &[Coin], statechain_id: &str) -> Result<usize, StatechainError> {
    let mut candidates: Vec<(usize, u32)> = coins
        .iter()
        .enumerate()
        .filter(|(_, c)| c.statechain_id.as_deref() == Some(statechain_id))
        .map(|(i, c)| (i, c.locktime.unwrap_or(u32::MAX)))
        .collect();

    if candidates.is_empty() {
        return Err(StatechainError::NoCoinForStatechainId(
            statechain_id.to_string(),
        ));
    }

    candidates.sort_by_key(|&(_, locktime)| locktime);

    if let [first, second, ..] = candidates.as_slice() {
        if first.1 == second.1 {
            return Err(StatechainError::AmbiguousCoinSelection {
                statechain_id: statechain_id.to_string(),
                locktime: first.1,
            });
        }
    }

    Ok(candidates[0].0)
}
