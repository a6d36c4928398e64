//! Wallet container: coins plus an append-only activity log

use bitcoin::Network;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::coin::Coin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityAction {
    Transfer,
    Receive,
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActivityAction::Transfer => f.write_str("Transfer"),
            ActivityAction::Receive => f.write_str("Receive"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub utxo: String,
    pub amount: u64,
    pub action: ActivityAction,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    pub name: String,
    pub network: Network,
    pub coins: Vec<Coin>,
    pub activities: Vec<Activity>,
}

impl Wallet {
    pub fn new(name: impl Into<String>, network: Network) -> Self {
        Self {
            name: name.into(),
            network,
            coins: Vec::new(),
            activities: Vec::new(),
        }
    }

    pub fn coins_with_statechain_id<'a>(
        &'a self,
        statechain_id: &'a str,
    ) -> impl Iterator<Item = &'a Coin> + 'a {
        self.coins
            .iter()
            .filter(move |c| c.statechain_id.as_deref() == Some(statechain_id))
    }

    pub fn record_activity(&mut self, utxo: String, amount: u64, action: ActivityAction) {
        self.activities.push(Activity {
            utxo,
            amount,
            action,
            date: Utc::now(),
        });
    }
}
