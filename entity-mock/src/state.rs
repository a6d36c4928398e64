/// In-memory entity state
///
/// Tracks transfers between the sender's key-rotation request and the
/// receiver's finalisation, and the encrypted messages waiting in each
/// recipient's mailbox.

use bitcoin::secp256k1::{rand, PublicKey, Secp256k1, SecretKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::MockStats;

#[derive(Debug, Clone)]
pub struct PendingTransfer {
    pub new_user_auth_key: String,
    pub x1: String,
}

#[derive(Debug, Clone)]
pub struct MailboxEntry {
    pub statechain_id: String,
    pub enc_transfer_msg: String,
}

#[derive(Default)]
struct Inner {
    pending: HashMap<String, PendingTransfer>,
    /// Keyed by recipient auth pubkey
    mailboxes: HashMap<String, Vec<MailboxEntry>>,
    reject_updates: bool,
    fail_updates: bool,
    stats: MockStats,
}

/// Shared application state
#[derive(Clone)]
pub struct EntityState {
    inner: Arc<Mutex<Inner>>,
    server_pubkey: String,
}

impl Default for EntityState {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityState {
    pub fn new() -> Self {
        let secp = Secp256k1::new();
        let (_, server_pubkey) = secp.generate_keypair(&mut rand::thread_rng());
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            server_pubkey: server_pubkey.to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn server_pubkey(&self) -> &str {
        &self.server_pubkey
    }

    /// Record a key-rotation request and hand out a fresh `x1`.
    pub fn start_transfer(&self, statechain_id: &str, new_user_auth_key: &str) -> String {
        let x1 = SecretKey::new(&mut rand::thread_rng()).display_secret().to_string();
        let mut inner = self.lock();
        inner.stats.sender_calls += 1;
        inner.pending.insert(
            statechain_id.to_string(),
            PendingTransfer {
                new_user_auth_key: new_user_auth_key.to_string(),
                x1: x1.clone(),
            },
        );
        x1
    }

    /// Queue the encrypted message if it matches a pending transfer.
    pub fn update_msg(&self, statechain_id: &str, new_user_auth_key: &str, enc_transfer_msg: &str) -> bool {
        let mut inner = self.lock();
        inner.stats.update_calls += 1;

        if inner.reject_updates {
            return false;
        }
        let matches = inner
            .pending
            .get(statechain_id)
            .map(|p| p.new_user_auth_key == new_user_auth_key)
            .unwrap_or(false);
        if !matches {
            return false;
        }

        inner
            .mailboxes
            .entry(new_user_auth_key.to_string())
            .or_default()
            .push(MailboxEntry {
                statechain_id: statechain_id.to_string(),
                enc_transfer_msg: enc_transfer_msg.to_string(),
            });
        true
    }

    pub fn messages_for(&self, auth_pubkey: &str) -> Vec<String> {
        self.lock()
            .mailboxes
            .get(auth_pubkey)
            .map(|entries| entries.iter().map(|e| e.enc_transfer_msg.clone()).collect())
            .unwrap_or_default()
    }

    /// Finalise a transfer: clears it from the pending set and mailbox.
    pub fn finalize(&self, statechain_id: &str) -> bool {
        let mut inner = self.lock();
        inner.stats.receiver_calls += 1;

        let Some(pending) = inner.pending.remove(statechain_id) else {
            return false;
        };
        if let Some(entries) = inner.mailboxes.get_mut(&pending.new_user_auth_key) {
            entries.retain(|e| e.statechain_id != statechain_id);
        }
        true
    }

    pub fn set_reject_updates(&self, reject: bool) {
        self.lock().reject_updates = reject;
    }

    /// Make update_msg fail outright instead of answering
    pub fn set_fail_updates(&self, fail: bool) {
        self.lock().fail_updates = fail;
    }

    pub fn fails_updates(&self) -> bool {
        self.lock().fail_updates
    }

    /// Drop a message straight into a mailbox, bypassing the handshake.
    pub fn inject_message(&self, auth_pubkey: &str, statechain_id: &str, enc_transfer_msg: &str) {
        let mut inner = self.lock();
        inner.pending.entry(statechain_id.to_string()).or_insert_with(|| PendingTransfer {
            new_user_auth_key: auth_pubkey.to_string(),
            x1: String::new(),
        });
        inner
            .mailboxes
            .entry(auth_pubkey.to_string())
            .or_default()
            .push(MailboxEntry {
                statechain_id: statechain_id.to_string(),
                enc_transfer_msg: enc_transfer_msg.to_string(),
            });
    }

    pub fn stats(&self) -> MockStats {
        let inner = self.lock();
        MockStats {
            pending_messages: inner.mailboxes.values().map(Vec::len).sum(),
            ..inner.stats.clone()
        }
    }

    pub fn is_valid_pubkey(key: &str) -> bool {
        key.parse::<PublicKey>().is_ok()
    }
}
