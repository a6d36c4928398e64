/// Statechain entity wire types
///
/// Field names match what the client sends and decodes.

use serde::{Deserialize, Serialize};

/// POST /transfer/sender
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSenderRequest {
    pub statechain_id: String,
    pub auth_sig: String,
    pub new_user_auth_key: String,
    pub batch_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSenderResponse {
    pub x1: String,
}

/// POST /transfer/update_msg
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferUpdateMsgRequest {
    pub statechain_id: String,
    pub auth_sig: String,
    pub new_user_auth_key: String,
    pub enc_transfer_msg: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferUpdateMsgResponse {
    pub updated: bool,
}

/// GET /transfer/get_msg_addr/{auth_pubkey}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMsgAddrResponse {
    pub list_enc_transfer_msg: Vec<String>,
}

/// POST /transfer/receiver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceiverRequest {
    pub statechain_id: String,
    pub batch_data: Option<String>,
    pub t2: String,
    pub auth_sig: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReceiverResponse {
    pub server_pubkey: String,
}

/// POST /mock/reject_updates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectUpdatesRequest {
    pub reject: bool,
}

/// POST /mock/fail_updates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailUpdatesRequest {
    pub fail: bool,
}

/// GET /mock/stats
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockStats {
    pub sender_calls: usize,
    pub update_calls: usize,
    pub receiver_calls: usize,
    pub pending_messages: usize,
}
