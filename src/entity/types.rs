// Statechain entity API request/response types

use serde::{Deserialize, Serialize};

/// POST /transfer/sender
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferSenderRequest {
    pub statechain_id: String,
    pub auth_sig: String,          // Signature over the statechain id by the current owner
    pub new_user_auth_key: String, // Recipient's auth public key
    pub batch_id: Option<String>,  // Reserved for batch transfers
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSenderResponse {
    pub x1: String,
}

/// POST /transfer/update_msg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferUpdateMsg {
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
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetMsgAddrResponse {
    pub list_enc_transfer_msg: Vec<String>,
}

/// POST /transfer/receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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
