// Statechain entity integration
// Typed endpoint schemas and the HTTP client that speaks them

pub mod client;
pub mod types;

pub use client::HttpEntityClient;
pub use types::*;

use async_trait::async_trait;

use crate::error::StatechainError;
use crate::Result;

/// Transport to the statechain entity.
///
/// Implementations decode each response into its typed schema; a payload
/// that does not match surfaces as [`StatechainError::EntityRejected`],
/// a transport failure as [`StatechainError::EntityUnreachable`].
#[async_trait]
pub trait EntityTransport: Send + Sync {
    async fn transfer_sender(&self, request: &TransferSenderRequest) -> Result<TransferSenderResponse>;

    async fn transfer_update_msg(&self, msg: &TransferUpdateMsg) -> Result<TransferUpdateMsgResponse>;

    async fn get_msg_addr(&self, auth_pubkey: &str) -> Result<GetMsgAddrResponse>;

    async fn transfer_receiver(&self, request: &TransferReceiverRequest) -> Result<TransferReceiverResponse>;
}

/// Ask the entity for this transfer's blinding contribution (`x1`).
///
/// Single transfers carry no batch id.
pub async fn request_new_blinding_contribution(
    entity: &dyn EntityTransport,
    statechain_id: &str,
    auth_sig: &str,
    new_user_auth_key: &str,
) -> Result<String> {
    let request = TransferSenderRequest {
        statechain_id: statechain_id.to_string(),
        auth_sig: auth_sig.to_string(),
        new_user_auth_key: new_user_auth_key.to_string(),
        batch_id: None,
    };

    let response = entity.transfer_sender(&request).await?;

    if response.x1.trim().is_empty() {
        return Err(StatechainError::EntityRejected(format!(
            "empty x1 for statechain id {}",
            statechain_id
        )));
    }

    Ok(response.x1)
}
