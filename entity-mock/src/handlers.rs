/// Axum HTTP handlers for the statechain entity transfer endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::state::EntityState;
use crate::types::*;

/// Custom error type for handlers
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, message).into_response()
    }
}

fn require(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("Missing {}", field)));
    }
    Ok(())
}

/// POST /transfer/sender
/// Starts a transfer and returns the entity's blinding contribution
pub async fn transfer_sender(
    State(state): State<EntityState>,
    Json(req): Json<TransferSenderRequest>,
) -> Result<Json<TransferSenderResponse>, ApiError> {
    require("statechain_id", &req.statechain_id)?;
    require("auth_sig", &req.auth_sig)?;
    if !EntityState::is_valid_pubkey(&req.new_user_auth_key) {
        return Err(ApiError::BadRequest(format!(
            "Invalid new_user_auth_key: {}",
            req.new_user_auth_key
        )));
    }

    log::info!("Transfer sender request for {}", req.statechain_id);
    let x1 = state.start_transfer(&req.statechain_id, &req.new_user_auth_key);
    Ok(Json(TransferSenderResponse { x1 }))
}

/// POST /transfer/update_msg
/// Queues the sender's encrypted message for the recipient
pub async fn transfer_update_msg(
    State(state): State<EntityState>,
    Json(req): Json<TransferUpdateMsgRequest>,
) -> Result<Json<TransferUpdateMsgResponse>, ApiError> {
    require("statechain_id", &req.statechain_id)?;
    require("enc_transfer_msg", &req.enc_transfer_msg)?;
    if state.fails_updates() {
        return Err(ApiError::Internal("Key rotation unavailable".to_string()));
    }

    let updated = state.update_msg(&req.statechain_id, &req.new_user_auth_key, &req.enc_transfer_msg);
    log::info!("Transfer update for {}: updated={}", req.statechain_id, updated);
    Ok(Json(TransferUpdateMsgResponse { updated }))
}

/// GET /transfer/get_msg_addr/{auth_pubkey}
/// Lists encrypted messages waiting for a recipient
pub async fn get_msg_addr(
    State(state): State<EntityState>,
    Path(auth_pubkey): Path<String>,
) -> Result<Json<GetMsgAddrResponse>, ApiError> {
    if !EntityState::is_valid_pubkey(&auth_pubkey) {
        return Err(ApiError::BadRequest(format!("Invalid auth pubkey: {}", auth_pubkey)));
    }
    Ok(Json(GetMsgAddrResponse {
        list_enc_transfer_msg: state.messages_for(&auth_pubkey),
    }))
}

/// POST /transfer/receiver
/// Finalises a transfer with the recipient's key share
pub async fn transfer_receiver(
    State(state): State<EntityState>,
    Json(req): Json<TransferReceiverRequest>,
) -> Result<Json<TransferReceiverResponse>, ApiError> {
    require("t2", &req.t2)?;
    require("auth_sig", &req.auth_sig)?;

    if !state.finalize(&req.statechain_id) {
        return Err(ApiError::NotFound(format!(
            "No pending transfer for {}",
            req.statechain_id
        )));
    }

    log::info!("Transfer of {} finalised", req.statechain_id);
    Ok(Json(TransferReceiverResponse {
        server_pubkey: state.server_pubkey().to_string(),
    }))
}

// ============================================================================
// MOCK CONTROL ENDPOINTS (not part of the entity API)
// ============================================================================

/// POST /mock/reject_updates
/// Make every following update_msg answer `updated: false`
pub async fn reject_updates(
    State(state): State<EntityState>,
    Json(req): Json<RejectUpdatesRequest>,
) -> StatusCode {
    log::info!("Rejecting transfer updates: {}", req.reject);
    state.set_reject_updates(req.reject);
    StatusCode::NO_CONTENT
}

/// POST /mock/fail_updates
/// Make every following update_msg answer 500
pub async fn fail_updates(
    State(state): State<EntityState>,
    Json(req): Json<FailUpdatesRequest>,
) -> StatusCode {
    log::info!("Failing transfer updates: {}", req.fail);
    state.set_fail_updates(req.fail);
    StatusCode::NO_CONTENT
}

/// GET /mock/stats
pub async fn stats(State(state): State<EntityState>) -> Json<MockStats> {
    Json(state.stats())
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}
