//! Transfer address encoding
//!
//! A transfer address is bech32m over `version || owner pubkey || auth pubkey`
//! (1 + 33 + 33 bytes). The hrp is `sc` on mainnet and `tsc` elsewhere.

use bitcoin::bech32::primitives::decode::CheckedHrpstring;
use bitcoin::bech32::{self, Bech32m, Hrp};
use bitcoin::secp256k1::PublicKey;
use bitcoin::Network;

use crate::error::StatechainError;

const VERSION: u8 = 0;
const PAYLOAD_LEN: usize = 1 + 33 + 33;

pub fn hrp_for(network: Network) -> &'static str {
    match network {
        Network::Bitcoin => "sc",
        _ => "tsc",
    }
}

pub fn encode(
    network: Network,
    user_pubkey: &PublicKey,
    auth_pubkey: &PublicKey,
) -> Result<String, StatechainError> {
    let hrp = Hrp::parse(hrp_for(network))
        .map_err(|e| StatechainError::InvalidTransferAddress(e.to_string()))?;

    let mut data = Vec::with_capacity(PAYLOAD_LEN);
    data.push(VERSION);
    data.extend_from_slice(&user_pubkey.serialize());
    data.extend_from_slice(&auth_pubkey.serialize());

    bech32::encode::<Bech32m>(hrp, &data)
        .map_err(|e| StatechainError::InvalidTransferAddress(e.to_string()))
}

/// Decode a transfer address into `(owner pubkey, auth pubkey)`.
pub fn decode(address: &str) -> Result<(PublicKey, PublicKey), StatechainError> {
    let checked = CheckedHrpstring::new::<Bech32m>(address)
        .map_err(|e| StatechainError::InvalidTransferAddress(format!("{}: {}", address, e)))?;

    let hrp = checked.hrp().to_string().to_lowercase();
    if hrp != "sc" && hrp != "tsc" {
        return Err(StatechainError::InvalidTransferAddress(format!(
            "unknown prefix '{}'",
            hrp
        )));
    }

    let data: Vec<u8> = checked.byte_iter().collect();
    if data.len() != PAYLOAD_LEN {
        return Err(StatechainError::InvalidTransferAddress(format!(
            "payload is {} bytes, expected {}",
            data.len(),
            PAYLOAD_LEN
        )));
    }
    if data[0] != VERSION {
        return Err(StatechainError::InvalidTransferAddress(format!(
            "unsupported version {}",
            data[0]
        )));
    }

    let user_pubkey = PublicKey::from_slice(&data[1..34])
        .map_err(|e| StatechainError::InvalidTransferAddress(e.to_string()))?;
    let auth_pubkey = PublicKey::from_slice(&data[34..])
        .map_err(|e| StatechainError::InvalidTransferAddress(e.to_string()))?;

    Ok((user_pubkey, auth_pubkey))
}
