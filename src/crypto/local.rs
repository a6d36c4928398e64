use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{deserialize_hex, serialize_hex};
use bitcoin::hashes::Hash;
use bitcoin::key::TapTweak;
use bitcoin::secp256k1::ecdh::SharedSecret;
use bitcoin::secp256k1::{
    rand, schnorr, All, Keypair, Message, PublicKey, Scalar, Secp256k1, SecretKey,
    XOnlyPublicKey,
};
use bitcoin::sighash::{Prevouts, SighashCache, TapSighashType};
use bitcoin::transaction::Version;
use bitcoin::{
    taproot, Address, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut,
    Txid, Witness,
};
use chacha20poly1305::aead::{Aead, NewAead};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use sha2::{Digest, Sha256};
use std::str::FromStr;

use super::{address, CoinKeys, CryptoFacade, TransferAddress, TransferMsg};
use crate::backup::BackupTx;
use crate::coin::Coin;
use crate::config::ClientConfig;
use crate::entity::TransferUpdateMsg;
use crate::error::StatechainError;
use crate::Result;

/// P2TR outputs below this are non-standard
const DUST_LIMIT_SATS: u64 = 330;
const SEAL_NONCE_LEN: usize = 24;

/// Facade backed by the `bitcoin` crate.
///
/// Backup transactions are taproot key-path spends signed with the current
/// owner's key; co-signing with the entity is left to the MuSig2 layer of
/// the cryptographic library. Transfer messages are sealed to the
/// recipient's auth key with ECDH + XChaCha20Poly1305.
pub struct LocalCrypto {
    secp: Secp256k1<All>,
    /// Blocks each transfer takes off the backup locktime
    locktime_interval: u32,
    fee_rate_sat_vb: u64,
}

impl LocalCrypto {
    pub fn new(locktime_interval: u32, fee_rate_sat_vb: u64) -> Self {
        Self {
            secp: Secp256k1::new(),
            locktime_interval,
            fee_rate_sat_vb,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.locktime_interval, config.fee_rate_sat_vb)
    }

    /// Seal a transfer message so only the holder of `auth_pubkey`'s secret can open it
    pub fn seal_transfer_message(&self, msg: &TransferMsg, auth_pubkey: &str) -> Result<String> {
        let recipient = parse_public_key(auth_pubkey)?;
        let plaintext = serde_json::to_vec(msg).map_err(|e| StatechainError::Crypto(e.to_string()))?;
        self.seal(&plaintext, &recipient)
    }

    fn schnorr_sign(&self, digest: [u8; 32], secret_key: &SecretKey) -> String {
        let keypair = Keypair::from_secret_key(&self.secp, secret_key);
        let message = Message::from_digest(digest);
        self.secp.sign_schnorr(&message, &keypair).to_string()
    }

    fn schnorr_verify(&self, digest: [u8; 32], signature: &str, public_key: &PublicKey) -> bool {
        let Ok(signature) = schnorr::Signature::from_str(signature) else {
            return false;
        };
        let (xonly, _) = public_key.x_only_public_key();
        let message = Message::from_digest(digest);
        self.secp.verify_schnorr(&signature, &message, &xonly).is_ok()
    }

    /// Owner-key taproot output the coin's backup transactions spend
    fn prevout(&self, owner_pubkey: &PublicKey, amount: u64) -> TxOut {
        let (xonly, _) = owner_pubkey.x_only_public_key();
        TxOut {
            value: Amount::from_sat(amount),
            script_pubkey: ScriptBuf::new_p2tr(&self.secp, xonly, None),
        }
    }

    fn seal(&self, plaintext: &[u8], recipient: &PublicKey) -> Result<String> {
        let (ephemeral_sk, ephemeral_pk) = self.secp.generate_keypair(&mut rand::thread_rng());
        let shared = SharedSecret::new(recipient, &ephemeral_sk);

        let cipher = XChaCha20Poly1305::new(Key::from_slice(&shared.secret_bytes()));
        let nonce: [u8; SEAL_NONCE_LEN] = rand::random();
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext)
            .map_err(|e| StatechainError::Crypto(format!("Failed to seal transfer message: {}", e)))?;

        let mut sealed = ephemeral_pk.serialize().to_vec();
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(hex::encode(sealed))
    }

    fn open(&self, sealed: &str, recipient_sk: &SecretKey) -> Result<Vec<u8>> {
        let bytes = hex::decode(sealed)
            .map_err(|e| StatechainError::Crypto(format!("Invalid sealed message: {}", e)))?;
        if bytes.len() <= 33 + SEAL_NONCE_LEN {
            return Err(StatechainError::Crypto("Sealed message too short".to_string()));
        }

        let (ephemeral_pk, rest) = bytes.split_at(33);
        let (nonce, ciphertext) = rest.split_at(SEAL_NONCE_LEN);
        let ephemeral_pk = PublicKey::from_slice(ephemeral_pk)
            .map_err(|e| StatechainError::Crypto(e.to_string()))?;
        let shared = SharedSecret::new(&ephemeral_pk, recipient_sk);

        let cipher = XChaCha20Poly1305::new(Key::from_slice(&shared.secret_bytes()));
        cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|e| StatechainError::Crypto(format!("Failed to open transfer message: {}", e)))
    }

    /// Estimated vsize of a one-input key-path spend with one P2TR output
    fn estimate_backup_vsize() -> u64 {
        let base_size = 11;
        let input_size = 58;
        let output_size = 43;

        base_size + input_size + output_size
    }
}

fn parse_secret_key(hex_key: &str) -> Result<SecretKey> {
    SecretKey::from_str(hex_key).map_err(|e| StatechainError::Crypto(format!("Invalid secret key: {}", e)))
}

fn parse_public_key(hex_key: &str) -> Result<PublicKey> {
    PublicKey::from_str(hex_key).map_err(|e| StatechainError::Crypto(format!("Invalid public key: {}", e)))
}

fn transfer_digest(recipient_address: &str, utxo_txid: &str, utxo_vout: u32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(utxo_txid.as_bytes());
    hasher.update(utxo_vout.to_le_bytes());
    hasher.update(recipient_address.as_bytes());
    hasher.finalize().into()
}

fn statechain_id_digest(statechain_id: &str) -> [u8; 32] {
    Sha256::digest(statechain_id.as_bytes()).into()
}

fn decode_backup(backup_tx: &BackupTx) -> Result<Transaction> {
    deserialize_hex(&backup_tx.tx).map_err(|e| {
        StatechainError::Crypto(format!("Invalid backup transaction {}: {}", backup_tx.tx_n, e))
    })
}

impl CryptoFacade for LocalCrypto {
    fn block_height_of(&self, backup_tx: &BackupTx) -> Result<u32> {
        Ok(decode_backup(backup_tx)?.lock_time.to_consensus_u32())
    }

    fn backup_outpoint(&self, backup_tx: &BackupTx) -> Result<(String, u32)> {
        let tx = decode_backup(backup_tx)?;
        match tx.input.as_slice() {
            [input] => Ok((
                input.previous_output.txid.to_string(),
                input.previous_output.vout,
            )),
            inputs => Err(StatechainError::Crypto(format!(
                "Backup transaction {} has {} inputs",
                backup_tx.tx_n,
                inputs.len()
            ))),
        }
    }

    fn decode_transfer_address(&self, transfer_address: &str) -> Result<TransferAddress> {
        let (user_pubkey, auth_pubkey) = address::decode(transfer_address)?;
        Ok(TransferAddress {
            user_pubkey: user_pubkey.to_string(),
            auth_pubkey: auth_pubkey.to_string(),
        })
    }

    fn encode_transfer_address(&self, keys: &CoinKeys, network: Network) -> Result<String> {
        let user_pubkey = parse_public_key(&keys.user_pubkey)?;
        let auth_pubkey = parse_public_key(&keys.auth_pubkey)?;
        address::encode(network, &user_pubkey, &auth_pubkey)
    }

    fn generate_coin_keys(&self) -> Result<CoinKeys> {
        let mut rng = rand::thread_rng();
        let (user_sk, user_pk) = self.secp.generate_keypair(&mut rng);
        let (auth_sk, auth_pk) = self.secp.generate_keypair(&mut rng);

        Ok(CoinKeys {
            user_privkey: user_sk.display_secret().to_string(),
            user_pubkey: user_pk.to_string(),
            auth_privkey: auth_sk.display_secret().to_string(),
            auth_pubkey: auth_pk.to_string(),
        })
    }

    fn sign_statechain_id(&self, statechain_id: &str, auth_privkey: &str) -> Result<String> {
        let secret_key = parse_secret_key(auth_privkey)?;
        Ok(self.schnorr_sign(statechain_id_digest(statechain_id), &secret_key))
    }

    fn sign_transfer(
        &self,
        recipient_address: &str,
        utxo_txid: &str,
        utxo_vout: u32,
        secret_key: &str,
    ) -> Result<String> {
        let secret_key = parse_secret_key(secret_key)?;
        let digest = transfer_digest(recipient_address, utxo_txid, utxo_vout);
        Ok(self.schnorr_sign(digest, &secret_key))
    }

    fn verify_transfer_signature(&self, msg: &TransferMsg) -> Result<bool> {
        let sender = parse_public_key(&msg.user_public_key)?;
        let digest = transfer_digest(&msg.recipient_address, &msg.utxo_txid, msg.utxo_vout);
        Ok(self.schnorr_verify(digest, &msg.transfer_signature, &sender))
    }

    fn build_next_backup_transaction(
        &self,
        coin: &Coin,
        recipient_address: &str,
        chain_length: u32,
        block_height: u32,
        network: Network,
    ) -> Result<BackupTx> {
        let (recipient_pubkey, _) = address::decode(recipient_address)?;
        let owner_sk = parse_secret_key(&coin.user_privkey)?;
        let owner_pk = parse_public_key(&coin.user_pubkey)?;
        let (utxo_txid, utxo_vout) = coin.outpoint()?;
        let amount = coin.amount_sats()?;

        let locktime = block_height
            .checked_sub(self.locktime_interval.saturating_mul(chain_length))
            .filter(|locktime| *locktime > 0)
            .ok_or_else(|| {
                StatechainError::Transaction(format!(
                    "Backup locktime exhausted: height {} cannot absorb {} transfers",
                    block_height, chain_length
                ))
            })?;

        let fee = Self::estimate_backup_vsize() * self.fee_rate_sat_vb;
        if amount < fee + DUST_LIMIT_SATS {
            return Err(StatechainError::Transaction(format!(
                "Coin amount ({} sats) cannot cover backup fee ({} sats)",
                amount, fee
            )));
        }

        let txid = Txid::from_str(utxo_txid)
            .map_err(|e| StatechainError::Transaction(format!("Invalid txid: {}", e)))?;
        let lock_time = LockTime::from_height(locktime)
            .map_err(|e| StatechainError::Transaction(e.to_string()))?;

        let (recipient_xonly, _) = recipient_pubkey.x_only_public_key();
        let recipient_onchain = Address::p2tr(&self.secp, recipient_xonly, None, network);
        log::debug!(
            "Building backup tx {} to {} with locktime {}",
            chain_length + 1,
            recipient_onchain,
            locktime
        );

        let mut tx = Transaction {
            version: Version::TWO,
            lock_time,
            input: vec![TxIn {
                previous_output: OutPoint {
                    txid,
                    vout: utxo_vout,
                },
                script_sig: ScriptBuf::new(),
                sequence: Sequence::ENABLE_LOCKTIME_NO_RBF,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(amount - fee),
                script_pubkey: recipient_onchain.script_pubkey(),
            }],
        };

        let prevout = self.prevout(&owner_pk, amount);
        let sighash = SighashCache::new(&tx)
            .taproot_key_spend_signature_hash(0, &Prevouts::All(&[prevout]), TapSighashType::Default)
            .map_err(|e| StatechainError::Transaction(e.to_string()))?;

        let keypair: Keypair = Keypair::from_secret_key(&self.secp, &owner_sk)
            .tap_tweak(&self.secp, None)
            .into();
        let signature = self
            .secp
            .sign_schnorr(&Message::from_digest(sighash.to_byte_array()), &keypair);
        tx.input[0].witness = Witness::p2tr_key_spend(&taproot::Signature {
            signature,
            sighash_type: TapSighashType::Default,
        });

        Ok(BackupTx {
            tx_n: chain_length + 1,
            tx: serialize_hex(&tx),
            client_public_nonce: coin.public_nonce.clone().unwrap_or_default(),
            server_public_nonce: coin.server_public_nonce.clone().unwrap_or_default(),
            client_public_key: coin.user_pubkey.clone(),
            server_public_key: coin.server_pubkey.clone().unwrap_or_default(),
            blinding_factor: coin.blinding_factor.clone().unwrap_or_default(),
        })
    }

    fn verify_backup_transaction(
        &self,
        backup_tx: &BackupTx,
        amount: u64,
        recipient_user_pubkey: &str,
    ) -> Result<bool> {
        let tx = decode_backup(backup_tx)?;
        let owner_pk = parse_public_key(&backup_tx.client_public_key)?;
        let recipient_pk = parse_public_key(recipient_user_pubkey)?;

        if tx.input.len() != 1 || tx.output.len() != 1 {
            return Ok(false);
        }

        let (recipient_xonly, _) = recipient_pk.x_only_public_key();
        if tx.output[0].script_pubkey != ScriptBuf::new_p2tr(&self.secp, recipient_xonly, None) {
            log::debug!("Backup tx {} does not pay the recipient", backup_tx.tx_n);
            return Ok(false);
        }

        let Some(witness_sig) = tx.input[0].witness.nth(0) else {
            return Ok(false);
        };
        let Ok(signature) = taproot::Signature::from_slice(witness_sig) else {
            return Ok(false);
        };

        let prevout = self.prevout(&owner_pk, amount);
        let sighash = SighashCache::new(&tx)
            .taproot_key_spend_signature_hash(0, &Prevouts::All(&[prevout]), signature.sighash_type)
            .map_err(|e| StatechainError::Crypto(e.to_string()))?;

        let (owner_xonly, _) = owner_pk.x_only_public_key();
        let (tweaked, _) = owner_xonly.tap_tweak(&self.secp, None);
        let output_key = XOnlyPublicKey::from(tweaked);

        Ok(self
            .secp
            .verify_schnorr(
                &signature.signature,
                &Message::from_digest(sighash.to_byte_array()),
                &output_key,
            )
            .is_ok())
    }

    fn build_transfer_update_message(
        &self,
        x1: &str,
        recipient_address: &str,
        coin: &Coin,
        transfer_signature: &str,
        backup_transactions: &[BackupTx],
    ) -> Result<TransferUpdateMsg> {
        let statechain_id = coin
            .statechain_id
            .clone()
            .ok_or_else(|| StatechainError::IncompleteCoin("statechain id".into()))?;
        let auth_sig = coin
            .signed_statechain_id
            .clone()
            .ok_or_else(|| StatechainError::IncompleteCoin("signed statechain id".into()))?;
        let (_, recipient_auth) = address::decode(recipient_address)?;
        let (utxo_txid, utxo_vout) = coin.outpoint()?;

        // t1 = o1 + x1
        let o1 = parse_secret_key(&coin.user_privkey)?;
        let x1 = parse_secret_key(x1)?;
        let t1 = o1
            .add_tweak(&Scalar::from(x1))
            .map_err(|e| StatechainError::Crypto(e.to_string()))?;

        let transfer_msg = TransferMsg {
            statechain_id: statechain_id.clone(),
            transfer_signature: transfer_signature.to_string(),
            backup_transactions: backup_transactions.to_vec(),
            t1: t1.display_secret().to_string(),
            user_public_key: coin.user_pubkey.clone(),
            recipient_address: recipient_address.to_string(),
            utxo_txid: utxo_txid.to_string(),
            utxo_vout,
            amount: coin.amount_sats()?,
        };

        Ok(TransferUpdateMsg {
            statechain_id,
            auth_sig,
            new_user_auth_key: recipient_auth.to_string(),
            enc_transfer_msg: self.seal_transfer_message(&transfer_msg, &recipient_auth.to_string())?,
        })
    }

    fn open_transfer_message(&self, enc_transfer_msg: &str, auth_privkey: &str) -> Result<TransferMsg> {
        let auth_sk = parse_secret_key(auth_privkey)?;
        let plaintext = self.open(enc_transfer_msg, &auth_sk)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| StatechainError::Crypto(format!("Malformed transfer message: {}", e)))
    }

    fn compute_t2(&self, msg: &TransferMsg, user_privkey: &str) -> Result<String> {
        // t2 = t1 - o2
        let t1 = parse_secret_key(&msg.t1)?;
        let o2 = parse_secret_key(user_privkey)?;
        let t2 = t1
            .add_tweak(&Scalar::from(o2.negate()))
            .map_err(|e| StatechainError::Crypto(e.to_string()))?;
        Ok(t2.display_secret().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coin::CoinStatus;

    const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    fn funded_coin(crypto: &LocalCrypto) -> Coin {
        let keys = crypto.generate_coin_keys().unwrap();
        let address = crypto.encode_transfer_address(&keys, Network::Regtest).unwrap();
        let mut coin = Coin::placeholder(keys, address);
        coin.statechain_id = Some("sc1".into());
        coin.utxo_txid = Some(TXID.into());
        coin.utxo_vout = Some(0);
        coin.amount = Some(100_000);
        coin.signed_statechain_id = Some(crypto.sign_statechain_id("sc1", &coin.auth_privkey).unwrap());
        coin.status = CoinStatus::Confirmed;
        coin
    }

    fn recipient(crypto: &LocalCrypto) -> (CoinKeys, String) {
        let keys = crypto.generate_coin_keys().unwrap();
        let address = crypto.encode_transfer_address(&keys, Network::Regtest).unwrap();
        (keys, address)
    }

    #[test]
    fn test_backup_locktime_policy() {
        let crypto = LocalCrypto::new(6, 1);
        let coin = funded_coin(&crypto);
        let (_, to) = recipient(&crypto);

        let first = crypto
            .build_next_backup_transaction(&coin, &to, 0, 1000, Network::Regtest)
            .unwrap();
        assert_eq!(first.tx_n, 1);
        assert_eq!(crypto.block_height_of(&first).unwrap(), 1000);

        let third = crypto
            .build_next_backup_transaction(&coin, &to, 2, 1000, Network::Regtest)
            .unwrap();
        assert_eq!(third.tx_n, 3);
        assert_eq!(crypto.block_height_of(&third).unwrap(), 988);
    }

    #[test]
    fn test_backup_spends_coin_outpoint() {
        let crypto = LocalCrypto::new(6, 1);
        let mut coin = funded_coin(&crypto);
        coin.utxo_vout = Some(3);
        let (_, to) = recipient(&crypto);

        let backup = crypto
            .build_next_backup_transaction(&coin, &to, 0, 1000, Network::Regtest)
            .unwrap();
        assert_eq!(crypto.backup_outpoint(&backup).unwrap(), (TXID.to_string(), 3));
    }

    #[test]
    fn test_locktime_exhaustion() {
        let crypto = LocalCrypto::new(500, 1);
        let coin = funded_coin(&crypto);
        let (_, to) = recipient(&crypto);
        let err = crypto
            .build_next_backup_transaction(&coin, &to, 2, 1000, Network::Regtest)
            .unwrap_err();
        assert!(matches!(err, StatechainError::Transaction(_)));
    }

    #[test]
    fn test_backup_signature_verifies_for_recipient_only() {
        let crypto = LocalCrypto::new(6, 1);
        let coin = funded_coin(&crypto);
        let (to_keys, to) = recipient(&crypto);
        let (other_keys, _) = recipient(&crypto);

        let backup = crypto
            .build_next_backup_transaction(&coin, &to, 1, 1000, Network::Regtest)
            .unwrap();
        assert!(crypto
            .verify_backup_transaction(&backup, 100_000, &to_keys.user_pubkey)
            .unwrap());
        assert!(!crypto
            .verify_backup_transaction(&backup, 100_000, &other_keys.user_pubkey)
            .unwrap());
        // Wrong amount changes the sighash
        assert!(!crypto
            .verify_backup_transaction(&backup, 99_999, &to_keys.user_pubkey)
            .unwrap());
    }

    #[test]
    fn test_transfer_signature() {
        let crypto = LocalCrypto::new(6, 1);
        let coin = funded_coin(&crypto);
        let (_, to) = recipient(&crypto);

        let signature = crypto.sign_transfer(&to, TXID, 0, &coin.user_privkey).unwrap();
        let mut msg = TransferMsg {
            statechain_id: "sc1".into(),
            transfer_signature: signature,
            backup_transactions: Vec::new(),
            t1: String::new(),
            user_public_key: coin.user_pubkey.clone(),
            recipient_address: to.clone(),
            utxo_txid: TXID.into(),
            utxo_vout: 0,
            amount: 100_000,
        };
        assert!(crypto.verify_transfer_signature(&msg).unwrap());

        msg.utxo_vout = 1;
        assert!(!crypto.verify_transfer_signature(&msg).unwrap());
    }

    #[test]
    fn test_update_message_opens_for_recipient() {
        let crypto = LocalCrypto::new(6, 1);
        let coin = funded_coin(&crypto);
        let (to_keys, to) = recipient(&crypto);
        let x1 = crypto.generate_coin_keys().unwrap().user_privkey;

        let backup = crypto
            .build_next_backup_transaction(&coin, &to, 0, 1000, Network::Regtest)
            .unwrap();
        let signature = crypto.sign_transfer(&to, TXID, 0, &coin.user_privkey).unwrap();
        let update = crypto
            .build_transfer_update_message(&x1, &to, &coin, &signature, &[backup.clone()])
            .unwrap();
        assert_eq!(update.new_user_auth_key, to_keys.auth_pubkey);
        assert_eq!(update.statechain_id, "sc1");

        let msg = crypto
            .open_transfer_message(&update.enc_transfer_msg, &to_keys.auth_privkey)
            .unwrap();
        assert_eq!(msg.backup_transactions, vec![backup]);
        assert_eq!(msg.recipient_address, to);

        // Nobody else can read it
        assert!(crypto
            .open_transfer_message(&update.enc_transfer_msg, &to_keys.user_privkey)
            .is_err());
    }

    #[test]
    fn test_key_shares_recombine() {
        let crypto = LocalCrypto::new(6, 1);
        let coin = funded_coin(&crypto);
        let (to_keys, to) = recipient(&crypto);
        let x1 = crypto.generate_coin_keys().unwrap().user_privkey;

        let signature = crypto.sign_transfer(&to, TXID, 0, &coin.user_privkey).unwrap();
        let update = crypto
            .build_transfer_update_message(&x1, &to, &coin, &signature, &[])
            .unwrap();
        let msg = crypto
            .open_transfer_message(&update.enc_transfer_msg, &to_keys.auth_privkey)
            .unwrap();
        let t2 = crypto.compute_t2(&msg, &to_keys.user_privkey).unwrap();

        // t2 + o2 == o1 + x1
        let t2 = parse_secret_key(&t2).unwrap();
        let o2 = parse_secret_key(&to_keys.user_privkey).unwrap();
        let lhs = t2.add_tweak(&Scalar::from(o2)).unwrap();
        let rhs = parse_secret_key(&coin.user_privkey)
            .unwrap()
            .add_tweak(&Scalar::from(parse_secret_key(&x1).unwrap()))
            .unwrap();
        assert_eq!(lhs, rhs);
    }
}
