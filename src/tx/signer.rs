//! Transaction Signer
//!
//! Legacy sighash computation and ECDSA signing for the asset-lock
//! transaction's P2PKH input. Nonces are deterministic (RFC 6979) and the
//! S component is normalized to the low half of the curve order, so the
//! same transaction always produces the same signature bytes.

use secp256k1::{Message, Secp256k1};
use thiserror::Error;

use crate::codec::{decode_hex, write_u32_le};
use crate::hash::hash256;
use crate::insight::Utxo;
use crate::keys::KeyPair;
use crate::tx::builder::AssetLockTransaction;
use crate::tx::script::push_slice;

/// SIGHASH_ALL flag appended to the preimage and to the DER signature
pub const SIGHASH_ALL: u32 = 1;

/// Signer errors
#[derive(Debug, Error)]
pub enum SignError {
    #[error("no utxo supplied for input {0}")]
    MissingUtxo(usize),

    #[error("invalid previous script: {0}")]
    InvalidScript(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Compute the legacy sighash for one input.
///
/// The preimage is the transaction with every scriptSig cleared, the spent
/// output's scriptPubKey substituted as the scriptCode of input
/// `input_index`, and the u32 LE SIGHASH_ALL flag appended.
pub fn signature_hash(
    tx: &AssetLockTransaction,
    input_index: usize,
    script_code: &[u8],
) -> Result<[u8; 32], SignError> {
    if input_index >= tx.input.len() {
        return Err(SignError::MissingUtxo(input_index));
    }

    let mut cloned = tx.clone();
    for input in &mut cloned.input {
        input.script_sig.clear();
    }
    cloned.input[input_index].script_sig = script_code.to_vec();

    let mut preimage = cloned.serialize();
    write_u32_le(&mut preimage, SIGHASH_ALL);

    Ok(hash256(&preimage))
}

/// Sign every input of the transaction. `utxos[i]` must be the output spent
/// by input `i`; its scriptPubKey is the scriptCode. The bridge builds
/// single-input transactions, so the loop runs once.
pub fn sign_transaction(
    tx: &AssetLockTransaction,
    utxos: &[Utxo],
    key: &KeyPair,
) -> Result<AssetLockTransaction, SignError> {
    let secp = Secp256k1::new();
    let mut signed = tx.clone();

    for i in 0..signed.input.len() {
        let utxo = utxos.get(i).ok_or(SignError::MissingUtxo(i))?;
        let script_code =
            decode_hex(&utxo.script_pubkey).map_err(|e| SignError::InvalidScript(e.to_string()))?;

        let sighash = signature_hash(tx, i, &script_code)?;
        let message = Message::from_digest_slice(&sighash)
            .map_err(|e| SignError::Signing(e.to_string()))?;

        let mut signature = secp.sign_ecdsa(&message, key.secret_key());
        signature.normalize_s();

        let mut der = signature.serialize_der().to_vec();
        der.push(SIGHASH_ALL as u8);

        let mut script_sig = Vec::with_capacity(der.len() + 35);
        push_slice(&mut script_sig, &der);
        push_slice(&mut script_sig, &key.public_bytes());
        signed.input[i].script_sig = script_sig;
    }

    Ok(signed)
}
