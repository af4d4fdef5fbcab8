//! Asset-Lock Transaction Builder
//!
//! Builds the Type 8 special transaction from exactly one UTXO and one
//! asset-lock public key. The entire locked amount (input value minus fee)
//! is burned through a single OP_RETURN wire output and re-expressed as a
//! single P2PKH credit output inside the extra payload.

use thiserror::Error;

use crate::codec::{
    decode_hex, encode_hex, reverse_bytes, write_compact_size, write_u32_le, write_u8,
    write_var_bytes,
};
use crate::hash::{hash160, hash256};
use crate::insight::Utxo;
use crate::tx::script::{op_return_burn_script, p2pkh_script};

/// Transaction version for special transactions
pub const TX_VERSION: u16 = 3;
/// Type 8: asset lock
pub const TX_TYPE_ASSET_LOCK: u16 = 8;
/// Asset-lock payload version
pub const PAYLOAD_VERSION: u8 = 1;

const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Builder errors
#[derive(Debug, Error)]
pub enum TxError {
    #[error("insufficient funds: {available} duffs does not cover the {fee} duff fee")]
    InsufficientFunds { available: u64, fee: u64 },

    #[error("invalid txid: {0}")]
    InvalidTxid(String),
}

/// Reference to a previous output, txid in internal (wire) byte order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutPoint {
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    fn serialize_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.txid);
        write_u32_le(buf, self.vout);
    }
}

/// Transaction input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub outpoint: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxIn {
    fn serialize_into(&self, buf: &mut Vec<u8>) {
        self.outpoint.serialize_into(buf);
        write_var_bytes(buf, &self.script_sig);
        write_u32_le(buf, self.sequence);
    }
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    fn serialize_into(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.value.to_le_bytes());
        write_var_bytes(buf, &self.script_pubkey);
    }
}

/// The asset-lock extra payload: credit outputs describing how the burned
/// value materializes as Platform credits
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLockPayload {
    pub version: u8,
    pub credit_outputs: Vec<TxOut>,
}

impl AssetLockPayload {
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        write_u8(&mut buf, self.version);
        write_compact_size(&mut buf, self.credit_outputs.len() as u64);
        for output in &self.credit_outputs {
            output.serialize_into(&mut buf);
        }
        buf
    }
}

/// A Dash Type 8 (asset lock) special transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLockTransaction {
    pub version: u16,
    pub tx_type: u16,
    pub input: Vec<TxIn>,
    pub output: Vec<TxOut>,
    pub lock_time: u32,
    pub payload: AssetLockPayload,
}

impl AssetLockTransaction {
    /// Wire serialization. The first 32-bit word packs version and type as
    /// `version | (txType << 16)` little-endian; the extra payload is
    /// appended length-prefixed for any non-zero type.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();

        let version_word = (self.version as u32) | ((self.tx_type as u32) << 16);
        write_u32_le(&mut buf, version_word);

        write_compact_size(&mut buf, self.input.len() as u64);
        for input in &self.input {
            input.serialize_into(&mut buf);
        }

        write_compact_size(&mut buf, self.output.len() as u64);
        for output in &self.output {
            output.serialize_into(&mut buf);
        }

        write_u32_le(&mut buf, self.lock_time);

        if self.tx_type != 0 {
            write_var_bytes(&mut buf, &self.payload.serialize());
        }

        buf
    }

    pub fn to_hex(&self) -> String {
        encode_hex(&self.serialize())
    }

    /// Transaction id in display byte order
    pub fn txid(&self) -> String {
        encode_hex(&reverse_bytes(&hash256(&self.serialize())))
    }
}

/// Build the asset-lock transaction spending `utxo` in full.
///
/// The caller supplies the fee (from the network's fee floor); there is no
/// change output and no coin selection beyond this single UTXO.
pub fn build_asset_lock(
    utxo: &Utxo,
    asset_lock_pubkey: &[u8; 33],
    fee: u64,
) -> Result<AssetLockTransaction, TxError> {
    if utxo.value <= fee {
        return Err(TxError::InsufficientFunds {
            available: utxo.value,
            fee,
        });
    }
    let lock_amount = (utxo.value - fee) as i64;

    let txid_display = decode_hex(&utxo.txid).map_err(|e| TxError::InvalidTxid(e.to_string()))?;
    if txid_display.len() != 32 {
        return Err(TxError::InvalidTxid(format!(
            "expected 32 bytes, got {}",
            txid_display.len()
        )));
    }
    let mut txid = [0u8; 32];
    txid.copy_from_slice(&reverse_bytes(&txid_display));

    let input = TxIn {
        outpoint: OutPoint {
            txid,
            vout: utxo.vout,
        },
        script_sig: Vec::new(),
        sequence: SEQUENCE_FINAL,
    };

    // Burned on layer 1
    let burn_output = TxOut {
        value: lock_amount,
        script_pubkey: op_return_burn_script(),
    };

    // Credited on layer 2 to the asset-lock key holder
    let credit_output = TxOut {
        value: lock_amount,
        script_pubkey: p2pkh_script(&hash160(asset_lock_pubkey)).to_vec(),
    };

    Ok(AssetLockTransaction {
        version: TX_VERSION,
        tx_type: TX_TYPE_ASSET_LOCK,
        input: vec![input],
        output: vec![burn_output],
        lock_time: 0,
        payload: AssetLockPayload {
            version: PAYLOAD_VERSION,
            credit_outputs: vec![credit_output],
        },
    })
}
