//! Instant Asset Lock Proof
//!
//! Binds the signed transaction bytes, the quorum-signed InstantSend lock
//! and the burn-output index into the witness the layer-2 identity
//! transitions consume. The implied identity id is a deterministic digest
//! over all three elements.

use serde::{Deserialize, Serialize};

use crate::hash::hash256;
use crate::tx::builder::AssetLockTransaction;

/// The identity-creation witness: (tx bytes, islock bytes, output index)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLockProof {
    /// Serialized signed Type 8 transaction
    pub transaction: Vec<u8>,
    /// Serialized InstantSend lock
    pub instant_lock: Vec<u8>,
    /// Index of the burn output (always 0 for bridge transactions)
    pub output_index: u32,
}

impl AssetLockProof {
    pub fn new(transaction: Vec<u8>, instant_lock: Vec<u8>, output_index: u32) -> Self {
        Self {
            transaction,
            instant_lock,
            output_index,
        }
    }

    /// The identity id implied by this proof: base58 of the double-SHA-256
    /// digest over transaction bytes, islock bytes and the LE output index.
    /// Any bytewise change to the proof changes the id.
    pub fn identity_id(&self) -> String {
        let mut data =
            Vec::with_capacity(self.transaction.len() + self.instant_lock.len() + 4);
        data.extend_from_slice(&self.transaction);
        data.extend_from_slice(&self.instant_lock);
        data.extend_from_slice(&self.output_index.to_le_bytes());
        bs58::encode(hash256(&data)).into_string()
    }
}

/// Assemble the proof for a signed transaction. The transaction bytes must
/// be exactly the builder's serialization; re-encoding would break the
/// deterministic identity id.
pub fn build_instant_asset_lock_proof(
    signed_tx: &AssetLockTransaction,
    instant_lock: Vec<u8>,
) -> AssetLockProof {
    AssetLockProof::new(signed_tx.serialize(), instant_lock, 0)
}
