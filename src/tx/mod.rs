//! Asset-Lock Transactions
//!
//! Construction, signing and proof assembly for the Dash Type 8 special
//! transaction that burns layer-1 value into layer-2 credits.

pub mod builder;
pub mod proof;
pub mod script;
pub mod signer;

pub use builder::{
    build_asset_lock, AssetLockPayload, AssetLockTransaction, OutPoint, TxError, TxIn, TxOut,
};
pub use proof::{build_instant_asset_lock_proof, AssetLockProof};
pub use signer::{sign_transaction, SignError, SIGHASH_ALL};
