//! Non-Custodial Asset-Lock Bridge Core
//!
//! Converts layer-1 Dash (UTXO) value into layer-2 Platform credits:
//! derive a deposit key, watch the address for a UTXO, build and sign the
//! Type 8 asset-lock transaction, broadcast it, wait for the quorum
//! InstantSend lock, assemble the instant asset lock proof and drive one
//! of the layer-2 transitions (create identity, top up, fund an address,
//! send to an address). DPNS naming and identity key management ride on
//! the same key-matching machinery without the asset-lock pipeline.
//!
//! ## Module Organization
//!
//! - `config` / `logging` / `error` - network parameters, tracing setup,
//!   the root error type
//! - `codec` / `hash` - wire encodings and digests
//! - `hdwallet` / `keys` - BIP-39/BIP-32 derivation, keypairs, WIF,
//!   identity-key matching and validation
//! - `tx` - Type 8 transaction building, signing, proof assembly
//! - `insight` / `islock` / `faucet` / `retry` - HTTP collaborators and
//!   the backoff layer
//! - `platform` - the layer-2 SDK contract and its in-memory stand-in
//! - `bridge` - the session state machine, pipeline driver and key backup

pub mod bridge;
pub mod codec;
pub mod config;
pub mod error;
pub mod faucet;
pub mod hash;
pub mod hdwallet;
pub mod insight;
pub mod islock;
pub mod keys;
pub mod logging;
pub mod platform;
pub mod retry;
pub mod tx;

#[cfg(test)]
pub mod testutil;

// Re-exports: Configuration
pub use config::{Network, NetworkParams};

// Re-exports: Errors
pub use error::{BridgeError, BridgeResult, ValidationError};

// Re-exports: Logging
pub use logging::{init_from_env, init_logging, LogLevel, LoggingError};

// Re-exports: Clients
pub use faucet::{FaucetClient, FaucetError};
pub use insight::{DepositWait, InsightClient, InsightError, Utxo};
pub use islock::{IslockClient, IslockError};
pub use retry::{with_retry, RetryOptions, RetryStatus};

// Re-exports: Keys and transactions
pub use hdwallet::{DerivationPath, ExtendedPrivKey, HdError};
pub use keys::{IdentityKey, IdentityPublicKey, KeyError, KeyPair, KeyType, Purpose, SecurityLevel};
pub use tx::{AssetLockProof, AssetLockTransaction};

// Re-exports: Platform and bridge
pub use bridge::{BridgeDriver, BridgeEvent, BridgeMode, BridgeState, BridgeStep};
pub use platform::{Identity, MemoryPlatform, PlatformDriver, PlatformError, PlatformSigner};

/// Duff and credit conversion helpers
pub mod units {
    /// Smallest on-chain unit: 1 DASH = 10^8 duffs
    pub const DUFFS_PER_DASH: u64 = 100_000_000;

    /// Layer-2 credits minted per burned duff
    pub const CREDITS_PER_DUFF: u64 = 1000;

    pub fn duffs_to_dash(duffs: u64) -> f64 {
        duffs as f64 / DUFFS_PER_DASH as f64
    }

    pub fn duffs_to_credits(duffs: u64) -> u64 {
        duffs.saturating_mul(CREDITS_PER_DUFF)
    }

    pub fn format_duffs(duffs: u64) -> String {
        format!("{} duffs ({:.8} DASH)", duffs, duffs_to_dash(duffs))
    }
}
