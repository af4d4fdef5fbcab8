//! Platform Driver Contract
//!
//! The SDK boundary. Every layer-2 operation the bridge performs goes
//! through this trait; the core never sees the SDK's state-transition
//! encoding, only the inputs (proofs, keys, signers) and outcomes. All
//! four funding operations sit behind the retry engine because the
//! underlying transports are best-effort.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::NetworkParams;
use crate::hash::hash160;
use crate::keys::{
    wif_to_private_key, IdentityPublicKey, KeyError, KeyPair, KeyType,
};
use crate::tx::AssetLockProof;

/// Platform errors
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Any error surfaced by the underlying SDK
    #[error("sdk error: {0}")]
    Sdk(String),

    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    #[error("name already registered: {0}")]
    NameTaken(String),

    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

impl PlatformError {
    /// SDK transports are best-effort; their failures are worth retrying.
    /// Application-level outcomes are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PlatformError::Sdk(_))
    }
}

/// An identity as fetched from Platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub revision: u64,
    /// Balance in credits
    pub balance: u64,
    pub public_keys: Vec<IdentityPublicKey>,
}

impl Identity {
    /// Find a public key by id, ignoring disabled keys
    pub fn key_by_id(&self, key_id: u32) -> Option<&IdentityPublicKey> {
        self.public_keys
            .iter()
            .find(|k| k.id == key_id && k.disabled_at.is_none())
    }
}

/// A credit destination for asset-lock funding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditOutput {
    /// bech32m platform address
    pub address: String,
    /// Amount in credits
    pub amount: u64,
}

/// Holds the private halves the SDK needs for signing state transitions
/// and key-ownership proofs. Sending to a third-party address uses an
/// empty signer; the recipient does not sign to receive.
#[derive(Debug, Clone, Default)]
pub struct PlatformSigner {
    keys: Vec<KeyPair>,
}

impl PlatformSigner {
    /// An empty signer (send-to-address flows)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a signer from WIF-encoded private keys, enforcing the session
    /// network's WIF prefix
    pub fn from_wifs(wifs: &[&str], params: &NetworkParams) -> Result<Self, KeyError> {
        let mut signer = Self::default();
        for wif in wifs {
            let parsed = wif_to_private_key(wif)?;
            if parsed.prefix != params.wif_prefix {
                return Err(KeyError::WifNetworkMismatch(parsed.prefix, params.network));
            }
            signer.keys.push(KeyPair::from_secret(parsed.secret));
        }
        Ok(signer)
    }

    pub fn add_key(&mut self, key: KeyPair) {
        self.keys.push(key);
    }

    pub fn with_key(mut self, key: KeyPair) -> Self {
        self.add_key(key);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[KeyPair] {
        &self.keys
    }

    /// Whether this signer holds the private half of an on-chain key
    pub fn holds_key_for(&self, key: &IdentityPublicKey) -> bool {
        self.keys.iter().any(|pair| {
            let public = pair.public_bytes();
            match key.key_type {
                KeyType::EcdsaSecp256k1 => key.data == public,
                KeyType::EcdsaHash160 => key.data == hash160(&public),
            }
        })
    }
}

/// Contract over the layer-2 SDK.
///
/// Implementations must be safe to call from the single cooperative driver
/// task; each call returns only after the transition commits or fails.
#[async_trait]
pub trait PlatformDriver: Send + Sync {
    /// Submit an identity-create transition witnessed by `proof`. The
    /// signer must hold the private half of every declared key (for
    /// key-ownership proofs). The resulting id equals the proof's implied
    /// identity id.
    async fn create_identity(
        &self,
        public_keys: &[IdentityPublicKey],
        proof: &AssetLockProof,
        asset_lock_key: &KeyPair,
        signer: &PlatformSigner,
    ) -> Result<Identity, PlatformError>;

    /// Credit an existing identity from an asset-lock proof. Callers fetch
    /// the identity first for revision/key metadata. Returns the new
    /// balance in credits.
    async fn top_up_identity(
        &self,
        identity: &Identity,
        proof: &AssetLockProof,
        asset_lock_key: &KeyPair,
    ) -> Result<u64, PlatformError>;

    /// Mutate an identity's key set. The signer must contain a MASTER key
    /// of the identity, plus the private half of every added key.
    async fn update_identity(
        &self,
        identity: &Identity,
        signer: &PlatformSigner,
        add_public_keys: &[IdentityPublicKey],
        disable_key_ids: &[u32],
    ) -> Result<Identity, PlatformError>;

    /// Move credits from an asset-lock proof to one or more platform
    /// addresses. The signer carries the destination key for self-owned
    /// addresses and is empty for third-party sends.
    async fn fund_from_asset_lock(
        &self,
        proof: &AssetLockProof,
        asset_lock_key: &KeyPair,
        outputs: &[CreditOutput],
        signer: &PlatformSigner,
    ) -> Result<(), PlatformError>;

    /// Fetch an identity and its public-key list
    async fn fetch_identity(&self, id: &str) -> Result<Option<Identity>, PlatformError>;

    /// DPNS availability check for a label
    async fn dpns_is_name_available(&self, label: &str) -> Result<bool, PlatformError>;

    /// Register a DPNS name for the identity, signed by key `key_id`
    async fn dpns_register_name(
        &self,
        label: &str,
        identity: &Identity,
        key_id: u32,
        signer: &PlatformSigner,
    ) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{private_key_to_wif, Purpose, SecurityLevel};

    #[test]
    fn test_signer_from_wifs_checks_network() {
        let params = NetworkParams::testnet();
        let pair = KeyPair::generate();
        let wif = private_key_to_wif(pair.secret_key(), &params, true);

        let signer = PlatformSigner::from_wifs(&[&wif], &params).unwrap();
        assert_eq!(signer.keys().len(), 1);

        let mainnet_wif = private_key_to_wif(pair.secret_key(), &NetworkParams::mainnet(), true);
        assert!(matches!(
            PlatformSigner::from_wifs(&[&mainnet_wif], &params),
            Err(KeyError::WifNetworkMismatch(204, _))
        ));
    }

    #[test]
    fn test_holds_key_for_both_types() {
        let pair = KeyPair::generate();
        let signer = PlatformSigner::empty().with_key(pair.clone());

        let secp_key = IdentityPublicKey {
            id: 0,
            key_type: KeyType::EcdsaSecp256k1,
            purpose: Purpose::Authentication,
            security_level: SecurityLevel::Master,
            data: pair.public_bytes().to_vec(),
            disabled_at: None,
        };
        assert!(signer.holds_key_for(&secp_key));

        let hash_key = IdentityPublicKey {
            data: hash160(&pair.public_bytes()).to_vec(),
            key_type: KeyType::EcdsaHash160,
            ..secp_key.clone()
        };
        assert!(signer.holds_key_for(&hash_key));

        let other = IdentityPublicKey {
            data: KeyPair::generate().public_bytes().to_vec(),
            ..secp_key
        };
        assert!(!signer.holds_key_for(&other));
    }

    #[test]
    fn test_sdk_errors_retryable() {
        assert!(PlatformError::Sdk("transport".into()).is_retryable());
        assert!(!PlatformError::IdentityNotFound("x".into()).is_retryable());
        assert!(!PlatformError::NameTaken("x".into()).is_retryable());
    }
}
