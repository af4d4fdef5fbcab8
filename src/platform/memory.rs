//! In-Memory Platform
//!
//! An in-process `PlatformDriver` used by tests and dry runs. It keeps the
//! trait honest: proofs must carry a well-formed Type 8 transaction, key
//! ownership is checked the way the real SDK checks it, and each asset
//! lock spends exactly once.

use std::collections::{HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::codec::read_compact_size;
use crate::keys::{IdentityPublicKey, Purpose, SecurityLevel};
use crate::platform::dpns::normalize_label;
use crate::platform::driver::{
    CreditOutput, Identity, PlatformDriver, PlatformError, PlatformSigner,
};
use crate::tx::AssetLockProof;
use crate::units::CREDITS_PER_DUFF;

#[derive(Default)]
struct State {
    identities: HashMap<String, Identity>,
    /// normalized label -> identity id
    names: HashMap<String, String>,
    /// platform address -> credits
    address_credits: HashMap<String, u64>,
    spent_proofs: HashSet<String>,
}

/// In-memory Platform implementation
#[derive(Default)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an identity directly (top-up and manage tests)
    pub async fn insert_identity(&self, identity: Identity) {
        self.state
            .lock()
            .await
            .identities
            .insert(identity.id.clone(), identity);
    }

    /// Credits held by a platform address
    pub async fn address_credits(&self, address: &str) -> u64 {
        self.state
            .lock()
            .await
            .address_credits
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    fn check_keys(
        public_keys: &[IdentityPublicKey],
        signer: &PlatformSigner,
    ) -> Result<(), PlatformError> {
        let mut seen = HashSet::new();
        for key in public_keys {
            if !seen.insert(key.id) {
                return Err(PlatformError::Sdk(format!("duplicate key id {}", key.id)));
            }
            if key.purpose == Purpose::Transfer && key.security_level != SecurityLevel::Critical {
                return Err(PlatformError::Sdk(format!(
                    "TRANSFER key {} must use CRITICAL security level",
                    key.id
                )));
            }
            if !signer.holds_key_for(key) {
                return Err(PlatformError::Sdk(format!(
                    "signer does not hold the private key for key {}",
                    key.id
                )));
            }
        }
        Ok(())
    }
}

/// Extract the credit amount from the proof's serialized transaction
fn locked_credits(proof: &AssetLockProof) -> Result<u64, PlatformError> {
    parse_credit_value(&proof.transaction)
        .map(|duffs| duffs as u64 * CREDITS_PER_DUFF)
        .ok_or_else(|| PlatformError::Sdk("malformed asset-lock transaction".to_string()))
}

fn parse_credit_value(tx: &[u8]) -> Option<i64> {
    let mut pos = 0usize;

    let word = u32::from_le_bytes(tx.get(pos..pos + 4)?.try_into().ok()?);
    pos += 4;
    if (word >> 16) as u16 != crate::tx::builder::TX_TYPE_ASSET_LOCK {
        return None;
    }

    let vin = read_compact_size(tx, &mut pos).ok()?;
    for _ in 0..vin {
        pos = pos.checked_add(36)?; // outpoint
        let script_len = read_compact_size(tx, &mut pos).ok()? as usize;
        pos = pos.checked_add(script_len)?.checked_add(4)?; // script + sequence
    }

    let vout = read_compact_size(tx, &mut pos).ok()?;
    for _ in 0..vout {
        pos = pos.checked_add(8)?;
        let script_len = read_compact_size(tx, &mut pos).ok()? as usize;
        pos = pos.checked_add(script_len)?;
    }

    pos = pos.checked_add(4)?; // lock time

    let payload_len = read_compact_size(tx, &mut pos).ok()? as usize;
    let payload = tx.get(pos..pos + payload_len)?;

    let mut ppos = 1usize; // payload version
    let outputs = read_compact_size(payload, &mut ppos).ok()?;
    if outputs == 0 {
        return None;
    }
    let value = i64::from_le_bytes(payload.get(ppos..ppos + 8)?.try_into().ok()?);
    if value <= 0 {
        return None;
    }
    Some(value)
}

#[async_trait]
impl PlatformDriver for MemoryPlatform {
    async fn create_identity(
        &self,
        public_keys: &[IdentityPublicKey],
        proof: &AssetLockProof,
        _asset_lock_key: &crate::keys::KeyPair,
        signer: &PlatformSigner,
    ) -> Result<Identity, PlatformError> {
        Self::check_keys(public_keys, signer)?;
        let balance = locked_credits(proof)?;
        let id = proof.identity_id();

        let mut state = self.state.lock().await;
        if !state.spent_proofs.insert(id.clone()) {
            return Err(PlatformError::Sdk("asset lock already spent".to_string()));
        }
        if state.identities.contains_key(&id) {
            return Err(PlatformError::Sdk(format!("identity {} already exists", id)));
        }

        let identity = Identity {
            id: id.clone(),
            revision: 0,
            balance,
            public_keys: public_keys.to_vec(),
        };
        state.identities.insert(id, identity.clone());
        Ok(identity)
    }

    async fn top_up_identity(
        &self,
        identity: &Identity,
        proof: &AssetLockProof,
        _asset_lock_key: &crate::keys::KeyPair,
    ) -> Result<u64, PlatformError> {
        let credits = locked_credits(proof)?;
        let proof_id = proof.identity_id();

        let mut state = self.state.lock().await;
        if !state.spent_proofs.insert(proof_id) {
            return Err(PlatformError::Sdk("asset lock already spent".to_string()));
        }
        let stored = state
            .identities
            .get_mut(&identity.id)
            .ok_or_else(|| PlatformError::IdentityNotFound(identity.id.clone()))?;

        stored.balance += credits;
        Ok(stored.balance)
    }

    async fn update_identity(
        &self,
        identity: &Identity,
        signer: &PlatformSigner,
        add_public_keys: &[IdentityPublicKey],
        disable_key_ids: &[u32],
    ) -> Result<Identity, PlatformError> {
        let mut state = self.state.lock().await;
        let stored = state
            .identities
            .get_mut(&identity.id)
            .ok_or_else(|| PlatformError::IdentityNotFound(identity.id.clone()))?;

        let has_master = stored.public_keys.iter().any(|k| {
            k.security_level == SecurityLevel::Master
                && k.disabled_at.is_none()
                && signer.holds_key_for(k)
        });
        if !has_master {
            return Err(PlatformError::Sdk(
                "identity update requires a MASTER key in the signer".to_string(),
            ));
        }

        for key in add_public_keys {
            if stored.public_keys.iter().any(|k| k.id == key.id) {
                return Err(PlatformError::Sdk(format!("key id {} already in use", key.id)));
            }
            if key.purpose == Purpose::Transfer && key.security_level != SecurityLevel::Critical {
                return Err(PlatformError::Sdk(format!(
                    "TRANSFER key {} must use CRITICAL security level",
                    key.id
                )));
            }
            if !signer.holds_key_for(key) {
                return Err(PlatformError::Sdk(format!(
                    "ownership proof missing for added key {}",
                    key.id
                )));
            }
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        for key_id in disable_key_ids {
            let key = stored
                .public_keys
                .iter_mut()
                .find(|k| k.id == *key_id)
                .ok_or_else(|| PlatformError::Sdk(format!("no key with id {}", key_id)))?;
            key.disabled_at = Some(now);
        }

        stored.public_keys.extend(add_public_keys.iter().cloned());
        stored.revision += 1;
        Ok(stored.clone())
    }

    async fn fund_from_asset_lock(
        &self,
        proof: &AssetLockProof,
        _asset_lock_key: &crate::keys::KeyPair,
        outputs: &[CreditOutput],
        _signer: &PlatformSigner,
    ) -> Result<(), PlatformError> {
        if outputs.is_empty() {
            return Err(PlatformError::Sdk("no outputs".to_string()));
        }
        let credits = locked_credits(proof)?;
        let total: u64 = outputs.iter().map(|o| o.amount).sum();
        if total > credits {
            return Err(PlatformError::Sdk(format!(
                "outputs total {} exceeds locked {} credits",
                total, credits
            )));
        }

        let mut state = self.state.lock().await;
        if !state.spent_proofs.insert(proof.identity_id()) {
            return Err(PlatformError::Sdk("asset lock already spent".to_string()));
        }
        for output in outputs {
            *state
                .address_credits
                .entry(output.address.clone())
                .or_insert(0) += output.amount;
        }
        Ok(())
    }

    async fn fetch_identity(&self, id: &str) -> Result<Option<Identity>, PlatformError> {
        Ok(self.state.lock().await.identities.get(id).cloned())
    }

    async fn dpns_is_name_available(&self, label: &str) -> Result<bool, PlatformError> {
        let normalized = normalize_label(label);
        Ok(!self.state.lock().await.names.contains_key(&normalized))
    }

    async fn dpns_register_name(
        &self,
        label: &str,
        identity: &Identity,
        key_id: u32,
        signer: &PlatformSigner,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().await;
        let stored = state
            .identities
            .get(&identity.id)
            .ok_or_else(|| PlatformError::IdentityNotFound(identity.id.clone()))?;

        let key = stored
            .key_by_id(key_id)
            .ok_or_else(|| PlatformError::Sdk(format!("no active key with id {}", key_id)))?;
        if !signer.holds_key_for(key) {
            return Err(PlatformError::Sdk(
                "signer does not hold the registration key".to_string(),
            ));
        }

        let normalized = normalize_label(label);
        if state.names.contains_key(&normalized) {
            return Err(PlatformError::NameTaken(label.to_string()));
        }
        state.names.insert(normalized, identity.id.clone());
        Ok(())
    }
}
