//! Key Backup Export
//!
//! The only recovery artifact the bridge produces. Written immediately
//! after key generation (a crash between then and completion would
//! otherwise strand funds) and again at completion once the identity id
//! is known.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::bridge::state::{BridgeMode, BridgeState};
use crate::config::NetworkParams;
use crate::keys::{private_key_to_wif, IdentityKey, KeyType, Purpose, SecurityLevel};

/// One identity key in the backup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupIdentityKey {
    pub id: u32,
    pub name: String,
    pub key_type: KeyType,
    pub purpose: Purpose,
    pub security_level: SecurityLevel,
    pub private_key_wif: String,
    pub private_key_hex: String,
    pub public_key_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation_path: Option<String>,
}

/// The asset-lock key in the backup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupAssetLockKey {
    pub wif: String,
    pub public_key_hex: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// The exported key-backup document
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBackup {
    pub network: String,
    /// ISO-8601 UTC creation time
    pub created: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub identity_keys: Vec<BackupIdentityKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_lock_key: Option<BackupAssetLockKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_identity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_platform_address: Option<String>,
}

fn backup_identity_key(key: &IdentityKey, params: &NetworkParams) -> BackupIdentityKey {
    BackupIdentityKey {
        id: key.id,
        name: key.name.clone(),
        key_type: key.key_type,
        purpose: key.purpose,
        security_level: key.security_level,
        private_key_wif: private_key_to_wif(key.key_pair.secret_key(), params, true),
        private_key_hex: key.key_pair.secret_hex(),
        public_key_hex: key.key_pair.public_hex(),
        derivation_path: key.derivation_path.clone(),
    }
}

/// Build the backup document for the current state
pub fn backup_from_state(state: &BridgeState, params: &NetworkParams) -> KeyBackup {
    let asset_lock_key = state.asset_lock_key.as_ref().map(|pair| {
        let note = match &state.mode {
            BridgeMode::Create => None,
            _ => Some(
                "one-shot asset-lock key; not derivable from any mnemonic".to_string(),
            ),
        };
        BackupAssetLockKey {
            wif: private_key_to_wif(pair.secret_key(), params, true),
            public_key_hex: pair.public_hex(),
            derivation_path: state.asset_lock_path.clone(),
            note,
        }
    });

    let (target_identity_id, recipient_platform_address) = match &state.mode {
        BridgeMode::TopUp { target_identity_id } => (Some(target_identity_id.clone()), None),
        BridgeMode::SendToAddress { recipient } => (None, Some(recipient.clone())),
        BridgeMode::FundAddress { address, .. } => (None, Some(address.clone())),
        _ => (None, None),
    };

    KeyBackup {
        network: params.network.name().to_string(),
        created: chrono::Utc::now().to_rfc3339(),
        mode: state.mode.name().to_string(),
        deposit_address: state.deposit_address.clone(),
        txid: state.broadcast_txid.clone(),
        mnemonic: state.mnemonic.clone(),
        identity_id: state.identity_id.clone(),
        identity_keys: state
            .identity_keys
            .iter()
            .map(|k| backup_identity_key(k, params))
            .collect(),
        asset_lock_key,
        target_identity_id,
        recipient_platform_address,
    }
}

/// Filename for a backup document, per the recovery-artifact conventions
pub fn backup_filename(backup: &KeyBackup) -> String {
    if let Some(id) = &backup.identity_id {
        return format!("dash-identity-{}.json", id);
    }

    match backup.mode.as_str() {
        "topup" => {
            let target = backup.target_identity_id.as_deref().unwrap_or("unknown");
            let first8: String = target.chars().take(8).collect();
            format!("dash-topup-{}-recovery.json", first8)
        }
        "sendToAddress" => {
            let recipient = backup
                .recipient_platform_address
                .as_deref()
                .unwrap_or("unknown");
            let last8: String = recipient
                .chars()
                .rev()
                .take(8)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("dash-send-to-address-{}-recovery.json", last8)
        }
        _ => {
            let address = backup.deposit_address.as_deref().unwrap_or("unknown");
            let prefix: String = address.chars().take(6).collect();
            let suffix: String = address
                .chars()
                .rev()
                .take(6)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("dash-keys-{}-{}-pending.json", prefix, suffix)
        }
    }
}

/// Write the backup into `dir`, returning the full path
pub fn write_backup(dir: &Path, backup: &KeyBackup) -> io::Result<PathBuf> {
    let path = dir.join(backup_filename(backup));
    let json = serde_json::to_string_pretty(backup)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    std::fs::write(&path, json)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Network;
    use crate::keys::KeyPair;

    fn create_state() -> BridgeState {
        BridgeState::new(Network::Testnet, BridgeMode::Create).keys_generated(
            Some("abandon ability able".to_string()),
            KeyPair::generate(),
            Some("m/44'/1'/0'/0/0".to_string()),
            vec![IdentityKey::new(
                0,
                "master-auth",
                KeyType::EcdsaSecp256k1,
                Purpose::Authentication,
                SecurityLevel::Master,
                KeyPair::generate(),
                Some("m/9'/1'/5'/0'/0'/0'/0'".to_string()),
            )],
            "yDepositAddress123456".to_string(),
        )
    }

    #[test]
    fn test_create_backup_contents() {
        let params = NetworkParams::testnet();
        let state = create_state();
        let backup = backup_from_state(&state, &params);

        assert_eq!(backup.network, "testnet");
        assert_eq!(backup.mode, "create");
        assert!(backup.mnemonic.is_some());
        assert_eq!(backup.identity_keys.len(), 1);
        assert_eq!(backup.identity_keys[0].security_level, SecurityLevel::Master);

        let alk = backup.asset_lock_key.as_ref().unwrap();
        assert!(alk.wif.len() > 40);
        assert_eq!(alk.derivation_path.as_deref(), Some("m/44'/1'/0'/0/0"));
        assert!(alk.note.is_none());

        let json = serde_json::to_string(&backup).unwrap();
        assert!(json.contains("\"privateKeyWif\""));
        assert!(json.contains("\"MASTER\""));
        assert!(json.contains("\"ECDSA_SECP256K1\""));
        assert!(json.contains("\"depositAddress\""));
    }

    #[test]
    fn test_one_shot_key_note() {
        let params = NetworkParams::testnet();
        let state = BridgeState::new(
            Network::Testnet,
            BridgeMode::TopUp {
                target_identity_id: "4".repeat(43),
            },
        )
        .keys_generated(None, KeyPair::generate(), None, vec![], "yAddr".to_string());

        let backup = backup_from_state(&state, &params);
        assert!(backup.mnemonic.is_none());
        let alk = backup.asset_lock_key.unwrap();
        assert!(alk.note.unwrap().contains("one-shot"));
    }

    #[test]
    fn test_filenames() {
        let params = NetworkParams::testnet();

        // Identity known: named after it
        let mut state = create_state();
        state.identity_id = Some("8txFq7mQkLzABCDEF".to_string());
        let backup = backup_from_state(&state, &params);
        assert_eq!(
            backup_filename(&backup),
            "dash-identity-8txFq7mQkLzABCDEF.json"
        );

        // Top-up: first 8 of the target id
        let state = BridgeState::new(
            Network::Testnet,
            BridgeMode::TopUp {
                target_identity_id: "AbCdEfGhXYZ123".to_string(),
            },
        );
        let backup = backup_from_state(&state, &params);
        assert_eq!(backup_filename(&backup), "dash-topup-AbCdEfGh-recovery.json");

        // Send: last 8 of the recipient
        let state = BridgeState::new(
            Network::Testnet,
            BridgeMode::SendToAddress {
                recipient: "tdash1qqqqexample99".to_string(),
            },
        );
        let backup = backup_from_state(&state, &params);
        assert_eq!(
            backup_filename(&backup),
            "dash-send-to-address-xample99-recovery.json"
        );

        // Create before the identity is known: pending keys file
        let backup = backup_from_state(&create_state(), &params);
        assert_eq!(
            backup_filename(&backup),
            "dash-keys-yDepos-123456-pending.json"
        );
    }

    #[test]
    fn test_write_backup() {
        let params = NetworkParams::testnet();
        let dir = std::env::temp_dir().join(format!("bridge-backup-{}", rand::random::<u32>()));
        std::fs::create_dir_all(&dir).unwrap();

        let backup = backup_from_state(&create_state(), &params);
        let path = write_backup(&dir, &backup).unwrap();
        assert!(path.exists());

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"mnemonic\""));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
