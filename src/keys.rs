//! Key Operations
//!
//! secp256k1 keypairs, WIF and P2PKH address encoding, the identity-key
//! model (type, purpose, security level) and the matching/validation rules
//! used when a caller supplies a private key for an identity operation.

use secp256k1::{PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::{base58check_decode, base58check_encode, encode_hex};
use crate::config::{Network, NetworkParams};
use crate::hash::hash160;

/// Key errors
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("invalid WIF: {0}")]
    InvalidWif(String),

    #[error("WIF prefix 0x{0:02x} does not match the {1} network")]
    WifNetworkMismatch(u8, Network),

    #[error("no identity key matches the supplied private key")]
    NoMatchingKey,

    #[error("key purpose {0} not allowed for this operation")]
    PurposeNotAllowed(Purpose),

    #[error("key security level {0} not allowed for this operation")]
    SecurityLevelNotAllowed(SecurityLevel),
}

// =============================================================================
// Key pair
// =============================================================================

/// A secp256k1 keypair. The public key is always kept in compressed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random keypair from OS randomness
    pub fn generate() -> Self {
        Self::from_secret(SecretKey::new(&mut rand::thread_rng()))
    }

    /// Build the pair for an existing secret scalar
    pub fn from_secret(secret: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public = PublicKey::from_secret_key(&secp, &secret);
        Self { secret, public }
    }

    /// Build from raw secret bytes (must be 32 bytes in [1, n-1])
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|e| KeyError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self::from_secret(secret))
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.secret_bytes()
    }

    /// Compressed public key (33 bytes, 0x02/0x03 prefix)
    pub fn public_bytes(&self) -> [u8; 33] {
        self.public.serialize()
    }

    pub fn public_hex(&self) -> String {
        encode_hex(&self.public_bytes())
    }

    /// Hex-encoded secret (for backup export)
    pub fn secret_hex(&self) -> String {
        encode_hex(&self.secret_bytes())
    }
}

// =============================================================================
// Addresses and WIF
// =============================================================================

/// P2PKH address: base58check(version byte || hash160(pubkey))
pub fn public_key_to_address(public_key: &[u8], params: &NetworkParams) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(params.address_version);
    payload.extend_from_slice(&hash160(public_key));
    base58check_encode(&payload)
}

/// Encode a private key as WIF
pub fn private_key_to_wif(secret: &SecretKey, params: &NetworkParams, compressed: bool) -> String {
    let mut payload = Vec::with_capacity(34);
    payload.push(params.wif_prefix);
    payload.extend_from_slice(&secret.secret_bytes());
    if compressed {
        payload.push(0x01);
    }
    base58check_encode(&payload)
}

/// A decoded WIF private key
#[derive(Debug, Clone)]
pub struct WifKey {
    pub secret: SecretKey,
    pub compressed: bool,
    pub prefix: u8,
}

const KNOWN_WIF_PREFIXES: [u8; 2] = [204, 239];

/// Decode a WIF string. The caller is responsible for checking that the
/// prefix matches the session network.
pub fn wif_to_private_key(wif: &str) -> Result<WifKey, KeyError> {
    let payload = base58check_decode(wif).map_err(|e| KeyError::InvalidWif(e.to_string()))?;

    let (compressed, body) = match payload.len() {
        33 => (false, &payload[..]),
        34 => {
            if payload[33] != 0x01 {
                return Err(KeyError::InvalidWif("bad compression flag".to_string()));
            }
            (true, &payload[..33])
        }
        n => return Err(KeyError::InvalidWif(format!("unexpected length {}", n))),
    };

    let prefix = body[0];
    if !KNOWN_WIF_PREFIXES.contains(&prefix) {
        return Err(KeyError::InvalidWif(format!(
            "unknown network prefix 0x{:02x}",
            prefix
        )));
    }

    let secret = SecretKey::from_slice(&body[1..33])
        .map_err(|e| KeyError::InvalidWif(e.to_string()))?;

    Ok(WifKey {
        secret,
        compressed,
        prefix,
    })
}

// =============================================================================
// Identity keys
// =============================================================================

/// On-chain key type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KeyType {
    EcdsaSecp256k1,
    EcdsaHash160,
}

impl std::fmt::Display for KeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyType::EcdsaSecp256k1 => f.write_str("ECDSA_SECP256K1"),
            KeyType::EcdsaHash160 => f.write_str("ECDSA_HASH160"),
        }
    }
}

/// Key purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Purpose {
    Authentication,
    Encryption,
    Decryption,
    Transfer,
    Voting,
    Owner,
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Purpose::Authentication => "AUTHENTICATION",
            Purpose::Encryption => "ENCRYPTION",
            Purpose::Decryption => "DECRYPTION",
            Purpose::Transfer => "TRANSFER",
            Purpose::Voting => "VOTING",
            Purpose::Owner => "OWNER",
        };
        f.write_str(s)
    }
}

/// Key security level, ordered strongest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityLevel {
    Master,
    Critical,
    High,
    Medium,
}

impl std::fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SecurityLevel::Master => "MASTER",
            SecurityLevel::Critical => "CRITICAL",
            SecurityLevel::High => "HIGH",
            SecurityLevel::Medium => "MEDIUM",
        };
        f.write_str(s)
    }
}

/// An identity public key as seen on chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPublicKey {
    pub id: u32,
    pub key_type: KeyType,
    pub purpose: Purpose,
    pub security_level: SecurityLevel,
    /// Compressed pubkey (33 bytes) or its hash160 (20 bytes), per key type
    pub data: Vec<u8>,
    pub disabled_at: Option<u64>,
}

/// An identity key held locally, private half included
#[derive(Debug, Clone)]
pub struct IdentityKey {
    pub id: u32,
    pub name: String,
    pub key_type: KeyType,
    pub purpose: Purpose,
    pub security_level: SecurityLevel,
    pub key_pair: KeyPair,
    pub derivation_path: Option<String>,
}

impl IdentityKey {
    /// Build an identity key. TRANSFER keys are always CRITICAL; any other
    /// requested level is normalized here.
    pub fn new(
        id: u32,
        name: impl Into<String>,
        key_type: KeyType,
        purpose: Purpose,
        security_level: SecurityLevel,
        key_pair: KeyPair,
        derivation_path: Option<String>,
    ) -> Self {
        let security_level = if purpose == Purpose::Transfer {
            SecurityLevel::Critical
        } else {
            security_level
        };

        Self {
            id,
            name: name.into(),
            key_type,
            purpose,
            security_level,
            key_pair,
            derivation_path,
        }
    }

    /// Encoded payload data: the compressed pubkey itself, or its hash160
    pub fn payload_data(&self) -> Vec<u8> {
        match self.key_type {
            KeyType::EcdsaSecp256k1 => self.key_pair.public_bytes().to_vec(),
            KeyType::EcdsaHash160 => hash160(&self.key_pair.public_bytes()).to_vec(),
        }
    }

    /// The on-chain view of this key
    pub fn to_public(&self) -> IdentityPublicKey {
        IdentityPublicKey {
            id: self.id,
            key_type: self.key_type,
            purpose: self.purpose,
            security_level: self.security_level,
            data: self.payload_data(),
            disabled_at: None,
        }
    }
}

// =============================================================================
// Key matching and validation
// =============================================================================

/// Result of matching a WIF against an identity's on-chain keys
#[derive(Debug, Clone)]
pub struct MatchedKey {
    pub key_id: u32,
    pub purpose: Purpose,
    pub security_level: SecurityLevel,
    pub public_key: Vec<u8>,
    pub key_pair: KeyPair,
}

/// Match a user-supplied WIF against an identity's public keys.
///
/// The WIF prefix must match the session network; the comparison is
/// bytewise against the compressed pubkey (SECP256K1 keys) or its hash160
/// (HASH160 keys). Disabled keys never match.
pub fn find_matching_key(
    wif: &str,
    keys: &[IdentityPublicKey],
    params: &NetworkParams,
) -> Result<MatchedKey, KeyError> {
    let parsed = wif_to_private_key(wif)?;
    if parsed.prefix != params.wif_prefix {
        return Err(KeyError::WifNetworkMismatch(parsed.prefix, params.network));
    }

    let pair = KeyPair::from_secret(parsed.secret);
    let public_bytes = pair.public_bytes();
    let public_hash = hash160(&public_bytes);

    for key in keys {
        if key.disabled_at.is_some() {
            continue;
        }
        let matches = match key.key_type {
            KeyType::EcdsaSecp256k1 => key.data == public_bytes,
            KeyType::EcdsaHash160 => key.data == public_hash,
        };
        if matches {
            return Ok(MatchedKey {
                key_id: key.id,
                purpose: key.purpose,
                security_level: key.security_level,
                public_key: key.data.clone(),
                key_pair: pair,
            });
        }
    }

    Err(KeyError::NoMatchingKey)
}

/// Identity updates (adding or disabling keys) require a MASTER key
pub fn validate_for_identity_update(key: &MatchedKey) -> Result<(), KeyError> {
    if key.security_level != SecurityLevel::Master {
        return Err(KeyError::SecurityLevelNotAllowed(key.security_level));
    }
    Ok(())
}

/// DPNS name registration requires an AUTHENTICATION key at CRITICAL or
/// HIGH level
pub fn validate_for_name_registration(key: &MatchedKey) -> Result<(), KeyError> {
    if key.purpose != Purpose::Authentication {
        return Err(KeyError::PurposeNotAllowed(key.purpose));
    }
    match key.security_level {
        SecurityLevel::Critical | SecurityLevel::High => Ok(()),
        level => Err(KeyError::SecurityLevelNotAllowed(level)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn testnet() -> NetworkParams {
        NetworkParams::testnet()
    }

    #[test]
    fn test_generate_keypair() {
        let pair = KeyPair::generate();
        let public = pair.public_bytes();
        assert_eq!(public.len(), 33);
        assert!(public[0] == 0x02 || public[0] == 0x03);
    }

    #[test]
    fn test_wif_round_trip() {
        let params = testnet();
        let pair = KeyPair::generate();
        let wif = private_key_to_wif(pair.secret_key(), &params, true);

        let decoded = wif_to_private_key(&wif).unwrap();
        assert_eq!(decoded.secret, *pair.secret_key());
        assert!(decoded.compressed);
        assert_eq!(decoded.prefix, params.wif_prefix);
    }

    #[test]
    fn test_wif_rejects_garbage() {
        assert!(matches!(
            wif_to_private_key("not-a-wif"),
            Err(KeyError::InvalidWif(_))
        ));
        // Valid base58check but unknown prefix
        let bogus = base58check_encode(&[0x42; 34]);
        assert!(matches!(
            wif_to_private_key(&bogus),
            Err(KeyError::InvalidWif(_))
        ));
    }

    #[test]
    fn test_address_prefix_per_network() {
        let pair = KeyPair::generate();
        let mainnet_addr = public_key_to_address(&pair.public_bytes(), &NetworkParams::mainnet());
        let testnet_addr = public_key_to_address(&pair.public_bytes(), &NetworkParams::testnet());
        assert!(mainnet_addr.starts_with('X'), "got {}", mainnet_addr);
        assert!(testnet_addr.starts_with('y'), "got {}", testnet_addr);
    }

    #[test]
    fn test_transfer_purpose_forces_critical() {
        let key = IdentityKey::new(
            2,
            "transfer",
            KeyType::EcdsaSecp256k1,
            Purpose::Transfer,
            SecurityLevel::Medium,
            KeyPair::generate(),
            None,
        );
        assert_eq!(key.security_level, SecurityLevel::Critical);
    }

    #[test]
    fn test_payload_data_widths() {
        let pair = KeyPair::generate();
        let secp_key = IdentityKey::new(
            0,
            "auth",
            KeyType::EcdsaSecp256k1,
            Purpose::Authentication,
            SecurityLevel::Master,
            pair.clone(),
            None,
        );
        assert_eq!(secp_key.payload_data().len(), 33);

        let hash_key = IdentityKey::new(
            1,
            "auth-hash",
            KeyType::EcdsaHash160,
            Purpose::Authentication,
            SecurityLevel::High,
            pair,
            None,
        );
        assert_eq!(hash_key.payload_data().len(), 20);
    }

    #[test]
    fn test_find_matching_key_symmetry() {
        let params = testnet();
        let pair = KeyPair::generate();
        let wif = private_key_to_wif(pair.secret_key(), &params, true);

        let on_chain = vec![IdentityPublicKey {
            id: 0,
            key_type: KeyType::EcdsaSecp256k1,
            purpose: Purpose::Authentication,
            security_level: SecurityLevel::Master,
            data: pair.public_bytes().to_vec(),
            disabled_at: None,
        }];

        let matched = find_matching_key(&wif, &on_chain, &params).unwrap();
        assert_eq!(matched.key_id, 0);
        assert_eq!(matched.security_level, SecurityLevel::Master);

        // An unrelated key must not match
        let other = KeyPair::generate();
        let other_wif = private_key_to_wif(other.secret_key(), &params, true);
        assert!(matches!(
            find_matching_key(&other_wif, &on_chain, &params),
            Err(KeyError::NoMatchingKey)
        ));
    }

    #[test]
    fn test_find_matching_key_hash160() {
        let params = testnet();
        let pair = KeyPair::generate();
        let wif = private_key_to_wif(pair.secret_key(), &params, true);

        let on_chain = vec![IdentityPublicKey {
            id: 3,
            key_type: KeyType::EcdsaHash160,
            purpose: Purpose::Authentication,
            security_level: SecurityLevel::High,
            data: hash160(&pair.public_bytes()).to_vec(),
            disabled_at: None,
        }];

        let matched = find_matching_key(&wif, &on_chain, &params).unwrap();
        assert_eq!(matched.key_id, 3);
    }

    #[test]
    fn test_wif_network_mismatch() {
        // Mainnet WIF presented in a testnet session
        let pair = KeyPair::generate();
        let mainnet_wif = private_key_to_wif(pair.secret_key(), &NetworkParams::mainnet(), true);

        let result = find_matching_key(&mainnet_wif, &[], &testnet());
        assert!(matches!(
            result,
            Err(KeyError::WifNetworkMismatch(204, Network::Testnet))
        ));
    }

    #[test]
    fn test_update_validation_requires_master() {
        let pair = KeyPair::generate();
        let master = MatchedKey {
            key_id: 0,
            purpose: Purpose::Authentication,
            security_level: SecurityLevel::Master,
            public_key: pair.public_bytes().to_vec(),
            key_pair: pair.clone(),
        };
        assert!(validate_for_identity_update(&master).is_ok());

        let transfer = MatchedKey {
            key_id: 1,
            purpose: Purpose::Transfer,
            security_level: SecurityLevel::Critical,
            public_key: pair.public_bytes().to_vec(),
            key_pair: pair,
        };
        let err = validate_for_identity_update(&transfer).unwrap_err();
        assert!(err.to_string().contains("CRITICAL"));
    }

    #[test]
    fn test_name_registration_validation() {
        let pair = KeyPair::generate();
        let mut key = MatchedKey {
            key_id: 1,
            purpose: Purpose::Authentication,
            security_level: SecurityLevel::High,
            public_key: pair.public_bytes().to_vec(),
            key_pair: pair,
        };
        assert!(validate_for_name_registration(&key).is_ok());

        key.security_level = SecurityLevel::Master;
        assert!(matches!(
            validate_for_name_registration(&key),
            Err(KeyError::SecurityLevelNotAllowed(SecurityLevel::Master))
        ));

        key.security_level = SecurityLevel::High;
        key.purpose = Purpose::Transfer;
        assert!(matches!(
            validate_for_name_registration(&key),
            Err(KeyError::PurposeNotAllowed(Purpose::Transfer))
        ));
    }
}
