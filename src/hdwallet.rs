//! HD Wallet
//!
//! BIP-39 mnemonics and BIP-32 derivation over secp256k1 for the two key
//! families the bridge uses:
//!
//! - asset-lock keys on the BIP-44 path `m/44'/{coin}'/0'/0/0`
//! - identity keys on the DIP-0013 path `m/9'/{coin}'/5'/0'/0'/{i}'/{k}'`
//!
//! Re-entering the same mnemonic on the same network regenerates
//! bit-identical keys, which is what makes the key-backup export a usable
//! recovery artifact.

use bip39::{Language, Mnemonic};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey};
use sha2::Sha512;
use thiserror::Error;

use crate::keys::KeyPair;

type HmacSha512 = Hmac<Sha512>;

/// HD wallet errors
#[derive(Debug, Error)]
pub enum HdError {
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// A derived child scalar fell outside the curve order. Probability is
    /// ~2^-127 per BIP-32; callers retry the next index.
    #[error("derivation failed at {0}: child key out of range")]
    Derivation(String),

    #[error("unsupported word count: {0} (use 12 or 24)")]
    UnsupportedWordCount(usize),
}

// =============================================================================
// Derivation paths
// =============================================================================

/// A single BIP-32 path component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildNumber {
    Normal(u32),
    Hardened(u32),
}

impl ChildNumber {
    /// Wire index: hardened components have the high bit set
    pub fn index(&self) -> u32 {
        match self {
            ChildNumber::Normal(i) => *i,
            ChildNumber::Hardened(i) => 0x8000_0000 | *i,
        }
    }

    pub fn is_hardened(&self) -> bool {
        matches!(self, ChildNumber::Hardened(_))
    }
}

impl std::fmt::Display for ChildNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChildNumber::Normal(i) => write!(f, "{}", i),
            ChildNumber::Hardened(i) => write!(f, "{}'", i),
        }
    }
}

/// A full derivation path from the master key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath(pub Vec<ChildNumber>);

impl std::fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("m")?;
        for child in &self.0 {
            write!(f, "/{}", child)?;
        }
        Ok(())
    }
}

/// BIP-44-shaped asset-lock path: `m/44'/{coin}'/0'/0/0`
pub fn asset_lock_path(coin_type: u32) -> DerivationPath {
    DerivationPath(vec![
        ChildNumber::Hardened(44),
        ChildNumber::Hardened(coin_type),
        ChildNumber::Hardened(0),
        ChildNumber::Normal(0),
        ChildNumber::Normal(0),
    ])
}

/// DIP-0013 identity-key path: `m/9'/{coin}'/5'/0'/0'/{identity}'/{key}'`.
/// The hardened `5'` feature index and the hardened identity/key suffix are
/// required for compatibility with wallets recovering from the same
/// mnemonic.
pub fn identity_key_path(coin_type: u32, identity_index: u32, key_index: u32) -> DerivationPath {
    DerivationPath(vec![
        ChildNumber::Hardened(9),
        ChildNumber::Hardened(coin_type),
        ChildNumber::Hardened(5),
        ChildNumber::Hardened(0),
        ChildNumber::Hardened(0),
        ChildNumber::Hardened(identity_index),
        ChildNumber::Hardened(key_index),
    ])
}

// =============================================================================
// Extended private keys
// =============================================================================

/// A BIP-32 extended private key (secret scalar + chain code)
#[derive(Debug, Clone)]
pub struct ExtendedPrivKey {
    secret: SecretKey,
    chain_code: [u8; 32],
}

impl ExtendedPrivKey {
    /// Master key: HMAC-SHA512("Bitcoin seed", seed)
    pub fn master(seed: &[u8]) -> Result<Self, HdError> {
        let mut mac = HmacSha512::new_from_slice(b"Bitcoin seed")
            .map_err(|e| HdError::Derivation(format!("m: {}", e)))?;
        mac.update(seed);
        let digest = mac.finalize().into_bytes();

        let secret = SecretKey::from_slice(&digest[..32])
            .map_err(|_| HdError::Derivation("m".to_string()))?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[32..]);

        Ok(Self { secret, chain_code })
    }

    /// Derive one child key
    pub fn derive_child(&self, child: ChildNumber) -> Result<Self, HdError> {
        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| HdError::Derivation(format!("{}: {}", child, e)))?;

        if child.is_hardened() {
            mac.update(&[0x00]);
            mac.update(&self.secret.secret_bytes());
        } else {
            let secp = Secp256k1::new();
            let public = PublicKey::from_secret_key(&secp, &self.secret);
            mac.update(&public.serialize());
        }
        mac.update(&child.index().to_be_bytes());

        let digest = mac.finalize().into_bytes();
        let mut tweak_bytes = [0u8; 32];
        tweak_bytes.copy_from_slice(&digest[..32]);

        let tweak = Scalar::from_be_bytes(tweak_bytes)
            .map_err(|_| HdError::Derivation(child.to_string()))?;
        let secret = self
            .secret
            .add_tweak(&tweak)
            .map_err(|_| HdError::Derivation(child.to_string()))?;

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&digest[32..]);

        Ok(Self { secret, chain_code })
    }

    /// Derive along a full path
    pub fn derive_path(&self, path: &DerivationPath) -> Result<Self, HdError> {
        let mut key = self.clone();
        for child in &path.0 {
            key = key.derive_child(*child)?;
        }
        Ok(key)
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn to_key_pair(&self) -> KeyPair {
        KeyPair::from_secret(self.secret)
    }
}

// =============================================================================
// Mnemonics
// =============================================================================

/// Generate a fresh English mnemonic of 12 or 24 words
pub fn generate_mnemonic(word_count: usize) -> Result<Mnemonic, HdError> {
    let entropy_len = match word_count {
        12 => 16,
        24 => 32,
        n => return Err(HdError::UnsupportedWordCount(n)),
    };

    let mut entropy = vec![0u8; entropy_len];
    rand::thread_rng().fill_bytes(&mut entropy);

    Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| HdError::InvalidMnemonic(e.to_string()))
}

/// Parse and checksum-validate a mnemonic phrase
pub fn parse_mnemonic(phrase: &str) -> Result<Mnemonic, HdError> {
    Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|e| HdError::InvalidMnemonic(e.to_string()))
}

/// PBKDF2-HMAC-SHA512 seed (2048 rounds, 64 bytes) per BIP-39
pub fn mnemonic_to_seed(mnemonic: &Mnemonic, passphrase: &str) -> [u8; 64] {
    mnemonic.to_seed_normalized(passphrase)
}

// =============================================================================
// Bridge key families
// =============================================================================

/// Derive the asset-lock keypair for a mnemonic on the given network
pub fn derive_asset_lock_key(
    mnemonic: &Mnemonic,
    passphrase: &str,
    coin_type: u32,
) -> Result<(KeyPair, DerivationPath), HdError> {
    let seed = mnemonic_to_seed(mnemonic, passphrase);
    let path = asset_lock_path(coin_type);
    let key = ExtendedPrivKey::master(&seed)?.derive_path(&path)?;
    Ok((key.to_key_pair(), path))
}

/// Derive one DIP-0013 identity key. `key_index` is the key's position in
/// the identity's key list; `identity_index` defaults to 0 for the first
/// identity of a mnemonic.
pub fn derive_identity_key(
    mnemonic: &Mnemonic,
    passphrase: &str,
    coin_type: u32,
    identity_index: u32,
    key_index: u32,
) -> Result<(KeyPair, DerivationPath), HdError> {
    let seed = mnemonic_to_seed(mnemonic, passphrase);
    let path = identity_key_path(coin_type, identity_index, key_index);
    let key = ExtendedPrivKey::master(&seed)?.derive_path(&path)?;
    Ok((key.to_key_pair(), path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkParams;
    use crate::keys::public_key_to_address;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_path_display() {
        assert_eq!(asset_lock_path(5).to_string(), "m/44'/5'/0'/0/0");
        assert_eq!(asset_lock_path(1).to_string(), "m/44'/1'/0'/0/0");
        assert_eq!(
            identity_key_path(1, 0, 2).to_string(),
            "m/9'/1'/5'/0'/0'/0'/2'"
        );
    }

    #[test]
    fn test_mnemonic_checksum_rejected() {
        // 12x "abandon" has an invalid checksum
        let phrase = ["abandon"; 12].join(" ");
        assert!(matches!(
            parse_mnemonic(&phrase),
            Err(HdError::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_generate_word_counts() {
        assert_eq!(generate_mnemonic(12).unwrap().word_count(), 12);
        assert_eq!(generate_mnemonic(24).unwrap().word_count(), 24);
        assert!(matches!(
            generate_mnemonic(15),
            Err(HdError::UnsupportedWordCount(15))
        ));
    }

    #[test]
    fn test_derivation_deterministic() {
        let mnemonic = parse_mnemonic(TEST_MNEMONIC).unwrap();

        let (a, _) = derive_asset_lock_key(&mnemonic, "", 5).unwrap();
        let (b, _) = derive_asset_lock_key(&mnemonic, "", 5).unwrap();
        assert_eq!(a.secret_bytes(), b.secret_bytes());

        let (k1, _) = derive_identity_key(&mnemonic, "", 1, 0, 0).unwrap();
        let (k2, _) = derive_identity_key(&mnemonic, "", 1, 0, 0).unwrap();
        assert_eq!(k1.secret_bytes(), k2.secret_bytes());
    }

    #[test]
    fn test_coin_type_changes_keys() {
        let mnemonic = parse_mnemonic(TEST_MNEMONIC).unwrap();

        let (mainnet, _) = derive_asset_lock_key(&mnemonic, "", 5).unwrap();
        let (testnet, _) = derive_asset_lock_key(&mnemonic, "", 1).unwrap();
        assert_ne!(mainnet.secret_bytes(), testnet.secret_bytes());

        let (id_main, _) = derive_identity_key(&mnemonic, "", 5, 0, 0).unwrap();
        let (id_test, _) = derive_identity_key(&mnemonic, "", 1, 0, 0).unwrap();
        assert_ne!(id_main.secret_bytes(), id_test.secret_bytes());
    }

    #[test]
    fn test_key_indexes_differ() {
        let mnemonic = parse_mnemonic(TEST_MNEMONIC).unwrap();
        let (k0, _) = derive_identity_key(&mnemonic, "", 1, 0, 0).unwrap();
        let (k1, _) = derive_identity_key(&mnemonic, "", 1, 0, 1).unwrap();
        assert_ne!(k0.secret_bytes(), k1.secret_bytes());
    }

    #[test]
    fn test_deposit_address_prefix() {
        let mnemonic = parse_mnemonic(TEST_MNEMONIC).unwrap();

        let (mainnet_key, path) = derive_asset_lock_key(&mnemonic, "", 5).unwrap();
        assert_eq!(path.to_string(), "m/44'/5'/0'/0/0");
        let addr = public_key_to_address(&mainnet_key.public_bytes(), &NetworkParams::mainnet());
        assert!(addr.starts_with('X'), "got {}", addr);

        let (testnet_key, _) = derive_asset_lock_key(&mnemonic, "", 1).unwrap();
        let addr = public_key_to_address(&testnet_key.public_bytes(), &NetworkParams::testnet());
        assert!(addr.starts_with('y'), "got {}", addr);
    }

    #[test]
    fn test_passphrase_changes_seed() {
        let mnemonic = parse_mnemonic(TEST_MNEMONIC).unwrap();
        let (plain, _) = derive_asset_lock_key(&mnemonic, "", 1).unwrap();
        let (salted, _) = derive_asset_lock_key(&mnemonic, "hunter2", 1).unwrap();
        assert_ne!(plain.secret_bytes(), salted.secret_bytes());
    }
}
