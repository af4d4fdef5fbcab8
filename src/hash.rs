//! Hash Primitives
//!
//! Single and double SHA-256 plus hash160 (RIPEMD-160 over SHA-256), the
//! three digests the Dash wire format uses.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Single SHA-256
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Sha256::digest(data));
    out
}

/// Double SHA-256 (txids, sighashes, base58check checksums)
pub fn hash256(data: &[u8]) -> [u8; 32] {
    sha256(&sha256(data))
}

/// RIPEMD-160 of SHA-256 (P2PKH pubkey hashes)
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(sha));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash256_known_vector() {
        // double SHA-256 of "hello"
        assert_eq!(
            hex::encode(hash256(b"hello")),
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        );
    }

    #[test]
    fn test_hash160_width() {
        let digest = hash160(&[0x02; 33]);
        assert_eq!(digest.len(), 20);
        // Deterministic
        assert_eq!(digest, hash160(&[0x02; 33]));
    }
}
