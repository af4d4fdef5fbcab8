//! Wire Encodings
//!
//! Byte-level primitives shared by the transaction builder and key
//! handling: Bitcoin-style compact-size integers, fixed-width little-endian
//! integers, length-prefixed byte strings, hex, base58check and the byte
//! reversal that converts txids between display and internal order.

use thiserror::Error;

use crate::hash::hash256;

/// Codec errors
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    #[error("invalid base58: {0}")]
    InvalidBase58(String),

    #[error("base58check checksum mismatch")]
    ChecksumMismatch,

    #[error("base58check payload too short")]
    PayloadTooShort,

    #[error("truncated input at offset {0}")]
    Truncated(usize),
}

// =============================================================================
// Compact-size and fixed-width integers
// =============================================================================

/// Append a Bitcoin compact-size (varint) encoding of `n`
pub fn write_compact_size(buf: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(0xfd);
        buf.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        buf.push(0xfe);
        buf.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        buf.push(0xff);
        buf.extend_from_slice(&n.to_le_bytes());
    }
}

pub fn write_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

pub fn write_u16_le(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn write_u32_le(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn write_i32_le(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

pub fn write_i64_le(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

/// Append a compact-size length prefix followed by the bytes
pub fn write_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_compact_size(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Read a compact-size integer at `*pos`, advancing the cursor
pub fn read_compact_size(data: &[u8], pos: &mut usize) -> Result<u64, CodecError> {
    let first = *data.get(*pos).ok_or(CodecError::Truncated(*pos))?;
    *pos += 1;

    let width = match first {
        0xfd => 2,
        0xfe => 4,
        0xff => 8,
        n => return Ok(n as u64),
    };

    let end = pos
        .checked_add(width)
        .filter(|&e| e <= data.len())
        .ok_or(CodecError::Truncated(*pos))?;
    let mut bytes = [0u8; 8];
    bytes[..width].copy_from_slice(&data[*pos..end]);
    *pos = end;
    Ok(u64::from_le_bytes(bytes))
}

// =============================================================================
// Hex
// =============================================================================

/// Encode bytes as lowercase hex
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode hex, accepting either case; odd-length input is rejected
pub fn decode_hex(s: &str) -> Result<Vec<u8>, CodecError> {
    Ok(hex::decode(s)?)
}

// =============================================================================
// Base58Check
// =============================================================================

/// Encode payload with a 4-byte double-SHA-256 checksum suffix
pub fn base58check_encode(payload: &[u8]) -> String {
    let checksum = hash256(payload);
    let mut data = Vec::with_capacity(payload.len() + 4);
    data.extend_from_slice(payload);
    data.extend_from_slice(&checksum[..4]);
    bs58::encode(data).into_string()
}

/// Decode base58check, verifying the checksum; returns the payload without
/// the checksum bytes
pub fn base58check_decode(s: &str) -> Result<Vec<u8>, CodecError> {
    let data = bs58::decode(s)
        .into_vec()
        .map_err(|e| CodecError::InvalidBase58(e.to_string()))?;

    if data.len() < 4 {
        return Err(CodecError::PayloadTooShort);
    }

    let (payload, checksum) = data.split_at(data.len() - 4);
    let expected = hash256(payload);
    if checksum != &expected[..4] {
        return Err(CodecError::ChecksumMismatch);
    }

    Ok(payload.to_vec())
}

// =============================================================================
// Byte order
// =============================================================================

/// Reverse a byte slice. Txids are displayed in reverse of their wire order.
pub fn reverse_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = bytes.to_vec();
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_size_boundaries() {
        let mut buf = Vec::new();
        write_compact_size(&mut buf, 0);
        write_compact_size(&mut buf, 252);
        assert_eq!(buf, vec![0x00, 0xfc]);

        let mut buf = Vec::new();
        write_compact_size(&mut buf, 253);
        assert_eq!(buf, vec![0xfd, 0xfd, 0x00]);

        let mut buf = Vec::new();
        write_compact_size(&mut buf, 0xffff);
        assert_eq!(buf, vec![0xfd, 0xff, 0xff]);

        let mut buf = Vec::new();
        write_compact_size(&mut buf, 0x1_0000);
        assert_eq!(buf, vec![0xfe, 0x00, 0x00, 0x01, 0x00]);

        let mut buf = Vec::new();
        write_compact_size(&mut buf, 0x1_0000_0000);
        assert_eq!(buf, vec![0xff, 0, 0, 0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn test_compact_size_read_back() {
        let mut buf = Vec::new();
        for n in [0u64, 252, 253, 0xffff, 0x1_0000, 0x1_0000_0000] {
            write_compact_size(&mut buf, n);
        }
        let mut pos = 0;
        for expected in [0u64, 252, 253, 0xffff, 0x1_0000, 0x1_0000_0000] {
            assert_eq!(read_compact_size(&buf, &mut pos).unwrap(), expected);
        }
        assert_eq!(pos, buf.len());
        assert!(matches!(
            read_compact_size(&buf, &mut pos),
            Err(CodecError::Truncated(_))
        ));
    }

    #[test]
    fn test_fixed_width_le() {
        let mut buf = Vec::new();
        write_u16_le(&mut buf, 0x0803);
        assert_eq!(buf, vec![0x03, 0x08]);

        let mut buf = Vec::new();
        write_i64_le(&mut buf, 399_000);
        assert_eq!(buf, vec![0x98, 0x16, 0x06, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_var_bytes() {
        let mut buf = Vec::new();
        write_var_bytes(&mut buf, &[0xaa, 0xbb]);
        assert_eq!(buf, vec![0x02, 0xaa, 0xbb]);
    }

    #[test]
    fn test_hex_case_and_odd_length() {
        assert_eq!(decode_hex("AbCd").unwrap(), vec![0xab, 0xcd]);
        assert_eq!(encode_hex(&[0xab, 0xcd]), "abcd");
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
    }

    #[test]
    fn test_base58check_round_trip() {
        let payload = vec![0x8c, 1, 2, 3, 4, 5];
        let encoded = base58check_encode(&payload);
        assert_eq!(base58check_decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn test_base58check_rejects_corruption() {
        let encoded = base58check_encode(&[0x4c, 9, 9, 9]);
        let mut corrupted = encoded.into_bytes();
        // Flip one character to another base58 character
        corrupted[1] = if corrupted[1] == b'2' { b'3' } else { b'2' };
        let corrupted = String::from_utf8(corrupted).unwrap();
        assert!(matches!(
            base58check_decode(&corrupted),
            Err(CodecError::ChecksumMismatch) | Err(CodecError::InvalidBase58(_))
        ));
    }

    #[test]
    fn test_reverse_bytes() {
        assert_eq!(reverse_bytes(&[1, 2, 3]), vec![3, 2, 1]);
        let txid = [0xaa; 32];
        assert_eq!(reverse_bytes(&reverse_bytes(&txid)), txid.to_vec());
    }
}
