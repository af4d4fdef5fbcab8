//! Script Building
//!
//! The two output scripts the bridge emits (P2PKH credit output, OP_RETURN
//! burn output) and the minimal push encoding used for scriptSigs.

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_RETURN: u8 = 0x6a;
const OP_PUSHDATA1: u8 = 0x4c;

/// Standard P2PKH locking script:
/// `OP_DUP OP_HASH160 <20 bytes> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(20);
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// The burn script on the asset-lock wire output: OP_RETURN with an empty
/// push. Nothing can ever spend it on layer 1.
pub fn op_return_burn_script() -> Vec<u8> {
    vec![OP_RETURN, 0x00]
}

/// Append a minimal push of `data` (direct push below 0x4c, OP_PUSHDATA1
/// above; scriptSig elements here are at most 73 bytes)
pub fn push_slice(script: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len < OP_PUSHDATA1 as usize {
        script.push(len as u8);
    } else {
        script.push(OP_PUSHDATA1);
        script.push(len as u8);
    }
    script.extend_from_slice(data);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p2pkh_layout() {
        let hash = [0x11u8; 20];
        let script = p2pkh_script(&hash);
        assert_eq!(script.len(), 25);
        assert_eq!(script[0], 0x76);
        assert_eq!(script[1], 0xa9);
        assert_eq!(script[2], 0x14);
        assert_eq!(&script[3..23], &hash);
        assert_eq!(script[23], 0x88);
        assert_eq!(script[24], 0xac);
    }

    #[test]
    fn test_burn_script() {
        assert_eq!(op_return_burn_script(), vec![0x6a, 0x00]);
    }

    #[test]
    fn test_push_slice() {
        let mut script = Vec::new();
        push_slice(&mut script, &[0xab; 33]);
        assert_eq!(script[0], 33);
        assert_eq!(script.len(), 34);

        let mut long = Vec::new();
        push_slice(&mut long, &[0xcd; 0x60]);
        assert_eq!(long[0], 0x4c);
        assert_eq!(long[1], 0x60);
        assert_eq!(long.len(), 2 + 0x60);
    }
}
