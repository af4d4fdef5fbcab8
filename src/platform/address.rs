//! Platform Address and Identity-Id Validation
//!
//! Both checks run before any keys are derived or deposits polled, so a
//! mistyped destination fails the session immediately instead of after
//! funds are locked.

use bech32::primitives::decode::CheckedHrpstring;
use bech32::Bech32m;

use crate::error::ValidationError;

/// Validate a bech32m platform address against the network's HRP
pub fn validate_platform_address(
    address: &str,
    expected_hrp: &str,
) -> Result<(), ValidationError> {
    let checked = CheckedHrpstring::new::<Bech32m>(address)
        .map_err(|e| ValidationError::InvalidPlatformAddress(e.to_string()))?;

    let hrp = checked.hrp();
    if hrp.as_str() != expected_hrp {
        return Err(ValidationError::InvalidPlatformAddress(format!(
            "expected HRP '{}', got '{}'",
            expected_hrp,
            hrp.as_str()
        )));
    }

    Ok(())
}

/// Identity ids are base58 strings of 43-44 characters decoding to 32 bytes
pub fn validate_identity_id(id: &str) -> Result<(), ValidationError> {
    if !(43..=44).contains(&id.len()) {
        return Err(ValidationError::InvalidIdentityId(format!(
            "expected 43-44 characters, got {}",
            id.len()
        )));
    }

    let decoded = bs58::decode(id)
        .into_vec()
        .map_err(|e| ValidationError::InvalidIdentityId(e.to_string()))?;
    if decoded.len() != 32 {
        return Err(ValidationError::InvalidIdentityId(format!(
            "decodes to {} bytes, expected 32",
            decoded.len()
        )));
    }

    Ok(())
}
