//! DPNS Naming
//!
//! Label normalization, the contested-name rule and the thin registration
//! flow over the platform driver. Registration is signed with an
//! AUTHENTICATION key at CRITICAL or HIGH level; the caller matches the
//! key first via `find_matching_key`.

use crate::error::BridgeResult;
use crate::keys::{validate_for_name_registration, MatchedKey};
use crate::platform::driver::{Identity, PlatformDriver, PlatformError, PlatformSigner};

/// Normalize a label the way DPNS does for uniqueness: lowercase, then
/// homograph folding of o to 0 and i/l to 1
pub fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'o' => '0',
            'i' | 'l' => '1',
            other => other,
        })
        .collect()
}

/// Whether a label falls in the contested namespace: 3-19 characters that
/// are all in [a-z, 0, 1, -] after normalization. Contested names go
/// through masternode voting instead of first-come registration.
pub fn is_contested(label: &str) -> bool {
    let normalized = normalize_label(label);
    (3..=19).contains(&normalized.len())
        && normalized
            .chars()
            .all(|c| c.is_ascii_lowercase() || c == '0' || c == '1' || c == '-')
}

/// Basic label shape: 3-63 alphanumeric-or-hyphen characters, no leading
/// or trailing hyphen
pub fn is_valid_label(label: &str) -> bool {
    (3..=63).contains(&label.len())
        && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !label.starts_with('-')
        && !label.ends_with('-')
}

/// Register `label` for `identity`.
///
/// Validates the label, the signing key's purpose and security level, and
/// availability, then submits the registration. The preorder callback
/// fires just before submission so presenters can show the two-step flow.
pub async fn register_name<D: PlatformDriver + ?Sized>(
    driver: &D,
    label: &str,
    identity: &Identity,
    matched: &MatchedKey,
    signer: &PlatformSigner,
    mut on_preorder: impl FnMut(&str),
) -> BridgeResult<()> {
    if !is_valid_label(label) {
        return Err(PlatformError::Sdk(format!("invalid label: {:?}", label)).into());
    }
    validate_for_name_registration(matched)?;

    if !driver.dpns_is_name_available(label).await? {
        return Err(PlatformError::NameTaken(label.to_string()).into());
    }

    on_preorder(label);
    driver
        .dpns_register_name(label, identity, matched.key_id, signer)
        .await?;
    Ok(())
}
