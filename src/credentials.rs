//! Keychain entries belonging to a VPN service
//!
//! Two entries exist per service:
//! - the login password, keyed by the service id
//! - the IPSec shared secret, keyed by the derived [`SecretId`]
//!
//! An entry is never edited in place: it is deleted and created again with
//! the merged attributes.

use tracing::debug;

use crate::error::{ProvisionResult, ResultExt};
use crate::keychain::{Access, ItemAttributes, Keychain, TrustedApplications};
use crate::model::{SecretId, ServiceConfigRequest, ServiceId};

pub const VPN_PASSWORD_DESCRIPTION: &str = "VPN Password";
pub const SHARED_SECRET_DESCRIPTION: &str = "IPSec Shared Secret";

/// One entry to write; `None` fields keep the value already stored
#[derive(Clone, Copy)]
pub struct CredentialUpdate<'a> {
    pub key: &'a str,
    pub description: &'a str,
    pub label: Option<&'a str>,
    pub account: Option<&'a str>,
    pub secret: Option<&'a str>,
}

impl CredentialUpdate<'_> {
    fn is_empty(&self) -> bool {
        self.label.is_none() && self.account.is_none() && self.secret.is_none()
    }
}

/// Replace the entry stored under `update.key`.
///
/// Returns false, without touching the keychain, when the update carries no
/// value at all.
pub fn upsert_credential<K: Keychain + ?Sized>(
    keychain: &mut K,
    access: &Access,
    update: &CredentialUpdate<'_>,
) -> ProvisionResult<bool> {
    if update.is_empty() {
        debug!("Nothing to store for keychain entry {}", update.key);
        return Ok(false);
    }

    let existing = keychain
        .find_generic_password(update.key)
        .context("Failed to get existing keychain entry")?;

    let (label, account, secret) = match &existing {
        Some(item) => (
            update.label.or(item.attributes.label.as_deref()),
            update.account.or(item.attributes.account.as_deref()),
            update.secret.unwrap_or(item.secret.as_str()),
        ),
        None => (update.label, update.account, update.secret.unwrap_or("")),
    };

    let attributes = ItemAttributes {
        service: update.key.to_string(),
        description: update.description.to_string(),
        label: label.map(str::to_string),
        account: account.map(str::to_string),
    };
    let secret = secret.to_string();

    let removed = delete_credential(keychain, update.key)?;
    keychain
        .create_generic_password(&attributes, &secret, access)
        .context("Failed to create new keychain entry")?;

    debug!("Stored keychain entry {} (replaced {})", update.key, removed);
    Ok(true)
}

/// Delete every entry stored under `key`; returns how many were removed
pub fn delete_credential<K: Keychain + ?Sized>(keychain: &mut K, key: &str) -> ProvisionResult<usize> {
    let mut removed = 0;
    while let Some(item) = keychain
        .find_generic_password(key)
        .context("Failed to get existing keychain entry")?
    {
        keychain
            .delete_item(&item.item)
            .context("Failed to delete existing keychain entry")?;
        removed += 1;
    }
    Ok(removed)
}

/// Write the login password and shared secret entries for a service
pub fn sync_credentials<K: Keychain + ?Sized>(
    keychain: &mut K,
    access_label: &str,
    trusted: &TrustedApplications,
    request: &ServiceConfigRequest,
    service_id: &ServiceId,
    secret_id: &SecretId,
) -> ProvisionResult<()> {
    let access = keychain
        .create_access(access_label, trusted)
        .context("Failed to obtain keychain access")?;

    let login = CredentialUpdate {
        key: service_id.as_str(),
        description: VPN_PASSWORD_DESCRIPTION,
        label: request.service_name.as_deref(),
        account: request.username.as_deref(),
        secret: request.password.as_deref(),
    };
    upsert_credential(keychain, &access, &login)?;

    let shared_secret = CredentialUpdate {
        key: secret_id.as_str(),
        description: SHARED_SECRET_DESCRIPTION,
        label: request.service_name.as_deref(),
        account: None,
        secret: request.shared_secret.as_deref(),
    };
    upsert_credential(keychain, &access, &shared_secret)?;

    Ok(())
}

/// Delete both entries of a service
pub fn remove_credentials<K: Keychain + ?Sized>(
    keychain: &mut K,
    service_id: &ServiceId,
    secret_id: &SecretId,
) -> ProvisionResult<()> {
    let login = delete_credential(keychain, service_id.as_str())?;
    let shared_secret = delete_credential(keychain, secret_id.as_str())?;
    debug!(
        "Removed {} login and {} shared secret entries for {}",
        login, shared_secret, service_id
    );
    Ok(())
}
