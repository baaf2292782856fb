//! VPN provisioning transactions
//!
//! Every operation runs under the exclusive store lock:
//!
//! ```text
//! lock ─► resolve ─► PPP ─► IPSec ─► activate (new only) ─► IPv4
//!      ─► credentials ─► commit ─► apply ─► unlock
//!
//! lock ─► find ─► remove service ─► commit ─► apply ─► credentials ─► unlock
//! ```
//!
//! The first failing step ends the transaction. The lock is released on every
//! path, and nothing staged before the failure is committed.

use std::fmt;
use tracing::{debug, error, info, warn};

use crate::credentials::{remove_credentials, sync_credentials};
use crate::error::{ProvisionResult, ResultExt};
use crate::keychain::{Keychain, TrustedApplications};
use crate::model::{Mode, SecretId, ServiceConfigRequest, ServiceId};
use crate::resolver::{activate_service, find_service, remove_service, resolve_service};
use crate::stages::{apply_ipsec, apply_ipv4, apply_ppp};
use crate::store::{Preferences, PreferencesLock};

/// Access-control label used when none is configured
pub const DEFAULT_ACCESS_LABEL: &str = "VPNHelper";

/// Steps of a provisioning transaction, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStage {
    Started,
    Locked,
    ServiceResolved,
    PppApplied,
    SecretIdDerived,
    IpsecApplied,
    ActivatedInSet,
    Ipv4Applied,
    CredentialsSynced,
    ServiceRemoved,
    CredentialsRemoved,
    Committed,
    Applied,
}

impl fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionStage::Started => "started",
            TransactionStage::Locked => "locked",
            TransactionStage::ServiceResolved => "service resolved",
            TransactionStage::PppApplied => "PPP applied",
            TransactionStage::SecretIdDerived => "secret id derived",
            TransactionStage::IpsecApplied => "IPSec applied",
            TransactionStage::ActivatedInSet => "activated in set",
            TransactionStage::Ipv4Applied => "IPv4 applied",
            TransactionStage::CredentialsSynced => "credentials synced",
            TransactionStage::ServiceRemoved => "service removed",
            TransactionStage::CredentialsRemoved => "credentials removed",
            TransactionStage::Committed => "committed",
            TransactionStage::Applied => "applied",
        };
        f.write_str(name)
    }
}

/// Last stage a transaction reached
struct Progress {
    mode: Mode,
    service: Option<ServiceId>,
    stage: TransactionStage,
}

impl Progress {
    fn new(mode: Mode, service: Option<&ServiceId>) -> Self {
        Self {
            mode,
            service: service.cloned(),
            stage: TransactionStage::Started,
        }
    }

    fn advance(&mut self, stage: TransactionStage) {
        self.stage = stage;
        match &self.service {
            Some(id) => debug!(service = %id, "{}: {}", self.mode, stage),
            None => debug!("{}: {}", self.mode, stage),
        }
    }

    fn resolved(&mut self, id: &ServiceId) {
        self.service = Some(id.clone());
        self.advance(TransactionStage::ServiceResolved);
    }
}

/// Drives create, edit and delete against a configuration store and a keychain
pub struct Provisioner<'t, P: Preferences, K: Keychain> {
    preferences: P,
    keychain: K,
    trusted: &'t TrustedApplications,
    access_label: String,
    wait_for_lock: bool,
}

impl<'t, P: Preferences, K: Keychain> Provisioner<'t, P, K> {
    pub fn new(preferences: P, keychain: K, trusted: &'t TrustedApplications) -> Self {
        Self {
            preferences,
            keychain,
            trusted,
            access_label: DEFAULT_ACCESS_LABEL.to_string(),
            wait_for_lock: true,
        }
    }

    /// Label of the access policy attached to new keychain entries
    pub fn with_access_label(mut self, label: impl Into<String>) -> Self {
        self.access_label = label.into();
        self
    }

    /// Fail with `Locked` instead of waiting when another client holds the lock
    pub fn with_wait_for_lock(mut self, wait: bool) -> Self {
        self.wait_for_lock = wait;
        self
    }

    pub fn preferences(&self) -> &P {
        &self.preferences
    }

    pub fn keychain(&self) -> &K {
        &self.keychain
    }

    pub fn into_parts(self) -> (P, K) {
        (self.preferences, self.keychain)
    }

    /// Create a new VPN service and return the id the store assigned to it
    pub fn create(&mut self, request: &ServiceConfigRequest) -> ProvisionResult<ServiceId> {
        let id = self.provision(Mode::Create, None, request)?;
        info!("Created VPN service {}", id);
        Ok(id)
    }

    /// Apply the fields present in `request` to an existing service
    pub fn edit(&mut self, service_id: &ServiceId, request: &ServiceConfigRequest) -> ProvisionResult<()> {
        self.provision(Mode::Edit, Some(service_id), request)?;
        info!("Updated VPN service {}", service_id);
        Ok(())
    }

    /// Remove a service, its set membership and both keychain entries.
    ///
    /// The keychain entries go only after the removal is committed, so a
    /// service left in the store always keeps its credentials.
    pub fn delete(&mut self, service_id: &ServiceId) -> ProvisionResult<()> {
        self.locked(Mode::Delete, Some(service_id), |prefs, keychain, progress| {
            find_service(prefs, service_id)?;
            progress.advance(TransactionStage::ServiceResolved);

            remove_service(prefs, service_id)?;
            progress.advance(TransactionStage::ServiceRemoved);

            commit_and_apply(prefs, progress)?;

            remove_credentials(keychain, service_id, &SecretId::derive(service_id))?;
            progress.advance(TransactionStage::CredentialsRemoved);
            Ok(())
        })?;
        info!("Deleted VPN service {}", service_id);
        Ok(())
    }

    fn provision(
        &mut self,
        mode: Mode,
        service_id: Option<&ServiceId>,
        request: &ServiceConfigRequest,
    ) -> ProvisionResult<ServiceId> {
        let trusted = self.trusted;
        let access_label = self.access_label.clone();

        self.locked(mode, service_id, |prefs, keychain, progress| {
            let resolved = resolve_service(prefs, service_id, request.service_name.as_deref())?;
            let id = resolved.id().clone();
            progress.resolved(&id);

            apply_ppp(prefs, &resolved.service, request)?;
            progress.advance(TransactionStage::PppApplied);

            let secret_id = SecretId::derive(&id);
            progress.advance(TransactionStage::SecretIdDerived);

            apply_ipsec(prefs, &resolved.service, &secret_id)?;
            progress.advance(TransactionStage::IpsecApplied);

            if resolved.created {
                activate_service(prefs, &id)?;
                progress.advance(TransactionStage::ActivatedInSet);
            }

            apply_ipv4(prefs, &id, request)?;
            progress.advance(TransactionStage::Ipv4Applied);

            sync_credentials(keychain, &access_label, trusted, request, &id, &secret_id)?;
            progress.advance(TransactionStage::CredentialsSynced);

            commit_and_apply(prefs, progress)?;
            Ok(id)
        })
    }

    /// Run `body` while holding the store lock, then release it.
    ///
    /// A failed unlock fails the transaction even when `body` succeeded.
    fn locked<T, F>(&mut self, mode: Mode, service_id: Option<&ServiceId>, body: F) -> ProvisionResult<T>
    where
        F: FnOnce(&mut P, &mut K, &mut Progress) -> ProvisionResult<T>,
    {
        let mut progress = Progress::new(mode, service_id);

        let mut guard = PreferencesLock::acquire(&mut self.preferences, self.wait_for_lock)
            .context("Failed to obtain preferences lock")?;
        progress.advance(TransactionStage::Locked);

        let result = body(&mut *guard, &mut self.keychain, &mut progress);
        if result.is_err() {
            warn!("{} aborted after stage: {}", mode, progress.stage);
        }

        let unlocked = guard.unlock().context("Failed to release preferences lock");
        match (result, unlocked) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Err(unlock_err)) => {
                error!("{}", unlock_err);
                Err(e)
            }
        }
    }
}

fn commit_and_apply<P: Preferences + ?Sized>(prefs: &mut P, progress: &mut Progress) -> ProvisionResult<()> {
    prefs.commit_changes().context("Failed to commit changes")?;
    progress.advance(TransactionStage::Committed);

    prefs.apply_changes().context("Failed to apply changes")?;
    progress.advance(TransactionStage::Applied);
    Ok(())
}
