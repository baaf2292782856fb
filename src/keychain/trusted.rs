//! Applications allowed to read the credentials this tool writes
//!
//! The list is process-wide and immutable once built. Call
//! [`init_trusted_applications`] at startup; [`trusted_applications`] falls
//! back to the built-in defaults if nothing was initialised.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::{KeychainError, KeychainResult, KeychainStatus};

/// System helpers that connect L2TP/IPSec VPNs and need the stored secrets
pub const DEFAULT_TRUSTED_APPLICATIONS: [&str; 7] = [
    "/System/Library/Frameworks/SystemConfiguration.framework/Versions/A/Helpers/SCHelper",
    "/System/Library/PreferencePanes/Network.prefPane/Contents/XPCServices/com.apple.preference.network.remoteservice.xpc",
    "/usr/sbin/pppd",
    "/usr/sbin/racoon",
    "/usr/libexec/nehelper",
    "/usr/libexec/nesessionmanager",
    "/usr/libexec/neagent",
];

static TRUSTED_APPLICATIONS: OnceLock<TrustedApplications> = OnceLock::new();

/// A resolved trusted application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedApplication {
    path: PathBuf,
}

impl TrustedApplication {
    /// Resolve an application from its absolute path. Symlinks are followed
    /// when the path exists; a missing path is kept as given.
    pub fn from_path(path: impl AsRef<Path>) -> KeychainResult<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(KeychainError::new(KeychainStatus::Param));
        }
        Ok(Self::resolve(path))
    }

    fn resolve(path: &Path) -> Self {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Ordered list of trusted applications
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedApplications {
    applications: Vec<TrustedApplication>,
}

impl TrustedApplications {
    pub fn from_paths<I, P>(paths: I) -> KeychainResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let applications = paths
            .into_iter()
            .map(TrustedApplication::from_path)
            .collect::<KeychainResult<Vec<_>>>()?;
        Ok(Self { applications })
    }

    pub fn defaults() -> Self {
        Self {
            applications: DEFAULT_TRUSTED_APPLICATIONS
                .iter()
                .map(|path| TrustedApplication::resolve(Path::new(path)))
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrustedApplication> {
        self.applications.iter()
    }

    pub fn len(&self) -> usize {
        self.applications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.applications.iter().map(|app| app.path.clone()).collect()
    }
}

/// Build the process-wide list from `paths`.
///
/// Only the first initialisation takes effect; later calls get the list that
/// is already in place.
pub fn init_trusted_applications<I, P>(paths: I) -> KeychainResult<&'static TrustedApplications>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let applications = TrustedApplications::from_paths(paths)?;
    let mut initialised = false;
    let list = TRUSTED_APPLICATIONS.get_or_init(|| {
        initialised = true;
        applications.clone()
    });

    if initialised {
        debug!("Initialised {} trusted applications", list.len());
    } else if *list != applications {
        warn!("Trusted application list already initialised, keeping the existing one");
    }
    Ok(list)
}

/// The process-wide list
pub fn trusted_applications() -> &'static TrustedApplications {
    TRUSTED_APPLICATIONS.get_or_init(TrustedApplications::defaults)
}
