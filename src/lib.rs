//! l2tpctl - L2TP/IPSec VPN provisioning library
//!
//! Creates, edits and deletes an L2TP over IPSec VPN service in the system
//! network configuration store, together with its two keychain entries:
//! - VPN login password, keyed by the service id
//! - IPSec shared secret, keyed by `<service id>.SS`
//!
//! All changes to the configuration store happen inside a single locked
//! transaction that is either committed and applied as a whole or not at all.

pub mod error;
pub mod model;
pub mod validation;
pub mod config;
pub mod store;
pub mod keychain;
pub mod credentials;
pub mod stages;
pub mod resolver;
pub mod provisioner;

// Re-export commonly used types
pub use error::{ProvisionError, ProvisionResult};
pub use model::{Mode, SecretId, ServiceConfigRequest, ServiceId};
pub use validation::{validate_request, RawRequest, ValidatedRequest};
pub use config::ProvisionerConfig;
pub use store::{FilePreferences, Preferences, PreferencesLock, StoreError, StoreStatus};
pub use keychain::{
    init_trusted_applications, trusted_applications, FileKeychain, Keychain, KeychainError, KeychainStatus,
    TrustedApplications,
};
pub use provisioner::{Provisioner, TransactionStage};
