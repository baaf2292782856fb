//! Secure credential store
//!
//! Generic password items keyed by a service name. Every item carries an
//! access policy naming the applications allowed to read its secret.

pub mod file;
pub mod trusted;

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub use file::FileKeychain;
pub use trusted::{init_trusted_applications, trusted_applications, TrustedApplication, TrustedApplications};

/// Status codes reported by the keychain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeychainStatus {
    ItemNotFound,
    DuplicateItem,
    AuthFailed,
    NoSuchKeychain,
    Decode,
    WritePermissions,
    Param,
    Io,
}

impl KeychainStatus {
    pub fn code(&self) -> i32 {
        match self {
            KeychainStatus::ItemNotFound => -25300,
            KeychainStatus::DuplicateItem => -25299,
            KeychainStatus::AuthFailed => -25293,
            KeychainStatus::NoSuchKeychain => -25294,
            KeychainStatus::Decode => -26275,
            KeychainStatus::WritePermissions => -61,
            KeychainStatus::Param => -50,
            KeychainStatus::Io => -36,
        }
    }
}

/// Error returned by a [`Keychain`] operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .status.code())]
pub struct KeychainError {
    pub status: KeychainStatus,
}

impl KeychainError {
    pub fn new(status: KeychainStatus) -> Self {
        Self { status }
    }
}

pub type KeychainResult<T> = Result<T, KeychainError>;

/// Opaque reference to a stored item
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemRef(String);

impl ItemRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Searchable attributes of a generic password item.
///
/// `label` and `account` are only written when present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemAttributes {
    pub service: String,
    pub description: String,
    pub label: Option<String>,
    pub account: Option<String>,
}

/// A stored item and its secret
#[derive(Clone, PartialEq, Eq)]
pub struct KeychainItem {
    pub item: ItemRef,
    pub attributes: ItemAttributes,
    pub secret: String,
}

impl fmt::Debug for KeychainItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeychainItem")
            .field("item", &self.item)
            .field("attributes", &self.attributes)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Access policy attached to new items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub label: String,
    pub trusted_applications: Vec<PathBuf>,
}

#[cfg_attr(test, mockall::automock)]
pub trait Keychain {
    /// Build an access policy allowing `trusted` to read the items it protects
    fn create_access(&self, label: &str, trusted: &TrustedApplications) -> KeychainResult<Access>;

    /// First item whose service attribute is `service`
    fn find_generic_password(&self, service: &str) -> KeychainResult<Option<KeychainItem>>;

    fn delete_item(&mut self, item: &ItemRef) -> KeychainResult<()>;

    fn create_generic_password(
        &mut self,
        attributes: &ItemAttributes,
        secret: &str,
        access: &Access,
    ) -> KeychainResult<ItemRef>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_displays_status_code() {
        assert_eq!(KeychainError::new(KeychainStatus::ItemNotFound).to_string(), "-25300");
        assert_eq!(KeychainError::new(KeychainStatus::Param).to_string(), "-50");
    }

    #[test]
    fn test_item_debug_hides_secret() {
        let item = KeychainItem {
            item: ItemRef::new("1"),
            attributes: ItemAttributes {
                service: "ABC".into(),
                description: "VPN Password".into(),
                label: None,
                account: Some("alice".into()),
            },
            secret: "secret123".into(),
        };
        let debug = format!("{:?}", item);
        assert!(!debug.contains("secret123"));
        assert!(debug.contains("alice"));
    }
}
