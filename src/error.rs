//! Error types for l2tpctl

use thiserror::Error;

use crate::keychain::KeychainError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Not running with the privilege the operation needs
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// Missing or conflicting request fields
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Configuration store failure (lock, lookup, write, commit, apply)
    #[error("{context}: {source}")]
    Store {
        context: String,
        #[source]
        source: StoreError,
    },
    /// Keychain failure
    #[error("{context}: {source}")]
    Credential {
        context: String,
        #[source]
        source: KeychainError,
    },
    /// Service exists but is not something this tool manages
    #[error("Not supported: {0}")]
    NotSupported(String),
    /// Tool configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProvisionError {
    /// Platform status code behind the failure, when there is one
    pub fn status_code(&self) -> Option<i32> {
        match self {
            ProvisionError::Store { source, .. } => Some(source.status.code()),
            ProvisionError::Credential { source, .. } => Some(source.status.code()),
            _ => None,
        }
    }
}

pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Attach the failed step to a store or keychain error
pub trait ResultExt<T> {
    fn context(self, context: &str) -> ProvisionResult<T>;
}

impl<T> ResultExt<T> for Result<T, StoreError> {
    fn context(self, context: &str) -> ProvisionResult<T> {
        self.map_err(|source| ProvisionError::Store {
            context: context.to_string(),
            source,
        })
    }
}

impl<T> ResultExt<T> for Result<T, KeychainError> {
    fn context(self, context: &str) -> ProvisionResult<T> {
        self.map_err(|source| ProvisionError::Credential {
            context: context.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keychain::KeychainStatus;
    use crate::store::StoreStatus;

    #[test]
    fn test_store_error_names_step_and_code() {
        let result: Result<(), StoreError> = Err(StoreError::new(StoreStatus::Locked));
        let err = result.context("Failed to obtain preferences lock").unwrap_err();

        assert_eq!(err.status_code(), Some(1006));
        let message = err.to_string();
        assert!(message.starts_with("Failed to obtain preferences lock: "));
        assert!(message.ends_with("(1006)"));
    }

    #[test]
    fn test_credential_error_names_step_and_code() {
        let result: Result<(), KeychainError> = Err(KeychainError::new(KeychainStatus::Io));
        let err = result.context("Failed to create new keychain entry").unwrap_err();

        assert_eq!(err.status_code(), Some(-36));
        assert!(err.to_string().contains("Failed to create new keychain entry"));
    }

    #[test]
    fn test_plain_errors_have_no_status() {
        assert_eq!(ProvisionError::InvalidParameter("x".into()).status_code(), None);
        assert_eq!(ProvisionError::NotSupported("x".into()).status_code(), None);
    }

    #[test]
    fn test_permission_denied_message() {
        let err = ProvisionError::PermissionDenied("This program must be run as root!".into());
        assert_eq!(err.to_string(), "Permission denied: This program must be run as root!");
        assert_eq!(err.status_code(), None);
    }
}
