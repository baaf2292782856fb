//! Provisioning request and identity types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Suffix appended to a service id to name its shared secret keychain entry
pub const SHARED_SECRET_SUFFIX: &str = ".SS";

/// Store-assigned identifier of a network service
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceId(String);

impl ServiceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keychain service name of the IPSec shared secret belonging to a service
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretId(String);

impl SecretId {
    /// Derive the shared secret id from the service id.
    ///
    /// The result only depends on `service_id`, so the keychain entry can be
    /// found again after a restart without storing the link anywhere.
    pub fn derive(service_id: &ServiceId) -> Self {
        Self(format!("{}{}", service_id.as_str(), SHARED_SECRET_SUFFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operation requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Edit,
    Delete,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Create => "create",
            Mode::Edit => "edit",
            Mode::Delete => "delete",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings to apply to an L2TP VPN service.
///
/// `None` means "leave untouched"; `Some("")` is an explicit empty value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ServiceConfigRequest {
    /// Display name of the VPN connection
    pub service_name: Option<String>,
    /// Address of the VPN server
    pub server_address: Option<String>,
    /// Login username
    pub username: Option<String>,
    /// Login password
    pub password: Option<String>,
    /// IPSec shared secret
    pub shared_secret: Option<String>,
    /// Route all traffic through the VPN
    pub send_all_traffic: Option<bool>,
}

impl ServiceConfigRequest {
    /// Request for a brand new service; all traffic goes through the VPN
    pub fn for_create(
        service_name: impl Into<String>,
        server_address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        shared_secret: impl Into<String>,
    ) -> Self {
        Self {
            service_name: Some(service_name.into()),
            server_address: Some(server_address.into()),
            username: Some(username.into()),
            password: Some(password.into()),
            shared_secret: Some(shared_secret.into()),
            send_all_traffic: Some(true),
        }
    }

    /// True when no field is present
    pub fn is_empty(&self) -> bool {
        self.service_name.is_none()
            && self.server_address.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.shared_secret.is_none()
            && self.send_all_traffic.is_none()
    }
}

// Secrets stay out of logs and panic messages
impl fmt::Debug for ServiceConfigRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(value: &Option<String>) -> Option<&'static str> {
            value.as_ref().map(|_| "<redacted>")
        }

        f.debug_struct("ServiceConfigRequest")
            .field("service_name", &self.service_name)
            .field("server_address", &self.server_address)
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("shared_secret", &redact(&self.shared_secret))
            .field("send_all_traffic", &self.send_all_traffic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_id_is_stable() {
        let id = ServiceId::new("6A3E1F2C-9B1D-4C8E-A1B2-0123456789AB");
        assert_eq!(SecretId::derive(&id), SecretId::derive(&id));
        assert_eq!(
            SecretId::derive(&id).as_str(),
            "6A3E1F2C-9B1D-4C8E-A1B2-0123456789AB.SS"
        );
    }

    #[test]
    fn test_secret_id_distinct_for_distinct_services() {
        let a = ServiceId::new("A");
        let b = ServiceId::new("B");
        assert_ne!(SecretId::derive(&a), SecretId::derive(&b));
    }

    #[test]
    fn test_create_request_defaults_to_send_all_traffic() {
        let request = ServiceConfigRequest::for_create("Office VPN", "vpn.example.com", "alice", "secret123", "sharedkey");
        assert_eq!(request.send_all_traffic, Some(true));
        assert!(!request.is_empty());
    }

    #[test]
    fn test_empty_value_is_not_absent() {
        let request = ServiceConfigRequest {
            password: Some(String::new()),
            ..Default::default()
        };
        assert!(!request.is_empty());
        assert!(ServiceConfigRequest::default().is_empty());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let request = ServiceConfigRequest::for_create("Office VPN", "vpn.example.com", "alice", "secret123", "sharedkey");
        let debug = format!("{:?}", request);
        assert!(!debug.contains("secret123"));
        assert!(!debug.contains("sharedkey"));
        assert!(debug.contains("alice"));
    }
}
