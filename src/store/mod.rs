//! Persisted network configuration store
//!
//! The store holds network services, each made of a display name, a nested
//! interface stack with named configuration blocks, and a set of protocol
//! configurations. The "current set" lists the services that are in effect.
//!
//! ```text
//! ┌────────────────────────────┐
//! │   NetworkService (id)      │
//! │   ├─ name                  │
//! │   ├─ interface: PPP        │──► configuration  (PPP options)
//! │   │   └─ L2TP              │──► extended["IPSec"]
//! │   │       └─ IPv4          │
//! │   └─ protocols             │──► IPv4 / IPv6 / DNS / Proxies
//! └────────────────────────────┘
//! ```
//!
//! Access goes through the [`Preferences`] trait. [`FilePreferences`] is the
//! on-disk implementation; writes are staged until `commit_changes` and only
//! reach the running system on `apply_changes`.

pub mod file;
pub mod keys;
pub mod lock;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::model::ServiceId;

pub use file::FilePreferences;
pub use lock::PreferencesLock;

/// Named configuration values of an interface, extended block or protocol
pub type ConfigDict = BTreeMap<String, Value>;

/// Status codes reported by the configuration store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    Failed,
    InvalidArgument,
    AccessError,
    NoKey,
    KeyExists,
    Locked,
    NeedLock,
    NoConfigFile,
    Stale,
}

impl StoreStatus {
    pub fn code(&self) -> i32 {
        match self {
            StoreStatus::Failed => 1001,
            StoreStatus::InvalidArgument => 1002,
            StoreStatus::AccessError => 1003,
            StoreStatus::NoKey => 1004,
            StoreStatus::KeyExists => 1005,
            StoreStatus::Locked => 1006,
            StoreStatus::NeedLock => 1007,
            StoreStatus::NoConfigFile => 3003,
            StoreStatus::Stale => 3005,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StoreStatus::Failed => "Failed!",
            StoreStatus::InvalidArgument => "Invalid argument",
            StoreStatus::AccessError => "Permission denied",
            StoreStatus::NoKey => "No such key",
            StoreStatus::KeyExists => "Key already defined",
            StoreStatus::Locked => "Lock already held",
            StoreStatus::NeedLock => "Lock required for this operation",
            StoreStatus::NoConfigFile => "Configuration file not found",
            StoreStatus::Stale => "Write attempted on stale version of object",
        }
    }
}

/// Error returned by a [`Preferences`] operation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct StoreError {
    pub status: StoreStatus,
    pub detail: Option<String>,
}

impl StoreError {
    pub fn new(status: StoreStatus) -> Self {
        Self { status, detail: None }
    }

    pub fn with_detail(status: StoreStatus, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: Some(detail.into()),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {} ({})", self.status.description(), detail, self.status.code()),
            None => write!(f, "{} ({})", self.status.description(), self.status.code()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Interface layer types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterfaceType {
    #[serde(rename = "IPv4")]
    Ipv4,
    #[serde(rename = "L2TP")]
    L2tp,
    #[serde(rename = "PPP")]
    Ppp,
}

impl InterfaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterfaceType::Ipv4 => "IPv4",
            InterfaceType::L2tp => "L2TP",
            InterfaceType::Ppp => "PPP",
        }
    }
}

/// An interface, optionally layered on top of another one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    pub interface_type: InterfaceType,
    pub underlying: Option<Box<NetworkInterface>>,
}

impl NetworkInterface {
    pub fn new(interface_type: InterfaceType) -> Self {
        Self {
            interface_type,
            underlying: None,
        }
    }

    pub fn layered_on(interface_type: InterfaceType, underlying: NetworkInterface) -> Self {
        Self {
            interface_type,
            underlying: Some(Box::new(underlying)),
        }
    }

    /// PPP over L2TP over IPv4
    pub fn l2tp_vpn() -> Self {
        let l2tp = Self::layered_on(InterfaceType::L2tp, Self::new(InterfaceType::Ipv4));
        Self::layered_on(InterfaceType::Ppp, l2tp)
    }

    /// Layer types from the top of the stack down
    pub fn stack(&self) -> Vec<InterfaceType> {
        let mut stack = vec![self.interface_type];
        let mut current = self.underlying.as_deref();
        while let Some(interface) = current {
            stack.push(interface.interface_type);
            current = interface.underlying.as_deref();
        }
        stack
    }

    /// Rebuild an interface from a top-down layer list
    pub fn from_stack(stack: &[InterfaceType]) -> Option<Self> {
        let mut layers = stack.iter().rev();
        let mut interface = Self::new(*layers.next()?);
        for layer in layers {
            interface = Self::layered_on(*layer, interface);
        }
        Some(interface)
    }

    pub fn is_l2tp_vpn(&self) -> bool {
        let stack = self.stack();
        stack.len() >= 2 && stack[0] == InterfaceType::Ppp && stack[1] == InterfaceType::L2tp
    }
}

/// A service as read from the store
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkService {
    pub id: ServiceId,
    pub name: Option<String>,
    pub interface: NetworkInterface,
    /// Configuration of the top interface
    pub configuration: ConfigDict,
    /// Extended configuration blocks of the top interface, by type
    pub extended_configurations: BTreeMap<String, ConfigDict>,
}

/// Protocols a service can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolType {
    Ipv4,
    Ipv6,
    Dns,
    Proxies,
}

impl ProtocolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolType::Ipv4 => "IPv4",
            ProtocolType::Ipv6 => "IPv6",
            ProtocolType::Dns => "DNS",
            ProtocolType::Proxies => "Proxies",
        }
    }
}

/// A protocol attached to a service
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkProtocol {
    pub protocol_type: ProtocolType,
    pub enabled: bool,
    pub configuration: ConfigDict,
}

/// Identifier of a service set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SetId(String);

impl SetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A set of services; the current set holds the active ones
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSet {
    pub id: SetId,
    pub name: String,
    pub services: Vec<ServiceId>,
}

impl NetworkSet {
    pub fn contains(&self, service_id: &ServiceId) -> bool {
        self.services.iter().any(|id| id == service_id)
    }
}

/// Lockable, transactional network configuration store
#[cfg_attr(test, mockall::automock)]
pub trait Preferences {
    /// Take the exclusive lock. With `wait == false` a held lock fails with `Locked`.
    fn lock(&mut self, wait: bool) -> StoreResult<()>;

    /// Release the exclusive lock
    fn unlock(&mut self) -> StoreResult<()>;

    /// Persist staged changes
    fn commit_changes(&mut self) -> StoreResult<()>;

    /// Make the committed configuration take effect
    fn apply_changes(&mut self) -> StoreResult<()>;

    /// Look a service up by id
    fn copy_service(&self, service_id: &ServiceId) -> StoreResult<Option<NetworkService>>;

    /// Create a service around `interface`; the store assigns the id
    fn create_service(&mut self, interface: &NetworkInterface) -> StoreResult<NetworkService>;

    fn set_service_name(&mut self, service_id: &ServiceId, name: &str) -> StoreResult<()>;

    /// Replace the configuration of the service's top interface
    fn set_interface_configuration(&mut self, service_id: &ServiceId, config: &ConfigDict) -> StoreResult<()>;

    /// Replace one extended configuration block of the service's top interface
    fn set_extended_configuration(
        &mut self,
        service_id: &ServiceId,
        extended_type: &str,
        config: &ConfigDict,
    ) -> StoreResult<()>;

    /// Attach the default protocols and interface options for the service's interface type
    fn establish_default_configuration(&mut self, service_id: &ServiceId) -> StoreResult<()>;

    /// The set of services currently in effect
    fn current_set(&self) -> StoreResult<Option<NetworkSet>>;

    fn add_service_to_set(&mut self, set_id: &SetId, service_id: &ServiceId) -> StoreResult<()>;

    /// Returns false when the service was not a member
    fn remove_service_from_set(&mut self, set_id: &SetId, service_id: &ServiceId) -> StoreResult<bool>;

    fn copy_protocol(&self, service_id: &ServiceId, protocol: ProtocolType) -> StoreResult<Option<NetworkProtocol>>;

    /// Replace the configuration of an existing protocol
    fn set_protocol_configuration(
        &mut self,
        service_id: &ServiceId,
        protocol: ProtocolType,
        config: &ConfigDict,
    ) -> StoreResult<()>;

    /// Remove a service and its membership in every set
    fn remove_service(&mut self, service_id: &ServiceId) -> StoreResult<()>;
}
