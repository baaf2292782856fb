//! JSON file backed configuration store
//!
//! Layout on disk:
//! - `<path>`: committed document
//! - `<path>.lock`: lock file, held with `flock(2)` while a client has the store locked
//! - `<applied_path>`: last applied document, read by the running system
//!
//! Changes are staged in memory. Unlocking drops whatever was not committed.

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::keys;
use super::{
    ConfigDict, InterfaceType, NetworkInterface, NetworkProtocol, NetworkService, NetworkSet, Preferences,
    ProtocolType, SetId, StoreError, StoreResult, StoreStatus,
};
use crate::model::ServiceId;

const DEFAULT_SET_NAME: &str = "Automatic";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct PreferencesDocument {
    generation: u64,
    current_set: Option<String>,
    sets: BTreeMap<String, SetRecord>,
    services: BTreeMap<String, ServiceRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct SetRecord {
    name: String,
    service_order: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct ServiceRecord {
    name: Option<String>,
    interface: Vec<InterfaceType>,
    interface_config: ConfigDict,
    extended_config: BTreeMap<String, ConfigDict>,
    protocols: BTreeMap<String, ProtocolRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ProtocolRecord {
    enabled: bool,
    #[serde(default)]
    config: ConfigDict,
}

impl PreferencesDocument {
    /// Empty document with an empty current set
    fn fresh() -> Self {
        let set_id = new_id();
        let mut doc = Self {
            current_set: Some(set_id.clone()),
            ..Default::default()
        };
        doc.sets.insert(
            set_id,
            SetRecord {
                name: DEFAULT_SET_NAME.to_string(),
                service_order: Vec::new(),
            },
        );
        doc
    }
}

/// Configuration store kept in a JSON file
pub struct FilePreferences {
    /// Client name, recorded in log messages
    name: String,
    path: PathBuf,
    applied_path: PathBuf,
    /// Staged document; committed on `commit_changes`
    document: PreferencesDocument,
    /// On-disk document the staged one started from
    committed: PreferencesDocument,
    dirty: bool,
    lock_file: Option<File>,
}

impl FilePreferences {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(name: &str, path: impl Into<PathBuf>, applied_path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let document = read_document(&path)?;
        debug!("{}: opened preferences {:?} (generation {})", name, path, document.generation);

        Ok(Self {
            name: name.to_string(),
            committed: document.clone(),
            path,
            applied_path: applied_path.into(),
            document,
            dirty: false,
            lock_file: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        self.lock_file.is_some()
    }

    /// True when there are staged changes that have not been committed
    pub fn has_uncommitted_changes(&self) -> bool {
        self.dirty
    }

    fn lock_path(&self) -> PathBuf {
        let mut path = OsString::from(self.path.as_os_str());
        path.push(".lock");
        PathBuf::from(path)
    }

    /// Throw away staged changes and go back to the last committed document
    fn discard_changes(&mut self) {
        if self.dirty {
            debug!("{}: discarding uncommitted changes", self.name);
            self.document = self.committed.clone();
            self.dirty = false;
        }
    }

    fn require_lock(&self) -> StoreResult<()> {
        if self.lock_file.is_none() {
            return Err(StoreError::new(StoreStatus::NeedLock));
        }
        Ok(())
    }

    fn service(&self, service_id: &ServiceId) -> StoreResult<&ServiceRecord> {
        self.document
            .services
            .get(service_id.as_str())
            .ok_or_else(|| StoreError::with_detail(StoreStatus::NoKey, format!("service {}", service_id)))
    }

    fn service_mut(&mut self, service_id: &ServiceId) -> StoreResult<&mut ServiceRecord> {
        self.dirty = true;
        self.document
            .services
            .get_mut(service_id.as_str())
            .ok_or_else(|| StoreError::with_detail(StoreStatus::NoKey, format!("service {}", service_id)))
    }

    fn set_mut(&mut self, set_id: &SetId) -> StoreResult<&mut SetRecord> {
        self.dirty = true;
        self.document
            .sets
            .get_mut(set_id.as_str())
            .ok_or_else(|| StoreError::with_detail(StoreStatus::NoKey, format!("set {}", set_id.as_str())))
    }

    fn to_service(service_id: &str, record: &ServiceRecord) -> StoreResult<NetworkService> {
        let interface = NetworkInterface::from_stack(&record.interface).ok_or_else(|| {
            StoreError::with_detail(StoreStatus::Failed, format!("service {} has no interface", service_id))
        })?;

        Ok(NetworkService {
            id: ServiceId::new(service_id),
            name: record.name.clone(),
            interface,
            configuration: record.interface_config.clone(),
            extended_configurations: record.extended_config.clone(),
        })
    }
}

impl Preferences for FilePreferences {
    fn lock(&mut self, wait: bool) -> StoreResult<()> {
        if self.lock_file.is_some() {
            return Err(StoreError::new(StoreStatus::Locked));
        }

        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(io_error)?;

        let locked = if wait { file.lock_exclusive() } else { file.try_lock_exclusive() };
        match locked {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Err(StoreError::new(StoreStatus::Locked)),
            Err(e) => return Err(io_error(e)),
        }

        // Another client may have committed since this handle was opened.
        // Returning early drops `file`, which releases the lock.
        let on_disk = read_document(&self.path)?;
        if on_disk.generation != self.committed.generation {
            if self.dirty {
                return Err(StoreError::new(StoreStatus::Stale));
            }
            debug!("{}: reloading preferences (generation {})", self.name, on_disk.generation);
            self.document = on_disk.clone();
            self.committed = on_disk;
        }

        self.lock_file = Some(file);
        Ok(())
    }

    fn unlock(&mut self) -> StoreResult<()> {
        let file = self.lock_file.take().ok_or_else(|| StoreError::new(StoreStatus::NeedLock))?;
        self.discard_changes();
        FileExt::unlock(&file).map_err(io_error)
    }

    fn commit_changes(&mut self) -> StoreResult<()> {
        self.require_lock()?;

        let mut document = self.document.clone();
        document.generation = self.committed.generation + 1;
        write_document(&self.path, &document)?;

        self.document = document.clone();
        self.committed = document;
        self.dirty = false;
        info!("{}: committed preferences (generation {})", self.name, self.committed.generation);
        Ok(())
    }

    fn apply_changes(&mut self) -> StoreResult<()> {
        let committed = read_document(&self.path)?;
        write_document(&self.applied_path, &committed)?;
        info!("{}: applied preferences (generation {})", self.name, committed.generation);
        Ok(())
    }

    fn copy_service(&self, service_id: &ServiceId) -> StoreResult<Option<NetworkService>> {
        match self.document.services.get(service_id.as_str()) {
            Some(record) => Self::to_service(service_id.as_str(), record).map(Some),
            None => Ok(None),
        }
    }

    fn create_service(&mut self, interface: &NetworkInterface) -> StoreResult<NetworkService> {
        if interface.interface_type == InterfaceType::Ipv4 {
            return Err(StoreError::with_detail(
                StoreStatus::InvalidArgument,
                "a service needs a configurable interface",
            ));
        }

        let service_id = new_id();
        let record = ServiceRecord {
            interface: interface.stack(),
            ..Default::default()
        };
        let service = Self::to_service(&service_id, &record)?;

        self.document.services.insert(service_id, record);
        self.dirty = true;
        Ok(service)
    }

    fn set_service_name(&mut self, service_id: &ServiceId, name: &str) -> StoreResult<()> {
        // Names are unique within the current set
        if let Some(set_id) = &self.document.current_set {
            if let Some(set) = self.document.sets.get(set_id) {
                let taken = set.service_order.iter().any(|other| {
                    other != service_id.as_str()
                        && self.document.services.get(other).and_then(|s| s.name.as_deref()) == Some(name)
                });
                if taken {
                    return Err(StoreError::with_detail(
                        StoreStatus::KeyExists,
                        format!("service name '{}' already in use", name),
                    ));
                }
            }
        }

        self.service_mut(service_id)?.name = Some(name.to_string());
        Ok(())
    }

    fn set_interface_configuration(&mut self, service_id: &ServiceId, config: &ConfigDict) -> StoreResult<()> {
        self.service_mut(service_id)?.interface_config = config.clone();
        Ok(())
    }

    fn set_extended_configuration(
        &mut self,
        service_id: &ServiceId,
        extended_type: &str,
        config: &ConfigDict,
    ) -> StoreResult<()> {
        let service = self.service_mut(service_id)?;
        if !service.interface.contains(&InterfaceType::L2tp) {
            return Err(StoreError::with_detail(
                StoreStatus::InvalidArgument,
                format!("{} configuration needs an L2TP interface", extended_type),
            ));
        }
        service.extended_config.insert(extended_type.to_string(), config.clone());
        Ok(())
    }

    fn establish_default_configuration(&mut self, service_id: &ServiceId) -> StoreResult<()> {
        let service = self.service_mut(service_id)?;

        let mut ipv4 = ConfigDict::new();
        ipv4.insert(keys::IPV4_CONFIG_METHOD.to_string(), json!(keys::IPV4_CONFIG_METHOD_PPP));
        let mut ipv6 = ConfigDict::new();
        ipv6.insert(keys::IPV6_CONFIG_METHOD.to_string(), json!(keys::IPV6_CONFIG_METHOD_AUTOMATIC));

        let defaults = [
            (ProtocolType::Ipv4, ipv4),
            (ProtocolType::Ipv6, ipv6),
            (ProtocolType::Dns, ConfigDict::new()),
            (ProtocolType::Proxies, ConfigDict::new()),
        ];
        for (protocol, config) in defaults {
            service
                .protocols
                .entry(protocol.as_str().to_string())
                .or_insert(ProtocolRecord { enabled: true, config });
        }

        if service.interface.first() == Some(&InterfaceType::Ppp) {
            let ppp_defaults = [
                (keys::PPP_DIAL_ON_DEMAND, 0),
                (keys::PPP_DISCONNECT_ON_IDLE, 0),
                (keys::PPP_DISCONNECT_ON_LOGOUT, 1),
                (keys::PPP_DISCONNECT_ON_SLEEP, 1),
                (keys::PPP_LCP_ECHO_ENABLED, 1),
            ];
            for (key, value) in ppp_defaults {
                service.interface_config.entry(key.to_string()).or_insert(json!(value));
            }
        }

        Ok(())
    }

    fn current_set(&self) -> StoreResult<Option<NetworkSet>> {
        let Some(set_id) = &self.document.current_set else {
            return Ok(None);
        };
        let Some(record) = self.document.sets.get(set_id) else {
            return Ok(None);
        };

        Ok(Some(NetworkSet {
            id: SetId::new(set_id.clone()),
            name: record.name.clone(),
            services: record.service_order.iter().map(ServiceId::new).collect(),
        }))
    }

    fn add_service_to_set(&mut self, set_id: &SetId, service_id: &ServiceId) -> StoreResult<()> {
        self.service(service_id)?;
        let set = self.set_mut(set_id)?;
        if set.service_order.iter().any(|id| id == service_id.as_str()) {
            return Err(StoreError::new(StoreStatus::KeyExists));
        }
        set.service_order.push(service_id.as_str().to_string());
        Ok(())
    }

    fn remove_service_from_set(&mut self, set_id: &SetId, service_id: &ServiceId) -> StoreResult<bool> {
        let set = self.set_mut(set_id)?;
        let before = set.service_order.len();
        set.service_order.retain(|id| id != service_id.as_str());
        Ok(set.service_order.len() != before)
    }

    fn copy_protocol(&self, service_id: &ServiceId, protocol: ProtocolType) -> StoreResult<Option<NetworkProtocol>> {
        let service = self.service(service_id)?;
        Ok(service.protocols.get(protocol.as_str()).map(|record| NetworkProtocol {
            protocol_type: protocol,
            enabled: record.enabled,
            configuration: record.config.clone(),
        }))
    }

    fn set_protocol_configuration(
        &mut self,
        service_id: &ServiceId,
        protocol: ProtocolType,
        config: &ConfigDict,
    ) -> StoreResult<()> {
        let service = self.service_mut(service_id)?;
        let record = service
            .protocols
            .get_mut(protocol.as_str())
            .ok_or_else(|| StoreError::with_detail(StoreStatus::NoKey, format!("protocol {}", protocol.as_str())))?;
        record.config = config.clone();
        Ok(())
    }

    fn remove_service(&mut self, service_id: &ServiceId) -> StoreResult<()> {
        self.service(service_id)?;
        self.dirty = true;
        self.document.services.remove(service_id.as_str());
        for set in self.document.sets.values_mut() {
            set.service_order.retain(|id| id != service_id.as_str());
        }
        Ok(())
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string().to_uppercase()
}

fn io_error(err: io::Error) -> StoreError {
    let status = match err.kind() {
        ErrorKind::PermissionDenied => StoreStatus::AccessError,
        ErrorKind::NotFound => StoreStatus::NoConfigFile,
        _ => StoreStatus::Failed,
    };
    StoreError::with_detail(status, err.to_string())
}

fn read_document(path: &Path) -> StoreResult<PreferencesDocument> {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).map_err(|e| {
            StoreError::with_detail(StoreStatus::Failed, format!("failed to parse {:?}: {}", path, e))
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(PreferencesDocument::fresh()),
        Err(e) => Err(io_error(e)),
    }
}

/// Write via a temporary file and rename so readers never see a partial document
fn write_document(path: &Path, document: &PreferencesDocument) -> StoreResult<()> {
    let content = serde_json::to_string_pretty(document)
        .map_err(|e| StoreError::with_detail(StoreStatus::Failed, e.to_string()))?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let mut tmp_path = OsString::from(path.as_os_str());
    tmp_path.push(".tmp");
    let tmp_path = PathBuf::from(tmp_path);

    fs::write(&tmp_path, content).map_err(io_error)?;
    fs::rename(&tmp_path, path).map_err(io_error)?;
    Ok(())
}
