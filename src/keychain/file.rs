//! JSON file backed keychain
//!
//! Every call reads the file, and every change is written straight back.
//! No items are cached between calls, so a handle opened before another
//! process wrote the file still sees that process's items. The file is only
//! readable by its owner.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use super::{
    Access, ItemAttributes, ItemRef, Keychain, KeychainError, KeychainItem, KeychainResult, KeychainStatus,
    TrustedApplications,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct KeychainDocument {
    items: Vec<StoredItem>,
}

impl KeychainDocument {
    fn find(&self, service: &str) -> Option<&StoredItem> {
        self.items.iter().find(|item| item.service == service)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredItem {
    id: String,
    service: String,
    description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    account: Option<String>,
    secret: String,
    access_label: String,
    trusted_applications: Vec<PathBuf>,
    created_at: String,
}

impl StoredItem {
    fn to_item(&self) -> KeychainItem {
        KeychainItem {
            item: ItemRef::new(self.id.clone()),
            attributes: ItemAttributes {
                service: self.service.clone(),
                description: self.description.clone(),
                label: self.label.clone(),
                account: self.account.clone(),
            },
            secret: self.secret.clone(),
        }
    }
}

/// Keychain kept in a JSON file with 0600 permissions
pub struct FileKeychain {
    path: PathBuf,
}

impl FileKeychain {
    /// Open the keychain at `path`. A missing file is an empty keychain.
    pub fn open(path: impl Into<PathBuf>) -> KeychainResult<Self> {
        let keychain = Self { path: path.into() };
        let document = keychain.load()?;
        debug!("Opened keychain {:?} ({} items)", keychain.path, document.items.len());
        Ok(keychain)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of items whose service attribute is `service`
    pub fn count(&self, service: &str) -> KeychainResult<usize> {
        Ok(self.load()?.items.iter().filter(|item| item.service == service).count())
    }

    /// Access policy recorded on the first item for `service`
    pub fn access_for(&self, service: &str) -> KeychainResult<Option<Access>> {
        Ok(self.load()?.find(service).map(|item| Access {
            label: item.access_label.clone(),
            trusted_applications: item.trusted_applications.clone(),
        }))
    }

    fn load(&self) -> KeychainResult<KeychainDocument> {
        match fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).map_err(|_| KeychainError::new(KeychainStatus::Decode)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(KeychainDocument::default()),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(KeychainError::new(KeychainStatus::AuthFailed)),
            Err(_) => Err(KeychainError::new(KeychainStatus::NoSuchKeychain)),
        }
    }

    fn save(&self, document: &KeychainDocument) -> KeychainResult<()> {
        let content = serde_json::to_vec_pretty(document).map_err(|_| KeychainError::new(KeychainStatus::Io))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|_| KeychainError::new(KeychainStatus::WritePermissions))?;
        }

        let mut tmp_path = OsString::from(self.path.as_os_str());
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(&tmp_path)
            .map_err(|_| KeychainError::new(KeychainStatus::WritePermissions))?;
        file.write_all(&content).map_err(|_| KeychainError::new(KeychainStatus::Io))?;
        file.sync_all().map_err(|_| KeychainError::new(KeychainStatus::Io))?;

        fs::rename(&tmp_path, &self.path).map_err(|_| KeychainError::new(KeychainStatus::Io))
    }
}

impl Keychain for FileKeychain {
    fn create_access(&self, label: &str, trusted: &TrustedApplications) -> KeychainResult<Access> {
        if label.is_empty() {
            return Err(KeychainError::new(KeychainStatus::Param));
        }
        Ok(Access {
            label: label.to_string(),
            trusted_applications: trusted.paths(),
        })
    }

    fn find_generic_password(&self, service: &str) -> KeychainResult<Option<KeychainItem>> {
        Ok(self.load()?.find(service).map(StoredItem::to_item))
    }

    fn delete_item(&mut self, item: &ItemRef) -> KeychainResult<()> {
        let mut document = self.load()?;
        let index = document
            .items
            .iter()
            .position(|stored| stored.id == item.as_str())
            .ok_or_else(|| KeychainError::new(KeychainStatus::ItemNotFound))?;

        document.items.remove(index);
        self.save(&document)
    }

    fn create_generic_password(
        &mut self,
        attributes: &ItemAttributes,
        secret: &str,
        access: &Access,
    ) -> KeychainResult<ItemRef> {
        if attributes.service.is_empty() {
            return Err(KeychainError::new(KeychainStatus::Param));
        }

        let mut document = self.load()?;

        // Service and account together identify a generic password
        let duplicate = document
            .items
            .iter()
            .any(|item| item.service == attributes.service && item.account == attributes.account);
        if duplicate {
            return Err(KeychainError::new(KeychainStatus::DuplicateItem));
        }

        let id = uuid::Uuid::new_v4().to_string();
        document.items.push(StoredItem {
            id: id.clone(),
            service: attributes.service.clone(),
            description: attributes.description.clone(),
            label: attributes.label.clone(),
            account: attributes.account.clone(),
            secret: secret.to_string(),
            access_label: access.label.clone(),
            trusted_applications: access.trusted_applications.clone(),
            created_at: chrono::Utc::now().to_rfc3339(),
        });

        self.save(&document)?;
        Ok(ItemRef::new(id))
    }
}
