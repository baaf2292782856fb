//! End-to-end provisioning against file-backed stores
//!
//! Every test works in its own temporary directory, so none of them need root.

use libl2tpctl::keychain::{FileKeychain, Keychain, TrustedApplications};
use libl2tpctl::store::{keys, FilePreferences, Preferences, ProtocolType, StoreStatus};
use libl2tpctl::{ProvisionError, Provisioner, ServiceConfigRequest, ServiceId};
use serde_json::json;
use std::path::PathBuf;
use tempfile::TempDir;

struct Paths {
    _dir: TempDir,
    preferences: PathBuf,
    applied: PathBuf,
    keychain: PathBuf,
}

impl Paths {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        Self {
            preferences: dir.path().join("lib/preferences.json"),
            applied: dir.path().join("run/preferences.json"),
            keychain: dir.path().join("lib/System.keychain.json"),
            _dir: dir,
        }
    }

    fn preferences(&self) -> FilePreferences {
        FilePreferences::open("test", &self.preferences, &self.applied).unwrap()
    }

    fn keychain(&self) -> FileKeychain {
        FileKeychain::open(&self.keychain).unwrap()
    }

    fn provisioner<'t>(&self, trusted: &'t TrustedApplications) -> Provisioner<'t, FilePreferences, FileKeychain> {
        Provisioner::new(self.preferences(), self.keychain(), trusted)
    }
}

fn trusted() -> TrustedApplications {
    TrustedApplications::from_paths(["/usr/sbin/pppd", "/usr/sbin/racoon"]).unwrap()
}

fn office_vpn() -> ServiceConfigRequest {
    ServiceConfigRequest::for_create("Office VPN", "vpn.example.com", "alice", "secret123", "sharedkey")
}

fn create_office_vpn(paths: &Paths, trusted: &TrustedApplications) -> ServiceId {
    paths.provisioner(trusted).create(&office_vpn()).unwrap()
}

#[test]
fn test_create_full_service() {
    let paths = Paths::new();
    let trusted = trusted();
    let id = create_office_vpn(&paths, &trusted);

    let prefs = paths.preferences();
    let service = prefs.copy_service(&id).unwrap().expect("service committed");
    assert_eq!(service.name.as_deref(), Some("Office VPN"));
    assert!(service.interface.is_l2tp_vpn());
    assert_eq!(service.configuration[keys::PPP_COMM_REMOTE_ADDRESS], json!("vpn.example.com"));
    assert_eq!(service.configuration[keys::PPP_AUTH_NAME], json!("alice"));
    assert_eq!(service.configuration[keys::PPP_AUTH_PASSWORD_ENCRYPTION], json!("Keychain"));

    let ipsec = &service.extended_configurations[keys::EXTENDED_IPSEC];
    assert_eq!(ipsec[keys::IPSEC_SHARED_SECRET], json!(format!("{}.SS", id)));
    assert_eq!(ipsec[keys::IPSEC_AUTHENTICATION_METHOD], json!("SharedSecret"));

    let ipv4 = prefs.copy_protocol(&id, ProtocolType::Ipv4).unwrap().unwrap();
    assert_eq!(ipv4.configuration[keys::OVERRIDE_PRIMARY], json!(true));
    assert_eq!(ipv4.configuration[keys::IPV4_CONFIG_METHOD], json!("PPP"));

    assert!(prefs.current_set().unwrap().unwrap().contains(&id));
    assert!(paths.applied.exists());

    let keychain = paths.keychain();
    let login = keychain.find_generic_password(id.as_str()).unwrap().unwrap();
    assert_eq!(login.secret, "secret123");
    assert_eq!(login.attributes.account.as_deref(), Some("alice"));
    assert_eq!(login.attributes.label.as_deref(), Some("Office VPN"));

    let shared = keychain.find_generic_password(&format!("{}.SS", id)).unwrap().unwrap();
    assert_eq!(shared.secret, "sharedkey");
    assert!(shared.attributes.account.is_none());
    assert_eq!(keychain.access_for(id.as_str()).unwrap().unwrap().label, "VPNHelper");
}

#[test]
fn test_edit_password_only() {
    let paths = Paths::new();
    let trusted = trusted();
    let id = create_office_vpn(&paths, &trusted);
    let before = paths.preferences().copy_service(&id).unwrap().unwrap();

    let request = ServiceConfigRequest {
        password: Some("newpass".into()),
        ..Default::default()
    };
    paths.provisioner(&trusted).edit(&id, &request).unwrap();

    let after = paths.preferences().copy_service(&id).unwrap().unwrap();
    assert_eq!(before, after);

    let keychain = paths.keychain();
    let login = keychain.find_generic_password(id.as_str()).unwrap().unwrap();
    assert_eq!(login.secret, "newpass");
    assert_eq!(login.attributes.account.as_deref(), Some("alice"));
    assert_eq!(keychain.count(id.as_str()).unwrap(), 1);

    let shared = keychain.find_generic_password(&format!("{}.SS", id)).unwrap().unwrap();
    assert_eq!(shared.secret, "sharedkey");
}

#[test]
fn test_edit_twice_same_result() {
    let paths = Paths::new();
    let trusted = trusted();
    let id = create_office_vpn(&paths, &trusted);

    let request = ServiceConfigRequest {
        server_address: Some("vpn2.example.com".into()),
        shared_secret: Some("newkey".into()),
        send_all_traffic: Some(false),
        ..Default::default()
    };

    paths.provisioner(&trusted).edit(&id, &request).unwrap();
    let once = paths.preferences().copy_service(&id).unwrap().unwrap();
    let once_ipv4 = paths.preferences().copy_protocol(&id, ProtocolType::Ipv4).unwrap();

    paths.provisioner(&trusted).edit(&id, &request).unwrap();
    let twice = paths.preferences().copy_service(&id).unwrap().unwrap();
    let twice_ipv4 = paths.preferences().copy_protocol(&id, ProtocolType::Ipv4).unwrap();

    assert_eq!(once, twice);
    assert_eq!(once_ipv4, twice_ipv4);
    assert_eq!(twice.configuration[keys::PPP_COMM_REMOTE_ADDRESS], json!("vpn2.example.com"));
    assert_eq!(twice.configuration[keys::PPP_AUTH_NAME], json!("alice"));

    let keychain = paths.keychain();
    assert_eq!(keychain.count(&format!("{}.SS", id)).unwrap(), 1);
    assert_eq!(keychain.count(id.as_str()).unwrap(), 1);
}

#[test]
fn test_edit_unknown_service() {
    let paths = Paths::new();
    let trusted = trusted();

    let err = paths
        .provisioner(&trusted)
        .edit(&ServiceId::new("0000-MISSING"), &ServiceConfigRequest::default())
        .unwrap_err();
    assert!(err.to_string().starts_with("Failed to get VPN service"));
    assert_eq!(err.status_code(), Some(StoreStatus::NoKey.code()));
}

#[test]
fn test_lock_held_by_other_client() {
    let paths = Paths::new();
    let trusted = trusted();
    let id = create_office_vpn(&paths, &trusted);

    let mut other = paths.preferences();
    other.lock(true).unwrap();

    let request = ServiceConfigRequest {
        username: Some("bob".into()),
        ..Default::default()
    };
    let err = paths
        .provisioner(&trusted)
        .with_wait_for_lock(false)
        .edit(&id, &request)
        .unwrap_err();
    assert_eq!(err.status_code(), Some(StoreStatus::Locked.code()));

    other.unlock().unwrap();
    let service = paths.preferences().copy_service(&id).unwrap().unwrap();
    assert_eq!(service.configuration[keys::PPP_AUTH_NAME], json!("alice"));
}

#[test]
fn test_failed_create_commits_nothing() {
    let paths = Paths::new();
    let trusted = trusted();
    let first = create_office_vpn(&paths, &trusted);

    // Same name in the current set is rejected by the store
    let mut provisioner = paths.provisioner(&trusted);
    let err = provisioner.create(&office_vpn()).unwrap_err();
    assert!(err.to_string().starts_with("Failed to set service name"));

    let (prefs, _) = provisioner.into_parts();
    assert!(!prefs.is_locked());

    let reopened = paths.preferences();
    assert_eq!(reopened.current_set().unwrap().unwrap().services, vec![first]);
}

#[test]
fn test_delete_removes_everything() {
    let paths = Paths::new();
    let trusted = trusted();
    let id = create_office_vpn(&paths, &trusted);

    paths.provisioner(&trusted).delete(&id).unwrap();

    let prefs = paths.preferences();
    assert!(prefs.copy_service(&id).unwrap().is_none());
    assert!(!prefs.current_set().unwrap().unwrap().contains(&id));

    let keychain = paths.keychain();
    assert_eq!(keychain.count(id.as_str()).unwrap(), 0);
    assert_eq!(keychain.count(&format!("{}.SS", id)).unwrap(), 0);

    let err = paths.provisioner(&trusted).delete(&id).unwrap_err();
    assert!(matches!(err, ProvisionError::Store { .. }));
}

#[test]
fn test_failed_create_leaves_nothing_for_next_edit() {
    let paths = Paths::new();
    let trusted = trusted();
    let mut provisioner = paths.provisioner(&trusted);
    let first = provisioner.create(&office_vpn()).unwrap();

    // Duplicate name fails after the new service was staged
    provisioner.create(&office_vpn()).unwrap_err();

    let request = ServiceConfigRequest {
        password: Some("newpass".into()),
        ..Default::default()
    };
    provisioner.edit(&first, &request).unwrap();

    let reopened = paths.preferences();
    assert_eq!(reopened.current_set().unwrap().unwrap().services, vec![first]);
    let committed: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&paths.preferences).unwrap()).unwrap();
    assert_eq!(committed["services"].as_object().unwrap().len(), 1);
}

#[test]
fn test_failed_create_then_other_client_commit() {
    let paths = Paths::new();
    let trusted = trusted();
    let mut provisioner = paths.provisioner(&trusted);
    provisioner.create(&office_vpn()).unwrap();
    provisioner.create(&office_vpn()).unwrap_err();

    let mut other = paths.provisioner(&trusted);
    let home = ServiceConfigRequest::for_create("Home VPN", "home.example.com", "bob", "pw", "key");
    let home_id = other.create(&home).unwrap();

    let lab = ServiceConfigRequest::for_create("Lab VPN", "lab.example.com", "carol", "pw", "key");
    let lab_id = provisioner.create(&lab).unwrap();

    let set = paths.preferences().current_set().unwrap().unwrap();
    assert_eq!(set.services.len(), 3);
    assert!(set.contains(&home_id));
    assert!(set.contains(&lab_id));
}

#[test]
fn test_instances_opened_together_keep_both_credentials() {
    let paths = Paths::new();
    let trusted = trusted();
    let mut first = paths.provisioner(&trusted);
    let mut second = paths.provisioner(&trusted);

    let office = first.create(&office_vpn()).unwrap();
    let home = ServiceConfigRequest::for_create("Home VPN", "home.example.com", "bob", "pw", "homekey");
    let home = second.create(&home).unwrap();

    let keychain = paths.keychain();
    for key in [office.to_string(), format!("{}.SS", office), home.to_string(), format!("{}.SS", home)] {
        assert_eq!(keychain.count(&key).unwrap(), 1, "entry for {}", key);
    }
    assert_eq!(
        keychain.find_generic_password(office.as_str()).unwrap().unwrap().secret,
        "secret123"
    );
}
