//! PPP, IPSec and IPv4 configuration of a resolved VPN service
//!
//! Each stage writes its block with a single store call. Values already in
//! the block are kept unless the request overrides them.

use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ProvisionError, ProvisionResult, ResultExt};
use crate::model::{SecretId, ServiceConfigRequest, ServiceId};
use crate::store::{keys, ConfigDict, NetworkService, Preferences, ProtocolType, StoreError, StoreStatus};

fn set(config: &mut ConfigDict, key: &str, value: Value) {
    config.insert(key.to_string(), value);
}

/// Server address and username. Returns false when neither is in the request.
pub fn apply_ppp<P: Preferences + ?Sized>(
    prefs: &mut P,
    service: &NetworkService,
    request: &ServiceConfigRequest,
) -> ProvisionResult<bool> {
    if request.server_address.is_none() && request.username.is_none() {
        debug!("{}: no PPP changes", service.id);
        return Ok(false);
    }

    let mut config = service.configuration.clone();
    set(
        &mut config,
        keys::PPP_AUTH_PASSWORD_ENCRYPTION,
        json!(keys::PPP_AUTH_PASSWORD_ENCRYPTION_KEYCHAIN),
    );
    if let Some(address) = &request.server_address {
        set(&mut config, keys::PPP_COMM_REMOTE_ADDRESS, json!(address));
    }
    if let Some(username) = &request.username {
        set(&mut config, keys::PPP_AUTH_NAME, json!(username));
    }

    prefs
        .set_interface_configuration(&service.id, &config)
        .context("Failed to set PPP config")?;
    Ok(true)
}

/// Point IPSec at the shared secret stored in the keychain.
///
/// Runs on every create and edit, whether or not the shared secret changes.
pub fn apply_ipsec<P: Preferences + ?Sized>(
    prefs: &mut P,
    service: &NetworkService,
    secret_id: &SecretId,
) -> ProvisionResult<()> {
    let mut config = service
        .extended_configurations
        .get(keys::EXTENDED_IPSEC)
        .cloned()
        .unwrap_or_default();
    set(
        &mut config,
        keys::IPSEC_AUTHENTICATION_METHOD,
        json!(keys::IPSEC_AUTHENTICATION_METHOD_SHARED_SECRET),
    );
    set(
        &mut config,
        keys::IPSEC_SHARED_SECRET_ENCRYPTION,
        json!(keys::IPSEC_SHARED_SECRET_ENCRYPTION_KEYCHAIN),
    );
    set(&mut config, keys::IPSEC_SHARED_SECRET, json!(secret_id.as_str()));

    prefs
        .set_extended_configuration(&service.id, keys::EXTENDED_IPSEC, &config)
        .context("Failed to set IPSec config")
}

/// Routing through the VPN. Returns false when the request leaves it alone.
pub fn apply_ipv4<P: Preferences + ?Sized>(
    prefs: &mut P,
    service_id: &ServiceId,
    request: &ServiceConfigRequest,
) -> ProvisionResult<bool> {
    let Some(send_all_traffic) = request.send_all_traffic else {
        debug!("{}: no IPv4 changes", service_id);
        return Ok(false);
    };

    let protocol = prefs
        .copy_protocol(service_id, ProtocolType::Ipv4)
        .context("Failed to get IPv4 protocol")?
        .ok_or_else(|| ProvisionError::Store {
            context: "Failed to get IPv4 protocol".to_string(),
            source: StoreError::with_detail(StoreStatus::NoKey, format!("service {}", service_id)),
        })?;

    let mut config = protocol.configuration;
    set(&mut config, keys::IPV4_CONFIG_METHOD, json!(keys::IPV4_CONFIG_METHOD_PPP));
    set(&mut config, keys::OVERRIDE_PRIMARY, json!(send_all_traffic));

    prefs
        .set_protocol_configuration(service_id, ProtocolType::Ipv4, &config)
        .context("Failed to set IPv4 config")?;
    Ok(true)
}
