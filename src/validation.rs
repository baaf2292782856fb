//! Input validation and sanitization
//!
//! Checks a command-line request against the rules of its mode before any
//! store is touched. Every problem is reported, one per line.

use crate::error::{ProvisionError, ProvisionResult};
use crate::model::{Mode, ServiceConfigRequest, ServiceId};
use std::net::IpAddr;

/// Maximum length for configuration values
const MAX_CONFIG_VALUE_LEN: usize = 255;

/// Maximum length for hostnames
const MAX_HOSTNAME_LEN: usize = 253;

/// Request fields as given on the command line
#[derive(Clone, Default)]
pub struct RawRequest {
    pub service_id: Option<String>,
    pub service_name: Option<String>,
    pub server_address: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub shared_secret: Option<String>,
    pub send_all_traffic: Option<bool>,
}

/// A request that passed validation for its mode
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub mode: Mode,
    /// Present for edit and delete, absent for create
    pub service_id: Option<ServiceId>,
    pub request: ServiceConfigRequest,
}

/// Validate IP address
pub fn validate_ip_address(addr: &str) -> ProvisionResult<IpAddr> {
    addr.parse::<IpAddr>()
        .map_err(|_| ProvisionError::InvalidParameter(
            format!("Invalid IP address: {}", addr)
        ))
}

/// Sanitize configuration values to prevent injection
///
/// Rejects control characters, NUL bytes and overlong values
pub fn sanitize_config_value(value: &str) -> ProvisionResult<String> {
    // Check for null bytes
    if value.contains('\0') {
        return Err(ProvisionError::InvalidParameter(
            "Configuration value contains null byte".to_string()
        ));
    }

    // Check for control characters
    if value.chars().any(|c| c.is_control() && c != '\t') {
        return Err(ProvisionError::InvalidParameter(
            "Configuration value contains invalid control characters".to_string()
        ));
    }

    // Limit length
    if value.len() > MAX_CONFIG_VALUE_LEN {
        return Err(ProvisionError::InvalidParameter(
            format!("Configuration value too long (max {} characters)", MAX_CONFIG_VALUE_LEN)
        ));
    }

    Ok(value.to_string())
}

/// Validate a VPN server address: an IP literal or a hostname
pub fn validate_hostname(host: &str) -> ProvisionResult<()> {
    if host.is_empty() {
        return Err(ProvisionError::InvalidParameter(
            "Hostname cannot be empty".to_string()
        ));
    }

    if host.len() > MAX_HOSTNAME_LEN {
        return Err(ProvisionError::InvalidParameter(
            "Hostname too long".to_string()
        ));
    }

    // Try parsing as IP address first
    if validate_ip_address(host).is_ok() {
        return Ok(());
    }

    // Hostnames can contain alphanumeric, dash, and dots
    for c in host.chars() {
        if !c.is_ascii_alphanumeric() && c != '-' && c != '.' {
            return Err(ProvisionError::InvalidParameter(
                format!("Invalid hostname character: {}", c)
            ));
        }
    }

    // No leading/trailing dashes or dots
    if host.starts_with('-') || host.starts_with('.') ||
       host.ends_with('-') || host.ends_with('.') {
        return Err(ProvisionError::InvalidParameter(
            "Invalid hostname format".to_string()
        ));
    }

    Ok(())
}

/// Validate a service id as assigned by the configuration store
pub fn validate_service_id(id: &str) -> ProvisionResult<ServiceId> {
    if id.is_empty() {
        return Err(ProvisionError::InvalidParameter(
            "VPN service ID cannot be empty".to_string()
        ));
    }

    if id.len() > MAX_CONFIG_VALUE_LEN {
        return Err(ProvisionError::InvalidParameter(
            "VPN service ID too long".to_string()
        ));
    }

    if let Some(c) = id.chars().find(|c| !c.is_ascii_alphanumeric() && *c != '-') {
        return Err(ProvisionError::InvalidParameter(
            format!("Invalid VPN service ID character: {}", c)
        ));
    }

    Ok(ServiceId::new(id))
}

fn check_value(problems: &mut Vec<String>, field: &str, value: Option<&str>) {
    let Some(value) = value else { return };
    if let Err(ProvisionError::InvalidParameter(msg)) = sanitize_config_value(value) {
        problems.push(format!("{}: {}", field, msg));
    }
}

/// Check `raw` against the rules of `mode`
pub fn validate_request(mode: Mode, raw: RawRequest) -> ProvisionResult<ValidatedRequest> {
    let mut problems = Vec::new();

    match mode {
        Mode::Create => {
            if raw.service_id.is_some() {
                problems.push("Cannot specify VPN service ID (-i)".to_string());
            }
            let required = [
                (&raw.service_name, "Must specify VPN name (-n)"),
                (&raw.server_address, "Must specify server address (-a)"),
                (&raw.username, "Must specify username (-u)"),
                (&raw.password, "Must specify password (-p)"),
                (&raw.shared_secret, "Must specify shared secret (-s)"),
            ];
            for (value, msg) in required {
                if value.is_none() {
                    problems.push(msg.to_string());
                }
            }
        }
        Mode::Edit => {
            if raw.service_id.is_none() {
                problems.push("Must specify VPN service ID (-i)".to_string());
            }
        }
        Mode::Delete => {
            if raw.service_id.is_none() {
                problems.push("Must specify VPN service ID (-i)".to_string());
            }
            let forbidden = [
                (raw.service_name.is_some(), "Cannot specify VPN name (-n)"),
                (raw.server_address.is_some(), "Cannot specify server address (-a)"),
                (raw.username.is_some(), "Cannot specify username (-u)"),
                (raw.password.is_some(), "Cannot specify password (-p)"),
                (raw.shared_secret.is_some(), "Cannot specify shared secret (-s)"),
                (raw.send_all_traffic.is_some(), "Cannot specify send-all-traffic (-t)"),
            ];
            for (present, msg) in forbidden {
                if present {
                    problems.push(msg.to_string());
                }
            }
        }
    }

    let service_id = match (mode, raw.service_id.as_deref()) {
        (Mode::Edit | Mode::Delete, Some(id)) => match validate_service_id(id) {
            Ok(id) => Some(id),
            Err(ProvisionError::InvalidParameter(msg)) => {
                problems.push(msg);
                None
            }
            Err(e) => return Err(e),
        },
        _ => None,
    };

    // Password and shared secret go to the keychain verbatim and never
    // appear in a message
    check_value(&mut problems, "VPN name", raw.service_name.as_deref());
    check_value(&mut problems, "Username", raw.username.as_deref());

    // An empty address clears the setting
    if let Some(address) = raw.server_address.as_deref().filter(|a| !a.is_empty()) {
        if let Err(ProvisionError::InvalidParameter(msg)) = validate_hostname(address) {
            problems.push(format!("Server address: {}", msg));
        }
    }

    if !problems.is_empty() {
        return Err(ProvisionError::InvalidParameter(problems.join("\n")));
    }

    let send_all_traffic = match mode {
        Mode::Create => Some(raw.send_all_traffic.unwrap_or(true)),
        _ => raw.send_all_traffic,
    };

    Ok(ValidatedRequest {
        mode,
        service_id,
        request: ServiceConfigRequest {
            service_name: raw.service_name,
            server_address: raw.server_address,
            username: raw.username,
            password: raw.password,
            shared_secret: raw.shared_secret,
            send_all_traffic,
        },
    })
}
