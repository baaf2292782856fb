//! Locate, create, activate and remove VPN services

use tracing::debug;

use crate::error::{ProvisionError, ProvisionResult, ResultExt};
use crate::model::ServiceId;
use crate::store::{NetworkInterface, NetworkService, Preferences, StoreError, StoreStatus};

/// Service a transaction works on
#[derive(Debug, Clone)]
pub struct ResolvedService {
    pub service: NetworkService,
    /// True when the service was created by this transaction
    pub created: bool,
}

impl ResolvedService {
    pub fn id(&self) -> &ServiceId {
        &self.service.id
    }
}

fn missing(context: &str, detail: String) -> ProvisionError {
    ProvisionError::Store {
        context: context.to_string(),
        source: StoreError::with_detail(StoreStatus::NoKey, detail),
    }
}

/// Look up an existing L2TP VPN service
pub fn find_service<P: Preferences + ?Sized>(prefs: &P, service_id: &ServiceId) -> ProvisionResult<NetworkService> {
    let service = prefs
        .copy_service(service_id)
        .context("Failed to get VPN service")?
        .ok_or_else(|| missing("Failed to get VPN service", format!("service {}", service_id)))?;

    if !service.interface.is_l2tp_vpn() {
        let stack: Vec<&str> = service.interface.stack().iter().map(|t| t.as_str()).collect();
        return Err(ProvisionError::NotSupported(format!(
            "service {} is not an L2TP VPN ({})",
            service_id,
            stack.join("/")
        )));
    }
    Ok(service)
}

/// Find the service named by `service_id`, or create a new PPP over L2TP
/// service when no id is given. `name` is applied either way when present.
pub fn resolve_service<P: Preferences + ?Sized>(
    prefs: &mut P,
    service_id: Option<&ServiceId>,
    name: Option<&str>,
) -> ProvisionResult<ResolvedService> {
    let (mut service, created) = match service_id {
        Some(id) => (find_service(prefs, id)?, false),
        None => {
            let service = prefs
                .create_service(&NetworkInterface::l2tp_vpn())
                .context("Failed to create new VPN service")?;
            debug!("Created VPN service {}", service.id);
            (service, true)
        }
    };

    if let Some(name) = name {
        prefs
            .set_service_name(&service.id, name)
            .context("Failed to set service name")?;
        service.name = Some(name.to_string());
    }

    Ok(ResolvedService { service, created })
}

/// Give a new service its default configuration and put it in the current set
pub fn activate_service<P: Preferences + ?Sized>(prefs: &mut P, service_id: &ServiceId) -> ProvisionResult<()> {
    prefs
        .establish_default_configuration(service_id)
        .context("Failed to establish default connection")?;

    let set = prefs
        .current_set()
        .context("Failed to get current network service set")?
        .ok_or_else(|| missing("Failed to get current network service set", "no current set".to_string()))?;

    prefs
        .add_service_to_set(&set.id, service_id)
        .context("Failed to add VPN service")?;
    debug!("Added {} to set {}", service_id, set.name);
    Ok(())
}

/// Take a service out of the current set and remove it from the store
pub fn remove_service<P: Preferences + ?Sized>(prefs: &mut P, service_id: &ServiceId) -> ProvisionResult<()> {
    if let Some(set) = prefs
        .current_set()
        .context("Failed to get current network service set")?
    {
        let removed = prefs
            .remove_service_from_set(&set.id, service_id)
            .context("Failed to remove VPN service from set")?;
        if removed {
            debug!("Removed {} from set {}", service_id, set.name);
        }
    }

    prefs
        .remove_service(service_id)
        .context("Failed to remove VPN service")?;
    debug!("Removed VPN service {}", service_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ConfigDict, InterfaceType, MockPreferences, NetworkSet, SetId};
    use mockall::Sequence;
    use std::collections::BTreeMap;

    fn vpn(id: &str, interface: NetworkInterface) -> NetworkService {
        NetworkService {
            id: ServiceId::new(id),
            name: None,
            interface,
            configuration: ConfigDict::new(),
            extended_configurations: BTreeMap::new(),
        }
    }

    fn current_set() -> NetworkSet {
        NetworkSet {
            id: SetId::new("SET"),
            name: "Automatic".into(),
            services: vec![],
        }
    }

    #[test]
    fn test_create_then_name() {
        let mut prefs = MockPreferences::new();
        let mut seq = Sequence::new();
        prefs
            .expect_create_service()
            .withf(|interface| interface.is_l2tp_vpn())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|interface| Ok(vpn("NEW", interface.clone())));
        prefs
            .expect_set_service_name()
            .withf(|id, name| id.as_str() == "NEW" && name == "Office VPN")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        let resolved = resolve_service(&mut prefs, None, Some("Office VPN")).unwrap();
        assert!(resolved.created);
        assert_eq!(resolved.id().as_str(), "NEW");
        assert_eq!(resolved.service.name.as_deref(), Some("Office VPN"));
    }

    #[test]
    fn test_existing_without_name_is_untouched() {
        let mut prefs = MockPreferences::new();
        prefs
            .expect_copy_service()
            .returning(|id| Ok(Some(vpn(id.as_str(), NetworkInterface::l2tp_vpn()))));
        prefs.expect_create_service().never();
        prefs.expect_set_service_name().never();

        let resolved = resolve_service(&mut prefs, Some(&ServiceId::new("OLD")), None).unwrap();
        assert!(!resolved.created);
        assert_eq!(resolved.id().as_str(), "OLD");
    }

    #[test]
    fn test_unknown_service_fails() {
        let mut prefs = MockPreferences::new();
        prefs.expect_copy_service().returning(|_| Ok(None));
        prefs.expect_set_service_name().never();

        let err = resolve_service(&mut prefs, Some(&ServiceId::new("GONE")), Some("x")).unwrap_err();
        assert!(err.to_string().starts_with("Failed to get VPN service"));
        assert_eq!(err.status_code(), Some(1004));
    }

    #[test]
    fn test_non_vpn_service_not_supported() {
        let mut prefs = MockPreferences::new();
        prefs.expect_copy_service().returning(|id| {
            let pppoe = NetworkInterface::layered_on(InterfaceType::Ppp, NetworkInterface::new(InterfaceType::Ipv4));
            Ok(Some(vpn(id.as_str(), pppoe)))
        });

        let err = find_service(&prefs, &ServiceId::new("ETH")).unwrap_err();
        assert!(matches!(err, ProvisionError::NotSupported(_)));
    }

    #[test]
    fn test_activate_order() {
        let mut prefs = MockPreferences::new();
        let mut seq = Sequence::new();
        prefs
            .expect_establish_default_configuration()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        prefs
            .expect_current_set()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some(current_set())));
        prefs
            .expect_add_service_to_set()
            .withf(|set, id| set.as_str() == "SET" && id.as_str() == "NEW")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));

        activate_service(&mut prefs, &ServiceId::new("NEW")).unwrap();
    }

    #[test]
    fn test_activate_without_current_set() {
        let mut prefs = MockPreferences::new();
        prefs.expect_establish_default_configuration().returning(|_| Ok(()));
        prefs.expect_current_set().returning(|| Ok(None));
        prefs.expect_add_service_to_set().never();

        let err = activate_service(&mut prefs, &ServiceId::new("NEW")).unwrap_err();
        assert!(err.to_string().starts_with("Failed to get current network service set"));
    }

    #[test]
    fn test_remove_leaves_set_then_store() {
        let mut prefs = MockPreferences::new();
        let mut seq = Sequence::new();
        prefs
            .expect_current_set()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(Some(current_set())));
        prefs
            .expect_remove_service_from_set()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(false));
        prefs
            .expect_remove_service()
            .withf(|id| id.as_str() == "OLD")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        remove_service(&mut prefs, &ServiceId::new("OLD")).unwrap();
    }
}
