//! Declarative resources backed by the SoftLayer API

pub mod dns_zone;
pub mod firewall;
pub mod global_ip;
pub mod ha_pair;
pub mod lb_service;

pub use dns_zone::{DnsZoneResource, DnsZoneSpec};
pub use firewall::{FirewallRulesResource, FirewallSpec, validate_rules};
pub use global_ip::{GlobalIpResource, GlobalIpSpec, IpVersion};
pub use ha_pair::HaPairResource;
pub use lb_service::{LbServiceMember, LbServiceSpec, LoadBalancerServiceResource};

use crate::error::{Result, SoftLayerError};

/// Turn a 404 into `None`
pub(crate) fn absent_on_not_found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Fail when a mutating call answered `false`
pub(crate) fn accepted(done: bool, action: &'static str, target: impl Into<String>) -> Result<()> {
    if done {
        Ok(())
    } else {
        Err(SoftLayerError::Refused {
            action,
            target: target.into(),
        })
    }
}
