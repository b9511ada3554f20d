//! Global IP addresses
//!
//! A global IP is ordered through the product catalog, discovered once the
//! order is fulfilled, and then routed to a destination address. Every route
//! change runs as a transaction on the IP which has to finish before the IP
//! is usable.

use super::{absent_on_not_found, accepted};
use crate::catalog::{
    CapabilityRequest, GLOBAL_IP_PACKAGE_TYPES, OrderPayload, resolve_with_fallback, submit_order,
};
use crate::client::{GlobalIpRecord, SoftLayerApi};
use crate::config::ReconcileConfig;
use crate::error::{Result, SoftLayerError};
use crate::flows::{wait_for_global_ip_order, wait_for_routing_change};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_cloud::{Resource, ResourceState, ResourceStatus, parse_numeric_id};

pub const RESOURCE_TYPE: &str = "global-ip";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Catalog key name of the item
    pub fn key_name(self) -> &'static str {
        match self {
            IpVersion::V4 => "GLOBAL_IPV4",
            IpVersion::V6 => "GLOBAL_IPV6",
        }
    }

    fn of_address(address: &str) -> Self {
        if address.contains(':') {
            IpVersion::V6
        } else {
            IpVersion::V4
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalIpSpec {
    pub version: IpVersion,
    /// Address traffic is routed to; `None` leaves the IP unrouted
    #[serde(default)]
    pub routes_to: Option<String>,
}

pub struct GlobalIpResource {
    api: Arc<dyn SoftLayerApi>,
    config: ReconcileConfig,
}

impl GlobalIpResource {
    pub fn new(api: Arc<dyn SoftLayerApi>, config: ReconcileConfig) -> Self {
        Self { api, config }
    }

    /// Point the IP at `destination` (or unroute it) and wait for the transaction.
    async fn apply_route(&self, record: &GlobalIpRecord, destination: Option<&str>) -> Result<()> {
        if record.destination() == destination {
            tracing::debug!("Global IP {} already routed to {:?}", record.id, destination);
            return Ok(());
        }

        match destination {
            Some(destination) => {
                tracing::info!("Routing global IP {} to {}", record.id, destination);
                let done = self.api.route_global_ip(record.id, destination).await?;
                accepted(done, "route global IP", record.id.to_string())?;
            }
            None => {
                tracing::info!("Unrouting global IP {}", record.id);
                let done = self.api.unroute_global_ip(record.id).await?;
                accepted(done, "unroute global IP", record.id.to_string())?;
            }
        }

        wait_for_routing_change(self.api.as_ref(), record.id, &self.config.routing_wait()).await
    }

    fn to_state(record: &GlobalIpRecord) -> ResourceState {
        let mut state = ResourceState::new(record.id.to_string(), RESOURCE_TYPE)
            .with_status(ResourceStatus::Active);
        if let Some(address) = record.address() {
            state.set_attribute("ip_address", address);
            state.set_attribute("version", IpVersion::of_address(address));
        }
        if let Some(destination) = record.destination() {
            state.set_attribute("routes_to", destination);
        }
        if let Some(billing_item) = &record.billing_item {
            state.set_attribute("billing_item_id", billing_item.id);
        }
        state
    }
}

#[async_trait]
impl Resource for GlobalIpResource {
    type Spec = GlobalIpSpec;
    type Error = SoftLayerError;

    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, spec: &GlobalIpSpec) -> Result<ResourceState> {
        let request = CapabilityRequest::new(spec.version.key_name(), GLOBAL_IP_PACKAGE_TYPES);
        let resolved = resolve_with_fallback(self.api.as_ref(), &request).await?;
        let order = OrderPayload::new(&resolved, request.quantity);
        let order_id = submit_order(self.api.as_ref(), &order).await?;

        let record =
            wait_for_global_ip_order(self.api.as_ref(), order_id, &self.config.order_wait())
                .await?;
        if let Err(e) = self.apply_route(&record, spec.routes_to.as_deref()).await {
            tracing::warn!("Global IP {} ordered but routing did not finish: {}", record.id, e);
            let state = Self::to_state(&record)
                .with_status(ResourceStatus::Provisioning)
                .with_attribute("order_id", order_id);
            return Err(SoftLayerError::Incomplete {
                state: Box::new(state),
                source: Box::new(e),
            });
        }

        let record = self.api.get_global_ip(record.id).await?;
        Ok(Self::to_state(&record).with_attribute("order_id", order_id))
    }

    async fn read(&self, id: &str) -> Result<Option<ResourceState>> {
        let id = parse_numeric_id(id)?;
        let record = absent_on_not_found(self.api.get_global_ip(id).await)?;
        Ok(record.as_ref().map(Self::to_state))
    }

    async fn update(&self, id: &str, spec: &GlobalIpSpec) -> Result<ResourceState> {
        let record = self.api.get_global_ip(parse_numeric_id(id)?).await?;

        if let Some(address) = record.address() {
            if IpVersion::of_address(address) != spec.version {
                return Err(SoftLayerError::InvalidConfig(format!(
                    "global IP {} is {}; the IP version cannot change",
                    id, address
                )));
            }
        }

        self.apply_route(&record, spec.routes_to.as_deref()).await?;
        let record = self.api.get_global_ip(record.id).await?;
        Ok(Self::to_state(&record))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let Some(record) = absent_on_not_found(self.api.get_global_ip(parse_numeric_id(id)?).await)?
        else {
            tracing::info!("Global IP {} already gone", id);
            return Ok(());
        };

        let billing_item = record.billing_item.ok_or_else(|| {
            SoftLayerError::NotFound(format!("billing item of global IP {}", id))
        })?;
        let done = self.api.cancel_billing_item(billing_item.id).await?;
        accepted(done, "cancel billing item", billing_item.id.to_string())?;

        tracing::info!("Cancelled global IP {}", id);
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.read(id).await?.is_some())
    }
}
