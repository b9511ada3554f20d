//! Load balancer virtual servers
//!
//! One resource is the virtual server listening on a port of a virtual IP,
//! with a single service group. The id is `vip_id:port`.

use super::{absent_on_not_found, accepted};
use crate::client::{
    GroupReference, HealthCheck, LbService, ServiceGroup, SoftLayerApi, VirtualIpAddress,
    VirtualServer,
};
use crate::config::ReconcileConfig;
use crate::error::{Result, SoftLayerError};
use crate::flows::push_live_configuration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_cloud::{CloudError, Resource, ResourceState, ResourceStatus};

pub const RESOURCE_TYPE: &str = "lb-service";

/// One backend of the service group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbServiceMember {
    pub ip_address_id: u64,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
    pub health_check_type_id: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_weight() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbServiceSpec {
    pub vip_id: u64,
    pub port: u16,
    /// Share of the virtual IP's connections, in percent
    pub allocation: u32,
    pub routing_method_id: u64,
    pub routing_type_id: u64,
    pub services: Vec<LbServiceMember>,
}

impl LbServiceSpec {
    pub fn key(&self) -> String {
        format!("{}:{}", self.vip_id, self.port)
    }

    fn validate(&self) -> Result<()> {
        if self.allocation == 0 || self.allocation > 100 {
            return Err(SoftLayerError::InvalidConfig(format!(
                "allocation must be within 1..=100, got {}",
                self.allocation
            )));
        }
        Ok(())
    }
}

fn parse_key(key: &str) -> Result<(u64, u16)> {
    let invalid = || CloudError::InvalidId(format!("'{}' is not a vip:port pair", key));
    let (vip, port) = key.split_once(':').ok_or_else(invalid)?;
    let vip = vip.parse().map_err(|_| invalid())?;
    let port = port.parse().map_err(|_| invalid())?;
    Ok((vip, port))
}

pub struct LoadBalancerServiceResource {
    api: Arc<dyn SoftLayerApi>,
    config: ReconcileConfig,
}

impl LoadBalancerServiceResource {
    pub fn new(api: Arc<dyn SoftLayerApi>, config: ReconcileConfig) -> Self {
        Self { api, config }
    }

    /// Build the virtual server for `spec`, keeping ids already assigned remotely.
    fn desired_server(spec: &LbServiceSpec, current: Option<&VirtualServer>) -> VirtualServer {
        let current_group = current.and_then(|s| s.service_groups.first());

        let services = spec
            .services
            .iter()
            .map(|member| {
                let id = current_group.and_then(|g| {
                    g.services
                        .iter()
                        .find(|s| s.ip_address_id == member.ip_address_id && s.port == member.port)
                        .and_then(|s| s.id)
                });
                LbService {
                    id,
                    ip_address_id: member.ip_address_id,
                    port: member.port,
                    enabled: u8::from(member.enabled),
                    health_checks: vec![HealthCheck {
                        health_check_type_id: member.health_check_type_id,
                    }],
                    group_references: vec![GroupReference {
                        weight: member.weight,
                    }],
                }
            })
            .collect();

        VirtualServer {
            id: current.and_then(|s| s.id),
            port: spec.port,
            allocation: spec.allocation,
            service_groups: vec![ServiceGroup {
                id: current_group.and_then(|g| g.id),
                routing_method_id: spec.routing_method_id,
                routing_type_id: spec.routing_type_id,
                services,
            }],
        }
    }

    async fn push(&self, spec: &LbServiceSpec) -> Result<ResourceState> {
        spec.validate()?;
        let vip = self.api.get_virtual_ip(spec.vip_id).await?;
        let current = vip.virtual_servers.iter().find(|s| s.port == spec.port);

        let config = VirtualIpAddress {
            id: vip.id,
            virtual_servers: vec![Self::desired_server(spec, current)],
        };
        push_live_configuration(
            self.api.as_ref(),
            vip.id,
            &config,
            &self.config.live_push_wait(),
        )
        .await?;

        let key = spec.key();
        self.read(&key)
            .await?
            .ok_or_else(|| SoftLayerError::NotFound(format!("virtual server {}", key)))
    }

    fn to_state(key: &str, server: &VirtualServer) -> ResourceState {
        let mut state =
            ResourceState::new(key, RESOURCE_TYPE).with_status(ResourceStatus::Active);
        if let Some(id) = server.id {
            state.set_attribute("virtual_server_id", id);
        }
        state.set_attribute("allocation", server.allocation);
        if let Some(group) = server.service_groups.first() {
            if let Some(id) = group.id {
                state.set_attribute("service_group_id", id);
            }
            state.set_attribute("services", group.services.len());
        }
        state
    }
}

#[async_trait]
impl Resource for LoadBalancerServiceResource {
    type Spec = LbServiceSpec;
    type Error = SoftLayerError;

    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, spec: &LbServiceSpec) -> Result<ResourceState> {
        tracing::info!("Creating virtual server {}", spec.key());
        self.push(spec).await
    }

    async fn read(&self, id: &str) -> Result<Option<ResourceState>> {
        let (vip_id, port) = parse_key(id)?;
        let Some(vip) = absent_on_not_found(self.api.get_virtual_ip(vip_id).await)? else {
            return Ok(None);
        };
        Ok(vip
            .virtual_servers
            .iter()
            .find(|s| s.port == port)
            .map(|server| Self::to_state(id, server)))
    }

    async fn update(&self, id: &str, spec: &LbServiceSpec) -> Result<ResourceState> {
        if spec.key() != id {
            return Err(SoftLayerError::InvalidConfig(format!(
                "virtual server {} cannot move to {}",
                id,
                spec.key()
            )));
        }
        self.push(spec).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let (vip_id, port) = parse_key(id)?;
        let Some(vip) = absent_on_not_found(self.api.get_virtual_ip(vip_id).await)? else {
            return Ok(());
        };

        match vip.virtual_servers.iter().find(|s| s.port == port) {
            Some(VirtualServer {
                id: Some(server_id),
                ..
            }) => {
                let done = self.api.delete_virtual_server(*server_id).await?;
                accepted(done, "delete virtual server", id)?;
                tracing::info!("Deleted virtual server {}", id);
            }
            Some(_) => {
                tracing::warn!("Virtual server {} has no remote id yet, nothing to delete", id);
            }
            None => tracing::info!("Virtual server {} already gone", id),
        }
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.read(id).await?.is_some())
    }
}
