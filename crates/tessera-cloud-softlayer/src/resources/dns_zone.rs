//! DNS zones
//!
//! The zone name is fixed at creation. Beyond the zone itself only the
//! apex A record is managed.

use super::{absent_on_not_found, accepted};
use crate::client::{DnsDomain, DnsResourceRecord, SoftLayerApi};
use crate::error::{Result, SoftLayerError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tessera_cloud::{Resource, ResourceState, ResourceStatus, parse_numeric_id};

pub const RESOURCE_TYPE: &str = "dns-zone";

const DEFAULT_TTL: u32 = 900;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsZoneSpec {
    pub name: String,
    /// Address of the apex A record
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_ttl() -> u32 {
    DEFAULT_TTL
}

pub struct DnsZoneResource {
    api: Arc<dyn SoftLayerApi>,
}

impl DnsZoneResource {
    pub fn new(api: Arc<dyn SoftLayerApi>) -> Self {
        Self { api }
    }

    fn to_state(domain: &DnsDomain) -> Result<ResourceState> {
        let id = domain
            .id
            .ok_or_else(|| SoftLayerError::NotFound(format!("id of domain {}", domain.name)))?;
        let mut state = ResourceState::new(id.to_string(), RESOURCE_TYPE)
            .with_status(ResourceStatus::Active)
            .with_attribute("name", &domain.name);
        if let Some(serial) = domain.serial {
            state.set_attribute("serial", serial);
        }
        if let Some(apex) = domain.resource_records.iter().find(|r| r.is_apex_a()) {
            state.set_attribute("target", &apex.data);
            state.set_attribute("ttl", apex.ttl);
        }
        Ok(state)
    }
}

#[async_trait]
impl Resource for DnsZoneResource {
    type Spec = DnsZoneSpec;
    type Error = SoftLayerError;

    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, spec: &DnsZoneSpec) -> Result<ResourceState> {
        let domain = DnsDomain {
            id: None,
            name: spec.name.clone(),
            serial: None,
            resource_records: spec
                .target
                .iter()
                .map(|target| DnsResourceRecord::apex_a(target.as_str(), spec.ttl))
                .collect(),
        };

        let created = self.api.create_domain(&domain).await?;
        tracing::info!("Created DNS zone {} ({:?})", created.name, created.id);
        Self::to_state(&created)
    }

    async fn read(&self, id: &str) -> Result<Option<ResourceState>> {
        let id = parse_numeric_id(id)?;
        match absent_on_not_found(self.api.get_domain(id).await)? {
            Some(domain) => Ok(Some(Self::to_state(&domain)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, id: &str, spec: &DnsZoneSpec) -> Result<ResourceState> {
        let domain_id = parse_numeric_id(id)?;
        let domain = self.api.get_domain(domain_id).await?;
        if !domain.name.eq_ignore_ascii_case(&spec.name) {
            return Err(SoftLayerError::InvalidConfig(format!(
                "DNS zone {} is {}; the zone name cannot change to {}",
                id, domain.name, spec.name
            )));
        }

        let apex = domain.resource_records.iter().find(|r| r.is_apex_a());
        match (apex, &spec.target) {
            (Some(record), Some(target)) if record.data != *target || record.ttl != spec.ttl => {
                let edited = DnsResourceRecord {
                    data: target.clone(),
                    ttl: spec.ttl,
                    ..record.clone()
                };
                let done = self.api.edit_resource_record(&edited).await?;
                accepted(done, "edit apex record of zone", &domain.name)?;
            }
            (None, Some(target)) => {
                let record = DnsResourceRecord {
                    domain_id: Some(domain_id),
                    ..DnsResourceRecord::apex_a(target.as_str(), spec.ttl)
                };
                self.api.create_resource_record(&record).await?;
            }
            (Some(_), None) => {
                tracing::debug!("Zone {} keeps its unmanaged apex record", domain.name);
            }
            _ => {}
        }

        let domain = self.api.get_domain(domain_id).await?;
        Self::to_state(&domain)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        match absent_on_not_found(self.api.delete_domain(parse_numeric_id(id)?).await)? {
            Some(done) => accepted(done, "delete DNS zone", id),
            None => {
                tracing::info!("DNS zone {} already gone", id);
                Ok(())
            }
        }
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.read(id).await?.is_some())
    }
}
