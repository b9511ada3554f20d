//! Dedicated firewall rule sets
//!
//! The rule set is always replaced as a whole through an update request,
//! which the device applies asynchronously.

use super::absent_on_not_found;
use crate::client::{FirewallRule, SoftLayerApi};
use crate::config::ReconcileConfig;
use crate::error::{Result, SoftLayerError};
use crate::flows::wait_for_firewall_update;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tessera_cloud::{Resource, ResourceState, ResourceStatus, parse_numeric_id};

pub const RESOURCE_TYPE: &str = "firewall-rules";

const ACTIONS: &[&str] = &["permit", "deny"];
const PROTOCOLS: &[&str] = &["tcp", "udp", "icmp", "gre", "pptp", "ah", "esp"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirewallSpec {
    pub firewall_id: u64,
    pub rules: Vec<FirewallRule>,
}

/// Check actions, protocols, port ranges and rule ordering before submitting.
pub fn validate_rules(rules: &[FirewallRule]) -> Result<()> {
    let mut orders = HashSet::new();

    for rule in rules {
        let at = rule.order_value;
        if !ACTIONS.contains(&rule.action.as_str()) {
            return Err(SoftLayerError::InvalidRule(format!(
                "rule {}: action must be one of {:?}, got '{}'",
                at, ACTIONS, rule.action
            )));
        }
        if !PROTOCOLS.contains(&rule.protocol.as_str()) {
            return Err(SoftLayerError::InvalidRule(format!(
                "rule {}: unsupported protocol '{}'",
                at, rule.protocol
            )));
        }
        if !orders.insert(rule.order_value) {
            return Err(SoftLayerError::InvalidRule(format!(
                "order value {} is used more than once",
                at
            )));
        }

        let ports = (
            rule.destination_port_range_start,
            rule.destination_port_range_end,
        );
        match ports {
            (None, None) => {}
            (Some(start), Some(end)) => {
                if !matches!(rule.protocol.as_str(), "tcp" | "udp") {
                    return Err(SoftLayerError::InvalidRule(format!(
                        "rule {}: port ranges only apply to tcp and udp",
                        at
                    )));
                }
                if start == 0 || start > end {
                    return Err(SoftLayerError::InvalidRule(format!(
                        "rule {}: invalid port range {}-{}",
                        at, start, end
                    )));
                }
            }
            _ => {
                return Err(SoftLayerError::InvalidRule(format!(
                    "rule {}: a port range needs both a start and an end",
                    at
                )));
            }
        }
    }

    Ok(())
}

/// Rule set left behind on delete: everything allowed
fn permit_all() -> Vec<FirewallRule> {
    ["tcp", "udp", "icmp"]
        .iter()
        .enumerate()
        .map(|(i, protocol)| {
            let ports = matches!(*protocol, "tcp" | "udp");
            FirewallRule {
                order_value: i as u32 + 1,
                action: "permit".to_string(),
                source_ip_address: "any".to_string(),
                source_ip_cidr: 0,
                destination_ip_address: "any".to_string(),
                destination_ip_cidr: 0,
                destination_port_range_start: ports.then_some(1),
                destination_port_range_end: ports.then_some(65535),
                protocol: protocol.to_string(),
                notes: None,
            }
        })
        .collect()
}

pub struct FirewallRulesResource {
    api: Arc<dyn SoftLayerApi>,
    config: ReconcileConfig,
}

impl FirewallRulesResource {
    pub fn new(api: Arc<dyn SoftLayerApi>, config: ReconcileConfig) -> Self {
        Self { api, config }
    }

    async fn replace_rules(&self, firewall_id: u64, rules: &[FirewallRule]) -> Result<()> {
        let request = self.api.submit_firewall_update(firewall_id, rules).await?;
        tracing::info!(
            "Submitted {} rules to firewall {} (request {})",
            rules.len(),
            firewall_id,
            request.id
        );
        wait_for_firewall_update(self.api.as_ref(), request.id, &self.config.firewall_wait()).await
    }

    async fn apply(&self, spec: &FirewallSpec) -> Result<ResourceState> {
        validate_rules(&spec.rules)?;
        let mut rules = spec.rules.clone();
        rules.sort_by_key(|r| r.order_value);

        self.replace_rules(spec.firewall_id, &rules).await?;

        let id = spec.firewall_id.to_string();
        self.read(&id)
            .await?
            .ok_or_else(|| SoftLayerError::NotFound(format!("firewall {}", id)))
    }
}

#[async_trait]
impl Resource for FirewallRulesResource {
    type Spec = FirewallSpec;
    type Error = SoftLayerError;

    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, spec: &FirewallSpec) -> Result<ResourceState> {
        self.apply(spec).await
    }

    async fn read(&self, id: &str) -> Result<Option<ResourceState>> {
        let firewall_id = parse_numeric_id(id)?;
        let rules = absent_on_not_found(self.api.get_firewall_rules(firewall_id).await)?;
        Ok(rules.map(|rules| {
            ResourceState::new(id, RESOURCE_TYPE)
                .with_status(ResourceStatus::Active)
                .with_attribute("rules", rules)
        }))
    }

    async fn update(&self, id: &str, spec: &FirewallSpec) -> Result<ResourceState> {
        if parse_numeric_id(id)? != spec.firewall_id {
            return Err(SoftLayerError::InvalidConfig(format!(
                "rule set {} cannot move to firewall {}",
                id, spec.firewall_id
            )));
        }
        self.apply(spec).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let firewall_id = parse_numeric_id(id)?;
        if !self.exists(id).await? {
            return Ok(());
        }
        self.replace_rules(firewall_id, &permit_all()).await
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.read(id).await?.is_some())
    }
}
