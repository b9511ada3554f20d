//! VPX high-availability pairs
//!
//! Appliance addresses and admin passwords come from the SoftLayer API; the
//! pairing itself is done over Nitro. SoftLayer keeps reporting each
//! appliance's original password, which is what unpairing restores on the
//! secondary.

use super::absent_on_not_found;
use crate::client::{SoftLayerApi, VpxAppliance};
use crate::config::ReconcileConfig;
use crate::error::{Result, SoftLayerError};
use crate::flows::{HA_PEER_ID, HaPairSpec, pair, unpair};
use crate::nitro::AdcConnector;
use async_trait::async_trait;
use std::sync::Arc;
use tessera_cloud::{Resource, ResourceState, ResourceStatus};

pub const RESOURCE_TYPE: &str = "ha-pair";

pub struct HaPairResource {
    api: Arc<dyn SoftLayerApi>,
    connector: Arc<dyn AdcConnector>,
    config: ReconcileConfig,
}

impl HaPairResource {
    pub fn new(
        api: Arc<dyn SoftLayerApi>,
        connector: Arc<dyn AdcConnector>,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            api,
            connector,
            config,
        }
    }

    async fn appliances(&self, primary_id: u64, secondary_id: u64) -> Result<(VpxAppliance, VpxAppliance)> {
        let primary = self.api.get_vpx(primary_id).await?;
        let secondary = self.api.get_vpx(secondary_id).await?;
        Ok((primary, secondary))
    }

    fn to_state(key: &str, primary: &VpxAppliance, secondary: &VpxAppliance) -> ResourceState {
        ResourceState::new(key, RESOURCE_TYPE)
            .with_status(ResourceStatus::Active)
            .with_attribute("primary_address", &primary.management_ip_address)
            .with_attribute("secondary_address", &secondary.management_ip_address)
    }
}

#[async_trait]
impl Resource for HaPairResource {
    type Spec = HaPairSpec;
    type Error = SoftLayerError;

    fn resource_type(&self) -> &'static str {
        RESOURCE_TYPE
    }

    async fn create(&self, spec: &HaPairSpec) -> Result<ResourceState> {
        let key = spec.key();
        HaPairSpec::parse_key(&key)?;
        let (primary, secondary) = self.appliances(spec.primary_id, spec.secondary_id).await?;

        let shared_password = primary.admin_password()?;
        let primary_node = self
            .connector
            .connect(&primary.management_ip_address, shared_password);
        let secondary_node = self
            .connector
            .connect(&secondary.management_ip_address, secondary.admin_password()?);

        pair(
            primary_node.as_ref(),
            secondary_node.as_ref(),
            shared_password,
            spec.stay_secondary,
            self.config.ha_settle_delay(),
        )
        .await?;

        Ok(Self::to_state(&key, &primary, &secondary)
            .with_attribute("stay_secondary", spec.stay_secondary))
    }

    async fn read(&self, id: &str) -> Result<Option<ResourceState>> {
        let (primary_id, secondary_id) = HaPairSpec::parse_key(id)?;
        let Some(primary) = absent_on_not_found(self.api.get_vpx(primary_id).await)? else {
            return Ok(None);
        };
        let Some(secondary) = absent_on_not_found(self.api.get_vpx(secondary_id).await)? else {
            return Ok(None);
        };

        let node = self
            .connector
            .connect(&primary.management_ip_address, primary.admin_password()?);
        match node.ha_peer(HA_PEER_ID).await? {
            Some(peer) if peer.address == secondary.management_ip_address => {
                Ok(Some(Self::to_state(id, &primary, &secondary)))
            }
            Some(peer) => {
                tracing::warn!(
                    "Appliance {} is paired with {}, not {}",
                    primary.management_ip_address,
                    peer.address,
                    secondary.management_ip_address
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn update(&self, id: &str, spec: &HaPairSpec) -> Result<ResourceState> {
        if spec.key() != id {
            return Err(SoftLayerError::InvalidConfig(format!(
                "HA pair {} cannot change members to {}",
                id,
                spec.key()
            )));
        }

        let (primary, secondary) = self.appliances(spec.primary_id, spec.secondary_id).await?;
        // The secondary answers to the primary's password while paired.
        let node = self
            .connector
            .connect(&secondary.management_ip_address, primary.admin_password()?);
        node.set_stay_secondary(spec.stay_secondary).await?;

        Ok(Self::to_state(id, &primary, &secondary)
            .with_attribute("stay_secondary", spec.stay_secondary))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let (primary_id, secondary_id) = HaPairSpec::parse_key(id)?;
        let primary = absent_on_not_found(self.api.get_vpx(primary_id).await)?;
        let secondary = absent_on_not_found(self.api.get_vpx(secondary_id).await)?;
        let (Some(primary), Some(secondary)) = (primary, secondary) else {
            tracing::info!("HA pair {} already gone", id);
            return Ok(());
        };

        let shared_password = primary.admin_password()?;
        let primary_node = self
            .connector
            .connect(&primary.management_ip_address, shared_password);
        let secondary_node = self
            .connector
            .connect(&secondary.management_ip_address, shared_password);

        unpair(
            primary_node.as_ref(),
            secondary_node.as_ref(),
            id,
            secondary.admin_password()?,
        )
        .await
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.read(id).await?.is_some())
    }
}
