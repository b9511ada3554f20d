//! VPX high-availability pairing
//!
//! Pairing is a fixed sequence of calls on both appliances rather than a
//! poll. The primary has to finish promoting itself before the secondary
//! registers, and the appliances expose no readiness signal for that, so a
//! settle delay separates the two registrations.

use crate::error::{Result, SoftLayerError};
use crate::nitro::AdcNode;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tessera_cloud::CloudError;

/// Node id under which each appliance registers its peer
pub const HA_PEER_ID: u32 = 2;

/// Desired HA pair; identified by the composite key `primary:secondary`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaPairSpec {
    pub primary_id: u64,
    pub secondary_id: u64,
    /// Keep the secondary from taking over while its peer is healthy
    #[serde(default)]
    pub stay_secondary: bool,
}

impl HaPairSpec {
    pub fn key(&self) -> String {
        format!("{}:{}", self.primary_id, self.secondary_id)
    }

    /// Split a `primary:secondary` key into its two appliance ids
    pub fn parse_key(key: &str) -> Result<(u64, u64)> {
        let invalid = || CloudError::InvalidId(format!("'{}' is not a primary:secondary pair", key));

        let (primary, secondary) = key.split_once(':').ok_or_else(invalid)?;
        let primary = primary.trim().parse::<u64>().map_err(|_| invalid())?;
        let secondary = secondary.trim().parse::<u64>().map_err(|_| invalid())?;
        if primary == secondary {
            return Err(invalid().into());
        }
        Ok((primary, secondary))
    }
}

async fn step<F>(name: &'static str, node: &str, call: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    tracing::info!("HA: {} ({})", name, node);
    call.await.map_err(|e| SoftLayerError::HaStep {
        step: name,
        source: Box::new(e),
    })
}

/// Pair two appliances.
///
/// The secondary takes over the primary's admin password first, so
/// `shared_password` must be the primary's. `settle_delay` separates
/// registering the secondary on the primary from the reverse registration.
pub async fn pair(
    primary: &dyn AdcNode,
    secondary: &dyn AdcNode,
    shared_password: &str,
    stay_secondary: bool,
    settle_delay: Duration,
) -> Result<()> {
    step(
        "sync admin password",
        secondary.address(),
        secondary.change_admin_password(shared_password),
    )
    .await?;

    step(
        "register secondary as peer",
        primary.address(),
        primary.add_ha_peer(HA_PEER_ID, secondary.address()),
    )
    .await?;

    tracing::debug!(
        "Waiting {:?} for {} to settle as primary",
        settle_delay,
        primary.address()
    );
    tokio::time::sleep(settle_delay).await;

    step(
        "register primary as peer",
        secondary.address(),
        secondary.add_ha_peer(HA_PEER_ID, primary.address()),
    )
    .await?;

    if stay_secondary {
        step(
            "set stay-secondary",
            secondary.address(),
            secondary.set_stay_secondary(true),
        )
        .await?;
    }

    step(
        "register rpc node",
        primary.address(),
        primary.set_rpc_node(secondary.address(), shared_password),
    )
    .await?;

    step(
        "register rpc node",
        secondary.address(),
        secondary.set_rpc_node(primary.address(), shared_password),
    )
    .await?;

    step("sync files", primary.address(), primary.sync_ha_files()).await?;

    tracing::info!(
        "Paired {} (primary) with {} (secondary)",
        primary.address(),
        secondary.address()
    );
    Ok(())
}

/// Remove the node's peer registration unless it is already gone
async fn deregister(name: &'static str, node: &dyn AdcNode) -> Result<()> {
    let registered = node
        .ha_peer(HA_PEER_ID)
        .await
        .map_err(|e| SoftLayerError::HaStep {
            step: name,
            source: Box::new(e),
        })?;
    if registered.is_none() {
        tracing::info!("HA: {} already done ({})", name, node.address());
        return Ok(());
    }
    step(name, node.address(), node.remove_ha_peer(HA_PEER_ID)).await
}

/// Dissolve a pair and give the secondary back its own admin password.
///
/// Registrations that are already gone are skipped, so an interrupted unpair
/// can be run again. When both nodes were deregistered but the password could
/// not be restored, the result is [`SoftLayerError::HaUnpairIncomplete`]: the
/// pair is gone but the secondary still answers to the primary's password.
pub async fn unpair(
    primary: &dyn AdcNode,
    secondary: &dyn AdcNode,
    pair_key: &str,
    original_secondary_password: &str,
) -> Result<()> {
    deregister("deregister primary", secondary).await?;
    deregister("deregister secondary", primary).await?;

    if let Err(e) = secondary
        .change_admin_password(original_secondary_password)
        .await
    {
        tracing::warn!(
            "HA pair {} removed but {} kept the shared password: {}",
            pair_key,
            secondary.address(),
            e
        );
        return Err(SoftLayerError::HaUnpairIncomplete {
            pair: pair_key.to_string(),
            restore_error: Box::new(e),
        });
    }

    tracing::info!("Unpaired HA pair {}", pair_key);
    Ok(())
}
