//! Live load balancer configuration push
//!
//! The load balancer refuses edits while a previous change is still being
//! applied. The whole configuration is therefore re-pushed every tick until
//! one push is accepted. A failed push means "not applied yet", so a push
//! that keeps failing ends in a poll timeout rather than an immediate error.

use crate::client::{SoftLayerApi, VirtualIpAddress};
use crate::error::Result;
use tessera_cloud::{Observation, PollStatus, StateWait, wait_for_state};

async fn push_once(
    api: &dyn SoftLayerApi,
    vip_id: u64,
    config: &VirtualIpAddress,
) -> Result<Observation<()>> {
    match api.edit_virtual_ip(vip_id, config).await {
        Ok(true) => Ok(Observation::complete(())),
        Ok(false) => {
            tracing::warn!("Virtual IP {} did not accept the configuration yet", vip_id);
            Ok(Observation::in_progress(()))
        }
        Err(e) => {
            tracing::warn!("Pushing configuration to virtual IP {} failed, retrying: {}", vip_id, e);
            Ok(Observation::in_progress(()))
        }
    }
}

/// Re-issue `config` on the virtual IP until the push succeeds.
///
/// The pending/target sets and the mutating-retry mode of `wait` are forced;
/// only its timings are used.
pub async fn push_live_configuration(
    api: &dyn SoftLayerApi,
    vip_id: u64,
    config: &VirtualIpAddress,
    wait: &StateWait,
) -> Result<()> {
    let wait = wait
        .clone()
        .pending(&[PollStatus::InProgress])
        .target(&[PollStatus::Complete])
        .mutating_retry();

    wait_for_state(&wait, move || push_once(api, vip_id, config)).await?;
    tracing::info!("Configuration applied to virtual IP {}", vip_id);
    Ok(())
}
