//! Firewall update request completion

use crate::client::SoftLayerApi;
use crate::error::Result;
use tessera_cloud::{Observation, StateWait, wait_for_state};

async fn probe_update(api: &dyn SoftLayerApi, request_id: u64) -> Result<Observation<()>> {
    let request = api.get_firewall_update(request_id).await?;
    if request.apply_date.is_some() {
        Ok(Observation::complete(()))
    } else {
        Ok(Observation::pending(()))
    }
}

/// Wait until the update request has been applied to the device.
pub async fn wait_for_firewall_update(
    api: &dyn SoftLayerApi,
    request_id: u64,
    wait: &StateWait,
) -> Result<()> {
    wait_for_state(wait, move || probe_update(api, request_id)).await?;
    tracing::info!("Firewall update request {} applied", request_id);
    Ok(())
}
