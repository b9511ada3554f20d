//! Routing-change completion
//!
//! Routing a global IP starts a transaction on it. The change is done once
//! no transaction is active; which transaction it is does not matter.

use crate::client::SoftLayerApi;
use crate::error::Result;
use tessera_cloud::{Observation, StateWait, wait_for_state};

async fn probe_transaction(api: &dyn SoftLayerApi, global_ip_id: u64) -> Result<Observation<()>> {
    match api.get_active_transaction(global_ip_id).await? {
        Some(transaction) => {
            tracing::debug!(
                "Global IP {} has active transaction {}",
                global_ip_id,
                transaction.id
            );
            Ok(Observation::pending(()))
        }
        None => Ok(Observation::complete(())),
    }
}

/// Wait until no transaction is active on the global IP.
pub async fn wait_for_routing_change(
    api: &dyn SoftLayerApi,
    global_ip_id: u64,
    wait: &StateWait,
) -> Result<()> {
    wait_for_state(wait, move || probe_transaction(api, global_ip_id)).await?;
    tracing::info!("Routing change on global IP {} finished", global_ip_id);
    Ok(())
}
