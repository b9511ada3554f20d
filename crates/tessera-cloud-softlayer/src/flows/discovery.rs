//! Order → object discovery
//!
//! An order does not return the object it creates. The account is queried
//! until exactly one matching record shows up with its attribute populated.

use crate::client::{GlobalIpRecord, SoftLayerApi};
use crate::error::{Result, SoftLayerError};
use std::future::Future;
use tessera_cloud::{CloudError, Observation, StateWait, wait_for_state};

/// Classify one lookup result.
///
/// - 0 records: pending
/// - 1 record that is not ready yet: pending, carrying the record
/// - 1 ready record: complete
/// - more than 1 record: fatal ambiguity
fn classify<T>(
    mut records: Vec<T>,
    what: &str,
    filter: &str,
    is_ready: &impl Fn(&T) -> bool,
) -> Result<Observation<Option<T>>> {
    match records.len() {
        0 => Ok(Observation::pending(None)),
        1 => {
            let record = records.remove(0);
            if is_ready(&record) {
                Ok(Observation::complete(Some(record)))
            } else {
                Ok(Observation::pending(Some(record)))
            }
        }
        count => Err(SoftLayerError::AmbiguousMatch {
            what: what.to_string(),
            filter: filter.to_string(),
            count,
        }),
    }
}

/// Poll `lookup` until it yields exactly one record satisfying `is_ready`.
pub async fn wait_for_discovery<T, F, Fut, R>(
    wait: &StateWait,
    what: &str,
    filter: &str,
    mut lookup: F,
    is_ready: R,
) -> Result<T>
where
    T: std::fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
    R: Fn(&T) -> bool,
{
    let is_ready = &is_ready;
    let found = wait_for_state(wait, move || {
        let records = lookup();
        async move {
            match records.await {
                Ok(records) => classify(records, what, filter, is_ready),
                Err(e) => Err(e),
            }
        }
    })
    .await?;

    // A complete observation always carries the record; guard anyway.
    found.ok_or_else(|| {
        CloudError::MissingValue {
            operation: wait.operation.clone(),
        }
        .into()
    })
}

/// Wait for the global IP created by `order_id` to receive its address.
pub async fn wait_for_global_ip_order(
    api: &dyn SoftLayerApi,
    order_id: u64,
    wait: &StateWait,
) -> Result<GlobalIpRecord> {
    let filter = format!("order {}", order_id);
    let record = wait_for_discovery(
        wait,
        "global IP",
        &filter,
        move || api.find_global_ips_by_order(order_id),
        |record: &GlobalIpRecord| record.address().is_some(),
    )
    .await?;

    tracing::info!(
        "Order {} produced global IP {} ({})",
        order_id,
        record.id,
        record.address().unwrap_or_default()
    );
    Ok(record)
}
