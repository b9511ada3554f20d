//! Product catalog resolution and order construction
//!
//! Before anything billable can be ordered, the exact price id for the
//! requested capability has to be located in the product catalog.

use crate::client::{ProductItem, SoftLayerApi};
use crate::error::{Result, SoftLayerError};
use serde::Serialize;

/// Package types offering global IP addresses, in preference order
pub const GLOBAL_IP_PACKAGE_TYPES: &[&str] =
    &["ADDITIONAL_SERVICES_GLOBAL_IP_ADDRESSES", "ADDITIONAL_SERVICES"];

const SUBNET_ORDER_TYPE: &str = "SoftLayer_Container_Product_Order_Network_Subnet";

/// What is being ordered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityRequest {
    /// Candidate package types, tried in order
    pub package_types: Vec<String>,
    /// Catalog key name of the item (e.g. `GLOBAL_IPV4`)
    pub key_name: String,
    pub quantity: u32,
}

impl CapabilityRequest {
    pub fn new(key_name: impl Into<String>, package_types: &[&str]) -> Self {
        Self {
            package_types: package_types.iter().map(|t| t.to_string()).collect(),
            key_name: key_name.into(),
            quantity: 1,
        }
    }

    pub fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }
}

/// A catalog item reduced to what an order needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedItem {
    pub key_name: String,
    pub price_id: u64,
}

impl PricedItem {
    /// Prefer the standard price over location-specific ones; items without prices are skipped.
    fn from_item(item: &ProductItem) -> Option<Self> {
        let price = item
            .prices
            .iter()
            .find(|p| p.location_group_id.is_none())
            .or_else(|| item.prices.first())?;
        Some(Self {
            key_name: item.key_name.clone(),
            price_id: price.id,
        })
    }
}

/// An item together with the package it was found in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub package_id: u64,
    pub package_type: String,
    pub item: PricedItem,
}

/// Find the item `key_name` in the package of `package_type`.
pub async fn resolve_item(
    api: &dyn SoftLayerApi,
    key_name: &str,
    package_type: &str,
) -> Result<ResolvedItem> {
    let package = api
        .get_package_by_type(package_type)
        .await
        .map_err(|e| SoftLayerError::CatalogFetch {
            package_type: package_type.to_string(),
            source: Box::new(e),
        })?
        .ok_or_else(|| SoftLayerError::PackageNotFound(package_type.to_string()))?;

    let items = api
        .get_package_items(package.id)
        .await
        .map_err(|e| SoftLayerError::CatalogFetch {
            package_type: package_type.to_string(),
            source: Box::new(e),
        })?;

    let item = items
        .iter()
        .filter(|item| item.key_name == key_name)
        .find_map(PricedItem::from_item)
        .ok_or_else(|| SoftLayerError::NoMatchingItem {
            key_name: key_name.to_string(),
            package_type: package_type.to_string(),
        })?;

    tracing::debug!(
        "Resolved {} to price {} in package {} ({})",
        key_name,
        item.price_id,
        package.id,
        package_type
    );

    Ok(ResolvedItem {
        package_id: package.id,
        package_type: package_type.to_string(),
        item,
    })
}

/// Try each candidate package type in turn; the first success wins.
///
/// Errors from earlier candidates are dropped; only the last one surfaces
/// once every candidate has failed.
pub async fn resolve_with_fallback(
    api: &dyn SoftLayerApi,
    request: &CapabilityRequest,
) -> Result<ResolvedItem> {
    let mut last_error = None;

    for package_type in &request.package_types {
        match resolve_item(api, &request.key_name, package_type).await {
            Ok(resolved) => return Ok(resolved),
            Err(e) => {
                tracing::debug!(
                    "{} not resolvable in {}: {}",
                    request.key_name,
                    package_type,
                    e
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SoftLayerError::NoCandidatePackages(request.key_name.clone())))
}

/// Reference to a catalog price inside an order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PriceRef {
    pub id: u64,
}

/// Order container submitted to `SoftLayer_Product_Order::placeOrder`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPayload {
    pub complex_type: String,
    pub package_id: u64,
    pub prices: Vec<PriceRef>,
    pub quantity: u32,
    /// Nested descriptor of where the ordered object should route
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_ip_address: Option<String>,
}

impl OrderPayload {
    pub fn new(resolved: &ResolvedItem, quantity: u32) -> Self {
        Self {
            complex_type: SUBNET_ORDER_TYPE.to_string(),
            package_id: resolved.package_id,
            prices: vec![PriceRef {
                id: resolved.item.price_id,
            }],
            quantity,
            endpoint_ip_address: None,
        }
    }

    pub fn with_routing_target(mut self, ip_address: impl Into<String>) -> Self {
        self.endpoint_ip_address = Some(ip_address.into());
        self
    }
}

/// Submit an order; an API refusal becomes [`SoftLayerError::OrderRejected`].
pub async fn submit_order(api: &dyn SoftLayerApi, order: &OrderPayload) -> Result<u64> {
    let receipt = api.place_order(order).await.map_err(|e| match e {
        SoftLayerError::Api { message, .. } => SoftLayerError::OrderRejected(message),
        other => other,
    })?;

    tracing::info!(
        "Placed order {} for package {} (prices {:?})",
        receipt.order_id,
        order.package_id,
        order.prices.iter().map(|p| p.id).collect::<Vec<_>>()
    );
    Ok(receipt.order_id)
}
