//! SoftLayer (IBM Cloud classic) provider for Tessera
//!
//! Provisioning on SoftLayer is asynchronous almost everywhere: an order
//! does not return the object it creates, a routing change runs as a
//! transaction, the load balancer rejects edits while a previous change is
//! being applied, and firewall updates are queued requests. This crate
//! resolves catalog items into orders and drives each of those operations to
//! completion with the poller from `tessera-cloud`.
//!
//! # Layout
//!
//! - [`catalog`]: product package/item resolution and order submission
//! - [`flows`]: order discovery, routing, live LB push, firewall apply, HA pairing
//! - [`resources`]: declarative resources built on the flows
//! - [`client`]: the [`SoftLayerApi`] trait and its REST implementation
//! - [`nitro`]: NetScaler VPX appliance access for HA pairing
//!
//! # Requirements
//!
//! `SOFTLAYER_USERNAME` and `SOFTLAYER_API_KEY` must be set.
//! `SOFTLAYER_ENDPOINT_URL` overrides the REST endpoint.
//!
//! # Example
//!
//! ```ignore
//! use tessera_cloud::Resource;
//! use tessera_cloud_softlayer::{GlobalIpSpec, IpVersion, ReconcileConfig, SoftLayerProvider};
//!
//! let provider = SoftLayerProvider::from_env(ReconcileConfig::default())?;
//!
//! let state = provider
//!     .global_ips()
//!     .create(&GlobalIpSpec {
//!         version: IpVersion::V4,
//!         routes_to: Some("10.120.4.7".to_string()),
//!     })
//!     .await?;
//! println!("global IP {} = {:?}", state.id, state.attributes.get("ip_address"));
//! ```

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod flows;
pub mod nitro;
pub mod provider;
pub mod resources;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{
    CapabilityRequest, GLOBAL_IP_PACKAGE_TYPES, OrderPayload, PricedItem, ResolvedItem,
    resolve_item, resolve_with_fallback, submit_order,
};
pub use client::{SoftLayerApi, SoftLayerClient};
pub use config::{ApiConfig, ReconcileConfig};
pub use error::{Result, SoftLayerError};
pub use flows::{
    HA_PEER_ID, HaPairSpec, pair, push_live_configuration, unpair,
    wait_for_discovery, wait_for_firewall_update, wait_for_global_ip_order,
    wait_for_routing_change,
};
pub use nitro::{AdcConnector, AdcNode, NitroClient, NitroConnector};
pub use provider::{PROVIDER_NAME, SoftLayerProvider, apply, destroy, refresh};
pub use resources::{
    DnsZoneResource, DnsZoneSpec, FirewallRulesResource, FirewallSpec, GlobalIpResource,
    GlobalIpSpec, HaPairResource, IpVersion, LbServiceMember, LbServiceSpec,
    LoadBalancerServiceResource,
};
