//! Asynchronous reconciliation flows
//!
//! Each flow is a thin configuration of [`tessera_cloud::wait_for_state`],
//! except the HA choreography which runs fixed sequential steps.

pub mod discovery;
pub mod firewall;
pub mod ha;
pub mod live_config;
pub mod routing;

pub use discovery::{wait_for_discovery, wait_for_global_ip_order};
pub use firewall::wait_for_firewall_update;
pub use ha::{HA_PEER_ID, HaPairSpec, pair, unpair};
pub use live_config::push_live_configuration;
pub use routing::wait_for_routing_change;
