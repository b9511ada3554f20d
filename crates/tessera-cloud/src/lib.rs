//! Tessera reconciliation core
//!
//! Provider-neutral building blocks for declaratively managed cloud objects
//! whose creation is asynchronous on the remote side.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │         tessera-cloud-softlayer resources          │
//! │  global IP · LB service · DNS · firewall · HA     │
//! └───────┬──────────────────────┬───────────────────┘
//!         │ flows                │ persist
//! ┌───────▼──────────┐   ┌───────▼──────────┐
//! │  poller          │   │  state           │
//! │  wait_for_state  │   │  StateManager    │
//! └──────────────────┘   └──────────────────┘
//! ```
//!
//! A resource entry point submits a remote operation, hands a probe to
//! [`wait_for_state`], and records the discovered identifier in
//! [`GlobalState`].

pub mod error;
pub mod poller;
pub mod resource;
pub mod state;

pub use error::{CloudError, Result};
pub use poller::{Observation, PollStatus, ProbeMode, StateWait, wait_for_state};
pub use resource::{Resource, ResourceError, ensure};
pub use state::{
    GlobalState, ResourceState, ResourceStatus, StateLock, StateManager, parse_numeric_id,
    state_key,
};
