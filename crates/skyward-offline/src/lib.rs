//! Persistent offline fallback cache for gateway responses.
//!
//! Mirrors what a browser service worker does for the web client: keep the
//! last good copy of every response, serve it when the network is gone, and
//! sweep out entries past their max-age on a timer.

pub mod cache;
pub mod control;
pub mod error;
pub mod kind;
pub mod network;
pub mod store;
pub mod sweeper;

pub use cache::{Freshness, OfflineCache, OfflineResponse, ResponseSource};
pub use control::{handle_control, spawn_control_channel, ControlHandle, ControlMessage, ControlReply};
pub use error::OfflineError;
pub use kind::ResourceKind;
pub use network::{HttpNetwork, Network, NetworkResponse};
pub use store::{OfflineAsset, OfflineStore, ResourceMeta};
pub use sweeper::{spawn_sweeper, SweeperHandle, DEFAULT_SWEEP_INTERVAL};
