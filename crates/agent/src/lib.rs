//! Offline-first caching agent for offcache.
//!
//! This crate provides the fetch interceptor (cache-first with network
//! fallback), the install/activate lifecycle, and the control channel a
//! hosting application uses to drive the agent.

pub mod agent;
pub mod clients;
pub mod control;
pub mod interceptor;
pub mod lifecycle;
pub mod net;
pub mod request;

#[cfg(test)]
pub(crate) mod testutil;

pub use agent::{Agent, AgentEvent};
pub use clients::ClientRegistry;
pub use control::Command;
pub use interceptor::Interceptor;
pub use lifecycle::{Lifecycle, LifecycleState};
pub use net::{HttpNetwork, NetResponse, Network};
pub use request::{AgentResponse, Decision, Destination, InterceptRequest, ResponseSource};
