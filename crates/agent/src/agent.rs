//! The agent: lifecycle, interception, and control wired together.
//!
//! `Agent` can be driven directly by an embedding host, or through an
//! event channel via [`Agent::run`] for hosts that want each event to be
//! an independent message. All durable state lives in the store; the
//! agent itself can be dropped and rebuilt between events.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use offcache_core::{AppConfig, CacheStore, Error};

use crate::clients::ClientRegistry;
use crate::control::Command;
use crate::interceptor::Interceptor;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::net::Network;
use crate::request::{Decision, InterceptRequest};

/// Events the hosting application can send to a running agent.
#[derive(Debug)]
pub enum AgentEvent {
    Install { done: Option<oneshot::Sender<Result<(), Error>>> },
    Activate { done: Option<oneshot::Sender<Result<(), Error>>> },
    Fetch { request: InterceptRequest, respond_to: oneshot::Sender<Decision> },
    Message(serde_json::Value),
    Shutdown,
}

/// One instance of the offline caching agent.
pub struct Agent {
    lifecycle: Lifecycle,
    interceptor: Interceptor,
    clients: ClientRegistry,
}

impl Agent {
    pub fn new(store: CacheStore, network: Arc<dyn Network>, config: AppConfig) -> Result<Self, Error> {
        let config = Arc::new(config);
        let clients = ClientRegistry::new();
        let interceptor = Interceptor::new(store.clone(), Arc::clone(&network), Arc::clone(&config), clients.clone())?;
        let lifecycle = Lifecycle::new(store, network, config, clients.clone())?;
        Ok(Self { lifecycle, interceptor, clients })
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    pub async fn install(&mut self) -> Result<(), Error> {
        self.lifecycle.install().await
    }

    pub async fn activate(&mut self) -> Result<(), Error> {
        self.lifecycle.activate().await
    }

    pub async fn fetch(&self, request: &InterceptRequest) -> Decision {
        self.interceptor.intercept(request).await
    }

    /// Handle a control message. Unrecognized messages are ignored.
    pub async fn handle_message(&mut self, raw: &serde_json::Value) -> Result<(), Error> {
        match Command::parse(raw) {
            Some(Command::SkipWaiting) => self.lifecycle.skip_waiting().await,
            None => {
                tracing::debug!(message = %raw, "ignoring unrecognized control message");
                Ok(())
            }
        }
    }

    /// Consume events from a channel until `Shutdown` or the channel
    /// closes. Fetches run as independent tasks; lifecycle events run in
    /// order on the agent itself. In-flight cache writes are drained
    /// before returning.
    pub async fn run(mut self, mut events: mpsc::Receiver<AgentEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                AgentEvent::Install { done } => {
                    let result = self.install().await;
                    if let Err(e) = &result {
                        tracing::error!(error = %e, "install failed");
                    }
                    if let Some(tx) = done {
                        let _ = tx.send(result);
                    }
                }
                AgentEvent::Activate { done } => {
                    let result = self.activate().await;
                    if let Err(e) = &result {
                        tracing::error!(error = %e, "activate failed");
                    }
                    if let Some(tx) = done {
                        let _ = tx.send(result);
                    }
                }
                AgentEvent::Fetch { request, respond_to } => {
                    let interceptor = self.interceptor.clone();
                    tokio::spawn(async move {
                        let decision = interceptor.intercept(&request).await;
                        let _ = respond_to.send(decision);
                    });
                }
                AgentEvent::Message(raw) => {
                    if let Err(e) = self.handle_message(&raw).await {
                        tracing::error!(error = %e, "control message handling failed");
                    }
                }
                AgentEvent::Shutdown => break,
            }
        }
        self.interceptor.flush_writes().await;
    }
}
