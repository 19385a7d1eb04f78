//! Capability registry
//!
//! Maps command names to async handlers and turns handler outcomes into
//! response envelopes. A failing handler never takes the registry down.

use super::protocol::{AgentRequest, AgentResponse};
use crate::error::AgentError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

pub type HandlerResult = Result<Value, AgentError>;

/// A named operation an agent exposes
#[async_trait]
pub trait Capability: Send + Sync {
    async fn call(&self, args: Vec<String>) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> Capability for F
where
    F: Fn(Vec<String>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn call(&self, args: Vec<String>) -> HandlerResult {
        (self)(args).await
    }
}

/// Bind a shared agent to a handler function
pub fn bind<T, F, Fut>(target: Arc<T>, f: F) -> impl Capability
where
    T: Send + Sync + 'static,
    F: Fn(Arc<T>, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    move |args: Vec<String>| f(Arc::clone(&target), args)
}

/// Command table for one agent
pub struct CapabilityRegistry {
    agent: String,
    handlers: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilityRegistry {
    pub fn new(agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            handlers: BTreeMap::new(),
        }
    }

    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Register a handler, replacing any previous one with the same name
    pub fn register<C>(&mut self, command: &str, handler: C)
    where
        C: Capability + 'static,
    {
        if self
            .handlers
            .insert(command.to_string(), Arc::new(handler))
            .is_some()
        {
            debug!("{}: replaced handler for '{}'", self.agent, command);
        }
    }

    /// Registered command names, sorted
    pub fn commands(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Find the handler for a command.
    ///
    /// `server tool arg...` resolves to `server.tool` when the bare command
    /// is unknown, with the tool name removed from the arguments.
    fn resolve(&self, command: &str, args: &[String]) -> Option<(Arc<dyn Capability>, Vec<String>)> {
        if let Some(handler) = self.handlers.get(command) {
            return Some((Arc::clone(handler), args.to_vec()));
        }

        let tool = args.first()?;
        let namespaced = format!("{}.{}", command, tool);
        self.handlers
            .get(&namespaced)
            .map(|handler| (Arc::clone(handler), args[1..].to_vec()))
    }

    /// Run one request and build its response envelope
    pub async fn dispatch(&self, request: AgentRequest) -> AgentResponse {
        let AgentRequest { id, command, args } = request;

        let Some((handler, args)) = self.resolve(&command, &args) else {
            let err = AgentError::UnknownCommand(command.clone());
            return AgentResponse::error(
                id,
                err.code(),
                &err.to_string(),
                Some(format!("Available commands: {}", self.commands().join(", "))),
            );
        };

        // Handlers run on their own task so a panic is contained to this request
        let outcome = tokio::spawn(async move { handler.call(args).await }).await;

        match outcome {
            Ok(Ok(result)) => AgentResponse::success(id, result),
            Ok(Err(err)) => {
                debug!("{}: '{}' failed: {}", self.agent, command, err);
                AgentResponse::error(id, err.code(), &err.to_string(), None)
            }
            Err(join_err) => {
                warn!("{}: handler for '{}' panicked", self.agent, command);
                AgentResponse::error(
                    id,
                    "internal",
                    &format!("Handler for '{}' crashed", command),
                    Some(join_err.to_string()),
                )
            }
        }
    }
}

/// First argument or a missing-argument error
pub fn required_arg<'a>(args: &'a [String], name: &str) -> Result<&'a str, AgentError> {
    args.first()
        .map(String::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AgentError::MissingArgument(name.to_string()))
}
