//! Named hook points
//!
//! Handlers for a hook run one at a time in registration order; each one
//! completes before the next starts. The first failure aborts the run.

use crate::error::PluginError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

/// A handler attached to a named hook
#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn call(&self, args: Vec<Value>) -> Result<Value, PluginError>;
}

#[async_trait]
impl<F, Fut> HookHandler for F
where
    F: Fn(Vec<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, PluginError>> + Send,
{
    async fn call(&self, args: Vec<Value>) -> Result<Value, PluginError> {
        (self)(args).await
    }
}

/// Hook name -> ordered handlers
#[derive(Default)]
pub struct HookRegistry {
    hooks: BTreeMap<String, Vec<Arc<dyn HookHandler>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler; returns how many handlers the hook now has
    pub fn register(&mut self, hook: &str, handler: Arc<dyn HookHandler>) -> usize {
        let handlers = self.hooks.entry(hook.to_string()).or_default();
        handlers.push(handler);
        handlers.len()
    }

    pub fn handler_count(&self, hook: &str) -> usize {
        self.hooks.get(hook).map(Vec::len).unwrap_or(0)
    }

    /// Registered hook names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.hooks.keys().map(String::as_str).collect()
    }

    pub fn clear(&mut self) {
        self.hooks.clear();
    }

    /// Run every handler for `hook` with the same arguments and collect
    /// their results in order. Unknown hooks yield no results.
    pub async fn execute(&self, hook: &str, args: Vec<Value>) -> Result<Vec<Value>, PluginError> {
        let Some(handlers) = self.hooks.get(hook) else {
            return Ok(Vec::new());
        };

        let mut results = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let result = handler.call(args.clone()).await.map_err(|e| match e {
                hook_err @ PluginError::Hook { .. } => hook_err,
                other => PluginError::Hook {
                    hook: hook.to_string(),
                    message: other.to_string(),
                },
            })?;
            results.push(result);
        }
        Ok(results)
    }
}
