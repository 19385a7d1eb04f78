//! Plugin system
//!
//! Plugins come from two places: a compiled-in catalog and executables in
//! the plugin directory that speak JSON over stdin/stdout. Either kind is
//! loaded only when the persisted plugin config enables it and its
//! required environment variables are set.

#![allow(dead_code)]

mod builtin;
mod config;
mod executor;
mod hooks;
mod loader;
mod manager;
mod protocol;

pub use builtin::{catalog, SearchResult, WebSearchPlugin, WEB_SEARCH_PLUGIN};
pub use config::{PluginConfigFile, PluginConfigManager, PluginSettings};
pub use hooks::{HookHandler, HookRegistry};
pub use loader::{discover, ExternalPlugin, PluginManifest};
pub use manager::{PluginManager, PluginSummary};

use crate::error::PluginError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Shape every loadable plugin exposes
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Whether the plugin has the configuration it needs to run
    fn validate(&self) -> bool;

    /// Hook name and handler pairs to register on load
    fn hooks(&self) -> Vec<(String, Arc<dyn HookHandler>)>;

    /// The plugin's primary capability
    async fn invoke(&self, input: Value) -> Result<Value, PluginError>;
}
