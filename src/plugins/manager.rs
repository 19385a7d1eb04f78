//! Plugin manager
//!
//! Owns the loaded plugins and the hook registry. Loading is gated by the
//! persisted plugin config; a reload replaces both wholesale.

use super::config::PluginConfigManager;
use super::hooks::{HookHandler, HookRegistry};
use super::loader::{self, PluginManifest};
use super::{builtin, Plugin};
use crate::config::PluginsConfig;
use crate::error::PluginError;
use crate::logging::{ActivityLog, LogEvent};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// What `list_plugins` reports per loaded plugin
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PluginSummary {
    pub name: String,
    pub description: String,
    pub hooks: Vec<String>,
}

pub struct PluginManager {
    directory: PathBuf,
    timeout: Duration,
    config: PluginConfigManager,
    catalog: Vec<Arc<dyn Plugin>>,
    plugins: BTreeMap<String, Arc<dyn Plugin>>,
    hooks: HookRegistry,
    activity: Arc<ActivityLog>,
}

impl PluginManager {
    pub fn new(config: &PluginsConfig, activity: Arc<ActivityLog>) -> Self {
        Self::with_parts(
            &config.directory,
            Duration::from_secs(config.timeout),
            PluginConfigManager::new(&config.config_path),
            builtin::catalog(),
            activity,
        )
    }

    /// Build from explicit parts; used to swap the catalog or environment
    pub fn with_parts(
        directory: &Path,
        timeout: Duration,
        config: PluginConfigManager,
        catalog: Vec<Arc<dyn Plugin>>,
        activity: Arc<ActivityLog>,
    ) -> Self {
        Self {
            directory: directory.to_path_buf(),
            timeout,
            config,
            catalog,
            plugins: BTreeMap::new(),
            hooks: HookRegistry::new(),
            activity,
        }
    }

    pub fn config(&mut self) -> &mut PluginConfigManager {
        &mut self.config
    }

    /// Load every enabled plugin from the catalog and the plugin directory.
    ///
    /// Previously loaded plugins and hooks are dropped first. Candidates
    /// that are disabled, miss environment variables or fail validation
    /// are skipped; this never fails as a whole.
    pub fn load_plugins(&mut self) -> usize {
        if !self.directory.exists() {
            if let Err(e) = fs::create_dir_all(&self.directory) {
                warn!("Failed to create plugin directory {:?}: {}", self.directory, e);
            }
        }

        self.plugins.clear();
        self.hooks.clear();

        let mut candidates = self.catalog.clone();
        for external in loader::discover(&self.directory, self.timeout) {
            candidates.push(Arc::new(external));
        }

        let mut loaded = 0;
        for plugin in candidates {
            let name = plugin.name().to_string();
            match self.config.check_plugin(&name) {
                Ok(()) => {}
                Err(e @ PluginError::MissingEnv { .. }) => {
                    warn!("Skipping plugin '{}': {}", name, e);
                    continue;
                }
                Err(e) => {
                    debug!("Skipping plugin '{}': {}", name, e);
                    continue;
                }
            }

            match self.load_plugin(plugin) {
                Ok(()) => loaded += 1,
                Err(e) => warn!("Failed to load plugin '{}': {}", name, e),
            }
        }

        info!("Loaded {} plugins", loaded);
        loaded
    }

    /// Same as `load_plugins`; picks up config changes and new executables
    pub fn reload(&mut self) -> usize {
        self.load_plugins()
    }

    /// Register a plugin and its hooks after checking its shape
    pub fn load_plugin(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        let name = plugin.name().to_string();
        if name.trim().is_empty() {
            return Err(PluginError::Invalid("plugin has no name".to_string()));
        }
        if self.plugins.contains_key(&name) {
            return Err(PluginError::Invalid(format!("plugin '{}' already loaded", name)));
        }
        if !plugin.validate() {
            return Err(PluginError::Invalid(format!("plugin '{}' failed validation", name)));
        }

        let hooks = plugin.hooks();
        if let Some((hook, _)) = hooks.iter().find(|(hook, _)| hook.trim().is_empty()) {
            return Err(PluginError::Invalid(format!(
                "plugin '{}' declares an unnamed hook '{}'",
                name, hook
            )));
        }

        for (hook, handler) in hooks {
            self.hooks.register(&hook, handler);
        }

        info!("Loaded plugin '{}'", name);
        self.plugins.insert(name, plugin);
        Ok(())
    }

    /// Attach a handler directly; returns how many the hook now has
    pub fn register_hook(&mut self, hook: &str, handler: Arc<dyn HookHandler>) -> usize {
        self.hooks.register(hook, handler)
    }

    /// Run every handler for `hook` in registration order
    pub async fn execute_hook(&self, hook: &str, args: Vec<Value>) -> Result<Vec<Value>, PluginError> {
        let start = Instant::now();
        let result = self.hooks.execute(hook, args).await;
        let elapsed = start.elapsed().as_millis() as u64;

        match &result {
            Ok(results) => self.activity.record_timed(
                LogEvent::Hook,
                hook,
                &format!("{} handlers ran", results.len()),
                Some(json!({ "results": results })),
                Some(elapsed),
            ),
            Err(e) => self.activity.record_timed(
                LogEvent::Error,
                hook,
                &e.to_string(),
                None,
                Some(elapsed),
            ),
        }

        result
    }

    /// Call a loaded plugin's primary capability
    pub async fn invoke_plugin(&self, name: &str, input: Value) -> Result<Value, PluginError> {
        let plugin = self
            .get_plugin(name)
            .ok_or_else(|| PluginError::Config(format!("plugin '{}' is not loaded", name)))?;
        plugin.invoke(input).await
    }

    pub fn list_plugins(&self) -> Vec<PluginSummary> {
        self.plugins
            .values()
            .map(|plugin| PluginSummary {
                name: plugin.name().to_string(),
                description: plugin.description().to_string(),
                hooks: plugin.hooks().into_iter().map(|(hook, _)| hook).collect(),
            })
            .collect()
    }

    pub fn get_plugin(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.names()
    }

    /// Persist the enabled flag. A loaded plugin is unaffected until reload.
    pub fn enable_plugin(&mut self, name: &str) -> Result<(), PluginError> {
        self.config.enable_plugin(name)
    }

    /// Persist the disabled flag. A loaded plugin stays resident until reload.
    pub fn disable_plugin(&mut self, name: &str) -> Result<(), PluginError> {
        self.config.disable_plugin(name)
    }

    /// Write an executable plugin and its manifest, enable it, and reload.
    ///
    /// Returns the number of plugins loaded afterwards.
    pub fn create_plugin(
        &mut self,
        name: &str,
        manifest: PluginManifest,
        executable: &str,
    ) -> Result<usize, PluginError> {
        if name.is_empty()
            || name.starts_with('.')
            || name.contains(['/', '\\'])
            || name.ends_with(".json")
        {
            return Err(PluginError::Invalid(format!("invalid plugin name '{}'", name)));
        }

        fs::create_dir_all(&self.directory)?;
        let exe_path = self.directory.join(name);
        fs::write(&exe_path, executable)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&exe_path, fs::Permissions::from_mode(0o755))?;
        }

        let manifest = PluginManifest {
            name: Some(name.to_string()),
            ..manifest
        };
        let manifest_json = serde_json::to_string_pretty(&manifest)
            .map_err(|e| PluginError::Invalid(e.to_string()))?;
        fs::write(self.directory.join(format!("{}.json", name)), manifest_json)?;

        self.config.enable_plugin(name)?;
        info!("Created plugin '{}' at {:?}", name, exe_path);
        Ok(self.load_plugins())
    }
}
