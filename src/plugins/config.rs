//! Persisted plugin enablement
//!
//! `plugin-config.json` records which plugins are enabled and which
//! environment variables each one needs. The file is re-read before every
//! check so edits made by another process are picked up.

use crate::error::PluginError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Settings for one plugin
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_env_vars: Vec<String>,
    /// Plugin-specific options, preserved as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// On-disk layout
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PluginConfigFile {
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginSettings>,
}

impl PluginConfigFile {
    /// Configuration written when no file exists yet
    pub fn with_defaults() -> Self {
        let mut plugins = BTreeMap::new();
        plugins.insert(
            super::builtin::WEB_SEARCH_PLUGIN.to_string(),
            PluginSettings {
                enabled: false,
                required_env_vars: vec![
                    "SEARCH_API_KEY".to_string(),
                    "SEARCH_ENGINE_ID".to_string(),
                ],
                extra: Map::new(),
            },
        );
        Self { plugins }
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct PluginConfigManager {
    path: PathBuf,
    config: PluginConfigFile,
    env: EnvLookup,
}

impl PluginConfigManager {
    pub fn new(path: &Path) -> Self {
        Self::with_env(path, Arc::new(|key: &str| std::env::var(key).ok()))
    }

    /// Use a custom environment lookup
    pub fn with_env(path: &Path, env: EnvLookup) -> Self {
        Self {
            path: path.to_path_buf(),
            config: PluginConfigFile::default(),
            env,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the config file, creating the default one if it is missing.
    ///
    /// A file that cannot be read or parsed is logged and treated as empty.
    pub fn load_config(&mut self) -> &PluginConfigFile {
        self.config = self.read_config().unwrap_or_else(|e| {
            warn!("{}", e);
            PluginConfigFile::default()
        });

        debug!(
            "Plugin config lists: {:?}",
            self.config.plugins.keys().collect::<Vec<_>>()
        );
        &self.config
    }

    /// Strict read; an existing file that fails to parse is an error
    fn read_config(&self) -> Result<PluginConfigFile, PluginError> {
        if !self.path.exists() {
            let defaults = PluginConfigFile::with_defaults();
            match self.write(&defaults) {
                Ok(()) => info!("Created default plugin config at {}", self.path.display()),
                Err(e) => warn!("Failed to create default plugin config: {}", e),
            }
            return Ok(defaults);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            PluginError::Config(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            PluginError::Config(format!("invalid plugin config {}: {}", self.path.display(), e))
        })
    }

    pub fn settings(&self, plugin: &str) -> Option<&PluginSettings> {
        self.config.plugins.get(plugin)
    }

    /// Why a plugin may not be loaded, if anything
    pub fn check_plugin(&mut self, plugin: &str) -> Result<(), PluginError> {
        self.load_config();

        let settings = self
            .config
            .plugins
            .get(plugin)
            .ok_or_else(|| PluginError::Config(format!("no configuration for plugin '{}'", plugin)))?;

        if !settings.enabled {
            return Err(PluginError::Config(format!("plugin '{}' is disabled", plugin)));
        }

        let missing: Vec<String> = settings
            .required_env_vars
            .iter()
            .filter(|var| (self.env)(var.as_str()).map_or(true, |v| v.is_empty()))
            .cloned()
            .collect();

        if !missing.is_empty() {
            return Err(PluginError::MissingEnv {
                plugin: plugin.to_string(),
                missing,
            });
        }

        Ok(())
    }

    /// Whether a plugin is configured, enabled and has its environment
    pub fn validate_plugin_config(&mut self, plugin: &str) -> bool {
        match self.check_plugin(plugin) {
            Ok(()) => true,
            Err(e) => {
                debug!("{}", e);
                false
            }
        }
    }

    /// Mark a plugin enabled. Takes effect on the next load.
    pub fn enable_plugin(&mut self, plugin: &str) -> Result<(), PluginError> {
        self.set_enabled(plugin, true)
    }

    /// Mark a plugin disabled. Loaded instances stay until the next load.
    pub fn disable_plugin(&mut self, plugin: &str) -> Result<(), PluginError> {
        self.set_enabled(plugin, false)
    }

    /// Refuses to touch a file it cannot parse
    fn set_enabled(&mut self, plugin: &str, enabled: bool) -> Result<(), PluginError> {
        self.config = self.read_config()?;
        self.config
            .plugins
            .entry(plugin.to_string())
            .or_default()
            .enabled = enabled;

        let snapshot = self.config.clone();
        self.write(&snapshot)?;
        info!(
            "Plugin '{}' {}",
            plugin,
            if enabled { "enabled" } else { "disabled" }
        );
        Ok(())
    }

    fn write(&self, config: &PluginConfigFile) -> Result<(), PluginError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| PluginError::Config(e.to_string()))?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn manager_with_env(dir: &TempDir, vars: &[(&str, &str)]) -> PluginConfigManager {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PluginConfigManager::with_env(
            &dir.path().join("plugin-config.json"),
            Arc::new(move |key: &str| vars.get(key).cloned()),
        )
    }

    #[test]
    fn test_default_config_created() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager_with_env(&dir, &[]);

        let config = manager.load_config().clone();
        assert!(manager.path().exists());

        let web = &config.plugins["web-search-plugin"];
        assert!(!web.enabled);
        assert_eq!(web.required_env_vars, vec!["SEARCH_API_KEY", "SEARCH_ENGINE_ID"]);
    }

    #[test]
    fn test_disabled_and_unknown_rejected() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager_with_env(&dir, &[]);

        assert!(!manager.validate_plugin_config("web-search-plugin"));
        assert!(!manager.validate_plugin_config("never-heard-of-it"));
    }

    #[test]
    fn test_enable_requires_env() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager_with_env(&dir, &[("SEARCH_API_KEY", "k")]);
        manager.enable_plugin("web-search-plugin").unwrap();

        match manager.check_plugin("web-search-plugin") {
            Err(PluginError::MissingEnv { missing, .. }) => {
                assert_eq!(missing, vec!["SEARCH_ENGINE_ID"])
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_enable_and_disable_persist() {
        let dir = TempDir::new().unwrap();
        let env = [("SEARCH_API_KEY", "k"), ("SEARCH_ENGINE_ID", "cx")];

        let mut manager = manager_with_env(&dir, &env);
        manager.enable_plugin("web-search-plugin").unwrap();

        // A fresh manager sees the persisted state
        let mut fresh = manager_with_env(&dir, &env);
        assert!(fresh.validate_plugin_config("web-search-plugin"));

        fresh.disable_plugin("web-search-plugin").unwrap();
        assert!(!manager.validate_plugin_config("web-search-plugin"));

        // Env requirements survive the round trip
        let settings = manager.settings("web-search-plugin").unwrap();
        assert_eq!(settings.required_env_vars.len(), 2);
    }

    #[test]
    fn test_extra_settings_preserved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plugin-config.json");
        std::fs::write(
            &path,
            r#"{"plugins": {"notes": {"enabled": false, "maxResults": 3}}}"#,
        )
        .unwrap();

        let mut manager = manager_with_env(&dir, &[]);
        manager.enable_plugin("notes").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("maxResults"));
        assert!(manager.validate_plugin_config("notes"));
    }

    #[test]
    fn test_corrupt_file_treated_as_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("plugin-config.json"), "{ nope").unwrap();

        let mut manager = manager_with_env(&dir, &[]);
        assert!(manager.load_config().plugins.is_empty());
    }

    #[test]
    fn test_enable_leaves_corrupt_file_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plugin-config.json");
        let corrupt = r#"{"plugins":{"web-search-plugin":{"enabled":false,"requiredEnvVars":["SEARCH_API_KEY"]},}}"#;
        std::fs::write(&path, corrupt).unwrap();

        let mut manager = manager_with_env(&dir, &[]);
        let err = manager.enable_plugin("notes").unwrap_err();
        assert!(matches!(err, PluginError::Config(_)), "{:?}", err);
        assert!(manager.disable_plugin("web-search-plugin").is_err());

        assert_eq!(std::fs::read_to_string(&path).unwrap(), corrupt);
    }
}
