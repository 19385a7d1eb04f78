//! External plugin discovery
//!
//! An external plugin is an executable in the plugin directory, optionally
//! paired with a manifest (`<name>.json` next to it, or `manifest.json`
//! inside a plugin directory) that declares its hooks.

use super::executor::call_plugin;
use super::hooks::HookHandler;
use super::protocol::{PluginRequest, INVOKE};
use super::Plugin;
use crate::error::PluginError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Plugin manifest format
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PluginManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Hook names the executable answers to
    #[serde(default)]
    pub hooks: Vec<String>,
}

/// A plugin backed by an executable
#[derive(Debug, Clone)]
pub struct ExternalPlugin {
    name: String,
    executable: PathBuf,
    manifest: PluginManifest,
    timeout: Duration,
}

impl ExternalPlugin {
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }
}

/// Forwards one hook to the plugin executable
struct ExternalHook {
    executable: PathBuf,
    hook: String,
    timeout: Duration,
}

#[async_trait]
impl HookHandler for ExternalHook {
    async fn call(&self, args: Vec<Value>) -> Result<Value, PluginError> {
        let request = PluginRequest::new(&self.hook, args);
        call_plugin(&self.executable, &request, self.timeout)
            .await?
            .into_result()
            .map_err(|message| PluginError::Hook {
                hook: self.hook.clone(),
                message,
            })
    }
}

#[async_trait]
impl Plugin for ExternalPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    fn validate(&self) -> bool {
        is_executable(&self.executable)
    }

    fn hooks(&self) -> Vec<(String, Arc<dyn HookHandler>)> {
        self.manifest
            .hooks
            .iter()
            .map(|hook| {
                let handler: Arc<dyn HookHandler> = Arc::new(ExternalHook {
                    executable: self.executable.clone(),
                    hook: hook.clone(),
                    timeout: self.timeout,
                });
                (hook.clone(), handler)
            })
            .collect()
    }

    async fn invoke(&self, input: Value) -> Result<Value, PluginError> {
        let request = PluginRequest::new(INVOKE, vec![input]);
        call_plugin(&self.executable, &request, self.timeout)
            .await?
            .into_result()
            .map_err(PluginError::Protocol)
    }
}

/// Scan `dir` for plugin executables.
///
/// Hidden entries, manifests and non-executables are skipped; a plugin
/// whose manifest cannot be parsed is skipped with a warning.
pub fn discover(dir: &Path, timeout: Duration) -> Vec<ExternalPlugin> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Plugin directory {:?} unreadable: {}", dir, e);
            return Vec::new();
        }
    };

    let mut plugins = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if file_name.starts_with('.') || file_name.ends_with(".json") || file_name.ends_with(".toml") {
            continue;
        }

        match load_external(&path, timeout) {
            Ok(plugin) => {
                debug!("Discovered plugin '{}' at {:?}", plugin.name, plugin.executable);
                plugins.push(plugin);
            }
            Err(e) => warn!("Skipping plugin candidate {:?}: {}", path, e),
        }
    }

    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    info!("Discovered {} external plugins in {:?}", plugins.len(), dir);
    plugins
}

fn load_external(path: &Path, timeout: Duration) -> Result<ExternalPlugin, PluginError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| PluginError::Invalid(format!("unusable file name {:?}", path)))?
        .to_string();

    let (executable, manifest_path) = if path.is_dir() {
        let main = path.join("main");
        let named = path.join(&stem);
        let executable = if main.exists() {
            main
        } else if named.exists() {
            named
        } else {
            return Err(PluginError::Invalid(format!(
                "no executable found in {:?}",
                path
            )));
        };
        (executable, path.join("manifest.json"))
    } else {
        (path.to_path_buf(), path.with_extension("json"))
    };

    if !is_executable(&executable) {
        return Err(PluginError::Invalid(format!(
            "{:?} is not executable",
            executable
        )));
    }

    let manifest = if manifest_path.exists() {
        let content = fs::read_to_string(&manifest_path)?;
        serde_json::from_str::<PluginManifest>(&content)
            .map_err(|e| PluginError::Invalid(format!("bad manifest {:?}: {}", manifest_path, e)))?
    } else {
        PluginManifest::default()
    };

    let name = manifest
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(stem);

    Ok(ExternalPlugin {
        name,
        executable,
        manifest,
        timeout,
    })
}

#[cfg(unix)]
pub(crate) fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
pub(crate) fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    const ECHO_CALL: &str = r#"IFS= read -r line
id=$(printf '%s' "$line" | sed 's/.*"id":"\([^"]*\)".*/\1/')
call=$(printf '%s' "$line" | sed 's/.*"call":"\([^"]*\)".*/\1/')
printf '{"id":"%s","success":true,"result":"%s"}\n' "$id" "$call""#;

    fn write_exe(path: &Path, body: &str) {
        fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_discover_skips_non_candidates() {
        let dir = TempDir::new().unwrap();
        write_exe(&dir.path().join("notes"), ECHO_CALL);
        write_exe(&dir.path().join(".hidden"), ECHO_CALL);
        fs::write(dir.path().join("readme"), "not a plugin").unwrap();
        fs::write(dir.path().join("notes.json"), r#"{"hooks": ["notes:save"]}"#).unwrap();

        let plugins = discover(dir.path(), Duration::from_secs(5));
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name(), "notes");
        assert_eq!(plugins[0].manifest().hooks, vec!["notes:save"]);
    }

    #[test]
    fn test_directory_plugin_with_manifest() {
        let dir = TempDir::new().unwrap();
        let plugin_dir = dir.path().join("summarize");
        fs::create_dir(&plugin_dir).unwrap();
        write_exe(&plugin_dir.join("main"), ECHO_CALL);
        fs::write(
            plugin_dir.join("manifest.json"),
            r#"{"name": "summarizer", "description": "Summaries", "hooks": []}"#,
        )
        .unwrap();

        let plugins = discover(dir.path(), Duration::from_secs(5));
        assert_eq!(plugins[0].name(), "summarizer");
        assert_eq!(plugins[0].description(), "Summaries");
        assert!(plugins[0].validate());
    }

    #[test]
    fn test_bad_manifest_skipped() {
        let dir = TempDir::new().unwrap();
        write_exe(&dir.path().join("broken"), ECHO_CALL);
        fs::write(dir.path().join("broken.json"), "{ nope").unwrap();

        assert!(discover(dir.path(), Duration::from_secs(5)).is_empty());
    }

    #[test]
    fn test_missing_directory() {
        assert!(discover(Path::new("/nonexistent/plugins"), Duration::from_secs(5)).is_empty());
    }

    #[tokio::test]
    async fn test_hooks_and_invoke_call_executable() {
        let dir = TempDir::new().unwrap();
        write_exe(&dir.path().join("notes"), ECHO_CALL);
        fs::write(dir.path().join("notes.json"), r#"{"hooks": ["notes:save"]}"#).unwrap();

        let plugin = discover(dir.path(), Duration::from_secs(5)).remove(0);
        let hooks = plugin.hooks();
        let (hook, handler) = &hooks[0];
        assert_eq!(hook, "notes:save");
        assert_eq!(handler.call(vec![json!("x")]).await.unwrap(), json!("notes:save"));

        assert_eq!(plugin.invoke(json!({"q": 1})).await.unwrap(), json!("invoke"));
    }
}
