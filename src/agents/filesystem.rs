//! Filesystem agent
//!
//! Directory listing and file CRUD confined to the allow-list.

use super::allowlist::PathPolicy;
use super::registry::{bind, required_arg, CapabilityRegistry, HandlerResult};
use crate::error::AgentError;
use serde::Serialize;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

/// One directory entry
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub path: String,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

pub struct FilesystemAgent {
    policy: PathPolicy,
}

impl FilesystemAgent {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }

    /// Build the command table for this agent
    pub fn registry(self) -> CapabilityRegistry {
        let agent = Arc::new(self);
        let mut registry = CapabilityRegistry::new("filesystem");

        registry.register(
            "list",
            bind(Arc::clone(&agent), |a, args| async move {
                a.list(args.first().map(String::as_str)).await
            }),
        );
        registry.register(
            "read",
            bind(Arc::clone(&agent), |a, args| async move {
                a.read(required_arg(&args, "path")?).await
            }),
        );
        registry.register(
            "write",
            bind(Arc::clone(&agent), |a, args| async move {
                let path = required_arg(&args, "path")?;
                a.write(path, &args[1..].join(" ")).await
            }),
        );
        registry.register(
            "mkdir",
            bind(Arc::clone(&agent), |a, args| async move {
                a.mkdir(required_arg(&args, "path")?).await
            }),
        );
        registry.register(
            "delete",
            bind(agent, |a, args| async move {
                a.delete(required_arg(&args, "path")?).await
            }),
        );

        registry
    }

    /// List a directory, defaulting to the working directory
    pub async fn list(&self, directory: Option<&str>) -> HandlerResult {
        let cwd;
        let directory = match directory {
            Some(d) => d,
            None => {
                cwd = std::env::current_dir()?;
                cwd.to_str().unwrap_or(".")
            }
        };

        let path = self.policy.resolve(directory)?;
        debug!("Listing directory {}", path.display());

        let items = list_entries(&path).await?;
        Ok(json!({
            "path": path.display().to_string(),
            "items": items,
        }))
    }

    pub async fn read(&self, file: &str) -> HandlerResult {
        let path = self.policy.resolve(file)?;
        debug!("Reading {}", path.display());

        let content = fs::read_to_string(&path).await?;
        Ok(json!(content))
    }

    /// Write UTF-8 content, creating parent directories inside the allow-list
    pub async fn write(&self, file: &str, content: &str) -> HandlerResult {
        let path = self.policy.resolve(file)?;
        info!("Writing {} bytes to {}", content.len(), path.display());

        if let Some(parent) = path.parent() {
            if self.policy.resolve(&parent.to_string_lossy()).is_ok() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&path, content).await?;

        Ok(json!({ "success": true, "path": path.display().to_string() }))
    }

    pub async fn mkdir(&self, dir: &str) -> HandlerResult {
        let path = self.policy.resolve(dir)?;
        info!("Creating directory {}", path.display());

        fs::create_dir_all(&path).await?;
        Ok(json!({ "success": true, "path": path.display().to_string() }))
    }

    /// Recursive, forced delete. Missing targets succeed.
    pub async fn delete(&self, target: &str) -> HandlerResult {
        let path = self.policy.resolve(target)?;
        if self.policy.is_root(&path) {
            return Err(AgentError::AccessDenied {
                path: target.to_string(),
            });
        }
        info!("Deleting {}", path.display());

        match fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path).await?,
            Ok(_) => fs::remove_file(&path).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(json!({ "success": true, "path": path.display().to_string() }))
    }
}

/// Read a directory into entries sorted by name
pub async fn list_entries(path: &Path) -> Result<Vec<DirEntry>, AgentError> {
    let mut reader = fs::read_dir(path).await?;
    let mut items = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let kind = if entry.file_type().await?.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        items.push(DirEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            kind,
            path: entry.path().display().to_string(),
        });
    }

    items.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::protocol::AgentRequest;
    use tempfile::TempDir;

    fn agent_for(dir: &TempDir) -> FilesystemAgent {
        FilesystemAgent::new(PathPolicy::new([dir.path()]))
    }

    fn canonical(dir: &TempDir) -> std::path::PathBuf {
        dir.path().canonicalize().unwrap()
    }

    #[tokio::test]
    async fn test_list_directory() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("sub");
        std::fs::create_dir_all(sub.join("nested")).unwrap();
        std::fs::write(sub.join("a.txt"), "x").unwrap();

        let agent = agent_for(&dir);
        let result = agent.list(Some(sub.to_str().unwrap())).await.unwrap();

        let root = canonical(&dir).join("sub");
        assert_eq!(result["path"], root.display().to_string());
        assert_eq!(
            result["items"],
            json!([
                { "name": "a.txt", "type": "file", "path": root.join("a.txt").display().to_string() },
                { "name": "nested", "type": "directory", "path": root.join("nested").display().to_string() },
            ])
        );
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let agent = agent_for(&dir);
        let file = dir.path().join("deep/notes.txt");

        let written = agent.write(file.to_str().unwrap(), "hello world").await.unwrap();
        assert_eq!(written["success"], true);

        let content = agent.read(file.to_str().unwrap()).await.unwrap();
        assert_eq!(content, json!("hello world"));
    }

    #[tokio::test]
    async fn test_access_denied_does_not_touch_fs() {
        let dir = TempDir::new().unwrap();
        let allowed = dir.path().join("allowed");
        std::fs::create_dir(&allowed).unwrap();
        let agent = FilesystemAgent::new(PathPolicy::new([&allowed]));

        let outside = dir.path().join("outside.txt");
        let err = agent.write(outside.to_str().unwrap(), "x").await.unwrap_err();
        assert!(matches!(err, AgentError::AccessDenied { .. }));
        assert!(!outside.exists());

        let err = agent.read("/etc/passwd").await.unwrap_err();
        assert_eq!(err.code(), "access_denied");
    }

    #[tokio::test]
    async fn test_list_mkdir_delete_outside_roots_denied() {
        let dir = TempDir::new().unwrap();
        let allowed = dir.path().join("allowed");
        std::fs::create_dir(&allowed).unwrap();
        let agent = FilesystemAgent::new(PathPolicy::new([&allowed]));

        let err = agent.list(Some(dir.path().to_str().unwrap())).await.unwrap_err();
        assert!(matches!(err, AgentError::AccessDenied { .. }));

        let new_dir = dir.path().join("made-outside");
        let err = agent.mkdir(new_dir.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, AgentError::AccessDenied { .. }));
        assert!(!new_dir.exists());

        let victim = dir.path().join("keep.txt");
        std::fs::write(&victim, "stay").unwrap();
        let err = agent.delete(victim.to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, AgentError::AccessDenied { .. }));
        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "stay");

        // Escaping through `..` is caught too
        let sneaky = format!("{}/../keep.txt", allowed.display());
        assert!(agent.delete(&sneaky).await.is_err());
        assert!(victim.exists());
    }

    #[tokio::test]
    async fn test_mkdir_and_delete() {
        let dir = TempDir::new().unwrap();
        let agent = agent_for(&dir);
        let target = dir.path().join("a/b/c");

        agent.mkdir(target.to_str().unwrap()).await.unwrap();
        assert!(target.is_dir());

        let parent = dir.path().join("a");
        agent.delete(parent.to_str().unwrap()).await.unwrap();
        assert!(!parent.exists());

        // Deleting again is not an error
        agent.delete(parent.to_str().unwrap()).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_root_refused() {
        let dir = TempDir::new().unwrap();
        let agent = agent_for(&dir);
        assert!(agent.delete(dir.path().to_str().unwrap()).await.is_err());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_registry_plain_text_write_joins_content() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("spaced.txt");
        let registry = agent_for(&dir).registry();

        let line = format!("write {} some spaced content", file.display());
        let resp = registry
            .dispatch(AgentRequest::parse_line(&line).unwrap())
            .await;
        assert!(resp.is_success());
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "some spaced content"
        );
    }

    #[tokio::test]
    async fn test_registry_missing_argument() {
        let dir = TempDir::new().unwrap();
        let registry = agent_for(&dir).registry();

        let resp = registry
            .dispatch(AgentRequest::new("read", &[]))
            .await;
        assert_eq!(resp.code.as_deref(), Some("missing_argument"));
    }
}
