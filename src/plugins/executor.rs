//! Plugin process execution
//!
//! Each call spawns the plugin, writes one request, and reads stdout until
//! the matching response arrives or the timeout expires.

use super::protocol::{PluginRequest, PluginResponse};
use crate::error::PluginError;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Run one request against a plugin executable
pub async fn call_plugin(
    executable: &Path,
    request: &PluginRequest,
    timeout: Duration,
) -> Result<PluginResponse, PluginError> {
    debug!("Calling plugin {:?} ({})", executable, request.call);

    let mut child = Command::new(executable)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PluginError::Protocol(format!("failed to spawn plugin: {}", e)))?;

    let mut line = serde_json::to_string(request)
        .map_err(|e| PluginError::Protocol(format!("failed to serialize request: {}", e)))?;
    line.push('\n');

    // Dropping stdin after the request signals EOF to the plugin
    {
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PluginError::Protocol("plugin stdin unavailable".to_string()))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| PluginError::Protocol("plugin stdout unavailable".to_string()))?;

    let read = async {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            if let Ok(response) = serde_json::from_str::<PluginResponse>(&line) {
                if response.id == request.id {
                    return Ok(response);
                }
            }
        }
        Err(PluginError::Protocol(
            "plugin closed without responding".to_string(),
        ))
    };

    let response = tokio::time::timeout(timeout, read)
        .await
        .map_err(|_| PluginError::Timeout(timeout.as_secs()))?;

    let _ = child.kill().await;
    response
}
