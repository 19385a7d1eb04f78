//! External plugin protocol
//!
//! A plugin executable receives one JSON request on stdin and answers with
//! a JSON response on stdout carrying the same id.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Call name used for a plugin's primary capability
pub const INVOKE: &str = "invoke";

/// Request sent to a plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginRequest {
    /// Request ID for correlation
    pub id: String,
    /// Hook name, or `invoke` for the primary capability
    pub call: String,
    /// Positional arguments
    #[serde(default)]
    pub args: Vec<Value>,
}

impl PluginRequest {
    pub fn new(call: &str, args: Vec<Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            call: call.to_string(),
            args,
        }
    }
}

/// Response from a plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginResponse {
    /// Request ID this responds to
    pub id: String,
    /// Whether the operation succeeded
    pub success: bool,
    /// Result data (if success)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message (if failure)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PluginResponse {
    /// Turn the response into the call's result
    pub fn into_result(self) -> Result<Value, String> {
        if self.success {
            Ok(self.result.unwrap_or(Value::Null))
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "plugin reported failure".to_string()))
        }
    }
}
