//! Tool and workflow specifications
//!
//! Model output is checked as raw JSON first so a missing field is
//! reported by name, then deserialized into the typed form.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: String,
    pub description: String,
    pub required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpecification {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub tool_type: String,
    pub parameters: Vec<ToolParameter>,
    #[serde(rename = "sourceCode")]
    pub source_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    pub tool: String,
    pub description: String,
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowSpecification {
    pub name: String,
    pub description: String,
    pub steps: Vec<WorkflowStep>,
    /// Set when the workflow is saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
}

const TOOL_FIELDS: [&str; 5] = ["name", "description", "type", "parameters", "sourceCode"];
const PARAMETER_FIELDS: [&str; 4] = ["name", "type", "description", "required"];
const WORKFLOW_FIELDS: [&str; 3] = ["name", "description", "steps"];
const STEP_FIELDS: [&str; 3] = ["tool", "description", "parameters"];

/// A field counts as present unless it is absent, null or a blank string
fn present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

fn missing_fields(value: &Value, fields: &[&str]) -> Vec<String> {
    fields
        .iter()
        .filter(|field| !present(value.get(**field)))
        .map(|field| field.to_string())
        .collect()
}

fn non_empty_array<'a>(value: &'a Value, field: &str) -> Option<&'a Vec<Value>> {
    value.get(field).and_then(Value::as_array).filter(|a| !a.is_empty())
}

/// Check a generated tool specification
pub fn validate_tool_spec(value: &Value) -> Result<ToolSpecification, String> {
    if !value.is_object() {
        return Err("specification must be a JSON object".to_string());
    }

    let missing = missing_fields(value, &TOOL_FIELDS);
    if !missing.is_empty() {
        return Err(format!("missing required fields: {}", missing.join(", ")));
    }

    let parameters = non_empty_array(value, "parameters")
        .ok_or_else(|| "parameters must be a non-empty array".to_string())?;

    for (index, param) in parameters.iter().enumerate() {
        let missing = missing_fields(param, &PARAMETER_FIELDS);
        if !missing.is_empty() {
            return Err(format!(
                "parameter {}: missing required fields: {}",
                index + 1,
                missing.join(", ")
            ));
        }
    }

    serde_json::from_value(value.clone()).map_err(|e| e.to_string())
}

/// Check a generated workflow specification
pub fn validate_workflow_spec(value: &Value) -> Result<WorkflowSpecification, String> {
    if !value.is_object() {
        return Err("specification must be a JSON object".to_string());
    }

    let missing = missing_fields(value, &WORKFLOW_FIELDS);
    if !missing.is_empty() {
        return Err(format!("missing required fields: {}", missing.join(", ")));
    }

    let steps = non_empty_array(value, "steps")
        .ok_or_else(|| "steps must be a non-empty array".to_string())?;

    for (index, step) in steps.iter().enumerate() {
        let missing = missing_fields(step, &STEP_FIELDS);
        if !missing.is_empty() {
            return Err(format!(
                "step {}: missing required fields: {}",
                index + 1,
                missing.join(", ")
            ));
        }
    }

    serde_json::from_value(value.clone()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool() -> Value {
        json!({
            "name": "price-scraper",
            "description": "Scrapes prices",
            "type": "web-scraper",
            "parameters": [
                {"name": "url", "type": "string", "description": "Page", "required": true},
                {"name": "limit", "type": "number", "description": "Max rows", "required": false}
            ],
            "sourceCode": "module.exports = async () => {}"
        })
    }

    fn workflow() -> Value {
        json!({
            "name": "daily-report",
            "description": "Collect and mail",
            "steps": [
                {"tool": "step1", "description": "collect", "parameters": {"source": "db"}},
                {"tool": "step2", "description": "mail", "parameters": {}}
            ]
        })
    }

    #[test]
    fn test_valid_tool() {
        let spec = validate_tool_spec(&tool()).unwrap();
        assert_eq!(spec.tool_type, "web-scraper");
        assert!(!spec.parameters[1].required);
    }

    #[test]
    fn test_tool_rejects_each_missing_field() {
        for field in TOOL_FIELDS {
            let mut value = tool();
            value.as_object_mut().unwrap().remove(field);
            let err = validate_tool_spec(&value).unwrap_err();
            assert!(err.contains(field), "{} not reported: {}", field, err);
        }

        let mut blank = tool();
        blank["name"] = json!("  ");
        assert!(validate_tool_spec(&blank).unwrap_err().contains("name"));
    }

    #[test]
    fn test_tool_rejects_bad_parameters() {
        let mut empty = tool();
        empty["parameters"] = json!([]);
        assert!(validate_tool_spec(&empty).unwrap_err().contains("non-empty"));

        for field in PARAMETER_FIELDS {
            let mut value = tool();
            value["parameters"][0].as_object_mut().unwrap().remove(field);
            let err = validate_tool_spec(&value).unwrap_err();
            assert!(err.starts_with("parameter 1"), "{}", err);
            assert!(err.contains(field));
        }
    }

    #[test]
    fn test_valid_workflow() {
        let spec = validate_workflow_spec(&workflow()).unwrap();
        assert_eq!(spec.steps.len(), 2);
        assert!(spec.created.is_none());
    }

    #[test]
    fn test_workflow_rejections() {
        for field in WORKFLOW_FIELDS {
            let mut value = workflow();
            value.as_object_mut().unwrap().remove(field);
            assert!(validate_workflow_spec(&value).unwrap_err().contains(field));
        }

        let mut empty = workflow();
        empty["steps"] = json!([]);
        assert!(validate_workflow_spec(&empty).is_err());

        for field in STEP_FIELDS {
            let mut value = workflow();
            value["steps"][1].as_object_mut().unwrap().remove(field);
            let err = validate_workflow_spec(&value).unwrap_err();
            assert!(err.starts_with("step 2"), "{}", err);
        }
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(validate_tool_spec(&json!([1, 2])).is_err());
        assert!(validate_workflow_spec(&json!("workflow")).is_err());
    }
}
