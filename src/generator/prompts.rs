//! Prompt construction for the generator stages

use super::{CodeSample, TOOL_TYPES};
use crate::llm::Message;
use serde::Serialize;

const TOOL_SPEC_SYSTEM: &str = "You are an expert tool builder. Produce a complete tool \
specification from the user's request and the code samples provided: name, description, \
parameters and a working implementation.";

const WORKFLOW_SPEC_SYSTEM: &str = "You are an expert workflow designer. Produce a complete \
workflow specification from the user's request and the samples provided, breaking the task \
into ordered, logical steps.";

const WORKFLOW_ANALYSIS_SYSTEM: &str = r#"You are an expert workflow designer focused on automation and integration. Your areas:

1. Web automation and scraping: browser automation (Puppeteer, Playwright, Selenium), dynamic content, forms and navigation, screenshots and media capture.
2. Data processing and integration: API integrations, extraction and transformation, file handling and storage, authentication and security.
3. Communication and notifications: SMS, email and push messaging, webhooks and callbacks, real-time updates.

Some built-in tools exist, but always recommend the best solution for the task, whether that is an existing tool or a new one worth adding."#;

const TOOL_SPEC_SHAPE: &str = r#"{
    "name": "tool name",
    "description": "detailed description",
    "type": "tool type",
    "parameters": [
        {
            "name": "parameter name",
            "type": "parameter type",
            "description": "parameter description",
            "required": true
        }
    ],
    "sourceCode": "implementation code"
}"#;

const WORKFLOW_SPEC_SHAPE: &str = r#"{
    "name": "workflow name",
    "description": "detailed description",
    "steps": [
        {
            "tool": "tool name",
            "description": "step description",
            "parameters": { "param1": "value1" }
        }
    ]
}"#;

fn pretty<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
}

pub fn tool_analysis(prompt: &str) -> Vec<Message> {
    vec![
        Message::system(format!(
            "You are an expert at analyzing tool requirements. Tool types include: {}",
            TOOL_TYPES.join(", ")
        )),
        Message::user(format!(
            r#"Analyze this tool request and provide:
1. The most appropriate tool type
2. Key requirements
3. A GitHub search query that finds relevant examples

Prompt: {}

Respond in JSON format:
{{
    "toolType": "type",
    "requirements": ["req1", "req2"],
    "searchQuery": "github search query"
}}"#,
            prompt
        )),
    ]
}

pub fn workflow_analysis(prompt: &str) -> Vec<Message> {
    vec![
        Message::system(WORKFLOW_ANALYSIS_SYSTEM),
        Message::user(format!(
            r#"Analyze this workflow request and propose a complete solution.

Input: {}

Respond in this JSON format:
{{
    "steps": [
        {{
            "description": "Detailed step description",
            "suggestedTool": {{
                "name": "Tool name or type",
                "why": "Why this tool fits the step",
                "alternatives": ["Other tools that could work"],
                "features": ["Key features needed"]
            }},
            "parameters": {{ "param1": "value1" }}
        }}
    ],
    "innovations": {{
        "newTools": ["New tools worth adding"],
        "improvements": ["Ways to improve existing tools"],
        "integrations": ["Useful new integrations"]
    }},
    "searchQuery": "GitHub search query for implementation examples"
}}"#,
            prompt
        )),
    ]
}

pub fn tool_spec<A: Serialize>(prompt: &str, analysis: &A, samples: &[CodeSample]) -> Vec<Message> {
    vec![
        Message::system(TOOL_SPEC_SYSTEM),
        Message::user(format!(
            "User Prompt: {}\n\nAnalysis: {}\n\nCode Samples: {}\n\n\
             Generate a complete tool specification in JSON format with this structure:\n{}",
            prompt,
            pretty(analysis),
            pretty(&samples),
            TOOL_SPEC_SHAPE
        )),
    ]
}

pub fn workflow_spec<A: Serialize>(
    prompt: &str,
    analysis: &A,
    samples: &[CodeSample],
) -> Vec<Message> {
    vec![
        Message::system(WORKFLOW_SPEC_SYSTEM),
        Message::user(format!(
            "User Prompt: {}\n\nAnalysis: {}\n\nWorkflow Samples: {}\n\n\
             Generate a complete workflow specification in JSON format with this structure:\n{}",
            prompt,
            pretty(analysis),
            pretty(&samples),
            WORKFLOW_SPEC_SHAPE
        )),
    ]
}
