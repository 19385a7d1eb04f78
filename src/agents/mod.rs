//! Agents
//!
//! Agents are separate processes speaking line-delimited JSON on stdio.
//! The same binary hosts the built-in agents (`agentforge agent <kind>`)
//! and the parent-side [`executor::AgentExecutor`] that drives them.

#![allow(dead_code)]

pub mod allowlist;
pub mod analysis;
pub mod code_analysis;
pub mod executor;
pub mod filesystem;
pub mod integration;
pub mod protocol;
pub mod registry;
pub mod runtime;

use crate::config::AgentsConfig;
use crate::error::AgentError;
use allowlist::PathPolicy;
use registry::CapabilityRegistry;

/// Built-in agent kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AgentKind {
    Filesystem,
    CodeAnalysis,
    ToolIntegration,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [
        AgentKind::Filesystem,
        AgentKind::CodeAnalysis,
        AgentKind::ToolIntegration,
    ];

    /// Name used on the command line
    pub fn name(self) -> &'static str {
        match self {
            AgentKind::Filesystem => "filesystem",
            AgentKind::CodeAnalysis => "code-analysis",
            AgentKind::ToolIntegration => "tool-integration",
        }
    }

    /// Id the executor registers the agent under
    pub fn agent_id(self) -> String {
        format!("{}-agent", self.name())
    }
}

/// Build the command table for an agent kind
pub fn build_registry(kind: AgentKind, config: &AgentsConfig) -> Result<CapabilityRegistry, AgentError> {
    let policy = PathPolicy::new(&config.allowed_roots);

    let registry = match kind {
        AgentKind::Filesystem => filesystem::FilesystemAgent::new(policy).registry(),
        AgentKind::CodeAnalysis => code_analysis::CodeAnalysisAgent::new(config).registry(),
        AgentKind::ToolIntegration => {
            integration::ToolIntegrationAgent::new(policy, config)?.registry()
        }
    };

    Ok(registry)
}
