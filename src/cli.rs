//! Command-line argument parsing for agentforge

use crate::agents::AgentKind;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// agentforge - agent processes, plugins and generated tools
#[derive(Parser, Debug)]
#[command(name = "agentforge")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a built-in agent on stdin/stdout
    Agent {
        #[arg(value_enum)]
        kind: AgentKind,

        /// Allow-list root (repeatable); replaces the configured roots
        #[arg(long = "allow", value_name = "DIR")]
        allow: Vec<PathBuf>,
    },

    /// List configured agents
    Agents,

    /// Start an agent, run one command and print the response
    Exec {
        agent: String,
        command: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Manage plugins
    Plugins {
        #[command(subcommand)]
        action: PluginAction,
    },

    /// Generate a tool or workflow specification from a prompt
    Generate {
        #[command(subcommand)]
        target: GenerateTarget,
    },

    /// Saved workflows
    Workflow {
        #[command(subcommand)]
        action: WorkflowAction,
    },

    /// Workshop tools
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },

    /// LLM provider checks
    Llm {
        #[command(subcommand)]
        action: LlmAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum PluginAction {
    /// List loaded plugins
    List,
    /// Enable a plugin (takes effect on next load)
    Enable { name: String },
    /// Disable a plugin (takes effect on next load)
    Disable { name: String },
    /// Run every handler of a hook
    Hook {
        name: String,
        /// Hook arguments, each parsed as JSON or taken as a string
        args: Vec<String>,
    },
    /// Call a loaded plugin directly
    Invoke {
        name: String,
        /// Input, parsed as JSON or taken as a string
        input: Option<String>,
    },
    /// Install an executable as an external plugin and enable it
    Create {
        name: String,
        #[arg(long, value_name = "FILE")]
        exe: PathBuf,
        #[arg(long, default_value = "")]
        description: String,
        /// Hook the executable answers (repeatable)
        #[arg(long = "hook", value_name = "HOOK")]
        hooks: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum GenerateTarget {
    Tool {
        prompt: String,
        /// Write the result into the workshop
        #[arg(long)]
        save: bool,
    },
    Workflow {
        prompt: String,
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum WorkflowAction {
    Run {
        name: String,
        /// JSON passed to every step
        #[arg(long, value_name = "JSON", default_value = "{}")]
        params: String,
    },
    List,
}

#[derive(Subcommand, Debug)]
pub enum ToolsAction {
    List,
}

#[derive(Subcommand, Debug)]
pub enum LlmAction {
    /// Endpoint health, model availability and rate-limit window
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_subcommand() {
        let args = Args::parse_from(["agentforge", "agent", "code-analysis"]);
        assert!(!args.debug);
        match args.command {
            Commands::Agent { kind, allow } => {
                assert_eq!(kind, AgentKind::CodeAnalysis);
                assert!(allow.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }

        let args = Args::parse_from([
            "agentforge", "agent", "filesystem", "--allow", "/tmp/a", "--allow", "/tmp/b",
        ]);
        match args.command {
            Commands::Agent { allow, .. } => {
                assert_eq!(allow, vec![PathBuf::from("/tmp/a"), PathBuf::from("/tmp/b")]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_exec_keeps_trailing_args() {
        let args = Args::parse_from([
            "agentforge",
            "exec",
            "filesystem-agent",
            "write",
            "/tmp/x.txt",
            "-n",
            "hello",
        ]);
        match args.command {
            Commands::Exec { agent, command, args } => {
                assert_eq!(agent, "filesystem-agent");
                assert_eq!(command, "write");
                assert_eq!(args, vec!["/tmp/x.txt", "-n", "hello"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args = Args::parse_from(["agentforge", "agents", "--debug", "--config", "/tmp/c.toml"]);
        assert!(args.debug);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));
    }

    #[test]
    fn test_nested_subcommands() {
        let args = Args::parse_from(["agentforge", "generate", "tool", "scrape prices", "--save"]);
        assert!(matches!(
            args.command,
            Commands::Generate {
                target: GenerateTarget::Tool { save: true, .. }
            }
        ));

        let args = Args::parse_from(["agentforge", "workflow", "run", "daily"]);
        match args.command {
            Commands::Workflow {
                action: WorkflowAction::Run { name, params },
            } => {
                assert_eq!(name, "daily");
                assert_eq!(params, "{}");
            }
            other => panic!("unexpected {:?}", other),
        }

        let args = Args::parse_from(["agentforge", "plugins", "hook", "search:preprocess", "  Rust  "]);
        assert!(matches!(
            args.command,
            Commands::Plugins {
                action: PluginAction::Hook { .. }
            }
        ));
    }

    #[test]
    fn test_plugin_create_and_invoke() {
        let args = Args::parse_from([
            "agentforge", "plugins", "create", "notes", "--exe", "/tmp/notes.sh", "--hook",
            "notes:save", "--hook", "notes:load",
        ]);
        match args.command {
            Commands::Plugins {
                action: PluginAction::Create { name, exe, description, hooks },
            } => {
                assert_eq!(name, "notes");
                assert_eq!(exe, PathBuf::from("/tmp/notes.sh"));
                assert!(description.is_empty());
                assert_eq!(hooks, vec!["notes:save", "notes:load"]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let args = Args::parse_from(["agentforge", "plugins", "invoke", "web-search-plugin", "rust"]);
        assert!(matches!(
            args.command,
            Commands::Plugins {
                action: PluginAction::Invoke { input: Some(_), .. }
            }
        ));

        let args = Args::parse_from(["agentforge", "llm", "status"]);
        assert!(matches!(args.command, Commands::Llm { action: LlmAction::Status }));
    }

    #[test]
    fn test_unknown_agent_kind_rejected() {
        assert!(Args::try_parse_from(["agentforge", "agent", "shell"]).is_err());
    }
}
