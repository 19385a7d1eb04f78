//! Subcommand dispatch
//!
//! Each subcommand builds the services it needs from the loaded config and
//! prints its result as JSON on stdout. The returned value is the process
//! exit code.

use crate::agents::executor::AgentExecutor;
use crate::agents::{build_registry, runtime};
use crate::cli::{Commands, GenerateTarget, LlmAction, PluginAction, ToolsAction, WorkflowAction};
use crate::config::Config;
use crate::generator::GeneratorService;
use crate::github::GitHubClient;
use crate::llm::{LlmClient, LlmGateway, OllamaClient};
use crate::logging::ActivityLog;
use crate::plugins::{PluginManager, PluginManifest};
use crate::workshop::WorkshopService;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_error(error: impl std::fmt::Display) -> Result<i32> {
    println!("{}", json!({ "status": "error", "error": error.to_string() }));
    Ok(1)
}

/// A CLI argument as JSON, falling back to a plain string
fn json_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub async fn run(command: Commands, config: Config, config_path: Option<&Path>) -> Result<i32> {
    match command {
        Commands::Agent { kind, allow } => {
            let mut agents = config.agents;
            if !allow.is_empty() {
                agents.allowed_roots = allow;
            }
            let registry = build_registry(kind, &agents)?;
            runtime::serve_stdio(&registry).await?;
            Ok(0)
        }
        Commands::Agents => {
            let executor = executor(&config, config_path)?;
            print_json(&executor.list_configured_agents())?;
            Ok(0)
        }
        Commands::Exec {
            agent,
            command,
            args,
        } => exec(&config, config_path, &agent, &command, &args).await,
        Commands::Plugins { action } => plugins(&config, action).await,
        Commands::Generate { target } => generate(&config, target).await,
        Commands::Workflow { action } => {
            let workshop = WorkshopService::new(&config.workshop, activity(&config));
            match action {
                WorkflowAction::Run { name, params } => {
                    let params: Value = serde_json::from_str(&params)
                        .with_context(|| format!("invalid --params JSON: {}", params))?;
                    match workshop.execute_workflow(&name, &params).await {
                        Ok(results) => {
                            print_json(&json!({ "workflow": name, "steps": results }))?;
                            Ok(0)
                        }
                        Err(e) => print_error(e),
                    }
                }
                WorkflowAction::List => {
                    print_json(&workshop.list_workflows()?)?;
                    Ok(0)
                }
            }
        }
        Commands::Tools {
            action: ToolsAction::List,
        } => {
            let workshop = WorkshopService::new(&config.workshop, activity(&config));
            print_json(&workshop.list_tools()?)?;
            Ok(0)
        }
        Commands::Llm {
            action: LlmAction::Status,
        } => llm_status(&config).await,
    }
}

fn activity(config: &Config) -> Arc<ActivityLog> {
    Arc::new(ActivityLog::new(config.logging.clone()))
}

fn executor(config: &Config, config_path: Option<&Path>) -> Result<AgentExecutor> {
    let mut executor = AgentExecutor::new(config.executor.clone(), activity(config));
    executor.register_builtin_agents(config_path)?;

    if config.executor.agents_dir.is_dir() {
        executor.load_agents()?;
    } else {
        debug!(
            "No agents directory at {}",
            config.executor.agents_dir.display()
        );
    }
    Ok(executor)
}

async fn exec(
    config: &Config,
    config_path: Option<&Path>,
    agent: &str,
    command: &str,
    args: &[String],
) -> Result<i32> {
    let executor = executor(config, config_path)?;

    let outcome = match executor.initialize_agent(agent).await {
        Ok(()) => executor.execute_command(agent, command, args).await,
        Err(e) => Err(e),
    };
    executor.close_all_agents().await?;

    match outcome {
        Ok(response) => {
            let code = if response.is_success() { 0 } else { 1 };
            print_json(&response)?;
            Ok(code)
        }
        Err(e) => print_error(e),
    }
}

async fn plugins(config: &Config, action: PluginAction) -> Result<i32> {
    let mut manager = PluginManager::new(&config.plugins, activity(config));

    match action {
        PluginAction::List => {
            manager.load_plugins();
            print_json(&manager.list_plugins())?;
        }
        PluginAction::Enable { name } => {
            manager.enable_plugin(&name)?;
            print_json(&json!({ "success": true, "plugin": name, "enabled": true }))?;
        }
        PluginAction::Disable { name } => {
            manager.disable_plugin(&name)?;
            print_json(&json!({ "success": true, "plugin": name, "enabled": false }))?;
        }
        PluginAction::Hook { name, args } => {
            manager.load_plugins();
            let args = args.iter().map(|a| json_arg(a)).collect();
            match manager.execute_hook(&name, args).await {
                Ok(results) => print_json(&json!({ "hook": name, "results": results }))?,
                Err(e) => return print_error(e),
            }
        }
        PluginAction::Invoke { name, input } => {
            manager.load_plugins();
            let input = input.as_deref().map(json_arg).unwrap_or(Value::Null);
            match manager.invoke_plugin(&name, input).await {
                Ok(result) => print_json(&json!({ "plugin": name, "result": result }))?,
                Err(e) => return print_error(e),
            }
        }
        PluginAction::Create {
            name,
            exe,
            description,
            hooks,
        } => {
            let executable = std::fs::read_to_string(&exe)
                .with_context(|| format!("failed to read {}", exe.display()))?;
            let manifest = PluginManifest {
                description,
                hooks,
                ..PluginManifest::default()
            };
            let loaded = manager.create_plugin(&name, manifest, &executable)?;
            let plugin = manager.list_plugins().into_iter().find(|p| p.name == name);
            print_json(&json!({ "success": true, "loaded": loaded, "plugin": plugin }))?;
        }
    }
    Ok(0)
}

async fn llm_status(config: &Config) -> Result<i32> {
    let gateway = LlmGateway::from_config(config)?;
    let model = gateway.model().to_string();
    let health = gateway.health_check().await;

    let mut status = json!({
        "provider": config.llm.provider,
        "model": model,
        "healthy": health.is_ok(),
        "error": health.as_ref().err().map(|e| e.to_string()),
        "remainingRequests": gateway.limiter().remaining_requests(&model),
        "resetTime": gateway.limiter().reset_time(&model),
        "cooldown": gateway.limiter().cooldown_status(&model),
    });

    if config.llm.provider == "ollama" {
        let ollama = OllamaClient::new(&config.llm)?;
        status["models"] = json!(ollama.list_models().await.unwrap_or_default());
        status["available"] = json!(ollama.check_model_availability(&model).await);
    }

    print_json(&status)?;
    Ok(if health.is_ok() { 0 } else { 1 })
}

async fn generate(config: &Config, target: GenerateTarget) -> Result<i32> {
    let activity = activity(config);
    let llm = Arc::new(LlmGateway::from_config(config)?);
    let github = Arc::new(GitHubClient::new(&config.github, config.github_token())?);
    let generator = GeneratorService::new(llm, github, &config.github, Arc::clone(&activity));
    let workshop = WorkshopService::new(&config.workshop, activity);

    let output = match target {
        GenerateTarget::Tool { prompt, save } => match generator.generate_tool(&prompt).await {
            Ok(report) => {
                let saved = if save {
                    workshop.ensure_layout()?;
                    Some(workshop.create_tool(&report.specification)?)
                } else {
                    None
                };
                json!({ "report": report, "saved": saved })
            }
            Err(e) => return generation_failed(e, &generator),
        },
        GenerateTarget::Workflow { prompt, save } => {
            match generator.generate_workflow(&prompt).await {
                Ok(report) => {
                    let saved = if save {
                        workshop.ensure_layout()?;
                        Some(workshop.create_workflow(&report.specification)?)
                    } else {
                        None
                    };
                    json!({ "report": report, "saved": saved })
                }
                Err(e) => return generation_failed(e, &generator),
            }
        }
    };

    print_json(&output)?;
    Ok(0)
}

fn generation_failed(error: crate::error::GeneratorError, generator: &GeneratorService) -> Result<i32> {
    print_json(&json!({
        "status": "error",
        "error": error.to_string(),
        "rawOutput": error.raw_output(),
        "state": generator.last_state(),
    }))?;
    Ok(1)
}
