//! Agent executor
//!
//! Spawns configured agent processes and multiplexes commands over their
//! stdio. Every request carries a correlation id; a reader task per agent
//! routes responses back to the waiting caller, so several commands may be
//! in flight at once and may complete in any order.

use super::protocol::{AgentRequest, AgentResponse};
use super::AgentKind;
use crate::config::ExecutorConfig;
use crate::error::{ConfigError, ExecutorError};
use crate::logging::{ActivityLog, LogEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Grace period between closing stdin and killing an agent
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// How to start one agent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentConfig {
    /// Agent id; defaults to the config file stem
    #[serde(default)]
    pub id: String,
    /// Program to execute
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the process
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AgentConfig {
    /// Config for a built-in agent hosted by `exe`
    pub fn builtin(kind: AgentKind, exe: &Path, config_file: Option<&Path>) -> Self {
        let mut args = Vec::new();
        if let Some(file) = config_file {
            args.push("--config".to_string());
            args.push(file.display().to_string());
        }
        args.push("agent".to_string());
        args.push(kind.name().to_string());

        Self {
            id: kind.agent_id(),
            command: exe.display().to_string(),
            args,
            env: HashMap::new(),
            description: Some(format!("built-in {} agent", kind.name())),
        }
    }
}

type Reply = Result<AgentResponse, ExecutorError>;

/// In-flight requests for one agent, oldest first
#[derive(Default)]
struct PendingRequests {
    waiting: HashMap<String, oneshot::Sender<Reply>>,
    order: VecDeque<String>,
}

impl PendingRequests {
    fn insert(&mut self, id: String, tx: oneshot::Sender<Reply>) {
        self.order.push_back(id.clone());
        self.waiting.insert(id, tx);
    }

    fn take(&mut self, id: &str) -> Option<oneshot::Sender<Reply>> {
        let tx = self.waiting.remove(id)?;
        self.order.retain(|queued| queued != id);
        Some(tx)
    }

    fn take_oldest(&mut self) -> Option<oneshot::Sender<Reply>> {
        while let Some(id) = self.order.pop_front() {
            if let Some(tx) = self.waiting.remove(&id) {
                return Some(tx);
            }
        }
        None
    }

    fn len(&self) -> usize {
        self.waiting.len()
    }

    fn drain(&mut self) -> Vec<oneshot::Sender<Reply>> {
        self.order.clear();
        self.waiting.drain().map(|(_, tx)| tx).collect()
    }
}

type SharedPending = Arc<StdMutex<PendingRequests>>;
type LiveAgents = Arc<Mutex<HashMap<String, Arc<AgentHandle>>>>;

fn lock(pending: &StdMutex<PendingRequests>) -> MutexGuard<'_, PendingRequests> {
    match pending.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A running agent process
struct AgentHandle {
    id: String,
    generation: uuid::Uuid,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Child>,
    pending: SharedPending,
    exited: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl AgentHandle {
    async fn send(&self, line: &str) -> Result<(), ExecutorError> {
        let mut stdin = self.stdin.lock().await;
        let pipe = stdin
            .as_mut()
            .ok_or_else(|| ExecutorError::AgentNotRunning(self.id.clone()))?;

        let write_err = |e: std::io::Error| ExecutorError::Write {
            agent: self.id.clone(),
            reason: e.to_string(),
        };
        pipe.write_all(line.as_bytes()).await.map_err(write_err)?;
        pipe.flush().await.map_err(write_err)
    }

    /// Close stdin, give the process a moment to exit, then kill it
    async fn shutdown(&self) {
        self.stdin.lock().await.take();

        let mut child = self.child.lock().await;
        match tokio::time::timeout(CLOSE_GRACE, child.wait()).await {
            Ok(Ok(status)) => debug!("Agent {} exited with {}", self.id, status),
            Ok(Err(e)) => warn!("Failed to wait for agent {}: {}", self.id, e),
            Err(_) => {
                warn!("Agent {} ignored EOF, killing", self.id);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill agent {}: {}", self.id, e);
                }
            }
        }

        fail_pending(&self.id, &self.pending);
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn fail_pending(agent: &str, pending: &StdMutex<PendingRequests>) {
    let orphans = lock(pending).drain();
    for tx in orphans {
        let _ = tx.send(Err(ExecutorError::AgentExited(agent.to_string())));
    }
}

/// Route one stdout line to the request it answers.
///
/// Responses with an id go to that request; responses without one go to
/// the oldest pending request. A line that is not JSON fails the oldest
/// pending request, or is treated as chatter when nothing is waiting.
fn route_line(agent: &str, pending: &StdMutex<PendingRequests>, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match AgentResponse::from_line(line) {
        Ok(response) => {
            let waiter = {
                let mut pending = lock(pending);
                match response.id.as_deref() {
                    Some(id) => pending.take(id),
                    None => pending.take_oldest(),
                }
            };
            match waiter {
                Some(tx) => {
                    let _ = tx.send(Ok(response));
                }
                None => debug!("{}: dropping unsolicited response {:?}", agent, response.id),
            }
        }
        Err(_) => match lock(pending).take_oldest() {
            Some(tx) => {
                let _ = tx.send(Err(ExecutorError::ResponseParse {
                    raw: line.to_string(),
                }));
            }
            None => debug!("{}: {}", agent, line),
        },
    }
}

/// Spawns agents and routes commands to them
pub struct AgentExecutor {
    config: ExecutorConfig,
    configs: BTreeMap<String, AgentConfig>,
    live: LiveAgents,
    activity: Arc<ActivityLog>,
}

impl AgentExecutor {
    pub fn new(config: ExecutorConfig, activity: Arc<ActivityLog>) -> Self {
        Self {
            config,
            configs: BTreeMap::new(),
            live: Arc::new(Mutex::new(HashMap::new())),
            activity,
        }
    }

    /// Register an agent configuration, replacing one with the same id
    pub fn register(&mut self, config: AgentConfig) {
        debug!("Registered agent {}", config.id);
        self.configs.insert(config.id.clone(), config);
    }

    /// Register the agents hosted by this binary
    pub fn register_builtin_agents(&mut self, config_file: Option<&Path>) -> Result<(), ExecutorError> {
        let exe = std::env::current_exe().map_err(|e| ExecutorError::Spawn {
            agent: "built-in".to_string(),
            reason: e.to_string(),
        })?;

        for kind in AgentKind::ALL {
            self.register(AgentConfig::builtin(kind, &exe, config_file));
        }
        Ok(())
    }

    /// Load every `*.json` / `*.toml` agent config from the agents directory.
    ///
    /// Malformed files are skipped with a warning. Returns how many loaded.
    pub fn load_agents(&mut self) -> Result<usize, ExecutorError> {
        let dir = self.config.agents_dir.clone();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| ConfigError::Read(format!("{}: {}", dir.display(), e)))?;

        let mut paths: Vec<_> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("json") | Some("toml")
                )
            })
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            match load_agent_file(&path) {
                Ok(config) => {
                    self.register(config);
                    loaded += 1;
                }
                Err(e) => warn!("Skipping agent config {}: {}", path.display(), e),
            }
        }

        info!("Loaded {} agent configs from {}", loaded, dir.display());
        Ok(loaded)
    }

    pub fn list_configured_agents(&self) -> Vec<&AgentConfig> {
        self.configs.values().collect()
    }

    /// Ids of agents with a live process, sorted
    pub async fn list_active_agents(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.live.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Start an agent process. Starting a running agent is a no-op.
    pub async fn initialize_agent(&self, id: &str) -> Result<(), ExecutorError> {
        let config = self
            .configs
            .get(id)
            .ok_or_else(|| ExecutorError::AgentNotFound(id.to_string()))?;

        let mut live = self.live.lock().await;
        if live.contains_key(id) {
            debug!("Agent {} already running", id);
            return Ok(());
        }

        let spawn_err = |reason: String| ExecutorError::Spawn {
            agent: id.to_string(),
            reason,
        };

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| spawn_err(format!("{}: {}", config.command, e)))?;

        let stdin = child.stdin.take().ok_or_else(|| spawn_err("stdin unavailable".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| spawn_err("stdout unavailable".into()))?;
        let stderr = child.stderr.take().ok_or_else(|| spawn_err("stderr unavailable".into()))?;

        let generation = uuid::Uuid::new_v4();
        let pending: SharedPending = Arc::default();
        let exited = Arc::new(AtomicBool::new(false));

        let reader = tokio::spawn(read_responses(
            id.to_string(),
            stdout,
            Arc::clone(&pending),
            Arc::clone(&exited),
            Arc::clone(&self.live),
            generation,
            Arc::clone(&self.activity),
        ));
        let diagnostics = tokio::spawn(read_diagnostics(
            id.to_string(),
            stderr,
            Arc::clone(&self.activity),
        ));

        live.insert(
            id.to_string(),
            Arc::new(AgentHandle {
                id: id.to_string(),
                generation,
                stdin: Mutex::new(Some(stdin)),
                child: Mutex::new(child),
                pending,
                exited,
                tasks: vec![reader, diagnostics],
            }),
        );

        info!("Started agent {} ({})", id, config.command);
        self.activity
            .record(LogEvent::AgentCommand, id, "agent started", None);
        Ok(())
    }

    /// Send one command and wait for its response
    pub async fn execute_command(
        &self,
        id: &str,
        command: &str,
        args: &[String],
    ) -> Result<AgentResponse, ExecutorError> {
        let handle = self.running(id).await?;

        let request = AgentRequest::new(command, args);
        let request_id = request.id.clone().unwrap_or_default();
        let line = request.to_line().map_err(|e| ExecutorError::Write {
            agent: id.to_string(),
            reason: e.to_string(),
        })?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = lock(&handle.pending);
            if pending.len() >= self.config.max_pending {
                return Err(ExecutorError::QueueFull {
                    agent: id.to_string(),
                    pending: pending.len(),
                });
            }
            pending.insert(request_id.clone(), tx);
        }

        // The reader may have drained the queue just before we inserted
        if handle.exited.load(Ordering::SeqCst) {
            lock(&handle.pending).take(&request_id);
            return Err(ExecutorError::AgentExited(id.to_string()));
        }

        self.activity.record(
            LogEvent::AgentCommand,
            id,
            &format!("{} {}", command, args.join(" ")),
            Some(serde_json::json!({ "request_id": request_id })),
        );

        if let Err(e) = handle.send(&line).await {
            lock(&handle.pending).take(&request_id);
            return Err(e);
        }

        let started = Instant::now();
        let timeout = Duration::from_secs(self.config.command_timeout);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => {
                let response = reply?;
                self.activity.record_timed(
                    LogEvent::AgentResponse,
                    id,
                    &format!("{} -> {:?}", command, response.status),
                    Some(serde_json::json!({ "request_id": request_id })),
                    Some(started.elapsed().as_millis() as u64),
                );
                Ok(response)
            }
            Ok(Err(_)) => Err(ExecutorError::AgentExited(id.to_string())),
            Err(_) => {
                lock(&handle.pending).take(&request_id);
                warn!("Agent {} timed out on '{}'", id, command);
                Err(ExecutorError::Timeout {
                    agent: id.to_string(),
                    timeout_secs: self.config.command_timeout,
                })
            }
        }
    }

    /// Stop an agent. Closing an agent that is not running is a no-op.
    pub async fn close_agent(&self, id: &str) -> Result<(), ExecutorError> {
        let handle = self.live.lock().await.remove(id);
        if let Some(handle) = handle {
            handle.shutdown().await;
            info!("Closed agent {}", id);
        }
        Ok(())
    }

    /// Stop every running agent
    pub async fn close_all_agents(&self) -> Result<(), ExecutorError> {
        let handles: Vec<_> = self.live.lock().await.drain().map(|(_, h)| h).collect();
        for handle in handles {
            handle.shutdown().await;
        }
        Ok(())
    }

    async fn running(&self, id: &str) -> Result<Arc<AgentHandle>, ExecutorError> {
        if let Some(handle) = self.live.lock().await.get(id) {
            return Ok(Arc::clone(handle));
        }
        if self.configs.contains_key(id) {
            Err(ExecutorError::AgentNotRunning(id.to_string()))
        } else {
            Err(ExecutorError::AgentNotFound(id.to_string()))
        }
    }
}

fn load_agent_file(path: &Path) -> Result<AgentConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;

    let mut config: AgentConfig = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?,
        _ => serde_json::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?,
    };

    if config.id.is_empty() {
        config.id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::MissingField("id".to_string()))?
            .to_string();
    }
    if config.command.is_empty() {
        return Err(ConfigError::MissingField("command".to_string()));
    }

    Ok(config)
}

async fn read_responses(
    agent: String,
    stdout: ChildStdout,
    pending: SharedPending,
    exited: Arc<AtomicBool>,
    live: LiveAgents,
    generation: uuid::Uuid,
    activity: Arc<ActivityLog>,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => route_line(&agent, &pending, &line),
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading from agent {}: {}", agent, e);
                break;
            }
        }
    }

    exited.store(true, Ordering::SeqCst);
    fail_pending(&agent, &pending);

    {
        let mut live = live.lock().await;
        if live.get(&agent).map(|h| h.generation) == Some(generation) {
            live.remove(&agent);
        }
    }

    info!("Agent {} closed its output", agent);
    activity.record(LogEvent::AgentExit, &agent, "agent output closed", None);
}

async fn read_diagnostics(agent: String, stderr: ChildStderr, activity: Arc<ActivityLog>) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        debug!("[{}] {}", agent, line);
        activity.record(LogEvent::AgentOutput, &agent, &line, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::protocol::ResponseStatus;

    fn reply_to(id: &str) -> String {
        format!(r#"{{"id":"{}","status":"success","result":"{}"}}"#, id, id)
    }

    #[test]
    fn test_route_by_id_out_of_order() {
        let pending = StdMutex::new(PendingRequests::default());
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        lock(&pending).insert("one".to_string(), tx1);
        lock(&pending).insert("two".to_string(), tx2);

        route_line("a", &pending, &reply_to("two"));
        route_line("a", &pending, &reply_to("one"));

        let first = rx1.try_recv().unwrap().unwrap();
        let second = rx2.try_recv().unwrap().unwrap();
        assert_eq!(first.result, Some(serde_json::json!("one")));
        assert_eq!(second.result, Some(serde_json::json!("two")));
    }

    #[test]
    fn test_route_without_id_is_fifo() {
        let pending = StdMutex::new(PendingRequests::default());
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        lock(&pending).insert("one".to_string(), tx1);
        lock(&pending).insert("two".to_string(), tx2);

        route_line("a", &pending, r#"{"status":"success","result":1}"#);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
        assert_eq!(lock(&pending).len(), 1);
    }

    #[test]
    fn test_route_non_json_rejects_oldest() {
        let pending = StdMutex::new(PendingRequests::default());
        let (tx, mut rx) = oneshot::channel();
        lock(&pending).insert("one".to_string(), tx);

        route_line("a", &pending, "Agent Ready");
        match rx.try_recv().unwrap() {
            Err(ExecutorError::ResponseParse { raw }) => assert_eq!(raw, "Agent Ready"),
            other => panic!("unexpected: {:?}", other),
        }

        // Nothing waiting: chatter is ignored
        route_line("a", &pending, "more chatter");
        assert_eq!(lock(&pending).len(), 0);
    }

    #[test]
    fn test_take_skips_removed_entries() {
        let mut pending = PendingRequests::default();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        pending.insert("one".to_string(), tx1);
        pending.insert("two".to_string(), tx2);

        assert!(pending.take("one").is_some());
        assert!(pending.take_oldest().is_some());
        assert!(pending.take_oldest().is_none());
    }

    #[test]
    fn test_load_agents_skips_malformed() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("files.json"),
            r#"{"command": "node", "args": ["agents/filesystem-agent.js"]}"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("search.toml"),
            "id = \"search-agent\"\ncommand = \"search-agent\"\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let config = ExecutorConfig {
            agents_dir: dir.path().to_path_buf(),
            ..ExecutorConfig::default()
        };
        let mut executor = AgentExecutor::new(config, Arc::new(ActivityLog::disabled()));

        assert_eq!(executor.load_agents().unwrap(), 2);
        let ids: Vec<_> = executor
            .list_configured_agents()
            .iter()
            .map(|c| c.id.clone())
            .collect();
        assert_eq!(ids, vec!["files", "search-agent"]);
    }

    #[test]
    fn test_load_agents_missing_dir() {
        let config = ExecutorConfig {
            agents_dir: "/nonexistent/agentforge/agents".into(),
            ..ExecutorConfig::default()
        };
        let mut executor = AgentExecutor::new(config, Arc::new(ActivityLog::disabled()));
        assert!(matches!(
            executor.load_agents(),
            Err(ExecutorError::ConfigLoad(_))
        ));
    }

    #[test]
    fn test_builtin_config_passes_config_file() {
        let config = AgentConfig::builtin(
            AgentKind::Filesystem,
            Path::new("/usr/bin/agentforge"),
            Some(Path::new("/etc/agentforge.toml")),
        );
        assert_eq!(config.id, "filesystem-agent");
        assert_eq!(
            config.args,
            vec!["--config", "/etc/agentforge.toml", "agent", "filesystem"]
        );
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        const ECHO_ID: &str = r#"while IFS= read -r line; do id=$(printf '%s' "$line" | sed 's/.*"id":"\([^"]*\)".*/\1/'); printf '{"id":"%s","status":"success","result":"%s"}\n' "$id" "$id"; done"#;

        const REVERSED: &str = r#"IFS= read -r a; IFS= read -r b; for l in "$b" "$a"; do id=$(printf '%s' "$l" | sed 's/.*"id":"\([^"]*\)".*/\1/'); printf '{"id":"%s","status":"success","result":"%s"}\n' "$id" "$id"; done; cat > /dev/null"#;

        fn executor(timeout: u64, max_pending: usize, agents: &[(&str, &str)]) -> AgentExecutor {
            let config = ExecutorConfig {
                agents_dir: std::env::temp_dir(),
                command_timeout: timeout,
                max_pending,
            };
            let mut executor = AgentExecutor::new(config, Arc::new(ActivityLog::disabled()));
            for (id, script) in agents {
                executor.register(AgentConfig {
                    id: id.to_string(),
                    command: "sh".to_string(),
                    args: vec!["-c".to_string(), script.to_string()],
                    env: HashMap::new(),
                    description: None,
                });
            }
            executor
        }

        #[tokio::test]
        async fn test_execute_and_close() {
            let executor = executor(5, 16, &[("echo", ECHO_ID)]);
            executor.initialize_agent("echo").await.unwrap();
            // Second initialize is a no-op
            executor.initialize_agent("echo").await.unwrap();
            assert_eq!(executor.list_active_agents().await, vec!["echo"]);

            let response = executor
                .execute_command("echo", "list", &["/tmp".to_string()])
                .await
                .unwrap();
            assert_eq!(response.status, ResponseStatus::Success);
            assert_eq!(response.id.as_deref(), response.result.as_ref().and_then(|r| r.as_str()));

            executor.close_agent("echo").await.unwrap();
            executor.close_agent("echo").await.unwrap();
            assert!(executor.list_active_agents().await.is_empty());
        }

        #[tokio::test]
        async fn test_concurrent_commands_out_of_order() {
            let executor = executor(5, 16, &[("rev", REVERSED)]);
            executor.initialize_agent("rev").await.unwrap();

            let a = ["a".to_string()];
            let b = ["b".to_string()];
            let (first, second) = tokio::join!(
                executor.execute_command("rev", "read", &a),
                executor.execute_command("rev", "read", &b),
            );
            let first = first.unwrap();
            let second = second.unwrap();

            assert_ne!(first.id, second.id);
            for resp in [&first, &second] {
                assert_eq!(resp.id.as_deref(), resp.result.as_ref().and_then(|r| r.as_str()));
            }
            executor.close_all_agents().await.unwrap();
        }

        #[tokio::test]
        async fn test_unknown_and_stopped_agents() {
            let executor = executor(5, 16, &[("echo", ECHO_ID)]);

            assert!(matches!(
                executor.execute_command("ghost", "list", &[]).await,
                Err(ExecutorError::AgentNotFound(_))
            ));
            assert!(matches!(
                executor.execute_command("echo", "list", &[]).await,
                Err(ExecutorError::AgentNotRunning(_))
            ));
            assert!(matches!(
                executor.initialize_agent("ghost").await,
                Err(ExecutorError::AgentNotFound(_))
            ));
        }

        #[tokio::test]
        async fn test_spawn_failure() {
            let mut executor = executor(5, 16, &[]);
            executor.register(AgentConfig {
                id: "missing".to_string(),
                command: "/nonexistent/agent-binary".to_string(),
                args: vec![],
                env: HashMap::new(),
                description: None,
            });
            assert!(matches!(
                executor.initialize_agent("missing").await,
                Err(ExecutorError::Spawn { .. })
            ));
        }

        #[tokio::test]
        async fn test_timeout() {
            let executor = executor(1, 16, &[("silent", "cat > /dev/null")]);
            executor.initialize_agent("silent").await.unwrap();

            let err = executor
                .execute_command("silent", "list", &[])
                .await
                .unwrap_err();
            assert!(matches!(err, ExecutorError::Timeout { timeout_secs: 1, .. }));
            executor.close_all_agents().await.unwrap();
        }

        #[tokio::test]
        async fn test_queue_full() {
            let executor = executor(1, 1, &[("silent", "cat > /dev/null")]);
            executor.initialize_agent("silent").await.unwrap();

            let (first, second) = tokio::join!(
                executor.execute_command("silent", "one", &[]),
                async {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    executor.execute_command("silent", "two", &[]).await
                }
            );
            assert!(matches!(first, Err(ExecutorError::Timeout { .. })));
            assert!(matches!(second, Err(ExecutorError::QueueFull { pending: 1, .. })));
            executor.close_all_agents().await.unwrap();
        }

        #[tokio::test]
        async fn test_agent_exit_rejects_pending() {
            let executor = executor(5, 16, &[("quitter", "IFS= read -r line; exit 0")]);
            executor.initialize_agent("quitter").await.unwrap();

            let err = executor
                .execute_command("quitter", "list", &[])
                .await
                .unwrap_err();
            assert!(matches!(err, ExecutorError::AgentExited(_)));

            for _ in 0..50 {
                if executor.list_active_agents().await.is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            assert!(executor.list_active_agents().await.is_empty());
        }

        #[tokio::test]
        async fn test_non_json_reply_rejects() {
            let executor = executor(
                5,
                16,
                &[("chatty", "IFS= read -r line; echo not-json; cat > /dev/null")],
            );
            executor.initialize_agent("chatty").await.unwrap();

            let err = executor
                .execute_command("chatty", "list", &[])
                .await
                .unwrap_err();
            assert!(matches!(err, ExecutorError::ResponseParse { .. }));
            executor.close_all_agents().await.unwrap();
        }

        #[tokio::test]
        async fn test_stderr_does_not_reject() {
            let script = r#"while IFS= read -r line; do echo "warming up" >&2; echo '{"status":"success","result":"ok"}'; done"#;
            let executor = executor(5, 16, &[("noisy", script)]);
            executor.initialize_agent("noisy").await.unwrap();

            let response = executor.execute_command("noisy", "list", &[]).await.unwrap();
            assert_eq!(response.result, Some(serde_json::json!("ok")));
            executor.close_all_agents().await.unwrap();
        }
    }
}
