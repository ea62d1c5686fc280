//! Process manager — runs generated code and shell commands in the isolated
//! execution environment and keeps a registry of live processes.
//!
//! Every process is started in its own process group so that stopping it
//! also stops anything it forked. Processes outlive the tool call that
//! started them: a call that times out leaves the process registered and
//! running until it exits, is awaited again, or is stopped by id. Exited
//! processes are reaped whenever the registry is listed or a stop is
//! requested, and only the tail of each output stream is kept.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use patchloop_core::error::ProcessError;
use patchloop_core::message::Turn;
use patchloop_core::model::{Model, ModelRequest};
use patchloop_telemetry::{ModelRole, TokenTracker};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type ProcessId = String;

/// How long to wait for output readers after a process exits.
const READER_DRAIN: Duration = Duration::from_secs(1);
/// Grace period between a stop signal and a hard kill.
const REAP_GRACE: Duration = Duration::from_secs(5);
/// Bytes kept per output stream; older output is discarded.
pub const OUTPUT_LIMIT: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// The process exited with this code (-1 when killed by a signal).
    Exited(i32),
    /// Still running when the wait timed out.
    Running,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub id: ProcessId,
    pub stdout: String,
    pub stderr: String,
    pub status: ProcessStatus,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status == ProcessStatus::Exited(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotFound,
}

/// Terminates a whole process group given its leader's pid.
pub trait Terminator: Send + Sync {
    fn terminate(&self, pid: u32) -> std::io::Result<()>;
}

/// Sends `SIGTERM` to the process group.
#[cfg(unix)]
pub struct ProcessGroupTerminator;

#[cfg(unix)]
impl Terminator for ProcessGroupTerminator {
    fn terminate(&self, pid: u32) -> std::io::Result<()> {
        let pgid = libc::pid_t::try_from(pid)
            .map_err(|_| std::io::Error::other(format!("pid {pid} out of range")))?;
        // SAFETY: killpg has no memory-safety preconditions.
        let rc = unsafe { libc::killpg(pgid, libc::SIGTERM) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }
}

/// Kills the process tree with `taskkill`.
#[cfg(not(unix))]
pub struct TaskkillTerminator;

#[cfg(not(unix))]
impl Terminator for TaskkillTerminator {
    fn terminate(&self, pid: u32) -> std::io::Result<()> {
        let status = std::process::Command::new("taskkill")
            .args(["/T", "/F", "/PID", &pid.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if status.success() {
            Ok(())
        } else {
            Err(std::io::Error::other(format!("taskkill exited with {status}")))
        }
    }
}

/// The terminator for the current platform.
pub fn platform_terminator() -> Arc<dyn Terminator> {
    #[cfg(unix)]
    {
        Arc::new(ProcessGroupTerminator)
    }
    #[cfg(not(unix))]
    {
        Arc::new(TaskkillTerminator)
    }
}

/// A prepared directory plus the interpreter used for generated code.
///
/// The directory is created lazily on first use and reused afterwards.
pub struct ExecutionEnvironment {
    dir: PathBuf,
    interpreter: String,
    prepared: OnceCell<()>,
}

impl ExecutionEnvironment {
    pub fn new(dir: impl Into<PathBuf>, interpreter: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            interpreter: interpreter.into(),
            prepared: OnceCell::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    async fn prepare(&self) -> Result<(), ProcessError> {
        self.prepared
            .get_or_try_init(|| async {
                let scripts = self.dir.join("scripts");
                tokio::fs::create_dir_all(&scripts).await.map_err(|e| {
                    ProcessError::Environment(format!("{}: {e}", scripts.display()))
                })?;
                info!(dir = %self.dir.display(), interpreter = %self.interpreter, "Execution environment ready");
                Ok::<(), ProcessError>(())
            })
            .await
            .map(|_| ())
    }

    fn script_path(&self, id: &str) -> PathBuf {
        let program = Path::new(&self.interpreter)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let extension = if program.starts_with("python") {
            "py"
        } else if program.starts_with("node") {
            "js"
        } else {
            "sh"
        };
        self.dir.join("scripts").join(format!("code_{id}.{extension}"))
    }
}

type OutputBuffer = Arc<std::sync::Mutex<Vec<u8>>>;

struct ProcessRecord {
    pid: Option<u32>,
    child: Arc<Mutex<Child>>,
    started_at: DateTime<Utc>,
    stdout: OutputBuffer,
    stderr: OutputBuffer,
    readers: Vec<JoinHandle<()>>,
}

/// Registry of processes started in the execution environment.
pub struct ProcessManager {
    env: Arc<ExecutionEnvironment>,
    registry: Arc<Mutex<HashMap<ProcessId, ProcessRecord>>>,
    next_id: AtomicU64,
    terminator: Arc<dyn Terminator>,
}

impl ProcessManager {
    pub fn new(env: Arc<ExecutionEnvironment>, terminator: Arc<dyn Terminator>) -> Self {
        Self {
            env,
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            terminator,
        }
    }

    pub fn environment(&self) -> &ExecutionEnvironment {
        &self.env
    }

    /// Write `code` to a script in the environment and start it.
    pub async fn spawn(&self, code: &str) -> Result<ProcessId, ProcessError> {
        self.env.prepare().await?;
        let id = self.allocate_id();
        let script = self.env.script_path(&id);
        tokio::fs::write(&script, code)
            .await
            .map_err(|e| ProcessError::Environment(format!("{}: {e}", script.display())))?;

        let mut command = Command::new(self.env.interpreter());
        command.arg(&script).current_dir(self.env.dir());
        self.launch(id, command).await
    }

    /// Start a shell command in `cwd`.
    pub async fn spawn_command(&self, cmd: &str, cwd: &Path) -> Result<ProcessId, ProcessError> {
        let id = self.allocate_id();
        let mut command = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", cmd]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", cmd]);
            c
        };
        command.current_dir(cwd);
        self.launch(id, command).await
    }

    fn allocate_id(&self) -> ProcessId {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    async fn launch(&self, id: ProcessId, mut command: Command) -> Result<ProcessId, ProcessError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;
        let pid = child.id();

        let stdout = OutputBuffer::default();
        let stderr = OutputBuffer::default();
        let mut readers = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            readers.push(spawn_reader(out, stdout.clone()));
        }
        if let Some(err) = child.stderr.take() {
            readers.push(spawn_reader(err, stderr.clone()));
        }

        let record = ProcessRecord {
            pid,
            child: Arc::new(Mutex::new(child)),
            started_at: Utc::now(),
            stdout,
            stderr,
            readers,
        };
        self.registry.lock().await.insert(id.clone(), record);
        info!(id = %id, pid = ?pid, "Process started");
        Ok(id)
    }

    /// Wait up to `timeout` for process `id` to exit.
    ///
    /// An exited process is deregistered. On timeout the process keeps
    /// running and stays registered; the result carries the output so far.
    pub async fn await_result(
        &self,
        id: &str,
        timeout: Duration,
    ) -> Result<ExecutionResult, ProcessError> {
        let (child, stdout, stderr) = {
            let registry = self.registry.lock().await;
            let record = registry
                .get(id)
                .ok_or_else(|| ProcessError::NotFound(id.to_string()))?;
            (
                record.child.clone(),
                record.stdout.clone(),
                record.stderr.clone(),
            )
        };

        let waited = {
            let mut child = child.lock().await;
            tokio::time::timeout(timeout, child.wait()).await
        };

        let status = match waited {
            Err(_) => {
                debug!(id, "Process still running after timeout");
                ProcessStatus::Running
            }
            Ok(Err(e)) => {
                return Err(ProcessError::WaitFailed {
                    id: id.to_string(),
                    reason: e.to_string(),
                });
            }
            Ok(Ok(exit)) => {
                let record = self.registry.lock().await.remove(id);
                if let Some(record) = record {
                    for reader in record.readers {
                        if tokio::time::timeout(READER_DRAIN, reader).await.is_err() {
                            warn!(id, "Output reader did not finish");
                        }
                    }
                    debug!(id, elapsed_ms = (Utc::now() - record.started_at).num_milliseconds(), "Process exited");
                }
                ProcessStatus::Exited(exit.code().unwrap_or(-1))
            }
        };

        Ok(ExecutionResult {
            id: id.to_string(),
            stdout: snapshot(&stdout),
            stderr: snapshot(&stderr),
            status,
        })
    }

    /// Terminate process `id` and its group, then deregister it.
    ///
    /// A process that already exited on its own is reaped and reported as
    /// not found.
    pub async fn stop(&self, id: &str) -> StopOutcome {
        let record = {
            let mut registry = self.registry.lock().await;
            reap_exited(&mut registry);
            registry.remove(id)
        };
        let Some(record) = record else {
            return StopOutcome::NotFound;
        };

        if let Some(pid) = record.pid
            && let Err(e) = self.terminator.terminate(pid)
        {
            warn!(id, pid, error = %e, "Failed to signal process group");
        }

        let child = record.child;
        tokio::spawn(async move {
            let mut child = child.lock().await;
            if tokio::time::timeout(REAP_GRACE, child.wait()).await.is_err() {
                let _ = child.kill().await;
            }
        });

        info!(id, "Process stopped");
        StopOutcome::Stopped
    }

    /// Stop every registered process.
    pub async fn stop_all(&self) -> usize {
        let ids = self.running().await;
        for id in &ids {
            self.stop(id).await;
        }
        ids.len()
    }

    /// Ids of live processes in start order.
    pub async fn running(&self) -> Vec<ProcessId> {
        let mut registry = self.registry.lock().await;
        reap_exited(&mut registry);
        let mut ids: Vec<ProcessId> = registry.keys().cloned().collect();
        ids.sort_by_key(|id| id.parse::<u64>().unwrap_or(u64::MAX));
        ids
    }
}

/// Drop records whose process has exited. A process whose child is locked
/// is being awaited and stays registered.
fn reap_exited(registry: &mut HashMap<ProcessId, ProcessRecord>) {
    registry.retain(|id, record| {
        let Ok(mut child) = record.child.try_lock() else {
            return true;
        };
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(
                    id = %id,
                    code = ?status.code(),
                    elapsed_ms = (Utc::now() - record.started_at).num_milliseconds(),
                    "Reaped exited process"
                );
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(id = %id, error = %e, "Could not poll process");
                true
            }
        }
    });
}

/// Append `chunk`, keeping at most the last `limit` bytes.
fn push_tail(buffer: &mut Vec<u8>, chunk: &[u8], limit: usize) {
    buffer.extend_from_slice(chunk);
    if buffer.len() > limit {
        let excess = buffer.len() - limit;
        buffer.drain(..excess);
    }
}

fn spawn_reader<R>(mut source: R, sink: OutputBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match source.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => push_tail(
                    &mut sink.lock().unwrap_or_else(PoisonError::into_inner),
                    &buf[..n],
                    OUTPUT_LIMIT,
                ),
            }
        }
    })
}

fn snapshot(buffer: &OutputBuffer) -> String {
    String::from_utf8_lossy(&buffer.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
}

const ANALYZER_PROMPT: &str = "You analyze the result of running a piece of code. Explain \
briefly what the output shows, whether the run succeeded, and what to fix if it failed.";

/// Summarizes an execution with the model.
#[async_trait]
pub trait ExecutionSummary: Send + Sync {
    async fn analyze(&self, code: &str, result: &ExecutionResult) -> Option<String>;
}

/// [`ExecutionSummary`] backed by the model; tokens count as code execution.
pub struct ExecutionAnalyzer {
    model: Arc<dyn Model>,
    tracker: Arc<TokenTracker>,
}

impl ExecutionAnalyzer {
    pub fn new(model: Arc<dyn Model>, tracker: Arc<TokenTracker>) -> Self {
        Self { model, tracker }
    }
}

#[async_trait]
impl ExecutionSummary for ExecutionAnalyzer {
    async fn analyze(&self, code: &str, result: &ExecutionResult) -> Option<String> {
        let status = match result.status {
            ProcessStatus::Exited(code) => format!("exited with code {code}"),
            ProcessStatus::Running => "still running".to_string(),
        };
        let prompt = format!(
            "Code:\n```\n{code}\n```\n\nStatus: {status}\n\nStdout:\n{}\n\nStderr:\n{}",
            result.stdout, result.stderr
        );
        let request = ModelRequest::text_only(ANALYZER_PROMPT, vec![Turn::user(prompt)]);

        match self.model.generate(request).await {
            Ok(response) => {
                self.tracker.record(
                    ModelRole::CodeExecution,
                    response.usage.prompt_count,
                    response.usage.candidate_count,
                );
                let text = response.joined_text();
                (!text.trim().is_empty()).then_some(text)
            }
            Err(e) => {
                warn!(id = %result.id, error = %e, "Execution analysis failed");
                None
            }
        }
    }
}
