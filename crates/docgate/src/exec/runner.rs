//! External program invocation with per-program mutual exclusion
//!
//! One `ProcessRunner` is shared by every collaborator. It guarantees that
//! no two invocations of the same program basename ever overlap, captures
//! the child's output up to a byte cap, and kills children that outlive
//! their configured timeout.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::config::ScriptsConfig;
use crate::error::{Error, Result};

/// Outcome of a single program invocation.
///
/// Produced exactly once per run and handed back to the unit of work that
/// requested it. The runner reports the exit state as-is; classifying a
/// non-zero code is the caller's business.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub job_id: String,
    /// Program basename, the exclusivity key.
    pub program: String,
    /// Exit code; `None` when the child was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured stdout, truncated to the capture limit.
    pub stdout: String,
    /// Captured stderr, truncated to the capture limit.
    pub stderr: String,
    /// Whether the timeout clock fired and the child was killed.
    pub timed_out: bool,
    pub duration: Duration,
}

impl RunOutput {
    /// Exit code 0 and no timeout kill.
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs external programs, at most one invocation per basename at a time.
pub struct ProcessRunner {
    /// Programs currently in flight, keyed by basename.
    running: Arc<DashMap<String, ()>>,
    supported_extensions: Vec<String>,
    timeouts: HashMap<String, Duration>,
    default_timeout: Duration,
    capture_limit: usize,
}

impl ProcessRunner {
    pub fn new(config: &ScriptsConfig) -> Self {
        Self {
            running: Arc::new(DashMap::new()),
            supported_extensions: config.supported_extensions.clone(),
            timeouts: config
                .timeouts_ms
                .iter()
                .map(|(name, ms)| (name.clone(), Duration::from_millis(*ms)))
                .collect(),
            default_timeout: Duration::from_millis(config.default_timeout_ms),
            capture_limit: config.capture_limit,
        }
    }

    /// Whether an invocation of this basename is currently in flight.
    pub fn is_running(&self, basename: &str) -> bool {
        self.running.contains_key(basename)
    }

    fn timeout_for(&self, basename: &str) -> Duration {
        self.timeouts
            .get(basename)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Invoke `program` with `args`.
    ///
    /// Fails fast, without spawning, when the extension is not supported or
    /// an invocation of the same basename is still in flight. Otherwise
    /// resolves once the child exits — on its own or via timeout kill.
    /// The in-flight flag is released on every exit path.
    pub async fn run(&self, program: &Path, args: &[String], job_id: &str) -> Result<RunOutput> {
        let basename = program
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::BadRequest(format!("invalid program path: {}", program.display()))
            })?
            .to_string();

        let extension = program.extension().and_then(|e| e.to_str()).unwrap_or("");
        if !self
            .supported_extensions
            .iter()
            .any(|e| e.eq_ignore_ascii_case(extension))
        {
            return Err(Error::UnsupportedExtension(basename));
        }

        match self.running.entry(basename.clone()) {
            Entry::Occupied(_) => return Err(Error::AlreadyRunning(basename)),
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }
        let _guard = RunningGuard {
            running: Arc::clone(&self.running),
            key: basename.clone(),
        };

        let started = Instant::now();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: basename.clone(),
                source,
            })?;

        let stdout_pipe = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("child stdout was not captured".to_string()))?;
        let stderr_pipe = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("child stderr was not captured".to_string()))?;

        let cap = self.capture_limit;
        let stdout_task = tokio::spawn(read_capped(stdout_pipe, cap));
        let stderr_task = tokio::spawn(read_capped(stderr_pipe, cap));

        let timeout = self.timeout_for(&basename);
        let mut timed_out = false;
        let status = tokio::select! {
            status = child.wait() => status?,
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(
                    job_id,
                    program = %basename,
                    timeout_ms = timeout.as_millis() as u64,
                    "program exceeded its timeout, killing"
                );
                timed_out = true;
                child.start_kill().ok();
                child.wait().await?
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        let output = RunOutput {
            job_id: job_id.to_string(),
            program: basename.clone(),
            exit_code: status.code(),
            stdout,
            stderr,
            timed_out,
            duration: started.elapsed(),
        };
        tracing::debug!(
            job_id,
            program = %basename,
            exit_code = ?output.exit_code,
            timed_out,
            duration_ms = output.duration.as_millis() as u64,
            "program finished"
        );
        Ok(output)
    }
}

/// Clears the in-flight flag when dropped, whatever the exit path was.
struct RunningGuard {
    running: Arc<DashMap<String, ()>>,
    key: String,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running.remove(&self.key);
    }
}

/// Drain a child pipe into a buffer capped at `limit` bytes.
///
/// Bytes past the cap are read and discarded so the child can never block
/// on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut buf = Vec::with_capacity(limit.min(8192));
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                if buf.len() < limit {
                    let take = n.min(limit - buf.len());
                    buf.extend_from_slice(&chunk[..take]);
                }
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "{}", body).unwrap();
        drop(file);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path
    }

    fn runner_with(config: ScriptsConfig) -> ProcessRunner {
        ProcessRunner::new(&config)
    }

    #[tokio::test]
    async fn captures_exit_code_and_output() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "report.sh", "echo hello\necho oops >&2\nexit 3");
        let runner = runner_with(ScriptsConfig::default());

        let output = runner.run(&script, &[], "job-1").await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(output.stdout.contains("hello"));
        assert!(output.stderr.contains("oops"));
        assert!(!output.timed_out);
        assert!(!output.succeeded());
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "ok.sh", "exit 0");
        let runner = runner_with(ScriptsConfig::default());

        let output = runner.run(&script, &[], "job-2").await.unwrap();
        assert!(output.succeeded());
        assert_eq!(output.program, "ok.sh");
    }

    #[tokio::test]
    async fn passes_arguments_through() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "args.sh", "echo \"$1|$2|$3\"");
        let runner = runner_with(ScriptsConfig::default());

        let args = vec![
            "acmegas".to_string(),
            "delivery.pdf".to_string(),
            "{}".to_string(),
        ];
        let output = runner.run(&script, &args, "job-3").await.unwrap();
        assert!(output.stdout.contains("acmegas|delivery.pdf|{}"));
    }

    #[tokio::test]
    async fn rejects_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "notes.txt", "exit 0");
        let runner = runner_with(ScriptsConfig::default());

        let err = runner.run(&script, &[], "job-4").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedExtension(_)));
    }

    #[tokio::test]
    async fn spawn_failure_releases_the_flag() {
        let runner = runner_with(ScriptsConfig::default());
        let missing = Path::new("/nonexistent/ghost.sh");

        let err = runner.run(missing, &[], "job-5").await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
        assert!(!runner.is_running("ghost.sh"));

        // the basename is free for the next attempt
        let err = runner.run(missing, &[], "job-6").await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[tokio::test]
    async fn same_basename_cannot_overlap() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "slow.sh", "sleep 0.3");
        let runner = runner_with(ScriptsConfig::default());

        let (first, second) = tokio::join!(
            runner.run(&script, &[], "job-7"),
            runner.run(&script, &[], "job-8"),
        );
        let outcomes = [first, second];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(Error::AlreadyRunning(name)) if name == "slow.sh")));

        // flag cleared after completion
        assert!(!runner.is_running("slow.sh"));
        assert!(runner.run(&script, &[], "job-9").await.is_ok());
    }

    #[tokio::test]
    async fn timeout_kills_and_still_resolves() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "slow.sh", "sleep 0.5");
        let mut config = ScriptsConfig::default();
        config.timeouts_ms.insert("slow.sh".to_string(), 100);
        let runner = runner_with(config);

        let started = Instant::now();
        let output = runner.run(&script, &[], "job-10").await.unwrap();
        assert!(output.timed_out);
        assert!(!output.succeeded());
        assert!(
            started.elapsed() < Duration::from_millis(450),
            "kill took {:?}",
            started.elapsed()
        );
        #[cfg(unix)]
        assert_eq!(output.exit_code, None);
        assert!(!runner.is_running("slow.sh"));
    }

    #[tokio::test]
    async fn output_is_capped() {
        let dir = TempDir::new().unwrap();
        let script = write_script(
            &dir,
            "chatty.sh",
            "i=0\nwhile [ $i -lt 2000 ]; do echo 0123456789; i=$((i+1)); done",
        );
        let config = ScriptsConfig {
            capture_limit: 100,
            ..ScriptsConfig::default()
        };
        let runner = runner_with(config);

        let output = runner.run(&script, &[], "job-11").await.unwrap();
        assert!(output.stdout.len() <= 100);
        assert!(output.succeeded());
    }
}
