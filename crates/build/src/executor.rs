//! Supervised build subprocess.
//!
//! The command runs through the platform shell with the project directory
//! as its working directory. Output lines are relayed into the event sink
//! as they arrive: stdout lines as `info`, stderr lines as `error`.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use slipway_event_sink::EventSink;
use slipway_protocol::{Event, Level};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::BuildConfig;
use crate::error::BuildError;

/// Which pipe a relayed line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputStream::Stdout => "stdout",
            OutputStream::Stderr => "stderr",
        }
    }

    /// stderr is always reported as `error`, whatever the text says.
    pub fn level(&self) -> Level {
        match self {
            OutputStream::Stdout => Level::Info,
            OutputStream::Stderr => Level::Error,
        }
    }
}

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub exit_code: i32,
    pub duration: Duration,
    pub stdout_lines: usize,
    pub stderr_lines: usize,
}

/// Runs build commands as child processes.
#[derive(Debug, Clone, Default)]
pub struct BuildExecutor {
    shell: Option<String>,
    env: BTreeMap<String, String>,
}

impl BuildExecutor {
    pub fn new(config: &BuildConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            env: config.env.clone(),
        }
    }

    /// Runs `command` in `work_dir` and waits for it to exit.
    ///
    /// Resolves only after the process has exited *and* both output pipes
    /// are drained, so trailing lines are never lost. A non-zero exit
    /// status, or termination by a signal, is a [`BuildError::Failed`].
    pub async fn execute(
        &self,
        work_dir: &Path,
        command: &str,
        sink: &EventSink,
    ) -> Result<BuildOutcome, BuildError> {
        let started = Instant::now();
        let (shell, shell_args) = shell_command(self.shell.as_deref());

        info!(command, work_dir = %work_dir.display(), "starting build");
        debug!(shell = %shell, "spawning build process");

        let mut child = Command::new(&shell)
            .args(&shell_args)
            .arg(command)
            .current_dir(work_dir)
            .env("CI", "true")
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BuildError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("stdout pipe unavailable"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("stderr pipe unavailable"))?;

        let (stdout_lines, stderr_lines, status) = tokio::join!(
            relay(stdout, OutputStream::Stdout, sink),
            relay(stderr, OutputStream::Stderr, sink),
            child.wait(),
        );

        let status = status?;
        let stdout_lines = stdout_lines?;
        let stderr_lines = stderr_lines?;
        let duration = started.elapsed();

        debug!(
            code = ?status.code(),
            stdout_lines,
            stderr_lines,
            elapsed_ms = duration.as_millis() as u64,
            "build process exited"
        );

        if !status.success() {
            return Err(BuildError::Failed {
                code: status.code(),
            });
        }

        Ok(BuildOutcome {
            exit_code: status.code().unwrap_or(0),
            duration,
            stdout_lines,
            stderr_lines,
        })
    }
}

/// Forwards each line of `reader` to the sink until EOF.
///
/// Bytes that are not valid UTF-8 are replaced rather than dropped.
async fn relay<R: AsyncRead + Unpin>(
    reader: R,
    stream: OutputStream,
    sink: &EventSink,
) -> std::io::Result<usize> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut count = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let line = String::from_utf8_lossy(&buf);
        let text = line.trim_end_matches(['\n', '\r']);
        if text.is_empty() {
            continue;
        }

        sink.record(Event::new(stream.level(), text).with("stream", stream.as_str()));
        count += 1;
    }

    Ok(count)
}

/// Shell and arguments used to run a command string.
///
/// `/bin/sh -c` on Unix, `cmd /C` on Windows, unless overridden.
fn shell_command(override_shell: Option<&str>) -> (String, Vec<String>) {
    if let Some(shell) = override_shell {
        let args = if shell.contains("powershell") || shell.contains("pwsh") {
            vec!["-NoProfile".to_string(), "-Command".to_string()]
        } else if shell.contains("cmd") {
            vec!["/C".to_string()]
        } else {
            vec!["-c".to_string()]
        };
        return (shell.to_string(), args);
    }

    #[cfg(windows)]
    {
        ("cmd".to_string(), vec!["/C".to_string()])
    }

    #[cfg(not(windows))]
    {
        ("/bin/sh".to_string(), vec!["-c".to_string()])
    }
}
