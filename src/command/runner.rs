use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Output of a program that exited successfully
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout followed by stderr
    ///
    /// ffmpeg prints device listings on stderr, arecord on stdout; parsers
    /// read the combined text.
    pub fn combined(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        text.push_str(&self.stdout);
        if !self.stdout.is_empty() && !self.stdout.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&self.stderr);
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    #[error("'{program}' did not exit within {}ms", .timeout.as_millis())]
    Timeout { program: String, timeout: Duration },

    #[error("'{program}' exited with code {code:?}: {stderr}")]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("Failed to launch '{program}': {message}")]
    Spawn { program: String, message: String },
}

impl RunError {
    /// Everything the program printed before failing
    ///
    /// `ffmpeg -list_devices` exits non-zero by design, so listing parsers
    /// still need the text.
    pub fn output_text(&self) -> Option<String> {
        match self {
            RunError::NonZeroExit { stdout, stderr, .. } => Some(format!("{}\n{}", stdout, stderr)),
            _ => None,
        }
    }
}

/// Runs an external program with a hard timeout
#[async_trait::async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RunError>;
}

/// [`CommandRunner`] backed by real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait::async_trait]
impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RunError> {
        debug!("Running {} {:?} (timeout {}ms)", program, args, timeout.as_millis());

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })?;

        // One deadline covers the exit and draining both pipes
        let deadline = Instant::now() + timeout;
        let mut stdout_task = tokio::spawn(read_to_string(child.stdout.take()));
        let mut stderr_task = tokio::spawn(read_to_string(child.stderr.take()));

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                if let Err(kill_err) = child.kill().await {
                    warn!("Failed to kill {}: {}", program, kill_err);
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(RunError::Spawn {
                    program: program.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!("{} timed out after {}ms, killing it", program, timeout.as_millis());
                if let Err(kill_err) = child.kill().await {
                    warn!("Failed to kill {}: {}", program, kill_err);
                }
                stdout_task.abort();
                stderr_task.abort();
                return Err(RunError::Timeout {
                    program: program.to_string(),
                    timeout,
                });
            }
        };

        let drained = tokio::time::timeout_at(deadline, async {
            let stdout = (&mut stdout_task).await.unwrap_or_default();
            let stderr = (&mut stderr_task).await.unwrap_or_default();
            (stdout, stderr)
        })
        .await;
        let (stdout, stderr) = match drained {
            Ok(output) => output,
            Err(_) => {
                // A leftover grandchild still holds the pipes open
                warn!(
                    "{} exited but its output stayed open past {}ms",
                    program,
                    timeout.as_millis()
                );
                stdout_task.abort();
                stderr_task.abort();
                return Err(RunError::Timeout {
                    program: program.to_string(),
                    timeout,
                });
            }
        };

        if status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(RunError::NonZeroExit {
                program: program.to_string(),
                code: status.code(),
                stdout,
                stderr,
            })
        }
    }
}

async fn read_to_string<R: AsyncRead + Unpin>(pipe: Option<R>) -> String {
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut buf = Vec::new();
    if let Err(e) = pipe.read_to_end(&mut buf).await {
        debug!("Failed to read child output: {}", e);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined_joins_streams() {
        let output = CommandOutput {
            stdout: "default".to_string(),
            stderr: "[dshow] \"Mic\" (audio)".to_string(),
        };
        assert_eq!(output.combined(), "default\n[dshow] \"Mic\" (audio)");
    }

    #[test]
    fn test_output_text_only_for_exit_failures() {
        let timeout = RunError::Timeout {
            program: "sox".to_string(),
            timeout: Duration::from_millis(10),
        };
        assert!(timeout.output_text().is_none());

        let exit = RunError::NonZeroExit {
            program: "ffmpeg".to_string(),
            code: Some(1),
            stdout: String::new(),
            stderr: "devices".to_string(),
        };
        assert!(exit.output_text().unwrap().contains("devices"));
    }

    #[cfg(unix)]
    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_run_captures_both_streams() {
        let output = SystemRunner
            .run("sh", &sh("echo ok; echo note >&2"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.stdout, "ok\n");
        assert_eq!(output.stderr, "note\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_keeps_code_and_stderr() {
        let err = SystemRunner
            .run("sh", &sh("echo 'audio open error' >&2; exit 3"), Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            RunError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "audio open error\n");
            }
            other => panic!("expected non-zero exit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = SystemRunner
            .run("/nonexistent/loqa-recorder", &[], Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }), "{:?}", err);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_the_child() {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("echo $$ > '{}'; exec sleep 5", pid_file.display());

        let started = std::time::Instant::now();
        let err = SystemRunner
            .run("sh", &sh(&script), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Timeout { .. }), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(3));

        let pid: i32 = std::fs::read_to_string(&pid_file).unwrap().trim().parse().unwrap();
        // Killed and reaped, so the pid no longer exists
        assert!(kill(Pid::from_raw(pid), None).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_lingering_grandchild_does_not_outlive_timeout() {
        let started = std::time::Instant::now();
        let err = SystemRunner
            .run("sh", &sh("sleep 6 & echo ok"), Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Timeout { .. }), "{:?}", err);
        assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    }
}
