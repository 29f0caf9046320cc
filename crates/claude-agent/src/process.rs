use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};

use crate::types::{CompletionOptions, RuntimeEvent};
use crate::{ClaudeAgentError, Result};

// ─── ClaudeProcess ────────────────────────────────────────────────────────

/// A running `claude --print --output-format stream-json` subprocess.
///
/// Reads one JSONL event per call to `next_event`. Callers drive the read
/// loop; [`crate::stream::EventStream`] wraps this in an async `Stream`.
/// The child is killed when this value is dropped, so a cancelled request
/// cannot leak a subprocess.
pub(crate) struct ClaudeProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl ClaudeProcess {
    /// Spawn the resolved executable with the given prompt and options.
    ///
    /// `CLAUDECODE` is removed from the environment so the gateway works
    /// when it is itself launched from inside a Claude session.
    pub(crate) fn spawn(executable: &Path, prompt: &str, opts: &CompletionOptions) -> Result<Self> {
        let mut cmd = build_command(executable, prompt, opts);
        cmd.env_remove("CLAUDECODE");
        Self::from_command(cmd)
    }

    /// Spawn an arbitrary command as a mock Claude process.
    /// Used in unit tests to inject a command that emits fixed JSON lines.
    #[cfg(test)]
    pub(crate) fn spawn_command(cmd: Command) -> Result<Self> {
        Self::from_command(cmd)
    }

    fn from_command(mut cmd: Command) -> Result<Self> {
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(ClaudeAgentError::Io)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClaudeAgentError::Process("stdout not captured".into()))?;

        // Diagnostic chatter on stderr must not corrupt stdout framing;
        // drain it in the background and surface it through tracing.
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "claude_stderr", "{line}");
                }
            });
        }

        let lines = BufReader::new(stdout).lines();
        Ok(Self { child, lines })
    }

    /// Read the next parseable JSONL event from stdout.
    ///
    /// Blank lines and lines that do not deserialize are logged and
    /// skipped: line framing keeps the stream intact, and a run that dies
    /// mid-output is caught by EOF handling instead. Returns `Ok(None)`
    /// on EOF.
    pub(crate) async fn next_event(&mut self) -> Result<Option<RuntimeEvent>> {
        loop {
            match self.lines.next_line().await {
                Err(e) => return Err(ClaudeAgentError::Io(e)),
                Ok(None) => return Ok(None),
                Ok(Some(line)) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str(trimmed) {
                        Ok(event) => return Ok(Some(event)),
                        Err(err) => {
                            tracing::warn!(%err, line = trimmed, "skipping unparseable stream-json line");
                            continue;
                        }
                    }
                }
            }
        }
    }

    /// After EOF without a terminal event: surface a non-zero exit as a
    /// process error. A clean exit returns `None` and the caller decides.
    pub(crate) async fn wait_exit_error(&mut self) -> Option<ClaudeAgentError> {
        match self.child.wait().await {
            Ok(status) if status.success() => None,
            Ok(status) => Some(ClaudeAgentError::Process(format!(
                "claude exited with {status} before emitting a result"
            ))),
            Err(e) => Some(ClaudeAgentError::Io(e)),
        }
    }

    /// Kill the subprocess (best-effort; errors are silently ignored).
    pub(crate) async fn kill(&mut self) {
        let _ = self.child.kill().await;
    }
}

// ─── Command builder ──────────────────────────────────────────────────────

fn build_command(executable: &Path, prompt: &str, opts: &CompletionOptions) -> Command {
    let mut cmd = Command::new(executable);

    // Non-interactive streaming mode.
    cmd.arg("--print").arg("--output-format").arg("stream-json");

    if let Some(model) = &opts.model {
        cmd.arg("--model").arg(model);
    }

    if let Some(max_turns) = opts.max_turns {
        cmd.arg("--max-turns").arg(max_turns.to_string());
    }

    if let Some(sp) = &opts.system_prompt {
        cmd.arg("--system-prompt").arg(sp);
    }

    // Provider credentials from the auth resolver ride on top of the
    // inherited process environment.
    cmd.envs(&opts.env);

    // Prompt is the final positional argument.
    cmd.arg(prompt);

    cmd
}

// ─── Tests ────────────────────────────────────────────────────────────────
