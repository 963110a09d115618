//! Typed external program invocation
//!
//! Every side effect that leaves the process (speech, desktop popups, adapter
//! control) is described as a [`CommandSpec`] and executed through a
//! [`CommandRunner`]. Production code uses [`SystemRunner`]; tests and
//! `--dry-run` use [`ScriptedRunner`].

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::CommandError;

/// Program name, arguments, optional stdin and a hard timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Text written to the child's stdin before waiting on it.
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Shell-like rendering for log lines.
    pub fn display(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(char::is_whitespace) {
                line.push('"');
                line.push_str(arg);
                line.push('"');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// Captured result of a finished program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Successful exit with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Non-zero exit with the given stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// The one capability through which external programs are run.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion or until `spec.timeout` elapses.
    ///
    /// A non-zero exit is reported in [`CommandOutput::success`], not as an error.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;

    /// Like [`run`](Self::run) but a non-zero exit becomes [`CommandError::Failed`].
    async fn run_checked(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let output = self.run(spec).await?;
        if output.success {
            Ok(output)
        } else {
            Err(CommandError::Failed {
                program: spec.program.clone(),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs programs with `tokio::process`, killing them on timeout.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| CommandError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        if let (Some(input), Some(mut pipe)) = (&spec.stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|source| CommandError::Io {
                    program: spec.program.clone(),
                    source,
                })?;
            // Closing stdin lets line-driven tools like bluetoothctl exit.
            drop(pipe);
        }

        // Dropping the child on timeout kills it (kill_on_drop).
        match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Err(_) => Err(CommandError::Timeout {
                program: spec.program.clone(),
                timeout: spec.timeout,
            }),
            Ok(Err(source)) => Err(CommandError::Io {
                program: spec.program.clone(),
                source,
            }),
            Ok(Ok(output)) => Ok(CommandOutput {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
enum Outcome {
    Output(CommandOutput),
    Timeout,
    SpawnFailure,
}

#[derive(Debug, Clone)]
struct Script {
    outcome: Outcome,
    delay: Option<Duration>,
}

/// Runner that never spawns anything.
///
/// Programs answer with scripted outcomes (unscripted ones succeed with empty
/// output) and every invocation is recorded. Backs `--dry-run` and tests.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, program: &str, outcome: Outcome) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
            let delay = scripts.get(program).and_then(|s| s.delay);
            scripts.insert(program.to_string(), Script { outcome, delay });
        }
        self
    }

    /// Answer `program` with `output`.
    pub fn respond(self, program: &str, output: CommandOutput) -> Self {
        self.script(program, Outcome::Output(output))
    }

    /// Make `program` report a timeout.
    pub fn time_out(self, program: &str) -> Self {
        self.script(program, Outcome::Timeout)
    }

    /// Make `program` fail as if it were not installed.
    pub fn missing(self, program: &str) -> Self {
        self.script(program, Outcome::SpawnFailure)
    }

    /// Sleep (on the tokio clock) before answering `program`.
    pub fn delay(self, program: &str, delay: Duration) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap_or_else(|e| e.into_inner());
            scripts
                .entry(program.to_string())
                .or_insert_with(|| Script {
                    outcome: Outcome::Output(CommandOutput::ok("")),
                    delay: None,
                })
                .delay = Some(delay);
        }
        self
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Invocations of one program.
    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|spec| spec.program == program)
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        tracing::info!("Would run: {}", spec.display());
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(spec.clone());

        let script = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&spec.program)
            .cloned();

        let Some(script) = script else {
            return Ok(CommandOutput::ok(""));
        };

        if let Some(delay) = script.delay {
            tokio::time::sleep(delay).await;
        }

        match script.outcome {
            Outcome::Output(output) => Ok(output),
            Outcome::Timeout => Err(CommandError::Timeout {
                program: spec.program.clone(),
                timeout: spec.timeout,
            }),
            Outcome::SpawnFailure => Err(CommandError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not installed"),
            }),
        }
    }
}
