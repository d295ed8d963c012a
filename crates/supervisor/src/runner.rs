//! External command execution.
//!
//! Every command runs to completion with stdout and stderr captured into a
//! single string. A command that cannot be spawned at all is reported as exit
//! code 127, the way a shell would, so callers only ever deal with
//! [`CommandOutput`].

use std::{path::PathBuf, process::Stdio, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    tokio::process::Command,
    tracing::{debug, warn},
};

/// Exit code reported when the program could not be started.
pub const SPAWN_FAILURE_CODE: i32 = 127;
/// Exit code reported when the command was killed for running too long.
pub const TIMEOUT_CODE: i32 = 124;

/// Result of one external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    /// stdout followed by stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn new(code: i32, output: impl Into<String>) -> Self {
        Self {
            code,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Runs external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    envs: Vec<(String, String)>,
    timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            envs: Vec::new(),
            timeout: Duration::from_secs(300),
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra environment applied to every command.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        let child = Command::new(program)
            .args(args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(program, error = %e, "failed to spawn command");
                return CommandOutput::new(SPAWN_FAILURE_CODE, format!("[spawn error] {e}\n"));
            },
        };

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(out)) => {
                let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
                output.push_str(&String::from_utf8_lossy(&out.stderr));
                // Killed by a signal: no exit code.
                let code = out.status.code().unwrap_or(-1);
                debug!(program, code, bytes = output.len(), "command finished");
                CommandOutput::new(code, output)
            },
            Ok(Err(e)) => {
                warn!(program, error = %e, "failed waiting for command");
                CommandOutput::new(SPAWN_FAILURE_CODE, format!("[wait error] {e}\n"))
            },
            Err(_) => {
                warn!(program, timeout_secs = self.timeout.as_secs(), "command timed out");
                CommandOutput::new(
                    TIMEOUT_CODE,
                    format!("[timeout] no exit after {}s\n", self.timeout.as_secs()),
                )
            },
        }
    }
}

/// The gateway's own CLI, invoked as `<node> <entry> <args...>`.
#[derive(Clone)]
pub struct OpenclawCli {
    runner: Arc<dyn CommandRunner>,
    node: String,
    entry: PathBuf,
}

impl OpenclawCli {
    pub fn new(runner: Arc<dyn CommandRunner>, node: impl Into<String>, entry: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            node: node.into(),
            entry: entry.into(),
        }
    }

    pub fn runner(&self) -> &Arc<dyn CommandRunner> {
        &self.runner
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn entry(&self) -> &PathBuf {
        &self.entry
    }

    /// Full argument vector (entry script first) for the given CLI args.
    pub fn argv<I, S>(&self, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        std::iter::once(self.entry.display().to_string())
            .chain(args.into_iter().map(Into::into))
            .collect()
    }

    pub async fn run<I, S>(&self, args: I) -> CommandOutput
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv = self.argv(args);
        self.runner.run(&self.node, &argv).await
    }

    /// `openclaw --version`, trimmed.
    pub async fn version(&self) -> CommandOutput {
        let out = self.run(["--version"]).await;
        CommandOutput::new(out.code, out.output.trim())
    }

    /// Help text of `channels add`, used to detect which channels this build
    /// of the gateway supports.
    pub async fn channels_add_help(&self) -> CommandOutput {
        self.run(["channels", "add", "--help"]).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let runner = ProcessRunner::new().with_env("CLAWGATE_RUNNER_TEST", "from-env");
        let out = runner
            .run(
                "sh",
                &args(&["-c", "echo out-$CLAWGATE_RUNNER_TEST; echo err >&2; exit 3"]),
            )
            .await;
        assert_eq!(out.code, 3);
        assert!(out.output.contains("out-from-env"));
        assert!(out.output.contains("err"));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn missing_program_is_127() {
        let out = ProcessRunner::new()
            .run("clawgate-definitely-not-a-binary", &[])
            .await;
        assert_eq!(out.code, SPAWN_FAILURE_CODE);
        assert!(out.output.contains("spawn error"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_command() {
        let runner = ProcessRunner::new().with_timeout(Duration::from_millis(100));
        let out = runner.run("sleep", &args(&["5"])).await;
        assert_eq!(out.code, TIMEOUT_CODE);
    }

    #[test]
    fn cli_argv_prefixes_entry() {
        let cli = OpenclawCli::new(Arc::new(ProcessRunner::new()), "node", "/openclaw/dist/entry.js");
        assert_eq!(
            cli.argv(["config", "get", "gateway.auth.token"]),
            args(&["/openclaw/dist/entry.js", "config", "get", "gateway.auth.token"])
        );
    }
}
