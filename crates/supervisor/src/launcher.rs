//! Spawning and signalling the long-running gateway process.

use std::{path::PathBuf, process::Stdio};

use {
    futures::{FutureExt, future::BoxFuture},
    tokio::process::Command,
    tracing::{debug, info, warn},
};

/// Fully resolved gateway command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
}

/// A launched process.
pub struct SpawnedProcess {
    pub pid: Option<u32>,
    /// Resolves with the exit code once the process is gone (`None` when it
    /// was killed by a signal or could not be waited on).
    pub exited: BoxFuture<'static, Option<i32>>,
}

/// Starts and signals gateway processes.
pub trait ProcessLauncher: Send + Sync {
    fn launch(&self, command: &LaunchCommand) -> std::io::Result<SpawnedProcess>;

    /// Ask the process to shut down. Best effort: errors are only logged.
    fn terminate(&self, pid: u32);
}

/// [`ProcessLauncher`] backed by `tokio::process` with inherited stdio, so
/// gateway output lands in the wrapper's own log stream.
#[derive(Debug, Clone, Default)]
pub struct TokioLauncher;

impl ProcessLauncher for TokioLauncher {
    fn launch(&self, command: &LaunchCommand) -> std::io::Result<SpawnedProcess> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .envs(command.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn()?;
        let pid = child.id();
        info!(pid, program = %command.program, "spawned gateway process");

        let exited = async move {
            match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!(error = %e, "failed waiting for gateway process");
                    None
                },
            }
        }
        .boxed();

        Ok(SpawnedProcess { pid, exited })
    }

    fn terminate(&self, pid: u32) {
        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };

            let Ok(raw) = i32::try_from(pid) else {
                warn!(pid, "pid out of range, not signalling");
                return;
            };
            match kill(Pid::from_raw(raw), Signal::SIGTERM) {
                Ok(()) => debug!(pid, "sent SIGTERM to gateway"),
                Err(e) => warn!(pid, error = %e, "failed to signal gateway"),
            }
        }

        #[cfg(not(unix))]
        {
            warn!(pid, "terminating processes is only supported on unix");
        }
    }
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, std::time::Duration};

    #[tokio::test]
    async fn terminate_ends_process() {
        let launcher = TokioLauncher;
        let spawned = launcher
            .launch(&LaunchCommand {
                program: "sleep".into(),
                args: vec!["30".into()],
                envs: vec![],
                cwd: None,
            })
            .unwrap();
        let pid = spawned.pid.unwrap();
        launcher.terminate(pid);

        let code = tokio::time::timeout(Duration::from_secs(5), spawned.exited)
            .await
            .expect("process should exit after SIGTERM");
        assert_eq!(code, None);
    }

    #[tokio::test]
    async fn exit_code_is_reported() {
        let spawned = TokioLauncher
            .launch(&LaunchCommand {
                program: "sh".into(),
                args: vec!["-c".into(), "exit 7".into()],
                envs: vec![],
                cwd: None,
            })
            .unwrap();
        assert_eq!(spawned.exited.await, Some(7));
    }

    #[test]
    fn missing_program_fails_to_launch() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let err = TokioLauncher
            .launch(&LaunchCommand {
                program: "clawgate-definitely-not-a-binary".into(),
                args: vec![],
                envs: vec![],
                cwd: None,
            })
            .err()
            .unwrap();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
