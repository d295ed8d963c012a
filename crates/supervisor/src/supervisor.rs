//! Gateway process supervision.
//!
//! Exactly one gateway process is tracked at a time. Concurrent callers of
//! [`Supervisor::ensure_running`] share a single start attempt: the first
//! caller moves the phase to `Starting` and drives the start on a detached
//! task, everyone (the first caller included) waits on the same `watch`
//! channel and sees the same outcome.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use {
    clawgate_auth::GatewayToken,
    clawgate_config::{ConfigDocument, ensure_dirs},
    serde::Serialize,
    tokio::sync::{Mutex, watch},
    tracing::{debug, error, info, warn},
};

use crate::{
    error::{Error, Result},
    launcher::{LaunchCommand, ProcessLauncher},
    probe::ReadinessProbe,
    runner::CommandRunner,
    sync::{ConfigSync, SyncPlan},
};

/// Pattern matched by the stray-process sweep on restart.
const GATEWAY_PROCESS_PATTERN: &str = "openclaw-gateway";
const MIN_RESTART_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub node: String,
    pub entry: PathBuf,
    pub state_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub config_path: PathBuf,
    pub internal_host: String,
    pub internal_port: u16,
    pub ready_timeout: Duration,
    pub probe_interval: Duration,
    pub restart_grace: Duration,
}

impl SupervisorConfig {
    pub fn from_settings(settings: &clawgate_config::Settings) -> Self {
        Self {
            node: settings.openclaw_node.clone(),
            entry: settings.openclaw_entry.clone(),
            state_dir: settings.state_dir(),
            workspace_dir: settings.workspace_dir(),
            config_path: settings.config_path(),
            internal_host: settings.internal_host.clone(),
            internal_port: settings.internal_port,
            ready_timeout: Duration::from_millis(settings.ready_timeout_ms),
            probe_interval: crate::probe::DEFAULT_INTERVAL,
            restart_grace: Duration::from_millis(settings.restart_grace_ms),
        }
    }

    pub fn target(&self) -> String {
        format!("http://{}:{}", self.internal_host, self.internal_port)
    }

    /// `<node> <entry> gateway run --bind loopback --port P --auth token --token T`
    pub fn launch_command(&self, token: &GatewayToken) -> LaunchCommand {
        LaunchCommand {
            program: self.node.clone(),
            args: vec![
                self.entry.display().to_string(),
                "gateway".into(),
                "run".into(),
                "--bind".into(),
                "loopback".into(),
                "--port".into(),
                self.internal_port.to_string(),
                "--auth".into(),
                "token".into(),
                "--token".into(),
                token.expose().to_string(),
            ],
            envs: vec![
                (
                    "OPENCLAW_STATE_DIR".into(),
                    self.state_dir.display().to_string(),
                ),
                (
                    "OPENCLAW_WORKSPACE_DIR".into(),
                    self.workspace_dir.display().to_string(),
                ),
                (
                    "OPENCLAW_CONFIG_PATH".into(),
                    self.config_path.display().to_string(),
                ),
                ("OPENCLAW_GATEWAY_TOKEN".into(), token.expose().to_string()),
            ],
            cwd: None,
        }
    }
}

type StartOutcome = Option<Result<()>>;

enum Phase {
    Idle,
    Starting(watch::Receiver<StartOutcome>),
    /// A process is tracked and its start attempt has finished. The process
    /// may not have passed the readiness probe (timeouts keep the handle).
    Running,
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    pid: Option<u32>,
    generation: u64,
}

struct State {
    phase: Phase,
    child: Option<Tracked>,
}

/// Snapshot for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub configured: bool,
    pub phase: &'static str,
    pub pid: Option<u32>,
}

struct Shared {
    config: SupervisorConfig,
    token: Arc<GatewayToken>,
    sync: ConfigSync,
    runner: Arc<dyn CommandRunner>,
    launcher: Arc<dyn ProcessLauncher>,
    probe: ReadinessProbe,
    state: Mutex<State>,
    generation: AtomicU64,
}

/// Owns the gateway process. Cheap to clone.
#[derive(Clone)]
pub struct Supervisor {
    shared: Arc<Shared>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        token: Arc<GatewayToken>,
        sync: ConfigSync,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Self {
        let probe = ReadinessProbe::new(config.target(), config.ready_timeout)
            .with_interval(config.probe_interval);
        let runner = Arc::clone(sync.cli().runner());
        Self {
            shared: Arc::new(Shared {
                config,
                token,
                sync,
                runner,
                launcher,
                probe,
                state: Mutex::new(State {
                    phase: Phase::Idle,
                    child: None,
                }),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.shared.config
    }

    pub fn document(&self) -> &ConfigDocument {
        self.shared.sync.document()
    }

    pub fn sync(&self) -> &ConfigSync {
        &self.shared.sync
    }

    pub fn token(&self) -> &Arc<GatewayToken> {
        &self.shared.token
    }

    pub fn is_configured(&self) -> bool {
        self.document().exists()
    }

    /// Make sure a gateway process is running.
    ///
    /// Returns [`Error::NotConfigured`] without spawning anything when the
    /// configuration document is missing. Otherwise returns immediately when a
    /// process is tracked, or joins (or begins) the single in-flight start.
    pub async fn ensure_running(&self) -> Result<()> {
        if !self.is_configured() {
            return Err(Error::NotConfigured {
                path: self.document().path().to_path_buf(),
            });
        }

        let mut done = {
            let mut state = self.shared.state.lock().await;
            if matches!(state.phase, Phase::Running) && state.child.is_some() {
                return Ok(());
            }
            if let Phase::Starting(rx) = &state.phase {
                rx.clone()
            } else {
                let (tx, rx) = watch::channel(None);
                state.phase = Phase::Starting(rx.clone());
                let this = self.clone();
                tokio::spawn(async move {
                    let outcome = this.start().await;
                    let mut state = this.shared.state.lock().await;
                    state.phase = if state.child.is_some() {
                        Phase::Running
                    } else {
                        Phase::Idle
                    };
                    drop(state);
                    if let Err(e) = &outcome {
                        error!(error = %e, "gateway start failed");
                    }
                    let _ = tx.send(Some(outcome));
                });
                rx
            }
        };

        let outcome = done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::message("gateway start task ended without a result"))?;
        match &*outcome {
            Some(result) => result.clone(),
            None => Err(Error::message("gateway start produced no outcome")),
        }
    }

    /// One start attempt: token sync, spawn, readiness.
    async fn start(&self) -> Result<()> {
        let shared = &self.shared;
        let config = &shared.config;

        if let Err(e) = ensure_dirs(&config.state_dir, &config.workspace_dir) {
            warn!(error = %e, "could not create state directories");
        }

        // Token must be on disk before the gateway reads its config.
        shared.sync.run(&SyncPlan::token_only(&shared.token)).await?;

        let command = config.launch_command(&shared.token);
        info!(
            port = config.internal_port,
            target = %config.target(),
            token_prefix = %shared.token.prefix(),
            "starting gateway"
        );
        let spawned = shared
            .launcher
            .launch(&command)
            .map_err(|e| Error::Spawn {
                message: e.to_string(),
            })?;

        let generation = shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        shared.state.lock().await.child = Some(Tracked {
            pid: spawned.pid,
            generation,
        });

        let this = self.clone();
        let exited = spawned.exited;
        tokio::spawn(async move {
            let code = exited.await;
            let mut state = this.shared.state.lock().await;
            match state.child {
                Some(tracked) if tracked.generation == generation => {
                    warn!(pid = tracked.pid, code, "gateway exited");
                    state.child = None;
                    if matches!(state.phase, Phase::Running) {
                        state.phase = Phase::Idle;
                    }
                },
                _ => debug!(generation, code, "previous gateway process exited"),
            }
        });

        shared.probe.wait_ready().await
    }

    /// Stop the tracked process, sweep stragglers, wait, then start again.
    pub async fn restart(&self) -> Result<()> {
        info!("restarting gateway");
        self.stop_tracked().await;

        let sweep = self
            .shared
            .runner
            .run(
                "pkill",
                &["-f".to_string(), GATEWAY_PROCESS_PATTERN.to_string()],
            )
            .await;
        // pkill exits 1 when nothing matched.
        debug!(code = sweep.code, "swept stray gateway processes");

        tokio::time::sleep(self.shared.config.restart_grace.max(MIN_RESTART_GRACE)).await;
        self.ensure_running().await
    }

    /// Best-effort termination of the tracked process on wrapper shutdown.
    pub async fn shutdown(&self) {
        if let Some(pid) = self.stop_tracked().await {
            info!(pid, "terminated gateway on shutdown");
        }
    }

    /// Forget the tracked process and SIGTERM it. Its exit observer becomes a
    /// no-op because the handle is already gone.
    async fn stop_tracked(&self) -> Option<u32> {
        let tracked = {
            let mut state = self.shared.state.lock().await;
            if matches!(state.phase, Phase::Running) {
                state.phase = Phase::Idle;
            }
            state.child.take()
        };
        let pid = tracked.and_then(|t| t.pid)?;
        self.shared.launcher.terminate(pid);
        Some(pid)
    }

    pub async fn status(&self) -> SupervisorStatus {
        let state = self.shared.state.lock().await;
        SupervisorStatus {
            configured: self.is_configured(),
            phase: match state.phase {
                Phase::Idle => "idle",
                Phase::Starting(_) => "starting",
                Phase::Running => "running",
            },
            pid: state.child.and_then(|t| t.pid),
        }
    }

    /// Whether a start is currently in flight.
    pub async fn is_starting(&self) -> bool {
        matches!(self.shared.state.lock().await.phase, Phase::Starting(_))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::{
            runner::OpenclawCli,
            testing::{FakeLauncher, FakeOpenclaw},
        },
        axum::Router,
        clawgate_auth::TokenSource,
        serde_json::json,
        std::net::SocketAddr,
        tokio::net::TcpListener,
    };

    struct Harness {
        _dir: tempfile::TempDir,
        cli: Arc<FakeOpenclaw>,
        launcher: Arc<FakeLauncher>,
        supervisor: Supervisor,
    }

    /// Stand-in gateway answering every request.
    async fn serve_gateway() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().fallback(|| async { "gateway" }))
                .await
                .unwrap();
        });
        addr
    }

    async fn harness(configured: bool, gateway_up: bool) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let state_dir = dir.path().join("state");
        let config_path = state_dir.join("openclaw.json");
        if configured {
            ConfigDocument::new(&config_path)
                .save(&json!({"gateway": {"mode": "local"}}))
                .unwrap();
        }

        let port = if gateway_up {
            serve_gateway().await.port()
        } else {
            let l = TcpListener::bind("127.0.0.1:0").await.unwrap();
            l.local_addr().unwrap().port()
        };

        let cli = FakeOpenclaw::new(&config_path);
        let launcher = FakeLauncher::new();
        let token = Arc::new(GatewayToken::new("tok-0123456789", TokenSource::Env));
        let sync = ConfigSync::new(
            OpenclawCli::new(cli.clone(), "node", "/openclaw/dist/entry.js"),
            ConfigDocument::new(&config_path),
        );
        let config = SupervisorConfig {
            node: "node".into(),
            entry: "/openclaw/dist/entry.js".into(),
            state_dir: state_dir.clone(),
            workspace_dir: state_dir.join("workspace"),
            config_path: config_path.clone(),
            internal_host: "127.0.0.1".into(),
            internal_port: port,
            ready_timeout: Duration::from_millis(800),
            probe_interval: Duration::from_millis(50),
            restart_grace: Duration::from_millis(10),
        };
        let supervisor = Supervisor::new(config, token, sync, launcher.clone());
        Harness {
            _dir: dir,
            cli,
            launcher,
            supervisor,
        }
    }

    #[tokio::test]
    async fn unconfigured_never_spawns() {
        let h = harness(false, true).await;
        let calls = (0..8).map(|_| {
            let s = h.supervisor.clone();
            tokio::spawn(async move { s.ensure_running().await })
        });
        for call in calls.collect::<Vec<_>>() {
            let err = call.await.unwrap().unwrap_err();
            assert!(matches!(err, Error::NotConfigured { .. }));
        }
        assert_eq!(h.launcher.launches(), 0);
        assert!(h.cli.calls().is_empty());
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_spawn() {
        let h = harness(true, true).await;
        let calls: Vec<_> = (0..16)
            .map(|_| {
                let s = h.supervisor.clone();
                tokio::spawn(async move { s.ensure_running().await })
            })
            .collect();
        for call in calls {
            call.await.unwrap().unwrap();
        }
        assert_eq!(h.launcher.launches(), 1);
        assert_eq!(h.cli.set_keys(), vec!["gateway.auth.token"]);

        // Already running: no further work.
        h.supervisor.ensure_running().await.unwrap();
        assert_eq!(h.launcher.launches(), 1);
        assert_eq!(h.supervisor.status().await.phase, "running");
    }

    #[tokio::test]
    async fn launch_command_carries_flags_and_env() {
        let h = harness(true, true).await;
        h.supervisor.ensure_running().await.unwrap();
        let cmd = &h.launcher.commands()[0];
        assert_eq!(cmd.program, "node");
        let port = h.supervisor.config().internal_port.to_string();
        assert_eq!(
            cmd.args,
            vec![
                "/openclaw/dist/entry.js",
                "gateway",
                "run",
                "--bind",
                "loopback",
                "--port",
                port.as_str(),
                "--auth",
                "token",
                "--token",
                "tok-0123456789",
            ]
        );
        let env = |key: &str| {
            cmd.envs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        assert!(env("OPENCLAW_STATE_DIR").is_some());
        assert_eq!(env("OPENCLAW_GATEWAY_TOKEN").as_deref(), Some("tok-0123456789"));
        assert_eq!(
            env("OPENCLAW_CONFIG_PATH").map(PathBuf::from),
            Some(h.supervisor.document().path().to_path_buf())
        );
        assert_eq!(
            h.supervisor.document().get("gateway.auth.token").unwrap(),
            Some(json!("tok-0123456789"))
        );
    }

    #[tokio::test]
    async fn token_mismatch_is_fatal_and_prevents_spawn() {
        let h = harness(true, true).await;
        h.cli.tamper_with("gateway.auth.token", json!("someone-else"));

        let a = h.supervisor.clone();
        let b = h.supervisor.clone();
        let (ra, rb) = tokio::join!(a.ensure_running(), b.ensure_running());
        for r in [ra, rb] {
            assert!(matches!(
                r.unwrap_err(),
                Error::TokenSync(crate::SyncError::TokenSyncMismatch { .. })
            ));
        }
        assert_eq!(h.launcher.launches(), 0);
        assert_eq!(h.supervisor.status().await.phase, "idle");
    }

    #[tokio::test]
    async fn start_timeout_keeps_handle() {
        let h = harness(true, false).await;
        let err = h.supervisor.ensure_running().await.unwrap_err();
        assert!(matches!(err, Error::StartTimeout { .. }));
        assert_eq!(h.launcher.launches(), 1);

        let status = h.supervisor.status().await;
        assert!(status.pid.is_some());
        // Tracked handle short-circuits the next call.
        h.supervisor.ensure_running().await.unwrap();
        assert_eq!(h.launcher.launches(), 1);
    }

    #[tokio::test]
    async fn exit_clears_handle_and_next_call_respawns() {
        let h = harness(true, true).await;
        h.supervisor.ensure_running().await.unwrap();
        h.launcher.exit_all(1);

        // Let the exit observer run.
        for _ in 0..50 {
            if h.supervisor.status().await.pid.is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(h.supervisor.status().await.phase, "idle");

        h.supervisor.ensure_running().await.unwrap();
        assert_eq!(h.launcher.launches(), 2);
    }

    #[tokio::test]
    async fn spawn_failure_returns_to_idle() {
        let h = harness(true, true).await;
        h.launcher.fail_launches();
        let err = h.supervisor.ensure_running().await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
        assert_eq!(h.supervisor.status().await.phase, "idle");
    }

    #[tokio::test]
    async fn restart_terminates_sweeps_and_respawns() {
        let h = harness(true, true).await;
        h.supervisor.ensure_running().await.unwrap();
        let first_pid = h.supervisor.status().await.pid.unwrap();

        h.supervisor.restart().await.unwrap();

        assert_eq!(h.launcher.terminated(), vec![first_pid]);
        assert_eq!(h.launcher.launches(), 2);
        assert!(
            h.cli
                .calls()
                .iter()
                .any(|(p, a)| p == "pkill" && a == &["-f", "openclaw-gateway"])
        );
        assert_ne!(h.supervisor.status().await.pid, Some(first_pid));
        // Token written before each spawn.
        assert_eq!(h.cli.set_keys().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_terminates_tracked_child() {
        let h = harness(true, true).await;
        h.supervisor.ensure_running().await.unwrap();
        let pid = h.supervisor.status().await.pid.unwrap();
        h.supervisor.shutdown().await;
        assert_eq!(h.launcher.terminated(), vec![pid]);
        assert!(h.supervisor.status().await.pid.is_none());
    }
}
