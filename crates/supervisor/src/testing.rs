//! In-memory stand-ins for the gateway CLI and process launcher.
//!
//! Enabled with the `testing` feature so downstream crates can drive the
//! supervisor and onboarding flows without a real gateway install.

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, AtomicUsize, Ordering},
    },
};

use {
    async_trait::async_trait,
    clawgate_config::{ConfigDocument, lookup, set_path},
    futures::FutureExt,
    serde_json::{Value, json},
    tokio::sync::{Notify, oneshot},
};

use crate::{
    launcher::{LaunchCommand, ProcessLauncher, SpawnedProcess},
    runner::{CommandOutput, CommandRunner},
};

/// Emulates the gateway CLI against a real configuration document on disk.
///
/// Understands `config set [--json] <key> <value>`, `config get <key>`,
/// `onboard` (creates the document), `--version`, `channels add --help`,
/// and reports success for anything else. Every invocation is recorded.
pub struct FakeOpenclaw {
    document: ConfigDocument,
    calls: Mutex<Vec<(String, Vec<String>)>>,
    /// Keys whose `config set` silently stores this value instead.
    tamper: Mutex<HashMap<String, Value>>,
    /// Keys whose `config set` exits non-zero without writing.
    fail_keys: Mutex<Vec<String>>,
    onboard_code: Mutex<i32>,
    onboard_writes_config: Mutex<bool>,
    /// When set, `onboard` waits for a notification before doing anything.
    onboard_gate: Mutex<Option<Arc<Notify>>>,
    channels_help: Mutex<String>,
}

impl FakeOpenclaw {
    pub fn new(config_path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            document: ConfigDocument::new(config_path.into()),
            calls: Mutex::new(Vec::new()),
            tamper: Mutex::new(HashMap::new()),
            fail_keys: Mutex::new(Vec::new()),
            onboard_code: Mutex::new(0),
            onboard_writes_config: Mutex::new(true),
            onboard_gate: Mutex::new(None),
            channels_help: Mutex::new(
                "Usage: openclaw channels add [options]\n  --channel <name>  telegram|discord|slack\n"
                    .into(),
            ),
        })
    }

    /// Make `config set <key>` store `value` regardless of what was asked.
    pub fn tamper_with(&self, key: &str, value: Value) {
        lock(&self.tamper).insert(key.to_string(), value);
    }

    pub fn fail_key(&self, key: &str) {
        lock(&self.fail_keys).push(key.to_string());
    }

    pub fn set_onboard_result(&self, code: i32, writes_config: bool) {
        *lock(&self.onboard_code) = code;
        *lock(&self.onboard_writes_config) = writes_config;
    }

    /// Block every later `onboard` call until the returned handle is
    /// notified.
    pub fn hold_onboard(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *lock(&self.onboard_gate) = Some(Arc::clone(&gate));
        gate
    }

    pub fn set_channels_help(&self, help: &str) {
        *lock(&self.channels_help) = help.to_string();
    }

    /// Recorded `(program, args)` pairs.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        lock(&self.calls).clone()
    }

    /// Recorded gateway CLI argument vectors, entry script stripped.
    pub fn cli_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter(|(program, _)| program != "pkill")
            .map(|(_, args)| args.into_iter().skip(1).collect())
            .collect()
    }

    /// Keys passed to `config set`, in order.
    pub fn set_keys(&self) -> Vec<String> {
        self.cli_calls()
            .into_iter()
            .filter(|a| a.first().map(String::as_str) == Some("config") && a.get(1).map(String::as_str) == Some("set"))
            .filter_map(|a| a.iter().rev().nth(1).cloned())
            .collect()
    }

    fn config_set(&self, args: &[String]) -> CommandOutput {
        let json = args.iter().any(|a| a == "--json");
        let rest: Vec<&String> = args.iter().filter(|a| *a != "--json").collect();
        let (Some(key), Some(raw)) = (rest.first(), rest.get(1)) else {
            return CommandOutput::new(2, "usage: config set <key> <value>\n");
        };
        if lock(&self.fail_keys).iter().any(|k| k == *key) {
            return CommandOutput::new(1, format!("refusing to set {key}\n"));
        }
        let value = match lock(&self.tamper).get(key.as_str()) {
            Some(v) => v.clone(),
            None if json => match serde_json::from_str(raw) {
                Ok(v) => v,
                Err(e) => return CommandOutput::new(1, format!("invalid json: {e}\n")),
            },
            None => Value::String((*raw).clone()),
        };
        let mut doc = match self.document.load() {
            Ok(Some(doc)) => doc,
            Ok(None) => json!({}),
            Err(e) => return CommandOutput::new(1, format!("{e}\n")),
        };
        set_path(&mut doc, key, value);
        match self.document.save(&doc) {
            Ok(()) => CommandOutput::new(0, format!("Updated {key}\n")),
            Err(e) => CommandOutput::new(1, format!("{e}\n")),
        }
    }

    fn config_get(&self, key: &str) -> CommandOutput {
        match self.document.load() {
            Ok(Some(doc)) => match lookup(&doc, key) {
                Some(v) => CommandOutput::new(0, format!("{v}\n")),
                None => CommandOutput::new(1, format!("{key} not set\n")),
            },
            _ => CommandOutput::new(1, "no config\n"),
        }
    }

    fn onboard(&self) -> CommandOutput {
        let code = *lock(&self.onboard_code);
        if *lock(&self.onboard_writes_config)
            && let Err(e) = self.document.save(&json!({"agents": {}, "gateway": {}}))
        {
            return CommandOutput::new(1, format!("{e}\n"));
        }
        CommandOutput::new(code, "{\"ok\":true}\n")
    }
}

#[async_trait]
impl CommandRunner for FakeOpenclaw {
    async fn run(&self, program: &str, args: &[String]) -> CommandOutput {
        lock(&self.calls).push((program.to_string(), args.to_vec()));
        if program == "pkill" {
            // Nothing matched.
            return CommandOutput::new(1, "");
        }
        let cli: Vec<String> = args.iter().skip(1).cloned().collect();
        match cli.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["config", "set", ..] => self.config_set(&cli[2..]),
            ["config", "get", key] => self.config_get(key),
            ["onboard", ..] => {
                let gate = lock(&self.onboard_gate).clone();
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                self.onboard()
            },
            ["--version"] => CommandOutput::new(0, "openclaw 2026.2.1\n"),
            ["channels", "add", "--help"] => {
                CommandOutput::new(0, lock(&self.channels_help).clone())
            },
            _ => CommandOutput::new(0, ""),
        }
    }
}

/// Records launches instead of spawning anything. Each fake process stays
/// "running" until it is terminated or [`FakeLauncher::exit_all`] is called.
#[derive(Default)]
pub struct FakeLauncher {
    launches: AtomicUsize,
    next_pid: AtomicU32,
    commands: Mutex<Vec<LaunchCommand>>,
    exits: Mutex<HashMap<u32, oneshot::Sender<Option<i32>>>>,
    terminated: Mutex<Vec<u32>>,
    fail: Mutex<bool>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicU32::new(4000),
            ..Default::default()
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<LaunchCommand> {
        lock(&self.commands).clone()
    }

    pub fn terminated(&self) -> Vec<u32> {
        lock(&self.terminated).clone()
    }

    /// Make subsequent launches fail as if the program were missing.
    pub fn fail_launches(&self) {
        *lock(&self.fail) = true;
    }

    /// Simulate every live process exiting on its own.
    pub fn exit_all(&self, code: i32) {
        for (_, tx) in lock(&self.exits).drain() {
            let _ = tx.send(Some(code));
        }
    }
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, command: &LaunchCommand) -> std::io::Result<SpawnedProcess> {
        if *lock(&self.fail) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "fake launch failure",
            ));
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        lock(&self.commands).push(command.clone());
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        lock(&self.exits).insert(pid, tx);
        Ok(SpawnedProcess {
            pid: Some(pid),
            exited: rx.map(|r| r.ok().flatten()).boxed(),
        })
    }

    fn terminate(&self, pid: u32) {
        lock(&self.terminated).push(pid);
        if let Some(tx) = lock(&self.exits).remove(&pid) {
            let _ = tx.send(None);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
