//! Lifecycle of the wrapped gateway process.
//!
//! - [`runner`]: async external command execution with combined output
//! - [`sync`]: ordered `config set` plans with a verified critical step
//! - [`probe`]: HTTP readiness polling
//! - [`supervisor`]: singleflight start, restart and shutdown of the gateway

pub mod error;
pub mod launcher;
pub mod probe;
pub mod runner;
pub mod supervisor;
pub mod sync;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use {
    error::{Error, Result, SyncError},
    launcher::{LaunchCommand, ProcessLauncher, SpawnedProcess, TokioLauncher},
    probe::{READINESS_PATHS, ReadinessProbe},
    runner::{CommandOutput, CommandRunner, OpenclawCli, ProcessRunner},
    supervisor::{Supervisor, SupervisorConfig, SupervisorStatus},
    sync::{ConfigSync, Criticality, StepOutcome, StepStatus, SyncPlan, SyncReport, SyncStep},
};
