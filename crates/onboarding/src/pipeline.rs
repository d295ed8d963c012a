//! The onboarding pipeline.
//!
//! One run takes an unconfigured deployment to a running gateway:
//! onboard → sync → channels → contact record → bootstrap → restart. Every
//! step depends on the previous one; the first failure ends the run and
//! nothing already written is rolled back. Only one run may be in flight.

use std::{
    path::PathBuf,
    sync::{
        Arc, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use {
    clawgate_common::mask_args,
    clawgate_config::{IntegrationConfig, OnboardEnv, Settings, ensure_dirs, patch_document},
    clawgate_supervisor::{Supervisor, SyncPlan, SyncReport},
    clawgate_telegram::{BotApi, TELEGRAM_API_BASE},
    secrecy::{ExposeSecret, Secret},
    tracing::{error, info, warn},
};

use crate::{
    args::{OnboardRequest, OnboardTarget, build_onboard_args},
    channels::{ChannelMode, configure_channels},
    contact::write_contact,
    env::Eligibility,
    error::{Error, Result},
};

/// Pattern matched when killing MCP helper processes after a token rotation.
const MCP_HELPER_PATTERN: &str = "mcp-remote";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub state_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub internal_port: u16,
    pub mcporter_path: PathBuf,
    pub senpi_mcp_url: String,
    pub telegram_api_base: String,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            state_dir: settings.state_dir(),
            workspace_dir: settings.workspace_dir(),
            internal_port: settings.internal_port,
            mcporter_path: settings.mcporter_path(),
            senpi_mcp_url: settings.senpi_mcp_url.clone(),
            telegram_api_base: TELEGRAM_API_BASE.into(),
        }
    }
}

/// The MCP integration credential. Replaceable at runtime.
#[derive(Clone, Default)]
pub struct IntegrationSecret(Arc<RwLock<Option<Secret<String>>>>);

impl IntegrationSecret {
    pub fn new(initial: Option<Secret<String>>) -> Self {
        Self(Arc::new(RwLock::new(initial)))
    }

    pub fn get(&self) -> Option<Secret<String>> {
        self.0
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn set(&self, token: Secret<String>) {
        *self
            .0
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(token);
    }
}

/// What a finished run produced.
#[derive(Debug, Clone, Default)]
pub struct OnboardReport {
    /// Onboard command output followed by per-step diagnostics.
    pub output: String,
    pub sync: SyncReport,
    pub contact: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub enum OnboardOutcome {
    Completed(OnboardReport),
    /// Another run holds the flag; nothing was done.
    AlreadyRunning,
}

struct Inner {
    config: PipelineConfig,
    supervisor: Supervisor,
    env: OnboardEnv,
    integration: IntegrationSecret,
    running: AtomicBool,
}

/// Clears the running flag when dropped.
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct OnboardingPipeline {
    inner: Arc<Inner>,
}

impl OnboardingPipeline {
    pub fn new(
        config: PipelineConfig,
        supervisor: Supervisor,
        env: OnboardEnv,
        integration: IntegrationSecret,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                supervisor,
                env,
                integration,
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.inner.config
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.inner.supervisor
    }

    pub fn env(&self) -> &OnboardEnv {
        &self.inner.env
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.inner
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard(&self.inner.running))
    }

    pub fn eligibility(&self) -> Eligibility {
        Eligibility::check(&self.inner.env, self.inner.supervisor.is_configured())
    }

    /// Onboard from the deployment environment.
    pub async fn run_auto(&self) -> Result<OnboardOutcome> {
        let eligibility = self.eligibility();
        eligibility.log(&self.inner.env);
        let request = match OnboardRequest::from_env(&self.inner.env) {
            Some(request) if eligibility.is_eligible() => request,
            _ => {
                return Err(Error::NotEligible {
                    reasons: eligibility.reasons,
                });
            },
        };
        self.run(&request, ChannelMode::Auto).await
    }

    /// Run the whole pipeline for `request`.
    pub async fn run(&self, request: &OnboardRequest, mode: ChannelMode) -> Result<OnboardOutcome> {
        let Some(_guard) = self.try_begin() else {
            info!("onboarding already in progress, skipping");
            return Ok(OnboardOutcome::AlreadyRunning);
        };

        info!(?mode, auth_choice = request.auth_choice.as_deref(), "onboarding started");
        match self.run_steps(request, mode).await {
            Ok(report) => {
                info!("onboarding complete");
                Ok(OnboardOutcome::Completed(report))
            },
            Err(e) => {
                error!(error = %e, "onboarding failed; visit /setup to configure manually");
                Err(e)
            },
        }
    }

    async fn run_steps(&self, request: &OnboardRequest, mode: ChannelMode) -> Result<OnboardReport> {
        let config = &self.inner.config;
        let supervisor = &self.inner.supervisor;
        let sync = supervisor.sync();
        let token = supervisor.token();

        ensure_dirs(&config.state_dir, &config.workspace_dir)?;

        let args = build_onboard_args(request, OnboardTarget {
            workspace_dir: &config.workspace_dir,
            internal_port: config.internal_port,
            token,
        });
        let secrets: Vec<&str> = [request.auth_secret(), Some(token.expose())]
            .into_iter()
            .flatten()
            .collect();
        info!(command = %mask_args(&args, &secrets), "running onboard");

        let onboard = sync.cli().run(args).await;
        if !onboard.success() || !supervisor.is_configured() {
            return Err(Error::OnboardFailure {
                exit_code: onboard.code,
                output: onboard.output,
            });
        }
        info!("onboard command succeeded");

        let sync_report = sync
            .run(&SyncPlan::gateway(token, config.internal_port))
            .await?;
        for failed in sync_report.failed() {
            warn!(key = %failed.key, exit_code = failed.exit_code, "config step failed during onboarding");
        }

        let channels = configure_channels(sync, request, mode).await;

        // Must finish before the gateway starts: its long-poller would
        // consume the updates used to resolve a username.
        let contact = match self
            .inner
            .env
            .telegram_bot_token()
            .or_else(|| request.telegram_token())
        {
            Some(bot_token) => {
                let api = BotApi::with_base(&config.telegram_api_base, bot_token);
                write_contact(
                    &api,
                    self.inner.env.telegram_user_id.as_deref(),
                    &config.workspace_dir,
                )
                .await?
            },
            None => {
                info!("no telegram bot token, skipping contact record");
                None
            },
        };

        self.bootstrap()?;
        supervisor.restart().await?;

        let mut output = onboard.output;
        output.push('\n');
        output.push_str(&sync_report.summary());
        output.push('\n');
        output.push_str(&channels.into_string());
        Ok(OnboardReport {
            output,
            sync: sync_report,
            contact,
        })
    }

    /// Bring persisted state to the expected shape: directories, the MCP
    /// integration config, and the gateway document defaults.
    pub fn bootstrap(&self) -> Result<()> {
        let config = &self.inner.config;
        ensure_dirs(&config.state_dir, &config.workspace_dir)?;

        let secret = self.inner.integration.get();
        let token = secret.as_ref().map(|s| s.expose_secret().as_str()).unwrap_or_default();
        IntegrationConfig::new(&config.mcporter_path).upsert_server(&config.senpi_mcp_url, token)?;

        let document = self.inner.supervisor.document();
        let telegram_enabled = self.inner.env.telegram_bot_token().is_some()
            || document.get("channels.telegram")?.is_some();
        patch_document(document, &config.workspace_dir, telegram_enabled)?;
        info!("state bootstrap complete");
        Ok(())
    }

    /// Replace the MCP integration token: in memory, in the integration
    /// config, and by killing running helpers so they respawn with it.
    pub async fn rotate_integration_token(&self, token: &str) -> Result<()> {
        let config = &self.inner.config;
        self.inner.integration.set(Secret::new(token.to_string()));
        IntegrationConfig::new(&config.mcporter_path).rotate_token(&config.senpi_mcp_url, token)?;
        let out = self
            .inner
            .supervisor
            .sync()
            .cli()
            .runner()
            .run("pkill", &["-f".to_string(), MCP_HELPER_PATTERN.to_string()])
            .await;
        info!(pkill_exit = out.code, "integration token rotated");
        Ok(())
    }
}
