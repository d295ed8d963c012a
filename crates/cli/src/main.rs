mod check_command;

use std::sync::Arc;

use {
    clap::{Parser, Subcommand},
    clawgate_auth::resolve_token,
    clawgate_config::{ConfigDocument, OnboardEnv, Settings, ensure_dirs, validate_settings},
    clawgate_gateway::{GatewayState, bind, build_app, serve},
    clawgate_onboarding::{IntegrationSecret, OnboardingPipeline, PipelineConfig, validate_env},
    clawgate_supervisor::{ConfigSync, OpenclawCli, ProcessRunner, Supervisor, SupervisorConfig, TokioLauncher},
    secrecy::Secret,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

/// Shared secret handed to the gateway. Also read from the environment so a
/// redeploy can pin it.
const TOKEN_ENV: &str = "OPENCLAW_GATEWAY_TOKEN";

#[derive(Parser)]
#[command(name = "clawgate", about = "Clawgate: front door and supervisor for the OpenClaw gateway")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Public port (overrides `PORT` and the settings file).
    #[arg(long, global = true)]
    port: Option<u16>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the proxy and supervise the gateway (default).
    Serve,
    /// Validate settings and the onboarding environment, then exit.
    Check,
}

fn init_telemetry(cli: &Cli, debug: bool) {
    // The deployment's debug switch only raises the default level.
    let level = if debug && cli.log_level == "info" {
        "debug"
    } else {
        cli.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut settings = clawgate_config::discover_and_load();
    if let Some(port) = cli.port {
        settings.port = port;
    }

    init_telemetry(&cli, settings.debug);

    match cli.command {
        None | Some(Commands::Serve) => run_server(settings).await,
        Some(Commands::Check) => check_command::run(&settings),
    }
}

async fn run_server(settings: Settings) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), port = settings.port, "clawgate starting");
    validate_settings(&settings).log();
    validate_env().log();

    let state_dir = settings.state_dir();
    let workspace_dir = settings.workspace_dir();
    if let Err(e) = ensure_dirs(&state_dir, &workspace_dir) {
        warn!(error = %e, "could not create state directories");
    }

    let env_token = std::env::var(TOKEN_ENV).ok();
    let token = Arc::new(resolve_token(env_token.as_deref(), &state_dir));

    // Every gateway CLI call sees the same token and directories as the
    // supervised process.
    let runner = ProcessRunner::new()
        .with_env(TOKEN_ENV, token.expose())
        .with_env("OPENCLAW_STATE_DIR", state_dir.display().to_string())
        .with_env("OPENCLAW_WORKSPACE_DIR", workspace_dir.display().to_string())
        .with_env("OPENCLAW_CONFIG_PATH", settings.config_path().display().to_string());
    let cli = OpenclawCli::new(
        Arc::new(runner),
        settings.openclaw_node.clone(),
        settings.openclaw_entry.clone(),
    );
    let sync = ConfigSync::new(cli, ConfigDocument::new(settings.config_path()));
    let supervisor = Supervisor::new(
        SupervisorConfig::from_settings(&settings),
        token,
        sync,
        Arc::new(TokioLauncher),
    );

    let env = OnboardEnv::from_env();
    let integration = IntegrationSecret::new(
        env.senpi_auth_token()
            .map(|t| Secret::new(t.to_string())),
    );
    let pipeline = OnboardingPipeline::new(
        PipelineConfig::from_settings(&settings),
        supervisor.clone(),
        env,
        integration,
    );

    spawn_startup(pipeline.clone());

    let listener = bind(settings.port).await?;
    let app = build_app(GatewayState::new(settings, pipeline)?);

    tokio::select! {
        result = serve(listener, app) => result?,
        () = shutdown_signal() => {
            info!("shutdown requested, stopping gateway");
            supervisor.shutdown().await;
        },
    }
    Ok(())
}

/// Auto-onboard when the environment allows it, otherwise bring an already
/// configured deployment up without waiting for the first request.
fn spawn_startup(pipeline: OnboardingPipeline) {
    tokio::spawn(async move {
        let eligibility = pipeline.eligibility();
        if eligibility.is_eligible() {
            info!("auto-onboarding from environment");
            // Failures are logged by the pipeline; /setup stays available.
            let _ = pipeline.run_auto().await;
            return;
        }
        eligibility.log(pipeline.env());

        let supervisor = pipeline.supervisor();
        if !supervisor.is_configured() {
            info!("not configured yet, visit /setup");
            return;
        }
        if let Err(e) = pipeline.bootstrap() {
            warn!(error = %e, "state bootstrap failed");
        }
        if let Err(e) = supervisor.ensure_running().await {
            warn!(error = %e, "gateway did not start at boot, will retry on first request");
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
