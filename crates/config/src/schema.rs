//! Wrapper settings and onboarding inputs.
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

/// Default public port.
pub const DEFAULT_PORT: u16 = 8080;
/// Default loopback port the wrapped gateway listens on.
pub const DEFAULT_INTERNAL_PORT: u16 = 18789;
pub const DEFAULT_SENPI_MCP_URL: &str = "https://mcp.dev.senpi.ai/mcp";

/// Wrapper process settings.
///
/// Path fields are optional in the file; use the accessor methods to get the
/// resolved value with the deployment defaults applied.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Public port the wrapper listens on.
    pub port: u16,
    /// Persistent gateway state directory (`~/.openclaw` when unset).
    pub state_dir: Option<PathBuf>,
    /// Agent workspace (`<state_dir>/workspace` when unset).
    pub workspace_dir: Option<PathBuf>,
    /// Gateway configuration document (`<state_dir>/openclaw.json` when unset).
    pub config_path: Option<PathBuf>,
    /// Password guarding the `/setup` namespace. Setup is unusable without it.
    pub setup_password: Option<Secret<String>>,
    pub internal_host: String,
    pub internal_port: u16,
    /// Gateway CLI entry script.
    pub openclaw_entry: PathBuf,
    /// Interpreter used to run [`Self::openclaw_entry`].
    pub openclaw_node: String,
    /// MCP integration config (`<state_dir>/config/mcporter.json` when unset).
    pub mcporter_config: Option<PathBuf>,
    pub senpi_mcp_url: String,
    /// Readiness probe deadline after a spawn.
    pub ready_timeout_ms: u64,
    /// Pause between killing the old gateway and starting a new one.
    pub restart_grace_ms: u64,
    /// Patch the control UI page so the browser picks up the token.
    pub inject_control_ui: bool,
    /// Verbose logging (`OPENCLAW_TEMPLATE_DEBUG`).
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            state_dir: None,
            workspace_dir: None,
            config_path: None,
            setup_password: None,
            internal_host: "127.0.0.1".into(),
            internal_port: DEFAULT_INTERNAL_PORT,
            openclaw_entry: PathBuf::from("/openclaw/dist/entry.js"),
            openclaw_node: "node".into(),
            mcporter_config: None,
            senpi_mcp_url: DEFAULT_SENPI_MCP_URL.into(),
            ready_timeout_ms: 20_000,
            restart_grace_ms: 1_500,
            inject_control_ui: true,
            debug: false,
        }
    }
}

impl Settings {
    pub fn state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            directories::BaseDirs::new()
                .map(|d| d.home_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from("/root"))
                .join(".openclaw")
        })
    }

    pub fn workspace_dir(&self) -> PathBuf {
        self.workspace_dir
            .clone()
            .unwrap_or_else(|| self.state_dir().join("workspace"))
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| self.state_dir().join("openclaw.json"))
    }

    pub fn mcporter_path(&self) -> PathBuf {
        self.mcporter_config
            .clone()
            .unwrap_or_else(|| self.state_dir().join("config").join("mcporter.json"))
    }

    /// Where a generated gateway token is persisted.
    pub fn token_path(&self) -> PathBuf {
        self.state_dir().join("gateway.token")
    }

    /// Base URL of the wrapped gateway on loopback.
    pub fn gateway_target(&self) -> String {
        format!("http://{}:{}", self.internal_host, self.internal_port)
    }

    pub fn setup_password(&self) -> Option<&str> {
        self.setup_password
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Inputs for unattended first-run onboarding, read from the environment.
#[derive(Debug, Clone, Default)]
pub struct OnboardEnv {
    /// Lowercased provider name (`AI_PROVIDER`).
    pub provider: Option<String>,
    /// Provider API key with any pasted `Bearer ` prefix removed (`AI_API_KEY`).
    pub api_key: Option<Secret<String>>,
    pub telegram_bot_token: Option<Secret<String>>,
    pub telegram_user_id: Option<String>,
    pub senpi_auth_token: Option<Secret<String>>,
}

impl OnboardEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            provider: non_empty("AI_PROVIDER").map(|p| p.to_lowercase()),
            api_key: non_empty("AI_API_KEY")
                .map(|k| strip_bearer(&k).to_string())
                .filter(|k| !k.is_empty())
                .map(Secret::new),
            telegram_bot_token: non_empty("TELEGRAM_BOT_TOKEN").map(Secret::new),
            telegram_user_id: non_empty("TELEGRAM_USER_ID"),
            senpi_auth_token: non_empty("SENPI_AUTH_TOKEN")
                .map(|k| strip_bearer(&k).to_string())
                .filter(|k| !k.is_empty())
                .map(Secret::new),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_ref().map(|s| s.expose_secret().as_str())
    }

    pub fn telegram_bot_token(&self) -> Option<&str> {
        self.telegram_bot_token
            .as_ref()
            .map(|s| s.expose_secret().as_str())
    }

    pub fn senpi_auth_token(&self) -> Option<&str> {
        self.senpi_auth_token
            .as_ref()
            .map(|s| s.expose_secret().as_str())
    }
}

/// Remove a leading `Bearer ` (any case) that users tend to paste along with
/// API keys.
pub fn strip_bearer(value: &str) -> &str {
    let trimmed = value.trim();
    match trimmed.get(..7) {
        Some(prefix) if prefix.eq_ignore_ascii_case("bearer ") => trimmed[7..].trim_start(),
        _ => trimmed,
    }
}
