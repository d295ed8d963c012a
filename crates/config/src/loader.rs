use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::Settings,
};

/// Settings file name, checked in `./` then the user config dir.
const SETTINGS_FILENAME: &str = "clawgate.toml";

/// Load settings from the given TOML file, with `${ENV}` substitution.
pub fn load_settings(path: &Path) -> Result<Settings> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    toml::from_str(&raw).map_err(|source| Error::Settings {
        path: path.to_path_buf(),
        source,
    })
}

/// Discover and load settings from standard locations, then apply the
/// process environment on top.
///
/// Search order:
/// 1. `./clawgate.toml`
/// 2. `~/.config/clawgate/clawgate.toml`
///
/// Falls back to [`Settings::default()`] when no file is found or the file is
/// unreadable.
pub fn discover_and_load() -> Settings {
    let mut settings = match find_settings_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading settings");
            load_settings(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load settings, using defaults");
                Settings::default()
            })
        },
        None => {
            debug!("no settings file found, using defaults");
            Settings::default()
        },
    };
    apply_env_overrides(&mut settings);
    settings
}

fn find_settings_file() -> Option<PathBuf> {
    let local = PathBuf::from(SETTINGS_FILENAME);
    if local.exists() {
        return Some(local);
    }
    directories::ProjectDirs::from("", "", "clawgate")
        .map(|dirs| dirs.config_dir().join(SETTINGS_FILENAME))
        .filter(|p| p.exists())
}

/// Apply the deployment's environment variables to `settings`.
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_env_overrides_with(settings, |name| std::env::var(name).ok());
}

/// Environment override logic with an injectable lookup, so it can be tested
/// without touching the process environment.
pub fn apply_env_overrides_with(settings: &mut Settings, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let port = |name: &str| {
        var(name).and_then(|v| match v.parse::<u16>() {
            Ok(p) => Some(p),
            Err(_) => {
                warn!(var = name, value = %v, "ignoring non-numeric port");
                None
            },
        })
    };

    if let Some(p) = port("PORT") {
        settings.port = p;
    }
    if let Some(v) = var("OPENCLAW_STATE_DIR") {
        settings.state_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = var("OPENCLAW_WORKSPACE_DIR") {
        settings.workspace_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = var("OPENCLAW_CONFIG_PATH") {
        settings.config_path = Some(PathBuf::from(v));
    }
    if let Some(v) = var("SETUP_PASSWORD") {
        settings.setup_password = Some(Secret::new(v));
    }
    if let Some(v) = var("INTERNAL_GATEWAY_HOST") {
        settings.internal_host = v;
    }
    if let Some(p) = port("INTERNAL_GATEWAY_PORT") {
        settings.internal_port = p;
    }
    if let Some(v) = var("OPENCLAW_ENTRY") {
        settings.openclaw_entry = PathBuf::from(v);
    }
    if let Some(v) = var("OPENCLAW_NODE") {
        settings.openclaw_node = v;
    }
    if let Some(v) = var("MCPORTER_CONFIG") {
        settings.mcporter_config = Some(PathBuf::from(v));
    }
    if let Some(v) = var("SENPI_MCP_URL") {
        settings.senpi_mcp_url = v;
    }
    if let Some(v) = var("OPENCLAW_TEMPLATE_DEBUG") {
        settings.debug = v.eq_ignore_ascii_case("true");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, std::collections::HashMap};

    #[test]
    fn env_overrides_apply() {
        let vars = HashMap::from([
            ("PORT", "9000"),
            ("OPENCLAW_STATE_DIR", "/data/.openclaw"),
            ("INTERNAL_GATEWAY_PORT", "not-a-port"),
            ("SETUP_PASSWORD", "pw"),
            ("OPENCLAW_TEMPLATE_DEBUG", "TRUE"),
            ("OPENCLAW_NODE", ""),
        ]);
        let mut settings = Settings::default();
        apply_env_overrides_with(&mut settings, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(settings.port, 9000);
        assert_eq!(settings.state_dir(), PathBuf::from("/data/.openclaw"));
        assert_eq!(settings.internal_port, 18789);
        assert_eq!(settings.setup_password(), Some("pw"));
        assert!(settings.debug);
        assert_eq!(settings.openclaw_node, "node");
    }

    #[test]
    fn load_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clawgate.toml");
        std::fs::write(
            &path,
            "port = 8181\nstate_dir = \"/srv/state\"\ninject_control_ui = false\n",
        )
        .unwrap();
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.port, 8181);
        assert_eq!(settings.config_path(), PathBuf::from("/srv/state/openclaw.json"));
        assert!(!settings.inject_control_ui);
    }

    #[test]
    fn load_settings_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clawgate.toml");
        std::fs::write(&path, "port = \"eighty\"").unwrap();
        assert!(matches!(
            load_settings(&path),
            Err(Error::Settings { .. })
        ));
    }
}
