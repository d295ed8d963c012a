//! Post-onboarding state bootstrap.
//!
//! Brings an existing deployment's persisted state to the shape the wrapper
//! expects: directories exist, the gateway document carries the agent,
//! channel and hook defaults, and the MCP integration config has a current
//! `senpi` server entry.

use std::path::{Path, PathBuf};

use {
    serde_json::{Value, json},
    tracing::{debug, info, warn},
};

use crate::{
    document::{ConfigDocument, deep_merge},
    error::{Error, Result},
};

/// Root keys the gateway rejects at startup.
const INVALID_ROOT_KEYS: &[&str] = &["mcpServers"];

/// Create the state and workspace directories if missing.
pub fn ensure_dirs(state_dir: &Path, workspace_dir: &Path) -> Result<()> {
    for dir in [state_dir, workspace_dir] {
        std::fs::create_dir_all(dir).map_err(|source| Error::Write {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// The defaults merged into the gateway document after onboarding.
pub fn bootstrap_patch(workspace_dir: &Path, telegram_enabled: bool) -> Value {
    json!({
        "agents": {
            "defaults": {
                "workspace": workspace_dir.display().to_string(),
                "skipBootstrap": true,
            },
        },
        "channels": {
            "telegram": { "enabled": telegram_enabled },
        },
        "plugins": {
            "entries": {
                "telegram": { "enabled": telegram_enabled },
            },
        },
        "hooks": {
            "internal": {
                "enabled": true,
                "entries": {
                    "boot-md": { "enabled": true },
                    "session-memory": { "enabled": true },
                    "command-logger": { "enabled": true },
                },
            },
        },
    })
}

/// Drop invalid root keys and merge [`bootstrap_patch`] into the document.
///
/// Returns `Ok(false)` when the document does not exist yet.
pub fn patch_document(
    doc: &ConfigDocument,
    workspace_dir: &Path,
    telegram_enabled: bool,
) -> Result<bool> {
    let patch = bootstrap_patch(workspace_dir, telegram_enabled);
    let patched = doc.update(|root| {
        for key in INVALID_ROOT_KEYS {
            if root.remove(*key).is_some() {
                info!(key, "removed invalid root key from gateway config");
            }
        }
        let mut tree = Value::Object(std::mem::take(root));
        deep_merge(&mut tree, &patch);
        if let Value::Object(map) = tree {
            *root = map;
        }
    })?;
    if patched {
        debug!(path = %doc.path().display(), "applied bootstrap patch");
    } else {
        debug!(path = %doc.path().display(), "no gateway config yet, skipping bootstrap patch");
    }
    Ok(patched)
}

/// The MCP integration config file (`mcporter.json`).
#[derive(Debug, Clone)]
pub struct IntegrationConfig {
    path: PathBuf,
}

impl IntegrationConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn server_entry(url: &str, token: &str) -> Value {
        json!({
            "command": "npx",
            "args": [
                "mcp-remote",
                url,
                "--header",
                "Authorization: Bearer ${SENPI_AUTH_TOKEN}",
            ],
            "env": { "SENPI_AUTH_TOKEN": token },
        })
    }

    /// Load the file, falling back to an empty config when it is missing or
    /// unparseable. Other servers the agent added are kept.
    fn load_or_empty(&self) -> Value {
        let doc = ConfigDocument::new(&self.path);
        let mut config = match doc.load() {
            Ok(Some(v)) if v.is_object() => v,
            Ok(_) => json!({ "mcpServers": {}, "imports": [] }),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "integration config unreadable, starting fresh");
                json!({ "mcpServers": {}, "imports": [] })
            },
        };
        if !config.get("mcpServers").is_some_and(Value::is_object) {
            config["mcpServers"] = json!({});
        }
        config
    }

    /// Replace the `senpi` server entry with one built from `url` and `token`.
    pub fn upsert_server(&self, url: &str, token: &str) -> Result<()> {
        let mut config = self.load_or_empty();
        config["mcpServers"]["senpi"] = Self::server_entry(url, token);
        ConfigDocument::new(&self.path).save(&config)?;
        info!(path = %self.path.display(), has_token = !token.is_empty(), "wrote integration config");
        Ok(())
    }

    /// Rotate only the token of the `senpi` entry, creating the entry with
    /// `url` if it does not exist.
    pub fn rotate_token(&self, url: &str, token: &str) -> Result<()> {
        let mut config = self.load_or_empty();
        let servers = &mut config["mcpServers"];
        if servers.get("senpi").is_some_and(Value::is_object) {
            let entry = &mut servers["senpi"];
            if !entry.get("env").is_some_and(Value::is_object) {
                entry["env"] = json!({});
            }
            entry["env"]["SENPI_AUTH_TOKEN"] = json!(token);
        } else {
            servers["senpi"] = Self::server_entry(url, token);
        }
        ConfigDocument::new(&self.path).save(&config)?;
        info!(path = %self.path.display(), "rotated integration token");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn patch_document_merges_and_drops_invalid_keys() {
        let dir = tempfile::tempdir().unwrap();
        let doc = ConfigDocument::new(dir.path().join("openclaw.json"));
        doc.save(&json!({
            "gateway": {"auth": {"token": "t"}},
            "mcpServers": {"x": {}},
            "hooks": {"internal": {"entries": {"custom": {"enabled": false}}}},
        }))
        .unwrap();

        assert!(patch_document(&doc, Path::new("/data/workspace"), true).unwrap());
        let v = doc.load().unwrap().unwrap();
        assert!(v.get("mcpServers").is_none());
        assert_eq!(v["gateway"]["auth"]["token"], "t");
        assert_eq!(v["agents"]["defaults"]["workspace"], "/data/workspace");
        assert_eq!(v["agents"]["defaults"]["skipBootstrap"], true);
        assert_eq!(v["plugins"]["entries"]["telegram"]["enabled"], true);
        assert_eq!(v["hooks"]["internal"]["entries"]["custom"]["enabled"], false);
        assert_eq!(v["hooks"]["internal"]["entries"]["boot-md"]["enabled"], true);

        // Idempotent.
        assert!(patch_document(&doc, Path::new("/data/workspace"), true).unwrap());
        assert_eq!(doc.load().unwrap().unwrap(), v);
    }

    #[test]
    fn telegram_stays_disabled_without_a_bot() {
        let patch = bootstrap_patch(Path::new("/w"), false);
        assert_eq!(patch["channels"]["telegram"]["enabled"], false);
        assert_eq!(patch["plugins"]["entries"]["telegram"]["enabled"], false);
        assert_eq!(patch["hooks"]["internal"]["enabled"], true);
    }

    #[test]
    fn patch_document_skips_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let doc = ConfigDocument::new(dir.path().join("openclaw.json"));
        assert!(!patch_document(&doc, Path::new("/w"), false).unwrap());
        assert!(!doc.exists());
    }

    #[test]
    fn upsert_keeps_other_servers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config/mcporter.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"mcpServers":{"other":{"command":"x"},"senpi":{"command":"old"}},"imports":["a"]}"#,
        )
        .unwrap();

        let cfg = IntegrationConfig::new(&path);
        cfg.upsert_server("https://mcp.example/mcp", "tok1").unwrap();

        let v: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["mcpServers"]["other"]["command"], "x");
        assert_eq!(v["mcpServers"]["senpi"]["command"], "npx");
        assert_eq!(v["mcpServers"]["senpi"]["args"][1], "https://mcp.example/mcp");
        assert_eq!(v["mcpServers"]["senpi"]["env"]["SENPI_AUTH_TOKEN"], "tok1");
        assert_eq!(v["imports"][0], "a");
    }

    #[test]
    fn rotate_token_updates_existing_entry_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcporter.json");
        std::fs::write(
            &path,
            r#"{"mcpServers":{"senpi":{"command":"custom","args":["keep"]}}}"#,
        )
        .unwrap();

        let cfg = IntegrationConfig::new(&path);
        cfg.rotate_token("https://ignored", "tok2").unwrap();

        let v: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["mcpServers"]["senpi"]["command"], "custom");
        assert_eq!(v["mcpServers"]["senpi"]["args"][0], "keep");
        assert_eq!(v["mcpServers"]["senpi"]["env"]["SENPI_AUTH_TOKEN"], "tok2");
    }

    #[test]
    fn rotate_token_recovers_from_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mcporter.json");
        std::fs::write(&path, "garbage").unwrap();

        IntegrationConfig::new(&path)
            .rotate_token("https://mcp.example/mcp", "tok3")
            .unwrap();
        let v: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["mcpServers"]["senpi"]["env"]["SENPI_AUTH_TOKEN"], "tok3");
        assert_eq!(v["imports"], json!([]));
    }
}
