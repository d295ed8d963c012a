//! Messaging channel configuration written after a successful onboard.
//!
//! Channels are configured by writing `channels.<name>` directly through
//! `config set --json`, and only when the installed gateway build lists the
//! channel in `channels add --help`.

use {
    clawgate_supervisor::{CommandOutput, ConfigSync},
    serde_json::{Value, json},
    tracing::{info, warn},
};

use crate::args::OnboardRequest;

/// Who triggered onboarding. Decides the Telegram DM policy and which
/// channels may be configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// Unattended, from the environment. Telegram only, open DMs.
    Auto,
    /// From the setup page. DMs require pairing.
    Setup,
}

pub fn telegram_config(bot_token: &str, mode: ChannelMode) -> Value {
    match mode {
        // An open DM policy requires an explicit wildcard allow list.
        ChannelMode::Auto => json!({
            "enabled": true,
            "dmPolicy": "open",
            "allowFrom": ["*"],
            "botToken": bot_token,
            "groupPolicy": "allowlist",
            "streamMode": "partial",
        }),
        ChannelMode::Setup => json!({
            "enabled": true,
            "dmPolicy": "pairing",
            "botToken": bot_token,
            "groupPolicy": "allowlist",
            "streamMode": "partial",
        }),
    }
}

pub fn discord_config(token: &str) -> Value {
    json!({
        "enabled": true,
        "token": token,
        "groupPolicy": "allowlist",
        "dm": { "policy": "pairing" },
    })
}

pub fn slack_config(bot_token: Option<&str>, app_token: Option<&str>) -> Value {
    let mut config = json!({ "enabled": true });
    if let Some(t) = bot_token {
        config["botToken"] = json!(t);
    }
    if let Some(t) = app_token {
        config["appToken"] = json!(t);
    }
    config
}

/// Appends `[<label>] exit=<code>` blocks for the setup log.
#[derive(Debug, Default)]
pub struct ChannelLog {
    text: String,
}

impl ChannelLog {
    fn record(&mut self, label: &str, out: &CommandOutput) {
        let body = if out.output.is_empty() {
            "(no output)"
        } else {
            out.output.as_str()
        };
        self.text.push_str(&format!(
            "\n[{label}] exit={} (output {} chars)\n{body}",
            out.code,
            out.output.len()
        ));
    }

    fn note(&mut self, line: &str) {
        self.text.push('\n');
        self.text.push_str(line);
        self.text.push('\n');
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Configure every channel `request` carries credentials for.
pub async fn configure_channels(sync: &ConfigSync, request: &OnboardRequest, mode: ChannelMode) -> ChannelLog {
    let mut log = ChannelLog::default();

    let wants_discord = mode == ChannelMode::Setup && request.discord_token().is_some();
    let wants_slack = mode == ChannelMode::Setup
        && (request.slack_bot_token().is_some() || request.slack_app_token().is_some());
    if request.telegram_token().is_none() && !wants_discord && !wants_slack {
        return log;
    }

    let help = sync.cli().channels_add_help().await.output;
    let supports = |name: &str| help.contains(name);

    if let Some(token) = request.telegram_token() {
        if supports("telegram") {
            info!(?mode, "configuring telegram channel");
            let set = write_channel(sync, "channels.telegram", &telegram_config(token, mode)).await;
            // Some gateway builds only load the channel with its plugin entry enabled.
            sync.apply_patch(
                "plugins.entries.telegram",
                &json!({ "enabled": true }).to_string(),
                true,
            )
            .await;
            let doctor = sync.cli().run(["doctor", "--fix"]).await;
            info!(exit_code = doctor.code, "doctor --fix finished");
            let get = sync.cli().run(["config", "get", "channels.telegram"]).await;
            log.record("telegram config", &set);
            log.record("telegram doctor", &doctor);
            log.record("telegram verify", &get);
        } else {
            warn!("gateway build does not support telegram, skipping");
            log.note("[telegram] skipped (this openclaw build does not list telegram in `channels add --help`)");
        }
    }

    if wants_discord && let Some(token) = request.discord_token() {
        if supports("discord") {
            let set = write_channel(sync, "channels.discord", &discord_config(token)).await;
            let get = sync.cli().run(["config", "get", "channels.discord"]).await;
            log.record("discord config", &set);
            log.record("discord verify", &get);
        } else {
            log.note("[discord] skipped (this openclaw build does not list discord in `channels add --help`)");
        }
    }

    if wants_slack {
        if supports("slack") {
            let config = slack_config(request.slack_bot_token(), request.slack_app_token());
            let set = write_channel(sync, "channels.slack", &config).await;
            let get = sync.cli().run(["config", "get", "channels.slack"]).await;
            log.record("slack config", &set);
            log.record("slack verify", &get);
        } else {
            log.note("[slack] skipped (this openclaw build does not list slack in `channels add --help`)");
        }
    }

    log
}

async fn write_channel(sync: &ConfigSync, key: &str, config: &Value) -> CommandOutput {
    let out = sync.apply_patch(key, &config.to_string(), true).await;
    if out.success() {
        info!(key, "channel config written");
    } else {
        warn!(key, exit_code = out.code, output = %out.output.trim(), "channel config write failed");
    }
    out
}
