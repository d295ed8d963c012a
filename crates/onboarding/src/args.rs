//! Onboard command line construction.

use std::path::Path;

use {
    clawgate_auth::GatewayToken,
    clawgate_config::OnboardEnv,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
};

use crate::providers::{TOKEN_AUTH_CHOICE, auth_choice_for, secret_flag};

pub const DEFAULT_FLOW: &str = "quickstart";

/// Onboarding input, either posted by the setup page or derived from the
/// deployment environment.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OnboardRequest {
    pub flow: Option<String>,
    pub auth_choice: Option<String>,
    pub auth_secret: Option<Secret<String>>,
    pub telegram_token: Option<Secret<String>>,
    pub discord_token: Option<Secret<String>>,
    pub slack_bot_token: Option<Secret<String>>,
    pub slack_app_token: Option<Secret<String>>,
}

/// Trimmed, non-empty secret value.
pub(crate) fn non_empty(secret: &Option<Secret<String>>) -> Option<&str> {
    secret
        .as_ref()
        .map(|s| s.expose_secret().trim())
        .filter(|s| !s.is_empty())
}

impl OnboardRequest {
    /// Unattended request for a recognized `AI_PROVIDER`.
    pub fn from_env(env: &OnboardEnv) -> Option<Self> {
        let choice = auth_choice_for(env.provider.as_deref()?)?;
        Some(Self {
            flow: Some(DEFAULT_FLOW.into()),
            auth_choice: Some(choice.into()),
            auth_secret: env.api_key.clone(),
            telegram_token: env.telegram_bot_token.clone(),
            ..Default::default()
        })
    }

    pub fn flow(&self) -> &str {
        self.flow
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FLOW)
    }

    pub fn auth_secret(&self) -> Option<&str> {
        non_empty(&self.auth_secret)
    }

    pub fn telegram_token(&self) -> Option<&str> {
        non_empty(&self.telegram_token)
    }

    pub fn discord_token(&self) -> Option<&str> {
        non_empty(&self.discord_token)
    }

    pub fn slack_bot_token(&self) -> Option<&str> {
        non_empty(&self.slack_bot_token)
    }

    pub fn slack_app_token(&self) -> Option<&str> {
        non_empty(&self.slack_app_token)
    }
}

/// Where the onboarded gateway will live.
#[derive(Debug, Clone, Copy)]
pub struct OnboardTarget<'a> {
    pub workspace_dir: &'a Path,
    pub internal_port: u16,
    pub token: &'a GatewayToken,
}

/// Argument vector for the gateway's non-interactive `onboard` command.
///
/// The gateway is pinned to loopback with token auth using the wrapper's
/// token; the wrapper owns public networking.
pub fn build_onboard_args(request: &OnboardRequest, target: OnboardTarget<'_>) -> Vec<String> {
    let mut args: Vec<String> = [
        "onboard",
        "--non-interactive",
        "--accept-risk",
        "--json",
        "--no-install-daemon",
        "--skip-health",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    args.extend([
        "--workspace".into(),
        target.workspace_dir.display().to_string(),
        "--gateway-bind".into(),
        "loopback".into(),
        "--gateway-port".into(),
        target.internal_port.to_string(),
        "--gateway-auth".into(),
        "token".into(),
        "--gateway-token".into(),
        target.token.expose().to_string(),
        "--flow".into(),
        request.flow().to_string(),
    ]);

    let Some(choice) = request
        .auth_choice
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    else {
        return args;
    };
    args.extend(["--auth-choice".into(), choice.to_string()]);

    if let Some(secret) = request.auth_secret() {
        if let Some(flag) = secret_flag(choice) {
            args.extend([flag.to_string(), secret.to_string()]);
        }
        if choice == TOKEN_AUTH_CHOICE {
            args.extend([
                "--token-provider".into(),
                "anthropic".into(),
                "--token".into(),
                secret.to_string(),
            ]);
        }
    }

    args
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, clawgate_auth::TokenSource, std::path::PathBuf};

    fn target<'a>(ws: &'a Path, token: &'a GatewayToken) -> OnboardTarget<'a> {
        OnboardTarget {
            workspace_dir: ws,
            internal_port: 18789,
            token,
        }
    }

    #[test]
    fn api_key_choice() {
        let ws = PathBuf::from("/data/workspace");
        let token = GatewayToken::new("gw-token", TokenSource::Env);
        let req = OnboardRequest {
            auth_choice: Some("openai-api-key".into()),
            auth_secret: Some(Secret::new(" sk-1 ".into())),
            ..Default::default()
        };
        let args = build_onboard_args(&req, target(&ws, &token));
        assert_eq!(
            args,
            vec![
                "onboard",
                "--non-interactive",
                "--accept-risk",
                "--json",
                "--no-install-daemon",
                "--skip-health",
                "--workspace",
                "/data/workspace",
                "--gateway-bind",
                "loopback",
                "--gateway-port",
                "18789",
                "--gateway-auth",
                "token",
                "--gateway-token",
                "gw-token",
                "--flow",
                "quickstart",
                "--auth-choice",
                "openai-api-key",
                "--openai-api-key",
                "sk-1",
            ]
        );
    }

    #[test]
    fn setup_token_choice() {
        let ws = PathBuf::from("/w");
        let token = GatewayToken::new("t", TokenSource::Env);
        let req = OnboardRequest {
            flow: Some("advanced".into()),
            auth_choice: Some("token".into()),
            auth_secret: Some(Secret::new("sk-ant-oat".into())),
            ..Default::default()
        };
        let args = build_onboard_args(&req, target(&ws, &token));
        let tail: Vec<_> = args.iter().rev().take(8).rev().cloned().collect();
        assert_eq!(tail, vec![
            "--flow",
            "advanced",
            "--auth-choice",
            "token",
            "--token-provider",
            "anthropic",
            "--token",
            "sk-ant-oat",
        ]);
    }

    #[test]
    fn missing_secret_or_choice() {
        let ws = PathBuf::from("/w");
        let token = GatewayToken::new("t", TokenSource::Env);

        let no_secret = OnboardRequest {
            auth_choice: Some("apiKey".into()),
            auth_secret: Some(Secret::new("   ".into())),
            ..Default::default()
        };
        let args = build_onboard_args(&no_secret, target(&ws, &token));
        assert_eq!(args.last().map(String::as_str), Some("apiKey"));

        let args = build_onboard_args(&OnboardRequest::default(), target(&ws, &token));
        assert_eq!(args.last().map(String::as_str), Some("quickstart"));
        assert!(!args.iter().any(|a| a == "--auth-choice"));
    }

    #[test]
    fn from_env_maps_provider() {
        let env = OnboardEnv {
            provider: Some("google".into()),
            api_key: Some(Secret::new("AIza".into())),
            telegram_bot_token: Some(Secret::new("1:x".into())),
            ..Default::default()
        };
        let req = OnboardRequest::from_env(&env).unwrap();
        assert_eq!(req.auth_choice.as_deref(), Some("gemini-api-key"));
        assert_eq!(req.auth_secret(), Some("AIza"));
        assert_eq!(req.telegram_token(), Some("1:x"));
        assert_eq!(req.flow(), "quickstart");

        let unknown = OnboardEnv {
            provider: Some("mistral".into()),
            ..Default::default()
        };
        assert!(OnboardRequest::from_env(&unknown).is_none());
    }

    #[test]
    fn request_deserializes_from_setup_payload() {
        let req: OnboardRequest = serde_json::from_str(
            r#"{"flow":"quickstart","authChoice":"apiKey","authSecret":"sk","slackAppToken":"xapp"}"#,
        )
        .unwrap();
        assert_eq!(req.auth_choice.as_deref(), Some("apiKey"));
        assert_eq!(req.slack_app_token(), Some("xapp"));
        assert!(req.telegram_token().is_none());
    }
}
