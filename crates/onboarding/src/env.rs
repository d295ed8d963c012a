//! Deployment environment checks and auto-onboarding eligibility.

use {
    clawgate_config::{Diagnostic, OnboardEnv, ValidationResult, strip_bearer},
    tracing::info,
};

use crate::providers::{auth_choice_for, known_providers};

const MIN_API_KEY_LEN: usize = 8;

/// Check the onboarding environment variables for common mistakes.
pub fn validate_env() -> ValidationResult {
    validate_env_with(|name| std::env::var(name).ok())
}

/// Like [`validate_env`] with a custom variable lookup.
///
/// Only an unknown provider is an error; everything else is a warning and
/// the values are still used (with any `Bearer ` prefix removed).
pub fn validate_env_with(lookup: impl Fn(&str) -> Option<String>) -> ValidationResult {
    let get = |name: &str| {
        lookup(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    let mut result = ValidationResult::default();

    if let Some(provider) = get("AI_PROVIDER").map(|p| p.to_lowercase())
        && auth_choice_for(&provider).is_none()
    {
        result.push(Diagnostic::error(
            "AI_PROVIDER",
            format!(
                "\"{provider}\" is not recognized; valid values: {}",
                known_providers().collect::<Vec<_>>().join(", ")
            ),
        ));
    }

    if let Some(key) = get("AI_API_KEY") {
        if has_bearer_prefix(&key) {
            result.push(Diagnostic::warning(
                "AI_API_KEY",
                "starts with \"Bearer \"; the prefix is stripped, pass the raw key only",
            ));
        }
        if strip_bearer(&key).chars().count() < MIN_API_KEY_LEN {
            result.push(Diagnostic::warning(
                "AI_API_KEY",
                "looks too short, double-check the value",
            ));
        }
    }

    if let Some(token) = get("TELEGRAM_BOT_TOKEN")
        && !is_bot_token_shape(&token)
    {
        result.push(Diagnostic::warning(
            "TELEGRAM_BOT_TOKEN",
            "format looks wrong (expected \"123456789:ABC...\" from @BotFather)",
        ));
    }

    if get("SENPI_AUTH_TOKEN").is_some_and(|t| has_bearer_prefix(&t)) {
        result.push(Diagnostic::warning(
            "SENPI_AUTH_TOKEN",
            "starts with \"Bearer \"; the prefix is stripped",
        ));
    }

    if let Some(user) = get("TELEGRAM_USER_ID")
        && !is_user_id_shape(&user)
    {
        result.push(Diagnostic::warning(
            "TELEGRAM_USER_ID",
            format!("\"{user}\": expected @username or numeric chat ID"),
        ));
    }

    result
}

fn has_bearer_prefix(value: &str) -> bool {
    strip_bearer(value).len() != value.trim().len()
}

/// `<digits>:<[A-Za-z0-9_-]+>`
fn is_bot_token_shape(token: &str) -> bool {
    let Some((id, secret)) = token.split_once(':') else {
        return false;
    };
    !id.is_empty()
        && id.bytes().all(|b| b.is_ascii_digit())
        && !secret.is_empty()
        && secret
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// `@?\w+`
fn is_user_id_shape(user: &str) -> bool {
    let name = user.strip_prefix('@').unwrap_or(user);
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Why auto-onboarding can or cannot run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Eligibility {
    /// Failed preconditions; empty means eligible.
    pub reasons: Vec<String>,
}

impl Eligibility {
    /// Eligible when not yet configured, the provider is known and an API
    /// key is present.
    pub fn check(env: &OnboardEnv, configured: bool) -> Self {
        let mut reasons = Vec::new();
        if configured {
            reasons.push("gateway is already configured".to_string());
        }
        match env.provider.as_deref() {
            None => reasons.push("AI_PROVIDER is not set".to_string()),
            Some(p) if auth_choice_for(p).is_none() => {
                reasons.push(format!("AI_PROVIDER \"{p}\" is not a known provider"));
            },
            Some(_) => {},
        }
        if env.api_key().is_none() {
            reasons.push("AI_API_KEY is not set".to_string());
        }
        Self { reasons }
    }

    pub fn is_eligible(&self) -> bool {
        self.reasons.is_empty()
    }

    /// Log each failed precondition. Quiet when the deployment is simply
    /// configured already or has no onboarding variables at all.
    pub fn log(&self, env: &OnboardEnv) {
        let interesting = env.provider.is_some() || env.api_key().is_some();
        if self.is_eligible() || !interesting {
            return;
        }
        for reason in &self.reasons {
            info!(reason = %reason, "auto-onboarding skipped");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        clawgate_config::Severity,
        secrecy::Secret,
        std::collections::HashMap,
    };

    fn validate(vars: &[(&str, &str)]) -> ValidationResult {
        let vars: HashMap<_, _> = vars.iter().copied().collect();
        validate_env_with(|k| vars.get(k).map(|v| v.to_string()))
    }

    fn fields(result: &ValidationResult, severity: Severity) -> Vec<&'static str> {
        result
            .diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .map(|d| d.field)
            .collect()
    }

    #[test]
    fn clean_environment() {
        let result = validate(&[
            ("AI_PROVIDER", "Anthropic"),
            ("AI_API_KEY", "sk-ant-0123456789"),
            ("TELEGRAM_BOT_TOKEN", "123456:AA-bb_CC"),
            ("TELEGRAM_USER_ID", "@alice"),
        ]);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn unknown_provider_is_the_only_error() {
        let result = validate(&[
            ("AI_PROVIDER", "mistral"),
            ("AI_API_KEY", "Bearer short"),
            ("TELEGRAM_BOT_TOKEN", "not-a-token"),
            ("SENPI_AUTH_TOKEN", "bearer abc"),
            ("TELEGRAM_USER_ID", "alice smith"),
        ]);
        assert!(result.has_errors());
        assert_eq!(fields(&result, Severity::Error), vec!["AI_PROVIDER"]);
        assert_eq!(fields(&result, Severity::Warning), vec![
            "AI_API_KEY",
            "AI_API_KEY",
            "TELEGRAM_BOT_TOKEN",
            "SENPI_AUTH_TOKEN",
            "TELEGRAM_USER_ID",
        ]);
    }

    #[test]
    fn numeric_user_id_is_fine() {
        assert!(is_user_id_shape("123456789"));
        assert!(is_user_id_shape("@bob_2"));
        assert!(!is_user_id_shape("@"));
        assert!(!is_bot_token_shape("123:"));
        assert!(!is_bot_token_shape("abc:def"));
    }

    #[test]
    fn eligibility() {
        let env = OnboardEnv {
            provider: Some("openai".into()),
            api_key: Some(Secret::new("sk-123456789".into())),
            ..Default::default()
        };
        assert!(Eligibility::check(&env, false).is_eligible());

        let configured = Eligibility::check(&env, true);
        assert_eq!(configured.reasons, vec!["gateway is already configured"]);

        let unknown = OnboardEnv {
            provider: Some("mistral".into()),
            ..Default::default()
        };
        let check = Eligibility::check(&unknown, false);
        assert_eq!(check.reasons.len(), 2);
        assert!(!check.is_eligible());
    }
}
