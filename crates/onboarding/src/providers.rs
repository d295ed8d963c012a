//! Model providers known to the gateway's onboard command.

use serde::Serialize;

/// `AI_PROVIDER` value → onboard `--auth-choice`.
pub const PROVIDER_AUTH_CHOICES: &[(&str, &str)] = &[
    ("anthropic", "apiKey"),
    ("openai", "openai-api-key"),
    ("openrouter", "openrouter-api-key"),
    ("gemini", "gemini-api-key"),
    ("google", "gemini-api-key"),
    ("ai-gateway", "ai-gateway-api-key"),
    ("moonshot", "moonshot-api-key"),
    ("kimi-code", "kimi-code-api-key"),
    ("zai", "zai-api-key"),
    ("minimax", "minimax-api"),
    ("synthetic", "synthetic-api-key"),
    ("opencode-zen", "opencode-zen"),
];

/// Auth choice → flag carrying the secret on the onboard command line.
const SECRET_FLAGS: &[(&str, &str)] = &[
    ("openai-api-key", "--openai-api-key"),
    ("apiKey", "--anthropic-api-key"),
    ("openrouter-api-key", "--openrouter-api-key"),
    ("ai-gateway-api-key", "--ai-gateway-api-key"),
    ("moonshot-api-key", "--moonshot-api-key"),
    ("kimi-code-api-key", "--kimi-code-api-key"),
    ("gemini-api-key", "--gemini-api-key"),
    ("zai-api-key", "--zai-api-key"),
    ("minimax-api", "--minimax-api-key"),
    ("minimax-api-lightning", "--minimax-api-key"),
    ("synthetic-api-key", "--synthetic-api-key"),
    ("opencode-zen", "--opencode-zen-api-key"),
];

/// Anthropic setup-token flow.
pub const TOKEN_AUTH_CHOICE: &str = "token";

pub fn auth_choice_for(provider: &str) -> Option<&'static str> {
    PROVIDER_AUTH_CHOICES
        .iter()
        .find(|(p, _)| *p == provider)
        .map(|(_, choice)| *choice)
}

pub fn secret_flag(auth_choice: &str) -> Option<&'static str> {
    SECRET_FLAGS
        .iter()
        .find(|(c, _)| *c == auth_choice)
        .map(|(_, flag)| *flag)
}

pub fn known_providers() -> impl Iterator<Item = &'static str> {
    PROVIDER_AUTH_CHOICES.iter().map(|(p, _)| *p)
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthOption {
    pub value: &'static str,
    pub label: &'static str,
}

/// A provider family as listed by the setup page.
#[derive(Debug, Clone, Serialize)]
pub struct AuthGroup {
    pub value: &'static str,
    pub label: &'static str,
    pub hint: &'static str,
    pub options: Vec<AuthOption>,
}

fn group(
    value: &'static str,
    label: &'static str,
    hint: &'static str,
    options: &[(&'static str, &'static str)],
) -> AuthGroup {
    AuthGroup {
        value,
        label,
        hint,
        options: options
            .iter()
            .map(|&(value, label)| AuthOption { value, label })
            .collect(),
    }
}

/// Every auth choice the setup page offers, grouped by provider.
pub fn auth_groups() -> Vec<AuthGroup> {
    vec![
        group("openai", "OpenAI", "Codex OAuth + API key", &[
            ("codex-cli", "OpenAI Codex OAuth (Codex CLI)"),
            ("openai-codex", "OpenAI Codex (ChatGPT OAuth)"),
            ("openai-api-key", "OpenAI API key"),
        ]),
        group("anthropic", "Anthropic", "Claude Code CLI + API key", &[
            ("claude-cli", "Anthropic token (Claude Code CLI)"),
            ("token", "Anthropic token (paste setup-token)"),
            ("apiKey", "Anthropic API key"),
        ]),
        group("google", "Google", "Gemini API key + OAuth", &[
            ("gemini-api-key", "Google Gemini API key"),
            ("google-antigravity", "Google Antigravity OAuth"),
            ("google-gemini-cli", "Google Gemini CLI OAuth"),
        ]),
        group("openrouter", "OpenRouter", "API key", &[(
            "openrouter-api-key",
            "OpenRouter API key",
        )]),
        group("ai-gateway", "Vercel AI Gateway", "API key", &[(
            "ai-gateway-api-key",
            "Vercel AI Gateway API key",
        )]),
        group("moonshot", "Moonshot AI", "Kimi K2 + Kimi Code", &[
            ("moonshot-api-key", "Moonshot AI API key"),
            ("kimi-code-api-key", "Kimi Code API key"),
        ]),
        group("zai", "Z.AI (GLM 4.7)", "API key", &[(
            "zai-api-key",
            "Z.AI (GLM 4.7) API key",
        )]),
        group("minimax", "MiniMax", "M2.1 (recommended)", &[
            ("minimax-api", "MiniMax M2.1"),
            ("minimax-api-lightning", "MiniMax M2.1 Lightning"),
        ]),
        group("qwen", "Qwen", "OAuth", &[("qwen-portal", "Qwen OAuth")]),
        group("copilot", "Copilot", "GitHub + local proxy", &[
            ("github-copilot", "GitHub Copilot (GitHub device login)"),
            ("copilot-proxy", "Copilot Proxy (local)"),
        ]),
        group("synthetic", "Synthetic", "Anthropic-compatible (multi-model)", &[(
            "synthetic-api-key",
            "Synthetic API key",
        )]),
        group("opencode-zen", "OpenCode Zen", "API key", &[(
            "opencode-zen",
            "OpenCode Zen (multi-model proxy)",
        )]),
    ]
}
