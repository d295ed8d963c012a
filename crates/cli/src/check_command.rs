//! `clawgate check`: validate settings and the onboarding environment
//! without starting anything.

use {
    anyhow::Result,
    clawgate_config::{ConfigDocument, OnboardEnv, Settings, Severity, ValidationResult, validate_settings},
    clawgate_onboarding::{Eligibility, validate_env_with},
};

// ── ANSI helpers ────────────────────────────────────────────────────────────

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Ok,
    Warn,
    Fail,
    Info,
}

impl Status {
    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Fail => "fail",
            Self::Info => "info",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Self::Ok => GREEN,
            Self::Warn => YELLOW,
            Self::Fail => RED,
            Self::Info => CYAN,
        }
    }
}

struct Section {
    title: &'static str,
    items: Vec<(Status, String)>,
}

impl Section {
    fn new(title: &'static str) -> Self {
        Self {
            title,
            items: Vec::new(),
        }
    }

    fn push(&mut self, status: Status, message: impl Into<String>) {
        self.items.push((status, message.into()));
    }

    fn extend_from(&mut self, result: &ValidationResult) {
        for d in &result.diagnostics {
            let status = match d.severity {
                Severity::Error => Status::Fail,
                Severity::Warning => Status::Warn,
                Severity::Info => Status::Info,
            };
            self.push(status, format!("{}: {}", d.field, d.message));
        }
        if result.diagnostics.is_empty() {
            self.push(Status::Ok, "no problems found");
        }
    }

    fn failures(&self) -> usize {
        self.items.iter().filter(|(s, _)| *s == Status::Fail).count()
    }
}

fn collect(settings: &Settings, lookup: impl Fn(&str) -> Option<String> + Copy) -> Vec<Section> {
    let mut settings_section = Section::new("Settings");
    settings_section.extend_from(&validate_settings(settings));

    let mut env_section = Section::new("Onboarding environment");
    env_section.extend_from(&validate_env_with(lookup));

    let mut state = Section::new("State");
    let document = ConfigDocument::new(settings.config_path());
    let configured = document.exists();
    if configured {
        state.push(Status::Ok, format!("configuration at {}", document.path().display()));
    } else {
        state.push(
            Status::Info,
            format!("no configuration at {} (not onboarded yet)", document.path().display()),
        );
    }
    let env = OnboardEnv::from_lookup(lookup);
    let eligibility = Eligibility::check(&env, configured);
    if eligibility.is_eligible() {
        state.push(Status::Info, "auto-onboarding will run at startup");
    } else if !configured {
        for reason in &eligibility.reasons {
            state.push(Status::Info, format!("no auto-onboarding: {reason}"));
        }
    }

    vec![settings_section, env_section, state]
}

pub fn run(settings: &Settings) -> Result<()> {
    let sections = collect(settings, |name| std::env::var(name).ok());
    let mut failures = 0;
    for section in &sections {
        println!("{BOLD}{}{RESET}", section.title);
        for (status, message) in &section.items {
            println!("  {}[{}]{RESET} {message}", status.color(), status.label());
        }
        println!();
        failures += section.failures();
    }
    if failures > 0 {
        anyhow::bail!("{failures} problem(s) must be fixed before deploying");
    }
    Ok(())
}
