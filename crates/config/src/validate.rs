//! Startup diagnostics for wrapper settings and deployment environment.
//!
//! Nothing here is fatal: the binary logs every diagnostic and keeps going so
//! a misconfigured deployment can still reach `/setup`.

use std::fmt;

use crate::schema::Settings;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Setting or environment variable the diagnostic is about.
    pub field: &'static str,
    pub message: String,
}

impl Diagnostic {
    pub fn error(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            field,
            message: message.into(),
        }
    }

    pub fn warning(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            field,
            message: message.into(),
        }
    }
}

/// Collected diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Emit every diagnostic through `tracing` at a matching level.
    pub fn log(&self) {
        for d in &self.diagnostics {
            match d.severity {
                Severity::Error => tracing::error!(field = d.field, "{}", d.message),
                Severity::Warning => tracing::warn!(field = d.field, "{}", d.message),
                Severity::Info => tracing::info!(field = d.field, "{}", d.message),
            }
        }
    }
}

/// Check wrapper settings for combinations that cannot work.
pub fn validate_settings(settings: &Settings) -> ValidationResult {
    let mut result = ValidationResult::default();

    if settings.setup_password().is_none() {
        result.push(Diagnostic::warning(
            "SETUP_PASSWORD",
            "not set; /setup will refuse every request",
        ));
    }
    if settings.port == 0 {
        result.push(Diagnostic::error("PORT", "must be a non-zero port"));
    }
    if settings.internal_port == settings.port && is_loopback_host(&settings.internal_host) {
        result.push(Diagnostic::error(
            "INTERNAL_GATEWAY_PORT",
            format!(
                "collides with the public port {}; the gateway could never bind",
                settings.port
            ),
        ));
    }
    if !is_loopback_host(&settings.internal_host) {
        result.push(Diagnostic::warning(
            "INTERNAL_GATEWAY_HOST",
            format!(
                "{} is not a loopback address; the gateway is spawned with --bind loopback",
                settings.internal_host
            ),
        ));
    }
    if settings.ready_timeout_ms < 250 {
        result.push(Diagnostic::warning(
            "ready_timeout_ms",
            "shorter than one probe interval; every start will time out",
        ));
    }

    result
}

fn is_loopback_host(host: &str) -> bool {
    host == "localhost"
        || host
            .trim_matches(|c| c == '[' || c == ']')
            .parse::<std::net::IpAddr>()
            .is_ok_and(|ip| ip.is_loopback())
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    #[test]
    fn default_settings_only_warn_about_password() {
        let result = validate_settings(&Settings::default());
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
        assert_eq!(result.diagnostics[0].field, "SETUP_PASSWORD");
    }

    #[test]
    fn port_collision_is_an_error() {
        let settings = Settings {
            port: 18789,
            setup_password: Some(Secret::new("pw".into())),
            ..Default::default()
        };
        let result = validate_settings(&settings);
        assert!(result.has_errors());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.field == "INTERNAL_GATEWAY_PORT")
        );
    }

    #[test]
    fn non_loopback_internal_host_warns() {
        let settings = Settings {
            internal_host: "10.0.0.4".into(),
            setup_password: Some(Secret::new("pw".into())),
            ..Default::default()
        };
        let result = validate_settings(&settings);
        assert_eq!(result.count(Severity::Warning), 1);
        assert!(is_loopback_host("[::1]"));
        assert!(is_loopback_host("localhost"));
    }
}
