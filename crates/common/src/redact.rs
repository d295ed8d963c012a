//! Helpers for keeping secrets out of logs.

/// Short, log-safe prefix of a secret: the first 8 characters followed by an
/// ellipsis, or `"(empty)"`.
#[must_use]
pub fn secret_prefix(secret: &str) -> String {
    if secret.is_empty() {
        return "(empty)".into();
    }
    let head: String = secret.chars().take(8).collect();
    format!("{head}...")
}

/// Render an argument vector for logging with every occurrence of the given
/// secrets replaced by `***`.
#[must_use]
pub fn mask_args(args: &[String], secrets: &[&str]) -> String {
    args.iter()
        .map(|arg| {
            if secrets.iter().any(|s| !s.is_empty() && arg == s) {
                "***".to_string()
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
