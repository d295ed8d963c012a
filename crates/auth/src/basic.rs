//! HTTP Basic verification for the setup namespace.
//!
//! Only the password half of the credential is checked; the username is
//! ignored.

use {
    axum::http::{HeaderMap, header::AUTHORIZATION},
    base64::Engine,
};

/// Realm sent in the `WWW-Authenticate` challenge.
pub const SETUP_REALM: &str = "Openclaw Setup";

/// Result of checking a request against the setup password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BasicAuthOutcome {
    /// No setup password is configured; setup must be refused outright.
    NotConfigured,
    /// Missing, malformed or wrong credentials.
    Denied,
    Granted,
}

/// Check the `Authorization: Basic` header against `expected_password`.
pub fn check_basic_auth(headers: &HeaderMap, expected_password: Option<&str>) -> BasicAuthOutcome {
    let Some(expected) = expected_password.filter(|p| !p.is_empty()) else {
        return BasicAuthOutcome::NotConfigured;
    };

    let supplied = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(decode_basic_password);

    match supplied {
        Some(password) if constant_time_eq(password.as_bytes(), expected.as_bytes()) => {
            BasicAuthOutcome::Granted
        },
        _ => BasicAuthOutcome::Denied,
    }
}

/// Extract the password from a `Basic <base64(user:pass)>` header value.
fn decode_basic_password(value: &str) -> Option<String> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    // No separator means no password at all.
    let (_, password) = decoded.split_once(':')?;
    Some(password.to_string())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn basic(user_pass: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        let encoded = base64::engine::general_purpose::STANDARD.encode(user_pass);
        h.insert(AUTHORIZATION, format!("Basic {encoded}").parse().unwrap());
        h
    }

    #[test]
    fn missing_password_config_is_distinct() {
        assert_eq!(
            check_basic_auth(&basic("admin:pw"), None),
            BasicAuthOutcome::NotConfigured
        );
        assert_eq!(
            check_basic_auth(&basic("admin:pw"), Some("")),
            BasicAuthOutcome::NotConfigured
        );
    }

    #[test]
    fn username_is_ignored() {
        assert_eq!(
            check_basic_auth(&basic("anyone:pw"), Some("pw")),
            BasicAuthOutcome::Granted
        );
        assert_eq!(
            check_basic_auth(&basic(":pw"), Some("pw")),
            BasicAuthOutcome::Granted
        );
    }

    #[test]
    fn password_may_contain_colons() {
        assert_eq!(
            check_basic_auth(&basic("u:p:w"), Some("p:w")),
            BasicAuthOutcome::Granted
        );
    }

    #[test]
    fn wrong_or_missing_credentials_denied() {
        assert_eq!(
            check_basic_auth(&basic("admin:nope"), Some("pw")),
            BasicAuthOutcome::Denied
        );
        assert_eq!(
            check_basic_auth(&HeaderMap::new(), Some("pw")),
            BasicAuthOutcome::Denied
        );

        let mut bearer = HeaderMap::new();
        bearer.insert(AUTHORIZATION, "Bearer pw".parse().unwrap());
        assert_eq!(check_basic_auth(&bearer, Some("pw")), BasicAuthOutcome::Denied);

        let mut garbage = HeaderMap::new();
        garbage.insert(AUTHORIZATION, "Basic !!!".parse().unwrap());
        assert_eq!(
            check_basic_auth(&garbage, Some("pw")),
            BasicAuthOutcome::Denied
        );
    }
}
