//! The shared secret between the wrapper and the gateway.
//!
//! Resolved once at process start. The same value is sent as the bearer
//! credential on every proxied request and written to `gateway.auth.token`
//! in the gateway's configuration document.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use {
    secrecy::{ExposeSecret, Secret},
    tracing::{info, warn},
};

use crate::error::{Error, Result};

/// File name of the persisted token inside the state directory.
pub const TOKEN_FILE: &str = "gateway.token";

/// Where the resolved token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Env,
    File,
    Generated,
}

impl fmt::Display for TokenSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Env => write!(f, "env"),
            Self::File => write!(f, "file"),
            Self::Generated => write!(f, "generated"),
        }
    }
}

/// The authoritative gateway token.
#[derive(Clone)]
pub struct GatewayToken {
    secret: Secret<String>,
    source: TokenSource,
}

impl GatewayToken {
    pub fn new(value: impl Into<String>, source: TokenSource) -> Self {
        Self {
            secret: Secret::new(value.into()),
            source,
        }
    }

    pub fn expose(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn source(&self) -> TokenSource {
        self.source
    }

    /// Log-safe prefix of the token.
    pub fn prefix(&self) -> String {
        clawgate_common::secret_prefix(self.expose())
    }

    /// `Bearer <token>` header value.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.expose())
    }

    /// Byte-for-byte comparison against a value read back from elsewhere.
    pub fn matches(&self, other: &str) -> bool {
        self.expose().as_bytes() == other.as_bytes()
    }
}

impl fmt::Debug for GatewayToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayToken")
            .field("prefix", &self.prefix())
            .field("len", &self.expose().len())
            .field("source", &self.source)
            .finish()
    }
}

/// Resolve the gateway token.
///
/// Precedence:
/// 1. `env_value`, when non-empty after trimming
/// 2. the trimmed, non-empty content of `<state_dir>/gateway.token`
/// 3. a freshly generated token, persisted to that file with mode 0600
///
/// A failed write in step 3 is logged and the in-memory token is still used;
/// it will simply be regenerated on the next start.
pub fn resolve_token(env_value: Option<&str>, state_dir: &Path) -> GatewayToken {
    if let Some(value) = env_value.map(str::trim).filter(|v| !v.is_empty()) {
        let token = GatewayToken::new(value, TokenSource::Env);
        info!(prefix = %token.prefix(), len = value.len(), "using gateway token from env");
        return token;
    }

    let path = state_dir.join(TOKEN_FILE);
    match std::fs::read_to_string(&path) {
        Ok(content) if !content.trim().is_empty() => {
            let token = GatewayToken::new(content.trim(), TokenSource::File);
            info!(path = %path.display(), prefix = %token.prefix(), "using persisted gateway token");
            return token;
        },
        Ok(_) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => warn!(path = %path.display(), error = %e, "could not read gateway token file"),
    }

    let token = GatewayToken::new(generate_token(), TokenSource::Generated);
    match persist(&path, token.expose()) {
        Ok(()) => info!(path = %path.display(), prefix = %token.prefix(), "generated gateway token"),
        Err(e) => warn!(error = %e, "generated gateway token but could not persist it"),
    }
    token
}

/// 32 random bytes, hex-encoded.
pub fn generate_token() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn persist(path: &Path, token: &str) -> Result<()> {
    let err = |source| Error::Persist {
        path: PathBuf::from(path),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(err)?;
    }
    std::fs::write(path, token).map_err(err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(err)?;
    }

    Ok(())
}
