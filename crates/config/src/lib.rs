//! Wrapper settings, the gateway's JSON configuration document, and state
//! bootstrap.
//!
//! Settings file: `clawgate.toml`, searched in `./` then `~/.config/clawgate/`.
//! Every field can be overridden by the deployment's environment variables
//! (`PORT`, `OPENCLAW_STATE_DIR`, ...). `${ENV_VAR}` substitution applies to
//! the settings file before parsing.

pub mod bootstrap;
pub mod document;
pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    bootstrap::{IntegrationConfig, bootstrap_patch, ensure_dirs, patch_document},
    document::{ConfigDocument, deep_merge, lookup, set_path},
    error::{Error, Result},
    loader::{apply_env_overrides, apply_env_overrides_with, discover_and_load, load_settings},
    schema::{OnboardEnv, Settings, strip_bearer},
    validate::{Diagnostic, Severity, ValidationResult, validate_settings},
};
