//! Error context plumbing and log-redaction helpers shared by the clawgate
//! crates.

pub mod error;
pub mod redact;

pub use {
    error::FromMessage,
    redact::{mask_args, secret_prefix},
};
