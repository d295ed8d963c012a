//! Credentials guarding the wrapper.
//!
//! This crate provides:
//! - `GatewayToken` / `resolve_token`: the shared secret between the wrapper
//!   and the gateway, resolved once per process
//! - `check_basic_auth`: HTTP Basic verification for the setup namespace
//! - Connection locality detection for loopback-only endpoints

pub mod basic;
pub mod error;
pub mod locality;
pub mod token;

pub use {
    basic::{BasicAuthOutcome, SETUP_REALM, check_basic_auth},
    error::{Error, Result},
    locality::{has_proxy_headers, is_local_connection},
    token::{GatewayToken, TokenSource, generate_token, resolve_token},
};
