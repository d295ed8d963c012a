//! Public front door: the authenticated reverse proxy and the `/setup`
//! namespace.
//!
//! Request flow:
//! 1. `/setup/*` routes are served here, behind Basic auth
//! 2. everything else is forwarded to the supervised gateway with the shared
//!    token attached, starting the gateway on demand
//! 3. WebSocket upgrades are relayed frame by frame
//! 4. control UI entry pages get the token injected so the browser can
//!    connect without a prompt

pub mod error;
pub mod export;
pub mod inject;
pub mod proxy;
pub mod server;
pub mod setup;
pub mod state;
pub mod ws;

pub use {
    error::{Context, Error, Result},
    inject::{CONTROL_UI_PATHS, ResponseTransformer, TokenInjector, inject_script},
    server::{bind, build_app, serve},
    state::{AppState, GatewayState},
};
