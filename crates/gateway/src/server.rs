use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        http::header::{AUTHORIZATION, COOKIE, PROXY_AUTHORIZATION},
    },
    tokio::net::TcpListener,
    tower_http::{sensitive_headers::SetSensitiveRequestHeadersLayer, trace::TraceLayer},
    tracing::info,
};

use crate::{
    error::Result,
    proxy::proxy_handler,
    setup::setup_router,
    state::{AppState, GatewayState},
};

/// The full public router: `/setup` plus the authenticated pass-through.
pub fn build_app(gateway: Arc<GatewayState>) -> Router {
    let app_state = AppState { gateway };

    Router::new()
        .merge(setup_router(app_state.clone()))
        .fallback(proxy_handler)
        .layer(TraceLayer::new_for_http())
        .layer(SetSensitiveRequestHeadersLayer::new([
            AUTHORIZATION,
            PROXY_AUTHORIZATION,
            COOKIE,
        ]))
        .with_state(app_state)
}

/// Bind the public listener.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    Ok(listener)
}

/// Serve until the listener fails. Connection info is recorded so the
/// loopback-only endpoints can see the peer address.
pub async fn serve(listener: TcpListener, app: Router) -> Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
