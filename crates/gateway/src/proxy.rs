//! HTTP pass-through to the gateway.
//!
//! Every request that no wrapper route claims ends up in [`proxy_handler`].
//! The client's own `Authorization` header never reaches the gateway; the
//! shared token replaces it.

use std::net::{IpAddr, SocketAddr};

use {
    axum::{
        body::Body,
        extract::{ConnectInfo, Request, State},
        http::{
            HeaderMap, HeaderName, HeaderValue, StatusCode,
            header::{AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, TRANSFER_ENCODING},
        },
        response::{Html, IntoResponse, Redirect, Response},
    },
    tracing::{debug, warn},
};

use crate::{
    error::Result,
    inject::render_control_ui,
    state::{AppState, GatewayState},
    ws,
};

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub(crate) const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub(crate) const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub(crate) const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

/// Served instead of the setup redirect while auto-onboarding runs.
pub const HOLDING_PAGE: &str = concat!(
    r#"<!DOCTYPE html><html><head><meta charset="utf-8"><meta http-equiv="refresh" content="5">"#,
    r#"<title>Setting up...</title></head>"#,
    r#"<body style="background:#050810;color:#fff;font-family:system-ui,sans-serif;display:flex;"#,
    r#"justify-content:center;align-items:center;height:100vh;margin:0">"#,
    r#"<div style="text-align:center"><h2>Setting up your bot...</h2>"#,
    r#"<p>Auto-configuration is in progress. This page will refresh automatically.</p>"#,
    r#"</div></body></html>"#,
);

/// Router fallback: everything outside the wrapper's own routes.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    let gw = &state.gateway;
    let upgrade = ws::is_upgrade_request(request.headers());

    if !gw.is_configured() {
        if upgrade {
            debug!("refusing websocket upgrade, gateway not configured");
            return (StatusCode::SERVICE_UNAVAILABLE, "Gateway not configured").into_response();
        }
        if request.uri().path().starts_with("/setup") {
            return (StatusCode::NOT_FOUND, "Not found").into_response();
        }
        if gw.pipeline.is_running() {
            return (StatusCode::SERVICE_UNAVAILABLE, Html(HOLDING_PAGE)).into_response();
        }
        return Redirect::to("/setup").into_response();
    }

    if let Err(e) = gw.supervisor.ensure_running().await {
        warn!(error = %e, path = request.uri().path(), "gateway not ready");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            [(CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("Gateway not ready: {e}"),
        )
            .into_response();
    }

    if upgrade {
        return ws::proxy_upgrade(gw, request).await;
    }

    if let Some(transformer) = &gw.transformer
        && transformer.applies_to(request.method(), request.uri().path())
        && let Some(response) = render_control_ui(gw, transformer.as_ref(), request.uri()).await
    {
        return response;
    }

    forward(gw, request)
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

/// Stream `request` to the gateway and its response back.
pub async fn forward(gw: &GatewayState, request: Request) -> Result<Response> {
    let client_ip = client_ip(&request);
    let (parts, body) = request.into_parts();
    let path_and_query = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = format!("{}{path_and_query}", gw.target);

    let has_body =
        parts.headers.contains_key(CONTENT_LENGTH) || parts.headers.contains_key(TRANSFER_ENCODING);
    let mut headers = upstream_headers(&parts.headers, client_ip);
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&gw.token().bearer())?);

    debug!(method = %parts.method, path = parts.uri.path(), "proxying request");
    let mut upstream = gw.client.request(parts.method, &url).headers(headers);
    if has_body {
        upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }
    let upstream = upstream.send().await?;

    let status = upstream.status();
    let headers = strip_hop_by_hop(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

pub(crate) fn client_ip(request: &Request) -> Option<IpAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Copy `headers` minus hop-by-hop headers and any header the
/// `Connection` header names.
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name_str = name.as_str();
        if HOP_BY_HOP.contains(&name_str) || listed.iter().any(|l| l == name_str) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Request headers for the upstream hop: no hop-by-hop headers, no `Host`,
/// no client `Authorization`, plus the `X-Forwarded-*` set.
pub fn upstream_headers(incoming: &HeaderMap, client_ip: Option<IpAddr>) -> HeaderMap {
    let mut out = strip_hop_by_hop(incoming);
    out.remove(HOST);
    out.remove(AUTHORIZATION);

    if let Some(ip) = client_ip {
        let chain = match incoming.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(prior) if !prior.trim().is_empty() => format!("{prior}, {ip}"),
            _ => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            out.insert(X_FORWARDED_FOR, value);
        }
    }
    if !out.contains_key(&X_FORWARDED_PROTO) {
        out.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }
    if !out.contains_key(&X_FORWARDED_HOST)
        && let Some(host) = incoming.get(HOST)
    {
        out.insert(X_FORWARDED_HOST, host.clone());
    }
    out
}
