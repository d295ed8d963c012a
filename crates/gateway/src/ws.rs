//! WebSocket pass-through.
//!
//! The upstream handshake carries the shared token twice: as a bearer header
//! and as the `token` query parameter the gateway's browser client would
//! normally send itself. Frames are relayed unchanged in both directions
//! until either side closes.

use std::borrow::Cow;

use {
    axum::{
        extract::{
            FromRequestParts, Request,
            ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        },
        http::{
            HeaderMap, HeaderValue, Uri,
            header::{AUTHORIZATION, COOKIE, HOST, ORIGIN, SEC_WEBSOCKET_PROTOCOL, UPGRADE, USER_AGENT},
        },
        response::{IntoResponse, Response},
    },
    futures::{SinkExt, StreamExt},
    tokio::net::TcpStream,
    tokio_tungstenite::{
        MaybeTlsStream, WebSocketStream, connect_async,
        tungstenite::{
            Message as UpstreamMessage,
            client::IntoClientRequest,
            protocol::{CloseFrame as UpstreamCloseFrame, frame::coding::CloseCode},
        },
    },
    tracing::{debug, info},
    url::Url,
};

use crate::{
    error::{Error, Result},
    proxy::{X_FORWARDED_FOR, X_FORWARDED_HOST, X_FORWARDED_PROTO, client_ip},
    state::GatewayState,
};

type Upstream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// `Upgrade: websocket`, case-insensitive.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
}

/// Upstream WebSocket URL for a client request URI. Adds `token=<token>`
/// unless the client already sent a `token` parameter.
pub fn upstream_url(target: &str, uri: &Uri, token: &str) -> Result<Url> {
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let mut url = Url::parse(&format!("{target}{path_and_query}"))?;
    let scheme = if url.scheme() == "https" {
        "wss"
    } else {
        "ws"
    };
    url.set_scheme(scheme)
        .map_err(|()| Error::message(format!("cannot switch {target} to {scheme}")))?;
    if !url.query_pairs().any(|(key, _)| key == "token") {
        url.query_pairs_mut().append_pair("token", token);
    }
    Ok(url)
}

/// Complete the client's upgrade once the gateway accepted ours.
pub async fn proxy_upgrade(gw: &GatewayState, request: Request) -> Response {
    match connect(gw, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn connect(gw: &GatewayState, request: Request) -> Result<Response> {
    let client_ip = client_ip(&request);
    let (mut parts, _body) = request.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let url = upstream_url(&gw.target, &parts.uri, gw.token().expose())?;
    let mut upstream_request = url.as_str().into_client_request()?;
    let headers = upstream_request.headers_mut();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&gw.token().bearer())?);
    for name in [ORIGIN, COOKIE, USER_AGENT, SEC_WEBSOCKET_PROTOCOL] {
        if let Some(value) = parts.headers.get(&name) {
            headers.insert(name, value.clone());
        }
    }
    if let Some(ip) = client_ip
        && let Ok(value) = HeaderValue::from_str(&ip.to_string())
    {
        headers.insert(X_FORWARDED_FOR, value);
    }
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    if let Some(host) = parts.headers.get(HOST) {
        headers.insert(X_FORWARDED_HOST, host.clone());
    }

    let (upstream, handshake) = connect_async(upstream_request).await?;
    info!(path = parts.uri.path(), "websocket connected upstream");

    let upgrade = match handshake
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
    {
        Some(protocol) => upgrade.protocols([Cow::Owned(protocol.to_string())]),
        None => upgrade,
    };
    Ok(upgrade.on_upgrade(move |socket| relay(socket, upstream)))
}

async fn relay(client: WebSocket, upstream: Upstream) {
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async {
        while let Some(Ok(message)) = client_rx.next().await {
            let closing = matches!(message, Message::Close(_));
            if upstream_tx.send(to_upstream(message)).await.is_err() || closing {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    };

    let upstream_to_client = async {
        while let Some(Ok(message)) = upstream_rx.next().await {
            let Some(message) = to_client(message) else {
                continue;
            };
            let closing = matches!(message, Message::Close(_));
            if client_tx.send(message).await.is_err() || closing {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        () = client_to_upstream => debug!("websocket client side closed"),
        () = upstream_to_client => debug!("websocket upstream side closed"),
    }
}

fn to_upstream(message: Message) -> UpstreamMessage {
    match message {
        Message::Text(text) => UpstreamMessage::Text(text.as_str().into()),
        Message::Binary(data) => UpstreamMessage::Binary(data),
        Message::Ping(data) => UpstreamMessage::Ping(data),
        Message::Pong(data) => UpstreamMessage::Pong(data),
        Message::Close(frame) => UpstreamMessage::Close(frame.map(|f| UpstreamCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.as_str().into(),
        })),
    }
}

/// Raw frames never surface from a reading stream; they map to `None`.
fn to_client(message: UpstreamMessage) -> Option<Message> {
    Some(match message {
        UpstreamMessage::Text(text) => Message::Text(text.as_str().into()),
        UpstreamMessage::Binary(data) => Message::Binary(data),
        UpstreamMessage::Ping(data) => Message::Ping(data),
        UpstreamMessage::Pong(data) => Message::Pong(data),
        UpstreamMessage::Close(frame) => Message::Close(frame.map(|f| CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().into(),
        })),
        UpstreamMessage::Frame(_) => return None,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn token_is_added_to_query() {
        let uri: Uri = "/ws?session=main".parse().unwrap();
        let url = upstream_url("http://127.0.0.1:18789", &uri, "tok").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:18789/ws?session=main&token=tok");
    }

    #[test]
    fn existing_token_is_kept() {
        let uri: Uri = "/?token=client".parse().unwrap();
        let url = upstream_url("http://127.0.0.1:18789", &uri, "tok").unwrap();
        assert_eq!(url.as_str(), "ws://127.0.0.1:18789/?token=client");
    }

    #[test]
    fn upgrade_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_upgrade_request(&headers));
        headers.insert(UPGRADE, HeaderValue::from_static("WebSocket"));
        assert!(is_upgrade_request(&headers));
        headers.insert(UPGRADE, HeaderValue::from_static("h2c"));
        assert!(!is_upgrade_request(&headers));
    }

    #[test]
    fn close_frames_keep_their_code() {
        let out = to_upstream(Message::Close(Some(CloseFrame {
            code: 4001,
            reason: "bye".into(),
        })));
        let UpstreamMessage::Close(Some(frame)) = out else {
            panic!("expected close frame");
        };
        assert_eq!(u16::from(frame.code), 4001);
        assert_eq!(frame.reason.as_str(), "bye");
    }
}
