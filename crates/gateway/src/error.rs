use {
    axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    clawgate_common::FromMessage,
    tracing::error,
};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The upstream gateway could not be reached or dropped the exchange.
    #[error("upstream request failed: {0}")]
    Proxy(#[from] reqwest::Error),

    #[error("upstream websocket failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid upstream url: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid header value: {0}")]
    Header(#[from] axum::http::header::InvalidHeaderValue),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error!(error = %self, "proxy error");
        (StatusCode::BAD_GATEWAY, "Bad gateway").into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

clawgate_common::impl_context!();
