//! Transport error taxonomy with structured failure classification

use thiserror::Error;

use crate::transport::CLOSE_ABNORMAL;

#[derive(Error, Debug)]
pub enum TransportError {
    /// The remote host or service cannot be reached at all.
    #[error("host unreachable: {0}")]
    Unreachable(String),
    #[error("request timed out")]
    Timeout,
    /// The server answered with a non-success HTTP status.
    #[error("server returned HTTP {status}")]
    Http { status: u16 },
    /// The credential was rejected by the server.
    #[error("credential rejected by server")]
    Unauthorized,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("stream closed with code {code}: {reason}")]
    StreamClosed { code: u16, reason: String },
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl TransportError {
    /// Whether this failure indicates the remote host is unreachable,
    /// as opposed to an application-level error from a reachable server.
    /// An abnormal closure (1006) arrives without a server close frame
    /// and is classified with the network failures.
    pub fn is_network_class(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout => true,
            Self::StreamClosed { code, .. } => *code == CLOSE_ABNORMAL,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Unreachable(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
            }
        } else {
            Self::Protocol(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        match err {
            WsError::Io(io) => Self::Unreachable(io.to_string()),
            WsError::ConnectionClosed | WsError::AlreadyClosed => Self::StreamClosed {
                code: CLOSE_ABNORMAL,
                reason: "connection closed".to_string(),
            },
            WsError::Http(response) => Self::Http {
                status: response.status().as_u16(),
            },
            other => Self::Protocol(other.to_string()),
        }
    }
}
