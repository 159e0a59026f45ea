//! WebSocket stream transport for live bot updates

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::config::Endpoints;
use crate::errors::TransportError;
use crate::transport::{StreamConnection, StreamFrame, StreamTransport, CLOSE_ABNORMAL};

pub struct WsStreamTransport {
    endpoints: Endpoints,
}

impl WsStreamTransport {
    pub fn new(endpoints: Endpoints) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl StreamTransport for WsStreamTransport {
    async fn connect(
        &self,
        entity_id: &str,
        token: &str,
        interval_hint: Duration,
    ) -> Result<Box<dyn StreamConnection>, TransportError> {
        let url = self
            .endpoints
            .stream_url(entity_id, token, interval_hint)?;
        debug!(bot_id = %entity_id, "Connecting update stream");

        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(TransportError::from)?;
        debug!(bot_id = %entity_id, status = ?response.status(), "Update stream connected");

        Ok(Box::new(WsConnection { inner: stream }))
    }
}

struct WsConnection {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl StreamConnection for WsConnection {
    async fn next_frame(&mut self) -> Option<Result<StreamFrame, TransportError>> {
        loop {
            let message = self.inner.next().await?;
            let frame = match message {
                Ok(Message::Text(text)) => Ok(StreamFrame::Text(text.to_string())),
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Ok(StreamFrame::KeepAlive),
                Ok(Message::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((CLOSE_ABNORMAL, String::new()));
                    Ok(StreamFrame::Closed { code, reason })
                }
                // binary and raw frames are not part of the update protocol
                Ok(Message::Binary(_)) | Ok(Message::Frame(_)) => continue,
                Err(e) => Err(TransportError::from(e)),
            };
            return Some(frame);
        }
    }

    async fn close(&mut self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        };
        if let Err(e) = self.inner.send(Message::Close(Some(frame))).await {
            debug!("Close frame send failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CLOSE_NORMAL;

    async fn local_server<F, Fut>(handler: F) -> std::net::SocketAddr
    where
        F: FnOnce(WebSocketStream<TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (socket, _) = listener.accept().await.expect("accept");
            let ws = tokio_tungstenite::accept_async(socket)
                .await
                .expect("handshake");
            handler(ws).await;
        });
        addr
    }

    #[tokio::test]
    async fn test_text_and_close_frames() {
        let addr = local_server(|mut ws| async move {
            ws.send(Message::Text(
                r#"{"type":"status","bot_id":"mom-7","state":"running"}"#.into(),
            ))
            .await
            .expect("send text");
            ws.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "done".into(),
            })))
            .await
            .expect("send close");
        })
        .await;

        let endpoints =
            Endpoints::new("http://unused.invalid", &format!("ws://{addr}")).expect("valid");
        let transport = WsStreamTransport::new(endpoints);
        let mut connection = transport
            .connect("mom-7", "tok-1", Duration::from_secs(2))
            .await
            .expect("connect");

        match connection.next_frame().await {
            Some(Ok(StreamFrame::Text(text))) => assert!(text.contains("\"status\"")),
            other => panic!("expected text frame, got {other:?}"),
        }
        match connection.next_frame().await {
            Some(Ok(StreamFrame::Closed { code, .. })) => assert_eq!(code, CLOSE_NORMAL),
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_refused_is_network_class() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let endpoints =
            Endpoints::new("http://unused.invalid", &format!("ws://{addr}")).expect("valid");
        let transport = WsStreamTransport::new(endpoints);
        let error = transport
            .connect("mom-7", "tok-1", Duration::from_secs(2))
            .await
            .err()
            .expect("dead port must fail");
        assert!(error.is_network_class());
    }
}
