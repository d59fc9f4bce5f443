//! Connection seams of the real-time provider and their network implementations.

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::MarketDataError;

/// Opens connections to the feed.
pub trait Transport: Send + Sync {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Connection>, MarketDataError>>;
}

/// One open, text-framed duplex connection.
pub trait Connection: Send {
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<(), MarketDataError>>;

    /// Next inbound text frame; `None` once the peer closed the connection.
    fn recv(&mut self) -> BoxFuture<'_, Option<Result<String, MarketDataError>>>;

    fn close(&mut self) -> BoxFuture<'_, ()>;
}

/// Acquires the token sent in the subscribe message.
pub trait TokenSource: Send + Sync {
    fn acquire(&self) -> BoxFuture<'_, Result<String, MarketDataError>>;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn Connection>, MarketDataError>> {
        Box::pin(async move {
            let (stream, _response) = tokio_tungstenite::connect_async(self.url.as_str())
                .await
                .map_err(|error| {
                    MarketDataError::Transport(format!("connect to {} failed: {error}", self.url))
                })?;
            Ok(Box::new(WebSocketConnection { stream }) as Box<dyn Connection>)
        })
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl Connection for WebSocketConnection {
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<(), MarketDataError>> {
        Box::pin(async move {
            self.stream
                .send(Message::Text(text))
                .await
                .map_err(|error| MarketDataError::Transport(format!("send failed: {error}")))
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, Option<Result<String, MarketDataError>>> {
        Box::pin(async move {
            loop {
                let frame = match self.stream.next().await? {
                    Ok(frame) => frame,
                    Err(error) => {
                        return Some(Err(MarketDataError::Transport(format!(
                            "receive failed: {error}"
                        ))))
                    }
                };
                match frame {
                    Message::Text(text) => return Some(Ok(text)),
                    Message::Binary(bytes) => {
                        return Some(String::from_utf8(bytes).map_err(|_| {
                            MarketDataError::Parse(String::from("binary frame is not UTF-8"))
                        }))
                    }
                    Message::Close(_) => return None,
                    Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Err(error) = self.stream.close(None).await {
                tracing::debug!(%error, "websocket close failed");
            }
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

/// Fetches a short-lived feed token over HTTP.
///
/// Sends `POST <token_url>` with the API key as a bearer credential and expects
/// `{"token": "..."}` back.
#[derive(Debug, Clone)]
pub struct HttpTokenSource {
    client: reqwest::Client,
    token_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpTokenSource {
    pub fn new(token_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
            api_key,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl TokenSource for HttpTokenSource {
    fn acquire(&self) -> BoxFuture<'_, Result<String, MarketDataError>> {
        Box::pin(async move {
            let mut request = self.client.post(&self.token_url).timeout(self.timeout);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            let response = request
                .send()
                .await
                .map_err(|error| {
                    MarketDataError::Authentication(format!("token request failed: {error}"))
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(MarketDataError::Authentication(format!(
                    "token endpoint returned HTTP {}",
                    status.as_u16()
                )));
            }

            let body: TokenResponse = response.json().await.map_err(|error| {
                MarketDataError::Authentication(format!("token response is malformed: {error}"))
            })?;

            if body.token.trim().is_empty() {
                return Err(MarketDataError::Authentication(String::from(
                    "token endpoint returned an empty token",
                )));
            }
            Ok(body.token)
        })
    }
}
