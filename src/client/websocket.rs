//! WebSocket transport for the push channel subscriber

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        Message,
        client::IntoClientRequest,
        handshake::client::Request,
        http::{HeaderValue, Uri},
    },
};
use tracing::{debug, info};

use super::{Connection, Connector, TransportError};
use crate::util::stream_url;

const USER_AGENT: &str = concat!("energy-tail/", env!("CARGO_PKG_VERSION"));

/// Opens WebSocket connections to the hub's stream endpoint
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    auth_token: Option<String>,
}

impl WebSocketConnector {
    /// `api_url` is the hub's HTTP base URL, e.g. `http://localhost:8080`
    pub fn new(api_url: &str, auth_token: Option<String>) -> Self {
        Self {
            url: stream_url(api_url),
            auth_token,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn header(value: &str) -> Result<HeaderValue, TransportError> {
        value
            .parse()
            .map_err(|e| TransportError::Connect(format!("invalid header value '{value}': {e}")))
    }

    fn request(&self) -> Result<Request, TransportError> {
        let uri: Uri = self
            .url
            .parse()
            .map_err(|e| TransportError::Connect(format!("invalid stream URL {}: {}", self.url, e)))?;

        let host = uri
            .authority()
            .ok_or_else(|| TransportError::Connect(format!("stream URL {} has no host", self.url)))?
            .as_str();
        let origin_scheme = if uri.scheme_str() == Some("wss") {
            "https"
        } else {
            "http"
        };
        let origin = format!("{}://{}", origin_scheme, host);

        // into_client_request keeps the TLS server name derived from the URL
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert("Host", Self::header(host)?);
        headers.insert("Origin", Self::header(&origin)?);
        headers.insert("User-Agent", Self::header(USER_AGENT)?);
        if let Some(token) = &self.auth_token {
            headers.insert("Authorization", Self::header(&format!("Bearer {token}"))?);
        }

        Ok(request)
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let request = self.request()?;
        debug!("opening push channel at {}", self.url);

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {}", self.url, e)))?;

        info!("connected to {}", self.url);
        Ok(Box::new(WebSocketConnection { stream }))
    }
}

pub struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    debug!("server closed the push channel: {:?}", frame);
                    return None;
                }
                // control frames are answered by tungstenite itself
                Ok(_) => continue,
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("error while closing push channel: {}", e);
        }
    }
}
