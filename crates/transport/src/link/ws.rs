// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket gateway connector

use async_trait::async_trait;
use bytes::Bytes;
use fh_core::Credentials;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::{Connector, Link, LinkError, LinkEvent};

/// Gateway address and the client identity presented to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server_url: String,
    pub os: String,
    pub client_version: String,
    pub user_agent: String,
    pub origin: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server_url: "wss://gate-obt.nqf.qq.com/prod/ws".to_string(),
            os: "iOS".to_string(),
            client_version: "1.6.0.14_20251224".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) MicroMessenger/7.0.20"
                .to_string(),
            origin: "https://gate-obt.nqf.qq.com".to_string(),
        }
    }
}

impl GatewayConfig {
    pub fn url_for(&self, credentials: &Credentials) -> String {
        format!(
            "{}?platform={}&os={}&ver={}&code={}&openID={}",
            self.server_url,
            credentials.platform,
            self.os,
            self.client_version,
            credentials.code,
            credentials.open_id.as_deref().unwrap_or(""),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    config: GatewayConfig,
}

impl WsConnector {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, credentials: &Credentials) -> Result<Link, LinkError> {
        let mut request = self
            .config
            .url_for(credentials)
            .into_client_request()
            .map_err(|e| LinkError::Connect(e.to_string()))?;
        let headers = request.headers_mut();
        headers.insert(header::USER_AGENT, header_value(&self.config.user_agent)?);
        headers.insert(header::ORIGIN, header_value(&self.config.origin)?);

        let (ws, _) = connect_async(request).await.map_err(connect_error)?;
        let (sink, stream) = ws.split();
        Ok(pump(sink, stream))
    }
}

/// Bridge a WebSocket's halves to a [`Link`].
///
/// The reader stops once the link's outbound side is dropped, so a
/// replaced connection to a silent peer does not linger.
fn pump<S, R>(mut sink: S, mut stream: R) -> Link
where
    S: Sink<Message, Error = WsError> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Bytes>();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    let reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            let event = match message {
                Ok(Message::Binary(bytes)) => LinkEvent::Frame(bytes),
                Ok(Message::Close(frame)) => LinkEvent::Closed {
                    code: frame.as_ref().map(|f| u16::from(f.code)),
                    reason: frame.map(|f| f.reason.to_string()).unwrap_or_default(),
                },
                Ok(_) => continue,
                Err(e) => LinkEvent::Failed {
                    message: e.to_string(),
                },
            };
            let terminal = !matches!(event, LinkEvent::Frame(_));
            if in_tx.send(event).is_err() || terminal {
                return;
            }
        }
        let _ = in_tx.send(LinkEvent::Closed {
            code: None,
            reason: "stream ended".to_string(),
        });
    });

    tokio::spawn(async move {
        while let Some(bytes) = out_rx.recv().await {
            if sink.send(Message::Binary(bytes)).await.is_err() {
                break;
            }
        }
        reader.abort();
        let _ = sink.close().await;
    });

    Link {
        outbound: out_tx,
        inbound: in_rx,
    }
}

fn header_value(value: &str) -> Result<HeaderValue, LinkError> {
    HeaderValue::from_str(value).map_err(|e| LinkError::Connect(e.to_string()))
}

fn connect_error(error: WsError) -> LinkError {
    match error {
        WsError::Http(response) => LinkError::Rejected {
            status: response.status().as_u16(),
            message: response
                .status()
                .canonical_reason()
                .unwrap_or_default()
                .to_string(),
        },
        other => LinkError::Connect(other.to_string()),
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
