//! ---
//! fleet_section: "04-networking-external-interfaces"
//! fleet_subsection: "module"
//! fleet_type: "source"
//! fleet_scope: "code"
//! fleet_description: "Websocket transport of the control channel."
//! fleet_version: "v0.0.0-prealpha"
//! fleet_owner: "tbd"
//! ---
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::dispatch::{dispatch, ControlHandler};
use crate::error::ControlError;
use crate::protocol::ControlRequest;
use crate::tls::loopback_client_config;

const LOOPBACK: &str = "127.0.0.1";

#[derive(Debug, Clone)]
pub struct ControlChannelConfig {
    pub path: String,
    /// Upper bound on waiting for the peer to acknowledge our close frame.
    pub close_timeout: Duration,
}

impl Default for ControlChannelConfig {
    fn default() -> Self {
        Self {
            path: "/launcher".to_owned(),
            close_timeout: Duration::from_millis(1000),
        }
    }
}

/// `wss://127.0.0.1:<port><path>`.
pub fn control_url(port: u16, path: &str) -> Result<Url, ControlError> {
    let raw = format!("wss://{}:{}{}", LOOPBACK, port, path);
    Url::parse(&raw).map_err(|err| ControlError::Url(format!("{}: {}", raw, err)))
}

/// Open the websocket. `wss` uses the relaxed loopback TLS configuration.
pub async fn connect(url: &Url) -> Result<WebSocketStream<MaybeTlsStream<TcpStream>>, ControlError> {
    let connector = match url.scheme() {
        "wss" => Some(Connector::Rustls(loopback_client_config())),
        "ws" => None,
        other => return Err(ControlError::Url(format!("unsupported scheme {}", other))),
    };
    let (socket, response) =
        tokio_tungstenite::connect_async_tls_with_config(url.as_str(), None, false, connector)
            .await?;
    debug!(url = %url, status = %response.status(), "control channel connected");
    Ok(socket)
}

/// Serve requests on `socket` until the peer goes away or `cancel` fires.
///
/// Requests are handled one at a time in arrival order and each yields exactly
/// one response. Frames that are not requests are logged and skipped. Transport
/// errors end the session without surfacing an error.
pub async fn serve<S>(
    mut socket: WebSocketStream<S>,
    handler: Arc<dyn ControlHandler>,
    cancel: CancellationToken,
    close_timeout: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    'serve: loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                close(&mut socket, close_timeout).await;
                break 'serve;
            }
            frame = socket.next() => {
                let text = match frame {
                    None => {
                        debug!("control channel closed by peer");
                        break 'serve;
                    }
                    Some(Err(err)) => {
                        debug!(error = %err, "control channel read failed");
                        break 'serve;
                    }
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(frame))) => {
                        debug!(frame = ?frame, "control channel close received");
                        break 'serve;
                    }
                    Some(Ok(Message::Binary(_))) | Some(Ok(Message::Frame(_))) => {
                        warn!("ignoring non-text control frame");
                        continue;
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                };

                let request: ControlRequest = match serde_json::from_str(&text) {
                    Ok(request) => request,
                    Err(err) => {
                        warn!(error = %err, frame = %text, "skipping malformed control frame");
                        continue;
                    }
                };

                let response = tokio::select! {
                    response = dispatch(handler.as_ref(), request) => response,
                    _ = cancel.cancelled() => {
                        close(&mut socket, close_timeout).await;
                        break 'serve;
                    }
                };

                let payload = match serde_json::to_string(&response) {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(id = response.id, error = %err, "failed to encode control response");
                        continue;
                    }
                };
                if let Err(err) = socket.send(Message::Text(payload)).await {
                    debug!(id = response.id, error = %err, "control channel write failed");
                    break 'serve;
                }
            }
        }
    }
}

async fn close<S>(socket: &mut WebSocketStream<S>, close_timeout: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    };
    if let Err(err) = socket.close(Some(frame)).await {
        debug!(error = %err, "failed to send close frame");
        return;
    }
    let acknowledged = tokio::time::timeout(close_timeout, async {
        while let Some(Ok(message)) = socket.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await;
    if acknowledged.is_err() {
        debug!(timeout = ?close_timeout, "peer did not acknowledge close in time");
    }
}

/// Connect to `url` and serve until interrupted or the peer leaves. Connection
/// failures are returned; once attached the session always ends with `Ok`.
pub async fn attach(
    url: Url,
    handler: Arc<dyn ControlHandler>,
    cancel: CancellationToken,
    config: ControlChannelConfig,
) -> Result<(), ControlError> {
    let socket = tokio::select! {
        socket = connect(&url) => socket?,
        _ = cancel.cancelled() => return Err(ControlError::Interrupted),
    };
    info!(url = %url, "attached to proxy control channel");
    serve(socket, handler, cancel, config.close_timeout).await;
    info!(url = %url, "control channel detached");
    Ok(())
}
