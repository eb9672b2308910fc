use crate::backoff::Backoff;
use crate::config::ListenArgs;
use crate::error::ListenError;
use futures_util::{Stream, StreamExt};
use herald_common::Message;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::{header, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

/// Client side of one broadcaster subscription.
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Build the upgrade request, attaching `Origin` when one is given.
///
/// # Errors
///
/// Returns [`ListenError::InvalidUrl`] or [`ListenError::InvalidOrigin`].
pub fn build_request(url: &str, origin: Option<&str>) -> Result<Request, ListenError> {
    let mut req = url
        .into_client_request()
        .map_err(|e| ListenError::InvalidUrl(e.to_string()))?;
    if let Some(origin) = origin {
        let value =
            HeaderValue::from_str(origin).map_err(|e| ListenError::InvalidOrigin(e.to_string()))?;
        req.headers_mut().insert(header::ORIGIN, value);
    }
    Ok(req)
}

/// Open a subscription.
///
/// # Errors
///
/// A non-101 answer becomes [`ListenError::Rejected`] carrying the status.
pub async fn connect(url: &str, origin: Option<&str>) -> Result<WsStream, ListenError> {
    let req = build_request(url, origin)?;
    match tokio_tungstenite::connect_async(req).await {
        Ok((ws, _)) => Ok(ws),
        Err(tungstenite::Error::Http(resp)) => Err(ListenError::Rejected(resp.status().as_u16())),
        Err(tungstenite::Error::Url(e)) => Err(ListenError::InvalidUrl(e.to_string())),
        Err(e) => Err(e.into()),
    }
}

/// Print the content of every broadcast on `ws_rx` to `out`, one per line.
///
/// Returns the number of messages printed once the server closes the
/// connection. Frames that do not decode as a message are logged and skipped.
///
/// # Errors
///
/// Returns the first read error or output write error.
pub async fn relay<S, W>(mut ws_rx: S, out: &mut W) -> Result<u64, ListenError>
where
    S: Stream<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut printed = 0u64;
    while let Some(frame) = ws_rx.next().await {
        match frame? {
            WsMessage::Text(text) => match Message::decode(&text) {
                Ok(msg) => {
                    out.write_all(msg.content.as_bytes()).await?;
                    out.write_all(b"\n").await?;
                    out.flush().await?;
                    printed += 1;
                }
                Err(e) => warn!(error = %e, "skipping undecodable frame"),
            },
            WsMessage::Close(frame) => {
                debug!(?frame, "server closed the subscription");
                break;
            }
            WsMessage::Binary(data) => debug!(len = data.len(), "ignoring binary frame"),
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {}
        }
    }
    Ok(printed)
}

async fn session<W>(args: &ListenArgs, out: &mut W, backoff: &mut Backoff) -> Result<u64, ListenError>
where
    W: AsyncWrite + Unpin,
{
    let mut ws = connect(&args.url, args.origin.as_deref()).await?;
    backoff.reset();
    info!(url = %args.url, "subscribed");
    let result = relay(&mut ws, out).await;
    let _ = ws.close(None).await;
    result
}

/// Subscribe and keep printing messages, reconnecting with backoff.
///
/// With `args.once` the first session's outcome is returned directly.
///
/// # Errors
///
/// Returns fatal errors (see [`ListenError::is_fatal`]) immediately.
pub async fn run<W>(args: &ListenArgs, out: &mut W) -> Result<(), ListenError>
where
    W: AsyncWrite + Unpin,
{
    build_request(&args.url, args.origin.as_deref())?;

    let mut backoff = Backoff::new(
        args.reconnect_initial(),
        args.reconnect_max(),
        args.reconnect_factor,
    );

    loop {
        match session(args, out, &mut backoff).await {
            Ok(received) => info!(received, "subscription ended"),
            Err(e) if args.once || e.is_fatal() => return Err(e),
            Err(e) => warn!(error = %e, "subscription lost"),
        }
        if args.once {
            return Ok(());
        }

        let delay = backoff.next_delay();
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnecting"
        );
        tokio::time::sleep(delay).await;
    }
}
