//! HTTP/2 over a WebSocket.
//!
//! Every write becomes one binary message and incoming binary messages are
//! read back as a byte stream. A normal or going-away close reads as EOF;
//! any other close code, or a text message, is an error.
use std::{
    io,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
    time::Duration,
};

use futures_util::{Sink, Stream};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::TcpStream,
    time::timeout,
};
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        http::{
            HeaderValue,
            header::{AUTHORIZATION, SEC_WEBSOCKET_PROTOCOL, USER_AGENT},
        },
        protocol::{CloseFrame, WebSocketConfig, frame::coding::CloseCode},
    },
};
use tracing::debug;

/// Subprotocol both ends use to recognise a tunnel.
pub const TUNNEL_SUBPROTOCOL: &str = "ws-tunnel";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens tunnels to one WebSocket URL.
#[derive(Clone)]
pub struct WsDialer {
    url: String,
    authorization: HeaderValue,
    user_agent: HeaderValue,
    tls: Option<Arc<rustls::ClientConfig>>,
    max_message_size: usize,
}

impl WsDialer {
    /// Validate the headers for `url` once; each [`WsDialer::dial`] reuses them.
    pub fn new(
        url: impl Into<String>,
        token: &str,
        user_agent: &str,
        tls: Option<Arc<rustls::ClientConfig>>,
        max_message_size: usize,
    ) -> io::Result<Self> {
        let invalid = |what: &str| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid {what}"));
        Ok(Self {
            url: url.into(),
            authorization: HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| invalid("token"))?,
            user_agent: HeaderValue::from_str(user_agent).map_err(|_| invalid("user agent"))?,
            tls,
            max_message_size,
        })
    }

    /// Open a tunnel. The handshake is bounded by a fixed timeout.
    pub async fn dial(&self) -> io::Result<WsTunnel<MaybeTlsStream<TcpStream>>> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(io::Error::other)?;
        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, self.authorization.clone());
        headers.insert(USER_AGENT, self.user_agent.clone());
        headers.insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(TUNNEL_SUBPROTOCOL));

        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(self.max_message_size);
        config.max_frame_size = Some(self.max_message_size);

        let connector = match &self.tls {
            Some(tls) => Connector::Rustls(Arc::clone(tls)),
            None => Connector::Plain,
        };

        let handshake = connect_async_tls_with_config(request, Some(config), true, Some(connector));
        let (ws, _) = timeout(HANDSHAKE_TIMEOUT, handshake)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "websocket handshake timed out"))?
            .map_err(io::Error::other)?;

        debug!(url = %self.url, "websocket tunnel established");
        Ok(WsTunnel::new(ws))
    }
}

/// Byte stream view of a [`WebSocketStream`].
pub struct WsTunnel<S> {
    ws: WebSocketStream<S>,
    pending: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl<S> WsTunnel<S> {
    pub fn new(ws: WebSocketStream<S>) -> Self {
        Self {
            ws,
            pending: Vec::new(),
            pos: 0,
            eof: false,
        }
    }
}

impl<S> WsTunnel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn reject_text(&mut self, cx: &mut Context<'_>) {
        let frame = CloseFrame {
            code: CloseCode::Unsupported,
            reason: "expected binary message".into(),
        };
        let mut ws = Pin::new(&mut self.ws);
        if let Poll::Ready(Ok(())) = ws.as_mut().poll_ready(cx) {
            if ws.as_mut().start_send(Message::Close(Some(frame))).is_ok() {
                let _ = ws.poll_flush(cx);
            }
        }
    }
}

impl<S> AsyncRead for WsTunnel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        loop {
            if this.pos < this.pending.len() {
                let n = buf.remaining().min(this.pending.len() - this.pos);
                buf.put_slice(&this.pending[this.pos..this.pos + n]);
                this.pos += n;
                return Poll::Ready(Ok(()));
            }
            if this.eof {
                return Poll::Ready(Ok(()));
            }

            match ready!(Pin::new(&mut this.ws).poll_next(cx)) {
                Some(Ok(Message::Binary(data))) => {
                    this.pending = data;
                    this.pos = 0;
                }
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    this.eof = true;
                    if let Some(f) = frame {
                        if !matches!(f.code, CloseCode::Normal | CloseCode::Away) {
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::ConnectionAborted,
                                format!("websocket closed with code {}: {}", u16::from(f.code), f.reason),
                            )));
                        }
                    }
                }
                Some(Ok(Message::Text(_))) => {
                    this.eof = true;
                    this.reject_text(cx);
                    return Poll::Ready(Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "unexpected text message on tunnel",
                    )));
                }
                Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed))
                | None => this.eof = true,
                Some(Err(e)) => return Poll::Ready(Err(io::Error::other(e))),
            }
        }
    }
}

impl<S> AsyncWrite for WsTunnel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut ws = Pin::new(&mut self.get_mut().ws);
        ready!(ws.as_mut().poll_ready(cx)).map_err(io::Error::other)?;
        ws.start_send(Message::Binary(buf.to_vec()))
            .map_err(io::Error::other)?;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().ws)
            .poll_flush(cx)
            .map_err(io::Error::other)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match ready!(Pin::new(&mut self.get_mut().ws).poll_close(cx)) {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Poll::Ready(Ok(()))
            }
            Err(e) => Poll::Ready(Err(io::Error::other(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::{SinkExt, StreamExt};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};
    use tokio_tungstenite::{accept_async, client_async};

    async fn pair() -> (WsTunnel<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (client_io, server_io) = duplex(64 * 1024);
        let (client, server) = tokio::join!(
            client_async("ws://tunnel.test/", client_io),
            accept_async(server_io)
        );
        (WsTunnel::new(client.unwrap().0), server.unwrap())
    }

    #[tokio::test]
    async fn binary_messages_read_as_one_stream() {
        let (mut tunnel, mut server) = pair().await;
        server.send(Message::Binary(b"hello ".to_vec())).await.unwrap();
        server.send(Message::Binary(Vec::new())).await.unwrap();
        server.send(Message::Binary(b"world".to_vec())).await.unwrap();
        server.close(None).await.unwrap();

        let mut got = Vec::new();
        tunnel.read_to_end(&mut got).await.unwrap();
        assert_eq!(got, b"hello world");
    }

    #[tokio::test]
    async fn each_write_is_one_binary_message() {
        let (mut tunnel, mut server) = pair().await;
        tunnel.write_all(b"abc").await.unwrap();
        tunnel.flush().await.unwrap();
        tunnel.write_all(b"de").await.unwrap();
        tunnel.flush().await.unwrap();

        assert_eq!(server.next().await.unwrap().unwrap(), Message::Binary(b"abc".to_vec()));
        assert_eq!(server.next().await.unwrap().unwrap(), Message::Binary(b"de".to_vec()));
    }

    #[tokio::test]
    async fn text_message_is_an_error() {
        let (mut tunnel, mut server) = pair().await;
        server.send(Message::Text("nope".into())).await.unwrap();

        let mut buf = [0u8; 16];
        let err = tunnel.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn abnormal_close_is_an_error() {
        let (mut tunnel, mut server) = pair().await;
        server
            .close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: "bye".into(),
            }))
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        let err = tunnel.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
    }

    #[tokio::test]
    async fn going_away_reads_as_eof() {
        let (mut tunnel, mut server) = pair().await;
        server
            .close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "".into(),
            }))
            .await
            .unwrap();

        let mut buf = [0u8; 16];
        assert_eq!(tunnel.read(&mut buf).await.unwrap(), 0);
    }
}
