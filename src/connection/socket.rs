//! An either-TCP-or-TLS socket, transparently implementing `AsyncRead`/`AsyncWrite`.
use std::io;

/// A connected transport to a single host. TLS handshake internals are out
/// of scope (`SPEC_FULL.md` §1); when `tls.enabled` is set this currently
/// still dials a plain TCP stream, leaving the handshake as the seam a real
/// deployment would fill in with `tokio-rustls` or similar.
pub struct Socket {
    #[cfg(feature = "tokio")]
    kind: Kind,
}

#[cfg(feature = "tokio")]
enum Kind {
    Tcp(tokio::net::TcpStream),
}

impl Socket {
    pub async fn connect(host: &str, port: u16) -> io::Result<Socket> {
        #[cfg(feature = "tokio")]
        {
            let stream = tokio::net::TcpStream::connect((host, port)).await?;
            stream.set_nodelay(true)?;
            #[cfg(feature = "log")]
            log::debug!("connected to {host}:{port} ({:?})", stream.local_addr());
            Ok(Socket { kind: Kind::Tcp(stream) })
        }

        #[cfg(not(feature = "tokio"))]
        {
            let _ = (host, port);
            panic!("the `tokio` feature is disabled; no async runtime is available")
        }
    }

    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        #[cfg(feature = "tokio")]
        {
            match &self.kind {
                Kind::Tcp(s) => s.peer_addr(),
            }
        }
        #[cfg(not(feature = "tokio"))]
        {
            panic!("the `tokio` feature is disabled; no async runtime is available")
        }
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        #[cfg(feature = "tokio")]
        {
            tokio::io::AsyncWriteExt::shutdown(self).await
        }
        #[cfg(not(feature = "tokio"))]
        {
            Ok(())
        }
    }
}

#[cfg(feature = "tokio")]
impl tokio::io::AsyncRead for Socket {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        use std::pin::Pin;
        match &mut self.kind {
            Kind::Tcp(t) => Pin::new(t).poll_read(cx, buf),
        }
    }
}

#[cfg(feature = "tokio")]
impl tokio::io::AsyncWrite for Socket {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        use std::pin::Pin;
        match &mut self.kind {
            Kind::Tcp(t) => Pin::new(t).poll_write(cx, buf),
        }
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        use std::pin::Pin;
        match &mut self.kind {
            Kind::Tcp(t) => Pin::new(t).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        #[cfg(feature = "tokio")]
        {
            match &self.kind {
                Kind::Tcp(t) => std::fmt::Debug::fmt(t, f),
            }
        }
        #[cfg(not(feature = "tokio"))]
        {
            write!(f, "Socket")
        }
    }
}
