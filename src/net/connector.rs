//! Transport factories.

use std::io;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::net::endpoint::Endpoint;

/// Byte stream a connection runs HTTP/2 over.
pub trait AsyncIo: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncIo for T {}

pub type BoxedIo = Box<dyn AsyncIo>;

/// Opens transports for a connection.
///
/// Called once per connect attempt. The returned future must not borrow
/// from `self` or `endpoint`.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, io::Result<BoxedIo>>;
}

async fn dial(host: &str, port: u16) -> io::Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// TCP + TLS with ALPN `h2`.
#[derive(Clone)]
pub struct TlsConnector {
    config: Arc<rustls::ClientConfig>,
}

impl TlsConnector {
    pub fn new(config: Arc<rustls::ClientConfig>) -> Self {
        Self { config }
    }
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("alpn", &self.config.alpn_protocols)
            .finish()
    }
}

impl Connector for TlsConnector {
    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, io::Result<BoxedIo>> {
        let connector = tokio_rustls::TlsConnector::from(Arc::clone(&self.config));
        let host = endpoint.host().to_owned();
        let port = endpoint.port();
        Box::pin(async move {
            let server_name = rustls::pki_types::ServerName::try_from(host.clone())
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
            let tcp = dial(&host, port).await?;
            let tls = connector.connect(server_name, tcp).await?;
            let (_, session) = tls.get_ref();
            if session.alpn_protocol() != Some(&b"h2"[..]) {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("{host} did not negotiate h2 via ALPN"),
                ));
            }
            tracing::debug!(host = %host, port, "TLS session established");
            Ok(Box::new(tls) as BoxedIo)
        })
    }
}

/// Cleartext TCP with prior-knowledge HTTP/2.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainConnector;

impl Connector for PlainConnector {
    fn connect(&self, endpoint: &Endpoint) -> BoxFuture<'static, io::Result<BoxedIo>> {
        let host = endpoint.host().to_owned();
        let port = endpoint.port();
        Box::pin(async move {
            let tcp = dial(&host, port).await?;
            Ok(Box::new(tcp) as BoxedIo)
        })
    }
}
