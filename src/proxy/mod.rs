//! Local loopback proxies.
//!
//! The client exposes user traffic entry points as two proxies bound to
//! the loopback interface: a SOCKS5 proxy and an HTTP proxy. Each accepted
//! connection is forwarded through the upstream transport via the
//! [`Tunneler`] seam; the proxies know nothing about how the tunnel is
//! established or encrypted.

mod http;
mod socks;

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

pub use http::HttpProxy;
pub use socks::SocksProxy;

/// Dialer for upstream connections.
///
/// Implemented by the tunnel layer; each call establishes one forwarded
/// connection to `remote_addr` (a `host:port` string) through the
/// upstream transport.
pub trait Tunneler: Send + Sync + 'static {
    /// The forwarded connection type.
    type Conn: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open a forwarded connection to the remote address.
    fn dial(&self, remote_addr: &str) -> impl Future<Output = io::Result<Self::Conn>> + Send;
}

/// A [`Tunneler`] that dials targets directly over TCP, without any
/// tunnel. Useful for diagnostics and tests.
pub struct DirectTunneler;

impl Tunneler for DirectTunneler {
    type Conn = TcpStream;

    async fn dial(&self, remote_addr: &str) -> io::Result<TcpStream> {
        TcpStream::connect(remote_addr).await
    }
}
