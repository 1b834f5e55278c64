//! Client-side SOCKS5 proxy.
//!
//! Listens on a local port, accepts SOCKS5 CONNECT requests, and relays
//! each connection through the upstream [`Tunneler`].

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::proxy::Tunneler;

const SOCKS_VERSION: u8 = 0x05;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const REPLY_SUCCESS: u8 = 0x00;
const REPLY_CONNECTION_REFUSED: u8 = 0x05;
const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
const REPLY_ADDRESS_NOT_SUPPORTED: u8 = 0x08;

/// Local SOCKS5 proxy forwarding through a [`Tunneler`].
pub struct SocksProxy<T: Tunneler> {
    listener: TcpListener,
    tunneler: Arc<T>,
}

impl<T: Tunneler> SocksProxy<T> {
    /// Bind the proxy listener. Pass a `127.0.0.1:port` address; port 0
    /// picks an ephemeral port (see [`local_addr`](Self::local_addr)).
    pub async fn bind(listen_addr: &str, tunneler: Arc<T>) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr).await?;
        tracing::info!("local SOCKS proxy running at {}", listener.local_addr()?);
        Ok(Self { listener, tunneler })
    }

    /// The address the proxy is listening on.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the accept loop. Per-connection failures are logged and do not
    /// stop the proxy; stop the proxy by dropping this future.
    pub async fn serve(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((client, peer)) => {
                    tracing::debug!("SOCKS connection from {}", peer);
                    let tunneler = Arc::clone(&self.tunneler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_socks_client(client, tunneler).await {
                            tracing::debug!("SOCKS connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("SOCKS accept error: {}", e);
                }
            }
        }
    }
}

/// Negotiate one SOCKS5 CONNECT and relay traffic through the tunnel.
async fn handle_socks_client<T: Tunneler>(mut client: TcpStream, tunneler: Arc<T>) -> Result<()> {
    // Greeting: version, method count, methods
    let mut header = [0u8; 2];
    client.read_exact(&mut header).await?;
    if header[0] != SOCKS_VERSION {
        return Err(Error::proxy("not SOCKS5"));
    }
    let mut methods = vec![0u8; header[1] as usize];
    client.read_exact(&mut methods).await?;

    // No authentication required
    client.write_all(&[SOCKS_VERSION, 0x00]).await?;

    // Request: version, command, reserved, address type
    let mut request = [0u8; 4];
    client.read_exact(&mut request).await?;
    if request[0] != SOCKS_VERSION {
        return Err(Error::proxy("bad request version"));
    }
    if request[1] != CMD_CONNECT {
        reply(&mut client, REPLY_COMMAND_NOT_SUPPORTED).await?;
        return Err(Error::proxy("only CONNECT is supported"));
    }

    let target = match read_target_addr(&mut client, request[3]).await {
        Ok(target) => target,
        Err(e) => {
            reply(&mut client, REPLY_ADDRESS_NOT_SUPPORTED).await?;
            return Err(e);
        }
    };

    let mut remote = match tunneler.dial(&target).await {
        Ok(remote) => remote,
        Err(e) => {
            reply(&mut client, REPLY_CONNECTION_REFUSED).await?;
            return Err(Error::proxy(format!("dial {} failed: {}", target, e)));
        }
    };

    reply(&mut client, REPLY_SUCCESS).await?;

    let _ = tokio::io::copy_bidirectional(&mut client, &mut remote).await;
    Ok(())
}

/// Read the target address for the given address type and render it as a
/// `host:port` dial string.
async fn read_target_addr(client: &mut TcpStream, atyp: u8) -> Result<String> {
    match atyp {
        ATYP_IPV4 => {
            let mut addr = [0u8; 6];
            client.read_exact(&mut addr).await?;
            let ip = Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]);
            let port = u16::from_be_bytes([addr[4], addr[5]]);
            Ok(format!("{}:{}", ip, port))
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            client.read_exact(&mut len).await?;
            let mut domain_port = vec![0u8; len[0] as usize + 2];
            client.read_exact(&mut domain_port).await?;
            let port_bytes = [domain_port[len[0] as usize], domain_port[len[0] as usize + 1]];
            let domain = String::from_utf8(domain_port[..len[0] as usize].to_vec())
                .map_err(|_| Error::proxy("domain is not valid UTF-8"))?;
            Ok(format!("{}:{}", domain, u16::from_be_bytes(port_bytes)))
        }
        ATYP_IPV6 => {
            let mut addr = [0u8; 18];
            client.read_exact(&mut addr).await?;
            let mut ip = [0u8; 16];
            ip.copy_from_slice(&addr[..16]);
            let port = u16::from_be_bytes([addr[16], addr[17]]);
            Ok(format!("[{}]:{}", Ipv6Addr::from(ip), port))
        }
        _ => Err(Error::proxy("unsupported address type")),
    }
}

/// Send a SOCKS5 reply with a zero bind address.
async fn reply(client: &mut TcpStream, code: u8) -> Result<()> {
    client
        .write_all(&[SOCKS_VERSION, code, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::DirectTunneler;

    /// Echo server that copies every byte back.
    async fn spawn_echo_server() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let (mut conn, _) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(_) => break,
                };
                tokio::spawn(async move {
                    let (mut reader, mut writer) = conn.split();
                    let _ = tokio::io::copy(&mut reader, &mut writer).await;
                });
            }
        });
        addr
    }

    async fn spawn_proxy() -> SocketAddr {
        let proxy = SocksProxy::bind("127.0.0.1:0", Arc::new(DirectTunneler))
            .await
            .unwrap();
        let addr = proxy.local_addr().unwrap();
        tokio::spawn(proxy.serve());
        addr
    }

    async fn socks_handshake(proxy: SocketAddr, request: &[u8]) -> TcpStream {
        let mut client = TcpStream::connect(proxy).await.unwrap();

        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut greeting = [0u8; 2];
        client.read_exact(&mut greeting).await.unwrap();
        assert_eq!(greeting, [0x05, 0x00]);

        client.write_all(request).await.unwrap();
        client
    }

    #[tokio::test]
    async fn test_connect_ipv4() {
        let echo = spawn_echo_server().await;
        let proxy = spawn_proxy().await;

        let mut request = vec![0x05, 0x01, 0x00, 0x01];
        match echo.ip() {
            std::net::IpAddr::V4(ip) => request.extend_from_slice(&ip.octets()),
            _ => unreachable!(),
        }
        request.extend_from_slice(&echo.port().to_be_bytes());

        let mut client = socks_handshake(proxy, &request).await;
        let mut response = [0u8; 10];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response[1], REPLY_SUCCESS);

        client.write_all(b"ping").await.unwrap();
        let mut echoed = [0u8; 4];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"ping");
    }

    #[tokio::test]
    async fn test_connect_domain() {
        let echo = spawn_echo_server().await;
        let proxy = spawn_proxy().await;

        let host = b"localhost";
        let mut request = vec![0x05, 0x01, 0x00, 0x03, host.len() as u8];
        request.extend_from_slice(host);
        request.extend_from_slice(&echo.port().to_be_bytes());

        let mut client = socks_handshake(proxy, &request).await;
        let mut response = [0u8; 10];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response[1], REPLY_SUCCESS);

        client.write_all(b"hello").await.unwrap();
        let mut echoed = [0u8; 5];
        client.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"hello");
    }

    #[tokio::test]
    async fn test_rejects_non_connect_command() {
        let proxy = spawn_proxy().await;

        // BIND (0x02) to 127.0.0.1:1
        let request = [0x05, 0x02, 0x00, 0x01, 127, 0, 0, 1, 0, 1];
        let mut client = socks_handshake(proxy, &request).await;
        let mut response = [0u8; 10];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response[1], REPLY_COMMAND_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn test_refused_target_reports_failure() {
        let proxy = spawn_proxy().await;

        // Port 1 on loopback should refuse the connection
        let request = [0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1, 0, 1];
        let mut client = socks_handshake(proxy, &request).await;
        let mut response = [0u8; 10];
        client.read_exact(&mut response).await.unwrap();
        assert_eq!(response[1], REPLY_CONNECTION_REFUSED);
    }
}
