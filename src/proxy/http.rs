//! Client-side HTTP proxy.
//!
//! Listens on a local port and relays HTTP traffic through the upstream
//! [`Tunneler`]. `CONNECT` requests are answered with `200 Connection
//! established` and the connection becomes an opaque relay. Other
//! requests must carry an absolute URI (proxy form); they are rewritten
//! to origin form, stripped of hop-by-hop headers, and forwarded with
//! `Connection: close` so the response can be streamed back until the
//! origin closes.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::error::{Error, Result};
use crate::proxy::Tunneler;

/// Cap on the size of a request head.
const MAX_REQUEST_HEAD: usize = 16 * 1024;

/// Hop-by-hop headers, removed when forwarding to the origin.
const HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailers",
    "transfer-encoding",
];

/// Local HTTP proxy forwarding through a [`Tunneler`].
pub struct HttpProxy<T: Tunneler> {
    listener: TcpListener,
    tunneler: Arc<T>,
}

impl<T: Tunneler> HttpProxy<T> {
    /// Bind the proxy listener. Pass a `127.0.0.1:port` address; port 0
    /// picks an ephemeral port (see [`local_addr`](Self::local_addr)).
    pub async fn bind(listen_addr: &str, tunneler: Arc<T>) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr).await?;
        tracing::info!("local HTTP proxy running at {}", listener.local_addr()?);
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
                    tracing::debug!("HTTP connection from {}", peer);
                    let tunneler = Arc::clone(&self.tunneler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_http_client(client, tunneler).await {
                            tracing::debug!("HTTP connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::warn!("HTTP accept error: {}", e);
                }
            }
        }
    }
}

/// Relay one HTTP client connection through the tunnel.
async fn handle_http_client<T: Tunneler>(mut client: TcpStream, tunneler: Arc<T>) -> Result<()> {
    let (head, body_prefix) = read_request_head(&mut client).await?;
    let request = match RequestHead::parse(&head) {
        Ok(request) => request,
        Err(e) => {
            client
                .write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n")
                .await?;
            return Err(e);
        }
    };

    if request.method == "CONNECT" {
        let mut remote = match tunneler.dial(&request.uri).await {
            Ok(remote) => remote,
            Err(e) => {
                client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await?;
                return Err(Error::proxy(format!("dial {} failed: {}", request.uri, e)));
            }
        };
        client
            .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
            .await?;
        if !body_prefix.is_empty() {
            remote.write_all(&body_prefix).await?;
        }
        let _ = tokio::io::copy_bidirectional(&mut client, &mut remote).await;
        return Ok(());
    }

    // Proxy-form request: rewrite to origin form and forward
    let (target, origin_head) = match request.to_origin_form() {
        Ok(rewritten) => rewritten,
        Err(e) => {
            client
                .write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n")
                .await?;
            return Err(e);
        }
    };

    let mut remote = match tunneler.dial(&target).await {
        Ok(remote) => remote,
        Err(e) => {
            client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await?;
            return Err(Error::proxy(format!("dial {} failed: {}", target, e)));
        }
    };

    remote.write_all(origin_head.as_bytes()).await?;
    if !body_prefix.is_empty() {
        remote.write_all(&body_prefix).await?;
    }
    let _ = tokio::io::copy_bidirectional(&mut client, &mut remote).await;
    Ok(())
}

/// Read bytes until the end of the request head. Returns the head text
/// and any body bytes that arrived with it.
async fn read_request_head(client: &mut TcpStream) -> Result<(String, Vec<u8>)> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = client.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::proxy("connection closed before request head"));
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = find_head_end(&buf) {
            let head = String::from_utf8(buf[..end].to_vec())
                .map_err(|_| Error::proxy("request head is not valid UTF-8"))?;
            return Ok((head, buf[end..].to_vec()));
        }
        if buf.len() > MAX_REQUEST_HEAD {
            return Err(Error::proxy("request head too large"));
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// A parsed request head: request line plus raw header lines.
struct RequestHead {
    method: String,
    uri: String,
    version: String,
    headers: Vec<String>,
}

impl RequestHead {
    fn parse(head: &str) -> Result<Self> {
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or("");
        let mut parts = request_line.split_whitespace();
        let (method, uri, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(method), Some(uri), Some(version)) => (method, uri, version),
            _ => return Err(Error::proxy("malformed request line")),
        };

        Ok(Self {
            method: method.to_string(),
            uri: uri.to_string(),
            version: version.to_string(),
            headers: lines
                .filter(|line| !line.is_empty())
                .map(|line| line.to_string())
                .collect(),
        })
    }

    /// Rewrite a proxy-form request to origin form. Returns the dial
    /// target and the rewritten head, hop-by-hop headers stripped and
    /// `Connection: close` forced.
    fn to_origin_form(&self) -> Result<(String, String)> {
        let rest = self
            .uri
            .strip_prefix("http://")
            .ok_or_else(|| Error::proxy("request URI is not absolute"))?;

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(Error::proxy("request URI has no host"));
        }
        let target = if authority.contains(':') {
            authority.to_string()
        } else {
            format!("{}:80", authority)
        };

        let mut head = format!("{} {} {}\r\n", self.method, path, self.version);
        for line in &self.headers {
            let name = line.split(':').next().unwrap_or("").trim().to_ascii_lowercase();
            if HOP_HEADERS.contains(&name.as_str()) {
                continue;
            }
            head.push_str(line);
            head.push_str("\r\n");
        }
        head.push_str("Connection: close\r\n\r\n");

        Ok((target, head))
    }
}
