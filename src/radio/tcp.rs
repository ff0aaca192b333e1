//! Plain HTTP/1.1-over-TCP bench transport.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info};

use super::{HttpRequest, HttpResponse, Radio, TransportError};

/// Host-side stand-in for the WiFi co-processor. A host NIC has no access
/// point to associate with, so `join` just marks the link up; requests are
/// written as HTTP/1.1 with `Connection: close` and the response is read
/// to EOF.
///
/// TODO: terminate TLS here (rustls) so the bench radio can reach https
/// endpoints directly instead of needing a plain-HTTP port or local proxy.
pub struct TcpRadio {
    associated: bool,
}

impl TcpRadio {
    pub fn new() -> Self {
        Self { associated: false }
    }
}

impl Default for TcpRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl Radio for TcpRadio {
    fn is_connected(&self) -> bool {
        self.associated
    }

    async fn join(&mut self, ssid: &str, _password: &str) -> Result<(), TransportError> {
        if ssid.is_empty() {
            return Err(TransportError::Join("SSID is empty".into()));
        }
        debug!("Bringing link up (ssid={})", ssid);
        self.associated = true;
        Ok(())
    }

    async fn reset(&mut self) {
        info!("Radio reset");
        self.associated = false;
    }

    async fn send(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError> {
        if !self.associated {
            return Err(TransportError::NotAssociated);
        }
        let (host, port, path) = split_url(request.url)?;

        let mut stream = TcpStream::connect((host.as_str(), port)).await?;
        let wire = format_request(request, &host, &path);
        stream.write_all(wire.as_bytes()).await?;

        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await?;

        parse_response(&raw)
    }
}

fn format_request(request: &HttpRequest<'_>, host: &str, path: &str) -> String {
    let mut wire = format!(
        "{} {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n",
        request.method.as_str(),
        path,
        host,
    );
    for (name, value) in request.headers {
        wire.push_str(name);
        wire.push_str(": ");
        wire.push_str(value);
        wire.push_str("\r\n");
    }
    if let Some(body) = request.body {
        wire.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    wire.push_str("\r\n");
    if let Some(body) = request.body {
        wire.push_str(body);
    }
    wire
}

/// `http(s)://host[:port]/path?query` into (host, port, path-with-query).
fn split_url(url: &str) -> Result<(String, u16, String), TransportError> {
    let (default_port, rest) = if let Some(rest) = url.strip_prefix("https://") {
        (443, rest)
    } else if let Some(rest) = url.strip_prefix("http://") {
        (80, rest)
    } else {
        return Err(TransportError::BadUrl(url.to_string()));
    };

    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i..]),
        None => (rest, "/"),
    };
    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| TransportError::BadUrl(url.to_string()))?;
            (host, port)
        }
        None => (authority, default_port),
    };
    if host.is_empty() {
        return Err(TransportError::BadUrl(url.to_string()));
    }
    Ok((host.to_string(), port, path.to_string()))
}

/// Parse the status line and split the header block from the body. With
/// `Connection: close` the body is everything after the first blank line.
fn parse_response(raw: &[u8]) -> Result<HttpResponse, TransportError> {
    let text = String::from_utf8_lossy(raw);
    let (head, body) = match text.split_once("\r\n\r\n") {
        Some((head, body)) => (head, body.to_string()),
        None => (text.as_ref(), String::new()),
    };
    let status_line = head.lines().next().ok_or(TransportError::MalformedResponse)?;
    if !status_line.starts_with("HTTP/1.") {
        return Err(TransportError::MalformedResponse);
    }
    let status = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or(TransportError::MalformedResponse)?;
    Ok(HttpResponse { status, body })
}
