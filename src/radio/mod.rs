pub mod tcp;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// One HTTP request handed to the radio. Connection setup and TLS are the
/// radio's job: the ESP co-processor terminates TLS in firmware, so the
/// orchestration layer only ever sees URLs and buffered responses.
pub struct HttpRequest<'a> {
    pub method: Method,
    pub url: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub body: Option<&'a str>,
}

/// A fully buffered response. The transport has already closed the
/// connection when this is returned; dropping it releases the buffer.
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Failures at the radio/HTTP transport layer. Distinct from a non-2xx
/// HTTP status, which is a received response and ends any retry loop.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not join access point: {0}")]
    Join(String),

    #[error("radio is not associated")]
    NotAssociated,

    #[error("unsupported or malformed URL: {0}")]
    BadUrl(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed HTTP response")]
    MalformedResponse,
}

/// WiFi co-processor boundary. Association state lives behind this trait;
/// `reset` is the hard radio reset the POST retry loop uses between
/// attempts.
pub trait Radio {
    fn is_connected(&self) -> bool;

    async fn join(&mut self, ssid: &str, password: &str) -> Result<(), TransportError>;

    async fn reset(&mut self);

    async fn send(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError>;
}
