//! Frequency Prober and Telemetry Transceiver over loopback HTTPS.
//!
//! # Threat model
//!
//! The language server listens on `127.0.0.1` with a self-signed certificate.
//! Requests here only ever target the literal loopback address (no DNS, no
//! proxy), so there is no network path for a third party to intercept.
//! Authenticity comes from possession of the CSRF token taken from the
//! server's own command line, not from certificate trust, so certificate
//! validation is disabled. Any local process able to bind the port could
//! impersonate the server; such a process can already read our token from the
//! process table, so certificate checks would add nothing. Response bodies are
//! still treated as hostile: sizes are capped and every read is time-bounded.

use async_trait::async_trait;
use fuelwatch_core::types::is_valid_token;
use fuelwatch_core::{Result, UplinkError};
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Capability check endpoint.
pub const PROBE_PATH: &str = "/exa.language_server_pb.LanguageServerService/GetUnleashData";
/// Quota status endpoint.
pub const STATUS_PATH: &str = "/exa.language_server_pb.LanguageServerService/GetUserStatus";
/// Header carrying the CSRF token.
pub const CSRF_HEADER: &str = "X-Codeium-Csrf-Token";
/// Connect protocol version header.
pub const PROTOCOL_VERSION_HEADER: &str = "Connect-Protocol-Version";
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(5);
pub const PROBE_BODY_LIMIT: usize = 64 * 1024;
pub const FETCH_BODY_LIMIT: usize = 1024 * 1024;

/// Authenticated requests against a candidate port.
#[async_trait]
pub trait UplinkTransport: Send + Sync {
    /// Whether `port` answers the capability check with `token`.
    async fn probe(&self, port: u16, token: &str) -> bool;

    /// Fetch and parse the quota status document.
    async fn fetch_status(&self, port: u16, token: &str) -> Result<Value>;
}

/// Production [`UplinkTransport`]; see the module docs for the TLS threat model.
#[derive(Debug, Clone)]
pub struct HttpsTransport {
    client: reqwest::Client,
    scheme: &'static str,
}

impl HttpsTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .no_proxy()
            // Fresh connection per request
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| UplinkError::Transport(format!("failed to build client: {}", e)))?;

        Ok(Self {
            client,
            scheme: "https",
        })
    }

    /// Same transport speaking plain HTTP, for loopback test servers.
    #[cfg(test)]
    fn plaintext() -> Self {
        let mut transport = Self::new().unwrap();
        transport.scheme = "http";
        transport
    }

    fn endpoint(&self, port: u16, path: &str) -> String {
        format!("{}://127.0.0.1:{}{}", self.scheme, port, path)
    }

    fn request_body() -> Value {
        json!({
            "metadata": {
                "ideName": "antigravity",
                "extensionName": "antigravity",
                "locale": "en"
            }
        })
    }

    async fn post(&self, port: u16, token: &str, path: &str, limit: usize) -> Result<Vec<u8>> {
        if port == 0 {
            return Err(UplinkError::Transport("refusing to contact port 0".to_string()));
        }
        if !is_valid_token(token) {
            return Err(UplinkError::Transport(
                "refusing to send a malformed token".to_string(),
            ));
        }

        let response = self
            .client
            .post(self.endpoint(port, path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(PROTOCOL_VERSION_HEADER, "1")
            .header(CSRF_HEADER, token)
            .json(&Self::request_body())
            .send()
            .await
            .map_err(describe)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UplinkError::Transport(format!(
                "{} answered {}",
                path, status
            )));
        }

        read_capped(response, limit).await
    }
}

#[async_trait]
impl UplinkTransport for HttpsTransport {
    async fn probe(&self, port: u16, token: &str) -> bool {
        match bounded(PROBE_TIMEOUT, self.post(port, token, PROBE_PATH, PROBE_BODY_LIMIT)).await {
            Ok(_) => true,
            Err(error) => {
                debug!(port, %error, "Probe failed");
                false
            }
        }
    }

    async fn fetch_status(&self, port: u16, token: &str) -> Result<Value> {
        let body = bounded(
            FETCH_TIMEOUT,
            self.post(port, token, STATUS_PATH, FETCH_BODY_LIMIT),
        )
        .await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Deadline over connect, headers and body together.
async fn bounded<T>(limit: Duration, operation: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, operation)
        .await
        .map_err(|_| UplinkError::Transport(format!("timed out after {:?}", limit)))?
}

/// Read the body, aborting once it grows past `limit` bytes.
async fn read_capped(mut response: reqwest::Response, limit: usize) -> Result<Vec<u8>> {
    if let Some(length) = response.content_length() {
        if length > limit as u64 {
            return Err(oversized(limit));
        }
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(describe)? {
        if body.len() + chunk.len() > limit {
            // Dropping the response tears down the connection
            return Err(oversized(limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

fn oversized(limit: usize) -> UplinkError {
    UplinkError::Transport(format!("response body exceeded {} bytes", limit))
}

fn describe(error: reqwest::Error) -> UplinkError {
    if error.is_timeout() {
        UplinkError::Transport("request timed out".to_string())
    } else if error.is_connect() {
        UplinkError::Transport(format!("connection failed: {}", error))
    } else {
        UplinkError::Transport(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    const TOKEN: &str = "c0ffee00-1234-5678-9abc-def012345678";

    enum Framing {
        Length,
        Chunked,
    }

    fn http_response(status: &str, body: &[u8], framing: Framing) -> Vec<u8> {
        let mut raw = match framing {
            Framing::Length => format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            )
            .into_bytes(),
            Framing::Chunked => format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
                status
            )
            .into_bytes(),
        };

        match framing {
            Framing::Length => raw.extend_from_slice(body),
            Framing::Chunked => {
                for chunk in body.chunks(16 * 1024) {
                    raw.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                    raw.extend_from_slice(chunk);
                    raw.extend_from_slice(b"\r\n");
                }
                raw.extend_from_slice(b"0\r\n\r\n");
            }
        }
        raw
    }

    /// Read one request (head and body) and return its head.
    async fn read_request(socket: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let Ok(read) = socket.read(&mut chunk).await else {
                break;
            };
            if read == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..read]);

            let text = String::from_utf8_lossy(&buffer).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let head = text[..head_end].to_ascii_lowercase();
                let body_len = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buffer.len() >= head_end + 4 + body_len {
                    return head;
                }
            }
        }
        String::from_utf8_lossy(&buffer).to_ascii_lowercase()
    }

    /// Serve `raw` to the first connection; resolves to the request head.
    async fn serve_once(raw: Vec<u8>) -> (u16, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return String::new();
            };
            let head = read_request(&mut socket).await;
            // The client may hang up early on oversized bodies
            let _ = socket.write_all(&raw).await;
            let _ = socket.shutdown().await;
            head
        });
        (port, server)
    }

    async fn post_body(body: Vec<u8>, framing: Framing, limit: usize) -> Result<Vec<u8>> {
        let (port, _server) = serve_once(http_response("200 OK", &body, framing)).await;
        HttpsTransport::plaintext()
            .post(port, TOKEN, PROBE_PATH, limit)
            .await
    }

    fn is_oversized(result: &Result<Vec<u8>>) -> bool {
        matches!(result, Err(UplinkError::Transport(message)) if message.contains("exceeded"))
    }

    #[tokio::test]
    async fn test_probe_body_at_limit_accepted() {
        let body = post_body(vec![b'x'; PROBE_BODY_LIMIT], Framing::Length, PROBE_BODY_LIMIT)
            .await
            .unwrap();
        assert_eq!(body.len(), PROBE_BODY_LIMIT);
    }

    #[tokio::test]
    async fn test_probe_body_over_declared_limit_rejected() {
        let result =
            post_body(vec![b'x'; PROBE_BODY_LIMIT + 1], Framing::Length, PROBE_BODY_LIMIT).await;
        assert!(is_oversized(&result));
    }

    #[tokio::test]
    async fn test_chunked_body_at_limit_accepted() {
        let body = post_body(vec![b'x'; PROBE_BODY_LIMIT], Framing::Chunked, PROBE_BODY_LIMIT)
            .await
            .unwrap();
        assert_eq!(body.len(), PROBE_BODY_LIMIT);
    }

    #[tokio::test]
    async fn test_chunked_body_over_limit_rejected() {
        let result =
            post_body(vec![b'x'; PROBE_BODY_LIMIT + 1], Framing::Chunked, PROBE_BODY_LIMIT).await;
        assert!(is_oversized(&result));
    }

    #[tokio::test]
    async fn test_fetch_body_limit() {
        let at_limit = post_body(vec![b'x'; FETCH_BODY_LIMIT], Framing::Chunked, FETCH_BODY_LIMIT)
            .await
            .unwrap();
        assert_eq!(at_limit.len(), FETCH_BODY_LIMIT);

        let over = post_body(vec![b'x'; FETCH_BODY_LIMIT + 1], Framing::Chunked, FETCH_BODY_LIMIT).await;
        assert!(is_oversized(&over));

        let declared =
            post_body(vec![b'x'; FETCH_BODY_LIMIT + 1], Framing::Length, FETCH_BODY_LIMIT).await;
        assert!(is_oversized(&declared));
    }

    #[tokio::test]
    async fn test_non_success_status_is_transport_error() {
        let (port, _server) =
            serve_once(http_response("500 Internal Server Error", b"{}", Framing::Length)).await;
        let result = HttpsTransport::plaintext().fetch_status(port, TOKEN).await;
        assert!(matches!(result, Err(UplinkError::Transport(message)) if message.contains("500")));

        let (port, _server) = serve_once(http_response("403 Forbidden", b"{}", Framing::Length)).await;
        assert!(!HttpsTransport::plaintext().probe(port, TOKEN).await);
    }

    #[tokio::test]
    async fn test_fetch_sends_auth_headers_and_parses_json() {
        let (port, server) = serve_once(http_response(
            "200 OK",
            br#"{"userStatus":{}}"#,
            Framing::Length,
        ))
        .await;
        let value = HttpsTransport::plaintext()
            .fetch_status(port, TOKEN)
            .await
            .unwrap();
        assert!(value.get("userStatus").is_some());

        let head = server.await.unwrap();
        assert!(head.starts_with(&format!("post {}", STATUS_PATH.to_ascii_lowercase())));
        assert!(head.contains(&format!("x-codeium-csrf-token: {}", TOKEN)));
        assert!(head.contains("connect-protocol-version: 1"));
    }

    #[tokio::test]
    async fn test_endpoint_is_literal_loopback() {
        let transport = HttpsTransport::new().unwrap();
        assert_eq!(
            transport.endpoint(42100, STATUS_PATH),
            "https://127.0.0.1:42100/exa.language_server_pb.LanguageServerService/GetUserStatus"
        );
    }

    #[tokio::test]
    async fn test_probe_rejects_invalid_inputs_without_network() {
        let transport = HttpsTransport::new().unwrap();
        assert!(!transport.probe(0, "deadbeef-0001").await);
        assert!(!transport.probe(42100, "bad token!").await);
    }

    #[tokio::test]
    async fn test_fetch_rejects_malformed_token() {
        let transport = HttpsTransport::new().unwrap();
        let result = transport.fetch_status(42100, "zz").await;
        assert!(matches!(result, Err(UplinkError::Transport(_))));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<()> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(UplinkError::Transport(message)) if message.contains("timed out")));
    }
}
