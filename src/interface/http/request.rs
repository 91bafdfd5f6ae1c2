use std::collections::HashMap;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::shared::error::RequestError;

pub const MAX_HEAD_BYTES: usize = 64 * 1024;
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (target.to_string(), None),
        };
        Self {
            method: method.to_ascii_uppercase(),
            path,
            query,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.trim().to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn ok(content_type: &str, body: Vec<u8>) -> Self {
        Self::new(200).with_header("Content-Type", content_type).with_body(body)
    }

    pub fn accepted() -> Self {
        Self::new(202)
    }

    /// Generic status phrase as a plain-text body.
    pub fn error(err: RequestError) -> Self {
        Self::new(err.status())
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(err.to_string().into_bytes())
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut resp = Vec::with_capacity(128 + self.body.len());
        resp.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status)).as_bytes(),
        );
        for (name, value) in &self.headers {
            resp.extend_from_slice(format!("{name}: {value}\r\n").as_bytes());
        }
        resp.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        resp.extend_from_slice(b"Connection: close\r\n\r\n");
        resp.extend_from_slice(&self.body);
        resp
    }
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("request rejected: {0}")]
    Rejected(RequestError),
}

/// Reads one request: head up to the blank line, then `Content-Length` bytes
/// of body. `Ok(None)` means the peer closed before sending anything.
pub async fn read_request<S>(stream: &mut S) -> Result<Option<HttpRequest>, ReadError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 4096];
    let mut read_len = 0usize;
    let head_end = loop {
        if let Some(pos) = find_head_end(&buf[..read_len]) {
            break pos;
        }
        if read_len >= MAX_HEAD_BYTES {
            return Err(ReadError::Rejected(RequestError::PayloadTooLarge));
        }
        if read_len == buf.len() {
            buf.resize(buf.len() + 4096, 0);
        }
        let n = stream.read(&mut buf[read_len..]).await?;
        if n == 0 {
            if read_len == 0 {
                return Ok(None);
            }
            return Err(ReadError::Rejected(RequestError::BadRequest));
        }
        read_len += n;
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let first_line = lines.next().unwrap_or("");
    let mut parts = first_line.split_whitespace();
    let (Some(method), Some(target)) = (parts.next(), parts.next()) else {
        return Err(ReadError::Rejected(RequestError::BadRequest));
    };
    let mut request = HttpRequest::new(method, target);
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            request = request.with_header(name.trim(), value);
        }
    }

    let content_len = match request.header("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| ReadError::Rejected(RequestError::BadRequest))?,
        None => 0,
    };
    if content_len > MAX_BODY_BYTES {
        return Err(ReadError::Rejected(RequestError::PayloadTooLarge));
    }

    let body_start = head_end + 4;
    let mut body = buf[body_start.min(read_len)..read_len].to_vec();
    body.truncate(content_len);
    if body.len() < content_len {
        let mut rest = vec![0u8; content_len - body.len()];
        stream.read_exact(&mut rest).await?;
        body.extend_from_slice(&rest);
    }
    request.body = body;
    Ok(Some(request))
}

pub async fn write_response<S>(stream: &mut S, response: &HttpResponse) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&response.to_bytes()).await?;
    stream.flush().await
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
