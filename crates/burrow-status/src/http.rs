//! Minimal HTTP/1.1 request parsing and response encoding.
//!
//! One request per connection: the server always answers with
//! `Connection: close`. Only `Content-Length` bodies are accepted.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest accepted request or header line, in bytes.
pub const MAX_LINE_LEN: u64 = 8192;

/// Largest accepted request body, in bytes.
pub const MAX_BODY_LEN: usize = 64 * 1024;

/// Most header lines accepted per request.
const MAX_HEADERS: usize = 100;

/// Errors while reading a request.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request line or headers are not valid HTTP.
    #[error("malformed request: {0}")]
    Malformed(&'static str),
    /// The body exceeds [`MAX_BODY_LEN`].
    #[error("request body of {0} bytes exceeds the limit")]
    TooLarge(usize),
    /// The socket failed.
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpError {
    /// Response sent back for this error.
    #[must_use]
    pub fn to_response(&self) -> Response {
        match self {
            Self::Malformed(_) | Self::Io(_) => Response::error(400, "Bad request"),
            Self::TooLarge(_) => Response::error(413, "Payload too large"),
        }
    }
}

/// A parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Method, as sent.
    pub method: String,
    /// Path without the query string.
    pub path: String,
    /// Raw body.
    pub body: Vec<u8>,
}

/// Reads one request. Returns `Ok(None)` if the peer closed the connection
/// before sending anything.
///
/// # Errors
///
/// Returns an error for malformed or oversized requests and socket errors.
pub async fn read_request<R>(reader: &mut R) -> Result<Option<Request>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let Some(request_line) = read_line(reader).await? else {
        return Ok(None);
    };
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(target), Some(version)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(HttpError::Malformed("bad request line"));
    };
    if !version.starts_with("HTTP/1.") {
        return Err(HttpError::Malformed("unsupported HTTP version"));
    }
    let path = target.split('?').next().unwrap_or(target).to_string();
    let method = method.to_string();

    let mut content_length = 0;
    let mut headers = 0;
    loop {
        let line = read_line(reader)
            .await?
            .ok_or(HttpError::Malformed("connection closed inside headers"))?;
        if line.is_empty() {
            break;
        }
        headers += 1;
        if headers > MAX_HEADERS {
            return Err(HttpError::Malformed("too many headers"));
        }
        let (name, value) = line
            .split_once(':')
            .ok_or(HttpError::Malformed("bad header line"))?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            content_length = value
                .trim()
                .parse()
                .map_err(|_| HttpError::Malformed("bad content-length"))?;
        }
    }

    if content_length > MAX_BODY_LEN {
        return Err(HttpError::TooLarge(content_length));
    }
    let mut body = vec![0; content_length];
    let _ = reader.read_exact(&mut body).await?;

    Ok(Some(Request { method, path, body }))
}

/// Reads a CRLF- or LF-terminated line of at most [`MAX_LINE_LEN`] bytes.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = (&mut *reader).take(MAX_LINE_LEN).read_line(&mut line).await?;
    if n == 0 {
        return Ok(None);
    }
    if !line.ends_with('\n') {
        return Err(HttpError::Malformed("line too long"));
    }
    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(Some(line))
}

/// A JSON response.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// JSON body.
    pub body: serde_json::Value,
}

impl Response {
    /// Response with the given status and body.
    #[must_use]
    pub const fn json(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    /// `{"error": message}` with the given status.
    #[must_use]
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, serde_json::json!({ "error": message }))
    }

    /// Serializes the status line, headers and body.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let body = self.body.to_string();
        let mut out = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            self.status,
            reason_phrase(self.status),
            body.len()
        )
        .into_bytes();
        out.extend_from_slice(body.as_bytes());
        out
    }
}

const fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        413 => "Payload Too Large",
        _ => "Internal Server Error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &str) -> Result<Option<Request>, HttpError> {
        let mut reader = tokio::io::BufReader::new(raw.as_bytes());
        read_request(&mut reader).await
    }

    #[tokio::test]
    async fn parses_get_without_body() {
        let req = parse("GET /api/v1/status?x=1 HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/api/v1/status");
        assert!(req.body.is_empty());
    }

    #[tokio::test]
    async fn reads_exactly_content_length_bytes() {
        let req = parse(
            "POST /api/v1/status HTTP/1.1\r\ncontent-length: 16\r\n\r\n{\"status\":\"up\"}\ntrailing",
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(req.body, b"{\"status\":\"up\"}\n");
    }

    #[tokio::test]
    async fn empty_stream_is_not_a_request() {
        assert!(parse("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_garbage_request_line() {
        assert!(matches!(
            parse("hello\r\n\r\n").await,
            Err(HttpError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn rejects_oversized_body_before_reading_it() {
        let raw = format!(
            "POST /api/v1/status HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
            MAX_BODY_LEN + 1
        );
        let err = parse(&raw).await.unwrap_err();
        assert!(matches!(err, HttpError::TooLarge(_)));
        assert_eq!(err.to_response().status, 413);
    }

    #[tokio::test]
    async fn truncated_body_is_an_error() {
        assert!(
            parse("POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc")
                .await
                .is_err()
        );
    }

    #[test]
    fn response_carries_length_and_close() {
        let bytes = Response::json(200, serde_json::json!({"status": "OK"})).to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 15\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\n{\"status\":\"OK\"}"));
    }
}
