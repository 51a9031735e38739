//! Framed JSON-RPC transport for LSP over stdio pipes.
//!
//! LSP messages are framed as `Content-Length: <N>\r\n\r\n<body>` where the
//! body is UTF-8 JSON. The reader side is deliberately forgiving: unknown
//! headers are tolerated, malformed header lines are logged and skipped, and
//! a body that fails to parse drops that message without killing the loop.
//! Only end-of-stream terminates reading.
//!
//! The codec is generic over the async IO traits so unit tests can drive it
//! with in-memory duplex streams instead of a child process.

use std::collections::HashMap;

use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{error, trace, warn};

/// Writes one framed message to the stream and flushes it.
///
/// ## Errors
/// Returns the underlying IO error if the write or flush fails; the caller
/// maps this to a transport error for the in-flight request.
pub async fn write_message<W>(writer: &mut W, msg: &Value) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    // Serialization of a Value cannot fail.
    let body = serde_json::to_string(msg).expect("JSON value serialization");
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(body.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads frames until one decodes to a JSON value, returning `None` at
/// end-of-stream.
///
/// Frames without a usable `Content-Length`, and bodies that fail to parse
/// as JSON, are logged and skipped.
///
/// ## Errors
/// Returns the underlying IO error for failures other than a clean EOF.
pub async fn read_message<R>(reader: &mut R) -> std::io::Result<Option<Value>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let Some(headers) = read_headers(reader).await? else {
            return Ok(None);
        };

        let content_length = headers
            .get("Content-Length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        if content_length == 0 {
            trace!("frame without Content-Length, skipping");
            continue;
        }

        let Some(body) = read_body(reader, content_length).await? else {
            return Ok(None);
        };

        match serde_json::from_slice::<Value>(&body) {
            Ok(msg) => return Ok(Some(msg)),
            Err(e) => {
                error!("failed to parse JSON message: {e}");
                continue;
            }
        }
    }
}

/// Reads CRLF-terminated `Key: Value` header lines up to the blank line.
///
/// Returns `None` when the stream ends before any header data arrives.
async fn read_headers<R>(reader: &mut R) -> std::io::Result<Option<HashMap<String, String>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = HashMap::new();
    let mut line = Vec::new();
    let mut saw_any = false;

    loop {
        line.clear();
        let n = reader.read_until(b'\n', &mut line).await?;
        if n == 0 {
            // EOF. Whatever headers were accumulated belong to a truncated
            // frame; report end-of-stream unless a complete header block
            // somehow preceded it.
            return Ok(if saw_any { Some(headers) } else { None });
        }
        saw_any = true;

        let decoded = String::from_utf8_lossy(&line);
        let trimmed = decoded.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            return Ok(Some(headers));
        }

        match trimmed.split_once(':') {
            Some((key, value)) => {
                headers.insert(key.trim().to_string(), value.trim().to_string());
            }
            None => warn!("failed to parse header line: {trimmed:?}"),
        }
    }
}

/// Reads exactly `length` body bytes, looping over short reads.
///
/// Returns `None` if the stream ends early.
async fn read_body<R>(reader: &mut R, length: usize) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = vec![0u8; length];
    match reader.read_exact(&mut body).await {
        Ok(_) => Ok(Some(body)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            error!("expected {length} body bytes but the stream ended early");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::BufReader;

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    #[tokio::test]
    async fn test_roundtrip_single_message() {
        let msg = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
        let mut buf = Vec::new();
        write_message(&mut buf, &msg).await.unwrap();

        let mut reader = BufReader::new(buf.as_slice());
        let decoded = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn test_reads_messages_in_sequence() {
        let mut buf = Vec::new();
        write_message(&mut buf, &json!({"id": 1})).await.unwrap();
        write_message(&mut buf, &json!({"id": 2})).await.unwrap();

        let mut reader = BufReader::new(buf.as_slice());
        assert_eq!(
            read_message(&mut reader).await.unwrap().unwrap()["id"],
            json!(1)
        );
        assert_eq!(
            read_message(&mut reader).await.unwrap().unwrap()["id"],
            json!(2)
        );
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extra_headers_are_tolerated() {
        let body = r#"{"id":3}"#;
        let raw = format!(
            "Content-Length: {}\r\nContent-Type: application/vscode-jsonrpc; charset=utf-8\r\n\r\n{}",
            body.len(),
            body
        );
        let mut reader = BufReader::new(raw.as_bytes());
        let decoded = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded["id"], json!(3));
    }

    #[tokio::test]
    async fn test_malformed_header_line_is_skipped() {
        let body = r#"{"id":4}"#;
        let raw = format!(
            "this line has no colon\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let mut reader = BufReader::new(raw.as_bytes());
        let decoded = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded["id"], json!(4));
    }

    #[tokio::test]
    async fn test_bad_json_body_is_dropped_not_fatal() {
        let mut raw = frame("{not json");
        raw.extend_from_slice(&frame(r#"{"id":5}"#));
        let mut reader = BufReader::new(raw.as_slice());
        // First frame fails to parse and is skipped; second comes through.
        let decoded = read_message(&mut reader).await.unwrap().unwrap();
        assert_eq!(decoded["id"], json!(5));
    }

    #[tokio::test]
    async fn test_truncated_body_ends_stream() {
        let raw = b"Content-Length: 100\r\n\r\n{\"id\":6}".to_vec();
        let mut reader = BufReader::new(raw.as_slice());
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_eof_returns_none() {
        let mut reader = BufReader::new(&[][..]);
        assert!(read_message(&mut reader).await.unwrap().is_none());
    }
}
