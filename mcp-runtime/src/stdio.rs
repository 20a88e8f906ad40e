use kbeauty_core::jsonrpc::{ResponseEnvelope, RpcError};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::dispatcher::Dispatcher;

/// How a message arrived; replies are written back the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One JSON document per line.
    Line,
    /// LSP-style `Content-Length` header block followed by the body.
    ContentLength,
}

#[derive(Debug)]
pub enum Incoming {
    Message(Value),
    /// The frame was read but its body was not valid JSON.
    Unparseable(String),
}

/// Serves the dispatcher over a byte stream until EOF. One session per stream.
pub async fn serve<R, W>(dispatcher: &Dispatcher, reader: &mut R, writer: &mut W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let session = dispatcher.sessions().create();
    tracing::info!(
        event = "mcp_stdio_started",
        session_id = %session.id,
        tools = dispatcher.registry().len(),
        "MCP stdio transport ready"
    );

    while let Some((framing, incoming)) = read_message(reader).await? {
        dispatcher.sessions().touch(&session.id);
        let responses = match incoming {
            Incoming::Message(message) => {
                dispatcher.handle_incoming_message(message, &session).await
            }
            Incoming::Unparseable(detail) => {
                tracing::debug!(
                    event = "mcp_stdio_parse_error",
                    session_id = %session.id,
                    detail = %detail,
                    "Discarding unparseable MCP frame"
                );
                vec![ResponseEnvelope::failure(
                    Value::Null,
                    RpcError::parse_error(detail),
                )]
            }
        };
        for response in responses {
            write_message(writer, framing, &response.to_value()).await?;
        }
    }

    tracing::info!(
        event = "mcp_stdio_closed",
        session_id = %session.id,
        "MCP stdio transport reached EOF"
    );
    Ok(())
}

/// Largest `Content-Length` body accepted; bigger frames are skipped and answered with a parse error.
pub const MAX_CONTENT_LENGTH: usize = 4 * 1024 * 1024;

/// Reads the next message. `Ok(None)` on a clean EOF between messages.
///
/// Lines that are neither JSON nor a header, header blocks without a usable
/// `Content-Length`, and oversized bodies come back as [`Incoming::Unparseable`]
/// so the caller can answer them and keep reading.
pub async fn read_message<R>(reader: &mut R) -> std::io::Result<Option<(Framing, Incoming)>>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut header_problem: Option<String> = None;
    let mut in_headers = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            if !in_headers {
                return Ok(None);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }

        let trimmed = line.trim();
        if !in_headers {
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                return Ok(Some((Framing::Line, parse_body(trimmed.as_bytes()))));
            }
            if header_field(trimmed).is_none() {
                return Ok(Some((
                    Framing::Line,
                    Incoming::Unparseable(format!("Unrecognized input line: {}", preview(trimmed))),
                )));
            }
            in_headers = true;
        }

        if trimmed.is_empty() {
            break;
        }
        match header_field(trimmed) {
            Some((name, value)) if name.eq_ignore_ascii_case("content-length") => {
                match value.parse::<usize>() {
                    Ok(parsed) => content_length = Some(parsed),
                    Err(_) => {
                        header_problem = Some(format!("Invalid Content-Length header: {}", preview(value)));
                    }
                }
            }
            Some(_) => {}
            None => {
                header_problem = Some(format!("Malformed header line: {}", preview(trimmed)));
            }
        }
    }

    if let Some(problem) = header_problem {
        return Ok(Some((Framing::Line, Incoming::Unparseable(problem))));
    }
    let Some(content_length) = content_length else {
        return Ok(Some((
            Framing::Line,
            Incoming::Unparseable("Missing Content-Length header".to_string()),
        )));
    };
    if content_length > MAX_CONTENT_LENGTH {
        let skipped = tokio::io::copy(
            &mut (&mut *reader).take(content_length as u64),
            &mut tokio::io::sink(),
        )
        .await?;
        if skipped < content_length as u64 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while skipping oversized MCP body",
            ));
        }
        return Ok(Some((
            Framing::ContentLength,
            Incoming::Unparseable(format!(
                "Content-Length {content_length} exceeds limit of {MAX_CONTENT_LENGTH} bytes"
            )),
        )));
    }
    let mut payload = vec![0_u8; content_length];
    reader.read_exact(&mut payload).await?;
    Ok(Some((Framing::ContentLength, parse_body(&payload))))
}

/// Splits `Name: value` when the name is a plain header token.
fn header_field(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    let is_token = !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    is_token.then(|| (name, value.trim()))
}

fn preview(text: &str) -> String {
    text.chars().take(64).collect()
}

fn parse_body(bytes: &[u8]) -> Incoming {
    match serde_json::from_slice(bytes) {
        Ok(value) => Incoming::Message(value),
        Err(err) => Incoming::Unparseable(err.to_string()),
    }
}

pub async fn write_message<W>(writer: &mut W, framing: Framing, value: &Value) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Line => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await?;
    Ok(())
}
