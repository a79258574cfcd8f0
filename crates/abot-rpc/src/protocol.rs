//! Wire protocol: newline-delimited JSON messages.
//!
//! Every request is one JSON object on one line, tagged by `method`:
//!
//! ```text
//! {"method":"register","params":{"name":"weather","address":"127.0.0.1:5001"}}
//! {"method":"subscribe","params":{"name":"weather","pattern":{"Object":"weather"}}}
//! {"method":"heartbeat","params":{"name":"weather"}}
//! {"method":"respond_to","params":{"input":{...},"sentence":"...","flexid_type":"phone","flexid":"...","followup":false}}
//! ```
//!
//! and every response is one line tagged by `status`:
//!
//! ```text
//! {"status":"ok"}
//! {"status":"reply","reply":"It is sunny."}
//! {"status":"error","code":"duplicate","message":"weather"}
//! ```
//!
//! A frame is at most [`MAX_FRAME_LEN`] bytes before its newline. Longer
//! frames and frames that are not UTF-8 are discarded up to the next
//! newline and answered with *bad-request*; the connection stays usable.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use abot_types::{AbotError, ErrorKind, PluginMessage, StructuredInput};

use crate::error::{Result, RpcError};

/// Largest frame accepted, excluding the newline.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Method names accepted on the wire.
pub const METHODS: &[&str] = &["register", "subscribe", "heartbeat", "respond_to"];

/// A call from one side of the link to the other.
///
/// `Register`, `Subscribe` and `Heartbeat` go from a plugin to the core;
/// `RespondTo` goes from the core to a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Request {
    Register { name: String, address: String },
    Subscribe { name: String, pattern: StructuredInput },
    Heartbeat { name: String },
    RespondTo(PluginMessage),
}

impl Request {
    pub fn method(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::Subscribe { .. } => "subscribe",
            Self::Heartbeat { .. } => "heartbeat",
            Self::RespondTo(_) => "respond_to",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Reply { reply: String },
    Error { code: ErrorKind, message: String },
}

impl Response {
    /// Encode an error for the peer.
    ///
    /// Name-carrying errors send the bare name as the message so the
    /// receiver can rebuild the same variant.
    pub fn from_error(err: &AbotError) -> Self {
        let message = match err {
            AbotError::Duplicate { name } | AbotError::UnknownPlugin { name } => name.clone(),
            AbotError::UnknownMethod { method } => method.clone(),
            AbotError::BadRequest { reason } | AbotError::Config { reason } => reason.clone(),
            AbotError::Timeout { operation } => operation.clone(),
            AbotError::Plugin { message } => message.clone(),
            AbotError::Transport(message) => message.clone(),
            other => other.to_string(),
        };
        Self::Error {
            code: err.kind(),
            message,
        }
    }

    /// Convert into a result, treating `Error` as [`RpcError::Remote`].
    pub fn into_result(self) -> Result<Option<String>> {
        match self {
            Self::Ok => Ok(None),
            Self::Reply { reply } => Ok(Some(reply)),
            Self::Error { code, message } => Err(RpcError::Remote { code, message }),
        }
    }
}

/// Parse one request line.
///
/// Malformed JSON, a missing `method` or bad params are *bad-request*; a
/// well-formed call to a method not in [`METHODS`] is *unknown-method*.
pub fn parse_request(line: &str) -> std::result::Result<Request, AbotError> {
    let value: serde_json::Value = serde_json::from_str(line)
        .map_err(|e| AbotError::bad_request(format!("invalid JSON: {e}")))?;
    let method = value
        .as_object()
        .ok_or_else(|| AbotError::bad_request("request must be a JSON object"))?
        .get("method")
        .and_then(|m| m.as_str())
        .ok_or_else(|| AbotError::bad_request("missing method"))?;
    if !METHODS.contains(&method) {
        return Err(AbotError::UnknownMethod {
            method: method.to_string(),
        });
    }
    let method = method.to_string();
    serde_json::from_value(value)
        .map_err(|e| AbotError::bad_request(format!("invalid params for {method}: {e}")))
}

/// Write one message followed by a newline and flush.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// One newline-delimited frame as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// The frame was not valid UTF-8.
    NotUtf8,
    /// The frame ran past the length limit and was dropped.
    TooLong,
}

impl Frame {
    /// The frame's text, or the *bad-request* it earns.
    pub fn into_text(self) -> std::result::Result<String, AbotError> {
        match self {
            Self::Text(text) => Ok(text),
            Self::NotUtf8 => Err(AbotError::bad_request("frame is not valid UTF-8")),
            Self::TooLong => Err(AbotError::bad_request(format!(
                "frame exceeds {MAX_FRAME_LEN} bytes"
            ))),
        }
    }
}

/// Read one frame of at most `max_len` bytes. `None` means the peer closed
/// the stream. A trailing `\r` is dropped.
///
/// An oversized frame is consumed up to its newline without being
/// buffered, so memory stays bounded whatever the peer sends.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> std::io::Result<Option<Frame>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut too_long = false;
    let mut seen_any = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if !seen_any {
                return Ok(None);
            }
            break;
        }
        seen_any = true;
        let newline = available.iter().position(|&b| b == b'\n');
        let (body, used) = match newline {
            Some(i) => (&available[..i], i + 1),
            None => (available, available.len()),
        };
        if !too_long {
            if buf.len() + body.len() > max_len {
                too_long = true;
                buf = Vec::new();
            } else {
                buf.extend_from_slice(body);
            }
        }
        reader.consume(used);
        if newline.is_some() {
            break;
        }
    }

    if too_long {
        return Ok(Some(Frame::TooLong));
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(match String::from_utf8(buf) {
        Ok(text) => Frame::Text(text),
        Err(_) => Frame::NotUtf8,
    }))
}

/// Read and decode one response.
pub async fn read_response<R>(reader: &mut R) -> Result<Response>
where
    R: AsyncBufRead + Unpin,
{
    let frame = read_frame(reader, MAX_FRAME_LEN).await?.ok_or(RpcError::Closed)?;
    let text = frame
        .into_text()
        .map_err(|e| RpcError::Unexpected(e.to_string()))?;
    Ok(serde_json::from_str(&text)?)
}
