//! # RESP2 Encoding and Parsing
//!
//! Purpose: Frame Disque commands as RESP2 arrays and parse broker replies
//! into the closed `Reply` type.
//!
//! ## Design Principles
//! 1. **State-Free Parsing**: Replies are parsed top-down with minimal state.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Errors Are Not Values**: `-ERR` replies surface as `ClientError::Server`,
//!    even when nested, after the whole reply has been consumed.

use std::io::{BufRead, Read};

use bytes::Bytes;

use crate::command::Command;
use crate::error::{ClientError, ClientResult};

/// Largest bulk string accepted from the broker (RESP `proto-max-bulk-len`).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Upper bound on array preallocation; longer arrays grow as items arrive.
const MAX_ARRAY_PREALLOC: i64 = 64;

/// Reply value returned by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `$-1` or `*-1`.
    Nil,
    /// `:123` replies.
    Integer(i64),
    /// `+OK` or `+PONG` style replies.
    Status(String),
    /// `$...` bulk strings.
    Bulk(Bytes),
    /// `*...` arrays, possibly nested.
    Array(Vec<Reply>),
}

impl Reply {
    /// Short description of the reply shape, used in decode errors.
    pub fn kind(&self) -> String {
        match self {
            Reply::Nil => "nil".to_string(),
            Reply::Integer(_) => "integer".to_string(),
            Reply::Status(_) => "status".to_string(),
            Reply::Bulk(_) => "bulk string".to_string(),
            Reply::Array(items) => format!("array of {}", items.len()),
        }
    }

    /// Returns the string payload of a bulk or status reply.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Status(text) => Some(text),
            Reply::Bulk(data) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }

    /// Returns the integer payload, if any.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(value) => Some(*value),
            _ => None,
        }
    }
}

/// Encodes a command as a RESP2 array of bulk strings.
pub fn encode_command(command: &Command, out: &mut Vec<u8>) {
    out.push(b'*');
    push_usize(out, command.args().len() + 1);
    out.extend_from_slice(b"\r\n");
    push_bulk(out, command.name().as_bytes());
    for arg in command.args() {
        push_bulk(out, arg);
    }
}

/// Reads one reply from the buffered reader.
///
/// Error replies anywhere in the tree become `ClientError::Server` only after
/// the full reply has been read, so the stream stays aligned.
pub fn read_response<R: BufRead>(reader: &mut R, line_buf: &mut Vec<u8>) -> ClientResult<Reply> {
    match read_frame(reader, line_buf)? {
        Ok(reply) => Ok(reply),
        Err(message) => Err(ClientError::Server(message)),
    }
}

fn read_frame<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
) -> ClientResult<Result<Reply, String>> {
    read_line(reader, line_buf)?;
    if line_buf.is_empty() {
        return Err(ClientError::Protocol("empty line"));
    }

    match line_buf[0] {
        b'+' => Ok(Ok(Reply::Status(
            String::from_utf8_lossy(&line_buf[1..]).into_owned(),
        ))),
        b'-' => Ok(Err(String::from_utf8_lossy(&line_buf[1..]).into_owned())),
        b':' => Ok(Ok(Reply::Integer(parse_i64(&line_buf[1..])?))),
        b'$' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_bulk_len(reader, len, line_buf).map(Ok)
        }
        b'*' => {
            let len = parse_i64(&line_buf[1..])?;
            parse_array_len(reader, len, line_buf)
        }
        _ => Err(ClientError::Protocol("unknown reply type")),
    }
}

fn parse_bulk_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> ClientResult<Reply> {
    if len < 0 {
        return Ok(Reply::Nil);
    }
    if len > MAX_BULK_LEN {
        return Err(ClientError::Protocol("bulk length out of range"));
    }
    // Allocate only for bytes that actually arrive.
    let mut data = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut data)?;
    if data.len() as i64 != len {
        return Err(ClientError::Protocol("truncated bulk string"));
    }

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if crlf != [b'\r', b'\n'] {
        return Err(ClientError::Protocol("missing CRLF after bulk string"));
    }

    line_buf.clear();
    Ok(Reply::Bulk(Bytes::from(data)))
}

fn parse_array_len<R: BufRead>(
    reader: &mut R,
    len: i64,
    line_buf: &mut Vec<u8>,
) -> ClientResult<Result<Reply, String>> {
    if len < 0 {
        return Ok(Ok(Reply::Nil));
    }

    let mut items = Vec::with_capacity(len.min(MAX_ARRAY_PREALLOC) as usize);
    let mut first_error = None;
    for _ in 0..len {
        match read_frame(reader, line_buf)? {
            Ok(item) => items.push(item),
            Err(message) => {
                first_error.get_or_insert(message);
            }
        }
    }
    match first_error {
        Some(message) => Ok(Err(message)),
        None => Ok(Ok(Reply::Array(items))),
    }
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> ClientResult<()> {
    buf.clear();
    let bytes = reader.read_until(b'\n', buf)?;
    if bytes == 0 {
        return Err(ClientError::Protocol("connection closed"));
    }
    if buf.len() < 2 || buf[buf.len() - 2] != b'\r' {
        return Err(ClientError::Protocol("line not terminated by CRLF"));
    }
    buf.truncate(buf.len() - 2);
    Ok(())
}

fn parse_i64(data: &[u8]) -> ClientResult<i64> {
    std::str::from_utf8(data)
        .ok()
        .and_then(|text| text.parse().ok())
        .ok_or(ClientError::Protocol("invalid integer"))
}

fn push_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.push(b'$');
    push_usize(out, data.len());
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

fn push_usize(out: &mut Vec<u8>, mut value: usize) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    for idx in (0..len).rev() {
        out.push(buf[idx]);
    }
}
