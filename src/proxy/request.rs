use std::collections::HashMap;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::ProxyError;

/// Upper bound for the request line plus header block.
pub const MAX_REQUEST_HEAD_SIZE: usize = 64 * 1024;

/// A parsed request head. `reader` is positioned right after the blank
/// line, so any body bytes it already buffered are still there.
#[derive(Debug)]
pub struct InboundRequest<R> {
    pub method: String,
    pub target: String,
    /// Lower-cased header names; the last occurrence of a name wins.
    pub headers: HashMap<String, String>,
    pub reader: R,
}

impl<R> InboundRequest<R> {
    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }
}

/// Reads one request head off `reader`.
///
/// The request line and header names must be ASCII. Header values are
/// taken byte for byte as ISO-8859-1, so obs-text survives the trip to
/// the origin unchanged (see [`encode_header_value`]).
pub async fn parse_request<R>(mut reader: R) -> Result<InboundRequest<R>, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut budget = MAX_REQUEST_HEAD_SIZE;

    let request_line = read_head_line(&mut reader, &mut budget)
        .await?
        .ok_or_else(|| ProxyError::MalformedRequest("connection closed before request line".into()))?;
    let request_line = ascii_str(request_line.trim_ascii())
        .ok_or_else(|| ProxyError::MalformedRequest("request line is not ASCII".into()))?;

    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method.to_string(), target.to_string()),
        _ => {
            return Err(ProxyError::MalformedRequest(format!(
                "bad request line {:?}",
                request_line
            )))
        }
    };

    let mut headers = HashMap::new();
    loop {
        let line = read_head_line(&mut reader, &mut budget)
            .await?
            .ok_or_else(|| ProxyError::MalformedRequest("connection closed inside headers".into()))?;
        let line = line.trim_ascii();
        if line.is_empty() {
            break;
        }

        // lines without a colon are noise, skip them
        let Some(colon) = line.iter().position(|b| *b == b':') else {
            continue;
        };
        let name = ascii_str(line[..colon].trim_ascii())
            .ok_or_else(|| ProxyError::MalformedRequest("header name is not ASCII".into()))?;
        let value = decode_header_value(line[colon + 1..].trim_ascii());
        headers.insert(name.to_ascii_lowercase(), value);
    }

    Ok(InboundRequest {
        method,
        target,
        headers,
        reader,
    })
}

/// Maps each byte to the char with the same code point (ISO-8859-1).
pub fn decode_header_value(bytes: &[u8]) -> String {
    bytes.iter().map(|b| char::from(*b)).collect()
}

/// Inverse of [`decode_header_value`]. Chars above U+00FF cannot come out
/// of the parser and are written as `?`.
pub fn encode_header_value(value: &str) -> Vec<u8> {
    value
        .chars()
        .map(|c| u8::try_from(c).unwrap_or(b'?'))
        .collect()
}

fn ascii_str(bytes: &[u8]) -> Option<&str> {
    if bytes.is_ascii() {
        std::str::from_utf8(bytes).ok()
    } else {
        None
    }
}

/// Reads a `\n`-terminated line, charging it against `budget`.
/// Returns `None` on end-of-stream, including a partial final line.
async fn read_head_line<R>(reader: &mut R, budget: &mut usize) -> Result<Option<Vec<u8>>, ProxyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    let n = (&mut *reader)
        .take(*budget as u64)
        .read_until(b'\n', &mut line)
        .await?;

    if !line.ends_with(b"\n") {
        if n == *budget {
            return Err(ProxyError::HeadersTooLarge(MAX_REQUEST_HEAD_SIZE));
        }
        return Ok(None);
    }
    *budget -= n;

    Ok(Some(line))
}
