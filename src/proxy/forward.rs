use std::{collections::HashMap, net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
};
use url::{Position, Url};

use crate::{
    error::ProxyError, proxy::request::encode_header_value, stream::relay_bidirectional,
};

const DEFAULT_HTTP_PORT: u16 = 80;

/// Parses an absolute-form request target.
pub fn parse_target_url(target: &str) -> Result<Url, ProxyError> {
    Url::parse(target).map_err(|e| ProxyError::InvalidTarget {
        target: target.to_string(),
        reason: e.to_string(),
    })
}

/// `host:port` to dial for `url`. Without an explicit port the scheme's
/// default is used, and 80 when the scheme has none.
pub fn origin_address(url: &Url) -> Result<String, ProxyError> {
    let host = url.host_str().ok_or_else(|| ProxyError::InvalidTarget {
        target: url.to_string(),
        reason: "missing host".to_string(),
    })?;
    let port = url.port_or_known_default().unwrap_or(DEFAULT_HTTP_PORT);
    Ok(format!("{}:{}", host, port))
}

/// Builds the origin-facing request head: origin-form request line, every
/// client header except `proxy-authorization`, blank line.
///
/// Values go out as the bytes the client sent (see [`encode_header_value`]).
pub fn serialize_request_head(method: &str, url: &Url, headers: &HashMap<String, String>) -> Vec<u8> {
    let request_uri = &url[Position::BeforePath..Position::AfterQuery];

    let mut head = format!("{} {} HTTP/1.1\r\n", method, request_uri).into_bytes();
    for (name, value) in headers {
        if name == "proxy-authorization" {
            continue;
        }
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(&encode_header_value(value));
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}

/// Re-issues a plain-HTTP request to its origin and relays the response.
///
/// The request body (buffered tail first, then the live socket) is pumped
/// to the origin, whose write side is half-closed once the client stops
/// sending. The response is pumped back until the origin closes.
pub async fn handle_forward<R, W>(
    method: &str,
    target: &str,
    headers: &HashMap<String, String>,
    client_addr: SocketAddr,
    client_reader: R,
    client_writer: W,
    idle_timeout: Option<Duration>,
) -> Result<(), ProxyError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let url = parse_target_url(target)?;
    let origin_addr = origin_address(&url)?;

    let origin = TcpStream::connect(&origin_addr)
        .await
        .map_err(|source| ProxyError::Dial {
            target: origin_addr.clone(),
            source,
        })?;
    tracing::debug!("forwarding {} {} to {} for {}", method, target, origin_addr, client_addr);

    let (origin_read, mut origin_write) = origin.into_split();

    let head = serialize_request_head(method, &url, headers);
    origin_write.write_all(&head).await?;
    origin_write.flush().await?;

    let label_c2o = format!("C[{}]->O[{}]", client_addr, origin_addr);
    let label_o2c = format!("O[{}]->C[{}]", origin_addr, client_addr);

    let outcome = relay_bidirectional(
        (client_reader, client_writer),
        (origin_read, origin_write),
        (&label_c2o, &label_o2c),
        idle_timeout,
    )
    .await;

    tracing::debug!(
        "forward {} {} done (body: {}, response: {})",
        method,
        target,
        outcome.sent(),
        outcome.received()
    );

    outcome.into_result()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn origin_address_defaults_port() {
        let url = parse_target_url("http://example.com/index.html").unwrap();
        assert_eq!(origin_address(&url).unwrap(), "example.com:80");

        let url = parse_target_url("http://example.com:8080/").unwrap();
        assert_eq!(origin_address(&url).unwrap(), "example.com:8080");

        let url = parse_target_url("foo://example.com/").unwrap();
        assert_eq!(origin_address(&url).unwrap(), "example.com:80");

        let url = parse_target_url("http://[::1]:9000/").unwrap();
        assert_eq!(origin_address(&url).unwrap(), "[::1]:9000");
    }

    #[test]
    fn rejects_targets_without_host() {
        assert!(matches!(
            parse_target_url("/relative/path"),
            Err(ProxyError::InvalidTarget { .. })
        ));

        let url = parse_target_url("mailto:someone@example.com").unwrap();
        assert!(matches!(
            origin_address(&url),
            Err(ProxyError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn head_uses_origin_form_and_strips_credentials() {
        let url = parse_target_url("http://example.com/path/to?q=1&r=2#frag").unwrap();
        let head = String::from_utf8(serialize_request_head(
            "GET",
            &url,
            &headers(&[
                ("host", "example.com"),
                ("proxy-authorization", "Basic YWxpY2U6c2VjcmV0"),
                ("accept", "*/*"),
            ]),
        ))
        .unwrap();

        assert!(head.starts_with("GET /path/to?q=1&r=2 HTTP/1.1\r\n"));
        assert!(head.contains("host: example.com\r\n"));
        assert!(head.contains("accept: */*\r\n"));
        assert!(!head.to_ascii_lowercase().contains("proxy-authorization"));
        assert!(head.ends_with("\r\n\r\n"));
        assert_eq!(head.matches("\r\n").count(), 4);
    }

    #[test]
    fn head_for_bare_authority_uses_root_path() {
        let url = parse_target_url("http://example.com").unwrap();
        let head = serialize_request_head("HEAD", &url, &HashMap::new());
        assert_eq!(head, b"HEAD / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn head_writes_latin1_values_back_as_bytes() {
        let url = parse_target_url("http://example.com/").unwrap();
        let head = serialize_request_head(
            "GET",
            &url,
            &headers(&[("x-name", "caf\u{e9}")]),
        );
        assert_eq!(head, b"GET / HTTP/1.1\r\nx-name: caf\xe9\r\n\r\n");
    }
}
