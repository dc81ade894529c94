use std::collections::HashMap;

use base64::Engine;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    config::Credentials,
    error::{AuthFailure, ProxyError},
};

pub const PROXY_AUTH_REQUIRED: &[u8] = b"HTTP/1.1 407 Proxy Authentication Required\r\n\
Proxy-Authenticate: Basic realm=\"Proxy\"\r\n\
\r\n";

/// Checks the `proxy-authorization` header against `expected`.
///
/// `headers` must use lower-cased names, as produced by the request parser.
pub fn verify_credentials(
    headers: &HashMap<String, String>,
    expected: &Credentials,
) -> Result<(), AuthFailure> {
    let auth_header = headers
        .get("proxy-authorization")
        .ok_or(AuthFailure::MissingHeader)?;

    let encoded = match auth_header.split_once(' ') {
        Some(("Basic", encoded)) => encoded,
        _ => return Err(AuthFailure::UnsupportedScheme),
    };

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| AuthFailure::InvalidEncoding)?;

    let split = decoded
        .iter()
        .position(|b| *b == b':')
        .ok_or(AuthFailure::MalformedCredentials)?;
    let (user, pass) = (&decoded[..split], &decoded[split + 1..]);

    // evaluate both so a wrong user costs the same as a wrong password
    let user_ok = constant_time_eq(user, expected.user.as_bytes());
    let pass_ok = constant_time_eq(pass, expected.pass.as_bytes());

    if user_ok & pass_ok {
        Ok(())
    } else {
        Err(AuthFailure::Mismatch)
    }
}

/// Verifies credentials and answers with a 407 challenge on failure.
pub async fn authenticate<W>(
    headers: &HashMap<String, String>,
    expected: &Credentials,
    client: &mut W,
) -> Result<(), ProxyError>
where
    W: AsyncWrite + Unpin,
{
    if let Err(failure) = verify_credentials(headers, expected) {
        if let Err(e) = send_auth_required(client).await {
            tracing::debug!("failed to send 407 response: {}", e);
        }
        return Err(failure.into());
    }
    Ok(())
}

pub async fn send_auth_required<W>(client: &mut W) -> tokio::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    client.write_all(PROXY_AUTH_REQUIRED).await?;
    client.flush().await
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
