use std::{future::Future, io, net::SocketAddr, time::Duration};

use tokio::{
    io::{AsyncBufRead, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};

use crate::{error::ProxyError, stream::relay_bidirectional};

pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Dials a `host:port` authority, giving up after `connect_timeout`.
pub async fn dial_target(target: &str, connect_timeout: Duration) -> Result<TcpStream, ProxyError> {
    bounded_dial(target, connect_timeout, TcpStream::connect(target)).await
}

async fn bounded_dial<T, F>(target: &str, connect_timeout: Duration, dial: F) -> Result<T, ProxyError>
where
    F: Future<Output = io::Result<T>>,
{
    match timeout(connect_timeout, dial).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(ProxyError::Dial {
            target: target.to_string(),
            source,
        }),
        Err(_) => Err(ProxyError::DialTimeout {
            target: target.to_string(),
        }),
    }
}

/// Handles `CONNECT target`: dial, acknowledge with 200, then relay raw
/// bytes both ways until each direction has reached end-of-stream.
///
/// `client_reader` may still hold bytes the client pipelined behind the
/// request head; they are forwarded before anything read off the socket.
pub async fn handle_connect<R, W>(
    target: &str,
    client_addr: SocketAddr,
    client_reader: R,
    mut client_writer: W,
    connect_timeout: Duration,
    idle_timeout: Option<Duration>,
) -> Result<(), ProxyError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    tracing::debug!("connecting to {} for {}", target, client_addr);
    let target_stream = dial_target(target, connect_timeout).await?;

    client_writer.write_all(CONNECTION_ESTABLISHED).await?;
    client_writer.flush().await?;

    tracing::info!("Connection established to {} by {}", target, client_addr);

    let label_c2t = format!("C[{}]->T[{}]", client_addr, target);
    let label_t2c = format!("T[{}]->C[{}]", target, client_addr);

    let (target_read, target_write) = target_stream.into_split();
    let outcome = relay_bidirectional(
        (client_reader, client_writer),
        (target_read, target_write),
        (&label_c2t, &label_t2c),
        idle_timeout,
    )
    .await;

    tracing::info!(
        "Closed tunnel {} <-> {} (sent: {}, received: {})",
        client_addr,
        target,
        outcome.sent(),
        outcome.received()
    );

    outcome.into_result()?;
    Ok(())
}
