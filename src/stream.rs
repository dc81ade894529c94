use std::{io, time::Duration};

use byte_pool::BytePool;
use lazy_static::lazy_static;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::timeout,
};

const RELAY_BUFFER_SIZE: usize = 16 * 1024;

lazy_static! {
    static ref BUFFER_POOL: BytePool::<Vec<u8>> = BytePool::<Vec<u8>>::new();
}

/// One direction of a relay: everything read from `read` is written to
/// `write`, then the write side is shut down.
pub struct Pump<R, W> {
    read: R,
    write: W,
    idle_timeout: Option<Duration>,
}

impl<R, W> Pump<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(read: R, write: W) -> Self {
        Self {
            read,
            write,
            idle_timeout: None,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Copies until end-of-stream on the read side. Half-closes the write
    /// side afterwards so the peer sees end-of-stream too.
    pub async fn run(mut self, label: &str) -> io::Result<u64> {
        let mut buf = BUFFER_POOL.alloc(RELAY_BUFFER_SIZE);
        buf.resize(RELAY_BUFFER_SIZE, 0);
        let mut total = 0;

        loop {
            let n = match self.idle_timeout {
                Some(idle) => timeout(idle, self.read.read(&mut buf[..]))
                    .await
                    .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "relay idle timeout"))??,
                None => self.read.read(&mut buf[..]).await?,
            };
            if n == 0 {
                break;
            }

            tracing::trace!("{} - {} bytes", label, n);

            self.write.write_all(&buf[..n]).await?;
            total += n as u64;
        }

        self.write.flush().await?;
        self.write.shutdown().await?;
        Ok(total)
    }
}

/// Result of both relay directions. Each direction reports independently;
/// an error in one never cuts the other short.
#[derive(Debug)]
pub struct RelayOutcome {
    pub client_to_origin: io::Result<u64>,
    pub origin_to_client: io::Result<u64>,
}

impl RelayOutcome {
    pub fn sent(&self) -> u64 {
        *self.client_to_origin.as_ref().unwrap_or(&0)
    }

    pub fn received(&self) -> u64 {
        *self.origin_to_client.as_ref().unwrap_or(&0)
    }

    /// Both byte counts, or the first error either direction hit.
    pub fn into_result(self) -> io::Result<(u64, u64)> {
        Ok((self.client_to_origin?, self.origin_to_client?))
    }
}

/// Pumps client -> origin and origin -> client concurrently and waits for
/// both to finish.
pub async fn relay_bidirectional<CR, CW, OR, OW>(
    client: (CR, CW),
    origin: (OR, OW),
    labels: (&str, &str),
    idle_timeout: Option<Duration>,
) -> RelayOutcome
where
    CR: AsyncRead + Unpin,
    CW: AsyncWrite + Unpin,
    OR: AsyncRead + Unpin,
    OW: AsyncWrite + Unpin,
{
    let upstream = Pump::new(client.0, origin.1).with_idle_timeout(idle_timeout);
    let downstream = Pump::new(origin.0, client.1).with_idle_timeout(idle_timeout);

    let (client_to_origin, origin_to_client) =
        tokio::join!(upstream.run(labels.0), downstream.run(labels.1));

    for (label, result) in [(labels.0, &client_to_origin), (labels.1, &origin_to_client)] {
        match result {
            Ok(n) => tracing::debug!("{} finished after {} bytes", label, n),
            Err(e) => tracing::debug!("{} ended with error: {}", label, e),
        }
    }

    RelayOutcome {
        client_to_origin,
        origin_to_client,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, empty, sink, AsyncReadExt};

    #[tokio::test]
    async fn pump_empty_stream() {
        let copied = Pump::new(empty(), sink()).run("test").await.unwrap();
        assert_eq!(copied, 0);
    }

    #[tokio::test]
    async fn pump_copies_and_half_closes() {
        let payload: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
        let (mut out_reader, out_writer) = duplex(4096);

        let input = payload.clone();
        let pump = tokio::spawn(async move { Pump::new(&input[..], out_writer).run("test").await });

        let mut received = Vec::new();
        // read_to_end only returns once the pump shut its write side down
        out_reader.read_to_end(&mut received).await.unwrap();

        assert_eq!(pump.await.unwrap().unwrap(), payload.len() as u64);
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn pump_idle_timeout() {
        let (_keep_open, idle_reader) = duplex(64);
        let err = Pump::new(idle_reader, sink())
            .with_idle_timeout(Some(Duration::from_millis(50)))
            .run("test")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn relay_waits_for_both_directions() {
        // client side finishes instantly, origin side keeps streaming afterwards
        let (mut origin_feed, origin_read) = duplex(1024);
        let (mut client_out, client_write) = duplex(1024);

        let relay = tokio::spawn(async move {
            relay_bidirectional(
                (empty(), client_write),
                (origin_read, sink()),
                ("c2o", "o2c"),
                None,
            )
            .await
        });

        let feeder = tokio::spawn(async move {
            for _ in 0..10 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                origin_feed.write_all(b"late bytes ").await.unwrap();
            }
        });

        let mut received = Vec::new();
        client_out.read_to_end(&mut received).await.unwrap();
        feeder.await.unwrap();

        let outcome = relay.await.unwrap();
        assert_eq!(outcome.sent(), 0);
        assert_eq!(outcome.received(), 110);
        assert_eq!(outcome.into_result().unwrap(), (0, 110));
        assert_eq!(received, b"late bytes ".repeat(10));
    }
}
