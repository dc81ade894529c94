//! Access log: one line per authenticated request, appended to a file and
//! mirrored to the console.
//!
//! Connections hand [`LogEvent`]s to a single writer task over a bounded
//! channel, so request handling never waits on file I/O.

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::mpsc,
    task::JoinHandle,
};

const ACCESS_LOG_CHANNEL_SIZE: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub timestamp: DateTime<Local>,
    pub client_addr: SocketAddr,
    pub method: String,
    pub target: String,
}

impl LogEvent {
    pub fn now(client_addr: SocketAddr, method: &str, target: &str) -> Self {
        Self {
            timestamp: Local::now(),
            client_addr,
            method: method.to_string(),
            target: target.to_string(),
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "[{}] {} {} {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.client_addr,
            self.method,
            self.target
        )
    }
}

/// Cheap, clonable handle to the access log writer.
#[derive(Debug, Clone)]
pub struct AccessLog {
    tx: mpsc::Sender<LogEvent>,
}

impl AccessLog {
    /// Starts the writer task appending to `path`.
    pub fn spawn(path: PathBuf) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(ACCESS_LOG_CHANNEL_SIZE);
        let handle = tokio::spawn(run_writer(rx, path));
        (Self { tx }, handle)
    }

    /// Handle backed by a caller-owned receiver.
    pub fn from_sender(tx: mpsc::Sender<LogEvent>) -> Self {
        Self { tx }
    }

    pub fn record(&self, event: LogEvent) {
        if let Err(e) = self.tx.try_send(event) {
            tracing::warn!("dropping access log event: {}", e);
        }
    }
}

async fn run_writer(mut rx: mpsc::Receiver<LogEvent>, path: PathBuf) {
    let mut file: Option<File> = None;

    while let Some(event) = rx.recv().await {
        let line = event.to_line();
        tracing::info!(target: "access", "{}", line);

        if file.is_none() {
            file = match open_log_file(&path).await {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::error!("failed to open access log {}: {}", path.display(), e);
                    continue;
                }
            };
        }

        if let Some(f) = file.as_mut() {
            let mut bytes = line.into_bytes();
            bytes.push(b'\n');
            let written = async {
                f.write_all(&bytes).await?;
                f.flush().await
            }
            .await;
            if let Err(e) = written {
                tracing::error!("failed to write access log {}: {}", path.display(), e);
                // reopen on the next event
                file = None;
            }
        }
    }
}

async fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
}
