use std::{net::SocketAddr, time::Duration};

use anyhow::Context;
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    access_log::LogEvent,
    app_state::AppState,
    error::ProxyError,
    proxy::{
        auth, forward,
        request::{parse_request, InboundRequest},
        tunnel,
    },
};

/// Binds `addr` and serves connections until the process exits.
/// Failing to bind is the only fatal error.
pub async fn run_proxy_server(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind proxy listener on {}", addr))?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    serve(listener, state).await;
    Ok(())
}

/// Accept loop. Each connection gets its own task; accept errors are
/// logged and the loop keeps going.
pub async fn serve(listener: TcpListener, state: AppState) {
    loop {
        match listener.accept().await {
            Ok((client_stream, client_addr)) => {
                let state = state.clone();
                tokio::spawn(async move {
                    handle_client(client_stream, client_addr, state).await;
                });
            }
            Err(e) => {
                tracing::warn!("failed to accept connection: {}", e);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

/// Drives one client connection from request head to the end of the relay.
///
/// The socket halves are owned by this call chain, so the connection is
/// closed on every exit path, unwinding included.
pub async fn handle_client(client_stream: TcpStream, client_addr: SocketAddr, state: AppState) {
    let span = tracing::info_span!("conn", id = %Uuid::new_v4(), client = %client_addr);

    async move {
        match process_client(client_stream, client_addr, &state).await {
            Ok(()) => tracing::debug!("connection finished"),
            Err(e) => log_failure(&e, client_addr),
        }
    }
    .instrument(span)
    .await
}

async fn process_client(
    client_stream: TcpStream,
    client_addr: SocketAddr,
    state: &AppState,
) -> Result<(), ProxyError> {
    let (read_half, mut write_half) = client_stream.into_split();

    let request = parse_request(BufReader::new(read_half)).await?;
    auth::authenticate(&request.headers, &state.credentials, &mut write_half).await?;

    state
        .access_log
        .record(LogEvent::now(client_addr, &request.method, &request.target));

    let is_connect = request.is_connect();
    let InboundRequest {
        method,
        target,
        headers,
        reader,
    } = request;

    if is_connect {
        tunnel::handle_connect(
            &target,
            client_addr,
            reader,
            write_half,
            state.connect_timeout,
            state.idle_timeout,
        )
        .await
    } else {
        forward::handle_forward(
            &method,
            &target,
            &headers,
            client_addr,
            reader,
            write_half,
            state.idle_timeout,
        )
        .await
    }
}

fn log_failure(error: &ProxyError, client_addr: SocketAddr) {
    match error {
        ProxyError::MalformedRequest(_) | ProxyError::HeadersTooLarge(_) => {
            tracing::debug!("dropping {}: {}", client_addr, error)
        }
        ProxyError::Unauthorized(_) => {
            tracing::warn!("rejected {}: {}", client_addr, error)
        }
        ProxyError::InvalidTarget { .. } | ProxyError::Dial { .. } | ProxyError::DialTimeout { .. } => {
            tracing::warn!("upstream unavailable for {}: {}", client_addr, error)
        }
        ProxyError::Io(_) => tracing::debug!("relay for {} ended: {}", client_addr, error),
    }
}
