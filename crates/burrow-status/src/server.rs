//! TCP accept loop for the status API.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use crate::http::{self, Response};
use crate::routes;
use crate::store::StatusStore;

/// Most connections served at once; extra ones are dropped.
const MAX_CONNECTIONS: usize = 64;

/// Time allowed for a client to send its whole request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Serves requests on `listener` until the task is cancelled.
///
/// # Errors
///
/// Never returns under normal operation; accept errors are logged and
/// the loop continues.
pub async fn serve(listener: TcpListener, store: Arc<StatusStore>) -> std::io::Result<()> {
    let connections = Arc::new(AtomicUsize::new(0));
    tracing::info!(addr = %listener.local_addr()?, "status server listening");

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "failed to accept connection");
                continue;
            }
        };
        if connections.load(Ordering::Relaxed) >= MAX_CONNECTIONS {
            tracing::warn!(addr = %addr, max = MAX_CONNECTIONS, "connection rejected: limit reached");
            continue;
        }

        tracing::debug!(addr = %addr, "connection accepted");
        let store = Arc::clone(&store);
        let counter = Arc::clone(&connections);
        let _ = counter.fetch_add(1, Ordering::Relaxed);
        drop(tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &store).await {
                tracing::debug!(error = %e, "connection error");
            }
            let _ = counter.fetch_sub(1, Ordering::Relaxed);
        }));
    }
}

async fn handle_connection(stream: TcpStream, store: &StatusStore) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let response = match tokio::time::timeout(REQUEST_TIMEOUT, http::read_request(&mut reader)).await {
        Ok(Ok(None)) => return Ok(()),
        Ok(Ok(Some(request))) => {
            let response = routes::handle(&request, store);
            tracing::debug!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                "request handled"
            );
            response
        }
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "bad request");
            e.to_response()
        }
        Err(_) => Response::error(408, "Request timed out"),
    };

    writer.write_all(&response.to_bytes()).await?;
    writer.flush().await?;
    writer.shutdown().await
}
