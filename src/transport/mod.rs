//! Connection serving over any byte duplex.
//!
//! Frames are newline-delimited JSON. Each parsed request runs in its
//! own task so one slow call never blocks the connection; responses are
//! funneled through a single writer task. The same loop serves real TCP
//! streams and the in-memory duplex the conformance suite uses in place
//! of a socket.

use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::debug;

use crate::protocol::{RpcRequest, RpcResponse};
use crate::service::PluginService;

pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

const IN_PROCESS_BUFFER: usize = 64 * 1024;

pub async fn serve_connection<S>(
    io: S,
    service: Arc<PluginService>,
    mut shutdown: broadcast::Receiver<()>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let framed = Framed::new(io, LinesCodec::new_with_max_length(MAX_FRAME_BYTES));
    let (mut sink, mut stream) = framed.split();
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if sink.send(line).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            frame = stream.next() => match frame {
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<RpcRequest>(&line) {
                        Ok(request) => {
                            let service = service.clone();
                            let tx = tx.clone();
                            tokio::spawn(async move {
                                let response = service.handle(request).await;
                                if let Ok(json) = serde_json::to_string(&response) {
                                    let _ = tx.send(json).await;
                                }
                            });
                        }
                        Err(e) => {
                            // A malformed frame is the caller's error,
                            // never a reason to drop the connection.
                            let response =
                                RpcResponse::parse_error(format!("invalid request frame: {e}"));
                            if let Ok(json) = serde_json::to_string(&response) {
                                let _ = tx.send(json).await;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    debug!("connection codec error: {e}");
                    break;
                }
                None => break,
            }
        }
    }

    drop(tx);
    let _ = writer.await;
}

/// In-process client/server pair over an in-memory duplex stream. Stands
/// in for the network socket so callers never contend on a port; the
/// returned sender cancels the serving task.
pub fn spawn_in_process(service: Arc<PluginService>) -> (DuplexStream, broadcast::Sender<()>) {
    let (client_io, server_io) = tokio::io::duplex(IN_PROCESS_BUFFER);
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(serve_connection(server_io, service, shutdown_rx));
    (client_io, shutdown_tx)
}
