//! Async client for the native transport.
//!
//! Correlates responses to in-flight calls by request id, so any number
//! of calls can share one connection concurrently. The conformance
//! harness drives plugins through this client over the in-process
//! duplex transport.

use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{Framed, LinesCodec};
use tracing::debug;

use crate::error::{PluginError, Result, RpcError, TransportError};
use crate::protocol::{RpcRequest, RpcResponse};
use crate::transport::MAX_FRAME_BYTES;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct RpcClient {
    tx: mpsc::Sender<String>,
    pending: Arc<DashMap<u64, oneshot::Sender<RpcResponse>>>,
    next_id: Arc<AtomicU64>,
    request_timeout: Duration,
}

impl RpcClient {
    pub fn connect<S>(io: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let framed = Framed::new(io, LinesCodec::new_with_max_length(MAX_FRAME_BYTES));
        let (mut sink, mut stream) = framed.split();
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let pending: Arc<DashMap<u64, oneshot::Sender<RpcResponse>>> = Arc::new(DashMap::new());

        tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if sink.send(line).await.is_err() {
                    break;
                }
            }
        });

        let reader_pending = pending.clone();
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let Ok(line) = frame else { break };
                match serde_json::from_str::<RpcResponse>(&line) {
                    Ok(response) => {
                        let Some(id) = response.id else {
                            debug!("dropping response without id");
                            continue;
                        };
                        if let Some((_, waiter)) = reader_pending.remove(&id) {
                            let _ = waiter.send(response);
                        }
                    }
                    Err(e) => debug!("dropping unparseable response frame: {e}"),
                }
            }
            // Connection gone: wake every waiter with a closed channel.
            reader_pending.clear();
        });

        Self {
            tx,
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<RpcResponse> {
        self.call_traced(method, params, None).await
    }

    pub async fn call_traced(
        &self,
        method: &str,
        params: Option<Value>,
        trace_id: Option<String>,
    ) -> Result<RpcResponse> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (waiter_tx, waiter_rx) = oneshot::channel();
        self.pending.insert(id, waiter_tx);

        let mut request = RpcRequest::new(id, method, params);
        if let Some(trace_id) = trace_id {
            request = request.with_trace_id(trace_id);
        }
        let line = serde_json::to_string(&request)?;
        if self.tx.send(line).await.is_err() {
            self.pending.remove(&id);
            return Err(TransportError::Closed.into());
        }

        match tokio::time::timeout(self.request_timeout, waiter_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(TransportError::Closed.into()),
            Err(_) => {
                self.pending.remove(&id);
                Err(PluginError::Rpc(RpcError::DeadlineExceeded))
            }
        }
    }

    /// Like [`call`], but unwraps the result payload and maps an error
    /// response to its typed [`RpcError`].
    pub async fn call_ok(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let response = self.call(method, params).await?;
        match response.error {
            Some(body) => Err(PluginError::Rpc(RpcError::from_code(body.code, body.message))),
            None => Ok(response.result.unwrap_or(Value::Null)),
        }
    }
}
