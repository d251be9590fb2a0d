//! Structured per-call logging.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::{CallContext, Interceptor, Next};
use crate::protocol::{RpcRequest, RpcResponse};

/// Emits one structured record per call completion with method, trace
/// id, duration, and outcome. Severity filtering and the output
/// destination are properties of the subscriber installed at startup
/// (see `crate::logging`), not of this interceptor.
pub struct LoggingInterceptor;

impl LoggingInterceptor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoggingInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn call(&self, ctx: Arc<CallContext>, request: RpcRequest, next: Next) -> RpcResponse {
        let response = next.run(ctx.clone(), request).await;

        let method = ctx.method();
        let trace_id = ctx.trace_id().unwrap_or("-");
        let duration_ms = ctx.elapsed().as_millis() as u64;
        let outcome = response.outcome();

        if outcome == "ok" {
            info!(method, trace_id, duration_ms, outcome, "call completed");
        } else {
            warn!(method, trace_id, duration_ms, outcome, "call failed");
        }

        response
    }
}
