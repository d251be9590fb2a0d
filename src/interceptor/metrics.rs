//! Per-call metrics recording.

use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use super::{CallContext, Interceptor, Next};
use crate::error::RpcError;
use crate::metrics::Metrics;
use crate::protocol::{RpcRequest, RpcResponse};

/// Increments the per-method, per-outcome counter and records the fixed
/// latency histogram. A panic in the rest of the chain is still recorded
/// as a failed outcome and converted into an internal error response,
/// never swallowed. Registered closest to the handler so every other
/// interceptor sees the converted response instead of an unwinding
/// stack.
pub struct MetricsInterceptor {
    metrics: Arc<Metrics>,
}

impl MetricsInterceptor {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[async_trait]
impl Interceptor for MetricsInterceptor {
    async fn call(&self, ctx: Arc<CallContext>, request: RpcRequest, next: Next) -> RpcResponse {
        let method = ctx.method().to_string();
        let request_id = request.id;
        let start = Instant::now();

        let outcome = AssertUnwindSafe(next.run(ctx, request)).catch_unwind().await;
        let duration = start.elapsed();

        match outcome {
            Ok(response) => {
                self.metrics.record_call(&method, response.outcome(), duration);
                response
            }
            Err(payload) => {
                self.metrics.record_call(&method, "panic", duration);
                let err = RpcError::Internal(format!(
                    "handler panicked: {}",
                    panic_message(payload.as_ref())
                ));
                RpcResponse::error(Some(request_id), &err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::{CallHandler, InterceptorChain};
    use serde_json::json;
    use std::time::Duration;

    struct Echo;

    #[async_trait]
    impl CallHandler for Echo {
        async fn handle(&self, _ctx: &CallContext, request: RpcRequest) -> RpcResponse {
            RpcResponse::ok(request.id, json!({}))
        }
    }

    struct Panicking;

    #[async_trait]
    impl CallHandler for Panicking {
        async fn handle(&self, _ctx: &CallContext, _request: RpcRequest) -> RpcResponse {
            panic!("boom");
        }
    }

    struct Failing;

    #[async_trait]
    impl CallHandler for Failing {
        async fn handle(&self, _ctx: &CallContext, request: RpcRequest) -> RpcResponse {
            RpcResponse::error(Some(request.id), &RpcError::Unimplemented("budgets".into()))
        }
    }

    #[tokio::test]
    async fn records_ok_outcome_and_latency() {
        let metrics = Arc::new(Metrics::new());
        let chain = InterceptorChain::new(
            vec![Arc::new(MetricsInterceptor::new(metrics.clone()))],
            Arc::new(Echo),
        );
        let ctx = Arc::new(CallContext::new("Name"));
        chain.execute(ctx, RpcRequest::new(1, "Name", None)).await;

        assert_eq!(metrics.call_count("Name", "ok"), 1);
    }

    #[tokio::test]
    async fn records_error_outcome() {
        let metrics = Arc::new(Metrics::new());
        let chain = InterceptorChain::new(
            vec![Arc::new(MetricsInterceptor::new(metrics.clone()))],
            Arc::new(Failing),
        );
        let ctx = Arc::new(CallContext::new("GetBudgets"));
        chain
            .execute(ctx, RpcRequest::new(1, "GetBudgets", None))
            .await;

        assert_eq!(metrics.call_count("GetBudgets", "unimplemented"), 1);
        assert_eq!(metrics.call_count("GetBudgets", "ok"), 0);
    }

    #[tokio::test]
    async fn panic_is_recorded_and_converted_not_swallowed() {
        let metrics = Arc::new(Metrics::new());
        let chain = InterceptorChain::new(
            vec![Arc::new(MetricsInterceptor::new(metrics.clone()))],
            Arc::new(Panicking),
        );
        let ctx = Arc::new(CallContext::new("GetCustomCosts"));
        let response = chain
            .execute(ctx, RpcRequest::new(4, "GetCustomCosts", None))
            .await;

        assert_eq!(metrics.call_count("GetCustomCosts", "panic"), 1);
        let body = response.error.expect("error body");
        assert!(body.message.contains("boom"));
        assert_eq!(response.id, Some(4));
    }

    #[tokio::test]
    async fn burst_of_m_calls_counts_exactly_m() {
        let metrics = Arc::new(Metrics::new());
        let chain = Arc::new(InterceptorChain::new(
            vec![Arc::new(MetricsInterceptor::new(metrics.clone()))],
            Arc::new(Echo),
        ));

        let m: u64 = 50;
        let mut handles = Vec::new();
        for i in 0..m {
            let chain = chain.clone();
            handles.push(tokio::spawn(async move {
                let ctx = Arc::new(
                    CallContext::new("Name").with_timeout(Duration::from_secs(5)),
                );
                chain.execute(ctx, RpcRequest::new(i, "Name", None)).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(metrics.call_count("Name", "ok"), m);
    }
}
