//! Trace-id propagation.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use super::{CallContext, Interceptor, Next};
use crate::protocol::{RpcRequest, RpcResponse};

/// Reads an inbound trace id if present, otherwise generates one, and
/// attaches it to the call context for the rest of the chain. The
/// configured override replaces generation, not propagation: an id the
/// caller sent always survives.
pub struct TraceInterceptor {
    override_id: Option<String>,
}

impl TraceInterceptor {
    pub fn new(override_id: Option<String>) -> Self {
        Self { override_id }
    }
}

#[async_trait]
impl Interceptor for TraceInterceptor {
    async fn call(&self, ctx: Arc<CallContext>, request: RpcRequest, next: Next) -> RpcResponse {
        let trace_id = request
            .trace_id
            .clone()
            .or_else(|| self.override_id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        ctx.set_trace_id(trace_id.clone());

        next.run(ctx, request).await.with_trace_id(trace_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::{CallHandler, InterceptorChain};
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl CallHandler for Echo {
        async fn handle(&self, _ctx: &CallContext, request: RpcRequest) -> RpcResponse {
            RpcResponse::ok(request.id, json!({}))
        }
    }

    fn chain(override_id: Option<String>) -> InterceptorChain {
        InterceptorChain::new(
            vec![Arc::new(TraceInterceptor::new(override_id))],
            Arc::new(Echo),
        )
    }

    #[tokio::test]
    async fn propagates_inbound_trace_id() {
        let ctx = Arc::new(CallContext::new("Name"));
        let request = RpcRequest::new(1, "Name", None).with_trace_id("inbound-7");
        let response = chain(None).execute(ctx.clone(), request).await;
        assert_eq!(ctx.trace_id(), Some("inbound-7"));
        assert_eq!(response.trace_id.as_deref(), Some("inbound-7"));
    }

    #[tokio::test]
    async fn generates_when_absent() {
        let ctx = Arc::new(CallContext::new("Name"));
        let response = chain(None)
            .execute(ctx.clone(), RpcRequest::new(1, "Name", None))
            .await;
        let generated = ctx.trace_id().expect("generated id");
        assert_eq!(response.trace_id.as_deref(), Some(generated));
        assert!(Uuid::parse_str(generated).is_ok());
    }

    #[tokio::test]
    async fn override_replaces_generation_but_not_propagation() {
        let ctx = Arc::new(CallContext::new("Name"));
        chain(Some("fixed".into()))
            .execute(ctx.clone(), RpcRequest::new(1, "Name", None))
            .await;
        assert_eq!(ctx.trace_id(), Some("fixed"));

        let ctx = Arc::new(CallContext::new("Name"));
        let request = RpcRequest::new(2, "Name", None).with_trace_id("inbound");
        chain(Some("fixed".into())).execute(ctx.clone(), request).await;
        assert_eq!(ctx.trace_id(), Some("inbound"));
    }
}
