//! Cross-cutting call interceptors.
//!
//! Interceptors wrap every dispatched call in registration order:
//! interceptor *i* fully controls whether and how interceptor *i+1* and
//! the terminal handler run. Each call gets its own chain invocation, so
//! entry order is strict and exit order is the strict reverse with no
//! cross-call interaction. State interceptors need to share (the trace
//! id, timing) lives on one [`CallContext`] threaded through the chain.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use crate::protocol::{RpcRequest, RpcResponse};

pub mod logging;
pub mod metrics;
pub mod trace;

pub use logging::LoggingInterceptor;
pub use metrics::MetricsInterceptor;
pub use trace::TraceInterceptor;

/// One inbound call. Created by the transport on receipt, dropped after
/// the response is written.
#[derive(Debug)]
pub struct CallContext {
    method: String,
    start: Instant,
    deadline: Option<Instant>,
    trace_id: OnceLock<String>,
}

impl CallContext {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            start: Instant::now(),
            deadline: None,
            trace_id: OnceLock::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(self.start + timeout);
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left before the deadline; `None` when the call carries none.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// First write wins; later writes are ignored so an upstream trace id
    /// survives the whole chain.
    pub fn set_trace_id(&self, trace_id: String) {
        let _ = self.trace_id.set(trace_id);
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.get().map(String::as_str)
    }
}

/// Terminal of the chain: the dispatcher.
#[async_trait]
pub trait CallHandler: Send + Sync + 'static {
    async fn handle(&self, ctx: &CallContext, request: RpcRequest) -> RpcResponse;
}

#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn call(&self, ctx: Arc<CallContext>, request: RpcRequest, next: Next) -> RpcResponse;
}

/// The remainder of the chain from one interceptor's point of view.
pub struct Next {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    index: usize,
    handler: Arc<dyn CallHandler>,
}

impl Next {
    pub fn run(self, ctx: Arc<CallContext>, request: RpcRequest) -> BoxFuture<'static, RpcResponse> {
        Box::pin(async move {
            match self.interceptors.get(self.index).cloned() {
                Some(interceptor) => {
                    let rest = Next {
                        interceptors: self.interceptors.clone(),
                        index: self.index + 1,
                        handler: self.handler.clone(),
                    };
                    interceptor.call(ctx, request, rest).await
                }
                None => self.handler.handle(&ctx, request).await,
            }
        })
    }
}

/// Ordered interceptor pipeline around a terminal handler.
pub struct InterceptorChain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    handler: Arc<dyn CallHandler>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>, handler: Arc<dyn CallHandler>) -> Self {
        Self {
            interceptors: interceptors.into(),
            handler,
        }
    }

    pub async fn execute(&self, ctx: Arc<CallContext>, request: RpcRequest) -> RpcResponse {
        let next = Next {
            interceptors: self.interceptors.clone(),
            index: 0,
            handler: self.handler.clone(),
        };
        next.run(ctx, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
        label: &'static str,
    }

    #[async_trait]
    impl Interceptor for Recorder {
        async fn call(
            &self,
            ctx: Arc<CallContext>,
            request: RpcRequest,
            next: Next,
        ) -> RpcResponse {
            self.log.lock().unwrap().push(format!("{}:enter", self.label));
            let response = next.run(ctx, request).await;
            self.log.lock().unwrap().push(format!("{}:exit", self.label));
            response
        }
    }

    struct Echo;

    #[async_trait]
    impl CallHandler for Echo {
        async fn handle(&self, _ctx: &CallContext, request: RpcRequest) -> RpcResponse {
            RpcResponse::ok(request.id, json!({"method": request.method}))
        }
    }

    #[tokio::test]
    async fn chain_runs_in_registration_order_and_reverse_on_exit() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(
            vec![
                Arc::new(Recorder {
                    log: log.clone(),
                    label: "a",
                }),
                Arc::new(Recorder {
                    log: log.clone(),
                    label: "b",
                }),
            ],
            Arc::new(Echo),
        );

        let ctx = Arc::new(CallContext::new("Name"));
        let response = chain
            .execute(ctx, RpcRequest::new(1, "Name", None))
            .await;
        assert!(response.is_ok());

        let order = log.lock().unwrap().clone();
        assert_eq!(order, vec!["a:enter", "b:enter", "b:exit", "a:exit"]);
    }

    #[tokio::test]
    async fn empty_chain_reaches_handler() {
        let chain = InterceptorChain::new(vec![], Arc::new(Echo));
        let ctx = Arc::new(CallContext::new("Name"));
        let response = chain.execute(ctx, RpcRequest::new(9, "Name", None)).await;
        assert_eq!(response.id, Some(9));
    }

    #[test]
    fn trace_id_first_write_wins() {
        let ctx = CallContext::new("Name");
        ctx.set_trace_id("first".into());
        ctx.set_trace_id("second".into());
        assert_eq!(ctx.trace_id(), Some("first"));
    }

    #[test]
    fn remaining_tracks_deadline() {
        let ctx = CallContext::new("Name").with_timeout(Duration::from_secs(30));
        let remaining = ctx.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(30));
        assert!(remaining > Duration::from_secs(29));
        assert!(CallContext::new("Name").remaining().is_none());
    }
}
