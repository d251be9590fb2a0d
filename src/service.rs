//! The assembled plugin service: dispatcher wrapped in the interceptor
//! chain, plus the process-scoped metrics it reports into. One instance
//! serves every transport (TCP listener, gateway, in-process pair).

use std::sync::Arc;
use std::time::Duration;

use crate::capability::{CapabilitySet, PluginHandlers, PluginIdentity};
use crate::dispatch::{Dispatcher, DEFAULT_CALL_TIMEOUT};
use crate::error::ConfigError;
use crate::interceptor::{
    CallContext, InterceptorChain, LoggingInterceptor, MetricsInterceptor, TraceInterceptor,
};
use crate::metrics::Metrics;
use crate::protocol::{RpcRequest, RpcResponse};

pub struct PluginService {
    chain: InterceptorChain,
    metrics: Arc<Metrics>,
    identity: PluginIdentity,
    capabilities: CapabilitySet,
    call_timeout: Duration,
}

impl PluginService {
    /// Builds the chain in its canonical order: trace enrichment first,
    /// logging next, metrics closest to the dispatcher so a panic is
    /// converted before the logging interceptor observes the outcome.
    pub fn build(
        handlers: PluginHandlers,
        trace_id_override: Option<String>,
    ) -> Result<Arc<Self>, ConfigError> {
        let dispatcher = Arc::new(Dispatcher::new(handlers)?);
        let identity = dispatcher.identity().clone();
        let capabilities = dispatcher.capabilities().clone();
        let metrics = Arc::new(Metrics::new());

        let chain = InterceptorChain::new(
            vec![
                Arc::new(TraceInterceptor::new(trace_id_override)),
                Arc::new(LoggingInterceptor::new()),
                Arc::new(MetricsInterceptor::new(metrics.clone())),
            ],
            dispatcher,
        );

        Ok(Arc::new(Self {
            chain,
            metrics,
            identity,
            capabilities,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }))
    }

    pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
        let ctx =
            Arc::new(CallContext::new(request.method.as_str()).with_timeout(self.call_timeout));
        self.chain.execute(ctx, request).await
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    pub fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }
}
