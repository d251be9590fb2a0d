//! Capability-gated method dispatch.
//!
//! The dispatcher is the terminal handler of the interceptor chain. It
//! routes a validated call to the matching capability handler, answers
//! the required identity/support-check/introspection methods itself, and
//! returns the standardized unimplemented signal for optional
//! capabilities the plugin did not register. Capability detection runs
//! once at construction; the cached set is read-only afterwards and safe
//! for any number of concurrent readers.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

use crate::capability::{CapabilitySet, PluginHandlers, PluginIdentity};
use crate::contract::{self, methods, QueryDomain};
use crate::error::{ConfigError, RpcError};
use crate::interceptor::{CallContext, CallHandler};
use crate::protocol::{RpcRequest, RpcResponse};

/// Default per-call deadline applied when the transport did not set one.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Dispatcher {
    handlers: PluginHandlers,
    identity: PluginIdentity,
    capabilities: CapabilitySet,
}

impl Dispatcher {
    /// Validates the required surface and memoizes the capability set.
    /// An invalid identity is a fatal configuration error here, at
    /// startup, not a runtime response.
    pub fn new(handlers: PluginHandlers) -> Result<Self, ConfigError> {
        let identity = handlers.core.identity();
        validate_identity(&identity)?;
        let capabilities = CapabilitySet::from_handlers(&handlers);
        Ok(Self {
            handlers,
            identity,
            capabilities,
        })
    }

    pub fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    async fn dispatch(&self, ctx: &CallContext, request: &RpcRequest) -> Result<Value, RpcError> {
        request.validate()?;
        let params = request.params.clone();

        match request.method.as_str() {
            methods::NAME => {
                let _req: contract::NameRequest = decode_or_default(params)?;
                encode(contract::NameResponse {
                    name: self.identity.name.clone(),
                    version: self.identity.version_string(),
                })
            }
            methods::SUPPORTS => {
                let req: contract::SupportsRequest = decode(params)?;
                encode(contract::SupportsResponse {
                    supported: self.handlers.core.supports(req.domain),
                })
            }
            methods::GET_CAPABILITIES => {
                let _req: contract::GetCapabilitiesRequest = decode_or_default(params)?;
                encode(contract::GetCapabilitiesResponse {
                    capabilities: self.capabilities.domains().to_vec(),
                })
            }
            methods::GET_CUSTOM_COSTS => match &self.handlers.custom_costs {
                Some(handler) => {
                    let req: contract::CustomCostRequest = decode(params)?;
                    let resp = with_deadline(ctx, handler.get_custom_costs(ctx, req)).await??;
                    encode(resp)
                }
                None => Err(unimplemented(QueryDomain::CustomCosts)),
            },
            methods::GET_RECOMMENDATIONS => match &self.handlers.recommendations {
                Some(handler) => {
                    let req: contract::RecommendationRequest = decode(params)?;
                    let resp = with_deadline(ctx, handler.get_recommendations(ctx, req)).await??;
                    encode(resp)
                }
                None => Err(unimplemented(QueryDomain::Recommendations)),
            },
            methods::GET_BUDGETS => match &self.handlers.budgets {
                Some(handler) => {
                    let req: contract::BudgetRequest = decode(params)?;
                    let resp = with_deadline(ctx, handler.get_budgets(ctx, req)).await??;
                    encode(resp)
                }
                None => Err(unimplemented(QueryDomain::Budgets)),
            },
            methods::DRY_RUN => match &self.handlers.dry_run {
                Some(handler) => {
                    let req: contract::DryRunRequest = decode(params)?;
                    let resp = with_deadline(ctx, handler.dry_run(ctx, req)).await??;
                    encode(resp)
                }
                None => Err(unimplemented(QueryDomain::DryRun)),
            },
            other => Err(RpcError::MethodNotFound(other.to_string())),
        }
    }
}

#[async_trait]
impl CallHandler for Dispatcher {
    async fn handle(&self, ctx: &CallContext, request: RpcRequest) -> RpcResponse {
        let id = request.id;
        match self.dispatch(ctx, &request).await {
            Ok(result) => RpcResponse::ok(id, result),
            Err(err) => RpcResponse::error(Some(id), &err),
        }
    }
}

fn validate_identity(identity: &PluginIdentity) -> Result<(), ConfigError> {
    if identity.name.is_empty() {
        return Err(ConfigError::InvalidIdentity("plugin name is empty".into()));
    }
    if !identity.version.pre.is_empty() || !identity.version.build.is_empty() {
        return Err(ConfigError::InvalidIdentity(format!(
            "version 'v{}' carries pre-release or build metadata",
            identity.version
        )));
    }
    Ok(())
}

fn unimplemented(domain: QueryDomain) -> RpcError {
    RpcError::Unimplemented(domain.as_str().to_string())
}

/// Bounds the capability handler by the call deadline. The timeout
/// aborts this call only and surfaces as a timeout-class error.
async fn with_deadline<F, T>(ctx: &CallContext, fut: F) -> Result<Result<T, RpcError>, RpcError>
where
    F: Future<Output = Result<T, RpcError>>,
{
    let remaining = ctx.remaining().unwrap_or(DEFAULT_CALL_TIMEOUT);
    tokio::time::timeout(remaining, fut)
        .await
        .map_err(|_| RpcError::DeadlineExceeded)
}

fn decode<T: DeserializeOwned>(params: Option<Value>) -> Result<T, RpcError> {
    let value = params.ok_or_else(|| RpcError::InvalidArgument("missing params".into()))?;
    serde_json::from_value(value).map_err(|e| RpcError::InvalidArgument(e.to_string()))
}

fn decode_or_default<T: DeserializeOwned + Default>(params: Option<Value>) -> Result<T, RpcError> {
    match params {
        None => Ok(T::default()),
        Some(value) => {
            serde_json::from_value(value).map_err(|e| RpcError::InvalidArgument(e.to_string()))
        }
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::Internal(e.to_string()))
}
