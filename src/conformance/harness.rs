//! In-process test fixture: plugin service, duplex transport, client.

use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::baseline::PerformanceBaselines;
use crate::capability::PluginHandlers;
use crate::client::RpcClient;
use crate::contract::{methods, GetCapabilitiesResponse, NameResponse, QueryDomain};
use crate::metrics::Metrics;
use crate::service::PluginService;
use crate::transport::spawn_in_process;

const HARNESS_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a check needs: the in-process client, host-side read
/// access to the service metrics, and the plugin facts fetched once at
/// startup.
pub struct TestContext {
    pub client: RpcClient,
    pub metrics: Arc<Metrics>,
    pub identity: NameResponse,
    pub capabilities: Vec<QueryDomain>,
    pub baselines: PerformanceBaselines,
}

impl TestContext {
    pub fn implements(&self, domain: QueryDomain) -> bool {
        self.capabilities.contains(&domain)
    }

    /// A canned, valid request for the given domain's method.
    pub fn fixture(&self, domain: QueryDomain) -> (&'static str, Value) {
        match domain {
            QueryDomain::CustomCosts => (
                methods::GET_CUSTOM_COSTS,
                cost_params(vec!["fixture-node-a".into(), "fixture-node-b".into()], 0),
            ),
            QueryDomain::Recommendations => {
                (methods::GET_RECOMMENDATIONS, json!({"scope": "fixture"}))
            }
            QueryDomain::Budgets => (methods::GET_BUDGETS, json!({"scope": "fixture"})),
            QueryDomain::DryRun => (
                methods::DRY_RUN,
                json!({"method": methods::GET_CUSTOM_COSTS}),
            ),
        }
    }

    /// Methods the performance category measures: the required identity
    /// call plus every implemented optional method.
    pub fn measured_methods(&self) -> Vec<(&'static str, Option<Value>)> {
        let mut methods_out = vec![(methods::NAME, None)];
        for domain in &self.capabilities {
            let (method, params) = self.fixture(*domain);
            methods_out.push((method, Some(params)));
        }
        methods_out
    }
}

/// Cost-query params with a window offset unique to `salt`. Concurrency
/// checks give every in-flight call a distinct window so a response
/// built from another call's state is detectable.
pub fn cost_params(resources: Vec<String>, salt: i64) -> Value {
    let start = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(salt);
    let end = start + chrono::Duration::hours(24);
    json!({"resources": resources, "window": {"start": start, "end": end}})
}

pub struct Harness {
    pub ctx: Arc<TestContext>,
    shutdown: broadcast::Sender<()>,
}

impl Harness {
    /// Builds the service, serves it over an in-memory duplex stream,
    /// and snapshots identity and capabilities through the client.
    pub async fn start(
        handlers: PluginHandlers,
        baselines: PerformanceBaselines,
    ) -> Result<Self, String> {
        let service = PluginService::build(handlers, None)
            .map_err(|e| format!("plugin failed startup validation: {e}"))?;
        let metrics = service.metrics();

        let (io, shutdown) = spawn_in_process(service);
        let client = RpcClient::connect(io).with_request_timeout(HARNESS_REQUEST_TIMEOUT);

        let identity: NameResponse = fetch(&client, methods::NAME).await?;
        let capabilities: GetCapabilitiesResponse =
            fetch(&client, methods::GET_CAPABILITIES).await?;

        Ok(Self {
            ctx: Arc::new(TestContext {
                client,
                metrics,
                identity,
                capabilities: capabilities.capabilities,
                baselines,
            }),
            shutdown,
        })
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.shutdown.send(());
    }
}

async fn fetch<T: serde::de::DeserializeOwned>(
    client: &RpcClient,
    method: &str,
) -> Result<T, String> {
    let value = client
        .call_ok(method, None)
        .await
        .map_err(|e| format!("{method} failed during harness setup: {e}"))?;
    serde_json::from_value(value)
        .map_err(|e| format!("{method} returned an unexpected shape: {e}"))
}
