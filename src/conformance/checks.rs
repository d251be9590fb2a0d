//! Built-in conformance checks.
//!
//! Each check returns `Ok(())` or a failure message; the suite handles
//! timeouts and panics at the execution boundary. Checks talk to the
//! plugin exclusively through the in-process client, so they exercise
//! the full envelope path a remote caller would.

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::harness::{cost_params, TestContext};
use super::ConformanceLevel;
use crate::capability::PluginIdentity;
use crate::contract::{methods, GetCapabilitiesResponse, QueryDomain, SupportsResponse};
use crate::protocol::RpcResponse;

const SEQUENTIAL_SAMPLES: usize = 10;
const BASELINE_SAMPLES: u32 = 5;

/// Concurrent mean latency above `sequential_mean * FACTOR + 100ms` is
/// treated as pathological.
const PATHOLOGICAL_FACTOR: u32 = 20;

pub(super) async fn identity_is_strict_semver(ctx: Arc<TestContext>) -> Result<(), String> {
    PluginIdentity::new(ctx.identity.name.as_str(), &ctx.identity.version)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

pub(super) async fn supports_agrees_with_capabilities(
    ctx: Arc<TestContext>,
) -> Result<(), String> {
    for domain in QueryDomain::all() {
        let response = ctx
            .client
            .call_ok(methods::SUPPORTS, Some(json!({"domain": domain})))
            .await
            .map_err(|e| format!("Supports({domain}) failed: {e}"))?;
        let supports: SupportsResponse = serde_json::from_value(response)
            .map_err(|e| format!("Supports({domain}) returned an unexpected shape: {e}"))?;
        let implemented = ctx.implements(*domain);
        if supports.supported != implemented {
            return Err(format!(
                "Supports({domain}) answered {} but the capability set says {}",
                supports.supported, implemented
            ));
        }
    }
    Ok(())
}

pub(super) async fn capability_introspection_is_stable(
    ctx: Arc<TestContext>,
) -> Result<(), String> {
    let response = ctx
        .client
        .call_ok(methods::GET_CAPABILITIES, None)
        .await
        .map_err(|e| format!("GetCapabilities failed: {e}"))?;
    let caps: GetCapabilitiesResponse = serde_json::from_value(response)
        .map_err(|e| format!("GetCapabilities returned an unexpected shape: {e}"))?;

    let unique: HashSet<_> = caps.capabilities.iter().collect();
    if unique.len() != caps.capabilities.len() {
        return Err("GetCapabilities listed a capability twice".into());
    }

    let snapshot: HashSet<_> = ctx.capabilities.iter().collect();
    let now: HashSet<_> = caps.capabilities.iter().collect();
    if snapshot != now {
        return Err(format!(
            "capability set changed between calls: startup {:?}, now {:?}",
            ctx.capabilities, caps.capabilities
        ));
    }
    Ok(())
}

pub(super) async fn required_methods_respond(ctx: Arc<TestContext>) -> Result<(), String> {
    let name = ctx
        .client
        .call_ok(methods::NAME, None)
        .await
        .map_err(|e| format!("Name failed: {e}"))?;
    if name["name"].as_str().map_or(true, str::is_empty) {
        return Err("Name returned an empty plugin name".into());
    }

    for domain in QueryDomain::all() {
        ctx.client
            .call_ok(methods::SUPPORTS, Some(json!({"domain": domain})))
            .await
            .map_err(|e| format!("Supports({domain}) failed: {e}"))?;
    }
    Ok(())
}

pub(super) async fn absent_capabilities_return_unimplemented(
    ctx: Arc<TestContext>,
) -> Result<(), String> {
    for domain in QueryDomain::all() {
        if ctx.implements(*domain) {
            continue;
        }
        let (method, params) = ctx.fixture(*domain);
        let response = ctx
            .client
            .call(method, Some(params))
            .await
            .map_err(|e| format!("{method} transport failure: {e}"))?;
        expect_error_code(&response, method, -32001)?;
    }
    Ok(())
}

pub(super) async fn unknown_method_is_client_error(ctx: Arc<TestContext>) -> Result<(), String> {
    let response = ctx
        .client
        .call("NoSuchMethod", None)
        .await
        .map_err(|e| format!("transport failure: {e}"))?;
    expect_error_code(&response, "NoSuchMethod", -32601)
}

pub(super) async fn malformed_params_are_client_error(
    ctx: Arc<TestContext>,
) -> Result<(), String> {
    let response = ctx
        .client
        .call(methods::SUPPORTS, Some(json!({"domain": 42})))
        .await
        .map_err(|e| format!("transport failure: {e}"))?;
    expect_error_code(&response, methods::SUPPORTS, -32602)
}

pub(super) async fn trace_id_round_trips(ctx: Arc<TestContext>) -> Result<(), String> {
    let trace_id = "conformance-trace-fixed";
    let response = ctx
        .client
        .call_traced(methods::NAME, None, Some(trace_id.to_string()))
        .await
        .map_err(|e| format!("transport failure: {e}"))?;
    match response.trace_id.as_deref() {
        Some(echoed) if echoed == trace_id => Ok(()),
        Some(echoed) => Err(format!(
            "trace id was not propagated: sent '{trace_id}', got '{echoed}'"
        )),
        None => Err("response carried no trace id".into()),
    }
}

/// N sequential calls per measured method; the maximum observed latency
/// must stay under the baseline threshold for the given level.
pub(super) async fn sequential_latency(
    ctx: Arc<TestContext>,
    level: ConformanceLevel,
) -> Result<(), String> {
    let mut violations = Vec::new();
    for (method, params) in ctx.measured_methods() {
        let mut max = Duration::ZERO;
        for _ in 0..SEQUENTIAL_SAMPLES {
            let start = Instant::now();
            let response = ctx
                .client
                .call(method, params.clone())
                .await
                .map_err(|e| format!("{method} transport failure: {e}"))?;
            if !response.is_ok() {
                return Err(format!("{method} failed during measurement"));
            }
            max = max.max(start.elapsed());
        }
        let threshold = ctx.baselines.threshold(method, level);
        if max > threshold {
            violations.push(format!(
                "{method}: max {}ms exceeds {} threshold {}ms",
                max.as_millis(),
                level,
                threshold.as_millis()
            ));
        }
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations.join("; "))
    }
}

/// M concurrent calls against the one plugin instance. Asserts every
/// response is well-formed and belongs to its own request, that the
/// per-method counters moved by exactly M, and that aggregate latency
/// did not collapse versus the sequential baseline.
pub(super) async fn concurrent_burst(ctx: Arc<TestContext>, m: usize) -> Result<(), String> {
    let use_costs = ctx.implements(QueryDomain::CustomCosts);
    let method = if use_costs {
        methods::GET_CUSTOM_COSTS
    } else {
        methods::NAME
    };
    let params_for = |salt: usize| {
        use_costs.then(|| cost_params(vec![format!("burst-{salt}")], salt as i64))
    };

    // Sequential baseline for the regression comparison.
    let mut sequential_total = Duration::ZERO;
    for i in 0..BASELINE_SAMPLES {
        let start = Instant::now();
        let response = ctx
            .client
            .call(method, params_for(i as usize + 100_000))
            .await
            .map_err(|e| format!("{method} transport failure: {e}"))?;
        if !response.is_ok() {
            return Err(format!("{method} failed during sequential baseline"));
        }
        sequential_total += start.elapsed();
    }
    let sequential_mean = sequential_total / BASELINE_SAMPLES;

    let counted_before = ctx.metrics.call_count(method, "ok");

    let mut tasks = Vec::with_capacity(m);
    for i in 0..m {
        let client = ctx.client.clone();
        let params = params_for(i);
        tasks.push(tokio::spawn(async move {
            let start = Instant::now();
            let response = client.call(method, params).await;
            (i, response, start.elapsed())
        }));
    }

    let mut latency_total = Duration::ZERO;
    for task in tasks {
        let (i, response, took) = task
            .await
            .map_err(|e| format!("burst task panicked: {e}"))?;
        let response = response.map_err(|e| format!("call {i} transport failure: {e}"))?;
        if !response.is_well_formed() {
            return Err(format!("call {i} returned a malformed response"));
        }
        if !response.is_ok() {
            return Err(format!(
                "call {i} failed: {}",
                response.error.map(|e| e.message).unwrap_or_default()
            ));
        }
        if use_costs {
            verify_own_window(i, &response)?;
        }
        latency_total += took;
    }

    let counted_after = ctx.metrics.call_count(method, "ok");
    let delta = counted_after - counted_before;
    if delta != m as u64 {
        return Err(format!(
            "expected exactly {m} counted calls after the burst, counters moved by {delta}"
        ));
    }

    let concurrent_mean = latency_total / m as u32;
    let ceiling = sequential_mean * PATHOLOGICAL_FACTOR + Duration::from_millis(100);
    if concurrent_mean > ceiling {
        return Err(format!(
            "aggregate latency regressed pathologically: concurrent mean {}ms vs sequential mean {}ms",
            concurrent_mean.as_millis(),
            sequential_mean.as_millis()
        ));
    }
    Ok(())
}

/// The contract requires a cost response to echo its request window.
/// Under concurrency, a response carrying another call's window means
/// unsynchronized state bled across calls.
fn verify_own_window(i: usize, response: &RpcResponse) -> Result<(), String> {
    let expected = cost_params(vec![format!("burst-{i}")], i as i64);
    let result = response.result.as_ref().expect("checked is_ok");
    if result["window"] != expected["window"] {
        return Err(format!(
            "call {i} received a response for a different request window; \
             unsynchronized shared state bled across concurrent calls"
        ));
    }
    Ok(())
}

fn expect_error_code(response: &RpcResponse, method: &str, code: i64) -> Result<(), String> {
    match &response.error {
        Some(body) if body.code == code => Ok(()),
        Some(body) => Err(format!(
            "{method}: expected error code {code}, got {} ({})",
            body.code, body.message
        )),
        None => Err(format!("{method}: expected error code {code}, call succeeded")),
    }
}
