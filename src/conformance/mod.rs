//! Conformance certification for plugin implementations.
//!
//! The suite drives any [`PluginHandlers`] value end-to-end through the
//! in-process transport: no socket, no port contention, deterministic.
//! Tests are grouped into categories, each with a minimum level below
//! which its tests are skipped rather than failed. Execution walks
//! Basic → Standard → Advanced; a failure at one level blocks
//! certification at that level and above but never hides the results
//! already collected.
//!
//! Every test runs in its own task under a bounded timeout: a timeout
//! is a failure, a panic is contained at the task boundary and recorded
//! as a failure, and neither aborts the rest of the run.
//!
//! The Concurrency category asserts the observable symptoms of
//! unsynchronized shared state (cross-call response bleed, counter
//! drift, latency collapse). CI additionally runs this suite under
//! ThreadSanitizer so plugins carrying `unsafe` shared state are caught
//! at the instruction level.

use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::capability::PluginHandlers;

pub mod baseline;
mod checks;
pub mod harness;
pub mod mock;
pub mod report;

pub use baseline::{MethodBaseline, PerformanceBaselines};
pub use harness::{Harness, TestContext};
pub use report::{CategoryResult, ConformanceResult, Summary, TestResult, TestStatus};

pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Concurrent call counts per level.
pub const STANDARD_BURST: usize = 10;
pub const ADVANCED_BURST: usize = 50;

/// Ordered, inclusive certification tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConformanceLevel {
    Basic,
    Standard,
    Advanced,
}

impl ConformanceLevel {
    pub fn all() -> &'static [ConformanceLevel] {
        &[
            ConformanceLevel::Basic,
            ConformanceLevel::Standard,
            ConformanceLevel::Advanced,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConformanceLevel::Basic => "basic",
            ConformanceLevel::Standard => "standard",
            ConformanceLevel::Advanced => "advanced",
        }
    }
}

impl fmt::Display for ConformanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    SpecValidation,
    RpcCorrectness,
    Performance,
    Concurrency,
}

impl TestCategory {
    pub fn all() -> &'static [TestCategory] {
        &[
            TestCategory::SpecValidation,
            TestCategory::RpcCorrectness,
            TestCategory::Performance,
            TestCategory::Concurrency,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TestCategory::SpecValidation => "spec_validation",
            TestCategory::RpcCorrectness => "rpc_correctness",
            TestCategory::Performance => "performance",
            TestCategory::Concurrency => "concurrency",
        }
    }

    /// Below this level the category's tests are skipped, not failed.
    pub fn min_level(&self) -> ConformanceLevel {
        match self {
            TestCategory::SpecValidation | TestCategory::RpcCorrectness => {
                ConformanceLevel::Basic
            }
            TestCategory::Performance | TestCategory::Concurrency => ConformanceLevel::Standard,
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type CheckFuture = BoxFuture<'static, std::result::Result<(), String>>;
type CheckFn = Arc<dyn Fn(Arc<TestContext>) -> CheckFuture + Send + Sync>;

pub struct ConformanceTest {
    name: &'static str,
    category: TestCategory,
    min_level: ConformanceLevel,
    check: CheckFn,
}

impl ConformanceTest {
    fn new<F>(
        name: &'static str,
        category: TestCategory,
        min_level: ConformanceLevel,
        check: F,
    ) -> Self
    where
        F: Fn(Arc<TestContext>) -> CheckFuture + Send + Sync + 'static,
    {
        Self {
            name,
            category,
            min_level,
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn category(&self) -> TestCategory {
        self.category
    }

    pub fn min_level(&self) -> ConformanceLevel {
        self.min_level
    }
}

pub struct ConformanceSuite {
    tests: Vec<ConformanceTest>,
    baselines: PerformanceBaselines,
    test_timeout: Duration,
}

impl Default for ConformanceSuite {
    fn default() -> Self {
        Self::new()
    }
}

impl ConformanceSuite {
    pub fn new() -> Self {
        Self::with_baselines(PerformanceBaselines::default())
    }

    /// The registry is fixed here; nothing can add or remove tests after
    /// construction.
    pub fn with_baselines(baselines: PerformanceBaselines) -> Self {
        Self {
            tests: builtin_tests(),
            baselines,
            test_timeout: DEFAULT_TEST_TIMEOUT,
        }
    }

    pub fn with_test_timeout(mut self, timeout: Duration) -> Self {
        self.test_timeout = timeout;
        self
    }

    pub fn tests(&self) -> &[ConformanceTest] {
        &self.tests
    }

    pub async fn run(
        &self,
        handlers: PluginHandlers,
        target: ConformanceLevel,
    ) -> ConformanceResult {
        let run_start = Instant::now();

        let harness = match Harness::start(handlers, self.baselines.clone()).await {
            Ok(harness) => harness,
            Err(message) => {
                // The plugin never came up; that is one loud failure,
                // not a crash of the verifier.
                let results = vec![TestResult::failed(
                    "harness_setup",
                    TestCategory::SpecValidation,
                    ConformanceLevel::Basic,
                    run_start.elapsed(),
                    message,
                )];
                return ConformanceResult::assemble(
                    "unknown".to_string(),
                    results,
                    target,
                    run_start.elapsed(),
                );
            }
        };

        let plugin_name = harness.ctx.identity.name.clone();
        info!(plugin = %plugin_name, level = %target, "conformance run starting");

        let mut results = Vec::with_capacity(self.tests.len());
        for test in &self.tests {
            if test.min_level > target {
                debug!(test = test.name, "skipped below minimum level");
                results.push(TestResult::skipped(test.name, test.category, test.min_level));
                continue;
            }

            let started = Instant::now();
            let ctx = harness.ctx.clone();
            // Each check runs in its own task: a panicking plugin or
            // check surfaces as a JoinError here, never as a crashed
            // run.
            let mut handle = tokio::spawn((test.check)(ctx));
            let result = match tokio::time::timeout(self.test_timeout, &mut handle).await {
                Err(_) => {
                    // Abort the unit of work, not the run; a straggling
                    // check must not bleed calls into later tests.
                    handle.abort();
                    TestResult::failed(
                        test.name,
                        test.category,
                        test.min_level,
                        started.elapsed(),
                        format!("timed out after {}ms", self.test_timeout.as_millis()),
                    )
                }
                Ok(Err(join_err)) => TestResult::failed(
                    test.name,
                    test.category,
                    test.min_level,
                    started.elapsed(),
                    format!("panicked: {join_err}"),
                ),
                Ok(Ok(Ok(()))) => {
                    TestResult::passed(test.name, test.category, test.min_level, started.elapsed())
                }
                Ok(Ok(Err(message))) => TestResult::failed(
                    test.name,
                    test.category,
                    test.min_level,
                    started.elapsed(),
                    message,
                ),
            };
            debug!(test = test.name, status = ?result.status, "test finished");
            results.push(result);
        }

        let report =
            ConformanceResult::assemble(plugin_name, results, target, run_start.elapsed());
        info!(
            level_achieved = report
                .level_achieved
                .map(|l| l.as_str())
                .unwrap_or("none"),
            failed = report.summary.failed,
            "conformance run finished"
        );
        report
    }
}

fn builtin_tests() -> Vec<ConformanceTest> {
    vec![
        ConformanceTest::new(
            "identity_is_strict_semver",
            TestCategory::SpecValidation,
            ConformanceLevel::Basic,
            |ctx| Box::pin(checks::identity_is_strict_semver(ctx)),
        ),
        ConformanceTest::new(
            "supports_agrees_with_capabilities",
            TestCategory::SpecValidation,
            ConformanceLevel::Basic,
            |ctx| Box::pin(checks::supports_agrees_with_capabilities(ctx)),
        ),
        ConformanceTest::new(
            "capability_introspection_is_stable",
            TestCategory::SpecValidation,
            ConformanceLevel::Basic,
            |ctx| Box::pin(checks::capability_introspection_is_stable(ctx)),
        ),
        ConformanceTest::new(
            "required_methods_respond",
            TestCategory::RpcCorrectness,
            ConformanceLevel::Basic,
            |ctx| Box::pin(checks::required_methods_respond(ctx)),
        ),
        ConformanceTest::new(
            "absent_capabilities_return_unimplemented",
            TestCategory::RpcCorrectness,
            ConformanceLevel::Basic,
            |ctx| Box::pin(checks::absent_capabilities_return_unimplemented(ctx)),
        ),
        ConformanceTest::new(
            "unknown_method_is_client_error",
            TestCategory::RpcCorrectness,
            ConformanceLevel::Basic,
            |ctx| Box::pin(checks::unknown_method_is_client_error(ctx)),
        ),
        ConformanceTest::new(
            "malformed_params_are_client_error",
            TestCategory::RpcCorrectness,
            ConformanceLevel::Basic,
            |ctx| Box::pin(checks::malformed_params_are_client_error(ctx)),
        ),
        ConformanceTest::new(
            "trace_id_round_trips",
            TestCategory::RpcCorrectness,
            ConformanceLevel::Basic,
            |ctx| Box::pin(checks::trace_id_round_trips(ctx)),
        ),
        ConformanceTest::new(
            "sequential_latency_standard",
            TestCategory::Performance,
            ConformanceLevel::Standard,
            |ctx| Box::pin(checks::sequential_latency(ctx, ConformanceLevel::Standard)),
        ),
        ConformanceTest::new(
            "sequential_latency_advanced",
            TestCategory::Performance,
            ConformanceLevel::Advanced,
            |ctx| Box::pin(checks::sequential_latency(ctx, ConformanceLevel::Advanced)),
        ),
        ConformanceTest::new(
            "concurrent_calls_standard",
            TestCategory::Concurrency,
            ConformanceLevel::Standard,
            |ctx| Box::pin(checks::concurrent_burst(ctx, STANDARD_BURST)),
        ),
        ConformanceTest::new(
            "concurrent_calls_advanced",
            TestCategory::Concurrency,
            ConformanceLevel::Advanced,
            |ctx| Box::pin(checks::concurrent_burst(ctx, ADVANCED_BURST)),
        ),
    ]
}
