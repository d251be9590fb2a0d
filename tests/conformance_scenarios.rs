//! End-to-end conformance suite scenarios driven through the in-process
//! transport with the reference mock plugins.

use std::time::Duration;

use costsource_sdk::conformance::{
    mock, ConformanceLevel, ConformanceSuite, TestStatus,
};

#[tokio::test]
async fn required_only_plugin_achieves_basic_with_optional_categories_skipped() {
    let suite = ConformanceSuite::new();
    let report = suite
        .run(mock::minimal_handlers(), ConformanceLevel::Basic)
        .await;

    assert_eq!(report.level_achieved, Some(ConformanceLevel::Basic));
    assert_eq!(report.summary.failed, 0);
    assert_eq!(report.plugin_name, mock::PLUGIN_NAME);

    // Performance and Concurrency were skipped, not failed: their
    // categories carry no executed entries.
    for category in ["performance", "concurrency"] {
        let result = &report.categories[category];
        assert_eq!(result.failed, 0);
        assert!(result.results.is_empty());
        assert!(result.skipped > 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_cost_handler_passes_standard_but_fails_exactly_the_advanced_latency_test() {
    let handlers = mock::full_handlers(Some(Duration::from_millis(150)));
    let suite = ConformanceSuite::new();

    let standard = suite
        .run(handlers.clone(), ConformanceLevel::Standard)
        .await;
    assert_eq!(standard.summary.failed, 0);
    assert_eq!(standard.level_achieved, Some(ConformanceLevel::Standard));

    let advanced = suite.run(handlers, ConformanceLevel::Advanced).await;
    assert_eq!(advanced.summary.failed, 1);
    assert_eq!(advanced.level_achieved, Some(ConformanceLevel::Standard));

    let performance = &advanced.categories["performance"];
    assert_eq!(performance.failed, 1);
    let failed: Vec<_> = performance
        .results
        .iter()
        .filter(|r| r.status == TestStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "sequential_latency_advanced");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unsynchronized_shared_state_fails_the_advanced_concurrency_test() {
    let suite = ConformanceSuite::new();
    let report = suite
        .run(mock::racy_handlers(), ConformanceLevel::Advanced)
        .await;

    let concurrency = &report.categories["concurrency"];
    assert!(concurrency.failed >= 1);
    let advanced_burst = concurrency
        .results
        .iter()
        .find(|r| r.name == "concurrent_calls_advanced")
        .expect("advanced burst executed");
    assert_eq!(advanced_burst.status, TestStatus::Failed);
    assert!(advanced_burst
        .message
        .as_deref()
        .unwrap_or_default()
        .contains("bled across concurrent calls"));

    // Certification stalls below the level where the failure surfaced.
    assert!(report.level_achieved < Some(ConformanceLevel::Advanced));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn level_achievement_is_monotonic() {
    let suite = ConformanceSuite::new();

    let advanced = suite
        .run(mock::full_handlers(None), ConformanceLevel::Advanced)
        .await;
    assert_eq!(advanced.level_achieved, Some(ConformanceLevel::Advanced));
    assert_eq!(advanced.summary.failed, 0);

    // Re-running only the lower subsets must also report a clean pass.
    let standard = suite
        .run(mock::full_handlers(None), ConformanceLevel::Standard)
        .await;
    assert_eq!(standard.level_achieved, Some(ConformanceLevel::Standard));
    assert_eq!(standard.summary.failed, 0);

    let basic = suite
        .run(mock::full_handlers(None), ConformanceLevel::Basic)
        .await;
    assert_eq!(basic.level_achieved, Some(ConformanceLevel::Basic));
    assert_eq!(basic.summary.failed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn panicking_plugin_is_contained_as_failures_not_a_crashed_run() {
    let suite = ConformanceSuite::new();
    let report = suite
        .run(mock::panicking_handlers(), ConformanceLevel::Advanced)
        .await;

    // The run completed and produced a full report despite every cost
    // call panicking inside the plugin.
    assert!(report.summary.failed >= 1);
    assert_eq!(report.categories["spec_validation"].failed, 0);
    assert!(report.summary.total > 0);
    assert_eq!(report.level_achieved, Some(ConformanceLevel::Basic));
}

#[tokio::test]
async fn supports_drift_fails_spec_validation() {
    let suite = ConformanceSuite::new();
    let report = suite
        .run(mock::misreporting_handlers(), ConformanceLevel::Basic)
        .await;

    let spec = &report.categories["spec_validation"];
    assert!(spec.failed >= 1);
    assert_eq!(report.level_achieved, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeout_is_recorded_as_failure_and_run_continues() {
    let suite = ConformanceSuite::new().with_test_timeout(Duration::from_millis(200));
    let handlers = mock::full_handlers(Some(Duration::from_millis(150)));
    let report = suite.run(handlers, ConformanceLevel::Standard).await;

    let timed_out: Vec<_> = report
        .categories
        .values()
        .flat_map(|c| c.results.iter())
        .filter(|r| {
            r.status == TestStatus::Failed
                && r.message.as_deref().unwrap_or_default().contains("timed out")
        })
        .collect();
    assert!(!timed_out.is_empty());
    // Every registered test still reported; the timeouts aborted their
    // own unit of work only.
    assert_eq!(
        report.summary.total,
        ConformanceSuite::new().tests().len()
    );
}

#[tokio::test]
async fn report_serializes_to_the_documented_shape() {
    let suite = ConformanceSuite::new();
    let report = suite
        .run(mock::minimal_handlers(), ConformanceLevel::Basic)
        .await;

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["version"], "1.0");
    assert_eq!(json["plugin_name"], mock::PLUGIN_NAME);
    assert_eq!(json["level_achieved"], "basic");
    for field in ["total", "passed", "failed", "skipped"] {
        assert!(json["summary"][field].is_u64());
    }
    for category in ["spec_validation", "rpc_correctness", "performance", "concurrency"] {
        assert!(json["categories"][category]["results"].is_array());
    }
    assert!(json["duration"].is_f64());
    assert!(json["timestamp"].is_string());
}
