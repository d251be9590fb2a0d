//! Result aggregation and the machine-readable report.
//!
//! Results form a strict tree: test results roll up into category
//! results, categories into the overall report. `level_achieved` is
//! always derived from the tree, never stored independently: it is the
//! highest level, up to the target, for which every executed applicable
//! test passed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use super::{ConformanceLevel, TestCategory};

pub const REPORT_VERSION: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Passed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub name: String,
    pub category: TestCategory,
    pub level: ConformanceLevel,
    pub status: TestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
}

impl TestResult {
    pub fn passed(name: &str, category: TestCategory, level: ConformanceLevel, took: Duration) -> Self {
        Self {
            name: name.to_string(),
            category,
            level,
            status: TestStatus::Passed,
            message: None,
            duration_ms: took.as_millis() as u64,
        }
    }

    pub fn failed(
        name: &str,
        category: TestCategory,
        level: ConformanceLevel,
        took: Duration,
        message: String,
    ) -> Self {
        Self {
            name: name.to_string(),
            category,
            level,
            status: TestStatus::Failed,
            message: Some(message),
            duration_ms: took.as_millis() as u64,
        }
    }

    pub fn skipped(name: &str, category: TestCategory, level: ConformanceLevel) -> Self {
        Self {
            name: name.to_string(),
            category,
            level,
            status: TestStatus::Skipped,
            message: None,
            duration_ms: 0,
        }
    }
}

/// Per-category rollup. `results` holds executed tests only; skipped
/// tests appear in the count but contribute no entries.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryResult {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub results: Vec<TestResult>,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct ConformanceResult {
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub plugin_name: String,
    pub level_achieved: Option<ConformanceLevel>,
    pub summary: Summary,
    pub categories: BTreeMap<String, CategoryResult>,
    /// Whole-run wall clock, seconds.
    pub duration: f64,
}

impl ConformanceResult {
    pub fn assemble(
        plugin_name: String,
        results: Vec<TestResult>,
        target: ConformanceLevel,
        took: Duration,
    ) -> Self {
        let mut categories: BTreeMap<String, CategoryResult> = TestCategory::all()
            .iter()
            .map(|c| (c.as_str().to_string(), CategoryResult::default()))
            .collect();
        let mut summary = Summary::default();

        for result in &results {
            let entry = categories
                .entry(result.category.as_str().to_string())
                .or_default();
            summary.total += 1;
            match result.status {
                TestStatus::Passed => {
                    summary.passed += 1;
                    entry.passed += 1;
                    entry.results.push(result.clone());
                }
                TestStatus::Failed => {
                    summary.failed += 1;
                    entry.failed += 1;
                    entry.results.push(result.clone());
                }
                TestStatus::Skipped => {
                    summary.skipped += 1;
                    entry.skipped += 1;
                }
            }
        }

        let level_achieved = derive_level(&results, target);

        Self {
            version: REPORT_VERSION.to_string(),
            timestamp: Utc::now(),
            plugin_name,
            level_achieved,
            summary,
            categories,
            duration: took.as_secs_f64(),
        }
    }

    pub fn passed(&self) -> bool {
        self.summary.failed == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Highest level, bounded by the target, whose applicable executed
/// tests all passed. A failure at level N blocks every level >= N.
pub fn derive_level(
    results: &[TestResult],
    target: ConformanceLevel,
) -> Option<ConformanceLevel> {
    let mut achieved = None;
    for level in ConformanceLevel::all() {
        if *level > target {
            break;
        }
        let clean = results.iter().all(|r| {
            r.level > *level
                || r.status == TestStatus::Passed
                || r.status == TestStatus::Skipped
        });
        if clean {
            achieved = Some(*level);
        } else {
            break;
        }
    }
    achieved
}
