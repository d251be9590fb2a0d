//! Per-method latency thresholds. Static reference data: test runs read
//! these, never mutate them.

use std::collections::HashMap;
use std::time::Duration;

use super::ConformanceLevel;
use crate::contract::methods;

#[derive(Debug, Clone, Copy)]
pub struct MethodBaseline {
    pub standard: Duration,
    pub advanced: Duration,
}

pub const DEFAULT_STANDARD_THRESHOLD: Duration = Duration::from_millis(200);
pub const DEFAULT_ADVANCED_THRESHOLD: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct PerformanceBaselines {
    methods: HashMap<String, MethodBaseline>,
    fallback: MethodBaseline,
}

impl Default for PerformanceBaselines {
    fn default() -> Self {
        let fallback = MethodBaseline {
            standard: DEFAULT_STANDARD_THRESHOLD,
            advanced: DEFAULT_ADVANCED_THRESHOLD,
        };
        let methods = methods::ALL
            .iter()
            .map(|m| (m.to_string(), fallback))
            .collect();
        Self { methods, fallback }
    }
}

impl PerformanceBaselines {
    /// Replaces the baseline for one method before the suite is built.
    pub fn with_method(mut self, method: &str, baseline: MethodBaseline) -> Self {
        self.methods.insert(method.to_string(), baseline);
        self
    }

    pub fn threshold(&self, method: &str, level: ConformanceLevel) -> Duration {
        let baseline = self.methods.get(method).copied().unwrap_or(self.fallback);
        match level {
            // Performance tests never run below Standard; Basic keys to
            // the looser threshold for completeness.
            ConformanceLevel::Basic | ConformanceLevel::Standard => baseline.standard,
            ConformanceLevel::Advanced => baseline.advanced,
        }
    }
}
