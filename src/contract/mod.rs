//! Message shapes for the `costsource.v1` capability contract.
//!
//! The runtime does not own these definitions; they are the stable,
//! versioned surface both hosts and plugins consume. Shapes are additive
//! within a major version.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fully qualified service name. The gateway exposes one path segment
/// per method: `POST /costsource.v1.CostSourceService.<Method>`.
pub const SERVICE_NAME: &str = "costsource.v1.CostSourceService";

pub mod methods {
    pub const NAME: &str = "Name";
    pub const SUPPORTS: &str = "Supports";
    pub const GET_CAPABILITIES: &str = "GetCapabilities";
    pub const GET_CUSTOM_COSTS: &str = "GetCustomCosts";
    pub const GET_RECOMMENDATIONS: &str = "GetRecommendations";
    pub const GET_BUDGETS: &str = "GetBudgets";
    pub const DRY_RUN: &str = "DryRun";

    pub const ALL: &[&str] = &[
        NAME,
        SUPPORTS,
        GET_CAPABILITIES,
        GET_CUSTOM_COSTS,
        GET_RECOMMENDATIONS,
        GET_BUDGETS,
        DRY_RUN,
    ];
}

/// Query domains a plugin may serve. The required `Supports` method
/// answers membership per domain and must agree with the capability set
/// the dispatcher computed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryDomain {
    CustomCosts,
    Recommendations,
    Budgets,
    DryRun,
}

impl QueryDomain {
    pub fn all() -> &'static [QueryDomain] {
        &[
            QueryDomain::CustomCosts,
            QueryDomain::Recommendations,
            QueryDomain::Budgets,
            QueryDomain::DryRun,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryDomain::CustomCosts => "custom_costs",
            QueryDomain::Recommendations => "recommendations",
            QueryDomain::Budgets => "budgets",
            QueryDomain::DryRun => "dry_run",
        }
    }

    /// The optional wire method serving this domain.
    pub fn method(&self) -> &'static str {
        match self {
            QueryDomain::CustomCosts => methods::GET_CUSTOM_COSTS,
            QueryDomain::Recommendations => methods::GET_RECOMMENDATIONS,
            QueryDomain::Budgets => methods::GET_BUDGETS,
            QueryDomain::DryRun => methods::DRY_RUN,
        }
    }
}

impl fmt::Display for QueryDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Half-open time window a cost query concerns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameResponse {
    pub name: String,
    /// Strict `vMAJOR.MINOR.PATCH`.
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportsRequest {
    pub domain: QueryDomain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportsResponse {
    pub supported: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetCapabilitiesRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetCapabilitiesResponse {
    pub capabilities: Vec<QueryDomain>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCostRequest {
    pub resources: Vec<String>,
    pub window: Window,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostItem {
    pub resource: String,
    pub amount: f64,
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_quantity: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCostResponse {
    /// Echoes the request window so callers can correlate responses.
    pub window: Window,
    pub costs: Vec<CostItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub scope: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationAction {
    Rightsize,
    Terminate,
    Migrate,
    PurchaseCommitment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub resource: String,
    pub action: RecommendationAction,
    pub estimated_monthly_savings: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResponse {
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRequest {
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub name: String,
    pub limit: f64,
    pub spent: f64,
    pub currency: String,
    pub window: Window,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetResponse {
    pub budgets: Vec<Budget>,
}

/// Asks how a request would be routed without executing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunRequest {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DryRunResponse {
    pub would_dispatch: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability: Option<QueryDomain>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn domain_round_trips_through_json() {
        for domain in QueryDomain::all() {
            let json = serde_json::to_string(domain).unwrap();
            assert_eq!(json, format!("\"{}\"", domain.as_str()));
            let back: QueryDomain = serde_json::from_str(&json).unwrap();
            assert_eq!(back, *domain);
        }
    }

    #[test]
    fn every_domain_maps_to_a_known_method() {
        for domain in QueryDomain::all() {
            assert!(methods::ALL.contains(&domain.method()));
        }
    }

    #[test]
    fn cost_response_echoes_window() {
        let window = Window {
            start: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
        };
        let resp = CustomCostResponse {
            window: window.clone(),
            costs: vec![],
        };
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["window"]["start"], "2026-01-01T00:00:00Z");
        assert_eq!(resp.window, window);
    }
}
