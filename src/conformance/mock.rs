//! Reference mock plugins.
//!
//! Used by the suite's own tests and by SDK users who want a known-good
//! (or known-bad) implementation to calibrate against: a minimal
//! required-only plugin, a full implementation with a configurable cost
//! handler delay, one with a deliberate cross-call state bleed, and one
//! that panics.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::capability::{
    BudgetHandler, CostSource, CustomCostHandler, DryRunHandler, PluginHandlers, PluginIdentity,
    RecommendationHandler,
};
use crate::contract::{
    Budget, BudgetRequest, BudgetResponse, CostItem, CustomCostRequest, CustomCostResponse,
    DryRunRequest, DryRunResponse, QueryDomain, Recommendation, RecommendationAction,
    RecommendationRequest, RecommendationResponse, Window,
};
use crate::error::RpcError;
use crate::interceptor::CallContext;

pub const PLUGIN_NAME: &str = "mock-costsource";
pub const PLUGIN_VERSION: &str = "v1.0.0";

struct MockCore {
    capabilities: Vec<QueryDomain>,
}

impl CostSource for MockCore {
    fn identity(&self) -> PluginIdentity {
        PluginIdentity::new(PLUGIN_NAME, PLUGIN_VERSION).unwrap()
    }

    fn supports(&self, domain: QueryDomain) -> bool {
        self.capabilities.contains(&domain)
    }
}

struct MockCosts {
    delay: Option<Duration>,
}

#[async_trait]
impl CustomCostHandler for MockCosts {
    async fn get_custom_costs(
        &self,
        _ctx: &CallContext,
        request: CustomCostRequest,
    ) -> Result<CustomCostResponse, RpcError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(CustomCostResponse {
            window: request.window,
            costs: request
                .resources
                .into_iter()
                .map(|resource| CostItem {
                    resource,
                    amount: 0.42,
                    currency: "USD".into(),
                    usage_quantity: Some(1.0),
                })
                .collect(),
        })
    }
}

struct MockRecommendations;

#[async_trait]
impl RecommendationHandler for MockRecommendations {
    async fn get_recommendations(
        &self,
        _ctx: &CallContext,
        request: RecommendationRequest,
    ) -> Result<RecommendationResponse, RpcError> {
        Ok(RecommendationResponse {
            recommendations: vec![Recommendation {
                resource: format!("{}/idle-node", request.scope),
                action: RecommendationAction::Rightsize,
                estimated_monthly_savings: 117.50,
                rationale: Some("p95 utilization under 10%".into()),
            }],
        })
    }
}

struct MockBudgets;

#[async_trait]
impl BudgetHandler for MockBudgets {
    async fn get_budgets(
        &self,
        _ctx: &CallContext,
        request: BudgetRequest,
    ) -> Result<BudgetResponse, RpcError> {
        let start = chrono::Utc::now() - chrono::Duration::days(30);
        Ok(BudgetResponse {
            budgets: vec![Budget {
                name: request.scope,
                limit: 1000.0,
                spent: 250.0,
                currency: "USD".into(),
                window: Window {
                    start,
                    end: chrono::Utc::now(),
                },
            }],
        })
    }
}

struct MockDryRun {
    capabilities: Vec<QueryDomain>,
}

#[async_trait]
impl DryRunHandler for MockDryRun {
    async fn dry_run(
        &self,
        _ctx: &CallContext,
        request: DryRunRequest,
    ) -> Result<DryRunResponse, RpcError> {
        let capability = QueryDomain::all()
            .iter()
            .find(|d| d.method() == request.method)
            .copied();
        let would_dispatch =
            capability.is_some_and(|domain| self.capabilities.contains(&domain));
        Ok(DryRunResponse {
            would_dispatch,
            capability,
        })
    }
}

/// Cost handler with a deliberate cross-call bleed: the request window
/// is parked in shared scratch space, the task yields, and the response
/// is built from whatever the scratch holds afterwards. The lock scope
/// does not span the await, so concurrent calls answer each other's
/// requests.
struct RacyCosts {
    scratch: Arc<Mutex<Option<Window>>>,
}

#[async_trait]
impl CustomCostHandler for RacyCosts {
    async fn get_custom_costs(
        &self,
        _ctx: &CallContext,
        request: CustomCostRequest,
    ) -> Result<CustomCostResponse, RpcError> {
        {
            *self.scratch.lock().unwrap() = Some(request.window);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
        let window = self
            .scratch
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| RpcError::Internal("scratch emptied".into()))?;
        Ok(CustomCostResponse {
            window,
            costs: request
                .resources
                .into_iter()
                .map(|resource| CostItem {
                    resource,
                    amount: 0.42,
                    currency: "USD".into(),
                    usage_quantity: None,
                })
                .collect(),
        })
    }
}

struct PanickingCosts;

#[async_trait]
impl CustomCostHandler for PanickingCosts {
    async fn get_custom_costs(
        &self,
        _ctx: &CallContext,
        _request: CustomCostRequest,
    ) -> Result<CustomCostResponse, RpcError> {
        panic!("mock cost handler panic");
    }
}

/// Only the required capabilities.
pub fn minimal_handlers() -> PluginHandlers {
    PluginHandlers::new(Arc::new(MockCore {
        capabilities: vec![],
    }))
}

/// Every capability; `cost_delay` slows the cost-query handler only.
pub fn full_handlers(cost_delay: Option<Duration>) -> PluginHandlers {
    let capabilities = QueryDomain::all().to_vec();
    PluginHandlers::new(Arc::new(MockCore {
        capabilities: capabilities.clone(),
    }))
    .with_custom_costs(Arc::new(MockCosts { delay: cost_delay }))
    .with_recommendations(Arc::new(MockRecommendations))
    .with_budgets(Arc::new(MockBudgets))
    .with_dry_run(Arc::new(MockDryRun { capabilities }))
}

/// Cost capability only, with the cross-call bleed described on
/// [`RacyCosts`].
pub fn racy_handlers() -> PluginHandlers {
    PluginHandlers::new(Arc::new(MockCore {
        capabilities: vec![QueryDomain::CustomCosts],
    }))
    .with_custom_costs(Arc::new(RacyCosts {
        scratch: Arc::new(Mutex::new(None)),
    }))
}

/// Cost handler panics on every call.
pub fn panicking_handlers() -> PluginHandlers {
    PluginHandlers::new(Arc::new(MockCore {
        capabilities: vec![QueryDomain::CustomCosts],
    }))
    .with_custom_costs(Arc::new(PanickingCosts))
}

/// `Supports` claims budgets, but no budget handler is registered; the
/// spec-validation category exists to catch exactly this drift.
pub fn misreporting_handlers() -> PluginHandlers {
    PluginHandlers::new(Arc::new(MockCore {
        capabilities: vec![QueryDomain::Budgets],
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilitySet;

    #[test]
    fn mock_identity_is_valid() {
        assert!(PluginIdentity::new(PLUGIN_NAME, PLUGIN_VERSION).is_ok());
    }

    #[test]
    fn handler_sets_match_their_descriptions() {
        assert!(CapabilitySet::from_handlers(&minimal_handlers()).is_empty());
        assert_eq!(
            CapabilitySet::from_handlers(&full_handlers(None)).domains().len(),
            QueryDomain::all().len()
        );
        let racy = CapabilitySet::from_handlers(&racy_handlers());
        assert!(racy.implements(QueryDomain::CustomCosts));
        assert!(!racy.implements(QueryDomain::Budgets));
    }
}
