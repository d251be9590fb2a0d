//! Capability interfaces a plugin implements.
//!
//! The required surface (identity, support-check) lives on [`CostSource`];
//! every query domain is an independently optional trait. Optional
//! handlers are explicit `Option<Arc<dyn …>>` slots so the absent path is
//! a typed branch rather than a nil check scattered across call sites.

use async_trait::async_trait;
use std::sync::Arc;

use crate::contract::{
    BudgetRequest, BudgetResponse, CustomCostRequest, CustomCostResponse, DryRunRequest,
    DryRunResponse, QueryDomain, RecommendationRequest, RecommendationResponse,
};
use crate::error::{ConfigError, RpcError};
use crate::interceptor::CallContext;

/// Immutable plugin identity. Fixed once the plugin starts serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginIdentity {
    pub name: String,
    pub version: semver::Version,
}

impl PluginIdentity {
    /// Parses a strict `vMAJOR.MINOR.PATCH` identity. Pre-release and
    /// build metadata are rejected: compatibility comparison must stay
    /// unambiguous.
    pub fn new(name: impl Into<String>, version: &str) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::InvalidIdentity("plugin name is empty".into()));
        }
        let stripped = version.strip_prefix('v').ok_or_else(|| {
            ConfigError::InvalidIdentity(format!("version '{version}' must start with 'v'"))
        })?;
        let parsed = semver::Version::parse(stripped).map_err(|e| {
            ConfigError::InvalidIdentity(format!("version '{version}' is not semver: {e}"))
        })?;
        if !parsed.pre.is_empty() || !parsed.build.is_empty() {
            return Err(ConfigError::InvalidIdentity(format!(
                "version '{version}' carries pre-release or build metadata"
            )));
        }
        Ok(Self {
            name,
            version: parsed,
        })
    }

    pub fn version_string(&self) -> String {
        format!("v{}", self.version)
    }
}

/// Required capability: every plugin answers identity and support-check
/// queries. Absence of this surface is a startup configuration error,
/// not a runtime condition.
pub trait CostSource: Send + Sync + 'static {
    fn identity(&self) -> PluginIdentity;

    /// Whether the plugin serves the given query domain. Conformance
    /// verifies this answer agrees with the registered handler slots.
    fn supports(&self, domain: QueryDomain) -> bool;
}

#[async_trait]
pub trait CustomCostHandler: Send + Sync + 'static {
    async fn get_custom_costs(
        &self,
        ctx: &CallContext,
        request: CustomCostRequest,
    ) -> Result<CustomCostResponse, RpcError>;
}

#[async_trait]
pub trait RecommendationHandler: Send + Sync + 'static {
    async fn get_recommendations(
        &self,
        ctx: &CallContext,
        request: RecommendationRequest,
    ) -> Result<RecommendationResponse, RpcError>;
}

#[async_trait]
pub trait BudgetHandler: Send + Sync + 'static {
    async fn get_budgets(
        &self,
        ctx: &CallContext,
        request: BudgetRequest,
    ) -> Result<BudgetResponse, RpcError>;
}

#[async_trait]
pub trait DryRunHandler: Send + Sync + 'static {
    async fn dry_run(
        &self,
        ctx: &CallContext,
        request: DryRunRequest,
    ) -> Result<DryRunResponse, RpcError>;
}

/// A concrete plugin registration: the required core plus optional
/// handler slots. Built once, handed to the dispatcher at startup.
#[derive(Clone)]
pub struct PluginHandlers {
    pub core: Arc<dyn CostSource>,
    pub custom_costs: Option<Arc<dyn CustomCostHandler>>,
    pub recommendations: Option<Arc<dyn RecommendationHandler>>,
    pub budgets: Option<Arc<dyn BudgetHandler>>,
    pub dry_run: Option<Arc<dyn DryRunHandler>>,
}

impl PluginHandlers {
    pub fn new(core: Arc<dyn CostSource>) -> Self {
        Self {
            core,
            custom_costs: None,
            recommendations: None,
            budgets: None,
            dry_run: None,
        }
    }

    pub fn with_custom_costs(mut self, handler: Arc<dyn CustomCostHandler>) -> Self {
        self.custom_costs = Some(handler);
        self
    }

    pub fn with_recommendations(mut self, handler: Arc<dyn RecommendationHandler>) -> Self {
        self.recommendations = Some(handler);
        self
    }

    pub fn with_budgets(mut self, handler: Arc<dyn BudgetHandler>) -> Self {
        self.budgets = Some(handler);
        self
    }

    pub fn with_dry_run(mut self, handler: Arc<dyn DryRunHandler>) -> Self {
        self.dry_run = Some(handler);
        self
    }
}

/// The optional capabilities a plugin instance actually implements.
/// Computed once from the handler slots at startup and cached; readers
/// never take a lock and detection never re-runs per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySet {
    domains: Vec<QueryDomain>,
}

impl CapabilitySet {
    pub fn from_handlers(handlers: &PluginHandlers) -> Self {
        let mut domains = Vec::new();
        if handlers.custom_costs.is_some() {
            domains.push(QueryDomain::CustomCosts);
        }
        if handlers.recommendations.is_some() {
            domains.push(QueryDomain::Recommendations);
        }
        if handlers.budgets.is_some() {
            domains.push(QueryDomain::Budgets);
        }
        if handlers.dry_run.is_some() {
            domains.push(QueryDomain::DryRun);
        }
        Self { domains }
    }

    pub fn implements(&self, domain: QueryDomain) -> bool {
        self.domains.contains(&domain)
    }

    pub fn domains(&self) -> &[QueryDomain] {
        &self.domains
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Minimal;

    impl CostSource for Minimal {
        fn identity(&self) -> PluginIdentity {
            PluginIdentity::new("minimal", "v1.0.0").unwrap()
        }

        fn supports(&self, _domain: QueryDomain) -> bool {
            false
        }
    }

    #[test]
    fn identity_accepts_strict_semver() {
        let id = PluginIdentity::new("acme-costs", "v2.13.4").unwrap();
        assert_eq!(id.version.major, 2);
        assert_eq!(id.version_string(), "v2.13.4");
    }

    #[test]
    fn identity_rejects_missing_prefix() {
        assert!(PluginIdentity::new("p", "1.0.0").is_err());
    }

    #[test]
    fn identity_rejects_prerelease_and_build() {
        assert!(PluginIdentity::new("p", "v1.0.0-rc.1").is_err());
        assert!(PluginIdentity::new("p", "v1.0.0+build.5").is_err());
    }

    #[test]
    fn identity_rejects_empty_name() {
        assert!(PluginIdentity::new("", "v1.0.0").is_err());
    }

    #[test]
    fn capability_set_reflects_registered_slots() {
        let handlers = PluginHandlers::new(Arc::new(Minimal));
        let set = CapabilitySet::from_handlers(&handlers);
        assert!(set.is_empty());
        for domain in QueryDomain::all() {
            assert!(!set.implements(*domain));
        }
    }
}
