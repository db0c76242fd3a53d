//! The investigation strategy contract. An investigation inspects a cluster
//! through the resource bundle and declares its remediation as an ordered
//! action list; it never mutates an external system itself.

pub mod registry;

use async_trait::async_trait;

use crate::{action::Action, errors::TriageError, resources::Resources};

pub use registry::Registry;

/// Resources an investigation asks the builder to assemble. Flags compose;
/// repeated requests are idempotent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResourceRequest {
    pub cluster: bool,
    pub cluster_deployment: bool,
    pub cloud_client: bool,
    pub kube_config: bool,
    pub network_verifier: bool,
    pub limited_support_reasons: bool,
}

impl ResourceRequest {
    #[must_use]
    pub const fn cluster_only() -> Self {
        Self {
            cluster: true,
            cluster_deployment: false,
            cloud_client: false,
            kube_config: false,
            network_verifier: false,
            limited_support_reasons: false,
        }
    }

    #[must_use]
    pub const fn with_cluster_deployment(mut self) -> Self {
        self.cluster_deployment = true;
        self
    }

    #[must_use]
    pub const fn with_cloud_client(mut self) -> Self {
        self.cloud_client = true;
        self
    }

    #[must_use]
    pub const fn with_kube_config(mut self) -> Self {
        self.kube_config = true;
        self
    }

    #[must_use]
    pub const fn with_network_verifier(mut self) -> Self {
        self.network_verifier = true;
        self
    }

    #[must_use]
    pub const fn with_limited_support_reasons(mut self) -> Self {
        self.limited_support_reasons = true;
        self
    }
}

/// Output of one investigation run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InvestigationResult {
    pub actions: Vec<Action>,
    pub must_gather_performed: bool,
    pub stop_investigations: bool,
}

impl InvestigationResult {
    #[must_use]
    pub fn from_actions(actions: Vec<Action>) -> Self {
        Self {
            actions,
            ..Self::default()
        }
    }
}

/// A triage strategy selected by alert title and driven by the controller.
#[async_trait]
pub trait Investigation: Send + Sync {
    /// Unique, stable identifier.
    fn name(&self) -> &'static str;

    /// Canonical token matched against alert titles by the default matcher.
    fn alert_token(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Title predicate; overriding this takes precedence over the token.
    fn matches_alert(&self, title: &str) -> bool {
        let token = self.alert_token();
        !token.is_empty()
            && title
                .to_ascii_lowercase()
                .contains(&token.to_ascii_lowercase())
    }

    fn is_experimental(&self) -> bool {
        false
    }

    /// Informing investigations narrate instead of re-routing: the executor
    /// downgrades their escalations to notes and drops their silences.
    fn informing_mode(&self) -> bool {
        false
    }

    fn required_resources(&self) -> ResourceRequest;

    async fn run(&self, resources: &Resources) -> Result<InvestigationResult, TriageError>;
}
