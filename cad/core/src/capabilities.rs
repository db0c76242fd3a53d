//! Capability interfaces over the external systems. Pure adapters: no
//! business logic lives behind these traits, and every implementation must
//! be safe for concurrent use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::{
    action::Severity,
    cluster::{Cluster, ClusterDeployment},
    errors::{DynError, TriageError},
};

/// A customer-visible (optionally internal) record attached to a cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceLogEntry {
    pub severity: Severity,
    pub service_name: String,
    pub summary: String,
    pub description: String,
    pub internal_only: bool,
}

/// A reduced-support-scope marker on a cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LimitedSupportReason {
    pub summary: String,
    pub details: String,
}

/// Cluster-management service surface.
#[async_trait]
pub trait ClusterMgmt: Send + Sync {
    async fn cluster_by_external_id(&self, external_id: &str) -> Result<Cluster, DynError>;

    async fn cluster_deployment(&self, internal_id: &str) -> Result<ClusterDeployment, DynError>;

    async fn post_service_log(
        &self,
        internal_id: &str,
        entry: &ServiceLogEntry,
    ) -> Result<(), DynError>;

    async fn service_logs(&self, internal_id: &str) -> Result<Vec<ServiceLogEntry>, DynError>;

    async fn post_limited_support(
        &self,
        internal_id: &str,
        reason: &LimitedSupportReason,
    ) -> Result<(), DynError>;

    async fn limited_support_reasons(
        &self,
        internal_id: &str,
    ) -> Result<Vec<LimitedSupportReason>, DynError>;

    /// Per-cluster customer support-role ARN used by the credential chain.
    async fn support_role_arn(&self, internal_id: &str) -> Result<String, DynError>;

    /// One page of managed clusters; an empty page ends the sweep.
    async fn managed_clusters(&self, page: u32) -> Result<Vec<Cluster>, DynError>;
}

/// Incident-tracker surface.
#[async_trait]
pub trait IncidentTracker: Send + Sync {
    async fn incident_title(&self, incident_id: &str) -> Result<String, DynError>;

    async fn set_incident_title(&self, incident_id: &str, title: &str) -> Result<(), DynError>;

    async fn add_note(&self, incident_id: &str, content: &str) -> Result<(), DynError>;

    /// Move the incident to the silent escalation policy.
    async fn silence(&self, incident_id: &str) -> Result<(), DynError>;

    /// Move the incident to the on-call escalation policy.
    async fn escalate(&self, incident_id: &str) -> Result<(), DynError>;
}

/// Running state of a cloud instance backing a cluster node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstanceState {
    Running,
    Stopped,
    Terminated,
    Other(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instance {
    pub id: String,
    pub state: InstanceState,
}

/// Audit-trail record of an instance stop or termination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopEvent {
    pub username: String,
    pub event_version: String,
    pub instance_ids: Vec<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Read-only cloud-account surface, scoped to the customer account by the
/// credential chain.
#[async_trait]
pub trait CloudClient: Send + Sync {
    fn region(&self) -> &str;

    /// Instances tagged as belonging to the given infra id.
    async fn instances(&self, infra_id: &str) -> Result<Vec<Instance>, DynError>;

    /// Stop/terminate audit events touching any of the given instances.
    async fn stop_events(&self, instance_ids: &[String]) -> Result<Vec<StopEvent>, DynError>;
}

/// Builds a customer-scoped [`CloudClient`] through the role-assumption
/// chain. Denied chains surface as `TriageError::CredentialsMissing`.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    async fn customer_client(&self, cluster: &Cluster)
        -> Result<Arc<dyn CloudClient>, TriageError>;
}

/// Outcome of the egress verifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerifierOutcome {
    Passed,
    Failures(Vec<String>),
}

/// Network egress verification against the cluster's required endpoints.
#[async_trait]
pub trait NetworkVerifier: Send + Sync {
    async fn verify_egress(
        &self,
        cluster: &Cluster,
        deployment: &ClusterDeployment,
    ) -> Result<VerifierOutcome, TriageError>;
}

/// Report-upload surface; returns the stored report's id.
#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn upload_report(
        &self,
        cluster_id: &str,
        summary: &str,
        data: &[u8],
    ) -> Result<String, DynError>;
}

/// Kubernetes access to the customer cluster and, for hosted control
/// planes, the management cluster.
#[async_trait]
pub trait KubeAccess: Send + Sync {
    async fn rest_config(&self, cluster_id: &str) -> Result<kube::Config, TriageError>;

    async fn management_client(&self, cluster_id: &str) -> Result<kube::Client, TriageError>;
}

/// Bearer-token source shared by the adapters that authenticate with the
/// cluster-management session (backplane, report store).
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, DynError>;
}
