//! Wire representations of the cluster-management resources CAD touches,
//! and their mapping into the domain records.

use serde::{Deserialize, Serialize};

use cad_core::{
    action::Severity,
    capabilities::{LimitedSupportReason, ServiceLogEntry},
    cluster::{Cluster, ClusterDeployment, ClusterState, MachinePool, NodeCounts, Product},
};

use crate::OcmError;

#[derive(Debug, Deserialize)]
pub(crate) struct WireClusterList {
    pub items: Option<Vec<WireCluster>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireCluster {
    pub id: String,
    pub external_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub domain_prefix: Option<String>,
    pub region: Option<WireRegion>,
    pub state: Option<String>,
    #[serde(default)]
    pub hypershift: Option<WireHypershift>,
    #[serde(default)]
    pub status: Option<WireStatus>,
    #[serde(default)]
    pub aws: Option<WireAws>,
    #[serde(default)]
    pub nodes: Option<WireNodes>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireRegion {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireHypershift {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireStatus {
    #[serde(default)]
    pub dns_ready: bool,
    #[serde(default)]
    pub provision_error_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireAws {
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub private_link: bool,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireNodes {
    #[serde(default)]
    pub compute: u32,
    #[serde(default)]
    pub infra: u32,
    #[serde(default)]
    pub master: u32,
}

impl WireCluster {
    pub(crate) fn into_cluster(self) -> Result<Cluster, OcmError> {
        let external_id = self
            .external_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OcmError::Malformed {
                context: format!("cluster '{}' has no external id", self.id),
            })?;
        let region = self.region.map(|region| region.id).unwrap_or_default();
        let product = match self.hypershift {
            Some(WireHypershift { enabled: true }) => Product::Hcp,
            _ => Product::Classic,
        };
        let status = self.status.unwrap_or_default();
        let aws = self.aws.unwrap_or_default();
        let nodes = self.nodes.unwrap_or_default();

        Ok(Cluster {
            external_id,
            internal_id: self.id,
            domain_prefix: self.domain_prefix.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            region,
            product,
            state: parse_state(self.state.as_deref().unwrap_or_default()),
            provision_error_code: status.provision_error_code.filter(|code| !code.is_empty()),
            dns_ready: status.dns_ready,
            subnets: aws.subnet_ids,
            private_link: aws.private_link,
            node_counts: NodeCounts {
                compute: nodes.compute,
                infra: nodes.infra,
                control_plane: nodes.master,
            },
            machine_pools: Vec::new(),
        })
    }
}

pub(crate) fn parse_state(raw: &str) -> ClusterState {
    match raw {
        "ready" => ClusterState::Ready,
        "installing" | "pending" | "validating" | "waiting" => ClusterState::Installing,
        "error" => ClusterState::Error,
        "uninstalling" => ClusterState::Uninstalling,
        "hibernating" => ClusterState::Hibernating,
        "powering_down" => ClusterState::PoweringDown,
        "resuming" => ClusterState::Resuming,
        other => ClusterState::Other(other.to_owned()),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MachinePoolList {
    pub items: Option<Vec<WireMachinePool>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMachinePool {
    pub id: String,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub replicas: u32,
}

impl WireMachinePool {
    pub(crate) fn into_machine_pool(self) -> MachinePool {
        MachinePool {
            id: self.id,
            instance_type: self.instance_type,
            replicas: self.replicas,
        }
    }
}

/// `resources/live` returns each hive resource as an embedded JSON string.
#[derive(Debug, Deserialize)]
pub(crate) struct LiveResources {
    pub resources: std::collections::HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct HiveClusterDeployment {
    spec: HiveSpec,
}

#[derive(Debug, Deserialize)]
struct HiveSpec {
    #[serde(rename = "clusterMetadata")]
    cluster_metadata: Option<HiveClusterMetadata>,
    #[serde(default)]
    platform: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct HiveClusterMetadata {
    #[serde(rename = "infraID")]
    infra_id: Option<String>,
}

impl LiveResources {
    pub(crate) fn into_cluster_deployment(self) -> Result<ClusterDeployment, OcmError> {
        let raw = self
            .resources
            .get("cluster_deployment")
            .ok_or_else(|| OcmError::Malformed {
                context: "live resources carry no cluster_deployment".to_owned(),
            })?;
        let deployment: HiveClusterDeployment =
            serde_json::from_str(raw).map_err(|err| OcmError::Malformed {
                context: format!("cluster_deployment is not valid JSON: {err}"),
            })?;

        let infra_id = deployment
            .spec
            .cluster_metadata
            .and_then(|metadata| metadata.infra_id)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| OcmError::Malformed {
                context: "cluster_deployment has no infra id".to_owned(),
            })?;

        let (platform, aws_region) = match deployment.spec.platform {
            Some(platform_value) => {
                let aws_region = platform_value
                    .get("aws")
                    .and_then(|aws| aws.get("region"))
                    .and_then(|region| region.as_str())
                    .map(str::to_owned);
                let platform = platform_value
                    .as_object()
                    .and_then(|object| object.keys().next().cloned())
                    .unwrap_or_else(|| "unknown".to_owned());
                (platform, aws_region)
            }
            None => ("unknown".to_owned(), None),
        };

        Ok(ClusterDeployment {
            infra_id,
            platform,
            aws_region,
        })
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ServiceLogPost<'a> {
    cluster_id: &'a str,
    severity: String,
    service_name: &'a str,
    summary: &'a str,
    description: &'a str,
    internal_only: bool,
}

impl<'a> ServiceLogPost<'a> {
    pub(crate) fn from_entry(internal_id: &'a str, entry: &'a ServiceLogEntry) -> Self {
        Self {
            cluster_id: internal_id,
            severity: entry.severity.to_string(),
            service_name: &entry.service_name,
            summary: &entry.summary,
            description: &entry.description,
            internal_only: entry.internal_only,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServiceLogList {
    pub items: Option<Vec<WireServiceLog>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireServiceLog {
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub service_name: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub internal_only: bool,
}

impl WireServiceLog {
    pub(crate) fn into_entry(self) -> ServiceLogEntry {
        ServiceLogEntry {
            severity: parse_severity(self.severity.as_deref().unwrap_or_default()),
            service_name: self.service_name,
            summary: self.summary,
            description: self.description,
            internal_only: self.internal_only,
        }
    }
}

pub(crate) fn parse_severity(raw: &str) -> Severity {
    match raw {
        "Warning" => Severity::Warning,
        "Major" => Severity::Major,
        "Critical" => Severity::Critical,
        _ => Severity::Info,
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct LimitedSupportPost<'a> {
    summary: &'a str,
    details: &'a str,
    detection_type: &'a str,
}

impl<'a> LimitedSupportPost<'a> {
    pub(crate) fn from_reason(reason: &'a LimitedSupportReason) -> Self {
        Self {
            summary: &reason.summary,
            details: &reason.details,
            detection_type: "manual",
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct LimitedSupportList {
    pub items: Option<Vec<WireLimitedSupport>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireLimitedSupport {
    pub summary: String,
    #[serde(default)]
    pub details: String,
}

impl WireLimitedSupport {
    pub(crate) fn into_reason(self) -> LimitedSupportReason {
        LimitedSupportReason {
            summary: self.summary,
            details: self.details,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SupportRole {
    pub role_arn: String,
}
