//! Cluster-management domain records. Fetched once per run by the resource
//! builder and shared read-only from then on.

use serde::{Deserialize, Serialize};

/// Lifecycle state as reported by the cluster-management service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterState {
    Ready,
    Installing,
    Error,
    Uninstalling,
    Hibernating,
    PoweringDown,
    Resuming,
    #[serde(untagged)]
    Other(String),
}

impl ClusterState {
    /// States in which CAD must not act on the cluster at all.
    #[must_use]
    pub const fn forbids_investigation(&self) -> bool {
        matches!(
            self,
            Self::Uninstalling | Self::Hibernating | Self::PoweringDown
        )
    }
}

impl std::fmt::Display for ClusterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready => f.write_str("ready"),
            Self::Installing => f.write_str("installing"),
            Self::Error => f.write_str("error"),
            Self::Uninstalling => f.write_str("uninstalling"),
            Self::Hibernating => f.write_str("hibernating"),
            Self::PoweringDown => f.write_str("powering_down"),
            Self::Resuming => f.write_str("resuming"),
            Self::Other(state) => f.write_str(state),
        }
    }
}

/// Managed product flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    Classic,
    Hcp,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCounts {
    pub compute: u32,
    pub infra: u32,
    pub control_plane: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachinePool {
    pub id: String,
    pub instance_type: String,
    pub replicas: u32,
}

/// Cluster record from the cluster-management service. The external id is
/// what alerts carry; the internal id is what every follow-up call takes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub external_id: String,
    pub internal_id: String,
    pub name: String,
    pub domain_prefix: String,
    pub region: String,
    pub product: Product,
    pub state: ClusterState,
    #[serde(default)]
    pub provision_error_code: Option<String>,
    pub dns_ready: bool,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub private_link: bool,
    #[serde(default)]
    pub node_counts: NodeCounts,
    #[serde(default)]
    pub machine_pools: Vec<MachinePool>,
}

impl Cluster {
    #[must_use]
    pub const fn is_hcp(&self) -> bool {
        matches!(self.product, Product::Hcp)
    }
}

/// Install-time metadata taken from the cluster deployment record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterDeployment {
    pub infra_id: String,
    pub platform: String,
    #[serde(default)]
    pub aws_region: Option<String>,
}
