//! Declarative remediation actions. An action is pure data plus behavioural
//! flags; the executor owns all side effects. Keeping the list serialisable
//! makes dry-run output and tests exact.

use serde::{Deserialize, Serialize};

/// Service-log severity accepted by the cluster-management service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Major,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => f.write_str("Info"),
            Self::Warning => f.write_str("Warning"),
            Self::Major => f.write_str("Major"),
            Self::Critical => f.write_str("Critical"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLogParams {
    pub severity: Severity,
    pub service_name: String,
    pub summary: String,
    pub description: String,
    #[serde(default)]
    pub internal_only: bool,
    #[serde(default)]
    pub allow_duplicates: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitedSupportParams {
    pub summary: String,
    pub details: String,
    /// Label attached to the emitted metric, not part of the reason itself.
    pub context_label: String,
    #[serde(default)]
    pub allow_duplicates: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteParams {
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleUpdateParams {
    pub prefix: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingParams {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportParams {
    pub cluster_id: String,
    pub summary: String,
    /// Base64-encoded opaque report body.
    pub data: String,
}

/// The closed set of external-system changes an investigation may request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    ServiceLog(ServiceLogParams),
    LimitedSupport(LimitedSupportParams),
    PagerdutyNote(NoteParams),
    PagerdutyTitleUpdate(TitleUpdateParams),
    SilenceIncident(RoutingParams),
    EscalateIncident(RoutingParams),
    BackplaneReport(ReportParams),
}

/// Discriminant used for logging, filtering, and metric labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    ServiceLog,
    LimitedSupport,
    PagerdutyNote,
    PagerdutyTitleUpdate,
    SilenceIncident,
    EscalateIncident,
    BackplaneReport,
}

impl ActionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServiceLog => "service_log",
            Self::LimitedSupport => "limited_support",
            Self::PagerdutyNote => "pagerduty_note",
            Self::PagerdutyTitleUpdate => "pagerduty_title_update",
            Self::SilenceIncident => "silence_incident",
            Self::EscalateIncident => "escalate_incident",
            Self::BackplaneReport => "backplane_report",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External system an action mutates; the concurrent executor partitions by
/// this and keeps submission order inside each partition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TargetSystem {
    IncidentTracker,
    ClusterMgmt,
    ReportStore,
}

impl Action {
    #[must_use]
    pub const fn kind(&self) -> ActionKind {
        match self {
            Self::ServiceLog(_) => ActionKind::ServiceLog,
            Self::LimitedSupport(_) => ActionKind::LimitedSupport,
            Self::PagerdutyNote(_) => ActionKind::PagerdutyNote,
            Self::PagerdutyTitleUpdate(_) => ActionKind::PagerdutyTitleUpdate,
            Self::SilenceIncident(_) => ActionKind::SilenceIncident,
            Self::EscalateIncident(_) => ActionKind::EscalateIncident,
            Self::BackplaneReport(_) => ActionKind::BackplaneReport,
        }
    }

    #[must_use]
    pub const fn target(&self) -> TargetSystem {
        match self {
            Self::PagerdutyNote(_)
            | Self::PagerdutyTitleUpdate(_)
            | Self::SilenceIncident(_)
            | Self::EscalateIncident(_) => TargetSystem::IncidentTracker,
            Self::ServiceLog(_) | Self::LimitedSupport(_) => TargetSystem::ClusterMgmt,
            Self::BackplaneReport(_) => TargetSystem::ReportStore,
        }
    }

    /// Actions that only make sense when an incident exists; manual runs
    /// filter these out before validation.
    #[must_use]
    pub const fn is_incident_scoped(&self) -> bool {
        matches!(self.target(), TargetSystem::IncidentTracker)
    }

    /// Pure structural validation; no collaborator is consulted.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::ServiceLog(params) => {
                if params.summary.trim().is_empty() {
                    return Err("service log summary must not be empty".to_owned());
                }
                Ok(())
            }
            Self::LimitedSupport(params) => {
                if params.summary.trim().is_empty() {
                    return Err("limited support summary must not be empty".to_owned());
                }
                if params.details.trim().is_empty() {
                    return Err("limited support details must not be empty".to_owned());
                }
                Ok(())
            }
            Self::PagerdutyNote(params) => {
                if params.content.trim().is_empty() {
                    return Err("note content must not be empty".to_owned());
                }
                Ok(())
            }
            Self::PagerdutyTitleUpdate(params) => {
                if params.prefix.trim().is_empty() {
                    return Err("title prefix must not be empty".to_owned());
                }
                Ok(())
            }
            Self::SilenceIncident(_) | Self::EscalateIncident(_) => Ok(()),
            Self::BackplaneReport(params) => {
                if params.cluster_id.is_empty() {
                    return Err("report cluster id must not be empty".to_owned());
                }
                if params.summary.trim().is_empty() {
                    return Err("report summary must not be empty".to_owned());
                }
                if params.data.is_empty() {
                    return Err("report data must not be empty".to_owned());
                }
                Ok(())
            }
        }
    }
}

/// Shorthand constructors used throughout the investigations.
impl Action {
    #[must_use]
    pub fn note(content: impl Into<String>) -> Self {
        Self::PagerdutyNote(NoteParams {
            content: content.into(),
        })
    }

    #[must_use]
    pub fn silence(reason: impl Into<String>) -> Self {
        Self::SilenceIncident(RoutingParams {
            reason: Some(reason.into()),
        })
    }

    #[must_use]
    pub fn escalate(reason: impl Into<String>) -> Self {
        Self::EscalateIncident(RoutingParams {
            reason: Some(reason.into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_log() -> Action {
        Action::ServiceLog(ServiceLogParams {
            severity: Severity::Warning,
            service_name: "SREManualAction".to_owned(),
            summary: "Instances stopped by customer".to_owned(),
            description: "Instances were stopped by an operator-owned credential".to_owned(),
            internal_only: false,
            allow_duplicates: false,
        })
    }

    #[test]
    fn serde_round_trip_preserves_the_list() {
        let actions = vec![
            service_log(),
            Action::note("checked the audit trail"),
            Action::silence("customer-initiated"),
            Action::BackplaneReport(ReportParams {
                cluster_id: "abc".to_owned(),
                summary: "node report".to_owned(),
                data: "eyJub2RlcyI6W119".to_owned(),
            }),
        ];
        let encoded = serde_json::to_string(&actions).expect("actions serialise");
        let decoded: Vec<Action> = serde_json::from_str(&encoded).expect("actions deserialise");
        assert_eq!(decoded, actions);
    }

    #[test]
    fn tag_names_are_stable() {
        let encoded = serde_json::to_value(service_log()).expect("serialises");
        assert_eq!(encoded["type"], "service_log");
        let encoded = serde_json::to_value(Action::escalate("x")).expect("serialises");
        assert_eq!(encoded["type"], "escalate_incident");
    }

    #[test]
    fn empty_summary_fails_validation() {
        let Action::ServiceLog(mut params) = service_log() else {
            unreachable!()
        };
        params.summary = "  ".to_owned();
        assert!(Action::ServiceLog(params).validate().is_err());
    }

    #[test]
    fn routing_actions_always_validate() {
        assert!(Action::SilenceIncident(RoutingParams::default())
            .validate()
            .is_ok());
        assert!(Action::escalate("reason").validate().is_ok());
    }

    #[test]
    fn incident_scoped_set_is_the_tracker_group() {
        assert!(Action::note("x").is_incident_scoped());
        assert!(Action::silence("x").is_incident_scoped());
        assert!(!service_log().is_incident_scoped());
    }
}
