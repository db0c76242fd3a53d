//! Counter emission for executed actions. The binary installs the recorder
//! and pushes on exit; everything here goes through the `metrics` facade.

use crate::action::ActionKind;

pub const SERVICELOG_SENT: &str = "cad_servicelog_sent_total";
pub const LIMITED_SUPPORT_SET: &str = "cad_limited_support_set_total";
pub const NOTE_ADDED: &str = "cad_incident_note_added_total";
pub const TITLE_UPDATED: &str = "cad_incident_title_updated_total";
pub const INCIDENT_SILENCED: &str = "cad_incident_silenced_total";
pub const INCIDENT_ESCALATED: &str = "cad_incident_escalated_total";
pub const REPORT_UPLOADED: &str = "cad_cluster_report_uploaded_total";

#[must_use]
pub const fn counter_for(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::ServiceLog => SERVICELOG_SENT,
        ActionKind::LimitedSupport => LIMITED_SUPPORT_SET,
        ActionKind::PagerdutyNote => NOTE_ADDED,
        ActionKind::PagerdutyTitleUpdate => TITLE_UPDATED,
        ActionKind::SilenceIncident => INCIDENT_SILENCED,
        ActionKind::EscalateIncident => INCIDENT_ESCALATED,
        ActionKind::BackplaneReport => REPORT_UPLOADED,
    }
}

/// Records one successful execution of the given action type.
pub fn record_action(kind: ActionKind, investigation: &str) {
    metrics::counter!(
        counter_for(kind),
        "investigation" => investigation.to_owned(),
    )
    .increment(1);
}
