//! Incident-event payload parsing. The webhook hands CAD a JSON document on
//! disk; this module extracts the handful of fields the controller needs and
//! rejects anything that cannot identify a cluster.

use serde::Deserialize;

use crate::errors::TriageError;

/// Incident lifecycle transition carried by the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Triggered,
    Resolved,
    Reopened,
    Escalated,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Triggered => f.write_str("triggered"),
            Self::Resolved => f.write_str("resolved"),
            Self::Reopened => f.write_str("reopened"),
            Self::Escalated => f.write_str("escalated"),
        }
    }
}

/// Parsed incident event. Immutable once constructed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertPayload {
    pub incident_id: String,
    pub service_id: String,
    pub event_type: EventType,
    pub alert_title: String,
    pub external_cluster_id: String,
    pub hcp_namespace: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    event: RawEvent,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    event_type: String,
    data: RawIncident,
}

#[derive(Debug, Deserialize)]
struct RawIncident {
    id: String,
    title: String,
    service: RawService,
    #[serde(default)]
    alerts: Vec<RawAlert>,
    #[serde(default)]
    body: Option<RawBody>,
    #[serde(default)]
    details: Option<RawDetails>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RawAlert {
    #[serde(default)]
    body: Option<RawBody>,
}

#[derive(Debug, Deserialize)]
struct RawBody {
    #[serde(default)]
    details: Option<RawDetails>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDetails {
    #[serde(default)]
    cluster_id: Option<String>,
    #[serde(default)]
    hcp_namespace: Option<String>,
}

impl AlertPayload {
    /// Parses the raw webhook JSON. The external cluster id is searched in
    /// the alerts array first, then the incident body, then the top-level
    /// details block; the first non-empty hit wins.
    pub fn parse(raw: &str) -> Result<Self, TriageError> {
        let payload: RawPayload = serde_json::from_str(raw)
            .map_err(|err| TriageError::validation(format!("malformed incident payload: {err}")))?;

        let event_type = parse_event_type(&payload.event.event_type)?;
        let incident = payload.event.data;

        let details = incident
            .alerts
            .iter()
            .filter_map(|alert| alert.body.as_ref())
            .chain(incident.body.as_ref())
            .filter_map(|body| body.details.as_ref())
            .chain(incident.details.as_ref());

        let mut external_cluster_id = None;
        let mut hcp_namespace = None;
        for block in details {
            if external_cluster_id.is_none() {
                external_cluster_id = block.cluster_id.as_deref().filter(|id| !id.is_empty());
            }
            if hcp_namespace.is_none() {
                hcp_namespace = block.hcp_namespace.as_deref().filter(|ns| !ns.is_empty());
            }
        }

        let external_cluster_id = external_cluster_id
            .ok_or_else(|| TriageError::validation("incident payload carries no cluster id"))?
            .to_owned();
        let hcp_namespace = hcp_namespace.map(str::to_owned);

        Ok(Self {
            incident_id: incident.id,
            service_id: incident.service.id,
            event_type,
            alert_title: incident.title,
            external_cluster_id,
            hcp_namespace,
        })
    }
}

fn parse_event_type(raw: &str) -> Result<EventType, TriageError> {
    let name = raw.strip_prefix("incident.").unwrap_or(raw);
    match name {
        "triggered" => Ok(EventType::Triggered),
        "resolved" => Ok(EventType::Resolved),
        "reopened" => Ok(EventType::Reopened),
        "escalated" => Ok(EventType::Escalated),
        other => Err(TriageError::validation(format!(
            "unknown incident event type '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_json(details: &str) -> String {
        format!(
            r#"{{
              "event": {{
                "event_type": "incident.triggered",
                "data": {{
                  "id": "PINC1",
                  "title": "cluster has gone missing",
                  "service": {{ "id": "PSVC1" }},
                  {details}
                }}
              }}
            }}"#
        )
    }

    #[test]
    fn cluster_id_from_alerts_array() {
        let raw = payload_json(
            r#""alerts": [ { "body": { "details": { "cluster_id": "ext-123" } } } ]"#,
        );
        let payload = AlertPayload::parse(&raw).expect("payload parses");
        assert_eq!(payload.external_cluster_id, "ext-123");
        assert_eq!(payload.event_type, EventType::Triggered);
        assert_eq!(payload.alert_title, "cluster has gone missing");
        assert!(payload.hcp_namespace.is_none());
    }

    #[test]
    fn alerts_array_wins_over_body_details() {
        let raw = payload_json(
            r#""alerts": [ { "body": { "details": { "cluster_id": "from-alert" } } } ],
               "body": { "details": { "cluster_id": "from-body", "hcp_namespace": "ocm-prod-x" } }"#,
        );
        let payload = AlertPayload::parse(&raw).expect("payload parses");
        assert_eq!(payload.external_cluster_id, "from-alert");
        // The namespace may still come from a later block.
        assert_eq!(payload.hcp_namespace.as_deref(), Some("ocm-prod-x"));
    }

    #[test]
    fn missing_cluster_id_is_a_validation_error() {
        let raw = payload_json(r#""body": { "details": { "cluster_id": "" } }"#);
        let err = AlertPayload::parse(&raw).expect_err("empty id must not parse");
        assert!(matches!(err, TriageError::Validation { .. }));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let raw = payload_json(r#""body": { "details": { "cluster_id": "ext" } }"#)
            .replace("incident.triggered", "incident.annotated");
        let err = AlertPayload::parse(&raw).expect_err("unknown event type");
        assert!(matches!(err, TriageError::Validation { .. }));
    }

    #[test]
    fn event_type_accepts_bare_names() {
        assert_eq!(
            parse_event_type("escalated").expect("bare name parses"),
            EventType::Escalated
        );
    }
}
