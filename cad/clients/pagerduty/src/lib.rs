//! PagerDuty REST adapter implementing the incident-tracker capability.
//! Silencing and escalating an incident both mean re-assigning its
//! escalation policy; the two policy ids are fixed per deployment.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use cad_core::{capabilities::IncidentTracker, errors::DynError};

const DEFAULT_BASE_URL: &str = "https://api.pagerduty.com";
const DEFAULT_FROM_EMAIL: &str = "sre-automation@redhat.com";
const ACCEPT_V2: &str = "application/vnd.pagerduty+json;version=2";

#[derive(Debug, Error)]
pub enum PagerDutyError {
    #[error("pagerduty request failed: {source}")]
    Http {
        #[from]
        source: reqwest::Error,
    },
    #[error("pagerduty returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("invalid pagerduty configuration: {0}")]
    Config(String),
}

/// Minimal REST client over the incidents API.
pub struct PagerDutyClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
    from_email: String,
    silent_policy: String,
    escalation_policy: String,
}

#[derive(Debug, Deserialize)]
struct IncidentEnvelope {
    incident: Incident,
}

#[derive(Debug, Deserialize)]
pub struct Incident {
    pub id: String,
    pub title: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
struct NoteBody<'a> {
    note: NoteContent<'a>,
}

#[derive(Debug, Serialize)]
struct NoteContent<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct IncidentUpdateBody<'a> {
    incident: IncidentUpdate<'a>,
}

#[derive(Debug, Serialize)]
struct IncidentUpdate<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    escalation_policy: Option<PolicyReference<'a>>,
}

#[derive(Debug, Serialize)]
struct PolicyReference<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

impl PagerDutyClient {
    pub fn new(
        token: impl Into<String>,
        silent_policy: impl Into<String>,
        escalation_policy: impl Into<String>,
    ) -> Result<Self, PagerDutyError> {
        let base_url = Url::parse(DEFAULT_BASE_URL)
            .map_err(|err| PagerDutyError::Config(err.to_string()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
            from_email: DEFAULT_FROM_EMAIL.to_owned(),
            silent_policy: silent_policy.into(),
            escalation_policy: escalation_policy.into(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    #[must_use]
    pub fn with_from_email(mut self, from_email: impl Into<String>) -> Self {
        self.from_email = from_email.into();
        self
    }

    fn headers(&self) -> Result<HeaderMap, PagerDutyError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Token token={}", self.token))
                .map_err(|err| PagerDutyError::Config(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_V2));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "From",
            HeaderValue::from_str(&self.from_email)
                .map_err(|err| PagerDutyError::Config(err.to_string()))?,
        );
        Ok(headers)
    }

    fn endpoint(&self, path: &str) -> Result<Url, PagerDutyError> {
        self.base_url
            .join(path)
            .map_err(|err| PagerDutyError::Config(err.to_string()))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, PagerDutyError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(PagerDutyError::Api {
            status: status.as_u16(),
            message,
        })
    }

    pub async fn incident(&self, incident_id: &str) -> Result<Incident, PagerDutyError> {
        let url = self.endpoint(&format!("/incidents/{incident_id}"))?;
        let response = self
            .http
            .get(url)
            .headers(self.headers()?)
            .send()
            .await?;
        let envelope: IncidentEnvelope = Self::check(response).await?.json().await?;
        Ok(envelope.incident)
    }

    async fn update_incident(
        &self,
        incident_id: &str,
        update: IncidentUpdate<'_>,
    ) -> Result<(), PagerDutyError> {
        let url = self.endpoint(&format!("/incidents/{incident_id}"))?;
        let response = self
            .http
            .put(url)
            .headers(self.headers()?)
            .json(&IncidentUpdateBody { incident: update })
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn assign_policy(&self, incident_id: &str, policy_id: &str) -> Result<(), PagerDutyError> {
        self.update_incident(
            incident_id,
            IncidentUpdate {
                kind: "incident_reference",
                title: None,
                escalation_policy: Some(PolicyReference {
                    id: policy_id,
                    kind: "escalation_policy_reference",
                }),
            },
        )
        .await
    }
}

#[async_trait]
impl IncidentTracker for PagerDutyClient {
    async fn incident_title(&self, incident_id: &str) -> Result<String, DynError> {
        Ok(self.incident(incident_id).await?.title)
    }

    async fn set_incident_title(&self, incident_id: &str, title: &str) -> Result<(), DynError> {
        debug!(incident_id, title, "updating incident title");
        self.update_incident(
            incident_id,
            IncidentUpdate {
                kind: "incident_reference",
                title: Some(title),
                escalation_policy: None,
            },
        )
        .await?;
        Ok(())
    }

    async fn add_note(&self, incident_id: &str, content: &str) -> Result<(), DynError> {
        let url = self.endpoint(&format!("/incidents/{incident_id}/notes"))?;
        let response = self
            .http
            .post(url)
            .headers(self.headers()?)
            .json(&NoteBody {
                note: NoteContent { content },
            })
            .send()
            .await
            .map_err(PagerDutyError::from)?;
        Self::check(response).await?;
        Ok(())
    }

    async fn silence(&self, incident_id: &str) -> Result<(), DynError> {
        info!(incident_id, "moving incident to the silent policy");
        self.assign_policy(incident_id, &self.silent_policy).await?;
        Ok(())
    }

    async fn escalate(&self, incident_id: &str) -> Result<(), DynError> {
        info!(incident_id, "moving incident to the on-call escalation policy");
        self.assign_policy(incident_id, &self.escalation_policy)
            .await?;
        Ok(())
    }
}
