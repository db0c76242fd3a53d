//! Read-only EC2 and CloudTrail surface over the customer account.

use async_trait::async_trait;
use aws_config::{Region, SdkConfig};
use chrono::{TimeZone, Utc};
use tracing::debug;

use cad_core::{
    capabilities::{CloudClient, Instance, InstanceState, StopEvent},
    errors::DynError,
};

use crate::chain::Credentials;

const STOP_EVENT_NAMES: &[&str] = &["StopInstances", "TerminateInstances"];

pub struct AwsCloudClient {
    ec2: aws_sdk_ec2::Client,
    cloudtrail: aws_sdk_cloudtrail::Client,
    region: String,
}

impl AwsCloudClient {
    #[must_use]
    pub fn from_credentials(base: &SdkConfig, credentials: &Credentials) -> Self {
        let provider = aws_credential_types::Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
            None,
            "cad-customer-account",
        );
        let region = Region::new(credentials.region.clone());

        let ec2_config = aws_sdk_ec2::config::Builder::from(base)
            .credentials_provider(provider.clone())
            .region(region.clone())
            .build();
        let cloudtrail_config = aws_sdk_cloudtrail::config::Builder::from(base)
            .credentials_provider(provider)
            .region(region)
            .build();

        Self {
            ec2: aws_sdk_ec2::Client::from_conf(ec2_config),
            cloudtrail: aws_sdk_cloudtrail::Client::from_conf(cloudtrail_config),
            region: credentials.region.clone(),
        }
    }
}

#[async_trait]
impl CloudClient for AwsCloudClient {
    fn region(&self) -> &str {
        &self.region
    }

    async fn instances(&self, infra_id: &str) -> Result<Vec<Instance>, DynError> {
        let cluster_tag = format!("kubernetes.io/cluster/{infra_id}");
        let filter = aws_sdk_ec2::types::Filter::builder()
            .name("tag-key")
            .values(cluster_tag)
            .build();

        let mut instances = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let response = self
                .ec2
                .describe_instances()
                .filters(filter.clone())
                .set_next_token(next_token)
                .send()
                .await?;

            for reservation in response.reservations() {
                for instance in reservation.instances() {
                    let Some(id) = instance.instance_id() else {
                        continue;
                    };
                    instances.push(Instance {
                        id: id.to_owned(),
                        state: map_instance_state(
                            instance
                                .state()
                                .and_then(|state| state.name())
                                .map(|name| name.as_str()),
                        ),
                    });
                }
            }

            next_token = response.next_token().map(str::to_owned);
            if next_token.is_none() {
                break;
            }
        }

        debug!(infra_id, count = instances.len(), "described instances");
        Ok(instances)
    }

    async fn stop_events(&self, instance_ids: &[String]) -> Result<Vec<StopEvent>, DynError> {
        let mut events = Vec::new();
        for event_name in STOP_EVENT_NAMES {
            let response = self
                .cloudtrail
                .lookup_events()
                .lookup_attributes(
                    aws_sdk_cloudtrail::types::LookupAttribute::builder()
                        .attribute_key(aws_sdk_cloudtrail::types::LookupAttributeKey::EventName)
                        .attribute_value(*event_name)
                        .build()?,
                )
                .send()
                .await?;

            for event in response.events() {
                let touched: Vec<String> = event
                    .resources()
                    .iter()
                    .filter(|resource| {
                        resource.resource_type() == Some("AWS::EC2::Instance")
                    })
                    .filter_map(|resource| resource.resource_name())
                    .map(str::to_owned)
                    .collect();
                if !touched.iter().any(|id| instance_ids.contains(id)) {
                    continue;
                }

                let occurred_at = event
                    .event_time()
                    .map(|time| {
                        Utc.timestamp_opt(time.secs(), time.subsec_nanos())
                            .single()
                            .unwrap_or_else(Utc::now)
                    })
                    .unwrap_or_else(Utc::now);

                events.push(StopEvent {
                    username: event.username().unwrap_or_default().to_owned(),
                    event_version: event
                        .cloud_trail_event()
                        .map(extract_event_version)
                        .unwrap_or_default(),
                    instance_ids: touched,
                    occurred_at,
                });
            }
        }

        events.sort_by_key(|event| std::cmp::Reverse(event.occurred_at));
        debug!(count = events.len(), "collected stop events");
        Ok(events)
    }
}

fn map_instance_state(name: Option<&str>) -> InstanceState {
    match name {
        Some("running") => InstanceState::Running,
        Some("stopped") | Some("stopping") => InstanceState::Stopped,
        Some("terminated") | Some("shutting-down") => InstanceState::Terminated,
        Some(other) => InstanceState::Other(other.to_owned()),
        None => InstanceState::Other("unknown".to_owned()),
    }
}

/// The raw CloudTrail record is an opaque JSON string; only the schema
/// version is needed from it.
fn extract_event_version(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|value| {
            value
                .get("eventVersion")
                .and_then(|version| version.as_str())
                .map(str::to_owned)
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_states_map_to_the_capability_enum() {
        assert_eq!(map_instance_state(Some("running")), InstanceState::Running);
        assert_eq!(map_instance_state(Some("stopping")), InstanceState::Stopped);
        assert_eq!(
            map_instance_state(Some("shutting-down")),
            InstanceState::Terminated
        );
        assert_eq!(
            map_instance_state(Some("rebooting")),
            InstanceState::Other("rebooting".to_owned())
        );
        assert_eq!(
            map_instance_state(None),
            InstanceState::Other("unknown".to_owned())
        );
    }

    #[test]
    fn event_version_is_read_from_the_raw_record() {
        let raw = r#"{"eventVersion":"1.08","userIdentity":{"userName":"osdManagedAdmin-x"}}"#;
        assert_eq!(extract_event_version(raw), "1.08");
        assert_eq!(extract_event_version("not json"), "");
        assert_eq!(extract_event_version("{}"), "");
    }
}
