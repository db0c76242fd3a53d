//! End-to-end runs of the controller against the full default registry,
//! with every external system mocked.

use std::sync::{atomic::Ordering, Arc};

use async_trait::async_trait;
use cad_core::{
    action::{Action, LimitedSupportParams, ServiceLogParams, Severity},
    capabilities::{LimitedSupportReason, VerifierOutcome},
    cluster::ClusterState,
    investigation::{Investigation, InvestigationResult, ResourceRequest},
    resources::Resources,
    TriageError,
};
use cad_e2e_tests::{sample_cluster, stop_event, triggered_payload, MockEnv};

fn default_registry() -> cad_core::investigation::Registry {
    cad_investigations::registry().expect("default registry builds")
}

#[tokio::test]
async fn chgm_customer_shutdown_service_logs_and_silences() {
    let env = MockEnv::new(sample_cluster());
    env.stop_events
        .lock()
        .expect("seed lock")
        .push(stop_event("osdManagedAdmin-abcd", "1.08"));
    let controller = env.controller(default_registry());

    controller
        .run_webhook(triggered_payload("cluster has gone missing"))
        .await
        .expect("customer shutdown resolves cleanly");

    let calls = env.recorded_calls();
    assert_eq!(
        calls,
        vec![
            "service_log:Instances stopped by customer".to_owned(),
            "silence".to_owned(),
        ]
    );
}

#[tokio::test]
async fn chgm_unauthorised_shutdown_notes_and_escalates() {
    let env = MockEnv::new(sample_cluster());
    env.stop_events
        .lock()
        .expect("seed lock")
        .push(stop_event("eve-user", "1.08"));
    let controller = env.controller(default_registry());

    controller
        .run_webhook(triggered_payload("cluster has gone missing"))
        .await
        .expect("unauthorised shutdown resolves cleanly");

    let calls = env.recorded_calls();
    assert_eq!(
        calls,
        vec![
            "note:non-operator user eve-user stopped instances".to_owned(),
            "escalate".to_owned(),
        ]
    );
}

#[tokio::test]
async fn cpd_verifier_failure_notes_and_escalates() {
    let mut cluster = sample_cluster();
    cluster.state = ClusterState::Installing;
    let env = MockEnv::new(cluster);
    *env.verifier_outcome.lock().expect("seed lock") =
        VerifierOutcome::Failures(vec!["egress blocked to quay.io".to_owned()]);
    let controller = env.controller(default_registry());

    controller
        .run_webhook(triggered_payload("ClusterProvisioningDelay - please investigate"))
        .await
        .expect("provisioning delay resolves cleanly");

    let calls = env.recorded_calls();
    assert_eq!(
        calls,
        vec![
            "note:Network verifier found issues: egress blocked to quay.io".to_owned(),
            "escalate".to_owned(),
        ]
    );
}

#[tokio::test]
async fn denied_credential_chain_resolves_through_ccam() {
    let env = MockEnv::new(sample_cluster());
    env.credentials_missing.store(true, Ordering::SeqCst);
    let controller = env.controller(default_registry());

    controller
        .run_webhook(triggered_payload("cluster has gone missing"))
        .await
        .expect("ccam outcome is a success");

    let calls = env.recorded_calls();
    assert_eq!(
        calls,
        vec![
            "limited_support:Restore missing cloud credentials".to_owned(),
            "silence".to_owned(),
        ]
    );
}

#[tokio::test]
async fn denied_chain_with_existing_reason_changes_nothing() {
    let env = MockEnv::new(sample_cluster());
    env.credentials_missing.store(true, Ordering::SeqCst);
    env.existing_reasons
        .lock()
        .expect("seed lock")
        .push(LimitedSupportReason {
            summary: "Restore missing cloud credentials".to_owned(),
            details: "posted by an earlier run".to_owned(),
        });
    let controller = env.controller(default_registry());

    controller
        .run_webhook(triggered_payload("cluster has gone missing"))
        .await
        .expect("idempotent ccam outcome");

    assert!(env.recorded_calls().is_empty());
}

#[tokio::test]
async fn unknown_alert_notes_and_escalates() {
    let env = MockEnv::new(sample_cluster());
    let controller = env.controller(default_registry());

    controller
        .run_webhook(triggered_payload("FrobnicatorOverload"))
        .await
        .expect("unknown alerts are non-fatal");

    let calls = env.recorded_calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].starts_with("note:CAD has no investigation for this alert"));
    assert_eq!(calls[1], "escalate");
}

/// Produces one action per target system for the manual-mode scenarios.
struct MixedWriter;

#[async_trait]
impl Investigation for MixedWriter {
    fn name(&self) -> &'static str {
        "mixed-writer"
    }

    fn alert_token(&self) -> &'static str {
        "mixed writer"
    }

    fn description(&self) -> &'static str {
        "emits a service log, a limited-support reason, and a note"
    }

    fn required_resources(&self) -> ResourceRequest {
        ResourceRequest::cluster_only()
    }

    async fn run(&self, _resources: &Resources) -> Result<InvestigationResult, TriageError> {
        Ok(InvestigationResult::from_actions(vec![
            Action::ServiceLog(ServiceLogParams {
                severity: Severity::Info,
                service_name: "SREManualAction".to_owned(),
                summary: "manual check".to_owned(),
                description: "manual check details".to_owned(),
                internal_only: true,
                allow_duplicates: false,
            }),
            Action::LimitedSupport(LimitedSupportParams {
                summary: "manual limited support".to_owned(),
                details: "manual details".to_owned(),
                context_label: "manual".to_owned(),
                allow_duplicates: false,
            }),
            Action::note("only exists with an incident"),
        ]))
    }
}

fn registry_with_writer() -> cad_core::investigation::Registry {
    let mut registry = default_registry();
    registry
        .register(Arc::new(MixedWriter))
        .expect("unique name");
    registry
}

#[tokio::test]
async fn manual_dry_run_touches_no_external_system() {
    let env = MockEnv::new(sample_cluster());
    let controller = env.controller(registry_with_writer());

    controller
        .run_manual("mixed-writer", "ext-cluster-1", true)
        .await
        .expect("dry run succeeds");

    assert!(env.recorded_calls().is_empty());
}

#[tokio::test]
async fn manual_run_filters_incident_actions_and_executes_the_rest() {
    let env = MockEnv::new(sample_cluster());
    let controller = env.controller(registry_with_writer());

    controller
        .run_manual("mixed-writer", "ext-cluster-1", false)
        .await
        .expect("manual run succeeds");

    assert_eq!(
        env.recorded_calls(),
        vec![
            "service_log:manual check".to_owned(),
            "limited_support:manual limited support".to_owned(),
        ]
    );
}

#[tokio::test]
async fn credentials_sweep_places_limited_support_without_an_incident() {
    let env = MockEnv::new(sample_cluster());
    env.credentials_missing.store(true, Ordering::SeqCst);
    let controller = env.controller(default_registry());

    controller
        .run_credentials_check()
        .await
        .expect("sweep completes");

    assert_eq!(
        env.recorded_calls(),
        vec!["limited_support:Restore missing cloud credentials".to_owned()]
    );
}

#[tokio::test]
async fn hibernating_cluster_short_circuits_every_investigation() {
    let mut cluster = sample_cluster();
    cluster.state = ClusterState::Hibernating;
    let env = MockEnv::new(cluster);
    let controller = env.controller(default_registry());

    controller
        .run_webhook(triggered_payload("cluster has gone missing"))
        .await
        .expect("short circuit is a success");

    let calls = env.recorded_calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].contains("hibernating"));
    assert_eq!(calls[1], "silence");
}
