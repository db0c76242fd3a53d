//! Top-level orchestration of one incident event: select an investigation,
//! assemble its resources, run it, and hand the declared actions to the
//! right executor. The controller itself never touches an external system.

use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};

use crate::{
    action::Action,
    cluster::Cluster,
    errors::TriageError,
    executor::{
        ExecutionContext, ExecutionPolicy, ExecutorError, ManualExecutor, WebhookExecutor,
    },
    investigation::{Investigation, InvestigationResult, Registry, ResourceRequest},
    notes::NoteWriter,
    payload::{AlertPayload, EventType},
    resources::{ResourceBuilder, Resources, Services},
};

/// Well-known name of the cloud-credentials investigation the controller
/// reroutes to when the credential chain is denied.
pub const CCAM_INVESTIGATION: &str = "ccam";

#[derive(Clone, Debug, Default)]
pub struct ControllerOptions {
    pub experimental_enabled: bool,
    pub pipeline_name: Option<String>,
}

/// Owns every component for the duration of one run.
pub struct Controller {
    registry: Registry,
    services: Services,
    options: ControllerOptions,
}

impl Controller {
    #[must_use]
    pub fn new(registry: Registry, services: Services, options: ControllerOptions) -> Self {
        Self {
            registry,
            services,
            options,
        }
    }

    /// Webhook entry point: the payload has already been parsed (and thereby
    /// validated) by the caller.
    pub async fn run_webhook(&self, payload: AlertPayload) -> Result<(), TriageError> {
        info!(
            incident = %payload.incident_id,
            cluster = %payload.external_cluster_id,
            event = %payload.event_type,
            title = %payload.alert_title,
            pipeline = self.options.pipeline_name.as_deref().unwrap_or("<unset>"),
            "handling incident event"
        );

        if payload.event_type == EventType::Resolved {
            info!("incident resolved; nothing to investigate");
            return Ok(());
        }

        let Some(investigation) = self
            .registry
            .select(&payload.alert_title, self.options.experimental_enabled)
        else {
            return self.handle_unknown_alert(&payload).await;
        };

        info!(investigation = investigation.name(), "investigation selected");

        let resources = match ResourceBuilder::new(
            &self.services,
            &payload.external_cluster_id,
            investigation.name(),
        )
        .with_request(investigation.required_resources())
        .with_request(ResourceRequest::cluster_only().with_limited_support_reasons())
        .with_payload(payload.clone())
        .build()
        .await
        {
            Ok(resources) => resources,
            Err(err) if err.is_credentials_missing() => {
                return self.run_ccam(&payload, None).await;
            }
            Err(err) => {
                return self
                    .handle_failure(investigation.name(), &payload, None, err)
                    .await;
            }
        };

        if let Some(reason) = self.short_circuit_reason(investigation.as_ref(), &resources) {
            info!(%reason, "cluster must not be investigated; silencing");
            let actions = vec![
                Action::note(format!(
                    "Skipping investigation '{}': {reason}",
                    investigation.name()
                )),
                Action::silence(reason),
            ];
            let executor = self.webhook_executor(
                Some(Arc::clone(&resources.cluster)),
                &payload,
                Arc::clone(&resources.notes),
                investigation.name(),
            );
            executor
                .execute(actions, false)
                .await
                .map_err(|err| executor_failure("silencing uninvestigable cluster", err))?;
            return Ok(());
        }

        match investigation.run(&resources).await {
            Ok(result) => {
                self.execute_webhook_result(investigation.as_ref(), &payload, &resources, result)
                    .await
            }
            Err(err) if err.is_credentials_missing() => {
                let cluster = Arc::clone(&resources.cluster);
                self.run_ccam(&payload, Some(cluster)).await
            }
            Err(err) => {
                let cluster = Arc::clone(&resources.cluster);
                self.handle_failure(investigation.name(), &payload, Some(cluster), err)
                    .await
            }
        }
    }

    /// Manual entry point: explicit investigation name and cluster id, no
    /// incident, incident-scoped actions filtered by the executor.
    pub async fn run_manual(
        &self,
        name: &str,
        external_cluster_id: &str,
        dry_run: bool,
    ) -> Result<(), TriageError> {
        let Some(investigation) = self.registry.by_name(name) else {
            return Err(TriageError::validation(format!(
                "unknown investigation '{name}'; registered: {}",
                self.registry
                    .names(self.options.experimental_enabled)
                    .join(", ")
            )));
        };
        if investigation.is_experimental() && !self.options.experimental_enabled {
            return Err(TriageError::validation(format!(
                "investigation '{name}' is experimental and the experimental gate is off"
            )));
        }

        let resources = match ResourceBuilder::new(
            &self.services,
            external_cluster_id,
            investigation.name(),
        )
        .with_request(investigation.required_resources())
        .build()
        .await
        {
            Ok(resources) => resources,
            Err(err) if err.is_credentials_missing() => {
                return self.run_ccam_manual(external_cluster_id, None, dry_run).await;
            }
            Err(err) => return Err(err),
        };

        if resources.cluster.state.forbids_investigation() {
            info!(
                state = %resources.cluster.state,
                "cluster must not be investigated; manual run ends"
            );
            return Ok(());
        }

        let result = investigation.run(&resources).await?;
        info!(
            investigation = investigation.name(),
            actions = result.actions.len(),
            "investigation finished"
        );

        let executor = ManualExecutor::new(
            self.execution_context(
                Some(Arc::clone(&resources.cluster)),
                None,
                Arc::clone(&resources.notes),
                investigation.name(),
            ),
            ExecutionPolicy {
                dry_run,
                ..ExecutionPolicy::default()
            },
        );
        executor
            .execute(result.actions, investigation.informing_mode())
            .await
            .map_err(|err| executor_failure("executing manual actions", err))?;
        Ok(())
    }

    /// One-off sweep: pages through every managed cluster and applies the
    /// credentials investigation wherever the chain is denied.
    pub async fn run_credentials_check(&self) -> Result<(), TriageError> {
        if self.registry.by_name(CCAM_INVESTIGATION).is_none() {
            return Err(TriageError::internal(
                "credentials investigation is not registered",
            ));
        }

        let mut page = 1;
        let mut checked = 0usize;
        let mut flagged = 0usize;
        loop {
            let clusters = self
                .services
                .cluster_mgmt
                .managed_clusters(page)
                .await
                .map_err(|source| {
                    TriageError::infrastructure(format!("listing managed clusters page {page}"), source)
                })?;
            if clusters.is_empty() {
                break;
            }

            for cluster in clusters {
                checked += 1;
                match self.services.cloud.customer_client(&cluster).await {
                    Ok(_) => {}
                    Err(err) if err.is_credentials_missing() => {
                        flagged += 1;
                        warn!(
                            cluster = %cluster.internal_id,
                            "credential chain denied; applying credentials investigation"
                        );
                        let external_id = cluster.external_id.clone();
                        self.run_ccam_manual(&external_id, Some(Arc::new(cluster)), false)
                            .await?;
                    }
                    Err(err) => {
                        warn!(
                            cluster = %cluster.internal_id,
                            error = %err,
                            "credential check failed for reasons other than missing credentials"
                        );
                    }
                }
            }
            page += 1;
        }

        info!(checked, flagged, "credentials sweep complete");
        Ok(())
    }

    async fn handle_unknown_alert(&self, payload: &AlertPayload) -> Result<(), TriageError> {
        warn!(
            title = %payload.alert_title,
            "no investigation matches this alert"
        );
        let notes = Arc::new(Mutex::new(NoteWriter::new("unknown-alert")));
        let executor = self.webhook_executor(None, payload, notes, "unknown-alert");
        executor
            .execute(
                vec![
                    Action::note(format!(
                        "CAD has no investigation for this alert: '{}'",
                        payload.alert_title
                    )),
                    Action::escalate("unhandled alert"),
                ],
                false,
            )
            .await
            .map_err(|err| executor_failure("escalating unknown alert", err))?;
        Ok(())
    }

    /// Reroute for a denied credential chain in webhook mode; a successful
    /// CCAM outcome resolves the run as a success.
    async fn run_ccam(
        &self,
        payload: &AlertPayload,
        known_cluster: Option<Arc<Cluster>>,
    ) -> Result<(), TriageError> {
        let Some(ccam) = self.registry.by_name(CCAM_INVESTIGATION) else {
            return self
                .handle_failure(
                    CCAM_INVESTIGATION,
                    payload,
                    known_cluster,
                    TriageError::internal("credentials investigation is not registered"),
                )
                .await;
        };

        let mut builder =
            ResourceBuilder::new(&self.services, &payload.external_cluster_id, ccam.name())
                .with_request(ccam.required_resources())
                .with_payload(payload.clone());
        if let Some(cluster) = known_cluster.clone() {
            builder = builder.with_known_cluster(cluster);
        }
        let resources = match builder.build().await {
            Ok(resources) => resources,
            Err(err) => {
                return self
                    .handle_failure(ccam.name(), payload, known_cluster, err)
                    .await;
            }
        };

        match ccam.run(&resources).await {
            Ok(result) => {
                self.execute_webhook_result(ccam.as_ref(), payload, &resources, result)
                    .await
            }
            Err(err) => {
                let cluster = Arc::clone(&resources.cluster);
                self.handle_failure(ccam.name(), payload, Some(cluster), err)
                    .await
            }
        }
    }

    async fn run_ccam_manual(
        &self,
        external_cluster_id: &str,
        known_cluster: Option<Arc<Cluster>>,
        dry_run: bool,
    ) -> Result<(), TriageError> {
        let Some(ccam) = self.registry.by_name(CCAM_INVESTIGATION) else {
            return Err(TriageError::internal(
                "credentials investigation is not registered",
            ));
        };

        let mut builder = ResourceBuilder::new(&self.services, external_cluster_id, ccam.name())
            .with_request(ccam.required_resources());
        if let Some(cluster) = known_cluster {
            builder = builder.with_known_cluster(cluster);
        }
        let resources = builder.build().await?;
        let result = ccam.run(&resources).await?;

        let executor = ManualExecutor::new(
            self.execution_context(
                Some(Arc::clone(&resources.cluster)),
                None,
                Arc::clone(&resources.notes),
                ccam.name(),
            ),
            ExecutionPolicy {
                dry_run,
                ..ExecutionPolicy::default()
            },
        );
        executor
            .execute(result.actions, ccam.informing_mode())
            .await
            .map_err(|err| executor_failure("executing credentials remediation", err))?;
        Ok(())
    }

    async fn execute_webhook_result(
        &self,
        investigation: &dyn Investigation,
        payload: &AlertPayload,
        resources: &Resources,
        result: InvestigationResult,
    ) -> Result<(), TriageError> {
        info!(
            investigation = investigation.name(),
            actions = result.actions.len(),
            must_gather = result.must_gather_performed,
            stop = result.stop_investigations,
            "investigation finished"
        );

        let executor = self.webhook_executor(
            Some(Arc::clone(&resources.cluster)),
            payload,
            Arc::clone(&resources.notes),
            investigation.name(),
        );
        executor
            .execute(result.actions, investigation.informing_mode())
            .await
            .map_err(|err| executor_failure("executing investigation actions", err))?;

        // Notes recorded by the investigation (and by report uploads during
        // execution) land on the incident as one trailing note.
        let rendered = resources
            .notes
            .lock()
            .map_err(|_| TriageError::internal("note writer lock poisoned"))?
            .render();
        if let Some(note) = rendered {
            executor
                .execute(vec![Action::note(note)], false)
                .await
                .map_err(|err| executor_failure("flushing investigation notes", err))?;
        }
        Ok(())
    }

    /// Non-retryable failures still leave the incident actionable: a note
    /// explaining the failure plus an escalation, then the original error.
    async fn handle_failure(
        &self,
        investigation: &str,
        payload: &AlertPayload,
        cluster: Option<Arc<Cluster>>,
        err: TriageError,
    ) -> Result<(), TriageError> {
        if err.is_retryable() {
            return Err(err);
        }

        error!(investigation, error = %err, "investigation failed");
        let notes = Arc::new(Mutex::new(NoteWriter::new(investigation)));
        let executor = self.webhook_executor(cluster, payload, notes, investigation);
        let outcome = executor
            .execute(
                vec![
                    Action::note(format!("Investigation '{investigation}' failed: {err}")),
                    Action::escalate("automation failed; human follow-up required"),
                ],
                false,
            )
            .await;
        if let Err(secondary) = outcome {
            error!(error = %secondary, "could not record the failure on the incident");
        }
        Err(err)
    }

    fn short_circuit_reason(
        &self,
        investigation: &dyn Investigation,
        resources: &Resources,
    ) -> Option<String> {
        if resources.cluster.state.forbids_investigation() {
            return Some(format!("cluster is {}", resources.cluster.state));
        }
        if investigation.name() != CCAM_INVESTIGATION {
            if let Some(reasons) = resources.limited_support_reasons.as_ref() {
                if let Some(reason) = reasons.first() {
                    return Some(format!(
                        "cluster is already in limited support: {}",
                        reason.summary
                    ));
                }
            }
        }
        None
    }

    fn webhook_executor(
        &self,
        cluster: Option<Arc<Cluster>>,
        payload: &AlertPayload,
        notes: Arc<Mutex<NoteWriter>>,
        investigation: &str,
    ) -> WebhookExecutor {
        WebhookExecutor::new(
            self.execution_context(
                cluster,
                Some(payload.incident_id.clone()),
                notes,
                investigation,
            ),
            ExecutionPolicy::default(),
        )
    }

    fn execution_context(
        &self,
        cluster: Option<Arc<Cluster>>,
        incident_id: Option<String>,
        notes: Arc<Mutex<NoteWriter>>,
        investigation: &str,
    ) -> ExecutionContext {
        ExecutionContext {
            cluster,
            incident_id,
            cluster_mgmt: Arc::clone(&self.services.cluster_mgmt),
            incident_tracker: self.services.incident_tracker.clone(),
            report_store: Arc::clone(&self.services.report_store),
            notes,
            investigation: investigation.to_owned(),
        }
    }
}

fn executor_failure(context: &str, err: ExecutorError) -> TriageError {
    match err {
        ExecutorError::Validation(validation) => {
            TriageError::internal(format!("{context}: {validation}"))
        }
        other => TriageError::infrastructure(context.to_owned(), Box::new(other)),
    }
}
