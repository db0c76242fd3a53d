//! Validation and execution of the declared action list. The executor is
//! the only component that mutates external systems; everything upstream of
//! it is read-only.

pub mod retry;

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    action::{Action, ActionKind, TargetSystem},
    capabilities::{
        ClusterMgmt, IncidentTracker, LimitedSupportReason, ReportStore, ServiceLogEntry,
    },
    cluster::Cluster,
    errors::DynError,
    metrics,
    notes::NoteWriter,
};

/// Collaborator handles an action may touch during execution.
pub struct ExecutionContext {
    pub cluster: Option<Arc<Cluster>>,
    pub incident_id: Option<String>,
    pub cluster_mgmt: Arc<dyn ClusterMgmt>,
    pub incident_tracker: Option<Arc<dyn IncidentTracker>>,
    pub report_store: Arc<dyn ReportStore>,
    pub notes: Arc<Mutex<NoteWriter>>,
    pub investigation: String,
}

/// Knobs governing one executor invocation.
#[derive(Clone, Copy, Debug)]
pub struct ExecutionPolicy {
    pub dry_run: bool,
    pub max_retries: u32,
    pub stop_on_error: bool,
    pub concurrent: bool,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_retries: 3,
            stop_on_error: false,
            concurrent: false,
        }
    }
}

#[derive(Debug, Error)]
#[error("action {index} ({kind}) failed validation: {reason}")]
pub struct ActionValidationError {
    pub index: usize,
    pub kind: ActionKind,
    pub reason: String,
}

#[derive(Debug, Error)]
#[error("{kind} failed after {attempts} attempt(s): {source}")]
pub struct ActionExecutionError {
    pub kind: ActionKind,
    pub attempts: u32,
    #[source]
    pub source: DynError,
}

#[derive(Debug, Error)]
#[error("{} action(s) failed: {}", .failures.len(), failure_summary(.failures))]
pub struct MultipleActionsError {
    pub failures: Vec<ActionExecutionError>,
}

fn failure_summary(failures: &[ActionExecutionError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Validation(#[from] ActionValidationError),
    #[error(transparent)]
    Execution(#[from] MultipleActionsError),
    #[error("action execution cancelled")]
    Cancelled,
}

/// A single attempt chain's terminal outcome.
enum AttemptFailure {
    Cancelled,
    Failed(ActionExecutionError),
}

/// Result of one successful dispatch.
enum ActionOutcome {
    Executed,
    /// Suppressed without side effect (duplicate, or prefix already set).
    Skipped(&'static str),
}

/// Shared execution core. The webhook and manual flavours wrap it.
pub struct DefaultExecutor {
    ctx: Arc<ExecutionContext>,
    policy: ExecutionPolicy,
    cancel: CancellationToken,
}

impl DefaultExecutor {
    #[must_use]
    pub fn new(ctx: ExecutionContext, policy: ExecutionPolicy) -> Self {
        Self {
            ctx: Arc::new(ctx),
            policy,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Validates every action, applies the informing-mode rewrite, then
    /// executes under the configured policy.
    pub async fn run(&self, actions: Vec<Action>, informing: bool) -> Result<(), ExecutorError> {
        for (index, action) in actions.iter().enumerate() {
            if let Err(reason) = action.validate() {
                return Err(ActionValidationError {
                    index,
                    kind: action.kind(),
                    reason,
                }
                .into());
            }
        }

        let actions = if informing {
            rewrite_for_informing(actions)
        } else {
            actions
        };

        if self.policy.dry_run {
            for action in &actions {
                let payload =
                    serde_json::to_string(action).unwrap_or_else(|_| "<unprintable>".to_owned());
                info!(kind = %action.kind(), %payload, "dry run: would execute action");
            }
            return Ok(());
        }

        if actions.is_empty() {
            debug!("no actions to execute");
            return Ok(());
        }

        let failures = if self.policy.concurrent {
            self.run_grouped(actions).await?
        } else {
            run_group(
                Arc::clone(&self.ctx),
                self.policy,
                self.cancel.clone(),
                actions,
            )
            .await?
        };

        if failures.is_empty() {
            Ok(())
        } else {
            Err(MultipleActionsError { failures }.into())
        }
    }

    /// Partitions by target system and runs one ordered task per group.
    /// Groups proceed concurrently; inside a group submission order holds.
    async fn run_grouped(
        &self,
        actions: Vec<Action>,
    ) -> Result<Vec<ActionExecutionError>, ExecutorError> {
        let mut incident = Vec::new();
        let mut cluster_mgmt = Vec::new();
        let mut reports = Vec::new();
        for action in actions {
            match action.target() {
                TargetSystem::IncidentTracker => incident.push(action),
                TargetSystem::ClusterMgmt => cluster_mgmt.push(action),
                TargetSystem::ReportStore => reports.push(action),
            }
        }

        let mut groups = JoinSet::new();
        for group in [incident, cluster_mgmt, reports] {
            if group.is_empty() {
                continue;
            }
            groups.spawn(run_group(
                Arc::clone(&self.ctx),
                self.policy,
                self.cancel.clone(),
                group,
            ));
        }

        let mut failures = Vec::new();
        let mut cancelled = false;
        while let Some(joined) = groups.join_next().await {
            match joined {
                Ok(Ok(group_failures)) => failures.extend(group_failures),
                Ok(Err(ExecutorError::Cancelled)) => cancelled = true,
                Ok(Err(other)) => return Err(other),
                Err(join_err) => {
                    return Err(MultipleActionsError {
                        failures: vec![ActionExecutionError {
                            kind: ActionKind::PagerdutyNote,
                            attempts: 0,
                            source: format!("action group task failed: {join_err}").into(),
                        }],
                    }
                    .into())
                }
            }
        }

        if cancelled {
            return Err(ExecutorError::Cancelled);
        }
        Ok(failures)
    }
}

/// Runs one ordered slice of actions, accumulating failures per policy.
async fn run_group(
    ctx: Arc<ExecutionContext>,
    policy: ExecutionPolicy,
    cancel: CancellationToken,
    actions: Vec<Action>,
) -> Result<Vec<ActionExecutionError>, ExecutorError> {
    let mut failures = Vec::new();
    for action in actions {
        match execute_with_retry(&ctx, policy, &cancel, &action).await {
            Ok(()) => {}
            Err(AttemptFailure::Cancelled) => return Err(ExecutorError::Cancelled),
            Err(AttemptFailure::Failed(failure)) => {
                warn!(
                    kind = %failure.kind,
                    attempts = failure.attempts,
                    error = %failure.source,
                    "action failed"
                );
                let stop = policy.stop_on_error;
                failures.push(failure);
                if stop {
                    break;
                }
            }
        }
    }
    Ok(failures)
}

/// Retries a single action on transient failures with quadratic backoff.
/// Cancellation aborts between attempts and during backoff.
async fn execute_with_retry(
    ctx: &ExecutionContext,
    policy: ExecutionPolicy,
    cancel: &CancellationToken,
    action: &Action,
) -> Result<(), AttemptFailure> {
    let kind = action.kind();
    let max_attempts = policy.max_retries + 1;
    let mut attempt: u32 = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(AttemptFailure::Cancelled);
        }

        match execute_one(ctx, action).await {
            Ok(ActionOutcome::Executed) => {
                metrics::record_action(kind, &ctx.investigation);
                debug!(kind = %kind, attempt, "action executed");
                return Ok(());
            }
            Ok(ActionOutcome::Skipped(reason)) => {
                info!(kind = %kind, reason, "action skipped");
                return Ok(());
            }
            Err(source) => {
                if attempt >= max_attempts || !retry::is_retryable(source.as_ref()) {
                    return Err(AttemptFailure::Failed(ActionExecutionError {
                        kind,
                        attempts: attempt,
                        source,
                    }));
                }
                let delay = retry::backoff_delay(attempt);
                warn!(
                    kind = %kind,
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %source,
                    "transient failure; retrying"
                );
                tokio::select! {
                    () = cancel.cancelled() => return Err(AttemptFailure::Cancelled),
                    () = sleep(delay) => {}
                }
                attempt += 1;
            }
        }
    }
}

/// Dispatches one action against its collaborator.
async fn execute_one(ctx: &ExecutionContext, action: &Action) -> Result<ActionOutcome, DynError> {
    match action {
        Action::ServiceLog(params) => {
            let cluster = require_cluster(ctx)?;
            if !params.allow_duplicates {
                let existing = ctx.cluster_mgmt.service_logs(&cluster.internal_id).await?;
                if existing.iter().any(|entry| entry.summary == params.summary) {
                    return Ok(ActionOutcome::Skipped("identical service log already posted"));
                }
            }
            let entry = ServiceLogEntry {
                severity: params.severity,
                service_name: params.service_name.clone(),
                summary: params.summary.clone(),
                description: params.description.clone(),
                internal_only: params.internal_only,
            };
            ctx.cluster_mgmt
                .post_service_log(&cluster.internal_id, &entry)
                .await?;
            Ok(ActionOutcome::Executed)
        }
        Action::LimitedSupport(params) => {
            let cluster = require_cluster(ctx)?;
            if !params.allow_duplicates {
                let existing = ctx
                    .cluster_mgmt
                    .limited_support_reasons(&cluster.internal_id)
                    .await?;
                if existing.iter().any(|reason| reason.summary == params.summary) {
                    return Ok(ActionOutcome::Skipped(
                        "identical limited-support reason already present",
                    ));
                }
            }
            let reason = LimitedSupportReason {
                summary: params.summary.clone(),
                details: params.details.clone(),
            };
            ctx.cluster_mgmt
                .post_limited_support(&cluster.internal_id, &reason)
                .await?;
            Ok(ActionOutcome::Executed)
        }
        Action::PagerdutyNote(params) => {
            let (tracker, incident_id) = require_incident(ctx)?;
            tracker.add_note(incident_id, &params.content).await?;
            Ok(ActionOutcome::Executed)
        }
        Action::PagerdutyTitleUpdate(params) => {
            let (tracker, incident_id) = require_incident(ctx)?;
            let title = tracker.incident_title(incident_id).await?;
            if title.contains(&params.prefix) {
                return Ok(ActionOutcome::Skipped("title prefix already present"));
            }
            let updated = format!("{}{title}", params.prefix);
            tracker.set_incident_title(incident_id, &updated).await?;
            Ok(ActionOutcome::Executed)
        }
        Action::SilenceIncident(params) => {
            let (tracker, incident_id) = require_incident(ctx)?;
            if let Some(reason) = &params.reason {
                info!(incident_id, %reason, "silencing incident");
            }
            tracker.silence(incident_id).await?;
            Ok(ActionOutcome::Executed)
        }
        Action::EscalateIncident(params) => {
            let (tracker, incident_id) = require_incident(ctx)?;
            if let Some(reason) = &params.reason {
                info!(incident_id, %reason, "escalating incident");
            }
            tracker.escalate(incident_id).await?;
            Ok(ActionOutcome::Executed)
        }
        Action::BackplaneReport(params) => {
            use base64::Engine as _;
            let data = base64::engine::general_purpose::STANDARD
                .decode(&params.data)
                .map_err(|err| format!("report data is not valid base64: {err}"))?;
            let report_id = ctx
                .report_store
                .upload_report(&params.cluster_id, &params.summary, &data)
                .await?;
            ctx.notes
                .lock()
                .map_err(|_| "note writer lock poisoned".to_owned())?
                .info(format!("cluster report uploaded with id {report_id}"));
            Ok(ActionOutcome::Executed)
        }
    }
}

fn require_cluster(ctx: &ExecutionContext) -> Result<&Arc<Cluster>, DynError> {
    ctx.cluster
        .as_ref()
        .ok_or_else(|| "no cluster resolved for this run".into())
}

fn require_incident(ctx: &ExecutionContext) -> Result<(&Arc<dyn IncidentTracker>, &str), DynError> {
    let tracker = ctx
        .incident_tracker
        .as_ref()
        .ok_or("no incident tracker configured for this run")?;
    let incident_id = ctx
        .incident_id
        .as_deref()
        .ok_or("no incident associated with this run")?;
    Ok((tracker, incident_id))
}

/// Informing-mode rewrite: escalations become notes carrying the reason,
/// silences disappear.
fn rewrite_for_informing(actions: Vec<Action>) -> Vec<Action> {
    actions
        .into_iter()
        .filter_map(|action| match action {
            Action::EscalateIncident(params) => Some(Action::note(
                params
                    .reason
                    .unwrap_or_else(|| "escalation requested".to_owned()),
            )),
            Action::SilenceIncident(_) => None,
            other => Some(other),
        })
        .collect()
}

/// Executes every action type; the flavour used for webhook runs.
pub struct WebhookExecutor {
    inner: DefaultExecutor,
}

impl WebhookExecutor {
    #[must_use]
    pub fn new(ctx: ExecutionContext, policy: ExecutionPolicy) -> Self {
        Self {
            inner: DefaultExecutor::new(ctx, policy),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.inner = self.inner.with_cancellation(cancel);
        self
    }

    pub async fn execute(
        &self,
        actions: Vec<Action>,
        informing: bool,
    ) -> Result<(), ExecutorError> {
        self.inner.run(actions, informing).await
    }
}

/// Manual-mode flavour: incident-scoped actions are dropped before
/// validation because no incident exists.
pub struct ManualExecutor {
    inner: DefaultExecutor,
}

impl ManualExecutor {
    #[must_use]
    pub fn new(ctx: ExecutionContext, policy: ExecutionPolicy) -> Self {
        Self {
            inner: DefaultExecutor::new(ctx, policy),
        }
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.inner = self.inner.with_cancellation(cancel);
        self
    }

    pub async fn execute(
        &self,
        actions: Vec<Action>,
        informing: bool,
    ) -> Result<(), ExecutorError> {
        let submitted = actions.len();
        let actions: Vec<Action> = actions
            .into_iter()
            .filter(|action| !action.is_incident_scoped())
            .collect();
        let filtered = submitted - actions.len();
        if filtered > 0 {
            info!(filtered, submitted, "filtered incident-scoped actions in manual mode");
        }
        self.inner.run(actions, informing).await
    }
}
