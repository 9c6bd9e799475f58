//! Approval instance engine
//!
//! Drives approval instances through the steps of the definition version they
//! were started on. Every instance mutation is a read-modify-write checked
//! against the record version, so two racing decisions cannot both land.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use workflow_types::{ApprovalInstanceView, DecisionView, HealthView};

use super::approval_types::*;
use super::definition::{Step, WorkflowDefinition};
use super::delegation::{effective_actors, resolve_authority};
use super::rules;
use super::store::ApprovalStore;
use super::traits::{Directory, Notification, NotificationEvent, Notifier};
use crate::error::{Result, WorkflowError};

pub struct ApprovalEngine {
    store: Arc<dyn ApprovalStore>,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
}

impl ApprovalEngine {
    pub fn new(
        store: Arc<dyn ApprovalStore>,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    // ---- definitions ----

    /// Validate and store `definition` as the next version of its id
    pub fn publish_definition(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition> {
        definition.validate()?;
        self.store.publish_definition(definition)
    }

    /// Latest version of a definition
    pub fn definition(&self, id: &DefinitionId) -> Result<WorkflowDefinition> {
        self.store
            .latest_definition(id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("Definition {} not found", id)))
    }

    pub fn definitions(&self) -> Result<Vec<WorkflowDefinition>> {
        self.store.list_definitions()
    }

    /// Publish an inactive copy of the latest version.
    /// Instances already running keep their own version and are unaffected.
    pub fn deactivate_definition(&self, id: &DefinitionId) -> Result<WorkflowDefinition> {
        let mut definition = self.definition(id)?;
        if !definition.active {
            return Err(WorkflowError::InvalidState(format!(
                "Definition {} is already inactive",
                id
            )));
        }

        definition.active = false;
        definition.created_at = Utc::now();
        let stored = self.store.publish_definition(definition)?;

        log::info!("Deactivated definition {} (v{})", stored.id, stored.version);
        Ok(stored)
    }

    /// Publish every definition in a JSON array file.
    /// A definition identical to its latest stored version is skipped so that
    /// restarts do not pile up versions.
    pub fn bootstrap_definitions<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let definitions: Vec<WorkflowDefinition> = serde_json::from_str(&content).map_err(|e| {
            WorkflowError::Validation(format!("Invalid definitions file {}: {}", path.display(), e))
        })?;

        let mut published = 0;
        for definition in definitions {
            if let Some(latest) = self.store.latest_definition(&definition.id)? {
                if same_content(&latest, &definition) {
                    log::debug!("Definition {} unchanged, keeping v{}", latest.id, latest.version);
                    continue;
                }
            }
            self.publish_definition(definition)?;
            published += 1;
        }

        log::info!("Bootstrapped {} definitions from {}", published, path.display());
        Ok(published)
    }

    // ---- instances ----

    /// Start an approval instance on the latest version of a definition.
    ///
    /// Without an explicit id, the first active definition (by id) whose
    /// `applies_to` names the request type is used.
    pub async fn create(
        &self,
        definition_id: Option<&DefinitionId>,
        request: RequestContext,
    ) -> Result<ApprovalInstance> {
        if request.request_type.trim().is_empty() {
            return Err(WorkflowError::Validation("request_type is required".to_string()));
        }
        if request.requested_by.as_str().trim().is_empty() {
            return Err(WorkflowError::Validation("requester is required".to_string()));
        }

        let definition = match definition_id {
            Some(id) => {
                let definition = self
                    .store
                    .latest_definition(id)?
                    .filter(|d| d.active)
                    .ok_or_else(|| {
                        WorkflowError::NotFound(format!("No active definition {}", id))
                    })?;

                if !definition.governs(&request.request_type) {
                    return Err(WorkflowError::Validation(format!(
                        "Definition {} does not apply to request type '{}'",
                        id, request.request_type
                    )));
                }
                definition
            }
            None => self
                .store
                .list_definitions()?
                .into_iter()
                .find(|d| d.active && d.applies_to.iter().any(|t| t == &request.request_type))
                .ok_or_else(|| {
                    WorkflowError::NotFound(format!(
                        "No active definition for request type '{}'",
                        request.request_type
                    ))
                })?,
        };

        let instance = ApprovalInstance::new(&definition, request);
        self.store.insert_instance(&instance)?;

        log::info!(
            "Created approval {} on {} v{} for {}",
            instance.id,
            definition.id,
            definition.version,
            instance.requested_by
        );

        self.notify_step(&instance, &definition).await;
        Ok(instance)
    }

    pub async fn record_decision(
        &self,
        id: &InstanceId,
        actor: &ActorId,
        outcome: Outcome,
        comment: Option<String>,
    ) -> Result<ApprovalInstance> {
        self.record_decision_at_step(id, actor, outcome, comment, None).await
    }

    /// Record a decision, optionally asserting which step it was meant for
    pub async fn record_decision_at_step(
        &self,
        id: &InstanceId,
        actor: &ActorId,
        outcome: Outcome,
        comment: Option<String>,
        expected_step: Option<usize>,
    ) -> Result<ApprovalInstance> {
        let mut instance = self.get(id)?;
        ensure_pending(&instance)?;

        if let Some(step) = expected_step {
            if step != instance.current_step {
                return Err(WorkflowError::InvalidState(format!(
                    "Approval {} is at step {}, not step {}",
                    id, instance.current_step, step
                )));
            }
        }

        let definition = self.definition_of(&instance)?;
        let step_index = instance.current_step;
        let step = step_of(&definition, step_index)?;

        let now = Utc::now();
        let delegations = self.store.list_delegations(None)?;
        let mut approved = instance.approvers_at(step_index);

        let on_behalf_of = match resolve_authority(
            actor,
            step,
            self.directory.as_ref(),
            &delegations,
            &approved,
            now,
        ) {
            Some(approver) => approver,
            None => return Err(self.unauthorized(&instance, &definition, actor, &delegations, now)),
        };

        if approved.contains(&on_behalf_of) {
            return Err(WorkflowError::InvalidState(format!(
                "{} already approved step '{}' of {}",
                on_behalf_of, step.name, id
            )));
        }

        instance.push_decision(Decision {
            actor: actor.clone(),
            on_behalf_of: on_behalf_of.clone(),
            step_index,
            outcome,
            comment,
            decided_at: now,
        });

        match outcome {
            Outcome::Reject => instance.mark_rejected(),
            Outcome::Approve => {
                approved.insert(on_behalf_of.clone());
                let eligible = step.approvers.eligible(self.directory.as_ref());
                if rules::is_satisfied(step.rule, &eligible, &approved) {
                    instance.advance(definition.total_steps());
                }
            }
        }

        self.save(&mut instance)?;

        if actor == &on_behalf_of {
            log::info!("{} decided {} on approval {} step {}", actor, outcome, id, step_index);
        } else {
            log::info!(
                "{} decided {} on approval {} step {} on behalf of {}",
                actor,
                outcome,
                id,
                step_index,
                on_behalf_of
            );
        }

        if instance.status.is_terminal() {
            self.notify_completed(&instance).await;
        } else if instance.current_step != step_index {
            self.notify_step(&instance, &definition).await;
        }

        Ok(instance)
    }

    /// Cancel a pending instance on behalf of its requester or a current approver
    pub async fn cancel(&self, id: &InstanceId, actor: &ActorId) -> Result<ApprovalInstance> {
        let mut instance = self.get(id)?;
        ensure_pending(&instance)?;

        if actor != &instance.requested_by {
            let definition = self.definition_of(&instance)?;
            let step = step_of(&definition, instance.current_step)?;
            let delegations = self.store.list_delegations(None)?;
            let authority = resolve_authority(
                actor,
                step,
                self.directory.as_ref(),
                &delegations,
                &BTreeSet::new(),
                Utc::now(),
            );

            if authority.is_none() {
                return Err(WorkflowError::Forbidden(format!(
                    "{} may not cancel approval {}",
                    actor, id
                )));
            }
        }

        instance.mark_cancelled();
        self.save(&mut instance)?;

        log::info!("{} cancelled approval {}", actor, id);
        self.notify_completed(&instance).await;
        Ok(instance)
    }

    pub fn get(&self, id: &InstanceId) -> Result<ApprovalInstance> {
        self.store
            .get_instance(id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("Approval {} not found", id)))
    }

    pub fn list(&self, status: Option<ApprovalStatus>) -> Result<Vec<ApprovalInstance>> {
        self.store.list_instances(status)
    }

    // ---- delegations ----

    pub fn add_delegation(
        &self,
        approver: ActorId,
        delegate: ActorId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<Delegation> {
        let delegation = Delegation::new(approver, delegate, starts_at, ends_at, reason)?;
        self.store.put_delegation(&delegation)?;
        Ok(delegation)
    }

    pub fn delegations(&self, approver: Option<&ActorId>) -> Result<Vec<Delegation>> {
        self.store.list_delegations(approver)
    }

    // ---- representation ----

    /// API representation with step names resolved from the definition version
    pub fn view(&self, instance: &ApprovalInstance) -> Result<ApprovalInstanceView> {
        let definition = self.definition_of(instance)?;
        let step_name = |index: usize| {
            definition
                .step(index)
                .map(|s| s.name.clone())
                .unwrap_or_default()
        };

        let decisions = instance
            .decisions()
            .iter()
            .map(|d| DecisionView {
                actor: d.actor.to_string(),
                on_behalf_of: d.on_behalf_of.to_string(),
                step: d.step_index,
                step_name: step_name(d.step_index),
                outcome: d.outcome,
                comment: d.comment.clone(),
                decided_at: d.decided_at,
            })
            .collect();

        Ok(ApprovalInstanceView {
            id: instance.id.to_string(),
            definition_id: instance.definition_id.to_string(),
            definition_version: instance.definition_version,
            request_type: instance.request_type.clone(),
            requested_by: instance.requested_by.to_string(),
            status: instance.status,
            current_step: instance.current_step,
            current_step_name: definition.step(instance.current_step).map(|s| s.name.clone()),
            total_steps: definition.total_steps(),
            decisions,
            context: instance.context.clone(),
            version: instance.version,
            created_at: instance.created_at,
            updated_at: instance.updated_at,
        })
    }

    pub fn health(&self) -> HealthView {
        let (status, counts) = match self.store.status_counts() {
            Ok(counts) => (HealthStatus::Healthy, counts),
            Err(e) => {
                log::error!("Health check could not read the store: {}", e);
                (HealthStatus::Degraded, StatusCounts::new())
            }
        };

        HealthView {
            status: status.as_str().to_string(),
            instance_counts: counts.by_name(),
            checked_at: Utc::now(),
        }
    }

    // ---- internals ----

    fn definition_of(&self, instance: &ApprovalInstance) -> Result<WorkflowDefinition> {
        self.store
            .get_definition(&instance.definition_id, instance.definition_version)?
            .ok_or_else(|| {
                WorkflowError::Storage(format!(
                    "Approval {} references missing definition {} v{}",
                    instance.id, instance.definition_id, instance.definition_version
                ))
            })
    }

    /// Bump the record version and write, failing if someone else wrote first
    fn save(&self, instance: &mut ApprovalInstance) -> Result<()> {
        let expected = instance.version;
        instance.version += 1;
        self.store.update_instance(instance, expected)
    }

    /// Error for an actor with no authority at the current step.
    /// Someone who could have decided at an already passed step gets
    /// `InvalidState`; everyone else is `Forbidden`.
    fn unauthorized(
        &self,
        instance: &ApprovalInstance,
        definition: &WorkflowDefinition,
        actor: &ActorId,
        delegations: &[Delegation],
        now: DateTime<Utc>,
    ) -> WorkflowError {
        let passed = definition.steps[..instance.current_step.min(definition.total_steps())]
            .iter()
            .any(|step| {
                resolve_authority(actor, step, self.directory.as_ref(), delegations, &BTreeSet::new(), now)
                    .is_some()
            });

        if passed {
            WorkflowError::InvalidState(format!(
                "Approval {} has already moved past the steps {} can decide",
                instance.id, actor
            ))
        } else {
            WorkflowError::Forbidden(format!(
                "{} is not an approver of the current step of {}",
                actor, instance.id
            ))
        }
    }

    /// Everyone who may act on `step` right now
    fn recipients_for(&self, step: &Step) -> Result<Vec<ActorId>> {
        let delegations = self.store.list_delegations(None)?;
        let now = Utc::now();

        let recipients: BTreeSet<ActorId> = step
            .approvers
            .eligible(self.directory.as_ref())
            .iter()
            .flat_map(|approver| effective_actors(approver, step, &delegations, now))
            .collect();
        Ok(recipients.into_iter().collect())
    }

    async fn notify_step(&self, instance: &ApprovalInstance, definition: &WorkflowDefinition) {
        let Some(step) = definition.step(instance.current_step) else {
            return;
        };

        let recipients = match self.recipients_for(step) {
            Ok(recipients) => recipients,
            Err(e) => {
                log::error!("Could not resolve approvers for {}: {}", instance.id, e);
                return;
            }
        };

        let notification = Notification {
            event: NotificationEvent::ApprovalRequested,
            instance_id: instance.id.clone(),
            definition_id: instance.definition_id.clone(),
            status: instance.status,
            step_index: Some(instance.current_step),
            step_name: Some(step.name.clone()),
            recipients,
        };
        self.send(notification).await;
    }

    async fn notify_completed(&self, instance: &ApprovalInstance) {
        let notification = Notification {
            event: NotificationEvent::InstanceCompleted,
            instance_id: instance.id.clone(),
            definition_id: instance.definition_id.clone(),
            status: instance.status,
            step_index: None,
            step_name: None,
            recipients: vec![instance.requested_by.clone()],
        };
        self.send(notification).await;
    }

    /// The mutation is already committed; a failed notification is only logged
    async fn send(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification).await {
            log::error!(
                "Failed to send {:?} notification for {}: {}",
                notification.event,
                notification.instance_id,
                e
            );
        }
    }
}

fn ensure_pending(instance: &ApprovalInstance) -> Result<()> {
    if instance.status.is_terminal() {
        return Err(WorkflowError::InvalidState(format!(
            "Approval {} is already {}",
            instance.id, instance.status
        )));
    }
    Ok(())
}

fn step_of(definition: &WorkflowDefinition, index: usize) -> Result<&Step> {
    definition.step(index).ok_or_else(|| {
        WorkflowError::Storage(format!(
            "Definition {} v{} has no step {}",
            definition.id, definition.version, index
        ))
    })
}

fn same_content(a: &WorkflowDefinition, b: &WorkflowDefinition) -> bool {
    a.name == b.name && a.active == b.active && a.applies_to == b.applies_to && a.steps == b.steps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{RecordingNotifier, StaticDirectory};
    use crate::workflow::definition::{ApproverSpec, TransitionRule};
    use crate::workflow::store::InMemoryStore;

    fn engine_with(notifier: Arc<RecordingNotifier>) -> ApprovalEngine {
        ApprovalEngine::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(StaticDirectory::default()),
            notifier,
        )
    }

    fn two_step() -> WorkflowDefinition {
        WorkflowDefinition {
            id: DefinitionId::parse("expense").unwrap(),
            version: 1,
            name: "Expense".to_string(),
            active: true,
            applies_to: vec!["expense".to_string()],
            steps: vec![
                Step {
                    name: "manager".to_string(),
                    approvers: ApproverSpec::User(ActorId::new("maria")),
                    delegate_to: None,
                    rule: TransitionRule::AnyApprove,
                },
                Step {
                    name: "finance".to_string(),
                    approvers: ApproverSpec::User(ActorId::new("fred")),
                    delegate_to: None,
                    rule: TransitionRule::AnyApprove,
                },
            ],
            created_at: Utc::now(),
        }
    }

    fn request() -> RequestContext {
        RequestContext {
            request_type: "expense".to_string(),
            requested_by: ActorId::new("ivan"),
            payload: serde_json::json!({"amount": 40}),
        }
    }

    #[tokio::test]
    async fn test_notifications_follow_progress() {
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = engine_with(notifier.clone());
        engine.publish_definition(two_step()).unwrap();

        let instance = engine.create(None, request()).await.unwrap();
        engine
            .record_decision(&instance.id, &ActorId::new("maria"), Outcome::Approve, None)
            .await
            .unwrap();
        engine
            .record_decision(&instance.id, &ActorId::new("fred"), Outcome::Approve, None)
            .await
            .unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].recipients, vec![ActorId::new("maria")]);
        assert_eq!(sent[1].step_name.as_deref(), Some("finance"));
        assert_eq!(sent[2].event, NotificationEvent::InstanceCompleted);
        assert_eq!(sent[2].recipients, vec![ActorId::new("ivan")]);
    }

    #[tokio::test]
    async fn test_failed_notification_does_not_fail_the_call() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let engine = engine_with(notifier.clone());
        engine.publish_definition(two_step()).unwrap();

        let instance = engine.create(None, request()).await.unwrap();
        assert_eq!(instance.status, ApprovalStatus::Pending);
        assert_eq!(engine.get(&instance.id).unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_view_resolves_step_names() {
        let engine = engine_with(Arc::new(RecordingNotifier::new()));
        engine.publish_definition(two_step()).unwrap();

        let instance = engine.create(None, request()).await.unwrap();
        let instance = engine
            .record_decision(&instance.id, &ActorId::new("maria"), Outcome::Approve, Some("ok".into()))
            .await
            .unwrap();

        let view = engine.view(&instance).unwrap();
        assert_eq!(view.current_step, 1);
        assert_eq!(view.current_step_name.as_deref(), Some("finance"));
        assert_eq!(view.total_steps, 2);
        assert_eq!(view.decisions[0].step_name, "manager");
        assert_eq!(view.decisions[0].comment.as_deref(), Some("ok"));
        assert_eq!(view.version, 2);
    }

    #[tokio::test]
    async fn test_deactivated_definition_refuses_new_instances() {
        let engine = engine_with(Arc::new(RecordingNotifier::new()));
        let def = engine.publish_definition(two_step()).unwrap();
        let running = engine.create(Some(&def.id), request()).await.unwrap();

        let inactive = engine.deactivate_definition(&def.id).unwrap();
        assert_eq!(inactive.version, 2);
        assert!(!inactive.active);

        let err = engine.create(Some(&def.id), request()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));

        // In-flight instance still progresses on v1
        let running = engine
            .record_decision(&running.id, &ActorId::new("maria"), Outcome::Approve, None)
            .await
            .unwrap();
        assert_eq!(running.current_step, 1);
        assert_eq!(running.definition_version, 1);
    }

    #[test]
    fn test_health_reports_counts() {
        let engine = engine_with(Arc::new(RecordingNotifier::new()));
        let health = engine.health();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.instance_counts.get("pending"), Some(&0));
    }
}
