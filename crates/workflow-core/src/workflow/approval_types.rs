//! Strongly typed approval instance model
//! Identifiers are newtypes, statuses and outcomes are enums - no stringly typed state

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use chrono::{DateTime, Utc};

use crate::error::{Result, WorkflowError};
use super::definition::WorkflowDefinition;

pub use workflow_types::{ApprovalStatus, Outcome};

/// Strongly typed InstanceId
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        uuid::Uuid::parse_str(s)
            .map(|_| Self(s.to_string()))
            .map_err(|e| WorkflowError::Validation(format!("Invalid InstanceId format: {}", e)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed DefinitionId
///
/// Definition ids are chosen by whoever publishes the definition and double as
/// directory names in the file store, so only `[A-Za-z0-9_.-]` is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DefinitionId(String);

impl DefinitionId {
    pub fn parse(s: &str) -> Result<Self> {
        let valid = !s.is_empty()
            && s.len() <= 128
            && !s.starts_with('.')
            && s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(WorkflowError::Validation(format!("Invalid DefinitionId '{}'", s)))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DefinitionId {
    type Error = WorkflowError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<DefinitionId> for String {
    fn from(id: DefinitionId) -> Self {
        id.0
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed ActorId (a user identity as resolved by the gateway)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Strongly typed DelegationId
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DelegationId(String);

impl DelegationId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for DelegationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DelegationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What an approval is being requested for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    pub request_type: String,
    pub requested_by: ActorId,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A single recorded decision. Never modified after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub actor: ActorId,
    /// Nominal approver this decision counts for; differs from `actor` when delegated
    pub on_behalf_of: ActorId,
    pub step_index: usize,
    pub outcome: Outcome,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// One in-flight (or finished) execution of a definition version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalInstance {
    pub id: InstanceId,
    pub definition_id: DefinitionId,
    pub definition_version: u32,
    pub request_type: String,
    pub requested_by: ActorId,
    #[serde(default)]
    pub context: serde_json::Value,
    pub current_step: usize,
    pub status: ApprovalStatus,
    decisions: Vec<Decision>,
    /// Record version for optimistic concurrency, bumped on every write
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApprovalInstance {
    /// Start a new instance at step 0
    pub fn new(definition: &WorkflowDefinition, request: RequestContext) -> Self {
        let now = Utc::now();

        Self {
            id: InstanceId::new(),
            definition_id: definition.id.clone(),
            definition_version: definition.version,
            request_type: request.request_type,
            requested_by: request.requested_by,
            context: request.payload,
            current_step: 0,
            status: ApprovalStatus::Pending,
            decisions: Vec::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append-only decision log
    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// Nominal approvers that approved the given step
    pub fn approvers_at(&self, step_index: usize) -> BTreeSet<ActorId> {
        self.decisions
            .iter()
            .filter(|d| d.step_index == step_index && d.outcome == Outcome::Approve)
            .map(|d| d.on_behalf_of.clone())
            .collect()
    }

    pub(crate) fn push_decision(&mut self, decision: Decision) {
        self.updated_at = decision.decided_at;
        self.decisions.push(decision);
    }

    /// Move to the next step, or to `approved` past the last one
    pub(crate) fn advance(&mut self, total_steps: usize) {
        self.current_step = (self.current_step + 1).min(total_steps);
        if self.current_step == total_steps {
            self.status = ApprovalStatus::Approved;
        }
        self.updated_at = Utc::now();
    }

    pub(crate) fn mark_rejected(&mut self) {
        self.status = ApprovalStatus::Rejected;
        self.updated_at = Utc::now();
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.status = ApprovalStatus::Cancelled;
        self.updated_at = Utc::now();
    }
}

/// Temporary reassignment of approval authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub id: DelegationId,
    pub approver: ActorId,
    pub delegate: ActorId,
    pub starts_at: DateTime<Utc>,
    /// Exclusive upper bound
    pub ends_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Delegation {
    pub fn new(
        approver: ActorId,
        delegate: ActorId,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<Self> {
        if approver == delegate {
            return Err(WorkflowError::Validation(format!(
                "{} cannot delegate to themselves",
                approver
            )));
        }
        if ends_at <= starts_at {
            return Err(WorkflowError::Validation(
                "Delegation must end after it starts".to_string(),
            ));
        }

        Ok(Self {
            id: DelegationId::new(),
            approver,
            delegate,
            starts_at,
            ends_at,
            reason,
            created_at: Utc::now(),
        })
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.starts_at <= at && at < self.ends_at
    }
}

/// Health check status enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
        }
    }
}

/// Instance count per status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    counts: BTreeMap<ApprovalStatus, usize>,
}

impl StatusCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, status: ApprovalStatus) {
        *self.counts.entry(status).or_insert(0) += 1;
    }

    pub fn get(&self, status: ApprovalStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Counts keyed by status name, zero entries included
    pub fn by_name(&self) -> BTreeMap<String, usize> {
        ApprovalStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), self.get(*s)))
            .collect()
    }
}
