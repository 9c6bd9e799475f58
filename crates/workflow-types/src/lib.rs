//! Shared wire types for the approval workflow service
//!
//! Everything here is what crosses the HTTP boundary: request bodies, the
//! approval instance representation and the error body. The status and
//! outcome enums are also used directly by the domain model in
//! `workflow-core`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Overall status of an approval instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

impl ApprovalStatus {
    pub const ALL: [ApprovalStatus; 4] = [
        ApprovalStatus::Pending,
        ApprovalStatus::Approved,
        ApprovalStatus::Rejected,
        ApprovalStatus::Cancelled,
    ];

    /// Terminal instances accept no further decisions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("Unknown approval status: {}", other)),
        }
    }
}

/// Outcome carried by a single decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Approve,
    Reject,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approve => f.write_str("approve"),
            Self::Reject => f.write_str("reject"),
        }
    }
}

/// Error categories surfaced to API callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    Forbidden,
    /// Concurrent modification; the caller should re-read and retry.
    Conflict,
    Validation,
    Internal,
}

/// JSON body returned with every error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

/// `POST /approvals`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApprovalRequest {
    /// When omitted, the definition is looked up by `request_type`.
    #[serde(default)]
    pub definition_id: Option<String>,
    pub request_type: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

/// `POST /approvals/{id}/decisions`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordDecisionRequest {
    pub outcome: Outcome,
    #[serde(default)]
    pub comment: Option<String>,
    /// Step the caller believes is current; a mismatch is rejected.
    #[serde(default)]
    pub step: Option<usize>,
}

/// `GET /approvals?status=...`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListApprovalsQuery {
    #[serde(default)]
    pub status: Option<String>,
}

/// `POST /delegations`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDelegationRequest {
    /// Defaults to the calling actor.
    #[serde(default)]
    pub approver: Option<String>,
    pub delegate: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// `GET /delegations?approver=...`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListDelegationsQuery {
    #[serde(default)]
    pub approver: Option<String>,
}

/// One entry of an instance's decision log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionView {
    pub actor: String,
    pub on_behalf_of: String,
    pub step: usize,
    pub step_name: String,
    pub outcome: Outcome,
    pub comment: Option<String>,
    pub decided_at: DateTime<Utc>,
}

/// Representation returned by every `/approvals` endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalInstanceView {
    pub id: String,
    pub definition_id: String,
    pub definition_version: u32,
    pub request_type: String,
    pub requested_by: String,
    pub status: ApprovalStatus,
    pub current_step: usize,
    /// `None` once the instance has moved past its last step.
    pub current_step_name: Option<String>,
    pub total_steps: usize,
    pub decisions: Vec<DecisionView>,
    pub context: serde_json::Value,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `GET /approvals` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalListView {
    pub approvals: Vec<ApprovalInstanceView>,
    pub total_count: usize,
}

/// `GET /health` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthView {
    pub status: String,
    pub instance_counts: BTreeMap<String, usize>,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminality() {
        assert!(!ApprovalStatus::Pending.is_terminal());
        assert!(ApprovalStatus::Approved.is_terminal());
        assert!(ApprovalStatus::Rejected.is_terminal());
        assert!(ApprovalStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("pending".parse::<ApprovalStatus>().unwrap(), ApprovalStatus::Pending);
        assert_eq!(" Approved ".parse::<ApprovalStatus>().unwrap(), ApprovalStatus::Approved);
        assert_eq!("canceled".parse::<ApprovalStatus>().unwrap(), ApprovalStatus::Cancelled);
        assert!("done".parse::<ApprovalStatus>().is_err());
    }

    #[test]
    fn test_error_body_uses_snake_case_kind() {
        let body = ErrorBody {
            kind: ErrorKind::InvalidState,
            message: "instance is approved".to_string(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"kind\":\"invalid_state\""));
    }

    #[test]
    fn test_decision_request_defaults() {
        let req: RecordDecisionRequest = serde_json::from_str(r#"{"outcome":"approve"}"#).unwrap();
        assert_eq!(req.outcome, Outcome::Approve);
        assert!(req.comment.is_none());
        assert!(req.step.is_none());
    }
}
