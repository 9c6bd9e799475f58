//! Workflow definitions: ordered approval steps and their transition rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use super::approval_types::{ActorId, DefinitionId};
use super::traits::Directory;
use crate::error::{Result, WorkflowError};

/// Who is required to decide on a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverSpec {
    /// Every member of the role is an eligible approver
    Role(String),
    User(ActorId),
    Users(Vec<ActorId>),
}

impl ApproverSpec {
    /// Whether `actor` is a nominal approver
    pub fn includes(&self, actor: &ActorId, directory: &dyn Directory) -> bool {
        match self {
            Self::Role(role) => directory.roles_of(actor).iter().any(|r| r == role),
            Self::User(user) => user == actor,
            Self::Users(users) => users.contains(actor),
        }
    }

    /// The full set of nominal approvers
    pub fn eligible(&self, directory: &dyn Directory) -> BTreeSet<ActorId> {
        match self {
            Self::Role(role) => directory.members_of(role).into_iter().collect(),
            Self::User(user) => BTreeSet::from([user.clone()]),
            Self::Users(users) => users.iter().cloned().collect(),
        }
    }
}

/// When the decisions collected at a step allow the instance to advance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransitionRule {
    AllApprove,
    AnyApprove,
    Threshold(u32),
}

/// A single approval gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    pub approvers: ApproverSpec,
    /// Static substitute allowed to decide for the step's approvers
    #[serde(default)]
    pub delegate_to: Option<ActorId>,
    pub rule: TransitionRule,
}

/// Versioned template for an ordered approval process
///
/// A stored version is never modified; publishing under the same id creates
/// the next version, and in-flight instances keep the version they started on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: DefinitionId,
    #[serde(default = "default_version")]
    pub version: u32,
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Request types this definition governs; empty means any
    #[serde(default)]
    pub applies_to: Vec<String>,
    pub steps: Vec<Step>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_version() -> u32 {
    1
}

fn default_active() -> bool {
    true
}

impl WorkflowDefinition {
    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn governs(&self, request_type: &str) -> bool {
        self.applies_to.is_empty() || self.applies_to.iter().any(|t| t == request_type)
    }

    /// Check structural rules before a definition is stored
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::Validation(format!(
                "Definition {} needs a name",
                self.id
            )));
        }

        if self.steps.is_empty() {
            return Err(WorkflowError::Validation(format!(
                "Definition {} has no steps",
                self.id
            )));
        }

        let mut names = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "Step {} of {} has no name",
                    index, self.id
                )));
            }
            if !names.insert(step.name.as_str()) {
                return Err(WorkflowError::Validation(format!(
                    "Duplicate step name '{}' in {}",
                    step.name, self.id
                )));
            }
            validate_step(step)?;
        }

        Ok(())
    }
}

fn validate_step(step: &Step) -> Result<()> {
    match &step.approvers {
        ApproverSpec::Role(role) if role.trim().is_empty() => {
            return Err(WorkflowError::Validation(format!(
                "Step '{}' has an empty role",
                step.name
            )));
        }
        ApproverSpec::Users(users) => {
            if users.is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "Step '{}' lists no approvers",
                    step.name
                )));
            }
            let unique: HashSet<&ActorId> = users.iter().collect();
            if unique.len() != users.len() {
                return Err(WorkflowError::Validation(format!(
                    "Step '{}' lists an approver twice",
                    step.name
                )));
            }
        }
        _ => {}
    }

    if let TransitionRule::Threshold(n) = step.rule {
        if n == 0 {
            return Err(WorkflowError::Validation(format!(
                "Step '{}' has threshold 0",
                step.name
            )));
        }
        let known = match &step.approvers {
            ApproverSpec::User(_) => Some(1),
            ApproverSpec::Users(users) => Some(users.len()),
            ApproverSpec::Role(_) => None,
        };
        if let Some(count) = known {
            if n as usize > count {
                return Err(WorkflowError::Validation(format!(
                    "Step '{}' needs {} approvals but only {} approvers are listed",
                    step.name, n, count
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(ids: &[&str]) -> ApproverSpec {
        ApproverSpec::Users(ids.iter().map(|id| ActorId::new(*id)).collect())
    }

    fn definition(steps: Vec<Step>) -> WorkflowDefinition {
        WorkflowDefinition {
            id: DefinitionId::parse("expense").unwrap(),
            version: 1,
            name: "Expense approval".to_string(),
            active: true,
            applies_to: vec![],
            steps,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_rule_serialization_vocabulary() {
        assert_eq!(serde_json::to_string(&TransitionRule::AllApprove).unwrap(), "\"all-approve\"");
        assert_eq!(serde_json::to_string(&TransitionRule::AnyApprove).unwrap(), "\"any-approve\"");
        assert_eq!(serde_json::to_string(&TransitionRule::Threshold(2)).unwrap(), "{\"threshold\":2}");
    }

    #[test]
    fn test_definition_from_json_applies_defaults() {
        let json = r#"{
            "id": "purchase-order",
            "name": "Purchase order",
            "applies_to": ["purchase_order"],
            "steps": [
                {"name": "manager", "approvers": {"user": "maria"}, "rule": "any-approve"},
                {"name": "finance", "approvers": {"role": "finance"}, "rule": {"threshold": 2},
                 "delegate_to": "cfo"}
            ]
        }"#;

        let def: WorkflowDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(def.version, 1);
        assert!(def.active);
        assert_eq!(def.total_steps(), 2);
        assert_eq!(def.steps[1].rule, TransitionRule::Threshold(2));
        assert_eq!(def.steps[1].delegate_to, Some(ActorId::new("cfo")));
        assert!(def.governs("purchase_order"));
        assert!(!def.governs("leave_request"));
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_and_duplicate_steps() {
        assert!(definition(vec![]).validate().is_err());

        let step = Step {
            name: "review".to_string(),
            approvers: users(&["a"]),
            delegate_to: None,
            rule: TransitionRule::AnyApprove,
        };
        assert!(definition(vec![step.clone(), step]).validate().is_err());
    }

    #[test]
    fn test_validate_threshold_bounds() {
        let too_high = Step {
            name: "board".to_string(),
            approvers: users(&["a", "b"]),
            delegate_to: None,
            rule: TransitionRule::Threshold(3),
        };
        assert!(definition(vec![too_high]).validate().is_err());

        let zero = Step {
            name: "board".to_string(),
            approvers: ApproverSpec::Role("board".to_string()),
            delegate_to: None,
            rule: TransitionRule::Threshold(0),
        };
        assert!(definition(vec![zero]).validate().is_err());

        let role_threshold = Step {
            name: "board".to_string(),
            approvers: ApproverSpec::Role("board".to_string()),
            delegate_to: None,
            rule: TransitionRule::Threshold(5),
        };
        assert!(definition(vec![role_threshold]).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicate_approvers() {
        let step = Step {
            name: "pair".to_string(),
            approvers: users(&["a", "a"]),
            delegate_to: None,
            rule: TransitionRule::AllApprove,
        };
        assert!(definition(vec![step]).validate().is_err());
    }
}
