//! Collaborator traits the approval engine depends on
//!
//! Each collaborator is a trait object so the engine can be wired to real
//! services in the server and to in-memory doubles in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::approval_types::{ActorId, ApprovalStatus, DefinitionId, InstanceId};
use crate::error::Result;

/// Identity collaborator: role membership lookups
pub trait Directory: Send + Sync {
    /// All actors holding `role`
    fn members_of(&self, role: &str) -> Vec<ActorId>;

    /// All roles held by `actor`
    fn roles_of(&self, actor: &ActorId) -> Vec<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A step is waiting on its approvers
    ApprovalRequested,
    /// The instance reached a terminal status
    InstanceCompleted,
}

/// Payload handed to the notification collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub event: NotificationEvent,
    pub instance_id: InstanceId,
    pub definition_id: DefinitionId,
    pub status: ApprovalStatus,
    pub step_index: Option<usize>,
    pub step_name: Option<String>,
    pub recipients: Vec<ActorId>,
}

/// Notification collaborator: informs the next approvers and requesters
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}
