//! Approval workflow management module

pub mod approval_types;
pub mod definition;
pub mod delegation;
pub mod engine;
pub mod file_store;
pub mod rules;
pub mod store;
pub mod traits;

pub use approval_types::*;
pub use definition::{ApproverSpec, Step, TransitionRule, WorkflowDefinition};
pub use engine::ApprovalEngine;
pub use file_store::FileStore;
pub use store::{ApprovalStore, InMemoryStore};
pub use traits::{Directory, Notification, NotificationEvent, Notifier};
