//! Bizflow workflow core
//!
//! Approval workflow engine with versioned definitions, delegation and
//! pluggable storage, plus the chatbot automation-graph generator.

pub mod clients;
pub mod config;
pub mod error;
pub mod generator;
pub mod paths;
pub mod workflow;

// Re-export main types for easy access
pub use config::WorkflowConfig;
pub use error::{Result, WorkflowError};

pub use clients::{LogNotifier, RecordingNotifier, StaticDirectory, WebhookNotifier};

pub use workflow::{
    ActorId,
    ApprovalEngine,
    ApprovalInstance,
    ApprovalStatus,
    ApprovalStore,
    DefinitionId,
    Delegation,
    FileStore,
    InMemoryStore,
    InstanceId,
    Outcome,
    RequestContext,
    WorkflowDefinition,
};
