//! Chatbot automation-graph generator

pub mod builder;
pub mod document;
pub mod platform;
pub mod templates;

pub use builder::generate;
pub use document::{ConnectionTarget, GraphNode, WorkflowGraphDocument};
pub use platform::{ExtractionRule, PlatformConfig, SendSpec, TriggerSpec, PRESETS};
pub use templates::{CommonNodeTemplates, NodeTemplate};
