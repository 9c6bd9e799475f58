//! Collaborator implementations: role directory and notifiers

pub mod directory;
pub mod notifier;

pub use directory::StaticDirectory;
pub use notifier::{notifier_from_config, LogNotifier, RecordingNotifier, WebhookNotifier};
