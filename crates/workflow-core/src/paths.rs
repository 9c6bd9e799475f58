/// Directory layout of the file-backed approval store
use std::path::{Path, PathBuf};

use workflow_types::ApprovalStatus;

// Default root constant
pub const DEFAULT_DATA_ROOT: &str = "/data/approvals";

// Directory names (relative to the data root)
pub const DEFINITIONS_DIR_NAME: &str = "definitions";
pub const INSTANCES_DIR_NAME: &str = "instances";
pub const DELEGATIONS_DIR_NAME: &str = "delegations";

// Instance status directories
pub const PENDING_DIR_NAME: &str = "pending";
pub const APPROVED_DIR_NAME: &str = "approved";
pub const REJECTED_DIR_NAME: &str = "rejected";
pub const CANCELLED_DIR_NAME: &str = "cancelled";

/// Suffix of files being written before the atomic rename
pub const TEMP_SUFFIX: &str = ".tmp";

/// Directory name for instances in `status`
pub fn status_dir_name(status: ApprovalStatus) -> &'static str {
    match status {
        ApprovalStatus::Pending => PENDING_DIR_NAME,
        ApprovalStatus::Approved => APPROVED_DIR_NAME,
        ApprovalStatus::Rejected => REJECTED_DIR_NAME,
        ApprovalStatus::Cancelled => CANCELLED_DIR_NAME,
    }
}

// Path builder functions
pub fn definitions_dir(root: &Path) -> PathBuf {
    root.join(DEFINITIONS_DIR_NAME)
}

pub fn definition_versions_dir(root: &Path, definition_id: &str) -> PathBuf {
    definitions_dir(root).join(definition_id)
}

pub fn definition_file(root: &Path, definition_id: &str, version: u32) -> PathBuf {
    definition_versions_dir(root, definition_id).join(format!("v{}.json", version))
}

pub fn instances_dir(root: &Path) -> PathBuf {
    root.join(INSTANCES_DIR_NAME)
}

pub fn instance_status_dir(root: &Path, status: ApprovalStatus) -> PathBuf {
    instances_dir(root).join(status_dir_name(status))
}

pub fn instance_file(root: &Path, status: ApprovalStatus, instance_id: &str) -> PathBuf {
    instance_status_dir(root, status).join(format!("instance_{}.json", instance_id))
}

pub fn delegations_dir(root: &Path) -> PathBuf {
    root.join(DELEGATIONS_DIR_NAME)
}

pub fn delegation_file(root: &Path, delegation_id: &str) -> PathBuf {
    delegations_dir(root).join(format!("delegation_{}.json", delegation_id))
}

/// Parse the version number out of a `v{n}.json` file name
pub fn parse_definition_version(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix('v')
        .and_then(|rest| rest.strip_suffix(".json"))
        .and_then(|n| n.parse().ok())
}
