//! File-backed approval store
//! Each record is a JSON file; instances live in one directory per status and
//! move between them as their status changes.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::approval_types::*;
use super::definition::WorkflowDefinition;
use super::store::{next_version, sort_instances, ApprovalStore};
use crate::error::{Result, WorkflowError};
use crate::paths;

/// Approval store persisting to a directory tree under `root_path`
pub struct FileStore {
    root_path: PathBuf,
    /// Writers hold it exclusively while an instance file moves between
    /// status directories; instance readers hold it shared
    instance_lock: RwLock<()>,
}

impl FileStore {
    /// Create new FileStore with specified root path
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        let root_path = root_path.as_ref().to_path_buf();

        // Create directory structure
        for status in ApprovalStatus::ALL {
            fs::create_dir_all(paths::instance_status_dir(&root_path, status))?;
        }
        fs::create_dir_all(paths::definitions_dir(&root_path))?;
        fs::create_dir_all(paths::delegations_dir(&root_path))?;

        log::info!("Initialized approval store at {}", root_path.display());

        Ok(Self {
            root_path,
            instance_lock: RwLock::new(()),
        })
    }

    fn lock(&self) -> Result<RwLockWriteGuard<'_, ()>> {
        self.instance_lock
            .write()
            .map_err(|_| WorkflowError::Storage("file store lock poisoned".to_string()))
    }

    fn read_lock(&self) -> Result<RwLockReadGuard<'_, ()>> {
        self.instance_lock
            .read()
            .map_err(|_| WorkflowError::Storage("file store lock poisoned".to_string()))
    }

    /// Find an instance file in any status directory
    fn find_instance_path(&self, id: &InstanceId) -> Option<(PathBuf, ApprovalStatus)> {
        for status in ApprovalStatus::ALL {
            let path = paths::instance_file(&self.root_path, status, id.as_str());
            if path.exists() {
                log::debug!("Found approval {} in state {}", id, status);
                return Some((path, status));
            }
        }

        log::debug!("Approval {} not found in any state directory", id);
        None
    }

    /// Write a record through a temp file and rename so readers never see partial JSON
    fn write_record<T: Serialize>(&self, path: &Path, record: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| WorkflowError::Serialization(format!("Failed to serialize record: {}", e)))?;

        let mut temp = path.as_os_str().to_owned();
        temp.push(paths::TEMP_SUFFIX);
        let temp = PathBuf::from(temp);

        fs::write(&temp, json)?;
        fs::rename(&temp, path)?;
        Ok(())
    }

    fn read_record<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let json = fs::read_to_string(path)?;

        serde_json::from_str(&json).map_err(|e| {
            WorkflowError::Deserialization(format!("Failed to deserialize {}: {}", path.display(), e))
        })
    }

    /// Read every `*.json` record in a directory, skipping unreadable files
    fn read_dir_records<T: DeserializeOwned>(&self, dir: &Path) -> Result<Vec<T>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                match self.read_record(&path) {
                    Ok(record) => records.push(record),
                    Err(e) => log::warn!("Skipping unreadable record {}: {}", path.display(), e),
                }
            }
        }

        Ok(records)
    }

    fn definition_versions(&self, id: &DefinitionId) -> Result<Vec<u32>> {
        let dir = paths::definition_versions_dir(&self.root_path, id.as_str());
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if let Some(version) = entry.file_name().to_str().and_then(paths::parse_definition_version) {
                versions.push(version);
            }
        }
        versions.sort_unstable();
        Ok(versions)
    }
}

impl ApprovalStore for FileStore {
    fn publish_definition(&self, mut definition: WorkflowDefinition) -> Result<WorkflowDefinition> {
        let _guard = self.lock()?;

        let latest = self.latest_definition(&definition.id)?;
        definition.version = next_version(latest.as_ref());

        let dir = paths::definition_versions_dir(&self.root_path, definition.id.as_str());
        fs::create_dir_all(&dir)?;

        let path = paths::definition_file(&self.root_path, definition.id.as_str(), definition.version);
        self.write_record(&path, &definition)?;

        log::info!("Published definition {} v{}", definition.id, definition.version);
        Ok(definition)
    }

    fn get_definition(&self, id: &DefinitionId, version: u32) -> Result<Option<WorkflowDefinition>> {
        let path = paths::definition_file(&self.root_path, id.as_str(), version);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(self.read_record(&path)?))
    }

    fn latest_definition(&self, id: &DefinitionId) -> Result<Option<WorkflowDefinition>> {
        match self.definition_versions(id)?.last() {
            Some(version) => self.get_definition(id, *version),
            None => Ok(None),
        }
    }

    fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>> {
        let mut definitions = Vec::new();

        for entry in fs::read_dir(paths::definitions_dir(&self.root_path))? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(id) = DefinitionId::parse(&name) else {
                log::warn!("Ignoring definition directory with invalid id: {}", name);
                continue;
            };
            if let Some(definition) = self.latest_definition(&id)? {
                definitions.push(definition);
            }
        }

        definitions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(definitions)
    }

    fn insert_instance(&self, instance: &ApprovalInstance) -> Result<()> {
        let _guard = self.lock()?;

        if self.find_instance_path(&instance.id).is_some() {
            return Err(WorkflowError::Conflict(format!(
                "Approval {} already exists",
                instance.id
            )));
        }

        let path = paths::instance_file(&self.root_path, instance.status, instance.id.as_str());
        self.write_record(&path, instance)?;

        log::info!("Created approval {}", instance.id);
        Ok(())
    }

    fn get_instance(&self, id: &InstanceId) -> Result<Option<ApprovalInstance>> {
        let _guard = self.read_lock()?;
        match self.find_instance_path(id) {
            Some((path, _)) => Ok(Some(self.read_record(&path)?)),
            None => Ok(None),
        }
    }

    fn update_instance(&self, instance: &ApprovalInstance, expected_version: u64) -> Result<()> {
        let _guard = self.lock()?;

        let (current_path, current_status) = self
            .find_instance_path(&instance.id)
            .ok_or_else(|| WorkflowError::NotFound(format!("Approval {} not found", instance.id)))?;

        let stored: ApprovalInstance = self.read_record(&current_path)?;
        if stored.version != expected_version {
            return Err(WorkflowError::Conflict(format!(
                "Approval {} was modified concurrently (expected version {}, found {})",
                instance.id, expected_version, stored.version
            )));
        }

        let new_path = paths::instance_file(&self.root_path, instance.status, instance.id.as_str());
        self.write_record(&new_path, instance)?;

        // Status changed: the record now lives in another directory
        if current_status != instance.status {
            fs::remove_file(&current_path)?;
            log::info!(
                "Moved approval {} from {} to {}",
                instance.id,
                current_status,
                instance.status
            );
        }

        Ok(())
    }

    fn list_instances(&self, status: Option<ApprovalStatus>) -> Result<Vec<ApprovalInstance>> {
        let statuses: Vec<ApprovalStatus> = match status {
            Some(status) => vec![status],
            None => ApprovalStatus::ALL.to_vec(),
        };

        let _guard = self.read_lock()?;
        let mut instances = Vec::new();
        for status in statuses {
            let dir = paths::instance_status_dir(&self.root_path, status);
            instances.extend(self.read_dir_records::<ApprovalInstance>(&dir)?);
        }

        sort_instances(&mut instances);
        Ok(instances)
    }

    fn put_delegation(&self, delegation: &Delegation) -> Result<()> {
        let _guard = self.lock()?;
        let path = paths::delegation_file(&self.root_path, delegation.id.as_str());
        self.write_record(&path, delegation)?;

        log::info!(
            "Stored delegation {} from {} to {}",
            delegation.id,
            delegation.approver,
            delegation.delegate
        );
        Ok(())
    }

    fn list_delegations(&self, approver: Option<&ActorId>) -> Result<Vec<Delegation>> {
        let mut delegations: Vec<Delegation> =
            self.read_dir_records(&paths::delegations_dir(&self.root_path))?;

        delegations.retain(|d| approver.map_or(true, |a| &d.approver == a));
        delegations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(delegations)
    }
}
