//! Persistence collaborator for definitions, instances and delegations

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::approval_types::*;
use super::definition::WorkflowDefinition;
use crate::error::{Result, WorkflowError};

/// Storage used by the approval engine.
///
/// Instance writes are conditioned on the record version: `update_instance`
/// must fail with `Conflict` when the stored version differs from
/// `expected_version`, so that two writers racing on the same instance cannot
/// both succeed.
pub trait ApprovalStore: Send + Sync {
    /// Store `definition` as the next version of its id and return what was stored
    fn publish_definition(&self, definition: WorkflowDefinition) -> Result<WorkflowDefinition>;

    fn get_definition(&self, id: &DefinitionId, version: u32) -> Result<Option<WorkflowDefinition>>;

    fn latest_definition(&self, id: &DefinitionId) -> Result<Option<WorkflowDefinition>>;

    /// Latest version of every definition
    fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>>;

    /// Insert a new instance; fails with `Conflict` if the id already exists
    fn insert_instance(&self, instance: &ApprovalInstance) -> Result<()>;

    fn get_instance(&self, id: &InstanceId) -> Result<Option<ApprovalInstance>>;

    fn update_instance(&self, instance: &ApprovalInstance, expected_version: u64) -> Result<()>;

    fn list_instances(&self, status: Option<ApprovalStatus>) -> Result<Vec<ApprovalInstance>>;

    fn put_delegation(&self, delegation: &Delegation) -> Result<()>;

    fn list_delegations(&self, approver: Option<&ActorId>) -> Result<Vec<Delegation>>;

    fn status_counts(&self) -> Result<StatusCounts> {
        let mut counts = StatusCounts::new();
        for instance in self.list_instances(None)? {
            counts.increment(instance.status);
        }
        Ok(counts)
    }
}

/// Next version number for a definition id given the latest stored one
pub(crate) fn next_version(latest: Option<&WorkflowDefinition>) -> u32 {
    latest.map(|d| d.version + 1).unwrap_or(1)
}

/// Sort instances oldest first so listings are stable
pub(crate) fn sort_instances(instances: &mut [ApprovalInstance]) {
    instances.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
}

#[derive(Default)]
struct MemoryState {
    definitions: HashMap<DefinitionId, Vec<WorkflowDefinition>>,
    instances: HashMap<InstanceId, ApprovalInstance>,
    delegations: Vec<Delegation>,
}

/// Process-local store, used in tests and for `storage.backend = "memory"`
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| WorkflowError::Storage("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| WorkflowError::Storage("in-memory store lock poisoned".to_string()))
    }
}

impl ApprovalStore for InMemoryStore {
    fn publish_definition(&self, mut definition: WorkflowDefinition) -> Result<WorkflowDefinition> {
        let mut state = self.write()?;
        let versions = state.definitions.entry(definition.id.clone()).or_default();

        definition.version = next_version(versions.last());
        versions.push(definition.clone());

        log::info!("Published definition {} v{}", definition.id, definition.version);
        Ok(definition)
    }

    fn get_definition(&self, id: &DefinitionId, version: u32) -> Result<Option<WorkflowDefinition>> {
        let state = self.read()?;
        Ok(state
            .definitions
            .get(id)
            .and_then(|versions| versions.iter().find(|d| d.version == version))
            .cloned())
    }

    fn latest_definition(&self, id: &DefinitionId) -> Result<Option<WorkflowDefinition>> {
        let state = self.read()?;
        Ok(state.definitions.get(id).and_then(|versions| versions.last()).cloned())
    }

    fn list_definitions(&self) -> Result<Vec<WorkflowDefinition>> {
        let state = self.read()?;
        let mut latest: Vec<WorkflowDefinition> = state
            .definitions
            .values()
            .filter_map(|versions| versions.last().cloned())
            .collect();
        latest.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(latest)
    }

    fn insert_instance(&self, instance: &ApprovalInstance) -> Result<()> {
        let mut state = self.write()?;
        if state.instances.contains_key(&instance.id) {
            return Err(WorkflowError::Conflict(format!(
                "Approval {} already exists",
                instance.id
            )));
        }
        state.instances.insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    fn get_instance(&self, id: &InstanceId) -> Result<Option<ApprovalInstance>> {
        let state = self.read()?;
        Ok(state.instances.get(id).cloned())
    }

    fn update_instance(&self, instance: &ApprovalInstance, expected_version: u64) -> Result<()> {
        let mut state = self.write()?;
        let stored = state
            .instances
            .get_mut(&instance.id)
            .ok_or_else(|| WorkflowError::NotFound(format!("Approval {} not found", instance.id)))?;

        if stored.version != expected_version {
            return Err(WorkflowError::Conflict(format!(
                "Approval {} was modified concurrently (expected version {}, found {})",
                instance.id, expected_version, stored.version
            )));
        }

        *stored = instance.clone();
        Ok(())
    }

    fn list_instances(&self, status: Option<ApprovalStatus>) -> Result<Vec<ApprovalInstance>> {
        let state = self.read()?;
        let mut instances: Vec<ApprovalInstance> = state
            .instances
            .values()
            .filter(|i| status.map_or(true, |s| i.status == s))
            .cloned()
            .collect();
        sort_instances(&mut instances);
        Ok(instances)
    }

    fn put_delegation(&self, delegation: &Delegation) -> Result<()> {
        let mut state = self.write()?;
        state.delegations.retain(|d| d.id != delegation.id);
        state.delegations.push(delegation.clone());
        Ok(())
    }

    fn list_delegations(&self, approver: Option<&ActorId>) -> Result<Vec<Delegation>> {
        let state = self.read()?;
        Ok(state
            .delegations
            .iter()
            .filter(|d| approver.map_or(true, |a| &d.approver == a))
            .cloned()
            .collect())
    }
}
