//! Static role directory built from configuration

use std::collections::BTreeMap;

use crate::config::DirectoryConfig;
use crate::workflow::approval_types::ActorId;
use crate::workflow::traits::Directory;

/// Role membership held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    roles: BTreeMap<String, Vec<ActorId>>,
}

impl StaticDirectory {
    pub fn from_roles<I>(roles: I) -> Self
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let roles = roles
            .into_iter()
            .map(|(role, members)| {
                let mut members: Vec<ActorId> = members.into_iter().map(ActorId::new).collect();
                members.sort();
                members.dedup();
                (role, members)
            })
            .collect();

        Self { roles }
    }

    pub fn from_config(config: &DirectoryConfig) -> Self {
        let directory = Self::from_roles(config.roles.clone());
        log::info!("Loaded {} roles into the directory", directory.roles.len());
        directory
    }
}

impl Directory for StaticDirectory {
    fn members_of(&self, role: &str) -> Vec<ActorId> {
        self.roles.get(role).cloned().unwrap_or_default()
    }

    fn roles_of(&self, actor: &ActorId) -> Vec<String> {
        self.roles
            .iter()
            .filter(|(_, members)| members.contains(actor))
            .map(|(role, _)| role.clone())
            .collect()
    }
}
