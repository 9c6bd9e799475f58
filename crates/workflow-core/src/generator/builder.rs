//! Assembles a chatbot graph from a platform config and the shared templates
//!
//! Main path: trigger -> extract -> anti-flood gate -> agent -> send.
//! Memory, tools and the optional language model hang off the agent.

use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use super::document::*;
use super::platform::PlatformConfig;
use super::templates::{CommonNodeTemplates, NodeTemplate};
use crate::error::{Result, WorkflowError};

pub const EXTRACT_NODE_NAME: &str = "Extract Message";

const STEP_X: i64 = 220;
const MAIN_Y: i64 = 300;
const SUB_Y: i64 = 520;
const SUB_STEP_X: i64 = 160;

/// Derives every identifier in a document from the seed
struct IdSource {
    namespace: Uuid,
}

impl IdSource {
    fn new(seed: &str) -> Self {
        let name = format!("bizflow-generator:{}", seed);
        Self {
            namespace: Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()),
        }
    }

    fn id(&self, kind: &str, name: &str) -> String {
        Uuid::new_v5(&self.namespace, format!("{}:{}", kind, name).as_bytes()).to_string()
    }
}

fn node(ids: &IdSource, role: &str, template: &NodeTemplate, position: [i64; 2]) -> GraphNode {
    GraphNode {
        id: ids.id("node", &format!("{}:{}", role, template.name)),
        name: template.name.clone(),
        node_type: template.node_type.clone(),
        type_version: template.type_version,
        position,
        parameters: template.parameters.clone(),
    }
}

fn extract_parameters(ids: &IdSource, platform: &PlatformConfig) -> Value {
    let assignments: Vec<Value> = platform
        .extraction
        .iter()
        .map(|rule| {
            json!({
                "id": ids.id("assignment", &rule.field),
                "name": rule.field,
                "value": rule.expression,
                "type": "string"
            })
        })
        .collect();

    json!({
        "assignments": {"assignments": assignments},
        "options": {}
    })
}

/// Build the graph document. Pure: identical inputs give identical documents.
pub fn generate(
    platform: &PlatformConfig,
    templates: &CommonNodeTemplates,
    seed: &str,
) -> Result<WorkflowGraphDocument> {
    if seed.trim().is_empty() {
        return Err(WorkflowError::Validation("Generator seed is required".to_string()));
    }
    platform.validate()?;
    templates.validate()?;

    let ids = IdSource::new(seed);

    let trigger = NodeTemplate {
        name: format!("{} Trigger", platform.display_name),
        node_type: platform.trigger.node_type.clone(),
        type_version: platform.trigger.type_version,
        parameters: platform.trigger.parameters.clone(),
    };
    let extract = NodeTemplate {
        name: EXTRACT_NODE_NAME.to_string(),
        node_type: "n8n-nodes-base.set".to_string(),
        type_version: 3.4,
        parameters: extract_parameters(&ids, platform),
    };
    let send = NodeTemplate {
        name: format!("Send {} Reply", platform.send.channel),
        node_type: platform.send.node_type.clone(),
        type_version: platform.send.type_version,
        parameters: platform.send.parameters.clone(),
    };

    let main_path = [
        ("trigger", &trigger),
        ("extract", &extract),
        ("anti_flood", &templates.anti_flood),
        ("agent", &templates.agent),
        ("send", &send),
    ];

    let mut nodes: Vec<GraphNode> = main_path
        .iter()
        .enumerate()
        .map(|(i, (role, template))| node(&ids, role, template, [i as i64 * STEP_X, MAIN_Y]))
        .collect();

    // Sub-nodes sit in a row under the agent
    let agent_x = 3 * STEP_X;
    let mut sub_nodes: Vec<(&str, &NodeTemplate, &str)> = Vec::new();
    if let Some(model) = &templates.language_model {
        sub_nodes.push(("language_model", model, AI_LANGUAGE_MODEL));
    }
    sub_nodes.push(("memory", &templates.memory, AI_MEMORY));
    for tool in &templates.tools {
        sub_nodes.push(("tool", tool, AI_TOOL));
    }

    for (i, (role, template, _)) in sub_nodes.iter().enumerate() {
        let x = agent_x - SUB_STEP_X + i as i64 * SUB_STEP_X;
        nodes.push(node(&ids, role, template, [x, SUB_Y]));
    }

    let mut names = HashSet::new();
    for node in &nodes {
        if !names.insert(node.name.as_str()) {
            return Err(WorkflowError::Validation(format!(
                "Duplicate node name '{}' in generated graph",
                node.name
            )));
        }
    }

    let mut document = WorkflowGraphDocument {
        name: format!("{} AI Assistant", platform.display_name),
        nodes,
        connections: BTreeMap::new(),
        active: false,
        settings: GraphSettings {
            execution_order: "v1".to_string(),
        },
        meta: GraphMeta {
            instance_id: ids.namespace.to_string(),
            platform: platform.name.clone(),
        },
    };

    for pair in main_path.windows(2) {
        document.connect(&pair[0].1.name, &pair[1].1.name, MAIN);
    }
    for (_, template, connection_type) in &sub_nodes {
        document.connect(&template.name, &templates.agent.name, connection_type);
    }

    log::debug!(
        "Generated {} graph with {} nodes",
        platform.name,
        document.nodes.len()
    );
    Ok(document)
}
