//! Automation-graph document in the n8n import format

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Result, WorkflowError};

/// Data path between nodes
pub const MAIN: &str = "main";
pub const AI_MEMORY: &str = "ai_memory";
pub const AI_TOOL: &str = "ai_tool";
pub const AI_LANGUAGE_MODEL: &str = "ai_languageModel";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub type_version: f64,
    pub position: [i64; 2],
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTarget {
    pub node: String,
    #[serde(rename = "type")]
    pub connection_type: String,
    pub index: u32,
}

/// Outgoing edges of one node: connection type -> output index -> targets
pub type NodeConnections = BTreeMap<String, Vec<Vec<ConnectionTarget>>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSettings {
    pub execution_order: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMeta {
    pub instance_id: String,
    pub platform: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraphDocument {
    pub name: String,
    pub nodes: Vec<GraphNode>,
    /// Keyed by source node name
    pub connections: BTreeMap<String, NodeConnections>,
    pub active: bool,
    pub settings: GraphSettings,
    pub meta: GraphMeta,
}

impl WorkflowGraphDocument {
    pub fn node(&self, name: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Targets reached from output 0 of `source` over `connection_type`
    pub fn targets(&self, source: &str, connection_type: &str) -> Vec<&ConnectionTarget> {
        self.connections
            .get(source)
            .and_then(|c| c.get(connection_type))
            .and_then(|outputs| outputs.first())
            .map(|targets| targets.iter().collect())
            .unwrap_or_default()
    }

    pub(crate) fn connect(&mut self, source: &str, target: &str, connection_type: &str) {
        let outputs = self
            .connections
            .entry(source.to_string())
            .or_default()
            .entry(connection_type.to_string())
            .or_default();

        if outputs.is_empty() {
            outputs.push(Vec::new());
        }
        outputs[0].push(ConnectionTarget {
            node: target.to_string(),
            connection_type: connection_type.to_string(),
            index: 0,
        });
    }

    /// Pretty JSON; stable for identical documents
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| WorkflowError::Serialization(format!("Failed to serialize graph: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(name: &str) -> GraphNode {
        GraphNode {
            id: format!("id-{}", name),
            name: name.to_string(),
            node_type: "n8n-nodes-base.noOp".to_string(),
            type_version: 1.0,
            position: [0, 0],
            parameters: json!({}),
        }
    }

    #[test]
    fn test_serialized_field_names() {
        let mut doc = WorkflowGraphDocument {
            name: "Test".to_string(),
            nodes: vec![node("A"), node("B")],
            connections: BTreeMap::new(),
            active: false,
            settings: GraphSettings {
                execution_order: "v1".to_string(),
            },
            meta: GraphMeta {
                instance_id: "x".to_string(),
                platform: "webhook".to_string(),
            },
        };
        doc.connect("A", "B", MAIN);

        let json: Value = serde_json::from_slice(&doc.to_json_bytes().unwrap()).unwrap();
        assert_eq!(json["nodes"][0]["type"], "n8n-nodes-base.noOp");
        assert_eq!(json["nodes"][0]["typeVersion"], 1.0);
        assert_eq!(json["settings"]["executionOrder"], "v1");
        assert_eq!(json["meta"]["instanceId"], "x");
        assert_eq!(json["connections"]["A"]["main"][0][0]["node"], "B");
        assert_eq!(doc.targets("A", MAIN)[0].node, "B");
        assert!(doc.targets("B", MAIN).is_empty());
    }
}
