//! Shared node templates spliced into every generated graph

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, WorkflowError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTemplate {
    pub name: String,
    pub node_type: String,
    pub type_version: f64,
    #[serde(default)]
    pub parameters: Value,
}

impl NodeTemplate {
    pub fn new(name: &str, node_type: &str, type_version: f64, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            node_type: node_type.to_string(),
            type_version,
            parameters,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.node_type.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "Node templates need a name and a node type".to_string(),
            ));
        }
        Ok(())
    }
}

/// Platform-independent nodes of a chatbot graph.
/// Passed explicitly to the generator; there is no global registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonNodeTemplates {
    /// Drops bursts of messages from one session before they reach the agent
    pub anti_flood: NodeTemplate,
    pub agent: NodeTemplate,
    pub memory: NodeTemplate,
    #[serde(default)]
    pub tools: Vec<NodeTemplate>,
    #[serde(default)]
    pub language_model: Option<NodeTemplate>,
}

const ANTI_FLOOD_CODE: &str = r#"const store = $getWorkflowStaticData('global');
const now = Date.now();
const windowMs = 3000;
const out = [];
for (const item of $input.all()) {
  const key = String(item.json.session_id);
  const last = store[key] || 0;
  if (now - last >= windowMs) {
    store[key] = now;
    out.push(item);
  }
}
return out;"#;

impl Default for CommonNodeTemplates {
    fn default() -> Self {
        Self {
            anti_flood: NodeTemplate::new(
                "Anti-Flood Gate",
                "n8n-nodes-base.code",
                2.0,
                json!({"mode": "runOnceForAllItems", "jsCode": ANTI_FLOOD_CODE}),
            ),
            agent: NodeTemplate::new(
                "AI Agent",
                "@n8n/n8n-nodes-langchain.agent",
                1.7,
                json!({
                    "promptType": "define",
                    "text": "={{ $json.message }}",
                    "options": {
                        "systemMessage": "You are the customer assistant of this business. Answer briefly and politely."
                    }
                }),
            ),
            memory: NodeTemplate::new(
                "Conversation Memory",
                "@n8n/n8n-nodes-langchain.memoryBufferWindow",
                1.3,
                json!({
                    "sessionIdType": "customKey",
                    "sessionKey": "={{ $json.session_id }}",
                    "contextWindowLength": 10
                }),
            ),
            tools: vec![NodeTemplate::new(
                "Business API Tool",
                "@n8n/n8n-nodes-langchain.toolHttpRequest",
                1.1,
                json!({
                    "toolDescription": "Look up services, prices and free appointment slots",
                    "method": "GET",
                    "url": "={{ $vars.BUSINESS_API_URL }}/public/catalog"
                }),
            )],
            language_model: Some(NodeTemplate::new(
                "Chat Model",
                "@n8n/n8n-nodes-langchain.lmChatOpenAi",
                1.2,
                json!({"model": "gpt-4o-mini", "options": {"temperature": 0.3}}),
            )),
        }
    }
}

impl CommonNodeTemplates {
    pub fn validate(&self) -> Result<()> {
        self.anti_flood.validate()?;
        self.agent.validate()?;
        self.memory.validate()?;
        for tool in &self.tools {
            tool.validate()?;
        }
        if let Some(model) = &self.language_model {
            model.validate()?;
        }
        Ok(())
    }
}
