//! Platform-specific parts of a generated chatbot graph

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

use crate::error::{Result, WorkflowError};

/// Extraction fields every platform must provide to the shared nodes
pub const REQUIRED_FIELDS: [&str; 2] = ["message", "session_id"];

/// Names accepted by [`PlatformConfig::preset`]
pub const PRESETS: [&str; 4] = ["whatsapp", "telegram", "instagram", "webhook"];

/// Node that receives inbound messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub node_type: String,
    pub type_version: f64,
    #[serde(default)]
    pub parameters: Value,
}

/// Copies one value out of the trigger payload into a named field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub field: String,
    pub expression: String,
}

/// Node that delivers the agent's reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendSpec {
    pub node_type: String,
    pub type_version: f64,
    /// Channel label, used in the send node's name
    pub channel: String,
    #[serde(default)]
    pub parameters: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformConfig {
    pub name: String,
    pub display_name: String,
    pub trigger: TriggerSpec,
    pub extraction: Vec<ExtractionRule>,
    pub send: SendSpec,
}

fn rule(field: &str, expression: &str) -> ExtractionRule {
    ExtractionRule {
        field: field.to_string(),
        expression: expression.to_string(),
    }
}

impl PlatformConfig {
    /// Built-in configuration for a known platform
    pub fn preset(name: &str) -> Result<Self> {
        let config = match name {
            "whatsapp" => Self {
                name: "whatsapp".to_string(),
                display_name: "WhatsApp".to_string(),
                trigger: TriggerSpec {
                    node_type: "n8n-nodes-base.whatsAppTrigger".to_string(),
                    type_version: 1.0,
                    parameters: json!({"updates": ["messages"]}),
                },
                extraction: vec![
                    rule("message", "={{ $json.messages[0].text.body }}"),
                    rule("session_id", "={{ $json.contacts[0].wa_id }}"),
                    rule("sender_name", "={{ $json.contacts[0].profile.name }}"),
                ],
                send: SendSpec {
                    node_type: "n8n-nodes-base.whatsApp".to_string(),
                    type_version: 1.0,
                    channel: "WhatsApp".to_string(),
                    parameters: json!({
                        "operation": "send",
                        "recipientPhoneNumber": "={{ $('Extract Message').item.json.session_id }}",
                        "textBody": "={{ $json.output }}"
                    }),
                },
            },
            "telegram" => Self {
                name: "telegram".to_string(),
                display_name: "Telegram".to_string(),
                trigger: TriggerSpec {
                    node_type: "n8n-nodes-base.telegramTrigger".to_string(),
                    type_version: 1.1,
                    parameters: json!({"updates": ["message"]}),
                },
                extraction: vec![
                    rule("message", "={{ $json.message.text }}"),
                    rule("session_id", "={{ $json.message.chat.id }}"),
                    rule("sender_name", "={{ $json.message.from.first_name }}"),
                ],
                send: SendSpec {
                    node_type: "n8n-nodes-base.telegram".to_string(),
                    type_version: 1.2,
                    channel: "Telegram".to_string(),
                    parameters: json!({
                        "chatId": "={{ $('Extract Message').item.json.session_id }}",
                        "text": "={{ $json.output }}"
                    }),
                },
            },
            "instagram" => Self {
                name: "instagram".to_string(),
                display_name: "Instagram".to_string(),
                trigger: TriggerSpec {
                    node_type: "n8n-nodes-base.webhook".to_string(),
                    type_version: 2.0,
                    parameters: json!({"httpMethod": "POST", "path": "instagram"}),
                },
                extraction: vec![
                    rule("message", "={{ $json.body.entry[0].messaging[0].message.text }}"),
                    rule("session_id", "={{ $json.body.entry[0].messaging[0].sender.id }}"),
                ],
                send: SendSpec {
                    node_type: "n8n-nodes-base.httpRequest".to_string(),
                    type_version: 4.2,
                    channel: "Instagram".to_string(),
                    parameters: json!({
                        "method": "POST",
                        "url": "https://graph.facebook.com/v19.0/me/messages",
                        "sendBody": true,
                        "specifyBody": "json",
                        "jsonBody": "={ \"recipient\": { \"id\": \"{{ $('Extract Message').item.json.session_id }}\" }, \"message\": { \"text\": {{ JSON.stringify($json.output) }} } }"
                    }),
                },
            },
            "webhook" => Self {
                name: "webhook".to_string(),
                display_name: "Webhook".to_string(),
                trigger: TriggerSpec {
                    node_type: "n8n-nodes-base.webhook".to_string(),
                    type_version: 2.0,
                    parameters: json!({
                        "httpMethod": "POST",
                        "path": "chat",
                        "responseMode": "responseNode"
                    }),
                },
                extraction: vec![
                    rule("message", "={{ $json.body.message }}"),
                    rule("session_id", "={{ $json.body.session_id }}"),
                ],
                send: SendSpec {
                    node_type: "n8n-nodes-base.respondToWebhook".to_string(),
                    type_version: 1.1,
                    channel: "Response".to_string(),
                    parameters: json!({
                        "respondWith": "json",
                        "responseBody": "={{ { \"reply\": $json.output } }}"
                    }),
                },
            },
            other => {
                return Err(WorkflowError::Validation(format!(
                    "Unknown platform '{}', expected one of: {}",
                    other,
                    PRESETS.join(", ")
                )))
            }
        };

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WorkflowError::Validation("Platform name is required".to_string()));
        }
        if self.display_name.trim().is_empty() {
            return Err(WorkflowError::Validation(format!(
                "Platform {} needs a display name",
                self.name
            )));
        }
        if self.trigger.node_type.trim().is_empty() || self.send.node_type.trim().is_empty() {
            return Err(WorkflowError::Validation(format!(
                "Platform {} needs trigger and send node types",
                self.name
            )));
        }

        let mut fields = HashSet::new();
        for rule in &self.extraction {
            if rule.field.trim().is_empty() || rule.expression.trim().is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "Platform {} has an incomplete extraction rule",
                    self.name
                )));
            }
            if !fields.insert(rule.field.as_str()) {
                return Err(WorkflowError::Validation(format!(
                    "Duplicate extraction field '{}' for {}",
                    rule.field, self.name
                )));
            }
        }

        for required in REQUIRED_FIELDS {
            if !fields.contains(required) {
                return Err(WorkflowError::Validation(format!(
                    "Platform {} must extract '{}'",
                    self.name, required
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_presets_validate() {
        for name in PRESETS {
            let config = PlatformConfig::preset(name).unwrap();
            assert_eq!(config.name, name);
            config.validate().unwrap();
        }
        assert!(PlatformConfig::preset("fax").is_err());
    }

    #[test]
    fn test_validation_rejects_duplicate_and_missing_fields() {
        let mut config = PlatformConfig::preset("telegram").unwrap();
        config.extraction.push(rule("message", "={{ $json.text }}"));
        assert!(config.validate().is_err());

        let mut config = PlatformConfig::preset("telegram").unwrap();
        config.extraction.retain(|r| r.field != "session_id");
        assert!(config.validate().is_err());

        let mut config = PlatformConfig::preset("webhook").unwrap();
        config.name = " ".to_string();
        assert!(config.validate().is_err());
    }
}
