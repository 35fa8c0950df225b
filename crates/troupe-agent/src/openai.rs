//! OpenAI-compatible chat completions backend.

use crate::backend::{ModelBackend, ModelReply};
use crate::config::ModelConfig;
use async_trait::async_trait;
use troupe_core::{Message, Role, ToolCall, TroupeError, TroupeResult};
use troupe_tools::ToolDescriptor;

/// Backend speaking the OpenAI chat completions API.
///
/// Works with OpenAI, OpenRouter, Groq, and any other provider that
/// implements the same wire format.
pub struct OpenAiCompatibleBackend {
    config: ModelConfig,
    http: reqwest::Client,
}

impl OpenAiCompatibleBackend {
    /// Creates a backend for the given model configuration.
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn build_messages(
        &self,
        system_message: Option<&str>,
        history: &[Message],
    ) -> Vec<serde_json::Value> {
        let mut api_messages: Vec<serde_json::Value> = Vec::new();

        if let Some(sys) = system_message {
            api_messages.push(serde_json::json!({
                "role": "system",
                "content": sys
            }));
        }

        for m in history {
            if m.role == Role::System {
                continue;
            }
            // Tool results go back as user messages; the sender prefix keeps
            // multi-agent transcripts attributable in a single-channel API.
            let (role, content) = match m.role {
                Role::Agent => ("assistant", m.content.clone()),
                Role::User => ("user", m.content.clone()),
                Role::Tool => ("user", format!("[tool:{}] {}", m.sender, m.content)),
                Role::System => unreachable!(),
            };
            api_messages.push(serde_json::json!({
                "role": role,
                "content": content
            }));
        }

        api_messages
    }

    fn build_tools(&self, tools: &[ToolDescriptor]) -> Vec<serde_json::Value> {
        tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters_schema,
                    }
                })
            })
            .collect()
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatibleBackend {
    async fn invoke(
        &self,
        system_message: Option<&str>,
        history: &[Message],
        tools: &[ToolDescriptor],
    ) -> TroupeResult<ModelReply> {
        let url = format!("{}/v1/chat/completions", self.config.base_url());

        let mut body = serde_json::json!({
            "model": self.config.model_id,
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": self.build_messages(system_message, history),
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::json!(self.build_tools(tools));
        }

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| TroupeError::Http(e.to_string()))?;

        let status = resp.status();
        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TroupeError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(TroupeError::Http(format!(
                "Chat API error {status}: {resp_body}"
            )));
        }

        parse_chat_response(&resp_body)
    }
}

/// Parses a chat completions response body into a [`ModelReply`].
pub fn parse_chat_response(body: &serde_json::Value) -> TroupeResult<ModelReply> {
    let message = &body["choices"][0]["message"];
    if message.is_null() {
        return Err(TroupeError::Model(format!(
            "Malformed chat response: {body}"
        )));
    }

    let content = message["content"].as_str().unwrap_or_default().to_string();

    if let Some(tool_calls_json) = message["tool_calls"].as_array() {
        let tool_calls: Vec<ToolCall> = tool_calls_json
            .iter()
            .filter_map(|tc| {
                let id = tc["id"].as_str()?.to_string();
                let name = tc["function"]["name"].as_str()?.to_string();
                let arguments: serde_json::Value =
                    serde_json::from_str(tc["function"]["arguments"].as_str()?).unwrap_or_default();
                Some(ToolCall { id, name, arguments })
            })
            .collect();

        Ok(ModelReply::ToolUse {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls,
        })
    } else {
        Ok(ModelReply::Text(content))
    }
}
