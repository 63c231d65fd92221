//! Ollama chat backend for locally hosted models.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mindhub_app::ports::{LlmBackend, ToolDefinition};
use mindhub_domain::error::BackendError;
use mindhub_domain::message::{Message, MessageRole, ToolCall};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
}

/// Ollama tool calls carry no id; the backend assigns one per call so
/// tool-result turns can still reference them.
#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    function: ApiFunctionCall,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    arguments: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ApiTool {
    #[serde(rename = "type")]
    kind: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize)]
struct ApiFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    message: ApiMessage,
}

fn convert_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|message| ApiMessage {
            role: match message.role {
                MessageRole::User => "user".to_string(),
                MessageRole::Assistant => "assistant".to_string(),
                MessageRole::Tool => "tool".to_string(),
            },
            content: message.content.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| ApiToolCall {
                    function: ApiFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        })
        .collect()
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<ApiTool> {
    tools
        .iter()
        .map(|tool| ApiTool {
            kind: "function".to_string(),
            function: ApiFunction {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        })
        .collect()
}

fn parse_message(message: ApiMessage) -> Message {
    let calls = message
        .tool_calls
        .into_iter()
        .enumerate()
        .map(|(index, call)| ToolCall {
            id: format!("call_{index}"),
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect();
    Message::assistant_with_calls(message.content, calls)
}

/// [`LlmBackend`] over the Ollama chat API.
pub struct OllamaBackend {
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OllamaBackend {
    #[must_use]
    pub fn new(model: String, base_url: Option<String>) -> Self {
        Self {
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Message, BackendError> {
        let request = ApiRequest {
            model: self.model.clone(),
            messages: convert_messages(messages),
            stream: false,
            tools: convert_tools(tools),
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|err| BackendError::Network(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::Api { status, message });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|err| BackendError::Decode(err.to_string()))?;
        Ok(parse_message(api_response.message))
    }
}
