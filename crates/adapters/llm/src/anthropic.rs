//! Anthropic messages-API backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mindhub_app::ports::{LlmBackend, ToolDefinition};
use mindhub_domain::error::BackendError;
use mindhub_domain::message::{Message, MessageRole, ToolCall};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
}

fn convert_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|message| ApiMessage {
            // Tool results travel as user-role content blocks.
            role: match message.role {
                MessageRole::Assistant => "assistant".to_string(),
                MessageRole::User | MessageRole::Tool => "user".to_string(),
            },
            content: convert_content(message),
        })
        .collect()
}

fn convert_content(message: &Message) -> ApiContent {
    if message.role == MessageRole::Tool {
        if let Some(tool_call_id) = &message.tool_call_id {
            return ApiContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: tool_call_id.clone(),
                content: message.content.clone(),
            }]);
        }
    }

    if message.tool_calls.is_empty() {
        return ApiContent::Text(message.content.clone());
    }

    let mut blocks = Vec::new();
    if !message.content.is_empty() {
        blocks.push(ContentBlock::Text {
            text: message.content.clone(),
        });
    }
    for call in &message.tool_calls {
        blocks.push(ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.arguments.clone(),
        });
    }
    ApiContent::Blocks(blocks)
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<ApiTool> {
    tools
        .iter()
        .map(|tool| ApiTool {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.parameters.clone(),
        })
        .collect()
}

fn parse_response(response: ApiResponse) -> Message {
    let mut text = String::new();
    let mut calls = Vec::new();
    for block in response.content {
        match block {
            ContentBlock::Text { text: chunk } => text.push_str(&chunk),
            ContentBlock::ToolUse { id, name, input } => calls.push(ToolCall {
                id,
                name,
                arguments: input,
            }),
            ContentBlock::ToolResult { .. } => {}
        }
    }
    Message::assistant_with_calls(text, calls)
}

/// [`LlmBackend`] over the Anthropic messages API.
pub struct AnthropicBackend {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicBackend {
    #[must_use]
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Message, BackendError> {
        let request = ApiRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            messages: convert_messages(messages),
            tools: convert_tools(tools),
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|err| BackendError::Network(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            // Error JSON shape: {"error": {"message": "...", "type": "..."}}
            let message = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(String::from))
                .unwrap_or(body);
            return Err(BackendError::Api { status, message });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|err| BackendError::Decode(err.to_string()))?;
        Ok(parse_response(api_response))
    }
}
