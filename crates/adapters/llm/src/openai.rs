//! OpenAI chat-completions backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mindhub_app::ports::{LlmBackend, ToolDefinition};
use mindhub_domain::error::BackendError;
use mindhub_domain::message::{Message, MessageRole, ToolCall};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<ApiToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: ApiFunctionCall,
}

/// Function arguments cross the wire as a JSON-encoded string.
#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    arguments: String,
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
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
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
            content: Some(message.content.clone()),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| ApiToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: ApiFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
            tool_call_id: message.tool_call_id.clone(),
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

fn parse_message(message: ApiMessage) -> Result<Message, BackendError> {
    let calls = message
        .tool_calls
        .into_iter()
        .map(|call| {
            let arguments = serde_json::from_str(&call.function.arguments)
                .map_err(|err| BackendError::Decode(err.to_string()))?;
            Ok(ToolCall {
                id: call.id,
                name: call.function.name,
                arguments,
            })
        })
        .collect::<Result<Vec<_>, BackendError>>()?;
    Ok(Message::assistant_with_calls(
        message.content.unwrap_or_default(),
        calls,
    ))
}

/// [`LlmBackend`] over the OpenAI chat-completions API.
pub struct OpenAiBackend {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiBackend {
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
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<Message, BackendError> {
        let request = ApiRequest {
            model: self.model.clone(),
            messages: convert_messages(messages),
            tools: convert_tools(tools),
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| BackendError::Network(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
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
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Decode("response carried no choices".to_string()))?;
        parse_message(choice.message)
    }
}
