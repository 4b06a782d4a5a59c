//! Google Gemini API client.
//!
//! Wraps the `generateContent` endpoint for three uses: structured-JSON
//! clinical analysis, short free-text generation (conversation titles), and
//! multi-turn chat with function calling for the copilot. The [`ChatModel`]
//! trait is the seam the orchestrator and handlers depend on, so tests can
//! drive the tool loop with a scripted model instead of the network.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Gemini API request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Gemini API error {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Gemini response contained no usable content")]
    EmptyResponse,

    #[error("Failed to parse model JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid API key: {0}")]
    Config(String),
}

// -- Wire types (generateContent) --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub function_call: Option<FunctionCall>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub function_response: Option<FunctionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    pub response: serde_json::Value,
}

/// Declaration of a callable tool, in Gemini's function-calling schema
#[derive(Debug, Clone, Serialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ToolDecl {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDecl>>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

// -- Orchestrator-facing chat types --

/// One entry of the in-memory exchange sent to the model
#[derive(Debug, Clone)]
pub enum ChatMessage {
    User(String),
    Assistant(String),
    /// Tool invocations the model requested in one of its turns
    AssistantToolCalls(Vec<ToolCallRequest>),
    /// Results fed back for the originating requests, all together
    ToolResults(Vec<ToolCallResult>),
}

#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct ToolCallResult {
    pub name: String,
    pub output: String,
}

/// Outcome of one model turn: free text, tool requests, or both
#[derive(Debug, Clone, Default)]
pub struct ModelTurn {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

/// Conversational-model capability consumed by handlers and the tool loop
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One chat round-trip; the model may request tool invocations
    async fn chat(
        &self,
        system: &str,
        history: &[ChatMessage],
        tools: &[FunctionDeclaration],
    ) -> Result<ModelTurn, LlmError>;

    /// Structured-JSON generation (clinical analysis, document composition)
    async fn generate_json(&self, prompt: &str) -> Result<serde_json::Value, LlmError>;

    /// Short free-text generation (conversation titles)
    async fn generate_text(&self, prompt: &str) -> Result<String, LlmError>;
}

/// Gemini `generateContent` client
#[derive(Debug)]
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Config("Gemini API key is required".to_string()));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(DEFAULT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: DEFAULT_MODEL.to_string(),
        })
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Content, LlmError> {
        let url = format!("{}/{}:generateContent", GEMINI_ENDPOINT, self.model);
        debug!("Gemini generateContent: {} content entries", request.contents.len());

        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(
                "x-goog-api-key",
                HeaderValue::from_str(&self.api_key)
                    .map_err(|e| LlmError::Config(format!("Invalid API key header: {}", e)))?,
            )
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Truncate the error body to avoid leaking sensitive data
            let truncated = if body.len() > 200 {
                body.chars().take(200).collect()
            } else {
                body
            };
            return Err(LlmError::Api {
                status,
                body: truncated,
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content)
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Translate the in-memory exchange into Gemini `contents` entries.
/// Function responses ride in `user`-role entries per the REST API.
fn to_contents(history: &[ChatMessage]) -> Vec<Content> {
    history
        .iter()
        .map(|entry| match entry {
            ChatMessage::User(text) => Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(text.clone()),
                    ..Default::default()
                }],
            },
            ChatMessage::Assistant(text) => Content {
                role: Some("model".to_string()),
                parts: vec![Part {
                    text: Some(text.clone()),
                    ..Default::default()
                }],
            },
            ChatMessage::AssistantToolCalls(calls) => Content {
                role: Some("model".to_string()),
                parts: calls
                    .iter()
                    .map(|call| Part {
                        function_call: Some(FunctionCall {
                            name: call.name.clone(),
                            args: call.args.clone(),
                        }),
                        ..Default::default()
                    })
                    .collect(),
            },
            ChatMessage::ToolResults(results) => Content {
                role: Some("user".to_string()),
                parts: results
                    .iter()
                    .map(|result| Part {
                        function_response: Some(FunctionResponse {
                            name: result.name.clone(),
                            response: serde_json::json!({ "result": result.output }),
                        }),
                        ..Default::default()
                    })
                    .collect(),
            },
        })
        .collect()
}

/// Fold a model content entry into a [`ModelTurn`]
fn to_model_turn(content: Content) -> ModelTurn {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for part in content.parts {
        if let Some(fragment) = part.text {
            text.push_str(&fragment);
        }
        if let Some(call) = part.function_call {
            tool_calls.push(ToolCallRequest {
                name: call.name,
                args: call.args,
            });
        }
    }

    ModelTurn {
        text: if text.trim().is_empty() { None } else { Some(text) },
        tool_calls,
    }
}

/// Extract a JSON object from model output, tolerating code fences and
/// surrounding prose
fn extract_json(text: &str) -> &str {
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start <= end {
            return &text[start..=end];
        }
    }
    text
}

#[async_trait]
impl ChatModel for GeminiClient {
    async fn chat(
        &self,
        system: &str,
        history: &[ChatMessage],
        tools: &[FunctionDeclaration],
    ) -> Result<ModelTurn, LlmError> {
        let request = GenerateRequest {
            contents: to_contents(history),
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part {
                    text: Some(system.to_string()),
                    ..Default::default()
                }],
            }),
            tools: Some(vec![ToolDecl {
                function_declarations: tools.to_vec(),
            }]),
            generation_config: None,
        };

        let content = self.generate(&request).await?;
        let turn = to_model_turn(content);
        info!(
            "Gemini chat turn: {} tool call(s), text={}",
            turn.tool_calls.len(),
            turn.text.is_some()
        );
        Ok(turn)
    }

    async fn generate_json(&self, prompt: &str) -> Result<serde_json::Value, LlmError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                    ..Default::default()
                }],
            }],
            system_instruction: None,
            tools: None,
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
            }),
        };

        let content = self.generate(&request).await?;
        let text = to_model_turn(content).text.ok_or(LlmError::EmptyResponse)?;
        Ok(serde_json::from_str(extract_json(&text))?)
    }

    async fn generate_text(&self, prompt: &str) -> Result<String, LlmError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                    ..Default::default()
                }],
            }],
            system_instruction: None,
            tools: None,
            generation_config: None,
        };

        let content = self.generate(&request).await?;
        to_model_turn(content).text.ok_or(LlmError::EmptyResponse)
    }
}
