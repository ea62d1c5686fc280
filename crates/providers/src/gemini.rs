//! Gemini `generateContent` REST client.
//!
//! Supports:
//! - Text and inline image parts
//! - Function declarations, function calls and function responses
//! - Function-calling mode (`AUTO` / `NONE`) and usage metadata

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use patchloop_core::error::ModelError;
use patchloop_core::message::{ContentPart, Role, Turn};
use patchloop_core::model::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A Gemini model reached over the public REST API.
pub struct GeminiModel {
    model: String,
    base_url: String,
    api_key: String,
    temperature: f32,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl GeminiModel {
    /// Create a client for `model` (e.g. "gemini-1.5-pro-latest").
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ModelError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ModelError::NotConfigured("missing Gemini API key".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;

        Ok(Self {
            model: model.into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key,
            temperature: 0.2,
            max_output_tokens: 8192,
            client,
        })
    }

    /// Point at a different endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_generation(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn to_api_request(&self, request: &ModelRequest) -> ApiRequest {
        ApiRequest {
            system_instruction: request.system_instruction.as_ref().map(|text| ApiContent {
                role: None,
                parts: vec![ApiPart::text(text)],
            }),
            contents: to_api_contents(&request.turns),
            tools: if request.tools.is_empty() {
                Vec::new()
            } else {
                vec![ApiTool {
                    function_declarations: request
                        .tools
                        .iter()
                        .map(|t| ApiFunctionDeclaration {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.parameters.clone(),
                        })
                        .collect(),
                }]
            },
            tool_config: (!request.tools.is_empty()).then(|| ApiToolConfig {
                function_calling_config: ApiFunctionCallingConfig {
                    mode: match request.mode {
                        FunctionCallingMode::Auto => "AUTO",
                        FunctionCallingMode::None => "NONE",
                    },
                },
            }),
            generation_config: ApiGenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

/// Convert conversation turns to Gemini contents. Turns without parts are
/// skipped because the API rejects them.
fn to_api_contents(turns: &[Turn]) -> Vec<ApiContent> {
    turns
        .iter()
        .filter_map(|t| {
            // The API rejects empty text parts and empty turns.
            let parts: Vec<ApiPart> = t
                .parts
                .iter()
                .filter(|p| !matches!(p, ContentPart::Text { text } if text.trim().is_empty()))
                .map(to_api_part)
                .collect();
            (!parts.is_empty()).then(|| ApiContent {
                role: Some(
                    match t.role {
                        Role::User => "user",
                        Role::Model => "model",
                    }
                    .into(),
                ),
                parts,
            })
        })
        .collect()
}

fn to_api_part(part: &ContentPart) -> ApiPart {
    match part {
        ContentPart::Text { text } => ApiPart::text(text),
        ContentPart::Image { data, mime } => ApiPart {
            inline_data: Some(ApiInlineData {
                mime_type: mime.clone(),
                data: BASE64.encode(data),
            }),
            ..ApiPart::default()
        },
        ContentPart::ToolCall { name, args } => ApiPart {
            function_call: Some(ApiFunctionCall {
                name: name.clone(),
                args: args.clone(),
            }),
            ..ApiPart::default()
        },
        ContentPart::ToolResult { name, outcome } => ApiPart {
            function_response: Some(ApiFunctionResponse {
                name: name.clone(),
                response: serde_json::json!({
                    "result": outcome.content,
                    "is_error": outcome.is_error,
                }),
            }),
            ..ApiPart::default()
        },
    }
}

fn parse_response(response: ApiResponse) -> Result<ModelResponse, ModelError> {
    let usage = response
        .usage_metadata
        .map(|u| Usage {
            prompt_count: u.prompt_token_count,
            candidate_count: u.candidates_token_count,
        })
        .unwrap_or_default();

    let Some(candidate) = response.candidates.into_iter().next() else {
        let reason = response
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates".into());
        return Err(ModelError::MalformedResponse(format!(
            "empty response: {reason}"
        )));
    };

    let parts = candidate
        .content
        .map(|c| c.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|p| {
            if let Some(call) = p.function_call {
                Some(ResponsePart::FunctionCall {
                    name: call.name,
                    args: call.args,
                })
            } else {
                p.text.map(|text| ResponsePart::Text { text })
            }
        })
        .collect();

    Ok(ModelResponse { parts, usage })
}

#[async_trait]
impl Model for GeminiModel {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let body = self.to_api_request(&request);

        debug!(
            model = %self.model,
            turns = body.contents.len(),
            tools = request.tools.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ModelError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ModelError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if !(200..300).contains(&status) {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Gemini returned error");
            return Err(ModelError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::MalformedResponse(format!("Failed to parse response: {e}")))?;

        parse_response(api_response)
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<ApiToolConfig>,
    generation_config: ApiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<ApiInlineData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<ApiFunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<ApiFunctionResponse>,
}

impl ApiPart {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiTool {
    function_declarations: Vec<ApiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct ApiFunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiToolConfig {
    function_calling_config: ApiFunctionCallingConfig,
}

#[derive(Debug, Serialize)]
struct ApiFunctionCallingConfig {
    mode: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    usage_metadata: Option<ApiUsage>,
    prompt_feedback: Option<ApiPromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    content: Option<ApiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPromptFeedback {
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchloop_core::tool::ToolOutcome;

    fn model() -> GeminiModel {
        GeminiModel::new("test-key", "gemini-1.5-pro-latest").unwrap()
    }

    #[test]
    fn empty_key_is_not_configured() {
        assert!(matches!(
            GeminiModel::new("  ", "gemini"),
            Err(ModelError::NotConfigured(_))
        ));
    }

    #[test]
    fn base_url_is_trimmed() {
        let m = model().with_base_url("http://localhost:8080/v1beta/");
        assert_eq!(m.base_url, "http://localhost:8080/v1beta");
    }

    #[test]
    fn request_serialization() {
        let mut args = serde_json::Map::new();
        args.insert("path".into(), "a.txt".into());
        let request = ModelRequest {
            system_instruction: Some("be brief".into()),
            turns: vec![
                Turn::user_with_image("what is this?", vec![1, 2, 3], "image/png"),
                Turn::tool_call("read_file", args),
                Turn::tool_result("read_file", ToolOutcome::success("ok")),
                Turn {
                    role: Role::Model,
                    parts: Vec::new(),
                },
            ],
            tools: vec![ToolDefinition {
                name: "read_file".into(),
                description: "Read a file".into(),
                parameters: serde_json::json!({"type": "object", "properties": {}}),
            }],
            mode: FunctionCallingMode::Auto,
        };

        let body = serde_json::to_value(model().to_api_request(&request)).unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(body["systemInstruction"].get("role").is_none());

        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "user");
        assert_eq!(contents[0]["parts"][1]["inlineData"]["data"], "AQID");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["args"]["path"], "a.txt");
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"]["response"]["result"],
            "ok"
        );

        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "read_file");
        assert_eq!(body["toolConfig"]["functionCallingConfig"]["mode"], "AUTO");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn text_only_request_has_no_tools() {
        let request = ModelRequest::text_only("sys", vec![Turn::user("hi")]);
        let body = serde_json::to_value(model().to_api_request(&request)).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body.get("toolConfig").is_none());
    }

    #[test]
    fn blank_text_turns_are_skipped() {
        let contents = to_api_contents(&[Turn::user("hi"), Turn::model("  "), Turn::user("again")]);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[1].parts[0].text.as_deref(), Some("again"));
    }

    #[test]
    fn parse_text_and_function_calls() {
        let raw = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "Let me look."},
                        {"functionCall": {"name": "list_files", "args": {"path": "."}}}
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 120, "candidatesTokenCount": 30, "totalTokenCount": 150}
        }"#;
        let parsed = parse_response(serde_json::from_str(raw).unwrap()).unwrap();
        assert_eq!(parsed.parts.len(), 2);
        assert_eq!(parsed.joined_text(), "Let me look.");
        assert!(matches!(
            &parsed.parts[1],
            ResponsePart::FunctionCall { name, .. } if name == "list_files"
        ));
        assert_eq!(
            parsed.usage,
            Usage {
                prompt_count: 120,
                candidate_count: 30
            }
        );
    }

    #[test]
    fn blocked_prompt_is_malformed() {
        let raw = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = parse_response(serde_json::from_str(raw).unwrap()).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
