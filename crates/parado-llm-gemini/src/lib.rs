use anyhow::{Context, Result, anyhow};
use parado_llm::{ChatMessage, ModelClient, ModelReply, ModelRequest, ToolCall, ToolDeclaration};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

#[derive(Clone)]
pub struct GeminiClient {
    pub base_url: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl GeminiClient {
    pub fn from_parts(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("GEMINI_API_KEY")
            .or_else(|_| std::env::var("API_KEY"))
            .context("GEMINI_API_KEY is required for the Gemini provider")?;
        Ok(Self::from_parts(base_url, api_key))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSet>,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSet {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(rename = "thoughtSignature", default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    response: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

fn to_contents(messages: &[ChatMessage]) -> Vec<Content> {
    messages
        .iter()
        .map(|message| match message {
            ChatMessage::User { text } => Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(text)],
            },
            ChatMessage::Assistant {
                text,
                tool_calls,
                signature,
            } => {
                let mut parts = Vec::new();
                if !text.is_empty() {
                    parts.push(Part {
                        thought_signature: signature.clone(),
                        ..Part::text(text)
                    });
                }
                parts.extend(tool_calls.iter().map(|call| Part {
                    function_call: Some(FunctionCall {
                        id: None,
                        name: call.name.clone(),
                        args: call.arguments.clone(),
                    }),
                    thought_signature: call.signature.clone(),
                    ..Part::default()
                }));
                Content {
                    role: Some("model".to_string()),
                    parts,
                }
            }
            ChatMessage::ToolResults { results } => Content {
                role: Some("user".to_string()),
                parts: results
                    .iter()
                    .map(|result| Part {
                        function_response: Some(FunctionResponse {
                            id: None,
                            name: result.name.clone(),
                            response: result.payload.clone(),
                        }),
                        ..Part::default()
                    })
                    .collect(),
            },
        })
        .collect()
}

fn to_tools(tools: &[ToolDeclaration]) -> Vec<ToolSet> {
    if tools.is_empty() {
        return Vec::new();
    }
    vec![ToolSet {
        function_declarations: tools
            .iter()
            .map(|tool| FunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            })
            .collect(),
    }]
}

fn build_body(req: &ModelRequest) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part::text(&req.system_instruction)],
        },
        contents: to_contents(&req.messages),
        generation_config: GenerationConfig {
            temperature: req.temperature,
        },
        tools: to_tools(&req.tools),
    }
}

fn parse_reply(parsed: GenerateContentResponse) -> Result<ModelReply> {
    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Gemini response had no candidates"))?;

    let mut reply = ModelReply::default();
    for (index, part) in candidate.content.parts.into_iter().enumerate() {
        if let Some(call) = part.function_call {
            reply.tool_calls.push(ToolCall {
                id: call.id.unwrap_or_else(|| format!("call-{index}")),
                name: call.name,
                arguments: call.args,
                signature: part.thought_signature,
            });
        } else if let Some(text) = part.text {
            reply.text.push_str(&text);
            if part.thought_signature.is_some() {
                reply.signature = part.thought_signature;
            }
        }
    }
    Ok(reply)
}

impl ModelClient for GeminiClient {
    fn complete(&self, req: &ModelRequest, model: &str) -> Result<ModelReply> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .context("failed to build HTTP client")?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );

        let response = client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&build_body(req))
            .send()
            .context("failed calling Gemini endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(anyhow!("Gemini request failed ({status}): {body}"));
        }

        let parsed: GenerateContentResponse = response
            .json()
            .context("failed to decode Gemini response")?;
        let reply = parse_reply(parsed)?;
        tracing::debug!(tool_calls = reply.tool_calls.len(), "gemini reply decoded");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::{GenerateContentResponse, build_body, parse_reply};
    use parado_llm::{ChatMessage, ModelRequest, ToolCall, ToolDeclaration, ToolResult};
    use serde_json::json;

    #[test]
    fn request_body_uses_gemini_shapes() {
        let req = ModelRequest {
            system_instruction: "sys".to_string(),
            messages: vec![
                ChatMessage::user("make a file"),
                ChatMessage::assistant(
                    "",
                    vec![ToolCall::new("call-0", "create_file", json!({"name": "a.js"}))],
                ),
                ChatMessage::ToolResults {
                    results: vec![ToolResult {
                        call_id: "call-0".to_string(),
                        name: "create_file".to_string(),
                        payload: json!({"result": "ok"}),
                    }],
                },
            ],
            temperature: 0.5,
            tools: vec![ToolDeclaration::new("create_file", "Create", json!({"type": "object"}))],
        };

        let body = serde_json::to_value(build_body(&req)).expect("body should serialize");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["generationConfig"]["temperature"], 0.5);
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][1]["parts"][0]["functionCall"]["name"], "create_file");
        assert_eq!(
            body["contents"][2]["parts"][0]["functionResponse"]["response"]["result"],
            "ok"
        );
        assert_eq!(
            body["tools"][0]["functionDeclarations"][0]["name"],
            "create_file"
        );
    }

    #[test]
    fn tools_are_omitted_when_empty() {
        let req = ModelRequest {
            system_instruction: "sys".to_string(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.2,
            tools: Vec::new(),
        };
        let body = serde_json::to_value(build_body(&req)).expect("body should serialize");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn reply_collects_text_and_function_calls() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "Working on it. "},
                        {"functionCall": {"name": "delete_file", "args": {"name": "old.js"}}}
                    ]
                }
            }]
        });
        let parsed: GenerateContentResponse =
            serde_json::from_value(raw).expect("response should decode");
        let reply = parse_reply(parsed).expect("reply should parse");
        assert_eq!(reply.text, "Working on it. ");
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].id, "call-1");
        assert_eq!(reply.tool_calls[0].arguments["name"], "old.js");
    }

    #[test]
    fn thought_signatures_are_echoed_back() {
        let raw = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "Let me check. ", "thoughtSignature": "sig-text"},
                        {
                            "functionCall": {"name": "run_code", "args": {}},
                            "thoughtSignature": "sig-call"
                        }
                    ]
                }
            }]
        });
        let parsed: GenerateContentResponse =
            serde_json::from_value(raw).expect("response should decode");
        let reply = parse_reply(parsed).expect("reply should parse");
        assert_eq!(reply.tool_calls[0].signature.as_deref(), Some("sig-call"));

        let req = ModelRequest {
            system_instruction: "sys".to_string(),
            messages: vec![
                ChatMessage::user("run it"),
                ChatMessage::from_reply(&reply),
                ChatMessage::ToolResults {
                    results: vec![ToolResult {
                        call_id: reply.tool_calls[0].id.clone(),
                        name: "run_code".to_string(),
                        payload: json!({"ok": true}),
                    }],
                },
            ],
            temperature: 0.5,
            tools: Vec::new(),
        };
        let body = serde_json::to_value(build_body(&req)).expect("body should serialize");
        let model_parts = &body["contents"][1]["parts"];
        assert_eq!(model_parts[0]["text"], "Let me check. ");
        assert_eq!(model_parts[0]["thoughtSignature"], "sig-text");
        assert_eq!(model_parts[1]["functionCall"]["name"], "run_code");
        assert_eq!(model_parts[1]["thoughtSignature"], "sig-call");
        assert!(body["contents"][2]["parts"][0].get("thoughtSignature").is_none());
    }

    #[test]
    fn empty_candidates_is_an_error() {
        let parsed: GenerateContentResponse =
            serde_json::from_value(json!({"candidates": []})).expect("response should decode");
        let err = parse_reply(parsed).expect_err("must fail");
        assert!(err.to_string().contains("no candidates"));
    }

    #[test]
    #[ignore]
    fn live_gemini_completion_if_enabled() {
        use super::{DEFAULT_MODEL, GeminiClient};
        use parado_llm::ModelClient;

        if std::env::var("PARADO_RUN_LIVE_TESTS").ok().as_deref() != Some("1") {
            return;
        }
        let client = match GeminiClient::from_env() {
            Ok(c) => c,
            Err(_) => return,
        };
        let req = ModelRequest {
            system_instruction: "Answer with one word.".to_string(),
            messages: vec![ChatMessage::user("Say hello")],
            temperature: 0.0,
            tools: Vec::new(),
        };
        let reply = client
            .complete(&req, DEFAULT_MODEL)
            .expect("gemini live request should succeed");
        assert!(!reply.text.trim().is_empty());
    }
}
