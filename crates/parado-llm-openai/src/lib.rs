use anyhow::{Context, Result, anyhow};
use parado_llm::{ChatMessage, ModelClient, ModelReply, ModelRequest, ToolCall};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Clone)]
pub struct OpenAiCompatibleClient {
    pub base_url: String,
    pub api_key: String,
}

impl OpenAiCompatibleClient {
    pub fn from_env() -> Result<Self> {
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let api_key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY is required for OpenAI-compatible provider")?;

        Ok(Self { base_url, api_key })
    }

    pub fn from_parts(base_url: String, api_key: String) -> Self {
        Self { base_url, api_key }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<WireToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl Message {
    fn text(role: &'static str, content: &str) -> Self {
        Self {
            role,
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct Tool {
    r#type: &'static str,
    function: ToolFunction,
}

#[derive(Debug, Serialize)]
struct ToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: WireFunction,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    /// JSON-encoded arguments, as the wire format carries them.
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

fn build_messages(req: &ModelRequest) -> Vec<Message> {
    let mut messages = vec![Message::text("system", &req.system_instruction)];
    for message in &req.messages {
        match message {
            ChatMessage::User { text } => messages.push(Message::text("user", text)),
            ChatMessage::Assistant {
                text, tool_calls, ..
            } => messages.push(Message {
                role: "assistant",
                content: (!text.is_empty()).then(|| text.clone()),
                tool_calls: tool_calls
                    .iter()
                    .map(|call| WireToolCall {
                        id: call.id.clone(),
                        r#type: function_type(),
                        function: WireFunction {
                            name: call.name.clone(),
                            arguments: call.arguments.to_string(),
                        },
                    })
                    .collect(),
                tool_call_id: None,
            }),
            ChatMessage::ToolResults { results } => {
                for result in results {
                    messages.push(Message {
                        role: "tool",
                        content: Some(result.payload.to_string()),
                        tool_calls: Vec::new(),
                        tool_call_id: Some(result.call_id.clone()),
                    });
                }
            }
        }
    }
    messages
}

fn build_body(req: &ModelRequest, model: &str) -> ChatRequest {
    ChatRequest {
        model: model.to_string(),
        temperature: req.temperature,
        messages: build_messages(req),
        tools: req
            .tools
            .iter()
            .map(|tool| Tool {
                r#type: "function",
                function: ToolFunction {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                },
            })
            .collect(),
    }
}

/// Arguments that are not valid JSON are passed through as a string so the
/// action layer can report them as malformed.
fn decode_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_reply(parsed: ChatResponse) -> Result<ModelReply> {
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("OpenAI-compatible response had no choices"))?;

    Ok(ModelReply {
        text: choice.message.content.unwrap_or_default(),
        tool_calls: choice
            .message
            .tool_calls
            .into_iter()
            .map(|call| {
                let arguments = decode_arguments(&call.function.arguments);
                ToolCall::new(call.id, call.function.name, arguments)
            })
            .collect(),
        signature: None,
    })
}

impl ModelClient for OpenAiCompatibleClient {
    fn complete(&self, req: &ModelRequest, model: &str) -> Result<ModelReply> {
        let client = Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .context("failed to build HTTP client")?;
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let response = client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&build_body(req, model))
            .send()
            .context("failed calling OpenAI-compatible endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_else(|_| "<unavailable>".to_string());
            return Err(anyhow!(
                "OpenAI-compatible request failed ({status}): {body}"
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .context("failed to decode OpenAI-compatible response")?;
        let reply = parse_reply(parsed)?;
        tracing::debug!(tool_calls = reply.tool_calls.len(), "openai-compatible reply decoded");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatResponse, OpenAiCompatibleClient, build_body, parse_reply};
    use parado_llm::{ChatMessage, ModelClient, ModelRequest, ToolCall, ToolResult};
    use serde_json::json;

    #[test]
    fn tool_turns_map_to_chat_roles() {
        let req = ModelRequest {
            system_instruction: "sys".to_string(),
            messages: vec![
                ChatMessage::user("go"),
                ChatMessage::assistant(
                    "",
                    vec![ToolCall::new("abc", "run_code", json!({}))],
                ),
                ChatMessage::ToolResults {
                    results: vec![ToolResult {
                        call_id: "abc".to_string(),
                        name: "run_code".to_string(),
                        payload: json!({"result": {"stdout": ["hi"]}}),
                    }],
                },
            ],
            temperature: 0.5,
            tools: Vec::new(),
        };

        let body = serde_json::to_value(build_body(&req, "gpt-test")).expect("serialize");
        assert_eq!(body["model"], "gpt-test");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(body["messages"][2].get("content").is_none());
        assert_eq!(body["messages"][2]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(body["messages"][3]["role"], "tool");
        assert_eq!(body["messages"][3]["tool_call_id"], "abc");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn reply_decodes_tool_call_arguments() {
        let raw = json!({
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [
                        {"id": "1", "type": "function", "function": {"name": "create_file", "arguments": "{\"name\":\"a.js\"}"}},
                        {"id": "2", "type": "function", "function": {"name": "create_file", "arguments": "{oops"}}
                    ]
                }
            }]
        });
        let parsed: ChatResponse = serde_json::from_value(raw).expect("decode");
        let reply = parse_reply(parsed).expect("parse");
        assert_eq!(reply.text, "");
        assert_eq!(reply.tool_calls[0].arguments["name"], "a.js");
        assert_eq!(reply.tool_calls[1].arguments, json!("{oops"));
    }

    #[test]
    #[ignore]
    fn live_openai_completion_if_enabled() {
        if std::env::var("PARADO_RUN_LIVE_TESTS").ok().as_deref() != Some("1") {
            return;
        }

        let client = match OpenAiCompatibleClient::from_env() {
            Ok(c) => c,
            Err(_) => return,
        };

        let model = std::env::var("PARADO_MODEL").unwrap_or_else(|_| "gpt-4.1-mini".to_string());
        let req = ModelRequest {
            system_instruction: "Answer with one word.".to_string(),
            messages: vec![ChatMessage::user("Say hello")],
            temperature: 0.0,
            tools: Vec::new(),
        };

        let out = client
            .complete(&req, &model)
            .expect("openai live request should succeed");
        assert!(!out.text.trim().is_empty());
    }
}
