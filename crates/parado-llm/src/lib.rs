mod assist;
mod fence;

pub use assist::{
    AssistMode, IDENTITY_PROMPT, assist_request, build_user_content, clean_output,
    system_instruction,
};
pub use fence::{Fence, extract_fenced_code, fences, normalize_code_output};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub const DEFAULT_TEMPERATURE: f32 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Gemini,
    OpenAiCompatible,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gemini => f.write_str("gemini"),
            Provider::OpenAiCompatible => f.write_str("openai-compatible"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSelection {
    Auto,
    Gemini,
    OpenAiCompatible,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub provider: Provider,
    pub model: String,
}

/// A callable action the model may request, described by a JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    /// Opaque provider token that must be echoed back with this call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            signature: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub payload: Value,
}

/// Provider-neutral conversation entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatMessage {
    User {
        text: String,
    },
    Assistant {
        text: String,
        tool_calls: Vec<ToolCall>,
        signature: Option<String>,
    },
    ToolResults {
        results: Vec<ToolResult>,
    },
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn assistant(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            text: text.into(),
            tool_calls,
            signature: None,
        }
    }

    /// Replays a model reply verbatim, provider tokens included.
    pub fn from_reply(reply: &ModelReply) -> Self {
        Self::Assistant {
            text: reply.text.clone(),
            tool_calls: reply.tool_calls.clone(),
            signature: reply.signature.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub system_instruction: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub tools: Vec<ToolDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelReply {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// Provider token attached to the text part, if any.
    pub signature: Option<String>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn requests_actions(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutedReply {
    pub reply: ModelReply,
    pub provider: Provider,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: Provider,
    pub stage: &'static str,
    pub error: String,
}

#[derive(Debug, Error)]
#[error("LLM routing failed after {attempts:?}")]
pub struct ProviderRoutingError {
    pub attempts: Vec<ProviderAttempt>,
}

/// No provider could be used because credentials are absent.
///
/// Callers treat this as "feature disabled" rather than as a failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ModelUnavailable {
    pub message: String,
}

pub trait ModelClient {
    fn complete(&self, req: &ModelRequest, model: &str) -> Result<ModelReply>;

    /// False when the client has no API key; routing skips it.
    fn is_configured(&self) -> bool {
        true
    }
}

pub trait ModelService {
    fn candidate_chain(&self, selection: ProviderSelection) -> Vec<ProviderDescriptor>;
    fn complete(
        &self,
        selection: ProviderSelection,
        req: &ModelRequest,
        model_override: Option<&str>,
    ) -> Result<RoutedReply>;
}

pub struct ProviderRouter<G, O>
where
    G: ModelClient,
    O: ModelClient,
{
    pub gemini: G,
    pub openai: O,
    pub gemini_model: String,
    pub openai_model: String,
}

impl<G, O> ProviderRouter<G, O>
where
    G: ModelClient,
    O: ModelClient,
{
    fn is_configured(&self, provider: Provider) -> bool {
        match provider {
            Provider::Gemini => self.gemini.is_configured(),
            Provider::OpenAiCompatible => self.openai.is_configured(),
        }
    }

    fn descriptor(&self, provider: Provider) -> ProviderDescriptor {
        let model = match provider {
            Provider::Gemini => self.gemini_model.clone(),
            Provider::OpenAiCompatible => self.openai_model.clone(),
        };
        ProviderDescriptor { provider, model }
    }

    fn call_provider(
        &self,
        provider: Provider,
        req: &ModelRequest,
        model_override: Option<&str>,
    ) -> Result<RoutedReply> {
        let model = match provider {
            Provider::Gemini => model_override.unwrap_or(&self.gemini_model),
            Provider::OpenAiCompatible => model_override.unwrap_or(&self.openai_model),
        };
        tracing::debug!(%provider, model, messages = req.messages.len(), "calling model");
        let reply = match provider {
            Provider::Gemini => self.gemini.complete(req, model)?,
            Provider::OpenAiCompatible => self.openai.complete(req, model)?,
        };
        Ok(RoutedReply {
            reply,
            provider,
            model: model.to_string(),
        })
    }

    fn unavailable(selection: ProviderSelection) -> ModelUnavailable {
        let message = match selection {
            ProviderSelection::Gemini => {
                "GEMINI_API_KEY is missing in environment. AI features are disabled."
            }
            ProviderSelection::OpenAiCompatible => {
                "OPENAI_API_KEY is missing in environment. AI features are disabled."
            }
            ProviderSelection::Auto => {
                "API key is missing in environment (set GEMINI_API_KEY or OPENAI_API_KEY). AI features are disabled."
            }
        };
        ModelUnavailable {
            message: message.to_string(),
        }
    }
}

impl<G, O> ModelService for ProviderRouter<G, O>
where
    G: ModelClient,
    O: ModelClient,
{
    fn candidate_chain(&self, selection: ProviderSelection) -> Vec<ProviderDescriptor> {
        let order: &[Provider] = match selection {
            ProviderSelection::Gemini => &[Provider::Gemini],
            ProviderSelection::OpenAiCompatible => &[Provider::OpenAiCompatible],
            ProviderSelection::Auto => &[Provider::Gemini, Provider::OpenAiCompatible],
        };
        order
            .iter()
            .copied()
            .filter(|provider| self.is_configured(*provider))
            .map(|provider| self.descriptor(provider))
            .collect()
    }

    fn complete(
        &self,
        selection: ProviderSelection,
        req: &ModelRequest,
        model_override: Option<&str>,
    ) -> Result<RoutedReply> {
        let chain = self.candidate_chain(selection);
        if chain.is_empty() {
            return Err(Self::unavailable(selection).into());
        }

        let mut attempts = Vec::new();
        for (position, entry) in chain.into_iter().enumerate() {
            // An override names a model of the preferred provider only.
            let model_override = model_override.filter(|_| position == 0);
            match self.call_provider(entry.provider, req, model_override) {
                Ok(reply) => return Ok(reply),
                Err(err) => {
                    tracing::warn!(provider = %entry.provider, error = %err, "model call failed");
                    attempts.push(ProviderAttempt {
                        provider: entry.provider,
                        stage: "complete",
                        error: format!("{err:#}"),
                    });
                }
            }
        }

        Err(ProviderRoutingError { attempts }.into())
    }
}

impl<S: ModelService + ?Sized> ModelService for Box<S> {
    fn candidate_chain(&self, selection: ProviderSelection) -> Vec<ProviderDescriptor> {
        (**self).candidate_chain(selection)
    }

    fn complete(
        &self,
        selection: ProviderSelection,
        req: &ModelRequest,
        model_override: Option<&str>,
    ) -> Result<RoutedReply> {
        (**self).complete(selection, req, model_override)
    }
}
