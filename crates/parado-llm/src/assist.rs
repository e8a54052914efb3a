use crate::{ChatMessage, ModelRequest};
use std::fmt;
use std::str::FromStr;

pub const IDENTITY_PROMPT: &str = "IDENTITY: You are the Parado assistant, an AI developer environment helper. \
ENVIRONMENT: You are running inside Parado, which executes JavaScript on an embedded interpreter. \
NO ASTERISKS: You MUST NOT use asterisks (*) for formatting. Use dashes (-) for lists and plain text for everything else. \
ADVICE: The interpreter has no network sockets and no direct file system access; packages can be installed into the workspace and loaded with require(name).";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistMode {
    Debug,
    Optimize,
    Explain,
    Generate,
}

impl AssistMode {
    fn task(self) -> &'static str {
        match self {
            AssistMode::Debug => {
                "TASK: Debug the provided JavaScript code. Identify errors and provide a fix."
            }
            AssistMode::Optimize => {
                "TASK: Optimize the JavaScript code for performance in an embedded interpreter."
            }
            AssistMode::Explain => "TASK: Explain the code logic clearly.",
            AssistMode::Generate => {
                "TASK: Generate high-quality JavaScript code based on the user request."
            }
        }
    }
}

impl fmt::Display for AssistMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssistMode::Debug => "debug",
            AssistMode::Optimize => "optimize",
            AssistMode::Explain => "explain",
            AssistMode::Generate => "generate",
        };
        f.write_str(name)
    }
}

impl FromStr for AssistMode {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "debug" | "fix" => Ok(AssistMode::Debug),
            "optimize" => Ok(AssistMode::Optimize),
            "explain" => Ok(AssistMode::Explain),
            "generate" | "gen" => Ok(AssistMode::Generate),
            other => Err(format!(
                "unknown assist mode '{other}'. Supported: debug, optimize, explain, generate"
            )),
        }
    }
}

pub fn system_instruction(mode: AssistMode) -> String {
    format!("{IDENTITY_PROMPT} {} NO ASTERISKS.", mode.task())
}

pub fn build_user_content(code: &str, prompt: &str) -> String {
    format!("CURRENT CODE:\n{code}\n\nUSER REQUEST: {prompt}")
}

pub fn assist_request(
    mode: AssistMode,
    code: &str,
    prompt: &str,
    temperature: f32,
) -> ModelRequest {
    ModelRequest {
        system_instruction: system_instruction(mode),
        messages: vec![ChatMessage::user(build_user_content(code, prompt))],
        temperature,
        tools: Vec::new(),
    }
}

/// Models ignore the formatting rule often enough that the reply is scrubbed too.
pub fn clean_output(text: &str) -> String {
    text.replace('*', "")
}
