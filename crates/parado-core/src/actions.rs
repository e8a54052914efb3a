use crate::buffers::BufferError;
use parado_llm::{ToolCall, ToolDeclaration};
use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;

pub const CREATE_FILE: &str = "create_file";
pub const UPDATE_FILE: &str = "update_file";
pub const DELETE_FILE: &str = "delete_file";
pub const INSTALL_PACKAGE: &str = "install_package";
pub const RUN_CODE: &str = "run_code";

pub const ACTION_NAMES: [&str; 5] = [
    CREATE_FILE,
    UPDATE_FILE,
    DELETE_FILE,
    INSTALL_PACKAGE,
    RUN_CODE,
];

/// A workspace mutation the model may request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "name", content = "arguments", rename_all = "snake_case")]
pub enum Action {
    CreateFile {
        name: String,
        #[serde(default)]
        content: String,
    },
    UpdateFile {
        name: String,
        content: String,
    },
    DeleteFile {
        name: String,
    },
    InstallPackage {
        name: String,
    },
    RunCode {
        #[serde(default)]
        name: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("unknown action '{0}'")]
    Unknown(String),
    #[error("invalid arguments for {action}: {message}")]
    InvalidArguments { action: String, message: String },
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error("{0}")]
    Failed(String),
}

impl Action {
    pub fn from_call(call: &ToolCall) -> Result<Self, ActionError> {
        if !ACTION_NAMES.contains(&call.name.as_str()) {
            return Err(ActionError::Unknown(call.name.clone()));
        }
        let arguments = match &call.arguments {
            Value::Null => json!({}),
            other => other.clone(),
        };
        serde_json::from_value(json!({ "name": call.name, "arguments": arguments })).map_err(
            |err| ActionError::InvalidArguments {
                action: call.name.clone(),
                message: err.to_string(),
            },
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateFile { .. } => CREATE_FILE,
            Self::UpdateFile { .. } => UPDATE_FILE,
            Self::DeleteFile { .. } => DELETE_FILE,
            Self::InstallPackage { .. } => INSTALL_PACKAGE,
            Self::RunCode { .. } => RUN_CODE,
        }
    }
}

/// Result payload sent back to the model for one call.
pub fn result_payload(outcome: &Result<Value, ActionError>) -> Value {
    match outcome {
        Ok(result) => json!({ "ok": true, "result": result }),
        Err(err) => json!({ "ok": false, "error": err.to_string() }),
    }
}

fn name_property(description: &str) -> Value {
    json!({ "type": "string", "description": description })
}

pub fn declarations() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration::new(
            CREATE_FILE,
            "Create a new file in the project and make it the active file.",
            json!({
                "type": "object",
                "properties": {
                    "name": name_property("File name, for example utils.js"),
                    "content": { "type": "string", "description": "Initial file content" }
                },
                "required": ["name"]
            }),
        ),
        ToolDeclaration::new(
            UPDATE_FILE,
            "Replace the entire content of an existing file.",
            json!({
                "type": "object",
                "properties": {
                    "name": name_property("Name of the file to overwrite"),
                    "content": { "type": "string", "description": "Complete new file content" }
                },
                "required": ["name", "content"]
            }),
        ),
        ToolDeclaration::new(
            DELETE_FILE,
            "Delete a file. The last remaining file cannot be deleted.",
            json!({
                "type": "object",
                "properties": { "name": name_property("Name of the file to delete") },
                "required": ["name"]
            }),
        ),
        ToolDeclaration::new(
            INSTALL_PACKAGE,
            "Install a package so scripts can load it with require(name).",
            json!({
                "type": "object",
                "properties": { "name": name_property("Package name, for example lodash") },
                "required": ["name"]
            }),
        ),
        ToolDeclaration::new(
            RUN_CODE,
            "Run a file and return its console output. Runs the active file when no name is given.",
            json!({
                "type": "object",
                "properties": { "name": name_property("Optional file name to run") }
            }),
        ),
    ]
}
