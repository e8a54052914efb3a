#![allow(dead_code)]

use anyhow::{Result, anyhow};
use parado_core::{BufferStore, Session, SessionOptions};
use parado_engine::{BoaInterpreter, PackageSource};
use parado_llm::{
    ModelReply, ModelRequest, ModelService, ModelUnavailable, Provider, ProviderDescriptor,
    ProviderSelection, RoutedReply, ToolCall,
};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub enum Scripted {
    Reply(ModelReply),
    Fail(&'static str),
    Unavailable,
}

pub fn text(text: &str) -> Scripted {
    Scripted::Reply(ModelReply::text(text))
}

pub fn actions(calls: Vec<ToolCall>) -> Scripted {
    Scripted::Reply(ModelReply {
        tool_calls: calls,
        ..ModelReply::default()
    })
}

pub fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
    ToolCall::new(id, name, arguments)
}

/// Replays canned replies and records every request it receives.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl ScriptedModel {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into())),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("lock should work").clone()
    }
}

impl ModelService for ScriptedModel {
    fn candidate_chain(&self, _selection: ProviderSelection) -> Vec<ProviderDescriptor> {
        vec![ProviderDescriptor {
            provider: Provider::Gemini,
            model: "scripted".to_string(),
        }]
    }

    fn complete(
        &self,
        _selection: ProviderSelection,
        req: &ModelRequest,
        _model_override: Option<&str>,
    ) -> Result<RoutedReply> {
        self.requests
            .lock()
            .expect("lock should work")
            .push(req.clone());
        match self.script.lock().expect("lock should work").pop_front() {
            Some(Scripted::Reply(reply)) => Ok(RoutedReply {
                reply,
                provider: Provider::Gemini,
                model: "scripted".to_string(),
            }),
            Some(Scripted::Fail(message)) => Err(anyhow!(message)),
            Some(Scripted::Unavailable) => Err(ModelUnavailable {
                message: "GEMINI_API_KEY is missing in environment. AI features are disabled."
                    .to_string(),
            }
            .into()),
            None => Err(anyhow!("script exhausted")),
        }
    }
}

#[derive(Default)]
pub struct MapPackages(pub HashMap<String, String>);

impl PackageSource for MapPackages {
    fn fetch(&self, name: &str) -> Result<String> {
        self.0
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("package {name} not found"))
    }
}

pub fn session_with(
    model: ScriptedModel,
    packages: MapPackages,
    options: SessionOptions,
) -> Session {
    Session::new(
        BufferStore::with_welcome(),
        Box::new(BoaInterpreter::new().expect("engine should start")),
        Box::new(model),
        Box::new(packages),
        options,
    )
}

pub fn session(model: ScriptedModel) -> Session {
    session_with(model, MapPackages::default(), SessionOptions::default())
}
