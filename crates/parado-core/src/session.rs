use crate::buffers::{BufferError, BufferId, BufferStore};
use crate::console::ConsoleLog;
use crate::gate::ExecutionGate;
use crate::transcript::Transcript;
use anyhow::Result;
use parado_engine::{
    CapturedOutput, Interpreter, OutputSink, PackageSource, Stream, validate_package_name,
};
use parado_llm::{
    AssistMode, ChatMessage, DEFAULT_TEMPERATURE, ModelService, ModelUnavailable,
    ProviderSelection, assist_request, clean_output, normalize_code_output,
};
use std::collections::BTreeSet;

pub const GENERATED_MARKER: &str = "// --- Generated by Parado ---";
pub const LANGUAGE_TAGS: &[&str] = &["javascript", "js"];
pub const DEFAULT_MAX_AGENT_ROUNDS: usize = 12;

const EMPTY_REPLY: &str = "No response from the assistant.";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub provider_selection: ProviderSelection,
    pub model_override: Option<String>,
    pub temperature: f32,
    pub max_agent_rounds: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            provider_selection: ProviderSelection::Auto,
            model_override: None,
            temperature: DEFAULT_TEMPERATURE,
            max_agent_rounds: DEFAULT_MAX_AGENT_ROUNDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Another run held the gate.
    Rejected,
    Completed { value: Option<String> },
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub buffer: String,
    pub status: RunStatus,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.status, RunStatus::Completed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistStatus {
    Answered,
    /// No provider has credentials; the text explains how to enable one.
    Unavailable,
    Failed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistOutcome {
    pub status: AssistStatus,
    pub text: String,
    /// Model text before cleanup; empty unless answered.
    pub reply: String,
}

impl AssistOutcome {
    fn rejected() -> Self {
        Self {
            status: AssistStatus::Rejected,
            text: "The assistant is still working on a previous request.".to_string(),
            reply: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateStatus {
    /// Empty prompt; nothing was sent.
    Skipped,
    Injected,
    Unavailable,
    Failed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateOutcome {
    pub status: GenerateStatus,
    /// Injected code on success, otherwise the reason.
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    Installed,
    AlreadyInstalled,
}

/// Turns a model error into the user-facing outcome.
pub(crate) fn model_failure(err: anyhow::Error) -> AssistOutcome {
    if let Some(unavailable) = err.downcast_ref::<ModelUnavailable>() {
        tracing::warn!(reason = %unavailable.message, "AI features disabled");
        return AssistOutcome {
            status: AssistStatus::Unavailable,
            text: format!("Parado Error: {}", unavailable.message),
            reply: String::new(),
        };
    }
    tracing::error!(error = %format!("{err:#}"), "model request failed");
    AssistOutcome {
        status: AssistStatus::Failed,
        text: format!("Parado AI Error: {err:#}"),
        reply: String::new(),
    }
}

struct LogSink<'a> {
    log: &'a mut ConsoleLog,
    captured: CapturedOutput,
}

impl OutputSink for LogSink<'_> {
    fn write(&mut self, stream: Stream, text: &str) {
        match stream {
            Stream::Stdout => self.log.stdout(text),
            Stream::Stderr => self.log.stderr(text),
        }
        self.captured.write(stream, text);
    }
}

/// One workspace: files, log, installed packages and the agent conversation.
pub struct Session {
    pub(crate) buffers: BufferStore,
    pub(crate) log: ConsoleLog,
    pub(crate) transcript: Transcript,
    pub(crate) conversation: Vec<ChatMessage>,
    pub(crate) packages: BTreeSet<String>,
    pub(crate) interpreter: Box<dyn Interpreter>,
    pub(crate) model: Box<dyn ModelService>,
    pub(crate) package_source: Box<dyn PackageSource>,
    pub(crate) options: SessionOptions,
    pub(crate) run_gate: ExecutionGate,
    pub(crate) ai_gate: ExecutionGate,
}

impl Session {
    pub fn new(
        buffers: BufferStore,
        interpreter: Box<dyn Interpreter>,
        model: Box<dyn ModelService>,
        package_source: Box<dyn PackageSource>,
        options: SessionOptions,
    ) -> Self {
        Self {
            buffers,
            log: ConsoleLog::default(),
            transcript: Transcript::default(),
            conversation: Vec::new(),
            packages: BTreeSet::new(),
            interpreter,
            model,
            package_source,
            options,
            run_gate: ExecutionGate::default(),
            ai_gate: ExecutionGate::default(),
        }
    }

    /// Records packages the interpreter already loaded at boot.
    pub fn with_installed<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn buffers(&self) -> &BufferStore {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut BufferStore {
        &mut self.buffers
    }

    pub fn log(&self) -> &ConsoleLog {
        &self.log
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.iter().map(String::as_str)
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn run_gate(&self) -> &ExecutionGate {
        &self.run_gate
    }

    pub fn ai_gate(&self) -> &ExecutionGate {
        &self.ai_gate
    }

    pub fn run_active(&mut self) -> RunReport {
        let id = self.buffers.active_id();
        match self.run_buffer(id) {
            Ok(report) => report,
            Err(err) => RunReport {
                buffer: self.buffers.active().name.clone(),
                status: RunStatus::Failed {
                    message: err.to_string(),
                },
                stdout: Vec::new(),
                stderr: Vec::new(),
            },
        }
    }

    pub fn run_buffer(&mut self, id: BufferId) -> Result<RunReport, BufferError> {
        let buffer = self.buffers.get(id).ok_or(BufferError::UnknownId(id))?;
        let name = buffer.name.clone();
        let source = buffer.content.clone();

        let Some(_permit) = self.run_gate.try_acquire() else {
            tracing::debug!(buffer = %name, "run rejected, previous run still in flight");
            return Ok(RunReport {
                buffer: name,
                status: RunStatus::Rejected,
                stdout: Vec::new(),
                stderr: Vec::new(),
            });
        };

        self.log.system(format!("Execution started: {name}"));
        let mut sink = LogSink {
            log: &mut self.log,
            captured: CapturedOutput::default(),
        };
        let result = self.interpreter.run(&source, &name, &mut sink);
        let captured = sink.captured;

        let status = match result {
            Ok(eval) => {
                self.log.system("Process finished successfully.");
                RunStatus::Completed { value: eval.value }
            }
            Err(err) => {
                let message = format!("{err:#}");
                self.log.stderr(message.clone());
                RunStatus::Failed { message }
            }
        };

        let collect = |stream| {
            captured
                .stream(stream)
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        };
        Ok(RunReport {
            buffer: name,
            stdout: collect(Stream::Stdout),
            stderr: collect(Stream::Stderr),
            status,
        })
    }

    /// Sends the active buffer and `prompt` to the model in the given mode.
    pub fn assist(&mut self, mode: AssistMode, prompt: &str) -> AssistOutcome {
        let Some(_permit) = self.ai_gate.try_acquire() else {
            return AssistOutcome::rejected();
        };
        self.request_assist(mode, prompt)
    }

    fn request_assist(&self, mode: AssistMode, prompt: &str) -> AssistOutcome {
        let code = &self.buffers.active().content;
        let req = assist_request(mode, code, prompt, self.options.temperature);
        tracing::info!(mode = %mode, "sending assist request");
        match self.model.complete(
            self.options.provider_selection,
            &req,
            self.options.model_override.as_deref(),
        ) {
            Ok(routed) => {
                tracing::debug!(
                    provider = %routed.provider,
                    model = %routed.model,
                    "assist reply received"
                );
                let text = clean_output(&routed.reply.text);
                AssistOutcome {
                    status: AssistStatus::Answered,
                    text: if text.trim().is_empty() {
                        EMPTY_REPLY.to_string()
                    } else {
                        text
                    },
                    reply: routed.reply.text,
                }
            }
            Err(err) => model_failure(err),
        }
    }

    /// Asks for code in `generate` mode and appends it to the active buffer.
    pub fn generate(&mut self, prompt: &str) -> GenerateOutcome {
        if prompt.trim().is_empty() {
            return GenerateOutcome {
                status: GenerateStatus::Skipped,
                text: String::new(),
            };
        }
        let Some(_permit) = self.ai_gate.try_acquire() else {
            return GenerateOutcome {
                status: GenerateStatus::Rejected,
                text: AssistOutcome::rejected().text,
            };
        };

        let outcome = self.request_assist(AssistMode::Generate, prompt);
        let status = match outcome.status {
            AssistStatus::Answered => {
                return match self.inject(&outcome.reply) {
                    Ok(code) => GenerateOutcome {
                        status: GenerateStatus::Injected,
                        text: code,
                    },
                    Err(err) => {
                        let text = format!("Generation failed: {err:#}");
                        self.log.stderr(text.clone());
                        GenerateOutcome {
                            status: GenerateStatus::Failed,
                            text,
                        }
                    }
                };
            }
            AssistStatus::Unavailable => GenerateStatus::Unavailable,
            AssistStatus::Failed | AssistStatus::Rejected => GenerateStatus::Failed,
        };
        let text = format!("Generation failed: {}", outcome.text);
        self.log.stderr(text.clone());
        GenerateOutcome { status, text }
    }

    /// Appends the code block found in `reply` (or all of it) to the active buffer.
    pub fn inject(&mut self, reply: &str) -> Result<String> {
        let code = normalize_code_output(reply, LANGUAGE_TAGS)?;
        self.buffers
            .append_active(&format!("\n\n{GENERATED_MARKER}\n{code}"));
        let name = self.buffers.active().name.clone();
        self.log
            .system(format!("Generated code injected into {name}."));
        Ok(code)
    }

    pub fn install_package(&mut self, name: &str) -> Result<InstallStatus> {
        validate_package_name(name)?;
        if self.packages.contains(name) {
            self.log.system(format!("Package {name} is already installed."));
            return Ok(InstallStatus::AlreadyInstalled);
        }

        self.log.system(format!("Installing package {name}..."));
        let installed = self
            .package_source
            .fetch(name)
            .and_then(|source| self.interpreter.install_package(name, &source));
        match installed {
            Ok(()) => {
                self.packages.insert(name.to_string());
                self.log.system(format!("Package {name} installed."));
                Ok(InstallStatus::Installed)
            }
            Err(err) => {
                self.log
                    .stderr(format!("Failed to install {name}: {err:#}"));
                Err(err)
            }
        }
    }

    pub fn create_file(&mut self, name: &str, content: &str) -> Result<BufferId, BufferError> {
        self.buffers.create(name, content)
    }

    pub fn delete_file(&mut self, name: &str) -> Result<(), BufferError> {
        let id = self.buffers.id_by_name(name)?;
        self.buffers.delete(id)?;
        Ok(())
    }

    pub fn select_file(&mut self, name: &str) -> Result<(), BufferError> {
        let id = self.buffers.id_by_name(name)?;
        self.buffers.select(id)
    }

    /// Runs a buffer by name, or the active one.
    pub fn run_named(&mut self, name: Option<&str>) -> Result<RunReport> {
        let id = match name {
            Some(name) => self.buffers.id_by_name(name)?,
            None => self.buffers.active_id(),
        };
        Ok(self.run_buffer(id)?)
    }
}
