use crate::actions::{self, Action, ActionError, result_payload};
use crate::session::{AssistStatus, InstallStatus, RunStatus, Session, model_failure};
use parado_llm::{ChatMessage, IDENTITY_PROMPT, ModelRequest, ToolCall, ToolResult, clean_output};
use serde_json::{Value, json};
use std::fmt::Write as _;

const AGENT_TASK: &str = "TASK: You are working autonomously on the user's project. \
Use the provided tools to create, update or delete files, install packages and run code. \
Update a file by sending its complete new content. \
When the work is done, reply with a short plain-text summary and no tool calls.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    /// The model answered without requesting further actions.
    Completed,
    /// Empty instruction; nothing was sent.
    Skipped,
    Rejected,
    Unavailable,
    ModelFailed,
    /// The round limit was reached while the model still requested actions.
    RoundLimit,
}

#[derive(Debug, Clone)]
pub struct ActionRecord {
    pub call_id: String,
    pub action: String,
    pub result: Value,
    pub succeeded: bool,
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub status: AgentStatus,
    pub answer: String,
    /// Final model text before cleanup.
    pub reply: String,
    pub actions: Vec<ActionRecord>,
    /// Result batches sent back to the model.
    pub round_trips: usize,
}

impl AgentOutcome {
    fn early(status: AgentStatus, answer: impl Into<String>) -> Self {
        Self {
            status,
            answer: answer.into(),
            reply: String::new(),
            actions: Vec::new(),
            round_trips: 0,
        }
    }
}

impl Session {
    /// Project snapshot the agent sees at the start of every round.
    pub fn agent_instruction(&self) -> String {
        let mut out = format!("{IDENTITY_PROMPT} {AGENT_TASK} NO ASTERISKS.\n\nPROJECT FILES:\n");
        let active = self.buffers.active_id();
        for buffer in self.buffers.iter() {
            let marker = if buffer.id == active { " (active)" } else { "" };
            let _ = writeln!(out, "--- {}{marker} ---\n{}", buffer.name, buffer.content);
        }
        let packages: Vec<&str> = self.packages().collect();
        let _ = write!(
            out,
            "\nINSTALLED PACKAGES: {}",
            if packages.is_empty() {
                "none".to_string()
            } else {
                packages.join(", ")
            }
        );
        out
    }

    /// Sends `instruction` to the model and executes requested actions until
    /// it answers in plain text or the round limit is hit.
    pub fn agent(&mut self, instruction: &str) -> AgentOutcome {
        if instruction.trim().is_empty() {
            return AgentOutcome::early(AgentStatus::Skipped, "");
        }
        let Some(_permit) = self.ai_gate.try_acquire() else {
            return AgentOutcome::early(
                AgentStatus::Rejected,
                "The assistant is still working on a previous request.",
            );
        };

        let checkpoint = self.conversation.len();
        self.transcript.push_user(instruction);
        self.conversation.push(ChatMessage::user(instruction));

        let tools = actions::declarations();
        let mut records = Vec::new();
        let mut round_trips = 0;

        loop {
            let req = ModelRequest {
                system_instruction: self.agent_instruction(),
                messages: self.conversation.clone(),
                temperature: self.options.temperature,
                tools: tools.clone(),
            };
            tracing::debug!(round = round_trips, messages = req.messages.len(), "agent round");

            let reply = match self.model.complete(
                self.options.provider_selection,
                &req,
                self.options.model_override.as_deref(),
            ) {
                Ok(routed) => routed.reply,
                Err(err) => {
                    let failure = model_failure(err);
                    // Keep the conversation replayable: drop this request's turns.
                    self.conversation.truncate(checkpoint);
                    self.transcript.push_assistant(failure.text.clone(), Vec::new());
                    let status = match failure.status {
                        AssistStatus::Unavailable => AgentStatus::Unavailable,
                        _ => AgentStatus::ModelFailed,
                    };
                    return AgentOutcome {
                        status,
                        answer: failure.text,
                        reply: String::new(),
                        actions: records,
                        round_trips,
                    };
                }
            };

            let text = clean_output(&reply.text);
            if !reply.requests_actions() {
                let answer = if text.trim().is_empty() {
                    "Done.".to_string()
                } else {
                    text
                };
                self.conversation.push(ChatMessage::Assistant {
                    text: answer.clone(),
                    tool_calls: Vec::new(),
                    signature: reply.signature.clone(),
                });
                self.transcript.push_assistant(answer.clone(), Vec::new());
                return AgentOutcome {
                    status: AgentStatus::Completed,
                    answer,
                    reply: reply.text.clone(),
                    actions: records,
                    round_trips,
                };
            }

            // At least one batch of actions always runs.
            if round_trips >= self.options.max_agent_rounds.max(1) {
                let answer = format!(
                    "Stopped after {round_trips} action rounds without a final answer."
                );
                tracing::warn!(round_trips, "agent round limit reached");
                self.conversation
                    .push(ChatMessage::assistant(answer.clone(), Vec::new()));
                self.transcript.push_assistant(answer.clone(), Vec::new());
                return AgentOutcome {
                    status: AgentStatus::RoundLimit,
                    answer,
                    reply: String::new(),
                    actions: records,
                    round_trips,
                };
            }

            let requested = reply.tool_calls.iter().map(|c| c.name.clone()).collect();
            self.transcript.push_assistant(text, requested);
            self.conversation.push(ChatMessage::from_reply(&reply));

            let mut results = Vec::with_capacity(reply.tool_calls.len());
            for call in &reply.tool_calls {
                let outcome = self.dispatch(call);
                let payload = result_payload(&outcome);
                records.push(ActionRecord {
                    call_id: call.id.clone(),
                    action: call.name.clone(),
                    result: payload.clone(),
                    succeeded: outcome.is_ok(),
                });
                results.push(ToolResult {
                    call_id: call.id.clone(),
                    name: call.name.clone(),
                    payload,
                });
            }
            self.conversation.push(ChatMessage::ToolResults { results });
            round_trips += 1;
        }
    }

    fn dispatch(&mut self, call: &ToolCall) -> Result<Value, ActionError> {
        let outcome = Action::from_call(call).and_then(|action| self.apply(action));
        if let Err(err) = &outcome {
            self.log
                .stderr(format!("Agent action {} failed: {err}", call.name));
        }
        outcome
    }

    fn apply(&mut self, action: Action) -> Result<Value, ActionError> {
        tracing::info!(action = action.name(), "executing agent action");
        match action {
            Action::CreateFile { name, content } => {
                self.buffers.create(&name, &content)?;
                self.log.system(format!("Agent created {name}"));
                Ok(json!({ "created": name }))
            }
            Action::UpdateFile { name, content } => {
                let id = self.buffers.id_by_name(&name)?;
                self.buffers.update(id, &content)?;
                self.log.system(format!("Agent updated {name}"));
                Ok(json!({ "updated": name, "bytes": content.len() }))
            }
            Action::DeleteFile { name } => {
                self.delete_file(&name)?;
                self.log.system(format!("Agent deleted {name}"));
                Ok(json!({ "deleted": name }))
            }
            Action::InstallPackage { name } => match self.install_package(&name) {
                Ok(InstallStatus::Installed) => Ok(json!({ "installed": name })),
                Ok(InstallStatus::AlreadyInstalled) => {
                    Ok(json!({ "installed": name, "already_installed": true }))
                }
                Err(err) => Err(ActionError::Failed(format!("{err:#}"))),
            },
            Action::RunCode { name } => {
                let id = match name {
                    Some(name) => self.buffers.id_by_name(&name)?,
                    None => self.buffers.active_id(),
                };
                let report = self.run_buffer(id)?;
                match report.status {
                    RunStatus::Completed { value } => Ok(json!({
                        "file": report.buffer,
                        "value": value,
                        "stdout": report.stdout,
                        "stderr": report.stderr,
                    })),
                    RunStatus::Failed { message } => Err(ActionError::Failed(format!(
                        "{message}\nstdout:\n{}",
                        report.stdout.join("\n")
                    ))),
                    RunStatus::Rejected => Err(ActionError::Failed(
                        "another run is still in progress".to_string(),
                    )),
                }
            }
        }
    }
}
