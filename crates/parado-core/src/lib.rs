mod actions;
mod agent;
mod buffers;
mod console;
mod gate;
mod session;
mod transcript;

pub use actions::{
    ACTION_NAMES, Action, ActionError, CREATE_FILE, DELETE_FILE, INSTALL_PACKAGE, RUN_CODE,
    UPDATE_FILE, declarations, result_payload,
};
pub use agent::{ActionRecord, AgentOutcome, AgentStatus};
pub use buffers::{Buffer, BufferError, BufferId, BufferStore, WELCOME_FILE, WELCOME_PROGRAM};
pub use console::{Channel, ConsoleLog, LogEntry};
pub use gate::{ExecutionGate, GatePermit};
pub use session::{
    AssistOutcome, AssistStatus, DEFAULT_MAX_AGENT_ROUNDS, GENERATED_MARKER, GenerateOutcome,
    GenerateStatus, InstallStatus, LANGUAGE_TAGS, RunReport, RunStatus, Session, SessionOptions,
};
pub use transcript::{Speaker, Transcript, Turn};
