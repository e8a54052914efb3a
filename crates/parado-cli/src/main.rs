mod dispatch;
mod project;
mod report;
mod runtime_context;
mod shell;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use parado_config::{CliOverrides, ProviderSetting, SessionDefaults};
use parado_core::{AgentStatus, AssistStatus, GenerateStatus};
use parado_engine::{CapturedOutput, Interpreter, Stream};
use parado_llm::AssistMode;
use project::{Project, select_entry};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const PARADO_CRATES: &[&str] = &[
    "parado",
    "parado_config",
    "parado_core",
    "parado_engine",
    "parado_llm",
    "parado_llm_gemini",
    "parado_llm_openai",
];

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Auto,
    Gemini,
    Openai,
}

impl ProviderArg {
    fn as_setting(self) -> ProviderSetting {
        match self {
            ProviderArg::Auto => ProviderSetting::Auto,
            ProviderArg::Gemini => ProviderSetting::Gemini,
            ProviderArg::Openai => ProviderSetting::Openai,
        }
    }
}

#[derive(Debug, Clone, Default, Args)]
struct SessionArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    provider: Option<ProviderArg>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    verbose: bool,
}

impl SessionArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            provider: self.provider.map(ProviderArg::as_setting),
            model: self.model.clone(),
            verbose: self.verbose.then_some(true),
            ..CliOverrides::default()
        }
    }

    fn resolve(&self) -> Result<SessionDefaults> {
        runtime_context::resolve_config(self.config.clone(), &self.overrides())
    }
}

fn parse_mode(raw: &str) -> Result<AssistMode, String> {
    raw.parse()
}

#[derive(Debug, Parser)]
#[command(name = "parado", version, about = "Parado scripting workspace with an AI assistant")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a script, or the entry file of a directory of scripts.
    Run {
        path: PathBuf,
        #[arg(long)]
        entry: Option<String>,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Evaluate inline JavaScript.
    Eval { code: String },
    /// Ask the assistant about a file.
    Ask {
        #[arg(value_parser = parse_mode)]
        mode: AssistMode,
        file: PathBuf,
        #[arg(long, default_value = "")]
        prompt: String,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Generate code and append it to a file.
    Generate {
        file: PathBuf,
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        dry_run: bool,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Let the agent work on a project directory.
    Agent {
        dir: PathBuf,
        instruction: String,
        #[arg(long)]
        dry_run: bool,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Start an interactive session.
    Shell {
        dir: Option<PathBuf>,
        #[command(flatten)]
        session: SessionArgs,
    },
}

impl Cli {
    fn verbose(&self) -> bool {
        match &self.command {
            Some(Commands::Run { session, .. })
            | Some(Commands::Ask { session, .. })
            | Some(Commands::Generate { session, .. })
            | Some(Commands::Agent { session, .. })
            | Some(Commands::Shell { session, .. }) => session.verbose,
            Some(Commands::Eval { .. }) | None => false,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_directive = if verbose {
        PARADO_CRATES
            .iter()
            .fold("warn".to_string(), |acc, name| format!("{acc},{name}=debug"))
    } else {
        "warn".to_string()
    };
    let filter =
        EnvFilter::try_from_env("PARADO_LOG").unwrap_or_else(|_| EnvFilter::new(default_directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_command(path: PathBuf, entry: Option<String>, session_args: SessionArgs) -> Result<()> {
    let resolved = session_args.resolve()?;
    let (_, mut buffers) = Project::load(&path, false)?;
    select_entry(&mut buffers, entry.as_deref())?;

    let mut session = runtime_context::build_session(&resolved, buffers)?;
    if resolved.verbose {
        eprintln!("[parado] running {}", session.buffers().active().name);
    }
    let report = session.run_active();
    report::print_run_report(&report);
    if report.succeeded() {
        Ok(())
    } else {
        Err(anyhow!("failed running {}", path.display()))
    }
}

fn eval_command(code: String) -> Result<()> {
    let resolved = SessionArgs::default().resolve()?;
    let packages = runtime_context::build_package_source(&resolved);
    let mut engine = runtime_context::build_interpreter(&resolved, packages.as_ref())?;
    let mut out = CapturedOutput::default();
    let result = engine.run(&code, "<eval>", &mut out);
    for (stream, text) in &out.lines {
        match stream {
            Stream::Stdout => println!("{text}"),
            Stream::Stderr => eprintln!("{text}"),
        }
    }
    if let Some(value) = result?.value {
        println!("{value}");
    }
    Ok(())
}

fn ask_command(
    mode: AssistMode,
    file: &Path,
    prompt: &str,
    session_args: SessionArgs,
) -> Result<()> {
    let resolved = session_args.resolve()?;
    let (_, buffers) = Project::load(file, false)?;
    let mut session = runtime_context::build_session(&resolved, buffers)?;

    let outcome = session.assist(mode, prompt);
    match outcome.status {
        AssistStatus::Answered | AssistStatus::Unavailable => {
            println!("{}", outcome.text);
            Ok(())
        }
        AssistStatus::Failed | AssistStatus::Rejected => Err(anyhow!(outcome.text)),
    }
}

fn generate_command(
    file: &Path,
    prompt: &str,
    dry_run: bool,
    session_args: SessionArgs,
) -> Result<()> {
    let resolved = session_args.resolve()?;
    let (mut project, buffers) = Project::load(file, false)?;
    let mut session = runtime_context::build_session(&resolved, buffers)?;

    let outcome = session.generate(prompt);
    match outcome.status {
        GenerateStatus::Injected => {
            if dry_run {
                println!("{}", outcome.text);
                return Ok(());
            }
            let plan = project
                .save(session.buffers())
                .with_context(|| format!("failed saving {}", file.display()))?;
            report::print_sync_plan(&plan, project.root(), false);
            Ok(())
        }
        GenerateStatus::Skipped => {
            eprintln!("[parado] empty prompt, nothing generated");
            Ok(())
        }
        GenerateStatus::Unavailable => {
            println!("{}", outcome.text);
            Ok(())
        }
        GenerateStatus::Failed | GenerateStatus::Rejected => Err(anyhow!(outcome.text)),
    }
}

fn agent_command(
    dir: &Path,
    instruction: &str,
    dry_run: bool,
    session_args: SessionArgs,
) -> Result<()> {
    let resolved = session_args.resolve()?;
    let (mut project, buffers) = Project::load(dir, true)?;
    let mut session = runtime_context::build_session(&resolved, buffers)?;

    let outcome = session.agent(instruction);
    report::print_agent_outcome(&outcome);

    let plan = project.plan(session.buffers());
    if !dry_run {
        project.apply(&plan)?;
    }
    report::print_sync_plan(&plan, project.root(), dry_run);

    match outcome.status {
        AgentStatus::ModelFailed => Err(anyhow!("agent request failed")),
        _ => Ok(()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose());
    dispatch::execute(cli)
}
