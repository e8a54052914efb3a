use crate::project::Project;
use crate::report;
use crate::runtime_context;
use anyhow::{Context, Result};
use parado_config::SessionDefaults;
use parado_core::{AgentStatus, AssistStatus, GenerateStatus, InstallStatus, Session};
use parado_engine::EngineError;
use parado_llm::AssistMode;
use std::io::{self, BufRead, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ShellCommand {
    Empty,
    Help,
    Files,
    Open(String),
    New(Option<String>),
    Remove(String),
    Show,
    Run,
    Log,
    Clear,
    Ask(AssistMode, String),
    Generate(String),
    Inject,
    Install(String),
    Packages,
    Save,
    Exit,
    Agent(String),
    Invalid(String),
}

fn required(arg: &str, usage: &str, build: impl FnOnce(String) -> ShellCommand) -> ShellCommand {
    if arg.is_empty() {
        ShellCommand::Invalid(format!("usage: {usage}"))
    } else {
        build(arg.to_string())
    }
}

pub(crate) fn parse_command(line: &str) -> ShellCommand {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ShellCommand::Empty;
    }
    if !trimmed.starts_with('.') {
        return ShellCommand::Agent(trimmed.to_string());
    }

    let (command, rest) = trimmed
        .split_once(char::is_whitespace)
        .map(|(c, r)| (c, r.trim()))
        .unwrap_or((trimmed, ""));
    match command {
        ".help" => ShellCommand::Help,
        ".files" => ShellCommand::Files,
        ".open" => required(rest, ".open <file>", ShellCommand::Open),
        ".new" => ShellCommand::New((!rest.is_empty()).then(|| rest.to_string())),
        ".rm" => required(rest, ".rm <file>", ShellCommand::Remove),
        ".show" => ShellCommand::Show,
        ".run" => ShellCommand::Run,
        ".log" => ShellCommand::Log,
        ".clear" => ShellCommand::Clear,
        ".ask" => {
            let (mode, prompt) = rest
                .split_once(char::is_whitespace)
                .map(|(m, p)| (m, p.trim()))
                .unwrap_or((rest, ""));
            match mode.parse::<AssistMode>() {
                Ok(mode) => ShellCommand::Ask(mode, prompt.to_string()),
                Err(err) => ShellCommand::Invalid(err),
            }
        }
        ".gen" => required(rest, ".gen <prompt>", ShellCommand::Generate),
        ".inject" => ShellCommand::Inject,
        ".install" => required(rest, ".install <package>", ShellCommand::Install),
        ".packages" => ShellCommand::Packages,
        ".save" => ShellCommand::Save,
        ".exit" | ".quit" => ShellCommand::Exit,
        other => ShellCommand::Invalid(format!("unknown command {other}. Type .help")),
    }
}

fn print_help() {
    println!("Shell commands:");
    println!("  .help                 show this help");
    println!("  .files                list files (* marks the active one)");
    println!("  .open <file>          make a file active");
    println!("  .new [file]           create a file");
    println!("  .rm <file>            delete a file");
    println!("  .show                 print the active file");
    println!("  .run                  run the active file");
    println!("  .log                  print the console log");
    println!("  .clear                clear the console log");
    println!("  .ask <mode> [prompt]  debug | optimize | explain | generate");
    println!("  .gen <prompt>         generate code into the active file");
    println!("  .inject               append code from the last answer");
    println!("  .install <package>    install a package for require()");
    println!("  .packages             list installed packages");
    println!("  .save                 write files back to disk");
    println!("  .exit                 quit");
    println!("Any other line is sent to the agent.");
}

fn prompt_yes(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    io::stdout().flush().context("failed flushing stdout")?;
    let mut answer = String::new();
    io::stdin()
        .read_line(&mut answer)
        .context("failed reading answer")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Boots the interpreter, offering a manual retry when the runtime is unavailable.
fn boot_session(resolved: &SessionDefaults, project_path: &Path) -> Result<(Project, Session)> {
    let (project, buffers) = Project::load(project_path, true)?;
    loop {
        let packages = runtime_context::build_package_source(resolved);
        match runtime_context::build_interpreter(resolved, packages.as_ref()) {
            Ok(interpreter) => {
                let session =
                    runtime_context::assemble_session(resolved, buffers, interpreter, packages);
                return Ok((project, session));
            }
            Err(err) => {
                let unavailable = matches!(
                    err.downcast_ref::<EngineError>(),
                    Some(EngineError::RuntimeUnavailable { .. })
                );
                eprintln!("[parado] error: {err:#}");
                if !unavailable || !prompt_yes("Retry starting the runtime?")? {
                    return Err(err);
                }
            }
        }
    }
}

struct ShellState {
    project: Project,
    session: Session,
    printed: usize,
    last_answer: Option<String>,
}

impl ShellState {
    fn flush_log(&mut self) {
        for entry in self.session.log().since(self.printed) {
            println!("{}", entry.render());
        }
        self.printed = self.session.log().len();
    }

    fn handle(&mut self, command: ShellCommand) -> Result<bool> {
        match command {
            ShellCommand::Empty => {}
            ShellCommand::Help => print_help(),
            ShellCommand::Files => {
                let active = self.session.buffers().active_id();
                for buffer in self.session.buffers().iter() {
                    let marker = if buffer.id == active { "*" } else { " " };
                    println!("{marker} {}", buffer.name);
                }
            }
            ShellCommand::Open(name) => {
                self.session.select_file(&name)?;
                println!("[parado] active file: {name}");
            }
            ShellCommand::New(name) => {
                let id = match name {
                    Some(name) => self.session.create_file(&name, "")?,
                    None => self.session.buffers_mut().create_untitled(),
                };
                if let Some(buffer) = self.session.buffers().get(id) {
                    println!("[parado] created {}", buffer.name);
                }
            }
            ShellCommand::Remove(name) => {
                self.session.delete_file(&name)?;
                println!("[parado] deleted {name}");
            }
            ShellCommand::Show => {
                let active = self.session.buffers().active();
                println!("--- {} ---", active.name);
                println!("{}", active.content);
            }
            ShellCommand::Run => {
                let report = self.session.run_active();
                if let parado_core::RunStatus::Completed { value: Some(value) } = &report.status {
                    self.flush_log();
                    println!("{value}");
                }
            }
            ShellCommand::Log => {
                for entry in self.session.log().entries() {
                    println!("{}", entry.render());
                }
                self.printed = self.session.log().len();
            }
            ShellCommand::Clear => {
                self.session.clear_log();
                self.printed = 0;
                println!("[parado] log cleared");
            }
            ShellCommand::Ask(mode, prompt) => {
                let outcome = self.session.assist(mode, &prompt);
                println!("{}", outcome.text);
                if outcome.status == AssistStatus::Answered {
                    self.last_answer = Some(outcome.reply);
                }
            }
            ShellCommand::Generate(prompt) => {
                let outcome = self.session.generate(&prompt);
                match outcome.status {
                    GenerateStatus::Injected => println!("{}", outcome.text),
                    GenerateStatus::Skipped => {}
                    _ => eprintln!("{}", outcome.text),
                }
            }
            ShellCommand::Inject => match self.last_answer.clone() {
                Some(answer) => {
                    self.session.inject(&answer)?;
                }
                None => eprintln!("[parado] no assistant answer to inject yet"),
            },
            ShellCommand::Install(name) => {
                if self.session.install_package(&name)? == InstallStatus::AlreadyInstalled {
                    println!("[parado] {name} is already installed");
                }
            }
            ShellCommand::Packages => {
                let packages: Vec<&str> = self.session.packages().collect();
                if packages.is_empty() {
                    println!("(no packages installed)");
                } else {
                    println!("{}", packages.join("\n"));
                }
            }
            ShellCommand::Save => {
                let plan = self.project.save(self.session.buffers())?;
                report::print_sync_plan(&plan, self.project.root(), false);
            }
            ShellCommand::Exit => return Ok(false),
            ShellCommand::Agent(instruction) => {
                let outcome = self.session.agent(&instruction);
                self.flush_log();
                report::print_agent_outcome(&outcome);
                if outcome.status == AgentStatus::Completed {
                    self.last_answer = Some(outcome.reply);
                }
            }
            ShellCommand::Invalid(message) => eprintln!("error: {message}"),
        }
        Ok(true)
    }
}

pub(crate) fn shell_command(resolved: &SessionDefaults, dir: &Path) -> Result<()> {
    let (project, session) = boot_session(resolved, dir)?;
    let mut state = ShellState {
        project,
        session,
        printed: 0,
        last_answer: None,
    };

    println!(
        "Parado shell in {}. Type .help for commands, .exit to quit.",
        state.project.root().display()
    );
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        line.clear();
        print!("parado:{}> ", state.session.buffers().active().name);
        io::stdout().flush().context("failed flushing stdout")?;

        let bytes = stdin
            .lock()
            .read_line(&mut line)
            .context("failed reading shell input")?;
        if bytes == 0 {
            break;
        }

        let keep_going = match state.handle(parse_command(&line)) {
            Ok(keep_going) => keep_going,
            Err(err) => {
                eprintln!("error: {err:#}");
                true
            }
        };
        state.flush_log();
        if !keep_going {
            break;
        }
    }

    let pending = state.project.plan(state.session.buffers());
    if !pending.is_empty() {
        eprintln!("[parado] unsaved changes were not written (use .save)");
    }
    Ok(())
}
