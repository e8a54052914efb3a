use super::{Cli, Commands, SessionArgs, agent_command, ask_command, eval_command};
use super::{generate_command, run_command, shell};
use anyhow::Result;
use std::path::PathBuf;

pub(crate) fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Run {
            path,
            entry,
            session,
        }) => run_command(path, entry, session),
        Some(Commands::Eval { code }) => eval_command(code),
        Some(Commands::Ask {
            mode,
            file,
            prompt,
            session,
        }) => ask_command(mode, &file, &prompt, session),
        Some(Commands::Generate {
            file,
            prompt,
            dry_run,
            session,
        }) => generate_command(&file, &prompt, dry_run, session),
        Some(Commands::Agent {
            dir,
            instruction,
            dry_run,
            session,
        }) => agent_command(&dir, &instruction, dry_run, session),
        Some(Commands::Shell { dir, session }) => {
            let resolved = session.resolve()?;
            shell::shell_command(&resolved, &dir.unwrap_or_else(|| PathBuf::from(".")))
        }
        None => {
            let resolved = SessionArgs::default().resolve()?;
            shell::shell_command(&resolved, &PathBuf::from("."))
        }
    }
}
