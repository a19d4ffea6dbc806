use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::{Cli, CompletionShell};
use crate::error::CliError;

const BIN_NAME: &str = "rescue";

impl From<CompletionShell> for Shell {
    fn from(value: CompletionShell) -> Self {
        match value {
            CompletionShell::Bash => Self::Bash,
            CompletionShell::Zsh => Self::Zsh,
            CompletionShell::Fish => Self::Fish,
        }
    }
}

/// Write the completion script to `output_path`, or stdout when absent.
pub fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let shell = Shell::from(shell);

    match output_path {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            clap_complete::generate(shell, &mut command, BIN_NAME, &mut writer);
            writer.flush()?;
            println!("Wrote {shell} completions to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout().lock();
            clap_complete::generate(shell, &mut command, BIN_NAME, &mut stdout);
            stdout.flush()?;
        }
    }

    Ok(())
}
