//! Shell completion generation command
//!
//! Generates shell completion scripts for bash, zsh, and fish shells.

use std::{io, str::FromStr};

use anyhow::{Context, Result};
use clap_complete::{generate, Shell};

/// Supported shell types for completion generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

impl FromStr for CompletionShell {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "bash" => Ok(Self::Bash),
            "zsh" => Ok(Self::Zsh),
            "fish" => Ok(Self::Fish),
            _ => anyhow::bail!("Unsupported shell: {s}\nSupported shells: bash, zsh, fish"),
        }
    }
}

impl CompletionShell {
    const fn to_clap_shell(self) -> Shell {
        match self {
            Self::Bash => Shell::Bash,
            Self::Zsh => Shell::Zsh,
            Self::Fish => Shell::Fish,
        }
    }
}

/// Write the completion script for `shell` to `out`.
pub fn generate_completions(shell: CompletionShell, out: &mut dyn io::Write) {
    let mut cmd = crate::cli::build_cli();
    generate(shell.to_clap_shell(), &mut cmd, env!("CARGO_PKG_NAME"), out);
}

/// Print the completion script for `shell_name` to stdout.
pub fn run(shell_name: &str) -> Result<()> {
    let shell = shell_name
        .parse::<CompletionShell>()
        .context("Failed to parse shell type")?;
    generate_completions(shell, &mut io::stdout());
    Ok(())
}
