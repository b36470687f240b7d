//! tmux-vcs-sync - one tmux session per VCS work unit
//!
//! Binary name: `tmux-vcs-sync`

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

use std::process;

mod cli;
mod commands;

use cli::handlers::{format_error, run_cli, Outcome};

#[tokio::main]
async fn main() {
    let matches = match cli::build_cli().try_get_matches() {
        Ok(m) => m,
        Err(e) => {
            // Clap reports --help and --version as errors too.
            use clap::error::ErrorKind;
            let should_exit_zero =
                matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            let _ = e.print();
            #[allow(clippy::exit)]
            process::exit(if should_exit_zero { 0 } else { 2 });
        }
    };

    cli::init_logging(matches.get_count("verbose"));

    match run_cli(&matches).await {
        Ok(Outcome::Done) => {}
        Ok(Outcome::Noop) => {
            #[allow(clippy::exit)]
            process::exit(1);
        }
        Err(err) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Error: {}", format_error(&err));
            }

            let code = err
                .downcast_ref::<tmux_vcs_sync_core::Error>()
                .map_or(1, tmux_vcs_sync_core::Error::exit_code);

            #[allow(clippy::exit)]
            process::exit(code);
        }
    }
}
