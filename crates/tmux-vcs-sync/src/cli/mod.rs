//! CLI utilities and helpers

pub mod commands;
pub mod handlers;

pub use commands::build_cli;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Log to stderr. Each `-v` lowers the threshold one step from `warn`;
/// `RUST_LOG` overrides it.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
