//! CLI command handlers that bridge between `clap` and internal logic

use anyhow::{Context as _, Result};
use clap::ArgMatches;
use tmux_vcs_sync_core::config::load_config;

use crate::commands::{
    cleanup, completions, display_menu,
    new::{self, Base},
    rename, suggest, update, Context,
};

/// How a successful command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Nothing needed to change and the caller asked to hear about it.
    Noop,
}

/// Format an error for user display (no stack traces)
pub fn format_error(err: &anyhow::Error) -> String {
    let msg = err.to_string();
    if let Some(source) = err.source() {
        let source_msg = source.to_string();
        if !msg.contains(&source_msg) && !source_msg.is_empty() {
            return format!("{msg}\nCause: {source_msg}");
        }
    }
    msg
}

fn required<'a>(sub_m: &'a ArgMatches, name: &str) -> Result<&'a str> {
    sub_m
        .get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("{name} is required"))
}

pub async fn handle_new(sub_m: &ArgMatches, ctx: &Context, base: Base) -> Result<Outcome> {
    new::run(ctx, required(sub_m, "name")?, base).await?;
    Ok(Outcome::Done)
}

pub async fn handle_rename(sub_m: &ArgMatches, ctx: &Context) -> Result<Outcome> {
    rename::run(ctx, required(sub_m, "name")?).await?;
    Ok(Outcome::Done)
}

pub async fn handle_update(sub_m: &ArgMatches, ctx: &Context) -> Result<Outcome> {
    let name = sub_m.get_one::<String>("name").map(String::as_str);
    let changed = update::run(ctx, name).await?;
    if !changed && sub_m.get_flag("fail-noop") {
        return Ok(Outcome::Noop);
    }
    Ok(Outcome::Done)
}

pub async fn handle_cleanup(ctx: &Context) -> Result<Outcome> {
    cleanup::run(ctx).await?;
    Ok(Outcome::Done)
}

pub async fn handle_display_menu(ctx: &Context) -> Result<Outcome> {
    display_menu::run(ctx).await?;
    Ok(Outcome::Done)
}

pub async fn handle_suggest(sub_m: &ArgMatches, ctx: &Context) -> Result<Outcome> {
    let prefix = sub_m.get_one::<String>("prefix").map_or("", String::as_str);
    suggest::run(ctx, prefix).await?;
    Ok(Outcome::Done)
}

pub fn handle_completions(sub_m: &ArgMatches) -> Result<Outcome> {
    completions::run(required(sub_m, "shell")?)?;
    Ok(Outcome::Done)
}

/// Run the command `matches` selects against `ctx`.
pub async fn dispatch(matches: &ArgMatches, ctx: &Context) -> Result<Outcome> {
    match matches.subcommand() {
        Some(("new", sub_m)) => handle_new(sub_m, ctx, Base::Trunk).await,
        Some(("commit", sub_m)) => handle_new(sub_m, ctx, Base::Current).await,
        Some(("rename", sub_m)) => handle_rename(sub_m, ctx).await,
        Some(("update", sub_m)) => handle_update(sub_m, ctx).await,
        Some(("cleanup", _)) => handle_cleanup(ctx).await,
        Some(("display-menu", _)) => handle_display_menu(ctx).await,
        Some(("suggest", sub_m)) => handle_suggest(sub_m, ctx).await,
        Some(("completions", sub_m)) => handle_completions(sub_m),
        Some((cmd, _)) => anyhow::bail!("Unknown command: {cmd}"),
        None => anyhow::bail!("No command given"),
    }
}

/// Load configuration, wire up tmux and the VCS backends, and run the
/// selected command.
pub async fn run_cli(matches: &ArgMatches) -> Result<Outcome> {
    // Generating completions needs neither tmux nor a repository.
    if let Some(("completions", sub_m)) = matches.subcommand() {
        return handle_completions(sub_m);
    }
    let config = load_config()?;
    tracing::debug!(?config, "Loaded configuration.");
    let ctx = Context::from_config(&config)?;
    dispatch(matches, &ctx).await
}
