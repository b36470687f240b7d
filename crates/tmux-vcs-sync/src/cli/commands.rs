//! CLI command definitions using `clap`

use clap::{Arg, ArgAction, Command as ClapCommand};

fn name_arg(help: &'static str) -> Arg {
    Arg::new("name").required(true).help(help)
}

pub fn cmd_new() -> ClapCommand {
    ClapCommand::new("new")
        .about("Create a new work unit from trunk and a tmux session for it")
        .arg(name_arg("Name of the new work unit"))
}

pub fn cmd_commit() -> ClapCommand {
    ClapCommand::new("commit")
        .about("Create a new work unit on top of the current one and a tmux session for it")
        .arg(name_arg("Name of the new work unit"))
}

pub fn cmd_rename() -> ClapCommand {
    ClapCommand::new("rename")
        .about("Rename the current work unit and its tmux session")
        .long_about(
            "Rename the current work unit and its tmux session.\n\n\
             Must be run inside tmux. If a session for the new name already exists, \
             the work unit is left alone and the command fails.",
        )
        .arg(name_arg("New name for the current work unit").value_name("NEW_NAME"))
}

pub fn cmd_update() -> ClapCommand {
    ClapCommand::new("update")
        .about("Point tmux and the repository at the same work unit")
        .long_about(
            "Point tmux and the repository at the same work unit.\n\n\
             This command has three forms:\n\n\
             1. Inside tmux without a name, the repository is updated to the work unit \
             the current session represents.\n\
             2. Outside tmux without a name, attach to the session for the repository's \
             current work unit, creating it if needed.\n\
             3. With a name (wu, repo>wu or vcs>repo>wu), find that work unit in the \
             current repository or any repository active in tmux, then update both the \
             repository and tmux to point at it.",
        )
        .arg(Arg::new("name").required(false).help("Work unit to update to"))
        .arg(
            Arg::new("fail-noop")
                .long("fail-noop")
                .action(ArgAction::SetTrue)
                .help("Exit with a non-zero code if tmux and the repository were already up to date"),
        )
}

pub fn cmd_cleanup() -> ClapCommand {
    ClapCommand::new("cleanup")
        .about("Kill tmux sessions whose work units no longer exist")
}

pub fn cmd_display_menu() -> ClapCommand {
    ClapCommand::new("display-menu")
        .hide(true)
        .about("Run tmux display-menu to switch to another session")
}

pub fn cmd_suggest() -> ClapCommand {
    ClapCommand::new("suggest")
        .hide(true)
        .about("Print work unit names that `update` accepts")
        .arg(
            Arg::new("prefix")
                .required(false)
                .help("Only print names starting with this"),
        )
}

pub fn cmd_completions() -> ClapCommand {
    ClapCommand::new("completions")
        .about("Generate shell completion scripts")
        .arg(
            Arg::new("shell")
                .required(true)
                .value_parser(["bash", "zsh", "fish"])
                .help("Shell to generate completions for"),
        )
}

pub fn build_cli() -> ClapCommand {
    ClapCommand::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .long_about(
            "Keep one tmux session per work unit (e.g. git branch), named after it.\n\n\
             Sessions are named `work_unit` while a single repository is active in tmux \
             and `repo>work_unit` once several are.",
        )
        .disable_help_subcommand(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::Count)
                .help("Log more (-v info, -vv debug)"),
        )
        .subcommand_required(true)
        .subcommand(cmd_new())
        .subcommand(cmd_commit())
        .subcommand(cmd_rename())
        .subcommand(cmd_update())
        .subcommand(cmd_cleanup())
        .subcommand(cmd_display_menu())
        .subcommand(cmd_suggest())
        .subcommand(cmd_completions())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        build_cli().debug_assert();
    }

    #[test]
    fn test_update_args() {
        let m = match build_cli().try_get_matches_from(["tmux-vcs-sync", "update", "repo>foo", "--fail-noop"]) {
            Ok(m) => m,
            Err(e) => panic!("parse failed: {e}"),
        };
        let Some(("update", sub_m)) = m.subcommand() else {
            panic!("expected update");
        };
        assert_eq!(sub_m.get_one::<String>("name").map(String::as_str), Some("repo>foo"));
        assert!(sub_m.get_flag("fail-noop"));
    }

    #[test]
    fn test_verbose_is_global() {
        let m = build_cli().try_get_matches_from(["tmux-vcs-sync", "cleanup", "-vv"]);
        assert_eq!(m.map(|m| m.get_count("verbose")).ok(), Some(2));
    }

    #[test]
    fn test_new_requires_name() {
        assert!(build_cli().try_get_matches_from(["tmux-vcs-sync", "new"]).is_err());
        assert!(build_cli().try_get_matches_from(["tmux-vcs-sync"]).is_err());
    }

    #[test]
    fn test_hidden_commands_still_parse() {
        let m = build_cli().try_get_matches_from(["tmux-vcs-sync", "suggest", "repo>"]);
        let prefix = m.ok().and_then(|m| {
            m.subcommand_matches("suggest")
                .and_then(|s| s.get_one::<String>("prefix").cloned())
        });
        assert_eq!(prefix.as_deref(), Some("repo>"));
        assert!(build_cli()
            .try_get_matches_from(["tmux-vcs-sync", "display-menu"])
            .is_ok());
    }

    #[test]
    fn test_unsupported_shell_is_rejected() {
        assert!(build_cli()
            .try_get_matches_from(["tmux-vcs-sync", "completions", "powershell"])
            .is_err());
    }
}
