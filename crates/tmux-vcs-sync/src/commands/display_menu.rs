//! `display-menu`: a tmux menu for jumping between sessions.
//!
//! Sessions are grouped by repository, repositories ordered by name. Inside
//! a group, work units come in topological order and sessions whose work
//! unit is gone come last. Sessions that represent no work unit form a
//! final group. The group holding the current session is shown first.

use std::{
    collections::{BTreeMap, HashSet},
    sync::Arc,
};

use tmux_vcs_sync_core::{
    tmux::{MenuElement, MenuEntry, Session},
    vcs::VersionControlSystems,
    RepoName, Result, State, WorkUnitName,
};

use super::Context;

/// Menu shortcuts, in the order they are handed out.
const KEYS: &str = "0123456789wertyuiopasdfghjklzxcvbnm";
const CURRENT_KEY: &str = "q";

struct Item {
    name: String,
    id: String,
    stale: bool,
}

pub async fn run(ctx: &Context) -> Result<()> {
    let cur = ctx.current_session()?;
    let client = ctx.terminal.client()?;
    let menu = ctx.bounded(create_menu(cur.as_ref(), &ctx.vcs)).await?;
    client.display_menu(&menu).await
}

/// Build the menu as seen from `cur`.
pub async fn create_menu(cur: &dyn Session, vcs: &VersionControlSystems) -> Result<Vec<MenuElement>> {
    let st = State::new(cur.server(), vcs).await?;

    let mut by_repo: BTreeMap<RepoName, BTreeMap<String, Arc<dyn Session>>> = BTreeMap::new();
    for (n, sesh) in st.sessions() {
        by_repo.entry(n.repo_name).or_default().insert(n.work_unit, sesh);
    }

    let repos = st.repositories();
    let mut groups: Vec<Vec<Item>> = Vec::new();
    for (n, sessions) in by_repo {
        let Some(repo) = repos.get(&n) else {
            continue;
        };
        let existing: HashSet<String> = repo.list("").await?.into_iter().collect();
        let mut work_units: Vec<String> = sessions
            .keys()
            .filter(|wu| existing.contains(*wu))
            .cloned()
            .collect();
        repo.sort(&mut work_units).await?;

        let item = |wu: &str, sesh: &Arc<dyn Session>, stale: bool| Item {
            name: st.session_name(&WorkUnitName::new(n.clone(), wu)),
            id: sesh.id().to_string(),
            stale,
        };
        let mut group: Vec<Item> = work_units
            .iter()
            .filter_map(|wu| sessions.get(wu).map(|sesh| item(wu.as_str(), sesh, false)))
            .collect();
        group.extend(
            sessions
                .iter()
                .filter(|(wu, _)| !existing.contains(*wu))
                .map(|(wu, sesh)| item(wu.as_str(), sesh, true)),
        );
        groups.push(group);
    }

    let unknown: BTreeMap<String, Arc<dyn Session>> = st.unknown_sessions().into_iter().collect();
    if !unknown.is_empty() {
        groups.push(
            unknown
                .into_iter()
                .map(|(name, sesh)| Item {
                    name,
                    id: sesh.id().to_string(),
                    stale: false,
                })
                .collect(),
        );
    }

    // Stable, so the other groups keep their order.
    groups.sort_by_key(|group| !group.iter().any(|item| item.id == cur.id()));
    Ok(render(groups, cur.id()))
}

fn render(groups: Vec<Vec<Item>>, current_id: &str) -> Vec<MenuElement> {
    let mut keys = KEYS.chars();
    let mut menu = Vec::new();
    for (i, group) in groups.into_iter().enumerate() {
        if i > 0 {
            menu.push(MenuElement::Spacer);
        }
        for item in group {
            // Every entry uses up a key, even the current one.
            let mut key = keys.next().map(String::from).unwrap_or_default();
            let marker = if item.id == current_id {
                key = CURRENT_KEY.to_string();
                '*'
            } else if item.stale {
                '?'
            } else {
                ' '
            };
            menu.push(MenuElement::Entry(MenuEntry {
                name: format!("{marker}{}", item.name),
                key,
                command: format!("switch-client -t {}", item.id),
            }));
        }
    }
    menu
}
