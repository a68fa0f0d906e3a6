//! `cellar group set-members` — the administrative `MEMBER_OF` mutation
//! (spec.md §4.5) kept distinct from operation commits: it changes live
//! membership immediately and never touches an existing snapshot.

use anyhow::Result;
use cellar_ledger_core::model::ContainerId;
use cellar_ledger_store_memory::InMemoryRepository;
use colored::Colorize;

pub async fn set_members(repo: &InMemoryRepository, group_id: ContainerId, members: Vec<ContainerId>) -> Result<()> {
    let count = members.len();
    repo.set_group_members(group_id, members).await;
    println!("{} {} now has {} member(s)", "Updated group:".bright_green().bold(), group_id, count);
    Ok(())
}
