//! `cellar container ...` — container lifecycle and inspection.

use anyhow::{Context, Result};
use cellar_composition::Amount;
use cellar_ledger_core::model::{Container, ContainerId, ContainerType, TenantId};
use cellar_ledger_core::repository::Repository;
use cellar_ledger_store_memory::InMemoryRepository;
use chrono::Utc;
use clap::ValueEnum;
use colored::Colorize;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ContainerTypeArg {
    Tank,
    Barrel,
    Bottle,
    Loss,
    Gain,
    WeighTag,
    BarrelGroup,
}

impl From<ContainerTypeArg> for ContainerType {
    fn from(arg: ContainerTypeArg) -> Self {
        match arg {
            ContainerTypeArg::Tank => ContainerType::Tank,
            ContainerTypeArg::Barrel => ContainerType::Barrel,
            ContainerTypeArg::Bottle => ContainerType::Bottle,
            ContainerTypeArg::Loss => ContainerType::Loss,
            ContainerTypeArg::Gain => ContainerType::Gain,
            ContainerTypeArg::WeighTag => ContainerType::WeighTag,
            ContainerTypeArg::BarrelGroup => ContainerType::BarrelGroup,
        }
    }
}

pub fn parse_container_id(raw: &str) -> Result<ContainerId> {
    Ok(ContainerId::from(Uuid::from_str(raw).with_context(|| format!("invalid container id: {raw}"))?))
}

pub async fn create(
    repo: &InMemoryRepository,
    tenant_id: TenantId,
    name: String,
    container_type: ContainerTypeArg,
    capacity: Option<i64>,
) -> Result<()> {
    let container = Container {
        id: ContainerId::new(),
        tenant_id,
        name: name.clone(),
        container_type: container_type.into(),
        capacity: capacity.map(Amount::from),
        created_at: Utc::now(),
    };
    let id = container.id;
    repo.create_container(container).await;
    println!("{} {}", "Created container:".bright_green().bold(), id);
    Ok(())
}

pub async fn show(repo: &InMemoryRepository, id: ContainerId) -> Result<()> {
    let container = repo.get_container(id).await?.context("no such container")?;
    println!("{} {}", "Id:".bright_cyan(), container.id);
    println!("{} {}", "Name:".bright_cyan(), container.name);
    println!("{} {:?}", "Type:".bright_cyan(), container.container_type);
    println!("{} {:?}", "Capacity:".bright_cyan(), container.capacity);

    match repo.get_head_state(id).await? {
        Some(head) => {
            println!("{} {}", "Head state:".bright_cyan(), head.id);
            println!("{} {}", "Qty:".bright_cyan(), head.composition.qty);
            println!("{} {:?}", "Unit:".bright_cyan(), head.composition.unit);
            for (key, value) in &head.composition.attributes {
                println!("  {} {:?}", format!("{key}:").dimmed(), value);
            }
        }
        None => println!("{}", "No head state yet.".yellow()),
    }
    Ok(())
}

pub async fn history(repo: &InMemoryRepository, id: ContainerId) -> Result<()> {
    let mut states = repo.history(id).await;
    states.sort_by_key(|s| s.timestamp);
    if states.is_empty() {
        println!("{}", "No history.".yellow());
        return Ok(());
    }
    for state in states {
        println!(
            "{} {} qty={} {}",
            state.timestamp.to_rfc3339().dimmed(),
            state.id,
            state.composition.qty,
            if state.is_head { "(head)".bright_green() } else { "".normal() },
        );
    }
    Ok(())
}
