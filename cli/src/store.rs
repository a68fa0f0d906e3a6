//! Bridges the in-process `InMemoryRepository` across separate CLI
//! invocations. There is no real database here (spec.md's Non-goals never
//! mention one, but the engine's only shipped `Repository` impl is
//! in-memory) — every command loads a flat JSON dump from the data
//! directory, mutates the store, and writes the dump back out, the way a
//! single-file local cache would.

use anyhow::{Context, Result};
use cellar_ledger_core::model::{Container, ContainerId, ContainerState};
use cellar_ledger_store_memory::InMemoryRepository;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::CellarConfig;

#[derive(Serialize, Deserialize, Default)]
struct SeedDump {
    containers: Vec<Container>,
    head_states: Vec<ContainerState>,
    #[serde(default)]
    group_members: BTreeMap<ContainerId, Vec<ContainerId>>,
}

pub async fn load(config: &CellarConfig) -> Result<InMemoryRepository> {
    let repo = InMemoryRepository::new();
    let path = config.seed_file();
    if !path.exists() {
        return Ok(repo);
    }

    let raw = std::fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let dump: SeedDump = serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;

    for container in dump.containers {
        repo.create_container(container).await;
    }
    for state in dump.head_states {
        repo.seed_state(state).await;
    }
    for (group_id, members) in dump.group_members {
        repo.set_group_members(group_id, members).await;
    }

    Ok(repo)
}

pub async fn save(repo: &InMemoryRepository, config: &CellarConfig) -> Result<()> {
    let dump = SeedDump {
        containers: repo.all_containers().await,
        head_states: repo.all_head_states().await,
        group_members: repo.all_group_members().await,
    };

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
    let path = config.seed_file();
    let raw = serde_json::to_string_pretty(&dump).context("failed to serialize store dump")?;
    std::fs::write(&path, raw).with_context(|| format!("failed to write {}", path.display()))
}
