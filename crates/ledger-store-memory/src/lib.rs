//! An in-memory `Repository` (spec.md §4.6) behind a `tokio::sync::RwLock`.
//! Reference implementation of the narrow store boundary `ledger-core`
//! depends on: used by the CLI and by `ledger-core`'s own integration
//! tests, the role the teacher's mock registries play for code that
//! otherwise only speaks through a trait.
//!
//! Optimistic concurrency (spec.md §5) is enforced at write time: a
//! commit whose input head state id no longer matches the stored head
//! for that container fails `INPUT_NOT_CURRENT` rather than overwriting
//! it.

use async_trait::async_trait;
use cellar_ledger_core::error::RepoError;
use cellar_ledger_core::model::{Container, ContainerId, ContainerState, SnapshotMember, StateId};
use cellar_ledger_core::repository::{CommitWrite, Repository};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Store {
    containers: BTreeMap<ContainerId, Container>,
    /// Every state ever created, by id.
    states: BTreeMap<StateId, ContainerState>,
    /// Current head state id per container.
    heads: BTreeMap<ContainerId, StateId>,
    /// Live `MEMBER_OF` membership per barrel-group container, mutated
    /// only by administrative calls, never by operation commits.
    group_members: BTreeMap<ContainerId, BTreeSet<ContainerId>>,
    /// Committed operations, by id, kept for lineage inspection (the CLI's
    /// `history` command and tests read this back).
    operations: BTreeMap<cellar_ledger_core::model::OperationId, cellar_ledger_core::model::WineryOperation>,
    /// Barrel-group membership materialized onto a state at commit time
    /// (spec.md §4.5), keyed by that state's id.
    group_snapshots: BTreeMap<StateId, Vec<SnapshotMember>>,
}

#[derive(Clone, Default)]
pub struct InMemoryRepository {
    inner: Arc<RwLock<Store>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a container with no prior history. Used by tests and the CLI
    /// to create a container before any operation touches it.
    pub async fn create_container(&self, container: Container) {
        let mut store = self.inner.write().await;
        store.containers.insert(container.id, container);
    }

    /// Seed a container's initial state and make it the head, bypassing
    /// the operation engine. Used by tests to establish starting
    /// conditions (spec.md's literal scenarios all start from a
    /// pre-existing state).
    pub async fn seed_state(&self, state: ContainerState) {
        let mut store = self.inner.write().await;
        store.heads.insert(state.container_id, state.id);
        store.states.insert(state.id, state);
    }

    /// Administrative membership mutation (spec.md §4.5): changes live
    /// membership immediately; does not touch any existing snapshot.
    pub async fn set_group_members(&self, group_id: ContainerId, members: Vec<ContainerId>) {
        let mut store = self.inner.write().await;
        store.group_members.insert(group_id, members.into_iter().collect());
    }

    pub async fn get_operation(
        &self,
        id: cellar_ledger_core::model::OperationId,
    ) -> Option<cellar_ledger_core::model::WineryOperation> {
        let store = self.inner.read().await;
        store.operations.get(&id).cloned()
    }

    /// Lineage walk: every state a container has ever had, oldest first,
    /// reconstructed by following `FLOW_TO` back from the current head.
    /// Used by the CLI's `history` command.
    pub async fn history(&self, container_id: ContainerId) -> Vec<ContainerState> {
        let store = self.inner.read().await;
        store
            .states
            .values()
            .filter(|s| s.container_id == container_id)
            .cloned()
            .collect()
    }

    /// The barrel-group membership snapshot materialized onto `state_id`
    /// at commit time, if that state was a barrel-group output.
    pub async fn group_snapshot(&self, state_id: StateId) -> Option<Vec<SnapshotMember>> {
        let store = self.inner.read().await;
        store.group_snapshots.get(&state_id).cloned()
    }

    /// Every container currently known to the store. Used by the CLI to
    /// dump the store to its seed file between invocations.
    pub async fn all_containers(&self) -> Vec<Container> {
        let store = self.inner.read().await;
        store.containers.values().cloned().collect()
    }

    /// The current head state of every container that has one.
    pub async fn all_head_states(&self) -> Vec<ContainerState> {
        let store = self.inner.read().await;
        store.heads.values().filter_map(|id| store.states.get(id).cloned()).collect()
    }

    /// Live `MEMBER_OF` membership for every barrel-group container.
    pub async fn all_group_members(&self) -> BTreeMap<ContainerId, Vec<ContainerId>> {
        let store = self.inner.read().await;
        store.group_members.iter().map(|(group, members)| (*group, members.iter().copied().collect())).collect()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_container(&self, id: ContainerId) -> Result<Option<Container>, RepoError> {
        let store = self.inner.read().await;
        Ok(store.containers.get(&id).cloned())
    }

    async fn get_head_state(&self, container_id: ContainerId) -> Result<Option<ContainerState>, RepoError> {
        let store = self.inner.read().await;
        let head_id = match store.heads.get(&container_id) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(store.states.get(&head_id).cloned())
    }

    async fn batch_exists(&self, ids: &[ContainerId]) -> Result<Vec<ContainerId>, RepoError> {
        let store = self.inner.read().await;
        Ok(ids.iter().copied().filter(|id| store.containers.contains_key(id)).collect())
    }

    async fn get_group_members(&self, group_id: ContainerId) -> Result<Vec<Container>, RepoError> {
        let store = self.inner.read().await;
        let ids = store.group_members.get(&group_id).cloned().unwrap_or_default();
        Ok(ids.into_iter().filter_map(|id| store.containers.get(&id).cloned()).collect())
    }

    async fn commit_operation(&self, write: CommitWrite) -> Result<(), RepoError> {
        let mut store = self.inner.write().await;

        // Re-verify every demoted head is still the one on file. A
        // concurrent commit that landed between our read phase and now
        // has already moved at least one of these — this is the race
        // spec.md §5 describes, caught here rather than in `ledger-core`
        // because only the store sees the live head pointer.
        for state_id in &write.demoted_head_ids {
            let state = store.states.get(state_id).ok_or_else(|| RepoError::new("input state vanished"))?;
            let current_head = store.heads.get(&state.container_id);
            if current_head != Some(state_id) {
                log::debug!("container {} head moved since read, rejecting commit", state.container_id);
                return Err(RepoError::conflict("head moved since read"));
            }
        }

        for state in &write.new_states {
            store.states.insert(state.id, state.clone());
            store.heads.insert(state.container_id, state.id);
        }

        for (state_id, members) in &write.group_snapshots {
            store.group_snapshots.insert(*state_id, members.clone());
        }

        store.operations.insert(write.operation.id, write.operation.clone());

        Ok(())
    }
}
