//! The narrow store boundary (spec.md §4.6). This is the only module in
//! `ledger-core` that mentions I/O; everything else — composition
//! algebra, the builder, the invariant checker — is synchronous and pure.

use crate::model::{Container, ContainerId, ContainerState, FlowEdge, OperationId, OperationType, SnapshotMember, StateId, WineryOperation};
use crate::error::RepoError;
use async_trait::async_trait;

/// Everything the commit transaction needs to persist atomically: the
/// operation node, its new states, the set of heads it demotes, the flow
/// edges, and any barrel-group snapshots produced by this commit.
#[derive(Clone, Debug)]
pub struct CommitWrite {
    pub operation: WineryOperation,
    pub new_states: Vec<ContainerState>,
    pub demoted_head_ids: Vec<StateId>,
    pub flows: Vec<FlowEdge>,
    pub group_snapshots: Vec<(StateId, Vec<SnapshotMember>)>,
}

impl CommitWrite {
    pub fn op_type(&self) -> OperationType {
        self.operation.op_type
    }

    pub fn operation_id(&self) -> OperationId {
        self.operation.id
    }
}

#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_container(&self, id: ContainerId) -> Result<Option<Container>, RepoError>;

    async fn get_head_state(&self, container_id: ContainerId) -> Result<Option<ContainerState>, RepoError>;

    async fn batch_exists(&self, ids: &[ContainerId]) -> Result<Vec<ContainerId>, RepoError>;

    async fn get_group_members(&self, group_id: ContainerId) -> Result<Vec<Container>, RepoError>;

    /// Atomic write of everything `commit` produced: operation node,
    /// output states, the head-pointer swap, flow edges, and any
    /// barrel-group snapshots, in one transaction.
    async fn commit_operation(&self, write: CommitWrite) -> Result<(), RepoError>;
}
