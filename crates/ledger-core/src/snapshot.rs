//! Barrel-group snapshotting (spec.md §4.5). Materializes the *current*
//! membership of a barrel-group container onto its newly created state at
//! commit time; past snapshots never change when live membership does.

use crate::model::{Container, ContainerId, SnapshotMember, StateId};
use crate::repository::Repository;
use crate::error::RepoError;

/// For every output state whose container is a barrel-group, read its
/// live membership and pair it with the new state id.
pub async fn snapshot_group_outputs(
    repo: &dyn Repository,
    group_outputs: &[(ContainerId, StateId)],
) -> Result<Vec<(StateId, Vec<SnapshotMember>)>, RepoError> {
    let mut snapshots = Vec::with_capacity(group_outputs.len());
    for (group_id, state_id) in group_outputs {
        let members: Vec<Container> = repo.get_group_members(*group_id).await?;
        let snapshot = members.into_iter().map(|c| SnapshotMember { barrel: c.id }).collect();
        snapshots.push((*state_id, snapshot));
    }
    Ok(snapshots)
}
