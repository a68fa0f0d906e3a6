//! The operation commit protocol (spec.md §4.4): load heads, run the
//! builder, run the checker, and persist everything through one call to
//! `Repository::commit_operation`. Concurrency control is optimistic — a
//! racing commit whose input is no longer head fails `InputNotCurrent`
//! rather than silently overwriting it (spec.md §5).

use crate::builder::{self, BuiltOperation};
use crate::error::CommitError;
use crate::invariants::{check_pure, check_single_state_per_container};
use crate::model::{Container, ContainerId, ContainerState, WineryOperation};
use crate::repository::{CommitWrite, Repository};
use crate::request::OperationRequest;
use std::collections::BTreeMap;
use std::time::Duration;

/// Run `commit` against `repo`, aborting with `CommitError::Timeout` if it
/// does not finish within `deadline`. A timeout before the repository's
/// atomic write completes leaves no partial state; after the write lands,
/// cancellation (including a racing timeout future) cannot roll it back
/// (spec.md §5) — the in-memory store only mutates its maps once every
/// check has already passed.
pub async fn commit_with_deadline(
    request: OperationRequest,
    repo: &dyn Repository,
    deadline: Duration,
) -> Result<WineryOperation, CommitError> {
    match tokio::time::timeout(deadline, commit(request, repo)).await {
        Ok(result) => result,
        Err(_) => Err(CommitError::Timeout),
    }
}

pub async fn commit(request: OperationRequest, repo: &dyn Repository) -> Result<WineryOperation, CommitError> {
    let mut input_states: Vec<ContainerState> = Vec::with_capacity(request.from_containers.len());
    for container_id in &request.from_containers {
        let container = repo.get_container(*container_id).await?.ok_or(CommitError::InvalidContainer)?;
        if container.tenant_id != request.tenant_id {
            return Err(CommitError::CrossTenant);
        }
        let head = repo.get_head_state(*container_id).await?.ok_or(CommitError::InputNotCurrent)?;
        if !head.is_head {
            return Err(CommitError::InputNotCurrent);
        }
        input_states.push(head);
    }

    // Every flow/consumption entry in the request names the state id the
    // caller read earlier. If any of those ids is no longer among the
    // heads we just fetched, someone else's commit has already moved it
    // out from under us — fail now rather than let the builder silently
    // treat the reference as unassigned (spec.md §5).
    let valid_state_ids: std::collections::BTreeSet<crate::model::StateId> =
        input_states.iter().map(|s| s.id).collect();
    for flow in &request.flow_quantities {
        if !valid_state_ids.contains(&flow.from_state_id) {
            return Err(CommitError::InputNotCurrent);
        }
    }
    for consumption in &request.input_consumption {
        if !valid_state_ids.contains(&consumption.state_id) {
            return Err(CommitError::InputNotCurrent);
        }
    }

    let mut destination_ids: Vec<ContainerId> = request.flow_quantities.iter().map(|f| f.to_container_id).collect();
    destination_ids.extend(request.target_flow_quantities.iter().map(|t| t.container_id));
    destination_ids.extend(request.from_containers.iter().copied());
    destination_ids.sort();
    destination_ids.dedup();

    let found = repo.batch_exists(&destination_ids).await?;
    if found.len() != destination_ids.len() {
        return Err(CommitError::InvalidContainer);
    }

    let mut containers: BTreeMap<ContainerId, Container> = BTreeMap::new();
    for id in &destination_ids {
        let container = repo.get_container(*id).await?.ok_or(CommitError::InvalidContainer)?;
        if container.tenant_id != request.tenant_id {
            return Err(CommitError::CrossTenant);
        }
        containers.insert(*id, container);
    }

    let BuiltOperation { mut outputs, flows } = builder::build(&request, &input_states, &containers)?;
    for output in &mut outputs {
        output.is_head = true;
    }

    let mut violations = check_pure(&input_states, &outputs, &flows);
    violations.extend(check_single_state_per_container(&outputs));
    if !violations.is_empty() {
        log::warn!("commit {} rejected: {} violation(s)", request.id, violations.len());
        return Err(CommitError::ValidationFailed(violations));
    }

    let group_outputs: Vec<(ContainerId, crate::model::StateId)> = outputs
        .iter()
        .filter(|o| containers.get(&o.container_id).map(|c| c.container_type.is_barrel_group()).unwrap_or(false))
        .map(|o| (o.container_id, o.id))
        .collect();
    let group_snapshots = crate::snapshot::snapshot_group_outputs(repo, &group_outputs).await?;

    let operation = WineryOperation {
        id: request.id,
        op_type: request.op_type,
        tenant_id: request.tenant_id,
        created_at: request.timestamp,
        description: request.description.clone(),
        inputs: input_states.clone(),
        outputs: outputs.clone(),
        flows: flows.clone(),
    };

    let write = CommitWrite {
        operation: operation.clone(),
        new_states: outputs,
        demoted_head_ids: input_states.iter().map(|s| s.id).collect(),
        flows,
        group_snapshots,
    };

    if let Err(err) = repo.commit_operation(write).await {
        if err.conflict {
            log::info!("commit {} lost an optimistic-concurrency race", request.id);
        } else {
            log::error!("commit {} failed at the store: {}", request.id, err.message);
        }
        return Err(err.into());
    }

    log::debug!("commit {} landed: {} output state(s)", operation.id, operation.outputs.len());
    Ok(operation)
}
