//! Operation request schema (spec.md §4.2 / §6): the normalized input a
//! caller submits to `commit`. The id-based `flowQuantities` form is
//! normative; the source's positional `{from, to}` encoding is not
//! modelled here at all (spec.md §9, Open Questions).

use crate::model::{ContainerId, OperationId, OperationType, StateId, TenantId};
use cellar_composition::{Amount, Unit};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowQuantityRequest {
    pub from_state_id: StateId,
    pub to_container_id: ContainerId,
    pub qty: Amount,
    pub unit: Option<Unit>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputConsumption {
    pub state_id: StateId,
    pub qty: Amount,
}

/// Press-only: an explicit declared gallon target for a destination
/// container, taking precedence over summing the declared gal flows.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TargetFlowQuantity {
    pub container_id: ContainerId,
    pub qty: Amount,
    pub unit: Unit,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OperationRequest {
    pub id: OperationId,
    pub op_type: OperationType,
    pub tenant_id: TenantId,
    pub timestamp: DateTime<Utc>,
    pub description: Option<String>,
    /// Input containers; the commit protocol resolves each to its current
    /// head state.
    pub from_containers: Vec<ContainerId>,
    pub flow_quantities: Vec<FlowQuantityRequest>,
    #[serde(default)]
    pub input_consumption: Vec<InputConsumption>,
    #[serde(default)]
    pub target_flow_quantities: Vec<TargetFlowQuantity>,
}
