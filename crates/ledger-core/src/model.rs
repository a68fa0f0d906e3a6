//! The entity set of spec.md §3: `Container`, `ContainerState`,
//! `FlowEdge`, `WineryOperation`, and the barrel-group snapshot pair.
//! `QuantifiedComposition` itself lives in `cellar_composition::Composition`
//! and is reused here rather than redefined.

use cellar_composition::Composition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_newtype {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(u: Uuid) -> Self {
                $name(u)
            }
        }
    };
}

uuid_newtype!(ContainerId);
uuid_newtype!(StateId);
uuid_newtype!(OperationId);
uuid_newtype!(TenantId);

/// The closed set of container types. `type` is immutable for the life of
/// the container (spec.md §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContainerType {
    Tank,
    Barrel,
    Bottle,
    Loss,
    Gain,
    WeighTag,
    BarrelGroup,
}

impl ContainerType {
    /// Destinations of this type skip the `cost` (realDollars) attribute
    /// policy — value cannot be created from nowhere at a gain.
    pub fn is_gain(&self) -> bool {
        matches!(self, ContainerType::Gain)
    }

    /// Destinations of this type skip the `value` (nominalDollars)
    /// attribute policy — book value rides along even though the wine
    /// itself vanished.
    pub fn is_loss(&self) -> bool {
        matches!(self, ContainerType::Loss)
    }

    pub fn is_weigh_tag(&self) -> bool {
        matches!(self, ContainerType::WeighTag)
    }

    pub fn is_barrel_group(&self) -> bool {
        matches!(self, ContainerType::BarrelGroup)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: ContainerId,
    pub tenant_id: TenantId,
    pub name: String,
    pub container_type: ContainerType,
    pub capacity: Option<cellar_composition::Amount>,
    pub created_at: DateTime<Utc>,
}

/// An immutable snapshot of a container's qty + composition at a point in
/// time. `is_head` reflects the repository's head pointer as of the read
/// that produced this value; it is never mutated in place (spec.md's
/// design note: "current state" is a side-channel owned by the
/// repository, not a scattered boolean).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerState {
    pub id: StateId,
    pub container_id: ContainerId,
    pub composition: Composition,
    pub timestamp: DateTime<Utc>,
    pub is_head: bool,
}

/// A directed, signed-qty link between two states, created once with the
/// owning operation. `composition.qty` carries the flow's signed amount;
/// `composition.unit`/`.attributes` are the share of the source assigned
/// to this flow.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowEdge {
    pub from_state_id: StateId,
    pub to_state_id: StateId,
    pub composition: Composition,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    Transfer,
    Blend,
    Bottle,
    Loss,
    Adjustment,
    Press,
    Topping,
    Gain,
}

impl OperationType {
    pub fn is_press(&self) -> bool {
        matches!(self, OperationType::Press)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WineryOperation {
    pub id: OperationId,
    pub op_type: OperationType,
    pub tenant_id: TenantId,
    pub created_at: DateTime<Utc>,
    pub description: Option<String>,
    pub inputs: Vec<ContainerState>,
    pub outputs: Vec<ContainerState>,
    pub flows: Vec<FlowEdge>,
}

/// The membership of a barrel-group container materialized onto one of
/// its states at commit time (spec.md §4.5). Immutable once attached;
/// later membership changes only affect future snapshots.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMember {
    pub barrel: ContainerId,
}
