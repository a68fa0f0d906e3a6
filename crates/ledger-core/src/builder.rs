//! Turns an `OperationRequest` plus its resolved input states into a
//! fully-populated set of output state shells, flow edges, and flow/output
//! compositions (spec.md §4.2). Dispatches to the standard path or the
//! press sub-builder; every other operation type uses the standard path.
//!
//! Nothing here touches a repository: the commit protocol resolves input
//! states and destination containers first and hands them in.

use crate::error::BuilderError;
use crate::model::{Container, ContainerId, ContainerState, ContainerType, FlowEdge, StateId};
use crate::request::OperationRequest;
use cellar_composition::{blend, distribute, integer_split, Accepts, Amount, Composition, Share, Unit};
use std::collections::BTreeMap;

/// Output of the builder before the invariant checker runs: output state
/// shells (final compositions already assigned) and their flow edges.
pub struct BuiltOperation {
    pub outputs: Vec<ContainerState>,
    pub flows: Vec<FlowEdge>,
}

/// One flow edge under construction. Composition is filled in once the
/// per-input distribute pass runs.
struct PendingFlow {
    from_state_id: StateId,
    to_container_id: ContainerId,
    qty: Amount,
    unit: Unit,
    composition: Option<Composition>,
}

/// `accepts` derived from the destination container's type (spec.md §4.2
/// step 4 / §3's attribute taxonomy): loss skips value, gain skips cost,
/// everything else accepts all three.
fn accepts_for(container_type: Option<ContainerType>) -> Accepts {
    match container_type {
        Some(t) => Accepts {
            physical: true,
            cost: !t.is_gain(),
            value: !t.is_loss(),
        },
        None => Accepts::ALL,
    }
}

pub fn build(
    request: &OperationRequest,
    inputs: &[ContainerState],
    containers: &BTreeMap<ContainerId, Container>,
) -> Result<BuiltOperation, BuilderError> {
    if inputs.is_empty() {
        return Err(BuilderError::NoInputs);
    }

    if request.op_type.is_press() {
        build_press(request, inputs, containers)
    } else {
        build_standard(request, inputs, request.flow_quantities.iter().cloned().collect(), containers)
    }
}

/// Shared by the standard path and the non-weigh-tag half of the press
/// path: create output shells, emit explicit + remainder flows, assign
/// compositions by `distribute`, and blend output compositions.
fn build_standard(
    request: &OperationRequest,
    inputs: &[ContainerState],
    explicit: Vec<crate::request::FlowQuantityRequest>,
    containers: &BTreeMap<ContainerId, Container>,
) -> Result<BuiltOperation, BuilderError> {
    let mut shells: BTreeMap<ContainerId, ContainerState> = BTreeMap::new();
    for input in inputs {
        shells
            .entry(input.container_id)
            .or_insert_with(|| new_shell(input.container_id, input.composition.unit, request.timestamp));
    }
    for fq in &explicit {
        let unit = fq
            .unit
            .or_else(|| inputs.iter().find(|s| s.id == fq.from_state_id).map(|s| s.composition.unit))
            .unwrap_or(Unit::Gal);
        shells
            .entry(fq.to_container_id)
            .or_insert_with(|| new_shell(fq.to_container_id, unit, request.timestamp));
    }

    let mut flows: Vec<PendingFlow> = explicit
        .iter()
        .map(|fq| PendingFlow {
            from_state_id: fq.from_state_id,
            to_container_id: fq.to_container_id,
            qty: fq.qty.clone(),
            unit: fq
                .unit
                .or_else(|| inputs.iter().find(|s| s.id == fq.from_state_id).map(|s| s.composition.unit))
                .unwrap_or(Unit::Gal),
            composition: None,
        })
        .collect();

    for input in inputs {
        let consumed = request
            .input_consumption
            .iter()
            .find(|c| c.state_id == input.id)
            .map(|c| c.qty.clone())
            .unwrap_or_else(|| flows.iter().filter(|f| f.from_state_id == input.id).map(|f| &f.qty).sum());

        let remainder = &input.composition.qty - &consumed;
        if remainder.is_negative() {
            return Err(BuilderError::NegativeRemainder {
                state_id: input.id,
                remainder,
            });
        }
        if !remainder.is_zero() {
            flows.push(PendingFlow {
                from_state_id: input.id,
                to_container_id: input.container_id,
                qty: remainder,
                unit: input.composition.unit,
                composition: None,
            });
        }
    }

    assign_flow_compositions(inputs, &mut flows, containers)?;
    let outputs = blend_output_shells(shells, &flows)?;

    let flow_edges = flows
        .into_iter()
        .map(|f| FlowEdge {
            from_state_id: f.from_state_id,
            to_state_id: outputs
                .iter()
                .find(|o| o.container_id == f.to_container_id)
                .expect("every flow's destination has a shell")
                .id,
            composition: f.composition.expect("composition assigned before edge construction"),
        })
        .collect();

    Ok(BuiltOperation {
        outputs,
        flows: flow_edges,
    })
}

/// Per input state, build the share vector from its outbound pending
/// flows (in declared order) and distribute its composition across them.
fn assign_flow_compositions(
    inputs: &[ContainerState],
    flows: &mut [PendingFlow],
    containers: &BTreeMap<ContainerId, Container>,
) -> Result<(), BuilderError> {
    for input in inputs {
        let idxs: Vec<usize> = flows
            .iter()
            .enumerate()
            .filter(|(_, f)| f.from_state_id == input.id)
            .map(|(i, _)| i)
            .collect();
        if idxs.is_empty() {
            continue;
        }

        let shares: Vec<Share> = idxs
            .iter()
            .map(|&i| Share {
                qty: flows[i].qty.clone(),
                accepts: accepts_for(containers.get(&flows[i].to_container_id).map(|c| c.container_type)),
            })
            .collect();

        let distributed = distribute(&input.composition, &shares)?;
        for (k, &i) in idxs.iter().enumerate() {
            flows[i].composition = Some(distributed[k].clone());
        }
    }
    Ok(())
}

fn blend_output_shells(
    mut shells: BTreeMap<ContainerId, ContainerState>,
    flows: &[PendingFlow],
) -> Result<Vec<ContainerState>, BuilderError> {
    for (container_id, shell) in shells.iter_mut() {
        let incoming: Vec<Composition> = flows
            .iter()
            .filter(|f| &f.to_container_id == container_id)
            .map(|f| f.composition.clone().expect("composition assigned before blend"))
            .collect();
        shell.composition = if incoming.is_empty() {
            Composition::empty(shell.composition.unit)
        } else {
            blend(&incoming)?
        };
    }
    Ok(shells.into_values().collect())
}

fn new_shell(container_id: ContainerId, unit: Unit, timestamp: chrono::DateTime<chrono::Utc>) -> ContainerState {
    ContainerState {
        id: StateId::new(),
        container_id,
        composition: Composition::empty(unit),
        timestamp,
        is_head: false,
    }
}

/// The press sub-builder (spec.md §4.2 "Press path"). Non-weigh-tag
/// inputs follow the standard path; weigh tags are split across
/// destinations by `integer_split` and their pound composition is
/// converted to the destinations' gallon composition via the two-phase
/// `distribute` + `scale` + `distribute` sequence.
fn build_press(
    request: &OperationRequest,
    inputs: &[ContainerState],
    containers: &BTreeMap<ContainerId, Container>,
) -> Result<BuiltOperation, BuilderError> {
    let is_weigh_tag = |s: &ContainerState| {
        containers
            .get(&s.container_id)
            .map(|c| c.container_type.is_weigh_tag())
            .unwrap_or(false)
    };

    let weigh_tags: Vec<&ContainerState> = inputs.iter().filter(|s| is_weigh_tag(s)).collect();
    let other_inputs: Vec<ContainerState> = inputs.iter().filter(|s| !is_weigh_tag(s)).cloned().collect();

    let non_tag_explicit: Vec<_> = request
        .flow_quantities
        .iter()
        .filter(|fq| other_inputs.iter().any(|s| s.id == fq.from_state_id))
        .cloned()
        .collect();

    let mut built = if other_inputs.is_empty() {
        BuiltOperation { outputs: Vec::new(), flows: Vec::new() }
    } else {
        build_standard(request, &other_inputs, non_tag_explicit, containers)?
    };

    if weigh_tags.is_empty() {
        return Ok(built);
    }

    // Per-destination gallon targets: explicit targetFlowQuantities take
    // precedence, otherwise sum the declared gal flow_quantities for that
    // destination.
    let mut targets: BTreeMap<ContainerId, Amount> = BTreeMap::new();
    for t in &request.target_flow_quantities {
        targets.insert(t.container_id, t.qty.clone());
    }
    if targets.is_empty() {
        for fq in &request.flow_quantities {
            if fq.unit.unwrap_or(Unit::Gal) == Unit::Gal {
                let entry = targets.entry(fq.to_container_id).or_insert_with(Amount::zero);
                *entry = &*entry + &fq.qty;
            }
        }
    }

    // Ensure a shell exists for every target destination.
    let mut shells: BTreeMap<ContainerId, ContainerState> =
        built.outputs.drain(..).map(|s| (s.container_id, s)).collect();
    for container_id in targets.keys() {
        shells
            .entry(*container_id)
            .or_insert_with(|| new_shell(*container_id, Unit::Gal, request.timestamp));
    }
    // Every weigh tag gets a new head state too: its self remainder flow
    // (partial consumption) needs a destination, and a fully-consumed tag
    // still needs a zeroed-out head to replace its demoted one.
    for tag in &weigh_tags {
        shells
            .entry(tag.container_id)
            .or_insert_with(|| new_shell(tag.container_id, Unit::Lbs, request.timestamp));
    }

    let mut tag_flows: Vec<PendingFlow> = Vec::new();
    // consumed qty (lbs) per tag, in input order.
    let consumed: Vec<Amount> = weigh_tags
        .iter()
        .map(|tag| {
            request
                .input_consumption
                .iter()
                .find(|c| c.state_id == tag.id)
                .map(|c| c.qty.clone())
                .unwrap_or_else(|| tag.composition.qty.clone())
        })
        .collect();

    // Per destination, split its gallon target across tags weighted by
    // consumed lbs, emitting one gal flow per (tag, destination) pair.
    for (container_id, target_qty) in &targets {
        let splits = integer_split(target_qty, &consumed)?;
        for (tag, split_qty) in weigh_tags.iter().zip(splits) {
            if split_qty.is_zero() {
                continue;
            }
            tag_flows.push(PendingFlow {
                from_state_id: tag.id,
                to_container_id: *container_id,
                qty: split_qty,
                unit: Unit::Gal,
                composition: None,
            });
        }
    }

    // Per-tag remainder (unconsumed weight, self, in lbs) plus two-phase
    // composition assignment.
    for (tag, consumed_qty) in weigh_tags.iter().zip(consumed.iter()) {
        let remainder = &tag.composition.qty - consumed_qty;
        if remainder.is_negative() {
            return Err(BuilderError::NegativeRemainder {
                state_id: tag.id,
                remainder,
            });
        }

        let remainder_share = Share { qty: remainder.clone(), accepts: Accepts::ALL };
        let consumed_share = Share { qty: consumed_qty.clone(), accepts: Accepts::ALL };
        let split = distribute(&tag.composition, &[consumed_share, remainder_share])?;
        let consumed_comp = split[0].clone();
        let remainder_comp = split[1].clone();

        if !remainder.is_zero() {
            tag_flows.push(PendingFlow {
                from_state_id: tag.id,
                to_container_id: tag.container_id,
                qty: remainder,
                unit: Unit::Lbs,
                composition: Some(remainder_comp),
            });
        }

        let this_tag_gal_flows: Vec<usize> = tag_flows
            .iter()
            .enumerate()
            .filter(|(_, f)| f.from_state_id == tag.id && f.unit == Unit::Gal)
            .map(|(i, _)| i)
            .collect();
        let gal_total: Amount = this_tag_gal_flows.iter().map(|&i| &tag_flows[i].qty).sum();

        let mut consumed_with_pounds = consumed_comp;
        consumed_with_pounds
            .attributes
            .entry(cellar_composition::EFFECTIVE_POUNDS.to_string())
            .or_insert_with(|| cellar_composition::AttributeValue::Scalar(consumed_qty.clone()));

        let scaled = if gal_total.is_zero() {
            Composition::empty(Unit::Gal)
        } else {
            cellar_composition::scale(&consumed_with_pounds, gal_total.clone(), Unit::Gal)
        };

        if !this_tag_gal_flows.is_empty() {
            let shares: Vec<Share> = this_tag_gal_flows
                .iter()
                .map(|&i| Share { qty: tag_flows[i].qty.clone(), accepts: Accepts::ALL })
                .collect();
            let distributed = distribute(&scaled, &shares)?;
            for (k, &i) in this_tag_gal_flows.iter().enumerate() {
                tag_flows[i].composition = Some(distributed[k].clone());
            }
        }
    }

    for (container_id, shell) in shells.iter_mut() {
        let incoming: Vec<Composition> = tag_flows
            .iter()
            .filter(|f| &f.to_container_id == container_id)
            .map(|f| f.composition.clone().expect("composition assigned before blend"))
            .collect();
        if incoming.is_empty() {
            continue;
        }
        let merged = if shell.composition.qty.is_zero() && shell.composition.attributes.is_empty() {
            blend(&incoming)?
        } else {
            let mut all = incoming;
            all.push(shell.composition.clone());
            blend(&all)?
        };
        shell.composition = merged;
    }

    let mut flow_edges: Vec<FlowEdge> = tag_flows
        .into_iter()
        .map(|f| FlowEdge {
            from_state_id: f.from_state_id,
            to_state_id: shells
                .get(&f.to_container_id)
                .expect("every flow's destination has a shell")
                .id,
            composition: f.composition.expect("composition assigned before edge construction"),
        })
        .collect();

    flow_edges.extend(built.flows);

    Ok(BuiltOperation {
        outputs: shells.into_values().collect(),
        flows: flow_edges,
    })
}
