//! The invariant checker (spec.md §4.3): a pure, non-short-circuiting pass
//! over a fully-populated operation. `check` always evaluates every rule
//! and returns every violation, so a single commit attempt surfaces every
//! problem at once.

use crate::model::{ContainerState, FlowEdge, StateId};
use cellar_composition::{blend, equals, Amount, Composition, EFFECTIVE_POUNDS};
use serde::{Deserialize, Serialize};

/// A single conservation/structural rule failure. Carries enough of the
/// offending ids for a caller to render which state or flow failed which
/// rule, the way the teacher's formal-verification crate reports which
/// named property was violated rather than a single boolean.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Violation {
    QuantityNotConserved { state_id: StateId, expected: Amount, actual: Amount },
    CompositionNotConserved { state_id: StateId },
    NominalDollarsNotConserved { expected: Amount, actual: Amount },
    InvalidFlowReference { flow_index: usize },
    InputNotCurrent { state_id: StateId },
    MultipleCurrentStates { container_id: crate::model::ContainerId },
}

fn attribute_amount(composition: &Composition, name: &str) -> Amount {
    match composition.attributes.get(name) {
        Some(cellar_composition::AttributeValue::Scalar(v)) => v.clone(),
        _ => Amount::zero(),
    }
}

fn nominal_dollars(composition: &Composition) -> Amount {
    attribute_amount(composition, "nominalDollars")
}

/// Checks the two rules (`QUANTITY_NOT_CONSERVED`,
/// `COMPOSITION_NOT_CONSERVED`, `NOMINAL_DOLLARS_NOT_CONSERVED`,
/// `INVALID_FLOW_REFERENCE`) that are decidable from the in-memory
/// operation alone, before the repository is ever touched.
pub fn check_pure(inputs: &[ContainerState], outputs: &[ContainerState], flows: &[FlowEdge]) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (i, flow) in flows.iter().enumerate() {
        let from_ok = inputs.iter().any(|s| s.id == flow.from_state_id);
        let to_ok = outputs.iter().any(|s| s.id == flow.to_state_id);
        if !from_ok || !to_ok {
            violations.push(Violation::InvalidFlowReference { flow_index: i });
        }
    }

    for input in inputs {
        let outgoing: Vec<_> = flows.iter().filter(|f| f.from_state_id == input.id).collect();

        // A press converts a weigh tag's lbs into the gallons of juice it
        // produced; those flows carry the destination's unit, not the tag's,
        // so their qty is not directly comparable to `input.composition.qty`.
        // The tag's lbs accounting running through such a flow is instead its
        // `effectivePounds` attribute (spec.md §4.2), stamped there by the
        // builder before the lbs->gal `scale` call.
        let (same_unit, converted): (Vec<_>, Vec<_>) =
            outgoing.iter().partition(|f| f.composition.unit == input.composition.unit);

        let same_unit_qty: Amount = same_unit.iter().map(|f| &f.composition.qty).sum();
        let converted_qty: Amount = converted
            .iter()
            .map(|f| attribute_amount(&f.composition, EFFECTIVE_POUNDS))
            .fold(Amount::zero(), |a, b| &a + &b);
        let net = &same_unit_qty + &converted_qty;
        if net != input.composition.qty {
            violations.push(Violation::QuantityNotConserved {
                state_id: input.id,
                expected: input.composition.qty.clone(),
                actual: net,
            });
        }

        // Once a flow has crossed a unit boundary, every attribute but
        // `effectivePounds` was rescaled against the new unit's total rather
        // than conserved share-for-share, so the structural equality check
        // below no longer applies; quantity conservation above is the
        // conversion's own conservation rule.
        if converted.is_empty() {
            if !same_unit.is_empty() {
                let flow_compositions: Vec<_> = same_unit.iter().map(|f| f.composition.clone()).collect();
                match blend(&flow_compositions) {
                    Ok(reaggregated) if equals(&input.composition, &reaggregated) => {}
                    _ => violations.push(Violation::CompositionNotConserved { state_id: input.id }),
                }
            } else if !input.composition.qty.is_zero() {
                violations.push(Violation::CompositionNotConserved { state_id: input.id });
            }
        }
    }

    for output in outputs {
        let net: Amount = flows
            .iter()
            .filter(|f| f.to_state_id == output.id)
            .map(|f| &f.composition.qty)
            .sum();
        if net != output.composition.qty {
            violations.push(Violation::QuantityNotConserved {
                state_id: output.id,
                expected: output.composition.qty.clone(),
                actual: net,
            });
        }
    }

    let input_nominal: Amount = inputs.iter().map(|s| nominal_dollars(&s.composition)).fold(Amount::zero(), |a, b| &a + &b);
    let output_nominal: Amount = outputs.iter().map(|s| nominal_dollars(&s.composition)).fold(Amount::zero(), |a, b| &a + &b);
    if input_nominal != output_nominal {
        violations.push(Violation::NominalDollarsNotConserved {
            expected: input_nominal,
            actual: output_nominal,
        });
    }

    violations
}

/// `MULTIPLE_CURRENT_STATES`: the builder produces exactly one output
/// shell per distinct destination container (spec.md §4.2 step 1), so
/// this is a structural check on the built operation rather than a
/// further repository round-trip — two shells for the same container
/// would mean the commit is about to give that container two heads.
pub fn check_single_state_per_container(outputs: &[ContainerState]) -> Vec<Violation> {
    let mut seen = std::collections::BTreeSet::new();
    let mut violations = Vec::new();
    for output in outputs {
        if !seen.insert(output.container_id) {
            violations.push(Violation::MultipleCurrentStates { container_id: output.container_id });
        }
    }
    violations
}
