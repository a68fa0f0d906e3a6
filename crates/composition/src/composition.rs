//! `QuantifiedComposition` and the five operations over it: `distribute`,
//! `blend`, `scale`, `equals`, `integer_split`.

use crate::amount::Amount;
use crate::error::CompositionError;
use crate::remainder::{apportion, floor_div};
use num_bigint::{BigInt, Sign};
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Physical unit a composition is denominated in. `$` only ever appears on
/// bare dollar compositions (never mixed with `gal`/`lbs` flows in one
/// `blend`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "gal")]
    Gal,
    #[serde(rename = "lbs")]
    Lbs,
    #[serde(rename = "$")]
    Usd,
}

/// An attribute is either a plain scalar or a mapping from sub-name
/// (varietal, lot, ...) to scalar. No deeper nesting is modelled; the
/// source data never needs it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Scalar(Amount),
    Nested(BTreeMap<String, Amount>),
}

/// Which conservation policy an attribute follows (spec.md §3,
/// "Attributes taxonomy"). Only the two named dollar attributes are
/// anything other than physical; everything else (varietal breakdowns,
/// lot numbers, `effectivePounds`, ...) rides along with the qty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributePolicy {
    Physical,
    Cost,
    Value,
}

/// The press sub-builder stamps this attribute onto a weigh tag's
/// consumed composition so the original pound mass survives the lbs->gal
/// `scale` call untouched (spec.md §4.2); `scale` special-cases it by
/// name rather than by a policy, since it is metadata about the
/// conversion, not a conserved share of either unit's total.
pub const EFFECTIVE_POUNDS: &str = "effectivePounds";

pub fn attribute_policy(name: &str) -> AttributePolicy {
    match name {
        "realDollars" => AttributePolicy::Cost,
        "nominalDollars" => AttributePolicy::Value,
        _ => AttributePolicy::Physical,
    }
}

/// Which attribute policies a destination share accepts. Derived by the
/// builder from the destination container's type (loss skips value, gain
/// skips cost); the composition algebra itself has no notion of container
/// types, only of these three flags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Accepts {
    pub physical: bool,
    pub cost: bool,
    pub value: bool,
}

impl Accepts {
    pub const ALL: Accepts = Accepts {
        physical: true,
        cost: true,
        value: true,
    };

    pub fn allows(&self, policy: AttributePolicy) -> bool {
        match policy {
            AttributePolicy::Physical => self.physical,
            AttributePolicy::Cost => self.cost,
            AttributePolicy::Value => self.value,
        }
    }
}

/// One recipient in a `distribute` call: its declared qty (the degenerate
/// allocation for the primary quantity) and which attribute policies it
/// accepts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Share {
    pub qty: Amount,
    pub accepts: Accepts,
}

/// qty + unit + extensible attributes. The value object embedded in every
/// `ContainerState` and `FlowEdge`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Composition {
    pub qty: Amount,
    pub unit: Unit,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Composition {
    pub fn empty(unit: Unit) -> Self {
        Composition {
            qty: Amount::zero(),
            unit,
            attributes: BTreeMap::new(),
        }
    }
}

/// Partition `source` across `shares`, proportionally allocating every
/// attribute (and sub-attribute) to the shares that accept its policy,
/// largest-remainder, ties broken by ascending share index. `Σshares.qty`
/// must equal `source.qty` exactly.
pub fn distribute(source: &Composition, shares: &[Share]) -> Result<Vec<Composition>, CompositionError> {
    let declared_total: Amount = shares.iter().map(|s| &s.qty).sum();
    if declared_total != source.qty {
        return Err(CompositionError::InconsistentShares);
    }

    let mut outputs: Vec<Composition> = shares
        .iter()
        .map(|s| Composition {
            qty: s.qty.clone(),
            unit: source.unit,
            attributes: BTreeMap::new(),
        })
        .collect();

    for (name, value) in &source.attributes {
        let policy = attribute_policy(name);
        let accepting: Vec<usize> = shares
            .iter()
            .enumerate()
            .filter(|(_, s)| s.accepts.allows(policy))
            .map(|(i, _)| i)
            .collect();
        if accepting.is_empty() {
            continue;
        }

        match value {
            AttributeValue::Scalar(amount) => {
                let weights: Vec<BigInt> = accepting.iter().map(|&i| shares[i].qty.as_bigint().clone()).collect();
                if weights.iter().sum::<BigInt>().is_zero() {
                    continue;
                }
                let parts = apportion(amount.as_bigint(), &weights)?;
                for (k, &i) in accepting.iter().enumerate() {
                    outputs[i]
                        .attributes
                        .insert(name.clone(), AttributeValue::Scalar(Amount::from_bigint(parts[k].clone())));
                }
            }
            AttributeValue::Nested(sub) => {
                for (sub_name, sub_amount) in sub {
                    let weights: Vec<BigInt> =
                        accepting.iter().map(|&i| shares[i].qty.as_bigint().clone()).collect();
                    if weights.iter().sum::<BigInt>().is_zero() {
                        continue;
                    }
                    let parts = apportion(sub_amount.as_bigint(), &weights)?;
                    for (k, &i) in accepting.iter().enumerate() {
                        let entry = outputs[i]
                            .attributes
                            .entry(name.clone())
                            .or_insert_with(|| AttributeValue::Nested(BTreeMap::new()));
                        if let AttributeValue::Nested(map) = entry {
                            map.insert(sub_name.clone(), Amount::from_bigint(parts[k].clone()));
                        }
                    }
                }
            }
        }
    }

    Ok(outputs)
}

/// Elementwise sum of qty and every (sub-)attribute across `flows`; unit is
/// the first flow's, and all flows must agree on it. Missing keys count as
/// zero on either side.
pub fn blend(flows: &[Composition]) -> Result<Composition, CompositionError> {
    let first = flows.first().ok_or(CompositionError::EmptyBlend)?;
    let unit = first.unit;
    if flows.iter().any(|f| f.unit != unit) {
        return Err(CompositionError::UnitMismatch);
    }

    let qty: Amount = flows.iter().map(|f| &f.qty).sum();
    let mut attributes: BTreeMap<String, AttributeValue> = BTreeMap::new();

    for flow in flows {
        for (name, value) in &flow.attributes {
            match value {
                AttributeValue::Scalar(amount) => {
                    let entry = attributes
                        .entry(name.clone())
                        .or_insert_with(|| AttributeValue::Scalar(Amount::zero()));
                    if let AttributeValue::Scalar(acc) = entry {
                        *acc = &*acc + amount;
                    }
                }
                AttributeValue::Nested(sub) => {
                    let entry = attributes
                        .entry(name.clone())
                        .or_insert_with(|| AttributeValue::Nested(BTreeMap::new()));
                    if let AttributeValue::Nested(acc_map) = entry {
                        for (sub_name, amount) in sub {
                            let e = acc_map.entry(sub_name.clone()).or_insert_with(Amount::zero);
                            *e = &*e + amount;
                        }
                    }
                }
            }
        }
    }

    Ok(Composition { qty, unit, attributes })
}

/// Rescale every attribute of `source` by `target_qty / source.qty`,
/// largest-remainder, so that a nested attribute's sub-amounts still sum
/// exactly to `target_qty` after scaling. Used by the press sub-builder to
/// convert a weigh tag's pound composition into the gallon composition of
/// the juice it produced.
///
/// `source.qty == 0` degenerates to an all-zero result at `target_qty`:
/// there is nothing to proportion.
pub fn scale(source: &Composition, target_qty: Amount, target_unit: Unit) -> Composition {
    let mut attributes = BTreeMap::new();

    if source.qty.is_zero() {
        for (name, value) in &source.attributes {
            let zeroed = match value {
                AttributeValue::Scalar(_) => AttributeValue::Scalar(Amount::zero()),
                AttributeValue::Nested(map) => {
                    AttributeValue::Nested(map.keys().map(|k| (k.clone(), Amount::zero())).collect())
                }
            };
            attributes.insert(name.clone(), zeroed);
        }
        return Composition {
            qty: target_qty,
            unit: target_unit,
            attributes,
        };
    }

    for (name, value) in &source.attributes {
        match value {
            AttributeValue::Scalar(amount) if name == EFFECTIVE_POUNDS => {
                attributes.insert(name.clone(), AttributeValue::Scalar(amount.clone()));
            }
            AttributeValue::Scalar(amount) => {
                let scaled = scale_scalar(amount.as_bigint(), target_qty.as_bigint(), source.qty.as_bigint());
                attributes.insert(name.clone(), AttributeValue::Scalar(Amount::from_bigint(scaled)));
            }
            AttributeValue::Nested(map) => {
                let keys: Vec<&String> = map.keys().collect();
                let weights: Vec<BigInt> = keys.iter().map(|k| map[*k].as_bigint().clone()).collect();
                // `keys` sum to source.qty by the model's own invariant, so
                // this never hits the zero-weight-sum branch.
                let parts = apportion(target_qty.as_bigint(), &weights)
                    .unwrap_or_else(|_| vec![BigInt::zero(); keys.len()]);
                let mut scaled_map = BTreeMap::new();
                for (k, p) in keys.into_iter().zip(parts) {
                    scaled_map.insert(k.clone(), Amount::from_bigint(p));
                }
                attributes.insert(name.clone(), AttributeValue::Nested(scaled_map));
            }
        }
    }

    Composition {
        qty: target_qty,
        unit: target_unit,
        attributes,
    }
}

/// Round `t * target / source` to the nearest integer (ties away from
/// zero). A lone scalar has no sibling share to hand a largest-remainder
/// residual to, so the multi-share apportionment collapses to ordinary
/// rounding here.
fn scale_scalar(t: &BigInt, target: &BigInt, source: &BigInt) -> BigInt {
    let raw = t * target;
    let q = floor_div(&raw, source);
    let r = &raw - &q * source;
    if r.is_zero() {
        return q;
    }
    let doubled = &r * BigInt::from(2);
    let abs_doubled = if doubled.sign() == Sign::Minus { -&doubled } else { doubled.clone() };
    let abs_source = if source.sign() == Sign::Minus { -source.clone() } else { source.clone() };
    if abs_doubled >= abs_source {
        if r.sign() == source.sign() {
            q + 1
        } else {
            q - 1
        }
    } else {
        q
    }
}

/// Strict structural equality of qty, unit, and every (sub-)attribute.
/// An attribute missing on one side is treated as zero, matching the way
/// `blend` omits zero-sum attributes rather than materializing them.
pub fn equals(a: &Composition, b: &Composition) -> bool {
    if a.qty != b.qty || a.unit != b.unit {
        return false;
    }
    let names: BTreeSet<&String> = a.attributes.keys().chain(b.attributes.keys()).collect();
    names.into_iter().all(|name| attribute_eq(a.attributes.get(name), b.attributes.get(name)))
}

fn attribute_eq(a: Option<&AttributeValue>, b: Option<&AttributeValue>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(AttributeValue::Scalar(x)), None) | (None, Some(AttributeValue::Scalar(x))) => x.is_zero(),
        (Some(AttributeValue::Nested(m)), None) | (None, Some(AttributeValue::Nested(m))) => {
            m.values().all(|v| v.is_zero())
        }
        (Some(AttributeValue::Scalar(x)), Some(AttributeValue::Scalar(y))) => x == y,
        (Some(AttributeValue::Nested(m1)), Some(AttributeValue::Nested(m2))) => {
            let keys: BTreeSet<&String> = m1.keys().chain(m2.keys()).collect();
            keys.into_iter().all(|k| {
                let zero = Amount::zero();
                m1.get(k).unwrap_or(&zero) == m2.get(k).unwrap_or(&zero)
            })
        }
        _ => false,
    }
}

/// Standalone largest-remainder apportionment: `amounts` sum exactly to
/// `total`, proportional to `weights`.
pub fn integer_split(total: &Amount, weights: &[Amount]) -> Result<Vec<Amount>, CompositionError> {
    let w: Vec<BigInt> = weights.iter().map(|a| a.as_bigint().clone()).collect();
    let parts = apportion(total.as_bigint(), &w)?;
    Ok(parts.into_iter().map(Amount::from_bigint).collect())
}
