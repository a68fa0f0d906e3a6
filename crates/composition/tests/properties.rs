//! Property tests for the quantified invariants spec.md §8 names:
//! residual-exactness and idempotent re-aggregation of `distribute`, and
//! the sum-exactness of `integer_split`.

use cellar_composition::{blend, distribute, integer_split, Accepts, Amount, Composition, Share, Unit};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn composition_with_varietal(qty: i64, varietal: i64) -> Composition {
    let mut attributes = BTreeMap::new();
    attributes.insert(
        "varietal".to_string(),
        cellar_composition::AttributeValue::Nested(BTreeMap::from([("CHARD".to_string(), Amount::from(varietal))])),
    );
    Composition {
        qty: Amount::from(qty),
        unit: Unit::Gal,
        attributes,
    }
}

proptest! {
    /// `Σ shares[i].A = source.A` for every attribute A, for arbitrary
    /// non-negative splits of the total qty into two shares.
    #[test]
    fn distribute_is_residual_exact(qty in 0i64..100_000, split in 0.0f64..1.0) {
        let first = ((qty as f64) * split) as i64;
        let second = qty - first;
        let source = composition_with_varietal(qty, qty);

        let shares = vec![
            Share { qty: Amount::from(first), accepts: Accepts::ALL },
            Share { qty: Amount::from(second), accepts: Accepts::ALL },
        ];
        let out = distribute(&source, &shares).unwrap();

        let total_varietal: Amount = out
            .iter()
            .map(|c| match &c.attributes.get("varietal") {
                Some(cellar_composition::AttributeValue::Nested(m)) => m.get("CHARD").cloned().unwrap_or_else(Amount::zero),
                _ => Amount::zero(),
            })
            .fold(Amount::zero(), |acc, v| &acc + &v);

        prop_assert_eq!(total_varietal, Amount::from(qty));
    }

    /// `blend(distribute(c, shares)) = c` whenever `Σshares.qty = c.qty`.
    #[test]
    fn distribute_is_idempotent_under_reaggregation(qty in 0i64..100_000, split in 0.0f64..1.0) {
        let first = ((qty as f64) * split) as i64;
        let second = qty - first;
        let source = composition_with_varietal(qty, qty);

        let shares = vec![
            Share { qty: Amount::from(first), accepts: Accepts::ALL },
            Share { qty: Amount::from(second), accepts: Accepts::ALL },
        ];
        let out = distribute(&source, &shares).unwrap();
        let reaggregated = blend(&out).unwrap();

        prop_assert!(cellar_composition::equals(&source, &reaggregated));
    }

    /// `integer_split(T, w)` sums exactly to `T` for any weight vector with
    /// a non-zero sum.
    #[test]
    fn integer_split_sums_to_total(total in 0i64..1_000_000, a in 1i64..1000, b in 1i64..1000, c in 1i64..1000) {
        let weights = vec![Amount::from(a), Amount::from(b), Amount::from(c)];
        let out = integer_split(&Amount::from(total), &weights).unwrap();
        let sum: Amount = out.iter().fold(Amount::zero(), |acc, v| &acc + v);
        prop_assert_eq!(sum, Amount::from(total));
    }
}
