//! Largest-remainder apportionment: the single rounding rule every
//! composition operation (`distribute`, `scale`, `integer_split`) funnels
//! through so that totals always come out exact under integer arithmetic.
//!
//! Tie-break is fixed to ascending share index (spec does not otherwise
//! pin this down; see DESIGN.md).

use crate::error::CompositionError;
use num_bigint::{BigInt, Sign};
use num_traits::Zero;

/// floor(a / b) for arbitrary signs of a and b (rounds toward -infinity,
/// matching Python's `//` rather than Rust's truncating `/`).
pub(crate) fn floor_div(a: &BigInt, b: &BigInt) -> BigInt {
    let q = a / b;
    let r = a - &q * b;
    if !r.is_zero() && (r.sign() != b.sign()) {
        q - 1
    } else {
        q
    }
}

/// Apportion `total` across `weights` so the result sums exactly to
/// `total`, proportional to each weight, largest-remainder rounding.
///
/// `weights` may contain negative entries (a share's declared qty can be
/// negative per spec.md §4.2's gain/loss corrections); the only
/// requirement is that their sum is non-zero whenever `total` is non-zero.
pub(crate) fn apportion(total: &BigInt, weights: &[BigInt]) -> Result<Vec<BigInt>, CompositionError> {
    let n = weights.len();
    let sum_weights: BigInt = weights.iter().sum();

    if sum_weights.is_zero() {
        return if total.is_zero() {
            Ok(vec![BigInt::zero(); n])
        } else {
            Err(CompositionError::ZeroWeightSum)
        };
    }

    let mut floors = Vec::with_capacity(n);
    let mut remainders = Vec::with_capacity(n);
    for w in weights {
        let raw = total * w;
        let floor_i = floor_div(&raw, &sum_weights);
        let remainder_i = &raw - &floor_i * &sum_weights;
        floors.push(floor_i);
        remainders.push(remainder_i);
    }

    let allocated: BigInt = floors.iter().sum();
    let residual = total - allocated;
    if residual.is_zero() {
        return Ok(floors);
    }

    let sum_sign = if sum_weights.sign() == Sign::Minus {
        BigInt::from(-1)
    } else {
        BigInt::from(1)
    };

    // Rank shares by fraction-of-one, largest first; ties broken by
    // ascending original index. `remainder_i` always shares the sign of
    // `sum_weights` (or is zero) by construction of floor_div, so
    // multiplying by sum_sign normalizes "larger key => larger fraction"
    // regardless of whether sum_weights is positive or negative.
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| {
        let key_i = &remainders[i] * &sum_sign;
        let key_j = &remainders[j] * &sum_sign;
        key_j.cmp(&key_i).then(i.cmp(&j))
    });

    let bump: BigInt = if residual.sign() == Sign::Minus {
        BigInt::from(-1)
    } else {
        BigInt::from(1)
    };

    // |residual| is always < n: each term's fractional error is in
    // [0, 1), so the accumulated rounding error across n terms is below n.
    let mut residual_abs: BigInt = if residual.sign() == Sign::Minus {
        -&residual
    } else {
        residual.clone()
    };
    let one = BigInt::from(1);
    let mut idx = 0;
    while residual_abs > BigInt::zero() && idx < order.len() {
        let share = order[idx];
        floors[share] = &floors[share] + &bump;
        residual_abs -= &one;
        idx += 1;
    }

    Ok(floors)
}
