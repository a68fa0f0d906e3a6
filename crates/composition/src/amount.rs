//! Arbitrary-precision signed quantity used throughout the ledger.
//!
//! One h-unit is 1/10,000 of a gallon (or of a pound for weigh tags);
//! monetary amounts are integer cents-equivalents. Nothing here ever
//! touches a float.

use num_bigint::BigInt;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(BigInt);

impl Amount {
    pub fn zero() -> Self {
        Amount(BigInt::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.sign() == num_bigint::Sign::Minus
    }

    /// -1, 0, or 1.
    pub fn signum(&self) -> i32 {
        match self.0.sign() {
            num_bigint::Sign::Minus => -1,
            num_bigint::Sign::NoSign => 0,
            num_bigint::Sign::Plus => 1,
        }
    }

    pub(crate) fn as_bigint(&self) -> &BigInt {
        &self.0
    }

    pub(crate) fn from_bigint(v: BigInt) -> Self {
        Amount(v)
    }
}

impl From<i64> for Amount {
    fn from(v: i64) -> Self {
        Amount(BigInt::from(v))
    }
}

impl From<i128> for Amount {
    fn from(v: i128) -> Self {
        Amount(BigInt::from(v))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for &Amount {
    type Output = Amount;
    fn add(self, rhs: &Amount) -> Amount {
        Amount(&self.0 + &rhs.0)
    }
}

impl Sub for &Amount {
    type Output = Amount;
    fn sub(self, rhs: &Amount) -> Amount {
        Amount(&self.0 - &rhs.0)
    }
}

impl Neg for &Amount {
    type Output = Amount;
    fn neg(self) -> Amount {
        Amount(-&self.0)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.fold(Amount::zero(), |acc, x| &acc + x)
    }
}
