//! Rational number type for time bases, frame rates and aspect ratios.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::Mul;
use std::str::FromStr;

/// A rational number represented as a numerator and denominator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    /// Numerator
    pub num: i64,
    /// Denominator (positive)
    pub den: i64,
}

impl Rational {
    /// Create a new rational number.
    ///
    /// # Panics
    ///
    /// Panics if denominator is zero.
    pub fn new(num: i64, den: i64) -> Self {
        assert!(den != 0, "Denominator cannot be zero");
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        Self { num, den }
    }

    /// Fallible constructor for values read from configuration.
    pub fn try_new(num: i64, den: i64) -> Result<Self> {
        if den == 0 {
            return Err(Error::invalid_param(format!("{}/0 has a zero denominator", num)));
        }
        Ok(Self::new(num, den))
    }

    /// Create a rational from an integer.
    pub fn from_int(n: i64) -> Self {
        Self { num: n, den: 1 }
    }

    /// Create a zero rational.
    pub const fn zero() -> Self {
        Self { num: 0, den: 1 }
    }

    /// Reduce the rational to its simplest form.
    pub fn reduce(&self) -> Self {
        if self.num == 0 {
            return Self::zero();
        }
        let g = gcd(self.num.unsigned_abs(), self.den.unsigned_abs()) as i64;
        Self {
            num: self.num / g,
            den: self.den / g,
        }
    }

    /// Convert to f64.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Rescale a value from this time base to another, rounding to nearest.
    ///
    /// Ties round away from zero. A zero target yields zero.
    pub fn rescale(&self, value: i64, target: Rational) -> i64 {
        let num = value as i128 * self.num as i128 * target.den as i128;
        let den = self.den as i128 * target.num as i128;
        if den == 0 {
            return 0;
        }
        let half = den.abs() / 2;
        let rounded = if (num >= 0) == (den > 0) {
            (num.abs() + half) / den.abs()
        } else {
            -((num.abs() + half) / den.abs())
        };
        rounded as i64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rational({}/{})", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl FromStr for Rational {
    type Err = Error;

    /// Parses `num/den`, `num:den` or a plain integer.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let parse = |part: &str| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| Error::invalid_param(format!("'{}' is not a rational", s)))
        };
        match s.split_once(['/', ':']) {
            Some((num, den)) => Self::try_new(parse(num)?, parse(den)?),
            None => Ok(Self::from_int(parse(s)?)),
        }
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.num as i128 * other.den as i128;
        let rhs = other.num as i128 * self.den as i128;
        lhs.cmp(&rhs)
    }
}

impl Mul for Rational {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Self::new(self.num * rhs.num, self.den * rhs.den).reduce()
    }
}

impl From<(i64, i64)> for Rational {
    fn from((num, den): (i64, i64)) -> Self {
        Self::new(num, den)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rational_negative_den() {
        let r = Rational::new(1, -2);
        assert_eq!(r.num, -1);
        assert_eq!(r.den, 2);
    }

    #[test]
    fn test_rational_reduce() {
        assert_eq!(Rational::new(4, 8).reduce(), Rational::new(1, 2));
    }

    #[test]
    fn test_rescale_rounds_to_nearest() {
        let ms = Rational::new(1, 1000);
        let mpeg = Rational::new(1, 90000);
        assert_eq!(ms.rescale(1, mpeg), 90);
        // 3003 / 90000 s at 1/25 is 0.834 frames
        assert_eq!(mpeg.rescale(3003, Rational::new(1, 25)), 1);
        assert_eq!(mpeg.rescale(1800, Rational::new(1, 25)), 1);
        assert_eq!(mpeg.rescale(-1800, Rational::new(1, 25)), -1);
        assert_eq!(mpeg.rescale(1799, Rational::new(1, 25)), 0);
    }

    #[test]
    fn test_rescale_zero_target() {
        assert_eq!(Rational::new(1, 25).rescale(10, Rational::zero()), 0);
    }

    #[test]
    fn test_from_str() {
        assert_eq!("30000/1001".parse::<Rational>().unwrap(), Rational::new(30000, 1001));
        assert_eq!("16:9".parse::<Rational>().unwrap(), Rational::new(16, 9));
        assert_eq!("25".parse::<Rational>().unwrap(), Rational::from_int(25));
        assert!("1/0".parse::<Rational>().is_err());
        assert!("fast".parse::<Rational>().is_err());
    }

    #[test]
    fn test_rational_ord() {
        assert!(Rational::new(1, 2) > Rational::new(1, 3));
    }
}
