//! Time base handling.

use crate::rational::Rational;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value representing an undefined timestamp.
pub const NO_PTS: i64 = i64::MIN;

/// A time base for converting between timestamp units.
///
/// Frames travel through the graph alongside their time base. Sources emit
/// in [`TimeBase::MPEG`]; encoders work in their own codec time base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeBase(pub Rational);

impl TimeBase {
    /// Create a new time base from numerator and denominator.
    pub fn new(num: i64, den: i64) -> Self {
        Self(Rational::new(num, den))
    }

    /// Standard MPEG time base (1/90000).
    pub const MPEG: Self = Self(Rational { num: 1, den: 90000 });

    /// One tick per audio sample.
    pub fn from_sample_rate(sample_rate: u32) -> Self {
        Self(Rational::new(1, i64::from(sample_rate.max(1))))
    }

    /// Convert a timestamp from this time base to another.
    ///
    /// Undefined timestamps stay undefined.
    pub fn convert(&self, value: i64, target: TimeBase) -> i64 {
        if value == NO_PTS {
            return NO_PTS;
        }
        self.0.rescale(value, target.0)
    }

    /// Convert to seconds as f64.
    pub fn to_seconds(&self, value: i64) -> f64 {
        value as f64 * self.0.to_f64()
    }

    /// Get the time base as a rational.
    pub fn as_rational(&self) -> Rational {
        self.0
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::MPEG
    }
}

impl From<Rational> for TimeBase {
    fn from(r: Rational) -> Self {
        Self(r)
    }
}

impl fmt::Display for TimeBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ticks of `time_base` covered by `nb_samples` at `sample_rate`.
pub fn samples_to_ticks(nb_samples: usize, sample_rate: u32, time_base: TimeBase) -> i64 {
    TimeBase::from_sample_rate(sample_rate).convert(nb_samples as i64, time_base)
}
