//! Coverage measurements captured mid-pipeline.

use super::JobDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound of the basis-point scale (100.00%).
const MAX_BASIS_POINTS: u16 = 10_000;

/// Line-coverage percentage stored as basis points (hundredths of a percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct CoveragePercent(u16);

impl CoveragePercent {
    /// Creates a coverage value from basis points.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidCoverage`] when the value exceeds
    /// 10000.
    pub fn from_basis_points(value: u16) -> Result<Self, JobDomainError> {
        if value > MAX_BASIS_POINTS {
            return Err(JobDomainError::InvalidCoverage(value.to_string()));
        }
        Ok(Self(value))
    }

    /// Creates a coverage value from a percentage such as `83.37`.
    ///
    /// The value is rounded to the nearest hundredth.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidCoverage`] when the value is not
    /// finite or lies outside `0.0..=100.0`.
    #[expect(
        clippy::float_arithmetic,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "coverage tools report floats; the value is range-checked to 0..=10000 before the cast"
    )]
    pub fn from_percent(percent: f64) -> Result<Self, JobDomainError> {
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(JobDomainError::InvalidCoverage(percent.to_string()));
        }
        let basis_points = (percent * 100.0).round() as u16;
        Self::from_basis_points(basis_points)
    }

    /// Returns the value in basis points.
    #[must_use]
    pub const fn basis_points(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for CoveragePercent {
    type Error = JobDomainError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::from_basis_points(value)
    }
}

impl From<CoveragePercent> for u16 {
    fn from(coverage: CoveragePercent) -> Self {
        coverage.0
    }
}

impl fmt::Display for CoveragePercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0.div_euclid(100);
        let fraction = self.0.rem_euclid(100);
        write!(f, "{whole}.{fraction:02}%")
    }
}

/// Before/after coverage for the job's target file.
///
/// Either side stays `None` when its best-effort measurement failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSnapshot {
    /// Baseline coverage measured before generation.
    pub before: Option<CoveragePercent>,
    /// Coverage measured after generation.
    pub after: Option<CoveragePercent>,
}

impl CoverageSnapshot {
    /// Returns the improvement in basis points when both sides are known.
    #[must_use]
    pub fn delta_basis_points(&self) -> Option<i32> {
        match (self.before, self.after) {
            (Some(before), Some(after)) => {
                Some(i32::from(after.basis_points()) - i32::from(before.basis_points()))
            }
            _ => None,
        }
    }
}
