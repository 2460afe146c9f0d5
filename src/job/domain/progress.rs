//! Bounded progress percentage.

use super::JobDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer completion percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Progress(u8);

impl Progress {
    /// No work done yet.
    pub const ZERO: Self = Self(0);

    /// Pipeline finished.
    pub const COMPLETE: Self = Self(100);

    /// Creates a validated progress value.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidProgress`] when `value > 100`.
    pub fn new(value: u16) -> Result<Self, JobDomainError> {
        u8::try_from(value)
            .ok()
            .filter(|percent| *percent <= 100)
            .map(Self)
            .ok_or(JobDomainError::InvalidProgress(value))
    }

    /// Creates a progress value, capping anything above 100.
    #[must_use]
    pub const fn saturating(value: u8) -> Self {
        if value > 100 {
            Self::COMPLETE
        } else {
            Self(value)
        }
    }

    /// Returns the percentage.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<u16> for Progress {
    type Error = JobDomainError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Progress> for u16 {
    fn from(progress: Progress) -> Self {
        Self::from(progress.0)
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}
