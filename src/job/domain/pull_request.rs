//! Pull-request value object for job linkage.

use super::JobDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length accepted for a stored pull request URL.
const MAX_URL_LENGTH: usize = 2048;

/// Validated web URL of the pull request opened for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PullRequestUrl(String);

impl PullRequestUrl {
    /// Creates a validated pull request URL.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidPullRequestUrl`] unless the value is
    /// an `http` or `https` URL without whitespace or embedded credentials.
    pub fn new(value: impl Into<String>) -> Result<Self, JobDomainError> {
        let raw = value.into();
        let normalized = raw.trim();
        let remainder = normalized
            .strip_prefix("https://")
            .or_else(|| normalized.strip_prefix("http://"));
        let is_valid = remainder.is_some_and(|rest| {
            let authority = rest.split('/').next().unwrap_or_default();
            !authority.is_empty() && !authority.contains('@')
        }) && !normalized.chars().any(char::is_whitespace)
            && normalized.len() <= MAX_URL_LENGTH;

        if !is_valid {
            return Err(JobDomainError::InvalidPullRequestUrl(raw));
        }

        Ok(Self(normalized.to_owned()))
    }

    /// Returns the URL as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PullRequestUrl {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for PullRequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
