//! Branch-name value object for job branch linkage.

use super::{JobDomainError, TargetPath};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Maximum length for a validated branch name.
const MAX_BRANCH_NAME_LENGTH: usize = 200;

/// Namespace prefix for synthesized branches.
const BRANCH_PREFIX: &str = "gapfill/coverage";

/// Maximum length of the path slug inside a synthesized branch name.
const MAX_SLUG_LENGTH: usize = 48;

/// Validated Git branch name.
///
/// Branch names must be non-empty after trimming, must not contain
/// whitespace, colons, `..`, or other characters rejected by
/// `git-check-ref-format`, and must not exceed `MAX_BRANCH_NAME_LENGTH`
/// characters.
///
/// # Examples
///
///     use gapfill::job::domain::BranchName;
///
///     let name = BranchName::new("gapfill/coverage-src-app-ts").expect("valid");
///     assert_eq!(name.as_str(), "gapfill/coverage-src-app-ts");
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchName(String);

impl BranchName {
    /// Creates a validated branch name.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidBranchName`] when the value is empty,
    /// contains a forbidden character sequence, or exceeds the length limit.
    pub fn new(value: impl Into<String>) -> Result<Self, JobDomainError> {
        let raw = value.into();
        let normalized = raw.trim();

        if Self::is_invalid_branch_name(normalized) {
            return Err(JobDomainError::InvalidBranchName(raw));
        }

        Ok(Self(normalized.to_owned()))
    }

    /// Synthesizes the branch for a job targeting `path`, started at `at`.
    ///
    /// The result depends only on its inputs: a readable slug of the path,
    /// a short digest of the full path (so long paths that share a
    /// truncated slug still differ), and a second-resolution timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`JobDomainError::InvalidBranchName`] if the synthesized name
    /// fails validation.
    pub fn synthesize(path: &TargetPath, at: DateTime<Utc>) -> Result<Self, JobDomainError> {
        let slug = slugify(path.as_str(), MAX_SLUG_LENGTH);
        let digest = Sha256::digest(path.as_str().as_bytes());
        let short_digest: String = digest
            .iter()
            .take(4)
            .map(|byte| format!("{byte:02x}"))
            .collect();
        let stamp = at.format("%Y%m%d%H%M%S");
        let name = if slug.is_empty() {
            format!("{BRANCH_PREFIX}-{short_digest}-{stamp}")
        } else {
            format!("{BRANCH_PREFIX}-{slug}-{short_digest}-{stamp}")
        };
        Self::new(name)
    }

    /// Validates branch name constraints.
    fn is_invalid_branch_name(name: &str) -> bool {
        let is_empty = name.is_empty();
        let contains_forbidden_char = name
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control() || "~^:?*[\\".contains(ch));
        let contains_forbidden_sequence = name.contains("..")
            || name.contains("@{")
            || name.starts_with('/')
            || name.ends_with('/')
            || name.ends_with(".lock");
        let exceeds_length_limit = name.len() > MAX_BRANCH_NAME_LENGTH;

        is_empty || contains_forbidden_char || contains_forbidden_sequence || exceeds_length_limit
    }

    /// Returns the branch name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lower-cases `value`, collapses every non-alphanumeric run to a single
/// `-`, and truncates to `max_len` characters without a trailing dash.
fn slugify(value: &str, max_len: usize) -> String {
    let dashed: String = value
        .to_ascii_lowercase()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '-' })
        .collect();
    let collapsed = dashed
        .split('-')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    collapsed
        .chars()
        .take(max_len)
        .collect::<String>()
        .trim_end_matches('-')
        .to_owned()
}
