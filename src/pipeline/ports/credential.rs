//! Secret handling for hosting credentials.

use std::fmt;

const REDACTED: &str = "***";

/// Hosting access token.
///
/// `Debug` never prints the token. Use [`Credential::redact`] before any
/// text that might contain it reaches a log line or the job record.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wraps a token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token for adapters that must send it.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Replaces every occurrence of the token in `text`.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        if self.0.is_empty() {
            return text.to_owned();
        }
        text.replace(&self.0, REDACTED)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({REDACTED})")
    }
}

/// Clone URL pair: a credential-bearing form and a safe form.
///
/// The safe form is what git is pointed at and what logs show. The
/// credential-bearing form exists for clients that can only take the token
/// in the URL; [`GitCli`](crate::pipeline::adapters::GitCli) never uses it.
#[derive(Clone, PartialEq, Eq)]
pub struct CloneUrls {
    authenticated: String,
    safe: String,
}

impl CloneUrls {
    /// Creates a URL pair.
    #[must_use]
    pub fn new(authenticated: impl Into<String>, safe: impl Into<String>) -> Self {
        Self {
            authenticated: authenticated.into(),
            safe: safe.into(),
        }
    }

    /// Builds the pair for an `https` URL, embedding `credential` as the
    /// `x-access-token` user in the authenticated form.
    #[must_use]
    pub fn https_with_token(safe: &str, credential: &Credential) -> Self {
        let authenticated = safe.strip_prefix("https://").map_or_else(
            || safe.to_owned(),
            |rest| format!("https://x-access-token:{}@{rest}", credential.expose()),
        );
        Self::new(authenticated, safe)
    }

    /// Returns the URL with the token embedded. Never log or persist this.
    #[must_use]
    pub fn authenticated(&self) -> &str {
        &self.authenticated
    }

    /// Returns the loggable URL.
    #[must_use]
    pub fn safe(&self) -> &str {
        &self.safe
    }
}

impl fmt::Debug for CloneUrls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloneUrls").field("safe", &self.safe).finish_non_exhaustive()
    }
}

impl fmt::Display for CloneUrls {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.safe)
    }
}
