//! [`SourceControl`] backed by the `git` binary.

use super::failure_detail;
use crate::job::domain::BranchName;
use crate::pipeline::ports::{
    ChangedFiles, CloneUrls, Credential, SourceControl, SourceControlError, SourceControlResult,
};
use crate::sandbox::domain::{NetworkMode, ProcessOutput, SandboxCommand};
use crate::sandbox::ports::ProcessSupervisor;
use async_trait::async_trait;
use camino::Utf8Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const GIT_TIMEOUT: Duration = Duration::from_secs(600);
const TOKEN_VARIABLE: &str = "GAPFILL_GIT_TOKEN";
/// Credential helper answering `get` from the environment. The empty helper
/// before it clears any helper configured on the host.
const CREDENTIAL_HELPER: &str = concat!(
    "!f() { test \"$1\" = get || exit 0; ",
    "echo username=x-access-token; ",
    "echo \"password=$GAPFILL_GIT_TOKEN\"; }; f"
);

/// Runs `git` on the host for trusted repository operations.
///
/// Remotes are always addressed by their safe URL. The token reaches git
/// through an environment-scoped credential helper, so it never appears in
/// argv or in the clone's `.git/config`.
pub struct GitCli {
    supervisor: Arc<dyn ProcessSupervisor>,
    credential: Credential,
    author_name: String,
    author_email: String,
}

impl GitCli {
    /// Creates an adapter that scrubs `credential` from every diagnostic.
    #[must_use]
    pub fn new(supervisor: Arc<dyn ProcessSupervisor>, credential: Credential) -> Self {
        Self {
            supervisor,
            credential,
            author_name: "gapfill".to_owned(),
            author_email: "gapfill@users.noreply.github.com".to_owned(),
        }
    }

    /// Sets the commit author identity.
    #[must_use]
    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author_name = name.into();
        self.author_email = email.into();
        self
    }

    async fn git<I, S>(
        &self,
        operation: &str,
        repo: &Utf8Path,
        args: I,
    ) -> SourceControlResult<ProcessOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = self.authenticate(
            SandboxCommand::new("git", repo)
                .args(args)
                .env("GIT_TERMINAL_PROMPT", "0")
                .with_network(NetworkMode::Full)
                .with_timeout(GIT_TIMEOUT),
        );
        let output = self.supervisor.run(command).await?;
        if output.success() {
            debug!(operation, "git command succeeded");
            return Ok(output);
        }
        Err(SourceControlError::Failed {
            operation: operation.to_owned(),
            detail: self.credential.redact(&failure_detail(&output)),
        })
    }

    /// Attaches the credential helper and the token it reads.
    fn authenticate(&self, command: SandboxCommand) -> SandboxCommand {
        if self.credential.expose().is_empty() {
            return command;
        }
        command
            .env("GIT_CONFIG_COUNT", "2")
            .env("GIT_CONFIG_KEY_0", "credential.helper")
            .env("GIT_CONFIG_VALUE_0", "")
            .env("GIT_CONFIG_KEY_1", "credential.helper")
            .env("GIT_CONFIG_VALUE_1", CREDENTIAL_HELPER)
            .env(TOKEN_VARIABLE, self.credential.expose())
    }
}

impl std::fmt::Debug for GitCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCli")
            .field("credential", &self.credential)
            .field("author_name", &self.author_name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceControl for GitCli {
    #[instrument(skip_all, fields(url = %url, dest = %dest))]
    async fn clone_repository(&self, url: &CloneUrls, dest: &Utf8Path) -> SourceControlResult<()> {
        self.git(
            "clone",
            dest,
            ["clone", "--quiet", "--", url.safe(), "."],
        )
        .await?;
        Ok(())
    }

    async fn checkout_new_branch(
        &self,
        repo: &Utf8Path,
        branch: &BranchName,
    ) -> SourceControlResult<()> {
        self.git("checkout", repo, ["checkout", "--quiet", "-B", branch.as_str()])
            .await?;
        Ok(())
    }

    async fn commit_all(&self, repo: &Utf8Path, message: &str) -> SourceControlResult<()> {
        self.git("add", repo, ["add", "--all"]).await?;
        let name = format!("user.name={}", self.author_name);
        let email = format!("user.email={}", self.author_email);
        self.git(
            "commit",
            repo,
            ["-c", name.as_str(), "-c", email.as_str(), "commit", "--quiet", "-m", message],
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(branch = %branch, remote = %remote))]
    async fn push(
        &self,
        repo: &Utf8Path,
        branch: &BranchName,
        remote: &CloneUrls,
    ) -> SourceControlResult<()> {
        let refspec = format!("HEAD:refs/heads/{branch}");
        self.git(
            "push",
            repo,
            ["push", "--force", "--quiet", remote.safe(), refspec.as_str()],
        )
        .await?;
        Ok(())
    }

    async fn changed_files(&self, repo: &Utf8Path) -> SourceControlResult<ChangedFiles> {
        let output = self
            .git(
                "status",
                repo,
                ["status", "--porcelain=v1", "--untracked-files=all", "-z"],
            )
            .await?;
        Ok(parse_porcelain(&output.stdout))
    }
}

/// Parses `git status --porcelain=v1 -z` output.
fn parse_porcelain(stdout: &str) -> ChangedFiles {
    let mut changed = ChangedFiles::default();
    let mut entries = stdout.split('\0').filter(|entry| !entry.is_empty());
    while let Some(entry) = entries.next() {
        let (Some(code), Some(path)) = (entry.get(..2), entry.get(3..)) else {
            continue;
        };
        match code {
            "??" => changed.created.push(path.to_owned()),
            _ if code.contains('D') => {}
            _ => changed.modified.push(path.to_owned()),
        }
        // Renames and copies carry the source path as a second field.
        if code.starts_with('R') || code.starts_with('C') {
            entries.next();
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::parse_porcelain;
    use rstest::rstest;

    #[rstest]
    fn porcelain_output_splits_created_from_modified() {
        let stdout = "?? src/a.test.ts\0 M src/a.ts\0R  src/new.ts\0src/old.ts\0 D gone.ts\0";
        let changed = parse_porcelain(stdout);
        assert_eq!(changed.created, vec!["src/a.test.ts".to_owned()]);
        assert_eq!(
            changed.modified,
            vec!["src/a.ts".to_owned(), "src/new.ts".to_owned()]
        );
    }

    #[rstest]
    fn clean_tree_has_no_changes() {
        assert!(parse_porcelain("").is_empty());
    }
}
