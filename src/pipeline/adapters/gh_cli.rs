//! [`HostingApi`] backed by the GitHub `gh` CLI.

use super::failure_detail;
use crate::job::domain::{PullRequestUrl, RepositoryId};
use crate::pipeline::ports::{
    CloneUrls, CreatedPullRequest, Credential, HostingApi, HostingError, HostingResult,
    PullRequestDraft, RepositoryInfo,
};
use crate::sandbox::domain::{NetworkMode, ProcessOutput, SandboxCommand};
use crate::sandbox::ports::ProcessSupervisor;
use async_trait::async_trait;
use camino::Utf8PathBuf;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const GH_TIMEOUT: Duration = Duration::from_secs(120);
const NOT_FOUND_MARKER: &str = "Could not resolve to a Repository";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoView {
    url: String,
    default_branch_ref: BranchRef,
}

#[derive(Debug, Deserialize)]
struct BranchRef {
    name: String,
}

/// Talks to GitHub through `gh`, authenticating with `GH_TOKEN`.
pub struct GhCli {
    supervisor: Arc<dyn ProcessSupervisor>,
    credential: Credential,
    web_base: String,
    work_dir: Utf8PathBuf,
}

impl GhCli {
    /// Creates an adapter running `gh` from `work_dir`.
    #[must_use]
    pub fn new(
        supervisor: Arc<dyn ProcessSupervisor>,
        credential: Credential,
        work_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            supervisor,
            credential,
            web_base: "https://github.com".to_owned(),
            work_dir: work_dir.into(),
        }
    }

    /// Sets the web base URL used to build clone URLs, for GitHub
    /// Enterprise hosts.
    #[must_use]
    pub fn with_web_base(mut self, web_base: impl Into<String>) -> Self {
        self.web_base = web_base.into().trim_end_matches('/').to_owned();
        self
    }

    async fn gh<I, S>(&self, args: I) -> HostingResult<ProcessOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = SandboxCommand::new("gh", self.work_dir.as_path())
            .args(args)
            .env("GH_TOKEN", self.credential.expose())
            .env("GH_PROMPT_DISABLED", "1")
            .with_network(NetworkMode::Full)
            .with_timeout(GH_TIMEOUT);
        Ok(self.supervisor.run(command).await?)
    }

    fn request_error(&self, output: &ProcessOutput) -> HostingError {
        HostingError::Request(self.credential.redact(&failure_detail(output)))
    }
}

impl std::fmt::Debug for GhCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GhCli")
            .field("credential", &self.credential)
            .field("web_base", &self.web_base)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HostingApi for GhCli {
    #[instrument(skip_all, fields(repository = %repository))]
    async fn get_repository(&self, repository: &RepositoryId) -> HostingResult<RepositoryInfo> {
        let output = self
            .gh([
                "repo",
                "view",
                repository.as_str(),
                "--json",
                "url,defaultBranchRef",
            ])
            .await?;
        if !output.success() {
            if output.stderr.contains(NOT_FOUND_MARKER) {
                return Err(HostingError::RepositoryNotFound(repository.clone()));
            }
            return Err(self.request_error(&output));
        }

        let view: RepoView = serde_json::from_str(output.stdout.trim())
            .map_err(|err| HostingError::Request(format!("unexpected repo view output: {err}")))?;
        debug!(default_branch = %view.default_branch_ref.name, "resolved repository");
        Ok(RepositoryInfo {
            clone_url: format!("{}.git", view.url.trim_end_matches('/')),
            default_branch: view.default_branch_ref.name,
        })
    }

    #[instrument(skip_all, fields(repository = %draft.repository, head = %draft.head))]
    async fn create_pull_request(
        &self,
        draft: &PullRequestDraft,
    ) -> HostingResult<CreatedPullRequest> {
        let output = self
            .gh([
                "pr",
                "create",
                "--repo",
                draft.repository.as_str(),
                "--head",
                draft.head.as_str(),
                "--base",
                draft.base.as_str(),
                "--title",
                draft.title.as_str(),
                "--body",
                draft.body.as_str(),
            ])
            .await?;
        if !output.success() {
            return Err(self.request_error(&output));
        }
        parse_created_pull_request(&output.stdout)
    }

    fn clone_urls(&self, repository: &RepositoryId) -> CloneUrls {
        let safe = format!("{}/{}.git", self.web_base, repository.as_str());
        CloneUrls::https_with_token(&safe, &self.credential)
    }
}

/// Reads the pull request URL `gh pr create` prints last.
fn parse_created_pull_request(stdout: &str) -> HostingResult<CreatedPullRequest> {
    let line = stdout
        .lines()
        .map(str::trim)
        .rfind(|candidate| candidate.starts_with("https://"))
        .ok_or_else(|| HostingError::Request("gh printed no pull request URL".to_owned()))?;
    let number = line
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse::<u64>().ok())
        .ok_or_else(|| HostingError::Request(format!("unrecognized pull request URL: {line}")))?;
    let url = PullRequestUrl::new(line)
        .map_err(|err| HostingError::Request(format!("invalid pull request URL: {err}")))?;
    Ok(CreatedPullRequest { url, number })
}

#[cfg(test)]
mod tests {
    use super::parse_created_pull_request;
    use crate::pipeline::ports::HostingError;
    use rstest::rstest;

    #[rstest]
    fn pull_request_number_comes_from_the_url() {
        let stdout = "Creating pull request for gapfill/x into main\n\nhttps://github.com/acme/web/pull/42\n";
        let created = parse_created_pull_request(stdout).expect("pull request");
        assert_eq!(created.number, 42);
        assert_eq!(created.url.as_str(), "https://github.com/acme/web/pull/42");
    }

    #[rstest]
    fn missing_url_is_a_request_error() {
        let result = parse_created_pull_request("warning: nothing happened\n");
        assert!(matches!(result, Err(HostingError::Request(_))));
    }
}
