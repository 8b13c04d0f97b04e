use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use pkgfetch_consts::consts;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use serde::{Deserialize, de::DeserializeOwned};
use tracing::{debug, instrument};
use url::Url;

use super::{ArchiveStream, RefListing, RepositoryClient};
use crate::{error::RemoteError, spec::ResolvedRef};

const GITHUB_JSON: &str = "application/vnd.github+json";

/// A [`RepositoryClient`] for the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GithubClient {
    client: ClientWithMiddleware,
    api_url: Url,
}

#[derive(Debug, Deserialize)]
struct GithubRef {
    name: String,
    commit: GithubCommit,
}

#[derive(Debug, Deserialize)]
struct GithubCommit {
    sha: String,
}

impl Default for GithubClient {
    /// A client for the public GitHub API.
    fn default() -> Self {
        Self::new(
            reqwest::Client::new(),
            Url::parse(consts::DEFAULT_API_URL).expect("the default api url is valid"),
        )
    }
}

impl GithubClient {
    /// Talk to the API at `api_url`, e.g. `https://api.github.com` or a GitHub
    /// Enterprise `https://host/api/v3`.
    pub fn new(client: impl Into<ClientWithMiddleware>, api_url: Url) -> Self {
        Self {
            client: client.into(),
            api_url,
        }
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// `{api}/repos/{owner}/{name}/{segments..}`
    fn repo_url(&self, owner: &str, name: &str, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Network(format!("invalid api url: {}", self.api_url)))?
            .pop_if_empty()
            .extend(["repos", owner, name])
            .extend(segments);
        Ok(url)
    }

    fn get(&self, url: Url, token: Option<&str>) -> RequestBuilder {
        let request = self
            .client
            .get(url)
            .header(USER_AGENT, consts::USER_AGENT);
        match token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Collects every page of a listing endpoint.
    async fn list_all<T: DeserializeOwned>(
        &self,
        url: Url,
        token: Option<&str>,
    ) -> Result<Vec<T>, RemoteError> {
        let mut items = Vec::new();
        for page in 1.. {
            let mut page_url = url.clone();
            page_url
                .query_pairs_mut()
                .append_pair("per_page", &consts::LISTING_PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());

            let response = self
                .get(page_url, token)
                .header(ACCEPT, GITHUB_JSON)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(RemoteError::Status(response.status()));
            }

            let batch: Vec<T> = response.json().await?;
            let done = batch.len() < consts::LISTING_PAGE_SIZE;
            items.extend(batch);
            if done {
                break;
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl RepositoryClient for GithubClient {
    #[instrument(skip(self, token), fields(api = %self.api_url))]
    async fn list_refs(
        &self,
        owner: &str,
        name: &str,
        token: Option<&str>,
    ) -> Result<RefListing, RemoteError> {
        let tags_url = self.repo_url(owner, name, &["tags"])?;
        let branches_url = self.repo_url(owner, name, &["branches"])?;

        let (tags, branches) = futures::try_join!(
            self.list_all::<GithubRef>(tags_url, token),
            self.list_all::<GithubRef>(branches_url, token),
        )?;
        debug!(
            "{owner}/{name} has {} tags and {} branches",
            tags.len(),
            branches.len()
        );

        Ok(RefListing {
            tags: tags.into_iter().map(|tag| tag.name).collect(),
            branches: branches
                .into_iter()
                .map(|branch| (branch.name, branch.commit.sha))
                .collect(),
        })
    }

    #[instrument(skip(self, token), fields(api = %self.api_url))]
    async fn download(
        &self,
        owner: &str,
        name: &str,
        reference: &ResolvedRef,
        token: Option<&str>,
    ) -> Result<ArchiveStream, RemoteError> {
        let url = self.repo_url(owner, name, &["tarball", reference.as_str()])?;
        let response = self.get(url, token).send().await?;
        if !response.status().is_success() {
            return Err(RemoteError::Status(response.status()));
        }

        Ok(response
            .bytes_stream()
            .map_err(RemoteError::from)
            .boxed())
    }
}
