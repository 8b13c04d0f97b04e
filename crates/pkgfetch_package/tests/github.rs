mod common;

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{
        HeaderMap, HeaderName, Response, StatusCode,
        header::{AUTHORIZATION, USER_AGENT},
    },
    response::IntoResponse,
    routing::get,
    serve,
};
use futures::TryStreamExt;
use pkgfetch_package::{
    FetchCoordinator, FetchError, GithubClient, Package, RemoteError, RepositoryClient,
    ResolvedRef,
};
use serde_json::{Value, json};
use tempfile::tempdir;
use tokio::net::TcpListener;
use url::Url;

use crate::common::package_archive;

/// What the fake API serves for every repository.
struct Repository {
    tags: Vec<String>,
    branches: Vec<(String, String)>,
    /// Answer every request with this status instead.
    status: Option<StatusCode>,
    /// `Authorization` and `User-Agent` header of every request.
    requests: Mutex<Vec<(Option<String>, Option<String>)>>,
}

impl Repository {
    fn new(tags: Vec<String>, branches: &[(&str, &str)]) -> Self {
        Self {
            tags,
            branches: branches
                .iter()
                .map(|(name, sha)| (name.to_string(), sha.to_string()))
                .collect(),
            status: None,
            requests: Mutex::default(),
        }
    }

    fn record(&self, headers: &HeaderMap) {
        let header = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
        };
        self.requests
            .lock()
            .unwrap()
            .push((header(AUTHORIZATION), header(USER_AGENT)));
    }
}

fn page(items: &[Value], query: &HashMap<String, String>) -> Vec<Value> {
    let per_page: usize = query["per_page"].parse().unwrap();
    let page: usize = query["page"].parse().unwrap();
    items
        .iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .cloned()
        .collect()
}

fn git_ref(name: &str, sha: &str) -> Value {
    json!({ "name": name, "commit": { "sha": sha, "url": "https://example.invalid" } })
}

async fn tags(
    State(repo): State<Arc<Repository>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response<Body> {
    repo.record(&headers);
    if let Some(status) = repo.status {
        return status.into_response();
    }
    let items: Vec<Value> = repo
        .tags
        .iter()
        .map(|tag| git_ref(tag, "0000000000000000000000000000000000000000"))
        .collect();
    Json(page(&items, &query)).into_response()
}

async fn branches(
    State(repo): State<Arc<Repository>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response<Body> {
    repo.record(&headers);
    if let Some(status) = repo.status {
        return status.into_response();
    }
    let items: Vec<Value> = repo
        .branches
        .iter()
        .map(|(name, sha)| git_ref(name, sha))
        .collect();
    Json(page(&items, &query)).into_response()
}

async fn tarball(
    State(repo): State<Arc<Repository>>,
    Path((_owner, _name, reference)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Response<Body> {
    repo.record(&headers);
    if let Some(status) = repo.status {
        return status.into_response();
    }
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::from(package_archive(&reference)))
        .unwrap()
}

struct TestApiServer {
    url: Url,
    repo: Arc<Repository>,
}

impl TestApiServer {
    async fn spawn(repo: Repository) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let url = Url::parse(&format!("http://{addr}/")).unwrap();

        let repo = Arc::new(repo);
        let router = Router::new()
            .route("/repos/:owner/:name/tags", get(tags))
            .route("/repos/:owner/:name/branches", get(branches))
            .route("/repos/:owner/:name/tarball/:reference", get(tarball))
            .with_state(repo.clone());

        let server = serve(listener, router);
        tokio::spawn(async move {
            let _ = server.await;
        });

        Self { url, repo }
    }

    fn client(&self) -> GithubClient {
        GithubClient::new(reqwest::Client::new(), self.url.clone())
    }

    fn requests(&self) -> Vec<(Option<String>, Option<String>)> {
        self.repo.requests.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn list_refs_follows_pagination() {
    let tags: Vec<String> = (0..150).map(|i| format!("v1.0.{i}")).collect();
    let server = TestApiServer::spawn(Repository::new(
        tags.clone(),
        &[("master", "6c1b2a2f6d3e4b5a6978877665544332211aabbc")],
    ))
    .await;

    let listing = server
        .client()
        .list_refs("component", "type", None)
        .await
        .unwrap();

    assert_eq!(listing.tags, tags);
    assert_eq!(
        listing.branch_head("master"),
        Some("6c1b2a2f6d3e4b5a6978877665544332211aabbc")
    );
    // two pages of tags, one of branches
    assert_eq!(server.requests().len(), 3);
}

#[tokio::test]
async fn requests_carry_token_and_user_agent() {
    let server = TestApiServer::spawn(Repository::new(vec!["1.0.0".to_string()], &[])).await;

    server
        .client()
        .list_refs("component", "type", Some("ghp_secret"))
        .await
        .unwrap();

    for (authorization, user_agent) in server.requests() {
        assert_eq!(authorization.as_deref(), Some("Bearer ghp_secret"));
        assert!(user_agent.unwrap().starts_with("pkgfetch/"));
    }
}

#[tokio::test]
async fn anonymous_requests_have_no_authorization() {
    let server = TestApiServer::spawn(Repository::new(vec!["1.0.0".to_string()], &[])).await;

    server
        .client()
        .list_refs("component", "type", None)
        .await
        .unwrap();

    assert!(server.requests().iter().all(|(auth, _)| auth.is_none()));
}

#[tokio::test]
async fn download_streams_the_tarball() {
    let server = TestApiServer::spawn(Repository::new(vec![], &[])).await;

    let chunks: Vec<_> = server
        .client()
        .download("component", "type", &ResolvedRef::new("1.0.0"), None)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(chunks.concat(), package_archive("1.0.0"));
}

#[tokio::test]
async fn error_statuses_are_reported() {
    let mut repo = Repository::new(vec![], &[]);
    repo.status = Some(StatusCode::NOT_ACCEPTABLE);
    let server = TestApiServer::spawn(repo).await;
    let client = server.client();

    let err = client.list_refs("component", "406", None).await.unwrap_err();
    assert_eq!(err, RemoteError::Status(StatusCode::NOT_ACCEPTABLE));

    let err = client
        .download("component", "406", &ResolvedRef::new("1.0.0"), None)
        .await
        .err()
        .unwrap();
    assert_eq!(err, RemoteError::Status(StatusCode::NOT_ACCEPTABLE));
}

#[tokio::test]
async fn package_fetch_end_to_end() {
    let tags = ["1.0.0", "1.0.3", "1.1.0-beta.1", "2.0.0"]
        .map(str::to_string)
        .to_vec();
    let server = TestApiServer::spawn(Repository::new(tags, &[])).await;
    let coordinator = FetchCoordinator::new(Arc::new(server.client()));
    let cache = tempdir().unwrap();

    let pkg = Package::parse("component/tip@1.x")
        .unwrap()
        .with_coordinator(coordinator)
        .with_directory(cache.path());
    let fetch = pkg.fetch().await.unwrap();

    assert_eq!(fetch.path, cache.path().join("component-tip@1.0.3"));
    assert_eq!(
        fs_err::read_to_string(fetch.path.join("component.json")).unwrap(),
        r#"{"version": "1.0.3"}"#
    );
}

#[tokio::test]
async fn package_fetch_not_found_status() {
    let mut repo = Repository::new(vec![], &[]);
    repo.status = Some(StatusCode::NOT_ACCEPTABLE);
    let server = TestApiServer::spawn(repo).await;
    let coordinator = FetchCoordinator::new(Arc::new(server.client()));
    let cache = tempdir().unwrap();

    let err = Package::parse("component/406@1.0.0")
        .unwrap()
        .with_coordinator(coordinator)
        .with_directory(cache.path())
        .with_token("ghp_secret")
        .fetch()
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::AuthRequired { .. }));
    assert!(
        err.to_string()
            .contains("component-406@1.0.0: returned with status code: 406")
    );
}
