use std::time::Duration;

use async_trait::async_trait;
use deckhand_core::release::{ExternalError, GitHubApiClient, NewPullRequest};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

const API_VERSION: &str = "2022-11-28";

/// GitHub REST v3 adapter for the release workflow.
#[derive(Clone)]
pub struct GitHubRestClient {
    http: reqwest::Client,
    api_base: String,
    access_token: SecretString,
}

#[derive(Serialize)]
struct CreatePullRequestBody<'a> {
    title: &'a str,
    head: &'a str,
    base: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct PullRequestResponse {
    number: u64,
}

#[derive(Serialize)]
struct LabelsBody<'a> {
    labels: &'a [String],
}

#[derive(Deserialize)]
struct GitHubErrorBody {
    message: String,
}

impl GitHubRestClient {
    pub fn new(
        api_base: &str,
        access_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("deckhand/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http, api_base: api_base.trim_end_matches('/').to_owned(), access_token })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_base))
            .bearer_auth(self.access_token.expose_secret()) // ubs:ignore
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<Response, ExternalError> {
        let response = request
            .send()
            .await
            .map_err(|error| ExternalError::new(format!("{operation}: request failed: {error}")))?;
        let status = response.status();
        debug!(event_name = "release.github.response", operation, status = status.as_u16());
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<GitHubErrorBody>(&body)
            .map(|error| error.message)
            .unwrap_or(body);
        Err(ExternalError::new(format!("{operation}: GitHub returned {status}: {detail}")))
    }
}

#[async_trait]
impl GitHubApiClient for GitHubRestClient {
    async fn create_pull_request(&self, request: &NewPullRequest) -> Result<u64, ExternalError> {
        let body = CreatePullRequestBody {
            title: &request.title,
            head: &request.head,
            base: &request.base,
            body: &request.body,
        };
        let path = format!("/repos/{}/{}/pulls", request.org, request.repo);
        let response =
            self.send("create pull request", self.request(Method::POST, &path).json(&body)).await?;
        let created: PullRequestResponse = response.json().await.map_err(|error| {
            ExternalError::new(format!("create pull request: unexpected response: {error}"))
        })?;
        Ok(created.number)
    }

    async fn label_pull_request(
        &self,
        org: &str,
        repo: &str,
        number: u64,
        labels: &[String],
    ) -> Result<(), ExternalError> {
        let path = format!("/repos/{org}/{repo}/issues/{number}/labels");
        let request = self.request(Method::POST, &path).json(&LabelsBody { labels });
        self.send("label pull request", request).await.map(drop)
    }

    async fn delete_branch(&self, org: &str, repo: &str, branch: &str) -> Result<(), ExternalError> {
        let path = format!("/repos/{org}/{repo}/git/refs/heads/{branch}");
        self.send("delete branch", self.request(Method::DELETE, &path)).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use deckhand_core::release::{GitHubApiClient, NewPullRequest};
    use httpmock::prelude::*;
    use serde_json::json;

    use super::GitHubRestClient;

    fn client(server: &MockServer) -> GitHubRestClient {
        GitHubRestClient::new(&server.base_url(), "ghp_secret".to_owned().into(), Duration::from_secs(5))
            .expect("client")
    }

    fn pull_request() -> NewPullRequest {
        NewPullRequest {
            org: "acme".to_owned(),
            repo: "widget".to_owned(),
            head: "release/bot_1730000000".to_owned(),
            base: "main".to_owned(),
            title: "[deckhand] Automatic Release".to_owned(),
            body: "Automatic Release".to_owned(),
        }
    }

    #[tokio::test]
    async fn create_pull_request_returns_the_number() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/repos/acme/widget/pulls")
                    .header("authorization", "Bearer ghp_secret")
                    .json_body(json!({
                        "title": "[deckhand] Automatic Release",
                        "head": "release/bot_1730000000",
                        "base": "main",
                        "body": "Automatic Release"
                    }));
                then.status(201).json_body(json!({ "number": 42, "state": "open" }));
            })
            .await;

        let number = client(&server).create_pull_request(&pull_request()).await.expect("created");

        assert_eq!(number, 42);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn create_pull_request_surfaces_the_github_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/repos/acme/widget/pulls");
                then.status(422).json_body(json!({ "message": "Validation Failed" }));
            })
            .await;

        let error = client(&server).create_pull_request(&pull_request()).await.expect_err("422");

        assert!(error.to_string().contains("Validation Failed"), "{error}");
        assert!(error.to_string().contains("422"), "{error}");
    }

    #[tokio::test]
    async fn labels_are_posted_to_the_issue() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/repos/acme/widget/issues/42/labels")
                    .json_body(json!({ "labels": ["release/minor"] }));
                then.status(200).json_body(json!([{ "name": "release/minor" }]));
            })
            .await;

        client(&server)
            .label_pull_request("acme", "widget", 42, &["release/minor".to_owned()])
            .await
            .expect("labelled");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn delete_branch_targets_the_head_ref() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/repos/acme/widget/git/refs/heads/release/bot_1730000000");
                then.status(204);
            })
            .await;

        client(&server)
            .delete_branch("acme", "widget", "release/bot_1730000000")
            .await
            .expect("deleted");

        mock.assert_async().await;
    }
}
