use std::collections::HashMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;
use url::Url;

use crate::models::{Comment, CommentId, Post, PostId, SiblingPair};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub base_url: Option<String>,
    pub user_agent: String,
    pub credentials: Option<Credentials>,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
}

/// Failure reported by the server. `Display` is the server's description so
/// it can be shown to the user as-is.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{description}")]
    Api { status: u16, description: String },
}

impl ApiError {
    fn from_response(status: StatusCode, body: &str) -> Self {
        let description = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|err| {
                err.description
                    .filter(|d| !d.trim().is_empty())
                    .or(err.title)
            })
            .or_else(|| {
                let trimmed = body.trim();
                (!trimmed.is_empty() && trimmed.len() < 512).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        match status.as_u16() {
            404 => ApiError::NotFound(description),
            401 => ApiError::Unauthorized(description),
            403 => ApiError::Forbidden(description),
            429 => ApiError::RateLimited(description),
            status => ApiError::Api {
                status,
                description,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct IdOnly {
    id: PostId,
}

#[derive(Debug, Clone, Deserialize)]
struct AroundResponse {
    #[serde(default)]
    prev: Option<IdOnly>,
    #[serde(default)]
    next: Option<IdOnly>,
}

impl From<AroundResponse> for SiblingPair {
    fn from(around: AroundResponse) -> Self {
        SiblingPair {
            prev: around.prev.map(|post| post.id),
            next: around.next.map(|post| post.id),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerInfo {
    #[serde(default)]
    pub post_count: i64,
    #[serde(default)]
    pub config: ServerConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub privileges: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub rank: String,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    base_url: Url,
    authorization: Option<String>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.user_agent.trim().is_empty() {
            bail!("api client user agent required");
        }
        let mut base = config
            .base_url
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).with_context(|| format!("api: parse base url {base}"))?;
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        Ok(Client {
            http,
            user_agent: config.user_agent,
            base_url,
            authorization: config.credentials.as_ref().map(token_header),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.authorization.is_some()
    }

    pub fn post(&self, id: PostId) -> Result<Post> {
        let resp = self.request::<()>(Method::GET, &format!("post/{id}"), &[], None)?;
        Ok(resp.json()?)
    }

    pub fn around(&self, id: PostId, query: &str) -> Result<SiblingPair> {
        let params = [("fields", "id"), ("query", query)];
        let resp = self.request::<()>(Method::GET, &format!("post/{id}/around"), &params, None)?;
        let around: AroundResponse = resp.json()?;
        Ok(around.into())
    }

    pub fn create_comment(&self, post_id: PostId, text: &str) -> Result<Comment> {
        if text.trim().is_empty() {
            bail!("Comment text cannot be empty.");
        }
        let body = json!({ "postId": post_id, "text": text });
        let resp = self.request(Method::POST, "comments/", &[], Some(&body))?;
        Ok(resp.json()?)
    }

    pub fn update_comment(&self, id: CommentId, version: u64, text: &str) -> Result<Comment> {
        if text.trim().is_empty() {
            bail!("Comment text cannot be empty.");
        }
        let body = json!({ "version": version, "text": text });
        let resp = self.request(Method::PUT, &format!("comment/{id}"), &[], Some(&body))?;
        Ok(resp.json()?)
    }

    pub fn delete_comment(&self, id: CommentId, version: u64) -> Result<()> {
        let body = json!({ "version": version });
        self.request(Method::DELETE, &format!("comment/{id}"), &[], Some(&body))?;
        Ok(())
    }

    pub fn set_comment_score(&self, id: CommentId, score: i32) -> Result<Comment> {
        check_score(score)?;
        let body = json!({ "score": score });
        let resp = self.request(Method::PUT, &format!("comment/{id}/score"), &[], Some(&body))?;
        Ok(resp.json()?)
    }

    pub fn set_post_score(&self, id: PostId, score: i32) -> Result<Post> {
        check_score(score)?;
        let body = json!({ "score": score });
        let resp = self.request(Method::PUT, &format!("post/{id}/score"), &[], Some(&body))?;
        Ok(resp.json()?)
    }

    pub fn add_favorite(&self, id: PostId) -> Result<Post> {
        let resp = self.request::<()>(Method::POST, &format!("post/{id}/favorite"), &[], None)?;
        Ok(resp.json()?)
    }

    pub fn remove_favorite(&self, id: PostId) -> Result<Post> {
        let resp =
            self.request::<()>(Method::DELETE, &format!("post/{id}/favorite"), &[], None)?;
        Ok(resp.json()?)
    }

    pub fn info(&self) -> Result<ServerInfo> {
        let resp = self.request::<()>(Method::GET, "info", &[], None)?;
        Ok(resp.json()?)
    }

    pub fn user(&self, name: &str) -> Result<User> {
        let resp = self.request::<()>(Method::GET, &format!("user/{name}"), &[], None)?;
        Ok(resp.json()?)
    }

    fn request<B>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let mut url = self.base_url.join(path)?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in params {
                pairs.append_pair(k, v);
            }
        }

        debug!(%method, %url, "api request");
        let mut req = self
            .http
            .request(method, url)
            .header(USER_AGENT, self.user_agent.clone())
            .header(ACCEPT, "application/json");
        if let Some(auth) = &self.authorization {
            req = req.header(AUTHORIZATION, auth.clone());
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send()?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            debug!(status = status.as_u16(), "api request failed");
            Err(ApiError::from_response(status, &text).into())
        }
    }
}

fn token_header(credentials: &Credentials) -> String {
    let raw = format!("{}:{}", credentials.username, credentials.token);
    format!("Token {}", general_purpose::STANDARD.encode(raw))
}

fn check_score(score: i32) -> Result<()> {
    if !(-1..=1).contains(&score) {
        bail!("Score must be -1, 0, or 1.");
    }
    Ok(())
}
