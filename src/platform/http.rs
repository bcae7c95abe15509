//! [`Platform`] over a small JSON bridge service.
//!
//! The bridge owns the actual session with the social network and exposes:
//!
//! | Method | Path | Body / response |
//! |---|---|---|
//! | `GET` | `/session` | 2xx when signed in |
//! | `GET` | `/feed` | `[Post]` |
//! | `GET` | `/posts/{id}/reactions` | `{"counts": [7 × u32]}` |
//! | `POST` | `/posts/{id}/reactions` | `{"reaction": "love"}`, 409 if already reacted |

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::{Platform, PlatformError, Post};
use crate::reaction::{ReactionCounts, ReactionKind};

#[derive(Deserialize)]
struct CountsResponse {
    counts: Vec<u32>,
}

#[derive(Serialize)]
struct ReactRequest {
    reaction: ReactionKind,
}

pub struct HttpPlatform {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpPlatform {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, PlatformError> {
        let resp = builder.send().await?;
        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(PlatformError::Unauthenticated),
            StatusCode::CONFLICT => Err(PlatformError::AlreadyReacted),
            s => Err(PlatformError::Http { status: s.as_u16() }),
        }
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn authenticate(&self) -> Result<(), PlatformError> {
        self.send(self.request(reqwest::Method::GET, "/session"))
            .await
            .map(|_| ())
    }

    async fn fetch_candidate_posts(&self) -> Result<Vec<Post>, PlatformError> {
        let resp = self
            .send(self.request(reqwest::Method::GET, "/feed"))
            .await?;
        Ok(resp.json().await?)
    }

    async fn fetch_reaction_counts(&self, post_id: &str) -> Result<ReactionCounts, PlatformError> {
        let path = format!("/posts/{post_id}/reactions");
        let resp = self.send(self.request(reqwest::Method::GET, &path)).await?;
        let body: CountsResponse = resp.json().await?;
        ReactionCounts::try_from(body.counts).map_err(|e| PlatformError::Malformed(e.to_string()))
    }

    async fn execute_reaction(
        &self,
        post_id: &str,
        reaction: ReactionKind,
    ) -> Result<(), PlatformError> {
        let path = format!("/posts/{post_id}/reactions");
        let builder = self
            .request(reqwest::Method::POST, &path)
            .json(&ReactRequest { reaction });
        self.send(builder).await.map(|_| ())
    }
}
