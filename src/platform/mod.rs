//! The social platform the scheduler works against.
//!
//! Everything that touches the network lives behind [`Platform`], so the
//! scheduler can be driven by [`mock::MockPlatform`] in tests.

pub mod http;
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::reaction::{ReactionCounts, ReactionKind};

/// A post found in the feed. Only lives for one scheduler run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub post_id: String,
    pub owner_id: String,
    /// Set when the post was published by a fan page.
    #[serde(default)]
    pub page_id: Option<String>,
    /// Set when the post lives in a group.
    #[serde(default)]
    pub group_id: Option<String>,
}

impl Post {
    pub fn new(owner_id: impl Into<String>, post_id: impl Into<String>) -> Self {
        Self {
            post_id: post_id.into(),
            owner_id: owner_id.into(),
            page_id: None,
            group_id: None,
        }
    }

    /// Identity used to remember which posts were already reacted to.
    pub fn key(&self) -> String {
        format!("{}_{}", self.owner_id, self.post_id)
    }
}

/// Why a platform call did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("unexpected HTTP status {status}")]
    Http { status: u16 },
    #[error("post already carries a reaction")]
    AlreadyReacted,
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            PlatformError::Malformed(e.to_string())
        } else {
            PlatformError::Network(e.to_string())
        }
    }
}

/// Reads the feed and applies reactions on behalf of the signed-in account.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Make sure the session is usable. Called once per run.
    async fn authenticate(&self) -> Result<(), PlatformError>;

    /// Candidate posts, in the order they should be handled.
    async fn fetch_candidate_posts(&self) -> Result<Vec<Post>, PlatformError>;

    async fn fetch_reaction_counts(&self, post_id: &str) -> Result<ReactionCounts, PlatformError>;

    async fn execute_reaction(
        &self,
        post_id: &str,
        reaction: ReactionKind,
    ) -> Result<(), PlatformError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_joins_owner_and_post() {
        let post = Post::new("100", "200");
        assert_eq!(post.key(), "100_200");
    }

    #[test]
    fn post_deserializes_without_optional_context() {
        let post: Post = serde_json::from_str(r#"{"post_id":"1","owner_id":"2"}"#).unwrap();
        assert_eq!(post, Post::new("2", "1"));
    }
}
