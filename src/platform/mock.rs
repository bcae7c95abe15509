use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Platform, PlatformError, Post};
use crate::reaction::{ReactionCounts, ReactionKind};

/// A canned platform for tests. Serves a fixed feed and records reactions.
#[derive(Default)]
pub struct MockPlatform {
    auth_fails: bool,
    feed_fails: bool,
    posts: Vec<Post>,
    counts: HashMap<String, ReactionCounts>,
    rejected: HashSet<String>,
    reactions: Mutex<Vec<(String, ReactionKind)>>,
    auth_calls: AtomicUsize,
    count_calls: AtomicUsize,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a post to the feed together with its reaction counts.
    pub fn with_post(mut self, post: Post, counts: [u32; 7]) -> Self {
        self.counts.insert(post.post_id.clone(), ReactionCounts(counts));
        self.posts.push(post);
        self
    }

    /// Add a post whose counts cannot be fetched.
    pub fn with_unreadable_post(mut self, post: Post) -> Self {
        self.posts.push(post);
        self
    }

    /// Reactions on this post fail as if it had been reacted to already.
    pub fn rejecting(mut self, post_id: &str) -> Self {
        self.rejected.insert(post_id.to_string());
        self
    }

    pub fn failing_auth(mut self) -> Self {
        self.auth_fails = true;
        self
    }

    pub fn failing_feed(mut self) -> Self {
        self.feed_fails = true;
        self
    }

    /// Reactions applied so far, in order.
    pub fn reactions(&self) -> Vec<(String, ReactionKind)> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn auth_calls(&self) -> usize {
        self.auth_calls.load(Ordering::SeqCst)
    }

    pub fn count_calls(&self) -> usize {
        self.count_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn authenticate(&self) -> Result<(), PlatformError> {
        self.auth_calls.fetch_add(1, Ordering::SeqCst);
        if self.auth_fails {
            Err(PlatformError::Unauthenticated)
        } else {
            Ok(())
        }
    }

    async fn fetch_candidate_posts(&self) -> Result<Vec<Post>, PlatformError> {
        if self.feed_fails {
            return Err(PlatformError::Http { status: 500 });
        }
        Ok(self.posts.clone())
    }

    async fn fetch_reaction_counts(&self, post_id: &str) -> Result<ReactionCounts, PlatformError> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        self.counts
            .get(post_id)
            .copied()
            .ok_or_else(|| PlatformError::Network(format!("no counts for {post_id}")))
    }

    async fn execute_reaction(
        &self,
        post_id: &str,
        reaction: ReactionKind,
    ) -> Result<(), PlatformError> {
        if self.rejected.contains(post_id) {
            return Err(PlatformError::AlreadyReacted);
        }
        self.reactions
            .lock()
            .unwrap()
            .push((post_id.to_string(), reaction));
        Ok(())
    }
}
