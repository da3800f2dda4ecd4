//! Read surface over the relational store.
//!
//! The engine never talks to the database directly; it consumes this narrow
//! trait so callers can back it with whatever query layer they run and tests
//! can substitute fakes.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Everything the engine needs to know about a post to vectorize and
/// heuristically score it. Author fields are denormalized onto the record so
/// ranking never issues per-item follow-up queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub author_id: Uuid,
    pub hashtags: Vec<String>,
    pub author_skills: Vec<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub view_count: i64,
    pub author_follower_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Full post row used for final page hydration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostSummary {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub hashtags: Vec<String>,
    pub like_count: i64,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Aggregate activity counters for one user.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UserEngagement {
    pub likes_given: i64,
    pub comments_made: i64,
    pub posts_authored: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Hashtag lists of the user's most recently liked posts, newest first.
    async fn liked_post_hashtags(&self, user_id: Uuid, limit: i64) -> Result<Vec<Vec<String>>>;

    /// Hashtag lists of the posts the user recently commented on, newest
    /// first. One entry per comment, so commenting twice counts twice.
    async fn commented_post_hashtags(&self, user_id: Uuid, limit: i64) -> Result<Vec<Vec<String>>>;

    /// Skills listed on the user's profile.
    async fn user_skills(&self, user_id: Uuid) -> Result<Vec<String>>;

    async fn user_engagement(&self, user_id: Uuid) -> Result<UserEngagement>;

    /// Engagement counters and author profile for one post, or None if the
    /// post no longer exists.
    async fn post_record(&self, post_id: Uuid) -> Result<Option<PostRecord>>;

    /// Hashtag lists of every post in the corpus (vocabulary scans).
    async fn all_hashtag_lists(&self) -> Result<Vec<Vec<String>>>;

    /// Skill lists of every user in the corpus (vocabulary scans).
    async fn all_skill_lists(&self) -> Result<Vec<Vec<String>>>;

    /// Users that have given at least `min_likes` likes.
    async fn users_with_min_likes(&self, min_likes: i64) -> Result<Vec<Uuid>>;

    /// Ids of the user's most recently liked posts, newest first.
    async fn liked_post_ids(&self, user_id: Uuid, limit: i64) -> Result<Vec<Uuid>>;

    /// Recent posts not authored by `user_id`, newest first. `since` bounds
    /// the window; `exclude_liked` drops posts the user already liked.
    async fn recent_candidates(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
        exclude_liked: bool,
        limit: i64,
    ) -> Result<Vec<PostRecord>>;

    /// Full rows for a set of post ids. Order is not significant; missing
    /// ids are simply absent from the result.
    async fn posts_by_ids(&self, ids: Vec<Uuid>) -> Result<Vec<PostSummary>>;

    /// Which of `post_ids` the user has liked.
    async fn liked_among(&self, user_id: Uuid, post_ids: Vec<Uuid>) -> Result<HashSet<Uuid>>;
}
