//! Feature vectorization.
//!
//! Turns users and posts into fixed-length, L2-normalized vectors over the
//! current vocabulary epoch. Cached vectors carry that epoch and are
//! discarded when a rebuild has moved it on.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{post_vector_key, user_vector_key, CacheStore};
use crate::error::Result;
use crate::services::vocabulary::{VocabularyService, HASHTAG_VOCAB_SIZE, SKILL_VOCAB_SIZE};
use crate::store::ContentStore;

pub const USER_ENGAGEMENT_DIMS: usize = 4;
pub const POST_META_DIMS: usize = 5;
pub const USER_VECTOR_LEN: usize = HASHTAG_VOCAB_SIZE + SKILL_VOCAB_SIZE + USER_ENGAGEMENT_DIMS;
pub const POST_VECTOR_LEN: usize = HASHTAG_VOCAB_SIZE + SKILL_VOCAB_SIZE + POST_META_DIMS;

/// How many recent likes/comments feed the hashtag-interest profile.
const INTERACTION_HISTORY_LIMIT: i64 = 200;

const LIKE_WEIGHT: f32 = 1.0;
const COMMENT_WEIGHT: f32 = 2.0;

const LIKES_GIVEN_NORM: f32 = 100.0;
const COMMENTS_MADE_NORM: f32 = 50.0;
const POSTS_AUTHORED_NORM: f32 = 20.0;
/// Reserved engagement slot, always zero.
const ACTIVITY_PLACEHOLDER: f32 = 0.0;

const POST_LIKE_NORM: f32 = 50.0;
const POST_COMMENT_NORM: f32 = 20.0;
const POST_VIEW_NORM: f32 = 500.0;
const AUTHOR_FOLLOWER_NORM: f32 = 100.0;
const RECENCY_TIME_CONSTANT_HOURS: f32 = 48.0;

#[derive(Serialize, Deserialize)]
struct CachedVector {
    epoch: u64,
    values: Vec<f32>,
}

/// Accumulates per-hashtag interaction weight: one unit per like, two per
/// comment, on each hashtag of the interacted post.
pub fn accumulate_hashtag_weights(
    liked: &[Vec<String>],
    commented: &[Vec<String>],
) -> HashMap<String, f32> {
    let mut weights: HashMap<String, f32> = HashMap::new();

    for (lists, weight) in [(liked, LIKE_WEIGHT), (commented, COMMENT_WEIGHT)] {
        for tag in lists.iter().flatten() {
            let normalized = crate::services::vocabulary::normalize_term(tag);
            if normalized.is_empty() {
                continue;
            }
            *weights.entry(normalized).or_insert(0.0) += weight;
        }
    }

    weights
}

/// Scales a vector to unit Euclidean norm. All-zero vectors pass through
/// unchanged.
pub fn l2_normalize(values: &mut [f32]) {
    let norm: f32 = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|v| *v /= norm);
    }
}

/// Exponential recency decay: 1.0 for a brand-new post, ~0.37 at 48 hours.
pub fn recency_score(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let age_hours = ((now - created_at).num_seconds().max(0) as f32) / 3600.0;
    (-age_hours / RECENCY_TIME_CONSTANT_HOURS).exp()
}

fn unit_clamp(value: f32) -> f32 {
    value.min(1.0)
}

pub struct FeatureService {
    store: Arc<dyn ContentStore>,
    cache: Arc<dyn CacheStore>,
    vocabularies: Arc<VocabularyService>,
    ttl_seconds: u64,
}

impl FeatureService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        cache: Arc<dyn CacheStore>,
        vocabularies: Arc<VocabularyService>,
        ttl_seconds: u64,
    ) -> Self {
        Self {
            store,
            cache,
            vocabularies,
            ttl_seconds,
        }
    }

    pub async fn build_user_vector(&self, user_id: Uuid) -> Result<Vec<f32>> {
        let vocab = self.vocabularies.current().await?;
        let key = user_vector_key(user_id);

        if let Some(values) = self.read_cached(&key, vocab.epoch, USER_VECTOR_LEN).await {
            return Ok(values);
        }

        let liked = self
            .store
            .liked_post_hashtags(user_id, INTERACTION_HISTORY_LIMIT)
            .await?;
        let commented = self
            .store
            .commented_post_hashtags(user_id, INTERACTION_HISTORY_LIMIT)
            .await?;

        let mut values = vec![0.0f32; USER_VECTOR_LEN];

        let weights = accumulate_hashtag_weights(&liked, &commented);
        let max_weight = weights.values().cloned().fold(0.0f32, f32::max);
        if max_weight > 0.0 {
            for (tag, weight) in &weights {
                // Tags outside the top-K vocabulary are dropped.
                if let Some(slot) = vocab.hashtags.slot(tag) {
                    values[slot] = weight / max_weight;
                }
            }
        }

        for skill in self.store.user_skills(user_id).await? {
            if let Some(slot) = vocab.skills.slot(&skill) {
                values[HASHTAG_VOCAB_SIZE + slot] = 1.0;
            }
        }

        let engagement = self.store.user_engagement(user_id).await?;
        let base = HASHTAG_VOCAB_SIZE + SKILL_VOCAB_SIZE;
        values[base] = unit_clamp(engagement.likes_given as f32 / LIKES_GIVEN_NORM);
        values[base + 1] = unit_clamp(engagement.comments_made as f32 / COMMENTS_MADE_NORM);
        values[base + 2] = ACTIVITY_PLACEHOLDER;
        values[base + 3] = unit_clamp(engagement.posts_authored as f32 / POSTS_AUTHORED_NORM);

        l2_normalize(&mut values);

        self.write_cached(&key, vocab.epoch, &values).await;
        Ok(values)
    }

    /// Vectorizes one post. A missing post yields a zero vector of the
    /// correct length so batch scoring stays total over its candidate set.
    pub async fn build_post_vector(&self, post_id: Uuid) -> Result<Vec<f32>> {
        let vocab = self.vocabularies.current().await?;
        let key = post_vector_key(post_id);

        if let Some(values) = self.read_cached(&key, vocab.epoch, POST_VECTOR_LEN).await {
            return Ok(values);
        }

        let Some(record) = self.store.post_record(post_id).await? else {
            debug!(%post_id, "post missing; returning zero vector");
            return Ok(vec![0.0; POST_VECTOR_LEN]);
        };

        let mut values = vec![0.0f32; POST_VECTOR_LEN];

        for tag in &record.hashtags {
            if let Some(slot) = vocab.hashtags.slot(tag) {
                values[slot] = 1.0;
            }
        }
        for skill in &record.author_skills {
            if let Some(slot) = vocab.skills.slot(skill) {
                values[HASHTAG_VOCAB_SIZE + slot] = 1.0;
            }
        }

        let base = HASHTAG_VOCAB_SIZE + SKILL_VOCAB_SIZE;
        values[base] = unit_clamp(record.like_count as f32 / POST_LIKE_NORM);
        values[base + 1] = unit_clamp(record.comment_count as f32 / POST_COMMENT_NORM);
        values[base + 2] = unit_clamp(record.view_count as f32 / POST_VIEW_NORM);
        values[base + 3] = recency_score(record.created_at, Utc::now());
        values[base + 4] = unit_clamp(record.author_follower_count as f32 / AUTHOR_FOLLOWER_NORM);

        l2_normalize(&mut values);

        self.write_cached(&key, vocab.epoch, &values).await;
        Ok(values)
    }

    /// Vectorizes a batch of posts concurrently. Items are independent; any
    /// store failure fails the batch.
    pub async fn build_post_vectors(&self, post_ids: &[Uuid]) -> Result<Vec<Vec<f32>>> {
        let futures = post_ids.iter().map(|id| self.build_post_vector(*id));
        future::join_all(futures).await.into_iter().collect()
    }

    pub async fn invalidate_user(&self, user_id: Uuid) {
        self.cache.try_del(&user_vector_key(user_id)).await;
    }

    pub async fn invalidate_post(&self, post_id: Uuid) {
        self.cache.try_del(&post_vector_key(post_id)).await;
    }

    async fn read_cached(&self, key: &str, epoch: u64, expected_len: usize) -> Option<Vec<f32>> {
        let raw = self.cache.try_get(key).await?;
        match serde_json::from_str::<CachedVector>(&raw) {
            Ok(cached) if cached.epoch == epoch && cached.values.len() == expected_len => {
                Some(cached.values)
            }
            Ok(cached) => {
                debug!(key, cached_epoch = cached.epoch, epoch, "stale feature vector; recomputing");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "discarding unreadable cached vector");
                None
            }
        }
    }

    async fn write_cached(&self, key: &str, epoch: u64, values: &[f32]) {
        let cached = CachedVector {
            epoch,
            values: values.to_vec(),
        };
        match serde_json::to_string(&cached) {
            Ok(json) => {
                self.cache.try_set(key, &json, self.ttl_seconds).await;
            }
            Err(e) => warn!(key, error = %e, "feature vector serialization failed"),
        }
    }
}
