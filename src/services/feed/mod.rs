//! Recommendation orchestrator.
//!
//! Chooses model or heuristic scoring per user, enforces author diversity,
//! injects exploration items, paginates, hydrates, and caches the final page.
//! The ML gate requires both enough interaction history and a trained model;
//! everyone else gets the heuristic path. Past the gate, a model failure
//! propagates instead of silently falling back to heuristics.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{feed_key, CacheStore};
use crate::config::FeedConfig;
use crate::error::Result;
use crate::models::{FeedPage, FeedPost, RecommendationStatus, ScoreSource, ScoredPost};
use crate::services::diversity::DiversityFilter;
use crate::services::exploration::{ExplorationSampler, POOL_OVERSAMPLE};
use crate::services::features::FeatureService;
use crate::services::model::ModelService;
use crate::store::{ContentStore, PostRecord};

const LIKE_WEIGHT: f32 = 0.3;
const COMMENT_WEIGHT: f32 = 0.5;
const SKILL_OVERLAP_WEIGHT: f32 = 2.0;
const HASHTAG_COUNT_WEIGHT: f32 = 0.1;
const RECENCY_BONUS_MAX: f32 = 10.0;
const RECENCY_BONUS_DECAY_PER_HOUR: f32 = 0.1;

/// Engagement-and-affinity score for the cold-start path. The recency bonus
/// decays linearly and hits zero at 100 hours.
pub(crate) fn heuristic_score(
    post: &PostRecord,
    viewer_skills: &HashSet<String>,
    now: DateTime<Utc>,
) -> f32 {
    let overlap = post
        .author_skills
        .iter()
        .filter(|skill| viewer_skills.contains(&crate::services::vocabulary::normalize_term(skill)))
        .count() as f32;

    let age_hours = ((now - post.created_at).num_seconds().max(0) as f32) / 3600.0;
    let recency_bonus = (RECENCY_BONUS_MAX - age_hours * RECENCY_BONUS_DECAY_PER_HOUR).max(0.0);

    post.like_count as f32 * LIKE_WEIGHT
        + post.comment_count as f32 * COMMENT_WEIGHT
        + overlap * SKILL_OVERLAP_WEIGHT
        + post.hashtags.len() as f32 * HASHTAG_COUNT_WEIGHT
        + recency_bonus
}

pub struct RecommendationService {
    store: Arc<dyn ContentStore>,
    cache: Arc<dyn CacheStore>,
    features: Arc<FeatureService>,
    model: Arc<ModelService>,
    diversity: DiversityFilter,
    exploration: ExplorationSampler,
    config: FeedConfig,
    feed_ttl_seconds: u64,
}

impl RecommendationService {
    pub fn new(
        store: Arc<dyn ContentStore>,
        cache: Arc<dyn CacheStore>,
        features: Arc<FeatureService>,
        model: Arc<ModelService>,
        config: FeedConfig,
        feed_ttl_seconds: u64,
        exploration_seed: Option<u64>,
    ) -> Self {
        Self {
            store,
            cache,
            features,
            model,
            diversity: DiversityFilter::default(),
            exploration: ExplorationSampler::new(exploration_seed),
            config,
            feed_ttl_seconds,
        }
    }

    pub async fn get_recommended_feed(
        &self,
        user_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<FeedPage> {
        let page = page.max(1);
        let limit = limit.clamp(1, self.config.max_page_size);

        let key = feed_key(user_id, page, limit);
        if let Some(raw) = self.cache.try_get(&key).await {
            match serde_json::from_str::<FeedPage>(&raw) {
                Ok(cached) => {
                    debug!(%user_id, page, "serving feed from cache");
                    return Ok(cached);
                }
                Err(e) => warn!(%user_id, error = %e, "discarding unreadable cached feed"),
            }
        }

        let engagement = self.store.user_engagement(user_id).await?;
        let use_ml = engagement.likes_given >= self.config.min_ml_interactions
            && self.model.is_trained().await;

        let ranked = if use_ml {
            self.rank_with_model(user_id).await?
        } else {
            self.rank_with_heuristics(user_id).await?
        };

        let mut list = self.diversity.apply(ranked);
        list = self.add_exploration(user_id, list).await?;

        let total = list.len();
        let start = ((page - 1) * limit) as usize;
        let end = (start + limit as usize).min(total);
        let page_items = if start < total { &list[start..end] } else { &[] };

        let posts = self.hydrate(user_id, page_items).await?;
        let feed = FeedPage {
            posts,
            total,
            page,
            limit,
        };

        match serde_json::to_string(&feed) {
            Ok(json) => {
                self.cache.try_set(&key, &json, self.feed_ttl_seconds).await;
            }
            Err(e) => warn!(%user_id, error = %e, "feed serialization failed"),
        }

        Ok(feed)
    }

    pub async fn get_status(&self, user_id: Uuid) -> Result<RecommendationStatus> {
        let engagement = self.store.user_engagement(user_id).await?;
        let model_trained = self.model.is_trained().await;

        Ok(RecommendationStatus {
            model_trained,
            last_trained_at: self.model.last_trained_at().await,
            training_examples: self.model.total_training_examples().await,
            interaction_count: engagement.likes_given,
            ml_eligible: model_trained
                && engagement.likes_given >= self.config.min_ml_interactions,
        })
    }

    /// Purges the user's feature vector and all of their cached feed pages.
    /// Callers mutating likes, comments, follows, or profile skills are
    /// expected to invoke this.
    pub async fn invalidate_user(&self, user_id: Uuid) {
        self.features.invalidate_user(user_id).await;
        self.cache
            .try_del_pattern(&format!("feed:{user_id}:*"))
            .await;
    }

    /// Purges a post's feature vector after its content or counters change.
    pub async fn invalidate_post(&self, post_id: Uuid) {
        self.features.invalidate_post(post_id).await;
    }

    async fn rank_with_model(&self, user_id: Uuid) -> Result<Vec<ScoredPost>> {
        let user_vector = self.features.build_user_vector(user_id).await?;

        let candidates = self
            .store
            .recent_candidates(user_id, None, true, self.config.candidate_pool_size)
            .await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = candidates.iter().map(|c| c.id).collect();
        let post_vectors = self.features.build_post_vectors(&ids).await?;
        let scores = self.model.predict(&user_vector, &post_vectors).await?;

        let mut ranked: Vec<ScoredPost> = candidates
            .iter()
            .zip(scores)
            .map(|(candidate, score)| ScoredPost {
                post_id: candidate.id,
                author_id: candidate.author_id,
                score,
                source: ScoreSource::Ml,
            })
            .collect();

        // Stable: exact ties keep candidate order.
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked)
    }

    async fn rank_with_heuristics(&self, user_id: Uuid) -> Result<Vec<ScoredPost>> {
        let since = Utc::now() - Duration::days(self.config.heuristic_window_days);
        let candidates = self
            .store
            .recent_candidates(user_id, Some(since), false, self.config.candidate_pool_size)
            .await?;

        let viewer_skills: HashSet<String> = self
            .store
            .user_skills(user_id)
            .await?
            .iter()
            .map(|skill| crate::services::vocabulary::normalize_term(skill))
            .collect();

        let now = Utc::now();
        let mut ranked: Vec<ScoredPost> = candidates
            .iter()
            .map(|candidate| ScoredPost {
                post_id: candidate.id,
                author_id: candidate.author_id,
                score: heuristic_score(candidate, &viewer_skills, now),
                source: ScoreSource::Heuristic,
            })
            .collect();

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(ranked)
    }

    async fn add_exploration(
        &self,
        user_id: Uuid,
        list: Vec<ScoredPost>,
    ) -> Result<Vec<ScoredPost>> {
        let count = self.exploration.target_count(list.len());
        if count == 0 {
            return Ok(list);
        }

        let in_list: HashSet<Uuid> = list.iter().map(|p| p.post_id).collect();
        let fetch_limit = (count * POOL_OVERSAMPLE + in_list.len()) as i64;
        let recents = self
            .store
            .recent_candidates(user_id, None, false, fetch_limit)
            .await?;

        let pool: Vec<PostRecord> = recents
            .into_iter()
            .filter(|record| !in_list.contains(&record.id))
            .take(count * POOL_OVERSAMPLE)
            .collect();

        Ok(self.exploration.inject(list, pool))
    }

    /// Fetches full rows for one page and reassembles them in rank order
    /// with the viewer's like status attached.
    async fn hydrate(&self, viewer: Uuid, page_items: &[ScoredPost]) -> Result<Vec<FeedPost>> {
        if page_items.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = page_items.iter().map(|item| item.post_id).collect();
        let summaries = self.store.posts_by_ids(ids.clone()).await?;
        let by_id: HashMap<Uuid, _> = summaries
            .into_iter()
            .map(|summary| (summary.id, summary))
            .collect();
        let liked = self.store.liked_among(viewer, ids).await?;

        let mut posts = Vec::with_capacity(page_items.len());
        for item in page_items {
            let Some(summary) = by_id.get(&item.post_id) else {
                debug!(post_id = %item.post_id, "dropping post that vanished before hydration");
                continue;
            };
            posts.push(FeedPost {
                id: summary.id,
                author_id: summary.author_id,
                content: summary.content.clone(),
                hashtags: summary.hashtags.clone(),
                created_at: summary.created_at,
                like_count: summary.like_count,
                comment_count: summary.comment_count,
                score: item.score,
                source: item.source,
                liked_by_viewer: liked.contains(&item.post_id),
            });
        }

        Ok(posts)
    }
}
