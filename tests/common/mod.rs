//! Shared fixtures: an in-memory ContentStore and cache doubles.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use recommendation_engine::cache::CacheStore;
use recommendation_engine::error::Result;
use recommendation_engine::store::{ContentStore, PostRecord, PostSummary, UserEngagement};

#[derive(Default)]
pub struct InMemoryStore {
    posts: HashMap<Uuid, StoredPost>,
    likes: HashMap<Uuid, Vec<Uuid>>,
    comments: HashMap<Uuid, Vec<Uuid>>,
    skills: HashMap<Uuid, Vec<String>>,
    pub engagement_calls: AtomicUsize,
    pub candidate_calls: AtomicUsize,
}

struct StoredPost {
    record: PostRecord,
    content: String,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, skills: &[&str]) -> Uuid {
        let id = Uuid::new_v4();
        self.skills
            .insert(id, skills.iter().map(|s| s.to_string()).collect());
        id
    }

    pub fn add_post(
        &mut self,
        author_id: Uuid,
        hashtags: &[&str],
        like_count: i64,
        comment_count: i64,
        age_hours: i64,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let author_skills = self.skills.get(&author_id).cloned().unwrap_or_default();
        let record = PostRecord {
            id,
            author_id,
            hashtags: hashtags.iter().map(|s| s.to_string()).collect(),
            author_skills,
            like_count,
            comment_count,
            view_count: like_count * 10,
            author_follower_count: 10,
            created_at: Utc::now() - Duration::hours(age_hours),
        };
        self.posts.insert(
            id,
            StoredPost {
                record,
                content: format!("post-{id}"),
            },
        );
        id
    }

    pub fn like(&mut self, user_id: Uuid, post_id: Uuid) {
        self.likes.entry(user_id).or_default().push(post_id);
    }

    pub fn comment(&mut self, user_id: Uuid, post_id: Uuid) {
        self.comments.entry(user_id).or_default().push(post_id);
    }

    fn hashtags_of(&self, post_ids: &[Uuid]) -> Vec<Vec<String>> {
        post_ids
            .iter()
            .filter_map(|id| self.posts.get(id))
            .map(|post| post.record.hashtags.clone())
            .collect()
    }

    fn posts_newest_first(&self) -> Vec<&StoredPost> {
        let mut posts: Vec<&StoredPost> = self.posts.values().collect();
        posts.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
        posts
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn liked_post_hashtags(&self, user_id: Uuid, limit: i64) -> Result<Vec<Vec<String>>> {
        let liked = self.likes.get(&user_id).cloned().unwrap_or_default();
        let liked: Vec<Uuid> = liked.into_iter().take(limit as usize).collect();
        Ok(self.hashtags_of(&liked))
    }

    async fn commented_post_hashtags(&self, user_id: Uuid, limit: i64) -> Result<Vec<Vec<String>>> {
        let commented = self.comments.get(&user_id).cloned().unwrap_or_default();
        let commented: Vec<Uuid> = commented.into_iter().take(limit as usize).collect();
        Ok(self.hashtags_of(&commented))
    }

    async fn user_skills(&self, user_id: Uuid) -> Result<Vec<String>> {
        Ok(self.skills.get(&user_id).cloned().unwrap_or_default())
    }

    async fn user_engagement(&self, user_id: Uuid) -> Result<UserEngagement> {
        self.engagement_calls.fetch_add(1, Ordering::SeqCst);
        Ok(UserEngagement {
            likes_given: self.likes.get(&user_id).map_or(0, |l| l.len() as i64),
            comments_made: self.comments.get(&user_id).map_or(0, |c| c.len() as i64),
            posts_authored: self
                .posts
                .values()
                .filter(|p| p.record.author_id == user_id)
                .count() as i64,
        })
    }

    async fn post_record(&self, post_id: Uuid) -> Result<Option<PostRecord>> {
        Ok(self.posts.get(&post_id).map(|p| p.record.clone()))
    }

    async fn all_hashtag_lists(&self) -> Result<Vec<Vec<String>>> {
        Ok(self
            .posts
            .values()
            .map(|p| p.record.hashtags.clone())
            .collect())
    }

    async fn all_skill_lists(&self) -> Result<Vec<Vec<String>>> {
        Ok(self.skills.values().cloned().collect())
    }

    async fn users_with_min_likes(&self, min_likes: i64) -> Result<Vec<Uuid>> {
        Ok(self
            .likes
            .iter()
            .filter(|(_, liked)| liked.len() as i64 >= min_likes)
            .map(|(user_id, _)| *user_id)
            .collect())
    }

    async fn liked_post_ids(&self, user_id: Uuid, limit: i64) -> Result<Vec<Uuid>> {
        Ok(self
            .likes
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .take(limit as usize)
            .collect())
    }

    async fn recent_candidates(
        &self,
        user_id: Uuid,
        since: Option<DateTime<Utc>>,
        exclude_liked: bool,
        limit: i64,
    ) -> Result<Vec<PostRecord>> {
        self.candidate_calls.fetch_add(1, Ordering::SeqCst);
        let liked: HashSet<Uuid> = if exclude_liked {
            self.likes
                .get(&user_id)
                .map(|l| l.iter().copied().collect())
                .unwrap_or_default()
        } else {
            HashSet::new()
        };

        Ok(self
            .posts_newest_first()
            .into_iter()
            .filter(|p| p.record.author_id != user_id)
            .filter(|p| since.map_or(true, |cutoff| p.record.created_at >= cutoff))
            .filter(|p| !liked.contains(&p.record.id))
            .take(limit as usize)
            .map(|p| p.record.clone())
            .collect())
    }

    async fn posts_by_ids(&self, ids: Vec<Uuid>) -> Result<Vec<PostSummary>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.posts.get(id))
            .map(|p| PostSummary {
                id: p.record.id,
                author_id: p.record.author_id,
                content: p.content.clone(),
                hashtags: p.record.hashtags.clone(),
                like_count: p.record.like_count,
                comment_count: p.record.comment_count,
                created_at: p.record.created_at,
            })
            .collect())
    }

    async fn liked_among(&self, user_id: Uuid, post_ids: Vec<Uuid>) -> Result<HashSet<Uuid>> {
        let liked: HashSet<Uuid> = self
            .likes
            .get(&user_id)
            .map(|l| l.iter().copied().collect())
            .unwrap_or_default();
        Ok(post_ids.into_iter().filter(|id| liked.contains(id)).collect())
    }
}

/// Cache that fails every operation, for outage fall-through tests.
pub struct FailingCache;

#[async_trait]
impl CacheStore for FailingCache {
    async fn try_get(&self, _key: &str) -> Option<String> {
        None
    }

    async fn try_set(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> bool {
        false
    }

    async fn try_del(&self, _key: &str) -> bool {
        false
    }

    async fn try_del_pattern(&self, _pattern: &str) -> bool {
        false
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Wires a full engine over the given store and cache.
pub struct Engine {
    pub store: Arc<InMemoryStore>,
    pub features: Arc<recommendation_engine::FeatureService>,
    pub vocabularies: Arc<recommendation_engine::VocabularyService>,
    pub model: Arc<recommendation_engine::ModelService>,
    pub feed: recommendation_engine::RecommendationService,
}

pub fn build_engine(
    store: InMemoryStore,
    cache: Arc<dyn CacheStore>,
    model_path: std::path::PathBuf,
) -> Engine {
    use recommendation_engine::config::FeedConfig;
    use recommendation_engine::{
        FeatureService, ModelService, RecommendationService, VocabularyService,
    };

    let store = Arc::new(store);
    let store_dyn: Arc<dyn ContentStore> = Arc::clone(&store) as Arc<dyn ContentStore>;

    let vocabularies = Arc::new(VocabularyService::new(
        Arc::clone(&store_dyn),
        Arc::clone(&cache),
        86400,
    ));
    let features = Arc::new(FeatureService::new(
        Arc::clone(&store_dyn),
        Arc::clone(&cache),
        Arc::clone(&vocabularies),
        3600,
    ));
    let model = Arc::new(ModelService::new(model_path));
    let feed = RecommendationService::new(
        store_dyn,
        cache,
        Arc::clone(&features),
        Arc::clone(&model),
        FeedConfig::default(),
        600,
        Some(99),
    );

    Engine {
        store,
        features,
        vocabularies,
        model,
        feed,
    }
}
