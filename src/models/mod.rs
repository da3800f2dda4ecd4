use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a recommendation's score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    Ml,
    Heuristic,
    Exploration,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::Ml => "ml",
            ScoreSource::Heuristic => "heuristic",
            ScoreSource::Exploration => "exploration",
        }
    }
}

/// A ranked candidate before hydration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPost {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub score: f32,
    pub source: ScoreSource,
}

/// A fully hydrated feed entry returned to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub hashtags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub like_count: i64,
    pub comment_count: i64,
    pub score: f32,
    pub source: ScoreSource,
    pub liked_by_viewer: bool,
}

/// One page of recommendations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedPage {
    pub posts: Vec<FeedPost>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
}

/// Read-only snapshot of the recommender's state for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationStatus {
    pub model_trained: bool,
    pub last_trained_at: Option<DateTime<Utc>>,
    pub training_examples: u64,
    pub interaction_count: i64,
    pub ml_eligible: bool,
}

/// A labeled (user, post) pair used to fit the ranking model.
///
/// `features` is the user vector concatenated with the post vector;
/// `label` is 1.0 for an observed like, 0.0 for a sampled negative.
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub features: Vec<f32>,
    pub label: f32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub epochs: usize,
    pub train_loss: f32,
    pub val_loss: f32,
}

/// Result of one training pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub success: bool,
    pub example_count: usize,
    pub metrics: Option<TrainingMetrics>,
}
