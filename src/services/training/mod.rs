//! Offline training: example generation and the pipeline that runs on a
//! recurring schedule.
//!
//! The pipeline runs in strict stages (vocabulary rebuild, example
//! generation, model fit); any stage failure aborts the run with the
//! previously active model left untouched. Too few examples is not a
//! failure: the run reports insufficiency and the serving path keeps using
//! whatever model it had.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{PipelineOutcome, TrainingExample};
use crate::services::features::FeatureService;
use crate::services::model::ModelService;
use crate::services::vocabulary::VocabularyService;
use crate::store::ContentStore;

/// Below this many generated examples a run aborts instead of fitting noise.
pub const MIN_TRAINING_EXAMPLES: usize = 10;

const MAX_POSITIVES_PER_USER: i64 = 50;
const NEGATIVES_PER_POSITIVE: usize = 3;
/// Users with fewer liked posts than this carry too little signal.
const MIN_USER_LIKES: i64 = 2;

pub struct TrainingDataGenerator {
    store: Arc<dyn ContentStore>,
    features: Arc<FeatureService>,
}

impl TrainingDataGenerator {
    pub fn new(store: Arc<dyn ContentStore>, features: Arc<FeatureService>) -> Self {
        Self { store, features }
    }

    /// Builds labeled examples from observed likes: each qualifying user
    /// contributes up to 50 positives and 3 sampled negatives per positive.
    /// The user vector is computed once and shared across that user's
    /// examples. Output order carries no guarantee; the trainer shuffles.
    pub async fn generate(&self) -> Result<Vec<TrainingExample>> {
        let users = self.store.users_with_min_likes(MIN_USER_LIKES).await?;
        let mut examples = Vec::new();

        for user_id in users {
            let liked = self
                .store
                .liked_post_ids(user_id, MAX_POSITIVES_PER_USER)
                .await?;
            if (liked.len() as i64) < MIN_USER_LIKES {
                continue;
            }

            let user_vector = self.features.build_user_vector(user_id).await?;

            let negative_ids = self.sample_negatives(user_id, liked.len()).await?;

            self.push_examples(&mut examples, &user_vector, &liked, 1.0)
                .await?;
            self.push_examples(&mut examples, &user_vector, &negative_ids, 0.0)
                .await?;
        }

        info!(count = examples.len(), "training examples generated");
        Ok(examples)
    }

    /// Negatives come from recent posts the user neither liked nor authored.
    async fn sample_negatives(&self, user_id: Uuid, positives: usize) -> Result<Vec<Uuid>> {
        let target = positives * NEGATIVES_PER_POSITIVE;
        let pool = self
            .store
            .recent_candidates(user_id, None, true, target as i64)
            .await?;

        if pool.len() < target {
            debug!(
                %user_id,
                available = pool.len(),
                target,
                "negative pool smaller than target ratio"
            );
        }

        Ok(pool.into_iter().take(target).map(|post| post.id).collect())
    }

    async fn push_examples(
        &self,
        examples: &mut Vec<TrainingExample>,
        user_vector: &[f32],
        post_ids: &[Uuid],
        label: f32,
    ) -> Result<()> {
        let post_vectors = self.features.build_post_vectors(post_ids).await?;
        for post_vector in post_vectors {
            let mut features = Vec::with_capacity(user_vector.len() + post_vector.len());
            features.extend_from_slice(user_vector);
            features.extend_from_slice(&post_vector);
            examples.push(TrainingExample {
                features,
                label,
            });
        }
        Ok(())
    }
}

pub struct TrainingPipeline {
    vocabularies: Arc<VocabularyService>,
    generator: TrainingDataGenerator,
    model: Arc<ModelService>,
    min_examples: usize,
    seed: Option<u64>,
}

impl TrainingPipeline {
    pub fn new(
        vocabularies: Arc<VocabularyService>,
        generator: TrainingDataGenerator,
        model: Arc<ModelService>,
    ) -> Self {
        Self {
            vocabularies,
            generator,
            model,
            min_examples: MIN_TRAINING_EXAMPLES,
            seed: None,
        }
    }

    /// Overrides the minimum example threshold (scenario tests).
    pub fn with_min_examples(mut self, min_examples: usize) -> Self {
        self.min_examples = min_examples;
        self
    }

    /// Fixes the RNG seed used for weight init and shuffling.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub async fn run(&self) -> Result<PipelineOutcome> {
        info!("training pipeline starting");

        self.vocabularies.rebuild_all().await?;

        let examples = self.generator.generate().await?;
        let example_count = examples.len();

        if example_count < self.min_examples {
            warn!(
                example_count,
                min = self.min_examples,
                "insufficient training data; keeping previous model"
            );
            return Ok(PipelineOutcome {
                success: false,
                example_count,
                metrics: None,
            });
        }

        let metrics = self.model.train(examples, self.seed).await?;

        info!(example_count, "training pipeline completed");
        Ok(PipelineOutcome {
            success: true,
            example_count,
            metrics: Some(metrics),
        })
    }
}
