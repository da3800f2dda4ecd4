pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod models;
pub mod services;
pub mod store;

pub use config::Config;
pub use error::{AppError, Result};

// Re-export the engine's service surface
pub use services::{
    DiversityFilter, ExplorationSampler, FeatureService, ModelError, ModelService,
    RecommendationService, TrainingDataGenerator, TrainingPipeline, Vocabulary, VocabularyService,
    VocabularySet,
};
