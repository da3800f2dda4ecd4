pub mod diversity;
pub mod exploration;
pub mod features;
pub mod feed;
pub mod model;
pub mod training;
pub mod vocabulary;

pub use diversity::DiversityFilter;
pub use exploration::ExplorationSampler;
pub use features::FeatureService;
pub use feed::RecommendationService;
pub use model::{ModelError, ModelService};
pub use training::{TrainingDataGenerator, TrainingPipeline};
pub use vocabulary::{Vocabulary, VocabularyService, VocabularySet};
