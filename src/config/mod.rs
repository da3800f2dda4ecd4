use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub redis: RedisConfig,
    pub model: ModelConfig,
    pub feed: FeedConfig,
    pub training: TrainingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub feed_ttl_seconds: u64,
    pub feature_ttl_seconds: u64,
    pub vocabulary_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub artifact_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub candidate_pool_size: i64,
    pub min_ml_interactions: i64,
    pub heuristic_window_days: i64,
    pub max_page_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    pub interval_seconds: u64,
    pub initial_delay_seconds: u64,
    pub min_examples: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Config {
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
                feed_ttl_seconds: env::var("FEED_CACHE_TTL_SECONDS")
                    .unwrap_or_else(|_| "600".to_string())
                    .parse()
                    .expect("FEED_CACHE_TTL_SECONDS must be a valid u64"),
                feature_ttl_seconds: env::var("FEATURE_CACHE_TTL_SECONDS")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .expect("FEATURE_CACHE_TTL_SECONDS must be a valid u64"),
                vocabulary_ttl_seconds: env::var("VOCABULARY_CACHE_TTL_SECONDS")
                    .unwrap_or_else(|_| "86400".to_string())
                    .parse()
                    .expect("VOCABULARY_CACHE_TTL_SECONDS must be a valid u64"),
            },
            model: ModelConfig {
                artifact_path: env::var("MODEL_ARTIFACT_PATH")
                    .unwrap_or_else(|_| "models/ranking_model.bin".to_string()),
            },
            feed: FeedConfig {
                candidate_pool_size: env::var("CANDIDATE_POOL_SIZE")
                    .unwrap_or_else(|_| "200".to_string())
                    .parse()
                    .expect("CANDIDATE_POOL_SIZE must be a valid i64"),
                min_ml_interactions: env::var("MIN_ML_INTERACTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .expect("MIN_ML_INTERACTIONS must be a valid i64"),
                heuristic_window_days: env::var("HEURISTIC_WINDOW_DAYS")
                    .unwrap_or_else(|_| "7".to_string())
                    .parse()
                    .expect("HEURISTIC_WINDOW_DAYS must be a valid i64"),
                max_page_size: env::var("MAX_PAGE_SIZE")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()
                    .expect("MAX_PAGE_SIZE must be a valid u32"),
            },
            training: TrainingConfig {
                interval_seconds: env::var("TRAINING_INTERVAL_SECONDS")
                    .unwrap_or_else(|_| "21600".to_string())
                    .parse()
                    .expect("TRAINING_INTERVAL_SECONDS must be a valid u64"),
                initial_delay_seconds: env::var("TRAINING_INITIAL_DELAY_SECONDS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .expect("TRAINING_INITIAL_DELAY_SECONDS must be a valid u64"),
                min_examples: env::var("TRAINING_MIN_EXAMPLES")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .expect("TRAINING_MIN_EXAMPLES must be a valid usize"),
            },
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            candidate_pool_size: 200,
            min_ml_interactions: 5,
            heuristic_window_days: 7,
            max_page_size: 100,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_config_defaults() {
        let feed = FeedConfig::default();
        assert_eq!(feed.candidate_pool_size, 200);
        assert_eq!(feed.min_ml_interactions, 5);
        assert_eq!(feed.heuristic_window_days, 7);
    }
}
