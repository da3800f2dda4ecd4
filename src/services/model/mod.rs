//! Ranking model service.
//!
//! Owns the single active model for the process. Training rebuilds the
//! network from scratch off the request path, persists the result, and swaps
//! it in atomically: concurrent predictions see either the old model or the
//! new one, never a partial state. Prediction with no trained model anywhere
//! is a hard failure; the fallback decision belongs to the orchestrator.

pub mod network;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{TrainingExample, TrainingMetrics};
use crate::services::features::{POST_VECTOR_LEN, USER_VECTOR_LEN};
use network::{DenseLayer, RankingNetwork, INPUT_DIM};

const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no training examples provided")]
    EmptyTrainingSet,

    #[error("no trained model available")]
    NotTrained,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("model artifact error: {0}")]
    Artifact(String),

    #[error("training failed: {0}")]
    Training(String),
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NotTrained => AppError::ModelUnavailable(err.to_string()),
            ModelError::InvalidInput(msg) => AppError::Inference(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct LayerWeights {
    rows: usize,
    cols: usize,
    weights: Vec<f32>,
    biases: Vec<f32>,
}

/// Serialized network parameters plus training metadata.
#[derive(Serialize, Deserialize)]
pub struct ModelArtifact {
    version: u32,
    trained_at: DateTime<Utc>,
    example_count: u64,
    layers: Vec<LayerWeights>,
}

pub struct TrainedModel {
    network: RankingNetwork,
    pub trained_at: DateTime<Utc>,
    pub example_count: u64,
}

impl TrainedModel {
    fn to_artifact(&self) -> ModelArtifact {
        let layers = [
            &self.network.l1,
            &self.network.l2,
            &self.network.l3,
            &self.network.out,
        ]
        .iter()
        .map(|layer| LayerWeights {
            rows: layer.weights.nrows(),
            cols: layer.weights.ncols(),
            weights: layer.weights.iter().copied().collect(),
            biases: layer.biases.to_vec(),
        })
        .collect();

        ModelArtifact {
            version: ARTIFACT_VERSION,
            trained_at: self.trained_at,
            example_count: self.example_count,
            layers,
        }
    }

    fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelError> {
        if artifact.version != ARTIFACT_VERSION {
            return Err(ModelError::Artifact(format!(
                "unsupported artifact version {}",
                artifact.version
            )));
        }
        if artifact.layers.len() != 4 {
            return Err(ModelError::Artifact(format!(
                "expected 4 layers, found {}",
                artifact.layers.len()
            )));
        }

        let mut layers = artifact
            .layers
            .into_iter()
            .map(|layer| {
                let weights = Array2::from_shape_vec((layer.rows, layer.cols), layer.weights)
                    .map_err(|e| ModelError::Artifact(format!("bad weight shape: {e}")))?;
                if layer.biases.len() != layer.cols {
                    return Err(ModelError::Artifact("bias length mismatch".to_string()));
                }
                Ok(DenseLayer {
                    weights,
                    biases: Array1::from_vec(layer.biases),
                })
            })
            .collect::<Result<Vec<_>, ModelError>>()?;

        let out = layers.pop().expect("layer count checked above");
        let l3 = layers.pop().expect("layer count checked above");
        let l2 = layers.pop().expect("layer count checked above");
        let l1 = layers.pop().expect("layer count checked above");

        if l1.weights.nrows() != INPUT_DIM {
            return Err(ModelError::Artifact(format!(
                "input dimension {} does not match expected {}",
                l1.weights.nrows(),
                INPUT_DIM
            )));
        }

        Ok(Self {
            network: RankingNetwork { l1, l2, l3, out },
            trained_at: artifact.trained_at,
            example_count: artifact.example_count,
        })
    }
}

pub struct ModelService {
    active: RwLock<Option<Arc<TrainedModel>>>,
    artifact_path: PathBuf,
}

impl ModelService {
    pub fn new(artifact_path: impl Into<PathBuf>) -> Self {
        Self {
            active: RwLock::new(None),
            artifact_path: artifact_path.into(),
        }
    }

    /// Trains a fresh model and, on success, persists it and makes it the
    /// active model. The heavy lifting runs on the blocking pool.
    pub async fn train(
        &self,
        examples: Vec<TrainingExample>,
        seed: Option<u64>,
    ) -> Result<TrainingMetrics, ModelError> {
        if examples.is_empty() {
            return Err(ModelError::EmptyTrainingSet);
        }
        if let Some(bad) = examples.iter().find(|e| e.features.len() != INPUT_DIM) {
            return Err(ModelError::InvalidInput(format!(
                "training example has {} features, expected {INPUT_DIM}",
                bad.features.len()
            )));
        }

        let example_count = examples.len() as u64;
        let path = self.artifact_path.clone();

        let (model, metrics) = tokio::task::spawn_blocking(move || {
            let mut rng = match seed {
                Some(s) => StdRng::seed_from_u64(s),
                None => StdRng::from_entropy(),
            };

            let n = examples.len();
            let mut flat = Vec::with_capacity(n * INPUT_DIM);
            let mut labels = Vec::with_capacity(n);
            for example in &examples {
                flat.extend_from_slice(&example.features);
                labels.push(example.label);
            }
            let features = Array2::from_shape_vec((n, INPUT_DIM), flat)
                .map_err(|e| ModelError::Training(e.to_string()))?;
            let labels = Array1::from_vec(labels);

            let mut network = RankingNetwork::new(&mut rng);
            let metrics = network.fit(&features, &labels, &mut rng);

            let model = TrainedModel {
                network,
                trained_at: Utc::now(),
                example_count,
            };
            persist_artifact(&path, &model.to_artifact())?;

            Ok::<_, ModelError>((model, metrics))
        })
        .await
        .map_err(|e| ModelError::Training(format!("training task aborted: {e}")))??;

        info!(
            examples = example_count,
            train_loss = metrics.train_loss,
            val_loss = metrics.val_loss,
            "ranking model trained and persisted"
        );

        self.install(model).await;
        Ok(metrics)
    }

    /// Scores one user against a batch of candidate posts. Scores come back
    /// in input order.
    pub async fn predict(
        &self,
        user_vector: &[f32],
        post_vectors: &[Vec<f32>],
    ) -> Result<Vec<f32>, ModelError> {
        if user_vector.len() != USER_VECTOR_LEN {
            return Err(ModelError::InvalidInput(format!(
                "user vector has {} features, expected {USER_VECTOR_LEN}",
                user_vector.len()
            )));
        }
        if let Some(bad) = post_vectors.iter().find(|v| v.len() != POST_VECTOR_LEN) {
            return Err(ModelError::InvalidInput(format!(
                "post vector has {} features, expected {POST_VECTOR_LEN}",
                bad.len()
            )));
        }

        let model = self.resident().await.ok_or(ModelError::NotTrained)?;

        if post_vectors.is_empty() {
            return Ok(Vec::new());
        }

        let n = post_vectors.len();
        let mut flat = Vec::with_capacity(n * INPUT_DIM);
        for post_vector in post_vectors {
            flat.extend_from_slice(user_vector);
            flat.extend_from_slice(post_vector);
        }
        let inputs = Array2::from_shape_vec((n, INPUT_DIM), flat)
            .map_err(|e| ModelError::InvalidInput(e.to_string()))?;

        Ok(model.network.predict(&inputs).to_vec())
    }

    pub async fn is_trained(&self) -> bool {
        self.resident().await.is_some()
    }

    pub async fn last_trained_at(&self) -> Option<DateTime<Utc>> {
        self.resident().await.map(|model| model.trained_at)
    }

    pub async fn total_training_examples(&self) -> u64 {
        self.resident()
            .await
            .map(|model| model.example_count)
            .unwrap_or(0)
    }

    /// Makes `model` the active model. Readers holding the previous `Arc`
    /// finish against the old parameters.
    pub async fn install(&self, model: TrainedModel) {
        *self.active.write().await = Some(Arc::new(model));
    }

    /// The active model, lazily reloaded from the artifact path when the
    /// process has none resident.
    async fn resident(&self) -> Option<Arc<TrainedModel>> {
        if let Some(model) = self.active.read().await.as_ref() {
            return Some(Arc::clone(model));
        }

        match load_artifact(&self.artifact_path) {
            Ok(Some(model)) => {
                let mut guard = self.active.write().await;
                if let Some(existing) = guard.as_ref() {
                    return Some(Arc::clone(existing));
                }
                let model = Arc::new(model);
                *guard = Some(Arc::clone(&model));
                info!(path = %self.artifact_path.display(), "ranking model loaded from artifact");
                Some(model)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(path = %self.artifact_path.display(), error = %e, "failed to load model artifact");
                None
            }
        }
    }
}

fn persist_artifact(path: &Path, artifact: &ModelArtifact) -> Result<(), ModelError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ModelError::Artifact(format!("creating {}: {e}", parent.display())))?;
        }
    }
    let bytes = bincode::serialize(artifact)
        .map_err(|e| ModelError::Artifact(format!("serializing artifact: {e}")))?;
    std::fs::write(path, bytes)
        .map_err(|e| ModelError::Artifact(format!("writing {}: {e}", path.display())))
}

fn load_artifact(path: &Path) -> Result<Option<TrainedModel>, ModelError> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = std::fs::read(path)
        .map_err(|e| ModelError::Artifact(format!("reading {}: {e}", path.display())))?;
    let artifact: ModelArtifact = bincode::deserialize(&bytes)
        .map_err(|e| ModelError::Artifact(format!("decoding {}: {e}", path.display())))?;
    TrainedModel::from_artifact(artifact).map(Some)
}
