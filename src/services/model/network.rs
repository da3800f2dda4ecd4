//! Feed-forward ranking network.
//!
//! Fully connected 393 → 128 → 64 → 32 → 1 with ReLU hidden activations,
//! dropout after the first two hidden layers, and a sigmoid output read as
//! P(user engages with post). Trained with mini-batch SGD on binary
//! cross-entropy; weights use He-normal initialization.

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

use crate::models::TrainingMetrics;
use crate::services::features::{POST_VECTOR_LEN, USER_VECTOR_LEN};

pub const INPUT_DIM: usize = USER_VECTOR_LEN + POST_VECTOR_LEN;

const HIDDEN_DIMS: [usize; 3] = [128, 64, 32];
const DROPOUT_RATES: [f32; 2] = [0.3, 0.2];
const LEARNING_RATE: f32 = 0.01;
const BATCH_SIZE: usize = 32;
const EPOCHS: usize = 15;
const VALIDATION_SPLIT: f32 = 0.1;

#[derive(Debug, Clone)]
pub(crate) struct DenseLayer {
    pub(crate) weights: Array2<f32>,
    pub(crate) biases: Array1<f32>,
}

impl DenseLayer {
    /// He-normal initialization: N(0, sqrt(2 / fan_in)), sampled with a
    /// Box-Muller transform so only a uniform source is needed.
    fn he_init(fan_in: usize, fan_out: usize, rng: &mut StdRng) -> Self {
        let std = (2.0 / fan_in as f32).sqrt();
        let weights = Array2::from_shape_fn((fan_in, fan_out), |_| {
            let u1: f32 = rng.gen_range(1e-4f32..1.0);
            let u2: f32 = rng.gen_range(0.0f32..1.0);
            std * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f32::consts::PI * u2).cos()
        });

        Self {
            weights,
            biases: Array1::zeros(fan_out),
        }
    }

    fn forward(&self, inputs: &Array2<f32>) -> Array2<f32> {
        let mut z = inputs.dot(&self.weights);
        z += &self.biases;
        z
    }

    fn update(&mut self, weight_grad: &Array2<f32>, bias_grad: &Array1<f32>) {
        self.weights.scaled_add(-LEARNING_RATE, weight_grad);
        self.biases.scaled_add(-LEARNING_RATE, bias_grad);
    }
}

pub struct RankingNetwork {
    pub(crate) l1: DenseLayer,
    pub(crate) l2: DenseLayer,
    pub(crate) l3: DenseLayer,
    pub(crate) out: DenseLayer,
}

impl RankingNetwork {
    pub fn new(rng: &mut StdRng) -> Self {
        Self {
            l1: DenseLayer::he_init(INPUT_DIM, HIDDEN_DIMS[0], rng),
            l2: DenseLayer::he_init(HIDDEN_DIMS[0], HIDDEN_DIMS[1], rng),
            l3: DenseLayer::he_init(HIDDEN_DIMS[1], HIDDEN_DIMS[2], rng),
            out: DenseLayer::he_init(HIDDEN_DIMS[2], 1, rng),
        }
    }

    /// Inference pass: no dropout. One probability per input row, in order.
    pub fn predict(&self, inputs: &Array2<f32>) -> Array1<f32> {
        let a1 = relu(&self.l1.forward(inputs));
        let a2 = relu(&self.l2.forward(&a1));
        let a3 = relu(&self.l3.forward(&a2));
        let p = sigmoid(&self.out.forward(&a3));
        p.index_axis(Axis(1), 0).to_owned()
    }

    /// Fits the network in place: shuffled mini-batches for a fixed epoch
    /// budget, with a held-out validation split scored at the end.
    pub fn fit(
        &mut self,
        features: &Array2<f32>,
        labels: &Array1<f32>,
        rng: &mut StdRng,
    ) -> TrainingMetrics {
        let n = features.nrows();
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(rng);

        let val_len = (((n as f32) * VALIDATION_SPLIT).floor() as usize).min(n.saturating_sub(1));
        let (val_idx, train_idx) = indices.split_at(val_len);

        let train_x = features.select(Axis(0), train_idx);
        let train_y = labels.select(Axis(0), train_idx);

        let mut order: Vec<usize> = (0..train_x.nrows()).collect();
        let mut train_loss = 0.0;

        for epoch in 0..EPOCHS {
            order.shuffle(rng);

            let mut epoch_loss = 0.0;
            let mut batches = 0;
            for chunk in order.chunks(BATCH_SIZE) {
                let x = train_x.select(Axis(0), chunk);
                let y = train_y.select(Axis(0), chunk);
                epoch_loss += self.train_batch(&x, &y, rng);
                batches += 1;
            }

            train_loss = epoch_loss / batches.max(1) as f32;
            debug!(epoch, loss = train_loss, "training epoch complete");
        }

        let val_loss = if val_idx.is_empty() {
            train_loss
        } else {
            let val_x = features.select(Axis(0), val_idx);
            let val_y = labels.select(Axis(0), val_idx);
            bce_loss(&self.predict(&val_x), &val_y)
        };

        TrainingMetrics {
            epochs: EPOCHS,
            train_loss,
            val_loss,
        }
    }

    /// One SGD step over a mini-batch; returns the batch loss.
    fn train_batch(&mut self, x: &Array2<f32>, y: &Array1<f32>, rng: &mut StdRng) -> f32 {
        let batch = x.nrows() as f32;

        let z1 = self.l1.forward(x);
        let a1 = relu(&z1);
        let m1 = dropout_mask(a1.dim(), DROPOUT_RATES[0], rng);
        let d1 = &a1 * &m1;

        let z2 = self.l2.forward(&d1);
        let a2 = relu(&z2);
        let m2 = dropout_mask(a2.dim(), DROPOUT_RATES[1], rng);
        let d2 = &a2 * &m2;

        let z3 = self.l3.forward(&d2);
        let a3 = relu(&z3);

        let z4 = self.out.forward(&a3);
        let p = sigmoid(&z4);

        let loss = bce_loss(&p.index_axis(Axis(1), 0).to_owned(), y);

        // Binary cross-entropy through the sigmoid: dL/dz = (p - y) / batch.
        let y_col = y.view().insert_axis(Axis(1));
        let dz4 = (&p - &y_col) / batch;

        let gw4 = a3.t().dot(&dz4);
        let gb4 = dz4.sum_axis(Axis(0));
        let da3 = dz4.dot(&self.out.weights.t());
        let dz3 = &da3 * &relu_grad(&z3);

        let gw3 = d2.t().dot(&dz3);
        let gb3 = dz3.sum_axis(Axis(0));
        let dd2 = dz3.dot(&self.l3.weights.t());
        let dz2 = &(&dd2 * &m2) * &relu_grad(&z2);

        let gw2 = d1.t().dot(&dz2);
        let gb2 = dz2.sum_axis(Axis(0));
        let dd1 = dz2.dot(&self.l2.weights.t());
        let dz1 = &(&dd1 * &m1) * &relu_grad(&z1);

        let gw1 = x.t().dot(&dz1);
        let gb1 = dz1.sum_axis(Axis(0));

        self.out.update(&gw4, &gb4);
        self.l3.update(&gw3, &gb3);
        self.l2.update(&gw2, &gb2);
        self.l1.update(&gw1, &gb1);

        loss
    }
}

fn relu(z: &Array2<f32>) -> Array2<f32> {
    z.mapv(|v| v.max(0.0))
}

fn relu_grad(z: &Array2<f32>) -> Array2<f32> {
    z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
}

fn sigmoid(z: &Array2<f32>) -> Array2<f32> {
    z.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Inverted dropout: kept activations are scaled by 1/keep so inference
/// needs no rescaling.
fn dropout_mask(dim: (usize, usize), rate: f32, rng: &mut StdRng) -> Array2<f32> {
    let keep = 1.0 - rate;
    Array2::from_shape_fn(dim, |_| {
        if rng.gen::<f32>() < keep {
            1.0 / keep
        } else {
            0.0
        }
    })
}

pub(crate) fn bce_loss(preds: &Array1<f32>, labels: &Array1<f32>) -> f32 {
    const EPS: f32 = 1e-7;
    let n = preds.len().max(1) as f32;
    preds
        .iter()
        .zip(labels.iter())
        .map(|(p, y)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum::<f32>()
        / n
}
