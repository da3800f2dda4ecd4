//! Exploration injection.
//!
//! Surfaces a small share of non-ranked recent posts inside every feed so
//! novel content gets impressions and the next training cycle gets signal.
//! The RNG seed is injectable so scenario tests can pin exact membership;
//! production passes None and samples from entropy.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::models::{ScoreSource, ScoredPost};
use crate::store::PostRecord;

/// Share of the diversified list supplemented by exploration items.
pub const EXPLORATION_RATIO: f32 = 0.1;

/// The candidate pool is oversampled by this factor relative to the target
/// count so the uniform draw has room to vary.
pub const POOL_OVERSAMPLE: usize = 3;

pub struct ExplorationSampler {
    seed: Option<u64>,
}

impl ExplorationSampler {
    pub fn new(seed: Option<u64>) -> Self {
        Self { seed }
    }

    /// How many exploration items a list of `list_len` ranked posts gets.
    pub fn target_count(&self, list_len: usize) -> usize {
        (list_len as f32 * EXPLORATION_RATIO).ceil() as usize
    }

    /// Picks `target_count` posts uniformly from `pool` and interleaves them
    /// into `ranked` at roughly even intervals, tagged as exploration with
    /// score zero. With an empty pool the list passes through unchanged.
    pub fn inject(&self, ranked: Vec<ScoredPost>, pool: Vec<PostRecord>) -> Vec<ScoredPost> {
        let count = self.target_count(ranked.len());
        if count == 0 || pool.is_empty() {
            return ranked;
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let picks: Vec<ScoredPost> = pool
            .choose_multiple(&mut rng, count)
            .map(|record| ScoredPost {
                post_id: record.id,
                author_id: record.author_id,
                score: 0.0,
                source: ScoreSource::Exploration,
            })
            .collect();

        let step = (ranked.len() / (count + 1)).max(1);
        let mut merged = ranked;
        for (i, pick) in picks.into_iter().enumerate() {
            let position = ((i + 1) * step + i).min(merged.len());
            merged.insert(position, pick);
        }

        merged
    }
}
