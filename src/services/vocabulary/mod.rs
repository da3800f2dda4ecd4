//! Term vocabularies.
//!
//! Projects sparse categorical signals (hashtags, skills) into fixed vector
//! slots. A vocabulary holds the K most frequent normalized terms in the
//! corpus; slot order is frequency rank with ties broken by first encounter.
//!
//! Every rebuild bumps an epoch. Feature vectors are stamped with the epoch
//! they were built under, so vectors from a previous vocabulary generation
//! read as cache misses instead of mixing slot assignments.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::cache::{vocabulary_key, CacheStore};
use crate::error::Result;
use crate::store::ContentStore;

pub const HASHTAG_VOCAB_SIZE: usize = 128;
pub const SKILL_VOCAB_SIZE: usize = 64;

pub fn normalize_term(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Ordered term → slot mapping. Slots form a bijection onto `[0, len)`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vocabulary {
    slots: HashMap<String, usize>,
}

impl Vocabulary {
    /// Builds a vocabulary from raw term lists: normalize, count, rank by
    /// frequency (ties by first encounter), truncate to `capacity`.
    pub fn from_term_lists(lists: &[Vec<String>], capacity: usize) -> Self {
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        let mut next_seen = 0usize;

        for term in lists.iter().flatten() {
            let normalized = normalize_term(term);
            if normalized.is_empty() {
                continue;
            }
            let entry = counts.entry(normalized).or_insert_with(|| {
                let order = next_seen;
                next_seen += 1;
                (0, order)
            });
            entry.0 += 1;
        }

        let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        ranked.truncate(capacity);

        let slots = ranked
            .into_iter()
            .enumerate()
            .map(|(slot, (term, _))| (term, slot))
            .collect();

        Self { slots }
    }

    /// Slot index for a term, normalizing first. Terms outside the
    /// vocabulary return None and are dropped by callers.
    pub fn slot(&self, term: &str) -> Option<usize> {
        self.slots.get(&normalize_term(term)).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[cfg(test)]
    fn slot_values(&self) -> Vec<usize> {
        self.slots.values().copied().collect()
    }
}

/// Both vocabularies plus the epoch they were built under.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocabularySet {
    pub hashtags: Vocabulary,
    pub skills: Vocabulary,
    pub epoch: u64,
    pub built_at: DateTime<Utc>,
}

pub struct VocabularyService {
    store: Arc<dyn ContentStore>,
    cache: Arc<dyn CacheStore>,
    ttl_seconds: u64,
    current: RwLock<Option<Arc<VocabularySet>>>,
}

impl VocabularyService {
    pub fn new(store: Arc<dyn ContentStore>, cache: Arc<dyn CacheStore>, ttl_seconds: u64) -> Self {
        Self {
            store,
            cache,
            ttl_seconds,
            current: RwLock::new(None),
        }
    }

    pub async fn build_hashtag_vocabulary(&self) -> Result<Vocabulary> {
        let lists = self.store.all_hashtag_lists().await?;
        Ok(Vocabulary::from_term_lists(&lists, HASHTAG_VOCAB_SIZE))
    }

    pub async fn build_skill_vocabulary(&self) -> Result<Vocabulary> {
        let lists = self.store.all_skill_lists().await?;
        Ok(Vocabulary::from_term_lists(&lists, SKILL_VOCAB_SIZE))
    }

    /// Discards any cached vocabularies and rebuilds both from the corpus.
    /// The new set carries the next epoch.
    pub async fn rebuild_all(&self) -> Result<Arc<VocabularySet>> {
        let epoch = self.known_epoch().await + 1;

        let hashtags = self.build_hashtag_vocabulary().await?;
        let skills = self.build_skill_vocabulary().await?;

        let set = Arc::new(VocabularySet {
            hashtags,
            skills,
            epoch,
            built_at: Utc::now(),
        });

        info!(
            epoch,
            hashtag_terms = set.hashtags.len(),
            skill_terms = set.skills.len(),
            "vocabularies rebuilt"
        );

        *self.current.write().await = Some(Arc::clone(&set));
        self.write_through(&set).await;

        Ok(set)
    }

    /// The active vocabulary set: in-process copy if present, then the
    /// cache, then a fresh rebuild.
    pub async fn current(&self) -> Result<Arc<VocabularySet>> {
        if let Some(set) = self.current.read().await.as_ref() {
            return Ok(Arc::clone(set));
        }

        if let Some(set) = self.read_cached().await {
            let set = Arc::new(set);
            *self.current.write().await = Some(Arc::clone(&set));
            return Ok(set);
        }

        self.rebuild_all().await
    }

    async fn known_epoch(&self) -> u64 {
        if let Some(set) = self.current.read().await.as_ref() {
            return set.epoch;
        }
        self.read_cached().await.map(|set| set.epoch).unwrap_or(0)
    }

    async fn read_cached(&self) -> Option<VocabularySet> {
        let raw = self.cache.try_get(vocabulary_key()).await?;
        match serde_json::from_str(&raw) {
            Ok(set) => Some(set),
            Err(e) => {
                warn!(error = %e, "discarding unreadable cached vocabulary");
                None
            }
        }
    }

    async fn write_through(&self, set: &VocabularySet) {
        match serde_json::to_string(set) {
            Ok(json) => {
                if !self
                    .cache
                    .try_set(vocabulary_key(), &json, self.ttl_seconds)
                    .await
                {
                    debug!("vocabulary cache write dropped");
                }
            }
            Err(e) => warn!(error = %e, "vocabulary serialization failed"),
        }
    }
}
