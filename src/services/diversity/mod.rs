//! Author diversity enforcement.
//!
//! A single greedy pass over the ranked list: a post is admitted only while
//! its author holds fewer than the cap. Rank order decides which of an
//! author's posts survive; this is not a global re-optimization.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::ScoredPost;

pub const DEFAULT_MAX_POSTS_PER_AUTHOR: usize = 2;

pub struct DiversityFilter {
    max_per_author: usize,
}

impl Default for DiversityFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POSTS_PER_AUTHOR)
    }
}

impl DiversityFilter {
    pub fn new(max_per_author: usize) -> Self {
        Self { max_per_author }
    }

    pub fn apply(&self, ranked: Vec<ScoredPost>) -> Vec<ScoredPost> {
        let mut admitted_per_author: HashMap<Uuid, usize> = HashMap::new();
        let mut admitted = Vec::with_capacity(ranked.len());

        for post in ranked {
            let count = admitted_per_author.entry(post.author_id).or_insert(0);
            if *count < self.max_per_author {
                *count += 1;
                admitted.push(post);
            }
        }

        admitted
    }
}
