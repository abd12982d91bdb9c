//! Repository Interfaces
//!
//! The engine reads catalog and rating snapshots through two narrow traits so
//! the scoring pipeline makes no assumption about the backing store. The
//! Postgres implementation lives in `crate::database`; `MemoryStore` backs
//! tests and embedded use.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};

use crate::error::Result;

use super::model::{Evaluation, Fragrance, Reviewer};

/// Read access to the fragrance catalog
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Fetch a single fragrance with notes and accords loaded
    async fn fragrance(&self, id: &str) -> Result<Option<Fragrance>>;

    /// All fragrances not in `exclude`, each with notes and accords loaded
    async fn candidates(&self, exclude: &HashSet<String>) -> Result<Vec<Fragrance>>;
}

/// Read access to reviewer ratings
#[async_trait]
pub trait RatingStore: Send + Sync {
    async fn reviewer(&self, id: &str) -> Result<Option<Reviewer>>;

    /// Every evaluation by the reviewer, paired with its pre-loaded fragrance
    async fn evaluations_of(&self, reviewer_id: &str) -> Result<Vec<(Evaluation, Fragrance)>>;

    /// Ids of fragrances the reviewer has already rated
    async fn rated_fragrance_ids(&self, reviewer_id: &str) -> Result<HashSet<String>>;
}

/// In-memory catalog and rating store.
///
/// Build it up front, then share it behind an `Arc`; reads take no locks.
#[derive(Debug, Default)]
pub struct MemoryStore {
    fragrances: BTreeMap<String, Fragrance>,
    reviewers: BTreeMap<String, Reviewer>,
    evaluations: Vec<Evaluation>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_fragrance(&mut self, fragrance: Fragrance) {
        self.fragrances.insert(fragrance.id.clone(), fragrance);
    }

    pub fn insert_reviewer(&mut self, reviewer: Reviewer) {
        self.reviewers.insert(reviewer.id.clone(), reviewer);
    }

    pub fn insert_evaluation(&mut self, evaluation: Evaluation) {
        // (reviewer, fragrance) is unique; a re-rating replaces the old row
        self.evaluations.retain(|e| {
            !(e.reviewer_id == evaluation.reviewer_id
                && e.fragrance_id == evaluation.fragrance_id)
        });
        self.evaluations.push(evaluation);
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn fragrance(&self, id: &str) -> Result<Option<Fragrance>> {
        Ok(self.fragrances.get(id).cloned())
    }

    async fn candidates(&self, exclude: &HashSet<String>) -> Result<Vec<Fragrance>> {
        Ok(self
            .fragrances
            .values()
            .filter(|f| !exclude.contains(&f.id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RatingStore for MemoryStore {
    async fn reviewer(&self, id: &str) -> Result<Option<Reviewer>> {
        Ok(self.reviewers.get(id).cloned())
    }

    async fn evaluations_of(&self, reviewer_id: &str) -> Result<Vec<(Evaluation, Fragrance)>> {
        Ok(self
            .evaluations
            .iter()
            .filter(|e| e.reviewer_id == reviewer_id)
            .filter_map(|e| {
                self.fragrances
                    .get(&e.fragrance_id)
                    .map(|f| (e.clone(), f.clone()))
            })
            .collect())
    }

    async fn rated_fragrance_ids(&self, reviewer_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .evaluations
            .iter()
            .filter(|e| e.reviewer_id == reviewer_id)
            .map(|e| e.fragrance_id.clone())
            .collect())
    }
}
