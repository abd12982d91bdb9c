//! Recommendation Engine
//!
//! Ranks unseen fragrances for a reviewer: builds the preference profile,
//! scores every candidate, and orders the result deterministically with
//! vetoed items last. Repeated runs over unchanged inputs produce identical
//! output.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::config::{ScoringConfig, MAX_RECOMMENDATION_LIMIT};
use crate::error::{Error, Result};

use super::model::{Fragrance, Reviewer};
use super::profile::{build_profile, ReviewerProfile};
use super::scorer::{score_fragrance, MatchResult, ScoreComponents};
use super::store::{CatalogStore, RatingStore};

/// A fragrance recommendation with match details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub fragrance_id: String,
    pub fragrance_name: String,
    pub fragrance_brand: String,
    /// Normalized match score in (0, 1)
    pub match_score: f64,
    /// floor(match_score * 100)
    pub match_percent: u8,
    pub vetoed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub veto_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<ScoreComponents>,
}

impl Recommendation {
    /// Assemble a recommendation from a scored match
    pub fn from_match(fragrance: &Fragrance, result: MatchResult) -> Self {
        Self {
            fragrance_id: fragrance.id.clone(),
            fragrance_name: fragrance.name.clone(),
            fragrance_brand: fragrance.brand.clone(),
            match_score: result.score,
            match_percent: result.score_percent,
            vetoed: result.vetoed,
            veto_reason: result
                .veto_note
                .map(|note| format!("Contains {} which you dislike", note)),
            components: result.components,
        }
    }
}

/// Reviewer preference summary for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub reviewer_id: String,
    pub evaluation_count: usize,
    pub top_liked_notes: Vec<(String, f64)>,
    pub top_disliked_notes: Vec<(String, f64)>,
    pub top_accords: Vec<(String, f64)>,
    pub top_families: Vec<(String, f64)>,
}

/// Entries in each of the summary's accord/family lists
const TOP_SUMMARY: usize = 5;

/// Main recommendation engine
#[derive(Clone)]
pub struct RecommendationEngine {
    catalog: Arc<dyn CatalogStore>,
    ratings: Arc<dyn RatingStore>,
    config: ScoringConfig,
}

impl RecommendationEngine {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        ratings: Arc<dyn RatingStore>,
        config: ScoringConfig,
    ) -> Self {
        Self {
            catalog,
            ratings,
            config,
        }
    }

    /// Fetch a reviewer or fail with NotFound
    pub async fn reviewer(&self, reviewer_id: &str) -> Result<Reviewer> {
        self.ratings
            .reviewer(reviewer_id)
            .await?
            .ok_or_else(|| Error::not_found("reviewer", reviewer_id))
    }

    /// Fetch a fragrance or fail with NotFound
    pub async fn fragrance(&self, fragrance_id: &str) -> Result<Fragrance> {
        self.catalog
            .fragrance(fragrance_id)
            .await?
            .ok_or_else(|| Error::not_found("fragrance", fragrance_id))
    }

    /// Build the reviewer's preference profile from their evaluations
    pub async fn build_profile(&self, reviewer_id: &str) -> Result<ReviewerProfile> {
        self.reviewer(reviewer_id).await?;
        let evaluations = self.ratings.evaluations_of(reviewer_id).await?;
        Ok(build_profile(
            reviewer_id,
            &self.config.rating_weights,
            &evaluations,
        ))
    }

    /// Generate the top-N recommendations for a reviewer.
    ///
    /// Requires `min_evaluations` rated fragrances. With `exclude_rated`
    /// (the default surface behavior) already-rated fragrances never appear.
    pub async fn recommendations(
        &self,
        reviewer_id: &str,
        limit: Option<usize>,
        exclude_rated: bool,
    ) -> Result<Vec<Recommendation>> {
        let profile = self.build_profile(reviewer_id).await?;

        if profile.evaluation_count < self.config.min_evaluations {
            return Err(Error::InsufficientData {
                current: profile.evaluation_count,
                required: self.config.min_evaluations,
            });
        }

        let exclude = if exclude_rated {
            self.ratings.rated_fragrance_ids(reviewer_id).await?
        } else {
            HashSet::new()
        };
        let candidates = self.catalog.candidates(&exclude).await?;

        let limit = limit
            .unwrap_or(self.config.default_limit)
            .min(MAX_RECOMMENDATION_LIMIT);

        let mut scored: Vec<Recommendation> = Vec::with_capacity(candidates.len());
        for fragrance in &candidates {
            let result = score_fragrance(&self.config, &profile, fragrance);
            scored.push(Recommendation::from_match(fragrance, result));
        }

        // Non-vetoed first, then score descending; name and id make the
        // order total so equal scores cannot reshuffle between runs.
        scored.sort_by(|a, b| {
            a.vetoed
                .cmp(&b.vetoed)
                .then_with(|| {
                    b.match_score
                        .partial_cmp(&a.match_score)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.fragrance_name.cmp(&b.fragrance_name))
                .then_with(|| a.fragrance_id.cmp(&b.fragrance_id))
        });
        scored.truncate(limit);

        debug!(
            "Generated {} recommendations for reviewer {} from {} candidates",
            scored.len(),
            reviewer_id,
            candidates.len()
        );

        Ok(scored)
    }

    /// Score a single fragrance for a reviewer without ranking the catalog.
    ///
    /// Used by the explanation surface; no minimum-evaluation gate applies.
    pub async fn match_for(
        &self,
        reviewer_id: &str,
        fragrance_id: &str,
    ) -> Result<(Recommendation, ReviewerProfile, Fragrance)> {
        let profile = self.build_profile(reviewer_id).await?;
        let fragrance = self.fragrance(fragrance_id).await?;
        let result = score_fragrance(&self.config, &profile, &fragrance);
        Ok((
            Recommendation::from_match(&fragrance, result),
            profile,
            fragrance,
        ))
    }

    /// Surface the reviewer's profile for display
    pub async fn profile_summary(&self, reviewer_id: &str) -> Result<ProfileSummary> {
        let profile = self.build_profile(reviewer_id).await?;
        Ok(ProfileSummary {
            reviewer_id: profile.reviewer_id.clone(),
            evaluation_count: profile.evaluation_count,
            top_accords: profile.top_accords(TOP_SUMMARY),
            top_families: profile.top_families(TOP_SUMMARY),
            top_liked_notes: profile.top_liked_notes,
            top_disliked_notes: profile.top_disliked_notes,
        })
    }
}
