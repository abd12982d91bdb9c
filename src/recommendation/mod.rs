//! Recommendation Module
//!
//! Turns reviewer ratings into personalized fragrance recommendations.
//!
//! ## Architecture
//!
//! 1. **Profile** - Aggregate a reviewer's evaluations into signed affinities
//!    over notes, accords, and families
//! 2. **Scorer** - Match a candidate fragrance against a profile, with a hard
//!    veto for strongly disliked notes
//! 3. **Engine** - Score and rank the unrated catalog deterministically
//! 4. **Explain** - Optional natural-language explanations via an LLM
//!    gateway, with rule-based fallback
//!
//! ## Algorithm Overview
//!
//! Ratings map to signed weights (1 star = -2 ... 5 stars = +2) and
//! accumulate per note, accord, and family. A candidate's match score
//! combines four components:
//! - Notes (40%): mean affinity over the candidate's note pyramid
//! - Accords (30%): mean intensity-weighted accord affinity
//! - Family (20%): affinity for the primary family
//! - Subfamily (10%): affinity for the subfamily
//!
//! The weighted raw score squashes through a logistic into (0, 1). Any note
//! with affinity below the veto threshold caps the candidate at a fixed
//! floor and sorts it last.

pub mod engine;
pub mod explain;
pub mod model;
pub mod profile;
pub mod scorer;
pub mod store;

// Re-export the types that are actually used externally
pub use engine::{ProfileSummary, Recommendation, RecommendationEngine};
pub use explain::{Explanation, ExplanationService};
pub use model::{Accord, Evaluation, Fragrance, Note, NotePosition, PositionedNote, Reviewer};
pub use profile::ReviewerProfile;
pub use scorer::MatchResult;
pub use store::{CatalogStore, MemoryStore, RatingStore};
