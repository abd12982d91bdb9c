//! Match Scoring
//!
//! Scores a candidate fragrance against a reviewer profile. A hard veto
//! fires first: any note the reviewer has strongly disliked caps the score
//! at a fixed floor. Otherwise four component scores combine under the
//! configured weighting and squash through a logistic into (0, 1).
//!
//! Called in the ranker's inner loop; must stay side-effect free and
//! allocation-light.

use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;

use super::model::Fragrance;
use super::profile::ReviewerProfile;

/// Fixed floor assigned to vetoed candidates; not a computed score
pub const VETO_SCORE: f64 = 0.1;

/// Per-component breakdown of a non-vetoed match
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreComponents {
    pub notes: f64,
    pub accords: f64,
    pub family: f64,
    pub subfamily: f64,
    pub raw: f64,
}

/// Result of scoring one fragrance against one profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    /// Normalized match score in (0, 1); exactly 0.1 when vetoed
    pub score: f64,
    /// floor(score * 100)
    pub score_percent: u8,
    pub vetoed: bool,
    /// Name of the first vetoing note (by name ascending), if any
    pub veto_note: Option<String>,
    /// Absent on veto
    pub components: Option<ScoreComponents>,
}

/// Score a candidate fragrance against a reviewer profile.
///
/// Missing affinity keys read as 0, and a mean over an empty note or accord
/// set is 0; sparse data degrades the score smoothly instead of failing.
pub fn score_fragrance(
    config: &ScoringConfig,
    profile: &ReviewerProfile,
    fragrance: &Fragrance,
) -> MatchResult {
    // Veto check first, in deterministic order: note name ascending, id as
    // the final tiebreak so equal names cannot flip the reported note.
    let mut ordered: Vec<(&str, &str)> = fragrance
        .notes
        .iter()
        .map(|pn| (pn.note.name.as_str(), pn.note.id.as_str()))
        .collect();
    ordered.sort_unstable();

    for (name, note_id) in &ordered {
        if profile.note_affinity(note_id) < config.veto_threshold {
            return MatchResult {
                score: VETO_SCORE,
                score_percent: (VETO_SCORE * 100.0).floor() as u8,
                vetoed: true,
                veto_note: Some((*name).to_string()),
                components: None,
            };
        }
    }

    let note_count = fragrance.notes.len();
    let notes = if note_count == 0 {
        0.0
    } else {
        fragrance
            .notes
            .iter()
            .map(|pn| profile.note_affinity(&pn.note.id))
            .sum::<f64>()
            / note_count as f64
    };

    // Intensity already weighted the accumulation; applying it again here is
    // the documented behavior for strongly-expressed accords.
    let accord_count = fragrance.accords.len();
    let accords = if accord_count == 0 {
        0.0
    } else {
        fragrance
            .accords
            .iter()
            .map(|a| profile.accord_affinity(&a.accord_type) * a.intensity)
            .sum::<f64>()
            / accord_count as f64
    };

    let family = profile.family_affinity(&fragrance.primary_family);
    let subfamily = profile.family_affinity(&fragrance.subfamily);

    let w = &config.weights;
    let raw = w.notes * notes + w.accords * accords + w.family * family + w.subfamily * subfamily;

    // Components are unbounded signed sums; the logistic maps raw=0 to 0.5
    // and saturates gracefully at the extremes.
    let score = 1.0 / (1.0 + (-raw).exp());

    MatchResult {
        score,
        score_percent: (score * 100.0).floor() as u8,
        vetoed: false,
        veto_note: None,
        components: Some(ScoreComponents {
            notes,
            accords,
            family,
            subfamily,
            raw,
        }),
    }
}
