//! Reviewer Preference Profiles
//!
//! Aggregates a reviewer's evaluations into scalar affinities over notes,
//! accords, and families. Ratings map to signed weights, so the profile
//! captures dislikes as readily as likes:
//! - 5 stars = +2.0
//! - 4 stars = +1.0
//! - 3 stars = 0.0 (neutral)
//! - 2 stars = -1.0
//! - 1 star = -2.0

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::config::RatingWeights;

use super::model::{Evaluation, Fragrance};

/// Entries kept in each of the top liked/disliked note lists
const TOP_NOTES: usize = 5;

/// Subfamily contributions land in the family map at half weight
const SUBFAMILY_FACTOR: f64 = 0.5;

/// Reviewer preference profile derived from evaluations.
///
/// Recomputable from scratch at any time; never persisted as a source of
/// truth. Missing keys in any affinity map read as 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerProfile {
    pub reviewer_id: String,

    /// Note id -> cumulative signed affinity
    pub note_affinities: HashMap<String, f64>,
    /// Note id -> display name, for veto reporting and top lists
    pub note_names: HashMap<String, String>,
    /// Accord type -> cumulative affinity, weighted by declared intensity
    pub accord_affinities: HashMap<String, f64>,
    /// Family and subfamily labels share this map; subfamilies accumulate
    /// at half weight under their own key
    pub family_affinities: HashMap<String, f64>,

    pub evaluation_count: usize,

    /// Up to 5 strictly-positive notes as (name, score), best first
    pub top_liked_notes: Vec<(String, f64)>,
    /// Up to 5 strictly-negative notes as (name, score), worst first
    pub top_disliked_notes: Vec<(String, f64)>,
}

impl ReviewerProfile {
    /// Empty profile for a reviewer with no evaluations
    pub fn empty(reviewer_id: impl Into<String>) -> Self {
        Self {
            reviewer_id: reviewer_id.into(),
            note_affinities: HashMap::new(),
            note_names: HashMap::new(),
            accord_affinities: HashMap::new(),
            family_affinities: HashMap::new(),
            evaluation_count: 0,
            top_liked_notes: Vec::new(),
            top_disliked_notes: Vec::new(),
        }
    }

    pub fn note_affinity(&self, note_id: &str) -> f64 {
        self.note_affinities.get(note_id).copied().unwrap_or(0.0)
    }

    pub fn accord_affinity(&self, accord_type: &str) -> f64 {
        self.accord_affinities
            .get(accord_type)
            .copied()
            .unwrap_or(0.0)
    }

    pub fn family_affinity(&self, family: &str) -> f64 {
        self.family_affinities.get(family).copied().unwrap_or(0.0)
    }

    /// Top `n` accords by affinity, descending, ties by name ascending
    pub fn top_accords(&self, n: usize) -> Vec<(String, f64)> {
        top_entries(&self.accord_affinities, n)
    }

    /// Top `n` family labels by affinity, descending, ties by name ascending
    pub fn top_families(&self, n: usize) -> Vec<(String, f64)> {
        top_entries(&self.family_affinities, n)
    }
}

/// Build a preference profile from a reviewer's evaluations.
///
/// Pure function of its inputs: iteration order over evaluations does not
/// affect which keys exist or their totals, and the top lists are sorted
/// with a total order (score, then name).
pub fn build_profile(
    reviewer_id: &str,
    rating_weights: &RatingWeights,
    evaluations: &[(Evaluation, Fragrance)],
) -> ReviewerProfile {
    let mut profile = ReviewerProfile::empty(reviewer_id);

    for (evaluation, fragrance) in evaluations {
        let weight = rating_weights.weight(evaluation.rating);

        // Position is recorded but deliberately not a multiplier; a note
        // counts the same whether top, heart, or base.
        for positioned in &fragrance.notes {
            *profile
                .note_affinities
                .entry(positioned.note.id.clone())
                .or_insert(0.0) += weight;
            profile
                .note_names
                .insert(positioned.note.id.clone(), positioned.note.name.clone());
        }

        for accord in &fragrance.accords {
            *profile
                .accord_affinities
                .entry(accord.accord_type.clone())
                .or_insert(0.0) += weight * accord.intensity;
        }

        // Subfamily folds into the same map at half weight. When the two
        // labels are equal the key accumulates 1.5x the weight; that is the
        // documented behavior, not a bug to dedup.
        *profile
            .family_affinities
            .entry(fragrance.primary_family.clone())
            .or_insert(0.0) += weight;
        *profile
            .family_affinities
            .entry(fragrance.subfamily.clone())
            .or_insert(0.0) += SUBFAMILY_FACTOR * weight;

        profile.evaluation_count += 1;
    }

    let mut liked: Vec<(String, f64)> = Vec::new();
    let mut disliked: Vec<(String, f64)> = Vec::new();
    for (note_id, &score) in &profile.note_affinities {
        let name = profile
            .note_names
            .get(note_id)
            .cloned()
            .unwrap_or_else(|| note_id.clone());
        if score > 0.0 {
            liked.push((name, score));
        } else if score < 0.0 {
            disliked.push((name, score));
        }
        // Exactly-zero notes appear in neither list
    }

    liked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    disliked.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    liked.truncate(TOP_NOTES);
    disliked.truncate(TOP_NOTES);

    profile.top_liked_notes = liked;
    profile.top_disliked_notes = disliked;
    profile
}

/// Sorted view of a map: value descending, key ascending on ties
fn top_entries(map: &HashMap<String, f64>, n: usize) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = map.iter().map(|(k, &v)| (k.clone(), v)).collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    entries.truncate(n);
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recommendation::model::{Accord, Note, NotePosition, PositionedNote};
    use chrono::Utc;

    fn note(id: &str, name: &str) -> PositionedNote {
        PositionedNote {
            note: Note {
                id: id.to_string(),
                name: name.to_string(),
                category: "Citrus".to_string(),
                subcategory: None,
            },
            position: NotePosition::Top,
        }
    }

    fn fragrance(
        id: &str,
        family: &str,
        subfamily: &str,
        notes: Vec<PositionedNote>,
        accords: Vec<Accord>,
    ) -> Fragrance {
        Fragrance {
            id: id.to_string(),
            name: id.to_uppercase(),
            brand: "House".to_string(),
            concentration: "EDP".to_string(),
            launch_year: None,
            gender_target: "Unisex".to_string(),
            primary_family: family.to_string(),
            subfamily: subfamily.to_string(),
            intensity: None,
            data_source: "manual".to_string(),
            external_id: None,
            notes,
            accords,
        }
    }

    fn evaluation(reviewer: &str, frag: &str, rating: u8) -> Evaluation {
        Evaluation {
            id: format!("{}-{}", reviewer, frag),
            fragrance_id: frag.to_string(),
            reviewer_id: reviewer.to_string(),
            rating,
            notes: None,
            longevity_rating: None,
            sillage_rating: None,
            evaluated_at: Utc::now(),
        }
    }

    #[test]
    fn empty_profile_has_no_affinities() {
        let profile = build_profile("r1", &RatingWeights::default(), &[]);
        assert_eq!(profile.evaluation_count, 0);
        assert!(profile.note_affinities.is_empty());
        assert!(profile.accord_affinities.is_empty());
        assert!(profile.family_affinities.is_empty());
        assert!(profile.top_liked_notes.is_empty());
        assert!(profile.top_disliked_notes.is_empty());
    }

    #[test]
    fn single_five_star_rating() {
        let frag = fragrance(
            "a",
            "fresh",
            "citrus",
            vec![note("n-berg", "Bergamot")],
            vec![Accord {
                accord_type: "citrus".to_string(),
                intensity: 0.8,
            }],
        );
        let evals = vec![(evaluation("r1", "a", 5), frag)];
        let profile = build_profile("r1", &RatingWeights::default(), &evals);

        assert_eq!(profile.note_affinity("n-berg"), 2.0);
        assert!((profile.accord_affinity("citrus") - 1.6).abs() < 1e-9);
        assert_eq!(profile.family_affinity("fresh"), 2.0);
        assert_eq!(profile.family_affinity("citrus"), 1.0);
        assert_eq!(profile.evaluation_count, 1);
        assert_eq!(profile.top_liked_notes, vec![("Bergamot".to_string(), 2.0)]);
    }

    #[test]
    fn neutral_rating_leaves_affinities_unchanged() {
        let frag = fragrance(
            "a",
            "fresh",
            "citrus",
            vec![note("n-berg", "Bergamot")],
            vec![Accord {
                accord_type: "citrus".to_string(),
                intensity: 0.8,
            }],
        );
        let evals = vec![(evaluation("r1", "a", 3), frag)];
        let profile = build_profile("r1", &RatingWeights::default(), &evals);

        assert_eq!(profile.note_affinity("n-berg"), 0.0);
        assert_eq!(profile.accord_affinity("citrus"), 0.0);
        assert_eq!(profile.family_affinity("fresh"), 0.0);
        assert_eq!(profile.evaluation_count, 1);
        // Zero-score notes belong to neither top list
        assert!(profile.top_liked_notes.is_empty());
        assert!(profile.top_disliked_notes.is_empty());
    }

    #[test]
    fn family_equal_to_subfamily_accumulates_both() {
        let frag = fragrance("a", "woody", "woody", vec![], vec![]);
        let evals = vec![(evaluation("r1", "a", 4), frag)];
        let profile = build_profile("r1", &RatingWeights::default(), &evals);

        // 1.0 from the family plus 0.5 from the subfamily, same key
        assert!((profile.family_affinity("woody") - 1.5).abs() < 1e-9);
    }

    #[test]
    fn top_lists_sorted_with_name_tiebreak() {
        let f1 = fragrance(
            "a",
            "fresh",
            "citrus",
            vec![note("n1", "Vetiver"), note("n2", "Amber")],
            vec![],
        );
        let f2 = fragrance(
            "b",
            "fresh",
            "citrus",
            vec![note("n3", "Patchouli"), note("n4", "Oud")],
            vec![],
        );
        let evals = vec![
            (evaluation("r1", "a", 5), f1),
            (evaluation("r1", "b", 1), f2),
        ];
        let profile = build_profile("r1", &RatingWeights::default(), &evals);

        // Equal scores resolve by name ascending
        assert_eq!(
            profile.top_liked_notes,
            vec![("Amber".to_string(), 2.0), ("Vetiver".to_string(), 2.0)]
        );
        assert_eq!(
            profile.top_disliked_notes,
            vec![("Oud".to_string(), -2.0), ("Patchouli".to_string(), -2.0)]
        );
    }

    #[test]
    fn evaluation_order_does_not_change_totals() {
        let f1 = fragrance(
            "a",
            "fresh",
            "citrus",
            vec![note("n1", "Bergamot")],
            vec![Accord {
                accord_type: "citrus".to_string(),
                intensity: 0.3,
            }],
        );
        let f2 = fragrance(
            "b",
            "woody",
            "mossy",
            vec![note("n1", "Bergamot")],
            vec![Accord {
                accord_type: "citrus".to_string(),
                intensity: 0.9,
            }],
        );

        let forward = vec![
            (evaluation("r1", "a", 5), f1.clone()),
            (evaluation("r1", "b", 2), f2.clone()),
        ];
        let reverse = vec![
            (evaluation("r1", "b", 2), f2),
            (evaluation("r1", "a", 5), f1),
        ];

        let p1 = build_profile("r1", &RatingWeights::default(), &forward);
        let p2 = build_profile("r1", &RatingWeights::default(), &reverse);

        assert!((p1.note_affinity("n1") - p2.note_affinity("n1")).abs() < 1e-9);
        assert!((p1.accord_affinity("citrus") - p2.accord_affinity("citrus")).abs() < 1e-9);
        assert_eq!(p1.top_liked_notes, p2.top_liked_notes);
    }

    #[test]
    fn top_entries_caps_and_orders() {
        let mut map = HashMap::new();
        for (k, v) in [("b", 2.0), ("a", 2.0), ("c", 5.0), ("d", -1.0)] {
            map.insert(k.to_string(), v);
        }
        let top = top_entries(&map, 3);
        assert_eq!(
            top,
            vec![
                ("c".to_string(), 5.0),
                ("a".to_string(), 2.0),
                ("b".to_string(), 2.0)
            ]
        );
    }
}
