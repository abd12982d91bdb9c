//! End-to-end recommendation scenarios over the in-memory store.

use std::sync::Arc;

use chrono::Utc;
use scentgraph::config::{LlmConfig, ScoringConfig};
use scentgraph::error::Error;
use scentgraph::recommendation::engine::RecommendationEngine;
use scentgraph::recommendation::explain::ExplanationService;
use scentgraph::recommendation::model::{
    Accord, Evaluation, Fragrance, Note, NotePosition, PositionedNote, Reviewer,
};
use scentgraph::recommendation::store::MemoryStore;

fn positioned(id: &str, name: &str, position: NotePosition) -> PositionedNote {
    PositionedNote {
        note: Note {
            id: id.to_string(),
            name: name.to_string(),
            category: "Misc".to_string(),
            subcategory: None,
        },
        position,
    }
}

fn fragrance(
    id: &str,
    name: &str,
    family: &str,
    subfamily: &str,
    notes: Vec<PositionedNote>,
    accords: Vec<Accord>,
) -> Fragrance {
    Fragrance {
        id: id.to_string(),
        name: name.to_string(),
        brand: "House".to_string(),
        concentration: "EDP".to_string(),
        launch_year: Some(2021),
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

fn engine(store: MemoryStore) -> RecommendationEngine {
    let store = Arc::new(store);
    RecommendationEngine::new(store.clone(), store, ScoringConfig::default())
}

fn store_with_reviewer() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.insert_reviewer(Reviewer {
        id: "r1".to_string(),
        name: "Avery".to_string(),
    });
    store
}

#[tokio::test]
async fn single_five_star_rating_builds_expected_affinities() {
    let mut store = store_with_reviewer();
    store.insert_fragrance(fragrance(
        "a",
        "Aqua Breeze",
        "fresh",
        "citrus",
        vec![positioned("n-berg", "Bergamot", NotePosition::Top)],
        vec![Accord {
            accord_type: "citrus".to_string(),
            intensity: 0.8,
        }],
    ));
    store.insert_evaluation(evaluation("r1", "a", 5));
    let engine = engine(store);

    let profile = engine.build_profile("r1").await.unwrap();
    assert_eq!(profile.note_affinity("n-berg"), 2.0);
    assert!((profile.accord_affinity("citrus") - 1.6).abs() < 1e-9);
    assert_eq!(profile.family_affinity("fresh"), 2.0);
    assert_eq!(profile.family_affinity("citrus"), 1.0);
    assert_eq!(profile.evaluation_count, 1);
}

#[tokio::test]
async fn two_ratings_yield_insufficient_data() {
    let mut store = store_with_reviewer();
    for id in ["a", "b", "c"] {
        store.insert_fragrance(fragrance(id, id, "fresh", "citrus", vec![], vec![]));
    }
    store.insert_evaluation(evaluation("r1", "a", 4));
    store.insert_evaluation(evaluation("r1", "b", 5));
    let engine = engine(store);

    match engine.recommendations("r1", None, true).await {
        Err(Error::InsufficientData { current, required }) => {
            assert_eq!(current, 2);
            assert_eq!(required, 3);
        }
        other => panic!("expected InsufficientData, got {:?}", other),
    }
}

#[tokio::test]
async fn accumulated_dislike_vetoes_candidates() {
    let mut store = store_with_reviewer();
    let patchouli = || positioned("n-patch", "Patchouli", NotePosition::Base);
    for id in ["a", "b", "c"] {
        store.insert_fragrance(fragrance(id, id, "woody", "mossy", vec![patchouli()], vec![]));
        store.insert_evaluation(evaluation("r1", id, 1));
    }
    store.insert_fragrance(fragrance(
        "x",
        "Dark Earth",
        "woody",
        "mossy",
        vec![patchouli(), positioned("n-rose", "Rose", NotePosition::Heart)],
        vec![],
    ));
    let engine = engine(store);

    let profile = engine.build_profile("r1").await.unwrap();
    assert_eq!(profile.note_affinity("n-patch"), -6.0);

    let recs = engine.recommendations("r1", None, true).await.unwrap();
    let dark_earth = recs.iter().find(|r| r.fragrance_id == "x").unwrap();
    assert!(dark_earth.vetoed);
    assert_eq!(dark_earth.match_score, 0.1);
    assert_eq!(dark_earth.match_percent, 10);
    assert_eq!(
        dark_earth.veto_reason.as_deref(),
        Some("Contains Patchouli which you dislike")
    );
}

#[tokio::test]
async fn exclude_rated_filters_every_rated_id() {
    let mut store = store_with_reviewer();
    for id in ["a", "b", "c", "d", "e"] {
        store.insert_fragrance(fragrance(id, id, "fresh", "citrus", vec![], vec![]));
    }
    for id in ["a", "b", "c"] {
        store.insert_evaluation(evaluation("r1", id, 4));
    }
    let engine = engine(store);

    let recs = engine.recommendations("r1", None, true).await.unwrap();
    for rec in &recs {
        assert!(!["a", "b", "c"].contains(&rec.fragrance_id.as_str()));
    }
    assert_eq!(recs.len(), 2);
}

#[tokio::test]
async fn identical_scores_break_ties_by_name() {
    let mut store = store_with_reviewer();
    for id in ["a", "b", "c"] {
        store.insert_fragrance(fragrance(id, id, "fresh", "citrus", vec![], vec![]));
        store.insert_evaluation(evaluation("r1", id, 4));
    }
    // Same composition, only the names differ
    let shared = || positioned("n-iris", "Iris", NotePosition::Heart);
    store.insert_fragrance(fragrance("y", "Beta", "floral", "powdery", vec![shared()], vec![]));
    store.insert_fragrance(fragrance("x", "Alpha", "floral", "powdery", vec![shared()], vec![]));
    let engine = engine(store);

    let recs = engine.recommendations("r1", None, true).await.unwrap();
    assert_eq!(recs.len(), 2);
    assert_eq!(recs[0].fragrance_name, "Alpha");
    assert_eq!(recs[1].fragrance_name, "Beta");
    assert!((recs[0].match_score - recs[1].match_score).abs() < 1e-9);
}

#[tokio::test]
async fn ranking_is_sorted_and_prefix_stable() {
    let mut store = store_with_reviewer();
    for i in 0..12 {
        store.insert_fragrance(fragrance(
            &format!("f{}", i),
            &format!("Frag {:02}", i),
            "fresh",
            "citrus",
            vec![positioned(
                &format!("n{}", i % 4),
                &format!("Note{}", i % 4),
                NotePosition::Top,
            )],
            vec![],
        ));
    }
    store.insert_evaluation(evaluation("r1", "f0", 5));
    store.insert_evaluation(evaluation("r1", "f1", 2));
    store.insert_evaluation(evaluation("r1", "f2", 4));
    let engine = engine(store);

    let recs = engine.recommendations("r1", Some(9), true).await.unwrap();
    for pair in recs.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(!a.vetoed || b.vetoed);
        if a.vetoed == b.vetoed {
            assert!(
                a.match_score > b.match_score
                    || (a.match_score == b.match_score
                        && a.fragrance_name <= b.fragrance_name)
            );
        }
    }

    // First k of a larger limit equals the smaller limit's result
    let four = engine.recommendations("r1", Some(4), true).await.unwrap();
    for (a, b) in four.iter().zip(recs.iter()) {
        assert_eq!(a.fragrance_id, b.fragrance_id);
    }
}

#[tokio::test]
async fn every_score_stays_in_the_open_unit_interval() {
    let mut store = store_with_reviewer();
    for i in 0..8 {
        store.insert_fragrance(fragrance(
            &format!("f{}", i),
            &format!("Frag {:02}", i),
            "fresh",
            "citrus",
            vec![positioned("n-shared", "Neroli", NotePosition::Top)],
            vec![Accord {
                accord_type: "citrus".to_string(),
                intensity: 0.9,
            }],
        ));
    }
    store.insert_evaluation(evaluation("r1", "f0", 5));
    store.insert_evaluation(evaluation("r1", "f1", 5));
    store.insert_evaluation(evaluation("r1", "f2", 5));
    let engine = engine(store);

    let recs = engine.recommendations("r1", None, true).await.unwrap();
    for rec in &recs {
        assert!(rec.match_score > 0.0 && rec.match_score < 1.0);
        assert_eq!(
            rec.match_percent as f64,
            (rec.match_score * 100.0).floor()
        );
    }
}

#[tokio::test]
async fn disabled_llm_fallback_mentions_shared_note_and_percent() {
    let mut store = store_with_reviewer();
    let rose = || positioned("n-rose", "Rose", NotePosition::Heart);
    for id in ["a", "b", "c"] {
        store.insert_fragrance(fragrance(id, id, "floral", "rosy", vec![rose()], vec![]));
        store.insert_evaluation(evaluation("r1", id, 5));
    }
    store.insert_fragrance(fragrance(
        "x",
        "Rose Royale",
        "floral",
        "rosy",
        vec![rose()],
        vec![],
    ));
    let engine = engine(store);
    let explainer = ExplanationService::new(LlmConfig {
        enabled: false,
        ..LlmConfig::default()
    });

    let (recommendation, profile, frag) = engine.match_for("r1", "x").await.unwrap();
    assert!(!recommendation.vetoed);

    let explanation = explainer
        .explain_recommendation(&recommendation, &profile, &frag)
        .await;
    assert_eq!(explanation.model, "fallback");
    assert!(explanation.text.contains("Rose"));
    assert!(explanation
        .text
        .contains(&recommendation.match_percent.to_string()));
}
