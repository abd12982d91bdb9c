//! Catalog and Rating View Types
//!
//! Immutable snapshots of the fragrance catalog and reviewer ratings consumed
//! by the recommendation pipeline. Fragrances carry their positioned notes and
//! weighted accords eagerly, so scoring never goes back to storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A note's location in the olfactory pyramid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotePosition {
    Top,
    Heart,
    Base,
}

impl NotePosition {
    /// Parse the storage representation; anything unrecognized is rejected
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "top" => Some(NotePosition::Top),
            "heart" => Some(NotePosition::Heart),
            "base" => Some(NotePosition::Base),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotePosition::Top => write!(f, "top"),
            NotePosition::Heart => write!(f, "heart"),
            NotePosition::Base => write!(f, "base"),
        }
    }
}

/// Individual scent component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub name: String,
    pub category: String,
    pub subcategory: Option<String>,
}

/// A note attached to a fragrance at a pyramid position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionedNote {
    pub note: Note,
    pub position: NotePosition,
}

/// A named accord with its declared strength on a fragrance, in [0, 1]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Accord {
    pub accord_type: String,
    pub intensity: f64,
}

/// Fragrance entity with classification data and eagerly-loaded composition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragrance {
    pub id: String,
    pub name: String,
    pub brand: String,
    pub concentration: String,
    pub launch_year: Option<i32>,
    pub gender_target: String,
    /// Michael Edwards Wheel family (Fresh, Floral, Amber, Woody)
    pub primary_family: String,
    pub subfamily: String,
    /// Fresh, Crisp, Classical, or Rich
    pub intensity: Option<String>,
    /// Origin of the record (manual, kaggle, fragella)
    pub data_source: String,
    pub external_id: Option<String>,
    pub notes: Vec<PositionedNote>,
    pub accords: Vec<Accord>,
}

impl Fragrance {
    /// Note names grouped by pyramid position, for prompt building
    pub fn notes_at(&self, position: NotePosition) -> Vec<&str> {
        self.notes
            .iter()
            .filter(|pn| pn.position == position)
            .map(|pn| pn.note.name.as_str())
            .collect()
    }
}

/// Family member profile who evaluates fragrances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reviewer {
    pub id: String,
    pub name: String,
}

/// A reviewer's rating of a fragrance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: String,
    pub fragrance_id: String,
    pub reviewer_id: String,
    /// Overall rating on the 1-5 scale
    pub rating: u8,
    /// Free-form observations
    pub notes: Option<String>,
    pub longevity_rating: Option<u8>,
    pub sillage_rating: Option<u8>,
    pub evaluated_at: DateTime<Utc>,
}
