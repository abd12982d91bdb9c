//! Explanation Service
//!
//! Generates short natural-language explanations for recommendations and
//! profile summaries through an LLM gateway (any chat-completions endpoint).
//! Degrades gracefully: when the gateway is unconfigured, times out, or
//! fails, a rule-based fallback answers instead, so explanation requests
//! never surface an error.
//!
//! Responses are cached in-memory by content-derived key with at-most-once
//! population; the cache is the only mutable state in the engine.

use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::warn;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::engine::Recommendation;
use super::model::{Fragrance, NotePosition};
use super::profile::ReviewerProfile;

/// Model name reported by rule-based fallback responses
const FALLBACK_MODEL: &str = "fallback";

/// Prompt for a non-vetoed recommendation
const RECOMMENDATION_PROMPT: &str = "You are a fragrance expert. Explain why this fragrance might appeal to the user.

User's preference profile:
- Likes: {liked_notes}
- Dislikes: {disliked_notes}
- Preferred families: {preferred_families}

Fragrance: {fragrance_name} by {fragrance_brand}
- Match Score: {match_percent}%
- Family: {family}
- Top notes: {top_notes}
- Heart notes: {heart_notes}
- Base notes: {base_notes}
- Accords: {accords}

Write 2-3 sentences explaining the match. Highlight specific notes they'll enjoy.
If there are notes they typically dislike, acknowledge this as a potential concern.
Keep the response concise and helpful.";

/// Prompt for a vetoed recommendation
const VETOED_PROMPT: &str = "You are a fragrance expert. Explain why this fragrance might NOT be ideal for the user.

User's preference profile:
- Likes: {liked_notes}
- Dislikes: {disliked_notes}

Fragrance: {fragrance_name} by {fragrance_brand}
- Contains: {veto_note} (which they dislike)
- Top notes: {top_notes}
- Heart notes: {heart_notes}
- Base notes: {base_notes}

Write 1-2 sentences explaining why this might not be their best choice,
but acknowledge any positive aspects if relevant.";

/// Prompt for a profile summary
const PROFILE_PROMPT: &str = "You are a fragrance expert. Summarize this user's fragrance preferences.

User: {reviewer_name}
Number of fragrances rated: {evaluation_count}

Top liked notes: {liked_notes}
Top disliked notes: {disliked_notes}
Preferred accords: {preferred_accords}
Preferred fragrance families: {preferred_families}

Write a 2-3 sentence natural language summary of their preferences.
Be specific about what scent profiles they gravitate towards and what they avoid.
Keep the tone friendly and informative.";

/// Response from the explanation service
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Explanation {
    pub text: String,
    pub model: String,
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Explanation service backed by an LLM gateway with rule-based fallback
pub struct ExplanationService {
    config: LlmConfig,
    client: reqwest::Client,
    cache: Mutex<HashMap<String, String>>,
}

impl ExplanationService {
    pub fn new(config: LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// True when the gateway is enabled and has a token
    pub fn is_available(&self) -> bool {
        self.config.is_configured()
    }

    /// Explain why a fragrance was (or was not) recommended
    pub async fn explain_recommendation(
        &self,
        recommendation: &Recommendation,
        profile: &ReviewerProfile,
        fragrance: &Fragrance,
    ) -> Explanation {
        if !self.is_available() {
            return self.fallback_recommendation(recommendation, profile, fragrance);
        }

        let key = cache_key("rec", &[&recommendation.fragrance_id, &profile.reviewer_id]);
        if let Some(text) = self.cache_get(&key) {
            return Explanation {
                text,
                model: self.config.model.clone(),
                cached: true,
                error: None,
            };
        }

        let prompt = if recommendation.vetoed {
            vetoed_prompt(recommendation, profile, fragrance)
        } else {
            recommendation_prompt(recommendation, profile, fragrance)
        };

        match self.call_gateway(&prompt).await {
            Ok(text) => {
                self.cache_put(key, text.clone());
                Explanation {
                    text,
                    model: self.config.model.clone(),
                    cached: false,
                    error: None,
                }
            }
            Err(e) => {
                warn!("Explanation gateway failed, using fallback: {}", e);
                let mut fallback = self.fallback_recommendation(recommendation, profile, fragrance);
                fallback.error = Some(e.to_string());
                fallback
            }
        }
    }

    /// Summarize a reviewer's preferences in natural language
    pub async fn summarize_profile(
        &self,
        profile: &ReviewerProfile,
        reviewer_name: &str,
    ) -> Explanation {
        if !self.is_available() {
            return fallback_profile_summary(profile, reviewer_name);
        }

        let key = cache_key("profile", &[&profile.reviewer_id]);
        if let Some(text) = self.cache_get(&key) {
            return Explanation {
                text,
                model: self.config.model.clone(),
                cached: true,
                error: None,
            };
        }

        let prompt = profile_prompt(profile, reviewer_name);

        match self.call_gateway(&prompt).await {
            Ok(text) => {
                self.cache_put(key, text.clone());
                Explanation {
                    text,
                    model: self.config.model.clone(),
                    cached: false,
                    error: None,
                }
            }
            Err(e) => {
                warn!("Explanation gateway failed, using fallback: {}", e);
                let mut fallback = fallback_profile_summary(profile, reviewer_name);
                fallback.error = Some(e.to_string());
                fallback
            }
        }
    }

    /// POST a chat completion to the gateway and extract the text
    async fn call_gateway(&self, prompt: &str) -> Result<String> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::external("gateway token missing"))?;
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let payload = json!({
            "model": self.config.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::external(format!("gateway request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::external(format!("gateway returned {}", status)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::external(format!("invalid gateway response: {}", e)))?;

        body["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::external("gateway response missing completion text"))
    }

    // ------------------------------------------------------------------
    // Cache
    // ------------------------------------------------------------------

    fn cache_get(&self, key: &str) -> Option<String> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Insert-if-absent; a concurrent writer winning the race is fine
    /// because values for the same key are identical by construction
    fn cache_put(&self, key: String, text: String) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key)
            .or_insert(text);
    }

    /// Drop every cached explanation
    pub fn clear_cache(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }

    /// Drop every cached explanation whose key references the reviewer
    pub fn invalidate_reviewer(&self, reviewer_id: &str) {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|key, _| !key.contains(reviewer_id));
    }

    #[cfg(test)]
    fn cache_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    // ------------------------------------------------------------------
    // Fallbacks
    // ------------------------------------------------------------------

    fn fallback_recommendation(
        &self,
        recommendation: &Recommendation,
        profile: &ReviewerProfile,
        fragrance: &Fragrance,
    ) -> Explanation {
        let text = if recommendation.vetoed {
            "This fragrance contains notes you typically dislike. \
             You might want to explore other options first."
                .to_string()
        } else {
            let fragrance_notes: Vec<String> = fragrance
                .notes
                .iter()
                .map(|pn| pn.note.name.to_lowercase())
                .collect();
            let matching: Vec<&str> = profile
                .top_liked_notes
                .iter()
                .take(3)
                .map(|(name, _)| name.as_str())
                .filter(|name| fragrance_notes.contains(&name.to_lowercase()))
                .collect();

            if !matching.is_empty() {
                format!(
                    "This {}% match contains {} which you've enjoyed in other fragrances.",
                    recommendation.match_percent,
                    matching.join(", ")
                )
            } else {
                format!(
                    "With a {}% match score, this fragrance aligns well with your \
                     general preferences for {} scents.",
                    recommendation.match_percent, fragrance.primary_family
                )
            }
        };

        Explanation {
            text,
            model: FALLBACK_MODEL.to_string(),
            cached: false,
            error: None,
        }
    }
}

fn fallback_profile_summary(profile: &ReviewerProfile, reviewer_name: &str) -> Explanation {
    let liked: Vec<&str> = profile
        .top_liked_notes
        .iter()
        .take(3)
        .map(|(name, _)| name.as_str())
        .collect();
    let disliked: Vec<&str> = profile
        .top_disliked_notes
        .iter()
        .take(3)
        .map(|(name, _)| name.as_str())
        .collect();

    let mut parts = vec![format!(
        "{} has rated {} fragrances.",
        reviewer_name, profile.evaluation_count
    )];
    if !liked.is_empty() {
        parts.push(format!(
            "They tend to enjoy notes like {}.",
            liked.join(", ")
        ));
    }
    if !disliked.is_empty() {
        parts.push(format!("They generally avoid {}.", disliked.join(", ")));
    }
    if liked.is_empty() && disliked.is_empty() {
        parts.push("More evaluations needed to identify clear preferences.".to_string());
    }

    Explanation {
        text: parts.join(" "),
        model: FALLBACK_MODEL.to_string(),
        cached: false,
        error: None,
    }
}

// ----------------------------------------------------------------------
// Prompt building
// ----------------------------------------------------------------------

/// Content-derived cache key; the reviewer id stays visible inside the key
/// so reviewer-scoped invalidation works by containment
fn cache_key(prefix: &str, parts: &[&str]) -> String {
    format!("{}:{}", prefix, parts.join(":"))
}

fn join_or<'a>(items: impl IntoIterator<Item = &'a str>, fallback: &str) -> String {
    let joined: Vec<&str> = items.into_iter().collect();
    if joined.is_empty() {
        fallback.to_string()
    } else {
        joined.join(", ")
    }
}

fn recommendation_prompt(
    recommendation: &Recommendation,
    profile: &ReviewerProfile,
    fragrance: &Fragrance,
) -> String {
    let families: Vec<(String, f64)> = profile.top_families(3);
    RECOMMENDATION_PROMPT
        .replace(
            "{liked_notes}",
            &join_or(
                profile.top_liked_notes.iter().map(|(n, _)| n.as_str()),
                "None",
            ),
        )
        .replace(
            "{disliked_notes}",
            &join_or(
                profile.top_disliked_notes.iter().map(|(n, _)| n.as_str()),
                "None",
            ),
        )
        .replace(
            "{preferred_families}",
            &join_or(families.iter().map(|(f, _)| f.as_str()), "Various"),
        )
        .replace("{fragrance_name}", &fragrance.name)
        .replace("{fragrance_brand}", &fragrance.brand)
        .replace(
            "{match_percent}",
            &recommendation.match_percent.to_string(),
        )
        .replace("{family}", &fragrance.primary_family)
        .replace(
            "{top_notes}",
            &join_or(fragrance.notes_at(NotePosition::Top), "Unknown"),
        )
        .replace(
            "{heart_notes}",
            &join_or(fragrance.notes_at(NotePosition::Heart), "Unknown"),
        )
        .replace(
            "{base_notes}",
            &join_or(fragrance.notes_at(NotePosition::Base), "Unknown"),
        )
        .replace(
            "{accords}",
            &join_or(
                fragrance.accords.iter().map(|a| a.accord_type.as_str()),
                "Unknown",
            ),
        )
}

fn vetoed_prompt(
    recommendation: &Recommendation,
    profile: &ReviewerProfile,
    fragrance: &Fragrance,
) -> String {
    VETOED_PROMPT
        .replace(
            "{liked_notes}",
            &join_or(
                profile.top_liked_notes.iter().map(|(n, _)| n.as_str()),
                "None",
            ),
        )
        .replace(
            "{disliked_notes}",
            &join_or(
                profile.top_disliked_notes.iter().map(|(n, _)| n.as_str()),
                "None",
            ),
        )
        .replace("{fragrance_name}", &fragrance.name)
        .replace("{fragrance_brand}", &fragrance.brand)
        .replace(
            "{veto_note}",
            recommendation
                .veto_reason
                .as_deref()
                .unwrap_or("a disliked note"),
        )
        .replace(
            "{top_notes}",
            &join_or(fragrance.notes_at(NotePosition::Top), "Unknown"),
        )
        .replace(
            "{heart_notes}",
            &join_or(fragrance.notes_at(NotePosition::Heart), "Unknown"),
        )
        .replace(
            "{base_notes}",
            &join_or(fragrance.notes_at(NotePosition::Base), "Unknown"),
        )
}

fn profile_prompt(profile: &ReviewerProfile, reviewer_name: &str) -> String {
    let accords = profile.top_accords(5);
    let families = profile.top_families(5);
    PROFILE_PROMPT
        .replace("{reviewer_name}", reviewer_name)
        .replace("{evaluation_count}", &profile.evaluation_count.to_string())
        .replace(
            "{liked_notes}",
            &join_or(
                profile.top_liked_notes.iter().map(|(n, _)| n.as_str()),
                "None yet",
            ),
        )
        .replace(
            "{disliked_notes}",
            &join_or(
                profile.top_disliked_notes.iter().map(|(n, _)| n.as_str()),
                "None yet",
            ),
        )
        .replace(
            "{preferred_accords}",
            &join_or(accords.iter().map(|(a, _)| a.as_str()), "Various"),
        )
        .replace(
            "{preferred_families}",
            &join_or(families.iter().map(|(f, _)| f.as_str()), "Various"),
        )
}
