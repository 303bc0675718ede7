//! Pitch record — the six-section structured output of a generation.

use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Field keys
// ────────────────────────────────────────────────────────────────────────────

/// Canonical identifier of one pitch section.
///
/// Each key owns the list of label surface forms the model may use for it.
/// Matching is case-insensitive substring matching on the label text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKey {
    Problem,
    Solution,
    Market,
    Value,
    Channels,
    Model,
}

impl FieldKey {
    /// All keys in pitch order.
    pub const ALL: [FieldKey; 6] = [
        FieldKey::Problem,
        FieldKey::Solution,
        FieldKey::Market,
        FieldKey::Value,
        FieldKey::Channels,
        FieldKey::Model,
    ];

    /// Recognized label surface forms, lower-case.
    pub fn surface_forms(self) -> &'static [&'static str] {
        match self {
            FieldKey::Problem => &["problème", "probleme", "problem"],
            FieldKey::Solution => &["solution"],
            FieldKey::Market => &["marché cible", "marché", "marche", "market", "client cible"],
            FieldKey::Value => &[
                "proposition de valeur",
                "valeur unique",
                "valeur",
                "uvp",
                "value proposition",
                "value",
            ],
            FieldKey::Channels => &[
                "canaux de distribution",
                "canaux",
                "canal",
                "channels",
                "channel",
            ],
            FieldKey::Model => &[
                "modèle économique",
                "modèle",
                "modele",
                "business model",
                "revenue model",
                "model",
            ],
        }
    }

    /// The label used in the canonical `N. [Label] content` format.
    pub fn canonical_label(self) -> &'static str {
        match self {
            FieldKey::Problem => "Problème",
            FieldKey::Solution => "Solution",
            FieldKey::Market => "Marché",
            FieldKey::Value => "Valeur",
            FieldKey::Channels => "Canaux",
            FieldKey::Model => "Modèle",
        }
    }

    /// Fixed sentence substituted when the section could not be recovered.
    pub fn placeholder(self) -> &'static str {
        match self {
            FieldKey::Problem => "Problème à définir basé sur votre description.",
            FieldKey::Solution => "Solution à développer selon votre projet.",
            FieldKey::Market => "Marché cible à identifier.",
            FieldKey::Value => "Proposition de valeur unique à définir.",
            FieldKey::Channels => "Canaux de distribution à mettre en place.",
            FieldKey::Model => {
                "Modèle économique : freemium + abonnement premium ou commissions selon le service."
            }
        }
    }

    /// Resolves a free-form label to a key.
    ///
    /// When several surface forms occur in the label, the one that starts
    /// earliest wins; ties go to the longest form. Returns `None` for labels
    /// that mention no known section.
    pub fn resolve(label: &str) -> Option<FieldKey> {
        let label = label.trim().trim_matches(|c: char| c == '[' || c == ']').to_lowercase();
        if label.is_empty() {
            return None;
        }

        let mut best: Option<(usize, usize, FieldKey)> = None;
        for key in FieldKey::ALL {
            for form in key.surface_forms() {
                let Some(pos) = label.find(form) else {
                    continue;
                };
                let better = match best {
                    None => true,
                    Some((best_pos, best_len, _)) => {
                        pos < best_pos || (pos == best_pos && form.len() > best_len)
                    }
                };
                if better {
                    best = Some((pos, form.len(), key));
                }
            }
        }
        best.map(|(_, _, key)| key)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Pitch record
// ────────────────────────────────────────────────────────────────────────────

/// Six-section pitch. An empty string means the section was not recovered.
///
/// `raw` keeps the full text the record was extracted from; it is never
/// serialized to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchRecord {
    pub problem: String,
    pub solution: String,
    pub market: String,
    pub value: String,
    pub channels: String,
    pub model: String,
    #[serde(skip)]
    pub raw: String,
}

impl PitchRecord {
    /// A blank record backed by `raw`.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            ..Self::default()
        }
    }

    pub fn get(&self, key: FieldKey) -> &str {
        match key {
            FieldKey::Problem => &self.problem,
            FieldKey::Solution => &self.solution,
            FieldKey::Market => &self.market,
            FieldKey::Value => &self.value,
            FieldKey::Channels => &self.channels,
            FieldKey::Model => &self.model,
        }
    }

    fn slot_mut(&mut self, key: FieldKey) -> &mut String {
        match key {
            FieldKey::Problem => &mut self.problem,
            FieldKey::Solution => &mut self.solution,
            FieldKey::Market => &mut self.market,
            FieldKey::Value => &mut self.value,
            FieldKey::Channels => &mut self.channels,
            FieldKey::Model => &mut self.model,
        }
    }

    /// Stores `content` (trimmed) if the field is still empty.
    ///
    /// First write wins: a non-empty field is never overwritten, and empty
    /// content is not a recovery. Returns whether the field was filled.
    pub fn fill(&mut self, key: FieldKey, content: &str) -> bool {
        let content = content.trim();
        if content.is_empty() {
            return false;
        }
        let slot = self.slot_mut(key);
        if !slot.is_empty() {
            return false;
        }
        *slot = content.to_string();
        true
    }

    pub fn has(&self, key: FieldKey) -> bool {
        !self.get(key).is_empty()
    }

    /// Keys whose field is still empty, in pitch order.
    pub fn missing(&self) -> Vec<FieldKey> {
        FieldKey::ALL
            .into_iter()
            .filter(|key| !self.has(*key))
            .collect()
    }

    pub fn recovered_count(&self) -> usize {
        FieldKey::ALL.len() - self.missing().len()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Replaces every empty field with its placeholder sentence.
    /// Returns the keys that were back-filled.
    pub fn backfill(&mut self) -> Vec<FieldKey> {
        let missing = self.missing();
        for key in &missing {
            *self.slot_mut(*key) = key.placeholder().to_string();
        }
        missing
    }

    /// Renders the record in the canonical `N. [Label] content` format.
    pub fn to_canonical_text(&self) -> String {
        FieldKey::ALL
            .iter()
            .enumerate()
            .map(|(i, key)| format!("{}. [{}] {}", i + 1, key.canonical_label(), self.get(*key)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
