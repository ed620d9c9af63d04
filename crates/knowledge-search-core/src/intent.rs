//! Query intent classification.
//!
//! The router labels each query as factual, relational, keyword,
//! conceptual or mixed, and the [`strategy`](crate::strategy) table turns
//! the label into per-type retrieval weights.
//!
//! [`PatternClassifier`] is a small rule-based scorer over English and
//! Japanese cue phrases. It can be swapped for any other [`Classifier`].
//!
//! # Scoring
//!
//! 1. Each matching cue pattern adds `1.0` to its category.
//! 2. A question mark adds `0.5` to factual if factual already scored,
//!    otherwise `0.3` to conceptual.
//! 3. Capitalized words and kanji compounds count as proper nouns: two or
//!    more add `1.0` to keyword, exactly one adds `0.5`.
//! 4. A unique top category wins with confidence
//!    `min(0.9, 0.5 + 0.2 · (top − second))`; a tie at the top is `mixed`
//!    (0.6); no signal at all is `conceptual` (0.5).

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::RecordType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentLabel {
    Factual,
    Relational,
    Keyword,
    Conceptual,
    Mixed,
}

impl IntentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentLabel::Factual => "factual",
            IntentLabel::Relational => "relational",
            IntentLabel::Keyword => "keyword",
            IntentLabel::Conceptual => "conceptual",
            IntentLabel::Mixed => "mixed",
        }
    }
}

impl fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryIntent {
    pub label: IntentLabel,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Lowercased whitespace-separated words longer than one character.
    pub keywords: Vec<String>,
    pub proper_nouns: Vec<String>,
    /// Human-readable notes on which cues fired.
    pub reasons: Vec<String>,
    /// Record type the query names explicitly, if any.
    pub target_type: Option<RecordType>,
}

pub trait Classifier: Send + Sync {
    fn classify(&self, query: &str) -> QueryIntent;
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

static FACTUAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"とは[？?]?$",
        r"の定義",
        r"(?i)what is",
        r"(?i)define",
        r"誰[？?]?$",
        r"(?i)who is",
        r"(?i)where is",
        r"(?i)when is",
        r"何[？?]?$",
        r"(?i)what does",
        r"意味[は]?",
        r"(?i)meaning",
    ])
});

static RELATIONAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"の関係",
        r"に関連",
        r"(?i)related to",
        r"(?i)connection",
        r"と.*の",
        r"(?i)between.*and",
        r"関連[する]?",
        r"つながり",
        r"(?i)link",
        r"(?i)relationship",
    ])
});

static KEYWORD: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"[A-Z][a-z]+ [A-Z][a-z]+",
        r"[一-龠]{2,}",
        r"[A-Z][a-z]+(?: [A-Z][a-z]+)+",
    ])
});

static CONCEPTUAL: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"どう[する]?",
        r"(?i)how to",
        r"方法",
        r"(?i)way",
        r"戦略",
        r"(?i)strategy",
        r"考え[方]?",
        r"(?i)concept",
    ])
});

static PROPER_NOUN: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(&[r"[A-Z][a-z]+|[一-龠]{2,}"]));

/// Cue words naming a record type, checked in order.
const TARGET_CUES: &[(RecordType, &[&str])] = &[
    (RecordType::Startup, &["スタートアップ", "startup"]),
    (RecordType::FocusInitiative, &["注力施策", "focus initiative", "施策"]),
    (RecordType::MeetingNote, &["議事録", "meeting note", "会議", "meeting"]),
    (RecordType::Regulation, &["制度", "regulation"]),
    (RecordType::Relation, &["リレーション", "relation", "関係"]),
    (RecordType::Topic, &["トピック", "topic"]),
    (
        RecordType::Entity,
        &["エンティティ", "entity", "人物", "組織", "概念"],
    ),
];

/// Finds the record type a query mentions by name, e.g. "startup" or
/// "議事録".
pub fn detect_target_type(query: &str) -> Option<RecordType> {
    let lowered = query.to_lowercase();
    TARGET_CUES
        .iter()
        .find(|(_, cues)| cues.iter().any(|cue| lowered.contains(cue)))
        .map(|(t, _)| *t)
}

/// Rule-based classifier over English and Japanese cue phrases.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternClassifier;

impl PatternClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl Classifier for PatternClassifier {
    fn classify(&self, query: &str) -> QueryIntent {
        let query = query.trim();
        if query.is_empty() {
            return QueryIntent {
                label: IntentLabel::Conceptual,
                confidence: 0.0,
                keywords: Vec::new(),
                proper_nouns: Vec::new(),
                reasons: vec!["empty query".to_string()],
                target_type: None,
            };
        }

        let mut reasons = Vec::new();
        let mut count = |label: IntentLabel, patterns: &[Regex]| -> f64 {
            let hits = patterns.iter().filter(|p| p.is_match(query)).count();
            if hits > 0 {
                reasons.push(format!("{} cues: {}", label, hits));
            }
            hits as f64
        };
        let mut factual = count(IntentLabel::Factual, FACTUAL.as_slice());
        let relational = count(IntentLabel::Relational, RELATIONAL.as_slice());
        let mut keyword = count(IntentLabel::Keyword, KEYWORD.as_slice());
        let mut conceptual = count(IntentLabel::Conceptual, CONCEPTUAL.as_slice());

        if query.contains('?') || query.contains('？') {
            if factual > 0.0 {
                factual += 0.5;
            } else {
                conceptual += 0.3;
            }
            reasons.push("question form".to_string());
        }

        let proper_nouns: Vec<String> = PROPER_NOUN
            .iter()
            .flat_map(|re| re.find_iter(query))
            .map(|m| m.as_str().to_string())
            .collect();
        match proper_nouns.len() {
            0 => {}
            1 => keyword += 0.5,
            _ => keyword += 1.0,
        }
        if !proper_nouns.is_empty() {
            reasons.push(format!("proper nouns: {}", proper_nouns.join(", ")));
        }

        let mut ranked = [
            (IntentLabel::Factual, factual),
            (IntentLabel::Relational, relational),
            (IntentLabel::Keyword, keyword),
            (IntentLabel::Conceptual, conceptual),
        ];
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        let (top_label, top) = ranked[0];
        let second = ranked[1].1;

        let (label, confidence) = if top > 0.0 && top > second {
            (top_label, (0.5 + (top - second) * 0.2).min(0.9))
        } else if top > 0.0 {
            (IntentLabel::Mixed, 0.6)
        } else {
            (IntentLabel::Conceptual, 0.5)
        };

        let keywords = query
            .to_lowercase()
            .split_whitespace()
            .filter(|w| w.chars().count() > 1)
            .map(str::to_string)
            .collect();

        QueryIntent {
            label,
            confidence,
            keywords,
            proper_nouns,
            reasons,
            target_type: detect_target_type(query),
        }
    }
}
