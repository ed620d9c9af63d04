//! Weighted lexical documents.
//!
//! BM25 has no per-field weights, so field importance is expressed by
//! repetition: a topic title appears three times in its document, its
//! keywords twice. Only entities, relations and topics produce documents.

use crate::models::{Entity, Record, Relation, Topic};

/// Maximum number of content characters included in a topic document.
pub const TOPIC_CONTENT_CHARS: usize = 500;

/// Text fed to the BM25 index for one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalDocument {
    pub id: String,
    pub text: String,
}

/// Builds the lexical document for a record, or `None` for record types
/// without a lexical index or records with no text.
pub fn lexical_document(record: &Record) -> Option<LexicalDocument> {
    let text = match record {
        Record::Entity(e) => entity_text(e),
        Record::Relation(r) => relation_text(r),
        Record::Topic(t) => topic_text(t),
        _ => return None,
    };
    if text.trim().is_empty() {
        return None;
    }
    Some(LexicalDocument {
        id: record.id().to_string(),
        text,
    })
}

fn push<S: AsRef<str>>(parts: &mut Vec<String>, value: Option<S>) {
    if let Some(v) = value {
        let v = v.as_ref().trim();
        if !v.is_empty() {
            parts.push(v.to_string());
        }
    }
}

fn metadata_text(metadata: Option<&serde_json::Value>) -> Option<String> {
    match metadata {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Object(map)) if map.is_empty() => None,
        Some(value) => serde_json::to_string(value).ok(),
    }
}

pub fn entity_text(entity: &Entity) -> String {
    let mut parts = Vec::new();
    push(&mut parts, Some(&entity.name));
    for alias in &entity.aliases {
        push(&mut parts, Some(alias));
    }
    push(&mut parts, entity.searchable_text.as_deref());
    push(&mut parts, metadata_text(entity.metadata.as_ref()).as_deref());
    parts.join(" ")
}

pub fn relation_text(relation: &Relation) -> String {
    let mut parts = Vec::new();
    push(&mut parts, relation.relation_type.as_deref());
    push(&mut parts, relation.description.as_deref());
    push(&mut parts, relation.searchable_text.as_deref());
    push(&mut parts, metadata_text(relation.metadata.as_ref()).as_deref());
    parts.join(" ")
}

pub fn topic_text(topic: &Topic) -> String {
    let mut parts = Vec::new();

    for _ in 0..3 {
        push(&mut parts, Some(&topic.title));
    }
    push(&mut parts, topic.description.as_deref());
    if let Some(content) = topic.content.as_deref() {
        let head: String = content.chars().take(TOPIC_CONTENT_CHARS).collect();
        push(&mut parts, Some(&head));
    }
    push(&mut parts, topic.content_summary.as_deref());
    for _ in 0..2 {
        for keyword in &topic.keywords {
            push(&mut parts, Some(keyword));
        }
    }
    for tag in &topic.tags {
        push(&mut parts, Some(tag));
    }

    let mut text = parts.join(" ");

    // Precomputed searchable text usually repeats the fields above.
    if let Some(extra) = topic
        .searchable_text
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let extra_lower = extra.to_lowercase();
        let text_lower = text.to_lowercase();
        if !text_lower.contains(&extra_lower) && !extra_lower.contains(&text_lower) {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(extra);
        }
    }
    text
}
