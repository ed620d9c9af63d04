//! Core data models for Knowledge Search.
//!
//! Every searchable record kind is a variant of the [`Record`] sum type, so
//! the orchestrators, scorers and result builders can match exhaustively on
//! the record type instead of probing optional fields.
//!
//! # Record Lifecycle
//!
//! ```text
//! import / upstream write ──▶ Record ──▶ LexicalDocument (BM25 text)
//!                               │
//!                               └──▶ SearchResult { payload: ResultPayload }
//! ```
//!
//! Timestamps are normalized to ISO-8601 UTC strings when a record is
//! deserialized, so date-range filters can compare them as plain strings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// The seven record kinds the engine searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordType {
    Entity,
    Relation,
    Topic,
    Startup,
    FocusInitiative,
    MeetingNote,
    Regulation,
}

impl RecordType {
    /// All record types, in aggregation order.
    pub const ALL: [RecordType; 7] = [
        RecordType::Entity,
        RecordType::Relation,
        RecordType::Topic,
        RecordType::Startup,
        RecordType::FocusInitiative,
        RecordType::MeetingNote,
        RecordType::Regulation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Entity => "entity",
            RecordType::Relation => "relation",
            RecordType::Topic => "topic",
            RecordType::Startup => "startup",
            RecordType::FocusInitiative => "focusInitiative",
            RecordType::MeetingNote => "meetingNote",
            RecordType::Regulation => "regulation",
        }
    }

    /// Whether a BM25 index is built for this type. The remaining types
    /// are searched by vector similarity only.
    pub fn has_lexical_index(&self) -> bool {
        matches!(
            self,
            RecordType::Entity | RecordType::Relation | RecordType::Topic
        )
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', '-'], "");
        match normalized.as_str() {
            "entity" => Ok(RecordType::Entity),
            "relation" => Ok(RecordType::Relation),
            "topic" => Ok(RecordType::Topic),
            "startup" => Ok(RecordType::Startup),
            "focusinitiative" => Ok(RecordType::FocusInitiative),
            "meetingnote" => Ok(RecordType::MeetingNote),
            "regulation" => Ok(RecordType::Regulation),
            other => anyhow::bail!("unknown record type: '{}'", other),
        }
    }
}

/// A named node of the knowledge graph (person, organization, concept, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub name: String,
    /// Entity classification, e.g. `person`, `company`.
    #[serde(default, rename = "type")]
    pub entity_type: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub searchable_text: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "timestamp")]
    pub updated_at: Option<String>,
}

/// A typed edge between two entities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default, alias = "type")]
    pub relation_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source_entity_id: Option<String>,
    #[serde(default)]
    pub target_entity_id: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub searchable_text: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "timestamp")]
    pub updated_at: Option<String>,
}

/// A topic extracted from a meeting note or regulation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub content_summary: Option<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub keywords: Vec<String>,
    #[serde(default, deserialize_with = "string_list")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub semantic_category: Option<String>,
    /// `high`, `medium` or `low`.
    #[serde(default)]
    pub importance: Option<String>,
    #[serde(default)]
    pub meeting_note_id: Option<String>,
    #[serde(default)]
    pub regulation_id: Option<String>,
    #[serde(default)]
    pub searchable_text: Option<String>,
    #[serde(default)]
    pub search_count: Option<u32>,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "timestamp")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Startup {
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub objective: Option<String>,
    #[serde(default)]
    pub evaluation: Option<String>,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "timestamp")]
    pub updated_at: Option<String>,
}

/// Shared shape of focus initiatives, meeting notes and regulations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitledRecord {
    pub id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "timestamp")]
    pub created_at: Option<String>,
    #[serde(default, deserialize_with = "timestamp")]
    pub updated_at: Option<String>,
}

/// A searchable record of any type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "recordType", rename_all = "camelCase")]
pub enum Record {
    Entity(Entity),
    Relation(Relation),
    Topic(Topic),
    Startup(Startup),
    FocusInitiative(TitledRecord),
    MeetingNote(TitledRecord),
    Regulation(TitledRecord),
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::Entity(_) => RecordType::Entity,
            Record::Relation(_) => RecordType::Relation,
            Record::Topic(_) => RecordType::Topic,
            Record::Startup(_) => RecordType::Startup,
            Record::FocusInitiative(_) => RecordType::FocusInitiative,
            Record::MeetingNote(_) => RecordType::MeetingNote,
            Record::Regulation(_) => RecordType::Regulation,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Entity(r) => &r.id,
            Record::Relation(r) => &r.id,
            Record::Topic(r) => &r.id,
            Record::Startup(r) => &r.id,
            Record::FocusInitiative(r) | Record::MeetingNote(r) | Record::Regulation(r) => &r.id,
        }
    }

    pub fn organization_id(&self) -> Option<&str> {
        match self {
            Record::Entity(r) => r.organization_id.as_deref(),
            Record::Relation(r) => r.organization_id.as_deref(),
            Record::Topic(r) => r.organization_id.as_deref(),
            Record::Startup(r) => r.organization_id.as_deref(),
            Record::FocusInitiative(r) | Record::MeetingNote(r) | Record::Regulation(r) => {
                r.organization_id.as_deref()
            }
        }
    }

    pub fn created_at(&self) -> Option<&str> {
        match self {
            Record::Entity(r) => r.created_at.as_deref(),
            Record::Relation(r) => r.created_at.as_deref(),
            Record::Topic(r) => r.created_at.as_deref(),
            Record::Startup(r) => r.created_at.as_deref(),
            Record::FocusInitiative(r) | Record::MeetingNote(r) | Record::Regulation(r) => {
                r.created_at.as_deref()
            }
        }
    }

    pub fn updated_at(&self) -> Option<&str> {
        match self {
            Record::Entity(r) => r.updated_at.as_deref(),
            Record::Relation(r) => r.updated_at.as_deref(),
            Record::Topic(r) => r.updated_at.as_deref(),
            Record::Startup(r) => r.updated_at.as_deref(),
            Record::FocusInitiative(r) | Record::MeetingNote(r) | Record::Regulation(r) => {
                r.updated_at.as_deref()
            }
        }
    }

    /// Human-readable label: entity name, relation type, or title.
    pub fn label(&self) -> &str {
        match self {
            Record::Entity(r) => &r.name,
            Record::Relation(r) => r.relation_type.as_deref().unwrap_or(""),
            Record::Topic(r) => &r.title,
            Record::Startup(r) => &r.title,
            Record::FocusInitiative(r) | Record::MeetingNote(r) | Record::Regulation(r) => {
                &r.title
            }
        }
    }

    /// Semantic category; only topics carry one.
    pub fn semantic_category(&self) -> Option<&str> {
        match self {
            Record::Topic(t) => t.semantic_category.as_deref(),
            _ => None,
        }
    }

    /// Text used for embeddings and keyword overlap: label plus the main
    /// descriptive fields, space-joined.
    pub fn embedding_text(&self) -> String {
        let parts: Vec<&str> = match self {
            Record::Entity(r) => {
                let mut parts = vec![r.name.as_str()];
                parts.extend(r.aliases.iter().map(String::as_str));
                parts.extend(r.searchable_text.as_deref());
                parts
            }
            Record::Relation(r) => [
                r.relation_type.as_deref(),
                r.description.as_deref(),
                r.searchable_text.as_deref(),
            ]
            .into_iter()
            .flatten()
            .collect(),
            Record::Topic(r) => {
                let mut parts = vec![r.title.as_str()];
                parts.extend(r.content_summary.as_deref());
                parts.extend(r.description.as_deref());
                parts.extend(r.keywords.iter().map(String::as_str));
                parts
            }
            Record::Startup(r) => {
                let mut parts = vec![r.title.as_str()];
                parts.extend(r.description.as_deref());
                parts.extend(r.objective.as_deref());
                parts.extend(r.content.as_deref());
                parts
            }
            Record::FocusInitiative(r) | Record::MeetingNote(r) | Record::Regulation(r) => {
                let mut parts = vec![r.title.as_str()];
                parts.extend(r.description.as_deref());
                parts.extend(r.content.as_deref());
                parts
            }
        };
        parts
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Whether the record belongs to the corpus selected by `filters`:
    /// organization and the type's attribute filter. An organization filter
    /// excludes records that carry no organization. Date ranges are applied
    /// separately by [`Record::matches_filters`].
    pub fn matches_scope(&self, filters: &SearchFilters) -> bool {
        if let Some(org) = filters.organization_id.as_deref() {
            if self.organization_id() != Some(org) {
                return false;
            }
        }
        match self {
            Record::Entity(e) => attribute_matches(
                filters.entity_type.as_deref(),
                e.entity_type.as_deref(),
            ),
            Record::Relation(r) => attribute_matches(
                filters.relation_type.as_deref(),
                r.relation_type.as_deref(),
            ),
            Record::Topic(t) => attribute_matches(
                filters.topic_semantic_category.as_deref(),
                t.semantic_category.as_deref(),
            ),
            _ => true,
        }
    }

    /// Full filter check: scope plus inclusive `createdAt` / `updatedAt`
    /// ranges. A record without a timestamp is never excluded by a range.
    pub fn matches_filters(&self, filters: &SearchFilters) -> bool {
        self.matches_scope(filters)
            && in_range(
                self.created_at(),
                filters.created_after.as_deref(),
                filters.created_before.as_deref(),
            )
            && in_range(
                self.updated_at(),
                filters.updated_after.as_deref(),
                filters.updated_before.as_deref(),
            )
    }
}

fn attribute_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
    match wanted {
        Some(w) => actual == Some(w),
        None => true,
    }
}

fn in_range(value: Option<&str>, after: Option<&str>, before: Option<&str>) -> bool {
    let Some(value) = value else {
        return true;
    };
    if after.is_some_and(|a| value < a) {
        return false;
    }
    if before.is_some_and(|b| value > b) {
        return false;
    }
    true
}

/// Caller-supplied filters. All fields are optional and combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub relation_type: Option<String>,
    #[serde(default)]
    pub topic_semantic_category: Option<String>,
    #[serde(default)]
    pub created_after: Option<String>,
    #[serde(default)]
    pub created_before: Option<String>,
    #[serde(default)]
    pub updated_after: Option<String>,
    #[serde(default)]
    pub updated_before: Option<String>,
}

impl SearchFilters {
    pub fn for_organization(organization_id: impl Into<String>) -> Self {
        Self {
            organization_id: Some(organization_id.into()),
            ..Self::default()
        }
    }

    /// Canonical cache signature of the filters that shape the lexical
    /// corpus of `record_type`: the organization plus that type's attribute
    /// filter, as sorted-key JSON. Returns `"all"` when none is set.
    pub fn signature(&self, record_type: RecordType) -> String {
        let mut fields: BTreeMap<&str, &str> = BTreeMap::new();
        if let Some(org) = self.organization_id.as_deref() {
            fields.insert("organizationId", org);
        }
        let attribute = match record_type {
            RecordType::Entity => ("entityType", self.entity_type.as_deref()),
            RecordType::Relation => ("relationType", self.relation_type.as_deref()),
            RecordType::Topic => (
                "topicSemanticCategory",
                self.topic_semantic_category.as_deref(),
            ),
            _ => ("", None),
        };
        if let (key, Some(value)) = attribute {
            fields.insert(key, value);
        }
        if fields.is_empty() {
            return "all".to_string();
        }
        serde_json::to_string(&fields).unwrap_or_else(|_| "all".to_string())
    }
}

/// Denormalized topic view returned in search results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicSummary {
    pub topic_id: String,
    pub title: String,
    pub content_summary: String,
    pub semantic_category: Option<String>,
    pub keywords: Vec<String>,
    pub meeting_note_id: Option<String>,
    pub regulation_id: Option<String>,
    pub organization_id: Option<String>,
}

impl TopicSummary {
    /// Builds a summary from a full topic, falling back to the first 200
    /// characters of content when no summary was stored.
    pub fn from_topic(topic: &Topic, fallback_summary: Option<&str>) -> Self {
        let content_summary = topic
            .content_summary
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| fallback_summary.map(str::to_string))
            .or_else(|| {
                topic
                    .content
                    .as_deref()
                    .map(|c| c.chars().take(200).collect())
            })
            .unwrap_or_default();
        Self {
            topic_id: topic.id.clone(),
            title: topic.title.clone(),
            content_summary,
            semantic_category: topic.semantic_category.clone(),
            keywords: topic.keywords.clone(),
            meeting_note_id: topic.meeting_note_id.clone(),
            regulation_id: topic.regulation_id.clone(),
            organization_id: topic.organization_id.clone(),
        }
    }
}

/// The type-specific part of a [`SearchResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ResultPayload {
    Entity(Entity),
    Relation(Relation),
    Topic(TopicSummary),
    Startup(Startup),
    FocusInitiative(TitledRecord),
    MeetingNote(TitledRecord),
    Regulation(TitledRecord),
}

impl ResultPayload {
    pub fn record_type(&self) -> RecordType {
        match self {
            ResultPayload::Entity(_) => RecordType::Entity,
            ResultPayload::Relation(_) => RecordType::Relation,
            ResultPayload::Topic(_) => RecordType::Topic,
            ResultPayload::Startup(_) => RecordType::Startup,
            ResultPayload::FocusInitiative(_) => RecordType::FocusInitiative,
            ResultPayload::MeetingNote(_) => RecordType::MeetingNote,
            ResultPayload::Regulation(_) => RecordType::Regulation,
        }
    }

    /// Converts a fetched record into its result payload.
    pub fn from_record(record: Record, fallback_summary: Option<&str>) -> Self {
        match record {
            Record::Entity(r) => ResultPayload::Entity(r),
            Record::Relation(r) => ResultPayload::Relation(r),
            Record::Topic(t) => ResultPayload::Topic(TopicSummary::from_topic(&t, fallback_summary)),
            Record::Startup(r) => ResultPayload::Startup(r),
            Record::FocusInitiative(r) => ResultPayload::FocusInitiative(r),
            Record::MeetingNote(r) => ResultPayload::MeetingNote(r),
            Record::Regulation(r) => ResultPayload::Regulation(r),
        }
    }
}

/// One ranked hit of any record type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    /// Final blended score, always finite and non-negative.
    pub score: f64,
    /// Vector similarity in `[0, 1]`; `0.0` when only BM25 matched.
    pub similarity: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_terms: Vec<String>,
    #[serde(flatten)]
    pub payload: ResultPayload,
}

impl SearchResult {
    pub fn record_type(&self) -> RecordType {
        self.payload.record_type()
    }
}

/// Accepts a JSON array of strings, a string holding such an array, or a
/// single plain string.
fn string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                serde_json::Value::String(s) => Some(s),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Vec::new()
            } else if let Ok(parsed) = serde_json::from_str::<Vec<String>>(trimmed) {
                parsed
            } else {
                vec![trimmed.to_string()]
            }
        }
        Some(other) => vec![other.to_string()],
    })
}

/// Normalizes ISO strings, plain dates, Unix seconds (or milliseconds) and
/// `{seconds, nanoseconds}` objects to an ISO-8601 UTC string.
fn timestamp<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| normalize_timestamp(&v)))
}

/// See [`timestamp`]. Unparseable strings are kept verbatim.
pub fn normalize_timestamp(value: &serde_json::Value) -> Option<String> {
    use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

    let from_secs = |secs: i64, nanos: u32| {
        DateTime::<Utc>::from_timestamp(secs, nanos)
            .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    };

    match value {
        serde_json::Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(
                    dt.with_timezone(&Utc)
                        .to_rfc3339_opts(SecondsFormat::Millis, true),
                );
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return date
                    .and_hms_opt(0, 0, 0)
                    .map(|dt| dt.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true));
            }
            Some(s.to_string())
        }
        serde_json::Value::Number(n) => {
            let raw = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            // Values this large are epoch milliseconds.
            if raw.abs() >= 100_000_000_000 {
                from_secs(raw.div_euclid(1000), (raw.rem_euclid(1000) as u32) * 1_000_000)
            } else {
                from_secs(raw, 0)
            }
        }
        serde_json::Value::Object(map) => {
            let secs = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(serde_json::Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(0);
            from_secs(secs, nanos.min(999_999_999) as u32)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_type_round_trip_names() {
        for t in RecordType::ALL {
            assert_eq!(t.as_str().parse::<RecordType>().unwrap(), t);
        }
        assert_eq!(
            "meeting_note".parse::<RecordType>().unwrap(),
            RecordType::MeetingNote
        );
        assert!("folder".parse::<RecordType>().is_err());
    }

    #[test]
    fn test_only_graph_types_have_lexical_index() {
        let lexical: Vec<_> = RecordType::ALL
            .iter()
            .filter(|t| t.has_lexical_index())
            .collect();
        assert_eq!(
            lexical,
            vec![&RecordType::Entity, &RecordType::Relation, &RecordType::Topic]
        );
    }

    #[test]
    fn test_timestamp_normalization() {
        assert_eq!(
            normalize_timestamp(&json!("2024-03-01T09:00:00+09:00")).unwrap(),
            "2024-03-01T00:00:00.000Z"
        );
        assert_eq!(
            normalize_timestamp(&json!("2024-03-01")).unwrap(),
            "2024-03-01T00:00:00.000Z"
        );
        assert_eq!(
            normalize_timestamp(&json!(1_700_000_000)).unwrap(),
            "2023-11-14T22:13:20.000Z"
        );
        assert_eq!(
            normalize_timestamp(&json!(1_700_000_000_000i64)).unwrap(),
            "2023-11-14T22:13:20.000Z"
        );
        assert_eq!(
            normalize_timestamp(&json!({"seconds": 1_700_000_000, "nanoseconds": 0})).unwrap(),
            "2023-11-14T22:13:20.000Z"
        );
        assert!(normalize_timestamp(&json!(null)).is_none());
    }

    #[test]
    fn test_record_deserializes_flexible_fields() {
        let record: Record = serde_json::from_value(json!({
            "recordType": "topic",
            "id": "t1",
            "title": "Pricing",
            "keywords": "[\"price\", \"plan\"]",
            "tags": "billing",
            "createdAt": {"seconds": 1_700_000_000, "nanoseconds": 0}
        }))
        .unwrap();
        let Record::Topic(topic) = &record else {
            panic!("expected topic");
        };
        assert_eq!(topic.keywords, vec!["price", "plan"]);
        assert_eq!(topic.tags, vec!["billing"]);
        assert_eq!(record.created_at(), Some("2023-11-14T22:13:20.000Z"));
        assert_eq!(record.record_type(), RecordType::Topic);
    }

    #[test]
    fn test_entity_type_field_is_named_type() {
        let record: Record = serde_json::from_value(json!({
            "recordType": "entity",
            "id": "e1",
            "name": "Toyota",
            "type": "company"
        }))
        .unwrap();
        let Record::Entity(e) = record else {
            panic!("expected entity");
        };
        assert_eq!(e.entity_type.as_deref(), Some("company"));
    }

    #[test]
    fn test_signature_is_canonical() {
        assert_eq!(SearchFilters::default().signature(RecordType::Entity), "all");

        let filters = SearchFilters {
            organization_id: Some("org-1".into()),
            entity_type: Some("company".into()),
            relation_type: Some("owns".into()),
            ..Default::default()
        };
        assert_eq!(
            filters.signature(RecordType::Entity),
            r#"{"entityType":"company","organizationId":"org-1"}"#
        );
        assert_eq!(
            filters.signature(RecordType::Relation),
            r#"{"organizationId":"org-1","relationType":"owns"}"#
        );
        assert_eq!(
            filters.signature(RecordType::Topic),
            r#"{"organizationId":"org-1"}"#
        );
    }

    #[test]
    fn test_matches_filters_date_range_inclusive() {
        let record = Record::MeetingNote(TitledRecord {
            id: "m1".into(),
            title: "Weekly".into(),
            created_at: Some("2024-02-01T00:00:00.000Z".into()),
            ..Default::default()
        });
        let inclusive = SearchFilters {
            created_after: Some("2024-02-01T00:00:00.000Z".into()),
            created_before: Some("2024-02-01T00:00:00.000Z".into()),
            ..Default::default()
        };
        assert!(record.matches_filters(&inclusive));

        let later = SearchFilters {
            created_after: Some("2024-03-01".into()),
            ..Default::default()
        };
        assert!(!record.matches_filters(&later));

        let undated = Record::MeetingNote(TitledRecord {
            id: "m2".into(),
            ..Default::default()
        });
        assert!(undated.matches_filters(&later));
    }

    #[test]
    fn test_matches_scope_organization_and_attribute() {
        let entity = Record::Entity(Entity {
            id: "e1".into(),
            organization_id: Some("org-a".into()),
            name: "Toyota".into(),
            entity_type: Some("company".into()),
            ..Default::default()
        });
        assert!(entity.matches_scope(&SearchFilters::for_organization("org-a")));
        assert!(!entity.matches_scope(&SearchFilters::for_organization("org-b")));
        let by_type = SearchFilters {
            entity_type: Some("person".into()),
            ..Default::default()
        };
        assert!(!entity.matches_scope(&by_type));
    }

    #[test]
    fn test_organization_filter_excludes_records_without_organization() {
        let orphan = Record::Entity(Entity {
            id: "orphan".into(),
            name: "Toyota".into(),
            ..Default::default()
        });
        assert!(orphan.matches_scope(&SearchFilters::default()));
        assert!(!orphan.matches_scope(&SearchFilters::for_organization("org-a")));
        assert!(!orphan.matches_filters(&SearchFilters::for_organization("org-a")));
    }

    #[test]
    fn test_search_result_serializes_type_tag() {
        let result = SearchResult {
            id: "e1".into(),
            score: 0.5,
            similarity: 0.4,
            matched_terms: vec![],
            payload: ResultPayload::Entity(Entity {
                id: "e1".into(),
                name: "Toyota".into(),
                ..Default::default()
            }),
        };
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["type"], "entity");
        assert_eq!(value["data"]["name"], "Toyota");
        assert_eq!(result.record_type(), RecordType::Entity);
    }
}
