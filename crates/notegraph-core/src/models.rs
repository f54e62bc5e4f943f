//! Extraction data model.
//!
//! Every span in these types is a half-open `[start, end)` range of
//! **character** offsets into the source note (see [`crate::text::SourceText`]).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

// =============================================================================
// ENUMS
// =============================================================================

/// Rollup sentiment of a note, segment, or fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    #[default]
    Neutral,
    Varied,
}

impl Sentiment {
    pub const ALL: [Sentiment; 4] = [
        Sentiment::Positive,
        Sentiment::Negative,
        Sentiment::Neutral,
        Sentiment::Varied,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Varied => "varied",
        }
    }
}

/// Kind of an extracted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Org,
    Tool,
    Place,
    Concept,
    Event,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        EntityType::Person,
        EntityType::Org,
        EntityType::Tool,
        EntityType::Place,
        EntityType::Concept,
        EntityType::Event,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Org => "org",
            Self::Tool => "tool",
            Self::Place => "place",
            Self::Concept => "concept",
            Self::Event => "event",
        }
    }
}

/// Whose viewpoint a fact is asserted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    #[serde(rename = "self")]
    SelfView,
    Other,
    Uncertain,
}

impl Perspective {
    pub const ALL: [Perspective; 3] = [
        Perspective::SelfView,
        Perspective::Other,
        Perspective::Uncertain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfView => "self",
            Self::Other => "other",
            Self::Uncertain => "uncertain",
        }
    }
}

macro_rules! impl_wire_enum {
    ($ty:ident, $label:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim().to_lowercase();
                $ty::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == wanted)
                    .ok_or_else(|| {
                        let allowed: Vec<&str> = $ty::ALL.iter().map(|v| v.as_str()).collect();
                        Error::schema(
                            $label,
                            format!("unknown value {:?}, expected one of {:?}", s, allowed),
                        )
                    })
            }
        }
    };
}

impl_wire_enum!(Sentiment, "sentiment");
impl_wire_enum!(EntityType, "type");
impl_wire_enum!(Perspective, "perspective");

// =============================================================================
// EXTRACTION (v2)
// =============================================================================

/// Named emotion with an intensity between 1 and 5.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emotion {
    pub name: String,
    pub intensity: u8,
}

/// A grounded entity mention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name_start: usize,
    pub name_end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_end: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub confidence: f64,
}

impl Entity {
    /// Evidence span, when both ends are present.
    pub fn evidence_span(&self) -> Option<(usize, usize)> {
        self.evidence_start.zip(self.evidence_end)
    }
}

/// A possession-scoped statement grounded in an evidence span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub id: String,
    pub owner_entity_id: String,
    pub perspective: Perspective,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_entity_id: Option<String>,
    pub predicate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_text: Option<String>,
    pub evidence_start: usize,
    pub evidence_end: usize,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
}

/// Directed edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub from_entity_id: String,
    pub to_entity_id: String,
    #[serde(rename = "type")]
    pub relation_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_end: Option<usize>,
    pub confidence: f64,
}

/// An action item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_entity_id: Option<String>,
    pub evidence_start: usize,
    pub evidence_end: usize,
    pub confidence: f64,
}

/// Named, possibly overlapping tag bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub name: String,
    pub entity_ids: Vec<String>,
    pub fact_ids: Vec<String>,
}

/// Sentence-aligned region of the note that clusters related evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: String,
    pub start: usize,
    pub end: usize,
    pub sentiment: Sentiment,
    pub summary: String,
    pub entity_ids: Vec<String>,
    pub fact_ids: Vec<String>,
    pub relation_indexes: Vec<usize>,
}

/// Root artifact of one extraction attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    pub title: String,
    pub note_type: String,
    pub summary: String,
    pub language: String,
    pub date: Option<String>,
    pub sentiment: Sentiment,
    pub emotions: Vec<Emotion>,
    pub entities: Vec<Entity>,
    pub facts: Vec<Fact>,
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub todos: Vec<Todo>,
    pub groups: Vec<Group>,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Extraction {
    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.id == id)
    }

    pub fn fact(&self, id: &str) -> Option<&Fact> {
        self.facts.iter().find(|f| f.id == id)
    }

    pub fn has_entity(&self, id: &str) -> bool {
        self.entities.iter().any(|e| e.id == id)
    }

    /// True when the extraction carries no facts and no entities.
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty() && self.entities.is_empty()
    }
}

// =============================================================================
// LEGACY SHAPE
// =============================================================================

/// One grounded value from the single-array legacy shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundedItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub value: String,
    pub start: usize,
    pub end: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Legacy `{ items: [...] }` extraction.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LegacyExtraction {
    pub items: Vec<GroundedItem>,
}

// =============================================================================
// RAW MODEL OUTPUT
// =============================================================================

/// Untrusted model output as handed to the validator.
#[derive(Debug, Clone, PartialEq)]
pub enum RawModelOutput {
    /// Already-parsed JSON (structured generation).
    Object(serde_json::Value),
    /// Free text that may wrap a JSON object in prose or markdown.
    Text(String),
}

impl RawModelOutput {
    /// Text form for debug bundles.
    pub fn to_text(&self) -> String {
        match self {
            Self::Object(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

impl From<serde_json::Value> for RawModelOutput {
    fn from(value: serde_json::Value) -> Self {
        Self::Object(value)
    }
}

impl From<String> for RawModelOutput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RawModelOutput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Decoded payload discriminated by shape before any field access.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelPayload {
    /// `{ items: [...] }`
    Legacy(serde_json::Map<String, serde_json::Value>),
    /// Full multi-array extraction.
    V2(serde_json::Map<String, serde_json::Value>),
}

/// Top-level arrays whose presence marks the v2 shape.
pub const V2_ARRAYS: [&str; 7] = [
    "emotions",
    "entities",
    "facts",
    "relations",
    "groups",
    "todos",
    "segments",
];

impl ModelPayload {
    /// Classify a JSON object. The legacy shape is an `items` array with none
    /// of the v2 arrays beside it.
    pub fn classify(map: serde_json::Map<String, serde_json::Value>) -> Self {
        let has_items = map.get("items").map(|v| v.is_array()).unwrap_or(false);
        let has_v2 = V2_ARRAYS.iter().any(|k| map.contains_key(*k));
        if has_items && !has_v2 {
            Self::Legacy(map)
        } else {
            Self::V2(map)
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

// =============================================================================
// DEBUG BUNDLE
// =============================================================================

/// One cluster's journey through segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentationTraceEntry {
    pub cluster_index: usize,
    pub span_count: usize,
    pub raw_start: usize,
    pub raw_end: usize,
    pub start: usize,
    pub end: usize,
    /// Index of the earlier cluster this one was folded into after clamping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged_into: Option<usize>,
}

/// Runtime details attached to a debug bundle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeInfo {
    pub model_path: Option<String>,
    pub server_mode: Option<String>,
    pub n_predict: Option<u32>,
    pub total_ms: u64,
}

/// Everything needed to inspect one extraction attempt after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugBundle {
    pub run_id: uuid::Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub input_text: String,
    pub prompt: String,
    pub raw_model_output: Option<String>,
    pub validated_before_segmentation: Option<Extraction>,
    pub final_extraction: Option<Extraction>,
    pub segmentation_trace: Vec<SegmentationTraceEntry>,
    pub runtime: RuntimeInfo,
    pub fallback_used: bool,
    pub errors: Vec<String>,
}

impl DebugBundle {
    /// Start an empty bundle for a run.
    pub fn new(input_text: &str, prompt: &str) -> Self {
        Self {
            run_id: uuid::Uuid::now_v7(),
            created_at: chrono::Utc::now(),
            input_text: input_text.to_string(),
            prompt: prompt.to_string(),
            raw_model_output: None,
            validated_before_segmentation: None,
            final_extraction: None,
            segmentation_trace: Vec::new(),
            runtime: RuntimeInfo::default(),
            fallback_used: false,
            errors: Vec::new(),
        }
    }
}

// =============================================================================
// LANES
// =============================================================================

/// A provider-specific run of the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneId {
    Local,
    OpenAi,
    Gemini,
}

impl LaneId {
    pub const ALL: [LaneId; 3] = [LaneId::Local, LaneId::OpenAi, LaneId::Gemini];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LaneId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(Error::Config(format!("unknown lane: {}", other))),
        }
    }
}

/// Terminal state of a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneStatus {
    /// Pipeline produced a validated extraction.
    Ok,
    /// Every attempt failed.
    Error,
    /// Required credential absent; no call was made.
    Skipped,
}

/// Outcome of one lane, independent of its siblings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionLaneResult {
    pub lane: LaneId,
    pub status: LaneStatus,
    pub provider: String,
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<Extraction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub duration_ms: u64,
}
