//! Extraction prompts and the JSON Schema handed to structured generation.
//!
//! The schema describes the exact multi-array shape the validator accepts.
//! Every property is listed as required; optional values are expressed as a
//! union with `null` rather than by omission, which strict structured-output
//! modes demand.

use serde_json::{json, Value};

use notegraph_core::defaults::TITLE_MAX_CHARS;
use notegraph_core::{EntityType, Perspective, Sentiment};

/// Name attached to the schema in structured-output requests.
pub const SCHEMA_NAME: &str = "note_extraction";

/// Appended to the freeform retry prompt.
pub const RECOVERY_DIRECTIVE: &str = "Your previous answer could not be used. Return exactly one complete JSON object and nothing else. Do not omit any required array: emotions, entities, facts, relations, todos, groups, and segments must all be present, even when empty.";

/// System prompt shared by every lane.
pub const SYSTEM_PROMPT: &str = r#"You extract structured knowledge from a personal note.

Rules:
- Answer with one JSON object only. No prose, no markdown.
- Offsets are character offsets into the note, half-open [start, end).
- Every entity "name" must be copied exactly from the note, and note[nameStart, nameEnd) must equal it.
- Every fact needs evidenceStart/evidenceEnd covering the sentence or clause that supports it.
- Use the id "self" for the author of the note. Facts the author states about themselves are owned by "self" with perspective "self".
- Facts about someone else are owned by that entity with perspective "other". Use "uncertain" when the owner is unclear.
- A fact has either objectEntityId or objectText, never both.
- title is at most 25 characters.
- confidence values are between 0 and 1; emotion intensity is an integer from 1 to 5.
- Leave segments empty; they are computed later."#;

/// User prompt for a note.
pub fn build_user_prompt(text: &str) -> String {
    format!(
        "Extract entities, facts, relations, todos, groups, emotions, and overall sentiment from this note.\n\nNOTE:\n<<<\n{}\n>>>",
        text
    )
}

/// Freeform retry prompt: the user prompt plus the recovery directive.
pub fn build_recovery_prompt(text: &str) -> String {
    format!("{}\n\n{}", build_user_prompt(text), RECOVERY_DIRECTIVE)
}

fn nullable(kind: &str) -> Value {
    json!({ "type": [kind, "null"] })
}

fn enum_of(values: Vec<&'static str>) -> Value {
    json!({ "type": "string", "enum": values })
}

/// Object schema with every property required and no extras.
fn object(properties: Value) -> Value {
    let required: Vec<String> = properties
        .as_object()
        .map(|p| p.keys().cloned().collect())
        .unwrap_or_default();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn array_of(items: Value) -> Value {
    json!({ "type": "array", "items": items })
}

/// JSON Schema for the multi-array extraction shape.
pub fn extraction_schema() -> Value {
    let sentiment = enum_of(Sentiment::ALL.iter().map(|s| s.as_str()).collect());
    let entity_type = enum_of(EntityType::ALL.iter().map(|t| t.as_str()).collect());
    let perspective = enum_of(Perspective::ALL.iter().map(|p| p.as_str()).collect());
    let ids = array_of(json!({ "type": "string" }));
    let confidence = json!({ "type": "number", "minimum": 0, "maximum": 1 });
    let offset = json!({ "type": "integer", "minimum": 0 });

    object(json!({
        "title": { "type": "string", "maxLength": TITLE_MAX_CHARS },
        "noteType": { "type": "string" },
        "summary": { "type": "string" },
        "language": { "type": "string" },
        "date": nullable("string"),
        "sentiment": sentiment.clone(),
        "emotions": array_of(object(json!({
            "name": { "type": "string" },
            "intensity": { "type": "integer", "minimum": 1, "maximum": 5 }
        }))),
        "entities": array_of(object(json!({
            "id": { "type": "string" },
            "name": { "type": "string" },
            "type": entity_type,
            "nameStart": offset.clone(),
            "nameEnd": offset.clone(),
            "evidenceStart": nullable("integer"),
            "evidenceEnd": nullable("integer"),
            "context": nullable("string"),
            "confidence": confidence.clone()
        }))),
        "facts": array_of(object(json!({
            "id": { "type": "string" },
            "ownerEntityId": { "type": "string" },
            "perspective": perspective,
            "subjectEntityId": nullable("string"),
            "predicate": { "type": "string" },
            "objectEntityId": nullable("string"),
            "objectText": nullable("string"),
            "evidenceStart": offset.clone(),
            "evidenceEnd": offset.clone(),
            "confidence": confidence.clone()
        }))),
        "relations": array_of(object(json!({
            "fromEntityId": { "type": "string" },
            "toEntityId": { "type": "string" },
            "type": { "type": "string" },
            "evidenceStart": nullable("integer"),
            "evidenceEnd": nullable("integer"),
            "confidence": confidence.clone()
        }))),
        "todos": array_of(object(json!({
            "id": { "type": "string" },
            "description": { "type": "string" },
            "assigneeEntityId": nullable("string"),
            "evidenceStart": offset.clone(),
            "evidenceEnd": offset.clone(),
            "confidence": confidence
        }))),
        "groups": array_of(object(json!({
            "name": { "type": "string" },
            "entityIds": ids.clone(),
            "factIds": ids.clone()
        }))),
        "segments": array_of(object(json!({
            "id": { "type": "string" },
            "start": offset.clone(),
            "end": offset,
            "sentiment": sentiment,
            "summary": { "type": "string" },
            "entityIds": ids.clone(),
            "factIds": ids,
            "relationIndexes": array_of(json!({ "type": "integer", "minimum": 0 }))
        })))
    }))
}
