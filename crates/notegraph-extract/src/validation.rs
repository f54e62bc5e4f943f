//! Grounding validator.
//!
//! Turns untrusted model output into a structurally valid [`Extraction`] (or a
//! [`LegacyExtraction`] for the single-array shape). Field errors are fatal and
//! carry the exact field path; grounding mismatches are repaired or the item is
//! dropped, and references to dropped entities are pruned in the same pass.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use notegraph_core::defaults::TITLE_MAX_CHARS;
use notegraph_core::{
    Emotion, Entity, Error, Extraction, Fact, GroundedItem, Group, LegacyExtraction, ModelPayload,
    RawModelOutput, Relation, Result, Segment, Sentiment, SourceText, Todo,
};

use crate::fields::{objects, Fields};
use crate::grounding::{ground, Grounding};
use crate::json_scan::decode_raw;

/// Arrays that must be present on the multi-array shape.
pub const REQUIRED_ARRAYS: [&str; 5] = ["emotions", "entities", "facts", "relations", "groups"];

/// What the validator changed while accepting an extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Spans moved to the nearest exact occurrence.
    pub repaired: usize,
    /// Entities whose name occurs nowhere in the text.
    pub dropped_entities: usize,
    /// Relations removed because an endpoint was dropped.
    pub dropped_relations: usize,
    /// Todos whose evidence span fell outside the text.
    pub dropped_todos: usize,
    /// Legacy items whose value occurs nowhere in the text.
    pub dropped_items: usize,
    /// Model-authored segments with a bad span or field.
    pub dropped_segments: usize,
    /// Id references cleared or filtered out of facts, groups, segments, and todos.
    pub pruned_references: usize,
}

impl ValidationReport {
    pub fn dropped_total(&self) -> usize {
        self.dropped_entities
            + self.dropped_relations
            + self.dropped_todos
            + self.dropped_items
            + self.dropped_segments
    }
}

/// Decode raw output and discriminate its shape.
pub fn decode_payload(raw: &RawModelOutput) -> Result<ModelPayload> {
    Ok(ModelPayload::classify(decode_raw(raw)?))
}

/// Validate multi-array model output against `text`.
pub fn validate_extraction(
    text: &str,
    raw: &RawModelOutput,
) -> Result<(Extraction, ValidationReport)> {
    match decode_payload(raw)? {
        ModelPayload::V2(map) => validate_v2(text, &map),
        ModelPayload::Legacy(_) => Err(Error::Shape(
            "expected multi-array extraction, got legacy `items` shape".to_string(),
        )),
    }
}

/// Validate single-array `{ items: [...] }` model output against `text`.
pub fn validate_legacy(
    text: &str,
    raw: &RawModelOutput,
) -> Result<(LegacyExtraction, ValidationReport)> {
    match decode_payload(raw)? {
        ModelPayload::Legacy(map) => validate_items(text, &map),
        ModelPayload::V2(_) => Err(Error::Shape("expected legacy `items` array".to_string())),
    }
}

// =============================================================================
// SPANS
// =============================================================================

fn check_span(
    src: &SourceText<'_>,
    f: &Fields<'_>,
    key: &str,
    start: i64,
    end: i64,
) -> Result<(usize, usize)> {
    if start < 0 || end <= start || end as u64 > src.len_chars() as u64 {
        return Err(Error::schema(
            f.child(key),
            format!(
                "span [{}, {}) outside text of {} characters",
                start,
                end,
                src.len_chars()
            ),
        ));
    }
    Ok((start as usize, end as usize))
}

fn required_span(
    src: &SourceText<'_>,
    f: &Fields<'_>,
    start_key: &str,
    end_key: &str,
) -> Result<(usize, usize)> {
    let start = f.integer(start_key)?;
    let end = f.integer(end_key)?;
    check_span(src, f, start_key, start, end)
}

/// Optional span; a lone endpoint counts as no span.
fn optional_span(
    src: &SourceText<'_>,
    f: &Fields<'_>,
    start_key: &str,
    end_key: &str,
) -> Result<Option<(usize, usize)>> {
    match (f.opt_integer(start_key)?, f.opt_integer(end_key)?) {
        (Some(start), Some(end)) => check_span(src, f, start_key, start, end).map(Some),
        _ => Ok(None),
    }
}

// =============================================================================
// MULTI-ARRAY SHAPE
// =============================================================================

fn validate_v2(text: &str, map: &Map<String, Value>) -> Result<(Extraction, ValidationReport)> {
    let src = SourceText::new(text);
    let root = Fields::root(map);
    let mut report = ValidationReport::default();

    for key in REQUIRED_ARRAYS {
        if root.opt_array(key)?.is_none() {
            return Err(Error::Shape(format!("missing required array `{}`", key)));
        }
    }

    let title = root.string("title")?;
    let title_chars = title.chars().count();
    if title_chars > TITLE_MAX_CHARS {
        return Err(Error::schema(
            "title",
            format!(
                "title is {} characters, limit is {}",
                title_chars, TITLE_MAX_CHARS
            ),
        ));
    }
    let note_type = root.string("noteType")?;
    let summary = root.string("summary")?;
    let language = root.string("language")?;
    let date = root.opt_nonempty_string("date")?;
    let sentiment: Sentiment = root.enumeration("sentiment")?;

    let emotions = objects(root.array("emotions")?, "emotions")
        .map(|item| parse_emotion(&item?))
        .collect::<Result<Vec<_>>>()?;

    let mut entities = Vec::new();
    let mut dropped_ids = HashSet::new();
    for item in objects(root.array("entities")?, "entities") {
        let f = item?;
        match parse_entity(&src, &f)? {
            (entity, Grounding::Missing) => {
                debug!(entity_id = %entity.id, name = %entity.name, "Entity name not found in text; dropping");
                report.dropped_entities += 1;
                dropped_ids.insert(entity.id);
            }
            (mut entity, grounding) => {
                if let Some((start, end)) = grounding.span() {
                    if grounding.is_repaired() {
                        debug!(
                            entity_id = %entity.id,
                            from = entity.name_start,
                            to = start,
                            "Repaired entity name span"
                        );
                        report.repaired += 1;
                    }
                    entity.name_start = start;
                    entity.name_end = end;
                }
                entities.push(entity);
            }
        }
    }
    // A duplicate id that still has a grounded entity stays referenced.
    for entity in &entities {
        dropped_ids.remove(&entity.id);
    }

    let facts = objects(root.array("facts")?, "facts")
        .map(|item| parse_fact(&src, &item?))
        .collect::<Result<Vec<_>>>()?;

    let relations = objects(root.array("relations")?, "relations")
        .map(|item| parse_relation(&src, &item?))
        .collect::<Result<Vec<_>>>()?;

    let mut todos = Vec::new();
    if let Some(items) = root.opt_array("todos")? {
        for item in objects(items, "todos") {
            match parse_todo(&src, &item?)? {
                Some(todo) => todos.push(todo),
                None => report.dropped_todos += 1,
            }
        }
    }

    let groups = objects(root.array("groups")?, "groups")
        .map(|item| parse_group(&item?))
        .collect::<Result<Vec<_>>>()?;

    // Segments are recomputed after ownership; a malformed one is dropped, not fatal.
    let mut segments = Vec::new();
    if let Some(items) = root.opt_array("segments")? {
        for item in objects(items, "segments") {
            match item.and_then(|f| parse_segment(&src, &f)) {
                Ok(segment) => segments.push(segment),
                Err(e) => {
                    debug!(error = %e, "Dropping malformed segment from model output");
                    report.dropped_segments += 1;
                }
            }
        }
    }

    let mut extraction = Extraction {
        title,
        note_type,
        summary,
        language,
        date,
        sentiment,
        emotions,
        entities,
        facts,
        relations,
        todos,
        groups,
        segments,
    };

    prune_dropped(&mut extraction, &dropped_ids, &mut report);

    if report.dropped_total() > 0 {
        warn!(
            dropped = report.dropped_total(),
            repaired = report.repaired,
            "Dropped ungroundable items from model output"
        );
    } else {
        debug!(repaired = report.repaired, "Validated extraction");
    }

    Ok((extraction, report))
}

fn parse_emotion(f: &Fields<'_>) -> Result<Emotion> {
    let name = f.string("name")?;
    let intensity = f.integer("intensity")?;
    if !(1..=5).contains(&intensity) {
        return Err(Error::schema(
            f.child("intensity"),
            format!("intensity {} outside 1..=5", intensity),
        ));
    }
    Ok(Emotion {
        name,
        intensity: intensity as u8,
    })
}

fn parse_entity(src: &SourceText<'_>, f: &Fields<'_>) -> Result<(Entity, Grounding)> {
    let id = f.string("id")?;
    let name = f.string("name")?;
    let entity_type = f.enumeration("type")?;
    let claimed_start = f.integer("nameStart")?;
    let claimed_end = f.integer("nameEnd")?;
    let evidence = optional_span(src, f, "evidenceStart", "evidenceEnd")?;
    let context = f.opt_nonempty_string("context")?;
    let confidence = f.confidence("confidence")?;

    let grounding = ground(src, &name, claimed_start, claimed_end);
    let entity = Entity {
        id,
        name,
        entity_type,
        name_start: claimed_start.max(0) as usize,
        name_end: claimed_end.max(0) as usize,
        evidence_start: evidence.map(|(s, _)| s),
        evidence_end: evidence.map(|(_, e)| e),
        context,
        confidence,
    };
    Ok((entity, grounding))
}

fn parse_fact(src: &SourceText<'_>, f: &Fields<'_>) -> Result<Fact> {
    let id = f.string("id")?;
    let owner_entity_id = f.string("ownerEntityId")?;
    let perspective = f.enumeration("perspective")?;
    let subject_entity_id = f.opt_nonempty_string("subjectEntityId")?;
    let predicate = f.string("predicate")?;
    let object_entity_id = f.opt_nonempty_string("objectEntityId")?;
    // Object is an entity id or free text, never both; the id wins.
    let object_text = match object_entity_id {
        Some(_) => None,
        None => f.opt_nonempty_string("objectText")?,
    };
    let (evidence_start, evidence_end) = required_span(src, f, "evidenceStart", "evidenceEnd")?;
    let confidence = f.confidence("confidence")?;
    let segment_id = f.opt_nonempty_string("segmentId")?;

    Ok(Fact {
        id,
        owner_entity_id,
        perspective,
        subject_entity_id,
        predicate,
        object_entity_id,
        object_text,
        evidence_start,
        evidence_end,
        confidence,
        segment_id,
    })
}

fn parse_relation(src: &SourceText<'_>, f: &Fields<'_>) -> Result<Relation> {
    let evidence = optional_span(src, f, "evidenceStart", "evidenceEnd")?;
    Ok(Relation {
        from_entity_id: f.string("fromEntityId")?,
        to_entity_id: f.string("toEntityId")?,
        relation_type: f.string("type")?,
        evidence_start: evidence.map(|(s, _)| s),
        evidence_end: evidence.map(|(_, e)| e),
        confidence: f.confidence("confidence")?,
    })
}

/// `None` when the evidence span falls outside the text.
fn parse_todo(src: &SourceText<'_>, f: &Fields<'_>) -> Result<Option<Todo>> {
    let id = f.string("id")?;
    let description = f.string("description")?;
    let assignee_entity_id = f.opt_nonempty_string("assigneeEntityId")?;
    let start = f.integer("evidenceStart")?;
    let end = f.integer("evidenceEnd")?;
    let confidence = f.confidence("confidence")?;

    let (evidence_start, evidence_end) = match check_span(src, f, "evidenceStart", start, end) {
        Ok(span) => span,
        Err(e) => {
            debug!(todo_id = %id, error = %e, "Dropping todo with invalid evidence span");
            return Ok(None);
        }
    };

    Ok(Some(Todo {
        id,
        description,
        assignee_entity_id,
        evidence_start,
        evidence_end,
        confidence,
    }))
}

fn parse_group(f: &Fields<'_>) -> Result<Group> {
    Ok(Group {
        name: f.string("name")?,
        entity_ids: f.string_list("entityIds")?,
        fact_ids: f.string_list("factIds")?,
    })
}

fn parse_segment(src: &SourceText<'_>, f: &Fields<'_>) -> Result<Segment> {
    let (start, end) = required_span(src, f, "start", "end")?;
    let relation_indexes = match f.opt_array("relationIndexes")? {
        Some(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| {
                v.as_u64().map(|n| n as usize).ok_or_else(|| {
                    Error::schema(
                        format!("{}[{}]", f.child("relationIndexes"), i),
                        "expected non-negative integer",
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };
    Ok(Segment {
        id: f.string("id")?,
        start,
        end,
        sentiment: f.enumeration("sentiment")?,
        summary: f.string("summary")?,
        entity_ids: f.string_list("entityIds")?,
        fact_ids: f.string_list("factIds")?,
        relation_indexes,
    })
}

/// Remove every reference to a dropped entity id. Fact owners are left for the
/// ownership resolver.
fn prune_dropped(
    extraction: &mut Extraction,
    dropped: &HashSet<String>,
    report: &mut ValidationReport,
) {
    if dropped.is_empty() {
        return;
    }

    // Old relation index -> new index, for segment remapping.
    let mut index_map = Vec::with_capacity(extraction.relations.len());
    let mut kept = Vec::with_capacity(extraction.relations.len());
    for relation in extraction.relations.drain(..) {
        if dropped.contains(&relation.from_entity_id) || dropped.contains(&relation.to_entity_id) {
            index_map.push(None);
            report.dropped_relations += 1;
        } else {
            index_map.push(Some(kept.len()));
            kept.push(relation);
        }
    }
    extraction.relations = kept;

    let mut pruned = 0;
    for fact in &mut extraction.facts {
        pruned += clear_dropped(&mut fact.subject_entity_id, dropped);
        pruned += clear_dropped(&mut fact.object_entity_id, dropped);
    }
    for todo in &mut extraction.todos {
        pruned += clear_dropped(&mut todo.assignee_entity_id, dropped);
    }
    for group in &mut extraction.groups {
        pruned += retain_live(&mut group.entity_ids, dropped);
    }
    for segment in &mut extraction.segments {
        pruned += retain_live(&mut segment.entity_ids, dropped);
        let before = segment.relation_indexes.len();
        segment.relation_indexes = segment
            .relation_indexes
            .iter()
            .filter_map(|&i| index_map.get(i).copied().flatten())
            .collect();
        pruned += before - segment.relation_indexes.len();
    }

    report.pruned_references += pruned;
}

fn clear_dropped(slot: &mut Option<String>, dropped: &HashSet<String>) -> usize {
    if slot.as_deref().map_or(false, |id| dropped.contains(id)) {
        *slot = None;
        1
    } else {
        0
    }
}

fn retain_live(ids: &mut Vec<String>, dropped: &HashSet<String>) -> usize {
    let before = ids.len();
    ids.retain(|id| !dropped.contains(id));
    before - ids.len()
}

// =============================================================================
// LEGACY SHAPE
// =============================================================================

fn validate_items(
    text: &str,
    map: &Map<String, Value>,
) -> Result<(LegacyExtraction, ValidationReport)> {
    let src = SourceText::new(text);
    let root = Fields::root(map);
    let mut report = ValidationReport::default();
    let mut items = Vec::new();

    for item in objects(root.array("items")?, "items") {
        let f = item?;
        let value = f.string("value")?;
        let claimed_start = f.integer("start")?;
        let claimed_end = f.integer("end")?;
        let label = f.opt_nonempty_string("label")?;
        let confidence = f.opt_confidence("confidence")?;

        match ground(&src, &value, claimed_start, claimed_end) {
            Grounding::Missing => {
                debug!(value = %value, "Legacy item value not found in text; dropping");
                report.dropped_items += 1;
            }
            grounding => {
                if grounding.is_repaired() {
                    report.repaired += 1;
                }
                if let Some((start, end)) = grounding.span() {
                    items.push(GroundedItem {
                        label,
                        value,
                        start,
                        end,
                        confidence,
                    });
                }
            }
        }
    }

    if report.dropped_items > 0 {
        warn!(dropped = report.dropped_items, repaired = report.repaired, "Dropped ungroundable legacy items");
    }

    Ok((LegacyExtraction { items }, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const GEMMA: &str = "I want Gemma 2B Q5 with llama.cpp under 3GB RAM";

    fn base(entities: Value, facts: Value) -> Value {
        json!({
            "title": "Model pick",
            "noteType": "idea",
            "summary": "Choosing a small model",
            "language": "en",
            "date": null,
            "sentiment": "neutral",
            "emotions": [],
            "entities": entities,
            "facts": facts,
            "relations": [],
            "groups": []
        })
    }

    fn entity(id: &str, name: &str, start: i64, end: i64) -> Value {
        json!({
            "id": id, "name": name, "type": "tool",
            "nameStart": start, "nameEnd": end, "confidence": 0.9
        })
    }

    fn validate(text: &str, value: Value) -> Result<(Extraction, ValidationReport)> {
        validate_extraction(text, &RawModelOutput::Object(value))
    }

    #[test]
    fn test_exact_entity_span_unchanged() {
        let value = base(json!([entity("e1", "llama.cpp", 24, 33)]), json!([]));
        let (ex, report) = validate(GEMMA, value).unwrap();
        assert_eq!(ex.entities[0].name_start, 24);
        assert_eq!(ex.entities[0].name_end, 33);
        assert_eq!(report, ValidationReport::default());
    }

    #[test]
    fn test_negative_start_repaired() {
        let value = base(json!([entity("e1", "Gemma 2B Q5", -1, 10)]), json!([]));
        let (ex, report) = validate(GEMMA, value).unwrap();
        assert_eq!(ex.entities[0].name_start, 7);
        assert_eq!(ex.entities[0].name_end, 18);
        assert_eq!(report.repaired, 1);
    }

    #[test]
    fn test_ungroundable_entity_dropped_and_references_pruned() {
        let mut value = base(
            json!([entity("e1", "llama.cpp", 24, 33), entity("e2", "Mistral", 0, 7)]),
            json!([{
                "id": "f1", "ownerEntityId": "self", "perspective": "self",
                "subjectEntityId": "e2", "predicate": "wants",
                "objectEntityId": "e2", "evidenceStart": 0, "evidenceEnd": 18,
                "confidence": 0.8
            }]),
        );
        value["relations"] = json!([
            {"fromEntityId": "e1", "toEntityId": "e2", "type": "runs", "confidence": 0.5},
            {"fromEntityId": "e1", "toEntityId": "e1", "type": "is", "confidence": 0.5}
        ]);
        value["groups"] = json!([{"name": "tools", "entityIds": ["e1", "e2"], "factIds": ["f1"]}]);
        value["segments"] = json!([{
            "id": "seg_1", "start": 0, "end": 47, "sentiment": "neutral", "summary": "s",
            "entityIds": ["e2"], "factIds": [], "relationIndexes": [0, 1]
        }]);

        let (ex, report) = validate(GEMMA, value).unwrap();
        assert_eq!(ex.entities.len(), 1);
        assert_eq!(ex.relations.len(), 1);
        assert_eq!(ex.relations[0].relation_type, "is");
        assert_eq!(ex.facts[0].subject_entity_id, None);
        assert_eq!(ex.facts[0].object_entity_id, None);
        assert_eq!(ex.groups[0].entity_ids, vec!["e1".to_string()]);
        assert!(ex.segments[0].entity_ids.is_empty());
        assert_eq!(ex.segments[0].relation_indexes, vec![0]);
        assert_eq!(report.dropped_entities, 1);
        assert_eq!(report.dropped_relations, 1);
        // subject, object, group member, segment member, segment relation index
        assert_eq!(report.pruned_references, 5);
    }

    #[test]
    fn test_malformed_segment_dropped_not_fatal() {
        let mut value = base(json!([entity("e1", "llama.cpp", 24, 33)]), json!([]));
        value["segments"] = json!([
            {"id": "seg_1", "start": 0, "end": 47, "sentiment": "neutral", "summary": "s",
             "entityIds": ["e1"], "factIds": []},
            {"id": "seg_2", "start": 40, "end": 900, "sentiment": "neutral", "summary": "s",
             "entityIds": [], "factIds": []},
            {"id": "seg_3", "start": 0, "end": 10, "sentiment": "ecstatic", "summary": "s",
             "entityIds": [], "factIds": []},
            "not an object"
        ]);

        let (ex, report) = validate(GEMMA, value).unwrap();
        assert_eq!(ex.segments.len(), 1);
        assert_eq!(ex.segments[0].id, "seg_1");
        assert_eq!(report.dropped_segments, 3);
        assert_eq!(ex.entities.len(), 1);
    }

    #[test]
    fn test_owner_is_left_for_resolver() {
        let value = base(
            json!([entity("e2", "Mistral", 0, 7)]),
            json!([{
                "id": "f1", "ownerEntityId": "e2", "perspective": "other",
                "predicate": "runs", "evidenceStart": 0, "evidenceEnd": 6, "confidence": 0.8
            }]),
        );
        let (ex, _) = validate(GEMMA, value).unwrap();
        assert_eq!(ex.facts[0].owner_entity_id, "e2");
    }

    #[test]
    fn test_missing_required_array_is_shape_error() {
        let mut value = base(json!([]), json!([]));
        value.as_object_mut().unwrap().remove("relations");
        match validate(GEMMA, value).unwrap_err() {
            Error::Shape(msg) => assert!(msg.contains("relations")),
            other => panic!("Expected Shape error, got {:?}", other),
        }
    }

    #[test]
    fn test_optional_arrays_default_empty() {
        let (ex, _) = validate(GEMMA, base(json!([]), json!([]))).unwrap();
        assert!(ex.todos.is_empty());
        assert!(ex.segments.is_empty());
    }

    #[test]
    fn test_title_too_long() {
        let mut value = base(json!([]), json!([]));
        value["title"] = json!("A title that is far too long to fit");
        let err = validate(GEMMA, value).unwrap_err();
        assert!(err.to_string().starts_with("Schema error at title"));
    }

    #[test]
    fn test_title_limit_counts_chars() {
        let mut value = base(json!([]), json!([]));
        value["title"] = json!("ėėėėėėėėėėėėėėėėėėėėėėėėė");
        assert!(validate(GEMMA, value).is_ok());
    }

    #[test]
    fn test_fact_evidence_out_of_bounds_reports_path() {
        let value = base(
            json!([]),
            json!([
                {"id": "f0", "ownerEntityId": "self", "perspective": "self", "predicate": "p",
                 "evidenceStart": 0, "evidenceEnd": 5, "confidence": 0.5},
                {"id": "f1", "ownerEntityId": "self", "perspective": "self", "predicate": "p",
                 "evidenceStart": 40, "evidenceEnd": 90, "confidence": 0.5}
            ]),
        );
        let err = validate(GEMMA, value).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Schema error at facts[1].evidenceStart: span [40, 90) outside text of 47 characters"
        );
    }

    #[test]
    fn test_fact_span_must_be_integer() {
        let value = base(
            json!([]),
            json!([{"id": "f1", "ownerEntityId": "self", "perspective": "self", "predicate": "p",
                    "evidenceStart": 1.5, "evidenceEnd": 5, "confidence": 0.5}]),
        );
        let err = validate(GEMMA, value).unwrap_err();
        assert!(err.to_string().contains("facts[0].evidenceStart"));
    }

    #[test]
    fn test_confidence_out_of_range() {
        let value = base(
            json!([{"id": "e1", "name": "llama.cpp", "type": "tool",
                    "nameStart": 24, "nameEnd": 33, "confidence": 1.5}]),
            json!([]),
        );
        let err = validate(GEMMA, value).unwrap_err();
        assert!(err.to_string().contains("entities[0].confidence"));
    }

    #[test]
    fn test_unknown_entity_type() {
        let value = base(
            json!([{"id": "e1", "name": "llama.cpp", "type": "animal",
                    "nameStart": 24, "nameEnd": 33, "confidence": 0.5}]),
            json!([]),
        );
        let err = validate(GEMMA, value).unwrap_err();
        assert!(err.to_string().starts_with("Schema error at entities[0].type"));
    }

    #[test]
    fn test_emotion_intensity_bounds() {
        let mut value = base(json!([]), json!([]));
        value["emotions"] = json!([{"name": "calm", "intensity": 6}]);
        let err = validate(GEMMA, value).unwrap_err();
        assert!(err.to_string().contains("emotions[0].intensity"));
    }

    #[test]
    fn test_object_entity_wins_over_text() {
        let value = base(
            json!([entity("e1", "llama.cpp", 24, 33)]),
            json!([{"id": "f1", "ownerEntityId": "self", "perspective": "self", "predicate": "uses",
                    "objectEntityId": "e1", "objectText": "llama.cpp",
                    "evidenceStart": 0, "evidenceEnd": 33, "confidence": 0.7}]),
        );
        let (ex, _) = validate(GEMMA, value).unwrap();
        assert_eq!(ex.facts[0].object_entity_id.as_deref(), Some("e1"));
        assert_eq!(ex.facts[0].object_text, None);
    }

    #[test]
    fn test_todo_with_bad_span_dropped() {
        let mut value = base(json!([]), json!([]));
        value["todos"] = json!([
            {"id": "t1", "description": "buy RAM", "evidenceStart": 0, "evidenceEnd": 500, "confidence": 0.5},
            {"id": "t2", "description": "try it", "evidenceStart": 0, "evidenceEnd": 6, "confidence": 0.5}
        ]);
        let (ex, report) = validate(GEMMA, value).unwrap();
        assert_eq!(ex.todos.len(), 1);
        assert_eq!(ex.todos[0].id, "t2");
        assert_eq!(report.dropped_todos, 1);
    }

    #[test]
    fn test_text_wrapped_output() {
        let body = base(json!([entity("e1", "llama.cpp", 22, 31)]), json!([]));
        let text = format!("Here you go:\n```json\n{}\n```", body);
        let (ex, report) = validate_extraction(GEMMA, &RawModelOutput::Text(text)).unwrap();
        assert_eq!(ex.entities[0].name_start, 24);
        assert_eq!(report.repaired, 1);
    }

    #[test]
    fn test_legacy_shape_rejected_by_v2() {
        let raw = RawModelOutput::Object(json!({"items": []}));
        assert!(matches!(validate_extraction(GEMMA, &raw), Err(Error::Shape(_))));
    }

    #[test]
    fn test_validation_is_idempotent() {
        let value = base(
            json!([entity("e1", "Gemma 2B Q5", -1, 10), entity("e2", "llama.cpp", 22, 31)]),
            json!([{"id": "f1", "ownerEntityId": "self", "perspective": "self", "predicate": "wants",
                    "objectEntityId": "e1", "evidenceStart": 0, "evidenceEnd": 18, "confidence": 0.9}]),
        );
        let (first, _) = validate(GEMMA, value).unwrap();
        let (second, report) = validate(GEMMA, serde_json::to_value(&first).unwrap()).unwrap();
        assert_eq!(first, second);
        assert_eq!(report, ValidationReport::default());
    }

    #[test]
    fn test_legacy_exact_and_repair() {
        let raw = RawModelOutput::Object(json!({"items": [
            {"label": "tool", "value": "llama.cpp", "start": 24, "end": 33},
            {"value": "Gemma 2B Q5", "start": -1, "end": 10, "confidence": 0.8},
            {"value": "Mistral", "start": 0, "end": 7}
        ]}));
        let (legacy, report) = validate_legacy(GEMMA, &raw).unwrap();
        assert_eq!(legacy.items.len(), 2);
        assert_eq!((legacy.items[0].start, legacy.items[0].end), (24, 33));
        assert_eq!(legacy.items[0].label.as_deref(), Some("tool"));
        assert_eq!((legacy.items[1].start, legacy.items[1].end), (7, 18));
        assert_eq!(legacy.items[1].confidence, Some(0.8));
        assert_eq!(report.repaired, 1);
        assert_eq!(report.dropped_items, 1);
    }

    #[test]
    fn test_legacy_off_by_two_repaired() {
        let raw = RawModelOutput::Object(json!({"items": [
            {"value": "llama.cpp", "start": 22, "end": 31}
        ]}));
        let (legacy, _) = validate_legacy(GEMMA, &raw).unwrap();
        assert_eq!((legacy.items[0].start, legacy.items[0].end), (24, 33));
    }

    #[test]
    fn test_legacy_bad_confidence() {
        let raw = RawModelOutput::Object(json!({"items": [
            {"value": "llama.cpp", "start": 24, "end": 33, "confidence": 3}
        ]}));
        let err = validate_legacy(GEMMA, &raw).unwrap_err();
        assert!(err.to_string().contains("items[0].confidence"));
    }

    #[test]
    fn test_legacy_rejects_v2_payload() {
        let raw = RawModelOutput::Object(base(json!([]), json!([])));
        assert!(matches!(validate_legacy(GEMMA, &raw), Err(Error::Shape(_))));
    }
}
