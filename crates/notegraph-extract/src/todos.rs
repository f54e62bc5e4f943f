//! Todo enricher: catches actionable phrases the model missed.

use std::collections::HashSet;

use tracing::debug;

use notegraph_core::defaults::{SELF_ENTITY_ID, SYNTHESIZED_CONFIDENCE};
use notegraph_core::{spans_overlap, Extraction, Fact, Perspective, SourceText, Todo};

use crate::patterns::TODO_CUE;

/// Predicate given to synthesized todo facts.
pub const TODO_PREDICATE: &str = "todo";

/// Scan `text` for todo phrasing and add self-owned todo facts (and todo
/// records) for phrases not already represented. Returns the number of facts
/// added. Does nothing when the extraction has no self entity.
pub fn enrich_todos(text: &str, extraction: &mut Extraction) -> usize {
    if !extraction.has_entity(SELF_ENTITY_ID) {
        return 0;
    }

    let src = SourceText::new(text);
    let mut fact_ids: HashSet<String> = extraction.facts.iter().map(|f| f.id.clone()).collect();
    let mut todo_ids: HashSet<String> = extraction.todos.iter().map(|t| t.id.clone()).collect();
    let mut added = 0;

    for m in TODO_CUE.find_iter(text) {
        let raw = m.as_str();
        let phrase = raw.trim();
        if phrase.is_empty() {
            continue;
        }
        let byte_start = m.start() + (raw.len() - raw.trim_start().len());
        let (start, end) = match src.char_span(byte_start, byte_start + phrase.len()) {
            Some(span) => span,
            None => continue,
        };

        if already_covered(&src, extraction, start, end) {
            debug!(phrase = %phrase, "Todo phrase already represented by a fact");
            continue;
        }

        let fact_id = unique_id("fact_todo", &mut fact_ids);
        extraction.facts.push(Fact {
            id: fact_id.clone(),
            owner_entity_id: SELF_ENTITY_ID.to_string(),
            perspective: Perspective::SelfView,
            subject_entity_id: Some(SELF_ENTITY_ID.to_string()),
            predicate: TODO_PREDICATE.to_string(),
            object_entity_id: None,
            object_text: Some(phrase.to_string()),
            evidence_start: start,
            evidence_end: end,
            confidence: SYNTHESIZED_CONFIDENCE,
            segment_id: None,
        });
        added += 1;

        let has_todo = extraction
            .todos
            .iter()
            .any(|t| spans_overlap(t.evidence_start, t.evidence_end, start, end));
        if !has_todo {
            extraction.todos.push(Todo {
                id: unique_id("todo", &mut todo_ids),
                description: phrase.to_string(),
                assignee_entity_id: Some(SELF_ENTITY_ID.to_string()),
                evidence_start: start,
                evidence_end: end,
                confidence: SYNTHESIZED_CONFIDENCE,
            });
        }

        debug!(fact_id = %fact_id, start, end, "Synthesized todo fact");
    }

    added
}

/// An overlapping fact whose own text already reads as a todo.
fn already_covered(src: &SourceText<'_>, extraction: &Extraction, start: usize, end: usize) -> bool {
    extraction.facts.iter().any(|f| {
        if !spans_overlap(f.evidence_start, f.evidence_end, start, end) {
            return false;
        }
        if f.predicate.eq_ignore_ascii_case(TODO_PREDICATE) {
            return true;
        }
        let evidence = src.slice(f.evidence_start, f.evidence_end).unwrap_or("");
        let fact_text = format!(
            "{} {} {}",
            evidence,
            f.predicate,
            f.object_text.as_deref().unwrap_or("")
        );
        TODO_CUE.is_match(&fact_text)
    })
}

fn unique_id(prefix: &str, taken: &mut HashSet<String>) -> String {
    let mut n = 1;
    loop {
        let id = format!("{}_{}", prefix, n);
        if taken.insert(id.clone()) {
            return id;
        }
        n += 1;
    }
}
