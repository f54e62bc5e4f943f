//! Segmentation engine.
//!
//! Evidence spans are sorted and merged in a single pass whenever the gap to
//! the next span is at most [`SEGMENT_GAP_CHARS`]. Each cluster is widened to
//! sentence boundaries, overlapping results are folded together, and facts,
//! entities, and relations are attached to the segment they fall in.

use tracing::debug;

use notegraph_core::defaults::{SEGMENT_GAP_CHARS, SEGMENT_SUMMARY_CHARS};
use notegraph_core::{
    spans_overlap, Entity, Extraction, Segment, SegmentationTraceEntry, Sentiment, SourceText,
};

use crate::sentiment::{fact_sentiment, rollup};

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '\n')
}

#[derive(Debug, Clone, Copy)]
struct Cluster {
    start: usize,
    end: usize,
    span_count: usize,
}

/// Every evidence range in the extraction that lies within the text.
fn evidence_spans(src: &SourceText<'_>, extraction: &Extraction) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    for fact in &extraction.facts {
        spans.push((fact.evidence_start, fact.evidence_end));
    }
    for entity in &extraction.entities {
        spans.push((entity.name_start, entity.name_end));
        if let Some(span) = entity.evidence_span() {
            spans.push(span);
        }
    }
    spans.retain(|&(s, e)| src.is_valid_span(s, e));
    spans
}

/// Single-pass interval merge with a gap tolerance.
fn cluster_spans(mut spans: Vec<(usize, usize)>, gap: usize) -> Vec<Cluster> {
    spans.sort_unstable();
    let mut clusters: Vec<Cluster> = Vec::new();
    for (start, end) in spans {
        match clusters.last_mut() {
            Some(current) if start.saturating_sub(current.end) <= gap => {
                current.end = current.end.max(end);
                current.span_count += 1;
            }
            _ => clusters.push(Cluster {
                start,
                end,
                span_count: 1,
            }),
        }
    }
    clusters
}

/// Widen `[start, end)` to whole sentences, terminator included.
fn clamp_to_sentences(src: &SourceText<'_>, start: usize, end: usize) -> (usize, usize) {
    let len = src.len_chars();
    let at = |i: usize| src.char_at(i).unwrap_or(' ');

    let mut left = start;
    while left > 0 && !is_terminator(at(left - 1)) {
        left -= 1;
    }
    while left < start && at(left).is_whitespace() {
        left += 1;
    }

    let mut right = end;
    if right == 0 || !is_terminator(at(right - 1)) {
        while right < len && !is_terminator(at(right)) {
            right += 1;
        }
        if right < len {
            right += 1;
        }
    }

    (left, right)
}

fn summarize(segment_text: &str) -> String {
    let collapsed = segment_text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SEGMENT_SUMMARY_CHARS).collect()
}

fn entity_overlaps(entity: &Entity, start: usize, end: usize) -> bool {
    spans_overlap(entity.name_start, entity.name_end, start, end)
        || entity
            .evidence_span()
            .map_or(false, |(s, e)| spans_overlap(s, e, start, end))
}

/// Replace `extraction.segments`, stamp fact segment ids, and roll sentiment up
/// to the note. Returns one trace entry per cluster.
pub fn segment(text: &str, extraction: &mut Extraction) -> Vec<SegmentationTraceEntry> {
    let src = SourceText::new(text);
    for fact in &mut extraction.facts {
        fact.segment_id = None;
    }

    let spans = evidence_spans(&src, extraction);
    let mut trace = Vec::new();
    // (start, end) of every emitted segment.
    let mut ranges: Vec<(usize, usize)> = Vec::new();

    if spans.is_empty() {
        if !src.is_empty() {
            ranges.push((0, src.len_chars()));
            trace.push(SegmentationTraceEntry {
                cluster_index: 0,
                span_count: 0,
                raw_start: 0,
                raw_end: src.len_chars(),
                start: 0,
                end: src.len_chars(),
                merged_into: None,
            });
        }
    } else {
        // Which emitted range each cluster landed in.
        let mut owners: Vec<usize> = Vec::new();
        for (index, cluster) in cluster_spans(spans, SEGMENT_GAP_CHARS).into_iter().enumerate() {
            let (start, end) = clamp_to_sentences(&src, cluster.start, cluster.end);
            let mut merged_into = None;
            match ranges.last_mut() {
                Some(last) if start < last.1 => {
                    last.1 = last.1.max(end);
                    let target = ranges.len() - 1;
                    merged_into = owners.iter().position(|&o| o == target);
                    owners.push(target);
                }
                _ => {
                    ranges.push((start, end));
                    owners.push(ranges.len() - 1);
                }
            }
            trace.push(SegmentationTraceEntry {
                cluster_index: index,
                span_count: cluster.span_count,
                raw_start: cluster.start,
                raw_end: cluster.end,
                start,
                end,
                merged_into,
            });
        }
    }

    let mut segments = Vec::with_capacity(ranges.len());
    for (n, &(start, end)) in ranges.iter().enumerate() {
        let id = format!("seg_{}", n + 1);

        let entity_ids: Vec<String> = extraction
            .entities
            .iter()
            .filter(|e| entity_overlaps(e, start, end))
            .map(|e| e.id.clone())
            .collect();

        let mut fact_ids = Vec::new();
        let mut sentiments = Vec::new();
        for fact in &mut extraction.facts {
            if fact.segment_id.is_none()
                && spans_overlap(fact.evidence_start, fact.evidence_end, start, end)
            {
                fact.segment_id = Some(id.clone());
                fact_ids.push(fact.id.clone());
                sentiments.push(fact_sentiment(&src, fact));
            }
        }

        let relation_indexes: Vec<usize> = extraction
            .relations
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                entity_ids.contains(&r.from_entity_id) && entity_ids.contains(&r.to_entity_id)
            })
            .map(|(i, _)| i)
            .collect();

        segments.push(Segment {
            id,
            start,
            end,
            sentiment: rollup(sentiments).unwrap_or(Sentiment::Neutral),
            summary: summarize(src.slice(start, end).unwrap_or("")),
            entity_ids,
            fact_ids,
            relation_indexes,
        });
    }

    let note_sentiment = rollup(
        segments
            .iter()
            .filter(|s| !s.fact_ids.is_empty())
            .map(|s| s.sentiment),
    );
    if let Some(sentiment) = note_sentiment {
        extraction.sentiment = sentiment;
    }

    debug!(
        span_count = trace.iter().map(|t| t.span_count).sum::<usize>(),
        segment_count = segments.len(),
        "Segmented extraction"
    );

    extraction.segments = segments;
    trace
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_core::{EntityType, Fact, Perspective, Relation};

    fn fact(id: &str, start: usize, end: usize) -> Fact {
        Fact {
            id: id.to_string(),
            owner_entity_id: "self".to_string(),
            perspective: Perspective::SelfView,
            subject_entity_id: None,
            predicate: "noted".to_string(),
            object_entity_id: None,
            object_text: None,
            evidence_start: start,
            evidence_end: end,
            confidence: 0.8,
            segment_id: None,
        }
    }

    fn entity(id: &str, start: usize, end: usize) -> Entity {
        Entity {
            id: id.to_string(),
            name: "x".to_string(),
            entity_type: EntityType::Person,
            name_start: start,
            name_end: end,
            evidence_start: None,
            evidence_end: None,
            context: None,
            confidence: 0.9,
        }
    }

    fn extraction(entities: Vec<Entity>, facts: Vec<Fact>) -> Extraction {
        Extraction {
            title: "t".to_string(),
            note_type: "journal".to_string(),
            summary: "s".to_string(),
            language: "en".to_string(),
            date: None,
            sentiment: Sentiment::Positive,
            emotions: vec![],
            entities,
            facts,
            relations: vec![],
            todos: vec![],
            groups: vec![],
            segments: vec![],
        }
    }

    #[test]
    fn test_no_evidence_yields_whole_text_segment() {
        let text = "Nothing much happened today.";
        let mut ex = extraction(vec![], vec![]);
        let trace = segment(text, &mut ex);
        assert_eq!(ex.segments.len(), 1);
        assert_eq!((ex.segments[0].start, ex.segments[0].end), (0, 28));
        assert_eq!(trace.len(), 1);
        // No facts, so the model's sentiment stands.
        assert_eq!(ex.sentiment, Sentiment::Positive);
    }

    #[test]
    fn test_empty_text_yields_no_segments() {
        let mut ex = extraction(vec![], vec![]);
        segment("", &mut ex);
        assert!(ex.segments.is_empty());
    }

    #[test]
    fn test_wide_gap_splits() {
        let text = format!("Egle called.{}Tomas left.", " ".repeat(200));
        let mut ex = extraction(vec![], vec![fact("f1", 0, 12), fact("f2", 212, 223)]);
        segment(&text, &mut ex);
        assert_eq!(ex.segments.len(), 2);
        assert_eq!((ex.segments[0].start, ex.segments[0].end), (0, 12));
        assert_eq!((ex.segments[1].start, ex.segments[1].end), (212, 223));
        assert_eq!(ex.facts[0].segment_id.as_deref(), Some("seg_1"));
        assert_eq!(ex.facts[1].segment_id.as_deref(), Some("seg_2"));
    }

    #[test]
    fn test_narrow_gap_merges() {
        let text = format!("Egle called.{}Tomas left.", " ".repeat(40));
        let mut ex = extraction(vec![], vec![fact("f1", 0, 12), fact("f2", 52, 63)]);
        let trace = segment(&text, &mut ex);
        assert_eq!(ex.segments.len(), 1);
        assert_eq!((ex.segments[0].start, ex.segments[0].end), (0, 63));
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].span_count, 2);
        assert_eq!(ex.segments[0].fact_ids, vec!["f1".to_string(), "f2".to_string()]);
    }

    #[test]
    fn test_gap_threshold_is_inclusive() {
        let spans = vec![(90, 100), (0, 10), (181, 190)];
        let clusters = cluster_spans(spans, SEGMENT_GAP_CHARS);
        assert_eq!(clusters.len(), 2);
        assert_eq!((clusters[0].start, clusters[0].end), (0, 100));
        assert_eq!(clusters[0].span_count, 2);
        assert_eq!((clusters[1].start, clusters[1].end), (181, 190));
    }

    #[test]
    fn test_clamps_to_sentence_boundaries() {
        let text = "First one. The ice was scary today! Last bit";
        let src = SourceText::new(text);
        // "ice" sits in the middle sentence.
        assert_eq!(clamp_to_sentences(&src, 15, 18), (11, 35));
        // Running off the end stops at the text end.
        assert_eq!(clamp_to_sentences(&src, 37, 40), (36, 44));
    }

    #[test]
    fn test_span_ending_on_terminator_does_not_spill() {
        let src = SourceText::new("I called support. Egle was driving.");
        assert_eq!(clamp_to_sentences(&src, 0, 17), (0, 17));
    }

    #[test]
    fn test_overlapping_clamped_clusters_fold_together() {
        // Two clusters far apart inside one long sentence.
        let text = format!("Start {} end.", "x".repeat(150));
        let mut ex = extraction(vec![], vec![fact("f1", 0, 5), fact("f2", 157, 160)]);
        let trace = segment(&text, &mut ex);
        assert_eq!(ex.segments.len(), 1);
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[1].merged_into, Some(0));
        assert_eq!(ex.facts[1].segment_id.as_deref(), Some("seg_1"));
    }

    #[test]
    fn test_entities_and_relations_attached() {
        let text = format!("Egle met Tomas.{}Rita left.", " ".repeat(100));
        let mut ex = extraction(
            vec![entity("e1", 0, 4), entity("e2", 9, 14), entity("e3", 115, 119)],
            vec![],
        );
        ex.relations = vec![
            Relation {
                from_entity_id: "e1".to_string(),
                to_entity_id: "e2".to_string(),
                relation_type: "met".to_string(),
                evidence_start: None,
                evidence_end: None,
                confidence: 0.8,
            },
            Relation {
                from_entity_id: "e1".to_string(),
                to_entity_id: "e3".to_string(),
                relation_type: "knows".to_string(),
                evidence_start: None,
                evidence_end: None,
                confidence: 0.8,
            },
        ];
        segment(&text, &mut ex);
        assert_eq!(ex.segments.len(), 2);
        assert_eq!(ex.segments[0].entity_ids, vec!["e1".to_string(), "e2".to_string()]);
        assert_eq!(ex.segments[0].relation_indexes, vec![0]);
        assert!(ex.segments[1].relation_indexes.is_empty());
    }

    #[test]
    fn test_sentiment_rollup_per_segment_and_note() {
        let text = format!("The ice was scary.{}Support helped.", " ".repeat(100));
        let mut ex = extraction(vec![], vec![fact("f1", 0, 18), fact("f2", 118, 133)]);
        segment(&text, &mut ex);
        assert_eq!(ex.segments[0].sentiment, Sentiment::Negative);
        assert_eq!(ex.segments[1].sentiment, Sentiment::Positive);
        assert_eq!(ex.sentiment, Sentiment::Varied);
    }

    #[test]
    fn test_unanimous_note_sentiment() {
        let text = "The ice was scary. I felt unsafe.";
        let mut ex = extraction(vec![], vec![fact("f1", 0, 18), fact("f2", 19, 33)]);
        segment(text, &mut ex);
        assert_eq!(ex.segments.len(), 1);
        assert_eq!(ex.sentiment, Sentiment::Negative);
    }

    #[test]
    fn test_summary_is_collapsed_and_bounded() {
        let text = format!("Word \t  {}.", "long ".repeat(60));
        let mut ex = extraction(vec![], vec![fact("f1", 0, 4)]);
        segment(&text, &mut ex);
        let summary = &ex.segments[0].summary;
        assert!(summary.starts_with("Word long long"));
        assert_eq!(summary.chars().count(), SEGMENT_SUMMARY_CHARS);
    }

    #[test]
    fn test_resegmentation_is_stable() {
        let text = format!("The ice was scary.{}Support helped.", " ".repeat(100));
        let mut ex = extraction(vec![], vec![fact("f1", 0, 18), fact("f2", 118, 133)]);
        let first_trace = segment(&text, &mut ex);
        let once = ex.clone();
        let second_trace = segment(&text, &mut ex);
        assert_eq!(ex, once);
        assert_eq!(first_trace, second_trace);
    }
}
