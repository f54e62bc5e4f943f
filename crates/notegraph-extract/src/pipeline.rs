//! Validate → resolve → enrich → segment.

use tracing::{debug, instrument};

use notegraph_core::{Extraction, RawModelOutput, Result, SegmentationTraceEntry};

use crate::ownership::{resolve_ownership, OwnershipReport};
use crate::segmentation::segment;
use crate::todos::enrich_todos;
use crate::validation::{validate_extraction, ValidationReport};

/// Everything the pipeline produced for one model answer.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Final, segmented extraction.
    pub extraction: Extraction,
    /// Resolved and enriched, before segments were computed.
    pub validated_before_segmentation: Extraction,
    pub segmentation_trace: Vec<SegmentationTraceEntry>,
    pub validation: ValidationReport,
    pub ownership: OwnershipReport,
    /// Todo facts added by the enricher.
    pub todos_added: usize,
}

/// Run the full synchronous pipeline over one raw model answer.
#[instrument(skip(text, raw), fields(op = "pipeline", text_len = text.len()))]
pub fn run_pipeline(text: &str, raw: &RawModelOutput) -> Result<PipelineOutput> {
    let (validated, validation) = validate_extraction(text, raw)?;
    let (mut resolved, ownership) = resolve_ownership(text, validated);
    let todos_added = enrich_todos(text, &mut resolved);

    let validated_before_segmentation = resolved.clone();
    let segmentation_trace = segment(text, &mut resolved);

    debug!(
        facts = resolved.facts.len(),
        entities = resolved.entities.len(),
        segment_count = resolved.segments.len(),
        repaired = validation.repaired,
        dropped = validation.dropped_total() + ownership.dropped_facts,
        "Pipeline complete"
    );

    Ok(PipelineOutput {
        extraction: resolved,
        validated_before_segmentation,
        segmentation_trace,
        validation,
        ownership,
        todos_added,
    })
}
