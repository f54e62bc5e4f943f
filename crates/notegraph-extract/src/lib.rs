//! # notegraph-extract
//!
//! The synchronous extraction engine: turns untrusted model output into a
//! grounded, ownership-resolved, segmented [`notegraph_core::Extraction`].
//!
//! Nothing here performs I/O or suspends. The pipeline stages are:
//!
//! 1. [`validation`]: JSON scanning, field validation, grounding repair
//! 2. [`ownership`]: canonical narrator and fact ownership
//! 3. [`todos`]: todo phrases the model missed
//! 4. [`segmentation`]: sentence-aligned evidence clusters and sentiment rollup

pub mod fields;
pub mod grounding;
pub mod json_scan;
pub mod ownership;
pub mod patterns;
pub mod pipeline;
pub mod prompt;
pub mod segmentation;
pub mod sentiment;
pub mod todos;
pub mod validation;

pub use grounding::{ground, Grounding};
pub use json_scan::{decode_raw, extract_json_object, find_balanced_object};
pub use ownership::{is_narrator_candidate, resolve_ownership, OwnershipReport};
pub use pipeline::{run_pipeline, PipelineOutput};
pub use prompt::{
    build_recovery_prompt, build_user_prompt, extraction_schema, RECOVERY_DIRECTIVE, SCHEMA_NAME,
    SYSTEM_PROMPT,
};
pub use segmentation::segment;
pub use todos::enrich_todos;
pub use validation::{
    decode_payload, validate_extraction, validate_legacy, ValidationReport, REQUIRED_ARRAYS,
};
