//! Grounding check with nearest-occurrence repair.
//!
//! A literal value claimed at `[start, end)` is grounded when the source text
//! at that range equals the value exactly. When it does not, every exact
//! occurrence of the value is located and the one whose start is closest to
//! the claimed start wins (first occurrence on ties). A value that occurs
//! nowhere cannot be grounded.

use notegraph_core::SourceText;

/// Outcome of grounding one literal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grounding {
    /// The claimed span already matches.
    Exact { start: usize, end: usize },
    /// The span was moved to the nearest exact occurrence.
    Repaired { start: usize, end: usize },
    /// The value does not occur in the text.
    Missing,
}

impl Grounding {
    /// Final span, if grounded.
    pub fn span(&self) -> Option<(usize, usize)> {
        match *self {
            Self::Exact { start, end } | Self::Repaired { start, end } => Some((start, end)),
            Self::Missing => None,
        }
    }

    pub fn is_repaired(&self) -> bool {
        matches!(self, Self::Repaired { .. })
    }
}

/// Ground `value` against `src`, given the model's claimed (possibly invalid) span.
pub fn ground(src: &SourceText<'_>, value: &str, claimed_start: i64, claimed_end: i64) -> Grounding {
    if value.is_empty() {
        return Grounding::Missing;
    }

    if claimed_start >= 0 && claimed_end >= 0 {
        let (start, end) = (claimed_start as usize, claimed_end as usize);
        if src.slice(start, end) == Some(value) {
            return Grounding::Exact { start, end };
        }
    }

    let len = value.chars().count();
    let nearest = src
        .find_all(value)
        .into_iter()
        // min_by_key keeps the first of equal keys.
        .min_by_key(|&start| (start as i64).abs_diff(claimed_start));

    match nearest {
        Some(start) => Grounding::Repaired {
            start,
            end: start + len,
        },
        None => Grounding::Missing,
    }
}
