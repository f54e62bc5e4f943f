//! Lexical heuristics as prioritized pattern tables.
//!
//! Pronoun, narrator, todo, driving, and sentiment cues are data, not control
//! flow: each table is a list of compiled patterns tagged with a value and a
//! priority, consulted in priority order. They are tuned for short first-person
//! notes.

use once_cell::sync::Lazy;
use regex::{Match, Regex};

use notegraph_core::{Perspective, Sentiment};

/// One compiled pattern with the value it stands for.
pub struct PatternEntry<T> {
    pub value: T,
    /// Lower runs first.
    pub priority: u8,
    pub regex: Regex,
}

/// Prioritized list of patterns.
pub struct PatternTable<T> {
    entries: Vec<PatternEntry<T>>,
}

impl<T: Copy> PatternTable<T> {
    /// Build a table; panics on an invalid pattern, which is a programming error
    /// in the static tables below.
    pub fn new(specs: &[(T, u8, &str)]) -> Self {
        let mut entries: Vec<PatternEntry<T>> = specs
            .iter()
            .map(|&(value, priority, pattern)| PatternEntry {
                value,
                priority,
                regex: Regex::new(pattern).unwrap_or_else(|e| {
                    panic!("invalid heuristic pattern {:?}: {}", pattern, e)
                }),
            })
            .collect();
        entries.sort_by_key(|e| e.priority);
        Self { entries }
    }

    /// First match of the highest-priority entry that matches at all.
    pub fn first_match<'t>(&self, text: &'t str) -> Option<(T, Match<'t>)> {
        self.entries
            .iter()
            .find_map(|e| e.regex.find(text).map(|m| (e.value, m)))
    }

    /// Value of the highest-priority matching entry.
    pub fn classify(&self, text: &str) -> Option<T> {
        self.entries
            .iter()
            .find(|e| e.regex.is_match(text))
            .map(|e| e.value)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.entries.iter().any(|e| e.regex.is_match(text))
    }

    pub fn entries(&self) -> &[PatternEntry<T>] {
        &self.entries
    }
}

/// Grammatical number of a first-person pronoun.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PronounNumber {
    Singular,
    Plural,
}

/// Bare first-person pronouns that mark a narrator entity by name.
pub const FIRST_PERSON_NAMES: [&str; 7] = ["i", "me", "my", "mine", "we", "our", "us"];

/// First-person pronoun occurrences; singular preferred over plural.
pub static FIRST_PERSON: Lazy<PatternTable<PronounNumber>> = Lazy::new(|| {
    PatternTable::new(&[
        (PronounNumber::Singular, 0, r"(?i)\b(?:i|me|my|mine)\b"),
        (PronounNumber::Plural, 1, r"(?i)\b(?:we|our|us)\b"),
    ])
});

/// Evidence led by a pronoun, classified by whose voice it is.
pub static EVIDENCE_LEAD: Lazy<PatternTable<Perspective>> = Lazy::new(|| {
    PatternTable::new(&[
        (
            Perspective::SelfView,
            0,
            r"(?i)^\W*(?:i|i'm|i’m|me|my|mine|we|we're|our|us)\b",
        ),
        (
            Perspective::Other,
            1,
            // Pronouns plus the fixed known-name list.
            r"(?i)^\W*(?:he|she|they|it|his|her|their|them|egle|eglė)\b",
        ),
    ])
});

/// Evidence led by a collective first-person pronoun.
pub static COLLECTIVE_LEAD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\W*(?:we|we're|our|us)\b").expect("static pattern"));

/// Any mention of driving.
pub static DRIVING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:drive|drives|driving|drove|driven|driver)\b").expect("static pattern")
});

/// Explicit singular self-driving phrase ("I was driving", "I drove").
pub static SINGULAR_SELF_DRIVING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bi(?:\s+was|\s+am|'m|’m|\s+had\s+been|\s+have\s+been)?\s+(?:driving|drove|drive)\b",
    )
    .expect("static pattern")
});

/// Free-text entity context naming the narrator.
pub static NARRATOR_CONTEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:narrator|notetaker|note-taker|note taker)\b").expect("static pattern")
});

/// Actionable intent up to the next sentence terminator.
pub static TODO_CUE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:todo|to do|need to|needs to|must|should|remember to|don't forget to|don’t forget to|do not forget to)\b[^.!?\n]*",
    )
    .expect("static pattern")
});

/// Fact sentiment cues; negative first, then reflective, then positive.
pub static SENTIMENT_CUES: Lazy<PatternTable<Sentiment>> = Lazy::new(|| {
    PatternTable::new(&[
        (
            Sentiment::Negative,
            0,
            r"(?i)\b(?:scared|scary|fear\w*|unsafe|danger\w*|ice|icy|hazard\w*|worr\w*)\b",
        ),
        (
            Sentiment::Varied,
            1,
            r"(?i)\b(?:remember\w*|memor(?:y|ies)|childhood|reflect\w*)\b",
        ),
        (
            Sentiment::Positive,
            2,
            r"(?i)\b(?:help\w*|support\w*|called|resolved|safe|good)\b",
        ),
    ])
});

/// True when `name` is a bare first-person pronoun.
pub fn is_first_person_name(name: &str) -> bool {
    let name = name.trim().to_lowercase();
    FIRST_PERSON_NAMES.contains(&name.as_str())
}
