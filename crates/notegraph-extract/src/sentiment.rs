//! Keyword sentiment for facts and the unanimity rollup.

use notegraph_core::{Fact, Sentiment, SourceText};

use crate::patterns::SENTIMENT_CUES;

/// Classify one fact from its evidence, predicate, and object text.
pub fn fact_sentiment(src: &SourceText<'_>, fact: &Fact) -> Sentiment {
    let evidence = src
        .slice(fact.evidence_start, fact.evidence_end)
        .unwrap_or("");
    let text = format!(
        "{} {} {}",
        evidence,
        fact.predicate,
        fact.object_text.as_deref().unwrap_or("")
    );
    SENTIMENT_CUES.classify(&text).unwrap_or(Sentiment::Neutral)
}

/// Unanimous value, `Varied` on disagreement, `None` when empty.
pub fn rollup<I>(sentiments: I) -> Option<Sentiment>
where
    I: IntoIterator<Item = Sentiment>,
{
    let mut iter = sentiments.into_iter();
    let first = iter.next()?;
    if iter.all(|s| s == first) {
        Some(first)
    } else {
        Some(Sentiment::Varied)
    }
}
