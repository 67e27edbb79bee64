//! The named-entity model seam.
//!
//! Production deployments plug a pretrained NER model in behind [`NerModel`];
//! the bundled [`HeuristicNerModel`] is a dependency-free fallback that scans
//! for capitalized spans and labels them from local context. Both feed the
//! same downstream validators, so the extractor does not care which one it is
//! talking to.

use crate::error::Result;
use async_trait::async_trait;

/// A raw candidate span produced by a named-entity model.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSpan {
    /// Model label, e.g. `PERSON` or `LOCATION`.
    pub label: String,
    /// The surface text of the span.
    pub text: String,
    /// Byte offset of the span within the analyzed text.
    pub start: usize,
}

/// Named-entity model interface: `extract_entities(text)` yields labeled
/// candidate spans with byte offsets.
#[async_trait]
pub trait NerModel: Send + Sync {
    async fn extract_entities(&self, text: &str) -> Result<Vec<RawSpan>>;
}

/// Words that may join two capitalized tokens inside one span
/// ("Isle of Mists").
const SPAN_CONNECTIVES: &[&str] = &["of", "the"];

/// Prepositions that suggest the following span names a place.
const PLACE_PREPOSITIONS: &[&str] = &["in", "at", "near", "from", "toward", "towards", "across"];

/// Rule-based fallback NER: capitalized token runs become candidate spans.
///
/// Deliberately over-generates (sentence-initial words included); the
/// type-specific validators and the mention-count threshold downstream are
/// responsible for filtering.
#[derive(Debug, Default, Clone)]
pub struct HeuristicNerModel;

#[async_trait]
impl NerModel for HeuristicNerModel {
    async fn extract_entities(&self, text: &str) -> Result<Vec<RawSpan>> {
        Ok(scan_spans(text))
    }
}

/// Word token with its byte offset.
fn tokens(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0;

    for (i, ch) in text.char_indices() {
        let is_word = ch.is_alphabetic() || ch == '\'' || ch == '\u{2019}' || ch == '-';
        if is_word {
            if start.is_none() {
                start = Some(i);
            }
            end = i + ch.len_utf8();
        } else if let Some(s) = start.take() {
            out.push((s, &text[s..end]));
        }
    }
    if let Some(s) = start {
        out.push((s, &text[s..end]));
    }
    out
}

fn is_capitalized(word: &str) -> bool {
    word.chars().next().is_some_and(|c| c.is_uppercase())
}

fn scan_spans(text: &str) -> Vec<RawSpan> {
    let tokens = tokens(text);
    let mut spans = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let (start, word) = tokens[i];
        if !is_capitalized(word) {
            i += 1;
            continue;
        }

        // Grow the span over consecutive capitalized tokens, allowing a
        // single connective between them.
        let mut end_idx = i;
        let mut j = i + 1;
        while j < tokens.len() {
            let (_, next) = tokens[j];
            if is_capitalized(next) {
                end_idx = j;
                j += 1;
            } else if SPAN_CONNECTIVES.contains(&next.to_lowercase().as_str())
                && j + 1 < tokens.len()
                && is_capitalized(tokens[j + 1].1)
            {
                end_idx = j + 1;
                j += 2;
            } else {
                break;
            }
        }

        let (last_start, last_word) = tokens[end_idx];
        let span_end = last_start + last_word.len();
        let span_text = &text[start..span_end];

        let preceding = i
            .checked_sub(1)
            .map(|p| tokens[p].1.to_lowercase())
            .unwrap_or_default();
        let label = if PLACE_PREPOSITIONS.contains(&preceding.as_str()) {
            "LOCATION"
        } else {
            "PERSON"
        };

        spans.push(RawSpan {
            label: label.to_string(),
            text: span_text.to_string(),
            start,
        });

        i = end_idx + 1;
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_capitalized_names() {
        let model = HeuristicNerModel;
        let spans = model
            .extract_entities("alice was gone, but Bob waited for Alice Morgan.")
            .await
            .unwrap();

        let texts: Vec<&str> = spans.iter().map(|s| s.text.as_str()).collect();
        assert!(texts.contains(&"Bob"));
        assert!(texts.contains(&"Alice Morgan"));
    }

    #[tokio::test]
    async fn offsets_point_at_the_span() {
        let model = HeuristicNerModel;
        let text = "Far away, Bob slept.";
        let spans = model.extract_entities(text).await.unwrap();
        for span in &spans {
            assert_eq!(&text[span.start..span.start + span.text.len()], span.text);
        }
    }

    #[tokio::test]
    async fn prepositions_suggest_locations() {
        let model = HeuristicNerModel;
        let spans = model
            .extract_entities("They rode toward Harrowgate before dawn.")
            .await
            .unwrap();

        let harrowgate = spans.iter().find(|s| s.text == "Harrowgate").unwrap();
        assert_eq!(harrowgate.label, "LOCATION");
    }

    #[tokio::test]
    async fn connectives_join_multiword_places() {
        let model = HeuristicNerModel;
        let spans = model
            .extract_entities("She sailed from the Isle of Mists that night.")
            .await
            .unwrap();

        assert!(spans.iter().any(|s| s.text == "Isle of Mists"));
    }

    #[tokio::test]
    async fn empty_text_yields_no_spans() {
        let model = HeuristicNerModel;
        assert!(model.extract_entities("").await.unwrap().is_empty());
    }
}
