//! Entity extraction: NER candidates → validation → alias folding →
//! threshold materialization.
//!
//! The extractor never recomputes an entity from scratch. Each run gathers
//! new mentions, then [`fold_mentions`] folds them into whatever the store
//! already holds: mention counts only grow, and aggregate confidence never
//! drops below prior evidence. A candidate seen fewer times than the
//! configured minimum is dropped rather than materialized, which keeps
//! one-off NER false positives out of the graph.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::ner::NerModel;
use crate::graph::validators::{validate_character_name, validate_location_name};
use crate::graph::{Entity, EntityId, EntityKind, Mention};
use crate::store::{ChunkId, ChunkRecord, SqliteStore};

/// Recurring narrative motifs scanned for THEME entities.
const THEME_KEYWORDS: &[&str] = &[
    "betrayal", "revenge", "love", "redemption", "honor", "grief", "hope", "fear", "power",
    "freedom", "loyalty", "sacrifice", "destiny", "justice", "memory", "war", "exile", "homecoming",
];

/// Bytes of context captured on each side of a mention.
const SNIPPET_WINDOW: usize = 60;

/// Counters reported by one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub entities_created: usize,
    pub entities_updated: usize,
    pub mentions_recorded: usize,
    /// Chunks whose NER call failed; the rest of the file still extracted.
    pub chunks_failed: usize,
}

/// New evidence for one candidate entity, gathered across a file's chunks.
#[derive(Debug, Clone)]
pub struct CandidateEvidence {
    pub project_id: String,
    pub kind: EntityKind,
    /// Canonical name (alias-resolved, display case preserved).
    pub name: String,
    /// Observed surface forms other than the canonical name.
    pub aliases: Vec<String>,
    /// New mentions, ordered by file position.
    pub mentions: Vec<Mention>,
}

/// Pure reducer folding a batch of new evidence into an existing aggregate.
///
/// Mention count is summed; aggregate confidence blends the prior aggregate
/// with the batch mean, scaled by a count saturation, and is floored at the
/// prior value so fresh low-confidence mentions cannot erase established
/// evidence. First mention is kept from the prior aggregate when present;
/// last mention is advanced to the newest evidence.
pub fn fold_mentions(existing: Option<&Entity>, candidate: &CandidateEvidence) -> Entity {
    let prior_count = existing.map_or(0, |e| e.mention_count);
    let prior_confidence = existing.map_or(0.0, |e| e.confidence);

    let batch_len = candidate.mentions.len() as u32;
    let count = prior_count + batch_len;

    let batch_mean = if candidate.mentions.is_empty() {
        0.0
    } else {
        candidate.mentions.iter().map(|m| m.confidence).sum::<f32>() / batch_len as f32
    };
    let blended_mean = if count == 0 {
        0.0
    } else {
        (prior_confidence * prior_count as f32 + batch_mean * batch_len as f32) / count as f32
    };
    let saturation = 1.0 - 0.5f32.powi(count.min(16) as i32);
    let confidence = (blended_mean * saturation)
        .max(prior_confidence)
        .clamp(0.0, 1.0);

    let first_mention = existing
        .and_then(|e| e.first_mention.clone())
        .or_else(|| candidate.mentions.first().cloned());
    let last_mention = candidate
        .mentions
        .last()
        .cloned()
        .or_else(|| existing.and_then(|e| e.last_mention.clone()));

    let mut aliases: Vec<String> = existing.map(|e| e.aliases.clone()).unwrap_or_default();
    for alias in &candidate.aliases {
        let duplicate = alias.eq_ignore_ascii_case(&candidate.name)
            || aliases.iter().any(|a| a.eq_ignore_ascii_case(alias));
        if !duplicate {
            aliases.push(alias.clone());
        }
    }

    Entity {
        id: existing.and_then(|e| e.id),
        project_id: candidate.project_id.clone(),
        kind: candidate.kind,
        name: candidate.name.clone(),
        aliases,
        confidence,
        mention_count: count,
        first_mention,
        last_mention,
    }
}

/// Runs the NER model over chunks and folds validated mentions into the
/// project's entity set.
pub struct EntityExtractor {
    ner: Arc<dyn NerModel>,
    min_mentions: u32,
    aliases: HashMap<String, String>,
}

impl EntityExtractor {
    pub fn new(ner: Arc<dyn NerModel>, config: &EngineConfig) -> Self {
        Self {
            ner,
            min_mentions: config.min_entity_mentions.max(1),
            aliases: config
                .aliases
                .iter()
                .map(|(surface, canonical)| (surface.to_lowercase(), canonical.clone()))
                .collect(),
        }
    }

    /// Extract entities from a file's chunks and persist the updated
    /// aggregates. A failing chunk is logged and counted, never fatal.
    pub async fn extract_file(
        &self,
        store: &SqliteStore,
        chunks: &[ChunkRecord],
    ) -> Result<ExtractionSummary> {
        let mut summary = ExtractionSummary::default();
        // (kind, lowercase canonical name) -> accumulated evidence
        let mut candidates: BTreeMap<(EntityKind, String), Accumulator> = BTreeMap::new();

        for chunk in chunks {
            let spans = match self.ner.extract_entities(&chunk.content).await {
                Ok(spans) => spans,
                Err(e) => {
                    warn!(
                        "NER failed for chunk {} of {}: {e}",
                        chunk.chunk_index, chunk.file_id
                    );
                    summary.chunks_failed += 1;
                    continue;
                }
            };

            for span in spans {
                let cleaned = strip_possessive(span.text.trim());
                let Some(kind) = kind_for_label(&span.label) else {
                    continue;
                };
                let valid = match kind {
                    EntityKind::Character => validate_character_name(cleaned),
                    EntityKind::Location => validate_location_name(cleaned),
                    EntityKind::Theme => true,
                };
                if !valid {
                    continue;
                }

                let confidence = if cleaned.split_whitespace().count() > 1 {
                    0.85
                } else {
                    0.65
                };
                self.accumulate(
                    &mut candidates,
                    chunk,
                    kind,
                    cleaned,
                    span.start,
                    cleaned.len(),
                    confidence,
                );
            }

            // Theme mentions come from a keyword scan, not the NER model.
            let lowered = chunk.content.to_lowercase();
            for keyword in THEME_KEYWORDS {
                for (pos, _) in lowered.match_indices(keyword) {
                    self.accumulate(
                        &mut candidates,
                        chunk,
                        EntityKind::Theme,
                        &capitalize(keyword),
                        pos,
                        keyword.len(),
                        0.5,
                    );
                }
            }
        }

        // Materialize or fold each candidate.
        let mut chunk_entities: BTreeMap<ChunkId, BTreeSet<EntityId>> = BTreeMap::new();
        for ((kind, _), accumulator) in candidates {
            let evidence = accumulator.evidence;
            let existing = store
                .find_entity(&evidence.project_id, kind, &evidence.name)
                .await?;

            let total = existing.as_ref().map_or(0, |e| e.mention_count)
                + evidence.mentions.len() as u32;
            if existing.is_none() && total < self.min_mentions {
                debug!(
                    "Dropping candidate {:?} {:?}: {total} mention(s) below threshold",
                    kind, evidence.name
                );
                continue;
            }

            let was_new = existing.is_none();
            let folded = fold_mentions(existing.as_ref(), &evidence);
            let id = store.upsert_entity(&folded).await?;

            summary.mentions_recorded += evidence.mentions.len();
            if was_new {
                summary.entities_created += 1;
            } else {
                summary.entities_updated += 1;
            }

            for chunk_id in accumulator.chunk_rows {
                chunk_entities.entry(chunk_id).or_default().insert(id);
            }
        }

        for (chunk_id, ids) in chunk_entities {
            let ids: Vec<EntityId> = ids.into_iter().collect();
            store.set_chunk_entities(chunk_id, &ids).await?;
        }

        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    fn accumulate(
        &self,
        candidates: &mut BTreeMap<(EntityKind, String), Accumulator>,
        chunk: &ChunkRecord,
        kind: EntityKind,
        surface: &str,
        start_in_chunk: usize,
        len: usize,
        confidence: f32,
    ) {
        let canonical = self
            .aliases
            .get(&surface.to_lowercase())
            .cloned()
            .unwrap_or_else(|| surface.to_string());
        let key = (kind, canonical.to_lowercase());

        let accumulator = candidates.entry(key).or_insert_with(|| Accumulator {
            evidence: CandidateEvidence {
                project_id: chunk.project_id.clone(),
                kind,
                name: canonical.clone(),
                aliases: Vec::new(),
                mentions: Vec::new(),
            },
            chunk_rows: BTreeSet::new(),
        });

        if !surface.eq_ignore_ascii_case(&canonical)
            && !accumulator
                .evidence
                .aliases
                .iter()
                .any(|a| a.eq_ignore_ascii_case(surface))
        {
            accumulator.evidence.aliases.push(surface.to_string());
        }

        accumulator.evidence.mentions.push(Mention {
            file_id: chunk.file_id.clone(),
            offset: chunk.start_offset + start_in_chunk,
            snippet: snippet(&chunk.content, start_in_chunk, start_in_chunk + len),
            confidence,
        });
        if let Some(id) = chunk.id {
            accumulator.chunk_rows.insert(id);
        }
    }
}

struct Accumulator {
    evidence: CandidateEvidence,
    chunk_rows: BTreeSet<ChunkId>,
}

fn kind_for_label(label: &str) -> Option<EntityKind> {
    match label.to_uppercase().as_str() {
        "PERSON" | "PER" | "CHARACTER" => Some(EntityKind::Character),
        "LOCATION" | "LOC" | "GPE" | "FAC" | "PLACE" => Some(EntityKind::Location),
        "THEME" => Some(EntityKind::Theme),
        _ => None,
    }
}

fn strip_possessive(span: &str) -> &str {
    span.strip_suffix("'s")
        .or_else(|| span.strip_suffix("\u{2019}s"))
        .unwrap_or(span)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Context window around `start..end`, clamped to char boundaries.
fn snippet(content: &str, start: usize, end: usize) -> String {
    let mut from = start.saturating_sub(SNIPPET_WINDOW);
    while from > 0 && !content.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = (end + SNIPPET_WINDOW).min(content.len());
    while to < content.len() && !content.is_char_boundary(to) {
        to += 1;
    }
    content[from..to].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexError;
    use crate::graph::ner::RawSpan;
    use async_trait::async_trait;

    /// Mock NER that reports every occurrence of the configured names.
    struct KeywordNer {
        names: Vec<(&'static str, &'static str)>,
    }

    #[async_trait]
    impl NerModel for KeywordNer {
        async fn extract_entities(&self, text: &str) -> Result<Vec<RawSpan>> {
            let mut spans = Vec::new();
            for (name, label) in &self.names {
                for (pos, _) in text.match_indices(name) {
                    // Whole-word occurrences only.
                    let before_ok = pos == 0
                        || !text[..pos].chars().next_back().is_some_and(|c| c.is_alphabetic());
                    let after_ok = !text[pos + name.len()..]
                        .chars()
                        .next()
                        .is_some_and(|c| c.is_alphabetic());
                    if before_ok && after_ok {
                        spans.push(RawSpan {
                            label: label.to_string(),
                            text: name.to_string(),
                            start: pos,
                        });
                    }
                }
            }
            Ok(spans)
        }
    }

    /// NER that always fails, to exercise partial-failure handling.
    struct FailingNer;

    #[async_trait]
    impl NerModel for FailingNer {
        async fn extract_entities(&self, _text: &str) -> Result<Vec<RawSpan>> {
            Err(IndexError::unavailable(std::io::Error::other("model down")))
        }
    }

    fn chunk(index: usize, content: &str) -> ChunkRecord {
        ChunkRecord {
            id: Some(index as i64 + 1),
            file_id: "f1".into(),
            project_id: "p1".into(),
            chunk_index: index,
            start_offset: index * 1000,
            end_offset: index * 1000 + content.len(),
            word_count: content.split_whitespace().count(),
            content: content.into(),
            entity_ids: Vec::new(),
            embedding: None,
        }
    }

    fn extractor(names: Vec<(&'static str, &'static str)>, config: EngineConfig) -> EntityExtractor {
        EntityExtractor::new(Arc::new(KeywordNer { names }), &config)
    }

    async fn store_with_chunks(chunks: &[ChunkRecord]) -> SqliteStore {
        let store = SqliteStore::open_memory().await.unwrap();
        store.replace_file_chunks("f1", chunks).await.unwrap();
        store
    }

    #[tokio::test]
    async fn configured_aliases_fold_into_one_entity() {
        let config = EngineConfig::default().with_alias("Johnny", "John");
        let extractor = extractor(vec![("John", "PERSON"), ("Johnny", "PERSON")], config);

        let chunks = vec![chunk(0, "John rode east. Later, Johnny returned home.")];
        let store = SqliteStore::open_memory().await.unwrap();
        let ids = store.replace_file_chunks("f1", &chunks).await.unwrap();
        let mut chunks = chunks;
        chunks[0].id = Some(ids[0]);

        let summary = extractor.extract_file(&store, &chunks).await.unwrap();
        assert_eq!(summary.entities_created, 1);

        let entities = store.project_entities("p1").await.unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "John");
        assert_eq!(entities[0].mention_count, 2);
        assert!(entities[0].aliases.iter().any(|a| a == "Johnny"));
    }

    #[tokio::test]
    async fn single_mentions_are_not_materialized() {
        let config = EngineConfig::default().with_min_entity_mentions(2);
        let extractor = extractor(vec![("Evelyn", "PERSON")], config);

        let chunks = vec![chunk(0, "Evelyn appeared exactly once.")];
        let store = store_with_chunks(&chunks).await;

        let summary = extractor.extract_file(&store, &chunks).await.unwrap();
        assert_eq!(summary.entities_created, 0);
        assert!(store.project_entities("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_runs_fold_instead_of_duplicating() {
        let config = EngineConfig::default();
        let extractor = extractor(vec![("Alice", "PERSON")], config);

        let chunks = vec![chunk(0, "Alice spoke. Alice listened. Alice left.")];
        let store = store_with_chunks(&chunks).await;

        extractor.extract_file(&store, &chunks).await.unwrap();
        let first = store.project_entities("p1").await.unwrap()[0].clone();

        extractor.extract_file(&store, &chunks).await.unwrap();
        let second = store.project_entities("p1").await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].mention_count, first.mention_count + 3);
        assert!(second[0].confidence >= first.confidence);
    }

    #[tokio::test]
    async fn failing_ner_counts_but_does_not_abort() {
        let config = EngineConfig::default();
        let extractor = EntityExtractor::new(Arc::new(FailingNer), &config);

        let chunks = vec![chunk(0, "Alice here."), chunk(1, "Bob there.")];
        let store = store_with_chunks(&chunks).await;

        let summary = extractor.extract_file(&store, &chunks).await.unwrap();
        assert_eq!(summary.chunks_failed, 2);
        assert_eq!(summary.entities_created, 0);
    }

    #[tokio::test]
    async fn theme_keywords_become_theme_entities() {
        let config = EngineConfig::default();
        let extractor = extractor(vec![], config);

        let chunks = vec![chunk(
            0,
            "A story of betrayal and more betrayal, and a little hope.",
        )];
        let store = store_with_chunks(&chunks).await;

        extractor.extract_file(&store, &chunks).await.unwrap();
        let entities = store.project_entities("p1").await.unwrap();
        let betrayal = entities.iter().find(|e| e.name == "Betrayal").unwrap();
        assert_eq!(betrayal.kind, EntityKind::Theme);
        assert_eq!(betrayal.mention_count, 2);
        // "hope" appeared once, below the default threshold of 2.
        assert!(!entities.iter().any(|e| e.name == "Hope"));
    }

    #[tokio::test]
    async fn chunk_entity_ids_are_backfilled() {
        let config = EngineConfig::default();
        let extractor = extractor(vec![("Alice", "PERSON")], config);

        let chunks = vec![chunk(0, "Alice and Alice again."), chunk(1, "Nobody here.")];
        let store = SqliteStore::open_memory().await.unwrap();
        let ids = store.replace_file_chunks("f1", &chunks).await.unwrap();
        let mut chunks = chunks;
        chunks[0].id = Some(ids[0]);
        chunks[1].id = Some(ids[1]);

        extractor.extract_file(&store, &chunks).await.unwrap();

        let first = store.get_chunk(ids[0]).await.unwrap().unwrap();
        let second = store.get_chunk(ids[1]).await.unwrap().unwrap();
        assert_eq!(first.entity_ids.len(), 1);
        assert!(second.entity_ids.is_empty());
    }

    #[test]
    fn fold_confidence_never_decreases() {
        let mention = |confidence: f32| Mention {
            file_id: "f1".into(),
            offset: 0,
            snippet: String::new(),
            confidence,
        };
        let evidence = |mentions: Vec<Mention>| CandidateEvidence {
            project_id: "p1".into(),
            kind: EntityKind::Character,
            name: "Alice".into(),
            aliases: vec![],
            mentions,
        };

        let strong = fold_mentions(None, &evidence(vec![mention(0.9), mention(0.9), mention(0.9)]));
        // Folding weak new evidence must not pull the aggregate down.
        let after_weak = fold_mentions(Some(&strong), &evidence(vec![mention(0.1)]));
        assert!(after_weak.confidence >= strong.confidence);
        assert_eq!(after_weak.mention_count, 4);

        // And more agreeing evidence pushes it up (or holds it).
        let after_strong = fold_mentions(Some(&strong), &evidence(vec![mention(0.9), mention(0.9)]));
        assert!(after_strong.confidence >= strong.confidence);
    }

    #[test]
    fn fold_keeps_first_mention_and_advances_last() {
        let mention = |offset: usize| Mention {
            file_id: "f1".into(),
            offset,
            snippet: format!("at {offset}"),
            confidence: 0.7,
        };
        let evidence = CandidateEvidence {
            project_id: "p1".into(),
            kind: EntityKind::Character,
            name: "Alice".into(),
            aliases: vec![],
            mentions: vec![mention(10), mention(50)],
        };

        let first_run = fold_mentions(None, &evidence);
        assert_eq!(first_run.first_mention.as_ref().unwrap().offset, 10);
        assert_eq!(first_run.last_mention.as_ref().unwrap().offset, 50);

        let later = CandidateEvidence {
            mentions: vec![mention(200)],
            ..evidence
        };
        let second_run = fold_mentions(Some(&first_run), &later);
        assert_eq!(second_run.first_mention.as_ref().unwrap().offset, 10);
        assert_eq!(second_run.last_mention.as_ref().unwrap().offset, 200);
    }
}
