//! Semantic, keyword, and hybrid search over the indexed chunks.
//!
//! Scoring is a linear scan over the candidate chunks with cosine similarity
//! computed in process. Ordering is always `(relevance desc, chunk id asc)`
//! so pagination is reproducible: the tie-break is deterministic and stable
//! across identical queries.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::debug;

use crate::error::{IndexError, Result};
use crate::graph::EntityId;
use crate::retrieval::{
    ContextBundle, ContextConstraints, SearchFilter, SearchHit, SearchMode, SearchResults,
    Suggestion,
};
use crate::store::{ChunkId, ChunkRecord, SqliteStore};
use saga_embed::{EmbeddingEngine, cosine_similarity};

/// Weight of the semantic score in hybrid ranking; the keyword score gets
/// the remainder.
const HYBRID_SEMANTIC_WEIGHT: f32 = 0.7;

/// Executes search, autocomplete, find-similar, and context assembly.
#[derive(Clone)]
pub struct RetrievalEngine {
    store: SqliteStore,
    embed: EmbeddingEngine,
}

impl RetrievalEngine {
    pub fn new(store: SqliteStore, embed: EmbeddingEngine) -> Self {
        Self { store, embed }
    }

    /// Search chunks across `project_ids`.
    ///
    /// Results are ordered by descending relevance with chunk id as the
    /// deterministic tie-break, then paginated by `offset`/`limit`.
    /// `total` counts matches before pagination.
    pub async fn search(
        &self,
        project_ids: &[String],
        query: &str,
        mode: SearchMode,
        filter: &SearchFilter,
        limit: usize,
        offset: usize,
    ) -> Result<SearchResults> {
        if query.trim().is_empty() {
            return Err(IndexError::invalid_input("empty search query"));
        }
        let started = Instant::now();

        let mut chunks = self.store.project_chunks(project_ids).await?;
        if let Some(file_ids) = &filter.file_ids {
            chunks.retain(|c| file_ids.contains(&c.file_id));
        }

        let query_vector = match mode {
            SearchMode::Keyword => None,
            SearchMode::Semantic | SearchMode::Hybrid => {
                Some(self.embed.embed_one(query).await?)
            }
        };
        let query_lower = query.to_lowercase();

        let mut hits: Vec<SearchHit> = Vec::new();
        for chunk in &chunks {
            let similarity = match (&query_vector, &chunk.embedding) {
                (Some(q), Some(e)) => Some(cosine_similarity(q, e)),
                _ => None,
            };
            let keyword_hits = chunk.content.to_lowercase().matches(&query_lower).count();
            let keyword_score = 1.0 - 1.0 / (1.0 + keyword_hits as f32);

            let relevance = match mode {
                SearchMode::Semantic => match similarity {
                    Some(s) => (s + 1.0) / 2.0,
                    None => continue,
                },
                SearchMode::Keyword => {
                    if keyword_hits == 0 {
                        continue;
                    }
                    keyword_score
                }
                SearchMode::Hybrid => {
                    if similarity.is_none() && keyword_hits == 0 {
                        continue;
                    }
                    let semantic = similarity.map_or(0.0, |s| (s + 1.0) / 2.0);
                    HYBRID_SEMANTIC_WEIGHT * semantic
                        + (1.0 - HYBRID_SEMANTIC_WEIGHT) * keyword_score
                }
            };

            hits.push(hit_for(chunk, similarity.unwrap_or(0.0), relevance));
        }

        sort_hits(&mut hits);
        let total = hits.len();
        let hits: Vec<SearchHit> = hits.into_iter().skip(offset).take(limit).collect();

        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!("search {mode:?} {query:?}: {total} matches in {elapsed_ms}ms");
        Ok(SearchResults {
            hits,
            total,
            elapsed_ms,
        })
    }

    /// Entity-name suggestions for a prefix, ranked by mention count.
    pub async fn autocomplete(
        &self,
        project_id: &str,
        prefix: &str,
        limit: usize,
    ) -> Result<Vec<Suggestion>> {
        if prefix.trim().is_empty() {
            return Err(IndexError::invalid_input("empty autocomplete prefix"));
        }
        let needle = prefix.to_lowercase();

        let mut suggestions: Vec<Suggestion> = self
            .store
            .project_entities(project_id)
            .await?
            .into_iter()
            .filter(|entity| {
                entity
                    .surface_forms()
                    .any(|form| form.to_lowercase().contains(&needle))
            })
            .filter_map(|entity| {
                Some(Suggestion {
                    entity_id: entity.id?,
                    name: entity.name,
                    kind: entity.kind,
                    mention_count: entity.mention_count,
                })
            })
            .collect();

        suggestions.sort_by(|a, b| {
            b.mention_count
                .cmp(&a.mention_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        suggestions.truncate(limit);
        Ok(suggestions)
    }

    /// Nearest neighbors of a reference chunk, excluding the reference
    /// itself, above a similarity threshold.
    pub async fn find_similar(
        &self,
        chunk_id: ChunkId,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let reference = self
            .store
            .get_chunk(chunk_id)
            .await?
            .ok_or_else(|| IndexError::invalid_input(format!("unknown chunk id {chunk_id}")))?;
        let reference_embedding = reference.embedding.as_ref().ok_or_else(|| {
            IndexError::invalid_input(format!("chunk {chunk_id} has no embedding"))
        })?;

        let candidates = self
            .store
            .project_chunks(&[reference.project_id.clone()])
            .await?;

        let mut hits: Vec<SearchHit> = candidates
            .iter()
            .filter(|c| c.id != Some(chunk_id))
            .filter_map(|c| {
                let embedding = c.embedding.as_ref()?;
                let similarity = cosine_similarity(reference_embedding, embedding);
                (similarity >= threshold)
                    .then(|| hit_for(c, similarity, (similarity + 1.0) / 2.0))
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(limit);
        Ok(hits)
    }

    /// Assemble ranked chunks plus their mentioned entities for prompt
    /// building (the RAG collaborator's entry point).
    pub async fn assemble_context(
        &self,
        query: &str,
        project_id: &str,
        constraints: &ContextConstraints,
    ) -> Result<ContextBundle> {
        let results = self
            .search(
                &[project_id.to_string()],
                query,
                SearchMode::Hybrid,
                &SearchFilter::default(),
                constraints.max_chunks,
                0,
            )
            .await?;

        let chunks: Vec<SearchHit> = results
            .hits
            .into_iter()
            .filter(|h| h.relevance >= constraints.min_relevance)
            .collect();

        let mut entity_ids: BTreeSet<EntityId> = BTreeSet::new();
        for hit in &chunks {
            if let Some(record) = self.store.get_chunk(hit.chunk_id).await? {
                entity_ids.extend(record.entity_ids);
            }
        }

        let mut entities = Vec::with_capacity(entity_ids.len());
        for id in entity_ids {
            if let Some(entity) = self.store.get_entity(id).await? {
                entities.push(entity);
            }
        }

        Ok(ContextBundle { chunks, entities })
    }
}

fn hit_for(chunk: &ChunkRecord, similarity: f32, relevance: f32) -> SearchHit {
    SearchHit {
        chunk_id: chunk.id.unwrap_or_default(),
        file_id: chunk.file_id.clone(),
        project_id: chunk.project_id.clone(),
        chunk_index: chunk.chunk_index,
        content: chunk.content.clone(),
        similarity,
        relevance: relevance.clamp(0.0, 1.0),
    }
}

/// Descending relevance, ascending chunk id: the deterministic order that
/// makes pagination reproducible.
fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Entity, EntityKind};
    use async_trait::async_trait;
    use half::f16;
    use saga_embed::{EmbedError, TextEncoder};
    use std::sync::Arc;

    /// Deterministic encoder shared by the retrieval tests.
    struct MockEncoder;

    #[async_trait]
    impl TextEncoder for MockEncoder {
        async fn encode(
            &self,
            texts: &[String],
        ) -> std::result::Result<Vec<Vec<f16>>, EmbedError> {
            Ok(texts
                .iter()
                .map(|text| {
                    let mut v: Vec<f32> = (0..8)
                        .map(|i| {
                            text.to_lowercase()
                                .bytes()
                                .enumerate()
                                .map(|(j, b)| ((b as usize * (i + j + 1)) % 89) as f32 / 89.0)
                                .sum()
                        })
                        .collect();
                    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                    if norm > 0.0 {
                        for x in &mut v {
                            *x /= norm;
                        }
                    }
                    v.into_iter().map(f16::from_f32).collect()
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            8
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn chunk(index: usize, content: &str) -> ChunkRecord {
        ChunkRecord {
            id: None,
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

    async fn engine_with_chunks(contents: &[&str]) -> (RetrievalEngine, Vec<ChunkId>) {
        let store = SqliteStore::open_memory().await.unwrap();
        let embed = EmbeddingEngine::new(Arc::new(MockEncoder));

        let chunks: Vec<ChunkRecord> = contents
            .iter()
            .enumerate()
            .map(|(i, c)| chunk(i, c))
            .collect();
        let ids = store.replace_file_chunks("f1", &chunks).await.unwrap();
        for (id, content) in ids.iter().zip(contents) {
            let vector = embed.embed_one(content).await.unwrap();
            store.set_chunk_embedding(*id, &vector).await.unwrap();
        }

        (RetrievalEngine::new(store, embed), ids)
    }

    #[tokio::test]
    async fn semantic_search_returns_scored_results() {
        let (engine, _) = engine_with_chunks(&[
            "Alice waited by the river.",
            "A ledger of grain taxes.",
        ])
        .await;

        let results = engine
            .search(
                &["p1".to_string()],
                "alice",
                SearchMode::Semantic,
                &SearchFilter::default(),
                10,
                0,
            )
            .await
            .unwrap();

        assert!(!results.hits.is_empty());
        assert_eq!(results.total, results.hits.len());
        for hit in &results.hits {
            assert_eq!(hit.file_id, "f1");
            assert!((-1.0..=1.0).contains(&hit.similarity));
            assert!((0.0..=1.0).contains(&hit.relevance));
        }
    }

    #[tokio::test]
    async fn keyword_search_requires_a_match() {
        let (engine, _) = engine_with_chunks(&[
            "Alice waited by the river.",
            "Nothing relevant here.",
        ])
        .await;

        let results = engine
            .search(
                &["p1".to_string()],
                "river",
                SearchMode::Keyword,
                &SearchFilter::default(),
                10,
                0,
            )
            .await
            .unwrap();

        assert_eq!(results.total, 1);
        assert!(results.hits[0].content.contains("river"));
        assert_eq!(results.hits[0].similarity, 0.0);
    }

    #[tokio::test]
    async fn hybrid_boosts_keyword_matches() {
        let store = SqliteStore::open_memory().await.unwrap();
        let embed = EmbeddingEngine::new(Arc::new(MockEncoder));

        let chunks = vec![
            chunk(0, "The harbor lay quiet at dawn."),
            chunk(1, "The harbor master counted harbor fees at the harbor gate."),
        ];
        let ids = store.replace_file_chunks("f1", &chunks).await.unwrap();
        // Identical embeddings: only the keyword component can separate them.
        let vector = embed.embed_one("the waterfront").await.unwrap();
        for id in &ids {
            store.set_chunk_embedding(*id, &vector).await.unwrap();
        }
        let engine = RetrievalEngine::new(store, embed);

        let results = engine
            .search(
                &["p1".to_string()],
                "harbor",
                SearchMode::Hybrid,
                &SearchFilter::default(),
                10,
                0,
            )
            .await
            .unwrap();

        assert_eq!(results.total, 2);
        // The chunk with more keyword occurrences ranks first.
        assert!(results.hits[0].content.contains("master"));
        assert!(results.hits[0].relevance > results.hits[1].relevance);
    }

    #[tokio::test]
    async fn pagination_is_deterministic() {
        let contents: Vec<String> = (0..6).map(|i| format!("Identical filler text {i}")).collect();
        let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
        let (engine, _) = engine_with_chunks(&refs).await;

        let all = engine
            .search(
                &["p1".to_string()],
                "filler",
                SearchMode::Keyword,
                &SearchFilter::default(),
                10,
                0,
            )
            .await
            .unwrap();
        let page1 = engine
            .search(
                &["p1".to_string()],
                "filler",
                SearchMode::Keyword,
                &SearchFilter::default(),
                3,
                0,
            )
            .await
            .unwrap();
        let page2 = engine
            .search(
                &["p1".to_string()],
                "filler",
                SearchMode::Keyword,
                &SearchFilter::default(),
                3,
                3,
            )
            .await
            .unwrap();

        let paged: Vec<ChunkId> = page1
            .hits
            .iter()
            .chain(page2.hits.iter())
            .map(|h| h.chunk_id)
            .collect();
        let full: Vec<ChunkId> = all.hits.iter().map(|h| h.chunk_id).collect();
        assert_eq!(paged, full);
        assert_eq!(all.total, 6);
    }

    #[tokio::test]
    async fn empty_query_is_invalid_input() {
        let (engine, _) = engine_with_chunks(&["anything"]).await;
        assert!(matches!(
            engine
                .search(
                    &["p1".to_string()],
                    "  ",
                    SearchMode::Semantic,
                    &SearchFilter::default(),
                    10,
                    0,
                )
                .await,
            Err(IndexError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn find_similar_excludes_the_reference() {
        let (engine, ids) = engine_with_chunks(&[
            "Alice walked along the river bank.",
            "Alice strolled beside the river.",
            "Tax season opened in the capital.",
        ])
        .await;

        let similar = engine.find_similar(ids[0], 10, -1.0).await.unwrap();
        assert!(!similar.iter().any(|h| h.chunk_id == ids[0]));
        assert_eq!(similar.len(), 2);
        assert!(similar[0].relevance >= similar[1].relevance);
        assert!(similar.iter().all(|h| (-1.0..=1.0).contains(&h.similarity)));

        let missing = engine.find_similar(9999, 10, 0.0).await;
        assert!(matches!(missing, Err(IndexError::InvalidInput { .. })));
    }

    #[tokio::test]
    async fn autocomplete_ranks_by_mention_count() {
        let (engine, _) = engine_with_chunks(&["text"]).await;
        let store = &engine.store;

        for (name, mentions) in [("Alice", 12u32), ("Albert", 3), ("Bob", 9)] {
            store
                .upsert_entity(&Entity {
                    id: None,
                    project_id: "p1".into(),
                    kind: EntityKind::Character,
                    name: name.into(),
                    aliases: vec![],
                    confidence: 0.8,
                    mention_count: mentions,
                    first_mention: None,
                    last_mention: None,
                })
                .await
                .unwrap();
        }

        let suggestions = engine.autocomplete("p1", "al", 10).await.unwrap();
        let names: Vec<&str> = suggestions.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Alice", "Albert"]);
    }

    #[tokio::test]
    async fn assemble_context_collects_mentioned_entities() {
        let (engine, ids) = engine_with_chunks(&["Alice waited by the river."]).await;
        let store = &engine.store;

        let entity_id = store
            .upsert_entity(&Entity {
                id: None,
                project_id: "p1".into(),
                kind: EntityKind::Character,
                name: "Alice".into(),
                aliases: vec![],
                confidence: 0.8,
                mention_count: 2,
                first_mention: None,
                last_mention: None,
            })
            .await
            .unwrap();
        store.set_chunk_entities(ids[0], &[entity_id]).await.unwrap();

        let bundle = engine
            .assemble_context("alice", "p1", &ContextConstraints::default())
            .await
            .unwrap();

        assert!(!bundle.chunks.is_empty());
        assert_eq!(bundle.entities.len(), 1);
        assert_eq!(bundle.entities[0].name, "Alice");
    }
}
