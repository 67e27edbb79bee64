//! Relationship discovery from entity co-occurrence inside chunks.
//!
//! Every run recomputes the evidence for each entity pair from the full
//! current chunk set and writes the result as one atomic replace keyed by
//! the pair. That makes discovery idempotent: re-processing the same chunks
//! produces the same strength, with no double-counting on top of a stale
//! value.

use itertools::Itertools;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::error::Result;
use crate::graph::{Entity, EntityKind, Relationship, RelationshipKind};
use crate::store::SqliteStore;

/// Verbs whose presence near a pair suggests direct interaction.
const RELATIONAL_VERBS: &[&str] = &[
    "said", "told", "asked", "met", "kissed", "embraced", "fought", "helped", "followed",
    "loved", "hated", "betrayed", "answered", "whispered", "greeted", "watched",
];

/// Cues that negate an apparent interaction.
const NEGATION_CUES: &[&str] = &[
    "never met", "never saw", "never spoke", "avoided", "refused to see", "had not met",
];

/// Configuration for [`RelationshipDiscoverer`].
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Context snippets retained per relationship.
    pub max_snippets: usize,
    /// Longest snippet kept, in bytes.
    pub max_snippet_len: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            max_snippets: 5,
            max_snippet_len: 240,
        }
    }
}

/// Counters reported by one discovery run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub chunks_scanned: usize,
    pub pairs_found: usize,
    pub relationships_written: usize,
}

/// Evidence accumulated for one entity pair across all chunks.
#[derive(Debug, Default, Clone)]
struct PairEvidence {
    count: u32,
    dialogue_hits: u32,
    verb_hits: u32,
    negation_hits: u32,
    snippets: Vec<String>,
}

/// Strength of a relationship given its full evidence.
///
/// The co-occurrence term saturates (diminishing returns, capped at 1), the
/// quality multiplier rewards dialogue and relational verbs over bare
/// co-mentions, and the kind factor ranks interaction above placement above
/// mention. The result is clamped to `[0, 1]` and is monotonically
/// non-decreasing in `count` for fixed quality.
pub fn compute_strength(count: u32, quality: f32, kind: RelationshipKind) -> f32 {
    let base = 1.0 - (-0.35 * count as f32).exp();
    (base * quality * kind.factor()).clamp(0.0, 1.0)
}

/// Quality multiplier from context evidence, in `[1.0, 1.2]`.
fn context_quality(evidence: &PairEvidence) -> f32 {
    if evidence.count == 0 {
        return 1.0;
    }
    let dialogue_fraction = evidence.dialogue_hits as f32 / evidence.count as f32;
    let verb_fraction = evidence.verb_hits as f32 / evidence.count as f32;
    1.0 + 0.1 * dialogue_fraction + 0.1 * verb_fraction
}

/// Relationship kind for a pair of entity kinds, oriented source → target.
///
/// Character–location pairs point the character at the place (`LOCATED_IN`);
/// character–character pairs interact unless negated in most contexts;
/// everything else is a co-mention. The returned bool is true when the pair
/// order must be swapped to match the orientation.
fn classify(a: &Entity, b: &Entity, mostly_negated: bool) -> (RelationshipKind, bool) {
    match (a.kind, b.kind) {
        (EntityKind::Character, EntityKind::Location) => (RelationshipKind::LocatedIn, false),
        (EntityKind::Location, EntityKind::Character) => (RelationshipKind::LocatedIn, true),
        (EntityKind::Character, EntityKind::Character) => {
            if mostly_negated {
                (RelationshipKind::Mentions, false)
            } else {
                (RelationshipKind::InteractsWith, false)
            }
        }
        _ => (RelationshipKind::Mentions, false),
    }
}

/// Scans chunks for co-occurring entities and maintains the relationship set.
pub struct RelationshipDiscoverer {
    config: DiscoveryConfig,
}

impl RelationshipDiscoverer {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Recompute all relationships for a project from its current chunks.
    pub async fn discover_project(
        &self,
        store: &SqliteStore,
        project_id: &str,
    ) -> Result<DiscoverySummary> {
        let entities = store.project_entities(project_id).await?;
        let mut summary = DiscoverySummary::default();
        if entities.len() < 2 {
            return Ok(summary);
        }

        let chunks = store.project_chunks(&[project_id.to_string()]).await?;
        // (entity index a, entity index b) with a < b by entity id
        let mut pairs: BTreeMap<(usize, usize), PairEvidence> = BTreeMap::new();

        for chunk in &chunks {
            summary.chunks_scanned += 1;
            let lowered = chunk.content.to_lowercase();

            // Which entities are textually present in this chunk, and where.
            let present: Vec<(usize, usize)> = entities
                .iter()
                .enumerate()
                .filter_map(|(i, entity)| entity.find_in(&lowered).map(|pos| (i, pos)))
                .collect();

            for ((i, pos_i), (j, pos_j)) in present.iter().copied().tuple_combinations() {
                let (first, second) = if entities[i].id <= entities[j].id {
                    ((i, pos_i), (j, pos_j))
                } else {
                    ((j, pos_j), (i, pos_i))
                };
                let evidence = pairs.entry((first.0, second.0)).or_default();
                evidence.count += 1;

                // Local substring spanning both mentions.
                let span_start = first.1.min(second.1);
                let span_end = (first.1.max(second.1) + 40).min(chunk.content.len());
                let snippet = clamp_snippet(&chunk.content, span_start, span_end,
                    self.config.max_snippet_len);
                let snippet_lower = snippet.to_lowercase();

                if snippet.contains(['"', '\u{201C}', '\u{201D}']) {
                    evidence.dialogue_hits += 1;
                }
                if RELATIONAL_VERBS.iter().any(|v| snippet_lower.contains(v)) {
                    evidence.verb_hits += 1;
                }
                if NEGATION_CUES.iter().any(|c| snippet_lower.contains(c)) {
                    evidence.negation_hits += 1;
                }
                if evidence.snippets.len() < self.config.max_snippets {
                    evidence.snippets.push(snippet);
                }
            }
        }

        summary.pairs_found = pairs.len();

        for ((i, j), evidence) in pairs {
            let mostly_negated = evidence.negation_hits * 2 > evidence.count;
            let (kind, swap) = classify(&entities[i], &entities[j], mostly_negated);
            let (source, target) = if swap {
                (&entities[j], &entities[i])
            } else {
                (&entities[i], &entities[j])
            };
            let (Some(source_id), Some(target_id)) = (source.id, target.id) else {
                continue;
            };

            let strength = compute_strength(evidence.count, context_quality(&evidence), kind);
            debug!(
                "Relationship {} -> {} ({kind:?}): count={} strength={strength:.3}",
                source.name, target.name, evidence.count
            );

            store
                .replace_relationship(&Relationship {
                    id: None,
                    project_id: project_id.to_string(),
                    source_id,
                    target_id,
                    kind,
                    strength,
                    cooccurrence_count: evidence.count,
                    snippets: evidence.snippets,
                })
                .await?;
            summary.relationships_written += 1;
        }

        info!(
            "Discovery for {project_id}: {} chunks, {} pairs",
            summary.chunks_scanned, summary.pairs_found
        );
        Ok(summary)
    }
}

/// Slice `content[start..end]`, clamped to char boundaries and `max_len`.
fn clamp_snippet(content: &str, start: usize, end: usize, max_len: usize) -> String {
    let mut from = start;
    while from > 0 && !content.is_char_boundary(from) {
        from -= 1;
    }
    let mut to = end.min(from + max_len).min(content.len());
    while to > from && !content.is_char_boundary(to) {
        to -= 1;
    }
    content[from..to].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Mention;
    use crate::store::ChunkRecord;

    fn entity(project: &str, kind: EntityKind, name: &str) -> Entity {
        Entity {
            id: None,
            project_id: project.into(),
            kind,
            name: name.into(),
            aliases: vec![],
            confidence: 0.8,
            mention_count: 2,
            first_mention: Some(Mention {
                file_id: "f1".into(),
                offset: 0,
                snippet: String::new(),
                confidence: 0.8,
            }),
            last_mention: None,
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

    async fn seeded_store(chunks: &[ChunkRecord], entities: &[Entity]) -> SqliteStore {
        let store = SqliteStore::open_memory().await.unwrap();
        store.replace_file_chunks("f1", chunks).await.unwrap();
        for e in entities {
            store.upsert_entity(e).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn characters_in_one_chunk_interact() {
        let chunks = vec![chunk(0, "Alice and Bob walked to the river.")];
        let entities = vec![
            entity("p1", EntityKind::Character, "Alice"),
            entity("p1", EntityKind::Character, "Bob"),
        ];
        let store = seeded_store(&chunks, &entities).await;

        let discoverer = RelationshipDiscoverer::new(DiscoveryConfig::default());
        let summary = discoverer.discover_project(&store, "p1").await.unwrap();
        assert_eq!(summary.pairs_found, 1);

        let relationships = store.project_relationships("p1").await.unwrap();
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].kind, RelationshipKind::InteractsWith);
        assert_eq!(relationships[0].cooccurrence_count, 1);
        assert!(relationships[0].strength > 0.0 && relationships[0].strength <= 1.0);
    }

    #[tokio::test]
    async fn character_location_pairs_point_at_the_place() {
        let chunks = vec![chunk(0, "Alice rode into Harrowgate at dusk.")];
        let entities = vec![
            entity("p1", EntityKind::Location, "Harrowgate"),
            entity("p1", EntityKind::Character, "Alice"),
        ];
        let store = seeded_store(&chunks, &entities).await;

        RelationshipDiscoverer::new(DiscoveryConfig::default())
            .discover_project(&store, "p1")
            .await
            .unwrap();

        let relationships = store.project_relationships("p1").await.unwrap();
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].kind, RelationshipKind::LocatedIn);

        let source = store.get_entity(relationships[0].source_id).await.unwrap().unwrap();
        let target = store.get_entity(relationships[0].target_id).await.unwrap().unwrap();
        assert_eq!(source.kind, EntityKind::Character);
        assert_eq!(target.kind, EntityKind::Location);
    }

    #[tokio::test]
    async fn rerunning_discovery_is_idempotent() {
        let chunks = vec![
            chunk(0, "Alice met Bob at the gate."),
            chunk(1, "Bob thanked Alice warmly."),
        ];
        let entities = vec![
            entity("p1", EntityKind::Character, "Alice"),
            entity("p1", EntityKind::Character, "Bob"),
        ];
        let store = seeded_store(&chunks, &entities).await;
        let discoverer = RelationshipDiscoverer::new(DiscoveryConfig::default());

        discoverer.discover_project(&store, "p1").await.unwrap();
        let first = store.project_relationships("p1").await.unwrap();

        discoverer.discover_project(&store, "p1").await.unwrap();
        let second = store.project_relationships("p1").await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].cooccurrence_count, second[0].cooccurrence_count);
        assert_eq!(first[0].strength, second[0].strength);
    }

    #[tokio::test]
    async fn alias_matches_count_as_presence() {
        let mut alice = entity("p1", EntityKind::Character, "Alice");
        alice.aliases = vec!["Ally".into()];
        let chunks = vec![chunk(0, "Ally waved at Bob across the square.")];
        let entities = vec![alice, entity("p1", EntityKind::Character, "Bob")];
        let store = seeded_store(&chunks, &entities).await;

        let summary = RelationshipDiscoverer::new(DiscoveryConfig::default())
            .discover_project(&store, "p1")
            .await
            .unwrap();
        assert_eq!(summary.pairs_found, 1);
    }

    #[tokio::test]
    async fn snippet_list_is_bounded() {
        let chunks: Vec<ChunkRecord> = (0..10)
            .map(|i| chunk(i, "Alice met Bob once more."))
            .collect();
        let entities = vec![
            entity("p1", EntityKind::Character, "Alice"),
            entity("p1", EntityKind::Character, "Bob"),
        ];
        let store = seeded_store(&chunks, &entities).await;

        RelationshipDiscoverer::new(DiscoveryConfig::default())
            .discover_project(&store, "p1")
            .await
            .unwrap();

        let relationships = store.project_relationships("p1").await.unwrap();
        assert_eq!(relationships[0].cooccurrence_count, 10);
        assert!(relationships[0].snippets.len() <= 5);
    }

    #[test]
    fn strength_is_monotone_in_count() {
        let mut previous = 0.0;
        for count in 1..=40 {
            let strength = compute_strength(count, 1.1, RelationshipKind::InteractsWith);
            assert!(strength >= previous, "strength dropped at count {count}");
            assert!((0.0..=1.0).contains(&strength));
            previous = strength;
        }
    }

    #[test]
    fn strength_ranks_kinds() {
        let interact = compute_strength(5, 1.0, RelationshipKind::InteractsWith);
        let located = compute_strength(5, 1.0, RelationshipKind::LocatedIn);
        let mentions = compute_strength(5, 1.0, RelationshipKind::Mentions);
        assert!(interact > located);
        assert!(located > mentions);
    }

    #[test]
    fn quality_rewards_dialogue_and_verbs() {
        let bare = PairEvidence {
            count: 4,
            ..Default::default()
        };
        let rich = PairEvidence {
            count: 4,
            dialogue_hits: 4,
            verb_hits: 4,
            ..Default::default()
        };
        assert!(context_quality(&rich) > context_quality(&bare));
        assert!(context_quality(&rich) <= 1.2);
    }
}
