//! Entity network view: bounded-depth traversal over relationship edges.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use crate::error::{IndexError, Result};
use crate::graph::{EntityId, EntityKind, RelationshipKind};
use crate::store::SqliteStore;

/// A node in the network view, annotated with its traversal depth from the
/// root entity.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkNode {
    pub entity_id: EntityId,
    pub name: String,
    pub kind: EntityKind,
    pub depth: u32,
}

/// An edge in the network view.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkEdge {
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub kind: RelationshipKind,
    pub strength: f32,
}

/// The neighborhood of one entity, up to a depth and strength cutoff.
#[derive(Debug, Clone, Serialize)]
pub struct EntityNetwork {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
}

/// Breadth-first traversal from `entity_id` over relationships with
/// `strength >= min_strength`, visiting nodes at most `max_depth` hops out.
pub async fn entity_network(
    store: &SqliteStore,
    entity_id: EntityId,
    max_depth: u32,
    min_strength: f32,
) -> Result<EntityNetwork> {
    let root = store
        .get_entity(entity_id)
        .await?
        .ok_or_else(|| IndexError::invalid_input(format!("unknown entity id {entity_id}")))?;

    let mut depths: HashMap<EntityId, u32> = HashMap::new();
    let mut edges: Vec<NetworkEdge> = Vec::new();
    let mut seen_edges: HashSet<(EntityId, EntityId)> = HashSet::new();
    let mut queue: VecDeque<EntityId> = VecDeque::new();

    depths.insert(entity_id, 0);
    queue.push_back(entity_id);

    while let Some(current) = queue.pop_front() {
        let depth = depths[&current];
        if depth >= max_depth {
            continue;
        }

        for relationship in store.relationships_touching(&[current]).await? {
            if relationship.strength < min_strength {
                continue;
            }
            let (a, b) = (relationship.source_id, relationship.target_id);
            let other = if a == current { b } else { a };

            if seen_edges.insert((a, b)) {
                edges.push(NetworkEdge {
                    source_id: a,
                    target_id: b,
                    kind: relationship.kind,
                    strength: relationship.strength,
                });
            }
            if !depths.contains_key(&other) {
                depths.insert(other, depth + 1);
                queue.push_back(other);
            }
        }
    }

    let mut nodes = Vec::with_capacity(depths.len());
    nodes.push(NetworkNode {
        entity_id,
        name: root.name,
        kind: root.kind,
        depth: 0,
    });
    let mut ordered: Vec<(EntityId, u32)> = depths
        .iter()
        .filter(|(id, _)| **id != entity_id)
        .map(|(id, d)| (*id, *d))
        .collect();
    ordered.sort_by_key(|&(id, d)| (d, id));
    for (id, depth) in ordered {
        if let Some(entity) = store.get_entity(id).await? {
            nodes.push(NetworkNode {
                entity_id: id,
                name: entity.name,
                kind: entity.kind,
                depth,
            });
        }
    }

    Ok(EntityNetwork { nodes, edges })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Entity, Relationship};

    async fn seed() -> (SqliteStore, Vec<EntityId>) {
        let store = SqliteStore::open_memory().await.unwrap();
        let mut ids = Vec::new();
        for name in ["Alice", "Bob", "Carol", "Dunmore"] {
            let kind = if name == "Dunmore" {
                EntityKind::Location
            } else {
                EntityKind::Character
            };
            let id = store
                .upsert_entity(&Entity {
                    id: None,
                    project_id: "p1".into(),
                    kind,
                    name: name.into(),
                    aliases: vec![],
                    confidence: 0.8,
                    mention_count: 3,
                    first_mention: None,
                    last_mention: None,
                })
                .await
                .unwrap();
            ids.push(id);
        }

        // Alice -> Bob -> Carol chain, Bob -> Dunmore, weak Alice -> Carol.
        let edge = |source: EntityId, target: EntityId, kind, strength: f32| Relationship {
            id: None,
            project_id: "p1".into(),
            source_id: source,
            target_id: target,
            kind,
            strength,
            cooccurrence_count: 3,
            snippets: vec![],
        };
        store
            .replace_relationship(&edge(ids[0], ids[1], RelationshipKind::InteractsWith, 0.8))
            .await
            .unwrap();
        store
            .replace_relationship(&edge(ids[1], ids[2], RelationshipKind::InteractsWith, 0.7))
            .await
            .unwrap();
        store
            .replace_relationship(&edge(ids[1], ids[3], RelationshipKind::LocatedIn, 0.6))
            .await
            .unwrap();
        store
            .replace_relationship(&edge(ids[0], ids[2], RelationshipKind::Mentions, 0.1))
            .await
            .unwrap();

        (store, ids)
    }

    #[tokio::test]
    async fn traversal_annotates_depth() {
        let (store, ids) = seed().await;
        let network = entity_network(&store, ids[0], 2, 0.3).await.unwrap();

        let depth_of = |id: EntityId| {
            network
                .nodes
                .iter()
                .find(|n| n.entity_id == id)
                .map(|n| n.depth)
        };
        assert_eq!(depth_of(ids[0]), Some(0));
        assert_eq!(depth_of(ids[1]), Some(1));
        assert_eq!(depth_of(ids[2]), Some(2));
        assert_eq!(depth_of(ids[3]), Some(2));
    }

    #[tokio::test]
    async fn depth_bound_is_respected() {
        let (store, ids) = seed().await;
        let network = entity_network(&store, ids[0], 1, 0.3).await.unwrap();

        let reached: Vec<EntityId> = network.nodes.iter().map(|n| n.entity_id).collect();
        assert!(reached.contains(&ids[0]));
        assert!(reached.contains(&ids[1]));
        assert!(!reached.contains(&ids[2]));
        assert!(!reached.contains(&ids[3]));
    }

    #[tokio::test]
    async fn weak_edges_are_filtered() {
        let (store, ids) = seed().await;
        let network = entity_network(&store, ids[0], 3, 0.3).await.unwrap();

        // The 0.1-strength Alice -> Carol mention edge is below the cutoff.
        assert!(
            !network
                .edges
                .iter()
                .any(|e| e.kind == RelationshipKind::Mentions)
        );
    }

    #[tokio::test]
    async fn unknown_root_is_invalid_input() {
        let store = SqliteStore::open_memory().await.unwrap();
        assert!(matches!(
            entity_network(&store, 999, 2, 0.0).await,
            Err(IndexError::InvalidInput { .. })
        ));
    }
}
