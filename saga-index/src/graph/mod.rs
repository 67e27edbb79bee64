//! Knowledge-graph domain types: entities, mentions, relationships.

pub mod discovery;
pub mod extractor;
pub mod network;
pub mod ner;
pub mod validators;

use serde::{Deserialize, Serialize};

/// Database id of a materialized entity.
pub type EntityId = i64;

/// Kind of a recognized narrative entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EntityKind {
    Character,
    Location,
    Theme,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "CHARACTER",
            Self::Location => "LOCATION",
            Self::Theme => "THEME",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CHARACTER" => Some(Self::Character),
            "LOCATION" => Some(Self::Location),
            "THEME" => Some(Self::Theme),
            _ => None,
        }
    }
}

/// A single occurrence of an entity at a specific file position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Mention {
    pub file_id: String,
    /// Byte offset of the mention in the file text.
    pub offset: usize,
    /// Short context window around the mention.
    pub snippet: String,
    /// Confidence of this single mention, in `[0, 1]`.
    pub confidence: f32,
}

/// A named character, location, or theme recognized within a project.
///
/// Uniqueness key: `(project_id, kind, name)`. `mention_count` and
/// `confidence` only ever grow as new evidence is folded in; see
/// [`extractor::fold_mentions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: Option<EntityId>,
    pub project_id: String,
    pub kind: EntityKind,
    /// Canonical name.
    pub name: String,
    /// Alternate surface forms folded into this entity.
    pub aliases: Vec<String>,
    /// Aggregate confidence in `[0, 1]`, monotonically non-decreasing.
    pub confidence: f32,
    pub mention_count: u32,
    pub first_mention: Option<Mention>,
    pub last_mention: Option<Mention>,
}

impl Entity {
    /// All surface forms of this entity, canonical name first.
    pub fn surface_forms(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str()).chain(self.aliases.iter().map(String::as_str))
    }

    /// Earliest position (byte offset) at which any surface form occurs in
    /// `haystack_lower`, which must already be lowercased.
    pub fn find_in(&self, haystack_lower: &str) -> Option<usize> {
        self.surface_forms()
            .filter_map(|form| haystack_lower.find(&form.to_lowercase()))
            .min()
    }
}

/// Kind of a discovered relationship, ordered by evidential weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    InteractsWith,
    LocatedIn,
    Mentions,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InteractsWith => "INTERACTS_WITH",
            Self::LocatedIn => "LOCATED_IN",
            Self::Mentions => "MENTIONS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INTERACTS_WITH" => Some(Self::InteractsWith),
            "LOCATED_IN" => Some(Self::LocatedIn),
            "MENTIONS" => Some(Self::Mentions),
            _ => None,
        }
    }

    /// Strength factor: direct interaction outweighs placement, which
    /// outweighs a bare co-mention.
    pub fn factor(&self) -> f32 {
        match self {
            Self::InteractsWith => 1.0,
            Self::LocatedIn => 0.85,
            Self::Mentions => 0.6,
        }
    }
}

/// A typed, scored, directed edge between two entities.
///
/// Uniqueness key: `(source_id, target_id)`. Strength is recomputed from the
/// full current evidence set on every discovery run and written as a single
/// replace, never incremented in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: Option<i64>,
    pub project_id: String,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub kind: RelationshipKind,
    /// Strength in `[0, 1]`.
    pub strength: f32,
    pub cooccurrence_count: u32,
    /// Bounded sample of context snippets spanning both mentions.
    pub snippets: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_strings() {
        for kind in [EntityKind::Character, EntityKind::Location, EntityKind::Theme] {
            assert_eq!(EntityKind::parse(kind.as_str()), Some(kind));
        }
        for kind in [
            RelationshipKind::InteractsWith,
            RelationshipKind::LocatedIn,
            RelationshipKind::Mentions,
        ] {
            assert_eq!(RelationshipKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EntityKind::parse("OTHER"), None);
    }

    #[test]
    fn relationship_factors_are_ordered() {
        assert!(RelationshipKind::InteractsWith.factor() > RelationshipKind::LocatedIn.factor());
        assert!(RelationshipKind::LocatedIn.factor() > RelationshipKind::Mentions.factor());
    }

    #[test]
    fn entity_alias_matching_is_case_insensitive() {
        let entity = Entity {
            id: Some(1),
            project_id: "p1".into(),
            kind: EntityKind::Character,
            name: "John".into(),
            aliases: vec!["Johnny".into()],
            confidence: 0.8,
            mention_count: 3,
            first_mention: None,
            last_mention: None,
        };

        assert_eq!(entity.find_in("then johnny arrived"), Some(5));
        assert_eq!(entity.find_in("john spoke first"), Some(0));
        assert_eq!(entity.find_in("nobody was there"), None);
    }
}
