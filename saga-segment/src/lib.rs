//! saga-segment: structural analysis of narrative manuscripts.
//!
//! This crate turns raw manuscript text into position-addressable structure:
//!
//! - [`chunker`]: overlapping, offset-exact content windows sized for
//!   embedding-model input limits
//! - [`position`]: a per-line structural index (paragraph numbers, dialogue
//!   flags, scene/chapter resolution)
//! - [`scene`]: scene and chapter boundary detection from heuristic markers
//!   (headings, break glyphs, blank-line runs)
//!
//! All offsets are byte offsets into the original UTF-8 text, so every
//! produced unit can be mapped back to the exact source span it came from.
//!
//! ```
//! use saga_segment::{Chunker, ChunkConfig, PositionIndexer, SceneDetector};
//!
//! let text = "Alice met Bob.\n\nThey talked.";
//! let scenes = SceneDetector::default().detect(text);
//! let lines = PositionIndexer::index(text, &scenes);
//! let chunks = Chunker::new(ChunkConfig::default()).chunk(text);
//!
//! assert_eq!(lines.len(), 3);
//! assert!(!chunks.is_empty());
//! ```

pub mod chunker;
pub mod position;
pub mod scene;

pub use chunker::{ChunkConfig, ChunkWindow, Chunker, NARRATIVE_DELIMITERS};
pub use position::{LineEntry, PositionIndexer};
pub use scene::{SceneBoundary, SceneDetector, flashback_score, is_flashback};
