//! Per-line structural index over a manuscript.
//!
//! [`PositionIndexer::index`] walks the text once, tracking the running byte
//! offset and a paragraph counter that advances whenever a run of non-blank
//! lines ends. Each line is resolved against the supplied scene boundaries by
//! binary search, and flagged as dialogue when it contains a straight or
//! curly double quotation mark.

use serde::Serialize;

use crate::scene::SceneBoundary;

/// Structural index entry for one source line.
#[derive(Debug, Clone, Serialize)]
pub struct LineEntry {
    /// 1-based line number.
    pub line_number: u32,
    /// Byte offset of the first character of the line.
    pub start_offset: usize,
    /// Byte offset one past the last character of the line, excluding the
    /// trailing newline.
    pub end_offset: usize,
    /// 1-based paragraph number; advances after each blank-line boundary.
    pub paragraph_number: u32,
    /// Scene containing the line start, if any.
    pub scene_number: Option<u32>,
    /// Chapter of the containing scene, if any.
    pub chapter_number: Option<u32>,
    /// Raw line content without the newline.
    pub content: String,
    /// True when the line is empty or whitespace-only.
    pub is_empty: bool,
    /// True when the line contains a quotation mark (straight or curly).
    pub is_dialogue: bool,
}

/// Builds [`LineEntry`] records for a manuscript.
pub struct PositionIndexer;

impl PositionIndexer {
    /// Index `text` line by line, resolving scenes against `scenes` (which
    /// must be ordered and non-overlapping, as produced by
    /// [`crate::SceneDetector`]).
    pub fn index(text: &str, scenes: &[SceneBoundary]) -> Vec<LineEntry> {
        if text.is_empty() {
            return Vec::new();
        }

        let mut entries = Vec::new();
        let mut offset = 0usize;
        let mut paragraph = 1u32;
        let mut saw_text = false;
        let mut pending_break = false;

        for (idx, line) in text.split('\n').enumerate() {
            let start = offset;
            let end = offset + line.len();
            let is_empty = line.trim().is_empty();

            if !is_empty && pending_break {
                paragraph += 1;
                pending_break = false;
            }
            if is_empty && saw_text {
                pending_break = true;
                saw_text = false;
            }
            if !is_empty {
                saw_text = true;
            }

            let scene = resolve_scene(scenes, start);

            entries.push(LineEntry {
                line_number: (idx + 1) as u32,
                start_offset: start,
                end_offset: end,
                paragraph_number: paragraph,
                scene_number: scene.map(|s| s.scene_number),
                chapter_number: scene.and_then(|s| s.chapter_number),
                content: line.to_string(),
                is_empty,
                is_dialogue: line.contains(['"', '\u{201C}', '\u{201D}']),
            });

            offset = end + 1;
        }

        // A trailing newline produces a phantom empty split after the last
        // real line; it is not a line of the manuscript.
        if text.ends_with('\n') {
            entries.pop();
        }

        entries
    }
}

/// Find the scene containing byte position `pos`, if any.
///
/// `scenes` must be sorted by start offset and non-overlapping.
fn resolve_scene(scenes: &[SceneBoundary], pos: usize) -> Option<&SceneBoundary> {
    let idx = scenes.partition_point(|s| s.start_offset <= pos);
    let candidate = scenes.get(idx.checked_sub(1)?)?;
    (pos < candidate.end_offset).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SceneDetector;

    #[test]
    fn blank_line_ends_paragraph() {
        let text = "Alice met Bob.\n\nThey talked.";
        let entries = PositionIndexer::index(text, &[]);

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].paragraph_number, 1);
        assert_eq!(entries[1].paragraph_number, 1);
        assert_eq!(entries[2].paragraph_number, 2);
        assert!(entries.iter().all(|e| !e.is_dialogue));
        assert!(entries[1].is_empty);
    }

    #[test]
    fn offsets_match_content_length_and_are_contiguous() {
        let text = "First line.\nSecond, longer line here.\n\nFourth line.";
        let entries = PositionIndexer::index(text, &[]);

        for entry in &entries {
            assert_eq!(
                entry.end_offset - entry.start_offset,
                entry.content.len(),
                "line {} span does not match content",
                entry.line_number
            );
        }
        for pair in entries.windows(2) {
            // +1 accounts for the newline separating consecutive lines.
            assert_eq!(pair[1].start_offset, pair[0].end_offset + 1);
        }
    }

    #[test]
    fn dialogue_flags_straight_and_curly_quotes() {
        let text = "\"Hello,\" said Alice.\n\u{201C}Goodbye,\u{201D} said Bob.\nNo quotes here.";
        let entries = PositionIndexer::index(text, &[]);

        assert!(entries[0].is_dialogue);
        assert!(entries[1].is_dialogue);
        assert!(!entries[2].is_dialogue);
    }

    #[test]
    fn trailing_newline_adds_no_phantom_line() {
        let entries = PositionIndexer::index("One line.\n", &[]);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "One line.");
    }

    #[test]
    fn consecutive_blank_lines_advance_paragraph_once() {
        let text = "Para one.\n\n\n\nPara two.";
        let entries = PositionIndexer::index(text, &[]);
        assert_eq!(entries.first().unwrap().paragraph_number, 1);
        assert_eq!(entries.last().unwrap().paragraph_number, 2);
    }

    #[test]
    fn lines_resolve_to_scenes_and_chapters() {
        let text = "Chapter One\n\nAlice walked.\n\n* * *\n\nBob waited.";
        let scenes = SceneDetector::default().detect(text);
        let entries = PositionIndexer::index(text, &scenes);

        let alice = entries.iter().find(|e| e.content.contains("Alice")).unwrap();
        let bob = entries.iter().find(|e| e.content.contains("Bob")).unwrap();
        assert!(alice.scene_number.is_some());
        assert!(bob.scene_number.is_some());
        assert_ne!(alice.scene_number, bob.scene_number);
        assert_eq!(alice.chapter_number, Some(1));
        assert_eq!(bob.chapter_number, Some(1));
    }

    #[test]
    fn empty_text_yields_no_entries() {
        assert!(PositionIndexer::index("", &[]).is_empty());
    }
}
