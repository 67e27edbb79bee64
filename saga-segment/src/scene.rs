//! Scene and chapter boundary detection.
//!
//! Boundaries are found from three heuristic markers: chapter headings
//! (`Chapter …`, `Prologue`, `Epilogue` on their own line), explicit
//! scene-break glyph lines (`* * *`, `#`, `~~~`), and long blank-line runs.
//! Whatever the markers say, the detector enforces its post-condition before
//! returning: boundaries are sorted by start offset, non-overlapping, and
//! renumbered sequentially, so any byte position maps to at most one scene.

use regex::Regex;
use serde::Serialize;

/// A contiguous scene span within a manuscript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneBoundary {
    /// 1-based scene number, sequential in document order.
    pub scene_number: u32,
    /// Chapter the scene belongs to; `None` before the first chapter heading.
    pub chapter_number: Option<u32>,
    /// Byte offset where the scene begins.
    pub start_offset: usize,
    /// Byte offset one past the end of the scene.
    pub end_offset: usize,
}

impl SceneBoundary {
    /// Whether `pos` falls inside this scene.
    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.start_offset && pos < self.end_offset
    }
}

/// Temporal markers suggesting a scene looks backwards in time.
const PAST_MARKERS: &[&str] = &[
    "had been",
    "had once",
    "years ago",
    "ago",
    "remembered",
    "recalled",
    "used to",
    "back then",
    "in those days",
];

/// Temporal markers anchoring a scene in the narrative present.
const PRESENT_MARKERS: &[&str] = &["now", "today", "tonight", "suddenly", "at this moment"];

/// Flashback score for a span of text: past-marker occurrences minus
/// present-marker occurrences. Only the sign carries meaning; the magnitude
/// is reported as-is.
pub fn flashback_score(text: &str) -> i32 {
    let lowered = text.to_lowercase();
    let past: i32 = PAST_MARKERS
        .iter()
        .map(|m| lowered.matches(m).count() as i32)
        .sum();
    let present: i32 = PRESENT_MARKERS
        .iter()
        .map(|m| lowered.matches(m).count() as i32)
        .sum();
    past - present
}

/// A positive score marks the span as a flashback.
pub fn is_flashback(score: i32) -> bool {
    score > 0
}

/// Detects scene and chapter boundaries in manuscript text.
pub struct SceneDetector {
    chapter_re: Regex,
    break_re: Regex,
    gap_re: Regex,
}

impl Default for SceneDetector {
    fn default() -> Self {
        Self {
            chapter_re: Regex::new(r"(?mi)^[ \t]*(chapter\s+\S+|prologue|epilogue)\b[^\n]*$")
                .unwrap(),
            break_re: Regex::new(r"(?m)^[ \t]*(?:(?:\*[ \t]*){3,}|#|~{3,})[ \t]*$").unwrap(),
            gap_re: Regex::new(r"\n{4,}").unwrap(),
        }
    }
}

impl SceneDetector {
    /// Detect scene boundaries in `text`.
    ///
    /// Returns an empty vector for empty or whitespace-only input; otherwise
    /// the boundaries tile the text, are ordered by start offset, and never
    /// overlap.
    pub fn detect(&self, text: &str) -> Vec<SceneBoundary> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        // (position, is_chapter_heading) cut marks. A chapter heading also
        // starts a new scene.
        let mut marks: Vec<(usize, bool)> = Vec::new();
        for m in self.chapter_re.find_iter(text) {
            marks.push((m.start(), true));
        }
        for m in self.break_re.find_iter(text) {
            marks.push((m.start(), false));
        }
        for m in self.gap_re.find_iter(text) {
            marks.push((m.end(), false));
        }

        // Chapter marks win when two marks coincide.
        marks.sort_by_key(|&(pos, is_chapter)| (pos, !is_chapter));
        marks.dedup_by_key(|&mut (pos, _)| pos);

        if marks.first().map(|&(pos, _)| pos) != Some(0) {
            marks.insert(0, (0, false));
        }

        let mut scenes = Vec::new();
        let mut chapter: Option<u32> = None;
        for (i, &(start, is_chapter)) in marks.iter().enumerate() {
            if is_chapter {
                chapter = Some(chapter.map_or(1, |c| c + 1));
            }
            let end = marks.get(i + 1).map_or(text.len(), |&(pos, _)| pos);
            scenes.push(SceneBoundary {
                scene_number: 0,
                chapter_number: chapter,
                start_offset: start,
                end_offset: end,
            });
        }

        normalize_boundaries(scenes)
    }

    /// Flashback score of one detected scene.
    pub fn score_scene(&self, text: &str, scene: &SceneBoundary) -> i32 {
        let end = scene.end_offset.min(text.len());
        if scene.start_offset >= end {
            return 0;
        }
        flashback_score(&text[scene.start_offset..end])
    }
}

/// Enforce the detector post-condition: sorted by start, non-overlapping,
/// no empty spans, scene numbers sequential from 1.
fn normalize_boundaries(mut scenes: Vec<SceneBoundary>) -> Vec<SceneBoundary> {
    scenes.sort_by_key(|s| s.start_offset);

    let mut out: Vec<SceneBoundary> = Vec::new();
    for mut scene in scenes {
        if let Some(prev) = out.last() {
            if scene.start_offset < prev.end_offset {
                scene.start_offset = prev.end_offset;
            }
        }
        if scene.start_offset < scene.end_offset {
            out.push(scene);
        }
    }
    for (i, scene) in out.iter_mut().enumerate() {
        scene.scene_number = (i + 1) as u32;
    }
    out
}
