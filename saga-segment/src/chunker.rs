//! Splitting manuscript text into overlapping, offset-exact content windows.
//!
//! Embedding models accept bounded input, so a manuscript has to be cut into
//! windows before anything downstream can run. The [`Chunker`] prefers cutting
//! at paragraph and sentence boundaries over mid-sentence cuts: the text is
//! first split recursively into small segments using an ordered list of
//! delimiter patterns (most significant first), then segments are packed
//! greedily into windows up to the configured target length.
//!
//! Consecutive windows overlap by a configurable fraction of the target
//! length so that context straddling a cut is present in both neighbors. Each
//! window records its byte range in the original text; the non-overlapping
//! "core" ranges tile the input exactly, so concatenating the cores
//! reconstructs the original text.

use regex::Regex;
use serde::Serialize;
use std::ops::Range;

/// Delimiter patterns for prose, ordered from most to least significant.
///
/// - `\n{2,}`: paragraph breaks
/// - sentence-ending punctuation, optionally followed by closing quotes
/// - `\n`: line breaks
/// - ` `: spaces, the most granular fallback
pub const NARRATIVE_DELIMITERS: &[&str] = &[
    r"\n{2,}",
    "[.!?][\"'”’)]*\\s+",
    r"\n",
    r" ",
];

/// Configuration for the [`Chunker`].
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Target window length in bytes. Windows never exceed this.
    pub target_len: usize,
    /// Fraction of `target_len` duplicated from the tail of the previous
    /// window into the head of the next one. Clamped to `[0.0, 0.5]`.
    pub overlap_fraction: f32,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_len: 1200,
            overlap_fraction: 0.15,
        }
    }
}

impl ChunkConfig {
    pub fn with_target_len(mut self, target_len: usize) -> Self {
        self.target_len = target_len.max(1);
        self
    }

    pub fn with_overlap_fraction(mut self, fraction: f32) -> Self {
        self.overlap_fraction = fraction.clamp(0.0, 0.5);
        self
    }
}

/// One content window produced by the [`Chunker`].
///
/// `start..end` is the full window span including the overlap prefix;
/// `core_start..end` is the window's own (non-overlapping) region. For the
/// first window `core_start == start`.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkWindow {
    /// 0-based position of this window in the sequence.
    pub sequence: usize,
    /// Byte offset where the window (including overlap) begins.
    pub start: usize,
    /// Byte offset where the window's non-overlapping core begins.
    pub core_start: usize,
    /// Byte offset one past the end of the window.
    pub end: usize,
    /// The window text, `text[start..end]`.
    pub text: String,
}

impl ChunkWindow {
    /// Number of whitespace-separated words in the window.
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Splits text into overlapping windows aligned to prose boundaries.
pub struct Chunker {
    delimiters: Vec<Regex>,
    target_len: usize,
    overlap_len: usize,
}

impl Chunker {
    /// Create a chunker with the default narrative delimiters.
    ///
    /// # Panics
    /// Panics if the built-in delimiter patterns fail to compile, which would
    /// indicate a bug in this crate rather than a caller error.
    pub fn new(config: ChunkConfig) -> Self {
        let target_len = config.target_len.max(1);
        let overlap_fraction = config.overlap_fraction.clamp(0.0, 0.5);
        Self {
            delimiters: NARRATIVE_DELIMITERS
                .iter()
                .map(|&pattern| Regex::new(pattern).unwrap())
                .collect(),
            target_len,
            overlap_len: (target_len as f32 * overlap_fraction) as usize,
        }
    }

    /// Split `text` into ordered, overlapping windows.
    ///
    /// Empty or whitespace-only input yields an empty vector, not an error.
    /// Window cores tile the input: concatenating `text[core_start..end]`
    /// over all windows reconstructs `text` exactly.
    pub fn chunk(&self, text: &str) -> Vec<ChunkWindow> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let segments = self.split_recursively(text, 0, 0);
        let mut chunks: Vec<ChunkWindow> = Vec::new();
        let mut core_start = 0usize;
        let mut i = 0;

        while i < segments.len() {
            // Pack segments into the core until the next one would overflow.
            let mut end = segments[i].end;
            let mut next = i + 1;
            while next < segments.len() && segments[next].end - core_start <= self.target_len {
                end = segments[next].end;
                next += 1;
            }

            // Extend the window start backwards to the earliest segment
            // boundary within overlap range of the core start.
            let start = if chunks.is_empty() || self.overlap_len == 0 {
                core_start
            } else {
                let floor = core_start.saturating_sub(self.overlap_len);
                segments[..i]
                    .iter()
                    .rev()
                    .take_while(|segment| segment.start >= floor)
                    .last()
                    .map(|segment| segment.start)
                    .unwrap_or(core_start)
            };

            chunks.push(ChunkWindow {
                sequence: chunks.len(),
                start,
                core_start,
                end,
                text: text[start..end].to_string(),
            });

            core_start = end;
            i = next;
        }

        chunks
    }

    // Recursively split `text` into byte ranges no longer than `target_len`,
    // trying each delimiter in order before falling back to a hard split.
    // The returned ranges tile `text` exactly (delimiters included as their
    // own ranges).
    fn split_recursively(
        &self,
        text: &str,
        delimiter_idx: usize,
        offset: usize,
    ) -> Vec<Range<usize>> {
        let mut result: Vec<Range<usize>> = Vec::new();

        if text.is_empty() {
            return result;
        }

        if text.len() <= self.target_len {
            result.push(offset..offset + text.len());
            return result;
        }

        if delimiter_idx >= self.delimiters.len() {
            // No delimiter matched anywhere; split at the target length,
            // stepping back to a char boundary where needed.
            let mut local_start = 0;
            while local_start < text.len() {
                let mut local_end = (local_start + self.target_len).min(text.len());
                while !text.is_char_boundary(local_end) {
                    local_end -= 1;
                }
                result.push(offset + local_start..offset + local_end);
                local_start = local_end;
            }
            return result;
        }

        let delimiter = &self.delimiters[delimiter_idx];
        let mut local_start = 0;

        for mat in delimiter.find_iter(text) {
            if mat.start() > local_start {
                result.extend(self.split_recursively(
                    &text[local_start..mat.start()],
                    delimiter_idx + 1,
                    offset + local_start,
                ));
            }
            result.push(offset + mat.start()..offset + mat.end());
            local_start = mat.end();
        }

        if local_start < text.len() {
            result.extend(self.split_recursively(
                &text[local_start..],
                delimiter_idx + 1,
                offset + local_start,
            ));
        }

        result
    }
}
