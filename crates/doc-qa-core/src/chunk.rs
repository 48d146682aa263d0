//! Overlapping text chunker.
//!
//! Splits extracted document text into [`Chunk`]s of at most `chunk_size`
//! characters, where each chunk after the first repeats up to
//! `chunk_overlap` characters from the end of the previous one so that a
//! sentence cut at a boundary still appears whole in at least one chunk.
//!
//! Sizes are counted in `char`s, never bytes, and every slice is taken on a
//! UTF-8 boundary.
//!
//! # Strategies
//!
//! - [`SplitStrategy::Boundary`] (default): the end of each window is pulled
//!   back to the strongest natural boundary found in the second half of
//!   the window, in order of preference:
//!   1. paragraph break (`\n\n`)
//!   2. line break
//!   3. sentence end (`.`, `!`, `?` followed by whitespace)
//!   4. any whitespace
//!
//!   With no boundary available the window is hard-cut at `chunk_size`.
//!   The next window starts `chunk_overlap` characters before the cut,
//!   moved forward to the first word start in that zone. A zone holding no
//!   word start (one long token before the cut) is kept as is.
//! - [`SplitStrategy::Fixed`]: mechanical windowing. Window `i` starts at
//!   exactly `i × (chunk_size − chunk_overlap)` characters into the
//!   trimmed text.
//!
//! # Example
//!
//! ```rust
//! use doc_qa_core::chunk::split_text;
//!
//! let chunks = split_text("Hello world.\n\nSecond paragraph.", 500, 50).unwrap();
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].index, 0);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::Chunk;

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// How window ends are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    #[default]
    Boundary,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Maximum characters per chunk.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks. Must be below `chunk_size`.
    pub chunk_overlap: usize,
    #[serde(default)]
    pub strategy: SplitStrategy,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            strategy: SplitStrategy::Boundary,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfiguration(
                "chunk_size must be > 0".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::InvalidConfiguration(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A validated splitter. Construction is the only fallible step;
/// [`split`](Chunker::split) itself never fails.
#[derive(Debug, Clone)]
pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into chunks with contiguous indices starting at 0.
    ///
    /// Empty or whitespace-only input yields no chunks. Input of at most
    /// `chunk_size` characters yields one chunk holding the trimmed input.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        let doc = CharText::new(text);
        let Some((lo, hi)) = doc.trimmed_bounds() else {
            return Vec::new();
        };

        match self.config.strategy {
            SplitStrategy::Fixed => self.split_fixed(&doc, lo, hi),
            SplitStrategy::Boundary => self.split_boundary(&doc, lo, hi),
        }
    }

    fn split_fixed(&self, doc: &CharText<'_>, lo: usize, hi: usize) -> Vec<Chunk> {
        let size = self.config.chunk_size;
        let step = size - self.config.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = lo;

        loop {
            let end = (start + size).min(hi);
            let piece = doc.slice(start, end);
            // A window made only of whitespace carries nothing to retrieve.
            if !piece.trim().is_empty() {
                chunks.push(make_chunk(chunks.len(), piece, start));
            }
            if end == hi {
                break;
            }
            start += step;
        }

        chunks
    }

    fn split_boundary(&self, doc: &CharText<'_>, lo: usize, hi: usize) -> Vec<Chunk> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = lo;

        loop {
            if hi - start <= size {
                chunks.push(make_chunk(chunks.len(), doc.slice(start, hi), start));
                break;
            }

            let window_end = start + size;
            // Cuts earlier than this would make chunks needlessly short, and
            // the cut must stay past the overlap so the next start advances.
            let min_cut = start + (size / 2).max(overlap + 1);
            let boundary = best_cut(&doc.chars, min_cut, window_end);
            let cut = boundary.unwrap_or(window_end);

            let piece = doc.slice(start, cut).trim_end();
            chunks.push(make_chunk(chunks.len(), piece, start));

            let mut next = cut - overlap;
            if boundary.is_some() {
                // Keep the overlap even when it has to begin mid-word.
                next = (next..cut)
                    .find(|&p| doc.is_word_start(p))
                    .unwrap_or(next);
            }
            while next < hi && doc.chars[next].is_whitespace() {
                next += 1;
            }
            start = next;
        }

        chunks
    }
}

/// Split `text` with boundary-aware windowing.
///
/// Fails with [`Error::InvalidConfiguration`] when `chunk_size == 0` or
/// `chunk_overlap >= chunk_size`.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<Chunk>> {
    let chunker = Chunker::new(ChunkerConfig {
        chunk_size,
        chunk_overlap,
        strategy: SplitStrategy::Boundary,
    })?;
    Ok(chunker.split(text))
}

/// Text indexed by character position, with the byte offset of every char
/// (plus a trailing sentinel) for boundary-safe slicing.
struct CharText<'a> {
    text: &'a str,
    chars: Vec<char>,
    bytes: Vec<usize>,
}

impl<'a> CharText<'a> {
    fn new(text: &'a str) -> Self {
        let mut chars = Vec::with_capacity(text.len());
        let mut bytes = Vec::with_capacity(text.len() + 1);
        for (b, c) in text.char_indices() {
            bytes.push(b);
            chars.push(c);
        }
        bytes.push(text.len());
        Self { text, chars, bytes }
    }

    /// Char range `[lo, hi)` with surrounding whitespace removed, or `None`
    /// when the text has no visible characters.
    fn trimmed_bounds(&self) -> Option<(usize, usize)> {
        let lo = self.chars.iter().position(|c| !c.is_whitespace())?;
        let hi = self.chars.iter().rposition(|c| !c.is_whitespace())? + 1;
        Some((lo, hi))
    }

    fn slice(&self, start: usize, end: usize) -> &'a str {
        &self.text[self.bytes[start]..self.bytes[end]]
    }

    fn is_word_start(&self, p: usize) -> bool {
        p > 0 && self.chars[p - 1].is_whitespace() && !self.chars[p].is_whitespace()
    }
}

const PARAGRAPH: u8 = 3;
const LINE: u8 = 2;
const SENTENCE: u8 = 1;
const WORD: u8 = 0;

/// Strength of the boundary at cut position `p` (between `chars[p - 1]` and
/// `chars[p]`), if there is one. Requires `0 < p < chars.len()`.
fn boundary_rank(chars: &[char], p: usize) -> Option<u8> {
    let prev = chars[p - 1];
    let next = chars[p];
    let before_prev = if p >= 2 { Some(chars[p - 2]) } else { None };
    let after_next = chars.get(p + 1).copied();

    if (prev == '\n' && before_prev == Some('\n')) || (next == '\n' && after_next == Some('\n')) {
        return Some(PARAGRAPH);
    }
    if prev == '\n' || next == '\n' {
        return Some(LINE);
    }
    let terminal = |c: char| matches!(c, '.' | '!' | '?');
    if (terminal(prev) && next.is_whitespace())
        || (prev.is_whitespace() && before_prev.is_some_and(terminal))
    {
        return Some(SENTENCE);
    }
    if prev.is_whitespace() || next.is_whitespace() {
        return Some(WORD);
    }
    None
}

/// Rightmost position in `[min_cut, max_cut]` holding the strongest boundary.
fn best_cut(chars: &[char], min_cut: usize, max_cut: usize) -> Option<usize> {
    let mut best: Option<(u8, usize)> = None;
    for p in (min_cut..=max_cut).rev() {
        let Some(rank) = boundary_rank(chars, p) else {
            continue;
        };
        if best.map_or(true, |(r, _)| rank > r) {
            best = Some((rank, p));
            if rank == PARAGRAPH {
                break;
            }
        }
    }
    best.map(|(_, p)| p)
}

fn make_chunk(index: usize, text: &str, offset: usize) -> Chunk {
    Chunk {
        index,
        text: text.to_string(),
        source_offset: Some(offset),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize, strategy: SplitStrategy) -> Chunker {
        Chunker::new(ChunkerConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            strategy,
        })
        .unwrap()
    }

    fn strip_ws(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    /// Rebuild the document by concatenating chunks with overlaps removed.
    fn reconstruct(chunks: &[Chunk]) -> String {
        let mut out = String::new();
        let mut covered = 0usize;
        for c in chunks {
            let offset = c.source_offset.unwrap();
            let skip = covered.saturating_sub(offset);
            out.extend(c.text.chars().skip(skip));
            covered = covered.max(offset + c.char_len());
        }
        out
    }

    fn sample_document() -> String {
        let mut doc = String::new();
        for p in 0..12 {
            for s in 0..(3 + p % 4) {
                doc.push_str(&format!(
                    "Sentence {} of paragraph {} talks about item {}. ",
                    s,
                    p,
                    p * 7 + s
                ));
            }
            doc.push_str("\n\n");
        }
        doc
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("  Hello, world!\n", 500, 50).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].source_offset, Some(2));
    }

    #[test]
    fn test_empty_and_whitespace_only() {
        assert!(split_text("", 500, 50).unwrap().is_empty());
        assert!(split_text(" \n\t\n  ", 500, 50).unwrap().is_empty());
        let fixed = chunker(10, 2, SplitStrategy::Fixed);
        assert!(fixed.split("   ").is_empty());
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            split_text("abc", 0, 0),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            split_text("abc", 10, 10),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            split_text("abc", 10, 25),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_scenario_1200_chars_boundary() {
        let text = "abcd ".repeat(240);
        let chunks = split_text(&text, 500, 50).unwrap();
        assert_eq!(chunks.len(), 3);

        let first = &chunks[0];
        let first_end = first.source_offset.unwrap() + first.char_len();
        let second_start = chunks[1].source_offset.unwrap();
        assert!(second_start < first_end);
        assert!(second_start >= first_end - 50);
    }

    #[test]
    fn test_scenario_1200_chars_fixed() {
        let text: String = (0..1200)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();
        let chunks = chunker(500, 50, SplitStrategy::Fixed).split(&text);
        assert_eq!(chunks.len(), 3);
        let offsets: Vec<usize> = chunks.iter().map(|c| c.source_offset.unwrap()).collect();
        assert_eq!(offsets, vec![0, 450, 900]);
        assert_eq!(chunks[0].char_len(), 500);
        assert_eq!(chunks[2].char_len(), 300);
        assert_eq!(&chunks[1].text[..50], &chunks[0].text[450..]);
    }

    #[test]
    fn test_hard_cut_without_whitespace_keeps_exact_overlap() {
        let text = "x".repeat(1000);
        let chunks = split_text(&text, 300, 30).unwrap();
        for pair in chunks.windows(2) {
            let prev_end = pair[0].source_offset.unwrap() + pair[0].char_len();
            assert_eq!(pair[1].source_offset.unwrap(), prev_end - 30);
        }
    }

    #[test]
    fn test_chunks_respect_size() {
        let doc = sample_document();
        for (size, overlap) in [(60, 0), (100, 20), (200, 50), (500, 50), (37, 36)] {
            for strategy in [SplitStrategy::Boundary, SplitStrategy::Fixed] {
                let chunks = chunker(size, overlap, strategy).split(&doc);
                assert!(!chunks.is_empty());
                for c in &chunks {
                    assert!(
                        c.char_len() <= size,
                        "chunk {} has {} chars (size {}, {:?})",
                        c.index,
                        c.char_len(),
                        size,
                        strategy
                    );
                    assert!(!c.text.trim().is_empty());
                }
            }
        }
    }

    #[test]
    fn test_reconstruction_modulo_whitespace() {
        let doc = sample_document();
        for (size, overlap) in [(60, 0), (100, 20), (200, 50), (37, 36)] {
            for strategy in [SplitStrategy::Boundary, SplitStrategy::Fixed] {
                let chunks = chunker(size, overlap, strategy).split(&doc);
                assert_eq!(
                    strip_ws(&reconstruct(&chunks)),
                    strip_ws(&doc),
                    "size {} overlap {} {:?}",
                    size,
                    overlap,
                    strategy
                );
            }
        }
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let text = "one two three four five six.\n\nseven eight nine ten eleven twelve.";
        let chunks = split_text(text, 40, 0).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "one two three four five six.");
        assert_eq!(chunks[1].text, "seven eight nine ten eleven twelve.");
    }

    #[test]
    fn test_long_token_before_paragraph_keeps_overlap() {
        let text = format!("{}.\n\nsecond paragraph words here and more words", "w".repeat(30));
        let chunks = split_text(&text, 40, 10).unwrap();
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let prev_end = pair[0].source_offset.unwrap() + pair[0].char_len();
            let next_start = pair[1].source_offset.unwrap();
            assert!(next_start < prev_end, "no overlap between {:?} and {:?}", pair[0].text, pair[1].text);
            assert!(prev_end - next_start <= 10);
        }
        assert_eq!(chunks[1].source_offset, Some(23));
        assert!(chunks[1].text.starts_with("wwwwwww.\n\nsecond"));
    }

    #[test]
    fn test_prefers_sentence_over_word() {
        let text = "Alpha beta gamma. Delta epsilon zeta eta theta iota kappa lambda";
        let chunks = split_text(text, 30, 0).unwrap();
        assert_eq!(chunks[0].text, "Alpha beta gamma.");
        assert!(chunks[1].text.starts_with("Delta"));
    }

    #[test]
    fn test_overlap_starts_on_word() {
        let text = "the quick brown fox jumps over the lazy dog and keeps running far away";
        let chunks = split_text(text, 30, 10).unwrap();
        assert!(chunks.len() > 1);
        let chars: Vec<char> = text.chars().collect();
        for c in chunks.iter().skip(1) {
            let off = c.source_offset.unwrap();
            assert!(chars[off - 1].is_whitespace(), "chunk {:?} starts mid-word", c.text);
        }
    }

    #[test]
    fn test_source_offsets_point_into_document() {
        let doc = sample_document();
        let chars: Vec<char> = doc.chars().collect();
        for strategy in [SplitStrategy::Boundary, SplitStrategy::Fixed] {
            for c in chunker(120, 30, strategy).split(&doc) {
                let off = c.source_offset.unwrap();
                let expected: String = chars[off..off + c.char_len()].iter().collect();
                assert_eq!(c.text, expected);
            }
        }
    }

    #[test]
    fn test_chunk_indices_contiguous() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {}.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = split_text(&text, 40, 8).unwrap();
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i, "Index mismatch at position {}", i);
        }
    }

    #[test]
    fn test_multibyte_utf8_chars() {
        let text = "┌──────────────────┐\n│ Héllo wörld ✓    │\n└──────────────────┘";
        for strategy in [SplitStrategy::Boundary, SplitStrategy::Fixed] {
            let chunks = chunker(12, 3, strategy).split(text);
            assert!(!chunks.is_empty());
            for c in &chunks {
                assert!(c.char_len() <= 12);
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let doc = sample_document();
        let c1 = split_text(&doc, 90, 15).unwrap();
        let c2 = split_text(&doc, 90, 15).unwrap();
        assert_eq!(c1, c2);
    }
}
