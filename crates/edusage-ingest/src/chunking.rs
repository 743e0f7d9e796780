//! Recursive character chunking with overlap.
//!
//! Text is first cut into "atoms": pieces no longer than `chunk_size`
//! characters, split at the coarsest separator that works. A separator stays
//! attached to the end of the piece before it, so atoms tile the input
//! exactly. Atoms are then packed greedily into chunks; the next chunk
//! starts with the trailing atoms of the previous one, up to `overlap`
//! characters.
//!
//! Sizes are counted in Unicode scalar values, never bytes.

use std::collections::VecDeque;
use std::ops::Range;

use edusage_core::ChunkProfile;

/// Separators, coarsest first. The empty separator splits by character.
pub const SEPARATORS: &[&str] = &["\n\n", "\n", "۔", "؟", "!", "।", ".", " ", ""];

/// A chunk with its byte range in the source text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    pub chunk_size: usize,
    pub overlap: usize,
    separators: &'static [&'static str],
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            overlap,
            separators: SEPARATORS,
        }
    }

    pub fn for_profile(profile: ChunkProfile) -> Self {
        Self::new(profile.chunk_size, profile.overlap)
    }

    /// Split `text` into ordered chunks. Whitespace-only chunks are dropped.
    pub fn split(&self, text: &str) -> Vec<TextChunk> {
        let mut atoms = Vec::new();
        self.collect_atoms(text, 0, self.separators, &mut atoms);

        let ranges = self.merge(text, &atoms);
        let kept: Vec<Range<usize>> = ranges
            .into_iter()
            .filter(|r| !text[r.clone()].trim().is_empty())
            .collect();

        let total = kept.len();
        kept.into_iter()
            .enumerate()
            .map(|(i, r)| TextChunk {
                text: text[r.clone()].to_string(),
                chunk_index: i,
                total_chunks: total,
                start: r.start,
                end: r.end,
            })
            .collect()
    }

    fn collect_atoms(
        &self,
        text: &str,
        offset: usize,
        separators: &[&str],
        out: &mut Vec<Range<usize>>,
    ) {
        if text.is_empty() {
            return;
        }
        if char_len(text) <= self.chunk_size {
            out.push(offset..offset + text.len());
            return;
        }

        let position = separators
            .iter()
            .position(|sep| sep.is_empty() || text.contains(sep));
        let (sep, finer) = match position {
            Some(i) if !separators[i].is_empty() => (separators[i], &separators[i + 1..]),
            _ => {
                self.split_chars(text, offset, out);
                return;
            }
        };

        let mut start = 0;
        let mut pieces = Vec::new();
        for (idx, m) in text.match_indices(sep) {
            let end = idx + m.len();
            pieces.push(start..end);
            start = end;
        }
        if start < text.len() {
            pieces.push(start..text.len());
        }

        for piece in pieces {
            let slice = &text[piece.clone()];
            if char_len(slice) <= self.chunk_size {
                out.push(offset + piece.start..offset + piece.end);
            } else {
                self.collect_atoms(slice, offset + piece.start, finer, out);
            }
        }
    }

    fn split_chars(&self, text: &str, offset: usize, out: &mut Vec<Range<usize>>) {
        let boundaries: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .step_by(self.chunk_size)
            .chain(std::iter::once(text.len()))
            .collect();
        for pair in boundaries.windows(2) {
            if pair[0] < pair[1] {
                out.push(offset + pair[0]..offset + pair[1]);
            }
        }
    }

    fn merge(&self, text: &str, atoms: &[Range<usize>]) -> Vec<Range<usize>> {
        let mut chunks = Vec::new();
        let mut window: VecDeque<(Range<usize>, usize)> = VecDeque::new();
        let mut window_len = 0;

        for atom in atoms {
            let len = char_len(&text[atom.clone()]);
            if window_len + len > self.chunk_size && !window.is_empty() {
                chunks.push(span(&window));
                while window_len > self.overlap
                    || (window_len + len > self.chunk_size && window_len > 0)
                {
                    match window.pop_front() {
                        Some((_, dropped)) => window_len -= dropped,
                        None => break,
                    }
                }
            }
            window.push_back((atom.clone(), len));
            window_len += len;
        }
        if !window.is_empty() {
            chunks.push(span(&window));
        }
        chunks
    }
}

fn span(window: &VecDeque<(Range<usize>, usize)>) -> Range<usize> {
    let start = window.front().map(|(r, _)| r.start).unwrap_or(0);
    let end = window.back().map(|(r, _)| r.end).unwrap_or(start);
    start..end
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
