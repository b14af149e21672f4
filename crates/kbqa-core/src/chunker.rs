//! Greedy hierarchical text splitting with overlap.
//!
//! The text is cut on the first separator of the hierarchy that occurs in it
//! (paragraph, line, sentence end, space, then single characters). Pieces that
//! are still too long are split again with the remaining separators; short
//! pieces are merged greedily into windows of at most `chunk_size` characters,
//! each window after the first starting with up to `chunk_overlap` characters
//! of the previous one.

use std::collections::VecDeque;
use tracing::warn;

use crate::config::ChunkingConfig;
use crate::error::Result;
use crate::types::{keys, Chunk, Document, MetaValue};

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", ".", " "];

#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<String>,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            separators: DEFAULT_SEPARATORS.iter().map(ToString::to_string).collect(),
        })
    }

    /// Replace the separator hierarchy. Empty separators are ignored; single
    /// characters remain the implicit last resort.
    pub fn with_separators<I, S>(mut self, separators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.separators = separators.into_iter().map(Into::into).filter(|s: &String| !s.is_empty()).collect();
        self
    }

    pub fn chunk_size(&self) -> usize { self.chunk_size }

    pub fn chunk_overlap(&self) -> usize { self.chunk_overlap }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.separators)
    }

    /// Split every document and attach `chunk_id`, `chunk_index` and
    /// `start_index` on top of a copy of the parent metadata.
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for document in documents {
            let text = document.content();
            // earliest char offset the next chunk can start at
            let mut floor = 0usize;
            for (n, piece) in self.split_text(text).into_iter().enumerate() {
                let from = byte_offset(text, floor);
                let byte_start = text[from..].find(piece.as_str()).map_or(from, |i| from + i);
                let start_index = text[..byte_start].chars().count();
                floor = (start_index + char_len(&piece)).saturating_sub(self.chunk_overlap).max(start_index + 1);

                let id = format!("{}_chunk_{}", document.source(), n);
                let mut metadata = document.metadata().clone();
                metadata.insert(keys::CHUNK_ID.to_string(), MetaValue::from(id.clone()));
                metadata.insert(keys::CHUNK_INDEX.to_string(), MetaValue::from(n));
                metadata.insert(keys::START_INDEX.to_string(), MetaValue::from(start_index));
                chunks.push(Chunk { id, content: piece, metadata });
            }
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let (separator, remaining) = match separators.iter().position(|s| text.contains(s.as_str())) {
            Some(i) => (separators[i].as_str(), &separators[i + 1..]),
            None => ("", &separators[separators.len()..]),
        };

        let mut final_chunks = Vec::new();
        let mut short_pieces: Vec<&str> = Vec::new();
        for piece in split_keep_separator(text, separator) {
            if char_len(piece) < self.chunk_size {
                short_pieces.push(piece);
                continue;
            }
            if !short_pieces.is_empty() {
                final_chunks.extend(self.merge(&short_pieces));
                short_pieces.clear();
            }
            if separator.is_empty() {
                if !piece.trim().is_empty() {
                    final_chunks.push(piece.to_string());
                }
            } else {
                final_chunks.extend(self.split_recursive(piece, remaining));
            }
        }
        if !short_pieces.is_empty() {
            final_chunks.extend(self.merge(&short_pieces));
        }
        final_chunks
    }

    fn merge(&self, pieces: &[&str]) -> Vec<String> {
        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;
        for &piece in pieces {
            let len = char_len(piece);
            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(total, chunk_size = self.chunk_size, "created a chunk longer than the configured size");
                }
                if !window.is_empty() {
                    push_trimmed(&mut merged, &window);
                    while total > self.chunk_overlap || (total + len > self.chunk_size && total > 0) {
                        match window.pop_front() {
                            Some(dropped) => total -= char_len(dropped),
                            None => break,
                        }
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }
        push_trimmed(&mut merged, &window);
        merged
    }
}

fn push_trimmed(out: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined: String = window.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

/// Split so that each separator starts the piece that follows it. An empty
/// separator splits into single characters. Empty pieces are dropped.
fn split_keep_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text.char_indices().map(|(i, c)| &text[i..i + c.len_utf8()]).collect();
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, _) in text.match_indices(separator) {
        if idx > start {
            pieces.push(&text[start..idx]);
        }
        start = idx;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn char_len(s: &str) -> usize { s.chars().count() }

fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices().nth(char_index).map_or(text.len(), |(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Meta;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(&ChunkingConfig { chunk_size: size, chunk_overlap: overlap }).unwrap()
    }

    fn document(text: &str) -> Document {
        let mut meta = Meta::new();
        meta.insert("source".into(), "policy.txt".into());
        meta.insert("category".into(), "HR".into());
        Document::new(text, meta).unwrap()
    }

    fn sample_text() -> String {
        let mut text = String::new();
        for p in 0..6 {
            for s in 0..5 {
                text.push_str(&format!("Paragraph {p} sentence {s} talks about leave policy and benefits. "));
            }
            text.push_str("\nA short trailing line.\n\n");
        }
        text
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunker(500, 50).split_text("Employees receive 15 vacation days annually.");
        assert_eq!(chunks, vec!["Employees receive 15 vacation days annually.".to_string()]);
    }

    #[test]
    fn prefers_paragraph_boundaries() {
        let chunks = chunker(30, 0).split_text("first paragraph here\n\nsecond paragraph here");
        assert_eq!(chunks, vec!["first paragraph here".to_string(), "second paragraph here".to_string()]);
    }

    #[test]
    fn chunks_respect_the_length_bound() {
        let text = sample_text();
        for (size, overlap) in [(500, 50), (120, 20), (40, 10), (7, 3)] {
            for chunk in chunker(size, overlap).split_text(&text) {
                assert!(chunk.chars().count() <= size, "chunk of {} chars exceeds {size}: {chunk:?}", chunk.chars().count());
                assert!(!chunk.trim().is_empty());
            }
        }
    }

    #[test]
    fn unbroken_runs_fall_back_to_characters() {
        let text = "x".repeat(95);
        let chunks = chunker(20, 5).split_text(&text);
        assert!(chunks.iter().all(|c| c.len() <= 20));
        assert_eq!(chunks[0].len(), 20);
        assert!(chunks.len() >= 5);
    }

    #[test]
    fn multibyte_text_is_measured_in_chars() {
        let text = "über straße café naïve ".repeat(20);
        for chunk in chunker(25, 5).split_text(&text) {
            assert!(chunk.chars().count() <= 25);
        }
    }

    fn start_of(chunk: &Chunk) -> usize {
        chunk.metadata[keys::START_INDEX].as_f64().unwrap() as usize
    }

    #[test]
    fn consecutive_chunks_cover_the_text() {
        let text = sample_text();
        let chunks = chunker(120, 30).split_documents(&[document(&text)]);
        assert!(chunks.len() > 3);

        let chars: Vec<char> = text.chars().collect();
        let mut covered = vec![false; chars.len()];
        let mut previous: Option<(usize, usize)> = None;
        for chunk in &chunks {
            let start = start_of(chunk);
            let len = chunk.content.chars().count();
            let slice: String = chars[start..start + len].iter().collect();
            assert_eq!(slice, chunk.content, "start_index points at the chunk text");
            covered[start..start + len].iter_mut().for_each(|c| *c = true);
            if let Some((prev_start, prev_len)) = previous {
                assert!(start > prev_start, "chunks advance through the text");
                assert!(start <= prev_start + prev_len + 2, "no gap between consecutive chunks");
            }
            previous = Some((start, len));
        }
        for (i, c) in chars.iter().enumerate() {
            assert!(covered[i] || c.is_whitespace(), "char {i} ({c:?}) is not covered by any chunk");
        }
    }

    #[test]
    fn each_chunk_repeats_the_tail_of_its_predecessor() {
        let text: String = (0..200).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ");
        let chunks = chunker(50, 15).split_documents(&[document(&text)]);
        assert!(chunks.len() > 10);
        for w in chunks.windows(2) {
            let (a, b) = (start_of(&w[0]), start_of(&w[1]));
            let a_end = a + w[0].content.chars().count();
            assert!(b < a_end, "chunk at {b} overlaps its predecessor ending at {a_end}");
            assert!(a_end - b <= 15, "overlap of {} exceeds the configured 15", a_end - b);
        }
    }

    #[test]
    fn repetitive_text_gets_window_offsets() {
        let chunks = chunker(20, 5).split_documents(&[document(&"x".repeat(95))]);
        let starts: Vec<usize> = chunks.iter().map(start_of).collect();
        assert_eq!(starts, vec![0, 15, 30, 45, 60, 75]);
    }

    #[test]
    fn repeated_sentences_keep_their_own_offsets() {
        let text = "Leave policy applies. ".repeat(12);
        let chunks = chunker(50, 10).split_documents(&[document(&text)]);
        let chars: Vec<char> = text.chars().collect();
        for w in chunks.windows(2) {
            assert!(start_of(&w[1]) > start_of(&w[0]));
        }
        for chunk in &chunks {
            let start = start_of(chunk);
            let slice: String = chars[start..start + chunk.content.chars().count()].iter().collect();
            assert_eq!(slice, chunk.content);
        }
        let last = chunks.last().unwrap();
        assert_eq!(start_of(last) + last.content.chars().count(), text.trim_end().chars().count());
    }

    #[test]
    fn zero_overlap_never_repeats_text() {
        let text = sample_text();
        let chunks = chunker(80, 0).split_documents(&[document(&text)]);
        for w in chunks.windows(2) {
            assert!(start_of(&w[1]) >= start_of(&w[0]) + w[0].content.chars().count());
        }
    }

    #[test]
    fn chunk_ids_are_sequenced_per_source() {
        let chunks = chunker(60, 10).split_documents(&[document(&sample_text())]);
        for (n, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.id, format!("policy.txt_chunk_{n}"));
            assert_eq!(chunk.metadata[keys::CHUNK_ID].as_str(), Some(chunk.id.as_str()));
            assert_eq!(chunk.chunk_index(), n);
            assert_eq!(chunk.category(), "HR");
            assert_eq!(chunk.source(), "policy.txt");
        }
    }

    #[test]
    fn whitespace_only_documents_produce_no_chunks() {
        assert!(chunker(50, 5).split_documents(&[document(" \n\n \n")]).is_empty());
    }

    #[test]
    fn custom_separators_drop_empty_entries() {
        let chunker = chunker(10, 0).with_separators(["|", ""]);
        assert_eq!(chunker.split_text("aaaa|bbbb|cccc"), vec!["aaaa|bbbb", "|cccc"]);
    }
}
