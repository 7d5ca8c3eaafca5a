//! Recursive, length-bounded text chunker with overlap.
//!
//! Splits page text into [`Chunk`]s of at most `max_length` characters,
//! with neighbouring chunks from the same page sharing roughly `overlap`
//! characters.
//!
//! # Algorithm
//!
//! 1. Pick the first separator in [`SEPARATORS`] that occurs in the text
//!    (paragraph, line, sentence, word, and finally single characters).
//! 2. Split on it, keeping the separator at the start of each following piece.
//! 3. Pieces shorter than `max_length` are greedily merged into windows of at
//!    most `max_length`; when a window is flushed, its tail (up to `overlap`
//!    characters worth of pieces) seeds the next window.
//! 4. Pieces that are too long are split recursively with the next separator.
//!
//! Lengths are counted in `char`s, not bytes or tokens. Chunks never span
//! pages; each one inherits its page's metadata.

use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::RagError;
use crate::models::{Chunk, Page};

/// Separators tried in order, from coarsest to a hard character cut.
pub const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    max_length: usize,
    overlap: usize,
}

impl TextSplitter {
    pub fn new(max_length: usize, overlap: usize) -> Result<Self, RagError> {
        if max_length == 0 {
            return Err(RagError::configuration("chunk max_length must be > 0"));
        }
        if overlap >= max_length {
            return Err(RagError::configuration(format!(
                "chunk overlap ({}) must be smaller than max_length ({})",
                overlap, max_length
            )));
        }
        Ok(Self {
            max_length,
            overlap,
        })
    }

    /// Split every page into chunks, in page order.
    pub fn split_pages(&self, pages: &[Page]) -> Vec<Chunk> {
        if pages.is_empty() {
            tracing::warn!("no pages to split");
            return Vec::new();
        }

        tracing::info!(
            pages = pages.len(),
            max_length = self.max_length,
            overlap = self.overlap,
            "splitting pages"
        );

        let chunks: Vec<Chunk> = pages
            .iter()
            .flat_map(|page| {
                self.split_with_metadata(&page.text, &page.source_path, Some(page.page_index))
            })
            .collect();

        tracing::info!(chunks = chunks.len(), "split complete");
        chunks
    }

    /// Split free text whose page metadata may be missing.
    pub fn split_with_metadata(
        &self,
        text: &str,
        source_path: &Path,
        page_index: Option<u32>,
    ) -> Vec<Chunk> {
        self.split_text(text)
            .into_iter()
            .map(|piece| make_chunk(piece, source_path.to_path_buf(), page_index))
            .collect()
    }

    /// Split text into trimmed, non-empty pieces of at most `max_length` chars.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let mut separator = "";
        let mut finer: &[&str] = &[];
        for (i, &sep) in separators.iter().enumerate() {
            if sep.is_empty() || text.contains(sep) {
                separator = sep;
                finer = &separators[i + 1..];
                break;
            }
        }

        let mut out = Vec::new();
        let mut fitting: Vec<String> = Vec::new();
        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.max_length {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                out.extend(self.merge(&fitting));
                fitting.clear();
            }
            if finer.is_empty() {
                push_trimmed(&mut out, &piece);
            } else {
                out.extend(self.split_recursive(&piece, finer));
            }
        }
        if !fitting.is_empty() {
            out.extend(self.merge(&fitting));
        }
        out
    }

    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            if total + len > self.max_length && !window.is_empty() {
                push_trimmed(&mut out, &window.iter().copied().collect::<String>());
                while total > self.overlap || (total + len > self.max_length && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }
            window.push_back(piece);
            total += len;
        }

        push_trimmed(&mut out, &window.iter().copied().collect::<String>());
        out
    }
}

/// Split pages with the given bounds.
pub fn split(pages: &[Page], max_length: usize, overlap: usize) -> Result<Vec<Chunk>, RagError> {
    Ok(TextSplitter::new(max_length, overlap)?.split_pages(pages))
}

fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut parts = text.split(separator);
    let mut out = Vec::new();
    if let Some(first) = parts.next() {
        if !first.is_empty() {
            out.push(first.to_string());
        }
    }
    out.extend(parts.map(|p| format!("{}{}", separator, p)));
    out
}

fn push_trimmed(out: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(text: String, source_path: PathBuf, page_index: Option<u32>) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk::with_metadata(
        Uuid::new_v4().to_string(),
        text,
        source_path,
        page_index,
        hash,
    )
}

/// Write the human-readable chunk dump (`processed/chunks_preview.txt`).
pub fn write_chunk_preview(chunks: &[Chunk], path: &Path) -> anyhow::Result<()> {
    if chunks.is_empty() {
        tracing::warn!("no chunks to preview");
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create chunk preview: {}", path.display()))?;
    let mut out = std::io::BufWriter::new(file);
    for (i, chunk) in chunks.iter().enumerate() {
        writeln!(out, "=== CHUNK {} ===", i + 1)?;
        writeln!(out, "FILE: {}", chunk.source_path.display())?;
        writeln!(out, "PAGE: {}", chunk.page_display)?;
        write!(out, "{}\n\n", chunk.text)?;
    }
    out.flush()?;

    tracing::info!(path = %path.display(), chunks = chunks.len(), "chunk preview written");
    Ok(())
}
