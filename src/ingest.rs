//! Ingestion pipeline orchestration.
//!
//! Coordinates the document side of the pipeline: loader → chunker →
//! preview dump. Building an index generation from the result lives in
//! [`crate::index`].

use anyhow::Result;

use crate::chunk::{write_chunk_preview, TextSplitter};
use crate::config::Config;
use crate::loader::Loader;
use crate::models::Chunk;

/// Load every raw document, split it and write `chunks_preview.txt`.
pub fn run_ingest(config: &Config) -> Result<Vec<Chunk>> {
    let raw_dir = config.storage.raw_dir();
    let loader = Loader::new(&config.loader.include_globs)?;
    let pages = loader.load_documents(&raw_dir);

    let splitter = TextSplitter::new(config.chunking.max_length, config.chunking.overlap)?;
    let chunks = splitter.split_pages(&pages);

    write_chunk_preview(&chunks, &config.storage.preview_path())?;

    tracing::info!(
        raw_dir = %raw_dir.display(),
        pages = pages.len(),
        chunks = chunks.len(),
        "ingest complete"
    );
    Ok(chunks)
}
