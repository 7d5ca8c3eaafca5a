//! Core data models used throughout docent.
//!
//! These types represent the pages, chunks, and retrieval results that flow
//! through the ingestion and answering pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One logical page extracted from a source document.
///
/// `page_display` is always `page_index + 1`; construct pages through
/// [`Page::new`] so the two never diverge.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub source_path: PathBuf,
    pub page_index: u32,
    pub page_display: u32,
    pub text: String,
}

impl Page {
    pub fn new(source_path: PathBuf, page_index: u32, text: String) -> Self {
        Self {
            source_path,
            page_index,
            page_display: page_index + 1,
            text,
        }
    }
}

/// A bounded-length fragment of page text; the unit of embedding and retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source_path: PathBuf,
    pub page_index: u32,
    pub page_display: u32,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

impl Chunk {
    /// Build a chunk from possibly incomplete page metadata.
    ///
    /// A missing `page_index` becomes 0 and `page_display` is always
    /// recomputed from it, never taken from elsewhere.
    pub fn with_metadata(
        id: String,
        text: String,
        source_path: PathBuf,
        page_index: Option<u32>,
        hash: String,
    ) -> Self {
        let page_index = page_index.unwrap_or(0);
        Self {
            id,
            text,
            source_path,
            page_index,
            page_display: page_index + 1,
            hash,
        }
    }

    /// The bare file name of the source document, used in citations.
    pub fn file_name(&self) -> String {
        file_name_of(&self.source_path)
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// A chunk returned for a query, with its position in the result list.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    /// 1-based rank in the returned ordering.
    pub rank: usize,
    /// Cosine distance to the query embedding (`1 - cosine similarity`).
    pub distance: f32,
    pub chunk: Chunk,
}

/// Ordered chunks returned for one query against one generation.
pub type RetrievalResult = Vec<RetrievedChunk>;

/// Compact citation written into evaluation artifacts as `fuentes_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitedSource {
    #[serde(rename = "i")]
    pub index: usize,
    #[serde(rename = "archivo")]
    pub file: String,
    #[serde(rename = "pagina")]
    pub page: u32,
}
