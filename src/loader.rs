//! Document loading: raw files in, normalized [`Page`]s out.
//!
//! Files directly under the raw root that match the configured include
//! globs are processed in file-name order. Each file goes through the
//! extractor chain (see [`crate::extract`]); a file that every applicable
//! extractor fails on is logged and skipped, never aborting the batch.
//!
//! Every page is normalized before it leaves this module:
//! - `source_path` is the canonical absolute path of the file;
//! - `page_index` is parsed from the extractor's page indicator, 0 if absent
//!   or unparsable;
//! - `page_display` is derived as `page_index + 1`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::extract::{default_extractors, DocumentExtractor, ExtractError, RawPage};
use crate::models::{file_name_of, Page};

pub struct Loader {
    extractors: Vec<Box<dyn DocumentExtractor>>,
    include: GlobSet,
}

impl Loader {
    /// Loader with the default extractor chain.
    pub fn new(include_globs: &[String]) -> Result<Self> {
        Self::with_extractors(include_globs, default_extractors())
    }

    pub fn with_extractors(
        include_globs: &[String],
        extractors: Vec<Box<dyn DocumentExtractor>>,
    ) -> Result<Self> {
        Ok(Self {
            extractors,
            include: build_globset(include_globs)?,
        })
    }

    /// Load every matching document under `raw_root` as pages.
    pub fn load_documents(&self, raw_root: &Path) -> Vec<Page> {
        let files = self.list_files(raw_root);
        if files.is_empty() {
            tracing::warn!(dir = %raw_root.display(), "no documents found");
            return Vec::new();
        }

        tracing::info!(count = files.len(), dir = %raw_root.display(), "loading documents");

        let mut pages = Vec::new();
        for path in &files {
            match self.load_file(path) {
                Ok(file_pages) if file_pages.is_empty() => {
                    tracing::warn!(
                        file = %file_name_of(path),
                        "document produced no text (possibly a scanned PDF)"
                    );
                }
                Ok(file_pages) => {
                    tracing::debug!(file = %file_name_of(path), pages = file_pages.len(), "loaded");
                    pages.extend(file_pages);
                }
                Err(e) => {
                    tracing::warn!(file = %file_name_of(path), error = %e, "skipping unreadable document");
                }
            }
        }

        tracing::info!(pages = pages.len(), "pages loaded");
        pages
    }

    fn list_files(&self, raw_root: &Path) -> Vec<PathBuf> {
        if !raw_root.is_dir() {
            return Vec::new();
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(raw_root).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if self.include.is_match(entry.file_name()) {
                files.push(entry.into_path());
            }
        }

        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        files
    }

    /// Run the extractor chain on one file and normalize its pages.
    pub fn load_file(&self, path: &Path) -> Result<Vec<Page>, ExtractError> {
        let resolved = std::fs::canonicalize(path).map_err(|e| ExtractError::Io(e.to_string()))?;

        let mut last_err = None;
        for extractor in self.extractors.iter().filter(|x| x.supports(&resolved)) {
            match extractor.extract(&resolved) {
                Ok(raw_pages) => {
                    return Ok(raw_pages
                        .into_iter()
                        .filter(|p| !p.text.trim().is_empty())
                        .map(|p| normalize_page(&resolved, p))
                        .collect());
                }
                Err(e) => {
                    tracing::debug!(
                        extractor = extractor.name(),
                        file = %file_name_of(&resolved),
                        error = %e,
                        "extractor failed, trying next"
                    );
                    last_err = Some(e);
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| ExtractError::Unsupported(resolved.display().to_string())))
    }
}

/// Normalize one extracted page against its resolved source path.
pub fn normalize_page(resolved_path: &Path, raw: RawPage) -> Page {
    let page_index = raw
        .page
        .as_deref()
        .and_then(|p| p.trim().parse::<u32>().ok())
        .unwrap_or(0);
    Page::new(resolved_path.to_path_buf(), page_index, raw.text)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
