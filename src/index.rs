//! Versioned index generations.
//!
//! Every build writes a new, self-contained directory under the index root:
//!
//! ```text
//! index/
//! ├── index_20250301_101500/
//! │   ├── store.sqlite     chunks + embeddings
//! │   └── manifest.json    id, created_at, embed_model, dims, chunk_count
//! └── index_20250302_083012/
//! ```
//!
//! Names sort lexicographically in creation order, so "latest" is simply the
//! maximum name. A generation is never modified after its build returns;
//! loads open the store read-only.
//!
//! `manifest.json` is written last, through a temporary file and a rename.
//! A directory without it belongs to a build that is still running or was
//! interrupted, and is not listed.
//!
//! Directory allocation uses `create_dir`, which fails if the name is
//! already taken. Two builds inside the same second therefore get
//! `index_<stamp>` and `index_<stamp>_01` instead of sharing a directory.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::embedding::{self, blob_to_vec, cosine_distance, vec_to_blob, EmbeddingProvider};
use crate::error::{ProviderError, RagError, Result};
use crate::migrate;
use crate::models::Chunk;

const PREFIX: &str = "index_";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const STORE_FILE: &str = "store.sqlite";
const MANIFEST_FILE: &str = "manifest.json";
const MANIFEST_TMP: &str = "manifest.json.tmp";
const MAX_SAME_SECOND: u32 = 99;

/// Name of one index generation, e.g. `index_20250301_101500`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GenerationId(String);

impl GenerationId {
    /// Accepts `index_YYYYMMDD_HHMMSS` with an optional `_NN` collision suffix.
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(PREFIX)?;
        let stamp = rest.get(..15)?;
        NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
        match &rest[15..] {
            "" => {}
            suffix => {
                let digits = suffix.strip_prefix('_')?;
                if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
            }
        }
        Some(Self(name.to_string()))
    }

    fn from_stamp(stamp: &str, attempt: u32) -> Self {
        if attempt == 0 {
            Self(format!("{}{}", PREFIX, stamp))
        } else {
            Self(format!("{}{}_{:02}", PREFIX, stamp, attempt))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GenerationId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("not an index generation name: {}", value))
    }
}

impl From<GenerationId> for String {
    fn from(id: GenerationId) -> Self {
        id.0
    }
}

impl std::str::FromStr for GenerationId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::try_from(s.to_string())
    }
}

/// Self-description written next to each generation's store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub id: GenerationId,
    pub created_at: DateTime<Utc>,
    pub embed_model: String,
    pub dims: usize,
    pub chunk_count: usize,
}

/// Creates, enumerates and opens generations under one index root.
#[derive(Debug, Clone)]
pub struct IndexManager {
    root: PathBuf,
}

impl IndexManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation_dir(&self, id: &GenerationId) -> PathBuf {
        self.root.join(id.as_str())
    }

    /// All finished generations, ascending by name. Empty if the root does
    /// not exist.
    pub fn list_generations(&self) -> Result<Vec<GenerationId>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(id) = entry.file_name().to_str().and_then(GenerationId::parse) else {
                continue;
            };
            if entry.path().join(MANIFEST_FILE).is_file() {
                ids.push(id);
            } else {
                tracing::debug!(generation = %id, "skipping unfinished generation");
            }
        }
        ids.sort();
        Ok(ids)
    }

    pub fn latest_generation(&self) -> Result<Option<GenerationId>> {
        Ok(self.list_generations()?.pop())
    }

    /// The manifest of a generation; `None` while it is unfinished.
    pub fn manifest(&self, id: &GenerationId) -> Result<Option<Manifest>> {
        let path = self.generation_dir(id).join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Build a new generation from `chunks`.
    ///
    /// The embedder's configuration is checked before anything is written.
    /// An empty chunk list still produces a generation, with a manifest but
    /// no store. Provider failures propagate; the half-written directory is
    /// removed.
    pub async fn build(
        &self,
        chunks: &[Chunk],
        embedder: &dyn EmbeddingProvider,
    ) -> Result<GenerationId> {
        embedder.ensure_configured()?;

        std::fs::create_dir_all(&self.root)?;
        let (id, dir) = self.allocate(Local::now())?;

        let built = if chunks.is_empty() {
            tracing::warn!(generation = %id, "no chunks to index; generation left empty");
            write_manifest(&dir, &Manifest::new(&id, embedder.model_name(), 0, 0))
        } else {
            self.populate(&id, &dir, chunks, embedder).await
        };

        match built {
            Ok(()) => {
                tracing::info!(generation = %id, chunks = chunks.len(), "index generation built");
                Ok(id)
            }
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&dir) {
                    tracing::warn!(dir = %dir.display(), error = %cleanup, "could not remove failed generation");
                }
                Err(e)
            }
        }
    }

    fn allocate(&self, now: DateTime<Local>) -> Result<(GenerationId, PathBuf)> {
        let stamp = now.format(STAMP_FORMAT).to_string();
        for attempt in 0..=MAX_SAME_SECOND {
            let id = GenerationId::from_stamp(&stamp, attempt);
            let dir = self.generation_dir(&id);
            match std::fs::create_dir(&dir) {
                Ok(()) => return Ok((id, dir)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(RagError::Unclassified(anyhow::anyhow!(
            "too many index generations created at {}",
            stamp
        )))
    }

    async fn populate(
        &self,
        id: &GenerationId,
        dir: &Path,
        chunks: &[Chunk],
        embedder: &dyn EmbeddingProvider,
    ) -> Result<()> {
        tracing::info!(
            chunks = chunks.len(),
            model = embedder.model_name(),
            "requesting embeddings"
        );
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(ProviderError::Generic(format!(
                "embedding service returned {} vectors for {} inputs",
                vectors.len(),
                chunks.len()
            ))
            .into());
        }
        let dims = vectors.first().map(Vec::len).unwrap_or(0);

        let pool = db::connect(&dir.join(STORE_FILE), false).await?;
        let written = write_chunks(&pool, chunks, &vectors).await;
        pool.close().await;
        written?;

        write_manifest(
            dir,
            &Manifest::new(id, embedder.model_name(), dims, chunks.len()),
        )
    }

    /// Open a generation for querying; the latest one when `id` is `None`.
    ///
    /// The embedder must be the model the generation was built with; query
    /// vectors from any other model are not comparable to the stored ones.
    pub async fn load(
        &self,
        id: Option<&GenerationId>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<IndexHandle> {
        let id = match id {
            Some(id) => {
                if !self.generation_dir(id).join(MANIFEST_FILE).is_file() {
                    return Err(RagError::not_found(format!(
                        "Index generation {} does not exist under {}",
                        id,
                        self.root.display()
                    )));
                }
                id.clone()
            }
            None => self.latest_generation()?.ok_or_else(|| {
                RagError::not_found(format!(
                    "No index generation found under {}. Run `docent index build` first.",
                    self.root.display()
                ))
            })?,
        };

        embedder.ensure_configured()?;

        let manifest = self.manifest(&id)?.ok_or_else(|| {
            RagError::not_found(format!("Index generation {} is unfinished", id))
        })?;
        if manifest.embed_model != embedder.model_name() {
            return Err(RagError::configuration(format!(
                "Index generation {} was built with embedding model '{}' but '{}' is configured. \
                 Rebuild the index or restore the embedding settings.",
                id,
                manifest.embed_model,
                embedder.model_name()
            )));
        }

        let store = self.generation_dir(&id).join(STORE_FILE);
        let pool = if store.exists() {
            Some(db::connect(&store, true).await?)
        } else {
            None
        };

        tracing::debug!(generation = %id, empty = pool.is_none(), "index generation loaded");
        Ok(IndexHandle { id, pool, embedder })
    }
}

impl Manifest {
    fn new(id: &GenerationId, embed_model: &str, dims: usize, chunk_count: usize) -> Self {
        Self {
            id: id.clone(),
            created_at: Utc::now(),
            embed_model: embed_model.to_string(),
            dims,
            chunk_count,
        }
    }
}

/// Write `manifest.json` atomically; this marks the generation finished.
fn write_manifest(dir: &Path, manifest: &Manifest) -> Result<()> {
    let tmp = dir.join(MANIFEST_TMP);
    std::fs::write(&tmp, serde_json::to_string_pretty(manifest)?)?;
    std::fs::rename(&tmp, dir.join(MANIFEST_FILE))?;
    Ok(())
}

async fn write_chunks(
    pool: &SqlitePool,
    chunks: &[Chunk],
    vectors: &[Vec<f32>],
) -> std::result::Result<(), sqlx::Error> {
    migrate::create_schema(pool).await?;

    let mut tx = pool.begin().await?;
    for (chunk, vector) in chunks.iter().zip(vectors) {
        sqlx::query(
            "INSERT INTO chunks (id, text, source_path, page_index, page_display, hash, embedding) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.text)
        .bind(chunk.source_path.to_string_lossy().to_string())
        .bind(chunk.page_index as i64)
        .bind(chunk.page_display as i64)
        .bind(&chunk.hash)
        .bind(vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await
}

/// A stored chunk with its distance to a query and its embedding.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Chunk,
    pub distance: f32,
    pub vector: Vec<f32>,
}

/// Read-only handle on one loaded generation.
pub struct IndexHandle {
    id: GenerationId,
    /// `None` for a generation built from zero chunks.
    pool: Option<SqlitePool>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl IndexHandle {
    pub fn id(&self) -> &GenerationId {
        &self.id
    }

    pub async fn count(&self) -> Result<usize> {
        let Some(pool) = &self.pool else {
            return Ok(0);
        };
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(pool)
            .await?;
        Ok(n as usize)
    }

    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(embedding::embed_query(self.embedder.as_ref(), text).await?)
    }

    /// The `limit` stored chunks closest to `query`, ascending by cosine
    /// distance. Ties keep insertion order.
    pub async fn nearest(&self, query: &[f32], limit: usize) -> Result<Vec<Candidate>> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            "SELECT id, text, source_path, page_index, hash, embedding FROM chunks ORDER BY seq",
        )
        .fetch_all(pool)
        .await?;

        let mut candidates: Vec<Candidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let page_index: Option<i64> = row.get("page_index");
                let source: String = row.get("source_path");
                let chunk = Chunk::with_metadata(
                    row.get("id"),
                    row.get("text"),
                    PathBuf::from(source),
                    page_index.and_then(|p| u32::try_from(p).ok()),
                    row.get("hash"),
                );
                // NaN components rank last
                let distance = match cosine_distance(query, &vector) {
                    d if d.is_nan() => f32::INFINITY,
                    d => d,
                };
                Candidate {
                    distance,
                    chunk,
                    vector,
                }
            })
            .collect();

        candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        candidates.truncate(limit);
        Ok(candidates)
    }

    pub async fn close(self) {
        if let Some(pool) = self.pool {
            pool.close().await;
        }
    }
}
