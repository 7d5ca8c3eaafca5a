//! Evaluation runs.
//!
//! A run replays a fixed question set (`id,pregunta` CSV) through the
//! orchestrator, one question at a time, and writes one artifact per run:
//!
//! ```text
//! eval/resultados_20250301_101500.csv
//! indice,id,pregunta,tiempo_ms,respuesta,fuentes_json,correcta(0/1),comentario
//! ```
//!
//! The generation is resolved once when the run starts and pinned for every
//! question, so all rows of an artifact refer to the same index. The last two
//! columns are left empty for manual labelling and read back by
//! [`crate::score`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::answer::{AnswerOptions, AnswerRecord, Orchestrator};
use crate::error::RagError;
use crate::index::GenerationId;

pub const ARTIFACT_PREFIX: &str = "resultados_";

/// One row of the question set.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Question {
    pub id: String,
    pub pregunta: String,
}

/// One row of a run artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRow {
    pub indice: String,
    pub id: String,
    pub pregunta: String,
    pub tiempo_ms: String,
    pub respuesta: String,
    pub fuentes_json: String,
    #[serde(rename = "correcta(0/1)")]
    pub correcta: String,
    pub comentario: String,
}

#[derive(Debug)]
pub struct EvalRun {
    pub artifact: PathBuf,
    pub generation: GenerationId,
    pub rows: Vec<EvalRow>,
    pub mean_latency_ms: f64,
}

pub fn read_questions(path: &Path) -> Result<Vec<Question>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open question set: {}", path.display()))?;

    let mut questions = Vec::new();
    for (line, record) in reader.deserialize::<Question>().enumerate() {
        let mut question =
            record.with_context(|| format!("Bad question row {} in {}", line + 1, path.display()))?;
        question.pregunta = question.pregunta.trim().to_string();
        questions.push(question);
    }
    Ok(questions)
}

/// Run every question in order and persist the artifact under `out_dir`.
///
/// `on_answer` is called after each question with its record and latency in
/// milliseconds. Degraded answers are recorded like any other; a
/// configuration or missing-index failure aborts the run before anything is
/// written.
pub async fn run_evaluation<F>(
    orchestrator: &Orchestrator,
    questions: &[Question],
    out_dir: &Path,
    opts: &AnswerOptions,
    mut on_answer: F,
) -> Result<EvalRun>
where
    F: FnMut(&Question, &AnswerRecord, f64),
{
    if questions.is_empty() {
        bail!("question set is empty");
    }

    let started = Local::now();

    let generation = match &opts.generation {
        Some(id) => id.clone(),
        None => orchestrator.index().latest_generation()?.ok_or_else(|| {
            RagError::not_found("No index generation found. Run `docent index build` first.")
        })?,
    };
    let pinned = AnswerOptions {
        generation: Some(generation.clone()),
        ..opts.clone()
    };

    tracing::info!(
        generation = %generation,
        questions = questions.len(),
        k = pinned.k,
        mode = %pinned.mode,
        "evaluation run started"
    );

    let mut rows = Vec::with_capacity(questions.len());
    let mut total_ms = 0.0;

    for question in questions {
        let t0 = Instant::now();
        let record = orchestrator.answer(&question.pregunta, &pinned).await?;
        let elapsed_ms = t0.elapsed().as_secs_f64() * 1000.0;
        total_ms += elapsed_ms;

        on_answer(question, &record, elapsed_ms);

        rows.push(EvalRow {
            indice: generation.to_string(),
            id: question.id.clone(),
            pregunta: question.pregunta.clone(),
            tiempo_ms: format!("{:.0}", elapsed_ms),
            respuesta: record.answer.trim().to_string(),
            fuentes_json: serde_json::to_string(&record.cited_sources())?,
            correcta: String::new(),
            comentario: String::new(),
        });
    }

    let artifact = write_artifact(out_dir, &started.format("%Y%m%d_%H%M%S").to_string(), &rows)?;
    let mean_latency_ms = total_ms / rows.len() as f64;

    tracing::info!(artifact = %artifact.display(), mean_latency_ms, "evaluation run saved");

    Ok(EvalRun {
        artifact,
        generation,
        rows,
        mean_latency_ms,
    })
}

/// Write rows to a new `resultados_<stamp>.csv`, never replacing an existing file.
fn write_artifact(out_dir: &Path, stamp: &str, rows: &[EvalRow]) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create eval dir: {}", out_dir.display()))?;

    for attempt in 0..100u32 {
        let name = if attempt == 0 {
            format!("{}{}.csv", ARTIFACT_PREFIX, stamp)
        } else {
            format!("{}{}_{:02}.csv", ARTIFACT_PREFIX, stamp, attempt)
        };
        let path = out_dir.join(name);

        let file = match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", path.display()))
            }
        };

        let mut writer = csv::Writer::from_writer(file);
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        return Ok(path);
    }

    bail!("too many evaluation artifacts for {}", stamp)
}
