//! Aggregate statistics over labelled run artifacts.
//!
//! Rows are grouped by their `indice` column (the generation they were
//! answered against). For each group and globally:
//!
//! | Metric | Definition |
//! |--------|------------|
//! | exact | rows with `correcta(0/1)` ≥ 0.999 |
//! | partial | rows with `correcta(0/1)` in `[0.49, 0.51]` |
//! | weighted accuracy | mean of `correcta(0/1)` |
//! | mean latency | mean of `tiempo_ms` |
//!
//! Empty or unparsable labels count as 0. A decimal comma (`0,5`) is accepted.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::eval::ARTIFACT_PREFIX;

/// Group used for rows from artifacts without an `indice` column.
pub const NO_INDEX: &str = "no_index";

const CORRECT_COLUMN: &str = "correcta(0/1)";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupStats {
    pub count: usize,
    pub exact: usize,
    pub partial: usize,
    pub equivalent_sum: f64,
    pub latency_sum_ms: f64,
}

impl GroupStats {
    fn add(&mut self, correct: f64, latency_ms: f64) {
        self.count += 1;
        if correct >= 0.999 {
            self.exact += 1;
        } else if (0.49..=0.51).contains(&correct) {
            self.partial += 1;
        }
        self.equivalent_sum += correct;
        self.latency_sum_ms += latency_ms;
    }

    /// Percentage of rows marked fully correct.
    pub fn exact_rate(&self) -> f64 {
        self.percent(self.exact as f64)
    }

    /// Mean correctness as a percentage, partial rows weighing 0.5.
    pub fn weighted_accuracy(&self) -> f64 {
        self.percent(self.equivalent_sum)
    }

    pub fn mean_latency_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.latency_sum_ms / self.count as f64
        }
    }

    fn percent(&self, value: f64) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            value / self.count as f64 * 100.0
        }
    }

    fn render(&self, out: &mut String, indent: &str) {
        let _ = writeln!(out, "{}Questions: {}", indent, self.count);
        let _ = writeln!(
            out,
            "{}Exact: {}/{} ({:.1}%)",
            indent,
            self.exact,
            self.count,
            self.exact_rate()
        );
        let _ = writeln!(out, "{}Partial (0.5): {}", indent, self.partial);
        let _ = writeln!(
            out,
            "{}Weighted accuracy: {:.1}%",
            indent,
            self.weighted_accuracy()
        );
        let _ = writeln!(out, "{}Mean latency: {:.0} ms", indent, self.mean_latency_ms());
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScoreReport {
    pub files: Vec<PathBuf>,
    pub global: GroupStats,
    pub by_generation: BTreeMap<String, GroupStats>,
}

impl ScoreReport {
    pub fn render(&self) -> String {
        let mut out = String::new();
        for file in &self.files {
            let _ = writeln!(out, "File: {}", file.display());
        }
        out.push_str("\n== GLOBAL ==\n");
        self.global.render(&mut out, "");

        let only_unindexed =
            self.by_generation.len() == 1 && self.by_generation.contains_key(NO_INDEX);
        if !self.by_generation.is_empty() && !only_unindexed {
            out.push_str("\n== BY GENERATION ==\n");
            for (generation, stats) in &self.by_generation {
                let _ = writeln!(out, "- {}", generation);
                stats.render(&mut out, "  ");
            }
        }
        out
    }
}

/// Parse a correctness or latency cell. Anything unusable is 0.
pub fn parse_number(value: Option<&str>) -> f64 {
    let Some(raw) = value else {
        return 0.0;
    };
    let cleaned = raw.trim().replace(',', ".");
    if cleaned.is_empty() {
        return 0.0;
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Score one or more artifacts together.
pub fn score_artifacts(paths: &[PathBuf]) -> Result<ScoreReport> {
    let mut report = ScoreReport {
        files: paths.to_vec(),
        ..Default::default()
    };

    for path in paths {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open artifact: {}", path.display()))?;

        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h.trim() == name);
        let indice_col = column("indice");
        let correct_col = column(CORRECT_COLUMN);
        let latency_col = column("tiempo_ms");

        for record in reader.records() {
            let record = record.with_context(|| format!("Bad row in {}", path.display()))?;
            let cell = |col: Option<usize>| col.and_then(|i| record.get(i));

            let group = cell(indice_col)
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .unwrap_or(NO_INDEX)
                .to_string();
            let correct = parse_number(cell(correct_col));
            let latency = parse_number(cell(latency_col));

            report.global.add(correct, latency);
            report.by_generation.entry(group).or_default().add(correct, latency);
        }
    }

    Ok(report)
}

/// The newest `resultados_*.csv` in `dir`, falling back to `resultados.csv`.
pub fn latest_artifact(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut artifacts: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(ARTIFACT_PREFIX) && n.ends_with(".csv"))
                    .unwrap_or(false)
        })
        .collect();
    artifacts.sort();

    artifacts.pop().or_else(|| {
        let fallback = dir.join("resultados.csv");
        fallback.is_file().then_some(fallback)
    })
}
