//! # docent CLI
//!
//! Grounded question answering over a folder of PDFs.
//!
//! ## Usage
//!
//! ```bash
//! docent --config ./config/docent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docent ingest` | Extract and split raw documents, write the chunk preview |
//! | `docent index build` | Ingest, then build a new index generation |
//! | `docent index list` | List index generations and their chunk counts |
//! | `docent ask "<question>"` | Answer a question from the latest generation |
//! | `docent eval run` | Replay the question set and write a run artifact |
//! | `docent eval score [FILES...]` | Aggregate labelled run artifacts |
//! | `docent completions <shell>` | Print a shell completion script |

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use docent::answer::{format_answer, AnswerOptions, Orchestrator};
use docent::config::{self, Config};
use docent::embedding::create_embedder;
use docent::eval;
use docent::index::{GenerationId, IndexManager};
use docent::ingest;
use docent::score;
use docent::search::SearchMode;

/// docent — answer questions from your documents, with page citations.
///
/// All commands read settings from a TOML configuration file given by
/// `--config`. See `config/docent.example.toml` for every option.
#[derive(Parser)]
#[command(name = "docent", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and split raw documents and write `processed/chunks_preview.txt`.
    Ingest,

    /// Manage index generations.
    Index {
        #[command(subcommand)]
        action: IndexAction,
    },

    /// Answer a question from an index generation.
    Ask {
        question: String,

        /// Number of chunks to retrieve.
        #[arg(long)]
        k: Option<usize>,

        /// Sampling temperature for the chat model (0.0 to 2.0).
        #[arg(long)]
        temperature: Option<f32>,

        /// Chat model; defaults to `[llm].model`.
        #[arg(long)]
        model: Option<String>,

        /// Retrieval mode: `similarity` or `diverse`.
        #[arg(long)]
        mode: Option<SearchMode>,

        /// Generation to query, e.g. `index_20250301_101500`. Latest by default.
        #[arg(long)]
        index: Option<GenerationId>,
    },

    /// Evaluation runs and scoring.
    Eval {
        #[command(subcommand)]
        action: EvalAction,
    },

    /// Print a shell completion script to stdout.
    Completions { shell: Shell },
}

#[derive(Subcommand)]
enum IndexAction {
    /// Ingest raw documents and build a new generation from them.
    Build,
    /// List generations, oldest first.
    List,
}

#[derive(Subcommand)]
enum EvalAction {
    /// Answer every question in the question set and save a run artifact.
    Run {
        /// Question set CSV (`id,pregunta`); defaults to `[eval].questions`.
        #[arg(long)]
        questions: Option<PathBuf>,
        #[arg(long)]
        k: Option<usize>,
        #[arg(long)]
        temperature: Option<f32>,
        #[arg(long)]
        mode: Option<SearchMode>,
    },
    /// Aggregate run artifacts; the newest one in `[eval].dir` by default.
    Score { files: Vec<PathBuf> },
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "docent", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ingest => {
            let chunks = ingest::run_ingest(&cfg)?;
            println!(
                "Ingested {} chunks. Preview: {}",
                chunks.len(),
                cfg.storage.preview_path().display()
            );
        }
        Commands::Index { action } => match action {
            IndexAction::Build => run_index_build(&cfg).await?,
            IndexAction::List => run_index_list(&cfg)?,
        },
        Commands::Ask {
            question,
            k,
            temperature,
            model,
            mode,
            index,
        } => {
            let defaults = AnswerOptions::from_config(&cfg);
            let opts = AnswerOptions {
                k: k.unwrap_or(defaults.k),
                temperature: temperature.unwrap_or(defaults.temperature),
                model,
                mode: mode.unwrap_or(defaults.mode),
                generation: index,
            };
            check_options(&opts)?;

            let orchestrator = Orchestrator::from_config(&cfg)?;
            let record = orchestrator.answer(&question, &opts).await?;
            println!("{}", format_answer(&record));
        }
        Commands::Eval { action } => match action {
            EvalAction::Run {
                questions,
                k,
                temperature,
                mode,
            } => {
                let opts = AnswerOptions {
                    k: k.unwrap_or(cfg.eval.k),
                    temperature: temperature.unwrap_or(cfg.eval.temperature),
                    model: None,
                    mode: mode.unwrap_or(cfg.eval.mode),
                    generation: None,
                };
                check_options(&opts)?;
                let path = questions.unwrap_or_else(|| cfg.eval.questions_path());
                run_eval(&cfg, &path, &opts).await?;
            }
            EvalAction::Score { files } => {
                let files = if files.is_empty() {
                    let latest = score::latest_artifact(&cfg.eval.dir).with_context(|| {
                        format!(
                            "No run artifact found in {}. Run `docent eval run` first.",
                            cfg.eval.dir.display()
                        )
                    })?;
                    vec![latest]
                } else {
                    files
                };
                let report = score::score_artifacts(&files)?;
                print!("{}", report.render());
            }
        },
        Commands::Completions { .. } => {}
    }

    Ok(())
}

fn check_options(opts: &AnswerOptions) -> anyhow::Result<()> {
    if opts.k < 1 {
        anyhow::bail!("--k must be >= 1");
    }
    if !(0.0..=2.0).contains(&opts.temperature) {
        anyhow::bail!("--temperature must be in [0.0, 2.0]");
    }
    Ok(())
}

async fn run_index_build(cfg: &Config) -> anyhow::Result<()> {
    let chunks = ingest::run_ingest(cfg)?;
    let embedder = create_embedder(cfg)?;
    let manager = IndexManager::new(cfg.storage.index_dir());
    let id = manager.build(&chunks, embedder.as_ref()).await?;
    println!(
        "Built {} ({} chunks) in {}",
        id,
        chunks.len(),
        manager.generation_dir(&id).display()
    );
    Ok(())
}

fn run_index_list(cfg: &Config) -> anyhow::Result<()> {
    let manager = IndexManager::new(cfg.storage.index_dir());
    let generations = manager.list_generations()?;
    if generations.is_empty() {
        println!(
            "No index generations in {}. Run `docent index build`.",
            manager.root().display()
        );
        return Ok(());
    }

    let latest = generations.last().cloned();
    for id in &generations {
        let manifest = manager.manifest(id)?;
        let (count, model) = match &manifest {
            Some(m) => (m.chunk_count, m.embed_model.as_str()),
            None => (0, "-"),
        };
        let marker = if Some(id) == latest.as_ref() {
            "  (latest)"
        } else {
            ""
        };
        println!("{}  {:>6} chunks  {}{}", id, count, model, marker);
    }
    Ok(())
}

async fn run_eval(cfg: &Config, questions_path: &Path, opts: &AnswerOptions) -> anyhow::Result<()> {
    let questions = eval::read_questions(questions_path)?;
    let orchestrator = Orchestrator::from_config(cfg)?;

    let run = eval::run_evaluation(
        &orchestrator,
        &questions,
        &cfg.eval.dir,
        opts,
        |question, record, elapsed_ms| {
            println!("\n[{}] {}", question.id, question.pregunta);
            println!("{}", format_answer(record));
            println!("[TIME] {:.0} ms", elapsed_ms);
        },
    )
    .await?;

    println!("\n[SUMMARY]");
    println!("Generation: {}", run.generation);
    println!("Questions: {}", run.rows.len());
    println!("Mean latency: {:.0} ms", run.mean_latency_ms);
    println!("Saved: {}", run.artifact.display());
    Ok(())
}
