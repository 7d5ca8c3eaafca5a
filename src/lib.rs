//! # docent
//!
//! Grounded question answering over a local document collection.
//!
//! docent extracts per-page text from raw documents, splits it into
//! overlapping chunks, embeds the chunks into timestamp-named index
//! generations, and answers questions with a chat model restricted to the
//! retrieved context. Answers cite the file and page of every source. An
//! evaluation harness replays a fixed question set and scores labelled runs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌──────────────┐   ┌────────────┐
//! │  Loader  │──▶│ Chunker  │──▶│ IndexManager │──▶│ index_<ts>/│
//! │ PDF/text │   │ overlap  │   │   (embed)    │   │  SQLite    │
//! └──────────┘   └──────────┘   └──────────────┘   └─────┬──────┘
//!                                                        │
//!                          ┌─────────────────────────────┤
//!                          ▼                             ▼
//!                   ┌─────────────┐              ┌──────────────┐
//!                   │ Orchestrator│◀─────────────│   Retriever  │
//!                   │  (chat LLM) │              │ similarity/  │
//!                   └──────┬──────┘              │     MMR      │
//!                          ▼                     └──────────────┘
//!                   ask / eval run
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docent index build                  # ingest data/raw and embed it
//! docent ask "What does chapter 2 cover?" --mode diverse
//! docent eval run                     # replay eval/preguntas.csv
//! docent eval score                   # score the newest labelled run
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`extract`] | Per-page text extraction strategies |
//! | [`loader`] | Document discovery and page normalization |
//! | [`chunk`] | Recursive text splitting |
//! | [`ingest`] | Load → split → preview pipeline |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat provider abstraction |
//! | [`index`] | Versioned index generations |
//! | [`search`] | Similarity and MMR retrieval |
//! | [`answer`] | Grounded answering and formatting |
//! | [`eval`] | Evaluation runs |
//! | [`score`] | Run artifact aggregation |
//! | [`db`] | Store connection |
//! | [`migrate`] | Store schema |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod eval;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod score;
pub mod search;
