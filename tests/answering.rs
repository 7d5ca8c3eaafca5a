mod common;

use std::fs;
use std::sync::Arc;

use common::{sample_chunks, FakeChat, HashEmbedder};
use docent::answer::{format_answer, AnswerOptions, Orchestrator};
use docent::error::{ErrorKind, ProviderError, AUTH_MESSAGE, QUOTA_MESSAGE};
use docent::eval::{read_questions, run_evaluation, Question};
use docent::index::IndexManager;
use docent::llm::Role;
use docent::score::score_artifacts;
use docent::search::SearchMode;
use tempfile::TempDir;

fn opts() -> AnswerOptions {
    AnswerOptions {
        k: 2,
        temperature: 0.1,
        model: None,
        mode: SearchMode::Similarity,
        generation: None,
    }
}

async fn built_index(tmp: &TempDir) -> IndexManager {
    let manager = IndexManager::new(tmp.path().join("index"));
    manager
        .build(&sample_chunks(), &HashEmbedder::new())
        .await
        .unwrap();
    manager
}

#[tokio::test]
async fn answers_with_grounded_prompt_and_sources() {
    let tmp = TempDir::new().unwrap();
    let manager = built_index(&tmp).await;
    let chat = Arc::new(FakeChat::replying("Hold the button for ten seconds [manual.pdf p.4]."));
    let orchestrator = Orchestrator::new(
        manager,
        Arc::new(HashEmbedder::new()),
        chat.clone(),
        "test-model",
    );

    let record = orchestrator
        .answer("How do I reset the router?", &opts())
        .await
        .unwrap();
    assert!(!record.is_degraded());
    assert_eq!(record.sources.len(), 2);
    assert_eq!(record.sources[0].chunk.id, "c2");

    let seen = chat.seen.lock().unwrap();
    let messages = &seen[0];
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].role, Role::User);
    assert!(messages[1].content.starts_with("Context:\nTo reset the router"));
    assert!(messages[1].content.ends_with("Question:\nHow do I reset the router?"));

    let rendered = format_answer(&record);
    assert!(rendered.contains("[1] manual.pdf (pag. 4)"));
}

#[tokio::test]
async fn provider_failures_degrade_instead_of_failing() {
    fn quota() -> ProviderError {
        ProviderError::Quota("429 Too Many Requests".into())
    }
    fn auth() -> ProviderError {
        ProviderError::Auth("401 invalid key".into())
    }
    fn generic() -> ProviderError {
        ProviderError::Generic("500 upstream exploded".into())
    }
    let cases: [(fn() -> ProviderError, ErrorKind); 3] = [
        (quota, ErrorKind::ProviderQuota),
        (auth, ErrorKind::ProviderAuth),
        (generic, ErrorKind::ProviderGeneric),
    ];

    for (err, kind) in cases {
        let tmp = TempDir::new().unwrap();
        let manager = built_index(&tmp).await;
        let orchestrator = Orchestrator::new(
            manager,
            Arc::new(HashEmbedder::new()),
            Arc::new(FakeChat::failing(err)),
            "m",
        );

        let record = orchestrator.answer("anything", &opts()).await.unwrap();
        assert_eq!(record.error, Some(kind));
        assert!(record.sources.is_empty());
        assert!(!record.answer.trim().is_empty());
        assert!(format_answer(&record).contains("No context documents were found."));

        match kind {
            ErrorKind::ProviderQuota => assert_eq!(record.answer, QUOTA_MESSAGE),
            ErrorKind::ProviderAuth => assert_eq!(record.answer, AUTH_MESSAGE),
            _ => assert!(record.answer.contains("upstream exploded")),
        }
    }
}

#[tokio::test]
async fn query_embedding_failure_degrades() {
    let tmp = TempDir::new().unwrap();
    let manager = built_index(&tmp).await;
    let orchestrator = Orchestrator::new(
        manager,
        Arc::new(HashEmbedder::failing(|| {
            ProviderError::Generic("connection reset".into())
        })),
        Arc::new(FakeChat::replying("never used")),
        "m",
    );

    let record = orchestrator.answer("anything", &opts()).await.unwrap();
    assert_eq!(record.error, Some(ErrorKind::ProviderGeneric));
    assert!(record.answer.contains("connection reset"));
}

#[tokio::test]
async fn missing_index_and_missing_credentials_propagate() {
    let tmp = TempDir::new().unwrap();
    let orchestrator = Orchestrator::new(
        IndexManager::new(tmp.path().join("index")),
        Arc::new(HashEmbedder::new()),
        Arc::new(FakeChat::replying("x")),
        "m",
    );
    let err = orchestrator.answer("q", &opts()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let manager = built_index(&tmp).await;
    let orchestrator = Orchestrator::new(
        manager,
        Arc::new(HashEmbedder::new()),
        Arc::new(FakeChat::unconfigured()),
        "m",
    );
    let err = orchestrator.answer("q", &opts()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn corrupt_store_degrades_as_unclassified() {
    let tmp = TempDir::new().unwrap();
    let manager = built_index(&tmp).await;
    let generation = manager.latest_generation().unwrap().unwrap();
    fs::write(
        manager.generation_dir(&generation).join("store.sqlite"),
        vec![0xAB_u8; 8192],
    )
    .unwrap();

    let orchestrator = Orchestrator::new(
        manager,
        Arc::new(HashEmbedder::new()),
        Arc::new(FakeChat::replying("never used")),
        "m",
    );
    let record = orchestrator.answer("anything", &opts()).await.unwrap();
    assert_eq!(record.error, Some(ErrorKind::Unclassified));
    assert!(record.sources.is_empty());
    assert!(!record.answer.trim().is_empty());
}

#[tokio::test]
async fn store_failure_after_load_degrades_as_unclassified() {
    let tmp = TempDir::new().unwrap();
    let manager = built_index(&tmp).await;
    let generation = manager.latest_generation().unwrap().unwrap();

    let pool = docent::db::connect(
        &manager.generation_dir(&generation).join("store.sqlite"),
        false,
    )
    .await
    .unwrap();
    sqlx::query("DROP TABLE chunks").execute(&pool).await.unwrap();
    pool.close().await;

    let chat = Arc::new(FakeChat::replying("never used"));
    let orchestrator = Orchestrator::new(
        manager,
        Arc::new(HashEmbedder::new()),
        chat.clone(),
        "m",
    );
    let record = orchestrator.answer("battery life", &opts()).await.unwrap();
    assert_eq!(record.error, Some(ErrorKind::Unclassified));
    assert_eq!(record.generation, Some(generation));
    assert!(record.sources.is_empty());
    assert!(chat.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_model_reply_is_replaced() {
    let tmp = TempDir::new().unwrap();
    let orchestrator = Orchestrator::new(
        built_index(&tmp).await,
        Arc::new(HashEmbedder::new()),
        Arc::new(FakeChat::replying("   ")),
        "m",
    );
    let record = orchestrator.answer("battery life", &opts()).await.unwrap();
    assert!(!record.answer.trim().is_empty());
}

#[tokio::test]
async fn evaluation_run_then_score() {
    let tmp = TempDir::new().unwrap();
    let manager = built_index(&tmp).await;
    let generation = manager.latest_generation().unwrap().unwrap();
    let orchestrator = Orchestrator::new(
        manager,
        Arc::new(HashEmbedder::new()),
        Arc::new(FakeChat::replying("An answer.")),
        "m",
    );

    let questions_path = tmp.path().join("preguntas.csv");
    fs::write(
        &questions_path,
        "id,pregunta\nq1,How long is the warranty?\nq2,How do I reset the router?\nq3,Is shipping free?\nq4,What is the battery life?\n",
    )
    .unwrap();
    let questions = read_questions(&questions_path).unwrap();

    let mut trace: Vec<String> = Vec::new();
    let eval_dir = tmp.path().join("eval");
    let run = run_evaluation(
        &orchestrator,
        &questions,
        &eval_dir,
        &opts(),
        |q: &Question, _record, _ms| trace.push(q.id.clone()),
    )
    .await
    .unwrap();

    assert_eq!(trace, vec!["q1", "q2", "q3", "q4"]);
    assert_eq!(run.generation, generation);
    assert_eq!(run.rows.len(), 4);
    assert!(run.artifact.exists());
    assert!(run
        .artifact
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("resultados_"));

    let first = &run.rows[0];
    assert_eq!(first.indice, generation.to_string());
    assert!(first.tiempo_ms.parse::<u64>().is_ok());
    assert!(first.fuentes_json.starts_with(r#"[{"i":1,"archivo":""#));
    assert!(first.correcta.is_empty());

    // Label the run by hand: 1, 1, 0.5, 0.
    let mut reader = csv::Reader::from_path(&run.artifact).unwrap();
    let headers = reader.headers().unwrap().clone();
    let mut writer = csv::Writer::from_path(tmp.path().join("labelled.csv")).unwrap();
    writer.write_record(&headers).unwrap();
    for (record, label) in reader.records().zip(["1", "1", "0,5", "0"]) {
        let mut fields: Vec<String> = record.unwrap().iter().map(str::to_string).collect();
        fields[6] = label.to_string();
        writer.write_record(&fields).unwrap();
    }
    writer.flush().unwrap();
    drop(writer);

    let report = score_artifacts(&[tmp.path().join("labelled.csv")]).unwrap();
    assert_eq!(report.global.count, 4);
    assert!((report.global.exact_rate() - 50.0).abs() < 1e-9);
    assert_eq!(report.global.partial, 1);
    assert!((report.global.weighted_accuracy() - 62.5).abs() < 1e-9);
    assert_eq!(report.by_generation.len(), 1);
    assert!(report.by_generation.contains_key(generation.as_str()));
}

#[tokio::test]
async fn evaluation_without_index_aborts() {
    let tmp = TempDir::new().unwrap();
    let orchestrator = Orchestrator::new(
        IndexManager::new(tmp.path().join("index")),
        Arc::new(HashEmbedder::new()),
        Arc::new(FakeChat::replying("x")),
        "m",
    );
    let questions = vec![Question {
        id: "q1".into(),
        pregunta: "anything".into(),
    }];

    let eval_dir = tmp.path().join("eval");
    let err = run_evaluation(&orchestrator, &questions, &eval_dir, &opts(), |_, _, _| {})
        .await
        .unwrap_err();
    assert!(err.to_string().contains("docent index build"));
    assert!(!eval_dir.exists());
}
