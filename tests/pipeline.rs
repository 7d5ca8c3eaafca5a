mod common;

use std::fs;
use std::sync::atomic::Ordering;

use common::{sample_chunks, two_page_pdf, HashEmbedder};
use docent::chunk::split;
use docent::error::{ErrorKind, ProviderError, RagError};
use docent::index::IndexManager;
use docent::loader::Loader;
use docent::search::{query, SearchMode};
use tempfile::TempDir;

fn manager() -> (TempDir, IndexManager) {
    let tmp = TempDir::new().unwrap();
    let manager = IndexManager::new(tmp.path().join("index"));
    (tmp, manager)
}

#[tokio::test]
async fn load_without_any_build_is_not_found() {
    let (_tmp, manager) = manager();
    let err = manager
        .load(None, common::shared(HashEmbedder::new()))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("docent index build"));
}

#[tokio::test]
async fn build_then_load_latest() {
    let (_tmp, manager) = manager();
    let embedder = common::shared(HashEmbedder::new());

    let id = manager.build(&sample_chunks(), embedder.as_ref()).await.unwrap();
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    assert_eq!(manager.latest_generation().unwrap(), Some(id.clone()));

    let manifest = manager.manifest(&id).unwrap().unwrap();
    assert_eq!(manifest.chunk_count, 4);
    assert_eq!(manifest.dims, common::DIMS);
    assert_eq!(manifest.embed_model, "hash-1024");

    let handle = manager.load(None, embedder.clone()).await.unwrap();
    assert_eq!(handle.id(), &id);
    assert_eq!(handle.count().await.unwrap(), 4);
    handle.close().await;
}

#[tokio::test]
async fn empty_build_still_allocates_a_generation() {
    let (_tmp, manager) = manager();
    let embedder = common::shared(HashEmbedder::new());

    let id = manager.build(&[], embedder.as_ref()).await.unwrap();
    assert!(manager.generation_dir(&id).is_dir());
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(manager.latest_generation().unwrap(), Some(id.clone()));
    let manifest = manager.manifest(&id).unwrap().unwrap();
    assert_eq!(manifest.chunk_count, 0);
    assert_eq!(manifest.dims, 0);

    let handle = manager.load(Some(&id), embedder.clone()).await.unwrap();
    assert_eq!(handle.count().await.unwrap(), 0);
    let results = query(&handle, "anything", 4, SearchMode::Similarity)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn build_without_credentials_fails_before_any_request() {
    let (_tmp, manager) = manager();
    let embedder = HashEmbedder::unconfigured();

    let err = manager.build(&sample_chunks(), &embedder).await.unwrap_err();
    assert!(matches!(err, RagError::Configuration(_)));
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    assert!(manager.list_generations().unwrap().is_empty());
}

#[tokio::test]
async fn load_without_credentials_is_configuration_error() {
    let (_tmp, manager) = manager();
    manager
        .build(&sample_chunks(), &HashEmbedder::new())
        .await
        .unwrap();

    let err = manager
        .load(None, common::shared(HashEmbedder::unconfigured()))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn provider_failure_during_build_propagates_and_leaves_nothing() {
    let (_tmp, manager) = manager();
    let embedder = HashEmbedder::failing(|| ProviderError::Quota("429".into()));

    let err = manager.build(&sample_chunks(), &embedder).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProviderQuota);
    assert!(manager.list_generations().unwrap().is_empty());
}

#[tokio::test]
async fn earlier_generation_survives_later_build() {
    let (_tmp, manager) = manager();
    let embedder = common::shared(HashEmbedder::new());
    let chunks = sample_chunks();

    let first = manager.build(&chunks[..2], embedder.as_ref()).await.unwrap();
    let store = manager.generation_dir(&first).join("store.sqlite");
    let before = fs::read(&store).unwrap();

    let second = manager.build(&chunks, embedder.as_ref()).await.unwrap();
    assert_ne!(first, second);
    assert!(first < second);
    assert_eq!(
        manager.list_generations().unwrap(),
        vec![first.clone(), second.clone()]
    );

    assert_eq!(fs::read(&store).unwrap(), before);
    let old = manager.load(Some(&first), embedder.clone()).await.unwrap();
    assert_eq!(old.count().await.unwrap(), 2);
    old.close().await;

    let latest = manager.load(None, embedder.clone()).await.unwrap();
    assert_eq!(latest.id(), &second);
    assert_eq!(latest.count().await.unwrap(), 4);
}

#[tokio::test]
async fn build_in_progress_does_not_shadow_latest() {
    let (_tmp, manager) = manager();
    let embedder = common::shared(HashEmbedder::new());
    let good = manager.build(&sample_chunks(), embedder.as_ref()).await.unwrap();

    // A directory claimed by a build that has not written its manifest yet,
    // or was killed before it could.
    let pending = manager.root().join("index_29991231_235959");
    fs::create_dir(&pending).unwrap();
    fs::write(pending.join("store.sqlite"), b"").unwrap();

    assert_eq!(manager.list_generations().unwrap(), vec![good.clone()]);
    let handle = manager.load(None, embedder.clone()).await.unwrap();
    assert_eq!(handle.id(), &good);
    let results = query(&handle, "how do I reset the router", 2, SearchMode::Similarity)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    handle.close().await;

    let pending_id = "index_29991231_235959".parse().unwrap();
    let err = manager
        .load(Some(&pending_id), embedder.clone())
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn load_with_different_embedding_model_is_rejected() {
    let (_tmp, manager) = manager();
    manager
        .build(&sample_chunks(), &HashEmbedder::new())
        .await
        .unwrap();

    let err = manager
        .load(None, common::shared(HashEmbedder::named("other-16")))
        .await
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    let message = err.to_string();
    assert!(message.contains("hash-1024"), "{}", message);
    assert!(message.contains("other-16"), "{}", message);
}

#[tokio::test]
async fn similarity_ranks_matching_chunk_first() {
    let (_tmp, manager) = manager();
    let embedder = common::shared(HashEmbedder::new());
    manager.build(&sample_chunks(), embedder.as_ref()).await.unwrap();
    let handle = manager.load(None, embedder.clone()).await.unwrap();

    let results = query(&handle, "how do I reset the router", 2, SearchMode::Similarity)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.id, "c2");
    assert_eq!(results[0].chunk.page_display, 4);
    assert_eq!(results[0].rank, 1);
    assert_eq!(results[1].rank, 2);
    assert!(results[0].distance <= results[1].distance);

    let again = query(&handle, "how do I reset the router", 2, SearchMode::Similarity)
        .await
        .unwrap();
    let ids = |r: &docent::models::RetrievalResult| {
        r.iter().map(|c| c.chunk.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&results), ids(&again));
}

#[tokio::test]
async fn k_larger_than_store_returns_everything_once() {
    let (_tmp, manager) = manager();
    let embedder = common::shared(HashEmbedder::new());
    manager.build(&sample_chunks(), embedder.as_ref()).await.unwrap();
    let handle = manager.load(None, embedder.clone()).await.unwrap();

    for mode in [SearchMode::Similarity, SearchMode::Diverse] {
        let results = query(&handle, "battery", 50, mode).await.unwrap();
        assert_eq!(results.len(), 4, "mode {}", mode);
        let mut ids: Vec<_> = results.iter().map(|r| r.chunk.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 4);
    }
}

#[tokio::test]
async fn diverse_mode_returns_k_from_oversampled_pool() {
    let (_tmp, manager) = manager();
    let embedder = common::shared(HashEmbedder::new());
    manager.build(&sample_chunks(), embedder.as_ref()).await.unwrap();
    let handle = manager.load(None, embedder.clone()).await.unwrap();

    let results = query(&handle, "warranty parts", 2, SearchMode::Diverse)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.id, "c1");
}

#[test]
fn two_page_pdf_yields_cited_pages() {
    let tmp = TempDir::new().unwrap();
    let raw = tmp.path().join("raw");
    fs::create_dir_all(&raw).unwrap();
    let pdf = raw.join("guide.pdf");
    fs::write(&pdf, two_page_pdf()).unwrap();

    let loader = Loader::new(&["*.pdf".to_string()]).unwrap();
    let pages = loader.load_documents(&raw);
    assert!(!pages.is_empty());

    let chunks = split(&pages, 1200, 200).unwrap();
    assert!(!chunks.is_empty());

    let resolved = fs::canonicalize(&pdf).unwrap();
    for chunk in &chunks {
        assert_eq!(chunk.source_path, resolved);
        assert!(chunk.page_display == 1 || chunk.page_display == 2);
        assert_eq!(chunk.page_display, chunk.page_index + 1);
    }
    let all_text: String = chunks.iter().map(|c| c.text.as_str()).collect();
    assert!(all_text.contains("phrase"));
}

#[tokio::test]
async fn pdf_to_generation_end_to_end() {
    let tmp = TempDir::new().unwrap();
    let raw = tmp.path().join("raw");
    fs::create_dir_all(&raw).unwrap();
    fs::write(raw.join("guide.pdf"), two_page_pdf()).unwrap();

    let pages = Loader::new(&["*.pdf".to_string()])
        .unwrap()
        .load_documents(&raw);
    let chunks = split(&pages, 1200, 200).unwrap();

    let manager = IndexManager::new(tmp.path().join("index"));
    let embedder = common::shared(HashEmbedder::new());
    let id = manager.build(&chunks, embedder.as_ref()).await.unwrap();

    let handle = manager.load(Some(&id), embedder.clone()).await.unwrap();
    assert_eq!(handle.count().await.unwrap(), chunks.len());
    let results = query(&handle, "page two phrase", 1, SearchMode::Similarity)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.file_name(), "guide.pdf");
}
