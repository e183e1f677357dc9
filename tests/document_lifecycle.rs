//! End-to-end tests for upload, dedup, sharing, deletion, and the summary
//! lifecycle, driven through the library API with a stub language model.

mod common;

use common::{count, setup, setup_with_max_chars, txt_upload, StubModel};
use docshelf::error::Error;
use docshelf::ingest::{self, Upload};
use docshelf::ledger;
use docshelf::llm::DisabledModel;
use docshelf::models::DocumentRemoval;
use docshelf::summary;
use docshelf::users::provision_user;
use docshelf::extract::BuiltinExtractor;

const LONG_TEXT: &str = "Consensus protocols coordinate replicated state machines across \
unreliable networks. Leader election establishes a single writer per term. Log replication \
carries ordered commands to every follower. Safety holds as long as a majority of nodes \
agree on each committed entry. Snapshots bound log growth and speed up recovery after \
restarts. Membership changes use joint consensus to avoid split brain.";

#[tokio::test]
async fn test_upload_persists_document_chunks_and_ledger_entry() {
    let env = setup().await;
    provision_user(&env.pool, "alice").await.unwrap();

    let outcome = ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "alice",
        txt_upload("raft.txt", LONG_TEXT),
    )
    .await
    .unwrap();

    assert!(!outcome.reused);
    assert!(outcome.total_chunks >= 1);
    assert_eq!(count(&env.pool, "SELECT COUNT(*) FROM documents").await, 1);
    assert_eq!(
        count(&env.pool, "SELECT COUNT(*) FROM user_documents").await,
        1
    );
    // Attributes came from the stub model
    let page = ledger::list_all(&env.pool, "alice", 1, 5).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].metadata.topic.as_deref(), Some("distributed systems"));
    // Filed under the root folder
    let entry = ledger::find_entry(&env.pool, "alice", &outcome.document_id)
        .await
        .unwrap()
        .unwrap();
    assert!(entry.folder_id.is_some());
    assert!(!entry.is_favorite);
}

#[tokio::test]
async fn test_duplicate_upload_same_user_conflicts() {
    let env = setup().await;
    provision_user(&env.pool, "alice").await.unwrap();

    ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "alice",
        txt_upload("raft.txt", LONG_TEXT),
    )
    .await
    .unwrap();

    let err = ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "alice",
        txt_upload("raft-again.txt", LONG_TEXT),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Conflict(_)), "got {:?}", err);
    assert_eq!(count(&env.pool, "SELECT COUNT(*) FROM documents").await, 1);
    assert_eq!(
        count(&env.pool, "SELECT COUNT(*) FROM user_documents").await,
        1
    );
}

#[tokio::test]
async fn test_same_bytes_from_second_user_reuses_document() {
    let env = setup().await;
    provision_user(&env.pool, "alice").await.unwrap();
    provision_user(&env.pool, "bob").await.unwrap();

    let first = ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "alice",
        txt_upload("raft.txt", LONG_TEXT),
    )
    .await
    .unwrap();

    let chunks_before = count(&env.pool, "SELECT COUNT(*) FROM chunks").await;

    let second = ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "bob",
        txt_upload("raft-copy.txt", LONG_TEXT),
    )
    .await
    .unwrap();

    assert!(second.reused);
    assert_eq!(second.document_id, first.document_id);
    // No new chunks, no new document row
    assert_eq!(count(&env.pool, "SELECT COUNT(*) FROM documents").await, 1);
    assert_eq!(
        count(&env.pool, "SELECT COUNT(*) FROM chunks").await,
        chunks_before
    );
    assert_eq!(
        count(&env.pool, "SELECT COUNT(*) FROM user_documents").await,
        2
    );

    let bob_entry = ledger::find_entry(&env.pool, "bob", &first.document_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!bob_entry.is_favorite);
}

#[tokio::test]
async fn test_rename_and_favorite_are_per_user() {
    let env = setup().await;
    provision_user(&env.pool, "alice").await.unwrap();
    provision_user(&env.pool, "bob").await.unwrap();

    let doc = ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "alice",
        txt_upload("raft.txt", LONG_TEXT),
    )
    .await
    .unwrap();
    ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "bob",
        txt_upload("raft.txt", LONG_TEXT),
    )
    .await
    .unwrap();

    ledger::rename(&env.pool, "alice", &doc.document_id, "My Raft Notes")
        .await
        .unwrap();
    ledger::toggle_favorite(&env.pool, "alice", &doc.document_id)
        .await
        .unwrap();

    let alice_view = ledger::list_all(&env.pool, "alice", 1, 5).await.unwrap();
    let bob_view = ledger::list_all(&env.pool, "bob", 1, 5).await.unwrap();

    assert_eq!(alice_view.items[0].title.as_deref(), Some("My Raft Notes"));
    assert!(alice_view.items[0].is_favorite);
    assert_eq!(bob_view.items[0].title.as_deref(), Some("raft.txt"));
    assert!(!bob_view.items[0].is_favorite);
}

#[tokio::test]
async fn test_delete_keeps_shared_document_until_last_holder() {
    let env = setup().await;
    provision_user(&env.pool, "alice").await.unwrap();
    provision_user(&env.pool, "bob").await.unwrap();

    let doc = ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "alice",
        txt_upload("raft.txt", LONG_TEXT),
    )
    .await
    .unwrap();
    ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "bob",
        txt_upload("raft.txt", LONG_TEXT),
    )
    .await
    .unwrap();

    // Each user gets their own summary over the shared chunks
    summary::create_summary(&env.pool, &env.config, &StubModel, "alice", &doc.document_id)
        .await
        .unwrap();
    let bob_summary =
        summary::create_summary(&env.pool, &env.config, &StubModel, "bob", &doc.document_id)
            .await
            .unwrap();

    let removal = ingest::delete_document(&env.pool, "alice", &doc.document_id)
        .await
        .unwrap();
    assert_eq!(removal, DocumentRemoval::LibraryOnly);

    // Shared rows intact, Bob's summary intact, Alice's summary collected
    assert_eq!(count(&env.pool, "SELECT COUNT(*) FROM documents").await, 1);
    assert!(count(&env.pool, "SELECT COUNT(*) FROM chunks").await > 0);
    assert_eq!(count(&env.pool, "SELECT COUNT(*) FROM summaries").await, 1);
    let bob_view = summary::get_summary(&env.pool, "bob", &doc.document_id)
        .await
        .unwrap();
    assert_eq!(bob_view.id, bob_summary.id);

    // Alice can no longer see the document
    let err = ingest::delete_document(&env.pool, "alice", &doc.document_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));

    let removal = ingest::delete_document(&env.pool, "bob", &doc.document_id)
        .await
        .unwrap();
    assert_eq!(removal, DocumentRemoval::Purged);

    assert_eq!(count(&env.pool, "SELECT COUNT(*) FROM documents").await, 0);
    assert_eq!(count(&env.pool, "SELECT COUNT(*) FROM chunks").await, 0);
    assert_eq!(
        count(&env.pool, "SELECT COUNT(*) FROM document_chunks").await,
        0
    );
    assert_eq!(count(&env.pool, "SELECT COUNT(*) FROM summaries").await, 0);
}

#[tokio::test]
async fn test_purge_removes_stored_file() {
    let env = setup().await;
    provision_user(&env.pool, "alice").await.unwrap();

    let doc = ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "alice",
        txt_upload("raft.txt", LONG_TEXT),
    )
    .await
    .unwrap();

    let file_ref = doc.file_ref.clone().unwrap();
    assert!(std::path::Path::new(&file_ref).exists());

    ingest::delete_document(&env.pool, "alice", &doc.document_id)
        .await
        .unwrap();
    assert!(!std::path::Path::new(&file_ref).exists());
}

#[tokio::test]
async fn test_chunk_concatenation_reproduces_word_sequence() {
    let env = setup_with_max_chars(80).await;
    provision_user(&env.pool, "alice").await.unwrap();

    let doc = ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "alice",
        txt_upload("raft.txt", LONG_TEXT),
    )
    .await
    .unwrap();
    assert!(doc.total_chunks >= 3, "expected a multi-chunk document");

    let texts: Vec<String> = sqlx::query_scalar(
        "SELECT c.chunk_text FROM chunks c \
         JOIN document_chunks dc ON dc.chunk_id = c.id \
         WHERE dc.document_id = ? ORDER BY c.chunk_index ASC",
    )
    .bind(&doc.document_id)
    .fetch_all(&env.pool)
    .await
    .unwrap();

    let rejoined = texts.join(" ");
    let original_words: Vec<&str> = LONG_TEXT.split_whitespace().collect();
    let rejoined_words: Vec<&str> = rejoined.split_whitespace().collect();
    assert_eq!(original_words, rejoined_words);
}

#[tokio::test]
async fn test_summary_lifecycle() {
    let env = setup_with_max_chars(80).await;
    provision_user(&env.pool, "alice").await.unwrap();

    let doc = ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "alice",
        txt_upload("raft.txt", LONG_TEXT),
    )
    .await
    .unwrap();
    assert!(doc.total_chunks >= 3);

    // Refresh before create fails
    let err = summary::refresh_summary(&env.pool, &env.config, &StubModel, "alice", &doc.document_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));

    let created =
        summary::create_summary(&env.pool, &env.config, &StubModel, "alice", &doc.document_id)
            .await
            .unwrap();
    assert!(!created.summary_text.is_empty());

    // Second create fails; caller must refresh
    let err = summary::create_summary(&env.pool, &env.config, &StubModel, "alice", &doc.document_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));

    let refreshed =
        summary::refresh_summary(&env.pool, &env.config, &StubModel, "alice", &doc.document_id)
            .await
            .unwrap();
    assert_eq!(refreshed.id, created.id);
    assert!(!refreshed.summary_text.is_empty());

    summary::delete_summary(&env.pool, "alice", &doc.document_id)
        .await
        .unwrap();
    assert_eq!(count(&env.pool, "SELECT COUNT(*) FROM summaries").await, 0);

    let err = summary::refresh_summary(&env.pool, &env.config, &StubModel, "alice", &doc.document_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn test_diagram_cached_until_refresh() {
    let env = setup().await;
    provision_user(&env.pool, "alice").await.unwrap();

    let doc = ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "alice",
        txt_upload("raft.txt", LONG_TEXT),
    )
    .await
    .unwrap();

    // Diagram without a summary fails
    let err = summary::generate_diagram(&env.pool, &env.config, &StubModel, "alice", &doc.document_id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));

    summary::create_summary(&env.pool, &env.config, &StubModel, "alice", &doc.document_id)
        .await
        .unwrap();

    let first = summary::generate_diagram(&env.pool, &env.config, &StubModel, "alice", &doc.document_id)
        .await
        .unwrap();
    assert!(!first.is_empty());
    // Blank lines are dropped, indentation preserved
    assert!(first.iter().all(|line| !line.trim().is_empty()));

    let cached = summary::get_summary(&env.pool, "alice", &doc.document_id)
        .await
        .unwrap();
    assert_eq!(cached.diagram.as_deref(), Some(first.as_slice()));

    // Refresh invalidates the cached diagram
    summary::refresh_summary(&env.pool, &env.config, &StubModel, "alice", &doc.document_id)
        .await
        .unwrap();
    let after_refresh = summary::get_summary(&env.pool, "alice", &doc.document_id)
        .await
        .unwrap();
    assert!(after_refresh.diagram.is_none());
}

#[tokio::test]
async fn test_upload_rejects_empty_file_and_unknown_type() {
    let env = setup().await;
    provision_user(&env.pool, "alice").await.unwrap();

    let err = ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "alice",
        Upload {
            file_name: "empty.txt".to_string(),
            title: None,
            folder_id: None,
            bytes: Vec::new(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));

    let err = ingest::upload_document(
        &env.pool,
        &env.config,
        &StubModel,
        &BuiltinExtractor,
        "alice",
        txt_upload("payload.bin", "binary-ish"),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}

#[tokio::test]
async fn test_upload_degrades_without_language_model() {
    let env = setup().await;
    provision_user(&env.pool, "alice").await.unwrap();

    // The disabled model reports every call as quota-limited; the pipeline
    // proceeds with empty metadata and a null embedding
    let doc = ingest::upload_document(
        &env.pool,
        &env.config,
        &DisabledModel,
        &BuiltinExtractor,
        "alice",
        txt_upload("raft.txt", LONG_TEXT),
    )
    .await
    .unwrap();

    let page = ledger::list_all(&env.pool, "alice", 1, 5).await.unwrap();
    assert_eq!(page.total, 1);
    assert!(page.items[0].metadata.topic.is_none());

    let vector: Option<Vec<u8>> =
        sqlx::query_scalar("SELECT metadata_vector FROM documents WHERE id = ?")
            .bind(&doc.document_id)
            .fetch_one(&env.pool)
            .await
            .unwrap();
    assert!(vector.is_none());
}

#[tokio::test]
async fn test_pagination_contract() {
    let env = setup().await;
    provision_user(&env.pool, "alice").await.unwrap();

    for i in 0..7 {
        ingest::upload_document(
            &env.pool,
            &env.config,
            &StubModel,
            &BuiltinExtractor,
            "alice",
            txt_upload(
                &format!("doc{}.txt", i),
                &format!("{} variant {}", LONG_TEXT, i),
            ),
        )
        .await
        .unwrap();
    }

    let page1 = ledger::list_all(&env.pool, "alice", 1, 3).await.unwrap();
    assert_eq!(page1.total, 7);
    assert_eq!(page1.total_pages, 3);
    assert_eq!(page1.items.len(), 3);

    let page3 = ledger::list_all(&env.pool, "alice", 3, 3).await.unwrap();
    assert_eq!(page3.items.len(), 1);

    let err = ledger::list_all(&env.pool, "alice", 0, 3).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
}
