//! Library search tests: display-name matching, vector ranking, and the
//! quota degradation path.

mod common;

use common::{setup, txt_upload, StubModel};
use docshelf::extract::BuiltinExtractor;
use docshelf::ingest;
use docshelf::ledger;
use docshelf::llm::DisabledModel;
use docshelf::search;
use docshelf::users::provision_user;

async fn seed_library(env: &common::TestEnv) -> Vec<String> {
    provision_user(&env.pool, "alice").await.unwrap();

    let mut ids = Vec::new();
    for (name, text) in [
        ("consensus.txt", "Raft consensus elects a leader to replicate an ordered log."),
        ("gardening.txt", "Tomatoes grow best with full sun and regular watering."),
        ("queues.txt", "Message queues decouple producers from consumers at scale."),
    ] {
        let doc = ingest::upload_document(
            &env.pool,
            &env.config,
            &StubModel,
            &BuiltinExtractor,
            "alice",
            txt_upload(name, text),
        )
        .await
        .unwrap();
        ids.push(doc.document_id);
    }
    ids
}

#[tokio::test]
async fn test_title_matching_uses_display_name() {
    let env = setup().await;
    let ids = seed_library(&env).await;

    ledger::rename(&env.pool, "alice", &ids[0], "Leadership Elections")
        .await
        .unwrap();

    let results = search::search_documents(&env.pool, &StubModel, "alice", "leadership", 10)
        .await
        .unwrap();
    assert_eq!(results.related_title_documents.len(), 1);
    assert_eq!(results.related_title_documents[0].id, ids[0]);

    // The old filename no longer matches for this user
    let results = search::search_documents(&env.pool, &StubModel, "alice", "consensus.txt", 10)
        .await
        .unwrap();
    assert!(results.related_title_documents.is_empty());
}

#[tokio::test]
async fn test_title_matches_excluded_from_vector_channel() {
    let env = setup().await;
    let ids = seed_library(&env).await;

    let results = search::search_documents(&env.pool, &StubModel, "alice", "queues", 10)
        .await
        .unwrap();
    assert_eq!(results.related_title_documents.len(), 1);
    assert_eq!(results.related_title_documents[0].id, ids[2]);
    assert!(results
        .related_content_documents
        .iter()
        .all(|d| d.id != ids[2]));
}

#[tokio::test]
async fn test_empty_query_skips_vector_search() {
    let env = setup().await;
    seed_library(&env).await;

    let results = search::search_documents(&env.pool, &StubModel, "alice", "   ", 10)
        .await
        .unwrap();
    assert!(results.related_content_documents.is_empty());
}

#[tokio::test]
async fn test_quota_failure_degrades_to_title_results() {
    let env = setup().await;
    let ids = seed_library(&env).await;

    let results = search::search_documents(&env.pool, &DisabledModel, "alice", "gardening", 10)
        .await
        .unwrap();
    assert_eq!(results.related_title_documents.len(), 1);
    assert_eq!(results.related_title_documents[0].id, ids[1]);
    assert!(results.related_content_documents.is_empty());
}

#[tokio::test]
async fn test_related_documents_excludes_self_and_respects_visibility() {
    let env = setup().await;
    let ids = seed_library(&env).await;

    let related = search::related_documents(&env.pool, "alice", &ids[0], 10)
        .await
        .unwrap();
    assert!(!related.is_empty());
    assert!(related.iter().all(|d| d.id != ids[0]));

    // A user without a ledger entry cannot ask for neighbors
    provision_user(&env.pool, "bob").await.unwrap();
    let err = search::related_documents(&env.pool, "bob", &ids[0], 10)
        .await
        .unwrap_err();
    assert!(matches!(err, docshelf::error::Error::NotFound(_)));
}
