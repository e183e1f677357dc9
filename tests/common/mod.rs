//! Shared test harness: scratch database + upload dir, and a stub language
//! model so pipelines run without network access.
#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::SqlitePool;
use tempfile::TempDir;

use docshelf::config::{ChunkingConfig, Config, DbConfig, LlmConfig, ServerConfig, StorageConfig};
use docshelf::ingest::Upload;
use docshelf::llm::{ChatRequest, ChatResponse, LanguageModel, LlmError, Usage};
use docshelf::{db, migrate};

pub struct TestEnv {
    // Held for its Drop; removes the scratch dir
    #[allow(dead_code)]
    pub tmp: TempDir,
    pub config: Config,
    pub pool: SqlitePool,
}

pub async fn setup() -> TestEnv {
    setup_with_max_chars(1000).await
}

pub async fn setup_with_max_chars(max_chars: usize) -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let config = Config {
        db: DbConfig {
            path: tmp.path().join("data/shelf.sqlite"),
        },
        storage: StorageConfig {
            uploads_dir: tmp.path().join("uploads"),
        },
        chunking: ChunkingConfig { max_chars },
        llm: LlmConfig::default(),
        server: ServerConfig {
            bind: "127.0.0.1:0".to_string(),
        },
    };

    let pool = db::connect(&config).await.unwrap();
    migrate::run_migrations(&pool).await.unwrap();

    TestEnv { tmp, config, pool }
}

/// Deterministic stand-in for the language model: fixed JSON for attribute
/// extraction, derived prose for summaries, a tiny flowchart for diagrams,
/// and byte-bucket embeddings.
pub struct StubModel;

#[async_trait]
impl LanguageModel for StubModel {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, LlmError> {
        let text = if req.user.contains("Extract the following attributes") {
            r#"{"topic": "distributed systems", "field": "computer science",
                "keywords": ["consensus", "replication"], "methodology": "survey",
                "docDate": null, "extraAttributes": {}}"#
                .to_string()
        } else if req.user.contains("mermaid flowchart") {
            "flowchart TD\n  A[Start] --> B[Middle]\n\n  B --> C[End]".to_string()
        } else {
            format!("Summary of {} characters of input.", req.user.len())
        };

        Ok(ChatResponse {
            text,
            usage: Usage::default(),
            latency_ms: 1,
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut v = vec![0.0f32; 8];
        for (i, b) in text.bytes().enumerate() {
            v[i % 8] += b as f32 / 255.0;
        }
        Ok(v)
    }
}

pub fn txt_upload(file_name: &str, content: &str) -> Upload {
    Upload {
        file_name: file_name.to_string(),
        title: None,
        folder_id: None,
        bytes: content.as_bytes().to_vec(),
    }
}

pub async fn count(pool: &SqlitePool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}
