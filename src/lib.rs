//! # Docshelf
//!
//! A multi-tenant document shelf: users upload documents (PDF, DOCX, TXT,
//! PPTX), the pipeline extracts text, chunks it, pulls structured attributes
//! and an embedding out of a language model, and files the document into a
//! per-user folder tree. Identical bytes uploaded by different users share
//! one physical document through the ownership ledger; summaries and
//! diagrams are generated per user on top of the shared chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │  Upload  │──▶│   Pipeline    │──▶│  SQLite    │
//! │ (multi-  │   │ hash·extract  │   │ documents  │
//! │  part)   │   │ chunk·embed  │   │ chunks     │
//! └──────────┘   └──────┬───────┘   │ ledger     │
//!                       │           │ folders    │
//!                 ┌─────▼─────┐     └─────┬─────┘
//!                 │ Ownership │           │
//!                 │  Ledger   │◀──────────┘
//!                 └─────┬─────┘
//!           ┌───────────┼───────────┐
//!           ▼           ▼           ▼
//!      ┌─────────┐ ┌─────────┐ ┌─────────┐
//!      │ Folders │ │ Summary │ │ Search  │
//!      └─────────┘ └─────────┘ └─────────┘
//! ```
//!
//! The ownership ledger (`user_documents`) is the nucleus: every read goes
//! through it, per-user state (display name, favorite, folder placement,
//! summary) lives on it, and a document whose last ledger entry disappears
//! is garbage-collected together with its unreferenced chunks and summary.
//!
//! ## Quick Start
//!
//! ```bash
//! dsh init                      # create database
//! dsh serve                     # start the HTTP API
//! dsh stats                     # what's on the shelf
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`ingest`] | Upload pipeline and document deletion |
//! | [`folders`] | Per-user folder tree management |
//! | [`ledger`] | Ownership ledger (per-user document associations) |
//! | [`summary`] | Summaries and cached diagrams |
//! | [`search`] | Title and vector search |
//! | [`extract`] | Text extraction from binary documents |
//! | [`chunk`] | Word-boundary text chunking |
//! | [`llm`] | Language model client abstraction |
//! | [`prompts`] | Prompt templates and rendering |
//! | [`storage`] | Uploaded-file store |
//! | [`server`] | HTTP API server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod folders;
pub mod ingest;
pub mod ledger;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod prompts;
pub mod search;
pub mod server;
pub mod stats;
pub mod storage;
pub mod summary;
pub mod users;
