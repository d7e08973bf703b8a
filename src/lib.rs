//! # lexrag
//!
//! A hybrid retrieval engine for a legal-document corpus.
//!
//! lexrag keeps a corpus of documents chunked, embedded and indexed, and
//! answers natural-language questions with a ranked list of document
//! fragments. Retrieval runs over two channels, BM25 keyword search and
//! dense vector similarity, fused with reciprocal rank fusion, per
//! chunking strategy.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────┐
//! │ DocumentSource│──▶│  SyncEngine  │──▶│  SQLite   │
//! │ (corpus feed) │   │ chunk+embed  │   │  chunks   │
//! └──────────────┘   └──────────────┘   └─────┬─────┘
//!                                             │ build
//!                                             ▼
//!                                      ┌──────────────┐
//!                                      │IndexSnapshot │
//!                                      │ BM25 + dense │
//!                                      └──────┬───────┘
//!                                             │ swap
//!                                             ▼
//!                    question ──▶       ┌──────────────┐
//!                                       │  Retriever   │──▶ ranked fragments
//!                                       └──────────────┘
//! ```
//!
//! Synchronization is content-hash driven: documents re-chunk only when
//! their text or chunking parameters change, and embeddings are reused
//! across re-chunking whenever a chunk's text hash is unchanged.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`text`] | Tokenization and sentence splitting |
//! | [`chunk`] | Chunking strategies |
//! | [`provider`] | Embedding/generation/source traits, retry policy |
//! | [`store`] | SQLite and in-memory persistence |
//! | [`sync`] | Corpus synchronization engine |
//! | [`sparse`] | BM25 inverted index |
//! | [`dense`] | Vector similarity index |
//! | [`index`] | Immutable index snapshots |
//! | [`fusion`] | Reciprocal rank fusion |
//! | [`retrieval`] | Query orchestration and context assembly |
//! | [`session`] | Bounded conversation history |

pub mod chunk;
pub mod config;
pub mod dense;
pub mod error;
pub mod fusion;
pub mod index;
pub mod models;
pub mod provider;
pub mod retrieval;
pub mod session;
pub mod sparse;
pub mod store;
pub mod sync;
pub mod text;

pub use chunk::ChunkingStrategy;
pub use config::Config;
pub use error::{Error, Result};
pub use index::IndexSnapshot;
pub use models::{DocStatus, RetrievalResult, SourceDocument, Turn};
pub use retrieval::{RetrievalRequest, Retriever, SearchMode};
pub use sync::{SyncEngine, SyncReport};
