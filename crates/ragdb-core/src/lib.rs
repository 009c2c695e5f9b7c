//! Shared vocabulary of the ragdb workspace: domain types, the error type,
//! collaborator traits, the token-aware chunker, event payloads and the
//! configuration/logging layer.
//!
//! Configuration uses Figment to merge `config.toml` + `config.<env>.toml` +
//! `APP_*` env vars into typed [`config::Settings`].
#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod chunker;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod pages;
pub mod tokens;
pub mod traits;
pub mod types;

pub use chunker::{ChunkingConfig, ChunkingOutput, ChunkingReport, SemanticChunker};
pub use error::{Component, Error, Result};
pub use traits::{Embedder, LexicalScorer, TokenCounter, VectorStore};
pub use types::*;
