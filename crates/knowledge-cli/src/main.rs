//! knowledgedb
//!
//! Operator CLI over the knowledge engine: documents, graph, search, indexes
//! and agent memory in one local RocksDB store.
//!
//! # Usage
//!
//! ```bash
//! knowledgedb doc insert employees --data '{"name": "Bob Smith", "team": "Backend"}'
//! knowledgedb search hybrid "backend"
//! knowledgedb graph path "Bob Smith" "Carol Davis"
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/knowledgedb/config.toml)
//! 3. Environment variables (KNOWLEDGE_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use knowledge_cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}
