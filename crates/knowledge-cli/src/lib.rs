//! knowledgedb library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations over [`knowledge_service::KnowledgeEngine`]

pub mod cli;
pub mod commands;

pub use cli::{
    AdminCommands, Cli, Commands, DocCommands, GraphCommands, IndexCommands, MemoryCommands,
    SearchArgs, SearchCommands,
};
pub use commands::{execute, run, Session};
