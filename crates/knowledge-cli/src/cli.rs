//! CLI argument parsing for knowledgedb.
//!
//! CLI flags override every other configuration source.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// knowledgedb
///
/// Document store with an automatic knowledge graph and keyword, graph and
/// vector search.
#[derive(Parser, Debug)]
#[command(name = "knowledgedb")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/knowledgedb/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override the storage directory
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Tenant the command operates on
    #[arg(long, global = true, default_value = "default")]
    pub tenant: String,

    /// Database within the tenant
    #[arg(long, global = true, default_value = "main")]
    pub database: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Document operations
    #[command(subcommand)]
    Doc(DocCommands),

    /// Free-text search
    #[command(subcommand)]
    Search(SearchCommands),

    /// Knowledge graph queries and manual links
    #[command(subcommand)]
    Graph(GraphCommands),

    /// Vector and field indexes
    #[command(subcommand)]
    Index(IndexCommands),

    /// Agent memory
    #[command(subcommand)]
    Memory(MemoryCommands),

    /// Import documents from a JSON or CSV file
    Import {
        collection: String,

        /// File to read
        path: PathBuf,

        /// json or csv (default: from the file extension)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Export a collection as JSON or CSV
    Export {
        collection: String,

        /// json or csv
        #[arg(short, long, default_value = "json")]
        format: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Storage administration
    #[command(subcommand)]
    Admin(AdminCommands),
}

#[derive(Subcommand, Debug, Clone)]
pub enum DocCommands {
    /// Insert one document or an array of documents
    Insert {
        collection: String,

        /// Inline JSON
        #[arg(short, long, conflicts_with = "file")]
        data: Option<String>,

        /// Read JSON from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Find documents
    Find {
        collection: String,

        /// Filter as JSON, e.g. '{"age": {"$gt": 30}}'
        #[arg(long)]
        filter: Option<String>,

        /// Sort as JSON, e.g. '{"age": -1}'
        #[arg(long)]
        sort: Option<String>,

        #[arg(long, default_value = "0")]
        skip: usize,

        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Comma-separated fields to keep
        #[arg(long)]
        fields: Option<String>,
    },

    /// Get one document by id
    Get { collection: String, id: String },

    /// Apply $set / $inc / $unset to matching documents
    Update {
        collection: String,

        /// Filter as JSON
        #[arg(long)]
        filter: String,

        /// Update as JSON, e.g. '{"$set": {"status": "done"}}'
        #[arg(long)]
        update: String,

        /// Update every match instead of the first
        #[arg(long)]
        multi: bool,
    },

    /// Replace a document's fields
    Replace {
        collection: String,
        id: String,

        /// New body as JSON
        #[arg(short, long)]
        data: String,

        /// Fail unless the document is at this version
        #[arg(long)]
        expected_version: Option<u64>,
    },

    /// Merge fields into a document
    Patch {
        collection: String,
        id: String,

        /// Fields as JSON
        #[arg(short, long)]
        data: String,
    },

    /// Delete matching documents
    Delete {
        collection: String,

        /// Filter as JSON
        #[arg(long)]
        filter: String,

        /// Delete every match instead of the first
        #[arg(long)]
        multi: bool,
    },

    /// Show a document's version history
    History { collection: String, id: String },

    /// Restore a historical version as a new version
    Rollback {
        collection: String,
        id: String,
        version: u64,
    },

    /// List collections
    Collections,

    /// Drop a collection with its history, indexes and graph entities
    Drop { collection: String },
}

/// Arguments shared by the search subcommands.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    pub query: String,

    /// Restrict to a collection (repeatable)
    #[arg(short = 'C', long = "collection")]
    pub collections: Vec<String>,

    #[arg(short = 'n', long)]
    pub limit: Option<usize>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SearchCommands {
    /// BM25 ranking
    Keyword(SearchArgs),

    /// Graph proximity ranking
    Graph(SearchArgs),

    /// Keyword and graph fused
    Hybrid(SearchArgs),

    /// Keyword, graph and vector fused with weights
    Enhanced {
        #[command(flatten)]
        args: SearchArgs,

        #[arg(long)]
        keyword_weight: Option<f64>,

        #[arg(long)]
        graph_weight: Option<f64>,

        #[arg(long)]
        vector_weight: Option<f64>,
    },

    /// Vector similarity across collections
    Vector(SearchArgs),

    /// Documents similar to one document
    Similar {
        collection: String,
        id: String,

        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum GraphCommands {
    /// Node and edge counts, density, best connected nodes
    Stats,

    /// Breadth-first traversal from a label
    Traverse {
        label: String,

        #[arg(short, long, default_value = "2")]
        depth: usize,
    },

    /// Shortest path between two labels
    Path { from: String, to: String },

    /// Link two labels by hand
    Link {
        from: String,
        to: String,
        relation: String,
    },

    /// Remove an edge
    Unlink { edge_id: String },

    /// List nodes, optionally of one collection
    Nodes {
        #[arg(long)]
        collection: Option<String>,
    },

    /// Show a node with its edges and neighbours
    Node { node_id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum IndexCommands {
    /// Rebuild a collection's vector and field indexes
    Rebuild { collection: String },

    /// Show index statistics
    Stats { collection: String },

    /// Export embeddings as JSON or CSV
    Export {
        collection: String,

        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Ids of documents whose field equals a value
    Filter {
        collection: String,
        field: String,

        /// Value as JSON (bare words are treated as strings)
        value: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum MemoryCommands {
    /// Store a memory for an agent
    Remember {
        agent: String,

        #[arg(short = 't', long = "type")]
        memory_type: String,

        content: String,

        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Recall memories relevant to a query
    Recall {
        agent: String,
        query: String,

        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,

        #[arg(short = 't', long = "type")]
        memory_type: Option<String>,
    },

    /// Delete an agent's memories
    Forget {
        agent: String,

        #[arg(short = 't', long = "type")]
        memory_type: Option<String>,

        /// Only memories at least this many days old
        #[arg(long)]
        older_than_days: Option<u32>,
    },

    /// Delete one memory by id
    ForgetOne { agent: String, memory_id: String },

    /// List memories
    List {
        #[arg(long)]
        agent: Option<String>,

        #[arg(short = 't', long = "type")]
        memory_type: Option<String>,

        #[arg(long, default_value = "0")]
        skip: usize,

        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },

    /// Conversation transcripts
    #[command(subcommand)]
    Session(SessionCommands),
}

#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommands {
    /// Append a message to a session
    Add {
        session: String,
        content: String,

        /// Speaker of the message
        #[arg(long, default_value = "user")]
        role: String,
    },

    /// Print every message of a session
    Show { session: String },

    /// Latest messages, or those most relevant to a query
    Recall {
        session: String,
        query: Option<String>,

        #[arg(short = 'n', long, default_value = "5")]
        limit: usize,
    },

    /// Delete a session's messages
    Forget { session: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AdminCommands {
    /// Blob counts and disk usage
    Stats,

    /// Trigger RocksDB compaction
    Compact,
}
