//! Command implementations for knowledgedb.
//!
//! Every engine call runs on the blocking pool under the configured request
//! timeout. Results are printed to stdout as pretty JSON; logs go to stderr.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use knowledge_memory::NewMemory;
use knowledge_query::{FindOptions, SortKey};
use knowledge_search::SearchMode;
use knowledge_service::{
    parse_json_documents, InterchangeFormat, KnowledgeEngine, RollbackOutcome, ServiceError,
    SimilarOutcome,
};
use knowledge_types::Settings;
use knowledge_vector::{EmbeddingExport, ExportFormat};

use crate::cli::{
    AdminCommands, Cli, Commands, DocCommands, GraphCommands, IndexCommands, MemoryCommands,
    SearchArgs, SearchCommands, SessionCommands,
};

/// An opened engine scoped to one tenant and database.
pub struct Session {
    engine: Arc<KnowledgeEngine>,
    tenant: String,
    database: String,
    timeout: Duration,
}

impl Session {
    pub fn open(settings: Settings, tenant: &str, database: &str) -> Result<Self> {
        let timeout = Duration::from_millis(settings.request_timeout_ms);
        let engine = KnowledgeEngine::open(settings).context("Failed to open storage")?;
        Ok(Self {
            engine: Arc::new(engine),
            tenant: tenant.to_string(),
            database: database.to_string(),
            timeout,
        })
    }

    fn scope(&self) -> (String, String) {
        (self.tenant.clone(), self.database.clone())
    }

    /// Run `f` on the blocking pool, bounded by the request timeout.
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&KnowledgeEngine) -> Result<T, ServiceError> + Send + 'static,
    {
        let engine = self.engine.clone();
        let task = tokio::task::spawn_blocking(move || f(&engine));
        let joined = tokio::time::timeout(self.timeout, task)
            .await
            .with_context(|| format!("Request timed out after {} ms", self.timeout.as_millis()))?;
        Ok(joined.context("Engine task failed")??)
    }
}

/// Load settings, apply CLI overrides, start logging and run one command.
pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(data_dir) = &cli.data_dir {
        settings.data_dir = data_dir.clone();
    }
    if let Some(log_level) = &cli.log_level {
        settings.log_level = log_level.clone();
    }
    init_logging(&settings.log_level)?;

    info!(data_dir = %settings.data_dir, tenant = %cli.tenant, database = %cli.database, "knowledgedb starting");
    let session = Session::open(settings, &cli.tenant, &cli.database)?;
    execute(&session, cli.command).await
}

fn init_logging(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

pub async fn execute(session: &Session, command: Commands) -> Result<()> {
    match command {
        Commands::Doc(cmd) => handle_doc(session, cmd).await,
        Commands::Search(cmd) => handle_search(session, cmd).await,
        Commands::Graph(cmd) => handle_graph(session, cmd).await,
        Commands::Index(cmd) => handle_index(session, cmd).await,
        Commands::Memory(cmd) => handle_memory(session, cmd).await,
        Commands::Import {
            collection,
            path,
            format,
        } => {
            let format = match format {
                Some(f) => f.parse::<InterchangeFormat>()?,
                None => InterchangeFormat::from_path(&path),
            };
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let (t, d) = session.scope();
            let report = session
                .call(move |e| e.import_collection(&t, &d, &collection, &text, format))
                .await?;
            print_json(&report)
        }
        Commands::Export {
            collection,
            format,
            output,
        } => {
            let format: InterchangeFormat = format.parse()?;
            let (t, d) = session.scope();
            let text = session
                .call(move |e| e.export_collection(&t, &d, &collection, format))
                .await?;
            write_output(output.as_deref(), &text)
        }
        Commands::Admin(cmd) => handle_admin(session, cmd).await,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), bytes = text.len(), "Wrote export");
        }
        None => println!("{}", text),
    }
    Ok(())
}

fn parse_json(label: &str, text: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("Invalid JSON in {}", label))
}

/// A value argument: JSON when it parses, otherwise the raw string.
fn parse_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn parse_fields(fields: &str) -> Vec<String> {
    fields
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

fn collections_arg(collections: Vec<String>) -> Option<Vec<String>> {
    (!collections.is_empty()).then_some(collections)
}

fn not_found(what: &str) -> Result<()> {
    print_json(&serde_json::json!({ "error": format!("{} not found", what) }))
}

async fn handle_doc(session: &Session, cmd: DocCommands) -> Result<()> {
    let (t, d) = session.scope();
    match cmd {
        DocCommands::Insert {
            collection,
            data,
            file,
        } => {
            let text = match (data, file) {
                (Some(data), _) => data,
                (None, Some(file)) => std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?,
                (None, None) => bail!("Provide --data or --file"),
            };
            let documents = parse_json_documents(&text)?;
            let result = session
                .call(move |e| e.insert(&t, &d, &collection, documents))
                .await?;
            print_json(&result)
        }
        DocCommands::Find {
            collection,
            filter,
            sort,
            skip,
            limit,
            fields,
        } => {
            let filter = match filter {
                Some(f) => parse_json("--filter", &f)?,
                None => Value::Null,
            };
            let sort = match sort {
                Some(s) => SortKey::parse_all(&parse_json("--sort", &s)?)?,
                None => Vec::new(),
            };
            let options = FindOptions {
                sort,
                skip,
                limit,
                fields: fields.as_deref().map(parse_fields),
            };
            let page = session
                .call(move |e| e.find(&t, &d, &collection, &filter, &options))
                .await?;
            print_json(&page)
        }
        DocCommands::Get { collection, id } => {
            let lookup = id.clone();
            match session
                .call(move |e| e.find_by_id(&t, &d, &collection, &lookup))
                .await?
            {
                Some(doc) => print_json(&doc),
                None => not_found(&format!("Document {}", id)),
            }
        }
        DocCommands::Update {
            collection,
            filter,
            update,
            multi,
        } => {
            let filter = parse_json("--filter", &filter)?;
            let update = parse_json("--update", &update)?;
            let result = session
                .call(move |e| e.update(&t, &d, &collection, &filter, &update, multi))
                .await?;
            print_json(&result)
        }
        DocCommands::Replace {
            collection,
            id,
            data,
            expected_version,
        } => {
            let body = parse_json("--data", &data)?;
            let lookup = id.clone();
            match session
                .call(move |e| e.replace(&t, &d, &collection, &lookup, body, expected_version))
                .await?
            {
                Some(event) => print_json(&event.document),
                None => not_found(&format!("Document {}", id)),
            }
        }
        DocCommands::Patch {
            collection,
            id,
            data,
        } => {
            let fields = parse_json("--data", &data)?;
            let lookup = id.clone();
            match session
                .call(move |e| e.patch(&t, &d, &collection, &lookup, fields))
                .await?
            {
                Some(event) => print_json(&event.document),
                None => not_found(&format!("Document {}", id)),
            }
        }
        DocCommands::Delete {
            collection,
            filter,
            multi,
        } => {
            let filter = parse_json("--filter", &filter)?;
            let result = session
                .call(move |e| e.delete(&t, &d, &collection, &filter, multi))
                .await?;
            print_json(&result)
        }
        DocCommands::History { collection, id } => {
            let lookup = id.clone();
            match session
                .call(move |e| e.history(&t, &d, &collection, &lookup))
                .await?
            {
                Some(view) => print_json(&view),
                None => not_found(&format!("Document {}", id)),
            }
        }
        DocCommands::Rollback {
            collection,
            id,
            version,
        } => {
            let lookup = id.clone();
            match session
                .call(move |e| e.rollback(&t, &d, &collection, &lookup, version))
                .await?
            {
                RollbackOutcome::Restored(event) => print_json(&event.document),
                RollbackOutcome::VersionNotFound(v) => not_found(&format!("Version {}", v)),
                RollbackOutcome::DocumentNotFound => not_found(&format!("Document {}", id)),
            }
        }
        DocCommands::Collections => {
            let names = session.call(move |e| e.list_collections(&t, &d)).await?;
            print_json(&names)
        }
        DocCommands::Drop { collection } => {
            let dropped = session
                .call(move |e| e.drop_collection(&t, &d, &collection))
                .await?;
            print_json(&serde_json::json!({ "dropped": dropped }))
        }
    }
}

async fn mode_search(session: &Session, mode: SearchMode, args: SearchArgs) -> Result<()> {
    let (t, d) = session.scope();
    let collections = collections_arg(args.collections);
    let hits = session
        .call(move |e| e.search(&t, &d, &args.query, mode, collections.as_deref(), args.limit))
        .await?;
    print_json(&hits)
}

async fn handle_search(session: &Session, cmd: SearchCommands) -> Result<()> {
    let (t, d) = session.scope();
    match cmd {
        SearchCommands::Keyword(args) => mode_search(session, SearchMode::Keyword, args).await,
        SearchCommands::Graph(args) => mode_search(session, SearchMode::Graph, args).await,
        SearchCommands::Hybrid(args) => mode_search(session, SearchMode::Hybrid, args).await,
        SearchCommands::Enhanced {
            args,
            keyword_weight,
            graph_weight,
            vector_weight,
        } => {
            let weights = (keyword_weight.is_some() || graph_weight.is_some() || vector_weight.is_some())
                .then(|| {
                    let mut w = session.engine.settings().search.weights;
                    w.keyword = keyword_weight.unwrap_or(w.keyword);
                    w.graph = graph_weight.unwrap_or(w.graph);
                    w.vector = vector_weight.unwrap_or(w.vector);
                    w
                });
            debug!(?weights, "Enhanced search weights");
            let collections = collections_arg(args.collections);
            let hits = session
                .call(move |e| {
                    e.enhanced_search(&t, &d, &args.query, weights, collections.as_deref(), args.limit)
                })
                .await?;
            print_json(&hits)
        }
        SearchCommands::Vector(args) => {
            let collections = collections_arg(args.collections);
            let hits = session
                .call(move |e| {
                    e.vector_search_all(&t, &d, &args.query, collections.as_deref(), args.limit)
                })
                .await?;
            print_json(&hits)
        }
        SearchCommands::Similar {
            collection,
            id,
            limit,
        } => {
            let lookup = id.clone();
            let target = collection.clone();
            match session
                .call(move |e| e.similar_documents(&t, &d, &target, &lookup, limit))
                .await?
            {
                SimilarOutcome::Found(similar) => print_json(&similar),
                SimilarOutcome::NoIndex => not_found(&format!("Vector index for {}", collection)),
                SimilarOutcome::DocumentNotFound => not_found(&format!("Document {}", id)),
            }
        }
    }
}

async fn handle_graph(session: &Session, cmd: GraphCommands) -> Result<()> {
    let (t, d) = session.scope();
    match cmd {
        GraphCommands::Stats => print_json(&session.call(move |e| e.graph_stats(&t, &d)).await?),
        GraphCommands::Traverse { label, depth } => print_json(
            &session
                .call(move |e| e.traverse(&t, &d, &label, depth))
                .await?,
        ),
        GraphCommands::Path { from, to } => print_json(
            &session
                .call(move |e| e.shortest_path(&t, &d, &from, &to))
                .await?,
        ),
        GraphCommands::Link { from, to, relation } => print_json(
            &session
                .call(move |e| e.create_link(&t, &d, &from, &to, &relation))
                .await?,
        ),
        GraphCommands::Unlink { edge_id } => {
            let deleted = session
                .call(move |e| e.delete_link(&t, &d, &edge_id))
                .await?;
            print_json(&serde_json::json!({ "deleted": deleted }))
        }
        GraphCommands::Nodes { collection } => print_json(
            &session
                .call(move |e| e.list_nodes(&t, &d, collection.as_deref()))
                .await?,
        ),
        GraphCommands::Node { node_id } => {
            let lookup = node_id.clone();
            match session.call(move |e| e.get_node(&t, &d, &lookup)).await? {
                Some(detail) => print_json(&detail),
                None => not_found(&format!("Node {}", node_id)),
            }
        }
    }
}

async fn handle_index(session: &Session, cmd: IndexCommands) -> Result<()> {
    let (t, d) = session.scope();
    match cmd {
        IndexCommands::Rebuild { collection } => print_json(
            &session
                .call(move |e| e.rebuild_indexes(&t, &d, &collection))
                .await?,
        ),
        IndexCommands::Stats { collection } => print_json(
            &session
                .call(move |e| Ok(e.indexes().index_stats(&t, &d, &collection)?))
                .await?,
        ),
        IndexCommands::Export { collection, format } => {
            let format: ExportFormat = format.parse()?;
            let target = collection.clone();
            match session
                .call(move |e| Ok(e.indexes().export_embeddings(&t, &d, &target, format)?))
                .await?
            {
                Some(EmbeddingExport::Json(value)) => print_json(&value),
                Some(EmbeddingExport::Csv(text)) => write_output(None, &text),
                None => not_found(&format!("Vector index for {}", collection)),
            }
        }
        IndexCommands::Filter {
            collection,
            field,
            value,
        } => {
            let value = parse_value(&value);
            let ids = session
                .call(move |e| Ok(e.indexes().field_filter(&t, &d, &collection, &field, &value)?))
                .await?;
            print_json(&ids)
        }
    }
}

async fn handle_memory(session: &Session, cmd: MemoryCommands) -> Result<()> {
    let (t, d) = session.scope();
    match cmd {
        MemoryCommands::Remember {
            agent,
            memory_type,
            content,
            tags,
        } => {
            let memory = NewMemory {
                agent_id: agent,
                memory_type,
                content,
                tags,
            };
            let item = session
                .call(move |e| Ok(e.memory().remember(&t, &d, memory)?))
                .await?;
            print_json(&serde_json::json!({ "memoryId": item.id, "stored": true }))
        }
        MemoryCommands::Recall {
            agent,
            query,
            limit,
            memory_type,
        } => {
            let recalled = session
                .call(move |e| {
                    Ok(e.memory()
                        .recall(&t, &d, &agent, &query, limit, memory_type.as_deref())?)
                })
                .await?;
            print_json(&serde_json::json!({ "memories": recalled }))
        }
        MemoryCommands::Forget {
            agent,
            memory_type,
            older_than_days,
        } => {
            let deleted = session
                .call(move |e| {
                    Ok(e.memory()
                        .forget(&t, &d, &agent, memory_type.as_deref(), older_than_days)?)
                })
                .await?;
            print_json(&serde_json::json!({ "deletedCount": deleted }))
        }
        MemoryCommands::ForgetOne { agent, memory_id } => {
            let removed = session
                .call(move |e| Ok(e.memory().forget_one(&t, &d, &agent, &memory_id)?))
                .await?;
            print_json(&serde_json::json!({ "memoryId": removed.id, "deleted": true }))
        }
        MemoryCommands::Session(cmd) => handle_memory_session(session, cmd).await,
        MemoryCommands::List {
            agent,
            memory_type,
            skip,
            limit,
        } => {
            let page = session
                .call(move |e| {
                    Ok(e.memory().list(
                        &t,
                        &d,
                        agent.as_deref(),
                        memory_type.as_deref(),
                        skip,
                        limit,
                    )?)
                })
                .await?;
            print_json(&page)
        }
    }
}

async fn handle_memory_session(session: &Session, cmd: SessionCommands) -> Result<()> {
    let (t, d) = session.scope();
    match cmd {
        SessionCommands::Add {
            session: id,
            content,
            role,
        } => {
            let item = session
                .call(move |e| {
                    Ok(e.memory()
                        .remember_in_session(&t, &d, &id, Some(&role), &content)?)
                })
                .await?;
            print_json(&serde_json::json!({ "memoryId": item.id, "stored": true }))
        }
        SessionCommands::Show { session: id } => {
            let transcript = session
                .call(move |e| Ok(e.memory().session(&t, &d, &id)?))
                .await?;
            print_json(&transcript)
        }
        SessionCommands::Recall {
            session: id,
            query,
            limit,
        } => {
            let recalled = session
                .call(move |e| {
                    Ok(e.memory()
                        .recall_in_session(&t, &d, &id, query.as_deref(), limit)?)
                })
                .await?;
            print_json(&serde_json::json!({ "memories": recalled }))
        }
        SessionCommands::Forget { session: id } => {
            let deleted = session
                .call(move |e| Ok(e.memory().forget_session(&t, &d, &id)?))
                .await?;
            print_json(&serde_json::json!({ "deletedCount": deleted }))
        }
    }
}

async fn handle_admin(session: &Session, cmd: AdminCommands) -> Result<()> {
    match cmd {
        AdminCommands::Stats => {
            let stats = session.call(|e| Ok(e.storage().get_stats()?)).await?;
            print_json(&stats)
        }
        AdminCommands::Compact => {
            session.call(|e| Ok(e.storage().compact()?)).await?;
            println!("Compaction complete");
            Ok(())
        }
    }
}
