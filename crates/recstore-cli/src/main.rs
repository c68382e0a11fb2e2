//! recstore command-line host.
//!
//! Provides the `recstore` binary, a thin host over [`SqliteStore`] for
//! inspecting and editing a record store from the shell. Results are
//! printed as JSON on stdout; logs and errors go to stderr.
//!
//! Store configuration comes from the environment (see
//! [`StoreConfig::from_env`]), with `--db`, `--max-fetch-size` and
//! `--readonly` taking precedence.

use std::process;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};

use recstore_core::codec::object_from_value;
use recstore_core::{ListQuery, PageCursor, Payload, Timestamp};
use recstore_storage::{RecordStore, SqliteStore, StorageError, StoreConfig};

/// Versioned record store tools.
#[derive(Parser)]
#[command(name = "recstore", about = "Versioned record store tools")]
struct Cli {
    /// SQLite database file, or ":memory:".
    #[arg(long, global = true)]
    db: Option<String>,

    /// Hard cap on records returned by one listing.
    #[arg(long, global = true)]
    max_fetch_size: Option<usize>,

    /// Refuse every write.
    #[arg(long, global = true)]
    readonly: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Create or migrate the schema.
    Migrate {
        /// Report the steps without applying them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Print one live record.
    Get {
        collection: String,
        parent: String,
        id: String,
    },
    /// Create a record from a JSON object.
    Create {
        collection: String,
        parent: String,
        /// Record body, e.g. '{"id": "a1", "title": "hi"}'.
        record: String,
    },
    /// Replace (or create) the record at a key.
    Update {
        collection: String,
        parent: String,
        id: String,
        /// Record body; include '"deleted": true' to tombstone it.
        record: String,
    },
    /// Delete a record, keeping a tombstone unless --hard.
    Delete {
        collection: String,
        parent: String,
        id: String,
        #[arg(long)]
        hard: bool,
    },
    /// List records in a scope. The parent may contain `*` wildcards.
    List {
        collection: String,
        parent: String,
        /// Filters and sorting as JSON, e.g.
        /// '{"filters": [{"field": "done", "op": {"eq": false}}]}'.
        #[arg(short, long)]
        query: Option<String>,
        /// Token from a previous page's next_cursor.
        #[arg(short, long)]
        cursor: Option<String>,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(long)]
        include_deleted: bool,
    },
    /// Physically remove tombstones in a scope.
    Purge {
        collection: String,
        parent: String,
        /// Only purge tombstones older than this epoch-millisecond timestamp.
        #[arg(long)]
        before: Option<i64>,
    },
    /// Remove every record.
    Flush,
}

/// Why a command failed, mapped to the process exit code.
#[derive(Debug)]
enum Failure {
    /// 1: the store refused or could not complete the operation.
    Operation(StorageError),
    /// 2: arguments or configuration could not be interpreted.
    Usage(String),
    /// 3: the database could not be opened or initialized.
    Unavailable(StorageError),
}

impl Failure {
    fn exit_code(&self) -> i32 {
        match self {
            Failure::Operation(_) => 1,
            Failure::Usage(_) => 2,
            Failure::Unavailable(_) => 3,
        }
    }

    fn report(&self) {
        match self {
            Failure::Operation(StorageError::Conflict { existing, .. }) => {
                eprintln!("Error: record {} already exists", existing.id);
                print_json(&json!({ "existing": existing }));
            }
            Failure::Operation(e) => eprintln!("Error: {}", e),
            Failure::Usage(msg) => eprintln!("Error: {}", msg),
            Failure::Unavailable(e) => eprintln!("Error: failed to open store: {}", e),
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(()) => 0,
        Err(failure) => {
            failure.report();
            failure.exit_code()
        }
    };
    process::exit(exit_code);
}

/// Execute one subcommand.
fn run(cli: Cli) -> Result<(), Failure> {
    let config = load_config(&cli)?;
    tracing::debug!(location = %config.storage_location, readonly = config.readonly, "opening store");

    // Migration must be able to see a store whose schema is absent or old.
    let mut store = match cli.command {
        Commands::Migrate { .. } => SqliteStore::open(&config),
        _ => SqliteStore::from_config(&config),
    }
    .map_err(Failure::Unavailable)?;

    let output = match cli.command {
        Commands::Migrate { dry_run } => {
            json!(store.initialize(dry_run).map_err(Failure::Operation)?)
        }
        Commands::Get {
            collection,
            parent,
            id,
        } => json!(store.get(&collection, &parent, &id).map_err(Failure::Operation)?),
        Commands::Create {
            collection,
            parent,
            record,
        } => {
            let record = parse_record(&record)?;
            json!(store
                .create(&collection, &parent, record, None)
                .map_err(Failure::Operation)?)
        }
        Commands::Update {
            collection,
            parent,
            id,
            record,
        } => {
            let record = parse_record(&record)?;
            json!(store
                .update(&collection, &parent, &id, record)
                .map_err(Failure::Operation)?)
        }
        Commands::Delete {
            collection,
            parent,
            id,
            hard,
        } => json!(store
            .delete(&collection, &parent, &id, !hard)
            .map_err(Failure::Operation)?),
        Commands::List {
            collection,
            parent,
            query,
            cursor,
            limit,
            include_deleted,
        } => {
            let query = build_query(query.as_deref(), cursor.as_deref(), limit, include_deleted)?;
            let page = store
                .list(&collection, &parent, &query)
                .map_err(Failure::Operation)?;
            json!({
                "records": page.records,
                "total": page.total,
                "next_cursor": page.next_cursor.map(|c| c.to_token()),
            })
        }
        Commands::Purge {
            collection,
            parent,
            before,
        } => {
            let removed = store
                .purge_deleted(&collection, &parent, before.map(Timestamp))
                .map_err(Failure::Operation)?;
            json!({ "purged": removed })
        }
        Commands::Flush => {
            store.flush().map_err(Failure::Operation)?;
            json!({ "flushed": true })
        }
    };
    print_json(&output);
    Ok(())
}

/// Environment configuration overridden by command-line flags.
fn load_config(cli: &Cli) -> Result<StoreConfig, Failure> {
    let mut config = StoreConfig::from_env().map_err(|e| Failure::Usage(e.to_string()))?;
    if let Some(db) = &cli.db {
        config.storage_location = db.clone();
    }
    if let Some(size) = cli.max_fetch_size {
        config = config
            .with_max_fetch_size(size)
            .map_err(|e| Failure::Usage(e.to_string()))?;
    }
    if cli.readonly {
        config = config.with_readonly(true);
    }
    config.validate().map_err(|e| Failure::Usage(e.to_string()))?;
    Ok(config)
}

fn parse_record(text: &str) -> Result<Payload, Failure> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Failure::Usage(format!("record is not valid JSON: {}", e)))?;
    object_from_value(value).map_err(|e| Failure::Usage(e.to_string()))
}

fn build_query(
    query: Option<&str>,
    cursor: Option<&str>,
    limit: Option<usize>,
    include_deleted: bool,
) -> Result<ListQuery, Failure> {
    let mut parsed = match query {
        Some(text) => serde_json::from_str::<ListQuery>(text)
            .map_err(|e| Failure::Usage(format!("invalid --query: {}", e)))?,
        None => ListQuery::new(),
    };
    if let Some(token) = cursor {
        let cursor = PageCursor::from_token(token).map_err(|e| Failure::Usage(e.to_string()))?;
        parsed = parsed.after(cursor);
    }
    if let Some(limit) = limit {
        parsed = parsed.limit(limit);
    }
    if include_deleted {
        parsed = parsed.include_deleted(true);
    }
    Ok(parsed)
}

/// Print a value as pretty JSON to stdout for machine-readable output.
fn print_json(value: &Value) {
    let text = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize result: {}\"}}", e));
    println!("{}", text);
}
