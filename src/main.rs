//! shelf CLI - a git-backed shelf of book records

use anyhow::Context;
use clap::{Parser, Subcommand};
use shelfdb::books::{self, sample_books};
use shelfdb::storage::document::{Document, Fields, Value};
use shelfdb::{Config, Database, MemoryStore, QueryRunner, RecordStore, Schema};
use shelfql::{
    Accumulator, Changes, Filter, GroupKey, IndexField, Projection, SortDirection, SortKey, Stage,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shelf")]
#[command(about = "A git-backed shelf of book records", long_about = None)]
struct Cli {
    /// Database directory (defaults to current directory)
    #[arg(short, long, default_value = ".", global = true)]
    database: PathBuf,

    /// Collection to work on (defaults to the configured one)
    #[arg(short, long, global = true)]
    collection: Option<String>,

    /// Use a throwaway in-memory store seeded with the sample shelf
    #[arg(long, global = true)]
    memory: bool,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new database
    Init {
        /// Load the sample shelf of twelve books
        #[arg(long)]
        seed: bool,
    },

    /// Import books from a JSON array
    Import { file: PathBuf },

    /// Find records matching a filter, e.g. "genre = 'Fiction'"
    Find {
        #[arg(default_value = "")]
        filter: String,
    },

    /// Count records matching a filter
    Count {
        #[arg(default_value = "")]
        filter: String,
    },

    /// Return only some fields, e.g. "title, author, price, -_id"
    Project {
        fields: String,
        #[arg(default_value = "")]
        filter: String,
    },

    /// Sort matching records, e.g. "price DESC"
    Sort {
        key: String,
        #[arg(default_value = "")]
        filter: String,
    },

    /// Show one page of matching records
    Page {
        page: usize,
        /// Records per page (defaults to the configured page size)
        #[arg(long)]
        size: Option<usize>,
        /// Sort before paging, e.g. "price DESC"
        #[arg(long)]
        sort: Option<String>,
        #[arg(default_value = "")]
        filter: String,
    },

    /// Update the first matching record, e.g. "title = 'Dune'" "price = 9.99"
    Update { filter: String, changes: String },

    /// Delete the first matching record
    Delete { filter: String },

    /// Run an aggregation pipeline, e.g. "GROUP BY genre AVG(price) AS avgPrice"
    Aggregate { pipeline: String },

    /// Manage index declarations
    Index {
        #[command(subcommand)]
        action: IndexCommand,
    },

    /// Show how a filter would be executed
    Explain {
        #[arg(default_value = "")]
        filter: String,
    },

    /// Show database status
    Status,

    /// Run the demonstration sequence of queries
    Demo,
}

#[derive(Subcommand)]
enum IndexCommand {
    /// Declare an index, e.g. "author ASC, published_year ASC"
    Create { fields: String },
    /// List declared indexes
    List,
    /// Remove an index by name
    Drop { name: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if let Some(hint) = e.downcast_ref::<shelfdb::Error>().and_then(|e| e.suggestion()) {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::FAILURE
        }
    }
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let printer = Printer { json: cli.json };

    if cli.memory {
        let name = cli.collection.unwrap_or_else(|| "books".to_string());
        let schema = Schema::books(name.clone());
        let store = MemoryStore::new(name);
        books::import(&store, &schema, &sample_books()).await?;
        let runner = QueryRunner::new(&store, schema);
        return execute(&runner, cli.command, &printer, Config::default().default_page_size).await;
    }

    if let Commands::Init { seed } = cli.command {
        return init_database(cli.database, seed, &printer).await;
    }

    let mut config = Config::load(&cli.database)
        .with_context(|| format!("loading config from {}", cli.database.display()))?;
    if let Some(collection) = cli.collection {
        config.collection = collection;
    }
    let page_size = config.default_page_size;

    let db = Database::connect_with(&cli.database, config).await?;

    let result = match cli.command {
        Commands::Status => show_status(&db, &printer).await,
        command => match db.collection() {
            Ok(collection) => {
                let runner = db.runner(&collection);
                execute(&runner, command, &printer, page_size).await
            }
            Err(e) => Err(e.into()),
        },
    };

    let closed = db.close();
    result?;
    closed?;
    Ok(())
}

async fn init_database(path: PathBuf, seed: bool, printer: &Printer) -> anyhow::Result<()> {
    let db = Database::init(&path).await?;
    println!("Initialized shelfdb database at {}", path.display());

    if seed {
        let collection = db.collection()?;
        let ids = books::import(&collection, &db.schema(&collection.name), &sample_books()).await?;
        printer.message(&format!("Seeded {} book(s) into '{}'", ids.len(), collection.name));
    }

    println!();
    println!("Get started:");
    println!("  shelf find \"genre = 'Fiction'\"");
    println!("  shelf aggregate \"GROUP BY genre AVG(price) AS avgPrice\"");
    println!("  shelf explain \"title = 'To Kill a Mockingbird'\"");

    db.close()?;
    Ok(())
}

async fn show_status(db: &Database, printer: &Printer) -> anyhow::Result<()> {
    let status = db.status().await?;
    if printer.json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("shelfdb Database Status");
    println!("=======================");
    println!("Path: {}", status.root.display());
    println!("Collection: {} ({} records)", status.collection, status.records);
    if status.indexes.is_empty() {
        println!("Indexes: none");
    } else {
        println!("Indexes: {}", status.indexes.join(", "));
    }
    println!("HEAD: {}", status.head);
    if status.uncommitted_changes {
        println!("\nUncommitted changes detected.");
    } else {
        println!("\nNo uncommitted changes.");
    }
    println!("\nRecent commits:");
    for line in &status.recent_commits {
        println!("  {}", line);
    }
    Ok(())
}

/// Run one command against a runner
async fn execute<S: RecordStore>(
    runner: &QueryRunner<'_, S>,
    command: Commands,
    printer: &Printer,
    default_page_size: usize,
) -> anyhow::Result<()> {
    match command {
        Commands::Init { .. } | Commands::Status => {
            anyhow::bail!("this command needs an on-disk database; drop --memory")
        }
        Commands::Import { file } => {
            let books = books::read_json(&file)?;
            let ids = books::import(runner.store(), runner.schema(), &books).await?;
            printer.message(&format!("Imported {} book(s): {}", ids.len(), ids.join(", ")));
        }
        Commands::Find { filter } => {
            let docs = runner.find_by_filter(&parse_filter(&filter)?).await?;
            printer.documents(&docs)?;
        }
        Commands::Count { filter } => {
            let count = runner.count(&parse_filter(&filter)?).await?;
            printer.outcome(&serde_json::json!({ "count": count }))?;
        }
        Commands::Project { fields, filter } => {
            let projection = shelfql::parse_projection(&fields).map_err(shelfdb::Error::from)?;
            let rows = runner.project(&parse_filter(&filter)?, &projection).await?;
            printer.records(&rows)?;
        }
        Commands::Sort { key, filter } => {
            let key = shelfql::parse_sort(&key).map_err(shelfdb::Error::from)?;
            let docs = runner.sort(&parse_filter(&filter)?, &key.field, key.direction).await?;
            printer.documents(&docs)?;
        }
        Commands::Page { page, size, sort, filter } => {
            let filter = parse_filter(&filter)?;
            let size = size.unwrap_or(default_page_size);
            let docs = match sort {
                Some(sort) => {
                    let key = shelfql::parse_sort(&sort).map_err(shelfdb::Error::from)?;
                    runner.paginate_sorted(&filter, &key, page, size).await?
                }
                None => runner.paginate(&filter, page, size).await?,
            };
            printer.documents(&docs)?;
        }
        Commands::Update { filter, changes } => {
            let changes = shelfql::parse_changes(&changes).map_err(shelfdb::Error::from)?;
            let outcome = runner.update_one(&parse_filter(&filter)?, &changes).await?;
            printer.outcome(&outcome)?;
        }
        Commands::Delete { filter } => {
            let outcome = runner.delete_one(&parse_filter(&filter)?).await?;
            printer.outcome(&outcome)?;
        }
        Commands::Aggregate { pipeline } => {
            let stages = shelfql::parse_pipeline(&pipeline).map_err(shelfdb::Error::from)?;
            let rows = runner.aggregate(&stages).await?;
            printer.records(&rows)?;
        }
        Commands::Index { action } => match action {
            IndexCommand::Create { fields } => {
                let fields = shelfql::parse_index_fields(&fields).map_err(shelfdb::Error::from)?;
                let handle = runner.create_index(fields).await?;
                printer.outcome(&handle)?;
            }
            IndexCommand::List => {
                let handles = runner.list_indexes().await?;
                printer.outcome(&handles)?;
            }
            IndexCommand::Drop { name } => {
                if runner.drop_index(&name).await? {
                    printer.message(&format!("Dropped index {}", name));
                } else {
                    printer.message(&format!("No index named {}", name));
                }
            }
        },
        Commands::Explain { filter } => {
            let plan = runner.explain_filter(&parse_filter(&filter)?).await?;
            if printer.json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print!("{}", plan);
            }
        }
        Commands::Demo => run_demo(runner, printer).await?,
    }

    Ok(())
}

fn parse_filter(text: &str) -> shelfdb::Result<Filter> {
    Ok(shelfql::parse_filter(text)?)
}

/// The fixed demonstration: queries, updates, shaping, aggregation and indexes
async fn run_demo<S: RecordStore>(runner: &QueryRunner<'_, S>, printer: &Printer) -> anyhow::Result<()> {
    let title = "To Kill a Mockingbird";

    printer.heading("Fiction books");
    printer.documents(&runner.find_by_filter(&Filter::all().eq("genre", "Fiction")).await?)?;

    printer.heading("Books published after 2000");
    printer.documents(&runner.find_by_filter(&Filter::all().gt("published_year", 2000)).await?)?;

    printer.heading("Books by Harper Lee");
    printer.documents(&runner.find_by_filter(&Filter::all().eq("author", "Harper Lee")).await?)?;

    printer.heading(&format!("Update price of '{}'", title));
    let updated = runner
        .update_one(&Filter::all().eq("title", title), &Changes::new().set("price", 15.99))
        .await?;
    printer.outcome(&updated)?;

    printer.heading("Delete 'Animal Farm'");
    printer.outcome(&runner.delete_one(&Filter::all().eq("title", "Animal Farm")).await?)?;

    printer.heading("In-stock books published after 2010");
    let recent_in_stock = Filter::all().eq("in_stock", true).gt("published_year", 2010);
    printer.documents(&runner.find_by_filter(&recent_in_stock).await?)?;

    printer.heading("Title, author and price only");
    let projection = Projection::new(["title", "author", "price"]).without_id();
    printer.records(&runner.project(&Filter::all(), &projection).await?)?;

    printer.heading("Books by price (ascending)");
    printer.documents(&runner.sort(&Filter::all(), "price", SortDirection::Ascending).await?)?;

    printer.heading("Books by price (descending)");
    printer.documents(&runner.sort(&Filter::all(), "price", SortDirection::Descending).await?)?;

    printer.heading("Page 1 (5 per page)");
    printer.documents(&runner.paginate(&Filter::all(), 1, 5).await?)?;

    printer.heading("Average price by genre");
    let by_genre = [Stage::group_by(GroupKey::field("genre"))
        .accumulate("avgPrice", Accumulator::Average("price".into()))];
    printer.records(&runner.aggregate(&by_genre).await?)?;

    printer.heading("Author with the most books");
    let top_author = [
        Stage::group_by(GroupKey::field("author")).accumulate("count", Accumulator::Count),
        Stage::sort(SortKey::desc("count")),
        Stage::limit(1),
    ];
    printer.records(&runner.aggregate(&top_author).await?)?;

    printer.heading("Books by decade");
    let by_decade = [
        Stage::group_by(GroupKey::floor_div("published_year", 10, "decade"))
            .accumulate("count", Accumulator::Count),
        Stage::sort(SortKey::asc("decade")),
    ];
    printer.records(&runner.aggregate(&by_decade).await?)?;

    printer.heading("Index on title");
    printer.outcome(&runner.create_index(vec![IndexField::asc("title")]).await?)?;

    printer.heading("Compound index on author and published_year");
    let compound = vec![IndexField::asc("author"), IndexField::asc("published_year")];
    printer.outcome(&runner.create_index(compound).await?)?;

    printer.heading(&format!("Explain title = '{}'", title));
    let plan = runner.explain_filter(&Filter::all().eq("title", title)).await?;
    if printer.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", plan);
    }

    Ok(())
}

/// Text or JSON output
struct Printer {
    json: bool,
}

impl Printer {
    fn heading(&self, text: &str) {
        if !self.json {
            println!();
            println!("=== {} ===", text);
        }
    }

    fn message(&self, text: &str) {
        if self.json {
            println!("{}", serde_json::json!({ "message": text }));
        } else {
            println!("{}", text);
        }
    }

    fn documents(&self, docs: &[Document]) -> anyhow::Result<()> {
        if self.json {
            let records: Vec<Fields> = docs.iter().map(Document::to_record).collect();
            return self.records(&records);
        }

        if docs.is_empty() {
            println!("No records found.");
            return Ok(());
        }
        for doc in docs {
            println!("--- {} ---", doc.id);
            for (key, value) in &doc.fields {
                println!("  {}: {}", key, value);
            }
        }
        println!("({} record(s))", docs.len());
        Ok(())
    }

    fn records(&self, rows: &[Fields]) -> anyhow::Result<()> {
        if self.json {
            let json: Vec<serde_json::Value> = rows
                .iter()
                .map(|row| Value::Object(row.clone()).to_json())
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
            return Ok(());
        }

        if rows.is_empty() {
            println!("No results.");
            return Ok(());
        }
        for row in rows {
            let parts: Vec<String> = row.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
            println!("{{ {} }}", parts.join(", "));
        }
        Ok(())
    }

    fn outcome<T: serde::Serialize>(&self, outcome: &T) -> anyhow::Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(outcome)?);
        } else {
            println!("{}", serde_yaml::to_string(outcome)?.trim_end());
        }
        Ok(())
    }
}
