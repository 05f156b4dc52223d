use clap::{Parser, Subcommand};
use serde::Serialize;
use somethink_retriever::{
    config::CatalogConfig,
    retrieval::{
        extractor::PlainTextExtractor,
        indexing_engine::{Indexer, IndexingEvent, RunReport, UpdateOutcome},
        searcher::Searcher,
        topic_sync::{rebuild_topics, restore_provider},
    },
    storage::{CatalogStore, FileStore, TopicStore, sqlite_store::SqliteStore},
};
use somethink_topics::{TopicProvider, create_provider};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

const DEFAULT_DB_FILE: &str = ".somethink.db";

/// Search and maintain a catalog of local files.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Database file, overriding the configuration
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Crawl directories and update the catalog
    Index {
        /// Roots to crawl; defaults to `index_paths` from the configuration
        paths: Vec<PathBuf>,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Re-index a single file, removing it if it no longer exists
    Update { path: PathBuf },
    /// Remove a file from the catalog
    Remove { path: PathBuf },
    /// Ranked search over the catalog
    Search {
        query: String,
        /// Maximum number of results; defaults to `max_results`
        #[arg(short, long)]
        limit: Option<usize>,
        /// Rank by the text signal only
        #[arg(long)]
        no_semantic: bool,
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show catalog statistics
    Stats {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Show indexer state and catalog health
    Status {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Topic clustering
    Topics {
        #[command(subcommand)]
        command: TopicCommands,
    },
    /// Delete every record from the catalog
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Clear the catalog, then crawl from scratch
    Rebuild {
        paths: Vec<PathBuf>,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum TopicCommands {
    /// Recluster the catalog and store the new topics
    Rebuild,
    /// List stored topics
    List {
        /// Output format
        #[arg(short, long, default_value = "summary")]
        format: OutputFormat,
    },
    /// Find the topic closest to a query
    Query { text: String },
    /// Show a topic and its files
    Show {
        id: i64,
        /// Maximum number of files listed
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum OutputFormat {
    Summary,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Invalid format: {s}")),
        }
    }
}

#[derive(Serialize)]
struct HitOutput<'a> {
    path: &'a str,
    file_type: String,
    score: f64,
    topic_id: Option<i64>,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else if args.quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    execute(args).await
}

async fn execute(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => CatalogConfig::load(path).await?,
        None => CatalogConfig::default(),
    };
    let db_path = args
        .db
        .clone()
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE));
    let store = Arc::new(SqliteStore::open(&db_path).await?);

    match args.command {
        Commands::Index { paths, format } => {
            let roots = resolve_roots(paths, &config)?;
            let report = run_indexer(store, &config, roots).await?;
            print_report(&report, &format)?;
        }
        Commands::Update { path } => {
            let indexer = Indexer::new(store, Arc::new(extractor(&config)), &config)?;
            match indexer.update_single(&path).await? {
                UpdateOutcome::Indexed(id) => println!("Indexed {} as file {}", path.display(), id),
                UpdateOutcome::Unchanged => println!("{} is up to date", path.display()),
                UpdateOutcome::Removed => println!("Removed {}", path.display()),
                UpdateOutcome::Skipped => println!("Skipped {}", path.display()),
            }
        }
        Commands::Remove { path } => {
            let indexer = Indexer::new(store, Arc::new(extractor(&config)), &config)?;
            if indexer.remove(&path).await? {
                println!("Removed {}", path.display());
            } else {
                println!("{} is not in the catalog", path.display());
            }
        }
        Commands::Search {
            query,
            limit,
            no_semantic,
            format,
        } => {
            let provider = create_provider(&config.topics)?;
            restore_provider(store.as_ref(), provider.as_ref()).await?;
            let searcher = Searcher::new(store, Some(provider));

            let limit = limit.unwrap_or(config.max_results);
            let hits = searcher.search(&query, limit, !no_semantic).await?;

            match format {
                OutputFormat::Json => {
                    let output: Vec<HitOutput> = hits
                        .iter()
                        .map(|hit| HitOutput {
                            path: &hit.record.path,
                            file_type: hit.record.file_type.to_string(),
                            score: hit.score,
                            topic_id: hit.record.topic_id,
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Summary => {
                    println!("Found {} results for {:?}:", hits.len(), query);
                    for hit in hits {
                        println!(
                            "  [{:.2}] {} ({})",
                            hit.score, hit.record.path, hit.record.file_type
                        );
                    }
                }
            }
        }
        Commands::Stats { format } => {
            let stats = store.stats().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Summary => {
                    println!("Database: {}", db_path.display());
                    println!("Total files: {}", stats.total_files);
                    println!("Classified files: {}", stats.classified_files);
                    println!("Topics: {}", stats.total_topics);
                    for (file_type, count) in &stats.files_by_type {
                        println!("  {file_type}: {count}");
                    }
                }
            }
        }
        Commands::Status { format } => {
            let provider = create_provider(&config.topics)?;
            restore_provider(store.as_ref(), provider.as_ref()).await?;
            let indexer = Indexer::new(store, Arc::new(extractor(&config)), &config)?;
            let status = indexer.status().await.with_provider(provider.as_ref()).await;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
                OutputFormat::Summary => println!("{status}"),
            }
        }
        Commands::Topics { command } => run_topics(store, &config, command).await?,
        Commands::Clear { yes } => {
            if !yes {
                anyhow::bail!("Refusing to clear {} without --yes", db_path.display());
            }
            store.clear_all().await?;
            println!("Cleared {}", db_path.display());
        }
        Commands::Rebuild { paths, yes } => {
            if !yes {
                anyhow::bail!("Refusing to rebuild {} without --yes", db_path.display());
            }
            // resolved first so a rebuild without roots leaves the catalog alone
            let roots = resolve_roots(paths, &config)?;
            store.clear_all().await?;
            let report = run_indexer(store, &config, roots).await?;
            print_report(&report, &OutputFormat::Summary)?;
        }
    }

    Ok(())
}

/// Roots from the command line, falling back to `index_paths`.
fn resolve_roots(paths: Vec<PathBuf>, config: &CatalogConfig) -> anyhow::Result<Vec<PathBuf>> {
    let roots = if paths.is_empty() {
        config.index_paths.clone()
    } else {
        paths
    };
    if roots.is_empty() {
        anyhow::bail!("No paths given and no index_paths configured");
    }
    Ok(roots)
}

fn extractor(config: &CatalogConfig) -> PlainTextExtractor {
    PlainTextExtractor::new(config.max_extract_bytes)
}

async fn run_indexer(
    store: Arc<SqliteStore>,
    config: &CatalogConfig,
    roots: Vec<PathBuf>,
) -> anyhow::Result<RunReport> {
    let indexer = Indexer::new(store, Arc::new(extractor(config)), config)?;
    let events = indexer.events();
    indexer.start(roots)?;

    while let Ok(event) = events.recv_async().await {
        match event {
            IndexingEvent::Progress {
                current,
                total,
                message,
            } => tracing::debug!("[{current}/{total}] {message}"),
            IndexingEvent::Completed(report) => return Ok(report),
        }
    }
    indexer
        .wait_for_completion()
        .await
        .ok_or_else(|| anyhow::anyhow!("Indexing run ended without a report"))
}

fn print_report(report: &RunReport, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Summary => {
            println!(
                "Indexing {}: {}/{} files processed",
                report.outcome, report.succeeded, report.total
            );
            if report.failed_roots > 0 {
                println!("Roots that could not be opened: {}", report.failed_roots);
            }
            if let Some(error) = &report.error {
                println!("Error: {error}");
            }
        }
    }
    Ok(())
}

async fn run_topics(
    store: Arc<SqliteStore>,
    config: &CatalogConfig,
    command: TopicCommands,
) -> anyhow::Result<()> {
    match command {
        TopicCommands::Rebuild => {
            let provider: Arc<dyn TopicProvider> = create_provider(&config.topics)?;
            let report = rebuild_topics(store.as_ref(), provider.as_ref(), &config.topics).await?;
            if report.skipped {
                println!(
                    "Clustering skipped ({} documents with text, provider {})",
                    report.documents,
                    provider.provider_name()
                );
            } else {
                println!(
                    "Discovered {} topics over {} documents ({} classified, {} outliers)",
                    report.topics, report.documents, report.classified, report.outliers
                );
            }
        }
        TopicCommands::List { format } => {
            let topics = store.list_topics().await?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&topics)?),
                OutputFormat::Summary => {
                    println!("Found {} topics:", topics.len());
                    for topic in topics {
                        println!(
                            "  {}: {} [{}]",
                            topic.id,
                            topic.name,
                            topic.keywords.join(", ")
                        );
                    }
                }
            }
        }
        TopicCommands::Query { text } => {
            let provider = create_provider(&config.topics)?;
            restore_provider(store.as_ref(), provider.as_ref()).await?;
            let topic = match provider.find_topic(&text).await? {
                Some(id) => store.get_topic(id).await?,
                None => None,
            };
            match topic {
                Some(topic) => println!(
                    "Topic {}: {} [{}]",
                    topic.id,
                    topic.name,
                    topic.keywords.join(", ")
                ),
                None => println!("No topic matches {text:?}"),
            }
        }
        TopicCommands::Show { id, limit } => {
            let topic = store
                .get_topic(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Topic {} not found", id))?;
            println!("Topic {}: {}", topic.id, topic.name);
            println!("Keywords: {}", topic.keywords.join(", "));
            println!("Representative documents:");
            for path in &topic.representative_docs {
                println!("  {path}");
            }
            let files = store.list_by_topic(id, limit).await?;
            println!("Files ({}):", files.len());
            for file in files {
                println!("  {}", file.path);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use somethink_retriever::storage::{FileType, NewFile};

    #[test]
    fn test_roots_fall_back_to_configuration() {
        let config = CatalogConfig::default().with_index_paths(vec!["/configured".into()]);
        assert_eq!(
            resolve_roots(vec!["/given".into()], &config).unwrap(),
            vec![PathBuf::from("/given")]
        );
        assert_eq!(
            resolve_roots(Vec::new(), &config).unwrap(),
            vec![PathBuf::from("/configured")]
        );
    }

    #[tokio::test]
    async fn test_rebuild_without_roots_keeps_catalog() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let db = dir.path().join("catalog.db");
        let store = SqliteStore::open(&db).await?;
        store
            .upsert_file(&NewFile {
                path: "/kept.txt".to_string(),
                filename: "kept.txt".to_string(),
                extension: ".txt".to_string(),
                file_type: FileType::Document,
                size: 4,
                modified_time: chrono::Utc::now(),
                created_time: chrono::Utc::now(),
                content_text: "kept".to_string(),
            })
            .await?;
        store.close().await;

        let db_arg = db.to_string_lossy().into_owned();
        let args =
            Args::try_parse_from(["somethink", "--db", db_arg.as_str(), "rebuild", "--yes"])?;
        let result = execute(args).await;
        assert!(result.is_err());

        let store = SqliteStore::open(&db).await?;
        assert_eq!(store.stats().await?.total_files, 1);
        Ok(())
    }

    #[test]
    fn test_topics_query_parses() {
        let args = Args::try_parse_from(["somethink", "topics", "query", "tax return"]).unwrap();
        assert!(matches!(
            args.command,
            Commands::Topics {
                command: TopicCommands::Query { ref text }
            } if text == "tax return"
        ));
    }
}
