use clap::{Parser, Subcommand};
use saga_embed::{EmbeddingEngine, EncoderConfig, FastEmbedEncoder};
use saga_index::config::{EngineConfig, OrchestratorConfig};
use saga_index::graph::ner::HeuristicNerModel;
use saga_index::pipeline::IndexingOrchestrator;
use saga_index::retrieval::{ContextConstraints, RetrievalEngine, SearchFilter, SearchMode};
use saga_index::store::SqliteStore;
use saga_index::{TaskStatus, entity_network};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

/// Inspect and drive a saga narrative index.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the index database file.
    #[arg(short, long, default_value = "saga.db")]
    db: PathBuf,

    /// Optional TOML engine configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index a manuscript file into a project.
    Index {
        /// Path to the text file to ingest.
        path: PathBuf,
        /// Project id the file belongs to.
        #[arg(short, long)]
        project: String,
        /// File id; defaults to the file name.
        #[arg(short, long)]
        file_id: Option<String>,
        /// Re-index even if the content is unchanged.
        #[arg(long)]
        force: bool,
    },
    /// Search indexed chunks.
    Search {
        query: String,
        #[arg(short, long)]
        project: String,
        /// semantic, keyword, or hybrid.
        #[arg(short, long, default_value = "hybrid")]
        mode: SearchMode,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        #[arg(short, long, default_value_t = 0)]
        offset: usize,
        /// Emit JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },
    /// Chunks most similar to a reference chunk.
    Similar {
        chunk_id: i64,
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
        #[arg(short, long, default_value_t = 0.5)]
        threshold: f32,
    },
    /// Assemble RAG context for a query.
    Context {
        query: String,
        #[arg(short, long)]
        project: String,
        #[arg(short, long, default_value_t = 5)]
        max_chunks: usize,
    },
    /// List a project's entities.
    Entities {
        #[arg(short, long)]
        project: String,
        #[arg(long)]
        json: bool,
    },
    /// Entity network around one entity.
    Network {
        entity_id: i64,
        #[arg(short, long, default_value_t = 2)]
        depth: u32,
        #[arg(short, long, default_value_t = 0.2)]
        min_strength: f32,
    },
    /// List a project's tasks.
    Tasks {
        #[arg(short, long)]
        project: String,
    },
    /// Project statistics.
    Stats {
        #[arg(short, long)]
        project: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let engine_config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let store = SqliteStore::open(&args.db).await?;
    let encoder = FastEmbedEncoder::create(EncoderConfig::default()).await?;
    let embed = EmbeddingEngine::new(Arc::new(encoder))
        .with_batch_size(engine_config.embed_batch_size);

    match args.command {
        Commands::Index {
            path,
            project,
            file_id,
            force,
        } => {
            let text = tokio::fs::read_to_string(&path).await?;
            let file_id = file_id.unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "unnamed".to_string())
            });

            let orchestrator = IndexingOrchestrator::new(
                store,
                embed,
                Arc::new(HeuristicNerModel),
                engine_config,
                OrchestratorConfig::default(),
            );
            let task = if force {
                orchestrator.index_file_force(&file_id, &project, &text).await?
            } else {
                orchestrator.index_file(&file_id, &project, &text).await?
            };
            println!("started task {}", task.task_id);

            // Follow the task to completion so the CLI exits with a result.
            loop {
                let status = orchestrator.get_task_status(&task.task_id).await?;
                if status.status.is_terminal() {
                    match status.status {
                        TaskStatus::Completed => {
                            let outcome = status.result.unwrap_or_default();
                            println!(
                                "indexed {} chunks, {} entities created, {} relationships",
                                outcome.chunks_indexed,
                                outcome.entities_created,
                                outcome.relationships_written
                            );
                        }
                        other => {
                            println!(
                                "task ended {other:?}: {}",
                                status.error.unwrap_or_default()
                            );
                        }
                    }
                    break;
                }
                println!("  {}", status.progress.message);
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
        Commands::Search {
            query,
            project,
            mode,
            limit,
            offset,
            json,
        } => {
            let retrieval = RetrievalEngine::new(store, embed);
            let results = retrieval
                .search(&[project], &query, mode, &SearchFilter::default(), limit, offset)
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("{} matches ({}ms)", results.total, results.elapsed_ms);
                for hit in results.hits {
                    println!(
                        "  [{:>5}] {:.3} {} #{}: {}",
                        hit.chunk_id,
                        hit.relevance,
                        hit.file_id,
                        hit.chunk_index,
                        preview(&hit.content)
                    );
                }
            }
        }
        Commands::Similar {
            chunk_id,
            limit,
            threshold,
        } => {
            let retrieval = RetrievalEngine::new(store, embed);
            for hit in retrieval.find_similar(chunk_id, limit, threshold).await? {
                println!(
                    "  [{:>5}] {:.3} {}: {}",
                    hit.chunk_id,
                    hit.similarity,
                    hit.file_id,
                    preview(&hit.content)
                );
            }
        }
        Commands::Context {
            query,
            project,
            max_chunks,
        } => {
            let retrieval = RetrievalEngine::new(store, embed);
            let constraints = ContextConstraints {
                max_chunks,
                ..ContextConstraints::default()
            };
            let bundle = retrieval.assemble_context(&query, &project, &constraints).await?;
            println!("{}", serde_json::to_string_pretty(&bundle)?);
        }
        Commands::Entities { project, json } => {
            let entities = store.project_entities(&project).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entities)?);
            } else {
                for entity in entities {
                    println!(
                        "  [{:>4}] {:10} {} ({} mentions, confidence {:.2})",
                        entity.id.unwrap_or_default(),
                        entity.kind.as_str(),
                        entity.name,
                        entity.mention_count,
                        entity.confidence
                    );
                }
            }
        }
        Commands::Network {
            entity_id,
            depth,
            min_strength,
        } => {
            let network = entity_network(&store, entity_id, depth, min_strength).await?;
            println!("{}", serde_json::to_string_pretty(&network)?);
        }
        Commands::Tasks { project } => {
            for task in store.project_tasks(&project).await? {
                println!(
                    "  {} {:10} {:9} {}/{} {}",
                    task.task_id,
                    task.kind.as_str(),
                    task.status.as_str(),
                    task.progress.current,
                    task.progress.total,
                    task.progress.message
                );
            }
        }
        Commands::Stats { project } => {
            let orchestrator = IndexingOrchestrator::new(
                store,
                embed,
                Arc::new(HeuristicNerModel),
                engine_config,
                OrchestratorConfig::default(),
            );
            let stats = orchestrator.project_statistics(&project).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

fn preview(content: &str) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() > 80 {
        let mut end = 80;
        while !flat.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &flat[..end])
    } else {
        flat
    }
}
