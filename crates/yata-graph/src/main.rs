//! CLI entry point for the yata graph.
//!
//! Materializes the configured graph, runs one operation against it, and
//! writes the JSON result to stdout. Logs go to stderr.

use std::collections::BTreeMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::{fmt, EnvFilter};

use yata_core::{Direction, EngineKind, YataConfig};
use yata_engine::{MemoryEngine, QueryEngine};
use yata_graph::{discover_edge_partitions, GraphContext, GraphError, SearchRequest};

#[derive(Parser)]
#[command(name = "yata-graph")]
#[command(about = "Typed property graph over tabular sources")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file prefix (default: yata).
    #[arg(short, long, default_value = "yata", global = true)]
    config: String,
}

#[derive(Subcommand)]
enum Command {
    /// Build the graph and print a summary.
    Build,
    /// Build the graph and check that it is fit to serve.
    Verify,
    /// Look up one node.
    Node {
        #[arg(long = "type")]
        node_type: String,
        #[arg(long)]
        id: String,
    },
    /// Direct neighbors of a node with their connecting edges.
    Neighbors {
        #[arg(long = "type")]
        node_type: String,
        #[arg(long)]
        id: String,
        /// out, in, or both.
        #[arg(long, default_value = "both")]
        direction: String,
    },
    /// Neighbor counts by type.
    Count {
        #[arg(long = "type")]
        node_type: String,
        #[arg(long)]
        id: String,
        #[arg(long, default_value = "both")]
        direction: String,
    },
    /// Columns of every vertex and edge partition.
    Schema,
    /// Search nodes or edges by display name and column filters.
    Search {
        /// nodes, edges, or one edge label.
        #[arg(long)]
        table: Option<String>,
        #[arg(long = "type")]
        node_type: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        fuzzy: bool,
        /// Column filter as `column=value`; repeatable.
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    client_error: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = YataConfig::load(&cli.config)?;
    let engine = connect(&config).await?;
    let context = GraphContext::init(engine, config.graph).await?;

    let outcome = run(&context, cli.command).await;
    context.shutdown().await?;

    match outcome {
        Ok(value) => {
            println!("{}", serde_json::to_string(&value)?);
            Ok(())
        }
        Err(e) if client_error(&e) => {
            let body = ErrorBody {
                error: e.to_string(),
                client_error: true,
            };
            println!("{}", serde_json::to_string(&body)?);
            std::process::exit(2);
        }
        Err(e) => Err(e),
    }
}

async fn run(context: &GraphContext, command: Command) -> anyhow::Result<Value> {
    let snapshot = context.snapshot();
    let service = snapshot.traversal();

    let value = match command {
        Command::Build => to_value(snapshot.graph.summary())?,
        Command::Verify => {
            let stats = service.stats().await?;
            let mut problems = stats.problems();

            let discovered = discover_edge_partitions(
                snapshot.engine.as_ref(),
                &snapshot.graph.registry,
                &context.config().relationships,
            )
            .await?;
            if discovered.len() != snapshot.graph.edge_partitions.len() {
                problems.push(format!(
                    "{} edge partitions registered, {} recoverable from partition names",
                    snapshot.graph.edge_partitions.len(),
                    discovered.len()
                ));
            }

            for problem in &problems {
                tracing::warn!(problem = %problem, "Verification failed");
            }
            serde_json::json!({
                "ok": problems.is_empty(),
                "problems": problems,
                "stats": stats,
            })
        }
        Command::Node { node_type, id } => to_value(service.get_node(&node_type, &id).await?)?,
        Command::Neighbors {
            node_type,
            id,
            direction,
        } => {
            let direction: Direction = direction.parse().map_err(GraphError::from)?;
            to_value(service.get_neighbors(&node_type, &id, direction).await?)?
        }
        Command::Count {
            node_type,
            id,
            direction,
        } => {
            let direction: Direction = direction.parse().map_err(GraphError::from)?;
            to_value(service.get_neighbor_counts(&node_type, &id, direction).await?)?
        }
        Command::Schema => to_value(service.get_schema().await?)?,
        Command::Search {
            table,
            node_type,
            display_name,
            fuzzy,
            filters,
            limit,
            offset,
        } => {
            let request = SearchRequest {
                table,
                node_type,
                display_name,
                fuzzy,
                filters: filters
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect::<BTreeMap<_, _>>(),
                limit,
                offset,
            };
            to_value(service.search(&request).await?)?
        }
    };

    Ok(value)
}

/// The engine named in the configuration.
async fn connect(config: &YataConfig) -> anyhow::Result<Arc<dyn QueryEngine>> {
    match config.graph.engine {
        EngineKind::Memory => Ok(Arc::new(MemoryEngine::new())),
        #[cfg(feature = "neo4j")]
        EngineKind::Neo4j => {
            let engine = yata_engine::Neo4jEngine::connect(&config.neo4j).await?;
            Ok(Arc::new(engine))
        }
        #[cfg(not(feature = "neo4j"))]
        EngineKind::Neo4j => Err(anyhow::anyhow!(
            "engine = \"neo4j\" requires building with --features neo4j"
        )),
    }
}

fn to_value<T: Serialize>(value: T) -> serde_json::Result<Value> {
    serde_json::to_value(value)
}

/// Whether `e` is a caller mistake rather than a server fault.
fn client_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<GraphError>()
        .is_some_and(GraphError::is_client_error)
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| format!("expected column=value, got {raw:?}"))
}
