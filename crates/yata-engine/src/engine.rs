//! The query engine contract.

use async_trait::async_trait;

use yata_core::Row;

use crate::error::Result;
use crate::query::{ColumnInfo, EdgeMatch, GraphDefinition, MatchedEdge, PartitionSource, Select};

/// Everything the graph layer needs from a relational/graph query engine.
///
/// Implementations must be safe to share across tasks: traversal requests
/// run concurrently against one engine handle. Failures are returned as-is,
/// nothing here retries.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Register (or replace) a named partition. Returns its row count.
    async fn register_partition(&self, name: &str, source: PartitionSource) -> Result<u64>;

    /// Names of all registered partitions, sorted.
    async fn list_partitions(&self) -> Result<Vec<String>>;

    /// Column names and inferred types of a partition.
    async fn describe_partition(&self, name: &str) -> Result<Vec<ColumnInfo>>;

    /// Number of rows in a partition.
    async fn count_rows(&self, name: &str) -> Result<u64>;

    /// Run a filtered scan.
    async fn select(&self, query: &Select) -> Result<Vec<Row>>;

    /// Register (or replace) a property graph, enforcing referential
    /// constraints between edge and vertex partitions.
    async fn create_property_graph(&self, definition: &GraphDefinition) -> Result<()>;

    /// Edges of one labelled edge set anchored at one endpoint value.
    async fn match_edges(&self, pattern: &EdgeMatch) -> Result<Vec<MatchedEdge>>;

    /// Like [`match_edges`](Self::match_edges) but only the number of matches.
    async fn count_edges(&self, pattern: &EdgeMatch) -> Result<u64>;

    /// Release backend resources.
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
