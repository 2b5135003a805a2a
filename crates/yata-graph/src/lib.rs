//! yata-graph: typed property graph over tabular sources.
//!
//! Registers one vertex partition per node type, types each untyped
//! relationship by looking its endpoints up in the vertex partitions,
//! splits relationships into one edge partition per `(start, end)` type
//! pair, and registers the result as a property graph with a
//! [`QueryEngine`](yata_engine::QueryEngine). The [`TraversalService`]
//! answers node, neighbor, neighbor-count, schema, and search requests
//! against it.

pub mod builder;
pub mod context;
pub mod enrich;
pub mod error;
pub mod inspect;
pub mod label;
pub mod materialize;
pub mod partition;
pub mod registry;
pub mod traversal;

pub use builder::GraphBuilder;
pub use context::{GraphContext, GraphSnapshot};
pub use enrich::{EnrichedRelationship, EnrichmentReport, RawRelationship, RelationshipEnricher};
pub use error::{GraphError, Result};
pub use inspect::{GraphSchema, GraphStats, SearchRequest, SearchResults, SearchTable};
pub use label::{discover_edge_partitions, resolve_label};
pub use materialize::{materialize, BuildSummary, PropertyGraph};
pub use partition::{edge_label, partition_name, EdgePartition, EdgePartitioner};
pub use registry::{MembershipIndex, NodeType, TypeRegistry};
pub use traversal::TraversalService;
