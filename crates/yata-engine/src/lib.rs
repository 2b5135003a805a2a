//! yata-engine: the query engine capability behind the yata graph.
//!
//! The graph layer never formats query text. It hands typed requests
//! ([`Select`], [`GraphDefinition`], [`EdgeMatch`]) to a [`QueryEngine`],
//! and every caller-supplied value travels inside them as a bound value.
//!
//! | Engine | Feature | Description |
//! |--------|---------|-------------|
//! | [`MemoryEngine`] | (default) | In-process partitions and edge indexes |
//! | `Neo4jEngine` | `neo4j` | Partitions as labelled nodes in a live Neo4j |

pub mod csv_source;
pub mod engine;
pub mod error;
pub mod memory;
#[cfg(feature = "neo4j")]
pub mod neo4j;
pub mod query;

pub use engine::QueryEngine;
pub use error::{EngineError, Result};
pub use memory::MemoryEngine;
#[cfg(feature = "neo4j")]
pub use neo4j::Neo4jEngine;
pub use query::{
    ColumnInfo, ColumnType, EdgeAnchor, EdgeMatch, EdgeTable, GraphDefinition, MatchedEdge,
    PartitionSource, Predicate, Select, VertexTable,
};
