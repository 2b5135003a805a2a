//! yata-core: Shared types, configuration, and error handling for the yata graph.
//!
//! This crate provides the foundational pieces used by the engine and graph crates:
//! - Node type names, traversal directions, and the id-key comparison rule
//! - Node/edge records and the response shapes of the traversal operations
//! - Source configuration (vertex and relationship tables)
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    EngineKind, GraphSourceConfig, Neo4jSettings, NodeSourceConfig, RelationshipSourceConfig,
    YataConfig,
};
pub use error::CoreError;
pub use types::{
    is_identifier, value_key, Direction, EdgeRecord, NeighborCountResponse, NeighborsResponse,
    NodeRecord, NodeResponse, Row, SearchResponse, TypeName,
};
