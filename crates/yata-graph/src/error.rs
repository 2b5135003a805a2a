//! Error types for the yata-graph crate.

use thiserror::Error;

use yata_core::CoreError;
use yata_engine::EngineError;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Node type {0} is already registered")]
    DuplicateType(String),

    #[error("Unknown node type: {0}")]
    UnknownType(String),

    /// A caller named a node type the graph does not have.
    #[error("Invalid node type: {0}")]
    InvalidType(String),

    #[error("Id {id} does not belong to exactly one node type (candidates: {candidates:?})")]
    AmbiguousMembership { id: String, candidates: Vec<String> },

    #[error("Edge partition {name} splits into more than one registered type pair: {candidates:?}")]
    AmbiguousLabel {
        name: String,
        candidates: Vec<(String, String)>,
    },

    #[error("Edge partition {0} does not name a registered type pair")]
    UnresolvedLabel(String),

    #[error("Graph definition error: {0}")]
    GraphDefinition(String),

    #[error("Invalid column {column} for {table}")]
    InvalidColumn { table: String, column: String },

    #[error("Invalid table: {0}")]
    InvalidTable(String),

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Query engine error: {0}")]
    Engine(#[from] EngineError),
}

impl GraphError {
    /// Whether the error was caused by the request rather than the graph.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidType(_)
                | Self::InvalidColumn { .. }
                | Self::InvalidTable(_)
                | Self::Core(CoreError::InvalidDirection(_) | CoreError::InvalidTypeName(_))
        )
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
