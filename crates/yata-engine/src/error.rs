//! Errors from query engine operations.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Unknown partition: {0}")]
    UnknownPartition(String),

    #[error("Unknown column {column} in partition {partition}")]
    UnknownColumn { partition: String, column: String },

    #[error("Unknown property graph: {0}")]
    UnknownGraph(String),

    #[error("Unknown label {label} in graph {graph}")]
    UnknownLabel { graph: String, label: String },

    #[error("Label {0} is declared more than once")]
    DuplicateLabel(String),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Referential constraint violated in edge set {label}: {column} = {value} has no matching vertex")]
    ReferentialViolation {
        label: String,
        column: String,
        value: String,
    },

    #[error("Source not found: {}", path.display())]
    SourceNotFound { path: PathBuf },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "neo4j")]
    #[error("Neo4j query error: {0}")]
    Neo4j(#[from] neo4rs::Error),

    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Result decoding error: {0}")]
    Decode(String),

    #[error("Engine task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
