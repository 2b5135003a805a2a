//! Typed logical requests understood by every [`QueryEngine`](crate::QueryEngine).
//!
//! Identifiers (partitions, columns, labels) are checked with
//! [`is_identifier`] before a request reaches a backend; values are carried
//! as data and never spliced into query text.

use std::path::PathBuf;

use serde::Serialize;
use serde_json::Value;

use yata_core::{is_identifier, Row};

use crate::error::{EngineError, Result};

fn ensure_identifier(s: &str) -> Result<()> {
    if is_identifier(s) {
        Ok(())
    } else {
        Err(EngineError::InvalidIdentifier(s.to_string()))
    }
}

// ── Partitions ───────────────────────────────────────────────────

/// Where a partition's rows come from.
#[derive(Debug, Clone)]
pub enum PartitionSource {
    /// A CSV file with a header row.
    Csv { path: PathBuf },
    /// Rows produced in-process (enriched relationships, edge partitions).
    Rows(Vec<Row>),
}

/// Logical column type, inferred from the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Bigint,
    Double,
    Boolean,
    Varchar,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: ColumnType,
}

// ── Relational Selects ───────────────────────────────────────────

/// A row filter. All predicates of a [`Select`] must hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Column value equals `value` under the id-key rule.
    Eq { column: String, value: Value },
    /// Column value equals any of `values` under the id-key rule.
    In { column: String, values: Vec<Value> },
    /// Column value contains `needle`, ignoring case.
    Contains { column: String, needle: String },
}

impl Predicate {
    pub fn eq(column: &str, value: Value) -> Self {
        Self::Eq {
            column: column.to_string(),
            value,
        }
    }

    pub fn is_in(column: &str, values: Vec<Value>) -> Self {
        Self::In {
            column: column.to_string(),
            values,
        }
    }

    pub fn contains(column: &str, needle: &str) -> Self {
        Self::Contains {
            column: column.to_string(),
            needle: needle.to_string(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Eq { column, .. } | Self::In { column, .. } | Self::Contains { column, .. } => {
                column
            }
        }
    }
}

/// A filtered, optionally projected and paged scan of one partition.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub partition: String,
    pub predicates: Vec<Predicate>,
    pub columns: Option<Vec<String>>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Select {
    pub fn from(partition: &str) -> Self {
        Self {
            partition: partition.to_string(),
            predicates: Vec::new(),
            columns: None,
            offset: 0,
            limit: None,
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn project(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = Some(limit);
        self
    }

    pub fn validate(&self) -> Result<()> {
        ensure_identifier(&self.partition)?;
        for predicate in &self.predicates {
            ensure_identifier(predicate.column())?;
        }
        for column in self.columns.iter().flatten() {
            ensure_identifier(column)?;
        }
        Ok(())
    }
}

// ── Property Graph Definition ────────────────────────────────────

/// A vertex partition exposed under `label`, keyed by `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VertexTable {
    pub partition: String,
    pub label: String,
    pub key: String,
}

/// An edge partition exposed under `label`. `source_key` references the
/// key of the `source_label` vertex table, `destination_key` the key of
/// the `destination_label` one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeTable {
    pub partition: String,
    pub label: String,
    pub source_key: String,
    pub source_label: String,
    pub destination_key: String,
    pub destination_label: String,
}

/// A named property graph over existing partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphDefinition {
    pub name: String,
    pub vertices: Vec<VertexTable>,
    pub edges: Vec<EdgeTable>,
}

impl GraphDefinition {
    pub fn validate(&self) -> Result<()> {
        ensure_identifier(&self.name)?;
        for v in &self.vertices {
            ensure_identifier(&v.partition)?;
            ensure_identifier(&v.label)?;
            ensure_identifier(&v.key)?;
        }
        for e in &self.edges {
            for ident in [
                &e.partition,
                &e.label,
                &e.source_key,
                &e.source_label,
                &e.destination_key,
                &e.destination_label,
            ] {
                ensure_identifier(ident)?;
            }
        }
        Ok(())
    }

    pub fn vertex(&self, label: &str) -> Option<&VertexTable> {
        self.vertices.iter().find(|v| v.label == label)
    }

    pub fn edge(&self, label: &str) -> Option<&EdgeTable> {
        self.edges.iter().find(|e| e.label == label)
    }
}

// ── Traversal ────────────────────────────────────────────────────

/// Which endpoint of an edge the match is anchored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeAnchor {
    Source,
    Target,
}

/// `(a)-[:label]->(b)` with `a` (anchor `Source`) or `b` (anchor `Target`)
/// bound to `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeMatch {
    pub graph: String,
    pub label: String,
    pub anchor: EdgeAnchor,
    pub value: Value,
}

impl EdgeMatch {
    pub fn validate(&self) -> Result<()> {
        ensure_identifier(&self.graph)?;
        ensure_identifier(&self.label)
    }
}

/// One matched edge: endpoint key values plus the remaining edge columns.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedEdge {
    pub source: Value,
    pub target: Value,
    pub properties: Row,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn select_builder_and_validation() {
        let select = Select::from("nodes_officers")
            .filter(Predicate::eq("node_id", json!("12000001")))
            .project(&["node_id", "name"])
            .page(10, 5);
        assert_eq!(select.offset, 10);
        assert_eq!(select.limit, Some(5));
        select.validate().unwrap();

        let hostile = Select::from("nodes_officers")
            .filter(Predicate::eq("node_id = 1 OR 1", json!(1)));
        assert!(matches!(
            hostile.validate(),
            Err(EngineError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn values_are_not_identifier_checked() {
        let select = Select::from("nodes").filter(Predicate::eq("name", json!("x'); DROP --")));
        select.validate().unwrap();
    }

    #[test]
    fn column_type_serializes_uppercase() {
        let col = ColumnInfo {
            name: "node_id".to_string(),
            data_type: ColumnType::Bigint,
        };
        assert_eq!(
            serde_json::to_value(&col).unwrap(),
            json!({"name": "node_id", "type": "BIGINT"})
        );
    }
}
