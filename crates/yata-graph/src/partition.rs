//! Edge partitioning: one engine partition per `(start_type, end_type)` pair.

use std::collections::BTreeMap;

use serde::Serialize;

use yata_core::TypeName;
use yata_engine::{PartitionSource, QueryEngine};

use crate::enrich::EnrichedRelationship;
use crate::error::{GraphError, Result};
use crate::label::resolve_label;
use crate::registry::TypeRegistry;

/// Prefix of every edge partition name.
pub const PARTITION_PREFIX: &str = "rel_";
/// Prefix of every edge label.
pub const LABEL_PREFIX: &str = "related_to_";

pub fn partition_name(start: &TypeName, end: &TypeName) -> String {
    format!("{PARTITION_PREFIX}{start}_{end}")
}

pub fn edge_label(start: &TypeName, end: &TypeName) -> String {
    format!("{LABEL_PREFIX}{start}_{end}")
}

/// A registered edge partition. The type pair is carried alongside the name
/// so nothing downstream has to parse it back out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgePartition {
    pub name: String,
    pub label: String,
    pub start_type: TypeName,
    pub end_type: TypeName,
    /// Column referencing the start vertex's id.
    pub source_key: String,
    /// Column referencing the end vertex's id.
    pub destination_key: String,
    pub rows: u64,
}

impl EdgePartition {
    pub fn new(
        start_type: TypeName,
        end_type: TypeName,
        source_key: &str,
        destination_key: &str,
        rows: u64,
    ) -> Self {
        Self {
            name: partition_name(&start_type, &end_type),
            label: edge_label(&start_type, &end_type),
            start_type,
            end_type,
            source_key: source_key.to_string(),
            destination_key: destination_key.to_string(),
            rows,
        }
    }
}

/// Groups enriched relationships by type pair and registers each group.
pub struct EdgePartitioner<'a> {
    registry: &'a TypeRegistry,
    start_field: &'a str,
    end_field: &'a str,
}

impl<'a> EdgePartitioner<'a> {
    pub fn new(registry: &'a TypeRegistry, start_field: &'a str, end_field: &'a str) -> Self {
        Self {
            registry,
            start_field,
            end_field,
        }
    }

    /// Relationships grouped by `(start_type, end_type)`, in pair order.
    pub fn group<'r>(
        &self,
        relationships: &'r [EnrichedRelationship],
    ) -> BTreeMap<(TypeName, TypeName), Vec<&'r EnrichedRelationship>> {
        let mut groups: BTreeMap<_, Vec<_>> = BTreeMap::new();
        for rel in relationships {
            groups
                .entry((rel.start_type.clone(), rel.end_type.clone()))
                .or_default()
                .push(rel);
        }
        groups
    }

    /// Register one partition per non-empty type pair.
    ///
    /// Each name must resolve back to exactly its own pair; a name that
    /// also splits into another registered pair aborts the build.
    pub async fn partition(
        &self,
        engine: &dyn QueryEngine,
        relationships: &[EnrichedRelationship],
    ) -> Result<Vec<EdgePartition>> {
        let mut partitions = Vec::new();

        for ((start, end), group) in self.group(relationships) {
            let name = partition_name(&start, &end);
            let resolved = resolve_label(&name, self.registry)?;
            if resolved != (start.clone(), end.clone()) {
                return Err(GraphError::AmbiguousLabel {
                    name,
                    candidates: vec![
                        (start.to_string(), end.to_string()),
                        (resolved.0.to_string(), resolved.1.to_string()),
                    ],
                });
            }

            let rows = group
                .iter()
                .map(|rel| rel.raw.to_row(self.start_field, self.end_field))
                .collect();
            let count = engine
                .register_partition(&name, PartitionSource::Rows(rows))
                .await?;
            tracing::info!(partition = %name, rows = count, "Edge partition registered");

            partitions.push(EdgePartition::new(
                start,
                end,
                self.start_field,
                self.end_field,
                count,
            ));
        }

        Ok(partitions)
    }
}
