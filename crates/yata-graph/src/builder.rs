//! Property graph definition from registered types and edge partitions.

use yata_engine::{EdgeTable, GraphDefinition, QueryEngine, VertexTable};

use crate::error::{GraphError, Result};
use crate::partition::EdgePartition;
use crate::registry::TypeRegistry;

/// Declares one vertex table per node type and one edge table per edge
/// partition, then registers the graph with the engine.
pub struct GraphBuilder {
    name: String,
}

impl GraphBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// The graph definition for `registry` and `partitions`.
    pub fn define(
        &self,
        registry: &TypeRegistry,
        partitions: &[EdgePartition],
    ) -> Result<GraphDefinition> {
        if registry.is_empty() {
            return Err(GraphError::GraphDefinition(
                "no node types registered".to_string(),
            ));
        }
        if partitions.is_empty() {
            return Err(GraphError::GraphDefinition(
                "no edge partitions to build a graph from".to_string(),
            ));
        }

        let vertices = registry
            .iter()
            .map(|t| VertexTable {
                partition: t.partition.clone(),
                label: t.name.to_string(),
                key: t.id_field.clone(),
            })
            .collect();

        let mut edges = Vec::with_capacity(partitions.len());
        for partition in partitions {
            let start = registry.get(partition.start_type.as_str());
            let end = registry.get(partition.end_type.as_str());
            let (Some(start), Some(end)) = (start, end) else {
                return Err(GraphError::GraphDefinition(format!(
                    "edge partition {} references an unregistered node type",
                    partition.name
                )));
            };

            edges.push(EdgeTable {
                partition: partition.name.clone(),
                label: partition.label.clone(),
                source_key: partition.source_key.clone(),
                source_label: start.name.to_string(),
                destination_key: partition.destination_key.clone(),
                destination_label: end.name.to_string(),
            });
        }

        Ok(GraphDefinition {
            name: self.name.clone(),
            vertices,
            edges,
        })
    }

    /// Define the graph and register it with `engine`.
    pub async fn build(
        &self,
        engine: &dyn QueryEngine,
        registry: &TypeRegistry,
        partitions: &[EdgePartition],
    ) -> Result<GraphDefinition> {
        let definition = self.define(registry, partitions)?;
        engine.create_property_graph(&definition).await?;

        tracing::info!(
            graph = %definition.name,
            vertex_tables = definition.vertices.len(),
            edge_tables = definition.edges.len(),
            "Property graph created"
        );
        Ok(definition)
    }
}
