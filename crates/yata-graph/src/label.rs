//! Recovering the type pair encoded in an edge partition name.
//!
//! Partition names join two type names with `_` behind a `rel_` prefix, and
//! type names may themselves contain `_`. A name is only accepted when
//! exactly one split point yields two registered types.

use yata_core::{RelationshipSourceConfig, TypeName};
use yata_engine::QueryEngine;

use crate::error::{GraphError, Result};
use crate::partition::{EdgePartition, PARTITION_PREFIX};
use crate::registry::TypeRegistry;

/// Every `(start, end)` split of `name` whose halves are both registered.
pub fn candidate_splits(name: &str, registry: &TypeRegistry) -> Vec<(TypeName, TypeName)> {
    let Some(content) = name.strip_prefix(PARTITION_PREFIX) else {
        return Vec::new();
    };

    content
        .match_indices('_')
        .filter_map(|(i, _)| {
            let start = registry.get(&content[..i])?;
            let end = registry.get(&content[i + 1..])?;
            Some((start.name.clone(), end.name.clone()))
        })
        .collect()
}

/// The `(start, end)` type pair encoded in an edge partition name.
pub fn resolve_label(name: &str, registry: &TypeRegistry) -> Result<(TypeName, TypeName)> {
    let mut candidates = candidate_splits(name, registry);
    match candidates.len() {
        0 => Err(GraphError::UnresolvedLabel(name.to_string())),
        1 => Ok(candidates.remove(0)),
        _ => Err(GraphError::AmbiguousLabel {
            name: name.to_string(),
            candidates: candidates
                .into_iter()
                .map(|(s, e)| (s.to_string(), e.to_string()))
                .collect(),
        }),
    }
}

/// Edge partitions already registered with `engine`, recovered from their
/// names alone.
///
/// `rel_` partitions that name no registered pair are skipped with a
/// warning; ambiguous ones abort.
pub async fn discover_edge_partitions(
    engine: &dyn QueryEngine,
    registry: &TypeRegistry,
    relationships: &RelationshipSourceConfig,
) -> Result<Vec<EdgePartition>> {
    let mut found = Vec::new();

    for name in engine.list_partitions().await? {
        if !name.starts_with(PARTITION_PREFIX) {
            continue;
        }
        let (start, end) = match resolve_label(&name, registry) {
            Ok(pair) => pair,
            Err(GraphError::UnresolvedLabel(_)) => {
                tracing::warn!(partition = %name, "Skipping partition with no registered type pair");
                continue;
            }
            Err(e) => return Err(e),
        };

        let rows = engine.count_rows(&name).await?;
        found.push(EdgePartition::new(
            start,
            end,
            &relationships.start_field,
            &relationships.end_field,
            rows,
        ));
    }

    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use yata_core::Row;
    use yata_engine::{MemoryEngine, PartitionSource};

    fn registry(names: &[&str]) -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        for name in names {
            registry
                .register(name, &format!("nodes_{name}"), "node_id", None)
                .unwrap();
        }
        registry
    }

    fn pair(s: &str, e: &str) -> (TypeName, TypeName) {
        (TypeName::new(s).unwrap(), TypeName::new(e).unwrap())
    }

    #[test]
    fn test_resolve_simple_label() {
        let registry = registry(&["officer", "entity", "address"]);
        assert_eq!(
            resolve_label("rel_officer_entity", &registry).unwrap(),
            pair("officer", "entity")
        );
        assert_eq!(
            resolve_label("rel_entity_entity", &registry).unwrap(),
            pair("entity", "entity")
        );
    }

    #[test]
    fn test_resolve_types_containing_separator() {
        let registry = registry(&["other_entity", "entity", "address"]);
        assert_eq!(
            resolve_label("rel_other_entity_address", &registry).unwrap(),
            pair("other_entity", "address")
        );
        assert_eq!(
            resolve_label("rel_entity_other_entity", &registry).unwrap(),
            pair("entity", "other_entity")
        );
    }

    #[test]
    fn test_ambiguous_label_is_rejected() {
        // rel_a_b_c splits as (a, b_c) and (a_b, c)
        let registry = registry(&["a", "b_c", "a_b", "c"]);
        let err = resolve_label("rel_a_b_c", &registry).unwrap_err();
        match err {
            GraphError::AmbiguousLabel { name, candidates } => {
                assert_eq!(name, "rel_a_b_c");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("expected AmbiguousLabel, got {other:?}"),
        }
    }

    #[test]
    fn test_unresolved_label() {
        let registry = registry(&["officer", "entity"]);
        for name in ["rel_officer_ship", "officer_entity", "rel_", "rel_officerentity"] {
            assert!(
                matches!(resolve_label(name, &registry), Err(GraphError::UnresolvedLabel(_))),
                "{name} should not resolve"
            );
        }
    }

    #[tokio::test]
    async fn test_discover_edge_partitions() {
        let registry = registry(&["officer", "entity"]);
        let engine = MemoryEngine::new();
        let row: Row = match json!({"node_id_start": 1, "node_id_end": 2}) {
            serde_json::Value::Object(m) => m,
            _ => unreachable!(),
        };
        for name in ["rel_officer_entity", "rel_ship_entity", "nodes_officer"] {
            engine
                .register_partition(name, PartitionSource::Rows(vec![row.clone()]))
                .await
                .unwrap();
        }

        let rels = RelationshipSourceConfig::new("rels.csv");
        let found = discover_edge_partitions(&engine, &registry, &rels).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "rel_officer_entity");
        assert_eq!(found[0].label, "related_to_officer_entity");
        assert_eq!(found[0].rows, 1);
    }
}
