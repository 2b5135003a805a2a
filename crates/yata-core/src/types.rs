//! Core domain types for the yata property graph.
//!
//! Rows and property values are plain `serde_json` values so they can cross
//! the engine boundary and the response boundary without conversion.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;

/// A single row of a tabular partition: column name → value.
pub type Row = serde_json::Map<String, Value>;

// ── Identifiers ───────────────────────────────────────────────────

/// Whether `s` is a plain identifier (`[A-Za-z_][A-Za-z0-9_]*`).
///
/// Partition names, labels, and column names must pass this check before
/// they are handed to a query engine.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// The comparison key of an id value.
///
/// Strings compare as-is, numbers by their decimal rendering, booleans as
/// `true`/`false`. Null, arrays, and objects never match anything.
pub fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Name of a registered node type, normalized to lowercase.
///
/// Type names end up inside partition names and edge labels, so they are
/// restricted to identifier characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeName(String);

impl TypeName {
    pub fn new(raw: &str) -> Result<Self, CoreError> {
        let normalized = raw.trim().to_lowercase();
        if !is_identifier(&normalized) {
            return Err(CoreError::InvalidTypeName(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TypeName {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl std::borrow::Borrow<str> for TypeName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<TypeName> for String {
    fn from(value: TypeName) -> Self {
        value.0
    }
}

// ── Traversal Direction ───────────────────────────────────────────

/// Which edges to follow from the queried node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges whose start endpoint is the queried node.
    Out,
    /// Edges whose end endpoint is the queried node.
    In,
    #[default]
    Both,
}

impl Direction {
    pub fn includes_out(self) -> bool {
        matches!(self, Self::Out | Self::Both)
    }

    pub fn includes_in(self) -> bool {
        matches!(self, Self::In | Self::Both)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Out => "out",
            Self::In => "in",
            Self::Both => "both",
        };
        f.write_str(s)
    }
}

impl FromStr for Direction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "out" => Ok(Self::Out),
            "in" => Ok(Self::In),
            "both" => Ok(Self::Both),
            _ => Err(CoreError::InvalidDirection(s.to_string())),
        }
    }
}

// ── Records ───────────────────────────────────────────────────────

/// A node as returned to callers: identity, type, display name, and the
/// remaining columns of its vertex row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: Value,
    pub node_type: String,
    pub display_name: Option<String>,
    #[serde(default)]
    pub properties: Row,
}

impl NodeRecord {
    /// Split a vertex row into id, display name, and properties.
    pub fn from_row(
        mut row: Row,
        node_type: &TypeName,
        id_field: &str,
        display_field: Option<&str>,
    ) -> Self {
        let id = row.remove(id_field).unwrap_or(Value::Null);
        let display_name = display_field
            .and_then(|field| row.remove(field))
            .and_then(|v| match v {
                Value::Null => None,
                Value::String(s) => Some(s),
                other => Some(other.to_string()),
            });

        Self {
            id,
            node_type: node_type.to_string(),
            display_name,
            properties: row,
        }
    }

    pub fn key(&self) -> Option<String> {
        value_key(&self.id)
    }
}

/// A directed edge between two nodes. `source`/`target` always follow the
/// relationship's own direction, never the direction it was queried from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub edge_type: String,
    pub source: Value,
    pub target: Value,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub properties: Row,
}

// ── Responses ─────────────────────────────────────────────────────

/// Result of a point lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeResponse {
    pub count: usize,
    pub data: Option<NodeRecord>,
}

impl NodeResponse {
    pub fn found(record: NodeRecord) -> Self {
        Self {
            count: 1,
            data: Some(record),
        }
    }
}

/// Neighbors of a node, deduplicated, plus every connecting edge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighborsResponse {
    pub nodes: Vec<NodeRecord>,
    pub edges: Vec<EdgeRecord>,
}

/// Edge counts grouped by neighbor type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborCountResponse {
    pub count: u64,
    pub details: BTreeMap<String, u64>,
}

/// One page of search results, nodes or edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse<T = NodeRecord> {
    pub count: usize,
    pub results: Vec<T>,
}

impl<T> SearchResponse<T> {
    pub fn new(results: Vec<T>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

impl<T> Default for SearchResponse<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_name_is_normalized() {
        let name = TypeName::new("  Officer ").unwrap();
        assert_eq!(name.as_str(), "officer");
        assert_eq!(name, TypeName::new("OFFICER").unwrap());
    }

    #[test]
    fn type_name_rejects_non_identifiers() {
        assert!(TypeName::new("").is_err());
        assert!(TypeName::new("1entity").is_err());
        assert!(TypeName::new("entity; DROP").is_err());
        assert!(TypeName::new("data-set").is_err());
    }

    #[test]
    fn type_name_deserializes_through_validation() {
        let name: TypeName = serde_json::from_str("\"Entity\"").unwrap();
        assert_eq!(name.as_str(), "entity");
        assert!(serde_json::from_str::<TypeName>("\"bad name\"").is_err());
    }

    #[test]
    fn value_key_unifies_numbers_and_strings() {
        assert_eq!(value_key(&json!(12000001)), Some("12000001".to_string()));
        assert_eq!(value_key(&json!("12000001")), Some("12000001".to_string()));
        assert_eq!(value_key(&json!(true)), Some("true".to_string()));
        assert_eq!(value_key(&Value::Null), None);
        assert_eq!(value_key(&json!([1])), None);
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("OUT".parse::<Direction>().unwrap(), Direction::Out);
        assert_eq!("in".parse::<Direction>().unwrap(), Direction::In);
        assert_eq!(" Both ".parse::<Direction>().unwrap(), Direction::Both);
        assert!("sideways".parse::<Direction>().is_err());
        assert!(Direction::Both.includes_out() && Direction::Both.includes_in());
        assert!(!Direction::Out.includes_in());
    }

    #[test]
    fn node_record_splits_row() {
        let row = json!({"node_id": 12000001, "name": "Officer A", "country": "PA"});
        let Value::Object(row) = row else { unreachable!() };
        let officer = TypeName::new("officer").unwrap();

        let record = NodeRecord::from_row(row, &officer, "node_id", Some("name"));
        assert_eq!(record.id, json!(12000001));
        assert_eq!(record.display_name.as_deref(), Some("Officer A"));
        assert_eq!(record.properties.get("country"), Some(&json!("PA")));
        assert!(!record.properties.contains_key("node_id"));
        assert_eq!(record.key().as_deref(), Some("12000001"));
    }

    #[test]
    fn edge_record_serializes_type_field() {
        let edge = EdgeRecord {
            id: "e1".to_string(),
            edge_type: "related_to_officer_entity".to_string(),
            source: json!(12000001),
            target: json!(11000001),
            properties: Row::new(),
        };
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["type"], "related_to_officer_entity");
        assert!(json.get("properties").is_none());
    }

    #[test]
    fn empty_node_response_has_null_data() {
        let json = serde_json::to_value(NodeResponse::default()).unwrap();
        assert_eq!(json, json!({"count": 0, "data": null}));
    }
}
