// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node records stored in a narrative graph document.

use crate::property::PropertyRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Type tag of the distinguished entry node
pub const START_NODE_TYPE: &str = "start";

/// Unique identifier for a node, stable across save and load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for NodeId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A node instance in the graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Unique instance ID
    pub id: NodeId,
    /// Node type tag, resolved through the registry
    pub type_tag: String,
    /// Position in the authoring canvas. Never read at runtime.
    pub position: [f32; 2],
    /// Properties in declaration order
    pub properties: Vec<PropertyRecord>,
}

impl NodeRecord {
    /// Create a node with a fresh ID and no properties
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self::with_id(NodeId::new(), type_tag)
    }

    /// Create a node with a known ID
    pub fn with_id(id: NodeId, type_tag: impl Into<String>) -> Self {
        Self {
            id,
            type_tag: type_tag.into(),
            position: [0.0, 0.0],
            properties: Vec::new(),
        }
    }

    /// Set the position
    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = [x, y];
        self
    }

    /// Add or replace a property, builder style
    pub fn with_property(mut self, property: PropertyRecord) -> Self {
        self.set_property(property);
        self
    }

    /// Whether this is the entry node
    pub fn is_start(&self) -> bool {
        self.type_tag == START_NODE_TYPE
    }

    /// Get a property by name
    pub fn property(&self, name: &str) -> Option<&PropertyRecord> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Add a property, replacing any existing one with the same name in place
    pub fn set_property(&mut self, property: PropertyRecord) {
        match self.properties.iter_mut().find(|p| p.name == property.name) {
            Some(existing) => *existing = property,
            None => self.properties.push(property),
        }
    }

    /// Remove a property by name
    pub fn remove_property(&mut self, name: &str) -> Option<PropertyRecord> {
        let index = self.properties.iter().position(|p| p.name == name)?;
        Some(self.properties.remove(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyType;

    #[test]
    fn test_set_property_keeps_order() {
        let mut node = NodeRecord::new("text")
            .with_property(PropertyRecord::new("speaker", PropertyType::String, "(value:\"A\")"))
            .with_property(PropertyRecord::new("text", PropertyType::String, "(value:\"B\")"));

        node.set_property(PropertyRecord::new("speaker", PropertyType::String, "(value:\"C\")"));

        let names: Vec<_> = node.properties.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["speaker", "text"]);
        assert_eq!(node.property("speaker").unwrap().encoded_value, "(value:\"C\")");
    }

    #[test]
    fn test_node_id_text_form() {
        let id = NodeId::new();
        assert_eq!(id.to_string().parse::<NodeId>().unwrap(), id);
        assert!("not-a-node".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_remove_property() {
        let mut node = NodeRecord::new("end")
            .with_property(PropertyRecord::new("label", PropertyType::String, "(value:\"x\")"));
        assert!(node.remove_property("label").is_some());
        assert!(node.remove_property("label").is_none());
        assert!(!node.is_start());
    }
}
