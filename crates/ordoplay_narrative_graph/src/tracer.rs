// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runtime traversal over a loaded document.
//!
//! The tracer indexes a document for adjacency lookups and keeps a
//! single cursor marking the node the game is currently at. It never
//! modifies the document.

use crate::codec::{CodecError, PropertyCodec};
use crate::connection::LinkRecord;
use crate::flag::{FlagState, FlagValue};
use crate::graph::GraphDocument;
use crate::node::{NodeId, NodeRecord};
use crate::property::{FromPropertyValue, PropertyValue};
use crate::registry::{NarrativeNode, NodeTypeRegistry};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Current position of the tracer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    /// No node selected
    #[default]
    Unselected,
    /// The given node is selected
    Selected(NodeId),
}

impl Cursor {
    /// The selected node, if any
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::Unselected => None,
            Self::Selected(id) => Some(*id),
        }
    }
}

/// A property that could not be applied during materialization
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyIssue {
    /// Property name
    pub name: String,
    /// Why it was skipped
    pub reason: String,
}

/// A node instantiated through the registry, with typed fields
#[derive(Debug)]
pub struct MaterializedNode {
    /// The typed node
    pub node: Box<dyn NarrativeNode>,
    /// Properties that were treated as absent
    pub issues: Vec<PropertyIssue>,
}

impl MaterializedNode {
    /// Downcast to a concrete node type
    pub fn downcast_ref<T: NarrativeNode>(&self) -> Option<&T> {
        self.node.downcast_ref::<T>()
    }
}

/// Read-only runtime index over a document
#[derive(Debug)]
pub struct GraphTracer {
    document: GraphDocument,
    registry: Arc<NodeTypeRegistry>,
    codec: PropertyCodec,
    /// Outgoing link indices per source node, in link order
    adjacency: HashMap<NodeId, Vec<usize>>,
    links: Vec<LinkRecord>,
    cursor: Cursor,
}

impl GraphTracer {
    /// Index a document for traversal
    pub fn new(document: GraphDocument, registry: Arc<NodeTypeRegistry>, codec: PropertyCodec) -> Self {
        let links: Vec<LinkRecord> = document.links().cloned().collect();
        let mut adjacency: HashMap<NodeId, Vec<usize>> = HashMap::new();
        for (index, link) in links.iter().enumerate() {
            adjacency.entry(link.source_node_id).or_default().push(index);
        }

        Self {
            document,
            registry,
            codec,
            adjacency,
            links,
            cursor: Cursor::Unselected,
        }
    }

    /// The traced document
    pub fn document(&self) -> &GraphDocument {
        &self.document
    }

    /// Give the document back
    pub fn into_document(self) -> GraphDocument {
        self.document
    }

    /// Current cursor
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// The node under the cursor
    pub fn current_node(&self) -> Option<&NodeRecord> {
        self.cursor.node_id().and_then(|id| self.document.node(id))
    }

    /// Select a node. Unknown IDs clear the selection.
    pub fn select_node(&mut self, node_id: NodeId) -> Option<&NodeRecord> {
        self.cursor = if self.document.node(node_id).is_some() {
            Cursor::Selected(node_id)
        } else {
            Cursor::Unselected
        };
        tracing::debug!("Cursor moved to {:?}", self.cursor);
        self.current_node()
    }

    /// Clear the selection
    pub fn unselect(&mut self) {
        self.cursor = Cursor::Unselected;
    }

    /// Nodes reachable through outgoing links, in link order
    pub fn connected_nodes(&self, node_id: NodeId) -> Vec<&NodeRecord> {
        self.successors(node_id, |_| true)
    }

    /// Nodes reachable from the node under the cursor
    pub fn connected_nodes_from_cursor(&self) -> Vec<&NodeRecord> {
        match self.cursor {
            Cursor::Unselected => Vec::new(),
            Cursor::Selected(id) => self.connected_nodes(id),
        }
    }

    /// Nodes reachable through one output port, in link order
    pub fn connected_nodes_from_port(&self, node_id: NodeId, port_name: &str, port_index: usize) -> Vec<&NodeRecord> {
        self.successors(node_id, |link| link.source_port_name == port_name && link.source_port_index == port_index)
    }

    fn successors(&self, node_id: NodeId, keep: impl Fn(&LinkRecord) -> bool) -> Vec<&NodeRecord> {
        let Some(indices) = self.adjacency.get(&node_id) else {
            return Vec::new();
        };
        indices
            .iter()
            .filter_map(|i| self.links.get(*i))
            .filter(|link| keep(link))
            .filter_map(|link| self.document.node(link.target_node_id))
            .collect()
    }

    /// Successors of the start node. The cursor moves to the first of them.
    pub fn adjacent_from_start(&mut self) -> Vec<&NodeRecord> {
        let Some(start) = self.document.start_node().map(|n| n.id) else {
            self.cursor = Cursor::Unselected;
            return Vec::new();
        };

        let successors: Vec<NodeId> = self.connected_nodes(start).iter().map(|n| n.id).collect();
        self.cursor = successors
            .first()
            .map_or(Cursor::Unselected, |id| Cursor::Selected(*id));
        tracing::debug!("Entered graph {:?} at {:?}", self.document.name, self.cursor);

        successors.iter().filter_map(|id| self.document.node(*id)).collect()
    }

    /// Instantiate the node's registered type and fill its fields.
    ///
    /// Properties that fail to decode or apply are treated as absent and
    /// listed in [`MaterializedNode::issues`].
    pub fn materialize(&self, record: &NodeRecord) -> Result<MaterializedNode, TracerError> {
        let descriptor = self
            .registry
            .get(&record.type_tag)
            .ok_or_else(|| TracerError::UnknownNodeType(record.type_tag.clone()))?;

        let mut node = descriptor.construct();
        node.set_id(record.id);
        let mut issues = Vec::new();

        for property in &record.properties {
            let applied = match descriptor.field(&property.name) {
                None => Err(format!("{} has no field {:?}", record.type_tag, property.name)),
                Some(field) if field.property_type != property.declared_type => Err(format!(
                    "declared {} but schema expects {}",
                    property.declared_type, field.property_type
                )),
                Some(_) => self
                    .codec
                    .decode_record(property)
                    .map_err(|e| e.to_string())
                    .and_then(|value| node.set_field(&property.name, value).map_err(|e| e.to_string())),
            };

            if let Err(reason) = applied {
                tracing::warn!("Node {}: property {:?} treated as absent: {}", record.id, property.name, reason);
                issues.push(PropertyIssue {
                    name: property.name.clone(),
                    reason,
                });
            }
        }

        Ok(MaterializedNode { node, issues })
    }

    /// Materialize a node by ID
    pub fn materialize_node(&self, node_id: NodeId) -> Result<MaterializedNode, TracerError> {
        let record = self.document.node(node_id).ok_or(TracerError::NodeNotFound(node_id))?;
        self.materialize(record)
    }

    /// All decodable properties of a node, in declaration order
    pub fn properties(&self, node_id: NodeId) -> Option<IndexMap<String, PropertyValue>> {
        let record = self.document.node(node_id)?;
        let values = record
            .properties
            .iter()
            .filter_map(|p| match self.codec.decode_record(p) {
                Ok(value) => Some((p.name.clone(), value)),
                Err(e) => {
                    tracing::warn!("Node {}: property {:?} treated as absent: {}", node_id, p.name, e);
                    None
                }
            })
            .collect();
        Some(values)
    }

    /// Decode one property, telling apart missing nodes, absent properties and broken tokens
    pub fn property(&self, node_id: NodeId, name: &str) -> Result<PropertyValue, TracerError> {
        let record = self.document.node(node_id).ok_or(TracerError::NodeNotFound(node_id))?;
        let property = record.property(name).ok_or_else(|| TracerError::PropertyAbsent {
            node: node_id,
            name: name.to_string(),
        })?;
        Ok(self.codec.decode_record(property)?)
    }

    /// Decode one property as `T`. `None` when absent, broken, or of another type.
    pub fn try_get_property<T: FromPropertyValue>(&self, node_id: NodeId, name: &str) -> Option<T> {
        self.property(node_id, name).ok().and_then(T::from_property_value)
    }

    /// Value of a document flag
    pub fn flag(&self, name: &str) -> Option<FlagValue> {
        self.document.flag(name)?.value().ok()
    }

    /// All document flags, decoded. The driver owns and mutates this copy.
    pub fn flag_state(&self) -> FlagState {
        self.document.flag_state()
    }
}

/// Error from runtime queries
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TracerError {
    /// Node type not present in the registry
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Node has no property with this name
    #[error("Node {node} has no property {name:?}")]
    PropertyAbsent {
        /// Node ID
        node: NodeId,
        /// Property name
        name: String,
    },

    /// Property token could not be decoded
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MemoryAssetResolver;
    use crate::narrative::{
        create_narrative_registry, ConditionNode, TextNode, CHOICE_NODE_TYPE, CONDITION_NODE_TYPE, FALSE_PORT,
        NEXT_PORT, TEXT_NODE_TYPE, TRUE_PORT,
    };
    use crate::property::{AssetHandle, PropertyRecord, PropertyType};
    use crate::validation::ConnectionValidator;

    struct Fixture {
        tracer: GraphTracer,
        a: NodeId,
        b: NodeId,
        c: NodeId,
    }

    /// Start -> A -> {B, C}
    fn fixture() -> Fixture {
        let registry = Arc::new(create_narrative_registry());
        let codec = PropertyCodec::plain();
        let validator = ConnectionValidator::narrative();

        let mut doc = GraphDocument::new_with_start("Fixture");
        let start = doc.start_node().unwrap().id;
        let mut node = |tag: &str, text: &str| {
            let mut record = registry.create_node(tag, &codec).unwrap();
            record.set_property(
                codec
                    .encode_record("text", &PropertyValue::String(text.to_string()), PropertyType::String)
                    .unwrap(),
            );
            doc.add_node(record).unwrap()
        };
        let a = node(TEXT_NODE_TYPE, "Pick one.");
        let b = node(CHOICE_NODE_TYPE, "Left");
        let c = node(CHOICE_NODE_TYPE, "Right");

        for link in [
            LinkRecord::new(start, NEXT_PORT, 0, a),
            LinkRecord::new(a, NEXT_PORT, 0, b),
            LinkRecord::new(a, NEXT_PORT, 0, c),
        ] {
            doc.connect(link, &registry, &validator).unwrap();
        }

        Fixture {
            tracer: GraphTracer::new(doc, registry, codec),
            a,
            b,
            c,
        }
    }

    #[test]
    fn test_adjacent_from_start() {
        let Fixture { mut tracer, a, b, c } = fixture();
        assert_eq!(tracer.cursor(), Cursor::Unselected);

        let ids: Vec<_> = tracer.adjacent_from_start().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![a]);
        assert_eq!(tracer.cursor(), Cursor::Selected(a));

        let ids: Vec<_> = tracer.connected_nodes(a).iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![b, c]);
        let ids: Vec<_> = tracer.connected_nodes_from_cursor().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![b, c]);
    }

    #[test]
    fn test_unknown_id_robustness() {
        let Fixture { mut tracer, a, .. } = fixture();
        tracer.select_node(a);
        assert!(tracer.select_node(NodeId::new()).is_none());
        assert_eq!(tracer.cursor(), Cursor::Unselected);
        assert!(tracer.connected_nodes(NodeId::new()).is_empty());
        assert!(tracer.connected_nodes_from_cursor().is_empty());
    }

    #[test]
    fn test_no_start_node() {
        let registry = Arc::new(create_narrative_registry());
        let mut tracer = GraphTracer::new(GraphDocument::new("Empty"), registry, PropertyCodec::plain());
        assert!(tracer.adjacent_from_start().is_empty());
        assert_eq!(tracer.cursor(), Cursor::Unselected);
    }

    #[test]
    fn test_materialize_typed() {
        let Fixture { tracer, a, .. } = fixture();
        let materialized = tracer.materialize_node(a).unwrap();
        assert!(materialized.issues.is_empty(), "{:?}", materialized.issues);

        let text = materialized.downcast_ref::<TextNode>().unwrap();
        assert_eq!(text.id, a);
        assert_eq!(text.text, "Pick one.");
        assert_eq!(text.portrait, None);
    }

    #[test]
    fn test_materialize_unknown_type() {
        let Fixture { tracer, .. } = fixture();
        let record = NodeRecord::new("teleport");
        assert_eq!(
            tracer.materialize(&record).unwrap_err(),
            TracerError::UnknownNodeType("teleport".to_string())
        );
    }

    #[test]
    fn test_materialize_with_assets() {
        let resolver = Arc::new(MemoryAssetResolver::new());
        let codec = PropertyCodec::new(resolver.clone());
        let registry = Arc::new(create_narrative_registry());
        let portrait = AssetHandle::new("sprite", "portraits/innkeeper.png");

        let mut record = registry.create_node(TEXT_NODE_TYPE, &codec).unwrap();
        let sprite = PropertyType::Asset("sprite".to_string());
        record.set_property(
            codec
                .encode_record("portrait", &PropertyValue::Asset(Some(portrait.clone())), sprite.clone())
                .unwrap(),
        );
        record.set_property(PropertyRecord::new("voice", PropertyType::Asset("audio".to_string()), "stale-token"));

        let tracer = GraphTracer::new(GraphDocument::new("Assets"), registry, codec);
        let materialized = tracer.materialize(&record).unwrap();
        let text = materialized.downcast_ref::<TextNode>().unwrap();
        assert_eq!(text.portrait, Some(portrait));
        assert_eq!(text.voice, None);
        assert_eq!(materialized.issues.len(), 1);
        assert_eq!(materialized.issues[0].name, "voice");
    }

    #[test]
    fn test_property_accessors() {
        let Fixture { tracer, a, b, .. } = fixture();
        assert_eq!(tracer.try_get_property::<String>(b, "text").as_deref(), Some("Left"));
        assert_eq!(tracer.try_get_property::<i32>(b, "text"), None);
        assert_eq!(tracer.try_get_property::<String>(b, "missing"), None);

        assert!(matches!(
            tracer.property(b, "missing"),
            Err(TracerError::PropertyAbsent { .. })
        ));
        assert!(matches!(
            tracer.property(NodeId::new(), "text"),
            Err(TracerError::NodeNotFound(_))
        ));

        let properties = tracer.properties(a).unwrap();
        let names: Vec<_> = properties.keys().map(String::as_str).collect();
        assert_eq!(names, ["speaker", "text", "portrait", "voice"]);
    }

    #[test]
    fn test_branch_on_condition() {
        let registry = Arc::new(create_narrative_registry());
        let codec = PropertyCodec::plain();
        let validator = ConnectionValidator::narrative();

        let mut doc = GraphDocument::new_with_start("Branch");
        doc.set_flag("met_hero", crate::flag::FlagValue::Bool(true)).unwrap();
        let start = doc.start_node().unwrap().id;
        let mut condition = registry.create_node(CONDITION_NODE_TYPE, &codec).unwrap();
        condition.set_property(
            codec
                .encode_record("flag", &PropertyValue::String("met_hero".to_string()), PropertyType::String)
                .unwrap(),
        );
        condition.set_property(codec.encode_record("value", &PropertyValue::Int(1), PropertyType::Int).unwrap());
        let condition = doc.add_node(condition).unwrap();
        let yes = doc.add_node(registry.create_node(TEXT_NODE_TYPE, &codec).unwrap()).unwrap();
        let no = doc.add_node(registry.create_node(TEXT_NODE_TYPE, &codec).unwrap()).unwrap();
        doc.connect(LinkRecord::new(start, NEXT_PORT, 0, condition), &registry, &validator).unwrap();
        doc.connect(LinkRecord::new(condition, FALSE_PORT, 0, no), &registry, &validator).unwrap();
        doc.connect(LinkRecord::new(condition, TRUE_PORT, 0, yes), &registry, &validator).unwrap();

        let mut tracer = GraphTracer::new(doc, registry, codec);
        tracer.adjacent_from_start();
        let node = tracer.materialize_node(condition).unwrap();
        let port = node.downcast_ref::<ConditionNode>().unwrap().branch(&tracer.flag_state()).unwrap();
        assert_eq!(port, TRUE_PORT);

        let next: Vec<_> = tracer.connected_nodes_from_port(condition, port, 0).iter().map(|n| n.id).collect();
        assert_eq!(next, vec![yes]);
        assert_eq!(tracer.flag("met_hero"), Some(crate::flag::FlagValue::Bool(true)));
        assert_eq!(tracer.flag("missing"), None);
    }
}
