// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph document containing nodes, links, groups and flags.

use crate::codec::CodecError;
use crate::connection::{LinkRecord, PortRef};
use crate::flag::{FlagRecord, FlagState, FlagValue};
use crate::node::{NodeId, NodeRecord, START_NODE_TYPE};
use crate::property::PropertyRecord;
use crate::registry::NodeTypeRegistry;
use crate::validation::ConnectionValidator;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Persisted identity of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    /// Create a new random document ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A titled frame around a set of nodes. Authoring only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Title
    pub title: String,
    /// Top-left position
    pub position: [f32; 2],
    /// Width and height
    pub size: [f32; 2],
    /// Member nodes
    pub node_ids: Vec<NodeId>,
}

impl GroupRecord {
    /// Create an empty group
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            position: [0.0, 0.0],
            size: [200.0, 150.0],
            node_ids: Vec::new(),
        }
    }

    /// Set the member nodes
    pub fn with_nodes(mut self, node_ids: impl IntoIterator<Item = NodeId>) -> Self {
        self.node_ids = node_ids.into_iter().collect();
        self
    }
}

/// A narrative graph document
#[derive(Debug, Clone, PartialEq)]
pub struct GraphDocument {
    /// Persisted identity, kept across re-saves
    pub id: DocumentId,
    /// Document name
    pub name: String,
    nodes: IndexMap<NodeId, NodeRecord>,
    links: Vec<LinkRecord>,
    groups: Vec<GroupRecord>,
    flags: IndexMap<String, FlagRecord>,
}

impl GraphDocument {
    /// Create a new empty document
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            name: name.into(),
            nodes: IndexMap::new(),
            links: Vec::new(),
            groups: Vec::new(),
            flags: IndexMap::new(),
        }
    }

    /// Create a document holding a single start node
    pub fn new_with_start(name: impl Into<String>) -> Self {
        let mut document = Self::new(name);
        let start = NodeRecord::new(START_NODE_TYPE);
        document.nodes.insert(start.id, start);
        document
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Add a node to the document
    pub fn add_node(&mut self, node: NodeRecord) -> Result<NodeId, GraphError> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        if node.is_start() && self.start_node().is_some() {
            return Err(GraphError::DuplicateStart);
        }

        let id = node.id;
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Insert a node without duplicate or start checks. Used when reconstructing stored documents.
    pub(crate) fn insert_node_unchecked(&mut self, node: NodeRecord) {
        self.nodes.insert(node.id, node);
    }

    /// Remove a node, its links and its group memberships
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<NodeRecord> {
        let node = self.nodes.shift_remove(&node_id)?;
        self.links.retain(|l| !l.involves_node(node_id));
        for group in &mut self.groups {
            group.node_ids.retain(|id| *id != node_id);
        }
        Some(node)
    }

    /// Get a node by ID
    pub fn node(&self, node_id: NodeId) -> Option<&NodeRecord> {
        self.nodes.get(&node_id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut NodeRecord> {
        self.nodes.get_mut(&node_id)
    }

    /// Get all nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    /// Get all node IDs
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The start node, if any
    pub fn start_node(&self) -> Option<&NodeRecord> {
        self.nodes.values().find(|n| n.is_start())
    }

    /// Move a node on the canvas
    pub fn move_node(&mut self, node_id: NodeId, x: f32, y: f32) -> Result<(), GraphError> {
        let node = self.node_mut(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        node.position = [x, y];
        Ok(())
    }

    /// Add or replace a property on a node
    pub fn set_property(&mut self, node_id: NodeId, property: PropertyRecord) -> Result<(), GraphError> {
        let node = self.node_mut(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        node.set_property(property);
        Ok(())
    }

    /// Remove a property from a node
    pub fn remove_property(&mut self, node_id: NodeId, name: &str) -> Result<Option<PropertyRecord>, GraphError> {
        let node = self.node_mut(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        Ok(node.remove_property(name))
    }

    // ------------------------------------------------------------------
    // Links
    // ------------------------------------------------------------------

    /// Check whether `link` may be added, without adding it
    pub fn can_connect(
        &self,
        link: &LinkRecord,
        registry: &NodeTypeRegistry,
        validator: &ConnectionValidator,
    ) -> Result<(), GraphError> {
        let source = self
            .node(link.source_node_id)
            .ok_or(GraphError::NodeNotFound(link.source_node_id))?;
        let target = self
            .node(link.target_node_id)
            .ok_or(GraphError::NodeNotFound(link.target_node_id))?;

        let source_type = registry
            .get(&source.type_tag)
            .ok_or_else(|| GraphError::UnknownNodeType(source.type_tag.clone()))?;
        let target_type = registry
            .get(&target.type_tag)
            .ok_or_else(|| GraphError::UnknownNodeType(target.type_tag.clone()))?;

        if !source_type.has_output(&link.source_port_name) {
            return Err(GraphError::PortNotFound {
                node: source.id,
                port: link.source_port_name.clone(),
            });
        }
        if !target_type.has_input || target.is_start() {
            return Err(GraphError::NoInputPort(target.id));
        }
        if source.id == target.id {
            return Err(GraphError::SelfLoop);
        }
        if self.links.contains(link) {
            return Err(GraphError::DuplicateLink);
        }

        let source_port = PortRef::output(
            source.type_tag.clone(),
            link.source_port_name.clone(),
            link.source_port_index,
        );
        let target_port = PortRef::input(target.type_tag.clone());
        let existing = self.existing_targets(link.source_node_id, &link.source_port_name, link.source_port_index);

        if !validator.can_connect(&source_port, &target_port, &existing) {
            return Err(GraphError::InvalidConnection {
                source_type: source.type_tag.clone(),
                target_type: target.type_tag.clone(),
            });
        }
        Ok(())
    }

    /// Add a link after checking it against the registry and validator
    pub fn connect(
        &mut self,
        link: LinkRecord,
        registry: &NodeTypeRegistry,
        validator: &ConnectionValidator,
    ) -> Result<(), GraphError> {
        self.can_connect(&link, registry, validator)?;
        self.links.push(link);
        Ok(())
    }

    /// Add a link without any checks. Used when reconstructing stored documents.
    pub(crate) fn push_link_unchecked(&mut self, link: LinkRecord) {
        self.links.push(link);
    }

    /// Remove a link
    pub fn disconnect(&mut self, link: &LinkRecord) -> bool {
        let before = self.links.len();
        self.links.retain(|l| l != link);
        self.links.len() != before
    }

    /// Get all links in insertion order
    pub fn links(&self) -> impl Iterator<Item = &LinkRecord> {
        self.links.iter()
    }

    /// Get links leaving a node
    pub fn links_from(&self, node_id: NodeId) -> impl Iterator<Item = &LinkRecord> {
        self.links.iter().filter(move |l| l.source_node_id == node_id)
    }

    /// Get links entering a node
    pub fn links_to(&self, node_id: NodeId) -> impl Iterator<Item = &LinkRecord> {
        self.links.iter().filter(move |l| l.target_node_id == node_id)
    }

    /// Get the number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Input ports already linked from one output port
    pub fn existing_targets(&self, node_id: NodeId, port_name: &str, port_index: usize) -> Vec<PortRef> {
        self.links
            .iter()
            .filter(|l| l.leaves_port(node_id, port_name, port_index))
            .filter_map(|l| self.node(l.target_node_id))
            .map(|n| PortRef::input(n.type_tag.clone()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// Add a group, returning its index
    pub fn add_group(&mut self, group: GroupRecord) -> usize {
        self.groups.push(group);
        self.groups.len() - 1
    }

    /// Remove a group by index
    pub fn remove_group(&mut self, index: usize) -> Option<GroupRecord> {
        (index < self.groups.len()).then(|| self.groups.remove(index))
    }

    /// Get a mutable group by index
    pub fn group_mut(&mut self, index: usize) -> Option<&mut GroupRecord> {
        self.groups.get_mut(index)
    }

    /// Get all groups
    pub fn groups(&self) -> impl Iterator<Item = &GroupRecord> {
        self.groups.iter()
    }

    /// Get the number of groups
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    // ------------------------------------------------------------------
    // Flags
    // ------------------------------------------------------------------

    /// Add a new flag
    pub fn add_flag(&mut self, flag: FlagRecord) -> Result<(), GraphError> {
        if self.flags.contains_key(&flag.name) {
            return Err(GraphError::DuplicateFlag(flag.name));
        }
        self.flags.insert(flag.name.clone(), flag);
        Ok(())
    }

    /// Insert a flag without the duplicate check. Used when reconstructing stored documents.
    pub(crate) fn insert_flag_unchecked(&mut self, flag: FlagRecord) {
        self.flags.insert(flag.name.clone(), flag);
    }

    /// Set a flag, creating it if needed
    pub fn set_flag(&mut self, name: impl Into<String>, value: FlagValue) -> Result<(), GraphError> {
        let flag = FlagRecord::new(name, value)?;
        self.flags.insert(flag.name.clone(), flag);
        Ok(())
    }

    /// Remove a flag
    pub fn remove_flag(&mut self, name: &str) -> Option<FlagRecord> {
        self.flags.shift_remove(name)
    }

    /// Get a flag record by name
    pub fn flag(&self, name: &str) -> Option<&FlagRecord> {
        self.flags.get(name)
    }

    /// Whether a flag exists
    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.contains_key(name)
    }

    /// Get all flags
    pub fn flags(&self) -> impl Iterator<Item = &FlagRecord> {
        self.flags.values()
    }

    /// Get the number of flags
    pub fn flag_count(&self) -> usize {
        self.flags.len()
    }

    /// Decode every flag into a runtime state map. Undecodable flags are skipped.
    pub fn flag_state(&self) -> FlagState {
        self.flags
            .values()
            .filter_map(|flag| match flag.value() {
                Ok(value) => Some((flag.name.clone(), value)),
                Err(e) => {
                    tracing::warn!("Skipping flag {}: {}", flag.name, e);
                    None
                }
            })
            .collect()
    }
}

impl Default for GraphDocument {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Error when editing a document
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// A node with this ID already exists
    #[error("Duplicate node: {0}")]
    DuplicateNode(NodeId),

    /// The document already has a start node
    #[error("Document already has a start node")]
    DuplicateStart,

    /// Node type not present in the registry
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Output port not found
    #[error("Port {port:?} not found on node {node}")]
    PortNotFound {
        /// Node ID
        node: NodeId,
        /// Port name
        port: String,
    },

    /// Target node does not accept incoming links
    #[error("Node {0} has no input port")]
    NoInputPort(NodeId),

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,

    /// The same link already exists
    #[error("Link already exists")]
    DuplicateLink,

    /// Rejected by the connection validator
    #[error("Cannot connect {source_type} to {target_type}")]
    InvalidConnection {
        /// Source node type
        source_type: String,
        /// Target node type
        target_type: String,
    },

    /// A flag with this name already exists
    #[error("Duplicate flag: {0}")]
    DuplicateFlag(String),

    /// Value could not be encoded
    #[error(transparent)]
    Codec(#[from] CodecError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::narrative::{
        create_narrative_registry, CHOICE_NODE_TYPE, CONDITION_NODE_TYPE, END_NODE_TYPE,
        MODIFIER_NODE_TYPE, NEXT_PORT, TEXT_NODE_TYPE, TRUE_PORT,
    };

    fn setup() -> (GraphDocument, NodeTypeRegistry, ConnectionValidator) {
        (
            GraphDocument::new_with_start("Test"),
            create_narrative_registry(),
            ConnectionValidator::narrative(),
        )
    }

    fn add(doc: &mut GraphDocument, tag: &str) -> NodeId {
        doc.add_node(NodeRecord::new(tag)).unwrap()
    }

    #[test]
    fn test_graph_creation() {
        let doc = GraphDocument::new_with_start("Intro");
        assert_eq!(doc.name, "Intro");
        assert_eq!(doc.node_count(), 1);
        assert!(doc.start_node().is_some());
        assert_eq!(GraphDocument::default().node_count(), 0);
    }

    #[test]
    fn test_single_start_node() {
        let (mut doc, _, _) = setup();
        assert_eq!(
            doc.add_node(NodeRecord::new(START_NODE_TYPE)),
            Err(GraphError::DuplicateStart)
        );
    }

    #[test]
    fn test_connect_text_chain() {
        let (mut doc, registry, validator) = setup();
        let start = doc.start_node().unwrap().id;
        let a = add(&mut doc, TEXT_NODE_TYPE);
        let b = add(&mut doc, TEXT_NODE_TYPE);
        let choice = add(&mut doc, CHOICE_NODE_TYPE);

        doc.connect(LinkRecord::new(start, NEXT_PORT, 0, a), &registry, &validator).unwrap();
        doc.connect(LinkRecord::new(a, NEXT_PORT, 0, b), &registry, &validator).unwrap();

        let err = doc
            .connect(LinkRecord::new(a, NEXT_PORT, 0, choice), &registry, &validator)
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidConnection { .. }));
        assert_eq!(doc.link_count(), 2);
    }

    #[test]
    fn test_connect_structural_errors() {
        let (mut doc, registry, validator) = setup();
        let start = doc.start_node().unwrap().id;
        let a = add(&mut doc, TEXT_NODE_TYPE);
        let end = add(&mut doc, END_NODE_TYPE);

        assert_eq!(
            doc.connect(LinkRecord::new(a, NEXT_PORT, 0, start), &registry, &validator),
            Err(GraphError::NoInputPort(start))
        );
        assert_eq!(
            doc.connect(LinkRecord::new(a, NEXT_PORT, 0, a), &registry, &validator),
            Err(GraphError::SelfLoop)
        );
        assert!(matches!(
            doc.connect(LinkRecord::new(a, TRUE_PORT, 0, end), &registry, &validator),
            Err(GraphError::PortNotFound { .. })
        ));
        assert!(matches!(
            doc.connect(LinkRecord::new(end, NEXT_PORT, 0, a), &registry, &validator),
            Err(GraphError::PortNotFound { .. })
        ));

        doc.connect(LinkRecord::new(a, NEXT_PORT, 0, end), &registry, &validator).unwrap();
        assert_eq!(
            doc.connect(LinkRecord::new(a, NEXT_PORT, 0, end), &registry, &validator),
            Err(GraphError::DuplicateLink)
        );
    }

    #[test]
    fn test_condition_cannot_target_modifier() {
        let (mut doc, registry, validator) = setup();
        let condition = add(&mut doc, CONDITION_NODE_TYPE);
        let modifier = add(&mut doc, MODIFIER_NODE_TYPE);
        let link = LinkRecord::new(condition, TRUE_PORT, 0, modifier);
        assert!(doc.can_connect(&link, &registry, &validator).is_err());
        assert!(doc
            .can_connect(&link, &registry, &ConnectionValidator::new())
            .is_ok());
    }

    #[test]
    fn test_remove_node_cleans_up() {
        let (mut doc, registry, validator) = setup();
        let start = doc.start_node().unwrap().id;
        let a = add(&mut doc, TEXT_NODE_TYPE);
        doc.connect(LinkRecord::new(start, NEXT_PORT, 0, a), &registry, &validator).unwrap();
        doc.add_group(GroupRecord::new("Intro").with_nodes([start, a]));

        assert!(doc.remove_node(a).is_some());
        assert_eq!(doc.link_count(), 0);
        assert_eq!(doc.groups().next().unwrap().node_ids, vec![start]);
        assert!(doc.remove_node(a).is_none());
    }

    #[test]
    fn test_flags() {
        let mut doc = GraphDocument::new("Flags");
        doc.set_flag("met_hero", FlagValue::Bool(true)).unwrap();
        doc.set_flag("gold", FlagValue::Int(3)).unwrap();
        assert!(matches!(
            doc.add_flag(FlagRecord::new("gold", FlagValue::Int(1)).unwrap()),
            Err(GraphError::DuplicateFlag(_))
        ));

        let state = doc.flag_state();
        assert_eq!(state["met_hero"], FlagValue::Bool(true));
        assert_eq!(state["gold"], FlagValue::Int(3));
        assert!(doc.remove_flag("gold").is_some());
        assert_eq!(doc.flag_count(), 1);
    }

    #[test]
    fn test_existing_targets() {
        let (mut doc, registry, validator) = setup();
        let a = add(&mut doc, TEXT_NODE_TYPE);
        let c1 = add(&mut doc, CHOICE_NODE_TYPE);
        let c2 = add(&mut doc, CHOICE_NODE_TYPE);
        doc.connect(LinkRecord::new(a, NEXT_PORT, 0, c1), &registry, &validator).unwrap();
        doc.connect(LinkRecord::new(a, NEXT_PORT, 0, c2), &registry, &validator).unwrap();

        let targets = doc.existing_targets(a, NEXT_PORT, 0);
        assert_eq!(targets.len(), 2);
        assert!(targets.iter().all(|p| p.type_tag == CHOICE_NODE_TYPE));
        assert!(doc.disconnect(&LinkRecord::new(a, NEXT_PORT, 0, c1)));
        assert_eq!(doc.links_from(a).count(), 1);
    }
}
