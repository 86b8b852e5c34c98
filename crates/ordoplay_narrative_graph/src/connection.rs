// SPDX-License-Identifier: MIT OR Apache-2.0
//! Links between nodes and the port references used to validate them.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// Name of the single input port every non-start node exposes
pub const INPUT_PORT: &str = "Input";

/// A directed link from an output port to a node's input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Source node ID
    pub source_node_id: NodeId,
    /// Source output port name
    pub source_port_name: String,
    /// Disambiguates same-named output ports, e.g. choice options
    pub source_port_index: usize,
    /// Target node ID
    pub target_node_id: NodeId,
}

impl LinkRecord {
    /// Create a new link
    pub fn new(
        source_node_id: NodeId,
        source_port_name: impl Into<String>,
        source_port_index: usize,
        target_node_id: NodeId,
    ) -> Self {
        Self {
            source_node_id,
            source_port_name: source_port_name.into(),
            source_port_index,
            target_node_id,
        }
    }

    /// Check if this link involves a specific node
    pub fn involves_node(&self, node_id: NodeId) -> bool {
        self.source_node_id == node_id || self.target_node_id == node_id
    }

    /// Check if this link leaves the given output port
    pub fn leaves_port(&self, node_id: NodeId, port_name: &str, port_index: usize) -> bool {
        self.source_node_id == node_id
            && self.source_port_name == port_name
            && self.source_port_index == port_index
    }
}

/// Identifies a port by the owning node's type tag, port name and index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortRef {
    /// Type tag of the owning node
    pub type_tag: String,
    /// Port name
    pub port_name: String,
    /// Port index among same-named ports
    pub port_index: usize,
}

impl PortRef {
    /// Reference an output port
    pub fn output(type_tag: impl Into<String>, port_name: impl Into<String>, port_index: usize) -> Self {
        Self {
            type_tag: type_tag.into(),
            port_name: port_name.into(),
            port_index,
        }
    }

    /// Reference the input port of a node type
    pub fn input(type_tag: impl Into<String>) -> Self {
        Self::output(type_tag, INPUT_PORT, 0)
    }
}
