// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node type registry.
//!
//! The host registers every node type it supports up front: display
//! metadata, ports, a field schema and a constructor. Lookups go
//! through the registry instead of runtime type discovery.

use crate::codec::{CodecError, PropertyCodec};
use crate::node::{NodeId, NodeRecord};
use crate::property::{FromPropertyValue, PropertyType, PropertyValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A materialized node with typed fields
pub trait NarrativeNode: Any + fmt::Debug + Send + Sync {
    /// Node instance ID
    fn id(&self) -> NodeId;

    /// Set the node instance ID
    fn set_id(&mut self, id: NodeId);

    /// Type tag this node was registered under
    fn type_tag(&self) -> &str;

    /// Assign a decoded value to the named field
    fn set_field(&mut self, name: &str, value: PropertyValue) -> Result<(), FieldError>;

    /// Upcast for downcasting to the concrete node type
    fn as_any(&self) -> &dyn Any;
}

impl dyn NarrativeNode {
    /// Downcast to a concrete node type
    pub fn downcast_ref<T: NarrativeNode>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

/// Extract a typed field value, for `NarrativeNode::set_field` implementations
pub fn field_value<T: FromPropertyValue>(field: &str, value: PropertyValue) -> Result<T, FieldError> {
    let found = value.type_name();
    T::from_property_value(value).ok_or_else(|| FieldError::WrongType {
        field: field.to_string(),
        found,
    })
}

/// Node for host types registered without a dedicated struct
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicNode {
    /// Node instance ID
    pub id: NodeId,
    /// Registered type tag
    pub type_tag: String,
    /// Field values in assignment order
    pub fields: IndexMap<String, PropertyValue>,
}

impl DynamicNode {
    /// Create an empty dynamic node
    pub fn new(type_tag: impl Into<String>) -> Self {
        Self {
            id: NodeId::default(),
            type_tag: type_tag.into(),
            fields: IndexMap::new(),
        }
    }

    /// Get a field value
    pub fn field(&self, name: &str) -> Option<&PropertyValue> {
        self.fields.get(name)
    }
}

impl NarrativeNode for DynamicNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn set_id(&mut self, id: NodeId) {
        self.id = id;
    }

    fn type_tag(&self) -> &str {
        &self.type_tag
    }

    fn set_field(&mut self, name: &str, value: PropertyValue) -> Result<(), FieldError> {
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Node type category, used for menus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Entry and exit points
    Flow,
    /// Text and choices shown to the player
    Dialogue,
    /// Branching on flags
    Logic,
    /// Flag mutation
    State,
    /// Custom/user-defined
    Custom,
}

/// Declared field of a node type
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    /// Field name, matches the property record name
    pub name: String,
    /// Declared type
    pub property_type: PropertyType,
    /// Value given to newly created nodes
    pub default: PropertyValue,
}

/// Creates a zero-valued instance of a node type
pub type NodeConstructor = Arc<dyn Fn() -> Box<dyn NarrativeNode> + Send + Sync>;

/// Node type definition
#[derive(Clone)]
pub struct NodeTypeDescriptor {
    /// Unique type tag
    pub tag: String,
    /// Display name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Menu path for node creation UIs, e.g. `"Dialogue/Text"`
    pub menu_path: Option<String>,
    /// Whether the node has its single input port
    pub has_input: bool,
    /// Output port names
    pub outputs: Vec<String>,
    /// Field schema in declaration order
    pub fields: Vec<FieldSchema>,
    constructor: NodeConstructor,
}

impl fmt::Debug for NodeTypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTypeDescriptor")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .field("category", &self.category)
            .field("has_input", &self.has_input)
            .field("outputs", &self.outputs)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl NodeTypeDescriptor {
    /// Describe a node type materialized as `N`
    pub fn new<N>(tag: impl Into<String>, name: impl Into<String>, category: NodeCategory) -> Self
    where
        N: NarrativeNode + Default,
    {
        Self::with_constructor(tag, name, category, Arc::new(|| Box::new(N::default()) as Box<dyn NarrativeNode>))
    }

    /// Describe a node type materialized as a [`DynamicNode`]
    pub fn dynamic(tag: impl Into<String>, name: impl Into<String>, category: NodeCategory) -> Self {
        let tag = tag.into();
        let node_tag = tag.clone();
        Self::with_constructor(
            tag,
            name,
            category,
            Arc::new(move || Box::new(DynamicNode::new(node_tag.clone())) as Box<dyn NarrativeNode>),
        )
    }

    /// Describe a node type with an explicit constructor
    pub fn with_constructor(
        tag: impl Into<String>,
        name: impl Into<String>,
        category: NodeCategory,
        constructor: NodeConstructor,
    ) -> Self {
        Self {
            tag: tag.into(),
            name: name.into(),
            category,
            description: String::new(),
            menu_path: None,
            has_input: true,
            outputs: vec!["Next".to_string()],
            fields: Vec::new(),
            constructor,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the menu path
    pub fn with_menu_path(mut self, path: impl Into<String>) -> Self {
        self.menu_path = Some(path.into());
        self
    }

    /// Remove the input port
    pub fn without_input(mut self) -> Self {
        self.has_input = false;
        self
    }

    /// Replace the output ports
    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Declare a field
    pub fn with_field(
        mut self,
        name: impl Into<String>,
        property_type: PropertyType,
        default: impl Into<PropertyValue>,
    ) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            property_type,
            default: default.into(),
        });
        self
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Whether the type exposes an output port with this name
    pub fn has_output(&self, port_name: &str) -> bool {
        self.outputs.iter().any(|o| o == port_name)
    }

    /// Construct a zero-valued instance
    pub fn construct(&self) -> Box<dyn NarrativeNode> {
        (self.constructor)()
    }
}

/// Registry of available node types
#[derive(Debug, Clone, Default)]
pub struct NodeTypeRegistry {
    types: IndexMap<String, NodeTypeDescriptor>,
}

impl NodeTypeRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type, replacing any previous entry with the same tag
    pub fn register(&mut self, descriptor: NodeTypeDescriptor) {
        self.types.insert(descriptor.tag.clone(), descriptor);
    }

    /// Resolve a type tag
    pub fn get(&self, tag: &str) -> Option<&NodeTypeDescriptor> {
        self.types.get(tag)
    }

    /// Whether a type tag is registered
    pub fn contains(&self, tag: &str) -> bool {
        self.types.contains_key(tag)
    }

    /// Get all registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeTypeDescriptor> {
        self.types.values()
    }

    /// Get types by category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeTypeDescriptor> {
        self.types.values().filter(move |t| t.category == category)
    }

    /// Declared type of a field on a node type
    pub fn field_type(&self, tag: &str, field: &str) -> Option<&PropertyType> {
        self.get(tag)?.field(field).map(|f| &f.property_type)
    }

    /// Create a node record with every schema field set to its default
    pub fn create_node(&self, tag: &str, codec: &PropertyCodec) -> Result<NodeRecord, RegistryError> {
        let descriptor = self
            .get(tag)
            .ok_or_else(|| RegistryError::UnknownNodeType(tag.to_string()))?;

        let mut node = NodeRecord::new(tag);
        for field in &descriptor.fields {
            let record = codec.encode_record(&field.name, &field.default, field.property_type.clone())?;
            node.properties.push(record);
        }
        Ok(node)
    }
}

/// Error when assigning a field on a materialized node
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    /// No such field on the node type
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Value variant does not fit the field
    #[error("Field {field} cannot hold a {found} value")]
    WrongType {
        /// Field name
        field: String,
        /// Variant that was supplied
        found: &'static str,
    },

    /// Value has the right type but is not accepted by the field
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: String,
        /// Why the value was refused
        reason: String,
    },
}

/// Error when creating nodes from the registry
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    /// Type tag not registered
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Schema default could not be encoded
    #[error(transparent)]
    Codec(#[from] CodecError),
}
