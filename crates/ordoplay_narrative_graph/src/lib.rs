// SPDX-License-Identifier: MIT OR Apache-2.0
//! Branching narrative graphs for `OrdoPlay`.
//!
//! This crate provides the data side of dialogue and story graphs:
//! - Documents of nodes, links, groups and flags
//! - A registry of node types with typed field schemas
//! - A text codec for property values, including asset references
//! - Rule-based link validation
//! - Lenient save/load in RON or JSON
//! - A runtime tracer for walking a loaded graph
//!
//! ## Architecture
//!
//! Nodes are stored as plain records: a type tag, a position and a list
//! of encoded properties. Typed node structs exist only at runtime,
//! when [`GraphTracer::materialize`] builds them through the
//! [`NodeTypeRegistry`]. Loading never fails on bad entries; skipped
//! content is reported as [`LoadWarning`]s.

pub mod codec;
pub mod connection;
pub mod flag;
pub mod graph;
pub mod narrative;
pub mod node;
pub mod persistence;
pub mod property;
pub mod registry;
pub mod settings;
pub mod store;
pub mod tracer;
pub mod validation;

pub use codec::{AssetResolver, CodecError, DirectoryAssetResolver, MemoryAssetResolver, NullAssetResolver, PropertyCodec};
pub use connection::{LinkRecord, PortRef, INPUT_PORT};
pub use flag::{FlagRecord, FlagState, FlagValue};
pub use graph::{DocumentId, GraphDocument, GraphError, GroupRecord};
pub use narrative::create_narrative_registry;
pub use node::{NodeId, NodeRecord, START_NODE_TYPE};
pub use persistence::{GraphPersistence, LoadOutcome, LoadWarning, PersistenceError};
pub use property::{AssetHandle, FromPropertyValue, PropertyRecord, PropertyType, PropertyValue};
pub use registry::{NarrativeNode, NodeCategory, NodeTypeDescriptor, NodeTypeRegistry, RegistryError};
pub use settings::{DocumentFormat, GraphSettings, LinkPolicy, SettingsError, SETTINGS_FILE_NAME};
pub use store::{DocumentStore, SharedDocument};
pub use tracer::{Cursor, GraphTracer, MaterializedNode, TracerError};
pub use validation::ConnectionValidator;
