// SPDX-License-Identifier: MIT OR Apache-2.0
//! Saving and loading graph documents.
//!
//! Loading is lenient: problems with individual nodes, properties,
//! links, groups or flags are reported as [`LoadWarning`]s and the
//! offending entry is skipped. Only document-level corruption fails
//! the load, in which case nothing is replaced.
//!
//! Saving writes to a temporary file next to the target and renames it
//! into place, so a failed save never leaves a partial document. When
//! the target already holds a document, its identity is kept.

use crate::codec::{self, CodecError};
use crate::connection::{LinkRecord, PortRef};
use crate::flag::FlagRecord;
use crate::graph::{DocumentId, GraphDocument, GroupRecord};
use crate::node::{NodeId, NodeRecord};
use crate::property::PropertyType;
use crate::registry::NodeTypeRegistry;
use crate::settings::{DocumentFormat, GraphSettings, LinkPolicy};
use crate::validation::ConnectionValidator;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Current document format version
pub const DOCUMENT_FORMAT_VERSION: u32 = 1;

/// On-disk shape of a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedDocument {
    /// Format version
    pub version: u32,
    /// Persisted identity
    pub id: DocumentId,
    /// Document name
    pub name: String,
    /// Nodes
    pub nodes: Vec<NodeRecord>,
    /// Links
    pub links: Vec<LinkRecord>,
    /// Groups
    pub groups: Vec<GroupRecord>,
    /// Flags
    pub flags: Vec<FlagRecord>,
}

impl PersistedDocument {
    /// Snapshot a document for storage
    pub fn from_document(document: &GraphDocument) -> Self {
        Self {
            version: DOCUMENT_FORMAT_VERSION,
            id: document.id,
            name: document.name.clone(),
            nodes: document.nodes().cloned().collect(),
            links: document.links().cloned().collect(),
            groups: document.groups().cloned().collect(),
            flags: document.flags().cloned().collect(),
        }
    }
}

#[derive(Deserialize)]
struct PersistedHeader {
    id: DocumentId,
}

/// A problem found while loading; the affected entry was skipped or kept as noted
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadWarning {
    /// Node type not in the registry; node skipped
    #[error("Skipped node {node}: unknown node type {type_tag:?}")]
    UnknownNodeType {
        /// Node ID
        node: NodeId,
        /// Unresolved type tag
        type_tag: String,
    },

    /// Node ID seen twice; later node skipped
    #[error("Skipped duplicate node {0}")]
    DuplicateNode(NodeId),

    /// Second start node; skipped
    #[error("Skipped extra start node {0}")]
    DuplicateStart(NodeId),

    /// Property name seen twice on a node; later property skipped
    #[error("Skipped duplicate property {property:?} on node {node}")]
    DuplicateProperty {
        /// Node ID
        node: NodeId,
        /// Property name
        property: String,
    },

    /// Property not in the node type's schema; skipped
    #[error("Skipped property {property:?} on node {node}: not in schema")]
    UnknownProperty {
        /// Node ID
        node: NodeId,
        /// Property name
        property: String,
    },

    /// Property or flag value disagrees with its type; skipped
    #[error("Skipped {owner} {name:?}: {reason}")]
    TypeMismatch {
        /// Node ID or `"flag"`
        owner: String,
        /// Property or flag name
        name: String,
        /// What did not match
        reason: String,
    },

    /// Flag name seen twice; later flag skipped
    #[error("Skipped duplicate flag {0:?}")]
    DuplicateFlag(String),

    /// Link references a missing node; skipped
    #[error("Skipped dangling link {} -> {}", .0.source_node_id, .0.target_node_id)]
    DanglingLink(LinkRecord),

    /// Link enters the start node; skipped
    #[error("Skipped link into start node {}", .0.target_node_id)]
    LinkIntoStart(LinkRecord),

    /// Link breaks the connection rules; kept or dropped per [`LinkPolicy`]
    #[error("Illegal link {} -> {}", .0.source_node_id, .0.target_node_id)]
    IllegalLink(LinkRecord),

    /// Group references a missing node; reference dropped
    #[error("Group {group:?} references missing node {node}")]
    DanglingGroupReference {
        /// Group title
        group: String,
        /// Missing node ID
        node: NodeId,
    },
}

/// A loaded document and the problems found while loading it
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// The reconstructed document
    pub document: GraphDocument,
    /// Skipped or reported entries
    pub warnings: Vec<LoadWarning>,
}

/// Saves and loads documents
#[derive(Debug, Clone)]
pub struct GraphPersistence {
    registry: Arc<NodeTypeRegistry>,
    validator: ConnectionValidator,
    settings: GraphSettings,
}

impl GraphPersistence {
    /// Create a persistence service using the narrative connection rules
    pub fn new(registry: Arc<NodeTypeRegistry>, settings: GraphSettings) -> Self {
        Self {
            registry,
            validator: ConnectionValidator::narrative(),
            settings,
        }
    }

    /// Replace the connection rules used by non-trusting link policies
    pub fn with_validator(mut self, validator: ConnectionValidator) -> Self {
        self.validator = validator;
        self
    }

    /// The active settings
    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    /// The node type registry
    pub fn registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.registry
    }

    fn format_for(&self, path: &Path) -> DocumentFormat {
        DocumentFormat::from_path(path).unwrap_or(self.settings.format)
    }

    /// Serialize a document
    pub fn serialize_document(&self, document: &GraphDocument, format: DocumentFormat) -> Result<String, PersistenceError> {
        let persisted = PersistedDocument::from_document(document);
        let result = match (format, self.settings.pretty) {
            (DocumentFormat::Ron, true) => {
                ron::ser::to_string_pretty(&persisted, ron::ser::PrettyConfig::default()).map_err(|e| e.to_string())
            }
            (DocumentFormat::Ron, false) => ron::to_string(&persisted).map_err(|e| e.to_string()),
            (DocumentFormat::Json, true) => serde_json::to_string_pretty(&persisted).map_err(|e| e.to_string()),
            (DocumentFormat::Json, false) => serde_json::to_string(&persisted).map_err(|e| e.to_string()),
        };
        result.map_err(PersistenceError::Serialize)
    }

    /// Parse and reconstruct a document
    pub fn parse_document(&self, content: &str, format: DocumentFormat) -> Result<LoadOutcome, PersistenceError> {
        let persisted: PersistedDocument = match format {
            DocumentFormat::Ron => ron::from_str(content).map_err(|e| PersistenceError::MalformedDocument(e.to_string()))?,
            DocumentFormat::Json => {
                serde_json::from_str(content).map_err(|e| PersistenceError::MalformedDocument(e.to_string()))?
            }
        };

        if persisted.version > DOCUMENT_FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion {
                found: persisted.version,
                supported: DOCUMENT_FORMAT_VERSION,
            });
        }

        Ok(self.reconstruct(persisted))
    }

    /// Save a document, returning the persisted identity.
    ///
    /// If `path` already holds a document, that document's identity is
    /// kept and its content replaced.
    pub fn save(&self, document: &GraphDocument, path: &Path) -> Result<DocumentId, PersistenceError> {
        let format = self.format_for(path);
        let id = read_existing_id(path, format).unwrap_or(document.id);

        let mut snapshot = document.clone();
        snapshot.id = id;
        let content = self.serialize_document(&snapshot, format)?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(content.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| PersistenceError::Io(e.error))?;

        tracing::info!("Saved narrative graph {:?} ({}) to {:?}", document.name, id, path);
        Ok(id)
    }

    /// Load a document
    pub fn load(&self, path: &Path) -> Result<LoadOutcome, PersistenceError> {
        let content = std::fs::read_to_string(path)?;
        let outcome = self.parse_document(&content, self.format_for(path))?;

        tracing::info!(
            "Loaded narrative graph {:?} from {:?}: {} nodes, {} links, {} warnings",
            outcome.document.name,
            path,
            outcome.document.node_count(),
            outcome.document.link_count(),
            outcome.warnings.len()
        );
        Ok(outcome)
    }

    /// Load a document into `target`, replacing it entirely.
    ///
    /// On error `target` is left untouched.
    pub fn load_into(&self, target: &mut GraphDocument, path: &Path) -> Result<Vec<LoadWarning>, PersistenceError> {
        let outcome = self.load(path)?;
        *target = outcome.document;
        Ok(outcome.warnings)
    }

    /// Rebuild a document from its stored shape. Flags come first, then nodes, links and groups.
    pub fn reconstruct(&self, persisted: PersistedDocument) -> LoadOutcome {
        let mut document = GraphDocument::new(persisted.name);
        document.id = persisted.id;
        let mut warnings = Vec::new();

        for flag in persisted.flags {
            if document.has_flag(&flag.name) {
                warnings.push(LoadWarning::DuplicateFlag(flag.name));
                continue;
            }
            if let Err(e) = flag.value() {
                warnings.push(LoadWarning::TypeMismatch {
                    owner: "flag".to_string(),
                    name: flag.name,
                    reason: e.to_string(),
                });
                continue;
            }
            document.insert_flag_unchecked(flag);
        }

        for node in persisted.nodes {
            if let Some(node) = self.reconstruct_node(&document, node, &mut warnings) {
                document.insert_node_unchecked(node);
            }
        }

        for link in persisted.links {
            self.reconstruct_link(&mut document, link, &mut warnings);
        }

        for mut group in persisted.groups {
            group.node_ids.retain(|id| {
                let exists = document.node(*id).is_some();
                if !exists {
                    warnings.push(LoadWarning::DanglingGroupReference {
                        group: group.title.clone(),
                        node: *id,
                    });
                }
                exists
            });
            document.add_group(group);
        }

        for warning in &warnings {
            tracing::warn!("{warning}");
        }

        LoadOutcome { document, warnings }
    }

    fn reconstruct_node(
        &self,
        document: &GraphDocument,
        mut node: NodeRecord,
        warnings: &mut Vec<LoadWarning>,
    ) -> Option<NodeRecord> {
        if document.node(node.id).is_some() {
            warnings.push(LoadWarning::DuplicateNode(node.id));
            return None;
        }
        let Some(descriptor) = self.registry.get(&node.type_tag) else {
            warnings.push(LoadWarning::UnknownNodeType {
                node: node.id,
                type_tag: node.type_tag,
            });
            return None;
        };
        if node.is_start() && document.start_node().is_some() {
            warnings.push(LoadWarning::DuplicateStart(node.id));
            return None;
        }

        let node_id = node.id;
        let mut seen = HashSet::new();
        node.properties.retain(|property| {
            if !seen.insert(property.name.clone()) {
                warnings.push(LoadWarning::DuplicateProperty {
                    node: node_id,
                    property: property.name.clone(),
                });
                return false;
            }
            let Some(field) = descriptor.field(&property.name) else {
                warnings.push(LoadWarning::UnknownProperty {
                    node: node_id,
                    property: property.name.clone(),
                });
                return false;
            };
            let problem = if field.property_type != property.declared_type {
                Some(schema_mismatch(&field.property_type, &property.declared_type))
            } else {
                codec::check_shape(&property.encoded_value, &property.declared_type).err()
            };
            match problem {
                Some(e) => {
                    warnings.push(LoadWarning::TypeMismatch {
                        owner: node_id.to_string(),
                        name: property.name.clone(),
                        reason: e.to_string(),
                    });
                    false
                }
                None => true,
            }
        });

        Some(node)
    }

    fn reconstruct_link(&self, document: &mut GraphDocument, link: LinkRecord, warnings: &mut Vec<LoadWarning>) {
        let (Some(source), Some(target)) = (document.node(link.source_node_id), document.node(link.target_node_id))
        else {
            warnings.push(LoadWarning::DanglingLink(link));
            return;
        };
        if target.is_start() {
            warnings.push(LoadWarning::LinkIntoStart(link));
            return;
        }

        if self.settings.link_policy != LinkPolicy::Trust {
            let source_port = PortRef::output(source.type_tag.clone(), link.source_port_name.clone(), link.source_port_index);
            let target_port = PortRef::input(target.type_tag.clone());
            let existing = document.existing_targets(link.source_node_id, &link.source_port_name, link.source_port_index);

            if !self.validator.can_connect(&source_port, &target_port, &existing) {
                let reject = self.settings.link_policy == LinkPolicy::Reject;
                warnings.push(LoadWarning::IllegalLink(link.clone()));
                if reject {
                    return;
                }
            }
        }

        document.push_link_unchecked(link);
    }
}

fn schema_mismatch(expected: &PropertyType, found: &PropertyType) -> CodecError {
    CodecError::TypeMismatch {
        expected: expected.clone(),
        found: found.to_string(),
    }
}

fn read_existing_id(path: &Path, format: DocumentFormat) -> Option<DocumentId> {
    let content = std::fs::read_to_string(path).ok()?;
    let header: PersistedHeader = match format {
        DocumentFormat::Ron => ron::from_str(&content).ok()?,
        DocumentFormat::Json => serde_json::from_str(&content).ok()?,
    };
    Some(header.id)
}

/// Error when saving or loading a document
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored content does not have the document shape
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// Document written by a newer version
    #[error("Document version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest supported version
        supported: u32,
    },

    /// Serializer failure
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// No open document with this identity
    #[error("Document not open: {0}")]
    NotOpen(DocumentId),

    /// Open document has never been loaded from or saved to a path
    #[error("Document {0} has no path")]
    NoPath(DocumentId),
}
