// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property encoding and decoding.
//!
//! Plain values are wrapped in a single-field struct and written as RON,
//! e.g. `(value:true)` or `(value:"Hello")`. Asset references are never
//! stored by value: they are exchanged for an opaque token through an
//! [`AssetResolver`], and an empty token stands for an absent reference.

use crate::property::{AssetHandle, PropertyRecord, PropertyType, PropertyValue};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Bridges asset tokens to the host's resource system.
///
/// `resource_for` may block on I/O and has no timeout.
pub trait AssetResolver: Send + Sync {
    /// Get the token identifying `asset`
    fn token_for(&self, asset: &AssetHandle) -> String;

    /// Resolve a token back to a resource of the given kind
    fn resource_for(&self, token: &str, kind: &str) -> Option<AssetHandle>;
}

/// Resolver for hosts without an asset system. Nothing resolves.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAssetResolver;

impl AssetResolver for NullAssetResolver {
    fn token_for(&self, asset: &AssetHandle) -> String {
        asset.path.to_string_lossy().into_owned()
    }

    fn resource_for(&self, _token: &str, _kind: &str) -> Option<AssetHandle> {
        None
    }
}

/// In-memory token table. Unknown assets are assigned a fresh token on first use.
#[derive(Debug, Default)]
pub struct MemoryAssetResolver {
    by_token: RwLock<IndexMap<String, AssetHandle>>,
    by_asset: RwLock<HashMap<AssetHandle, String>>,
}

impl MemoryAssetResolver {
    /// Create an empty resolver
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset and return its token
    pub fn register(&self, asset: AssetHandle) -> String {
        let mut by_asset = self.by_asset.write();
        if let Some(token) = by_asset.get(&asset) {
            return token.clone();
        }
        let token = Uuid::new_v4().to_string();
        by_asset.insert(asset.clone(), token.clone());
        self.by_token.write().insert(token.clone(), asset);
        token
    }

    /// Forget an asset; its token stops resolving
    pub fn unregister(&self, asset: &AssetHandle) {
        if let Some(token) = self.by_asset.write().remove(asset) {
            self.by_token.write().shift_remove(&token);
        }
    }

    /// Number of registered assets
    pub fn len(&self) -> usize {
        self.by_token.read().len()
    }

    /// Whether no assets are registered
    pub fn is_empty(&self) -> bool {
        self.by_token.read().is_empty()
    }
}

impl AssetResolver for MemoryAssetResolver {
    fn token_for(&self, asset: &AssetHandle) -> String {
        self.register(asset.clone())
    }

    fn resource_for(&self, token: &str, kind: &str) -> Option<AssetHandle> {
        self.by_token
            .read()
            .get(token)
            .filter(|asset| asset.kind == kind)
            .cloned()
    }
}

/// Resolves tokens as paths relative to an asset root directory.
///
/// Handles carry root-relative paths; resolution checks the file exists.
#[derive(Debug, Clone)]
pub struct DirectoryAssetResolver {
    root: PathBuf,
}

impl DirectoryAssetResolver {
    /// Create a resolver rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The asset root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetResolver for DirectoryAssetResolver {
    fn token_for(&self, asset: &AssetHandle) -> String {
        let relative = asset.path.strip_prefix(&self.root).unwrap_or(&asset.path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn resource_for(&self, token: &str, kind: &str) -> Option<AssetHandle> {
        let path = PathBuf::from(token);
        let inside_root = path.components().all(|c| matches!(c, Component::Normal(_)));
        if !inside_root || !self.root.join(&path).is_file() {
            return None;
        }
        Some(AssetHandle::new(kind, path))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Wrapped<T> {
    value: T,
}

/// Converts typed property values to and from their portable tokens
#[derive(Clone)]
pub struct PropertyCodec {
    resolver: Arc<dyn AssetResolver>,
}

impl fmt::Debug for PropertyCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyCodec").finish_non_exhaustive()
    }
}

impl Default for PropertyCodec {
    fn default() -> Self {
        Self::plain()
    }
}

impl PropertyCodec {
    /// Create a codec resolving assets through `resolver`
    pub fn new(resolver: Arc<dyn AssetResolver>) -> Self {
        Self { resolver }
    }

    /// Codec for documents without asset references
    pub fn plain() -> Self {
        Self::new(Arc::new(NullAssetResolver))
    }

    /// Encode `value` as a token for `declared`
    pub fn encode(&self, value: &PropertyValue, declared: &PropertyType) -> Result<String, CodecError> {
        if !value.matches(declared) {
            return Err(CodecError::TypeMismatch {
                expected: declared.clone(),
                found: value.type_name().to_string(),
            });
        }

        match value {
            PropertyValue::Asset(None) => Ok(String::new()),
            PropertyValue::Asset(Some(handle)) => Ok(self.resolver.token_for(handle)),
            other => encode_plain(other),
        }
    }

    /// Decode a token previously produced for `declared`
    pub fn decode(&self, token: &str, declared: &PropertyType) -> Result<PropertyValue, CodecError> {
        match declared {
            PropertyType::Asset(kind) => {
                if token.is_empty() {
                    return Ok(PropertyValue::Asset(None));
                }
                self.resolver
                    .resource_for(token, kind)
                    .map(|handle| PropertyValue::Asset(Some(handle)))
                    .ok_or_else(|| CodecError::UnresolvedReference {
                        token: token.to_string(),
                        kind: kind.clone(),
                    })
            }
            plain => decode_plain(token, plain),
        }
    }

    /// Encode a value into a complete property record
    pub fn encode_record(
        &self,
        name: impl Into<String>,
        value: &PropertyValue,
        declared: PropertyType,
    ) -> Result<PropertyRecord, CodecError> {
        let encoded = self.encode(value, &declared)?;
        Ok(PropertyRecord::new(name, declared, encoded))
    }

    /// Decode a property record's value
    pub fn decode_record(&self, record: &PropertyRecord) -> Result<PropertyValue, CodecError> {
        self.decode(&record.encoded_value, &record.declared_type)
    }
}

/// Check that a token has the shape `declared` expects, without resolving assets.
pub fn check_shape(token: &str, declared: &PropertyType) -> Result<(), CodecError> {
    match declared {
        PropertyType::Asset(_) => Ok(()),
        plain => decode_plain(token, plain).map(|_| ()),
    }
}

/// Encode a plain (non-asset) value through the single-field wrapper
pub(crate) fn encode_plain(value: &PropertyValue) -> Result<String, CodecError> {
    let result = match value {
        PropertyValue::Bool(v) => wrap(v),
        PropertyValue::Int(v) => wrap(v),
        PropertyValue::Float(v) => wrap(v),
        PropertyValue::String(v) => wrap(v),
        PropertyValue::Vector2(v) => wrap(v),
        PropertyValue::Color(v) => wrap(v),
        PropertyValue::StringList(v) => wrap(v),
        PropertyValue::Asset(_) => {
            return Err(CodecError::TypeMismatch {
                expected: PropertyType::String,
                found: value.type_name().to_string(),
            })
        }
    };
    result.map_err(|e| CodecError::Serialize(e.to_string()))
}

fn wrap<T: Serialize>(value: &T) -> Result<String, ron::Error> {
    ron::to_string(&Wrapped { value })
}

fn unwrap<T: DeserializeOwned>(token: &str, declared: &PropertyType) -> Result<T, CodecError> {
    ron::from_str::<Wrapped<T>>(token)
        .map(|w| w.value)
        .map_err(|_| CodecError::TypeMismatch {
            expected: declared.clone(),
            found: token.to_string(),
        })
}

fn decode_plain(token: &str, declared: &PropertyType) -> Result<PropertyValue, CodecError> {
    Ok(match declared {
        PropertyType::Bool => PropertyValue::Bool(unwrap(token, declared)?),
        PropertyType::Int => PropertyValue::Int(unwrap(token, declared)?),
        PropertyType::Float => PropertyValue::Float(unwrap(token, declared)?),
        PropertyType::String => PropertyValue::String(unwrap(token, declared)?),
        PropertyType::Vector2 => PropertyValue::Vector2(unwrap(token, declared)?),
        PropertyType::Color => PropertyValue::Color(unwrap(token, declared)?),
        PropertyType::StringList => PropertyValue::StringList(unwrap(token, declared)?),
        PropertyType::Asset(kind) => {
            return Err(CodecError::UnresolvedReference {
                token: token.to_string(),
                kind: kind.clone(),
            })
        }
    })
}

/// Error when encoding or decoding a property
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// Token or value does not match the declared type
    #[error("Type mismatch: expected {expected}, found {found:?}")]
    TypeMismatch {
        /// Declared type
        expected: PropertyType,
        /// Offending token or value kind
        found: String,
    },

    /// Asset token could not be resolved
    #[error("Unresolved {kind} reference: {token:?}")]
    UnresolvedReference {
        /// The opaque token
        token: String,
        /// Expected resource kind
        kind: String,
    },

    /// Serializer failure
    #[error("Serialization error: {0}")]
    Serialize(String),
}
