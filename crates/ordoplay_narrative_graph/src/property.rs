// SPDX-License-Identifier: MIT OR Apache-2.0
//! Property types, values and their persisted records.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Declared type of a node property or document flag.
///
/// The textual form (`bool`, `int`, `asset:sprite`, ...) is what gets
/// persisted as a record's `declared_type`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PropertyType {
    /// Boolean value
    Bool,
    /// Integer value
    Int,
    /// Floating point value
    Float,
    /// String value
    String,
    /// 2D vector
    Vector2,
    /// Color (RGBA)
    Color,
    /// Ordered list of strings
    StringList,
    /// Reference to a host-owned resource of the given kind
    Asset(String),
}

impl PropertyType {
    /// Whether values of this type are stored as asset tokens
    pub fn is_asset(&self) -> bool {
        matches!(self, Self::Asset(_))
    }

    /// Whether this type may be used for a document flag
    pub fn is_flag_type(&self) -> bool {
        matches!(self, Self::Bool | Self::Int)
    }

    /// The zero value for this type
    pub fn zero_value(&self) -> PropertyValue {
        match self {
            Self::Bool => PropertyValue::Bool(false),
            Self::Int => PropertyValue::Int(0),
            Self::Float => PropertyValue::Float(0.0),
            Self::String => PropertyValue::String(String::new()),
            Self::Vector2 => PropertyValue::Vector2([0.0, 0.0]),
            Self::Color => PropertyValue::Color([0.0, 0.0, 0.0, 1.0]),
            Self::StringList => PropertyValue::StringList(Vec::new()),
            Self::Asset(_) => PropertyValue::Asset(None),
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => f.write_str("bool"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::String => f.write_str("string"),
            Self::Vector2 => f.write_str("vector2"),
            Self::Color => f.write_str("color"),
            Self::StringList => f.write_str("string_list"),
            Self::Asset(kind) => write!(f, "asset:{kind}"),
        }
    }
}

impl FromStr for PropertyType {
    type Err = UnknownPropertyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bool" => Ok(Self::Bool),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "string" => Ok(Self::String),
            "vector2" => Ok(Self::Vector2),
            "color" => Ok(Self::Color),
            "string_list" => Ok(Self::StringList),
            other => match other.strip_prefix("asset:") {
                Some(kind) if !kind.is_empty() => Ok(Self::Asset(kind.to_string())),
                _ => Err(UnknownPropertyType(other.to_string())),
            },
        }
    }
}

impl TryFrom<String> for PropertyType {
    type Error = UnknownPropertyType;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PropertyType> for String {
    fn from(value: PropertyType) -> Self {
        value.to_string()
    }
}

/// Error when a declared type tag is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown property type: {0}")]
pub struct UnknownPropertyType(pub String);

/// Handle to a resource owned by the host application (sprite, audio clip, ...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetHandle {
    /// Resource kind, matching the `asset:<kind>` property type
    pub kind: String,
    /// Host-side location of the resource
    pub path: PathBuf,
}

impl AssetHandle {
    /// Create a new asset handle
    pub fn new(kind: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            kind: kind.into(),
            path: path.into(),
        }
    }
}

/// A decoded property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i32),
    /// Float
    Float(f32),
    /// String
    String(String),
    /// 2D vector
    Vector2([f32; 2]),
    /// Color
    Color([f32; 4]),
    /// List of strings
    StringList(Vec<String>),
    /// Asset reference, `None` when absent
    Asset(Option<AssetHandle>),
}

impl PropertyValue {
    /// Check whether this value can be stored under the given declared type
    pub fn matches(&self, declared: &PropertyType) -> bool {
        match (self, declared) {
            (Self::Bool(_), PropertyType::Bool)
            | (Self::Int(_), PropertyType::Int)
            | (Self::Float(_), PropertyType::Float)
            | (Self::String(_), PropertyType::String)
            | (Self::Vector2(_), PropertyType::Vector2)
            | (Self::Color(_), PropertyType::Color)
            | (Self::StringList(_), PropertyType::StringList)
            | (Self::Asset(None), PropertyType::Asset(_)) => true,
            (Self::Asset(Some(handle)), PropertyType::Asset(kind)) => handle.kind == *kind,
            _ => false,
        }
    }

    /// Short name of the value's variant, for diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Vector2(_) => "vector2",
            Self::Color(_) => "color",
            Self::StringList(_) => "string_list",
            Self::Asset(_) => "asset",
        }
    }
}

/// Typed extraction from a [`PropertyValue`]
pub trait FromPropertyValue: Sized {
    /// Extract `Self` if the value holds the matching variant
    fn from_property_value(value: PropertyValue) -> Option<Self>;
}

macro_rules! impl_from_property_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromPropertyValue for $ty {
                fn from_property_value(value: PropertyValue) -> Option<Self> {
                    match value {
                        PropertyValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for PropertyValue {
                fn from(value: $ty) -> Self {
                    PropertyValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_property_value! {
    bool => Bool,
    i32 => Int,
    f32 => Float,
    String => String,
    [f32; 2] => Vector2,
    [f32; 4] => Color,
    Vec<String> => StringList,
    Option<AssetHandle> => Asset,
}

impl FromPropertyValue for AssetHandle {
    fn from_property_value(value: PropertyValue) -> Option<Self> {
        match value {
            PropertyValue::Asset(handle) => handle,
            _ => None,
        }
    }
}

impl FromPropertyValue for PropertyValue {
    fn from_property_value(value: PropertyValue) -> Option<Self> {
        Some(value)
    }
}

/// A property as stored on a node: name, declared type and encoded token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Property name, unique per node
    pub name: String,
    /// Declared type
    pub declared_type: PropertyType,
    /// Encoded token, see [`crate::codec::PropertyCodec`]
    pub encoded_value: String,
}

impl PropertyRecord {
    /// Create a new property record from an already encoded token
    pub fn new(
        name: impl Into<String>,
        declared_type: PropertyType,
        encoded_value: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type,
            encoded_value: encoded_value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_text_form() {
        for ty in [
            PropertyType::Bool,
            PropertyType::Int,
            PropertyType::Float,
            PropertyType::String,
            PropertyType::Vector2,
            PropertyType::Color,
            PropertyType::StringList,
            PropertyType::Asset("sprite".to_string()),
        ] {
            assert_eq!(ty.to_string().parse::<PropertyType>(), Ok(ty));
        }
        assert!("asset:".parse::<PropertyType>().is_err());
        assert!("quaternion".parse::<PropertyType>().is_err());
    }

    #[test]
    fn test_value_matches_declared_type() {
        let sprite = PropertyType::Asset("sprite".to_string());
        assert!(PropertyValue::Asset(None).matches(&sprite));
        assert!(PropertyValue::Asset(Some(AssetHandle::new("sprite", "hero.png"))).matches(&sprite));
        assert!(!PropertyValue::Asset(Some(AssetHandle::new("audio", "hero.ogg"))).matches(&sprite));
        assert!(!PropertyValue::Int(1).matches(&PropertyType::Float));
    }

    #[test]
    fn test_typed_extraction() {
        assert_eq!(i32::from_property_value(PropertyValue::Int(4)), Some(4));
        assert_eq!(bool::from_property_value(PropertyValue::Int(4)), None);
        assert_eq!(AssetHandle::from_property_value(PropertyValue::Asset(None)), None);
    }
}
