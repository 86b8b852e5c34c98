// SPDX-License-Identifier: MIT OR Apache-2.0
//! Document-scoped flags used by condition and modifier nodes.

use crate::codec::{self, CodecError};
use crate::property::{PropertyType, PropertyValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Runtime view of a document's flags, by name
pub type FlagState = IndexMap<String, FlagValue>;

/// Value of a flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlagValue {
    /// Boolean flag
    Bool(bool),
    /// Integer flag
    Int(i32),
}

impl FlagValue {
    /// Declared type for this value
    pub fn property_type(&self) -> PropertyType {
        match self {
            Self::Bool(_) => PropertyType::Bool,
            Self::Int(_) => PropertyType::Int,
        }
    }

    /// Numeric view, booleans map to 0 and 1
    pub fn as_int(&self) -> i32 {
        match *self {
            Self::Bool(b) => i32::from(b),
            Self::Int(i) => i,
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => b.fmt(f),
            Self::Int(i) => i.fmt(f),
        }
    }
}

impl From<FlagValue> for PropertyValue {
    fn from(value: FlagValue) -> Self {
        match value {
            FlagValue::Bool(b) => PropertyValue::Bool(b),
            FlagValue::Int(i) => PropertyValue::Int(i),
        }
    }
}

impl TryFrom<PropertyValue> for FlagValue {
    type Error = CodecError;

    fn try_from(value: PropertyValue) -> Result<Self, Self::Error> {
        match value {
            PropertyValue::Bool(b) => Ok(Self::Bool(b)),
            PropertyValue::Int(i) => Ok(Self::Int(i)),
            other => Err(CodecError::TypeMismatch {
                expected: PropertyType::Int,
                found: other.type_name().to_string(),
            }),
        }
    }
}

/// A flag as stored in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagRecord {
    /// Flag name, unique per document
    pub name: String,
    /// Declared type, `bool` or `int`
    pub declared_type: PropertyType,
    /// Encoded value
    pub encoded_value: String,
}

impl FlagRecord {
    /// Create a flag record holding `value`
    pub fn new(name: impl Into<String>, value: FlagValue) -> Result<Self, CodecError> {
        let encoded_value = codec::encode_plain(&value.into())?;
        Ok(Self {
            name: name.into(),
            declared_type: value.property_type(),
            encoded_value,
        })
    }

    /// Decode the flag's value
    pub fn value(&self) -> Result<FlagValue, CodecError> {
        if !self.declared_type.is_flag_type() {
            return Err(CodecError::TypeMismatch {
                expected: PropertyType::Int,
                found: self.declared_type.to_string(),
            });
        }
        codec::PropertyCodec::plain()
            .decode(&self.encoded_value, &self.declared_type)
            .and_then(FlagValue::try_from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_round_trip() {
        let flag = FlagRecord::new("met_hero", FlagValue::Bool(true)).unwrap();
        assert_eq!(flag.declared_type, PropertyType::Bool);
        assert_eq!(flag.value().unwrap(), FlagValue::Bool(true));

        let flag = FlagRecord::new("gold", FlagValue::Int(-3)).unwrap();
        assert_eq!(flag.value().unwrap(), FlagValue::Int(-3));
    }

    #[test]
    fn test_flag_rejects_non_flag_types() {
        let flag = FlagRecord {
            name: "mood".to_string(),
            declared_type: PropertyType::String,
            encoded_value: "(value:\"happy\")".to_string(),
        };
        assert!(flag.value().is_err());
        assert_eq!(FlagValue::Bool(true).as_int(), 1);
    }
}
