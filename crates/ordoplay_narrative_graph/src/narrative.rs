// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in narrative node types.
//!
//! Start, text, choice, condition, modifier and end nodes, plus the
//! registry that describes them.

use crate::flag::{FlagState, FlagValue};
use crate::node::{NodeId, START_NODE_TYPE};
use crate::property::{AssetHandle, PropertyType, PropertyValue};
use crate::registry::{
    field_value, FieldError, NarrativeNode, NodeCategory, NodeTypeDescriptor, NodeTypeRegistry,
};
use std::any::Any;
use std::fmt;
use std::str::FromStr;

/// Type tag of text nodes
pub const TEXT_NODE_TYPE: &str = "text";
/// Type tag of choice nodes
pub const CHOICE_NODE_TYPE: &str = "choice";
/// Type tag of condition nodes
pub const CONDITION_NODE_TYPE: &str = "condition";
/// Type tag of modifier nodes
pub const MODIFIER_NODE_TYPE: &str = "modifier";
/// Type tag of end nodes
pub const END_NODE_TYPE: &str = "end";

/// Output port of condition nodes taken when the comparison holds
pub const TRUE_PORT: &str = "True";
/// Output port of condition nodes taken otherwise
pub const FALSE_PORT: &str = "False";
/// Output port of linear nodes
pub const NEXT_PORT: &str = "Next";

macro_rules! node_identity {
    ($tag:expr) => {
        fn id(&self) -> NodeId {
            self.id
        }

        fn set_id(&mut self, id: NodeId) {
            self.id = id;
        }

        fn type_tag(&self) -> &str {
            $tag
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    };
}

/// Entry point of a narrative
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartNode {
    /// Node instance ID
    pub id: NodeId,
}

impl NarrativeNode for StartNode {
    node_identity!(START_NODE_TYPE);

    fn set_field(&mut self, name: &str, _value: PropertyValue) -> Result<(), FieldError> {
        Err(FieldError::UnknownField(name.to_string()))
    }
}

/// A line of text spoken or narrated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextNode {
    /// Node instance ID
    pub id: NodeId,
    /// Speaker name, empty for narration
    pub speaker: String,
    /// The text shown to the player
    pub text: String,
    /// Speaker portrait
    pub portrait: Option<AssetHandle>,
    /// Voice-over clip
    pub voice: Option<AssetHandle>,
}

impl NarrativeNode for TextNode {
    node_identity!(TEXT_NODE_TYPE);

    fn set_field(&mut self, name: &str, value: PropertyValue) -> Result<(), FieldError> {
        match name {
            "speaker" => self.speaker = field_value(name, value)?,
            "text" => self.text = field_value(name, value)?,
            "portrait" => self.portrait = field_value(name, value)?,
            "voice" => self.voice = field_value(name, value)?,
            _ => return Err(FieldError::UnknownField(name.to_string())),
        }
        Ok(())
    }
}

/// One option the player can pick after a text node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoiceNode {
    /// Node instance ID
    pub id: NodeId,
    /// Option label
    pub text: String,
    /// Optional icon
    pub icon: Option<AssetHandle>,
}

impl NarrativeNode for ChoiceNode {
    node_identity!(CHOICE_NODE_TYPE);

    fn set_field(&mut self, name: &str, value: PropertyValue) -> Result<(), FieldError> {
        match name {
            "text" => self.text = field_value(name, value)?,
            "icon" => self.icon = field_value(name, value)?,
            _ => return Err(FieldError::UnknownField(name.to_string())),
        }
        Ok(())
    }
}

/// Comparison applied by a condition node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Comparison {
    /// `==`
    #[default]
    Equal,
    /// `!=`
    NotEqual,
    /// `<`
    Less,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `>=`
    GreaterOrEqual,
}

impl Comparison {
    /// Apply the comparison
    pub fn compare(self, lhs: i32, rhs: i32) -> bool {
        match self {
            Self::Equal => lhs == rhs,
            Self::NotEqual => lhs != rhs,
            Self::Less => lhs < rhs,
            Self::LessOrEqual => lhs <= rhs,
            Self::Greater => lhs > rhs,
            Self::GreaterOrEqual => lhs >= rhs,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
        })
    }
}

impl FromStr for Comparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "==" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            "<" => Ok(Self::Less),
            "<=" => Ok(Self::LessOrEqual),
            ">" => Ok(Self::Greater),
            ">=" => Ok(Self::GreaterOrEqual),
            other => Err(format!("unknown comparison {other:?}")),
        }
    }
}

/// Branches on a flag value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionNode {
    /// Node instance ID
    pub id: NodeId,
    /// Flag to test
    pub flag: String,
    /// Comparison operator
    pub comparison: Comparison,
    /// Right-hand side; booleans compare as 0 and 1
    pub value: i32,
}

impl ConditionNode {
    /// Evaluate against the given flags. `None` if the flag does not exist.
    pub fn evaluate(&self, flags: &FlagState) -> Option<bool> {
        let current = flags.get(&self.flag)?;
        Some(self.comparison.compare(current.as_int(), self.value))
    }

    /// Output port to follow for the given flags
    pub fn branch(&self, flags: &FlagState) -> Option<&'static str> {
        self.evaluate(flags)
            .map(|holds| if holds { TRUE_PORT } else { FALSE_PORT })
    }
}

impl NarrativeNode for ConditionNode {
    node_identity!(CONDITION_NODE_TYPE);

    fn set_field(&mut self, name: &str, value: PropertyValue) -> Result<(), FieldError> {
        match name {
            "flag" => self.flag = field_value(name, value)?,
            "comparison" => {
                let text: String = field_value(name, value)?;
                self.comparison = text.parse().map_err(|reason| FieldError::InvalidValue {
                    field: name.to_string(),
                    reason,
                })?;
            }
            "value" => self.value = field_value(name, value)?,
            _ => return Err(FieldError::UnknownField(name.to_string())),
        }
        Ok(())
    }
}

/// Operation applied by a modifier node
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModifierOp {
    /// Replace the flag value
    #[default]
    Set,
    /// Add to an integer flag
    Add,
    /// Invert a boolean flag
    Toggle,
}

impl FromStr for ModifierOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "set" => Ok(Self::Set),
            "add" => Ok(Self::Add),
            "toggle" => Ok(Self::Toggle),
            other => Err(format!("unknown operation {other:?}")),
        }
    }
}

/// Changes a flag in the driver's runtime state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifierNode {
    /// Node instance ID
    pub id: NodeId,
    /// Flag to change
    pub flag: String,
    /// Operation
    pub operation: ModifierOp,
    /// Operand; for boolean `set`, non-zero means true
    pub value: i32,
}

impl ModifierNode {
    /// Apply to the caller's runtime flags. Returns false if the flag does not exist.
    pub fn apply(&self, flags: &mut FlagState) -> bool {
        let Some(current) = flags.get_mut(&self.flag) else {
            return false;
        };

        *current = match (self.operation, *current) {
            (ModifierOp::Set, FlagValue::Bool(_)) => FlagValue::Bool(self.value != 0),
            (ModifierOp::Set, FlagValue::Int(_)) => FlagValue::Int(self.value),
            (ModifierOp::Add, FlagValue::Int(i)) => FlagValue::Int(i.saturating_add(self.value)),
            (ModifierOp::Add, FlagValue::Bool(b)) => FlagValue::Bool(i32::from(b).saturating_add(self.value) != 0),
            (ModifierOp::Toggle, FlagValue::Bool(b)) => FlagValue::Bool(!b),
            (ModifierOp::Toggle, FlagValue::Int(i)) => FlagValue::Int(i32::from(i == 0)),
        };
        true
    }
}

impl NarrativeNode for ModifierNode {
    node_identity!(MODIFIER_NODE_TYPE);

    fn set_field(&mut self, name: &str, value: PropertyValue) -> Result<(), FieldError> {
        match name {
            "flag" => self.flag = field_value(name, value)?,
            "operation" => {
                let text: String = field_value(name, value)?;
                self.operation = text.parse().map_err(|reason| FieldError::InvalidValue {
                    field: name.to_string(),
                    reason,
                })?;
            }
            "value" => self.value = field_value(name, value)?,
            _ => return Err(FieldError::UnknownField(name.to_string())),
        }
        Ok(())
    }
}

/// Terminates a narrative branch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndNode {
    /// Node instance ID
    pub id: NodeId,
}

impl NarrativeNode for EndNode {
    node_identity!(END_NODE_TYPE);

    fn set_field(&mut self, name: &str, _value: PropertyValue) -> Result<(), FieldError> {
        Err(FieldError::UnknownField(name.to_string()))
    }
}

/// Create the narrative node registry with the built-in node types
pub fn create_narrative_registry() -> NodeTypeRegistry {
    let mut registry = NodeTypeRegistry::new();
    let sprite = PropertyType::Asset("sprite".to_string());
    let audio = PropertyType::Asset("audio".to_string());

    registry.register(
        NodeTypeDescriptor::new::<StartNode>(START_NODE_TYPE, "Start", NodeCategory::Flow)
            .with_description("Entry point of the narrative")
            .without_input()
            .with_outputs([NEXT_PORT]),
    );

    registry.register(
        NodeTypeDescriptor::new::<TextNode>(TEXT_NODE_TYPE, "Text", NodeCategory::Dialogue)
            .with_description("Show a line of text")
            .with_menu_path("Dialogue/Text")
            .with_outputs([NEXT_PORT])
            .with_field("speaker", PropertyType::String, String::new())
            .with_field("text", PropertyType::String, String::new())
            .with_field("portrait", sprite.clone(), PropertyValue::Asset(None))
            .with_field("voice", audio, PropertyValue::Asset(None)),
    );

    registry.register(
        NodeTypeDescriptor::new::<ChoiceNode>(CHOICE_NODE_TYPE, "Choice", NodeCategory::Dialogue)
            .with_description("An option the player can pick")
            .with_menu_path("Dialogue/Choice")
            .with_outputs([NEXT_PORT])
            .with_field("text", PropertyType::String, String::new())
            .with_field("icon", sprite, PropertyValue::Asset(None)),
    );

    registry.register(
        NodeTypeDescriptor::new::<ConditionNode>(CONDITION_NODE_TYPE, "Condition", NodeCategory::Logic)
            .with_description("Branch on a flag value")
            .with_menu_path("Logic/Condition")
            .with_outputs([TRUE_PORT, FALSE_PORT])
            .with_field("flag", PropertyType::String, String::new())
            .with_field("comparison", PropertyType::String, "==".to_string())
            .with_field("value", PropertyType::Int, 0i32),
    );

    registry.register(
        NodeTypeDescriptor::new::<ModifierNode>(MODIFIER_NODE_TYPE, "Modifier", NodeCategory::State)
            .with_description("Change a flag value")
            .with_menu_path("Logic/Modifier")
            .with_outputs([NEXT_PORT])
            .with_field("flag", PropertyType::String, String::new())
            .with_field("operation", PropertyType::String, "set".to_string())
            .with_field("value", PropertyType::Int, 0i32),
    );

    registry.register(
        NodeTypeDescriptor::new::<EndNode>(END_NODE_TYPE, "End", NodeCategory::Flow)
            .with_description("End of the narrative")
            .with_menu_path("Flow/End")
            .with_outputs(Vec::<String>::new()),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags() -> FlagState {
        let mut flags = FlagState::new();
        flags.insert("met_hero".to_string(), FlagValue::Bool(true));
        flags.insert("gold".to_string(), FlagValue::Int(10));
        flags
    }

    #[test]
    fn test_registry_contents() {
        let registry = create_narrative_registry();
        assert_eq!(registry.types().count(), 6);
        let start = registry.get(START_NODE_TYPE).unwrap();
        assert!(!start.has_input);
        let condition = registry.get(CONDITION_NODE_TYPE).unwrap();
        assert!(condition.has_output(TRUE_PORT) && condition.has_output(FALSE_PORT));
        assert!(registry.get(END_NODE_TYPE).unwrap().outputs.is_empty());
    }

    #[test]
    fn test_condition_evaluate() {
        let condition = ConditionNode {
            flag: "gold".to_string(),
            comparison: Comparison::GreaterOrEqual,
            value: 5,
            ..Default::default()
        };
        assert_eq!(condition.evaluate(&flags()), Some(true));
        assert_eq!(condition.branch(&flags()), Some(TRUE_PORT));

        let missing = ConditionNode {
            flag: "nope".to_string(),
            ..Default::default()
        };
        assert_eq!(missing.evaluate(&flags()), None);
    }

    #[test]
    fn test_modifier_apply() {
        let mut flags = flags();
        let add = ModifierNode {
            flag: "gold".to_string(),
            operation: ModifierOp::Add,
            value: -4,
            ..Default::default()
        };
        assert!(add.apply(&mut flags));
        assert_eq!(flags["gold"], FlagValue::Int(6));

        let toggle = ModifierNode {
            flag: "met_hero".to_string(),
            operation: ModifierOp::Toggle,
            ..Default::default()
        };
        assert!(toggle.apply(&mut flags));
        assert_eq!(flags["met_hero"], FlagValue::Bool(false));
        assert!(!ModifierNode::default().apply(&mut flags));
    }

    #[test]
    fn test_modifier_add_saturates() {
        let mut flags = flags();
        flags.insert("met_hero".to_string(), FlagValue::Bool(true));
        let add = |flag: &str| ModifierNode {
            flag: flag.to_string(),
            operation: ModifierOp::Add,
            value: i32::MAX,
            ..Default::default()
        };

        assert!(add("met_hero").apply(&mut flags));
        assert_eq!(flags["met_hero"], FlagValue::Bool(true));
        assert!(add("gold").apply(&mut flags));
        assert_eq!(flags["gold"], FlagValue::Int(i32::MAX));
    }

    #[test]
    fn test_condition_fields() {
        let mut node = ConditionNode::default();
        node.set_field("comparison", PropertyValue::String("<".to_string())).unwrap();
        assert_eq!(node.comparison, Comparison::Less);
        assert!(matches!(
            node.set_field("comparison", PropertyValue::String("~".to_string())),
            Err(FieldError::InvalidValue { .. })
        ));
        assert!(matches!(
            node.set_field("value", PropertyValue::Bool(true)),
            Err(FieldError::WrongType { .. })
        ));
    }
}
