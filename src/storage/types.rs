use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::types::{EdgeKey, VertexId};

/// Logical type of a stored property, embedded in the column qualifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum TypeTag {
    /// UTF-8 string.
    Str,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 32-bit IEEE-754 float.
    Float,
    /// 64-bit IEEE-754 float.
    Double,
    /// Boolean.
    Bool,
}

impl TypeTag {
    /// Every supported tag.
    pub const ALL: [TypeTag; 6] = [
        TypeTag::Str,
        TypeTag::Int,
        TypeTag::Long,
        TypeTag::Float,
        TypeTag::Double,
        TypeTag::Bool,
    ];

    /// Name written into the column qualifier.
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::Str => "String",
            TypeTag::Int => "Integer",
            TypeTag::Long => "Long",
            TypeTag::Float => "Float",
            TypeTag::Double => "Double",
            TypeTag::Bool => "Boolean",
        }
    }

    /// Resolves a qualifier tag name; `None` when unrecognized.
    pub fn from_name(name: &str) -> Option<Self> {
        TypeTag::ALL.into_iter().find(|tag| tag.name() == name)
    }

    /// Value reported for a property whose column is absent.
    ///
    /// Absence is not an error: a vertex that was never seeded has rank
    /// `Double(0.0)`, an unset string is empty, and so on.
    pub fn default_value(self) -> PropValue {
        match self {
            TypeTag::Str => PropValue::Str(String::new()),
            TypeTag::Int => PropValue::Int(0),
            TypeTag::Long => PropValue::Long(0),
            TypeTag::Float => PropValue::Float(0.0),
            TypeTag::Double => PropValue::Double(0.0),
            TypeTag::Bool => PropValue::Bool(false),
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded, typed property value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropValue {
    /// UTF-8 string.
    Str(String),
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Boolean.
    Bool(bool),
}

impl PropValue {
    /// Tag describing this value's encoding.
    pub fn tag(&self) -> TypeTag {
        match self {
            PropValue::Str(_) => TypeTag::Str,
            PropValue::Int(_) => TypeTag::Int,
            PropValue::Long(_) => TypeTag::Long,
            PropValue::Float(_) => TypeTag::Float,
            PropValue::Double(_) => TypeTag::Double,
            PropValue::Bool(_) => TypeTag::Bool,
        }
    }

    /// Returns the value as `f64` when it is a `Double`.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropValue::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(v) => write!(f, "{v:?}"),
            PropValue::Int(v) => write!(f, "{v}"),
            PropValue::Long(v) => write!(f, "{v}"),
            PropValue::Float(v) => write!(f, "{v}"),
            PropValue::Double(v) => write!(f, "{v}"),
            PropValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// A vertex row with its decoded properties.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Vertex {
    /// Row key.
    #[serde(serialize_with = "serialize_id")]
    pub id: VertexId,
    /// Property name to value.
    pub props: BTreeMap<String, PropValue>,
}

/// An edge row with its decoded properties.
#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    /// Composite key of the edge.
    pub key: EdgeKey,
    /// Property name to value.
    pub props: BTreeMap<String, PropValue>,
}

fn serialize_id<S: serde::Serializer>(id: &VertexId, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_str(&id.to_string())
}
