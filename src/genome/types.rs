//! Value types carried by variable references.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The static type of a value produced by a statement.
///
/// Only structural compatibility is modelled: a value can be passed where
/// another type is expected if [`ValueType::is_assignable_to`] holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "of")]
pub enum ValueType {
    /// Accepts anything.
    Any,
    /// The type of `None`.
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    Bytes,
    /// Enumeration, identified by name.
    Enum(String),
    /// Instance of a subject class, identified by name.
    Class(String),
    List(Box<ValueType>),
    Set(Box<ValueType>),
    Tuple(Vec<ValueType>),
    Dict(Box<ValueType>, Box<ValueType>),
}

impl ValueType {
    /// Shorthand for `List(elem)`.
    pub fn list_of(elem: ValueType) -> Self {
        Self::List(Box::new(elem))
    }

    /// Shorthand for `Set(elem)`.
    pub fn set_of(elem: ValueType) -> Self {
        Self::Set(Box::new(elem))
    }

    /// Shorthand for `Dict(key, value)`.
    pub fn dict_of(key: ValueType, value: ValueType) -> Self {
        Self::Dict(Box::new(key), Box::new(value))
    }

    /// Whether a value of this type may be used where `target` is expected.
    pub fn is_assignable_to(&self, target: &ValueType) -> bool {
        match (self, target) {
            (_, ValueType::Any) => true,
            (a, b) if a == b => true,
            (ValueType::Bool, ValueType::Int)
            | (ValueType::Bool, ValueType::Float)
            | (ValueType::Int, ValueType::Float) => true,
            (ValueType::List(a), ValueType::List(b)) | (ValueType::Set(a), ValueType::Set(b)) => {
                a.is_assignable_to(b)
            }
            (ValueType::Dict(ka, va), ValueType::Dict(kb, vb)) => {
                ka.is_assignable_to(kb) && va.is_assignable_to(vb)
            }
            (ValueType::Tuple(a), ValueType::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_assignable_to(y))
            }
            _ => false,
        }
    }

    /// Whether values of this type are primitives.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            ValueType::Bool
                | ValueType::Int
                | ValueType::Float
                | ValueType::Str
                | ValueType::Bytes
                | ValueType::Enum(_)
        )
    }

    /// Whether values of this type are collections.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            ValueType::List(_) | ValueType::Set(_) | ValueType::Tuple(_) | ValueType::Dict(_, _)
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Any => write!(f, "Any"),
            ValueType::NoneType => write!(f, "None"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Int => write!(f, "int"),
            ValueType::Float => write!(f, "float"),
            ValueType::Str => write!(f, "str"),
            ValueType::Bytes => write!(f, "bytes"),
            ValueType::Enum(name) | ValueType::Class(name) => write!(f, "{}", name),
            ValueType::List(elem) => write!(f, "list[{}]", elem),
            ValueType::Set(elem) => write!(f, "set[{}]", elem),
            ValueType::Tuple(elems) => {
                write!(f, "tuple[")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", elem)?;
                }
                write!(f, "]")
            }
            ValueType::Dict(k, v) => write!(f, "dict[{}, {}]", k, v),
        }
    }
}
