//! Descriptions of the subject's accessible callables and fields.
//!
//! These come from the static analysis of the subject, which is outside this
//! crate; statements only hold shared handles to them.

use serde::{Deserialize, Serialize};

use super::types::ValueType;

/// What kind of call a [`Callable`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallableKind {
    /// Creates an instance of `owner`.
    Constructor,
    /// Invoked on a callee instance of `owner`.
    Method,
    /// Free function.
    Function,
}

/// A formal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub ty: ValueType,
    /// Optional parameters have a default and may be left unset.
    #[serde(default)]
    pub optional: bool,
}

impl Parameter {
    pub fn required(name: &str, ty: ValueType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            optional: false,
        }
    }

    pub fn optional(name: &str, ty: ValueType) -> Self {
        Self {
            name: name.to_string(),
            ty,
            optional: true,
        }
    }
}

/// A constructor, method or function of the subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Callable {
    pub kind: CallableKind,
    pub name: String,
    /// Owning class for constructors and methods.
    pub owner: Option<String>,
    pub parameters: Vec<Parameter>,
    pub return_type: ValueType,
}

impl Callable {
    pub fn constructor(owner: &str, parameters: Vec<Parameter>) -> Self {
        Self {
            kind: CallableKind::Constructor,
            name: owner.to_string(),
            owner: Some(owner.to_string()),
            parameters,
            return_type: ValueType::Class(owner.to_string()),
        }
    }

    pub fn method(owner: &str, name: &str, parameters: Vec<Parameter>, ret: ValueType) -> Self {
        Self {
            kind: CallableKind::Method,
            name: name.to_string(),
            owner: Some(owner.to_string()),
            parameters,
            return_type: ret,
        }
    }

    pub fn function(name: &str, parameters: Vec<Parameter>, ret: ValueType) -> Self {
        Self {
            kind: CallableKind::Function,
            name: name.to_string(),
            owner: None,
            parameters,
            return_type: ret,
        }
    }

    /// Type the callee of a method must have.
    pub fn callee_type(&self) -> Option<ValueType> {
        match (self.kind, &self.owner) {
            (CallableKind::Method, Some(owner)) => Some(ValueType::Class(owner.clone())),
            _ => None,
        }
    }

    /// Fully qualified name, e.g. `Account.deposit`.
    pub fn qualified_name(&self) -> String {
        match (self.kind, &self.owner) {
            (CallableKind::Method, Some(owner)) => format!("{}.{}", owner, self.name),
            _ => self.name.clone(),
        }
    }
}

/// A public field of a subject class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub owner: String,
    pub name: String,
    pub ty: ValueType,
}

impl FieldDescriptor {
    pub fn new(owner: &str, name: &str, ty: ValueType) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            ty,
        }
    }
}
