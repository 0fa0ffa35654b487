//! Statements, the instructions a test case is made of.
//!
//! The statement hierarchy is closed: every operation is a `match` over
//! [`Statement`]. A statement never knows its own position; positions are
//! owned by the [`TestCase`] arena.

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::ConstructionError;
use super::callable::{Callable, FieldDescriptor};
use super::test_case::TestCase;
use super::types::ValueType;
use super::variable::{Memo, PositionMemo, VariableReference, remap};

/// Value held by a primitive statement.
#[derive(Debug, Clone)]
pub enum PrimitiveValue {
    /// The absent value. Never mutates.
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// Index into the variants of an enumeration.
    Enum {
        type_name: Arc<str>,
        variants: Arc<[String]>,
        index: usize,
    },
}

impl PrimitiveValue {
    /// Build an enum value from its type name and variant names.
    pub fn enumeration(type_name: &str, variants: &[&str], index: usize) -> Self {
        PrimitiveValue::Enum {
            type_name: Arc::from(type_name),
            variants: variants.iter().map(|v| v.to_string()).collect::<Vec<_>>().into(),
            index,
        }
    }

    /// The type a fresh variable holding this value gets.
    pub fn natural_type(&self) -> ValueType {
        match self {
            PrimitiveValue::None => ValueType::NoneType,
            PrimitiveValue::Bool(_) => ValueType::Bool,
            PrimitiveValue::Int(_) => ValueType::Int,
            PrimitiveValue::Float(_) => ValueType::Float,
            PrimitiveValue::Str(_) => ValueType::Str,
            PrimitiveValue::Bytes(_) => ValueType::Bytes,
            PrimitiveValue::Enum { type_name, .. } => ValueType::Enum(type_name.to_string()),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, PrimitiveValue::None)
    }

    /// Value equality; floats compare bitwise so that `NaN` equals itself.
    pub fn same_as(&self, other: &PrimitiveValue) -> bool {
        match (self, other) {
            (PrimitiveValue::None, PrimitiveValue::None) => true,
            (PrimitiveValue::Bool(a), PrimitiveValue::Bool(b)) => a == b,
            (PrimitiveValue::Int(a), PrimitiveValue::Int(b)) => a == b,
            (PrimitiveValue::Float(a), PrimitiveValue::Float(b)) => a.to_bits() == b.to_bits(),
            (PrimitiveValue::Str(a), PrimitiveValue::Str(b)) => a == b,
            (PrimitiveValue::Bytes(a), PrimitiveValue::Bytes(b)) => a == b,
            (
                PrimitiveValue::Enum {
                    type_name: ta,
                    index: ia,
                    ..
                },
                PrimitiveValue::Enum {
                    type_name: tb,
                    index: ib,
                    ..
                },
            ) => ta == tb && ia == ib,
            _ => false,
        }
    }

    fn hash_into<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            PrimitiveValue::None => {}
            PrimitiveValue::Bool(b) => b.hash(state),
            PrimitiveValue::Int(i) => i.hash(state),
            PrimitiveValue::Float(f) => f.to_bits().hash(state),
            PrimitiveValue::Str(s) => s.hash(state),
            PrimitiveValue::Bytes(b) => b.hash(state),
            PrimitiveValue::Enum {
                type_name, index, ..
            } => {
                type_name.hash(state);
                index.hash(state);
            }
        }
    }
}

/// Statement producing a primitive value.
#[derive(Debug, Clone)]
pub struct PrimitiveStatement {
    pub(crate) ret_val: VariableReference,
    pub(crate) value: PrimitiveValue,
}

impl PrimitiveStatement {
    pub fn value(&self) -> &PrimitiveValue {
        &self.value
    }

    pub fn ret_val(&self) -> &VariableReference {
        &self.ret_val
    }
}

/// Kind of a collection statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionKind {
    List,
    Set,
    Tuple,
    Dict,
}

/// Elements of a collection statement, by kind.
#[derive(Debug, Clone)]
pub enum CollectionElements {
    List(Vec<VariableReference>),
    Set(Vec<VariableReference>),
    /// Fixed arity: only replacement is allowed.
    Tuple(Vec<VariableReference>),
    Dict(Vec<(VariableReference, VariableReference)>),
}

impl CollectionElements {
    pub fn kind(&self) -> CollectionKind {
        match self {
            CollectionElements::List(_) => CollectionKind::List,
            CollectionElements::Set(_) => CollectionKind::Set,
            CollectionElements::Tuple(_) => CollectionKind::Tuple,
            CollectionElements::Dict(_) => CollectionKind::Dict,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            CollectionElements::List(e)
            | CollectionElements::Set(e)
            | CollectionElements::Tuple(e) => e.len(),
            CollectionElements::Dict(e) => e.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All referenced variables, keys before values for dicts.
    pub fn references(&self) -> Vec<VariableReference> {
        match self {
            CollectionElements::List(e)
            | CollectionElements::Set(e)
            | CollectionElements::Tuple(e) => e.clone(),
            CollectionElements::Dict(e) => e
                .iter()
                .flat_map(|(k, v)| [k.clone(), v.clone()])
                .collect(),
        }
    }

    fn map_refs<F>(&self, f: &mut F) -> Option<Self>
    where
        F: FnMut(&VariableReference) -> Option<VariableReference>,
    {
        let map_vec = |elems: &Vec<VariableReference>, f: &mut F| -> Option<Vec<_>> {
            elems.iter().map(|e| f(e)).collect()
        };
        Some(match self {
            CollectionElements::List(e) => CollectionElements::List(map_vec(e, f)?),
            CollectionElements::Set(e) => CollectionElements::Set(map_vec(e, f)?),
            CollectionElements::Tuple(e) => CollectionElements::Tuple(map_vec(e, f)?),
            CollectionElements::Dict(e) => CollectionElements::Dict(
                e.iter()
                    .map(|(k, v)| Some((f(k)?, f(v)?)))
                    .collect::<Option<Vec<_>>>()?,
            ),
        })
    }

    fn replace(&mut self, old: &VariableReference, new: &VariableReference) {
        let swap = |var: &mut VariableReference| {
            if *var == *old {
                *var = new.clone();
            }
        };
        match self {
            CollectionElements::List(e)
            | CollectionElements::Set(e)
            | CollectionElements::Tuple(e) => e.iter_mut().for_each(swap),
            CollectionElements::Dict(e) => {
                for (k, v) in e.iter_mut() {
                    swap(k);
                    swap(v);
                }
            }
        }
    }
}

/// Statement building a list, set, tuple or dict from earlier variables.
#[derive(Debug, Clone)]
pub struct CollectionStatement {
    pub(crate) ret_val: VariableReference,
    pub(crate) elements: CollectionElements,
}

impl CollectionStatement {
    pub fn elements(&self) -> &CollectionElements {
        &self.elements
    }

    pub fn ret_val(&self) -> &VariableReference {
        &self.ret_val
    }

    /// Expected type of the element at `index` (keys for dicts).
    pub(crate) fn element_type(&self, index: usize) -> ValueType {
        match self.ret_val.value_type() {
            ValueType::List(elem) | ValueType::Set(elem) => (**elem).clone(),
            ValueType::Tuple(elems) => elems.get(index).cloned().unwrap_or(ValueType::Any),
            ValueType::Dict(key, _) => (**key).clone(),
            _ => ValueType::Any,
        }
    }

    /// Expected type of dict values.
    pub(crate) fn dict_value_type(&self) -> ValueType {
        match self.ret_val.value_type() {
            ValueType::Dict(_, value) => (**value).clone(),
            _ => ValueType::Any,
        }
    }
}

/// Statement reading a field of an earlier object.
#[derive(Debug, Clone)]
pub struct FieldStatement {
    pub(crate) ret_val: VariableReference,
    pub(crate) source: VariableReference,
    pub(crate) field: Arc<FieldDescriptor>,
}

impl FieldStatement {
    pub fn source(&self) -> &VariableReference {
        &self.source
    }

    pub fn field(&self) -> &FieldDescriptor {
        &self.field
    }

    pub fn ret_val(&self) -> &VariableReference {
        &self.ret_val
    }
}

/// Constructor, method or function call.
#[derive(Debug, Clone)]
pub struct CallStatement {
    pub(crate) ret_val: VariableReference,
    pub(crate) callable: Arc<Callable>,
    /// Set iff the callable is a method.
    pub(crate) callee: Option<VariableReference>,
    /// One slot per formal parameter; `None` leaves an optional parameter unset.
    pub(crate) args: Vec<Option<VariableReference>>,
}

impl CallStatement {
    pub fn callable(&self) -> &Callable {
        &self.callable
    }

    pub fn callee(&self) -> Option<&VariableReference> {
        self.callee.as_ref()
    }

    pub fn args(&self) -> &[Option<VariableReference>] {
        &self.args
    }

    pub fn ret_val(&self) -> &VariableReference {
        &self.ret_val
    }

    /// Number of slots mutation may touch; a callee counts as one.
    pub fn mutable_argument_count(&self) -> usize {
        self.args.len() + usize::from(self.callee.is_some())
    }
}

/// Writes `value` into `target` (or one of its fields). Produces nothing.
#[derive(Debug, Clone)]
pub struct AssignmentStatement {
    pub(crate) target: VariableReference,
    pub(crate) field: Option<String>,
    pub(crate) value: VariableReference,
}

impl AssignmentStatement {
    pub fn target(&self) -> &VariableReference {
        &self.target
    }

    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }

    pub fn value(&self) -> &VariableReference {
        &self.value
    }
}

/// One instruction of a test case.
#[derive(Debug, Clone)]
pub enum Statement {
    Primitive(PrimitiveStatement),
    Collection(CollectionStatement),
    Field(FieldStatement),
    Call(CallStatement),
    Assignment(AssignmentStatement),
}

impl Statement {
    pub fn primitive(ret_val: VariableReference, value: PrimitiveValue) -> Self {
        Statement::Primitive(PrimitiveStatement { ret_val, value })
    }

    pub fn collection(ret_val: VariableReference, elements: CollectionElements) -> Self {
        Statement::Collection(CollectionStatement { ret_val, elements })
    }

    pub fn field(
        ret_val: VariableReference,
        source: VariableReference,
        field: Arc<FieldDescriptor>,
    ) -> Self {
        Statement::Field(FieldStatement {
            ret_val,
            source,
            field,
        })
    }

    /// A call; `callee` must be given exactly for methods.
    pub fn call(
        ret_val: VariableReference,
        callable: Arc<Callable>,
        callee: Option<VariableReference>,
        args: Vec<Option<VariableReference>>,
    ) -> Self {
        Statement::Call(CallStatement {
            ret_val,
            callable,
            callee,
            args,
        })
    }

    pub fn assignment(
        target: VariableReference,
        field: Option<String>,
        value: VariableReference,
    ) -> Self {
        Statement::Assignment(AssignmentStatement {
            target,
            field,
            value,
        })
    }

    /// Short variant name, for logs and errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Primitive(_) => "primitive",
            Statement::Collection(_) => "collection",
            Statement::Field(_) => "field",
            Statement::Call(c) => match c.callable.kind {
                super::CallableKind::Constructor => "constructor",
                super::CallableKind::Method => "method",
                super::CallableKind::Function => "function",
            },
            Statement::Assignment(_) => "assignment",
        }
    }

    /// The produced variable, if any.
    pub fn ret_val(&self) -> Option<&VariableReference> {
        match self {
            Statement::Primitive(s) => Some(&s.ret_val),
            Statement::Collection(s) => Some(&s.ret_val),
            Statement::Field(s) => Some(&s.ret_val),
            Statement::Call(s) => Some(&s.ret_val),
            Statement::Assignment(_) => None,
        }
    }

    fn set_ret_val(&mut self, var: VariableReference) {
        match self {
            Statement::Primitive(s) => s.ret_val = var,
            Statement::Collection(s) => s.ret_val = var,
            Statement::Field(s) => s.ret_val = var,
            Statement::Call(s) => s.ret_val = var,
            Statement::Assignment(_) => {}
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Statement::Call(_))
    }

    /// Variables read by this statement, in a stable order.
    pub fn dependencies(&self) -> Vec<VariableReference> {
        match self {
            Statement::Primitive(_) => Vec::new(),
            Statement::Collection(s) => s.elements.references(),
            Statement::Field(s) => vec![s.source.clone()],
            Statement::Call(s) => s
                .callee
                .iter()
                .chain(s.args.iter().flatten())
                .cloned()
                .collect(),
            Statement::Assignment(s) => vec![s.target.clone(), s.value.clone()],
        }
    }

    /// Every variable read or produced by this statement.
    pub fn variable_references(&self) -> HashSet<VariableReference> {
        let mut refs: HashSet<VariableReference> = self.dependencies().into_iter().collect();
        if let Some(ret) = self.ret_val() {
            refs.insert(ret.clone());
        }
        refs
    }

    /// Whether this statement reads `var`.
    pub fn uses(&self, var: &VariableReference) -> bool {
        self.dependencies().iter().any(|d| d == var)
    }

    /// Replace every occurrence of `old` with `new`.
    pub fn replace(&mut self, old: &VariableReference, new: &VariableReference) {
        let swap = |var: &mut VariableReference| {
            if *var == *old {
                *var = new.clone();
            }
        };
        match self {
            Statement::Primitive(s) => swap(&mut s.ret_val),
            Statement::Collection(s) => {
                swap(&mut s.ret_val);
                s.elements.replace(old, new);
            }
            Statement::Field(s) => {
                swap(&mut s.ret_val);
                swap(&mut s.source);
            }
            Statement::Call(s) => {
                swap(&mut s.ret_val);
                if let Some(callee) = s.callee.as_mut() {
                    swap(callee);
                }
                s.args.iter_mut().flatten().for_each(swap);
            }
            Statement::Assignment(s) => {
                swap(&mut s.target);
                swap(&mut s.value);
            }
        }
    }

    /// Copy of this statement whose dependencies went through `f`.
    ///
    /// Returns `None` as soon as `f` has no image for a dependency. The
    /// produced variable is left untouched.
    pub(crate) fn map_dependencies<F>(&self, mut f: F) -> Option<Statement>
    where
        F: FnMut(&VariableReference) -> Option<VariableReference>,
    {
        Some(match self {
            Statement::Primitive(s) => Statement::Primitive(s.clone()),
            Statement::Collection(s) => Statement::Collection(CollectionStatement {
                ret_val: s.ret_val.clone(),
                elements: s.elements.map_refs(&mut f)?,
            }),
            Statement::Field(s) => Statement::Field(FieldStatement {
                ret_val: s.ret_val.clone(),
                source: f(&s.source)?,
                field: Arc::clone(&s.field),
            }),
            Statement::Call(s) => {
                let callee = match &s.callee {
                    Some(c) => Some(f(c)?),
                    None => None,
                };
                let mut args = Vec::with_capacity(s.args.len());
                for arg in &s.args {
                    args.push(match arg {
                        Some(a) => Some(f(a)?),
                        None => None,
                    });
                }
                Statement::Call(CallStatement {
                    ret_val: s.ret_val.clone(),
                    callable: Arc::clone(&s.callable),
                    callee,
                    args,
                })
            }
            Statement::Assignment(s) => Statement::Assignment(AssignmentStatement {
                target: f(&s.target)?,
                field: s.field.clone(),
                value: f(&s.value)?,
            }),
        })
    }

    /// Deep copy for insertion into `target`.
    ///
    /// Dependencies are remapped through `memo`, which must already hold an
    /// image for each of them. The produced variable gets a fresh id in
    /// `target` and the mapping old -> new is recorded in `memo`.
    pub fn clone_with(
        &self,
        target: &mut TestCase,
        memo: &mut Memo,
    ) -> Result<Statement, ConstructionError> {
        let mut missing = 0;
        let mapped = self.map_dependencies(|var| {
            let image = remap(var, memo);
            if image.is_none() {
                missing = var.id().index();
            }
            image
        });
        let mut copy = mapped.ok_or(ConstructionError::ForwardReference(missing))?;

        if let Some(old) = self.ret_val() {
            let fresh = target.new_variable(old.value_type().clone());
            copy.set_ret_val(fresh.clone());
            memo.insert(old.id(), fresh);
        }
        Ok(copy)
    }

    /// Copy of this statement for re-insertion into its own test case.
    ///
    /// Dependencies are kept, only the produced variable is fresh.
    pub fn duplicate(&self, test_case: &mut TestCase) -> Statement {
        let mut copy = self.clone();
        if let Some(old) = self.ret_val() {
            copy.set_ret_val(test_case.new_variable(old.value_type().clone()));
        }
        copy
    }

    /// Position-relative equality with a statement of another test case.
    ///
    /// `memo` maps variables of `self`'s test case onto `other`'s.
    pub fn structural_eq(&self, other: &Statement, memo: &Memo) -> bool {
        let same = |a: &VariableReference, b: &VariableReference| {
            memo.get(&a.id()).is_some_and(|m| m.id() == b.id())
        };
        let same_opt = |a: &Option<VariableReference>, b: &Option<VariableReference>| match (a, b)
        {
            (Some(a), Some(b)) => same(a, b),
            (None, None) => true,
            _ => false,
        };
        let same_type = |a: Option<&VariableReference>, b: Option<&VariableReference>| {
            a.map(VariableReference::value_type) == b.map(VariableReference::value_type)
        };
        if !same_type(self.ret_val(), other.ret_val()) {
            return false;
        }

        match (self, other) {
            (Statement::Primitive(a), Statement::Primitive(b)) => a.value.same_as(&b.value),
            (Statement::Collection(a), Statement::Collection(b)) => {
                match (&a.elements, &b.elements) {
                    (CollectionElements::List(x), CollectionElements::List(y))
                    | (CollectionElements::Set(x), CollectionElements::Set(y))
                    | (CollectionElements::Tuple(x), CollectionElements::Tuple(y)) => {
                        x.len() == y.len() && x.iter().zip(y).all(|(p, q)| same(p, q))
                    }
                    (CollectionElements::Dict(x), CollectionElements::Dict(y)) => {
                        x.len() == y.len()
                            && x
                                .iter()
                                .zip(y)
                                .all(|((pk, pv), (qk, qv))| same(pk, qk) && same(pv, qv))
                    }
                    _ => false,
                }
            }
            (Statement::Field(a), Statement::Field(b)) => {
                a.field == b.field && same(&a.source, &b.source)
            }
            (Statement::Call(a), Statement::Call(b)) => {
                a.callable == b.callable
                    && same_opt(&a.callee, &b.callee)
                    && a.args.len() == b.args.len()
                    && a.args.iter().zip(&b.args).all(|(x, y)| same_opt(x, y))
            }
            (Statement::Assignment(a), Statement::Assignment(b)) => {
                a.field == b.field && same(&a.target, &b.target) && same(&a.value, &b.value)
            }
            _ => false,
        }
    }

    /// Hash consistent with [`Statement::structural_eq`].
    ///
    /// Referenced variables contribute the position of their producer, taken
    /// from `positions`.
    pub fn structural_hash(&self, positions: &PositionMemo) -> u64 {
        let mut state = DefaultHasher::new();
        let pos = |var: &VariableReference, state: &mut DefaultHasher| {
            positions.get(&var.id()).hash(state);
        };

        std::mem::discriminant(self).hash(&mut state);
        if let Some(ret) = self.ret_val() {
            ret.value_type().hash(&mut state);
        }
        match self {
            Statement::Primitive(s) => s.value.hash_into(&mut state),
            Statement::Collection(s) => {
                s.elements.kind().hash(&mut state);
                for var in s.elements.references() {
                    pos(&var, &mut state);
                }
            }
            Statement::Field(s) => {
                s.field.hash(&mut state);
                pos(&s.source, &mut state);
            }
            Statement::Call(s) => {
                s.callable.hash(&mut state);
                if let Some(callee) = &s.callee {
                    pos(callee, &mut state);
                }
                for arg in &s.args {
                    match arg {
                        Some(a) => pos(a, &mut state),
                        None => usize::MAX.hash(&mut state),
                    }
                }
            }
            Statement::Assignment(s) => {
                s.field.hash(&mut state);
                pos(&s.target, &mut state);
                pos(&s.value, &mut state);
            }
        }
        state.finish()
    }
}
