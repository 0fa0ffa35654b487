//! Variable references and the memos used to align two test cases.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use super::types::ValueType;

/// Identifier of a variable, unique within its owning test case.
///
/// Ids are never reused inside one test case, so a reference stays valid
/// while statements are inserted or removed around its producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub(crate) u32);

impl VarId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// Handle to a value produced by a statement of the same test case.
///
/// Equality and hashing only consider the id: two references from different
/// test cases must be compared through a [`Memo`].
#[derive(Debug, Clone)]
pub struct VariableReference {
    id: VarId,
    ty: ValueType,
}

impl VariableReference {
    pub(crate) fn new(id: VarId, ty: ValueType) -> Self {
        Self { id, ty }
    }

    pub fn id(&self) -> VarId {
        self.id
    }

    pub fn value_type(&self) -> &ValueType {
        &self.ty
    }

    /// Whether this variable can be used where `target` is expected.
    pub fn is_assignable_to(&self, target: &ValueType) -> bool {
        self.ty.is_assignable_to(target)
    }
}

impl PartialEq for VariableReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for VariableReference {}

impl Hash for VariableReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Maps variables of a source test case onto variables of a target test case.
///
/// Filled while cloning statements (old -> new) or while comparing two test
/// cases statement by statement (left -> right).
pub type Memo = HashMap<VarId, VariableReference>;

/// Maps variables to the position of the statement that produced them.
///
/// Used for position-relative structural hashing.
pub type PositionMemo = HashMap<VarId, usize>;

/// Look up the image of `var` in `memo`.
pub(crate) fn remap(var: &VariableReference, memo: &Memo) -> Option<VariableReference> {
    memo.get(&var.id).cloned()
}
