//! The test case arena.

use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::ConstructionError;
use super::statement::{PrimitiveValue, Statement};
use super::types::ValueType;
use super::variable::{Memo, PositionMemo, VarId, VariableReference};

/// An ordered sequence of statements, exclusively owning them.
///
/// Every statement only reads variables produced at a strictly earlier
/// position. Insertion validates this; removal cascades to dependents so no
/// reference is ever left dangling.
#[derive(Debug, Clone, Default)]
pub struct TestCase {
    statements: Vec<Statement>,
    next_id: u32,
}

impl TestCase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of statements.
    pub fn size(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub fn statement(&self, position: usize) -> Option<&Statement> {
        self.statements.get(position)
    }

    pub(crate) fn statement_mut(&mut self, position: usize) -> Option<&mut Statement> {
        self.statements.get_mut(position)
    }

    /// Allocate a fresh variable of type `ty` owned by this test case.
    ///
    /// The variable is not defined until a statement producing it is added.
    pub fn new_variable(&mut self, ty: ValueType) -> VariableReference {
        let id = VarId(self.next_id);
        self.next_id += 1;
        VariableReference::new(id, ty)
    }

    /// Position of the statement producing `var`.
    pub fn position_of(&self, var: &VariableReference) -> Option<usize> {
        self.statements
            .iter()
            .position(|s| s.ret_val().is_some_and(|r| r == var))
    }

    /// Insert `statement` at `position`, shifting later statements.
    ///
    /// Fails if the position is out of bounds or a dependency of the
    /// statement is not produced before `position`.
    pub fn add_statement(
        &mut self,
        statement: Statement,
        position: usize,
    ) -> Result<usize, ConstructionError> {
        if position > self.statements.len() {
            return Err(ConstructionError::InvalidPosition {
                position,
                size: self.statements.len(),
            });
        }
        for dep in statement.dependencies() {
            match self.position_of(&dep) {
                Some(p) if p < position => {}
                _ => return Err(ConstructionError::ForwardReference(dep.id().index())),
            }
        }
        self.statements.insert(position, statement);
        Ok(position)
    }

    /// Append `statement` at the end.
    pub fn append_statement(&mut self, statement: Statement) -> Result<usize, ConstructionError> {
        self.add_statement(statement, self.statements.len())
    }

    /// Insert a primitive statement holding `value` and return its variable.
    pub fn add_primitive(
        &mut self,
        value: PrimitiveValue,
        ty: ValueType,
        position: usize,
    ) -> Result<VariableReference, ConstructionError> {
        let var = self.new_variable(ty);
        self.add_statement(Statement::primitive(var.clone(), value), position)?;
        Ok(var)
    }

    /// Remove the statement at `position` and, recursively, every statement
    /// that depends on a removed one. Returns the removed statements in
    /// removal order.
    pub fn remove_statement(&mut self, position: usize) -> Vec<Statement> {
        if position >= self.statements.len() {
            return Vec::new();
        }
        let first = self.statements.remove(position);
        let mut dead: Vec<VariableReference> = first.ret_val().cloned().into_iter().collect();
        let mut removed = vec![first];

        let mut i = position;
        while i < self.statements.len() {
            if dead.iter().any(|d| self.statements[i].uses(d)) {
                let stmt = self.statements.remove(i);
                if let Some(ret) = stmt.ret_val() {
                    dead.push(ret.clone());
                }
                removed.push(stmt);
            } else {
                i += 1;
            }
        }
        removed
    }

    /// Drop every statement after `position`. Returns how many were dropped.
    pub fn chop(&mut self, position: usize) -> usize {
        let keep = position.saturating_add(1);
        let dropped = self.statements.len().saturating_sub(keep);
        self.statements.truncate(keep);
        dropped
    }

    /// Replace `old` by `new` in the statement at `position`.
    pub(crate) fn replace_in(
        &mut self,
        position: usize,
        old: &VariableReference,
        new: &VariableReference,
    ) {
        if let Some(stmt) = self.statements.get_mut(position) {
            stmt.replace(old, new);
        }
    }

    /// Variables produced before `position` that are assignable to `ty`.
    pub fn objects_before(&self, ty: &ValueType, position: usize) -> Vec<VariableReference> {
        let end = position.min(self.statements.len());
        self.statements[..end]
            .iter()
            .filter_map(Statement::ret_val)
            .filter(|v| v.is_assignable_to(ty))
            .cloned()
            .collect()
    }

    /// Whether at least one statement calls into the subject.
    pub fn contains_call(&self) -> bool {
        self.statements.iter().any(Statement::is_call)
    }

    /// Total number of referenced elements, counting collection elements
    /// and call arguments on top of the statements themselves.
    pub fn length(&self) -> usize {
        self.statements
            .iter()
            .map(|s| 1 + s.dependencies().len())
            .sum()
    }

    /// Check the ordering invariant over the whole arena.
    pub fn check_references(&self) -> Result<(), ConstructionError> {
        let mut defined: HashSet<VarId> = HashSet::new();
        for stmt in &self.statements {
            for dep in stmt.dependencies() {
                if !defined.contains(&dep.id()) {
                    return Err(ConstructionError::ForwardReference(dep.id().index()));
                }
            }
            if let Some(ret) = stmt.ret_val()
                && !defined.insert(ret.id())
            {
                return Err(ConstructionError::ForwardReference(ret.id().index()));
            }
        }
        Ok(())
    }

    /// Position-aligned comparison with another test case.
    pub fn structural_eq(&self, other: &TestCase) -> bool {
        if self.statements.len() != other.statements.len() {
            return false;
        }
        let mut memo = Memo::new();
        for (a, b) in self.statements.iter().zip(&other.statements) {
            if !a.structural_eq(b, &memo) {
                return false;
            }
            if let (Some(ra), Some(rb)) = (a.ret_val(), b.ret_val()) {
                memo.insert(ra.id(), rb.clone());
            }
        }
        true
    }

    /// Hash consistent with [`TestCase::structural_eq`].
    pub fn structural_hash(&self) -> u64 {
        let mut positions = PositionMemo::new();
        let mut state = DefaultHasher::new();
        self.statements.len().hash(&mut state);
        for (position, stmt) in self.statements.iter().enumerate() {
            stmt.structural_hash(&positions).hash(&mut state);
            if let Some(ret) = stmt.ret_val() {
                positions.insert(ret.id(), position);
            }
        }
        state.finish()
    }
}

impl PartialEq for TestCase {
    fn eq(&self, other: &Self) -> bool {
        self.structural_eq(other)
    }
}

impl Eq for TestCase {}

impl Hash for TestCase {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.structural_hash());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::genome::{Callable, CollectionElements, Parameter};

    fn add_callable() -> Arc<Callable> {
        Arc::new(Callable::function(
            "add",
            vec![
                Parameter::required("a", ValueType::Int),
                Parameter::required("b", ValueType::Int),
            ],
            ValueType::Int,
        ))
    }

    /// `a = 1; b = 2; c = add(a, b); l = [c, a]`
    fn sample() -> TestCase {
        let mut tc = TestCase::new();
        let a = tc
            .add_primitive(PrimitiveValue::Int(1), ValueType::Int, 0)
            .unwrap();
        let b = tc
            .add_primitive(PrimitiveValue::Int(2), ValueType::Int, 1)
            .unwrap();
        let c = tc.new_variable(ValueType::Int);
        tc.append_statement(Statement::call(
            c.clone(),
            add_callable(),
            None,
            vec![Some(a.clone()), Some(b)],
        ))
        .unwrap();
        let l = tc.new_variable(ValueType::list_of(ValueType::Int));
        tc.append_statement(Statement::collection(l, CollectionElements::List(vec![c, a])))
            .unwrap();
        tc
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut tc = TestCase::new();
        let a = tc
            .add_primitive(PrimitiveValue::Int(1), ValueType::Int, 0)
            .unwrap();
        let c = tc.new_variable(ValueType::Int);
        let call = Statement::call(c, add_callable(), None, vec![Some(a.clone()), Some(a)]);

        assert!(matches!(
            tc.add_statement(call.clone(), 0),
            Err(ConstructionError::ForwardReference(_))
        ));
        assert!(matches!(
            tc.add_statement(call.clone(), 5),
            Err(ConstructionError::InvalidPosition { .. })
        ));
        assert_eq!(tc.add_statement(call, 1), Ok(1));
        assert!(tc.check_references().is_ok());
    }

    #[test]
    fn test_remove_cascades() {
        let mut tc = sample();
        let removed = tc.remove_statement(1);
        // b, then the call reading b, then the list reading the call
        assert_eq!(removed.len(), 3);
        assert_eq!(tc.size(), 1);
        assert!(tc.check_references().is_ok());
    }

    #[test]
    fn test_remove_out_of_bounds() {
        let mut tc = sample();
        assert!(tc.remove_statement(10).is_empty());
        assert_eq!(tc.size(), 4);
    }

    #[test]
    fn test_chop() {
        let mut tc = sample();
        assert_eq!(tc.chop(1), 2);
        assert_eq!(tc.size(), 2);
        assert_eq!(tc.chop(5), 0);
        assert!(tc.check_references().is_ok());
    }

    #[test]
    fn test_objects_before() {
        let tc = sample();
        assert_eq!(tc.objects_before(&ValueType::Int, 2).len(), 2);
        assert_eq!(tc.objects_before(&ValueType::Int, 4).len(), 3);
        assert_eq!(tc.objects_before(&ValueType::Float, 4).len(), 3);
        assert_eq!(tc.objects_before(&ValueType::Str, 4).len(), 0);
    }

    #[test]
    fn test_length_counts_references() {
        let tc = sample();
        assert_eq!(tc.size(), 4);
        assert_eq!(tc.length(), 1 + 1 + 3 + 3);
    }

    #[test]
    fn test_independent_builds_equal() {
        let a = sample();
        let b = sample();
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());

        let mut c = sample();
        if let Some(Statement::Primitive(p)) = c.statement_mut(0) {
            p.value = PrimitiveValue::Int(9);
        }
        assert_ne!(a, c);
    }

    #[test]
    fn test_clone_with_memo_is_equal() {
        let original = sample();
        let mut copy = TestCase::new();
        // Offset ids so the copy is not trivially identical.
        copy.new_variable(ValueType::Any);
        let mut memo = Memo::new();
        for stmt in original.statements() {
            let cloned = stmt.clone_with(&mut copy, &mut memo).unwrap();
            copy.append_statement(cloned).unwrap();
        }
        assert_eq!(original, copy);
        assert!(copy.check_references().is_ok());
    }

    #[test]
    fn test_clone_with_missing_dependency() {
        let original = sample();
        let mut copy = TestCase::new();
        let mut memo = Memo::new();
        let result = original.statements()[2].clone_with(&mut copy, &mut memo);
        assert!(matches!(result, Err(ConstructionError::ForwardReference(_))));
    }
}
