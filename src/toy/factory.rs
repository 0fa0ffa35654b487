//! Statement construction over the toy subject.

use std::sync::Arc;

use crate::genome::{
    Callable, CollectionElements, ConstructionError, FieldDescriptor, PrimitiveValue, Statement,
    TestCase, TestFactory, ValueType, VariableReference,
};
use crate::schema::StatementConfig;
use crate::search::SearchRng;

use super::ToySubject;

/// Bound on nested constructor calls while creating a value.
const MAX_RECURSION: usize = 5;

/// Something a random statement can be generated from.
enum Accessible<'a> {
    Call(&'a Arc<Callable>),
    Field(&'a Arc<FieldDescriptor>),
}

/// [`TestFactory`] building calls, field reads and argument values for the
/// toy subject.
#[derive(Debug, Clone)]
pub struct ToyFactory {
    subject: Arc<ToySubject>,
    config: StatementConfig,
}

impl ToyFactory {
    pub fn new(subject: Arc<ToySubject>, config: StatementConfig) -> Self {
        Self { subject, config }
    }

    // ========================================================================
    // Calls and fields
    // ========================================================================

    /// Insert a call to `callable` with freshly obtained arguments before
    /// `position`. With `replacing`, the statement at `position` is
    /// overwritten and keeps that variable instead.
    ///
    /// Returns the call's variable and its final position.
    fn add_call(
        &self,
        test_case: &mut TestCase,
        callable: &Arc<Callable>,
        replacing: Option<VariableReference>,
        position: usize,
        rng: &mut SearchRng,
        depth: usize,
    ) -> Result<(VariableReference, usize), ConstructionError> {
        let mut position = position;

        let callee = match callable.callee_type() {
            Some(ty) => {
                let (var, next) = self.obtain_value(test_case, &ty, position, rng, depth, false)?;
                position = next;
                Some(var)
            }
            None => None,
        };

        let mut args = Vec::with_capacity(callable.parameters.len());
        for parameter in &callable.parameters {
            if parameter.optional && rng.next_bool(self.config.skip_optional_parameter_probability)
            {
                args.push(None);
                continue;
            }
            let (var, next) =
                self.obtain_value(test_case, &parameter.ty, position, rng, depth, true)?;
            position = next;
            args.push(Some(var));
        }

        match replacing {
            Some(ret) => {
                let size = test_case.size();
                let slot = test_case
                    .statement_mut(position)
                    .ok_or(ConstructionError::InvalidPosition { position, size })?;
                *slot = Statement::call(ret.clone(), Arc::clone(callable), callee, args);
                Ok((ret, position))
            }
            None => {
                let ret = test_case.new_variable(callable.return_type.clone());
                let call = Statement::call(ret.clone(), Arc::clone(callable), callee, args);
                let position = test_case.add_statement(call, position)?;
                Ok((ret, position))
            }
        }
    }

    fn add_field(
        &self,
        test_case: &mut TestCase,
        field: &Arc<FieldDescriptor>,
        position: usize,
        rng: &mut SearchRng,
    ) -> Result<usize, ConstructionError> {
        let owner = ValueType::Class(field.owner.clone());
        let (source, position) = self.obtain_value(test_case, &owner, position, rng, 0, false)?;
        let ret = test_case.new_variable(field.ty.clone());
        test_case.add_statement(Statement::field(ret, source, Arc::clone(field)), position)
    }

    // ========================================================================
    // Values
    // ========================================================================

    /// A variable of type `ty` usable at `position`: an existing object
    /// when one is available and reuse is drawn, `None` for class types
    /// when allowed and drawn, otherwise a freshly created value.
    ///
    /// Returns the variable and the position after any inserted statements.
    fn obtain_value(
        &self,
        test_case: &mut TestCase,
        ty: &ValueType,
        position: usize,
        rng: &mut SearchRng,
        depth: usize,
        allow_none: bool,
    ) -> Result<(VariableReference, usize), ConstructionError> {
        if !ty.is_primitive() {
            let candidates: Vec<VariableReference> = test_case
                .objects_before(ty, position)
                .into_iter()
                .filter(|var| allow_none || !self.is_none_value(test_case, var))
                .collect();
            if !candidates.is_empty()
                && rng.next_bool(self.config.object_reuse_probability)
                && let Some(var) = rng.choose(&candidates)
            {
                return Ok((var.clone(), position));
            }
        }

        if allow_none
            && matches!(ty, ValueType::Class(_))
            && rng.next_bool(self.config.none_probability)
        {
            let var = test_case.add_primitive(PrimitiveValue::None, ty.clone(), position)?;
            return Ok((var, position + 1));
        }

        self.create_value(test_case, ty, position, rng, depth)
    }

    fn create_value(
        &self,
        test_case: &mut TestCase,
        ty: &ValueType,
        position: usize,
        rng: &mut SearchRng,
        depth: usize,
    ) -> Result<(VariableReference, usize), ConstructionError> {
        if depth > MAX_RECURSION {
            return Err(ConstructionError::NoCompatibleValue(ty.clone()));
        }

        match ty {
            ValueType::Class(name) => {
                let constructor = self
                    .subject
                    .constructor_of(name)
                    .ok_or_else(|| ConstructionError::NoCompatibleValue(ty.clone()))?;
                let (var, call_position) =
                    self.add_call(test_case, &constructor, None, position, rng, depth + 1)?;
                Ok((var, call_position + 1))
            }
            ValueType::List(elem) | ValueType::Set(elem) => {
                let count = rng.next_index(self.config.collection_size + 1);
                let types = vec![(**elem).clone(); count];
                let (elements, position) =
                    self.obtain_elements(test_case, &types, position, rng, depth)?;
                let elements = if matches!(ty, ValueType::List(_)) {
                    CollectionElements::List(elements)
                } else {
                    CollectionElements::Set(elements)
                };
                self.add_collection(test_case, ty, elements, position)
            }
            ValueType::Tuple(types) => {
                let (elements, position) =
                    self.obtain_elements(test_case, types, position, rng, depth)?;
                self.add_collection(test_case, ty, CollectionElements::Tuple(elements), position)
            }
            ValueType::Dict(key, value) => {
                let count = rng.next_index(self.config.collection_size + 1);
                let mut position = position;
                let mut pairs = Vec::with_capacity(count);
                for _ in 0..count {
                    let (k, next) =
                        self.obtain_value(test_case, key, position, rng, depth + 1, true)?;
                    let (v, next) =
                        self.obtain_value(test_case, value, next, rng, depth + 1, true)?;
                    position = next;
                    pairs.push((k, v));
                }
                self.add_collection(test_case, ty, CollectionElements::Dict(pairs), position)
            }
            _ => {
                let value = self.random_primitive(ty, rng)?;
                let var = test_case.add_primitive(value, ty.clone(), position)?;
                Ok((var, position + 1))
            }
        }
    }

    fn obtain_elements(
        &self,
        test_case: &mut TestCase,
        types: &[ValueType],
        position: usize,
        rng: &mut SearchRng,
        depth: usize,
    ) -> Result<(Vec<VariableReference>, usize), ConstructionError> {
        let mut position = position;
        let mut elements = Vec::with_capacity(types.len());
        for ty in types {
            let (var, next) = self.obtain_value(test_case, ty, position, rng, depth + 1, true)?;
            position = next;
            elements.push(var);
        }
        Ok((elements, position))
    }

    fn add_collection(
        &self,
        test_case: &mut TestCase,
        ty: &ValueType,
        elements: CollectionElements,
        position: usize,
    ) -> Result<(VariableReference, usize), ConstructionError> {
        let var = test_case.new_variable(ty.clone());
        test_case.add_statement(Statement::collection(var.clone(), elements), position)?;
        Ok((var, position + 1))
    }

    fn random_primitive(
        &self,
        ty: &ValueType,
        rng: &mut SearchRng,
    ) -> Result<PrimitiveValue, ConstructionError> {
        let max_int = self.config.max_int;
        let value = match ty {
            ValueType::NoneType => PrimitiveValue::None,
            ValueType::Bool => PrimitiveValue::Bool(rng.next_bool(0.5)),
            ValueType::Int | ValueType::Any => PrimitiveValue::Int(rng.next_int(-max_int, max_int)),
            ValueType::Float => {
                let raw = (rng.next_f64() * 2.0 - 1.0) * max_int as f64;
                PrimitiveValue::Float((raw * 100.0).round() / 100.0)
            }
            ValueType::Str => PrimitiveValue::Str(rng.next_string(self.config.string_length)),
            ValueType::Bytes => PrimitiveValue::Bytes(rng.next_bytes(self.config.bytes_length)),
            ValueType::Enum(name) => {
                let variants = self
                    .subject
                    .enum_variants(name)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| ConstructionError::NoCompatibleValue(ty.clone()))?;
                let names: Vec<&str> = variants.iter().map(String::as_str).collect();
                PrimitiveValue::enumeration(name, &names, rng.next_index(names.len()))
            }
            _ => return Err(ConstructionError::NoCompatibleValue(ty.clone())),
        };
        Ok(value)
    }

    fn is_none_value(&self, test_case: &TestCase, var: &VariableReference) -> bool {
        test_case
            .position_of(var)
            .and_then(|p| test_case.statement(p))
            .is_some_and(|s| matches!(s, Statement::Primitive(p) if p.value().is_none()))
    }
}

impl TestFactory for ToyFactory {
    fn insert_random_statement(
        &self,
        test_case: &mut TestCase,
        position: usize,
        rng: &mut SearchRng,
    ) -> Result<usize, ConstructionError> {
        let accessible: Vec<Accessible<'_>> = self
            .subject
            .callables()
            .iter()
            .map(Accessible::Call)
            .chain(self.subject.fields().iter().map(Accessible::Field))
            .collect();
        let choice = rng
            .choose(&accessible)
            .ok_or(ConstructionError::NoCallableAvailable)?;

        let backup = test_case.clone();
        let result = match choice {
            Accessible::Call(callable) => self
                .add_call(test_case, callable, None, position, rng, 0)
                .map(|(_, position)| position),
            Accessible::Field(field) => self.add_field(test_case, field, position, rng),
        };
        if result.is_err() {
            *test_case = backup;
        }
        result
    }

    fn change_random_call(
        &self,
        test_case: &mut TestCase,
        position: usize,
        rng: &mut SearchRng,
    ) -> bool {
        let Some(Statement::Call(call)) = test_case.statement(position) else {
            return false;
        };
        let ret = call.ret_val().clone();
        let current = call.callable().clone();
        let candidates: Vec<&Arc<Callable>> = self
            .subject
            .callables()
            .iter()
            .filter(|c| ***c != current && c.return_type.is_assignable_to(ret.value_type()))
            .collect();
        let Some(replacement) = rng.choose(&candidates).copied() else {
            return false;
        };

        let backup = test_case.clone();
        match self.add_call(test_case, replacement, Some(ret), position, rng, 0) {
            Ok(_) => true,
            Err(err) => {
                log::debug!(
                    "Replacing {} by {} failed: {}",
                    current.qualified_name(),
                    replacement.qualified_name(),
                    err
                );
                *test_case = backup;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chromosome::TestCaseExecutor;
    use crate::genome::random_test_case;
    use crate::schema::TestCaseConfig;
    use crate::toy::ToyExecutor;

    fn factory() -> (Arc<ToySubject>, ToyFactory) {
        let subject = Arc::new(ToySubject::new());
        let factory = ToyFactory::new(subject.clone(), StatementConfig::default());
        (subject, factory)
    }

    #[test]
    fn test_insert_keeps_references_valid() {
        let (_, factory) = factory();
        let mut rng = SearchRng::new(5);
        let mut tc = TestCase::new();
        for _ in 0..30 {
            let position = rng.next_index(tc.size() + 1);
            if let Ok(call) = factory.insert_random_statement(&mut tc, position, &mut rng) {
                assert!(call < tc.size());
            }
            assert!(tc.check_references().is_ok());
        }
        assert!(tc.contains_call());
    }

    #[test]
    fn test_method_call_gets_callee() {
        let (subject, factory) = factory();
        let withdraw = subject.callable("Account.withdraw").unwrap();
        let mut rng = SearchRng::new(9);
        let mut tc = TestCase::new();
        let (_, position) = factory
            .add_call(&mut tc, &withdraw, None, 0, &mut rng, 0)
            .unwrap();
        assert_eq!(position, tc.size() - 1);
        match tc.statement(position) {
            Some(Statement::Call(call)) => {
                let callee = call.callee().unwrap();
                let source = tc.position_of(callee).unwrap();
                assert!(matches!(
                    tc.statement(source),
                    Some(Statement::Call(c)) if c.callable().name == "Account"
                ));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_enum_values_use_subject_variants() {
        let (_, factory) = factory();
        let mut rng = SearchRng::new(3);
        for _ in 0..20 {
            let value = factory
                .random_primitive(&ValueType::Enum("Color".to_string()), &mut rng)
                .unwrap();
            match value {
                PrimitiveValue::Enum {
                    variants, index, ..
                } => {
                    assert_eq!(variants.len(), 3);
                    assert!(index < 3);
                }
                other => panic!("unexpected value {:?}", other),
            }
        }
        assert!(
            factory
                .random_primitive(&ValueType::Enum("Shape".to_string()), &mut rng)
                .is_err()
        );
    }

    #[test]
    fn test_unknown_class_rolls_back() {
        let (_, factory) = factory();
        let mut rng = SearchRng::new(4);
        let mut tc = TestCase::new();
        let result = factory.create_value(
            &mut tc,
            &ValueType::Class("Ledger".to_string()),
            0,
            &mut rng,
            0,
        );
        assert_eq!(
            result,
            Err(ConstructionError::NoCompatibleValue(ValueType::Class(
                "Ledger".to_string()
            )))
        );
    }

    #[test]
    fn test_change_call_keeps_return_variable() {
        let (subject, factory) = factory();
        let mut rng = SearchRng::new(11);
        let mut tc = TestCase::new();
        let withdraw = subject.callable("Account.withdraw").unwrap();
        let (ret, _) = factory
            .add_call(&mut tc, &withdraw, None, 0, &mut rng, 0)
            .unwrap();

        let mut changed = false;
        for _ in 0..10 {
            let Some(position) = tc.position_of(&ret) else {
                break;
            };
            changed |= factory.change_random_call(&mut tc, position, &mut rng);
            assert!(tc.check_references().is_ok());
        }
        assert!(changed);
        let position = tc.position_of(&ret).unwrap();
        match tc.statement(position) {
            Some(Statement::Call(call)) => {
                assert_eq!(call.ret_val(), &ret);
                assert!(call.callable().return_type.is_assignable_to(&ValueType::Bool));
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_change_non_call_is_noop() {
        let (_, factory) = factory();
        let mut rng = SearchRng::new(1);
        let mut tc = TestCase::new();
        tc.add_primitive(PrimitiveValue::Int(1), ValueType::Int, 0)
            .unwrap();
        assert!(!factory.change_random_call(&mut tc, 0, &mut rng));
        assert!(!factory.change_random_call(&mut tc, 5, &mut rng));
    }

    #[test]
    fn test_random_tests_execute() {
        let (subject, factory) = factory();
        let executor = ToyExecutor::new(subject);
        let config = TestCaseConfig::default();
        let mut rng = SearchRng::new(17);
        for _ in 0..25 {
            let tc = random_test_case(&factory, &config, &mut rng).unwrap();
            assert!(tc.check_references().is_ok());
            let result = executor.execute(&tc);
            assert!(!result.trace.executed_functions.is_empty() || result.has_failure());
            assert!(result.first_failure_position().is_none_or(|p| p < tc.size()));
        }
    }
}
