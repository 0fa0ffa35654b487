//! The seam between the genome and the subject analysis.
//!
//! Knowing which constructors, methods and functions exist is the job of an
//! external analysis; the search only asks a [`TestFactory`] to create or
//! rewire statements.

use super::ConstructionError;
use super::test_case::TestCase;
use crate::schema::TestCaseConfig;
use crate::search::SearchRng;

/// Creates statements compatible with the subject under test.
pub trait TestFactory {
    /// Insert a random subject call, together with the statements producing
    /// its arguments, at `position`. Returns the position of the call.
    fn insert_random_statement(
        &self,
        test_case: &mut TestCase,
        position: usize,
        rng: &mut SearchRng,
    ) -> Result<usize, ConstructionError>;

    /// Replace the call at `position` by another call whose result is
    /// compatible with the current one. Returns whether anything changed.
    fn change_random_call(
        &self,
        test_case: &mut TestCase,
        position: usize,
        rng: &mut SearchRng,
    ) -> bool;

    /// Delete the statement at `position`.
    ///
    /// Later uses of its variable are re-bound to another compatible variable
    /// where one exists; remaining dependents are removed recursively.
    fn delete_statement_gracefully(
        &self,
        test_case: &mut TestCase,
        position: usize,
        rng: &mut SearchRng,
    ) -> bool {
        let Some(statement) = test_case.statement(position) else {
            return false;
        };
        if let Some(var) = statement.ret_val().cloned() {
            for later in position + 1..test_case.size() {
                if !test_case.statements()[later].uses(&var) {
                    continue;
                }
                let alternatives: Vec<_> = test_case
                    .objects_before(var.value_type(), later)
                    .into_iter()
                    .filter(|v| *v != var)
                    .collect();
                if let Some(alternative) = rng.choose(&alternatives).cloned() {
                    test_case.replace_in(later, &var, &alternative);
                }
            }
        }
        !test_case.remove_statement(position).is_empty()
    }
}

/// Build a random test case of length `1..=chromosome_length`.
///
/// Statements are appended through `factory`; a test case without any
/// subject call is discarded and generation starts over, up to
/// `max_generation_attempts` times.
pub fn random_test_case<F>(
    factory: &F,
    config: &TestCaseConfig,
    rng: &mut SearchRng,
) -> Result<TestCase, ConstructionError>
where
    F: TestFactory + ?Sized,
{
    for _ in 0..config.max_generation_attempts {
        let target = 1 + rng.next_index(config.chromosome_length);
        let mut test_case = TestCase::new();
        let mut failures = 0;
        while test_case.size() < target && failures < config.max_generation_attempts {
            let end = test_case.size();
            if let Err(err) = factory.insert_random_statement(&mut test_case, end, rng) {
                log::debug!("Random statement insertion failed: {}", err);
                failures += 1;
            }
        }
        if test_case.contains_call() {
            return Ok(test_case);
        }
    }
    Err(ConstructionError::NoCallableAvailable)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::genome::{Callable, Parameter, PrimitiveValue, Statement, ValueType};

    /// Factory over a single `inc(x: int) -> int` function.
    struct IncFactory {
        inc: Arc<Callable>,
    }

    impl IncFactory {
        fn new() -> Self {
            Self {
                inc: Arc::new(Callable::function(
                    "inc",
                    vec![Parameter::required("x", ValueType::Int)],
                    ValueType::Int,
                )),
            }
        }
    }

    impl TestFactory for IncFactory {
        fn insert_random_statement(
            &self,
            test_case: &mut TestCase,
            position: usize,
            rng: &mut SearchRng,
        ) -> Result<usize, ConstructionError> {
            let existing = test_case.objects_before(&ValueType::Int, position);
            let (arg, call_pos) = match rng.choose(&existing) {
                Some(var) if rng.next_bool(0.5) => (var.clone(), position),
                _ => {
                    let value = PrimitiveValue::Int(rng.next_int(-10, 10));
                    let var = test_case.add_primitive(value, ValueType::Int, position)?;
                    (var, position + 1)
                }
            };
            let ret = test_case.new_variable(ValueType::Int);
            test_case.add_statement(
                Statement::call(ret, Arc::clone(&self.inc), None, vec![Some(arg)]),
                call_pos,
            )
        }

        fn change_random_call(
            &self,
            _test_case: &mut TestCase,
            _position: usize,
            _rng: &mut SearchRng,
        ) -> bool {
            false
        }
    }

    /// Factory that can never produce anything.
    struct EmptyFactory;

    impl TestFactory for EmptyFactory {
        fn insert_random_statement(
            &self,
            _test_case: &mut TestCase,
            _position: usize,
            _rng: &mut SearchRng,
        ) -> Result<usize, ConstructionError> {
            Err(ConstructionError::NoCallableAvailable)
        }

        fn change_random_call(&self, _: &mut TestCase, _: usize, _: &mut SearchRng) -> bool {
            false
        }
    }

    #[test]
    fn test_random_test_case_has_call() {
        let factory = IncFactory::new();
        let config = TestCaseConfig {
            chromosome_length: 10,
            ..Default::default()
        };
        let mut rng = SearchRng::new(1);
        for _ in 0..20 {
            let tc = random_test_case(&factory, &config, &mut rng).unwrap();
            assert!(tc.contains_call());
            assert!(!tc.is_empty());
            assert!(tc.check_references().is_ok());
        }
    }

    #[test]
    fn test_random_test_case_gives_up() {
        let config = TestCaseConfig {
            max_generation_attempts: 3,
            ..Default::default()
        };
        let mut rng = SearchRng::new(1);
        assert_eq!(
            random_test_case(&EmptyFactory, &config, &mut rng),
            Err(ConstructionError::NoCallableAvailable)
        );
    }

    #[test]
    fn test_graceful_delete_rebinds() {
        let factory = IncFactory::new();
        let mut tc = TestCase::new();
        let a = tc
            .add_primitive(PrimitiveValue::Int(1), ValueType::Int, 0)
            .unwrap();
        let b = tc
            .add_primitive(PrimitiveValue::Int(2), ValueType::Int, 1)
            .unwrap();
        let out = tc.new_variable(ValueType::Int);
        tc.append_statement(Statement::call(
            out,
            Arc::clone(&factory.inc),
            None,
            vec![Some(b)],
        ))
        .unwrap();

        let mut rng = SearchRng::new(2);
        assert!(factory.delete_statement_gracefully(&mut tc, 1, &mut rng));
        // The call survives, now reading `a`.
        assert_eq!(tc.size(), 2);
        match tc.statement(1) {
            Some(Statement::Call(call)) => assert_eq!(call.args()[0].as_ref(), Some(&a)),
            other => panic!("unexpected statement {:?}", other),
        }
        assert!(tc.check_references().is_ok());
    }

    #[test]
    fn test_graceful_delete_cascades() {
        let factory = IncFactory::new();
        let mut tc = TestCase::new();
        let a = tc
            .add_primitive(PrimitiveValue::Int(1), ValueType::Int, 0)
            .unwrap();
        let out = tc.new_variable(ValueType::Int);
        tc.append_statement(Statement::call(
            out,
            Arc::clone(&factory.inc),
            None,
            vec![Some(a)],
        ))
        .unwrap();

        let mut rng = SearchRng::new(3);
        assert!(factory.delete_statement_gracefully(&mut tc, 0, &mut rng));
        assert!(tc.is_empty());
        assert!(!factory.delete_statement_gracefully(&mut tc, 0, &mut rng));
    }
}
