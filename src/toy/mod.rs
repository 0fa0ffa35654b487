//! A small built-in subject for demos, benchmarks and tests.
//!
//! The subject is described the way an external analysis would report it:
//! callables, public fields and enumerations. [`ToyExecutor`] interprets
//! test cases against it and records branch distances, lines and entered
//! functions; [`ToyFactory`] builds statements from its callables.
//!
//! | Callable | Branches |
//! |---|---|
//! | `triangle(a: int, b: int, c: int) -> str` | invalid, degenerate, equilateral, isosceles |
//! | `Account(owner: str)` | empty owner raises |
//! | `Account.deposit(amount: int)` | non-positive amount raises |
//! | `Account.withdraw(amount: int) -> bool` | overdrawn |
//! | `Account.transfer(other: Account, amount: int) -> bool` | overdrawn |
//! | `contains_magic(items: list[int]) -> bool` | empty, element equals 42 |
//! | `greet(name: str, loud: bool = False) -> str` | empty name, loud |
//! | `paint(color: Color) -> str` | red, green |
//! | `lookup(table: dict[str, int], key: str) -> int` | key present |
//! | `span(bounds: tuple[int, int]) -> int` | reversed bounds |
//! | `unique_count(items: set[str]) -> int` | none |

mod factory;
mod interpreter;

use std::sync::Arc;

pub use factory::ToyFactory;
pub use interpreter::ToyExecutor;

use crate::chromosome::{
    BranchGoal, FitnessRef, FunctionGoal, LineGoal, LineId, PredicateId, TestCaseChromosome,
};
use crate::genome::{Callable, FieldDescriptor, Parameter, ValueType};

use interpreter::{
    ACCOUNT_EMPTY_OWNER, DEPOSIT_NOT_POSITIVE, GREET_ANONYMOUS, GREET_LOUD, LINE_COUNT,
    LOOKUP_PRESENT, MAGIC_EMPTY, MAGIC_FOUND, PAINT_GREEN, PAINT_RED, PREDICATE_COUNT,
    SPAN_REVERSED, TRANSFER_OVERDRAWN, TRIANGLE_DEGENERATE, TRIANGLE_EQUILATERAL,
    TRIANGLE_INVALID, TRIANGLE_ISOSCELES, WITHDRAW_OVERDRAWN,
};

/// Enclosing function of every predicate.
const PREDICATE_FUNCTIONS: [(PredicateId, &str); PREDICATE_COUNT] = [
    (TRIANGLE_INVALID, "triangle"),
    (TRIANGLE_DEGENERATE, "triangle"),
    (TRIANGLE_EQUILATERAL, "triangle"),
    (TRIANGLE_ISOSCELES, "triangle"),
    (ACCOUNT_EMPTY_OWNER, "Account"),
    (DEPOSIT_NOT_POSITIVE, "Account.deposit"),
    (WITHDRAW_OVERDRAWN, "Account.withdraw"),
    (TRANSFER_OVERDRAWN, "Account.transfer"),
    (MAGIC_EMPTY, "contains_magic"),
    (MAGIC_FOUND, "contains_magic"),
    (GREET_ANONYMOUS, "greet"),
    (GREET_LOUD, "greet"),
    (PAINT_RED, "paint"),
    (PAINT_GREEN, "paint"),
    (LOOKUP_PRESENT, "lookup"),
    (SPAN_REVERSED, "span"),
];

/// Functions without any branch; covered by being entered.
const BRANCHLESS_FUNCTIONS: [&str; 1] = ["unique_count"];

/// Static description of the toy subject.
#[derive(Debug, Clone)]
pub struct ToySubject {
    callables: Vec<Arc<Callable>>,
    fields: Vec<Arc<FieldDescriptor>>,
    enums: Vec<(String, Vec<String>)>,
}

impl ToySubject {
    pub fn new() -> Self {
        use ValueType::*;

        let account = || Class("Account".to_string());
        let callables = vec![
            Callable::function(
                "triangle",
                vec![
                    Parameter::required("a", Int),
                    Parameter::required("b", Int),
                    Parameter::required("c", Int),
                ],
                Str,
            ),
            Callable::constructor("Account", vec![Parameter::required("owner", Str)]),
            Callable::method(
                "Account",
                "deposit",
                vec![Parameter::required("amount", Int)],
                NoneType,
            ),
            Callable::method(
                "Account",
                "withdraw",
                vec![Parameter::required("amount", Int)],
                Bool,
            ),
            Callable::method(
                "Account",
                "transfer",
                vec![
                    Parameter::required("other", account()),
                    Parameter::required("amount", Int),
                ],
                Bool,
            ),
            Callable::function(
                "contains_magic",
                vec![Parameter::required("items", ValueType::list_of(Int))],
                Bool,
            ),
            Callable::function(
                "greet",
                vec![
                    Parameter::required("name", Str),
                    Parameter::optional("loud", Bool),
                ],
                Str,
            ),
            Callable::function(
                "paint",
                vec![Parameter::required("color", Enum("Color".to_string()))],
                Str,
            ),
            Callable::function(
                "lookup",
                vec![
                    Parameter::required("table", ValueType::dict_of(Str, Int)),
                    Parameter::required("key", Str),
                ],
                Int,
            ),
            Callable::function(
                "span",
                vec![Parameter::required("bounds", Tuple(vec![Int, Int]))],
                Int,
            ),
            Callable::function(
                "unique_count",
                vec![Parameter::required("items", ValueType::set_of(Str))],
                Int,
            ),
        ];

        Self {
            callables: callables.into_iter().map(Arc::new).collect(),
            fields: vec![Arc::new(FieldDescriptor::new("Account", "balance", Int))],
            enums: vec![(
                "Color".to_string(),
                vec!["Red".to_string(), "Green".to_string(), "Blue".to_string()],
            )],
        }
    }

    pub fn callables(&self) -> &[Arc<Callable>] {
        &self.callables
    }

    /// Callable by qualified name, e.g. `Account.deposit`.
    pub fn callable(&self, qualified_name: &str) -> Option<Arc<Callable>> {
        self.callables
            .iter()
            .find(|c| c.qualified_name() == qualified_name)
            .cloned()
    }

    pub fn fields(&self) -> &[Arc<FieldDescriptor>] {
        &self.fields
    }

    pub fn enum_variants(&self, name: &str) -> Option<&[String]> {
        self.enums
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, variants)| variants.as_slice())
    }

    /// Constructor of class `name`.
    pub fn constructor_of(&self, name: &str) -> Option<Arc<Callable>> {
        self.callables
            .iter()
            .find(|c| c.kind == crate::genome::CallableKind::Constructor && c.name == name)
            .cloned()
    }

    pub fn predicates(&self) -> Vec<PredicateId> {
        (0..PREDICATE_COUNT).collect()
    }

    pub fn lines(&self) -> Vec<LineId> {
        (0..LINE_COUNT).collect()
    }

    /// Both outcomes of every predicate, plus entering each branchless
    /// function.
    pub fn goals(&self) -> Vec<FitnessRef<TestCaseChromosome>> {
        let mut goals: Vec<FitnessRef<TestCaseChromosome>> = Vec::new();
        for (predicate, function) in PREDICATE_FUNCTIONS {
            goals.push(Arc::new(BranchGoal::new(function, predicate, true)));
            goals.push(Arc::new(BranchGoal::new(function, predicate, false)));
        }
        for function in BRANCHLESS_FUNCTIONS {
            goals.push(Arc::new(FunctionGoal::new(function)));
        }
        goals
    }

    /// One goal per line.
    pub fn line_goals(&self) -> Vec<FitnessRef<TestCaseChromosome>> {
        self.lines()
            .into_iter()
            .map(|line| Arc::new(LineGoal::new(line)) as FitnessRef<TestCaseChromosome>)
            .collect()
    }
}

impl Default for ToySubject {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_table_is_ordered() {
        for (index, (predicate, _)) in PREDICATE_FUNCTIONS.iter().enumerate() {
            assert_eq!(*predicate, index);
        }
    }

    #[test]
    fn test_goal_count() {
        let subject = ToySubject::new();
        assert_eq!(subject.goals().len(), 2 * PREDICATE_COUNT + 1);
        assert_eq!(subject.line_goals().len(), LINE_COUNT);
    }

    #[test]
    fn test_lookup_by_name() {
        let subject = ToySubject::new();
        assert!(subject.callable("Account.withdraw").is_some());
        assert!(subject.callable("withdraw").is_none());
        assert_eq!(
            subject.constructor_of("Account").map(|c| c.return_type.clone()),
            Some(ValueType::Class("Account".to_string()))
        );
        assert_eq!(subject.enum_variants("Color").map(<[String]>::len), Some(3));
    }
}
