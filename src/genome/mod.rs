//! Test case representation and its variation operators.
//!
//! A test case is an ordered arena of statements; every statement may only
//! read variables produced by statements before it.
//!
//! - **Types** (`types`): the value types of the subject language
//! - **Statements** (`statement`): primitives, collections, field reads,
//!   calls and assignments
//! - **Test cases** (`test_case`): the arena, with insertion, cascading
//!   removal and structural equality
//! - **Mutation** (`mutation`): per-statement mutation operators
//! - **Factory** (`factory`): the seam to the subject analysis that creates
//!   and rewires statements

mod callable;
mod factory;
mod mutation;
mod statement;
mod test_case;
mod types;
mod variable;

pub use callable::{Callable, CallableKind, FieldDescriptor, Parameter};
pub use factory::{TestFactory, random_test_case};
pub use mutation::mutate_statement;
pub use statement::{
    AssignmentStatement, CallStatement, CollectionElements, CollectionKind, CollectionStatement,
    FieldStatement, PrimitiveStatement, PrimitiveValue, Statement,
};
pub use test_case::TestCase;
pub use types::ValueType;
pub use variable::{Memo, PositionMemo, VarId, VariableReference};

/// Errors raised while building or rewiring a test case.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConstructionError {
    #[error("No value compatible with {0} is available")]
    NoCompatibleValue(ValueType),
    #[error("Test case length {length} exceeds maximum {max}")]
    LengthExceeded { length: usize, max: usize },
    #[error("Position {position} is out of bounds for a test case of size {size}")]
    InvalidPosition { position: usize, size: usize },
    #[error("Variable v{0} is not defined before its use")]
    ForwardReference(u32),
    #[error("Mutation is not supported for {0} statements")]
    UnsupportedMutation(&'static str),
    #[error("No callable is available to generate from")]
    NoCallableAvailable,
}
