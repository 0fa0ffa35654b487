//! Deterministic interpreter running test cases against the toy subject.

use std::collections::HashMap;
use std::sync::Arc;

use crate::chromosome::{
    ExecutionResult, ExecutionTrace, LineId, PredicateId, StatementFailure, TestCaseExecutor,
};
use crate::genome::{CollectionElements, PrimitiveValue, Statement, TestCase, VarId, VariableReference};

use super::ToySubject;

pub(crate) const TRIANGLE_INVALID: PredicateId = 0;
pub(crate) const TRIANGLE_DEGENERATE: PredicateId = 1;
pub(crate) const TRIANGLE_EQUILATERAL: PredicateId = 2;
pub(crate) const TRIANGLE_ISOSCELES: PredicateId = 3;
pub(crate) const ACCOUNT_EMPTY_OWNER: PredicateId = 4;
pub(crate) const DEPOSIT_NOT_POSITIVE: PredicateId = 5;
pub(crate) const WITHDRAW_OVERDRAWN: PredicateId = 6;
pub(crate) const TRANSFER_OVERDRAWN: PredicateId = 7;
pub(crate) const MAGIC_EMPTY: PredicateId = 8;
pub(crate) const MAGIC_FOUND: PredicateId = 9;
pub(crate) const GREET_ANONYMOUS: PredicateId = 10;
pub(crate) const GREET_LOUD: PredicateId = 11;
pub(crate) const PAINT_RED: PredicateId = 12;
pub(crate) const PAINT_GREEN: PredicateId = 13;
pub(crate) const LOOKUP_PRESENT: PredicateId = 14;
pub(crate) const SPAN_REVERSED: PredicateId = 15;

pub(crate) const PREDICATE_COUNT: usize = 16;
pub(crate) const LINE_COUNT: LineId = 38;

/// Runtime value.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Enum(usize),
    /// Index into the interpreter's heap.
    Object(usize),
    List(Vec<Value>),
    Set(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Vec<(Value, Value)>),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "Color",
            Value::Object(_) => "Account",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
        }
    }

    fn truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Bytes(b) => !b.is_empty(),
            Value::Enum(_) | Value::Object(_) => true,
            Value::List(v) | Value::Set(v) | Value::Tuple(v) => !v.is_empty(),
            Value::Dict(v) => !v.is_empty(),
        }
    }
}

fn primitive(value: &PrimitiveValue) -> Value {
    match value {
        PrimitiveValue::None => Value::None,
        PrimitiveValue::Bool(b) => Value::Bool(*b),
        PrimitiveValue::Int(i) => Value::Int(*i),
        PrimitiveValue::Float(f) => Value::Float(*f),
        PrimitiveValue::Str(s) => Value::Str(s.clone()),
        PrimitiveValue::Bytes(b) => Value::Bytes(b.clone()),
        PrimitiveValue::Enum { index, .. } => Value::Enum(*index),
    }
}

fn type_error(expected: &str, got: Option<&Value>) -> String {
    match got {
        Some(value) => format!("TypeError: expected {}, got {}", expected, value.type_name()),
        None => format!("TypeError: missing {} argument", expected),
    }
}

fn int(value: Option<Value>) -> Result<i64, String> {
    match value {
        Some(Value::Int(i)) => Ok(i),
        Some(Value::Bool(b)) => Ok(i64::from(b)),
        other => Err(type_error("int", other.as_ref())),
    }
}

fn string(value: Option<Value>) -> Result<String, String> {
    match value {
        Some(Value::Str(s)) => Ok(s),
        other => Err(type_error("str", other.as_ref())),
    }
}

fn object(value: Option<Value>) -> Result<usize, String> {
    match value {
        Some(Value::Object(id)) => Ok(id),
        Some(Value::None) => Err("AttributeError: 'NoneType' object has no attribute".to_string()),
        other => Err(type_error("Account", other.as_ref())),
    }
}

// ============================================================================
// Branch distances
// ============================================================================

/// Outcome of a predicate and its distance to either outcome.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Condition {
    value: bool,
    true_distance: f64,
    false_distance: f64,
}

impl Condition {
    fn flag(value: bool) -> Self {
        Self {
            value,
            true_distance: if value { 0.0 } else { 1.0 },
            false_distance: if value { 1.0 } else { 0.0 },
        }
    }

    fn eq(lhs: f64, rhs: f64) -> Self {
        let d = (lhs - rhs).abs();
        Self {
            value: d == 0.0,
            true_distance: d,
            false_distance: if d == 0.0 { 1.0 } else { 0.0 },
        }
    }

    fn le(lhs: f64, rhs: f64) -> Self {
        let value = lhs <= rhs;
        Self {
            value,
            true_distance: if value { 0.0 } else { lhs - rhs },
            false_distance: if value { rhs - lhs + 1.0 } else { 0.0 },
        }
    }

    fn gt(lhs: f64, rhs: f64) -> Self {
        Self::le(lhs, rhs).negate()
    }

    fn negate(self) -> Self {
        Self {
            value: !self.value,
            true_distance: self.false_distance,
            false_distance: self.true_distance,
        }
    }

    fn and(self, other: Self) -> Self {
        Self {
            value: self.value && other.value,
            true_distance: self.true_distance + other.true_distance,
            false_distance: self.false_distance.min(other.false_distance),
        }
    }

    fn or(self, other: Self) -> Self {
        Self {
            value: self.value || other.value,
            true_distance: self.true_distance.min(other.true_distance),
            false_distance: self.false_distance + other.false_distance,
        }
    }
}

/// Character-level distance: length difference plus mismatches.
fn string_distance(a: &str, b: &str) -> f64 {
    let (a, b): (Vec<char>, Vec<char>) = (a.chars().collect(), b.chars().collect());
    let mismatches = a.iter().zip(&b).filter(|(x, y)| x != y).count();
    (a.len().abs_diff(b.len()) + mismatches) as f64
}

// ============================================================================
// Interpreter
// ============================================================================

#[derive(Debug, Clone)]
struct Account {
    balance: i64,
}

struct Interpreter<'a> {
    subject: &'a ToySubject,
    trace: ExecutionTrace,
    heap: Vec<Account>,
}

type Env = HashMap<VarId, Value>;

impl<'a> Interpreter<'a> {
    fn new(subject: &'a ToySubject) -> Self {
        Self {
            subject,
            trace: ExecutionTrace::default(),
            heap: Vec::new(),
        }
    }

    fn line(&mut self, line: LineId) {
        self.trace.record_line(line);
    }

    fn branch(&mut self, predicate: PredicateId, condition: Condition) -> bool {
        self.trace
            .record_predicate(predicate, condition.true_distance, condition.false_distance);
        condition.value
    }

    fn account(&mut self, id: usize) -> Result<&mut Account, String> {
        self.heap
            .get_mut(id)
            .ok_or_else(|| format!("ReferenceError: no object {}", id))
    }

    /// Run one statement; returns the variable it binds, if any.
    fn run(&mut self, statement: &Statement, env: &Env) -> Result<Option<(VarId, Value)>, String> {
        let lookup = |var: &VariableReference| {
            env.get(&var.id())
                .cloned()
                .ok_or_else(|| format!("NameError: v{} is not defined", var.id().index()))
        };

        match statement {
            Statement::Primitive(s) => Ok(Some((s.ret_val().id(), primitive(s.value())))),
            Statement::Collection(s) => {
                let value = match s.elements() {
                    CollectionElements::List(e) => {
                        Value::List(e.iter().map(lookup).collect::<Result<_, _>>()?)
                    }
                    CollectionElements::Tuple(e) => {
                        Value::Tuple(e.iter().map(lookup).collect::<Result<_, _>>()?)
                    }
                    CollectionElements::Set(e) => {
                        let mut items: Vec<Value> = Vec::new();
                        for var in e {
                            let item = lookup(var)?;
                            if !items.contains(&item) {
                                items.push(item);
                            }
                        }
                        Value::Set(items)
                    }
                    CollectionElements::Dict(e) => {
                        let mut entries: Vec<(Value, Value)> = Vec::new();
                        for (k, v) in e {
                            let (key, value) = (lookup(k)?, lookup(v)?);
                            match entries.iter_mut().find(|(existing, _)| *existing == key) {
                                Some(entry) => entry.1 = value,
                                None => entries.push((key, value)),
                            }
                        }
                        Value::Dict(entries)
                    }
                };
                Ok(Some((s.ret_val().id(), value)))
            }
            Statement::Field(s) => {
                let id = object(Some(lookup(s.source())?))?;
                let balance = self.account(id)?.balance;
                match s.field().name.as_str() {
                    "balance" => Ok(Some((s.ret_val().id(), Value::Int(balance)))),
                    other => Err(format!("AttributeError: no attribute '{}'", other)),
                }
            }
            Statement::Call(s) => {
                let callee = s.callee().map(lookup).transpose()?;
                let args = s
                    .args()
                    .iter()
                    .map(|a| a.as_ref().map(lookup).transpose())
                    .collect::<Result<Vec<_>, _>>()?;
                let name = s.callable().qualified_name();
                self.trace.record_function(&name);
                let value = self.call(&name, callee, args)?;
                Ok(Some((s.ret_val().id(), value)))
            }
            Statement::Assignment(s) => {
                let value = lookup(s.value())?;
                match s.field() {
                    Some("balance") => {
                        let id = object(Some(lookup(s.target())?))?;
                        let amount = int(Some(value))?;
                        self.account(id)?.balance = amount;
                        Ok(None)
                    }
                    Some(other) => Err(format!("AttributeError: no attribute '{}'", other)),
                    None => Ok(Some((s.target().id(), value))),
                }
            }
        }
    }

    fn call(
        &mut self,
        name: &str,
        callee: Option<Value>,
        args: Vec<Option<Value>>,
    ) -> Result<Value, String> {
        let arg = |i: usize| args.get(i).cloned().flatten();
        match name {
            "triangle" => self.triangle(int(arg(0))?, int(arg(1))?, int(arg(2))?),
            "Account" => self.new_account(string(arg(0))?),
            "Account.deposit" => self.deposit(object(callee)?, int(arg(0))?),
            "Account.withdraw" => self.withdraw(object(callee)?, int(arg(0))?),
            "Account.transfer" => self.transfer(object(callee)?, arg(0), int(arg(1))?),
            "contains_magic" => self.contains_magic(arg(0)),
            "greet" => self.greet(string(arg(0))?, arg(1).is_some_and(|v| v.truthy())),
            "paint" => self.paint(arg(0)),
            "lookup" => self.lookup(arg(0), string(arg(1))?),
            "span" => self.span(arg(0)),
            "unique_count" => self.unique_count(arg(0)),
            other => Err(format!("NameError: {} is not defined", other)),
        }
    }

    fn triangle(&mut self, a: i64, b: i64, c: i64) -> Result<Value, String> {
        self.line(0);
        let smallest = a.min(b).min(c);
        if self.branch(TRIANGLE_INVALID, Condition::le(smallest as f64, 0.0)) {
            self.line(1);
            return Ok(Value::Str("invalid".into()));
        }
        let (wa, wb, wc) = (i128::from(a), i128::from(b), i128::from(c));
        let slack = (wa + wb - wc).min(wa + wc - wb).min(wb + wc - wa);
        if self.branch(TRIANGLE_DEGENERATE, Condition::le(slack as f64, 0.0)) {
            self.line(2);
            return Ok(Value::Str("not a triangle".into()));
        }
        let (fa, fb, fc) = (a as f64, b as f64, c as f64);
        if self.branch(
            TRIANGLE_EQUILATERAL,
            Condition::eq(fa, fb).and(Condition::eq(fb, fc)),
        ) {
            self.line(3);
            return Ok(Value::Str("equilateral".into()));
        }
        if self.branch(
            TRIANGLE_ISOSCELES,
            Condition::eq(fa, fb)
                .or(Condition::eq(fb, fc))
                .or(Condition::eq(fa, fc)),
        ) {
            self.line(4);
            return Ok(Value::Str("isosceles".into()));
        }
        self.line(5);
        Ok(Value::Str("scalene".into()))
    }

    fn new_account(&mut self, owner: String) -> Result<Value, String> {
        self.line(6);
        if self.branch(
            ACCOUNT_EMPTY_OWNER,
            Condition::eq(owner.chars().count() as f64, 0.0),
        ) {
            self.line(7);
            return Err("ValueError: owner must not be empty".into());
        }
        self.line(8);
        self.heap.push(Account { balance: 0 });
        Ok(Value::Object(self.heap.len() - 1))
    }

    fn deposit(&mut self, id: usize, amount: i64) -> Result<Value, String> {
        self.line(9);
        if self.branch(DEPOSIT_NOT_POSITIVE, Condition::le(amount as f64, 0.0)) {
            self.line(10);
            return Err("ValueError: deposit must be positive".into());
        }
        self.line(11);
        let account = self.account(id)?;
        account.balance = account.balance.saturating_add(amount);
        Ok(Value::None)
    }

    fn withdraw(&mut self, id: usize, amount: i64) -> Result<Value, String> {
        self.line(12);
        let balance = self.account(id)?.balance;
        if self.branch(
            WITHDRAW_OVERDRAWN,
            Condition::gt(amount as f64, balance as f64),
        ) {
            self.line(13);
            return Ok(Value::Bool(false));
        }
        self.line(14);
        self.account(id)?.balance = balance.saturating_sub(amount);
        Ok(Value::Bool(true))
    }

    fn transfer(&mut self, id: usize, other: Option<Value>, amount: i64) -> Result<Value, String> {
        self.line(15);
        let balance = self.account(id)?.balance;
        if self.branch(
            TRANSFER_OVERDRAWN,
            Condition::gt(amount as f64, balance as f64),
        ) {
            self.line(16);
            return Ok(Value::Bool(false));
        }
        self.line(17);
        let target = object(other)?;
        self.account(id)?.balance = balance.saturating_sub(amount);
        let receiver = self.account(target)?;
        receiver.balance = receiver.balance.saturating_add(amount);
        Ok(Value::Bool(true))
    }

    fn contains_magic(&mut self, items: Option<Value>) -> Result<Value, String> {
        let items = match items {
            Some(Value::List(items)) => items,
            other => return Err(type_error("list", other.as_ref())),
        };
        self.line(18);
        if self.branch(MAGIC_EMPTY, Condition::eq(items.len() as f64, 0.0)) {
            self.line(19);
            return Ok(Value::Bool(false));
        }
        for item in items {
            self.line(20);
            let x = int(Some(item))?;
            if self.branch(MAGIC_FOUND, Condition::eq(x as f64, 42.0)) {
                self.line(21);
                return Ok(Value::Bool(true));
            }
        }
        self.line(22);
        Ok(Value::Bool(false))
    }

    fn greet(&mut self, name: String, loud: bool) -> Result<Value, String> {
        self.line(23);
        let mut greeting = if self.branch(
            GREET_ANONYMOUS,
            Condition::eq(name.chars().count() as f64, 0.0),
        ) {
            self.line(24);
            "Hello, stranger".to_string()
        } else {
            self.line(25);
            format!("Hello, {}", name)
        };
        if self.branch(GREET_LOUD, Condition::flag(loud)) {
            self.line(26);
            greeting = greeting.to_uppercase();
        }
        Ok(Value::Str(greeting))
    }

    fn paint(&mut self, color: Option<Value>) -> Result<Value, String> {
        let index = match color {
            Some(Value::Enum(index)) => index,
            other => return Err(type_error("Color", other.as_ref())),
        };
        let variants = self.subject.enum_variants("Color").map_or(0, |v| v.len());
        if index >= variants {
            return Err(format!("ValueError: {} is not a valid Color", index));
        }
        let index = index as f64;
        self.line(27);
        if self.branch(PAINT_RED, Condition::eq(index, 0.0)) {
            self.line(28);
            return Ok(Value::Str("warm".into()));
        }
        if self.branch(PAINT_GREEN, Condition::eq(index, 1.0)) {
            self.line(29);
            return Ok(Value::Str("natural".into()));
        }
        self.line(30);
        Ok(Value::Str("cool".into()))
    }

    fn lookup(&mut self, table: Option<Value>, key: String) -> Result<Value, String> {
        let entries = match table {
            Some(Value::Dict(entries)) => entries,
            other => return Err(type_error("dict", other.as_ref())),
        };
        self.line(31);
        let found = entries
            .iter()
            .find(|(k, _)| matches!(k, Value::Str(s) if *s == key))
            .map(|(_, v)| v.clone());
        let condition = match found {
            Some(_) => Condition::flag(true),
            None => {
                let closest = entries
                    .iter()
                    .filter_map(|(k, _)| match k {
                        Value::Str(s) => Some(string_distance(s, &key)),
                        _ => None,
                    })
                    .fold(key.chars().count() as f64 + 1.0, f64::min);
                Condition {
                    value: false,
                    true_distance: closest.max(1.0),
                    false_distance: 0.0,
                }
            }
        };
        let present = self.branch(LOOKUP_PRESENT, condition);
        match found {
            Some(value) if present => {
                self.line(32);
                Ok(value)
            }
            _ => {
                self.line(33);
                Err(format!("KeyError: {:?}", key))
            }
        }
    }

    fn span(&mut self, bounds: Option<Value>) -> Result<Value, String> {
        let (lo, hi) = match bounds {
            Some(Value::Tuple(items)) if items.len() == 2 => {
                let mut items = items.into_iter();
                (int(items.next())?, int(items.next())?)
            }
            other => return Err(type_error("tuple[int, int]", other.as_ref())),
        };
        self.line(34);
        if self.branch(SPAN_REVERSED, Condition::gt(lo as f64, hi as f64)) {
            self.line(35);
            return Ok(Value::Int(0));
        }
        self.line(36);
        Ok(Value::Int(hi.saturating_sub(lo)))
    }

    fn unique_count(&mut self, items: Option<Value>) -> Result<Value, String> {
        match items {
            Some(Value::Set(items)) => {
                self.line(37);
                Ok(Value::Int(items.len() as i64))
            }
            other => Err(type_error("set", other.as_ref())),
        }
    }
}

/// Executor for the toy subject.
#[derive(Debug, Clone)]
pub struct ToyExecutor {
    subject: Arc<ToySubject>,
}

impl ToyExecutor {
    pub fn new(subject: Arc<ToySubject>) -> Self {
        Self { subject }
    }
}

impl TestCaseExecutor for ToyExecutor {
    fn execute(&self, test_case: &TestCase) -> ExecutionResult {
        let mut interpreter = Interpreter::new(&self.subject);
        let mut env = Env::new();
        let mut failure = None;

        for (position, statement) in test_case.statements().iter().enumerate() {
            match interpreter.run(statement, &env) {
                Ok(Some((var, value))) => {
                    env.insert(var, value);
                }
                Ok(None) => {}
                Err(message) => {
                    failure = Some(StatementFailure { position, message });
                    break;
                }
            }
        }

        ExecutionResult {
            trace: interpreter.trace,
            failure,
        }
    }
}
