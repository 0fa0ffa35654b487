//! Statement mutation operators.
//!
//! Mutation works on a position inside the arena rather than on a detached
//! statement, since several operators need to look at (or insert) earlier
//! statements. Every operator returns whether the test case changed.

use super::ConstructionError;
use super::statement::{CollectionElements, PrimitiveValue, Statement};
use super::test_case::TestCase;
use super::types::ValueType;
use super::variable::VariableReference;
use crate::schema::{SearchConfig, StatementConfig, TestCaseConfig};
use crate::search::SearchRng;

/// Mutate the statement at `position` in place.
///
/// Call mutation may insert statements before `position`. Assignments do
/// not support mutation and yield [`ConstructionError::UnsupportedMutation`].
pub fn mutate_statement(
    test_case: &mut TestCase,
    position: usize,
    rng: &mut SearchRng,
    config: &SearchConfig,
) -> Result<bool, ConstructionError> {
    let statement = test_case
        .statement(position)
        .ok_or(ConstructionError::InvalidPosition {
            position,
            size: test_case.size(),
        })?;
    match statement {
        Statement::Primitive(_) => Ok(mutate_primitive(
            test_case,
            position,
            rng,
            &config.statement,
        )),
        Statement::Collection(_) => Ok(mutate_collection(
            test_case,
            position,
            rng,
            &config.test_case,
        )),
        Statement::Field(_) => Ok(mutate_field(test_case, position, rng, &config.statement)),
        Statement::Call(_) => mutate_call(test_case, position, rng, &config.statement),
        Statement::Assignment(_) => Err(ConstructionError::UnsupportedMutation("assignment")),
    }
}

// ============================================================================
// Primitives
// ============================================================================

fn mutate_primitive(
    test_case: &mut TestCase,
    position: usize,
    rng: &mut SearchRng,
    config: &StatementConfig,
) -> bool {
    let Some(Statement::Primitive(stmt)) = test_case.statement_mut(position) else {
        return false;
    };
    if stmt.value.is_none() {
        return false;
    }

    let original = stmt.value.clone();
    for _ in 0..config.max_primitive_mutation_attempts {
        let candidate = if rng.next_bool(config.random_perturbation) {
            randomize_value(&original, rng, config)
        } else {
            delta_value(&original, rng, config)
        };
        if !candidate.same_as(&original) {
            stmt.value = candidate;
            return true;
        }
    }
    log::debug!(
        "Primitive {:?} unchanged after {} attempts",
        original,
        config.max_primitive_mutation_attempts
    );
    false
}

/// Fresh value of the same kind as `value`.
fn randomize_value(
    value: &PrimitiveValue,
    rng: &mut SearchRng,
    config: &StatementConfig,
) -> PrimitiveValue {
    match value {
        PrimitiveValue::None => PrimitiveValue::None,
        PrimitiveValue::Bool(_) => PrimitiveValue::Bool(rng.next_bool(0.5)),
        PrimitiveValue::Int(_) => {
            PrimitiveValue::Int((rng.next_gaussian() * config.max_int as f64) as i64)
        }
        PrimitiveValue::Float(_) => {
            let raw = rng.next_gaussian() * config.max_int as f64;
            let digits = rng.next_int(0, 7) as i32;
            PrimitiveValue::Float(round_to(raw, digits))
        }
        PrimitiveValue::Str(_) => PrimitiveValue::Str(rng.next_string(config.string_length)),
        PrimitiveValue::Bytes(_) => PrimitiveValue::Bytes(rng.next_bytes(config.bytes_length)),
        PrimitiveValue::Enum {
            type_name,
            variants,
            ..
        } => PrimitiveValue::Enum {
            type_name: type_name.clone(),
            variants: variants.clone(),
            index: if variants.is_empty() {
                0
            } else {
                rng.next_index(variants.len())
            },
        },
    }
}

/// Small local change of `value`.
fn delta_value(
    value: &PrimitiveValue,
    rng: &mut SearchRng,
    config: &StatementConfig,
) -> PrimitiveValue {
    match value {
        PrimitiveValue::None => PrimitiveValue::None,
        PrimitiveValue::Bool(b) => PrimitiveValue::Bool(!b),
        PrimitiveValue::Int(i) => {
            let delta = (rng.next_gaussian() * config.max_delta as f64) as i64;
            PrimitiveValue::Int(i.saturating_add(delta))
        }
        PrimitiveValue::Float(f) => {
            let choice = rng.next_f64();
            if choice < 1.0 / 3.0 {
                PrimitiveValue::Float(f + rng.next_gaussian() * config.max_delta as f64)
            } else if choice < 2.0 / 3.0 {
                PrimitiveValue::Float(f + rng.next_gaussian())
            } else {
                PrimitiveValue::Float(round_to(*f, rng.next_int(0, 7) as i32))
            }
        }
        PrimitiveValue::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let edited = sequence_delta(&chars, config.string_length, rng, SearchRng::next_char);
            PrimitiveValue::Str(edited.into_iter().collect())
        }
        PrimitiveValue::Bytes(bytes) => PrimitiveValue::Bytes(sequence_delta(
            bytes,
            config.bytes_length,
            rng,
            |rng| rng.next_int(0, 255) as u8,
        )),
        PrimitiveValue::Enum {
            type_name,
            variants,
            index,
        } => {
            let len = variants.len().max(1);
            let step = if rng.next_bool(0.5) { 1 } else { len - 1 };
            PrimitiveValue::Enum {
                type_name: type_name.clone(),
                variants: variants.clone(),
                index: (index + step) % len,
            }
        }
    }
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    let rounded = (value * factor).round() / factor;
    if rounded.is_finite() { rounded } else { value }
}

/// Delete, replace and insert edits over a string-like sequence.
///
/// Each edit is attempted with probability 1/3. Deletion and replacement
/// touch each item with probability 1/len; insertion keeps adding items at
/// one random position while `random() <= 0.5^k`, up to `max_len`.
fn sequence_delta<T, F>(items: &[T], max_len: usize, rng: &mut SearchRng, mut new_item: F) -> Vec<T>
where
    T: Clone,
    F: FnMut(&mut SearchRng) -> T,
{
    let mut working = items.to_vec();
    let edit_probability = 1.0 / 3.0;

    if rng.next_bool(edit_probability) && !working.is_empty() {
        let p = 1.0 / working.len() as f64;
        working.retain(|_| !rng.next_bool(p));
    }

    if rng.next_bool(edit_probability) && !working.is_empty() {
        let p = 1.0 / working.len() as f64;
        for item in working.iter_mut() {
            if rng.next_bool(p) {
                *item = new_item(rng);
            }
        }
    }

    if rng.next_bool(edit_probability) {
        let position = rng.next_index(working.len() + 1);
        let mut k = 1;
        while working.len() < max_len && rng.next_f64() <= 0.5f64.powi(k) {
            working.insert(position, new_item(rng));
            k += 1;
        }
    }

    working
}

// ============================================================================
// Collections
// ============================================================================

fn mutate_collection(
    test_case: &mut TestCase,
    position: usize,
    rng: &mut SearchRng,
    config: &TestCaseConfig,
) -> bool {
    let Some(Statement::Collection(stmt)) = test_case.statement(position) else {
        return false;
    };
    let is_tuple = matches!(stmt.elements, CollectionElements::Tuple(_));

    let mut changed = false;
    if !is_tuple && rng.next_bool(config.test_delete_probability) {
        changed |= delete_elements(test_case, position, rng);
    }
    if rng.next_bool(config.test_change_probability) {
        changed |= replace_elements(test_case, position, rng);
    }
    if !is_tuple && rng.next_bool(config.test_insert_probability) {
        changed |= insert_elements(test_case, position, rng);
    }
    changed
}

fn delete_elements(test_case: &mut TestCase, position: usize, rng: &mut SearchRng) -> bool {
    let Some(Statement::Collection(stmt)) = test_case.statement_mut(position) else {
        return false;
    };
    let before = stmt.elements.len();
    if before == 0 {
        return false;
    }
    let p = 1.0 / before as f64;
    match &mut stmt.elements {
        CollectionElements::List(e) | CollectionElements::Set(e) => {
            e.retain(|_| !rng.next_bool(p));
        }
        CollectionElements::Dict(e) => e.retain(|_| !rng.next_bool(p)),
        CollectionElements::Tuple(_) => {}
    }
    stmt.elements.len() != before
}

/// Pick uniformly among compatible earlier variables and `current` itself.
fn pick_replacement(
    test_case: &TestCase,
    ty: &ValueType,
    position: usize,
    current: &VariableReference,
    rng: &mut SearchRng,
) -> Option<VariableReference> {
    let mut options = test_case.objects_before(ty, position);
    if !options.contains(current) {
        options.push(current.clone());
    }
    rng.choose(&options).cloned()
}

fn replace_elements(test_case: &mut TestCase, position: usize, rng: &mut SearchRng) -> bool {
    let Some(Statement::Collection(stmt)) = test_case.statement(position) else {
        return false;
    };
    let len = stmt.elements.len();
    if len == 0 {
        return false;
    }
    let p = 1.0 / len as f64;
    let stmt = stmt.clone();
    let mut elements = stmt.elements.clone();
    let mut changed = false;

    match &mut elements {
        CollectionElements::List(e) | CollectionElements::Set(e) | CollectionElements::Tuple(e) => {
            for (index, elem) in e.iter_mut().enumerate() {
                if !rng.next_bool(p) {
                    continue;
                }
                let ty = stmt.element_type(index);
                if let Some(new) = pick_replacement(test_case, &ty, position, elem, rng)
                    && new != *elem
                {
                    *elem = new;
                    changed = true;
                }
            }
        }
        CollectionElements::Dict(e) => {
            for (key, value) in e.iter_mut() {
                if !rng.next_bool(p) {
                    continue;
                }
                let (slot, ty) = if rng.next_bool(0.5) {
                    (key, stmt.element_type(0))
                } else {
                    (value, stmt.dict_value_type())
                };
                if let Some(new) = pick_replacement(test_case, &ty, position, slot, rng)
                    && new != *slot
                {
                    *slot = new;
                    changed = true;
                }
            }
        }
    }

    if changed && let Some(Statement::Collection(target)) = test_case.statement_mut(position) {
        target.elements = elements;
    }
    changed
}

fn insert_elements(test_case: &mut TestCase, position: usize, rng: &mut SearchRng) -> bool {
    let Some(Statement::Collection(stmt)) = test_case.statement(position) else {
        return false;
    };
    let stmt = stmt.clone();
    let mut elements = stmt.elements.clone();
    let at = rng.next_index(elements.len() + 1);
    let mut changed = false;

    let mut k = 1;
    while rng.next_f64() <= 0.5f64.powi(k) {
        k += 1;
        match &mut elements {
            CollectionElements::List(e) | CollectionElements::Set(e) => {
                let donors = test_case.objects_before(&stmt.element_type(0), position);
                let Some(donor) = rng.choose(&donors) else {
                    break;
                };
                e.insert(at, donor.clone());
            }
            CollectionElements::Dict(e) => {
                let keys = test_case.objects_before(&stmt.element_type(0), position);
                let values = test_case.objects_before(&stmt.dict_value_type(), position);
                let (Some(key), Some(value)) = (rng.choose(&keys), rng.choose(&values)) else {
                    break;
                };
                e.insert(at, (key.clone(), value.clone()));
            }
            CollectionElements::Tuple(_) => break,
        }
        changed = true;
    }

    if changed && let Some(Statement::Collection(target)) = test_case.statement_mut(position) {
        target.elements = elements;
    }
    changed
}

// ============================================================================
// Field reads
// ============================================================================

fn mutate_field(
    test_case: &mut TestCase,
    position: usize,
    rng: &mut SearchRng,
    config: &StatementConfig,
) -> bool {
    if !rng.next_bool(config.change_parameter_probability) {
        return false;
    }
    let Some(Statement::Field(stmt)) = test_case.statement(position) else {
        return false;
    };
    let source = stmt.source.clone();
    let owner = ValueType::Class(stmt.field.owner.clone());

    let options: Vec<_> = test_case
        .objects_before(&owner, position)
        .into_iter()
        .filter(|v| *v != source)
        .collect();
    let Some(new) = rng.choose(&options).cloned() else {
        return false;
    };
    if let Some(Statement::Field(stmt)) = test_case.statement_mut(position) {
        stmt.source = new;
    }
    true
}

// ============================================================================
// Calls
// ============================================================================

fn mutate_call(
    test_case: &mut TestCase,
    position: usize,
    rng: &mut SearchRng,
    config: &StatementConfig,
) -> Result<bool, ConstructionError> {
    if !rng.next_bool(config.change_parameter_probability) {
        return Ok(false);
    }
    let Some(Statement::Call(call)) = test_case.statement(position) else {
        return Ok(false);
    };
    let slots = call.mutable_argument_count();
    if slots == 0 {
        return Ok(false);
    }
    let call_var = call.ret_val.clone();
    let has_callee = call.callee.is_some();
    let arg_count = call.args.len();
    let name = call.callable.qualified_name();

    let p = 1.0 / slots as f64;
    let mut changed = false;
    if has_callee && rng.next_bool(p) {
        changed |= mutate_callee(test_case, position, rng);
    }
    for index in 0..arg_count {
        if !rng.next_bool(p) {
            continue;
        }
        // Earlier argument mutations may have inserted statements before the call.
        let Some(current) = test_case.position_of(&call_var) else {
            break;
        };
        match mutate_argument(test_case, current, index, rng, config) {
            Ok(c) => changed |= c,
            Err(err) => log::debug!("Argument {} of {} not mutated: {}", index, name, err),
        }
    }
    Ok(changed)
}

fn mutate_callee(test_case: &mut TestCase, position: usize, rng: &mut SearchRng) -> bool {
    let Some(Statement::Call(call)) = test_case.statement(position) else {
        return false;
    };
    let (Some(callee), Some(ty)) = (call.callee.clone(), call.callable.callee_type()) else {
        return false;
    };
    let options: Vec<_> = test_case
        .objects_before(&ty, position)
        .into_iter()
        .filter(|v| *v != callee)
        .collect();
    let Some(new) = rng.choose(&options).cloned() else {
        return false;
    };
    if let Some(Statement::Call(call)) = test_case.statement_mut(position) {
        call.callee = Some(new);
    }
    true
}

fn set_argument(
    test_case: &mut TestCase,
    position: usize,
    index: usize,
    value: Option<VariableReference>,
) {
    if let Some(Statement::Call(call)) = test_case.statement_mut(position)
        && let Some(slot) = call.args.get_mut(index)
    {
        *slot = value;
    }
}

#[derive(Clone)]
enum Replacement {
    Existing(VariableReference),
    /// Duplicate the producer at this position right before the call.
    Duplicate(usize),
    NoneValue,
}

fn mutate_argument(
    test_case: &mut TestCase,
    position: usize,
    index: usize,
    rng: &mut SearchRng,
    config: &StatementConfig,
) -> Result<bool, ConstructionError> {
    let Some(Statement::Call(call)) = test_case.statement(position) else {
        return Ok(false);
    };
    let Some(param) = call.callable.parameters.get(index).cloned() else {
        return Ok(false);
    };
    let current = call.args.get(index).cloned().flatten();

    let Some(current) = current else {
        let options = test_case.objects_before(&param.ty, position);
        let chosen = rng
            .choose(&options)
            .cloned()
            .ok_or(ConstructionError::NoCompatibleValue(param.ty))?;
        set_argument(test_case, position, index, Some(chosen));
        return Ok(true);
    };

    if param.optional && rng.next_bool(config.skip_optional_parameter_probability) {
        set_argument(test_case, position, index, None);
        return Ok(true);
    }

    let mut options: Vec<Replacement> = test_case
        .objects_before(&param.ty, position)
        .into_iter()
        .filter(|v| *v != current)
        .map(Replacement::Existing)
        .collect();
    if let Some(source) = test_case.position_of(&current) {
        options.push(Replacement::Duplicate(source));
    }
    options.push(Replacement::NoneValue);

    let Some(choice) = rng.choose(&options).cloned() else {
        return Ok(false);
    };
    match choice {
        Replacement::Existing(var) => set_argument(test_case, position, index, Some(var)),
        Replacement::Duplicate(source) => {
            let Some(original) = test_case.statement(source).cloned() else {
                return Ok(false);
            };
            let copy = original.duplicate(test_case);
            let var = copy.ret_val().cloned();
            test_case.add_statement(copy, position)?;
            set_argument(test_case, position + 1, index, var);
        }
        Replacement::NoneValue => {
            let var = test_case.add_primitive(PrimitiveValue::None, param.ty, position)?;
            set_argument(test_case, position + 1, index, Some(var));
        }
    }
    Ok(true)
}
