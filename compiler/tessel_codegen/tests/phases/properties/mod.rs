//! Property tests: generated code against plain Rust arithmetic and a
//! model of list and handle state.

use proptest::prelude::*;
use tessel_codegen::{
    is_implicit_widening, promote, CodegenResult, CompositeDef, ExprContext, FieldListBuilder,
    GrowthPolicy, Lifecycle, NumericType, TypeRepr, TypedExpr,
};
use tessel_exec::Value;
use tessel_native::{BinaryOperator, NativeExpr, NativeType};

use crate::common::{compile, run};

fn numeric_type() -> impl Strategy<Value = NumericType> {
    proptest::sample::select(NumericType::ALL.to_vec())
}

fn signed_type() -> impl Strategy<Value = NumericType> {
    proptest::sample::select(vec![
        NumericType::Int8,
        NumericType::Int16,
        NumericType::Int32,
        NumericType::Int64,
    ])
}

fn unsigned_type() -> impl Strategy<Value = NumericType> {
    proptest::sample::select(vec![
        NumericType::UInt8,
        NumericType::UInt16,
        NumericType::UInt32,
        NumericType::UInt64,
    ])
}

fn floor_div(a: i64, b: i64) -> i64 {
    (a as f64 / b as f64).floor() as i64
}

/// `a % b` in Rust's own integer type of the same width and signedness.
fn native_remainder(t: NumericType, a: i64, b: i64) -> i128 {
    match t {
        NumericType::Int8 => i128::from((a as i8).wrapping_rem(b as i8)),
        NumericType::Int16 => i128::from((a as i16).wrapping_rem(b as i16)),
        NumericType::Int32 => i128::from((a as i32).wrapping_rem(b as i32)),
        NumericType::Int64 => i128::from(a.wrapping_rem(b)),
        NumericType::UInt8 => i128::from((a as u8) % (b as u8)),
        NumericType::UInt16 => i128::from((a as u16) % (b as u16)),
        NumericType::UInt32 => i128::from((a as u32) % (b as u32)),
        NumericType::UInt64 => i128::from((a as u64) % (b as u64)),
        other => panic!("{other} is not an integer type"),
    }
}

/// Compile and run `a % b` with both operands of type `t`.
fn remainder(t: NumericType, a: i64, b: i64) -> Option<i128> {
    let repr = TypeRepr::Numeric(t);
    let module = compile(&[repr.clone(), repr.clone()], Some(&repr), |cx, args| {
        cx.bin_op(args[0].clone(), BinaryOperator::Mod, args[1].clone()).map(Some)
    });
    let native = t.native();
    let args = [
        Value::int(i128::from(a), &native),
        Value::int(i128::from(b), &native),
    ];
    run(&module, &args).unwrap().as_i128()
}

fn is_zero_in(t: NumericType, value: i64) -> bool {
    Value::int(i128::from(value), &t.native()).as_i128() == Some(0)
}

/// `parts[0] * base^(n-1) + ... + parts[n-1]`.
fn digits(parts: &[i64], base: i64) -> i64 {
    parts.iter().fold(0, |acc, part| acc * base + part)
}

/// [`digits`] over generated values.
fn emit_digits(cx: &mut ExprContext<'_>, parts: Vec<TypedExpr>, base: i64) -> CodegenResult<TypedExpr> {
    let mut acc = cx.constant_i64(0);
    for part in parts {
        let base = cx.constant_i64(base);
        let scaled = cx.bin_op(acc, BinaryOperator::Mul, base)?;
        acc = cx.bin_op(scaled, BinaryOperator::Add, part)?;
    }
    Ok(acc)
}

/// Sum of `term(i)` over every index of `list`, as a runtime loop.
fn sum_over<F>(cx: &mut ExprContext<'_>, list: &TypedExpr, term: F) -> CodegenResult<TypedExpr>
where
    F: FnOnce(&mut ExprContext<'_>, TypedExpr) -> CodegenResult<TypedExpr>,
{
    let int64 = cx.numeric(NumericType::Int64);
    let total = cx.push_pod(&int64, NativeExpr::i64(0))?;
    let total = cx.ensure_reference(total)?;
    let len = cx.len(list.clone())?;
    let count = cx.load(&len)?;
    let target = total.clone();
    cx.loop_count(count, |cx, i| {
        let index = TypedExpr::value(i, int64);
        let value = term(cx, index)?;
        let sum = cx.bin_op(target.clone(), BinaryOperator::Add, value)?;
        cx.store_pod(&target, &sum)
    })?;
    Ok(total)
}

fn int64_list(cx: &mut ExprContext<'_>, values: &[i64]) -> CodegenResult<TypedExpr> {
    let list = cx.wrapper(&TypeRepr::list_of(TypeRepr::INT64))?;
    let list = cx.type_call(&list, vec![])?;
    for &value in values {
        let value = cx.constant_i64(value);
        cx.method_call(list.clone(), "append", vec![value])?;
    }
    Ok(list)
}

/// A list of the strings `"0"`, `"1"`, ...
fn string_list(cx: &mut ExprContext<'_>, len: usize) -> CodegenResult<TypedExpr> {
    let list = cx.wrapper(&TypeRepr::list_of(TypeRepr::Str))?;
    let list = cx.type_call(&list, vec![])?;
    for i in 0..len {
        let text = cx.constant_str(&i.to_string())?;
        cx.method_call(list.clone(), "append", vec![text])?;
    }
    Ok(list)
}

fn sum_of(cx: &mut ExprContext<'_>, list: &TypedExpr) -> CodegenResult<TypedExpr> {
    let items = list.clone();
    sum_over(cx, list, move |cx, index| cx.getitem(items, index))
}

#[derive(Clone, Debug)]
enum ListStep {
    Append,
    Resize(i64),
    Pop,
    Reserve(i64),
}

fn list_steps() -> impl Strategy<Value = Vec<ListStep>> {
    let step = prop_oneof![
        3 => Just(ListStep::Append),
        1 => (0i64..16).prop_map(ListStep::Resize),
        2 => Just(ListStep::Pop),
        1 => (0i64..24).prop_map(ListStep::Reserve),
    ];
    proptest::collection::vec(step, 0..30)
}

/// Operations on `Shared` handles that all alias one payload. Scopes
/// destroy the copies made inside them; retains are released by the
/// end of the scope that made them.
#[derive(Clone, Debug)]
enum HandleStep {
    Copy(usize),
    Assign(usize, usize),
    Retain(usize),
    Release(usize),
    Scope(Vec<HandleStep>),
}

fn handle_steps() -> impl Strategy<Value = Vec<HandleStep>> {
    let leaf = prop_oneof![
        any::<usize>().prop_map(HandleStep::Copy),
        (any::<usize>(), any::<usize>()).prop_map(|(from, to)| HandleStep::Assign(from, to)),
        any::<usize>().prop_map(HandleStep::Retain),
        any::<usize>().prop_map(HandleStep::Release),
    ];
    let step = leaf.prop_recursive(3, 32, 6, |inner| {
        proptest::collection::vec(inner, 0..6).prop_map(HandleStep::Scope)
    });
    proptest::collection::vec(step, 0..12)
}

fn emit_handle_steps(
    cx: &mut ExprContext<'_>,
    steps: &[HandleStep],
    handles: &mut Vec<TypedExpr>,
) -> CodegenResult<()> {
    let mut retained = Vec::new();
    for step in steps {
        let n = handles.len();
        match step {
            HandleStep::Copy(from) => {
                let copy = cx.push_copy(&handles[from % n])?;
                handles.push(copy);
            }
            HandleStep::Assign(from, to) => cx.assign(&handles[to % n], &handles[from % n])?,
            HandleStep::Retain(at) => {
                let handle = handles[at % n].clone();
                cx.incref(&handle)?;
                retained.push(handle);
            }
            HandleStep::Release(at) => {
                if !retained.is_empty() {
                    let handle = retained.swap_remove(at % retained.len());
                    cx.destroy(&handle)?;
                }
            }
            HandleStep::Scope(inner) => {
                cx.if_true(NativeExpr::bool(true), |cx| emit_handle_steps(cx, inner, handles))?;
                handles.truncate(n);
            }
        }
    }
    for handle in retained {
        cx.destroy(&handle)?;
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn growth_always_makes_room(length in 0i64..1_000_000) {
        let policy = GrowthPolicy::default();
        let next = policy.next_capacity(length);
        prop_assert!(next > length);
        prop_assert!(policy.next_capacity(length + 1) >= next);
    }

    #[test]
    fn promotion_is_a_symmetric_widening(a in numeric_type(), b in numeric_type()) {
        let joined = promote(a, b);
        prop_assert_eq!(joined, promote(b, a));
        prop_assert_eq!(promote(a, a), a);
        prop_assert!(is_implicit_widening(a, joined), "{a:?} -> {joined:?}");
        prop_assert!(is_implicit_widening(b, joined), "{b:?} -> {joined:?}");
    }

    #[test]
    fn int8_addition_wraps(a in any::<i8>(), b in any::<i8>()) {
        let module = compile(&[TypeRepr::INT8, TypeRepr::INT8], Some(&TypeRepr::INT8), |cx, args| {
            cx.bin_op(args[0].clone(), BinaryOperator::Add, args[1].clone()).map(Some)
        });
        let args = [
            Value::int(i128::from(a), &NativeType::I8),
            Value::int(i128::from(b), &NativeType::I8),
        ];
        let result = run(&module, &args).unwrap();
        prop_assert_eq!(result.as_i128(), Some(i128::from(a.wrapping_add(b))));
    }

    #[test]
    fn floor_division_rounds_down(
        a in i64::from(i32::MIN)..=i64::from(i32::MAX),
        b in (i64::from(i32::MIN)..=i64::from(i32::MAX)).prop_filter("nonzero", |b| *b != 0),
    ) {
        let module = compile(&[TypeRepr::INT64, TypeRepr::INT64], Some(&TypeRepr::INT64), |cx, args| {
            cx.bin_op(args[0].clone(), BinaryOperator::FloorDiv, args[1].clone()).map(Some)
        });
        let result = run(&module, &[Value::i64(a), Value::i64(b)]).unwrap();
        prop_assert_eq!(result, Value::i64(floor_div(a, b)));
    }

    #[test]
    fn appended_lists_hold_every_value(values in proptest::collection::vec(-1000i64..1000, 0..40)) {
        let expected_len = values.len() as i64;
        let expected_sum: i64 = values.iter().sum();
        let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
            let list = int64_list(cx, &values)?;
            let total = sum_of(cx, &list)?;
            let len = cx.len(list)?;
            let million = cx.constant_i64(1_000_000);
            let scaled = cx.bin_op(len, BinaryOperator::Mul, million)?;
            cx.bin_op(scaled, BinaryOperator::Add, total).map(Some)
        });
        let result = run(&module, &[]).unwrap();
        prop_assert_eq!(result, Value::i64(expected_len * 1_000_000 + expected_sum));
    }

    #[test]
    fn signed_modulo_truncates_like_native_remainder(t in signed_type(), a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(!is_zero_in(t, b));
        prop_assert_eq!(remainder(t, a, b), Some(native_remainder(t, a, b)), "{} % {} in {}", a, b, t);
    }

    #[test]
    fn unsigned_modulo_matches_native_remainder(t in unsigned_type(), a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(!is_zero_in(t, b));
        prop_assert_eq!(remainder(t, a, b), Some(native_remainder(t, a, b)), "{} % {} in {}", a, b, t);
    }

    #[test]
    fn resizing_twice_matches_resizing_once(initial in 0usize..8, size in 0i64..12) {
        let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
            let once = string_list(cx, initial)?;
            let twice = string_list(cx, initial)?;
            let count = cx.constant_i64(size);
            cx.method_call(once.clone(), "resize", vec![count])?;
            for _ in 0..2 {
                let count = cx.constant_i64(size);
                cx.method_call(twice.clone(), "resize", vec![count])?;
            }

            let int64 = cx.numeric(NumericType::Int64);
            let (left, right) = (once.clone(), twice.clone());
            let mismatches = sum_over(cx, &once, move |cx, index| {
                let a = cx.getitem(left, index.clone())?;
                let b = cx.getitem(right, index)?;
                let differs = cx.bin_op(a, BinaryOperator::NotEq, b)?;
                cx.convert_to(differs, &int64, true)
            })?;
            let once_len = cx.len(once)?;
            let twice_len = cx.len(twice)?;
            emit_digits(cx, vec![mismatches, once_len, twice_len], 100).map(Some)
        });
        prop_assert_eq!(run(&module, &[]).unwrap(), Value::i64(digits(&[0, size, size], 100)));
    }

    #[test]
    fn popping_minus_one_pops_the_last_index(values in proptest::collection::vec(0i64..100, 1..20)) {
        let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
            let from_end = int64_list(cx, &values)?;
            let by_index = int64_list(cx, &values)?;
            let minus_one = cx.constant_i64(-1);
            let a = cx.method_call(from_end.clone(), "pop", vec![minus_one])?;
            let len = cx.len(by_index.clone())?;
            let one = cx.constant_i64(1);
            let last = cx.bin_op(len, BinaryOperator::Sub, one)?;
            let b = cx.method_call(by_index.clone(), "pop", vec![last])?;
            let from_end_len = cx.len(from_end)?;
            let by_index_len = cx.len(by_index)?;
            emit_digits(cx, vec![a, b, from_end_len, by_index_len], 100).map(Some)
        });
        let last = values[values.len() - 1];
        let len = values.len() as i64 - 1;
        prop_assert_eq!(run(&module, &[]).unwrap(), Value::i64(digits(&[last, last, len, len], 100)));
    }

    #[test]
    fn pop_then_append_restores_the_list(values in proptest::collection::vec(0i64..100, 1..20)) {
        let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
            let list = int64_list(cx, &values)?;
            let popped = cx.method_call(list.clone(), "pop", vec![])?;
            cx.method_call(list.clone(), "append", vec![popped])?;
            let len = cx.len(list.clone())?;
            let sum = sum_of(cx, &list)?;
            let minus_one = cx.constant_i64(-1);
            let last = cx.getitem(list, minus_one)?;
            emit_digits(cx, vec![len, sum, last], 10_000).map(Some)
        });
        let expected = digits(
            &[values.len() as i64, values.iter().sum(), values[values.len() - 1]],
            10_000,
        );
        prop_assert_eq!(run(&module, &[]).unwrap(), Value::i64(expected));
    }

    #[test]
    fn length_never_exceeds_reserved(steps in list_steps()) {
        let mut len = 0i64;
        let mut checks = 0i64;
        let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
            let int64 = cx.numeric(NumericType::Int64);
            let list = string_list(cx, 0)?;
            let within = cx.push_pod(&int64, NativeExpr::i64(0))?;
            let within = cx.ensure_reference(within)?;
            for step in &steps {
                match step {
                    ListStep::Append => {
                        let text = cx.constant_str("item")?;
                        cx.method_call(list.clone(), "append", vec![text])?;
                        len += 1;
                    }
                    ListStep::Resize(size) => {
                        let size_expr = cx.constant_i64(*size);
                        cx.method_call(list.clone(), "resize", vec![size_expr])?;
                        len = *size;
                    }
                    ListStep::Pop if len == 0 => continue,
                    ListStep::Pop => {
                        cx.method_call(list.clone(), "pop", vec![])?;
                        len -= 1;
                    }
                    ListStep::Reserve(count) => {
                        let count = cx.constant_i64(*count);
                        cx.method_call(list.clone(), "reserve", vec![count])?;
                    }
                }
                let current = cx.len(list.clone())?;
                let reserved = cx.method_call(list.clone(), "reserved", vec![])?;
                let fits = cx.bin_op(current, BinaryOperator::LtE, reserved)?;
                let fits = cx.convert_to(fits, &int64, true)?;
                let total = cx.bin_op(within.clone(), BinaryOperator::Add, fits)?;
                cx.store_pod(&within, &total)?;
                checks += 1;
            }
            let final_len = cx.len(list)?;
            emit_digits(cx, vec![within, final_len], 1000).map(Some)
        });
        prop_assert_eq!(run(&module, &[]).unwrap(), Value::i64(digits(&[checks, len], 1000)));
    }

    #[test]
    fn balanced_handle_traffic_destroys_the_payload_once(steps in handle_steps()) {
        let mut live = 0i64;
        let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
            let counter = TypeRepr::shared(TypeRepr::INT64);
            let field = counter.clone();
            let tracker = cx.factory().declare_composite(
                CompositeDef::new("Tracker", move |b: &mut FieldListBuilder<'_>| {
                    b.add("destroyed", &field)?;
                    Ok(())
                })
                .with_lifecycle(Lifecycle::Destructor, |cx, args| {
                    let destroyed = cx.attribute(args[0].clone(), "destroyed")?;
                    let value = cx.method_call(destroyed.clone(), "get", vec![])?;
                    let one = cx.constant_i64(1);
                    let next = cx.bin_op(value, BinaryOperator::Add, one)?;
                    cx.method_call(destroyed, "set", vec![next])?;
                    Ok(None)
                }),
            );

            let int64 = cx.numeric(NumericType::Int64);
            let counter = cx.wrapper(&counter)?;
            let zero = cx.constant_i64(0);
            let destroyed = cx.type_call(&counter, vec![zero])?;
            let refs = cx.push_pod(&int64, NativeExpr::i64(0))?;
            let refs = cx.ensure_reference(refs)?;

            let shared = cx.wrapper(&TypeRepr::shared(tracker))?;
            let (target, count) = (refs.clone(), destroyed.clone());
            cx.if_true(NativeExpr::bool(true), |cx| {
                let first = cx.type_call(&shared, vec![])?;
                let payload = cx.method_call(first.clone(), "get", vec![])?;
                cx.set_attribute(payload, "destroyed", count)?;
                let mut handles = vec![first];
                emit_handle_steps(cx, &steps, &mut handles)?;
                live = handles.len() as i64;
                let current = cx.method_call(handles[0].clone(), "refcount", vec![])?;
                cx.store_pod(&target, &current)
            })?;

            let counter_refs = cx.method_call(destroyed.clone(), "refcount", vec![])?;
            let destroyed = cx.method_call(destroyed, "get", vec![])?;
            emit_digits(cx, vec![refs, counter_refs, destroyed], 100).map(Some)
        });
        prop_assert_eq!(run(&module, &[]).unwrap(), Value::i64(digits(&[live, 1, 1], 100)));
    }
}
