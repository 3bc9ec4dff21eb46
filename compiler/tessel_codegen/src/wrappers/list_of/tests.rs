#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use tessel_exec::{ExecError, ExecResult, Machine, Value};
use tessel_native::{BinaryOperator, ErrorCategory};

use super::*;
use crate::converter::Converter;
use crate::options::CodegenOptions;

fn int64_list(cx: &mut ExprContext<'_>) -> CodegenResult<TypedExpr> {
    let list = cx.wrapper(&TypeRepr::list_of(TypeRepr::INT64))?;
    cx.type_call(&list, vec![])
}

/// Append `0, 10, 20, ...` to `list`.
fn append_tens(cx: &mut ExprContext<'_>, list: &TypedExpr, count: i64) -> CodegenResult<()> {
    for i in 0..count {
        let value = cx.constant_i64(i * 10);
        cx.method_call(list.clone(), "append", vec![value])?;
    }
    Ok(())
}

/// Compile a function of one `Int64` returning `Int64`, run it on `arg`
/// and check that nothing leaked.
fn run_int<G>(options: CodegenOptions, arg: i64, body: G) -> ExecResult<Value>
where
    G: FnOnce(&mut ExprContext<'_>, &[TypedExpr]) -> CodegenResult<Option<TypedExpr>>,
{
    let mut converter = Converter::new(options);
    converter
        .define_function("f", &[TypeRepr::INT64], Some(&TypeRepr::INT64), body)
        .unwrap();
    let module = converter.into_module();
    assert_eq!(module.verify(), Ok(()));
    let mut machine = Machine::new(&module);
    let result = machine.call_by_name("f", &[Value::i64(arg)]);
    if result.is_ok() {
        assert_eq!(machine.heap().live(), 0, "leaked heap blocks");
    }
    result
}

fn raised(result: ExecResult<Value>) -> (ErrorCategory, String) {
    match result {
        Err(ExecError::Raised { category, message }) => (category, message),
        other => panic!("expected a raised error, got {other:?}"),
    }
}

#[test]
fn header_layout_matches_field_offsets() {
    let layout = header_layout();
    assert_eq!(layout.size(), HEADER_SIZE);
    assert_eq!(
        layout.field_offsets(),
        vec![0, HASH_CACHE, LENGTH, RESERVED, DATA]
    );
}

#[test]
fn append_then_index() {
    let result = run_int(CodegenOptions::default(), 2, |cx, args| {
        let list = int64_list(cx)?;
        append_tens(cx, &list, 5)?;
        let element = cx.getitem(list.clone(), args[0].clone())?;
        let len = cx.len(list)?;
        let hundred = cx.constant_i64(100);
        let scaled = cx.bin_op(len, BinaryOperator::Mul, hundred)?;
        cx.bin_op(scaled, BinaryOperator::Add, element).map(Some)
    });
    assert_eq!(result.unwrap(), Value::i64(520));
}

#[test]
fn negative_indices_count_from_the_end() {
    let result = run_int(CodegenOptions::default(), -1, |cx, args| {
        let list = int64_list(cx)?;
        append_tens(cx, &list, 3)?;
        cx.getitem(list, args[0].clone()).map(Some)
    });
    assert_eq!(result.unwrap(), Value::i64(20));
}

#[test]
fn out_of_range_index_raises() {
    for index in [3, -4] {
        let result = run_int(CodegenOptions::default(), index, |cx, args| {
            let list = int64_list(cx)?;
            append_tens(cx, &list, 3)?;
            cx.getitem(list, args[0].clone()).map(Some)
        });
        assert_eq!(
            raised(result),
            (ErrorCategory::IndexError, "list index out of range".to_owned())
        );
    }
}

#[test]
fn setitem_replaces_an_element() {
    let result = run_int(CodegenOptions::default(), 1, |cx, args| {
        let list = int64_list(cx)?;
        append_tens(cx, &list, 3)?;
        let value = cx.constant_i64(7);
        cx.setitem(list.clone(), args[0].clone(), value)?;
        let index = cx.constant_i64(1);
        cx.getitem(list, index).map(Some)
    });
    assert_eq!(result.unwrap(), Value::i64(7));
}

#[test]
fn growth_follows_the_policy() {
    let result = run_int(CodegenOptions::default(), 0, |cx, _| {
        let list = int64_list(cx)?;
        append_tens(cx, &list, 10)?;
        cx.method_call(list, "reserved", vec![]).map(Some)
    });
    // 0 -> 1 -> 2 -> 3 -> 4 -> 6 -> 8 -> 11
    assert_eq!(result.unwrap(), Value::i64(11));

    let doubling = GrowthPolicy::new(2, 1, 1).unwrap();
    let result = run_int(CodegenOptions::default().with_growth(doubling), 0, |cx, _| {
        let list = int64_list(cx)?;
        append_tens(cx, &list, 4)?;
        cx.method_call(list, "reserved", vec![]).map(Some)
    });
    assert_eq!(result.unwrap(), Value::i64(7));
}

#[test]
fn growth_policies_must_grow() {
    for (numerator, denominator, increment) in [(1, 1, 0), (1, 2, 5), (3, 0, 1), (-2, -1, 1)] {
        assert_eq!(
            GrowthPolicy::new(numerator, denominator, increment).unwrap_err(),
            CodegenError::InvalidGrowthPolicy {
                numerator,
                denominator,
                increment,
            }
        );
    }
    let unit = GrowthPolicy::new(1, 1, 1).unwrap();
    for length in [0, 1, 7, 1 << 40] {
        assert_eq!(unit.next_capacity(length), length + 1);
    }
    assert_eq!(GrowthPolicy::new(5, 4, 1).unwrap(), GrowthPolicy::default());
}

#[test]
fn reserve_never_drops_live_elements() {
    let result = run_int(CodegenOptions::default(), 0, |cx, _| {
        let list = int64_list(cx)?;
        append_tens(cx, &list, 4)?;
        let many = cx.constant_i64(100);
        cx.method_call(list.clone(), "reserve", vec![many])?;
        let one = cx.constant_i64(1);
        cx.method_call(list.clone(), "reserve", vec![one])?;
        cx.method_call(list, "reserved", vec![]).map(Some)
    });
    assert_eq!(result.unwrap(), Value::i64(4));
}

#[test]
fn pop_removes_and_returns() {
    let result = run_int(CodegenOptions::default(), 0, |cx, args| {
        let list = int64_list(cx)?;
        append_tens(cx, &list, 4)?;
        let first = cx.method_call(list.clone(), "pop", vec![args[0].clone()])?;
        let last = cx.method_call(list.clone(), "pop", vec![])?;
        let remaining = cx.index_sum(&list)?;
        // first = 0, last = 30, remaining = 10 + 20
        let hundred = cx.constant_i64(100);
        let last = cx.bin_op(last, BinaryOperator::Mul, hundred)?;
        let total = cx.bin_op(first, BinaryOperator::Add, last)?;
        cx.bin_op(total, BinaryOperator::Add, remaining).map(Some)
    });
    assert_eq!(result.unwrap(), Value::i64(3030));
}

#[test]
fn pop_from_empty_raises() {
    let result = run_int(CodegenOptions::default(), 0, |cx, _| {
        let list = int64_list(cx)?;
        cx.method_call(list, "pop", vec![]).map(Some)
    });
    assert_eq!(
        raised(result),
        (ErrorCategory::IndexError, "pop index out of range".to_owned())
    );
}

#[test]
fn resize_fills_and_truncates() {
    let result = run_int(CodegenOptions::default(), 5, |cx, args| {
        let list = int64_list(cx)?;
        append_tens(cx, &list, 2)?;
        let fill = cx.constant_i64(3);
        cx.method_call(list.clone(), "resize", vec![args[0].clone(), fill])?;
        let grown = cx.index_sum(&list)?;
        let one = cx.constant_i64(1);
        cx.method_call(list.clone(), "resize", vec![one])?;
        let len = cx.len(list)?;
        // grown = 0 + 10 + 3 * 3
        let thousand = cx.constant_i64(1000);
        let len = cx.bin_op(len, BinaryOperator::Mul, thousand)?;
        cx.bin_op(len, BinaryOperator::Add, grown).map(Some)
    });
    assert_eq!(result.unwrap(), Value::i64(1019));
}

#[test]
fn resize_to_a_negative_length_raises() {
    let result = run_int(CodegenOptions::default(), -1, |cx, args| {
        let list = int64_list(cx)?;
        cx.method_call(list.clone(), "resize", vec![args[0].clone()])?;
        cx.len(list).map(Some)
    });
    assert_eq!(
        raised(result),
        (
            ErrorCategory::ValueError,
            "can't resize a list to a negative length".to_owned()
        )
    );
}

#[test]
fn clear_keeps_the_list_usable() {
    let result = run_int(CodegenOptions::default(), 0, |cx, _| {
        let list = int64_list(cx)?;
        append_tens(cx, &list, 3)?;
        cx.method_call(list.clone(), "clear", vec![])?;
        append_tens(cx, &list, 2)?;
        cx.len(list).map(Some)
    });
    assert_eq!(result.unwrap(), Value::i64(2));
}

#[test]
fn construction_from_a_list_duplicates() {
    let result = run_int(CodegenOptions::default(), 0, |cx, _| {
        let original = int64_list(cx)?;
        append_tens(cx, &original, 3)?;
        let wrapper = original.wrapper.clone();
        let copy = cx.type_call(&wrapper, vec![original.clone()])?;
        append_tens(cx, &copy, 2)?;
        let original_len = cx.len(original)?;
        let copy_len = cx.len(copy)?;
        let ten = cx.constant_i64(10);
        let scaled = cx.bin_op(original_len, BinaryOperator::Mul, ten)?;
        cx.bin_op(scaled, BinaryOperator::Add, copy_len).map(Some)
    });
    assert_eq!(result.unwrap(), Value::i64(35));
}

#[test]
fn string_elements_are_released() {
    let mut converter = Converter::default();
    let strings = TypeRepr::list_of(TypeRepr::Str);
    converter
        .define_function("f", &[], Some(&TypeRepr::Str), |cx, _| {
            let wrapper = cx.wrapper(&strings)?;
            let list = cx.type_call(&wrapper, vec![])?;
            for word in ["alpha", "beta", "gamma"] {
                let word = cx.constant_str(word)?;
                cx.method_call(list.clone(), "append", vec![word])?;
            }
            let first = cx.constant_i64(0);
            let first = cx.getitem(list.clone(), first)?;
            let popped = cx.method_call(list.clone(), "pop", vec![])?;
            let joined = cx.bin_op(first, BinaryOperator::Add, popped)?;
            let two = cx.constant_i64(2);
            cx.method_call(list, "resize", vec![two])?;
            Ok(Some(joined))
        })
        .unwrap();
    let module = converter.into_module();
    let mut machine = Machine::new(&module);
    let text = machine.call_by_name("f", &[]).unwrap().as_ptr().unwrap();
    assert_eq!(machine.read_str(text).unwrap(), "alphagamma");
    machine.release_str(text).unwrap();
    assert_eq!(machine.heap().live(), 0);
}

#[test]
fn nested_lists_release_their_children() {
    let mut converter = Converter::default();
    let outer = TypeRepr::list_of(TypeRepr::list_of(TypeRepr::INT64));
    converter
        .define_function("f", &[], Some(&TypeRepr::INT64), |cx, _| {
            let outer_wrapper = cx.wrapper(&outer)?;
            let lists = cx.type_call(&outer_wrapper, vec![])?;
            for _ in 0..3 {
                let inner = int64_list(cx)?;
                append_tens(cx, &inner, 2)?;
                cx.method_call(lists.clone(), "append", vec![inner])?;
            }
            let index = cx.constant_i64(1);
            let inner = cx.getitem(lists, index)?;
            cx.len(inner).map(Some)
        })
        .unwrap();
    let module = converter.into_module();
    let mut machine = Machine::new(&module);
    assert_eq!(machine.call_by_name("f", &[]).unwrap(), Value::i64(2));
    assert_eq!(machine.heap().live(), 0);
}

#[test]
fn helpers_are_generated_once_per_element_type() {
    let mut converter = Converter::default();
    converter
        .define_function("f", &[], None, |cx, _| {
            let a = int64_list(cx)?;
            append_tens(cx, &a, 3)?;
            let b = int64_list(cx)?;
            append_tens(cx, &b, 3)?;
            Ok(None)
        })
        .unwrap();
    let list = converter
        .wrapper(&TypeRepr::list_of(TypeRepr::INT64))
        .unwrap();
    let registry = converter.registry();
    for operation in ["append", "reserve", "release"] {
        let key = FunctionKey::new(operation, [list.clone()]);
        assert!(registry.lookup(&key).is_some(), "missing {operation}");
    }
    // entry, append, reserve, release
    assert_eq!(registry.len(), 4);
}

#[test]
fn wrong_arity_and_unknown_methods_are_static_errors() {
    let mut converter = Converter::default();
    let err = converter
        .define_function("f", &[], None, |cx, _| {
            let list = int64_list(cx)?;
            cx.method_call(list, "append", vec![])?;
            Ok(None)
        })
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "TypeError: Can't call ListOf(Int64).append with args of type ()"
    );

    let err = converter
        .define_function("g", &[], None, |cx, _| {
            let list = int64_list(cx)?;
            cx.attribute(list, "sort")?;
            Ok(None)
        })
        .unwrap_err();
    assert_eq!(err.category(), ErrorCategory::AttributeError);
}

#[test]
fn elements_convert_implicitly_only() {
    let mut converter = Converter::default();
    let err = converter
        .define_function("f", &[TypeRepr::FLOAT64], None, |cx, args| {
            let list = int64_list(cx)?;
            cx.method_call(list, "append", vec![args[0].clone()])?;
            Ok(None)
        })
        .unwrap_err();
    assert!(matches!(err, CodegenError::Unconvertible { .. }));
}

/// Sum of the elements of an `Int64` list, as a runtime loop.
trait IndexSum {
    fn index_sum(&mut self, list: &TypedExpr) -> CodegenResult<TypedExpr>;
}

impl IndexSum for ExprContext<'_> {
    fn index_sum(&mut self, list: &TypedExpr) -> CodegenResult<TypedExpr> {
        let int64 = self.numeric(NumericType::Int64);
        let zero = self.constant_i64(0);
        let total = self.push_copy(&zero)?;
        let len = self.len(list.clone())?;
        let len = self.load(&len)?;
        self.loop_count(len, |cx, i| {
            let index = TypedExpr::value(i, int64.clone());
            let element = cx.getitem(list.clone(), index)?;
            let sum = cx.bin_op(total.clone(), BinaryOperator::Add, element)?;
            cx.assign(&total, &sum)
        })?;
        Ok(total)
    }
}
