use pretty_assertions::assert_eq;
use tessel_codegen::{CodegenError, NumericType, TypeRepr};
use tessel_exec::{Machine, Value};
use tessel_native::{BinaryOperator, ErrorCategory};

use crate::common::{assert_leak_free, compile, compile_error, raised, run, unsupported};

fn pair() -> TypeRepr {
    TypeRepr::Tuple(vec![TypeRepr::INT64, TypeRepr::FLOAT64])
}

fn triple() -> TypeRepr {
    TypeRepr::Tuple(vec![TypeRepr::INT64; 3])
}

#[test]
fn construction_and_constant_indexing() {
    let module = compile(
        &[TypeRepr::INT64, TypeRepr::FLOAT64],
        Some(&TypeRepr::FLOAT64),
        |cx, args| {
            let pair = cx.wrapper(&pair())?;
            let value = cx.type_call(&pair, args.to_vec())?;
            let zero = cx.constant_i64(0);
            let first = cx.getitem(value.clone(), zero)?;
            let last = cx.constant_i64(-1);
            let second = cx.getitem(value, last)?;
            cx.bin_op(first, BinaryOperator::Add, second).map(Some)
        },
    );
    assert_eq!(
        run(&module, &[Value::i64(3), Value::f64(2.5)]).unwrap(),
        Value::f64(5.5)
    );
}

#[test]
fn construction_converts_explicitly() {
    let module = compile(&[TypeRepr::FLOAT64], Some(&TypeRepr::INT64), |cx, args| {
        let pair = cx.wrapper(&pair())?;
        let value = cx.type_call(&pair, vec![args[0].clone(), args[0].clone()])?;
        let zero = cx.constant_i64(0);
        cx.getitem(value, zero).map(Some)
    });
    assert_eq!(run(&module, &[Value::f64(7.9)]).unwrap(), Value::i64(7));
}

#[test]
fn constant_indices_are_checked_statically() {
    let (category, message) = unsupported(compile_error(&[], None, |cx, _| {
        let pair = cx.wrapper(&pair())?;
        let value = cx.type_call(&pair, vec![])?;
        let two = cx.constant_i64(2);
        cx.getitem(value, two)?;
        Ok(None)
    }));
    assert_eq!(category, ErrorCategory::IndexError);
    assert_eq!(
        message,
        "tuple index out of range: index 2 of 'Tuple(Int64, Float64)'"
    );
}

#[test]
fn homogeneous_tuples_index_at_runtime() {
    let module = compile(&[TypeRepr::INT64], Some(&TypeRepr::INT64), |cx, args| {
        let triple = cx.wrapper(&triple())?;
        let items = [10, 20, 30].map(|v| cx.constant_i64(v)).to_vec();
        let value = cx.type_call(&triple, items)?;
        cx.getitem(value, args[0].clone()).map(Some)
    });
    for (index, expected) in [(0, 10), (2, 30), (-1, 30), (-3, 10)] {
        assert_eq!(
            run(&module, &[Value::i64(index)]).unwrap(),
            Value::i64(expected),
            "index {index}"
        );
    }
    for index in [3, -4, i64::MAX] {
        assert_eq!(
            raised(run(&module, &[Value::i64(index)])),
            (ErrorCategory::IndexError, "tuple index out of range".to_owned())
        );
    }
}

#[test]
fn heterogeneous_tuples_index_to_objects() {
    let module = compile(&[TypeRepr::INT64], Some(&TypeRepr::Dynamic), |cx, args| {
        let mixed = cx.wrapper(&TypeRepr::Tuple(vec![TypeRepr::INT64, TypeRepr::BOOL]))?;
        let four = cx.constant_i64(4);
        let yes = cx.constant_bool(true);
        let value = cx.type_call(&mixed, vec![four, yes])?;
        cx.getitem(value, args[0].clone()).map(Some)
    });
    for (index, expected) in [(0, "4"), (1, "True"), (-2, "4")] {
        let mut machine = Machine::new(&module);
        let handle = machine
            .call_by_name("f", &[Value::i64(index)])
            .unwrap()
            .as_ptr()
            .unwrap();
        assert_eq!(machine.describe(handle).unwrap(), expected);
        machine.dyn_release(handle).unwrap();
        assert_leak_free(&machine);
    }
}

#[test]
fn unboxable_elements_need_constant_indices() {
    let err = compile_error(&[TypeRepr::INT64], None, |cx, args| {
        let mixed = cx.wrapper(&TypeRepr::Tuple(vec![
            TypeRepr::INT64,
            TypeRepr::cell(TypeRepr::INT64),
        ]))?;
        let value = cx.type_call(&mixed, vec![])?;
        cx.getitem(value, args[0].clone())?;
        Ok(None)
    });
    assert!(matches!(
        err,
        CodegenError::Unsupported {
            category: ErrorCategory::TypeError,
            ..
        }
    ));
}

#[test]
fn length_and_truth_are_constant() {
    let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
        let triple = cx.wrapper(&triple())?;
        let value = cx.type_call(&triple, vec![])?;
        let len = cx.len(value.clone())?;
        assert_eq!(len.as_constant_int(), Some(3));
        let truth = cx.bool_cast(value)?;
        assert_eq!(truth.as_constant_int(), Some(1));

        let unit = cx.wrapper(&TypeRepr::Tuple(vec![]))?;
        let unit = cx.type_call(&unit, vec![])?;
        let empty = cx.bool_cast(unit)?;
        assert_eq!(empty.as_constant_int(), Some(0));
        Ok(Some(len))
    });
    assert_eq!(run(&module, &[]).unwrap(), Value::i64(3));
}

#[test]
fn equality_is_element_wise() {
    let named = TypeRepr::Tuple(vec![TypeRepr::INT64, TypeRepr::Str]);
    let module = compile(&[TypeRepr::INT64], Some(&TypeRepr::INT64), |cx, args| {
        let named = cx.wrapper(&named)?;
        let label = cx.constant_str("seven")?;
        let lhs = cx.type_call(&named, vec![args[0].clone(), label])?;
        let seven = cx.constant_i64(7);
        let label = cx.constant_str("seven")?;
        let rhs = cx.type_call(&named, vec![seven, label])?;

        let copy = cx.push_copy(&lhs)?;
        let equal = cx.bin_op(copy, BinaryOperator::Eq, rhs.clone())?;
        let different = cx.bin_op(lhs, BinaryOperator::NotEq, rhs)?;
        let int64 = cx.numeric(NumericType::Int64);
        let equal = cx.convert_to(equal, &int64, true)?;
        let different = cx.convert_to(different, &int64, true)?;
        let ten = cx.constant_i64(10);
        let equal = cx.bin_op(equal, BinaryOperator::Mul, ten)?;
        cx.bin_op(equal, BinaryOperator::Add, different).map(Some)
    });
    assert_eq!(run(&module, &[Value::i64(7)]).unwrap(), Value::i64(10));
    assert_eq!(run(&module, &[Value::i64(8)]).unwrap(), Value::i64(1));
}

#[test]
fn constructor_arity_is_checked() {
    let err = compile_error(&[], None, |cx, _| {
        let pair = cx.wrapper(&pair())?;
        let one = cx.constant_i64(1);
        cx.type_call(&pair, vec![one])?;
        Ok(None)
    });
    assert_eq!(
        err.to_string(),
        "can't construct `Tuple(Int64, Float64)` from 1 arguments: expected 0 or 2"
    );
}
