use pretty_assertions::assert_eq;
use tessel_codegen::{NumericType, TypeRepr};
use tessel_exec::{Machine, Value};
use tessel_native::{BinaryOperator, ErrorCategory};

use crate::common::{assert_leak_free, compile, compile_error, raised, run, run_str, unsupported};

#[test]
fn concatenation_makes_a_new_string() {
    let module = compile(&[], Some(&TypeRepr::Str), |cx, _| {
        let mut text = cx.constant_str("")?;
        for piece in ["a", "b", "cd"] {
            let piece = cx.constant_str(piece)?;
            text = cx.bin_op(text, BinaryOperator::Add, piece)?;
        }
        Ok(Some(text))
    });
    assert_eq!(run_str(&module, &[]).unwrap(), "abcd");
}

#[test]
fn equality_compares_contents() {
    let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
        let int64 = cx.numeric(NumericType::Int64);
        let mut total = cx.constant_i64(0);
        let cases = [
            ("abc", BinaryOperator::Eq, 1),
            ("abd", BinaryOperator::Eq, 2),
            ("abd", BinaryOperator::NotEq, 4),
            ("abc", BinaryOperator::NotEq, 8),
        ];
        for (other, op, weight) in cases {
            let prefix = cx.constant_str("ab")?;
            let suffix = cx.constant_str("c")?;
            let built = cx.bin_op(prefix, BinaryOperator::Add, suffix)?;
            let other = cx.constant_str(other)?;
            let result = cx.bin_op(built, op, other)?;
            let result = cx.convert_to(result, &int64, true)?;
            let weight = cx.constant_i64(weight);
            let weighted = cx.bin_op(result, BinaryOperator::Mul, weight)?;
            total = cx.bin_op(total, BinaryOperator::Add, weighted)?;
        }
        Ok(Some(total))
    });
    assert_eq!(run(&module, &[]).unwrap(), Value::i64(5));
}

#[test]
fn length_counts_bytes() {
    let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
        let text = cx.constant_str("héllo")?;
        cx.len(text).map(Some)
    });
    assert_eq!(run(&module, &[]).unwrap(), Value::i64(6));
}

#[test]
fn only_the_empty_string_is_false() {
    let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
        let int64 = cx.numeric(NumericType::Int64);
        let empty = cx.constant_str("")?;
        let empty = cx.bool_cast(empty)?;
        let empty = cx.convert_to(empty, &int64, true)?;
        let full = cx.constant_str(" ")?;
        let full = cx.bool_cast(full)?;
        let full = cx.convert_to(full, &int64, true)?;
        let ten = cx.constant_i64(10);
        let empty = cx.bin_op(empty, BinaryOperator::Mul, ten)?;
        cx.bin_op(empty, BinaryOperator::Add, full).map(Some)
    });
    assert_eq!(run(&module, &[]).unwrap(), Value::i64(1));
}

#[test]
fn str_of_values() {
    let cases: [(Option<TypeRepr>, Value, &str); 5] = [
        (None, Value::Void, ""),
        (Some(TypeRepr::FLOAT64), Value::f64(3.5), "3.5"),
        (Some(TypeRepr::FLOAT64), Value::f64(2.0), "2.0"),
        (Some(TypeRepr::BOOL), Value::bool(true), "True"),
        (Some(TypeRepr::INT64), Value::i64(-42), "-42"),
    ];
    for (param, arg, expected) in cases {
        let params: Vec<TypeRepr> = param.into_iter().collect();
        let module = compile(&params, Some(&TypeRepr::Str), |cx, args| {
            let str_type = cx.str_wrapper();
            cx.type_call(&str_type, args.to_vec()).map(Some)
        });
        let args: Vec<Value> = if params.is_empty() { vec![] } else { vec![arg] };
        assert_eq!(run_str(&module, &args).unwrap(), expected);
    }
}

#[test]
fn unsupported_operators_name_both_types() {
    let (category, message) = unsupported(compile_error(&[TypeRepr::INT64], None, |cx, args| {
        let text = cx.constant_str("ab")?;
        cx.bin_op(text, BinaryOperator::Mul, args[0].clone())?;
        Ok(None)
    }));
    assert_eq!(category, ErrorCategory::TypeError);
    assert_eq!(
        message,
        "Can't apply op * to expressions of type str and Int64"
    );
}

#[test]
fn equal_strings_hash_equally() {
    let module = compile(&[], Some(&TypeRepr::BOOL), |cx, _| {
        let whole = cx.constant_str("tessel")?;
        let whole = cx.hash(whole)?;
        assert_eq!(whole.wrapper.to_string(), "Int32");
        let head = cx.constant_str("tes")?;
        let tail = cx.constant_str("sel")?;
        let joined = cx.bin_op(head, BinaryOperator::Add, tail)?;
        let joined = cx.hash(joined)?;
        cx.bin_op(whole, BinaryOperator::Eq, joined).map(Some)
    });
    assert_eq!(run(&module, &[]).unwrap().as_bool(), Some(true));
}

#[test]
fn strings_convert_only_from_objects() {
    let err = compile_error(&[TypeRepr::INT64], None, |cx, args| {
        let str_type = cx.str_wrapper();
        cx.convert_to(args[0].clone(), &str_type, true)?;
        Ok(None)
    });
    assert_eq!(
        err.to_string(),
        "can't explicitly convert from type `Int64` to type `str`"
    );

    let module = compile(&[TypeRepr::Dynamic], Some(&TypeRepr::Str), |cx, args| {
        let str_type = cx.str_wrapper();
        cx.convert_to(args[0].clone(), &str_type, false).map(Some)
    });

    let mut machine = Machine::new(&module);
    let object = machine.dyn_str("boxed");
    let text = machine.call_by_name("f", &[Value::Ptr(object)]).unwrap();
    let text = text.as_ptr().unwrap();
    assert_eq!(machine.read_str(text).unwrap(), "boxed");
    machine.release_str(text).unwrap();
    machine.dyn_release(object).unwrap();
    assert_leak_free(&machine);

    let mut machine = Machine::new(&module);
    let object = machine.dyn_int(5);
    let err = machine.call_by_name("f", &[Value::Ptr(object)]).unwrap_err();
    assert_eq!(
        raised(Err(err)),
        (
            ErrorCategory::TypeError,
            "Can't convert from type object to type str".to_owned()
        )
    );
}
