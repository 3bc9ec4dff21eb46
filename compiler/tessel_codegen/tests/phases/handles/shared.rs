use pretty_assertions::assert_eq;
use tessel_codegen::TypeRepr;
use tessel_exec::Value;
use tessel_native::{BinaryOperator, ErrorCategory};

use crate::common::{compile, compile_error, run, run_str, unsupported};

fn shared_int64() -> TypeRepr {
    TypeRepr::shared(TypeRepr::INT64)
}

#[test]
fn copies_alias_one_payload() {
    let module = compile(&[TypeRepr::INT64], Some(&TypeRepr::INT64), |cx, args| {
        let shared = cx.wrapper(&shared_int64())?;
        let first = cx.type_call(&shared, vec![args[0].clone()])?;
        let second = cx.push_copy(&first)?;
        let nine = cx.constant_i64(9);
        cx.method_call(second, "set", vec![nine])?;

        let value = cx.method_call(first.clone(), "get", vec![])?;
        let ten = cx.constant_i64(10);
        let value = cx.bin_op(value, BinaryOperator::Mul, ten)?;
        let refs = cx.method_call(first, "refcount", vec![])?;
        cx.bin_op(value, BinaryOperator::Add, refs).map(Some)
    });
    assert_eq!(run(&module, &[Value::i64(5)]).unwrap(), Value::i64(92));
}

#[test]
fn default_holds_a_default_payload() {
    let module = compile(&[], Some(&TypeRepr::FLOAT64), |cx, _| {
        let shared = cx.wrapper(&TypeRepr::shared(TypeRepr::FLOAT64))?;
        let value = cx.type_call(&shared, vec![])?;
        cx.method_call(value, "get", vec![]).map(Some)
    });
    assert_eq!(run(&module, &[]).unwrap(), Value::f64(0.0));
}

#[test]
fn payloads_are_released_with_the_last_reference() {
    let module = compile(&[], Some(&TypeRepr::Str), |cx, _| {
        let shared = cx.wrapper(&TypeRepr::shared(TypeRepr::Str))?;
        let text = cx.constant_str("kept")?;
        let holder = cx.type_call(&shared, vec![text])?;
        let copy = cx.push_copy(&holder)?;
        let replacement = cx.constant_str("replaced")?;
        cx.method_call(copy, "set", vec![replacement])?;
        cx.method_call(holder, "get", vec![]).map(Some)
    });
    assert_eq!(run_str(&module, &[]).unwrap(), "replaced");
}

#[test]
fn shared_lists_grow_in_place() {
    let list = TypeRepr::list_of(TypeRepr::INT64);
    let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
        let shared = cx.wrapper(&TypeRepr::shared(list))?;
        let holder = cx.type_call(&shared, vec![])?;
        for value in [3, 4] {
            let items = cx.method_call(holder.clone(), "get", vec![])?;
            let value = cx.constant_i64(value);
            cx.method_call(items, "append", vec![value])?;
        }
        let items = cx.method_call(holder, "get", vec![])?;
        cx.len(items).map(Some)
    });
    assert_eq!(run(&module, &[]).unwrap(), Value::i64(2));
}

#[test]
fn methods_bind_as_attributes() {
    let module = compile(&[TypeRepr::INT64], Some(&TypeRepr::INT64), |cx, args| {
        let shared = cx.wrapper(&shared_int64())?;
        let holder = cx.type_call(&shared, vec![args[0].clone()])?;
        let get = cx.attribute(holder, "get")?;
        cx.call(get, vec![]).map(Some)
    });
    assert_eq!(run(&module, &[Value::i64(31)]).unwrap(), Value::i64(31));
}

#[test]
fn shared_handles_are_always_true() {
    let module = compile(&[], Some(&TypeRepr::BOOL), |cx, _| {
        let shared = cx.wrapper(&shared_int64())?;
        let holder = cx.type_call(&shared, vec![])?;
        let truth = cx.bool_cast(holder)?;
        assert_eq!(truth.as_constant_int(), Some(1));
        Ok(Some(truth))
    });
    assert_eq!(run(&module, &[]).unwrap().as_bool(), Some(true));
}

#[test]
fn misuse_is_a_static_error() {
    let (category, message) = unsupported(compile_error(&[], None, |cx, _| {
        let shared = cx.wrapper(&shared_int64())?;
        let holder = cx.type_call(&shared, vec![])?;
        cx.method_call(holder, "set", vec![])?;
        Ok(None)
    }));
    assert_eq!(category, ErrorCategory::TypeError);
    assert_eq!(
        message,
        "Shared(Int64).set() takes a different number of arguments (0 given)"
    );

    let (category, message) = unsupported(compile_error(&[], None, |cx, _| {
        let shared = cx.wrapper(&shared_int64())?;
        let holder = cx.type_call(&shared, vec![])?;
        cx.method_call(holder, "swap", vec![])?;
        Ok(None)
    }));
    assert_eq!(category, ErrorCategory::AttributeError);
    assert_eq!(message, "'Shared(Int64)' object has no attribute 'swap'");
}

#[test]
fn payload_conversion_is_implicit() {
    let err = compile_error(&[TypeRepr::FLOAT64], None, |cx, args| {
        let shared = cx.wrapper(&shared_int64())?;
        cx.type_call(&shared, vec![args[0].clone()])?;
        Ok(None)
    });
    assert_eq!(
        err.to_string(),
        "can't implicitly convert from type `Float64` to type `Int64`"
    );
}
