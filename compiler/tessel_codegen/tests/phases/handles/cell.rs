use pretty_assertions::assert_eq;
use tessel_codegen::{NumericType, TypeRepr};
use tessel_exec::Value;
use tessel_native::{BinaryOperator, ErrorCategory, NativeType};

use crate::common::{compile, raised, run, run_str};

fn cell_int64() -> TypeRepr {
    TypeRepr::cell(TypeRepr::INT64)
}

#[test]
fn cells_start_empty() {
    let module = compile(&[], Some(&TypeRepr::BOOL), |cx, _| {
        let cell = cx.wrapper(&cell_int64())?;
        let cell = cx.type_call(&cell, vec![])?;
        cx.method_call(cell, "isSet", vec![]).map(Some)
    });
    assert_eq!(run(&module, &[]).unwrap().as_bool(), Some(false));
}

#[test]
fn construction_sets_the_value() {
    let module = compile(&[TypeRepr::INT8], Some(&TypeRepr::INT64), |cx, args| {
        let cell = cx.wrapper(&cell_int64())?;
        let cell = cx.type_call(&cell, vec![args[0].clone()])?;
        let set = cx.bool_cast(cell.clone())?;
        let int64 = cx.numeric(NumericType::Int64);
        let set = cx.convert_to(set, &int64, true)?;
        let value = cx.method_call(cell, "get", vec![])?;
        let hundred = cx.constant_i64(100);
        let flag = cx.bin_op(set, BinaryOperator::Mul, hundred)?;
        cx.bin_op(flag, BinaryOperator::Add, value).map(Some)
    });
    assert_eq!(
        run(&module, &[Value::int(-4, &NativeType::I8)]).unwrap(),
        Value::i64(96)
    );
}

#[test]
fn reading_an_empty_cell_raises() {
    let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
        let cell = cx.wrapper(&cell_int64())?;
        let cell = cx.type_call(&cell, vec![])?;
        cx.method_call(cell, "get", vec![]).map(Some)
    });
    assert_eq!(
        raised(run(&module, &[])),
        (ErrorCategory::RuntimeError, "Cell is empty".to_owned())
    );
}

#[test]
fn clear_releases_the_value() {
    let module = compile(&[], Some(&TypeRepr::BOOL), |cx, _| {
        let cell = cx.wrapper(&TypeRepr::cell(TypeRepr::Str))?;
        let text = cx.constant_str("gone")?;
        let cell = cx.type_call(&cell, vec![text])?;
        cx.method_call(cell.clone(), "clear", vec![])?;
        // Clearing twice is harmless.
        cx.method_call(cell.clone(), "clear", vec![])?;
        cx.method_call(cell, "isSet", vec![]).map(Some)
    });
    assert_eq!(run(&module, &[]).unwrap().as_bool(), Some(false));
}

#[test]
fn set_replaces_and_releases_the_old_value() {
    let module = compile(&[], Some(&TypeRepr::Str), |cx, _| {
        let cell = cx.wrapper(&TypeRepr::cell(TypeRepr::Str))?;
        let cell = cx.type_call(&cell, vec![])?;
        for text in ["first", "second", "third"] {
            let text = cx.constant_str(text)?;
            cx.method_call(cell.clone(), "set", vec![text])?;
        }
        cx.method_call(cell, "get", vec![]).map(Some)
    });
    assert_eq!(run_str(&module, &[]).unwrap(), "third");
}

#[test]
fn copies_share_the_cell() {
    let module = compile(&[TypeRepr::INT64], Some(&TypeRepr::INT64), |cx, args| {
        let cell = cx.wrapper(&cell_int64())?;
        let original = cx.type_call(&cell, vec![])?;
        let alias = cx.push_copy(&original)?;
        cx.method_call(alias, "set", vec![args[0].clone()])?;
        cx.method_call(original, "get", vec![]).map(Some)
    });
    assert_eq!(run(&module, &[Value::i64(77)]).unwrap(), Value::i64(77));
}

#[test]
fn cells_of_lists_release_their_elements() {
    let list = TypeRepr::list_of(TypeRepr::Str);
    let module = compile(&[], Some(&TypeRepr::INT64), |cx, _| {
        let list_wrapper = cx.wrapper(&list)?;
        let items = cx.type_call(&list_wrapper, vec![])?;
        let text = cx.constant_str("inside")?;
        cx.method_call(items.clone(), "append", vec![text])?;
        let cell = cx.wrapper(&TypeRepr::cell(list))?;
        let cell = cx.type_call(&cell, vec![items])?;
        let held = cx.method_call(cell, "get", vec![])?;
        cx.len(held).map(Some)
    });
    assert_eq!(run(&module, &[]).unwrap(), Value::i64(1));
}
