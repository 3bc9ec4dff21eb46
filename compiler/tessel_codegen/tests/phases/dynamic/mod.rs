//! Operations on `object` values go through the dynamic runtime.
//!
//! Arguments here are dynamic objects owned by the test, so these tests
//! drive the machine directly and release their objects before checking
//! for leaks.

use pretty_assertions::assert_eq;
use tessel_codegen::{CodegenResult, CompositeDef, ExprContext, NumericType, TypeRepr, TypedExpr};
use tessel_exec::{Address, ExecResult, Machine, Value};
use tessel_native::{BinaryOperator, ErrorCategory, NativeModule};

use crate::common::{assert_leak_free, compile, raised, run};

/// Call `f` with object arguments, then release them.
fn call_with_objects(
    module: &NativeModule,
    make: impl FnOnce(&mut Machine<'_>) -> Vec<Address>,
) -> (Machine<'_>, ExecResult<Value>) {
    let mut machine = Machine::new(module);
    let objects = make(&mut machine);
    let args: Vec<Value> = objects.iter().map(|&handle| Value::Ptr(handle)).collect();
    let result = machine.call_by_name("f", &args);
    for handle in objects {
        machine.dyn_release(handle).unwrap();
    }
    (machine, result)
}

fn int64_of(cx: &mut ExprContext<'_>, value: TypedExpr) -> CodegenResult<TypedExpr> {
    let int64 = cx.numeric(NumericType::Int64);
    cx.convert_to(value, &int64, false)
}

#[test]
fn len_and_items_of_a_list() {
    let module = compile(&[TypeRepr::Dynamic], Some(&TypeRepr::INT64), |cx, args| {
        let len = cx.len(args[0].clone())?;
        let hundred = cx.constant_i64(100);
        let len = cx.bin_op(len, BinaryOperator::Mul, hundred)?;
        let one = cx.constant_i64(1);
        let item = cx.getitem(args[0].clone(), one)?;
        let item = int64_of(cx, item)?;
        cx.bin_op(len, BinaryOperator::Add, item).map(Some)
    });
    let (machine, result) = call_with_objects(&module, |m| {
        let items = [3, 4, 5].map(|v| m.dyn_int(v));
        vec![m.dyn_list(&items).unwrap()]
    });
    assert_eq!(result.unwrap(), Value::i64(304));
    assert_leak_free(&machine);

    let (_, result) = call_with_objects(&module, |m| vec![m.dyn_int(8)]);
    assert_eq!(
        raised(result),
        (ErrorCategory::TypeError, "object of type 'int' has no len()".to_owned())
    );
}

#[test]
fn attributes_are_looked_up_at_runtime() {
    let module = compile(&[TypeRepr::Dynamic], Some(&TypeRepr::INT64), |cx, args| {
        let x = cx.attribute(args[0].clone(), "x")?;
        int64_of(cx, x).map(Some)
    });
    let (machine, result) = call_with_objects(&module, |m| {
        let x = m.dyn_int(7);
        let point = m.dyn_instance("Point", &[("x", x)]).unwrap();
        m.dyn_release(x).unwrap();
        vec![point]
    });
    assert_eq!(result.unwrap(), Value::i64(7));
    assert_leak_free(&machine);

    let (_, result) = call_with_objects(&module, |m| {
        vec![m.dyn_instance("Empty", &[]).unwrap()]
    });
    assert_eq!(
        raised(result),
        (
            ErrorCategory::AttributeError,
            "'Empty' object has no attribute 'x'".to_owned()
        )
    );
}

#[test]
fn attributes_and_items_can_be_assigned() {
    let module = compile(
        &[TypeRepr::Dynamic, TypeRepr::Dynamic, TypeRepr::INT64],
        Some(&TypeRepr::INT64),
        |cx, args| {
            let zero = cx.constant_i64(0);
            cx.setitem(args[0].clone(), zero, args[2].clone())?;
            let label = cx.constant_str("filled")?;
            cx.set_attribute(args[1].clone(), "label", label)?;

            let zero = cx.constant_i64(0);
            let item = cx.getitem(args[0].clone(), zero)?;
            let item = int64_of(cx, item)?;
            let label = cx.attribute(args[1].clone(), "label")?;
            let label = cx.len(label)?;
            cx.bin_op(item, BinaryOperator::Add, label).map(Some)
        },
    );
    let mut machine = Machine::new(&module);
    let one = machine.dyn_int(1);
    let list = machine.dyn_list(&[one]).unwrap();
    let record = machine.dyn_instance("Record", &[]).unwrap();
    let result = machine
        .call_by_name("f", &[Value::Ptr(list), Value::Ptr(record), Value::i64(30)])
        .unwrap();
    assert_eq!(result, Value::i64(36));
    assert_eq!(machine.describe(list).unwrap(), "[30]");
    machine.dyn_release(list).unwrap();
    machine.dyn_release(record).unwrap();
    assert_leak_free(&machine);
}

#[test]
fn calls_box_their_arguments() {
    let module = compile(&[TypeRepr::Dynamic], Some(&TypeRepr::INT64), |cx, args| {
        let arg = cx.constant_i64(21);
        let result = cx.call(args[0].clone(), vec![arg])?;
        int64_of(cx, result).map(Some)
    });
    let (machine, result) = call_with_objects(&module, |m| {
        vec![m.dyn_builtin("twice", |objects, args| {
            let value = objects.as_int(args[0])?.unwrap_or_default();
            Ok(objects.int(i128::from(value) * 2))
        })]
    });
    assert_eq!(result.unwrap(), Value::i64(42));
    assert_leak_free(&machine);

    let (_, result) = call_with_objects(&module, |m| vec![m.dyn_str("text")]);
    assert_eq!(
        raised(result),
        (ErrorCategory::TypeError, "'str' object is not callable".to_owned())
    );
}

#[test]
fn composites_box_into_instances() {
    let module = compile(&[TypeRepr::INT64], Some(&TypeRepr::INT64), |cx, args| {
        let point = cx.factory().declare_composite(CompositeDef::closure(
            "Point",
            vec![
                ("x".to_owned(), TypeRepr::INT64),
                ("y".to_owned(), TypeRepr::INT64),
            ],
        ));
        let point = cx.wrapper(&point)?;
        let three = cx.constant_i64(3);
        let value = cx.type_call(&point, vec![three, args[0].clone()])?;
        let object = cx.box_to_dynamic(value)?;
        let y = cx.attribute(object, "y")?;
        int64_of(cx, y).map(Some)
    });
    assert_eq!(run(&module, &[Value::i64(-8)]).unwrap(), Value::i64(-8));
}

#[test]
fn typed_operands_meet_objects_in_the_runtime() {
    let module = compile(
        &[TypeRepr::INT64, TypeRepr::Dynamic],
        Some(&TypeRepr::Dynamic),
        |cx, args| {
            let sum = cx.bin_op(args[0].clone(), BinaryOperator::Add, args[1].clone())?;
            let two = cx.constant_f64(2.0);
            cx.bin_op(sum, BinaryOperator::Mul, two).map(Some)
        },
    );
    let mut machine = Machine::new(&module);
    let seven = machine.dyn_int(7);
    let result = machine
        .call_by_name("f", &[Value::i64(5), Value::Ptr(seven)])
        .unwrap()
        .as_ptr()
        .unwrap();
    assert_eq!(machine.describe(result).unwrap(), "24.0");
    machine.dyn_release(result).unwrap();
    machine.dyn_release(seven).unwrap();
    assert_leak_free(&machine);
}

#[test]
fn truthiness_is_decided_by_the_runtime() {
    let module = compile(&[TypeRepr::Dynamic], Some(&TypeRepr::BOOL), |cx, args| {
        cx.bool_cast(args[0].clone()).map(Some)
    });
    let cases: [(fn(&mut Machine<'_>) -> Address, bool); 6] = [
        (|m| m.dyn_int(0), false),
        (|m| m.dyn_int(3), true),
        (|m| m.dyn_str(""), false),
        (|m| m.dyn_none(), false),
        (|m| m.dyn_list(&[]).unwrap(), false),
        (|m| m.dyn_instance("Thing", &[]).unwrap(), true),
    ];
    for (make, expected) in cases {
        let (machine, result) = call_with_objects(&module, |m| vec![make(m)]);
        assert_eq!(result.unwrap().as_bool(), Some(expected));
        assert_leak_free(&machine);
    }
}
