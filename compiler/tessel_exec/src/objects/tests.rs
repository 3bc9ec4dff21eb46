#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;

use super::*;
use crate::error::ExecError;

fn category(result: ExecResult<ObjectId>) -> Option<ErrorCategory> {
    result.err().and_then(|err| err.category())
}

#[test]
fn none_is_shared_and_not_counted() {
    let mut objects = Objects::new();
    let a = objects.none();
    let b = objects.none();
    assert_eq!(a, b);
    assert_eq!(objects.live(), 0);
    objects.decref(a).unwrap();
    objects.decref(b).unwrap();
    assert_eq!(objects.to_repr(a).unwrap(), "None");
}

#[test]
fn decref_releases_children() {
    let mut objects = Objects::new();
    let one = objects.int(1);
    let text = objects.str("x");
    let tuple = objects.tuple(vec![one, text]);
    let list = objects.list(vec![tuple]);
    assert_eq!(objects.live(), 4);
    objects.decref(list).unwrap();
    assert_eq!(objects.live(), 0);
}

#[test]
fn shared_children_survive() {
    let mut objects = Objects::new();
    let item = objects.int(7);
    objects.incref(item);
    let list = objects.list(vec![item]);
    objects.decref(list).unwrap();
    assert_eq!(objects.refcount(item), Some(1));
    objects.decref(item).unwrap();
    assert_eq!(objects.live(), 0);
}

#[test]
fn decref_of_released_object_faults() {
    let mut objects = Objects::new();
    let id = objects.int(1);
    objects.decref(id).unwrap();
    assert!(matches!(objects.decref(id), Err(ExecError::Fault(_))));
}

#[test]
fn handles_resolve() {
    let mut objects = Objects::new();
    let id = objects.float(1.5);
    assert_eq!(objects.resolve(id.handle()).unwrap(), id);
    assert!(objects.resolve(0x1_0000_0000).is_err());
    assert!(objects.resolve(id.handle() + 8).is_err());
}

#[test]
fn reprs() {
    let mut objects = Objects::new();
    let one = objects.int(1);
    let half = objects.float(0.5);
    let text = objects.str("it's");
    let single = objects.tuple(vec![one]);
    objects.incref(one);
    let list = objects.list(vec![one, half, text]);
    assert_eq!(objects.to_repr(single).unwrap(), "(1,)");
    assert_eq!(objects.to_repr(list).unwrap(), "[1, 0.5, 'it\\'s']");
    let flag = objects.bool(true);
    assert_eq!(objects.to_str(flag).unwrap(), "True");
    let three = objects.float(3.0);
    assert_eq!(objects.to_str(three).unwrap(), "3.0");
}

#[test]
fn attributes() {
    let mut objects = Objects::new();
    let point = objects.instance("Point");
    let x = objects.int(3);
    objects.set_attr(point, "x", x).unwrap();
    objects.decref(x).unwrap();
    let got = objects.get_attr(point, "x").unwrap();
    assert_eq!(objects.as_int(got).unwrap(), Some(3));
    objects.decref(got).unwrap();

    let err = objects.get_attr(point, "y").unwrap_err();
    assert_eq!(
        err,
        ExecError::Raised {
            category: ErrorCategory::AttributeError,
            message: "'Point' object has no attribute 'y'".to_owned(),
        }
    );

    let names = objects.dir(point).unwrap();
    assert_eq!(objects.to_repr(names).unwrap(), "['x']");
    objects.decref(names).unwrap();
    objects.decref(point).unwrap();
    assert_eq!(objects.live(), 0);
}

#[test]
fn items_and_negative_indices() {
    let mut objects = Objects::new();
    let items: Vec<_> = (1..=3).map(|i| objects.int(i)).collect();
    let list = objects.list(items);
    let last = objects.int(-1);
    let got = objects.get_item(list, last).unwrap();
    assert_eq!(objects.as_int(got).unwrap(), Some(3));

    let far = objects.int(3);
    assert_eq!(category(objects.get_item(list, far)), Some(ErrorCategory::IndexError));
    let key = objects.str("a");
    assert_eq!(category(objects.get_item(list, key)), Some(ErrorCategory::TypeError));

    objects.del_item(list, last).unwrap();
    assert_eq!(objects.len(list).unwrap(), 2);
}

#[test]
fn tuples_are_immutable() {
    let mut objects = Objects::new();
    let tuple = objects.new_tuple(2).unwrap();
    let zero = objects.int(0);
    assert_eq!(objects.to_repr(tuple).unwrap(), "(None, None)");
    assert!(objects.set_item(tuple, zero, zero).is_err());
    objects.tuple_set(tuple, 0, zero).unwrap();
    assert_eq!(objects.refcount(zero), Some(2));
}

#[test]
fn len_of_scalar_is_a_type_error() {
    let mut objects = Objects::new();
    let one = objects.int(1);
    let err = objects.len(one).unwrap_err();
    assert_eq!(err.category(), Some(ErrorCategory::TypeError));
    assert_eq!(err.to_string(), "TypeError: object of type 'int' has no len()");
}

#[test]
fn python_numeric_semantics() {
    let mut objects = Objects::new();
    let a = objects.int(-7);
    let b = objects.int(2);
    let quotient = objects.bin_op(BinaryOperator::FloorDiv, a, b).unwrap();
    let remainder = objects.bin_op(BinaryOperator::Mod, a, b).unwrap();
    let ratio = objects.bin_op(BinaryOperator::Div, a, b).unwrap();
    assert_eq!(objects.as_int(quotient).unwrap(), Some(-4));
    assert_eq!(objects.as_int(remainder).unwrap(), Some(1));
    assert_eq!(objects.as_float(ratio).unwrap(), Some(-3.5));

    let zero = objects.int(0);
    assert_eq!(
        category(objects.bin_op(BinaryOperator::Mod, a, zero)),
        Some(ErrorCategory::ZeroDivisionError)
    );
}

#[test]
fn mixed_numeric_comparison() {
    let mut objects = Objects::new();
    let one = objects.int(1);
    let also_one = objects.float(1.0);
    let equal = objects.bin_op(BinaryOperator::Eq, one, also_one).unwrap();
    assert_eq!(objects.as_bool(equal).unwrap(), Some(true));
    assert_eq!(objects.hash(one).unwrap(), objects.hash(also_one).unwrap());
}

#[test]
fn string_operators() {
    let mut objects = Objects::new();
    let a = objects.str("ab");
    let b = objects.str("c");
    let joined = objects.bin_op(BinaryOperator::Add, a, b).unwrap();
    assert_eq!(objects.as_string(joined).unwrap().as_deref(), Some("abc"));
    let inside = objects.bin_op(BinaryOperator::In, b, joined).unwrap();
    assert_eq!(objects.as_bool(inside).unwrap(), Some(true));
    let three = objects.int(3);
    let err = objects.bin_op(BinaryOperator::Add, a, three).unwrap_err();
    assert_eq!(
        err.to_string(),
        "TypeError: unsupported operand type(s) for +: 'str' and 'int'"
    );
}

#[test]
fn identity() {
    let mut objects = Objects::new();
    let a = objects.int(1);
    let b = objects.int(1);
    let same = objects.bin_op(BinaryOperator::Is, a, b).unwrap();
    assert_eq!(objects.as_bool(same).unwrap(), Some(false));
    let equal = objects.bin_op(BinaryOperator::Eq, a, b).unwrap();
    assert_eq!(objects.as_bool(equal).unwrap(), Some(true));
}

#[test]
fn lists_are_unhashable() {
    let mut objects = Objects::new();
    let list = objects.list(Vec::new());
    assert_eq!(
        objects.hash(list).unwrap_err().category(),
        Some(ErrorCategory::TypeError)
    );
}

#[test]
fn iterators_advance_and_finish() {
    let mut objects = Objects::new();
    let items: Vec<_> = (0..2).map(|i| objects.int(i)).collect();
    let iter = objects.iterator(items);
    let first = objects.next(iter).unwrap().unwrap();
    let second = objects.next(iter).unwrap().unwrap();
    assert_eq!(objects.as_int(first).unwrap(), Some(0));
    assert_eq!(objects.as_int(second).unwrap(), Some(1));
    assert_eq!(objects.next(iter).unwrap(), None);
    objects.decref(first).unwrap();
    objects.decref(second).unwrap();
    objects.decref(iter).unwrap();
    assert_eq!(objects.live(), 0);
}

#[test]
fn builtins_are_callable() {
    let mut objects = Objects::new();
    let double = objects.builtin(
        "double",
        Rc::new(|objects: &mut Objects, args: &[ObjectId]| -> ExecResult<ObjectId> {
            let value = objects.as_int(args[0])?.unwrap_or(0);
            Ok(objects.int(i128::from(value) * 2))
        }),
    );
    let arg = objects.int(21);
    let args = objects.tuple(vec![arg]);
    let result = objects.call(double, args).unwrap();
    assert_eq!(objects.as_int(result).unwrap(), Some(42));

    let err = objects.call(result, args).unwrap_err();
    assert_eq!(err.to_string(), "TypeError: 'int' object is not callable");
}

#[test]
fn unary_operators() {
    let mut objects = Objects::new();
    let five = objects.int(5);
    let inverted = objects.unary_op(UnaryOperator::Invert, five).unwrap();
    assert_eq!(objects.as_int(inverted).unwrap(), Some(-6));
    let text = objects.str("");
    let negated = objects.unary_op(UnaryOperator::Not, text).unwrap();
    assert_eq!(objects.as_bool(negated).unwrap(), Some(true));
    assert!(objects.unary_op(UnaryOperator::Neg, text).is_err());
}

#[test]
fn floor_helpers() {
    assert_eq!(floor_div_mod(7, -2), (-4, -1));
    assert_eq!(floor_div_mod(-7, -2), (3, -1));
    assert_eq!(float_mod(-1.0, 3.0), 2.0);
    assert_eq!(float_mod(1.0, -3.0), -2.0);
}
