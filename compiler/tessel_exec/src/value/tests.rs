use pretty_assertions::assert_eq;

use super::*;

#[test]
fn wrap_narrows_twos_complement() {
    assert_eq!(wrap(255, 8, true), -1);
    assert_eq!(wrap(-1, 8, false), 255);
    assert_eq!(wrap(128, 8, true), -128);
    assert_eq!(wrap(3, 1, false), 1);
    assert_eq!(wrap(i128::from(u64::MAX), 64, true), -1);
}

#[test]
fn constants_are_wrapped() {
    let value = Value::from_constant(&Constant::Int {
        value: 300,
        bits: 8,
        signed: false,
    });
    assert_eq!(value.as_i128(), Some(44));
}

#[test]
fn float_to_int_truncates_and_saturates() {
    assert_eq!(Value::f64(-2.7).convert(&NativeType::I64).as_i64(), Some(-2));
    assert_eq!(Value::f64(1e30).convert(&NativeType::I32).as_i64(), Some(i64::from(i32::MAX)));
    assert_eq!(Value::f64(-5.0).convert(&NativeType::U8).as_i64(), Some(0));
    assert_eq!(Value::f64(f64::NAN).convert(&NativeType::I64).as_i64(), Some(0));
}

#[test]
fn conversion_to_bool_tests_against_zero() {
    assert_eq!(Value::i64(256).convert(&NativeType::BOOL), Value::bool(true));
    assert_eq!(Value::f64(0.0).convert(&NativeType::BOOL), Value::bool(false));
}

#[test]
fn widening_keeps_the_value() {
    let narrow = Value::int(-3, &NativeType::I8);
    assert_eq!(narrow.convert(&NativeType::I64), Value::i64(-3));
    let unsigned = Value::int(250, &NativeType::U8);
    assert_eq!(unsigned.convert(&NativeType::I64), Value::i64(250));
}

#[test]
fn float32_rounds() {
    let value = Value::f64(0.1).convert(&NativeType::F32);
    assert_eq!(value.as_f64(), Some(f64::from(0.1f32)));
}

#[test]
fn display() {
    assert_eq!(Value::bool(true).to_string(), "true");
    assert_eq!(Value::i64(-4).to_string(), "-4");
    assert_eq!(Value::Ptr(0x10).to_string(), "0x10");
}
