use pretty_assertions::assert_eq;

use super::*;

#[test]
fn bool_constants_round_trip() {
    assert_eq!(Constant::bool(true).as_bool(), Some(true));
    assert_eq!(Constant::bool(false).as_bool(), Some(false));
    assert_eq!(Constant::i64(1).as_bool(), None);
}

#[test]
fn zero_of_each_scalar() {
    assert_eq!(Constant::zero(&NativeType::Pointer), Constant::NullPointer);
    assert_eq!(
        Constant::zero(&NativeType::F32),
        Constant::Float {
            value: 0.0,
            bits: 32
        }
    );
    assert_eq!(
        Constant::zero(&NativeType::U16),
        Constant::Int {
            value: 0,
            bits: 16,
            signed: false
        }
    );
}

#[test]
fn field_ptr_at_zero_is_base() {
    let base = NativeExpr::Slot(SlotId::new(3));
    assert_eq!(base.clone().field_ptr(0), base);
}

#[test]
fn purity() {
    let slot = NativeExpr::Slot(SlotId::new(0));
    let load = slot.clone().load(NativeType::I64);
    assert!(load.is_pure());
    assert!(load
        .clone()
        .binary(NativeBinOp::Add, NativeExpr::i64(1))
        .is_pure());
    assert!(!load
        .clone()
        .binary(NativeBinOp::Div, NativeExpr::i64(2))
        .is_pure());
    assert!(!slot.store(NativeExpr::i64(1), NativeType::I64).is_pure());
    assert!(!NativeExpr::call_runtime(RuntimeFn::DynNone, vec![]).is_pure());
}
