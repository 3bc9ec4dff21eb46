#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;

use tessel_native::NativeType;

use super::*;
use crate::wrappers::FieldListBuilder;

#[test]
fn wrappers_are_built_once_per_repr() {
    let factory = WrapperFactory::new();
    let repr = TypeRepr::list_of(TypeRepr::Tuple(vec![TypeRepr::INT64, TypeRepr::Str]));
    let first = factory.get(&repr).unwrap();
    let cached = factory.cache.borrow().len();
    let second = factory.get(&repr).unwrap();
    assert_eq!(first, second);
    assert_eq!(factory.cache.borrow().len(), cached);
    // list, tuple, Int64, str
    assert_eq!(cached, 4);
}

#[test]
fn wrappers_describe_their_repr() {
    let factory = WrapperFactory::new();
    let cases = [
        (TypeRepr::None, "None", "None"),
        (TypeRepr::UINT16, "UInt16", "Arithmetic"),
        (TypeRepr::Str, "str", "String"),
        (TypeRepr::Dynamic, "object", "Dynamic"),
        (TypeRepr::shared(TypeRepr::FLOAT32), "Shared(Float32)", "Shared"),
        (TypeRepr::cell(TypeRepr::Str), "Cell(str)", "Cell"),
        (TypeRepr::masquerade(TypeRepr::INT8), "Masquerade(Int8)", "Masquerade"),
    ];
    for (repr, display, kind) in cases {
        let wrapper = factory.get(&repr).unwrap();
        assert_eq!(wrapper.to_string(), display);
        assert_eq!(wrapper.kind_name(), kind);
        assert_eq!(wrapper.repr(), &repr);
    }
    assert_eq!(factory.numeric(NumericType::Bool).to_string(), "bool");
    assert_eq!(factory.none(), factory.get(&TypeRepr::None).unwrap());
    assert_eq!(factory.string(), factory.get(&TypeRepr::Str).unwrap());
    assert_eq!(factory.dynamic(), factory.get(&TypeRepr::Dynamic).unwrap());
}

#[test]
fn undeclared_composites_are_errors() {
    let factory = WrapperFactory::new();
    let stray = TypeRepr::Composite {
        id: CompositeId::new(7),
        name: "Stray".to_owned(),
    };
    assert_eq!(
        factory.get(&stray).unwrap_err(),
        CodegenError::UnknownComposite {
            name: "#7".to_owned(),
        }
    );
    assert_eq!(
        factory.composite_fields(&TypeRepr::INT64).unwrap_err(),
        CodegenError::UnknownComposite {
            name: "Int64".to_owned(),
        }
    );
}

#[test]
fn composite_ids_are_sequential() {
    let factory = WrapperFactory::new();
    for (index, name) in ["A", "B", "C"].into_iter().enumerate() {
        let repr = factory.declare_composite(CompositeDef::closure(name, vec![]));
        assert_eq!(
            repr,
            TypeRepr::Composite {
                id: CompositeId::new(index as u32),
                name: name.to_owned(),
            }
        );
    }
    let empty = factory.get(&TypeRepr::Composite {
        id: CompositeId::new(1),
        name: "B".to_owned(),
    });
    assert!(empty.unwrap().is_empty());
}

#[test]
fn composites_may_refer_to_themselves_through_handles() {
    let factory = WrapperFactory::new();
    let this = TypeRepr::Composite {
        id: CompositeId::new(0),
        name: "Link".to_owned(),
    };
    let link = factory.declare_composite(CompositeDef::new("Link", move |b: &mut FieldListBuilder<'_>| {
        b.add("value", &TypeRepr::INT32)?
            .add("next", &TypeRepr::cell(this.clone()))?
            .add("shared", &TypeRepr::shared(this))?;
        Ok(())
    }));
    let wrapper = factory.get(&link).unwrap();
    assert!(!wrapper.is_pod());
    assert_eq!(factory.composite_fields(&link).unwrap().len(), 3);
}

/// Declares `A { items: ListOf(B) }` and `B { a: A }`, or with `by_value`,
/// `A { b: B }` and `B { a: A }`.
fn mutual_pair(factory: &WrapperFactory, by_value: bool) -> (TypeRepr, TypeRepr) {
    let a = TypeRepr::Composite {
        id: CompositeId::new(0),
        name: "A".to_owned(),
    };
    let b = TypeRepr::Composite {
        id: CompositeId::new(1),
        name: "B".to_owned(),
    };
    let held = if by_value { b.clone() } else { TypeRepr::list_of(b) };
    let a_field = a.clone();
    let a = factory.declare_composite(CompositeDef::new("A", move |f: &mut FieldListBuilder<'_>| {
        f.add("items", &held)?;
        Ok(())
    }));
    let b = factory.declare_composite(CompositeDef::new("B", move |f: &mut FieldListBuilder<'_>| {
        f.add("a", &a_field)?;
        Ok(())
    }));
    (a, b)
}

#[test]
fn mutual_references_through_a_handle_resolve_in_any_order() {
    for a_first in [true, false] {
        let factory = WrapperFactory::new();
        let (a, b) = mutual_pair(&factory, false);
        let order = if a_first { [&a, &b] } else { [&b, &a] };
        for repr in order {
            assert!(factory.get(repr).is_ok(), "{repr} (A first: {a_first})");
        }
        let a_fields = factory.composite_fields(&a).unwrap();
        let b_fields = factory.composite_fields(&b).unwrap();
        assert_eq!(a_fields.names(), vec!["items"]);
        assert_eq!(
            b_fields.layout(),
            &NativeType::Struct(vec![a_fields.layout().clone()])
        );
        assert!(!factory.get(&b).unwrap().is_pod());
    }
}

#[test]
fn mutual_containment_by_value_fails_in_any_order() {
    for a_first in [true, false] {
        let factory = WrapperFactory::new();
        let (a, b) = mutual_pair(&factory, true);
        let (first, second) = if a_first { (&a, &b) } else { (&b, &a) };
        let err = factory.get(first).unwrap_err();
        assert!(
            matches!(err, CodegenError::CyclicComposite { .. }),
            "{err:?}"
        );
        assert!(factory.get(second).is_err());
        assert_eq!(factory.get(first).unwrap_err(), err);
    }
}

#[test]
fn failures_behind_a_handle_are_reported_where_used() {
    for bad_first in [true, false] {
        let factory = WrapperFactory::new();
        let bad = factory.declare_composite(CompositeDef::closure(
            "Bad",
            vec![("__x__".to_owned(), TypeRepr::INT64)],
        ));
        let items = TypeRepr::list_of(bad.clone());
        let holder = factory.declare_composite(CompositeDef::new("Holder", move |b: &mut FieldListBuilder<'_>| {
            b.add("items", &items)?;
            Ok(())
        }));
        if bad_first {
            assert!(factory.get(&bad).is_err());
        }
        assert!(factory.get(&holder).is_ok(), "Bad first: {bad_first}");
        assert!(matches!(
            factory.get(&bad).unwrap_err(),
            CodegenError::InvalidIdentifier { .. }
        ));
    }
}

#[test]
fn failures_propagate_to_containing_types() {
    let factory = WrapperFactory::new();
    let bad = factory.declare_composite(CompositeDef::closure(
        "Bad",
        vec![("__x__".to_owned(), TypeRepr::INT64)],
    ));
    let outer_field = bad.clone();
    let outer = factory.declare_composite(CompositeDef::new("Outer", move |b: &mut FieldListBuilder<'_>| {
        b.add("inner", &outer_field)?;
        Ok(())
    }));
    let expected = CodegenError::InvalidIdentifier {
        owner: "Bad".to_owned(),
        name: "__x__".to_owned(),
    };
    assert_eq!(factory.get(&outer).unwrap_err(), expected);
    assert_eq!(factory.get(&outer).unwrap_err(), expected);
    assert_eq!(factory.get(&bad).unwrap_err(), expected);
    assert_eq!(
        factory
            .get(&TypeRepr::Tuple(vec![TypeRepr::BOOL, bad]))
            .unwrap_err(),
        expected
    );
}

#[test]
fn extensions_are_built_by_their_registered_builder() {
    let factory = WrapperFactory::new();
    let vector = TypeRepr::Extension {
        kind: "Vector".to_owned(),
        args: vec![TypeRepr::FLOAT64],
    };
    assert_eq!(
        factory.get(&vector).unwrap_err().to_string(),
        "TypeError: no wrapper kind registered for 'Vector'"
    );

    factory.register_extension(
        "Vector",
        Rc::new(|factory: &WrapperFactory, args: &[TypeRepr]| {
            factory.get(&TypeRepr::list_of(args[0].clone()))
        }),
    );
    let wrapper = factory.get(&vector).unwrap();
    assert_eq!(wrapper.repr(), &TypeRepr::list_of(TypeRepr::FLOAT64));
    assert_eq!(wrapper.kind_name(), "ListOf");
}
