use graph_cbor::{
    decode, encode, CustomValue, DecodeOptions, EncodeOptions, Encoder, ErrorKind, Shareable,
    Value,
};
use hex_literal::hex;
use std::rc::Rc;

fn sharing() -> EncodeOptions {
    EncodeOptions {
        value_sharing: true,
        ..EncodeOptions::default()
    }
}

#[test]
fn shared_nodes_round_trip_with_identity() {
    let leaf = Shareable::new(Value::Array(vec![
        Value::Integer(1),
        Value::Integer(2),
        Value::Integer(3),
    ]));
    let map = Value::Map(vec![
        (Value::from("a"), Value::Shared(leaf.clone())),
        (Value::from("b"), Value::Shared(leaf)),
    ]);

    let bytes = encode(&map, &sharing()).unwrap();
    // one tag 28 around the first occurrence, tag 29 + index 0 at the second
    assert_eq!(bytes, hex!("a26161d81c830102036162d81d00"));

    let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded, map);
    let entries = decoded.as_map().unwrap();
    let (Value::Shared(a), Value::Shared(b)) = (&entries[0].1, &entries[1].1) else {
        panic!("expected shared nodes, got {decoded:?}");
    };
    assert!(a.ptr_eq(b));
}

#[test]
fn sharing_is_smaller_when_a_leaf_repeats() {
    let leaf = Shareable::new(Value::Array(
        (0..10i64).map(Value::from).collect::<Vec<_>>(),
    ));
    let graph = Value::Array(vec![
        Value::Shared(leaf.clone()),
        Value::Shared(leaf.clone()),
        Value::Shared(leaf),
    ]);

    let with = encode(&graph, &sharing()).unwrap();
    let without = encode(&graph, &EncodeOptions::default()).unwrap();
    assert!(with.len() < without.len());
}

#[test]
fn cycles_round_trip_through_sharing() {
    // p.children = [c]; c.parent = p
    let parent = Shareable::new(Value::Null);
    let child = Shareable::new(Value::Map(vec![(
        Value::from("parent"),
        Value::Shared(parent.clone()),
    )]));
    parent.set(Value::Map(vec![(
        Value::from("children"),
        Value::Array(vec![Value::Shared(child)]),
    )]));

    let bytes = encode(&Value::Shared(parent), &sharing()).unwrap();
    let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();

    let Value::Shared(p) = decoded else {
        panic!("expected a shared root");
    };
    let children = p.get().get(&Value::from("children")).cloned().unwrap();
    let Value::Array(children) = children else {
        panic!("expected children array");
    };
    let Value::Shared(c) = &children[0] else {
        panic!("expected a shared child");
    };
    let parent_again = c.get().get(&Value::from("parent")).cloned().unwrap();
    let Value::Shared(p2) = parent_again else {
        panic!("expected a shared parent reference");
    };
    assert!(p.ptr_eq(&p2));
}

#[test]
fn self_referential_bytes_decode_to_a_cycle() {
    // tag 28 around an array whose only element is a reference to itself
    let bytes = hex!("d81c81d81d00");
    let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();
    let Value::Shared(outer) = decoded else {
        panic!("expected a shared node");
    };
    let inner = {
        let value = outer.get();
        let Value::Array(items) = &*value else {
            panic!("expected an array");
        };
        let Value::Shared(inner) = &items[0] else {
            panic!("expected a shared reference");
        };
        inner.clone()
    };
    assert!(outer.ptr_eq(&inner));
}

#[test]
fn cycles_without_sharing_fail() {
    let cell = Shareable::new(Value::Null);
    cell.set(Value::Array(vec![Value::Shared(cell.clone())]));
    let err = encode(&Value::Shared(cell), &EncodeOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CyclicReference);
}

#[test]
fn acyclic_shared_nodes_encode_plainly_without_sharing() {
    let leaf = Shareable::new(Value::Integer(7));
    let graph = Value::Array(vec![Value::Shared(leaf.clone()), Value::Shared(leaf)]);
    assert_eq!(encode(&graph, &EncodeOptions::default()).unwrap(), hex!("820707"));
}

#[test]
fn missing_share_slots_are_rejected() {
    assert_eq!(
        decode(&hex!("d81d00"), &DecodeOptions::default())
            .unwrap_err()
            .kind,
        ErrorKind::ShareIndexInvalid
    );
    // index 1 when only slot 0 exists
    assert_eq!(
        decode(&hex!("d81c81d81d01"), &DecodeOptions::default())
            .unwrap_err()
            .kind,
        ErrorKind::ShareIndexInvalid
    );
}

#[test]
fn shared_scalars_round_trip() {
    let bytes = hex!("d81c05");
    let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();
    let Value::Shared(cell) = decoded else {
        panic!("expected shared");
    };
    assert_eq!(*cell.get(), Value::Integer(5));
}

#[test]
fn custom_values_share_by_identity() {
    #[derive(Debug)]
    struct Point {
        x: i64,
        y: i64,
    }

    let hook: graph_cbor::DefaultHook = Rc::new(|enc: &mut Encoder, custom: &CustomValue| {
        let point = custom.downcast_ref::<Point>().expect("only points here");
        enc.encode(&Value::Array(vec![
            Value::from(point.x),
            Value::from(point.y),
        ]))
    });

    let point = Value::Custom(CustomValue::new(Point { x: 3, y: 4 }));
    let graph = Value::Array(vec![point.clone(), point]);

    let opts = EncodeOptions {
        value_sharing: true,
        default: Some(hook),
        ..EncodeOptions::default()
    };
    let bytes = encode(&graph, &opts).unwrap();
    assert_eq!(bytes, hex!("82d81c820304d81d00"));

    let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();
    let Value::Array(items) = decoded else {
        panic!("expected array");
    };
    let (Value::Shared(a), Value::Shared(b)) = (&items[0], &items[1]) else {
        panic!("expected shared nodes");
    };
    assert!(a.ptr_eq(b));
    assert_eq!(
        *a.get(),
        Value::Array(vec![Value::Integer(3), Value::Integer(4)])
    );
}

#[test]
fn share_table_state_does_not_leak_between_encodes() {
    let leaf = Shareable::new(Value::Integer(1));
    let value = Value::Array(vec![Value::Shared(leaf.clone()), Value::Shared(leaf)]);
    let opts = sharing();
    let first = encode(&value, &opts).unwrap();
    let second = encode(&value, &opts).unwrap();
    assert_eq!(first, second);
}
