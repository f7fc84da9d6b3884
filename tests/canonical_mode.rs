use graph_cbor::{decode, encode, DecodeOptions, EncodeOptions, Value};
use hex_literal::hex;

fn canonical() -> EncodeOptions {
    EncodeOptions {
        canonical: true,
        ..EncodeOptions::default()
    }
}

#[test]
fn canonical_floats_take_the_shortest_lossless_form() {
    assert_eq!(encode(&Value::Float(0.0), &canonical()).unwrap(), hex!("f90000"));
    assert_eq!(encode(&Value::Float(-0.0), &canonical()).unwrap(), hex!("f98000"));
    assert_eq!(encode(&Value::Float(1.0), &canonical()).unwrap(), hex!("f93c00"));
    assert_eq!(encode(&Value::Float(1.5), &canonical()).unwrap(), hex!("f93e00"));
    assert_eq!(encode(&Value::Float(65504.0), &canonical()).unwrap(), hex!("f97bff"));
    assert_eq!(
        encode(&Value::Float(100_000.0), &canonical()).unwrap(),
        hex!("fa47c35000")
    );
    assert_eq!(
        encode(&Value::Float(3.402_823_466_385_288_6e38), &canonical()).unwrap(),
        hex!("fa7f7fffff")
    );
    assert_eq!(
        encode(&Value::Float(1.1), &canonical()).unwrap(),
        hex!("fb3ff199999999999a")
    );
    assert_eq!(
        encode(&Value::Float(f64::INFINITY), &canonical()).unwrap(),
        hex!("f97c00")
    );
    assert_eq!(
        encode(&Value::Float(f64::NEG_INFINITY), &canonical()).unwrap(),
        hex!("f9fc00")
    );
    // subnormal half
    assert_eq!(
        encode(&Value::Float(5.960_464_477_539_063e-8), &canonical()).unwrap(),
        hex!("f90001")
    );
}

#[test]
fn every_nan_collapses_to_the_canonical_nan() {
    for nan in [f64::NAN, -f64::NAN, f64::from_bits(0x7ff8_dead_beef_0000)] {
        assert_eq!(encode(&Value::Float(nan), &canonical()).unwrap(), hex!("f97e00"));
    }
}

#[test]
fn map_keys_sort_by_encoded_bytes() {
    let map = Value::Map(vec![
        (Value::from("z"), Value::Integer(1)),
        (Value::Integer(100), Value::Integer(2)),
        (Value::Integer(10), Value::Integer(3)),
        (Value::from("aa"), Value::Integer(4)),
        (Value::Bool(false), Value::Integer(5)),
        (Value::Integer(-1), Value::Integer(6)),
    ]);
    let bytes = encode(&map, &canonical()).unwrap();
    // encoded keys in byte-wise lexicographic order:
    // 0a < 1864 < 20 < 617a < 626161 < f4
    assert_eq!(bytes, hex!("a60a031864022006617a01626161 04f405"));
}

#[test]
fn encoded_key_sequence_is_strictly_increasing() {
    let map = Value::Map(
        (0..40i64)
            .map(|i| (Value::Text(format!("key{i}")), Value::from(i)))
            .collect(),
    );
    let bytes = encode(&map, &canonical()).unwrap();
    let decoded = decode(&bytes, &DecodeOptions::default()).unwrap();
    let plain = EncodeOptions {
        canonical: true,
        ..EncodeOptions::default()
    };
    let mut previous: Option<Vec<u8>> = None;
    for (key, _) in decoded.as_map().unwrap() {
        let encoded = encode(key, &plain).unwrap();
        if let Some(prev) = &previous {
            assert!(prev < &encoded, "keys out of order: {prev:?} !< {encoded:?}");
        }
        previous = Some(encoded);
    }
}

#[test]
fn sets_sort_by_encoded_form() {
    let set = Value::Set(vec![
        Value::from("b"),
        Value::Integer(300),
        Value::Integer(2),
        Value::from("a"),
    ]);
    let bytes = encode(&set, &canonical()).unwrap();
    // 02 < 19012c < 6161 < 6162, under tag 258
    assert_eq!(bytes, hex!("d9010284021901 2c61616162"));
}

#[test]
fn canonical_output_is_a_fixed_point() {
    let value = Value::Map(vec![
        (Value::from("b"), Value::Float(1.0)),
        (Value::from("a"), Value::Array(vec![Value::Integer(1), Value::Null])),
    ]);
    let first = encode(&value, &canonical()).unwrap();
    let decoded = decode(&first, &DecodeOptions::default()).unwrap();
    let second = encode(&decoded, &canonical()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn canonical_mode_composes_with_string_referencing() {
    let opts = EncodeOptions {
        canonical: true,
        string_referencing: true,
        ..EncodeOptions::default()
    };
    let map = Value::Map(vec![
        (Value::from("zzzz"), Value::from("zzzz")),
        (Value::from("aaaa"), Value::Integer(1)),
    ]);
    let bytes = encode(&map, &opts).unwrap();
    // sorted: "aaaa" first, then "zzzz" whose value is a reference to it
    assert_eq!(bytes, hex!("d90100a26461616161 01647a7a7a7a d81901"));
    assert_eq!(decode(&bytes, &DecodeOptions::default()).unwrap(), map);
}
