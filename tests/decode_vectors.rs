use graph_cbor::{decode, DecodeOptions, Decoder, ErrorKind, StrErrorPolicy, Value};
use hex_literal::hex;

fn dec(bytes: &[u8]) -> Value {
    decode(bytes, &DecodeOptions::default()).unwrap()
}

fn dec_err(bytes: &[u8]) -> ErrorKind {
    decode(bytes, &DecodeOptions::default()).unwrap_err().kind
}

#[test]
fn decode_integers_at_every_head_width() {
    assert_eq!(dec(&hex!("00")), Value::Integer(0));
    assert_eq!(dec(&hex!("17")), Value::Integer(23));
    assert_eq!(dec(&hex!("1818")), Value::Integer(24));
    assert_eq!(dec(&hex!("190100")), Value::Integer(256));
    assert_eq!(dec(&hex!("1a000f4240")), Value::Integer(1_000_000));
    assert_eq!(
        dec(&hex!("1bffffffffffffffff")),
        Value::Integer(i128::from(u64::MAX))
    );
    assert_eq!(dec(&hex!("20")), Value::Integer(-1));
    assert_eq!(dec(&hex!("3bffffffffffffffff")), Value::Integer(-(1i128 << 64)));
}

#[test]
fn all_head_widths_decode_to_the_same_value() {
    // 10 encoded at 1/2/3/5/9 bytes
    for bytes in [
        &hex!("0a")[..],
        &hex!("180a")[..],
        &hex!("19000a")[..],
        &hex!("1a0000000a")[..],
        &hex!("1b000000000000000a")[..],
    ] {
        assert_eq!(dec(bytes), Value::Integer(10));
    }
}

#[test]
fn decode_strings_and_containers() {
    assert_eq!(dec(&hex!("6449455446")), Value::from("IETF"));
    assert_eq!(dec(&hex!("4401020304")), Value::Bytes(vec![1, 2, 3, 4]));
    assert_eq!(
        dec(&hex!("8201820203")),
        Value::Array(vec![
            Value::Integer(1),
            Value::Array(vec![Value::Integer(2), Value::Integer(3)]),
        ])
    );
    assert_eq!(
        dec(&hex!("a26161016162820203")),
        Value::Map(vec![
            (Value::from("a"), Value::Integer(1)),
            (
                Value::from("b"),
                Value::Array(vec![Value::Integer(2), Value::Integer(3)])
            ),
        ])
    );
}

#[test]
fn decode_floats_of_all_widths() {
    assert_eq!(dec(&hex!("f90000")), Value::Float(0.0));
    assert_eq!(dec(&hex!("f93c00")), Value::Float(1.0));
    assert_eq!(dec(&hex!("f93e00")), Value::Float(1.5));
    assert_eq!(dec(&hex!("f97c00")), Value::Float(f64::INFINITY));
    assert_eq!(dec(&hex!("fa47c35000")), Value::Float(100_000.0));
    assert_eq!(dec(&hex!("fb3ff199999999999a")), Value::Float(1.1));
    match dec(&hex!("f97e00")) {
        Value::Float(f) => assert!(f.is_nan()),
        other => panic!("expected float, got {other:?}"),
    }
}

#[test]
fn decode_simple_values() {
    assert_eq!(dec(&hex!("f4")), Value::Bool(false));
    assert_eq!(dec(&hex!("f5")), Value::Bool(true));
    assert_eq!(dec(&hex!("f6")), Value::Null);
    assert_eq!(dec(&hex!("f7")), Value::Undefined);
    assert_eq!(dec(&hex!("f0")), Value::Simple(16));
    assert_eq!(dec(&hex!("f8ff")), Value::Simple(255));
    assert_eq!(dec_err(&hex!("f81f")), ErrorKind::InvalidSimpleValue);
}

#[test]
fn decode_indefinite_strings() {
    assert_eq!(
        dec(&hex!("5f42010243030405ff")),
        Value::Bytes(vec![1, 2, 3, 4, 5])
    );
    assert_eq!(
        dec(&hex!("7f657374726561646d696e67ff")),
        Value::from("streaming")
    );
}

#[test]
fn decode_indefinite_containers() {
    assert_eq!(dec(&hex!("9fff")), Value::Array(vec![]));
    assert_eq!(
        dec(&hex!("9f018202039f0405ffff")),
        Value::Array(vec![
            Value::Integer(1),
            Value::Array(vec![Value::Integer(2), Value::Integer(3)]),
            Value::Array(vec![Value::Integer(4), Value::Integer(5)]),
        ])
    );
    assert_eq!(
        dec(&hex!("bf61610161629f0203ffff")),
        Value::Map(vec![
            (Value::from("a"), Value::Integer(1)),
            (
                Value::from("b"),
                Value::Array(vec![Value::Integer(2), Value::Integer(3)])
            ),
        ])
    );
}

#[test]
fn mixed_chunk_types_are_malformed() {
    assert_eq!(dec_err(&hex!("5f6161ff")), ErrorKind::MixedIndefiniteChunks);
    assert_eq!(dec_err(&hex!("7f4161ff")), ErrorKind::MixedIndefiniteChunks);
}

#[test]
fn nested_indefinite_chunks_are_malformed() {
    assert_eq!(dec_err(&hex!("5f5fffff")), ErrorKind::ReservedAdditionalInfo);
}

#[test]
fn break_outside_indefinite_context_is_malformed() {
    assert_eq!(dec_err(&hex!("ff")), ErrorKind::StrayBreak);
    assert_eq!(dec_err(&hex!("8201ff")), ErrorKind::StrayBreak);
}

#[test]
fn reserved_additional_info_is_malformed() {
    assert_eq!(dec_err(&hex!("1c")), ErrorKind::ReservedAdditionalInfo);
    assert_eq!(dec_err(&hex!("3d")), ErrorKind::ReservedAdditionalInfo);
    assert_eq!(dec_err(&hex!("fe")), ErrorKind::ReservedAdditionalInfo);
    // indefinite length on an integer major type
    assert_eq!(dec_err(&hex!("1f")), ErrorKind::ReservedAdditionalInfo);
}

#[test]
fn truncated_input_is_eof() {
    assert_eq!(dec_err(&hex!("18")), ErrorKind::UnexpectedEof);
    assert_eq!(dec_err(&hex!("62c3")), ErrorKind::UnexpectedEof);
    assert_eq!(dec_err(&hex!("8201")), ErrorKind::UnexpectedEof);
}

#[test]
fn trailing_bytes_are_rejected_with_position() {
    let err = decode(&hex!("0000"), &DecodeOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TrailingData);
    assert_eq!(err.offset, 1);
}

#[test]
fn decoder_streams_consecutive_items() {
    let bytes = hex!("0102");
    let mut dec = Decoder::new(&bytes, DecodeOptions::default());
    assert_eq!(dec.decode().unwrap(), Value::Integer(1));
    assert_eq!(dec.decode().unwrap(), Value::Integer(2));
    assert!(dec.is_eof());
}

#[test]
fn canonical_decoding_rejects_non_minimal_heads() {
    let opts = DecodeOptions {
        canonical: true,
        ..DecodeOptions::default()
    };
    assert_eq!(
        decode(&hex!("1801"), &opts).unwrap_err().kind,
        ErrorKind::NonMinimalEncoding
    );
    assert_eq!(
        decode(&hex!("190001"), &opts).unwrap_err().kind,
        ErrorKind::NonMinimalEncoding
    );
    assert_eq!(
        decode(&hex!("1a00000001"), &opts).unwrap_err().kind,
        ErrorKind::NonMinimalEncoding
    );
    // minimal forms still pass
    assert_eq!(decode(&hex!("1818"), &opts).unwrap(), Value::Integer(24));
}

#[test]
fn invalid_utf8_follows_the_policy() {
    let bytes = hex!("62c328");
    assert_eq!(dec_err(&bytes), ErrorKind::InvalidUtf8);

    let replace = DecodeOptions {
        str_errors: StrErrorPolicy::Replace,
        ..DecodeOptions::default()
    };
    assert_eq!(decode(&bytes, &replace).unwrap(), Value::from("\u{fffd}("));

    let ignore = DecodeOptions {
        str_errors: StrErrorPolicy::Ignore,
        ..DecodeOptions::default()
    };
    assert_eq!(decode(&bytes, &ignore).unwrap(), Value::from("("));
}

#[test]
fn recursion_depth_is_bounded() {
    let mut bytes = vec![0x81u8; 600];
    bytes.push(0x01);
    let err = decode(&bytes, &DecodeOptions::default()).unwrap_err();
    assert_eq!(err.kind, ErrorKind::StackOverflow);

    let shallow = DecodeOptions {
        max_depth: 4,
        ..DecodeOptions::default()
    };
    assert_eq!(
        decode(&hex!("8181818101"), &shallow).unwrap_err().kind,
        ErrorKind::StackOverflow
    );
    assert!(decode(&hex!("81818101"), &shallow).is_ok());
}

#[test]
fn duplicate_map_keys_keep_the_last_value() {
    assert_eq!(
        dec(&hex!("a2616101616102")),
        Value::Map(vec![(Value::from("a"), Value::Integer(2))])
    );
}
