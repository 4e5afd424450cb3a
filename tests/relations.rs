//! Relation tests: checksum algorithms, size factor / offset, value copies, relations over
//! other relations, and mismatches that only discard one branch.

use protodomain::relation::internet_checksum;
use protodomain::{parse, Bits, ChecksumAlgorithm, Engine, Field, Memory, Presets, Symbol, TypeDescriptor, Variable};

fn symbol(name: &str, fields: Vec<(&str, Variable)>) -> Symbol {
    let fields = fields.into_iter().map(|(n, v)| Field::new(n, v)).collect();
    Symbol::new(name, fields).expect("symbol")
}

#[test]
fn test_internet_checksum_vector() {
    // RFC 1071 section 3 example.
    assert_eq!(internet_checksum(&[0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7]), 0x220d);
    assert_eq!(internet_checksum(&[0x01]), 0xfeff);
    assert_eq!(internet_checksum(&[]), 0xffff);
}

#[test]
fn test_crc32_vector() {
    assert_eq!(ChecksumAlgorithm::Crc32.compute(b"123456789"), 0xcbf4_3926);
    assert_eq!(ChecksumAlgorithm::Crc32.output_bits(), 32);
    assert_eq!(ChecksumAlgorithm::Internet.output_bits(), 16);
}

const ICMP: &str = r#"
symbol Echo {
  kind: raw(0x0800);
  checksum: inet_checksum(kind, checksum, id, payload);
  id: uint16;
  payload: raw(0..32);
}
"#;

#[test]
fn test_inet_checksum_covering_itself_verifies_to_zero() {
    let symbols = parse(ICMP).expect("parse");
    let engine = Engine::default();
    for _ in 0..10 {
        let bytes = engine
            .specialize(&symbols[0], &Presets::new(), &mut Memory::new())
            .expect("specialize");
        assert_eq!(internet_checksum(&bytes), 0, "{:02x?}", bytes);
        engine
            .abstract_with(&symbols[0], &bytes, &mut Memory::new())
            .expect("abstract");
    }
    let mut presets = Presets::new();
    presets.insert("id".to_string(), Bits::from_bytes(&[0x12, 0x34]));
    presets.insert("payload".to_string(), Bits::from_bytes(b"ping"));
    let bytes = engine
        .specialize(&symbols[0], &presets, &mut Memory::new())
        .expect("specialize");
    let mut covered = bytes.clone();
    covered[2] = 0;
    covered[3] = 0;
    assert_eq!(&bytes[2..4], &internet_checksum(&covered).to_be_bytes());
}

#[test]
fn test_size_in_bits_with_little_endian_output() {
    let src = r#"
symbol Bits {
  len: size(body, factor = 1) uint16 le;
  body: ascii(0..8);
}
"#;
    let symbols = parse(src).expect("parse");
    let engine = Engine::default();
    let mut presets = Presets::new();
    presets.insert("body".to_string(), Bits::from_bytes(b"abc"));
    let bytes = engine.specialize(&symbols[0], &presets, &mut Memory::new()).expect("specialize");
    assert_eq!(bytes, vec![24, 0, b'a', b'b', b'c']);
    let msg = engine.abstract_with(&symbols[0], &bytes, &mut Memory::new()).expect("abstract");
    assert_eq!(msg.field("body"), Some(&Bits::from_bytes(b"abc")));
}

#[test]
fn test_negative_size_clamps_to_zero() {
    let sym = symbol(
        "Clamp",
        vec![
            ("len", Variable::size("", &["body"]).with_offset(-100.0)),
            ("body", Variable::data("", TypeDescriptor::raw_value(&[0xaa]))),
        ],
    );
    let bytes = Engine::default()
        .specialize(&sym, &Presets::new(), &mut Memory::new())
        .expect("specialize");
    assert_eq!(bytes, vec![0, 0xaa]);
}

#[test]
fn test_size_counts_pending_checksum_by_length() {
    // `len` covers a checksum that is itself waiting for `body`.
    let sym = symbol(
        "Nested",
        vec![
            ("len", Variable::size("", &["crc", "body"])),
            ("crc", Variable::crc32("", &["body"])),
            ("body", Variable::data("", TypeDescriptor::raw_value(b"abc"))),
        ],
    );
    let engine = Engine::default();
    let bytes = engine.specialize(&sym, &Presets::new(), &mut Memory::new()).expect("specialize");
    assert_eq!(bytes[0], 7);
    assert_eq!(&bytes[1..5], &crc32fast::hash(b"abc").to_be_bytes());
    assert_eq!(&bytes[5..], b"abc");
    engine.abstract_with(&sym, &bytes, &mut Memory::new()).expect("abstract");
}

#[test]
fn test_value_relation_copies_and_fits() {
    let sym = symbol(
        "Echo",
        vec![
            ("id", Variable::data("", TypeDescriptor::uint8())),
            ("echo", Variable::value_of("", "id", TypeDescriptor::uint16())),
        ],
    );
    let engine = Engine::default();
    let mut presets = Presets::new();
    presets.insert("id".to_string(), Bits::from_bytes(&[7]));
    let bytes = engine.specialize(&sym, &presets, &mut Memory::new()).expect("specialize");
    assert_eq!(bytes, vec![7, 0, 7]);
    engine.abstract_with(&sym, &[9, 0, 9], &mut Memory::new()).expect("abstract");
    assert!(engine.abstract_with(&sym, &[9, 0, 8], &mut Memory::new()).is_err());
}

#[test]
fn test_relation_mismatch_only_drops_its_branch() {
    let sym = symbol(
        "Either",
        vec![(
            "msg",
            Variable::alt(
                "",
                vec![
                    Variable::agg(
                        "framed",
                        vec![
                            Variable::size("len", &["body"]),
                            Variable::data("body", TypeDescriptor::raw_bytes(1, 4)),
                        ],
                    ),
                    Variable::data("unframed", TypeDescriptor::raw_bytes(0, 8)),
                ],
            ),
        )],
    );
    let engine = Engine::default();
    let framed = engine.abstract_with(&sym, &[2, 9, 9], &mut Memory::new()).expect("framed");
    assert_eq!(framed.variable("body"), Some(&Bits::from_bytes(&[9, 9])));
    assert!(framed.variable("unframed").is_none());

    let unframed = engine.abstract_with(&sym, &[5, 9, 9], &mut Memory::new()).expect("unframed");
    assert!(unframed.variable("framed").is_none());
    assert_eq!(unframed.variable("unframed"), Some(&Bits::from_bytes(&[5, 9, 9])));
}

#[test]
fn test_checksum_on_corrupted_payload_rejected() {
    let symbols = parse(ICMP).expect("parse");
    let engine = Engine::default();
    let mut presets = Presets::new();
    presets.insert("payload".to_string(), Bits::from_bytes(b"hello"));
    let mut bytes = engine.specialize(&symbols[0], &presets, &mut Memory::new()).expect("specialize");
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    assert!(engine.abstract_with(&symbols[0], &bytes, &mut Memory::new()).is_err());
}
