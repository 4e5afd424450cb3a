//! DSL tests: syntax (parse success/failure) and the trees built from it, plus a few
//! formats run end to end through the engine.

use protodomain::relation::ChecksumAlgorithm;
use protodomain::variable::VariableKind;
use protodomain::{
    parse, parse_with_defaults, Bits, DomainError, Endianness, Engine, EngineConfig, Epoch, Memory, Presets,
    RelationKind, RepeatCount, Scope, Sign, Symbol, TypeDefaults, TypeKind, UnitSize, Unity, Variable,
};
use std::net::Ipv4Addr;

fn one_symbol(src: &str) -> Symbol {
    let mut symbols = parse(src).expect("parse");
    assert_eq!(symbols.len(), 1);
    symbols.remove(0)
}

fn var<'a>(s: &'a Symbol, name: &str) -> &'a Variable {
    s.variable(name).unwrap_or_else(|| panic!("no variable {}", name))
}

// ==================== Syntax: valid formats ====================

#[test]
fn parse_empty_format() {
    let symbols = parse("").expect("empty format can parse");
    assert!(symbols.is_empty());
}

#[test]
fn parse_minimal_symbol() {
    let s = one_symbol("symbol M { x: uint8; }");
    assert_eq!(s.name, "M");
    assert_eq!(s.field_names(), &["x".to_string()]);
}

#[test]
fn parse_all_data_types() {
    let src = r#"
symbol AllTypes {
  a: uint8;
  b: uint16;
  c: uint32;
  d: uint64;
  e: int8;
  f: int16;
  g: int32;
  h: int64;
  i: integer;
  j: raw;
  k: ascii;
  l: hex(2);
  m: bits(4);
  n: ipv4;
  o: timestamp;
}
"#;
    let s = one_symbol(src);
    assert_eq!(s.fields().len(), 15);
    let kinds: Vec<TypeKind> = s.fields().iter().filter_map(|f| f.descriptor()).map(|t| t.kind).collect();
    assert_eq!(kinds[0], TypeKind::Integer);
    assert_eq!(kinds[9], TypeKind::Raw);
    assert_eq!(kinds[10], TypeKind::Ascii);
    assert_eq!(kinds[11], TypeKind::HexString);
    assert_eq!(kinds[12], TypeKind::BitArray);
    assert_eq!(kinds[13], TypeKind::Ipv4);
    assert_eq!(kinds[14], TypeKind::Timestamp);
    let e = var(&s, "e").descriptor().expect("type");
    assert_eq!(e.sign, Sign::Signed);
    assert_eq!(e.max_bits, Some(8));
}

#[test]
fn parse_with_comments() {
    let src = r#"
// a line comment
symbol C {
  # hash comment
  id: uint8;   // trailing
}
"#;
    let s = one_symbol(src);
    assert_eq!(s.fields().len(), 1);
}

#[test]
fn parse_several_symbols_in_order() {
    let src = r#"
symbol A { x: uint8; }
symbol B { y: raw(2); }
symbol C { z: ascii(1..4); }
"#;
    let names: Vec<String> = parse(src).expect("parse").into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
}

// ==================== Data leaves ====================

#[test]
fn fixed_values_are_constant() {
    let src = r#"
symbol Fixed {
  magic: ascii("HELO");
  tag: raw(0x55cd);
  nibble: bits(0b1010);
  port: uint16(8080);
  digest: hex("00ff");
  host: ipv4(10.0.0.1);
}
"#;
    let s = one_symbol(src);
    for name in ["magic", "tag", "nibble", "port", "digest", "host"] {
        assert_eq!(var(&s, name).scope, Scope::Constant, "{}", name);
    }
    let fixed = |n: &str| var(&s, n).descriptor().and_then(|t| t.fixed.clone()).expect("fixed");
    assert_eq!(fixed("magic"), Bits::from_bytes(b"HELO"));
    assert_eq!(fixed("tag"), Bits::from_bytes(&[0x55, 0xcd]));
    assert_eq!(fixed("nibble").to_bit_string(), "1010");
    assert_eq!(fixed("port"), Bits::from_bytes(&[0x1f, 0x90]));
    assert_eq!(fixed("digest"), Bits::from_bytes(&[0x00, 0xff]));
    assert_eq!(fixed("host"), Bits::from_bytes(&[10, 0, 0, 1]));
}

#[test]
fn lengths_and_ranges() {
    let src = r#"
symbol Lengths {
  a: raw(4);
  b: ascii(1..10);
  c: raw(2..);
  d: bits(3..5);
  e: hex(1..2);
}
"#;
    let s = one_symbol(src);
    let bounds = |n: &str| {
        let t = var(&s, n).descriptor().expect("type");
        (t.min_bits, t.max_bits)
    };
    assert_eq!(bounds("a"), (Some(32), Some(32)));
    assert_eq!(bounds("b"), (Some(8), Some(80)));
    assert_eq!(bounds("c"), (Some(16), None));
    assert_eq!(bounds("d"), (Some(3), Some(5)));
    assert_eq!(bounds("e"), (Some(8), Some(16)));
}

#[test]
fn integer_interval_and_endianness() {
    let src = r#"
symbol Ints {
  count: uint8(0..8);
  id: uint16(5) le;
  big: uint32 be;
}
"#;
    let s = one_symbol(src);
    let count = var(&s, "count").descriptor().expect("type");
    assert_eq!(count.interval, Some((0, 8)));
    let id = var(&s, "id").descriptor().expect("type");
    assert_eq!(id.endianness, Endianness::Little);
    assert_eq!(id.fixed, Some(Bits::from_bytes(&[5, 0])));
    assert_eq!(var(&s, "big").descriptor().map(|t| t.endianness), Some(Endianness::Big));
}

#[test]
fn string_escapes() {
    let src = r#"
symbol Esc {
  a: ascii("a\tb\n");
  b: raw("\x00\x01\"");
}
"#;
    let s = one_symbol(src);
    let fixed = |n: &str| var(&s, n).descriptor().and_then(|t| t.fixed.clone()).expect("fixed");
    assert_eq!(fixed("a"), Bits::from_bytes(b"a\tb\n"));
    assert_eq!(fixed("b"), Bits::from_bytes(&[0, 1, b'"']));
}

#[test]
fn ipv4_network_and_timestamp_options() {
    let src = r#"
symbol Opts {
  src: ipv4(network = 192.168.0.0/16);
  when: timestamp(epoch = ntp, unity = ms, unit = 64);
}
"#;
    let s = one_symbol(src);
    let src_t = var(&s, "src").descriptor().expect("type");
    assert_eq!(src_t.network, Some((Ipv4Addr::new(192, 168, 0, 0), 16)));
    let when = var(&s, "when").descriptor().expect("type");
    assert_eq!(when.epoch, Epoch::Ntp);
    assert_eq!(when.unity, Unity::Millisecond);
    assert_eq!(when.unit_size, UnitSize::U64);
    assert_eq!(when.max_bits, Some(64));
}

#[test]
fn defaults_apply_to_integer_and_byte_order() {
    let defaults = TypeDefaults {
        unit_size: UnitSize::U16,
        endianness: Endianness::Little,
        sign: Sign::Signed,
    };
    let src = "symbol D { a: integer; b: uint32 be; c: uint8; }";
    let s = parse_with_defaults(src, &defaults).expect("parse").remove(0);
    let a = var(&s, "a").descriptor().expect("type");
    assert_eq!((a.unit_size, a.sign, a.endianness), (UnitSize::U16, Sign::Signed, Endianness::Little));
    assert_eq!(var(&s, "b").descriptor().map(|t| t.endianness), Some(Endianness::Big));
    assert_eq!(var(&s, "c").descriptor().map(|t| t.sign), Some(Sign::Unsigned));
}

// ==================== Composites and modifiers ====================

#[test]
fn alt_agg_and_named_members() {
    let src = r#"
symbol Tree {
  kind: alt { request: raw(0x01); reply: raw(0x02); } mutable;
  hdr: agg { a: uint16; b: ascii(3); };
}
"#;
    let s = one_symbol(src);
    match &var(&s, "kind").kind {
        VariableKind::Alt { children, mutable } => {
            assert!(*mutable);
            assert_eq!(children[0].name, "request");
            assert_eq!(children[1].name, "reply");
        }
        other => panic!("expected alt, got {:?}", other),
    }
    assert!(matches!(var(&s, "hdr").kind, VariableKind::Agg(ref c) if c.len() == 2));
    assert!(s.variable("b").is_some());
}

#[test]
fn unnamed_members_get_parent_names() {
    let s = one_symbol("symbol U { kind: alt { raw(0x01); raw(0x02); }; }");
    assert!(s.variable("kind.0").is_some());
    assert!(s.variable("kind.1").is_some());
}

#[test]
fn scope_modifiers() {
    let src = r#"
symbol Scopes {
  a: raw(4) session;
  b: raw(4) message;
  c: raw(4) none;
  d: raw(4) constant;
}
"#;
    let s = one_symbol(src);
    assert_eq!(var(&s, "a").scope, Scope::Session);
    assert_eq!(var(&s, "b").scope, Scope::Message);
    assert_eq!(var(&s, "c").scope, Scope::None);
    assert_eq!(var(&s, "d").scope, Scope::Constant);
}

#[test]
fn repeat_counts() {
    let src = r#"
symbol Rep {
  n: uint8;
  fixed: repeat(3) { raw(1) };
  ranged: repeat(1..4, delimiter = 0x2c) { item: raw(1); };
  open: repeat(0..) { uint16 };
  counted: repeat(n) { uint16 };
}
"#;
    let s = one_symbol(src);
    let repeat = |name: &str| match &var(&s, name).kind {
        VariableKind::Repeat(r) => r.clone(),
        other => panic!("expected repeat, got {:?}", other),
    };
    assert!(matches!(repeat("fixed").count, RepeatCount::Fixed(3)));
    let ranged = repeat("ranged");
    assert!(matches!(ranged.count, RepeatCount::Range(1, Some(4))));
    assert_eq!(ranged.delimiter, Some(Bits::from_bytes(b",")));
    assert_eq!(ranged.child.name, "item");
    assert!(matches!(repeat("open").count, RepeatCount::Range(0, None)));
    match repeat("counted").count {
        RepeatCount::Field(dep) => {
            assert_eq!(dep.name, "n");
            assert_eq!(Some(dep.id), s.var_id("n"));
        }
        other => panic!("expected field count, got {:?}", other),
    }
}

// ==================== Relations ====================

#[test]
fn relations_and_outputs() {
    let src = r#"
symbol Rel {
  len: size(body);
  wide: size(body, factor = 1, offset = 2.5) uint16 le;
  body: raw(0..8);
  crc: crc32(len, body, crc);
  sum: inet_checksum(body);
  copy: value(len) uint16;
}
"#;
    let s = one_symbol(src);
    let relation = |name: &str| match &var(&s, name).kind {
        VariableKind::Relation(r) => r.clone(),
        other => panic!("expected relation, got {:?}", other),
    };
    let len = relation("len");
    assert_eq!(len.kind, RelationKind::Size { factor: 0.125, offset: 0.0 });
    assert_eq!(len.output_len(), 8);
    let wide = relation("wide");
    assert_eq!(wide.kind, RelationKind::Size { factor: 1.0, offset: 2.5 });
    assert_eq!(wide.output.endianness, Endianness::Little);
    assert_eq!(wide.output_len(), 16);
    let crc = relation("crc");
    assert_eq!(crc.kind, RelationKind::Checksum(ChecksumAlgorithm::Crc32));
    assert_eq!(crc.output_len(), 32);
    assert_eq!(crc.deps.iter().map(|d| d.name.as_str()).collect::<Vec<_>>(), vec!["len", "body", "crc"]);
    assert_eq!(relation("sum").output_len(), 16);
    let copy = relation("copy");
    assert_eq!(copy.kind, RelationKind::Value);
    assert_eq!(copy.output_len(), 16);
}

// ==================== Syntax and construction errors ====================

fn parse_err(src: &str) -> String {
    match parse(src) {
        Ok(_) => panic!("expected an error for {}", src),
        Err(e) => e,
    }
}

#[test]
fn syntax_error_is_reported() {
    let e = parse_err("symbol { x: uint8; }");
    assert!(e.contains("Parse error"), "{}", e);
    let e = parse_err("symbol S { x: uint8 }");
    assert!(e.contains("Parse error"), "{}", e);
    let e = parse_err("symbol S { x: float32; }");
    assert!(e.contains("Parse error"), "{}", e);
}

#[test]
fn unknown_variable_rejected() {
    let e = parse_err("symbol S { len: size(nowhere); }");
    assert!(e.contains("unknown variable"), "{}", e);
    assert!(e.contains("nowhere"), "{}", e);
}

#[test]
fn duplicate_variable_rejected() {
    let e = parse_err("symbol S { x: uint8; x: uint16; }");
    assert!(e.contains("duplicate variable"), "{}", e);
}

#[test]
fn odd_hex_literal_rejected() {
    let e = parse_err("symbol S { x: raw(0xabc); }");
    assert!(e.contains("alignment"), "{}", e);
}

#[test]
fn empty_range_rejected() {
    let e = parse_err("symbol S { x: raw(5..2); }");
    assert!(e.contains("is empty"), "{}", e);
}

#[test]
fn bad_options_rejected() {
    let e = parse_err("symbol S { x: raw(4, colour = 3); }");
    assert!(e.contains("unknown option"), "{}", e);
    let e = parse_err("symbol S { t: timestamp(epoch = atlantis); }");
    assert!(e.contains("unknown epoch"), "{}", e);
    let e = parse_err("symbol S { a: uint8; c: crc32(a, factor = 2); }");
    assert!(e.contains("unexpected options"), "{}", e);
}

#[test]
fn value_relation_needs_output_type() {
    let e = parse_err("symbol S { a: uint8; b: value(a); }");
    assert!(e.contains("missing output type"), "{}", e);
}

#[test]
fn fixed_integer_out_of_range_rejected() {
    let e = parse_err("symbol S { a: uint8(300); }");
    assert!(e.contains("does not fit"), "{}", e);
}

#[test]
fn oversized_length_rejected() {
    let e = parse_err("symbol A { f: raw(3000000000000000000); }");
    assert!(e.contains("too large"), "{}", e);
    let e = parse_err("symbol A { f: ascii(1..3000000000000000000); }");
    assert!(e.contains("too large"), "{}", e);
    let s = one_symbol("symbol A { f: bits(3000000000000000000); }");
    assert_eq!(var(&s, "f").descriptor().and_then(|t| t.max_bits), Some(3_000_000_000_000_000_000));
}

// ==================== End to end ====================

const NETZOB: &str = r#"
symbol Backward {
  f1: ascii(1..10);
  f2: ascii(";");
  f3: size(f1);
}

symbol Forward {
  f3: size(f1);
  f1: ascii(1..10);
  f2: ascii(";");
}
"#;

#[test]
fn netzob_size_relations_from_dsl() {
    let symbols = parse(NETZOB).expect("parse");
    let engine = Engine::default();
    let backward = engine
        .abstract_message(b"netzob;\x06", &symbols, &mut Memory::new())
        .expect("backward");
    assert_eq!(backward.symbol, "Backward");
    assert_eq!(backward.field("f1"), Some(&Bits::from_bytes(b"netzob")));

    let forward = engine
        .abstract_message(b"\x06netzob;", &symbols, &mut Memory::new())
        .expect("forward");
    assert_eq!(forward.symbol, "Forward");

    assert!(engine.abstract_message(b"netzob;\x03", &symbols, &mut Memory::new()).is_err());
}

const LIST: &str = r#"
symbol List {
  items: repeat(1..4, delimiter = 0x2c) { raw(1) };
}

symbol Counted {
  count: uint8;
  values: repeat(count) { uint16 };
}
"#;

#[test]
fn repeat_with_delimiter_from_dsl() {
    let symbols = parse(LIST).expect("parse");
    let msg = Engine::default()
        .abstract_with(&symbols[0], b"a,b,c", &mut Memory::new())
        .expect("abstract");
    assert_eq!(msg.field("items"), Some(&Bits::from_bytes(b"a,b,c")));
    assert!(Engine::default().abstract_with(&symbols[0], b"a,b,c,d,e", &mut Memory::new()).is_err());
}

#[test]
fn repeat_count_from_field() {
    let symbols = parse(LIST).expect("parse");
    let engine = Engine::default();
    let msg = engine
        .abstract_with(&symbols[1], &[2, 0, 1, 0, 2], &mut Memory::new())
        .expect("abstract");
    assert_eq!(msg.field("values"), Some(&Bits::from_bytes(&[0, 1, 0, 2])));
    assert!(engine.abstract_with(&symbols[1], &[3, 0, 1, 0, 2], &mut Memory::new()).is_err());

    let mut presets = Presets::new();
    presets.insert("count".to_string(), Bits::from_bytes(&[3]));
    let bytes = engine.specialize(&symbols[1], &presets, &mut Memory::new()).expect("specialize");
    assert_eq!(bytes.len(), 1 + 3 * 2);
    assert_eq!(bytes[0], 3);
}

#[test]
fn repeat_count_follows_field_byte_order() {
    let symbols = parse("symbol R { n: uint16 le; items: repeat(n) { raw(1) }; }").expect("parse");
    let engine = Engine::default();
    let msg = engine
        .abstract_with(&symbols[0], &[2, 0, 0xaa, 0xbb], &mut Memory::new())
        .expect("abstract");
    assert_eq!(msg.field("items"), Some(&Bits::from_bytes(&[0xaa, 0xbb])));

    let mut presets = Presets::new();
    presets.insert("n".to_string(), Bits::from_bytes(&[2, 0]));
    let bytes = engine.specialize(&symbols[0], &presets, &mut Memory::new()).expect("specialize");
    assert_eq!(bytes.len(), 4);
    assert_eq!(&bytes[..2], &[2, 0]);
}

#[test]
fn repeat_count_from_field_capped_by_max_repeat() {
    let symbols = parse("symbol R { n: uint16; items: repeat(n) { raw(1) }; }").expect("parse");
    let engine = Engine::default();
    let mut presets = Presets::new();
    presets.insert("n".to_string(), Bits::from_bytes(&[1, 0]));
    let err = engine.specialize(&symbols[0], &presets, &mut Memory::new()).unwrap_err();
    assert!(
        matches!(err, DomainError::RepeatLimit { ref repeat, count: 256, max: 255 } if repeat == "items"),
        "{}",
        err
    );

    let mut message = vec![1, 0];
    message.extend(std::iter::repeat(7).take(256));
    assert!(engine.abstract_with(&symbols[0], &message, &mut Memory::new()).is_err());

    let roomy = Engine::new(EngineConfig {
        max_repeat: 300,
        ..EngineConfig::default()
    });
    roomy.abstract_with(&symbols[0], &message, &mut Memory::new()).expect("abstract");
    let bytes = roomy.specialize(&symbols[0], &presets, &mut Memory::new()).expect("specialize");
    assert_eq!(bytes.len(), 2 + 256);
}

const DATA: &str = r#"
symbol Data {
  kind: alt { raw(0x55cd); raw(0x58cf); };
  count: uint8(0..8);
  items: repeat(count) { uint16 };
  checksum: inet_checksum(kind, count, items);
}
"#;

#[test]
fn specialized_messages_abstract_back() {
    let symbols = parse(DATA).expect("parse");
    let engine = Engine::default();
    for _ in 0..10 {
        let msg = engine
            .specialize_message(&symbols[0], &Presets::new(), &mut Memory::new(), &mut rand::thread_rng())
            .expect("specialize");
        let n = msg.field("count").and_then(|c| c.to_u64()).expect("count");
        assert!(n <= 8);
        assert_eq!(msg.field("items").map(|b| b.len()), Some(n as usize * 16));
        let back = engine
            .abstract_bits(&symbols[0], &msg.data, &mut Memory::new())
            .expect("abstract");
        assert_eq!(back.fields, msg.fields);
    }
}
