//! Batch tests: parallel and sequential abstraction of message lists, failure reports and
//! dump formatting.

use protodomain::dump::{failure_to_dump, format_leaf, message_to_dump, value_summary_line};
use protodomain::error::MAX_DUMP_BYTES;
use protodomain::{abstract_batch, abstract_session, parse, Engine, Memory, Presets};
use rand::rngs::StdRng;
use rand::SeedableRng;

const FORMAT: &str = r#"
symbol Hello {
  magic: ascii("HELO");
  len: size(name) uint8;
  name: ascii(1..32);
  crc: crc32(magic, len, name);
}

symbol Bye {
  magic: ascii("BYE");
  reason: ascii(0..16);
}

symbol Login {
  op: raw(0x4c);
  user: ascii(4) session;
}
"#;

#[test]
fn test_batch_reports_matches_and_failures_in_order() {
    let symbols = parse(FORMAT).expect("parse");
    let engine = Engine::default();
    let mut rng = StdRng::seed_from_u64(17);
    let hello = engine
        .specialize_with_rng(&symbols[0], &Presets::new(), &mut Memory::new(), &mut rng)
        .expect("specialize")
        .into_bytes();
    let messages: Vec<Vec<u8>> = vec![
        hello.clone(),
        b"BYE".to_vec(),
        b"garbage\x00".to_vec(),
        b"BYEnow".to_vec(),
        hello,
    ];

    let report = abstract_batch(&engine, &messages, &symbols, &Memory::new());
    assert_eq!(report.total(), 5);
    let matched: Vec<(usize, &str)> = report.matched.iter().map(|m| (m.index, m.message.symbol.as_str())).collect();
    assert_eq!(matched, vec![(0, "Hello"), (1, "Bye"), (3, "Bye"), (4, "Hello")]);
    assert_eq!(report.failed.len(), 1);
    let failed = &report.failed[0];
    assert_eq!(failed.index, 2);
    assert_eq!(failed.tried, vec!["Hello", "Bye", "Login"]);
    assert_eq!(failed.dump, "6761726261676500");
    assert!(failed.reason.contains("no symbol matched"), "{}", failed.reason);
    assert_eq!(
        report.counts(),
        vec![("Hello".to_string(), 2), ("Bye".to_string(), 2)]
    );
}

#[test]
fn test_long_message_dump_truncated() {
    let symbols = parse(FORMAT).expect("parse");
    let engine = Engine::default();
    let long = vec![0u8; 1000];
    let report = abstract_batch(&engine, &[long], &symbols, &Memory::new());
    let failed = &report.failed[0];
    assert!(failed.dump.starts_with(&"00".repeat(MAX_DUMP_BYTES)));
    assert!(failed.dump.ends_with("... (1000 bytes)"), "{}", failed.dump);
    assert!(failure_to_dump(failed).contains("tried: Hello, Bye, Login"));
}

#[test]
fn test_batch_messages_do_not_share_memory() {
    let symbols = parse(FORMAT).expect("parse");
    let engine = Engine::default();
    let messages = vec![b"Lalix".to_vec(), b"Lbobb".to_vec()];
    let mut memory = Memory::new();

    let parallel = abstract_batch(&engine, &messages, &symbols, &memory);
    assert_eq!(parallel.matched.len(), 2);

    let session = abstract_session(&engine, &messages, &symbols, &mut memory);
    assert_eq!(session.matched.len(), 1);
    assert_eq!(session.failed.len(), 1);
    assert_eq!(session.failed[0].index, 1);
    assert!(memory.has_value("user"));
}

#[test]
fn test_message_dump_lists_fields() {
    let symbols = parse(FORMAT).expect("parse");
    let engine = Engine::default();
    let msg = engine
        .abstract_message(b"BYEok", &symbols, &mut Memory::new())
        .expect("abstract");
    let dump = message_to_dump(&symbols[1], &msg);
    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines[0], "Bye (40 bits)");
    assert_eq!(lines[1], "  magic: \"BYE\" (42 59 45)");
    assert_eq!(lines[2], "  reason: \"ok\" (6f 6b)");

    let login = engine
        .abstract_message(b"Lroot", &symbols, &mut Memory::new())
        .expect("abstract");
    let op = symbols[2].variable("op").expect("op");
    assert_eq!(value_summary_line(&login, op), "hex(4c)");
    assert_eq!(format_leaf(op, &login.data), "hex(4c 72 6f 6f 74)");
}
