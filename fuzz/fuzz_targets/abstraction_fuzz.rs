//! Abstraction fuzz target: match arbitrary bytes against a fixed symbol set.
//! Abstraction must not panic; unmatched input is a `NoSymbolMatched` error.
//! Build with: cargo fuzz run abstraction_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
const FORMAT: &str = r#"
symbol Tlv {
    tag: uint8;
    len: size(value) uint8;
    value: raw(0..64);
    crc: crc32(tag, len, value) le;
}

symbol Items {
    kind: alt { raw(0x55cd); raw(0x58cf); };
    count: uint8(0..16);
    items: repeat(count, delimiter = 0x2c) { ascii(1..4) };
    sum: inet_checksum(kind, count, items, sum);
}
"#;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let symbols = match protodomain::parse(FORMAT) {
        Ok(s) => s,
        Err(_) => return,
    };
    let engine = protodomain::Engine::default();
    let mut memory = protodomain::Memory::new();
    let _ = engine.abstract_message(data, &symbols, &mut memory);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run abstraction_fuzz");
}
