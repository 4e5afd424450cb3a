//! Format parser fuzz target. The first input byte picks the encoding defaults (unit size,
//! byte order, sign); the rest is format text. Parsing must not panic, and every symbol that
//! builds must report consistent variable ids.
//! Build with: cargo fuzz run parser_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;
#[cfg(fuzzing)]
use protodomain::{Endianness, Sign, TypeDefaults, UnitSize};

#[cfg(fuzzing)]
fn defaults_from(selector: u8) -> TypeDefaults {
    let unit_size = match selector & 0x03 {
        0 => UnitSize::U8,
        1 => UnitSize::U16,
        2 => UnitSize::U32,
        _ => UnitSize::U64,
    };
    let endianness = if selector & 0x04 == 0 { Endianness::Big } else { Endianness::Little };
    let sign = if selector & 0x08 == 0 { Sign::Unsigned } else { Sign::Signed };
    TypeDefaults {
        unit_size,
        endianness,
        sign,
    }
}

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let Ok(src) = std::str::from_utf8(rest) else {
        return;
    };
    let Ok(symbols) = protodomain::parse_with_defaults(src, &defaults_from(selector)) else {
        return;
    };
    for symbol in &symbols {
        for id in 0..symbol.variable_count() {
            let name = symbol.var_name(id).unwrap_or_default();
            assert_eq!(symbol.var_id(name), Some(id));
        }
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run parser_fuzz");
}
